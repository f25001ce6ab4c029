use std::any::{type_name, Any};
use std::backtrace::{Backtrace, BacktraceStatus};
use std::cell::Cell;
use std::error::Error;
use std::future::Future;
use std::panic;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::task::{Context, Poll};

use crate::level::Severity;
use crate::logger::Logger;
use crate::record::{Location, LogEvent};

/// Event category of the final record written for a crash.
pub const CRASH_EVENT: &str = "exception.hook";

static INSTALLED: AtomicBool = AtomicBool::new(false);

thread_local! {
    static HANDLED_DEPTH: Cell<usize> = const { Cell::new(0) };
}

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum HookError {
    #[error("crash hook is already installed for this process")]
    AlreadyInstalled,
}

/// Install a process-wide panic hook that writes one `exception.hook`
/// ERROR event through `logger` for every panic raised outside a
/// [`handled`] scope.
///
/// The previously installed hook (by default, the standard panic message
/// on stderr) runs first, so the original report is out even if a sink
/// fails or panics while the event is written.
///
/// **Returns**
/// - `Err(HookError::AlreadyInstalled)` on any call after the first.
pub fn install_crash_hook(logger: &Logger) -> Result<(), HookError> {
    if INSTALLED.swap(true, Ordering::SeqCst) {
        return Err(HookError::AlreadyInstalled);
    }

    let logger = logger.clone();
    let previous = panic::take_hook();
    panic::set_hook(Box::new(move |info| {
        previous(info);
        if in_handled_scope() {
            return;
        }

        let location = info
            .location()
            .map(|loc| Location {
                file: Some(loc.file().to_string()),
                function: None,
                line: Some(loc.line()),
            })
            .unwrap_or_else(Location::unknown);
        let event = panic_event(info.payload(), &location);
        logger.log_at(Severity::Error, event, location);
    }));
    Ok(())
}

/// Whether the current thread is inside a [`handled`] scope.
pub fn in_handled_scope() -> bool {
    HANDLED_DEPTH.with(|depth| depth.get() > 0)
}

struct HandledGuard;

impl HandledGuard {
    fn enter() -> Self {
        HANDLED_DEPTH.with(|depth| depth.set(depth.get() + 1));
        HandledGuard
    }
}

impl Drop for HandledGuard {
    fn drop(&mut self) {
        HANDLED_DEPTH.with(|depth| depth.set(depth.get().saturating_sub(1)));
    }
}

/// Run `f` as code whose panics the caller catches and reports itself.
///
/// Panics raised inside `f` do not produce an `exception.hook` event. The
/// caller is still responsible for catching the unwind.
pub fn handled<R>(f: impl FnOnce() -> R) -> R {
    let _guard = HandledGuard::enter();
    f()
}

/// Future adapter marking every poll of the wrapped future as [`handled`].
pub struct Handled<F> {
    inner: Pin<Box<F>>,
}

impl<F: Future> Handled<F> {
    pub fn new(future: F) -> Self {
        Self {
            inner: Box::pin(future),
        }
    }
}

impl<F: Future> Future for Handled<F> {
    type Output = F::Output;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<F::Output> {
        let _guard = HandledGuard::enter();
        self.inner.as_mut().poll(cx)
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        *s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "Box<dyn Any>"
    }
}

fn panic_event(payload: &(dyn Any + Send), location: &Location) -> LogEvent {
    let message = panic_message(payload);
    let thread = std::thread::current();

    let mut exception = format!(
        "thread '{}' panicked at {}: {}",
        thread.name().unwrap_or("<unnamed>"),
        location,
        message
    );
    let backtrace = Backtrace::capture();
    if backtrace.status() == BacktraceStatus::Captured {
        exception.push('\n');
        exception.push_str(&backtrace.to_string());
    }

    LogEvent::named(CRASH_EVENT)
        .message(message)
        .field("type", "panic")
        .field("thread", thread.name().unwrap_or("<unnamed>"))
        .exception(exception)
}

/// Report an error that escaped all application handling, typically the
/// `Err` returned from `main`.
///
/// The event's `type` is the error's type name without its module path.
#[track_caller]
pub fn report_uncaught<E: Error + 'static>(logger: &Logger, err: &E) {
    let event = LogEvent::named(CRASH_EVENT)
        .field("type", short_type_name::<E>())
        .exception(error_chain(err));
    logger.log_at(Severity::Error, event, Location::caller());
}

/// Pass `result` through, reporting it first if it is an error.
#[track_caller]
pub fn report_on_error<T, E: Error + 'static>(logger: &Logger, result: Result<T, E>) -> Result<T, E> {
    if let Err(err) = &result {
        report_uncaught(logger, err);
    }
    result
}

/// `Display` of an error followed by each of its sources, one per line.
pub fn error_chain(err: &(dyn Error + 'static)) -> String {
    let mut text = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        text.push_str("\ncaused by: ");
        text.push_str(&cause.to_string());
        source = cause.source();
    }
    text
}

/// Last path segment of a type's name, generics stripped.
pub fn short_type_name<T: ?Sized>() -> &'static str {
    let full = type_name::<T>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}
