use arc_swap::ArcSwap;
use std::sync::Arc;

use crate::level::{RecordLevel, Severity};
use crate::record::{Location, LogEvent, LogRecord};
use crate::sink::{LogSink, SinkError};

type SinkList = Vec<Arc<dyn LogSink>>;

/// Logging context shared by every component that emits structured events.
///
/// Constructed once at startup and cloned (cheaply) wherever it is needed.
/// All clones observe the same sink registry; [`Logger::configure`] swaps
/// the registry atomically, so reconfiguring never duplicates output.
///
/// Every emitting method is synchronous and never panics or returns an
/// error to the caller. Sink failures are reported on stderr; use
/// [`Logger::emit`] to observe them instead.
#[derive(Clone, Default)]
pub struct Logger {
    sinks: Arc<ArcSwap<SinkList>>,
}

impl Logger {
    /// A logger with no sinks; every event is discarded until configured.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sinks(sinks: impl IntoIterator<Item = Arc<dyn LogSink>>) -> Self {
        let logger = Self::new();
        logger.configure(sinks);
        logger
    }

    /// Replace every registered sink with `sinks`.
    pub fn configure(&self, sinks: impl IntoIterator<Item = Arc<dyn LogSink>>) {
        self.sinks.store(Arc::new(sinks.into_iter().collect()));
    }

    pub fn sink_count(&self) -> usize {
        self.sinks.load().len()
    }

    /// Emit `event` at `level`, attributed to the caller's source location.
    #[track_caller]
    pub fn log(&self, level: impl Into<RecordLevel>, event: LogEvent) {
        self.log_at(level, event, Location::caller());
    }

    /// Emit `event` at `level` with an explicit source location.
    pub fn log_at(&self, level: impl Into<RecordLevel>, event: LogEvent, location: Location) {
        let record = LogRecord::new(level, event, location);
        self.dispatch(&record, |err| eprintln!("log sink write failed: {err}"));
    }

    #[track_caller]
    pub fn debug(&self, event: LogEvent) {
        self.log_at(Severity::Debug, event, Location::caller());
    }

    #[track_caller]
    pub fn info(&self, event: LogEvent) {
        self.log_at(Severity::Info, event, Location::caller());
    }

    #[track_caller]
    pub fn warning(&self, event: LogEvent) {
        self.log_at(Severity::Warning, event, Location::caller());
    }

    #[track_caller]
    pub fn error(&self, event: LogEvent) {
        self.log_at(Severity::Error, event, Location::caller());
    }

    #[track_caller]
    pub fn critical(&self, event: LogEvent) {
        self.log_at(Severity::Critical, event, Location::caller());
    }

    /// Write an already-built record to every accepting sink.
    ///
    /// All sinks are attempted even if one fails; the first failure is
    /// returned.
    pub fn emit(&self, record: &LogRecord) -> Result<(), SinkError> {
        let mut first = None;
        self.dispatch(record, |err| {
            first.get_or_insert(err);
        });
        first.map_or(Ok(()), Err)
    }

    pub fn flush(&self) -> Result<(), SinkError> {
        for sink in self.sinks.load().iter() {
            sink.flush()?;
        }
        Ok(())
    }

    fn dispatch(&self, record: &LogRecord, mut on_error: impl FnMut(SinkError)) {
        let sinks = self.sinks.load();
        for sink in sinks.iter().filter(|sink| sink.accepts(record.level)) {
            if let Err(err) = sink.write(record) {
                on_error(err);
            }
        }
    }
}

/// Emit a structured event through a [`Logger`].
///
/// ```ignore
/// log!(logger, Severity::Info, "guest balance increased"; event = "balance.updated", sum = 322);
/// log!(logger, Severity::Info; event = "user.test", success = true);
/// log!(logger, Severity::Debug);
/// ```
///
/// The call site's file and line and the enclosing module path are recorded
/// as the event's location.
#[macro_export]
macro_rules! log {
    ($logger:expr, $level:expr $(, $msg:expr)? $(; $($key:ident = $value:expr),+ $(,)?)?) => {{
        #[allow(unused_mut)]
        let mut event = $crate::record::LogEvent::new();
        $( event = event.message($msg); )?
        $( $( event.insert(stringify!($key), $value); )+ )?
        $logger.log_at(
            $level,
            event,
            $crate::record::Location::caller().with_function(module_path!()),
        )
    }};
}
