//! Mapping of native records (anything observed through `tracing`) onto
//! the structured event shape.
//!
//! Records whose target belongs to the task runner (`worker`, `worker::*`)
//! are task-trace records; if they carry lifecycle data they become
//! `worker.task` events whose `type` comes from a fixed outcome table.
//! Every other record becomes an `app.trace` event carrying its raw message.

use serde_json::Value;

use crate::level::{RecordLevel, Severity};
use crate::record::{Location, LogEvent};

/// Root target of the task runner's own records.
pub const WORKER_TARGET: &str = "worker";

/// Target the task runner emits lifecycle records on.
pub const WORKER_TRACE_TARGET: &str = "worker::trace";

pub const APP_TRACE_EVENT: &str = "app.trace";
pub const WORKER_TRACE_EVENT: &str = "worker.trace";
pub const WORKER_TASK_EVENT: &str = "worker.task";

/// Label used for an outcome code outside the known table.
pub const UNHANDLED: &str = "unhandled";

/// Field names the task runner attaches to lifecycle records.
pub mod keys {
    pub const OUTCOME: &str = "outcome";
    pub const TASK: &str = "task";
    pub const TASK_ID: &str = "task_id";
    pub const ARGS: &str = "args";
    pub const KWARGS: &str = "kwargs";
    pub const RUNTIME: &str = "runtime";
    pub const RETURN_VALUE: &str = "return_value";
}

/// Outcome categories of a task lifecycle record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskOutcome {
    Received,
    Success,
    Failure,
    InternalError,
    Ignored,
    Rejected,
    Retry,
}

impl TaskOutcome {
    pub const ALL: [TaskOutcome; 7] = [
        TaskOutcome::Received,
        TaskOutcome::Success,
        TaskOutcome::Failure,
        TaskOutcome::InternalError,
        TaskOutcome::Ignored,
        TaskOutcome::Rejected,
        TaskOutcome::Retry,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskOutcome::Received => "received",
            TaskOutcome::Success => "success",
            TaskOutcome::Failure => "failure",
            TaskOutcome::InternalError => "internal_error",
            TaskOutcome::Ignored => "ignored",
            TaskOutcome::Rejected => "rejected",
            TaskOutcome::Retry => "retry",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        TaskOutcome::ALL.into_iter().find(|o| o.as_str() == code)
    }

    /// Label written to the `type` field; [`UNHANDLED`] for unknown codes.
    pub fn label_for(code: &str) -> &'static str {
        TaskOutcome::from_code(code).map_or(UNHANDLED, |o| o.as_str())
    }

    /// Severity the task runner reports this outcome at.
    pub fn severity(&self) -> Severity {
        match self {
            TaskOutcome::Failure | TaskOutcome::InternalError => Severity::Error,
            TaskOutcome::Rejected => Severity::Warning,
            _ => Severity::Info,
        }
    }
}

/// Lifecycle data the task runner attaches to its records.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskLifecycle {
    /// Raw outcome code; not necessarily one of [`TaskOutcome`].
    pub outcome: String,
    pub task: Option<String>,
    pub task_id: Option<String>,
    pub args: Value,
    pub kwargs: Value,
    /// Seconds.
    pub runtime: Option<f64>,
    pub return_value: Value,
}

impl TaskLifecycle {
    pub fn new(outcome: impl Into<String>) -> Self {
        Self {
            outcome: outcome.into(),
            task: None,
            task_id: None,
            args: Value::Null,
            kwargs: Value::Null,
            runtime: None,
            return_value: Value::Null,
        }
    }
}

/// A record produced by framework, library or task-runner code through its
/// own logging calls.
#[derive(Debug, Clone)]
pub struct NativeRecord {
    pub target: String,
    pub level: RecordLevel,
    /// Fully formatted message, as the producing code would print it.
    pub message: String,
    pub lifecycle: Option<TaskLifecycle>,
    /// Error text (with its cause chain) attached to the record, if any.
    pub exception: Option<String>,
    pub location: Location,
}

pub fn is_worker_target(target: &str) -> bool {
    target == WORKER_TARGET
        || target
            .strip_prefix(WORKER_TARGET)
            .is_some_and(|rest| rest.starts_with("::") || rest.starts_with('.'))
}

/// Render a task runtime in seconds with millisecond precision.
pub fn format_runtime(seconds: f64) -> String {
    format!("{seconds:.3}s")
}

/// Map a native record onto a structured event, keeping its level.
pub fn bridge_record(record: &NativeRecord) -> (RecordLevel, LogEvent) {
    let mut event = if !is_worker_target(&record.target) {
        LogEvent::named(APP_TRACE_EVENT).message(record.message.clone())
    } else {
        match &record.lifecycle {
            Some(lifecycle) => task_event(lifecycle),
            None => LogEvent::named(WORKER_TRACE_EVENT).message(record.message.clone()),
        }
    };

    if let Some(exception) = &record.exception {
        event.set_exception(exception.clone());
    }
    (record.level, event)
}

fn task_event(lifecycle: &TaskLifecycle) -> LogEvent {
    LogEvent::named(WORKER_TASK_EVENT)
        .field("type", TaskOutcome::label_for(&lifecycle.outcome))
        .field(keys::TASK, lifecycle.task.clone())
        .field(keys::TASK_ID, lifecycle.task_id.clone())
        .field(keys::ARGS, lifecycle.args.clone())
        .field(keys::KWARGS, lifecycle.kwargs.clone())
        .field(keys::RUNTIME, lifecycle.runtime.map(format_runtime))
        .field(keys::RETURN_VALUE, lifecycle.return_value.clone())
}
