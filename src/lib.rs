//! Structured logging bridge.
//!
//! Application code emits [`LogEvent`]s through a [`Logger`]; framework,
//! library and task-runner records observed through `tracing` (and the
//! `log` crate) are mapped onto the same event shape by [`BridgeLayer`].
//! Records end up on a console sink and a daily-rotated file sink.

pub mod level;
pub mod record;
pub mod format;
pub mod sink;
pub mod console;
pub mod file;
pub mod memory_sink;
pub mod logger;
pub mod bridge;
pub mod layer;
pub mod hook;
pub mod env;
pub mod config;
pub mod init;
pub mod worker;
pub mod tasks;

pub use bridge::{bridge_record, NativeRecord, TaskLifecycle, TaskOutcome};
pub use config::{LoggingConfig, Profile};
pub use hook::{install_crash_hook, report_on_error, report_uncaught};
pub use init::{init_logging, InitError};
pub use layer::BridgeLayer;
pub use level::{RecordLevel, Severity};
pub use logger::Logger;
pub use record::{Fields, Location, LogEvent, LogRecord};
pub use sink::{LogSink, SinkError};
