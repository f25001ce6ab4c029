use crate::level::RecordLevel;
use crate::record::LogRecord;

/// Errors surfaced by a sink while writing or flushing.
#[derive(thiserror::Error, Debug)]
pub enum SinkError {
    #[error("log sink i/o failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("log sink lock poisoned by a panicking writer")]
    Poisoned,
}

/// Synchronous destination for [`LogRecord`]s.
///
/// Implementations are responsible for rendering and writing a record to a
/// concrete destination (console stream, rotating file, in-memory buffer).
/// `write` is called on the logging thread and must serialize concurrent
/// appends itself.
pub trait LogSink: Send + Sync {
    /// Write a single record.
    ///
    /// **Returns**
    /// - `Ok(())` once the record has been handed to the destination.
    /// - `Err(..)` if the destination failed. The logger does not retry.
    fn write(&self, record: &LogRecord) -> Result<(), SinkError>;

    /// Whether records at `level` should reach this sink at all.
    ///
    /// Default implementation accepts everything.
    fn accepts(&self, _level: RecordLevel) -> bool {
        true
    }

    /// Flush any buffered output.
    ///
    /// Default implementation is a no-op.
    fn flush(&self) -> Result<(), SinkError> {
        Ok(())
    }
}
