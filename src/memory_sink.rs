use std::sync::{Arc, Mutex};

use crate::format::LineFormat;
use crate::record::LogRecord;
use crate::sink::{LogSink, SinkError};

/// A sink that simply drops all records.
///
/// Useful for measuring the overhead of the bridge itself without any
/// I/O, and for components that must be handed a logger but whose output
/// nobody reads.
#[derive(Clone, Default)]
pub struct NullSink;

impl LogSink for NullSink {
    fn write(&self, _record: &LogRecord) -> Result<(), SinkError> {
        Ok(())
    }
}

/// A sink that keeps every rendered line in memory.
///
/// Clones share the same buffer, so a test can keep one handle and give the
/// other to a [`Logger`](crate::logger::Logger).
#[derive(Clone)]
pub struct MemorySink {
    format: LineFormat,
    lines: Arc<Mutex<Vec<String>>>,
}

impl Default for MemorySink {
    fn default() -> Self {
        Self::new(LineFormat::Json)
    }
}

impl MemorySink {
    pub fn new(format: LineFormat) -> Self {
        Self {
            format,
            lines: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Snapshot of every rendered record, newline included.
    pub fn lines(&self) -> Vec<String> {
        self.lines
            .lock()
            .map(|lines| lines.clone())
            .unwrap_or_default()
    }

    /// Parse each captured line as JSON; only meaningful with [`LineFormat::Json`].
    pub fn json_lines(&self) -> Vec<serde_json::Value> {
        self.lines()
            .iter()
            .filter_map(|line| serde_json::from_str(line.trim_end()).ok())
            .collect()
    }
}

impl LogSink for MemorySink {
    fn write(&self, record: &LogRecord) -> Result<(), SinkError> {
        let line = self.format.render(record);
        self.lines.lock().map_err(|_| SinkError::Poisoned)?.push(line);
        Ok(())
    }
}
