use std::io::{self, Write};
use std::sync::Mutex;

use crate::format::LineFormat;
use crate::level::{RecordLevel, Severity};
use crate::record::LogRecord;
use crate::sink::{LogSink, SinkError};

/// Console sink writing one rendered line per record.
///
/// Writes go straight to the wrapped writer under a mutex, so lines from
/// concurrent threads never interleave.
pub struct ConsoleSink {
    writer: Mutex<Box<dyn Write + Send>>,
    format: LineFormat,
    min_level: Severity,
}

impl ConsoleSink {
    /// Sink bound to the process's standard output.
    pub fn stdout(format: LineFormat, min_level: Severity) -> Self {
        Self::with_writer(io::stdout(), format, min_level)
    }

    /// Sink bound to an arbitrary writer, e.g. stderr or a pipe.
    pub fn with_writer(
        writer: impl Write + Send + 'static,
        format: LineFormat,
        min_level: Severity,
    ) -> Self {
        Self {
            writer: Mutex::new(Box::new(writer)),
            format,
            min_level,
        }
    }
}

impl LogSink for ConsoleSink {
    fn write(&self, record: &LogRecord) -> Result<(), SinkError> {
        let line = self.format.render(record);
        let mut writer = self.writer.lock().map_err(|_| SinkError::Poisoned)?;
        writer.write_all(line.as_bytes())?;
        writer.flush()?;
        Ok(())
    }

    fn accepts(&self, level: RecordLevel) -> bool {
        level.at_least(self.min_level)
    }

    fn flush(&self) -> Result<(), SinkError> {
        let mut writer = self.writer.lock().map_err(|_| SinkError::Poisoned)?;
        writer.flush()?;
        Ok(())
    }
}
