use serde::ser::{SerializeMap, Serializer};
use std::str::FromStr;

use crate::level::{RecordLevel, Severity};
use crate::record::LogRecord;

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

const RESET: &str = "\x1b[0m";
const GREEN: &str = "\x1b[32m";
const RED: &str = "\x1b[31m";
const CYAN: &str = "\x1b[36m";

/// How a [`LogRecord`] is turned into a line of text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineFormat {
    /// `time | LEVEL    | {event json} | file:function:line`
    Pretty { colored: bool },
    /// One JSON object per line: the event keys, then `log.*` metadata.
    Json,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown log format `{0}` (expected `pretty` or `json`)")]
pub struct ParseFormatError(pub String);

impl FromStr for LineFormat {
    type Err = ParseFormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pretty" | "text" => Ok(LineFormat::Pretty { colored: false }),
            "json" => Ok(LineFormat::Json),
            _ => Err(ParseFormatError(s.to_string())),
        }
    }
}

impl LineFormat {
    /// Render a record. Multi-line output (exception text) is allowed; the
    /// returned string always ends with a newline.
    pub fn render(&self, record: &LogRecord) -> String {
        match self {
            LineFormat::Pretty { colored } => render_pretty(record, *colored),
            LineFormat::Json => render_json(record),
        }
    }
}

fn level_style(level: &RecordLevel) -> &'static str {
    match level {
        RecordLevel::Named(Severity::Debug) => "\x1b[34m\x1b[1m",
        RecordLevel::Named(Severity::Info) => "\x1b[1m",
        RecordLevel::Named(Severity::Warning) => "\x1b[33m\x1b[1m",
        RecordLevel::Named(Severity::Error) => "\x1b[31m\x1b[1m",
        RecordLevel::Named(Severity::Critical) => "\x1b[41m\x1b[1m",
        RecordLevel::Numeric(_) => "",
    }
}

fn render_pretty(record: &LogRecord, colored: bool) -> String {
    let time = record.timestamp.format(TIME_FORMAT);
    let level = format!("{:<8}", record.level);
    let message = record.event.to_json();
    let source = record.location.to_string();

    let mut line = if colored {
        let sep = format!(" {RED}|{RESET} ");
        format!(
            "{GREEN}{time}{RESET}{sep}{style}{level}{RESET}{sep}{message}{sep}{CYAN}{source}{RESET}",
            style = level_style(&record.level),
        )
    } else {
        format!("{time} | {level} | {message} | {source}")
    };
    line.push('\n');
    if let Some(exception) = record.event.exception_text() {
        line.push_str(exception.trim_end());
        line.push('\n');
    }
    line
}

fn render_json(record: &LogRecord) -> String {
    let mut buf = Vec::with_capacity(128);
    let written = {
        let mut ser = serde_json::Serializer::new(&mut buf);
        write_json_map(&mut ser, record)
    };
    let mut line = match written {
        Ok(()) => String::from_utf8(buf).unwrap_or_else(|_| record.event.to_json()),
        Err(_) => record.event.to_json(),
    };
    line.push('\n');
    line
}

/// Metadata keys appended to every JSON line; caller fields with these
/// names are left out.
const JSON_META_KEYS: [&str; 4] = ["log.level", "log.time", "log.source", "log.exception"];

fn write_json_map<S: Serializer>(ser: S, record: &LogRecord) -> Result<S::Ok, S::Error> {
    let mut map = ser.serialize_map(None)?;
    record.event.serialize_entries(&mut map, &JSON_META_KEYS)?;
    map.serialize_entry("log.level", &record.level.to_string())?;
    map.serialize_entry(
        "log.time",
        &record.timestamp.format(TIME_FORMAT).to_string(),
    )?;
    map.serialize_entry("log.source", &record.location.to_string())?;
    if let Some(exception) = record.event.exception_text() {
        map.serialize_entry("log.exception", exception)?;
    }
    map.end()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{LogEvent, Location};
    use chrono::{Local, TimeZone};
    use serde_json::Value;

    fn record(level: RecordLevel, event: LogEvent) -> LogRecord {
        LogRecord {
            timestamp: Local.with_ymd_and_hms(2024, 1, 1, 12, 30, 5).unwrap(),
            level,
            event,
            location: Location {
                file: Some("src/user/tasks.rs".into()),
                function: Some("user::tasks".into()),
                line: Some(7),
            },
        }
    }

    #[test]
    fn pretty_line_is_pipe_delimited() {
        let rec = record(Severity::Info.into(), LogEvent::named("user.test").field("success", true));
        let line = LineFormat::Pretty { colored: false }.render(&rec);
        assert_eq!(
            line,
            "2024-01-01 12:30:05.000 | INFO     | {\"event\":\"user.test\",\"success\":true} | tasks.rs:user::tasks:7\n"
        );
    }

    #[test]
    fn pretty_line_appends_exception_below() {
        let rec = record(
            Severity::Error.into(),
            LogEvent::named("exception.hook").exception("boom\ncaused by: io\n"),
        );
        let line = LineFormat::Pretty { colored: false }.render(&rec);
        let lines: Vec<_> = line.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].contains("| ERROR    |"));
        assert_eq!(lines[1], "boom");
        assert_eq!(lines[2], "caused by: io");
    }

    #[test]
    fn colored_line_keeps_content() {
        let rec = record(Severity::Warning.into(), LogEvent::new());
        let line = LineFormat::Pretty { colored: true }.render(&rec);
        assert!(line.contains("WARNING "));
        assert!(line.contains("{\"event\":\"message\"}"));
        assert!(line.contains('\x1b'));
    }

    #[test]
    fn json_line_puts_event_first_and_metadata_last() {
        let rec = record(
            RecordLevel::Numeric(5),
            LogEvent::named("app.trace").message("hi").exception("trace"),
        );
        let line = LineFormat::Json.render(&rec);
        assert!(line.starts_with(r#"{"event":"app.trace","message":"hi","log.level":"Level 5""#));
        let parsed: Value = serde_json::from_str(line.trim_end()).unwrap();
        assert_eq!(parsed["log.source"], "tasks.rs:user::tasks:7");
        assert_eq!(parsed["log.exception"], "trace");
        assert_eq!(parsed["log.time"], "2024-01-01 12:30:05.000");
    }

    #[test]
    fn caller_fields_cannot_shadow_metadata_keys() {
        let rec = record(
            Severity::Info.into(),
            LogEvent::named("user.test")
                .field("log.level", "DEBUG")
                .field("kept", 1),
        );
        let line = LineFormat::Json.render(&rec);
        assert_eq!(line.matches("\"log.level\"").count(), 1);
        let parsed: Value = serde_json::from_str(line.trim_end()).unwrap();
        assert_eq!(parsed["log.level"], "INFO");
        assert_eq!(parsed["kept"], 1);
    }

    #[test]
    fn parses_format_names() {
        assert_eq!("JSON".parse::<LineFormat>(), Ok(LineFormat::Json));
        assert_eq!(
            "pretty".parse::<LineFormat>(),
            Ok(LineFormat::Pretty { colored: false })
        );
        assert!("xml".parse::<LineFormat>().is_err());
    }
}
