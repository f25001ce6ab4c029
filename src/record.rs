use chrono::{DateTime, Local};
use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::Value;
use std::fmt;
use std::path::Path;

use crate::level::RecordLevel;

/// Category used when a caller does not name the event.
pub const DEFAULT_EVENT: &str = "message";

/// Placeholder written in place of a value that refused to serialize.
pub const UNSERIALIZABLE: &str = "<unserializable>";

/// Ordered key/value container for caller-supplied fields.
///
/// Keys keep insertion order. Inserting an existing key replaces its value
/// without moving it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Fields {
    entries: Vec<(String, Value)>,
}

impl Fields {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Fields {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut fields = Fields::new();
        for (k, v) in iter {
            fields.insert(k, v);
        }
        fields
    }
}

impl Serialize for Fields {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (k, v) in &self.entries {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

/// Convert any serializable value, substituting [`UNSERIALIZABLE`] on error.
pub fn to_value_lossy<T: Serialize + ?Sized>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or_else(|_| Value::String(UNSERIALIZABLE.to_string()))
}

fn value_to_text(value: Value) -> String {
    match value {
        Value::String(s) => s,
        other => other.to_string(),
    }
}

/// One structured log event.
///
/// Serializes as a JSON object whose keys come in a fixed order: `event`,
/// then `message` when set, then the extra fields in insertion order, then
/// leftover positional values under `args`. Attached exception text is kept
/// aside and rendered by the sink after the line.
#[derive(Debug, Clone, PartialEq)]
pub struct LogEvent {
    event: String,
    message: Option<String>,
    fields: Fields,
    args: Vec<Value>,
    exception: Option<String>,
}

impl Default for LogEvent {
    fn default() -> Self {
        Self {
            event: DEFAULT_EVENT.to_string(),
            message: None,
            fields: Fields::new(),
            args: Vec::new(),
            exception: None,
        }
    }
}

impl LogEvent {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shorthand for `LogEvent::new().event(event)`.
    pub fn named(event: impl AsRef<str>) -> Self {
        Self::new().event(event)
    }

    /// Set the event category. Stored lowercased.
    pub fn event(mut self, event: impl AsRef<str>) -> Self {
        self.event = event.as_ref().to_lowercase();
        self
    }

    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn field_display(self, key: impl Into<String>, value: &dyn fmt::Display) -> Self {
        self.field(key, value.to_string())
    }

    pub fn field_debug(self, key: impl Into<String>, value: &dyn fmt::Debug) -> Self {
        self.field(key, format!("{value:?}"))
    }

    pub fn field_serialize<T: Serialize + ?Sized>(self, key: impl Into<String>, value: &T) -> Self {
        self.field(key, to_value_lossy(value))
    }

    /// Append a positional value; these end up under `args`.
    pub fn arg(mut self, value: impl Into<Value>) -> Self {
        self.args.push(value.into());
        self
    }

    pub fn exception(mut self, text: impl Into<String>) -> Self {
        self.exception = Some(text.into());
        self
    }

    /// Insert a field by name.
    ///
    /// `event`/`e` and `message`/`msg` address the dedicated slots rather
    /// than becoming extra fields.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        let key = key.into();
        match key.as_str() {
            "event" | "e" => self.event = value_to_text(value.into()).to_lowercase(),
            "message" | "msg" => self.message = Some(value_to_text(value.into())),
            _ => self.fields.insert(key, value),
        }
    }

    pub fn set_exception(&mut self, text: impl Into<String>) {
        self.exception = Some(text.into());
    }

    pub fn event_name(&self) -> &str {
        &self.event
    }

    pub fn message_text(&self) -> Option<&str> {
        self.message.as_deref()
    }

    pub fn fields(&self) -> &Fields {
        &self.fields
    }

    pub fn args(&self) -> &[Value] {
        &self.args
    }

    pub fn exception_text(&self) -> Option<&str> {
        self.exception.as_deref()
    }

    /// Compact JSON rendering. Never fails.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| {
            format!("{{\"event\":{}}}", Value::String(self.event.clone()))
        })
    }

    /// Write the event's entries into `map`, leaving out extra fields whose
    /// key is in `reserved`. A caller field named `args` is dropped when
    /// positional values are present.
    pub(crate) fn serialize_entries<M: SerializeMap>(
        &self,
        map: &mut M,
        reserved: &[&str],
    ) -> Result<(), M::Error> {
        map.serialize_entry("event", &self.event)?;
        if let Some(message) = &self.message {
            map.serialize_entry("message", message)?;
        }
        for (k, v) in self.fields.iter() {
            if reserved.contains(&k) || (k == "args" && !self.args.is_empty()) {
                continue;
            }
            map.serialize_entry(k, v)?;
        }
        if !self.args.is_empty() {
            map.serialize_entry("args", &self.args)?;
        }
        Ok(())
    }
}

impl Serialize for LogEvent {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        self.serialize_entries(&mut map, &[])?;
        map.end()
    }
}

/// Source location a line is attributed to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Location {
    pub file: Option<String>,
    pub function: Option<String>,
    pub line: Option<u32>,
}

impl Location {
    /// Location of the outermost `#[track_caller]` frame calling this.
    #[track_caller]
    pub fn caller() -> Self {
        let loc = std::panic::Location::caller();
        Self {
            file: Some(loc.file().to_string()),
            function: None,
            line: Some(loc.line()),
        }
    }

    /// Used when no frame information is available at all.
    pub fn unknown() -> Self {
        Self::default()
    }

    pub fn from_metadata(meta: &tracing::Metadata<'_>) -> Self {
        Self {
            file: meta.file().map(str::to_string),
            function: meta.module_path().map(str::to_string),
            line: meta.line(),
        }
    }

    pub fn with_function(mut self, function: impl Into<String>) -> Self {
        self.function = Some(function.into());
        self
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let file = self
            .file
            .as_deref()
            .map(|path| {
                Path::new(path)
                    .file_name()
                    .and_then(|name| name.to_str())
                    .unwrap_or(path)
            })
            .unwrap_or("<unknown>");
        write!(
            f,
            "{}:{}:{}",
            file,
            self.function.as_deref().unwrap_or("?"),
            self.line.unwrap_or(0)
        )
    }
}

/// A fully resolved line on its way to the sinks.
#[derive(Debug, Clone)]
pub struct LogRecord {
    pub timestamp: DateTime<Local>,
    pub level: RecordLevel,
    pub event: LogEvent,
    pub location: Location,
}

impl LogRecord {
    pub fn new(level: impl Into<RecordLevel>, event: LogEvent, location: Location) -> Self {
        Self {
            timestamp: Local::now(),
            level: level.into(),
            event,
            location,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;

    #[test]
    fn bare_event_has_only_default_category() {
        assert_eq!(LogEvent::new().to_json(), r#"{"event":"message"}"#);
    }

    #[test]
    fn keys_serialize_in_insertion_order() {
        let event = LogEvent::named("User.Test")
            .field("success", true)
            .field("now", "2024-01-01 00:00:00");
        assert_eq!(
            event.to_json(),
            r#"{"event":"user.test","success":true,"now":"2024-01-01 00:00:00"}"#
        );
    }

    #[test]
    fn message_precedes_extras_and_args_come_last() {
        let event = LogEvent::new()
            .arg(1)
            .field("sum", 322)
            .message("guest balance increased")
            .event("balance.updated")
            .arg("two");
        assert_eq!(
            event.to_json(),
            r#"{"event":"balance.updated","message":"guest balance increased","sum":322,"args":[1,"two"]}"#
        );
    }

    #[test]
    fn aliases_address_dedicated_slots() {
        let mut event = LogEvent::new();
        event.insert("e", "Order.Paid");
        event.insert("msg", 42);
        assert_eq!(event.event_name(), "order.paid");
        assert_eq!(event.message_text(), Some("42"));
        assert!(event.fields().is_empty());
    }

    #[test]
    fn reinserting_a_key_keeps_its_position() {
        let fields: Fields = [("a", json!(1)), ("b", json!(2)), ("a", json!(3))]
            .into_iter()
            .collect();
        let keys: Vec<_> = fields.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, ["a", "b"]);
        assert_eq!(fields.get("a"), Some(&json!(3)));
    }

    #[test]
    fn scalar_values_pass_through_unchanged() {
        let event = LogEvent::new()
            .field("s", "text")
            .field("n", 1.5)
            .field("b", false)
            .field("z", Value::Null);
        let parsed: Value = serde_json::from_str(&event.to_json()).unwrap();
        assert_eq!(parsed["s"], json!("text"));
        assert_eq!(parsed["n"], json!(1.5));
        assert_eq!(parsed["b"], json!(false));
        assert_eq!(parsed["z"], Value::Null);
    }

    #[test]
    fn unserializable_values_become_placeholder() {
        let mut bad = HashMap::new();
        bad.insert((1, 2), "tuple keys are not valid JSON object keys");
        let event = LogEvent::new().field_serialize("bad", &bad).field("ok", 1);
        assert_eq!(
            event.to_json(),
            r#"{"event":"message","bad":"<unserializable>","ok":1}"#
        );
    }

    #[test]
    fn display_and_debug_fields_are_stringified() {
        let path = std::path::PathBuf::from("data/logs");
        let event = LogEvent::new()
            .field_display("dir", &path.display())
            .field_debug("level", &Some(3));
        assert_eq!(
            event.to_json(),
            r#"{"event":"message","dir":"data/logs","level":"Some(3)"}"#
        );
    }

    #[test]
    fn positional_values_win_over_an_args_field() {
        let event = LogEvent::named("job.started")
            .field("args", "from caller")
            .field("n", 1)
            .arg("positional");
        assert_eq!(
            event.to_json(),
            r#"{"event":"job.started","n":1,"args":["positional"]}"#
        );

        let event = LogEvent::named("job.started").field("args", "from caller");
        assert_eq!(
            event.to_json(),
            r#"{"event":"job.started","args":"from caller"}"#
        );
    }

    #[test]
    fn non_finite_floats_do_not_break_serialization() {
        let event = LogEvent::new().field("ratio", f64::NAN);
        assert_eq!(event.to_json(), r#"{"event":"message","ratio":null}"#);
    }

    #[test]
    fn location_renders_basename_function_and_line() {
        let loc = Location {
            file: Some("src/user/tasks.rs".into()),
            function: Some("app::user::tasks".into()),
            line: Some(12),
        };
        assert_eq!(loc.to_string(), "tasks.rs:app::user::tasks:12");
        assert_eq!(Location::unknown().to_string(), "<unknown>:?:0");
    }

    #[test]
    fn caller_location_points_at_call_site() {
        let expected_line = line!() + 1;
        let loc = Location::caller();
        assert_eq!(loc.line, Some(expected_line));
        assert!(loc.file.unwrap().ends_with("record.rs"));
    }
}
