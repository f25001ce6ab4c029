use serde_json::Value;
use std::fmt::Write as _;
use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::filter::Targets;
use tracing_subscriber::layer::{Context, Layer};
use tracing_subscriber::registry::LookupSpan;

use crate::bridge::{bridge_record, is_worker_target, keys, NativeRecord, TaskLifecycle};
use crate::hook::error_chain;
use crate::level::{RecordLevel, Severity};
use crate::logger::Logger;
use crate::record::Location;

/// `tracing_subscriber` layer that turns every observed event into a
/// [`NativeRecord`], maps it through [`bridge_record`] and writes the result
/// to the [`Logger`]'s sinks.
///
/// Events forwarded from the `log` crate carry their real origin in
/// `log.target`/`log.file`/`log.line`/`log.module_path` fields; those take
/// precedence over the forwarding callsite's own metadata.
pub struct BridgeLayer {
    logger: Logger,
}

impl BridgeLayer {
    pub fn new(logger: Logger) -> Self {
        Self { logger }
    }
}

impl<S> Layer<S> for BridgeLayer
where
    S: Subscriber + for<'span> LookupSpan<'span>,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let record = native_record(event);
        let (level, structured) = bridge_record(&record);
        self.logger.log_at(level, structured, record.location);
    }
}

/// Per-target minimum severities for native records.
///
/// A route applies to every target starting with its name, with no module
/// boundary check: a `worker` route would also cover `workers::x`.
pub fn route_filter(default: Severity, routes: &[(String, Severity)]) -> Targets {
    Targets::new()
        .with_default(default.level_filter())
        .with_targets(
            routes
                .iter()
                .map(|(target, min)| (target.clone(), min.level_filter())),
        )
}

/// Collect an event's fields into a [`NativeRecord`].
pub fn native_record(event: &Event<'_>) -> NativeRecord {
    let mut visitor = FieldVisitor::default();
    event.record(&mut visitor);

    let meta = event.metadata();
    let target = visitor
        .log_target
        .take()
        .unwrap_or_else(|| meta.target().to_string());

    let location = match visitor.log_file.take() {
        Some(file) => Location {
            file: Some(file),
            function: visitor.log_module_path.take(),
            line: visitor.log_line,
        },
        None => Location::from_metadata(meta),
    };

    let lifecycle = if is_worker_target(&target) {
        take_lifecycle(&mut visitor.fields)
    } else {
        None
    };

    let exception = if visitor.errors.is_empty() {
        None
    } else {
        Some(visitor.errors.join("\n"))
    };

    NativeRecord {
        target,
        level: RecordLevel::from_tracing(meta.level()),
        message: visitor.raw_message(),
        lifecycle,
        exception,
        location,
    }
}

fn take(fields: &mut Vec<(String, Value)>, key: &str) -> Option<Value> {
    let pos = fields.iter().position(|(k, _)| k == key)?;
    Some(fields.remove(pos).1)
}

fn text(value: Value) -> String {
    match value {
        Value::String(s) => s,
        other => other.to_string(),
    }
}

/// Values recorded through `Display` arrive as strings; recover the JSON.
fn decode_json(value: Value) -> Value {
    match value {
        Value::String(s) => serde_json::from_str(&s).unwrap_or(Value::String(s)),
        other => other,
    }
}

fn take_lifecycle(fields: &mut Vec<(String, Value)>) -> Option<TaskLifecycle> {
    let outcome = text(take(fields, keys::OUTCOME)?);
    Some(TaskLifecycle {
        outcome,
        task: take(fields, keys::TASK).map(text),
        task_id: take(fields, keys::TASK_ID).map(text),
        args: take(fields, keys::ARGS).map_or(Value::Null, decode_json),
        kwargs: take(fields, keys::KWARGS).map_or(Value::Null, decode_json),
        runtime: take(fields, keys::RUNTIME).and_then(|v| match v {
            Value::String(s) => s.trim_end_matches('s').parse().ok(),
            other => other.as_f64(),
        }),
        return_value: take(fields, keys::RETURN_VALUE).map_or(Value::Null, decode_json),
    })
}

#[derive(Default)]
pub struct FieldVisitor {
    pub message: Option<String>,
    pub fields: Vec<(String, Value)>,
    pub errors: Vec<String>,
    log_target: Option<String>,
    log_module_path: Option<String>,
    log_file: Option<String>,
    log_line: Option<u32>,
}

impl FieldVisitor {
    fn push(&mut self, field: &Field, value: Value) {
        self.fields.push((field.name().to_string(), value));
    }

    /// The message followed by remaining fields as `key=value`, the way a
    /// plain-text formatter would print the event.
    pub fn raw_message(&self) -> String {
        let mut out = self.message.clone().unwrap_or_default();
        for (key, value) in &self.fields {
            if !out.is_empty() {
                out.push(' ');
            }
            match value {
                Value::String(s) => {
                    let _ = write!(out, "{key}={s}");
                }
                other => {
                    let _ = write!(out, "{key}={other}");
                }
            }
        }
        out
    }
}

impl Visit for FieldVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        match field.name() {
            "message" => self.message = Some(value.to_string()),
            "log.target" => self.log_target = Some(value.to_string()),
            "log.module_path" => self.log_module_path = Some(value.to_string()),
            "log.file" => self.log_file = Some(value.to_string()),
            _ => self.push(field, Value::String(value.to_string())),
        }
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.push(field, Value::from(value));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        if field.name() == "log.line" {
            self.log_line = u32::try_from(value).ok();
        } else {
            self.push(field, Value::from(value));
        }
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        self.push(field, Value::from(value));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.push(field, Value::from(value));
    }

    fn record_error(&mut self, _field: &Field, value: &(dyn std::error::Error + 'static)) {
        self.errors.push(error_chain(value));
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        match field.name() {
            "message" => self.message = Some(format!("{:?}", value)),
            // `log` records may deliver these as debug values
            "log.target" => self.log_target = Some(format!("{:?}", value)),
            "log.module_path" => self.log_module_path = Some(format!("{:?}", value)),
            "log.file" => self.log_file = Some(format!("{:?}", value)),
            _ => self.push(field, Value::String(format!("{:?}", value))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::{APP_TRACE_EVENT, WORKER_TASK_EVENT, WORKER_TRACE_TARGET};
    use crate::format::LineFormat;
    use crate::memory_sink::MemorySink;
    use crate::sink::LogSink;
    use serde_json::json;
    use std::sync::Arc;
    use tracing_subscriber::layer::SubscriberExt;

    #[derive(Debug, thiserror::Error)]
    #[error("request handler failed")]
    struct HandlerError(#[source] std::io::Error);

    fn with_bridge(f: impl FnOnce()) -> MemorySink {
        let sink = MemorySink::new(LineFormat::Json);
        let logger = Logger::with_sinks([Arc::new(sink.clone()) as Arc<dyn LogSink>]);
        let subscriber = tracing_subscriber::registry().with(BridgeLayer::new(logger));
        tracing::subscriber::with_default(subscriber, f);
        sink
    }

    #[test]
    fn application_events_become_app_trace() {
        let sink = with_bridge(|| {
            tracing::warn!(target: "http::server", status = 500, "GET /api/v1/users/me HTTP/1.1");
        });
        let lines = sink.json_lines();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0]["event"], APP_TRACE_EVENT);
        assert_eq!(lines[0]["message"], "GET /api/v1/users/me HTTP/1.1 status=500");
        assert_eq!(lines[0]["log.level"], "WARNING");
    }

    #[test]
    fn trace_level_keeps_numeric_weight() {
        let sink = with_bridge(|| tracing::trace!("very chatty"));
        assert_eq!(sink.json_lines()[0]["log.level"], "Level 5");
    }

    #[test]
    fn location_comes_from_event_metadata() {
        let line = line!() + 1;
        let sink = with_bridge(|| tracing::info!("here"));
        assert_eq!(
            sink.json_lines()[0]["log.source"],
            format!("layer.rs:structlog_bridge::layer::tests:{line}")
        );
    }

    #[test]
    fn worker_lifecycle_fields_are_mapped() {
        let sink = with_bridge(|| {
            tracing::info!(
                target: WORKER_TRACE_TARGET,
                outcome = "success",
                task = "user.example",
                task_id = "abc",
                args = %json!([1]),
                kwargs = %json!({"k": "v"}),
                runtime = 0.1234_f64,
                return_value = %json!({"success": true}),
                "Task user.example[abc] succeeded"
            );
        });
        let line = &sink.json_lines()[0];
        assert_eq!(line["event"], WORKER_TASK_EVENT);
        assert_eq!(line["type"], "success");
        assert_eq!(line["task"], "user.example");
        assert_eq!(line["task_id"], "abc");
        assert_eq!(line["args"], json!([1]));
        assert_eq!(line["kwargs"], json!({"k": "v"}));
        assert_eq!(line["runtime"], "0.123s");
        assert_eq!(line["return_value"], json!({"success": true}));
    }

    #[test]
    fn attached_errors_are_preserved_with_their_chain() {
        let sink = with_bridge(|| {
            let err = HandlerError(std::io::Error::other("connection reset"));
            tracing::error!(target: "http::request", error = &err as &(dyn std::error::Error + 'static), "Internal Server Error");
        });
        let line = &sink.json_lines()[0];
        assert_eq!(line["log.level"], "ERROR");
        assert_eq!(
            line["log.exception"],
            "request handler failed\ncaused by: connection reset"
        );
    }

    #[test]
    fn forwarded_log_fields_override_callsite() {
        let sink = with_bridge(|| {
            tracing::info!(
                target: "log",
                { log.target = "worker.beat",
                log.module_path = "scheduler::beat",
                log.file = "src/beat.rs",
                log.line = 42_u64 },
                "Scheduler: Sending due task example"
            );
        });
        let line = &sink.json_lines()[0];
        assert_eq!(line["event"], "worker.trace");
        assert_eq!(line["message"], "Scheduler: Sending due task example");
        assert_eq!(line["log.source"], "beat.rs:scheduler::beat:42");
    }

    #[test]
    fn task_runner_routes_stop_at_the_module_boundary() {
        let sink = MemorySink::new(LineFormat::Json);
        let logger = Logger::with_sinks([Arc::new(sink.clone()) as Arc<dyn LogSink>]);
        let routes = crate::config::default_routes();
        let subscriber = tracing_subscriber::registry()
            .with(BridgeLayer::new(logger).with_filter(route_filter(Severity::Warning, &routes)));
        tracing::subscriber::with_default(subscriber, || {
            tracing::info!(target: "worker::trace", "kept by the task runner route");
            tracing::info!(target: "workers::pool", "below the default level");
        });
        let messages: Vec<_> = sink
            .json_lines()
            .iter()
            .map(|l| l["message"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(messages, ["kept by the task runner route"]);
    }

    #[test]
    fn routes_filter_by_target() {
        let sink = MemorySink::new(LineFormat::Json);
        let logger = Logger::with_sinks([Arc::new(sink.clone()) as Arc<dyn LogSink>]);
        let routes = vec![("http::request".to_string(), Severity::Error)];
        let subscriber = tracing_subscriber::registry()
            .with(BridgeLayer::new(logger).with_filter(route_filter(Severity::Info, &routes)));
        tracing::subscriber::with_default(subscriber, || {
            tracing::warn!(target: "http::request", "Not Found");
            tracing::error!(target: "http::request", "Internal Server Error");
            tracing::debug!(target: "app", "too verbose");
            tracing::info!(target: "app", "kept");
        });
        let messages: Vec<_> = sink
            .json_lines()
            .iter()
            .map(|l| l["message"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(messages, ["Internal Server Error", "kept"]);
    }
}
