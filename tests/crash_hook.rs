use std::panic;
use std::sync::Arc;
use std::thread;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tracing_subscriber::layer::SubscriberExt;

use structlog_bridge::format::LineFormat;
use structlog_bridge::hook::{handled, HookError, CRASH_EVENT};
use structlog_bridge::memory_sink::MemorySink;
use structlog_bridge::worker::{Task, TaskError, TaskRegistry, TaskRequest, TaskRoutes, Worker, WorkerConfig};
use structlog_bridge::{install_crash_hook, BridgeLayer, LogSink, Logger};

struct Boom;

#[async_trait]
impl Task for Boom {
    fn name(&self) -> &str {
        "boom"
    }

    async fn run(&self, _request: &TaskRequest) -> Result<Value, TaskError> {
        panic!("task blew up")
    }
}

fn hook_events(sink: &MemorySink) -> Vec<Value> {
    sink.json_lines()
        .into_iter()
        .filter(|l| l["event"] == CRASH_EVENT)
        .collect()
}

// The panic hook is process-wide, so everything runs in one test.
#[test]
fn crash_hook_reports_only_unhandled_panics() {
    let sink = MemorySink::new(LineFormat::Json);
    let logger = Logger::with_sinks([Arc::new(sink.clone()) as Arc<dyn LogSink>]);

    install_crash_hook(&logger).unwrap();
    assert_eq!(install_crash_hook(&logger), Err(HookError::AlreadyInstalled));

    // a panic nothing handles takes its thread down
    let crashed = thread::Builder::new()
        .name("crasher".into())
        .spawn(|| panic!("boom"))
        .unwrap()
        .join();
    assert!(crashed.is_err());

    let hooks = hook_events(&sink);
    assert_eq!(hooks.len(), 1);
    assert_eq!(hooks[0]["type"], "panic");
    assert_eq!(hooks[0]["message"], "boom");
    assert_eq!(hooks[0]["thread"], "crasher");
    assert_eq!(hooks[0]["log.level"], "ERROR");
    assert!(hooks[0]["log.source"]
        .as_str()
        .unwrap()
        .starts_with("crash_hook.rs:"));
    assert!(hooks[0]["log.exception"]
        .as_str()
        .unwrap()
        .contains("panicked at crash_hook.rs:?:"));

    // panics the caller catches itself stay out of the hook
    let caught = handled(|| panic::catch_unwind(|| panic!("expected")));
    assert!(caught.is_err());
    assert_eq!(hook_events(&sink).len(), 1);

    // a panicking task is reported once, as a task outcome
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();
    let subscriber = tracing_subscriber::registry().with(BridgeLayer::new(logger.clone()));
    tracing::subscriber::with_default(subscriber, || {
        runtime.block_on(async {
            let registry = TaskRegistry::new().register(Boom);
            let (handle, join) = Worker::start(registry, TaskRoutes::default(), WorkerConfig::default());
            handle.submit("boom", vec![], Map::new()).unwrap();
            drop(handle);
            join.await.unwrap();
        });
    });

    let events: Vec<String> = sink
        .json_lines()
        .iter()
        .skip(1)
        .map(|l| format!("{}/{}", l["event"].as_str().unwrap(), l["type"].as_str().unwrap_or("")))
        .collect();
    assert_eq!(events, ["worker.task/received", "worker.task/internal_error"]);
    assert_eq!(hook_events(&sink).len(), 1);
}
