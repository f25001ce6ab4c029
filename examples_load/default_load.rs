use std::sync::Arc;
use std::time::Instant;
use tracing::error;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use structlog_bridge::memory_sink::NullSink;
use structlog_bridge::sink::LogSink;
use structlog_bridge::{BridgeLayer, LogEvent, Logger, Severity};

fn main() {
    let logger = Logger::with_sinks([Arc::new(NullSink) as Arc<dyn LogSink>]);
    tracing_subscriber::registry()
        .with(BridgeLayer::new(logger.clone()))
        .init();

    let n: u64 = 100_000;

    let start = Instant::now();
    for i in 0..n {
        error!(target: "http::request", iteration = i, "default load test error");
    }
    let elapsed = start.elapsed();
    println!(
        "bridged records: {} events in {:?} (~{:.0} ev/s)",
        n,
        elapsed,
        n as f64 / elapsed.as_secs_f64()
    );

    let start = Instant::now();
    for i in 0..n {
        logger.log(
            Severity::Info,
            LogEvent::named("load.test").field("iteration", i),
        );
    }
    let elapsed = start.elapsed();
    println!(
        "direct events: {} events in {:?} (~{:.0} ev/s)",
        n,
        elapsed,
        n as f64 / elapsed.as_secs_f64()
    );
}
