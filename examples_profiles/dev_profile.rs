use serde_json::Map;
use tokio::time::{sleep, Duration};
use tracing::{info, warn};

use structlog_bridge::init::init_logging;
use structlog_bridge::tasks::{UserExampleTask, USER_EXAMPLE};
use structlog_bridge::worker::{default_schedule, Beat, TaskRegistry, TaskRoutes, Worker, WorkerConfig};
use structlog_bridge::{log, report_on_error, LoggingConfig, Profile, Severity};

/// Development profile: coloured console lines plus `data/logs/today.log`.
///
/// Runs the stock beat schedule for a little over ten seconds, so
/// `user.example` executes twice on the urgent queue.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = LoggingConfig::for_profile(Profile::Development, "data/logs");
    let logger = init_logging(&config)?;

    log!(logger, Severity::Info; event = "user.test", success = true, now = chrono::Local::now().to_rfc3339());
    log!(logger, Severity::Info, "guest balance increased"; event = "balance.updated", sum = 322);

    info!(target: "http::server", "Uvicorn running on http://0.0.0.0:8000");
    warn!(target: "http::request", "GET /missing HTTP/1.1 404");

    let registry = TaskRegistry::new().register(UserExampleTask::new(logger.clone()));
    let (handle, worker) = Worker::start(registry, TaskRoutes::defaults(), WorkerConfig::default());
    handle.submit(USER_EXAMPLE, vec![], Map::new())?;

    let beat = default_schedule()
        .into_iter()
        .fold(Beat::new(handle.clone()), Beat::schedule)
        .spawn();

    sleep(Duration::from_millis(10_500)).await;
    beat.abort();
    let _ = beat.await;
    drop(handle);
    worker.await?;

    let parsed = report_on_error(&logger, "not a number".parse::<i32>());
    if parsed.is_err() {
        info!("parse failure reported as exception.hook");
    }

    logger.flush()?;
    Ok(())
}
