use tracing::info;

use structlog_bridge::init::init_logging;
use structlog_bridge::{LogEvent, LoggingConfig, Severity};

/// Production profile: JSON lines on stdout, no file sink.
///
/// Reads `DEBUG`, `LOG_LEVEL`, `LOG_FORMAT`, `LOG_TO_FILE`, `LOG_DIR` and
/// `LOG_COLOR`; `DEBUG` defaults to `false` here. Ends with a panic so the
/// crash hook's `exception.hook` line can be seen.
fn main() -> Result<(), Box<dyn std::error::Error>> {
    if std::env::var_os("DEBUG").is_none() {
        std::env::set_var("DEBUG", "false");
    }
    let config = LoggingConfig::from_env()?;
    let logger = init_logging(&config)?;

    logger.log(
        Severity::Info,
        LogEvent::named("service.started").field("profile", format!("{:?}", config.profile)),
    );
    info!(target: "http::server", "Application startup complete.");

    let divisor: i32 = std::env::args().count() as i32 - 1;
    println!("{}", 10 / divisor);
    Ok(())
}
