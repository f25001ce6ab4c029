use tracing::Subscriber;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::{Layer, Registry};

use crate::config::LoggingConfig;
use crate::hook::{install_crash_hook, HookError};
use crate::layer::{route_filter, BridgeLayer};
use crate::logger::Logger;
use crate::sink::SinkError;

/// Error type returned by [`init_logging`].
#[derive(thiserror::Error, Debug)]
pub enum InitError {
    #[error("failed to open log sinks: {0}")]
    Sink(#[from] SinkError),

    #[error("failed to install global tracing subscriber: {0}")]
    Subscriber(#[from] TryInitError),

    #[error(transparent)]
    Hook(#[from] HookError),
}

/// Build the bridge layer for `logger`, filtered by the configured routes.
///
/// Use this when composing a custom subscriber; [`init_logging`] does it
/// for you otherwise.
pub fn bridge_layer<S>(logger: &Logger, config: &LoggingConfig) -> impl Layer<S>
where
    S: Subscriber + for<'span> LookupSpan<'span>,
{
    BridgeLayer::new(logger.clone())
        .with_filter(route_filter(config.native_default, &config.routes))
}

/// Initialize process-wide logging from `config`.
///
/// **Effects**
///
/// - Opens the configured sinks and registers them on a new [`Logger`].
/// - Installs a [`Registry`] combined with the bridge layer as the global
///   default subscriber, so every `tracing` event (and every `log` record,
///   through `tracing-subscriber`'s log forwarding) reaches the sinks.
/// - Installs the crash hook unless `config.crash_hook` is false.
///
/// **Returns**
/// - The [`Logger`] to hand to every component emitting structured events.
pub fn init_logging(config: &LoggingConfig) -> Result<Logger, InitError> {
    let logger = Logger::new();
    configure(&logger, config)?;

    Registry::default()
        .with(bridge_layer(&logger, config))
        .try_init()?;

    if config.crash_hook {
        install_crash_hook(&logger)?;
    }
    Ok(logger)
}

/// (Re)open the sinks described by `config` and register them on `logger`,
/// replacing whatever was registered before.
pub fn configure(logger: &Logger, config: &LoggingConfig) -> Result<(), SinkError> {
    let sinks = config.sinks.build()?;
    logger.configure(sinks);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Profile;
    use crate::file::Compression;
    use crate::record::LogEvent;
    use std::fs;

    #[test]
    fn configuring_twice_does_not_duplicate_lines() {
        let tmp = tempfile::tempdir().unwrap();
        let mut config = LoggingConfig::for_profile(Profile::Development, tmp.path());
        config.sinks.console = None;
        if let Some(file) = config.sinks.file.as_mut() {
            file.compression = Compression::None;
        }

        let logger = Logger::new();
        configure(&logger, &config).unwrap();
        configure(&logger, &config).unwrap();
        assert_eq!(logger.sink_count(), 1);

        logger.info(LogEvent::named("user.test"));
        let content = fs::read_to_string(tmp.path().join("today.log")).unwrap();
        assert_eq!(content.lines().count(), 1);
    }

    #[test]
    fn production_profile_builds_console_only() {
        let config = LoggingConfig::for_profile(Profile::Production, "/nonexistent/never/created");
        let logger = Logger::new();
        configure(&logger, &config).unwrap();
        assert_eq!(logger.sink_count(), 1);
    }
}
