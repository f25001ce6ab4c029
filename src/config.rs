use std::path::PathBuf;
use std::sync::Arc;

use crate::console::ConsoleSink;
use crate::env::{self, parse_bool};
use crate::file::{FileSinkConfig, RotatingFileSink};
use crate::format::{LineFormat, ParseFormatError};
use crate::level::{ParseSeverityError, Severity};
use crate::sink::{LogSink, SinkError};

/// Deployment profile.
///
/// Development writes coloured pretty lines to the console and keeps a
/// rotated `today.log`; production writes JSON lines to the console only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Profile {
    Development,
    Production,
}

impl Profile {
    pub fn from_debug(debug: bool) -> Self {
        if debug {
            Profile::Development
        } else {
            Profile::Production
        }
    }

    pub fn is_debug(&self) -> bool {
        matches!(self, Profile::Development)
    }
}

#[derive(Debug, Clone)]
pub struct ConsoleConfig {
    pub format: LineFormat,
    pub min_level: Severity,
}

/// Which sinks are active and at what minimum severity.
#[derive(Debug, Clone)]
pub struct SinkConfig {
    pub console: Option<ConsoleConfig>,
    pub file: Option<FileSinkConfig>,
}

impl SinkConfig {
    pub fn for_profile(profile: Profile, log_dir: impl Into<PathBuf>) -> Self {
        match profile {
            Profile::Development => Self {
                console: Some(ConsoleConfig {
                    format: LineFormat::Pretty { colored: true },
                    min_level: Severity::Info,
                }),
                file: Some(FileSinkConfig::new(log_dir)),
            },
            Profile::Production => Self {
                console: Some(ConsoleConfig {
                    format: LineFormat::Json,
                    min_level: Severity::Info,
                }),
                file: None,
            },
        }
    }

    /// Open every configured sink.
    ///
    /// **Returns**
    /// - `Err(SinkError::Io)` if the log directory or file cannot be opened.
    pub fn build(&self) -> Result<Vec<Arc<dyn LogSink>>, SinkError> {
        let mut sinks: Vec<Arc<dyn LogSink>> = Vec::new();
        if let Some(console) = &self.console {
            sinks.push(Arc::new(ConsoleSink::stdout(console.format, console.min_level)));
        }
        if let Some(file) = &self.file {
            sinks.push(Arc::new(RotatingFileSink::open(file.clone())?));
        }
        Ok(sinks)
    }
}

/// Error type returned when reading configuration from the environment.
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("{key}: expected a boolean, got `{value}`")]
    InvalidBool { key: &'static str, value: String },

    #[error(transparent)]
    InvalidLevel(#[from] ParseSeverityError),

    #[error(transparent)]
    InvalidFormat(#[from] ParseFormatError),
}

/// Full logging configuration: profile, sinks, routing of native records.
///
/// **Fields**
/// - `native_default`: minimum severity for native records whose target
///   has no entry in `routes`.
/// - `routes`: per-target minimum severities, most specific target wins.
/// - `crash_hook`: whether `init_logging` installs the panic hook.
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub profile: Profile,
    pub sinks: SinkConfig,
    pub native_default: Severity,
    pub routes: Vec<(String, Severity)>,
    pub crash_hook: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self::for_profile(Profile::Development, env::DEFAULT_LOG_DIR)
    }
}

/// Request logs at INFO, request failures at ERROR only, task runner at INFO.
///
/// Route targets match by plain prefix, so the task runner is routed on
/// `worker::` and `worker.` to keep targets such as `workers::x` on the
/// default level.
pub fn default_routes() -> Vec<(String, Severity)> {
    vec![
        ("http::server".to_string(), Severity::Info),
        ("http::request".to_string(), Severity::Error),
        ("worker::".to_string(), Severity::Info),
        ("worker.".to_string(), Severity::Info),
    ]
}

impl LoggingConfig {
    pub fn for_profile(profile: Profile, log_dir: impl Into<PathBuf>) -> Self {
        Self {
            profile,
            sinks: SinkConfig::for_profile(profile, log_dir),
            native_default: Severity::Info,
            routes: default_routes(),
            crash_hook: true,
        }
    }

    /// Build the configuration from process environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(env::env_opt)
    }

    /// Build the configuration from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let read_bool = |key: &'static str| -> Result<Option<bool>, ConfigError> {
            lookup(key)
                .map(|value| {
                    parse_bool(&value).ok_or(ConfigError::InvalidBool { key, value })
                })
                .transpose()
        };

        let debug = read_bool(env::DEBUG_ENV)?.unwrap_or(true);
        let profile = Profile::from_debug(debug);
        let log_dir = lookup(env::LOG_DIR_ENV).unwrap_or_else(|| env::DEFAULT_LOG_DIR.to_string());
        let mut config = Self::for_profile(profile, &log_dir);

        if let Some(level) = lookup(env::LOG_LEVEL_ENV) {
            let level: Severity = level.trim().parse()?;
            config.set_min_level(level);
        }

        if let Some(format) = lookup(env::LOG_FORMAT_ENV) {
            let format: LineFormat = format.trim().parse()?;
            if let Some(console) = config.sinks.console.as_mut() {
                console.format = match format {
                    LineFormat::Pretty { .. } => LineFormat::Pretty {
                        colored: profile.is_debug(),
                    },
                    LineFormat::Json => LineFormat::Json,
                };
            }
            if let Some(file) = config.sinks.file.as_mut() {
                file.format = format;
            }
        }

        if let Some(colored) = read_bool(env::LOG_COLOR_ENV)? {
            if let Some(ConsoleConfig {
                format: LineFormat::Pretty { colored: c },
                ..
            }) = config.sinks.console.as_mut()
            {
                *c = colored;
            }
        }

        match read_bool(env::LOG_TO_FILE_ENV)? {
            Some(false) => config.sinks.file = None,
            Some(true) if config.sinks.file.is_none() => {
                let mut file = FileSinkConfig::new(&log_dir);
                file.min_level = config.native_default;
                config.sinks.file = Some(file);
            }
            _ => {}
        }

        Ok(config)
    }

    /// Apply one minimum severity to every sink and to unrouted native records.
    pub fn set_min_level(&mut self, level: Severity) {
        self.native_default = level;
        if let Some(console) = self.sinks.console.as_mut() {
            console.min_level = level;
        }
        if let Some(file) = self.sinks.file.as_mut() {
            file.min_level = level;
        }
    }
}
