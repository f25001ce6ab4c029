use std::fmt;
use std::str::FromStr;

/// The five recognized severities, ordered by increasing importance.
///
/// Names are matched case-sensitively in uppercase, exactly as they are
/// rendered: `DEBUG`, `INFO`, `WARNING`, `ERROR`, `CRITICAL`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    Debug,
    Info,
    Warning,
    Error,
    Critical,
}

impl Severity {
    pub const ALL: [Severity; 5] = [
        Severity::Debug,
        Severity::Info,
        Severity::Warning,
        Severity::Error,
        Severity::Critical,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Debug => "DEBUG",
            Severity::Info => "INFO",
            Severity::Warning => "WARNING",
            Severity::Error => "ERROR",
            Severity::Critical => "CRITICAL",
        }
    }

    /// Numeric weight used to compare named and numeric levels.
    pub fn numeric(&self) -> u8 {
        match self {
            Severity::Debug => 10,
            Severity::Info => 20,
            Severity::Warning => 30,
            Severity::Error => 40,
            Severity::Critical => 50,
        }
    }

    /// Most verbose `tracing` level that still reaches this severity.
    pub fn level_filter(&self) -> tracing::level_filters::LevelFilter {
        use tracing::level_filters::LevelFilter;
        match self {
            Severity::Debug => LevelFilter::DEBUG,
            Severity::Info => LevelFilter::INFO,
            Severity::Warning => LevelFilter::WARN,
            Severity::Error | Severity::Critical => LevelFilter::ERROR,
        }
    }

    /// Map a `tracing` level onto a severity.
    ///
    /// `TRACE` has no counterpart and yields `None`; callers fall back to
    /// [`RecordLevel::Numeric`].
    pub fn from_tracing(level: &tracing::Level) -> Option<Self> {
        match *level {
            tracing::Level::ERROR => Some(Severity::Error),
            tracing::Level::WARN => Some(Severity::Warning),
            tracing::Level::INFO => Some(Severity::Info),
            tracing::Level::DEBUG => Some(Severity::Debug),
            tracing::Level::TRACE => None,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown severity `{0}` (expected DEBUG, INFO, WARNING, ERROR or CRITICAL)")]
pub struct ParseSeverityError(pub String);

impl FromStr for Severity {
    type Err = ParseSeverityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Severity::ALL
            .into_iter()
            .find(|sev| sev.as_str() == s)
            .ok_or_else(|| ParseSeverityError(s.to_string()))
    }
}

/// Level attached to an emitted line.
///
/// Native records whose level has no name among the five severities keep
/// their numeric weight instead of being dropped or coerced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordLevel {
    Named(Severity),
    Numeric(u8),
}

/// Numeric weight given to `tracing`'s `TRACE` level.
pub const TRACE_LEVEL_NO: u8 = 5;

impl RecordLevel {
    pub fn numeric(&self) -> u8 {
        match self {
            RecordLevel::Named(sev) => sev.numeric(),
            RecordLevel::Numeric(n) => *n,
        }
    }

    pub fn from_tracing(level: &tracing::Level) -> Self {
        match Severity::from_tracing(level) {
            Some(sev) => RecordLevel::Named(sev),
            None => RecordLevel::Numeric(TRACE_LEVEL_NO),
        }
    }

    /// Whether this level is at least as important as `min`.
    pub fn at_least(&self, min: Severity) -> bool {
        self.numeric() >= min.numeric()
    }
}

impl From<Severity> for RecordLevel {
    fn from(sev: Severity) -> Self {
        RecordLevel::Named(sev)
    }
}

impl fmt::Display for RecordLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordLevel::Named(sev) => fmt::Display::fmt(sev, f),
            RecordLevel::Numeric(n) => f.pad(&format!("Level {n}")),
        }
    }
}
