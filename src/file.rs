use chrono::{DateTime, Days, Local, NaiveDate, NaiveTime};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::format::LineFormat;
use crate::level::{RecordLevel, Severity};
use crate::record::LogRecord;
use crate::sink::{LogSink, SinkError};

/// Name of the active log file inside the log directory.
pub const DEFAULT_FILE_NAME: &str = "today.log";

/// Number of days rotated files are kept.
pub const DEFAULT_RETENTION_DAYS: u64 = 7;

const DATE_FORMAT: &str = "%Y-%m-%d";

/// What happens to a file once it has been rotated out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    None,
    #[cfg(feature = "gzip")]
    Gzip,
}

impl Default for Compression {
    fn default() -> Self {
        #[cfg(feature = "gzip")]
        {
            Compression::Gzip
        }
        #[cfg(not(feature = "gzip"))]
        {
            Compression::None
        }
    }
}

/// Configuration for [`RotatingFileSink`].
///
/// **Fields**
/// - `dir`: directory holding the active file and its archives; created on
///   open if missing.
/// - `file_name`: active file name, `today.log` by default.
/// - `retention_days`: archives dated more than this many days before the
///   current day are deleted on rotation.
/// - `compression`: applied to each rotated-out file.
#[derive(Debug, Clone)]
pub struct FileSinkConfig {
    pub dir: PathBuf,
    pub file_name: String,
    pub retention_days: u64,
    pub compression: Compression,
    pub format: LineFormat,
    pub min_level: Severity,
}

impl FileSinkConfig {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            file_name: DEFAULT_FILE_NAME.to_string(),
            retention_days: DEFAULT_RETENTION_DAYS,
            compression: Compression::default(),
            format: LineFormat::Pretty { colored: false },
            min_level: Severity::Info,
        }
    }

    pub fn active_path(&self) -> PathBuf {
        self.dir.join(&self.file_name)
    }

    fn stem_and_ext(&self) -> (&str, &str) {
        match self.file_name.rsplit_once('.') {
            Some((stem, ext)) if !stem.is_empty() => (stem, ext),
            _ => (self.file_name.as_str(), "log"),
        }
    }

    fn archive_path(&self, day: NaiveDate) -> PathBuf {
        let (stem, ext) = self.stem_and_ext();
        let date = day.format(DATE_FORMAT);
        let mut candidate = self.dir.join(format!("{stem}.{date}.{ext}"));
        let mut n = 1;
        while candidate.exists() || gz_path(&candidate).exists() {
            candidate = self.dir.join(format!("{stem}.{date}.{n}.{ext}"));
            n += 1;
        }
        candidate
    }

    /// Date encoded in an archive file name produced by this config.
    fn archive_date(&self, name: &str) -> Option<NaiveDate> {
        let (stem, _) = self.stem_and_ext();
        let rest = name.strip_prefix(stem)?.strip_prefix('.')?;
        let date = rest.get(..10)?;
        NaiveDate::parse_from_str(date, DATE_FORMAT).ok()
    }
}

struct FileState {
    file: Option<File>,
    opened_on: NaiveDate,
    next_rotation: DateTime<Local>,
}

/// File sink that rotates at local midnight.
///
/// The active file is always `<dir>/<file_name>`. At the first write on or
/// after midnight the active file is renamed to `<stem>.<date>.<ext>` (the
/// date it was opened on), optionally compressed, and archives older than the
/// retention window are removed. Every write is appended and flushed before
/// returning.
pub struct RotatingFileSink {
    config: FileSinkConfig,
    state: Mutex<FileState>,
}

impl RotatingFileSink {
    pub fn open(config: FileSinkConfig) -> Result<Self, SinkError> {
        Self::open_at(config, Local::now())
    }

    /// Open the sink as if the current time were `now`.
    ///
    /// An active file last modified before `now`'s day is rotated first, so
    /// a restart never appends to yesterday's file.
    pub fn open_at(config: FileSinkConfig, now: DateTime<Local>) -> Result<Self, SinkError> {
        fs::create_dir_all(&config.dir)?;
        let path = config.active_path();

        if let Ok(meta) = fs::metadata(&path) {
            let modified: DateTime<Local> = meta.modified()?.into();
            let day = modified.date_naive();
            if day < now.date_naive() {
                let archived = archive(&config, &path, day)?;
                housekeeping(&config, &archived, now.date_naive())?;
            }
        }

        let file = open_append(&path)?;
        Ok(Self {
            config,
            state: Mutex::new(FileState {
                file: Some(file),
                opened_on: now.date_naive(),
                next_rotation: next_midnight(now),
            }),
        })
    }

    fn write_at(&self, rendered: &str, now: DateTime<Local>) -> Result<(), SinkError> {
        let mut guard = self.state.lock().map_err(|_| SinkError::Poisoned)?;
        let state = &mut *guard;
        let path = self.config.active_path();

        let mut pending = Ok(());
        if now >= state.next_rotation {
            if let Some(file) = state.file.as_mut() {
                file.flush()?;
            }
            let archived = archive(&self.config, &path, state.opened_on)?;
            state.file = None;
            state.opened_on = now.date_naive();
            state.next_rotation = next_midnight(now);
            pending = housekeeping(&self.config, &archived, now.date_naive());
        }

        // absent after a rotation whose reopen failed
        let file = match state.file.take() {
            Some(file) => file,
            None => open_append(&path)?,
        };
        let file = state.file.insert(file);
        file.write_all(rendered.as_bytes())?;
        file.flush()?;
        pending
    }
}

impl LogSink for RotatingFileSink {
    fn write(&self, record: &LogRecord) -> Result<(), SinkError> {
        let rendered = self.config.format.render(record);
        self.write_at(&rendered, record.timestamp)
    }

    fn accepts(&self, level: RecordLevel) -> bool {
        level.at_least(self.config.min_level)
    }

    fn flush(&self) -> Result<(), SinkError> {
        let mut state = self.state.lock().map_err(|_| SinkError::Poisoned)?;
        if let Some(file) = state.file.as_mut() {
            file.flush()?;
        }
        Ok(())
    }
}

fn open_append(path: &Path) -> io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}

fn next_midnight(now: DateTime<Local>) -> DateTime<Local> {
    now.date_naive()
        .succ_opt()
        .and_then(|day| day.and_time(NaiveTime::MIN).and_local_timezone(Local).earliest())
        .unwrap_or_else(|| now + chrono::Duration::days(1))
}

fn gz_path(path: &Path) -> PathBuf {
    let mut os = path.as_os_str().to_owned();
    os.push(".gz");
    PathBuf::from(os)
}

/// Move the active file aside under its dated archive name.
fn archive(config: &FileSinkConfig, active: &Path, day: NaiveDate) -> io::Result<PathBuf> {
    let target = config.archive_path(day);
    fs::rename(active, &target)?;
    Ok(target)
}

fn housekeeping(config: &FileSinkConfig, archived: &Path, today: NaiveDate) -> Result<(), SinkError> {
    compress(config.compression, archived)?;
    prune(config, today)?;
    Ok(())
}

fn compress(compression: Compression, path: &Path) -> io::Result<()> {
    match compression {
        Compression::None => Ok(()),
        #[cfg(feature = "gzip")]
        Compression::Gzip => {
            use flate2::write::GzEncoder;

            let mut input = File::open(path)?;
            let output = File::create(gz_path(path))?;
            let mut encoder = GzEncoder::new(output, flate2::Compression::default());
            io::copy(&mut input, &mut encoder)?;
            encoder.finish()?;
            fs::remove_file(path)
        }
    }
}

/// Delete archives dated before `today - retention_days`.
fn prune(config: &FileSinkConfig, today: NaiveDate) -> io::Result<()> {
    let Some(cutoff) = today.checked_sub_days(Days::new(config.retention_days)) else {
        return Ok(());
    };

    for entry in fs::read_dir(&config.dir)? {
        let entry = entry?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        if name == config.file_name {
            continue;
        }
        if let Some(date) = config.archive_date(name) {
            if date < cutoff {
                fs::remove_file(entry.path())?;
            }
        }
    }
    Ok(())
}
