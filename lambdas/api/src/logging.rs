//! Process-wide logging.
//!
//! Records go to two JSON-lines files under the log directory: `combined.log`
//! at the configured level and `error.log` for errors only. Outside
//! production a coloured console layer is added as well. Files are rotated by
//! size.

use std::{
    fs::{self, File, OpenOptions},
    io::{self, Write},
    path::{Path, PathBuf},
    sync::Mutex,
};

use anyhow::Context;
use tracing::Subscriber;
use tracing_subscriber::{
    filter::LevelFilter,
    fmt::{self, format::Writer, time::FormatTime},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer,
};

use crate::config::Config;

pub const MAX_FILE_BYTES: u64 = 5 * 1024 * 1024;
pub const MAX_FILES: usize = 5;

/// `YYYY-MM-DD HH:MM:SS` in local time.
#[derive(Clone, Copy, Debug, Default)]
pub struct LocalTimestamp;

impl FormatTime for LocalTimestamp {
    fn format_time(&self, w: &mut Writer<'_>) -> std::fmt::Result {
        write!(w, "{}", chrono::Local::now().format("%Y-%m-%d %H:%M:%S"))
    }
}

/// Append-only log file that rolls over once it would exceed `max_bytes`.
///
/// Keeps at most `max_files` files: the live one plus `path.1` (newest) up
/// to `path.{max_files - 1}` (oldest).
#[derive(Debug)]
pub struct RollingFile {
    path: PathBuf,
    max_bytes: u64,
    max_files: usize,
    file: File,
    written: u64,
}

impl RollingFile {
    pub fn open(path: impl Into<PathBuf>, max_bytes: u64, max_files: usize) -> io::Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let written = file.metadata()?.len();

        Ok(Self {
            path,
            max_bytes,
            max_files: max_files.max(1),
            file,
            written,
        })
    }

    fn rotated(&self, index: usize) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(format!(".{index}"));
        PathBuf::from(name)
    }

    fn rotate(&mut self) -> io::Result<()> {
        self.file.flush()?;

        if self.max_files > 1 {
            for index in (1..self.max_files - 1).rev() {
                rename_if_exists(&self.rotated(index), &self.rotated(index + 1))?;
            }
            rename_if_exists(&self.path, &self.rotated(1))?;
        }

        self.file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&self.path)?;
        self.written = 0;
        Ok(())
    }
}

fn rename_if_exists(from: &Path, to: &Path) -> io::Result<()> {
    match fs::rename(from, to) {
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}

impl Write for RollingFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.written > 0 && self.written + buf.len() as u64 > self.max_bytes {
            self.rotate()?;
        }
        let n = self.file.write(buf)?;
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

fn open_log(dir: &Path, name: &str) -> anyhow::Result<Mutex<RollingFile>> {
    let path = dir.join(name);
    let file = RollingFile::open(&path, MAX_FILE_BYTES, MAX_FILES)
        .with_context(|| format!("Failed to open log file {}", path.display()))?;
    Ok(Mutex::new(file))
}

fn level_filter(config: &Config) -> anyhow::Result<EnvFilter> {
    EnvFilter::try_new(&config.log_level)
        .with_context(|| format!("Invalid LOG_LEVEL: {}", config.log_level))
}

/// Builds the subscriber described by `config` without installing it.
pub fn subscriber(config: &Config) -> anyhow::Result<impl Subscriber + Send + Sync + 'static> {
    let combined = fmt::layer()
        .json()
        .with_current_span(true)
        .with_timer(LocalTimestamp)
        .with_writer(open_log(&config.log_dir, "combined.log")?)
        .with_filter(level_filter(config)?);

    let errors = fmt::layer()
        .json()
        .with_current_span(true)
        .with_timer(LocalTimestamp)
        .with_writer(open_log(&config.log_dir, "error.log")?)
        .with_filter(LevelFilter::ERROR);

    let console = if config.environment.is_production() {
        None
    } else {
        Some(
            fmt::layer()
                .with_timer(LocalTimestamp)
                .with_target(false)
                .with_filter(level_filter(config)?),
        )
    };

    Ok(tracing_subscriber::registry()
        .with(combined)
        .with(errors)
        .with(console))
}

/// Installs the process-wide subscriber. Call once, from the composition root.
pub fn init(config: &Config) -> anyhow::Result<()> {
    subscriber(config)?
        .try_init()
        .context("Failed to install the log subscriber")
}
