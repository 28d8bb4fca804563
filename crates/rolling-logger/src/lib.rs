//! Rolling Logger
//!
//! A `tracing-subscriber` fmt layer that writes to a size-rotated log file
//! and keeps the most recent lines in a circular buffer, so a client can show
//! its own log without touching the filesystem.

use std::collections::VecDeque;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};

use tracing_subscriber::fmt::MakeWriter;

/// Rotate once the active file grows past this many bytes
pub const DEFAULT_MAX_BYTES: u64 = 1024 * 1024;
/// Rotated files kept next to the active one (`name.log.1` .. `name.log.N`)
pub const DEFAULT_MAX_FILES: usize = 3;
/// Lines kept in memory for `recent_logs`
pub const DEFAULT_RING_CAPACITY: usize = 500;

static LOGGER: OnceLock<Arc<Mutex<RollingFile>>> = OnceLock::new();

/// Logger errors
#[derive(Debug)]
pub enum LoggerError {
    Io(io::Error),
    AlreadyInitialized,
    NotInitialized,
}

impl std::fmt::Display for LoggerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoggerError::Io(e) => write!(f, "Log file error: {}", e),
            LoggerError::AlreadyInitialized => write!(f, "Logger already initialized"),
            LoggerError::NotInitialized => write!(f, "Logger not initialized"),
        }
    }
}

impl std::error::Error for LoggerError {}

impl From<io::Error> for LoggerError {
    fn from(e: io::Error) -> Self {
        LoggerError::Io(e)
    }
}

/// Rotation and buffer limits
#[derive(Debug, Clone)]
pub struct LoggerConfig {
    pub max_bytes: u64,
    pub max_files: usize,
    pub ring_capacity: usize,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            max_bytes: DEFAULT_MAX_BYTES,
            max_files: DEFAULT_MAX_FILES,
            ring_capacity: DEFAULT_RING_CAPACITY,
        }
    }
}

/// The active log file plus its in-memory tail
pub struct RollingFile {
    path: PathBuf,
    file: File,
    written: u64,
    config: LoggerConfig,
    ring: VecDeque<String>,
}

impl RollingFile {
    /// Open (or create) `<dir>/<app_name>.log` in append mode
    pub fn open(dir: &Path, app_name: &str, config: LoggerConfig) -> io::Result<Self> {
        fs::create_dir_all(dir)?;
        let path = dir.join(format!("{}.log", app_name));
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let written = file.metadata().map(|m| m.len()).unwrap_or(0);
        Ok(Self {
            path,
            file,
            written,
            ring: VecDeque::with_capacity(config.ring_capacity.min(1024)),
            config,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append a chunk of formatted output, rotating first if it would overflow
    pub fn append(&mut self, buf: &[u8]) -> io::Result<()> {
        if self.written > 0 && self.written + buf.len() as u64 > self.config.max_bytes {
            self.rotate()?;
        }
        self.file.write_all(buf)?;
        self.written += buf.len() as u64;

        for line in String::from_utf8_lossy(buf).lines() {
            if line.is_empty() {
                continue;
            }
            if self.ring.len() == self.config.ring_capacity {
                self.ring.pop_front();
            }
            if self.config.ring_capacity > 0 {
                self.ring.push_back(line.to_string());
            }
        }
        Ok(())
    }

    /// Last `n` lines, oldest first
    pub fn recent(&self, n: usize) -> Vec<String> {
        let skip = self.ring.len().saturating_sub(n);
        self.ring.iter().skip(skip).cloned().collect()
    }

    fn rotated_path(&self, index: usize) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(format!(".{}", index));
        PathBuf::from(name)
    }

    fn rotate(&mut self) -> io::Result<()> {
        self.file.flush()?;
        if self.config.max_files == 0 {
            self.file = OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(&self.path)?;
            self.written = 0;
            return Ok(());
        }

        let oldest = self.rotated_path(self.config.max_files);
        if oldest.exists() {
            fs::remove_file(&oldest)?;
        }
        for index in (1..self.config.max_files).rev() {
            let from = self.rotated_path(index);
            if from.exists() {
                fs::rename(&from, self.rotated_path(index + 1))?;
            }
        }
        fs::rename(&self.path, self.rotated_path(1))?;

        self.file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        self.written = 0;
        Ok(())
    }
}

fn lock(file: &Mutex<RollingFile>) -> MutexGuard<'_, RollingFile> {
    file.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// `MakeWriter` handing out handles to the shared rolling file
#[derive(Clone)]
pub struct RollingWriter {
    inner: Arc<Mutex<RollingFile>>,
}

impl RollingWriter {
    pub fn new(file: RollingFile) -> Self {
        Self { inner: Arc::new(Mutex::new(file)) }
    }

    pub fn recent(&self, n: usize) -> Vec<String> {
        lock(&self.inner).recent(n)
    }
}

/// One write handle; fmt formats an event into a buffer and writes it once
pub struct RollingHandle {
    inner: Arc<Mutex<RollingFile>>,
}

impl Write for RollingHandle {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        lock(&self.inner).append(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        lock(&self.inner).file.flush()
    }
}

impl<'a> MakeWriter<'a> for RollingWriter {
    type Writer = RollingHandle;

    fn make_writer(&'a self) -> Self::Writer {
        RollingHandle { inner: self.inner.clone() }
    }
}

/// Install the global subscriber writing to `<log_dir>/<app_name>.log`
pub fn init_logger(log_dir: PathBuf, app_name: &str) -> Result<(), LoggerError> {
    init_logger_with(log_dir, app_name, LoggerConfig::default())
}

pub fn init_logger_with(
    log_dir: PathBuf,
    app_name: &str,
    config: LoggerConfig,
) -> Result<(), LoggerError> {
    if LOGGER.get().is_some() {
        return Err(LoggerError::AlreadyInitialized);
    }

    let writer = RollingWriter::new(RollingFile::open(&log_dir, app_name, config)?);
    tracing_subscriber::fmt()
        .with_writer(writer.clone())
        .with_ansi(false)
        .with_target(true)
        .with_max_level(tracing::Level::INFO)
        .try_init()
        .map_err(|_| LoggerError::AlreadyInitialized)?;

    LOGGER
        .set(writer.inner.clone())
        .map_err(|_| LoggerError::AlreadyInitialized)?;

    log::info!(
        "[{}] logger started for {}",
        chrono::Local::now().format("%H:%M:%S%.3f"),
        app_name
    );
    Ok(())
}

/// Last `n` lines written through the global logger
pub fn recent_logs(n: usize) -> Vec<String> {
    LOGGER.get().map(|file| lock(file).recent(n)).unwrap_or_default()
}

pub fn info(msg: &str) -> Result<(), LoggerError> {
    LOGGER.get().ok_or(LoggerError::NotInitialized)?;
    tracing::info!("{}", msg);
    Ok(())
}

pub fn warn(msg: &str) -> Result<(), LoggerError> {
    LOGGER.get().ok_or(LoggerError::NotInitialized)?;
    tracing::warn!("{}", msg);
    Ok(())
}

pub fn error(msg: &str) -> Result<(), LoggerError> {
    LOGGER.get().ok_or(LoggerError::NotInitialized)?;
    tracing::error!("{}", msg);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_config() -> LoggerConfig {
        LoggerConfig {
            max_bytes: 64,
            max_files: 2,
            ring_capacity: 3,
        }
    }

    #[test]
    fn test_ring_keeps_latest_lines() {
        let dir = tempfile::tempdir().unwrap();
        let mut file = RollingFile::open(dir.path(), "app", small_config()).unwrap();

        for i in 0..5 {
            file.append(format!("line {}\n", i).as_bytes()).unwrap();
        }

        assert_eq!(file.recent(10), vec!["line 2", "line 3", "line 4"]);
        assert_eq!(file.recent(1), vec!["line 4"]);
    }

    #[test]
    fn test_rotation_keeps_bounded_file_count() {
        let dir = tempfile::tempdir().unwrap();
        let mut file = RollingFile::open(dir.path(), "app", small_config()).unwrap();

        let chunk = "x".repeat(40) + "\n";
        for _ in 0..6 {
            file.append(chunk.as_bytes()).unwrap();
        }

        assert!(dir.path().join("app.log").exists());
        assert!(dir.path().join("app.log.1").exists());
        assert!(dir.path().join("app.log.2").exists());
        assert!(!dir.path().join("app.log.3").exists());

        let active = fs::metadata(file.path()).unwrap().len();
        assert!(active <= 64);
    }

    #[test]
    fn test_helpers_require_init() {
        if LOGGER.get().is_none() {
            assert!(matches!(info("hello"), Err(LoggerError::NotInitialized)));
        }
    }
}
