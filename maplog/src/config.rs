// Copyright 2021 Twitter, Inc.
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

use crate::*;
use core::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use core::time::Duration;
use logbuf::{Codec, Plain};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Extension of every log file.
pub const LOG_EXT: &str = "xlog";

/// Default capacity of each appender's buffer.
pub const BLOCK_SIZE: usize = 150 * 1024;

/// Default, and upper bound of the default, age after which log files are
/// removed by the retention sweep.
pub const MAX_ALIVE: Duration = Duration::from_secs(10 * 24 * 60 * 60);

/// Retention durations shorter than this are ignored.
pub const MIN_ALIVE: Duration = Duration::from_secs(24 * 60 * 60);

const FLUSH_INTERVAL: Duration = Duration::from_secs(15 * 60);
const CLEANUP_DELAY: Duration = Duration::from_secs(2 * 60);
const PROMOTE_DELAY: Duration = Duration::from_secs(3 * 60);
const CACHE_SPACE_THRESHOLD: u64 = 1024 * 1024 * 1024;

/// How appended records reach the disk.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum Mode {
    /// Records are staged in the buffer and written by the flush scheduler.
    Async = 0,
    /// Records are written before `append` returns.
    Sync = 1,
}

impl Mode {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Sync,
            _ => Self::Async,
        }
    }
}

/// Configuration of an `Engine`, fixed when the engine is opened. Values
/// which may change at runtime seed the engine's settings.
#[derive(Clone)]
pub struct Config {
    pub(crate) mode: Mode,
    pub(crate) log_dir: PathBuf,
    pub(crate) cache_dir: Option<PathBuf>,
    pub(crate) prefix: String,
    pub(crate) cache_days: u32,
    pub(crate) head_info: String,
    pub(crate) codec: Arc<dyn Codec>,
    pub(crate) block_size: usize,
    pub(crate) use_mmap: bool,
    pub(crate) flush_interval: Duration,
    pub(crate) cleanup_delay: Option<Duration>,
    pub(crate) promote_delay: Option<Duration>,
    pub(crate) cache_space_threshold: u64,
    pub(crate) console: Arc<dyn Console>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) console_log: bool,
    pub(crate) max_file_size: u64,
    pub(crate) max_alive: Duration,
    pub(crate) level: SeverityKey,
}

impl Config {
    /// Start building a configuration which writes files named with `prefix`
    /// into `log_dir`.
    pub fn builder<P: Into<PathBuf>, S: Into<String>>(log_dir: P, prefix: S) -> Builder {
        Builder {
            config: Config {
                mode: Mode::Async,
                log_dir: log_dir.into(),
                cache_dir: None,
                prefix: prefix.into(),
                cache_days: 0,
                head_info: String::new(),
                codec: Arc::new(Plain),
                block_size: BLOCK_SIZE,
                use_mmap: true,
                flush_interval: FLUSH_INTERVAL,
                cleanup_delay: Some(CLEANUP_DELAY),
                promote_delay: Some(PROMOTE_DELAY),
                cache_space_threshold: CACHE_SPACE_THRESHOLD,
                console: Arc::new(Stderr),
                clock: Arc::new(SystemClock),
                console_log: cfg!(debug_assertions),
                max_file_size: 0,
                max_alive: MAX_ALIVE,
                level: SeverityKey::DEFAULT,
            },
        }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn log_dir(&self) -> &Path {
        &self.log_dir
    }

    pub fn cache_dir(&self) -> Option<&Path> {
        self.cache_dir.as_deref()
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn cache_days(&self) -> u32 {
        self.cache_days
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Path of the mapped buffer file for `key`. Buffers live in the cache
    /// directory when there is one.
    pub(crate) fn mmap_path(&self, key: SeverityKey) -> PathBuf {
        let dir = self.cache_dir.as_deref().unwrap_or(&self.log_dir);
        dir.join(format!("{}.mmap{}", self.prefix, key))
    }

    pub(crate) fn console(&self) -> &dyn Console {
        &*self.console
    }

    pub(crate) fn clock(&self) -> &dyn Clock {
        &*self.clock
    }
}

/// Builds a `Config`.
pub struct Builder {
    config: Config,
}

impl Builder {
    /// Initial write mode. Defaults to `Mode::Async`.
    pub fn mode(mut self, mode: Mode) -> Self {
        self.config.mode = mode;
        self
    }

    /// Stage files in `dir` while the log directory is not preferred. A cache
    /// directory equal to the log directory is ignored.
    pub fn cache_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.config.cache_dir = Some(dir.into());
        self
    }

    /// Number of days a file stays in the cache directory before it is
    /// promoted. Zero disables writing new files to the cache directory, which
    /// is then only used as a fallback.
    pub fn cache_days(mut self, days: u32) -> Self {
        self.config.cache_days = days;
        self
    }

    /// Plaintext line written at the start of every new file.
    pub fn head_info<S: Into<String>>(mut self, text: S) -> Self {
        self.config.head_info = text.into();
        self
    }

    /// Codec applied to every record before it is staged. The codec carries
    /// any encryption key. Defaults to `Plain`.
    pub fn codec(mut self, codec: Arc<dyn Codec>) -> Self {
        self.config.codec = codec;
        self
    }

    /// Capacity in bytes of each appender's buffer.
    pub fn block_size(mut self, bytes: usize) -> Self {
        self.config.block_size = bytes;
        self
    }

    /// Back buffers with memory-mapped files. Enabled by default. When
    /// disabled, or when mapping fails, buffers use heap memory and do not
    /// survive a crash.
    pub fn use_mmap(mut self, enabled: bool) -> Self {
        self.config.use_mmap = enabled;
        self
    }

    /// Longest time the flush scheduler sleeps between drains.
    pub fn flush_interval(mut self, interval: Duration) -> Self {
        self.config.flush_interval = interval;
        self
    }

    /// Delay before the initial retention sweep. `None` disables it.
    pub fn cleanup_delay(mut self, delay: Option<Duration>) -> Self {
        self.config.cleanup_delay = delay;
        self
    }

    /// Delay before cache files are promoted. `None` disables it.
    pub fn promote_delay(mut self, delay: Option<Duration>) -> Self {
        self.config.promote_delay = delay;
        self
    }

    /// Available space the cache volume must have before new files are
    /// written there.
    pub fn cache_space_threshold(mut self, bytes: u64) -> Self {
        self.config.cache_space_threshold = bytes;
        self
    }

    /// Destination of console echo and console-only diagnostics.
    pub fn console(mut self, console: Arc<dyn Console>) -> Self {
        self.config.console = console;
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.config.clock = clock;
        self
    }

    /// Echo every record to the console. Enabled by default in debug builds.
    pub fn console_log(mut self, enabled: bool) -> Self {
        self.config.console_log = enabled;
        self
    }

    /// Size in bytes after which a new indexed file is started within the same
    /// hour. Zero disables splitting.
    pub fn max_file_size(mut self, bytes: u64) -> Self {
        self.config.max_file_size = bytes;
        self
    }

    /// Age after which files are removed by the retention sweep. Values below
    /// `MIN_ALIVE` are ignored.
    pub fn max_alive(mut self, duration: Duration) -> Self {
        if duration >= MIN_ALIVE {
            self.config.max_alive = duration;
        }
        self
    }

    /// Records with a lower key are ignored.
    pub fn level(mut self, level: SeverityKey) -> Self {
        self.config.level = level;
        self
    }

    /// Consumes the `Builder` and returns a `Config`.
    pub fn build(mut self) -> Result<Config, Error> {
        if self.config.log_dir.as_os_str().is_empty() {
            return Err(Error::Config("log directory is required"));
        }
        if self.config.prefix.is_empty() {
            return Err(Error::Config("file name prefix is required"));
        }
        if self.config.block_size == 0 {
            return Err(Error::Config("block size must be non-zero"));
        }
        if self.config.cache_dir.as_deref() == Some(self.config.log_dir.as_path()) {
            self.config.cache_dir = None;
        }
        Ok(self.config)
    }
}

/// The knobs which can change while the engine runs.
pub(crate) struct Settings {
    mode: AtomicU8,
    console_log: AtomicBool,
    max_file_size: AtomicU64,
    max_alive: AtomicU64,
    level: AtomicU8,
}

impl Settings {
    pub fn new(config: &Config) -> Self {
        Self {
            mode: AtomicU8::new(config.mode as u8),
            console_log: AtomicBool::new(config.console_log),
            max_file_size: AtomicU64::new(config.max_file_size),
            max_alive: AtomicU64::new(config.max_alive.as_secs()),
            level: AtomicU8::new(config.level.get()),
        }
    }

    pub fn mode(&self) -> Mode {
        Mode::from_u8(self.mode.load(Ordering::Relaxed))
    }

    pub fn set_mode(&self, mode: Mode) {
        self.mode.store(mode as u8, Ordering::Relaxed);
    }

    pub fn console_log(&self) -> bool {
        self.console_log.load(Ordering::Relaxed)
    }

    pub fn set_console_log(&self, enabled: bool) {
        self.console_log.store(enabled, Ordering::Relaxed);
    }

    pub fn max_file_size(&self) -> u64 {
        self.max_file_size.load(Ordering::Relaxed)
    }

    pub fn set_max_file_size(&self, bytes: u64) {
        self.max_file_size.store(bytes, Ordering::Relaxed);
    }

    /// Retention age in seconds.
    pub fn max_alive(&self) -> u64 {
        self.max_alive.load(Ordering::Relaxed)
    }

    /// Returns `false` and leaves the setting unchanged if `secs` is below the
    /// one day floor.
    pub fn set_max_alive(&self, secs: u64) -> bool {
        if secs < MIN_ALIVE.as_secs() {
            return false;
        }
        self.max_alive.store(secs, Ordering::Relaxed);
        true
    }

    pub fn level(&self) -> SeverityKey {
        SeverityKey::new(self.level.load(Ordering::Relaxed))
    }

    pub fn set_level(&self, level: SeverityKey) {
        self.level.store(level.get(), Ordering::Relaxed);
    }
}
