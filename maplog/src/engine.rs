// Copyright 2021 Twitter, Inc.
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

use crate::clock::unix_secs;
use crate::config::Settings;
use crate::naming::Rotation;
use crate::reentrancy::{self, Admission};
use crate::registry::Registry;
use crate::scheduler::{Scheduler, Signal};
use crate::stats::Counters;
use crate::{promote, retention, *};
use clocksource::precise::{Instant, UnixInstant};
use core::sync::atomic::{AtomicBool, Ordering};
use core::time::Duration;
use log::{debug, warn};
use parking_lot::Mutex;
use std::fs;
use std::path::Path;
use std::sync::{Arc, Weak};
use std::thread;

const SECS_PER_DAY: u64 = 24 * 60 * 60;

/// State shared by every appender of an engine.
pub(crate) struct Context {
    pub config: Config,
    pub settings: Settings,
    pub stats: Counters,
    /// Serializes every open, write, rotation scan and promotion.
    pub file_lock: Mutex<()>,
    pub signal: Signal,
}

impl Context {
    pub fn new(config: Config) -> Self {
        Self {
            settings: Settings::new(&config),
            config,
            stats: Counters::default(),
            file_lock: Mutex::new(()),
            signal: Signal::default(),
        }
    }

    pub fn mode(&self) -> Mode {
        self.settings.mode()
    }

    /// Wall clock seconds since the unix epoch.
    pub fn now(&self) -> u64 {
        unix_secs(self.config.clock().now())
    }

    pub fn rotation(&self) -> Rotation<'_> {
        Rotation {
            log_dir: &self.config.log_dir,
            cache_dir: self.config.cache_dir.as_deref(),
            prefix: &self.config.prefix,
            max_file_size: self.settings.max_file_size(),
        }
    }

    /// Report a problem on the console only. Returns the recursion
    /// diagnostic raised by the console if this is the outermost call on the
    /// thread, for the caller to persist once it holds no locks.
    #[must_use]
    pub fn tip(&self, message: &str) -> Option<String> {
        // appends made by the console from here are nested
        let entry = reentrancy::enter();
        warn!("{}", message);
        self.config.console().write(message);
        entry.take_pending()
    }
}

pub(crate) struct Core {
    pub ctx: Context,
    pub registry: Registry,
    pub scheduler: Scheduler,
    closing: AtomicBool,
}

impl Core {
    /// Drain every appender once. Returns `false` if the flush worker should
    /// stop.
    pub fn drain_all(&self) -> bool {
        let (appenders, closed) = self.registry.snapshot();
        let mut ok = !closed;
        for appender in appenders {
            if !appender.flush_to_disk(&self.ctx) {
                ok = false;
            }
        }
        ok
    }

    fn promote_cache(&self) -> usize {
        let cache_dir = match self.ctx.config.cache_dir.as_deref() {
            Some(dir) => dir,
            None => return 0,
        };
        let _files = self.ctx.file_lock.lock();
        let residency = self.ctx.config.cache_days as u64 * SECS_PER_DAY;
        match promote::promote(
            cache_dir,
            &self.ctx.config.log_dir,
            &self.ctx.config.prefix,
            residency,
            self.ctx.now(),
        ) {
            Ok(moved) => {
                self.ctx.stats.promoted(moved as u64);
                moved
            }
            Err(e) => {
                self.ctx.stats.io_errors(1);
                warn!("cache promotion failed: {}", e);
                0
            }
        }
    }

    fn sweep_expired(&self) -> usize {
        let max_age = self.ctx.settings.max_alive();
        let now = self.ctx.now();
        let mut removed = retention::sweep(&self.ctx.config.log_dir, max_age, now);
        if let Some(cache_dir) = self.ctx.config.cache_dir.as_deref() {
            removed += retention::sweep(cache_dir, max_age, now);
        }
        self.ctx.stats.swept(removed as u64);
        removed
    }
}

/// A log persistence engine.
///
/// Records are appended under a `SeverityKey`. Each key has its own buffer,
/// backed by a memory-mapped file when possible, and its own set of files in
/// the log directory. In `Mode::Async` a background worker drains the buffers
/// every `flush_interval`, or sooner when a buffer fills up. In `Mode::Sync`
/// every record is written before `append` returns.
///
/// Failures on the append path are never reported to the caller. They are
/// printed on the console and counted in `stats`.
///
/// ```no_run
/// use maplog::{Config, Engine, Mode};
///
/// let config = Config::builder("/var/log/app", "app")
///     .mode(Mode::Async)
///     .head_info("app 1.0.0")
///     .build()
///     .unwrap();
/// let engine = Engine::open(config).unwrap();
/// engine.append(2, b"hello\n");
/// engine.close();
/// ```
pub struct Engine {
    core: Arc<Core>,
}

impl Engine {
    /// Create the directories, start the timers and the flush worker, and
    /// write the startup diagnostics.
    pub fn open(config: Config) -> Result<Self, Error> {
        let started = Instant::now();

        create_dir(&config.log_dir)?;
        if let Some(cache_dir) = config.cache_dir.as_deref() {
            create_dir(cache_dir)?;
        }

        let mode = config.mode;
        let cleanup_delay = config.cleanup_delay;
        let promote_delay = config.promote_delay.filter(|_| config.cache_dir.is_some());

        let core = Arc::new(Core {
            ctx: Context::new(config),
            registry: Registry::new(),
            scheduler: Scheduler::default(),
            closing: AtomicBool::new(false),
        });

        if let Some(delay) = cleanup_delay {
            spawn_timer(&core, "maplog-sweep", delay, |core| {
                core.sweep_expired();
            });
        }
        if let Some(delay) = promote_delay {
            spawn_timer(&core, "maplog-promote", delay, |core| {
                core.promote_cache();
            });
        }

        let engine = Self { core };
        engine.set_mode(mode);

        let ctx = &engine.core.ctx;
        if let Some(appender) = engine.core.registry.get_or_create(SeverityKey::DEFAULT, ctx) {
            let elapsed = started.elapsed().as_nanos() / 1_000_000;
            appender.write_diagnostic(ctx, &format!("get mmap time: {}\n", elapsed));
            if let Some(cache_dir) = ctx.config.cache_dir.as_deref() {
                if let Some(info) = space_info("cache", cache_dir) {
                    appender.write_diagnostic(ctx, &info);
                }
            }
            if let Some(info) = space_info("log", &ctx.config.log_dir) {
                appender.write_diagnostic(ctx, &info);
            }
        }

        debug!("opened engine in {}", ctx.config.log_dir.display());
        Ok(engine)
    }

    /// Append `record` under `key`. Records are stored as the codec encodes
    /// them and should carry their own line terminator.
    pub fn append<K: Into<SeverityKey>>(&self, key: K, record: &[u8]) {
        let key = key.into();
        let ctx = &self.core.ctx;
        if key < ctx.settings.level() {
            return;
        }

        let entry = reentrancy::enter();
        match entry.admit(record) {
            Admission::Proceed => {}
            Admission::Diverted(text) => {
                ctx.stats.recursion_diverted(1);
                ctx.config.console().write(&text);
                return;
            }
            Admission::Dropped => {
                ctx.stats.recursion_dropped(1);
                return;
            }
        }

        let appender = match self.core.registry.get_or_create(key, ctx) {
            Some(appender) => appender,
            None => {
                ctx.stats.unavailable(1);
                return;
            }
        };

        if ctx.settings.console_log() {
            ctx.config.console().write(&String::from_utf8_lossy(record));
        }

        match ctx.mode() {
            Mode::Sync => appender.append_sync(ctx, record),
            Mode::Async => appender.append_async(ctx, record),
        }

        let pending = entry.take_pending();
        drop(entry);
        if let Some(text) = pending {
            appender.write_pending(ctx, &text);
        }
    }

    /// Write a plain text line to the file of `key` without buffering it.
    pub fn write_diagnostic<K: Into<SeverityKey>>(&self, key: K, text: &str) {
        let ctx = &self.core.ctx;
        if let Some(appender) = self.core.registry.get_or_create(key.into(), ctx) {
            appender.write_diagnostic(ctx, text);
        }
    }

    /// Wake the flush worker without waiting for it.
    pub fn flush(&self) {
        self.core.ctx.signal.notify();
    }

    /// Drain every buffer on the calling thread. Does nothing in
    /// `Mode::Sync`, where nothing is buffered.
    pub fn flush_sync(&self) {
        if self.mode() == Mode::Sync {
            return;
        }
        self.core.drain_all();
    }

    /// Stop the flush worker, drain every buffer a final time and release
    /// the appenders. Appends after `close` are dropped. Calling `close` more
    /// than once has no effect.
    pub fn close(&self) {
        if self.core.closing.swap(true, Ordering::AcqRel) {
            return;
        }
        self.core.scheduler.stop(&self.core);
        self.core.drain_all();
        self.core.registry.teardown(&self.core.ctx);
        debug!("closed engine");
    }

    pub fn set_mode(&self, mode: Mode) {
        self.core.ctx.settings.set_mode(mode);
        self.core.ctx.signal.notify();
        if mode == Mode::Async && !self.core.closing.load(Ordering::Acquire) {
            self.core.scheduler.ensure_running(&self.core);
        }
    }

    pub fn mode(&self) -> Mode {
        self.core.ctx.mode()
    }

    pub fn set_console_log(&self, enabled: bool) {
        self.core.ctx.settings.set_console_log(enabled);
    }

    /// Start a new indexed file within the hour once the current one exceeds
    /// `bytes`. Zero disables splitting.
    pub fn set_max_file_size(&self, bytes: u64) {
        self.core.ctx.settings.set_max_file_size(bytes);
    }

    /// Age in seconds after which files are removed by the retention sweep.
    /// Values below one day are ignored.
    pub fn set_max_alive_duration(&self, secs: u64) {
        if !self.core.ctx.settings.set_max_alive(secs) {
            debug!("ignoring retention of {}s", secs);
        }
    }

    /// Ignore appends whose key is lower than `level`.
    pub fn set_level<K: Into<SeverityKey>>(&self, level: K) {
        self.core.ctx.settings.set_level(level.into());
    }

    pub fn level(&self) -> SeverityKey {
        self.core.ctx.settings.level()
    }

    pub fn log_dir(&self) -> &Path {
        &self.core.ctx.config.log_dir
    }

    pub fn cache_dir(&self) -> Option<&Path> {
        self.core.ctx.config.cache_dir.as_deref()
    }

    pub(crate) fn now(&self) -> UnixInstant {
        self.core.ctx.config.clock().now()
    }

    pub fn stats(&self) -> Stats {
        self.core.ctx.stats.snapshot()
    }

    /// Move files which have spent `cache_days` in the cache directory to the
    /// log directory. Runs once on its own after `promote_delay`. Returns the
    /// number of files moved.
    pub fn promote_cache(&self) -> usize {
        self.core.promote_cache()
    }

    /// Remove expired files from the log and cache directories. Runs once on
    /// its own after `cleanup_delay`. Returns the number of entries removed.
    pub fn sweep_expired(&self) -> usize {
        self.core.sweep_expired()
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.close();
    }
}

fn create_dir(path: &Path) -> Result<(), Error> {
    fs::create_dir_all(path).map_err(|source| Error::CreateDirectory {
        path: path.to_path_buf(),
        source,
    })
}

fn space_info(name: &str, dir: &Path) -> Option<String> {
    let space = fs2::total_space(dir)
        .and_then(|capacity| Ok((capacity, fs2::free_space(dir)?, fs2::available_space(dir)?)));
    match space {
        Ok((capacity, free, available)) => Some(format!(
            "{} dir space info, capacity:{} free:{} available:{}\n",
            name, capacity, free, available
        )),
        Err(e) => {
            warn!("failed to read space of {}: {}", dir.display(), e);
            None
        }
    }
}

// Runs `task` once after `delay` unless the engine is gone by then.
fn spawn_timer<F>(core: &Arc<Core>, name: &str, delay: Duration, task: F)
where
    F: FnOnce(&Core) + Send + 'static,
{
    let weak: Weak<Core> = Arc::downgrade(core);
    let spawned = thread::Builder::new().name(name.to_string()).spawn(move || {
        thread::sleep(delay);
        if let Some(core) = weak.upgrade() {
            if !core.closing.load(Ordering::Acquire) {
                task(&core);
            }
        }
    });
    if let Err(e) = spawned {
        warn!("failed to start {} timer: {}", name, e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    // 2026-10-18T14:35:10Z
    const NOW: u64 = 1_792_334_110;

    fn config(dir: &Path) -> Builder {
        Config::builder(dir, "app")
            .clock(Arc::new(ManualClock::from_unix_secs(NOW)))
            .cleanup_delay(None)
            .promote_delay(None)
            .console_log(false)
    }

    #[test]
    fn open_creates_directories_and_banner() {
        let root = tempfile::tempdir().unwrap();
        let log_dir = root.path().join("a/b/logs");
        let engine = Engine::open(config(&log_dir).mode(Mode::Sync).build().unwrap()).unwrap();
        assert!(log_dir.is_dir());

        let contents = fs::read_to_string(log_dir.join("app_20261018140000.xlog")).unwrap();
        assert!(contents.contains("get mmap time: "));
        assert!(contents.contains("log dir space info, capacity:"));
        assert!(!contents.contains("cache dir space info"));
        engine.close();
    }

    #[test]
    fn open_reports_directory_errors() {
        let root = tempfile::tempdir().unwrap();
        let blocker = root.path().join("file");
        fs::write(&blocker, b"").unwrap();
        let result = Engine::open(config(&blocker.join("logs")).build().unwrap());
        assert!(matches!(result, Err(Error::CreateDirectory { .. })));
    }

    #[test]
    fn close_is_idempotent_and_final() {
        let dir = tempfile::tempdir().unwrap();
        let engine = Engine::open(config(dir.path()).build().unwrap()).unwrap();
        engine.append(1, b"kept\n");
        engine.close();
        engine.close();
        engine.append(1, b"dropped\n");

        let contents = fs::read_to_string(dir.path().join("app_20261018140001.xlog")).unwrap();
        assert!(contents.ends_with("kept\n"));
        assert_eq!(engine.stats().unavailable, 1);

        // the mapped buffers are cleared on close
        assert!(fs::read(dir.path().join("app.mmap1"))
            .unwrap()
            .iter()
            .all(|b| *b == 0));
    }

    #[test]
    fn runtime_settings() {
        let dir = tempfile::tempdir().unwrap();
        let engine = Engine::open(config(dir.path()).build().unwrap()).unwrap();
        assert_eq!(engine.mode(), Mode::Async);
        engine.set_mode(Mode::Sync);
        assert_eq!(engine.mode(), Mode::Sync);

        engine.set_level(3);
        assert_eq!(engine.level(), SeverityKey::new(3));
        engine.append(2, b"filtered\n");
        assert!(!dir.path().join("app_20261018140002.xlog").exists());
        engine.append(3, b"kept\n");
        assert!(dir.path().join("app_20261018140003.xlog").exists());

        engine.set_max_alive_duration(60);
        assert_eq!(engine.core.ctx.settings.max_alive(), MAX_ALIVE.as_secs());
        engine.set_max_alive_duration(2 * SECS_PER_DAY);
        assert_eq!(engine.core.ctx.settings.max_alive(), 2 * SECS_PER_DAY);

        assert_eq!(engine.log_dir(), dir.path());
        assert!(engine.cache_dir().is_none());
    }

    #[test]
    fn flush_sync_drains_buffers() {
        let dir = tempfile::tempdir().unwrap();
        let engine = Engine::open(config(dir.path()).mode(Mode::Sync).build().unwrap()).unwrap();
        // buffer without a flush worker
        engine.core.ctx.settings.set_mode(Mode::Async);

        engine.append(1, b"buffered\n");
        assert!(!dir.path().join("app_20261018140001.xlog").exists());
        engine.flush_sync();
        let contents = fs::read_to_string(dir.path().join("app_20261018140001.xlog")).unwrap();
        assert!(contents.ends_with("buffered\n"));
    }
}
