// Copyright 2021 Twitter, Inc.
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

use crate::engine::Context;
use crate::file::LogFile;
use crate::promote::append_file;
use crate::reentrancy;
use crate::*;
use clocksource::datetime::DateTime;
use log::{debug, warn};
use logbuf::LogBuffer;
use parking_lot::Mutex;
use std::fs;
use std::path::Path;

/// Stages and persists the records of one severity key.
pub(crate) struct LogAppender {
    key: SeverityKey,
    use_mmap: bool,
    buffer: Mutex<Option<LogBuffer>>,
    // held across take and persist so batches of this key stay ordered
    drain: Mutex<()>,
    file: Mutex<LogFile>,
}

impl LogAppender {
    pub fn new(key: SeverityKey, ctx: &Context) -> Self {
        let config = &ctx.config;
        let buffer = if config.use_mmap {
            LogBuffer::open(config.mmap_path(key), config.block_size, config.codec.clone())
        } else {
            LogBuffer::heap(config.block_size, config.codec.clone())
        };
        debug!(
            "created appender for key {} ({} buffer)",
            key,
            if buffer.is_mapped() { "mapped" } else { "heap" }
        );

        Self {
            key,
            use_mmap: buffer.is_mapped(),
            buffer: Mutex::new(Some(buffer)),
            drain: Mutex::new(()),
            file: Mutex::new(LogFile::new(key)),
        }
    }

    pub fn key(&self) -> SeverityKey {
        self.key
    }

    /// Persist whatever an earlier process left staged in the mapped buffer.
    pub fn recover(&self, ctx: &Context) {
        let staged = match self.buffer.lock().as_mut() {
            Some(buffer) => buffer.flush(),
            None => return,
        };
        if staged.is_empty() {
            return;
        }

        debug!("recovered {} bytes for key {}", staged.len(), self.key);
        self.write_diagnostic(ctx, "~~~~~ begin of mmap ~~~~~\n");
        self.write_diagnostic(
            ctx,
            &format!(
                "LogAppender Key [{}] use_mmap [{}]\n",
                self.key, self.use_mmap as u8
            ),
        );
        self.persist(ctx, &staged, false);
        self.write_diagnostic(ctx, &format!("{}\n", mark_info(ctx)));
        self.write_diagnostic(ctx, "~~~~~ end of mmap ~~~~~\n");
    }

    /// Encode and write `record` before returning.
    pub fn append_sync(&self, ctx: &Context, record: &[u8]) {
        let encoded = match self.buffer.lock().as_ref() {
            Some(buffer) => buffer.encode(record),
            None => {
                ctx.stats.unavailable(1);
                return;
            }
        };
        ctx.stats.appended(1);
        self.persist(ctx, &encoded, false);
    }

    /// Stage `record` in the buffer. Never touches the disk.
    pub fn append_async(&self, ctx: &Context, record: &[u8]) {
        let mut guard = self.buffer.lock();
        let buffer = match guard.as_mut() {
            Some(buffer) => buffer,
            None => {
                ctx.stats.unavailable(1);
                return;
            }
        };

        let capacity = buffer.capacity();
        if buffer.len() >= capacity * 4 / 5 {
            let warning = format!(
                "[F][ buffer length >= capacity*4/5, len: {}\n",
                buffer.len()
            );
            buffer.write(warning.as_bytes());
        }

        if !buffer.write(record) {
            ctx.stats.overflow(1);
            return;
        }
        ctx.stats.appended(1);

        let wake = buffer.len() >= capacity / 3 || self.key.is_fatal();
        drop(guard);
        if wake {
            ctx.signal.notify();
        }
    }

    /// Drain the buffer to disk. Returns `false` if the buffer is gone.
    pub fn flush_to_disk(&self, ctx: &Context) -> bool {
        let _drain = self.drain.lock();
        let staged = match self.buffer.lock().as_mut() {
            Some(buffer) => buffer.flush(),
            None => return false,
        };
        if !staged.is_empty() {
            ctx.stats.flushes(1);
            self.persist(ctx, &staged, true);
        }
        true
    }

    /// Write a plain text line, such as a marker or a notice, to this key's
    /// file without staging it.
    pub fn write_diagnostic(&self, ctx: &Context, text: &str) {
        let mut encoded = Vec::with_capacity(text.len());
        ctx.config.codec.encode(text.as_bytes(), &mut encoded);
        self.persist(ctx, &encoded, false);
    }

    /// Persist a recursion diagnostic taken from the outermost call on this
    /// thread. Diagnostics raised while writing it are dropped.
    pub fn write_pending(&self, ctx: &Context, text: &str) {
        let entry = reentrancy::enter();
        self.write_diagnostic(ctx, text);
        if entry.take_pending().is_some() {
            ctx.stats.recursion_dropped(1);
        }
    }

    /// Write encoded bytes to the current file, choosing between the log and
    /// cache directories. Returns `true` if the bytes reached a file.
    pub fn persist(&self, ctx: &Context, data: &[u8], move_file: bool) -> bool {
        if data.is_empty() {
            return true;
        }

        let mut pending = None;
        let written = {
            let _files = ctx.file_lock.lock();
            let mut file = self.file.lock();
            self.persist_locked(ctx, &mut file, data, move_file, &mut pending)
        };

        if written {
            ctx.stats.bytes_written(data.len() as u64);
        } else {
            ctx.stats.write_failed(1);
            ctx.stats.lost_bytes(data.len() as u64);
        }

        // the file lock is released, a console which appended while being
        // told about a failure can have its diagnostic written now
        if let Some(text) = pending {
            self.write_pending(ctx, &text);
        }
        written
    }

    fn persist_locked(
        &self,
        ctx: &Context,
        file: &mut LogFile,
        data: &[u8],
        move_file: bool,
        pending: &mut Option<String>,
    ) -> bool {
        let sync = ctx.mode() == Mode::Sync;
        let log_dir = ctx.config.log_dir.as_path();

        let cache_dir = match ctx.config.cache_dir.as_deref() {
            Some(dir) => dir,
            None => {
                let written = self.write_in(ctx, file, log_dir, data, pending);
                if !sync {
                    file.close();
                }
                return written;
            }
        };

        let now = ctx.now();
        let rotation = ctx.rotation();
        let cache_path = rotation.resolve(now, cache_dir, self.key);
        let cache_logs = self.prefer_cache(ctx, now, cache_dir);

        if (cache_logs || cache_path.exists()) && self.open_in(ctx, file, cache_dir, pending) {
            let written = self.write_open(ctx, file, data, pending);
            if !sync {
                file.close();
            }
            if cache_logs || !move_file {
                return written;
            }

            let log_path = rotation.resolve(now, log_dir, self.key);
            match append_file(&cache_path, &log_path) {
                Ok(()) => {
                    if sync {
                        file.close();
                    }
                    if let Err(e) = fs::remove_file(&cache_path) {
                        warn!("failed to remove {}: {}", cache_path.display(), e);
                    }
                }
                Err(e) => {
                    ctx.stats.io_errors(1);
                    report(ctx, &e, pending);
                }
            }
            return written;
        }

        let opened = self.open_in(ctx, file, log_dir, pending);
        let mut written = false;
        if opened {
            written = self.write_open(ctx, file, data, pending);
            if !sync {
                file.close();
            }
        }

        if !written {
            if opened && sync {
                file.close();
            }
            if self.open_in(ctx, file, cache_dir, pending) {
                written = self.write_open(ctx, file, data, pending);
                if !sync {
                    file.close();
                }
            }
        }
        written
    }

    fn write_in(
        &self,
        ctx: &Context,
        file: &mut LogFile,
        dir: &Path,
        data: &[u8],
        pending: &mut Option<String>,
    ) -> bool {
        self.open_in(ctx, file, dir, pending) && self.write_open(ctx, file, data, pending)
    }

    fn open_in(
        &self,
        ctx: &Context,
        file: &mut LogFile,
        dir: &Path,
        pending: &mut Option<String>,
    ) -> bool {
        match file.open(ctx, dir) {
            Ok(()) => true,
            Err(e) => {
                ctx.stats.io_errors(1);
                report(ctx, &e, pending);
                false
            }
        }
    }

    fn write_open(
        &self,
        ctx: &Context,
        file: &mut LogFile,
        data: &[u8],
        pending: &mut Option<String>,
    ) -> bool {
        match file.write(ctx, data) {
            Ok(()) => true,
            Err(e) => {
                ctx.stats.io_errors(1);
                report(ctx, &e, pending);
                false
            }
        }
    }

    // New files go to the cache directory while it has room and this hour's
    // file does not exist in the log directory yet.
    fn prefer_cache(&self, ctx: &Context, now: u64, cache_dir: &Path) -> bool {
        if ctx.config.cache_days == 0 {
            return false;
        }
        let log_path = ctx
            .rotation()
            .resolve(now, &ctx.config.log_dir, self.key);
        if log_path.exists() {
            return false;
        }
        match fs2::available_space(cache_dir) {
            Ok(available) => available >= ctx.config.cache_space_threshold,
            Err(e) => {
                warn!("failed to read space of {}: {}", cache_dir.display(), e);
                false
            }
        }
    }

    /// Release the buffer and the file. The mapped file is cleared, and
    /// anything still staged in it is counted as lost.
    pub fn deinit(&self, ctx: &Context) {
        let _drain = self.drain.lock();
        if let Some(buffer) = self.buffer.lock().take() {
            if !buffer.is_empty() {
                ctx.stats.lost_bytes(buffer.len() as u64);
            }
        }
        self.file.lock().close();
    }
}

// Tip the console about `e`, keeping the first recursion diagnostic the
// console raised.
fn report(ctx: &Context, e: &Error, pending: &mut Option<String>) {
    if let Some(text) = ctx.tip(&e.to_string()) {
        if pending.is_none() {
            *pending = Some(text);
        } else {
            ctx.stats.recursion_dropped(1);
        }
    }
}

fn mark_info(ctx: &Context) -> String {
    format!(
        "[{},{:?}][{}]",
        std::process::id(),
        std::thread::current().id(),
        DateTime::from(ctx.config.clock().now())
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::time::Duration;
    use std::sync::Arc;

    // 2026-10-18T14:35:10Z
    const NOW: u64 = 1_792_334_110;

    fn builder(dir: &Path) -> Builder {
        Config::builder(dir, "app")
            .head_info("head")
            .clock(Arc::new(ManualClock::from_unix_secs(NOW)))
            .cleanup_delay(None)
            .promote_delay(None)
            .console_log(false)
    }

    fn read(dir: &Path, name: &str) -> String {
        fs::read_to_string(dir.join(name)).unwrap()
    }

    #[test]
    fn async_records_wait_for_a_drain() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = Context::new(builder(dir.path()).build().unwrap());
        let appender = LogAppender::new(SeverityKey::new(1), &ctx);
        assert!(appender.use_mmap);

        appender.append_async(&ctx, b"first\n");
        appender.append_async(&ctx, b"second\n");
        assert!(!dir.path().join("app_20261018140001.xlog").exists());

        assert!(appender.flush_to_disk(&ctx));
        assert_eq!(read(dir.path(), "app_20261018140001.xlog"), "head\nfirst\nsecond\n");
        assert_eq!(ctx.stats.snapshot().appended, 2);
        assert_eq!(ctx.stats.snapshot().flushes, 1);

        // an empty buffer writes nothing
        assert!(appender.flush_to_disk(&ctx));
        assert_eq!(ctx.stats.snapshot().flushes, 1);
    }

    #[test]
    fn sync_records_are_written_immediately() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = Context::new(builder(dir.path()).mode(Mode::Sync).build().unwrap());
        let appender = LogAppender::new(SeverityKey::DEFAULT, &ctx);
        appender.append_sync(&ctx, b"now\n");
        assert_eq!(read(dir.path(), "app_20261018140000.xlog"), "head\nnow\n");
    }

    #[test]
    fn overflow_is_counted_and_warned() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = Context::new(builder(dir.path()).block_size(100).build().unwrap());
        let appender = LogAppender::new(SeverityKey::new(2), &ctx);

        appender.append_async(&ctx, &[b'a'; 85]);
        // neither the warning nor the record fit
        appender.append_async(&ctx, &[b'b'; 20]);
        let stats = ctx.stats.snapshot();
        assert_eq!(stats.appended, 1);
        assert_eq!(stats.overflow, 1);

        let dir = tempfile::tempdir().unwrap();
        let ctx = Context::new(builder(dir.path()).block_size(300).build().unwrap());
        let appender = LogAppender::new(SeverityKey::new(2), &ctx);
        appender.append_async(&ctx, &[b'a'; 240]);
        appender.append_async(&ctx, b"b\n");
        appender.flush_to_disk(&ctx);
        let contents = read(dir.path(), "app_20261018140002.xlog");
        assert!(contents.contains("[F][ buffer length >= capacity*4/5, len: 240\n"));
        assert!(contents.ends_with("b\n"));
    }

    #[test]
    fn pressure_signals_the_scheduler() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = Context::new(builder(dir.path()).block_size(300).build().unwrap());
        let appender = LogAppender::new(SeverityKey::new(1), &ctx);

        appender.append_async(&ctx, &[b'a'; 10]);
        assert!(!ctx.signal.is_pending());
        appender.append_async(&ctx, &[b'a'; 100]);
        assert!(ctx.signal.is_pending());

        let fatal = LogAppender::new(SeverityKey::FATAL, &ctx);
        ctx.signal.wait(Duration::from_millis(1));
        fatal.append_async(&ctx, b"x");
        assert!(ctx.signal.is_pending());
    }

    #[test]
    fn staged_bytes_survive_a_crash() {
        let dir = tempfile::tempdir().unwrap();
        {
            let ctx = Context::new(builder(dir.path()).build().unwrap());
            let appender = LogAppender::new(SeverityKey::new(4), &ctx);
            appender.append_async(&ctx, b"before crash\n");
            // skip the destructor which clears the mapped file
            std::mem::forget(appender);
        }

        let ctx = Context::new(builder(dir.path()).build().unwrap());
        let appender = LogAppender::new(SeverityKey::new(4), &ctx);
        appender.recover(&ctx);

        let contents = read(dir.path(), "app_20261018140004.xlog");
        let begin = contents.find("~~~~~ begin of mmap ~~~~~\n").unwrap();
        let key = contents.find("LogAppender Key [4] use_mmap [1]\n").unwrap();
        let record = contents.find("before crash\n").unwrap();
        let end = contents.find("~~~~~ end of mmap ~~~~~\n").unwrap();
        assert!(begin < key && key < record && record < end);

        // nothing left to recover
        let again = LogAppender::new(SeverityKey::new(4), &ctx);
        drop(appender);
        again.recover(&ctx);
        assert_eq!(read(dir.path(), "app_20261018140004.xlog"), contents);
    }

    #[test]
    fn cache_is_used_when_log_dir_fails() {
        let root = tempfile::tempdir().unwrap();
        let cache = root.path().join("cache");
        fs::create_dir(&cache).unwrap();
        // a regular file where the log directory should be
        let log_dir = root.path().join("logs");
        fs::write(&log_dir, b"").unwrap();

        let config = builder(&log_dir)
            .cache_dir(&cache)
            .mode(Mode::Sync)
            .build()
            .unwrap();
        let ctx = Context::new(config);
        let appender = LogAppender::new(SeverityKey::DEFAULT, &ctx);
        appender.append_sync(&ctx, b"fallback\n");

        assert_eq!(read(&cache, "app_20261018140000.xlog"), "head\nfallback\n");
        let stats = ctx.stats.snapshot();
        assert_eq!(stats.io_errors, 1);
        assert_eq!(stats.write_failed, 0);
    }

    #[test]
    fn cache_file_is_merged_on_drain() {
        let root = tempfile::tempdir().unwrap();
        let log_dir = root.path().join("logs");
        let cache = root.path().join("cache");
        fs::create_dir(&log_dir).unwrap();
        fs::create_dir(&cache).unwrap();
        fs::write(cache.join("app_20261018140001.xlog"), b"cached\n").unwrap();

        let config = builder(&log_dir).cache_dir(&cache).build().unwrap();
        let ctx = Context::new(config);
        let appender = LogAppender::new(SeverityKey::new(1), &ctx);
        appender.append_async(&ctx, b"drained\n");
        appender.flush_to_disk(&ctx);

        assert!(!cache.join("app_20261018140001.xlog").exists());
        assert_eq!(
            read(&log_dir, "app_20261018140001.xlog"),
            "cached\ndrained\n"
        );
    }

    #[test]
    fn deinit_releases_the_buffer() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = Context::new(builder(dir.path()).build().unwrap());
        let appender = LogAppender::new(SeverityKey::DEFAULT, &ctx);
        appender.deinit(&ctx);
        assert!(!appender.flush_to_disk(&ctx));
        appender.append_async(&ctx, b"late\n");
        let stats = ctx.stats.snapshot();
        assert_eq!(stats.unavailable, 1);
        assert_eq!(stats.lost_bytes, 0);
    }

    #[test]
    fn deinit_counts_undrained_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = Context::new(builder(dir.path()).build().unwrap());
        let appender = LogAppender::new(SeverityKey::new(3), &ctx);
        appender.append_async(&ctx, b"never drained\n");
        appender.deinit(&ctx);

        assert_eq!(ctx.stats.snapshot().lost_bytes, 14);
        assert!(!dir.path().join("app_20261018140003.xlog").exists());
    }
}
