// Copyright 2021 Twitter, Inc.
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

use crate::clock::{same_day, unix_instant};
use crate::engine::Context;
use crate::*;
use clocksource::datetime::DateTime;
use clocksource::precise::Instant;
use log::debug;
use logbuf::Codec;
use std::fs::{File, OpenOptions};
use std::io::{self, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

// a wall clock jump larger than the elapsed ticks plus this is reported
const DISCONTINUITY_SECS: u64 = 300;

/// The file an appender writes to. At most one handle is open at a time, and
/// it belongs to `current_dir` and the day it was opened on.
pub(crate) struct LogFile {
    key: SeverityKey,
    file: Option<File>,
    opened_at: u64,
    current_dir: PathBuf,
    last_time: u64,
    last_tick: Option<Instant>,
    last_path: PathBuf,
}

impl LogFile {
    pub fn new(key: SeverityKey) -> Self {
        Self {
            key,
            file: None,
            opened_at: 0,
            current_dir: PathBuf::new(),
            last_time: 0,
            last_tick: None,
            last_path: PathBuf::new(),
        }
    }

    /// Ensure a file in `dir` is open. An open handle is kept if it was opened
    /// today in the same directory.
    pub fn open(&mut self, ctx: &Context, dir: &Path) -> Result<(), Error> {
        let now = ctx.now();
        if self.file.is_some() {
            if same_day(self.opened_at, now) && self.current_dir == dir {
                return Ok(());
            }
            self.close();
        }

        let tick = ctx.config.clock().ticks();
        self.opened_at = now;
        self.current_dir = dir.to_path_buf();

        // the wall clock went backwards, keep appending to the last file
        if now < self.last_time && !self.last_path.as_os_str().is_empty() {
            let path = self.last_path.clone();
            self.file = Some(open_append(&path)?);
            return Ok(());
        }

        let path = ctx.rotation().resolve(now, dir, self.key);
        let mut file = open_append(&path)?;
        debug!("opened {}", path.display());

        if file.metadata()?.len() == 0 {
            let banner = format!("{}\n", ctx.config.head_info);
            file.write_all(banner.as_bytes())?;
        }

        if let Some(last_tick) = self.last_tick {
            let tick_ms = tick
                .checked_duration_since(last_tick)
                .map(|d| d.as_nanos() / 1_000_000)
                .unwrap_or(0);
            let time_diff = now - self.last_time;
            if time_diff > tick_ms / 1000 + DISCONTINUITY_SECS {
                let line = format!(
                    "[F][ last log file:{} from {} to {}, time_diff:{}, tick_diff:{}\n",
                    self.last_path.display(),
                    DateTime::from(unix_instant(self.last_time)),
                    DateTime::from(unix_instant(now)),
                    time_diff,
                    tick_ms,
                );
                let mut encoded = Vec::new();
                ctx.config.codec.encode(line.as_bytes(), &mut encoded);
                file.write_all(&encoded)?;
            }
        }

        self.file = Some(file);
        self.last_path = path;
        self.last_tick = Some(tick);
        self.last_time = now;
        Ok(())
    }

    /// Append `data` to the open file. A failed write is rolled back and
    /// replaced by an error marker. If the rollback fails as well the partial
    /// bytes stay and no marker is written.
    pub fn write(&mut self, ctx: &Context, data: &[u8]) -> Result<(), Error> {
        let file = self.file.as_mut().ok_or(Error::NotOpen)?;
        let result = commit(file, data, &*ctx.config.codec);
        if let Err(Error::Rollback { .. }) = result {
            ctx.stats.io_errors(1);
        }
        result
    }

    pub fn close(&mut self) {
        if self.file.take().is_some() {
            self.opened_at = 0;
        }
    }
}

fn open_append(path: &Path) -> Result<File, Error> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|source| Error::Open {
            path: path.to_path_buf(),
            source,
        })
}

fn commit(file: &mut File, data: &[u8], codec: &dyn Codec) -> Result<(), Error> {
    commit_with(file, data, codec, |f, d| f.write_all(d), |f, len| f.set_len(len))
}

fn commit_with<W, T>(
    file: &mut File,
    data: &[u8],
    codec: &dyn Codec,
    write: W,
    truncate: T,
) -> Result<(), Error>
where
    W: FnOnce(&mut File, &[u8]) -> io::Result<()>,
    T: FnOnce(&mut File, u64) -> io::Result<()>,
{
    let before = file.seek(SeekFrom::End(0))?;
    if let Err(source) = write(file, data) {
        let code = source.raw_os_error().unwrap_or(-1);
        if let Err(source) = truncate(file, before) {
            return Err(Error::Rollback { code, source });
        }
        let _ = file.seek(SeekFrom::End(0));

        let mut marker = Vec::new();
        codec.encode(format!("\nwrite file error:{}\n", code).as_bytes(), &mut marker);
        let _ = file.write_all(&marker);
        return Err(Error::Write { code, source });
    }
    Ok(())
}
