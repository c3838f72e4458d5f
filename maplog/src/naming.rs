// Copyright 2021 Twitter, Inc.
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! File naming and size-based rotation.
//!
//! Every file name is derived from the prefix, the hour in which it was
//! opened and the severity key: `<prefix>_<YYYYMMDDHH>00<key>[_<index>].xlog`.
//! The index is only present once a maximum file size is configured and the
//! hour's first file has grown past it.

use crate::clock::calendar;
use crate::config::LOG_EXT;
use crate::SeverityKey;
use std::fs;
use std::path::{Path, PathBuf};

/// Name of every file for `key` in the hour containing `secs`, without index
/// or extension.
pub(crate) fn stem(prefix: &str, secs: u64, key: SeverityKey) -> String {
    let dt = calendar(secs);
    format!(
        "{}_{:04}{:02}{:02}{:02}00{:02}",
        prefix,
        dt.year(),
        dt.month() as u8,
        dt.day(),
        dt.hour(),
        key.get()
    )
}

pub(crate) fn file_name(stem: &str, index: u64) -> String {
    if index == 0 {
        format!("{}.{}", stem, LOG_EXT)
    } else {
        format!("{}_{}.{}", stem, index, LOG_EXT)
    }
}

/// The index encoded in `name` if it is a log file for `stem`.
///
/// Only an exact stem followed by nothing or by `_` and decimal digits is
/// accepted, so files of key 100 never match the stem of key 10 and `_10`
/// sorts after `_9`.
pub(crate) fn parse_index(name: &str, stem: &str) -> Option<u64> {
    let rest = name.strip_prefix(stem)?;
    let rest = rest.strip_suffix(LOG_EXT)?.strip_suffix('.')?;
    if rest.is_empty() {
        return Some(0);
    }
    let digits = rest.strip_prefix('_')?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// Resolves the path of the file a write should go to.
pub(crate) struct Rotation<'a> {
    pub log_dir: &'a Path,
    pub cache_dir: Option<&'a Path>,
    pub prefix: &'a str,
    pub max_file_size: u64,
}

impl Rotation<'_> {
    /// Path in `dir` for a write by `key` at `now`. Calling this repeatedly
    /// within one hour returns the same path until the newest file exceeds
    /// the size limit.
    pub fn resolve(&self, now: u64, dir: &Path, key: SeverityKey) -> PathBuf {
        let stem = stem(self.prefix, now, key);
        let index = if self.max_file_size == 0 {
            0
        } else {
            self.next_index(&stem)
        };
        dir.join(file_name(&stem, index))
    }

    fn dirs(&self) -> impl Iterator<Item = &Path> {
        let cache = self.cache_dir.filter(|c| *c != self.log_dir);
        std::iter::once(self.log_dir).chain(cache)
    }

    fn next_index(&self, stem: &str) -> u64 {
        let mut index = 0;
        for dir in self.dirs() {
            let entries = match fs::read_dir(dir) {
                Ok(entries) => entries,
                Err(_) => continue,
            };
            for entry in entries.flatten() {
                if let Some(i) = entry.file_name().to_str().and_then(|n| parse_index(n, stem)) {
                    index = index.max(i);
                }
            }
        }

        let name = file_name(stem, index);
        let size: u64 = self
            .dirs()
            .filter_map(|dir| fs::metadata(dir.join(&name)).ok())
            .map(|m| m.len())
            .sum();

        if size > self.max_file_size {
            index + 1
        } else {
            index
        }
    }
}
