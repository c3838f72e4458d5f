// Copyright 2021 Twitter, Inc.
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! Moving files out of the cache directory.

use crate::clock::system_secs;
use crate::config::LOG_EXT;
use crate::Error;
use log::{debug, warn};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Seek, SeekFrom};
use std::path::Path;

/// Append the contents of `src` onto `dst`.
///
/// The merge only counts as done if `dst` grew by the full size of `src`.
/// Otherwise `dst` is truncated back to its previous length and an error is
/// returned. `src` is never modified.
pub(crate) fn append_file(src: &Path, dst: &Path) -> Result<(), Error> {
    append_file_with(src, dst, |from, to| io::copy(from, to).map(|_| ()))
}

pub(crate) fn append_file_with<F>(src: &Path, dst: &Path, copy: F) -> Result<(), Error>
where
    F: FnOnce(&mut File, &mut File) -> io::Result<()>,
{
    if src == dst {
        return Err(Error::SamePath(src.to_path_buf()));
    }
    let expected = fs::metadata(src)?.len();
    if expected == 0 {
        return Ok(());
    }

    let mut from = File::open(src)?;
    let mut to = OpenOptions::new().create(true).append(true).open(dst)?;
    let before = to.seek(SeekFrom::End(0))?;

    let copied = copy(&mut from, &mut to);
    let after = to.seek(SeekFrom::End(0))?;

    if copied.is_err() || after < before + expected {
        to.set_len(before)?;
        return Err(Error::Merge {
            src: src.to_path_buf(),
            dst: dst.to_path_buf(),
            copied: after.saturating_sub(before),
            expected,
        });
    }
    Ok(())
}

/// Move every file for `prefix` which has been in `cache_dir` for at least
/// `residency` seconds onto the file of the same name in `log_dir`. The pass
/// stops at the first failed merge. Returns the number of files moved.
pub(crate) fn promote(
    cache_dir: &Path,
    log_dir: &Path,
    prefix: &str,
    residency: u64,
    now: u64,
) -> Result<usize, Error> {
    if cache_dir == log_dir {
        return Ok(0);
    }

    let mut moved = 0;
    for entry in fs::read_dir(cache_dir)? {
        let entry = entry?;
        let path = entry.path();
        let eligible = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(|n| n.starts_with(prefix))
            .unwrap_or(false)
            && path.extension().map(|e| e == LOG_EXT).unwrap_or(false);
        if !eligible || !entry.file_type()?.is_file() {
            continue;
        }

        if residency > 0 {
            let modified = system_secs(entry.metadata()?.modified()?);
            if now > modified && now - modified < residency {
                continue;
            }
        }

        let dst = log_dir.join(entry.file_name());
        if let Err(e) = append_file(&path, &dst) {
            warn!("cache promotion stopped: {}", e);
            return Err(e);
        }
        fs::remove_file(&path)?;
        debug!("promoted {} to {}", path.display(), dst.display());
        moved += 1;
    }
    Ok(moved)
}
