// Copyright 2021 Twitter, Inc.
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

use crate::clock::system_secs;
use crate::config::LOG_EXT;
use log::{debug, warn};
use std::fs;
use std::path::Path;

/// Remove log files and date archive directories in `dir` which were last
/// modified more than `max_age` seconds before `now`. Returns the number of
/// entries removed. Entries which can not be inspected or removed are
/// skipped.
pub(crate) fn sweep(dir: &Path, max_age: u64, now: u64) -> usize {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(_) => return 0,
    };

    let mut removed = 0;
    for entry in entries.flatten() {
        let path = entry.path();
        let metadata = match entry.metadata() {
            Ok(m) => m,
            Err(_) => continue,
        };
        let modified = match metadata.modified() {
            Ok(t) => system_secs(t),
            Err(_) => continue,
        };
        if !(now > modified && now - modified > max_age) {
            continue;
        }

        let result = if metadata.is_file() && path.extension().map(|e| e == LOG_EXT).unwrap_or(false)
        {
            fs::remove_file(&path)
        } else if metadata.is_dir() && is_date_archive(&path) {
            fs::remove_dir_all(&path)
        } else {
            continue;
        };

        match result {
            Ok(()) => {
                debug!("removed expired {}", path.display());
                removed += 1;
            }
            Err(e) => warn!("failed to remove {}: {}", path.display(), e),
        }
    }
    removed
}

fn is_date_archive(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.len() == 8 && n.bytes().all(|b| b.is_ascii_digit()))
        .unwrap_or(false)
}
