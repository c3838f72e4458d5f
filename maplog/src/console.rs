// Copyright 2021 Twitter, Inc.
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

use std::io::Write;

/// Destination for console echo and console-only diagnostics.
///
/// Nothing written here reaches a log file or a buffer.
pub trait Console: Send + Sync {
    fn write(&self, line: &str);
}

/// Writes each line to standard error.
#[derive(Copy, Clone, Debug, Default)]
pub struct Stderr;

impl Console for Stderr {
    fn write(&self, line: &str) {
        let stderr = std::io::stderr();
        let mut stderr = stderr.lock();
        let _ = writeln!(stderr, "{}", line.trim_end());
    }
}
