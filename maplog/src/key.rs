// Copyright 2021 Twitter, Inc.
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

use core::fmt;
use log::Level;

/// Identifies a log stream. Every key has its own buffer and its own lineage
/// of files, and keys are ordered by severity.
#[derive(Copy, Clone, Debug, Default, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct SeverityKey(u8);

impl SeverityKey {
    /// Used when a record carries no classification.
    pub const DEFAULT: SeverityKey = SeverityKey(0);

    /// The highest severity. Appending to a fatal key wakes the flush
    /// scheduler immediately.
    pub const FATAL: SeverityKey = SeverityKey(5);

    pub const fn new(key: u8) -> Self {
        Self(key)
    }

    pub const fn get(self) -> u8 {
        self.0
    }

    pub fn is_fatal(self) -> bool {
        self >= Self::FATAL
    }
}

impl From<u8> for SeverityKey {
    fn from(key: u8) -> Self {
        Self(key)
    }
}

impl From<Level> for SeverityKey {
    fn from(level: Level) -> Self {
        match level {
            Level::Trace => Self(0),
            Level::Debug => Self(1),
            Level::Info => Self(2),
            Level::Warn => Self(3),
            Level::Error => Self(4),
        }
    }
}

impl fmt::Display for SeverityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
