// Copyright 2021 Twitter, Inc.
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

use core::sync::atomic::{AtomicU64, Ordering};

#[cfg(feature = "metrics")]
use crate::metrics::*;

/// A point in time snapshot of the engine's counters.
///
/// Every record or batch the engine drops without telling the caller is
/// counted here.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Stats {
    /// Records accepted into a buffer or written synchronously.
    pub appended: u64,
    /// Records dropped because the buffer was full.
    pub overflow: u64,
    /// Records dropped because no appender or buffer was available.
    pub unavailable: u64,
    /// Batches which could not be written to any directory.
    pub write_failed: u64,
    /// Bytes in batches which could not be written.
    pub lost_bytes: u64,
    /// Failed opens, writes and merges.
    pub io_errors: u64,
    /// Nested appends turned into a recursion diagnostic.
    pub recursion_diverted: u64,
    /// Nested appends dropped.
    pub recursion_dropped: u64,
    /// Non-empty batches drained from a buffer.
    pub flushes: u64,
    pub bytes_written: u64,
    /// Files moved from the cache directory.
    pub promoted: u64,
    /// Expired files and directories removed.
    pub swept: u64,
}

macro_rules! counters {
    ($($name:ident => $metric:ident),* $(,)?) => {
        #[derive(Default)]
        pub(crate) struct Counters {
            $($name: AtomicU64,)*
        }

        impl Counters {
            $(
                pub fn $name(&self, n: u64) {
                    self.$name.fetch_add(n, Ordering::Relaxed);
                    metrics! {
                        $metric.add(n);
                    }
                }
            )*

            pub fn snapshot(&self) -> Stats {
                Stats {
                    $($name: self.$name.load(Ordering::Relaxed),)*
                }
            }
        }
    };
}

counters! {
    appended => MAPLOG_APPEND,
    overflow => MAPLOG_OVERFLOW,
    unavailable => MAPLOG_UNAVAILABLE,
    write_failed => MAPLOG_WRITE_EX,
    lost_bytes => MAPLOG_LOST_BYTE,
    io_errors => MAPLOG_IO_EX,
    recursion_diverted => MAPLOG_RECURSION,
    recursion_dropped => MAPLOG_RECURSION_DROP,
    flushes => MAPLOG_FLUSH,
    bytes_written => MAPLOG_WRITE_BYTE,
    promoted => MAPLOG_PROMOTE,
    swept => MAPLOG_SWEEP,
}
