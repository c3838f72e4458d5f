// Copyright 2021 Twitter, Inc.
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

use metriken::{metric, Counter};

#[metric(
    name = "maplog_append",
    description = "records accepted into a buffer or written synchronously"
)]
pub static MAPLOG_APPEND: Counter = Counter::new();

#[metric(
    name = "maplog_overflow",
    description = "records dropped because the buffer was full"
)]
pub static MAPLOG_OVERFLOW: Counter = Counter::new();

#[metric(
    name = "maplog_unavailable",
    description = "records dropped because no appender or buffer was available"
)]
pub static MAPLOG_UNAVAILABLE: Counter = Counter::new();

#[metric(
    name = "maplog_write_ex",
    description = "batches which could not be written to any directory"
)]
pub static MAPLOG_WRITE_EX: Counter = Counter::new();

#[metric(
    name = "maplog_lost_byte",
    description = "bytes in batches which could not be written"
)]
pub static MAPLOG_LOST_BYTE: Counter = Counter::new();

#[metric(
    name = "maplog_io_ex",
    description = "number of failed opens, writes and merges"
)]
pub static MAPLOG_IO_EX: Counter = Counter::new();

#[metric(
    name = "maplog_recursion",
    description = "nested appends turned into a recursion diagnostic"
)]
pub static MAPLOG_RECURSION: Counter = Counter::new();

#[metric(name = "maplog_recursion_drop", description = "nested appends dropped")]
pub static MAPLOG_RECURSION_DROP: Counter = Counter::new();

#[metric(
    name = "maplog_flush",
    description = "number of non-empty batches drained from a buffer"
)]
pub static MAPLOG_FLUSH: Counter = Counter::new();

#[metric(
    name = "maplog_write_byte",
    description = "number of bytes written to log files"
)]
pub static MAPLOG_WRITE_BYTE: Counter = Counter::new();

#[metric(
    name = "maplog_promote",
    description = "files moved from the cache directory"
)]
pub static MAPLOG_PROMOTE: Counter = Counter::new();

#[metric(
    name = "maplog_sweep",
    description = "expired files and directories removed"
)]
pub static MAPLOG_SWEEP: Counter = Counter::new();
