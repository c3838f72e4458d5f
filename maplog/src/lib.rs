// Copyright 2021 Twitter, Inc.
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! This crate provides a log persistence engine which keeps unflushed records
//! safe across a process crash.
//!
//! The core of this crate is the `Engine` type, which is opened with a
//! `Config` built by `Config::builder`. Records are appended as opaque bytes
//! under a `SeverityKey`. Every key gets its own `logbuf::LogBuffer`, backed by
//! a memory-mapped file in the cache (or log) directory, and its own lineage of
//! files named `<prefix>_<YYYYMMDDHH>00<key>[_<index>].xlog`.
//!
//! In `Mode::Async` records are staged in the buffer and a background worker
//! drains every buffer periodically, or early when a buffer is a third full or
//! a fatal record arrives. Records staged when the process dies are recovered
//! into the key's file the next time the key is used. In `Mode::Sync` records
//! are written before `append` returns.
//!
//! With a cache directory configured, new files are started there while the
//! cache volume has room and merged into the log directory later, either as
//! part of a drain or by `Engine::promote_cache` once they have spent
//! `cache_days` in the cache. Expired files are removed by
//! `Engine::sweep_expired`. Both run once on their own shortly after the engine
//! is opened.
//!
//! The engine can be installed behind the `log` facade with `MapLogger`.

mod appender;
mod clock;
mod config;
mod console;
mod engine;
mod error;
mod file;
mod format;
mod key;
mod logger;
#[macro_use]
mod macros;
mod naming;
mod promote;
mod reentrancy;
mod registry;
mod retention;
mod scheduler;
mod stats;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{Builder, Config, Mode, BLOCK_SIZE, LOG_EXT, MAX_ALIVE, MIN_ALIVE};
pub use console::{Console, Stderr};
pub use engine::Engine;
pub use error::Error;
pub use format::{default_format, FormatFunction};
pub use key::SeverityKey;
pub use logger::MapLogger;
pub use stats::Stats;

pub use logbuf::{Codec, Plain};

#[cfg(feature = "metrics")]
mod metrics;
