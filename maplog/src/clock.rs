// Copyright 2021 Twitter, Inc.
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

use clocksource::precise::{Instant, UnixInstant};
use core::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use core::time::Duration;
use std::time::SystemTime;
use time::OffsetDateTime;

const NANOS_PER_SEC: u64 = 1_000_000_000;

/// A source of wall-clock and monotonic time.
///
/// File naming, rotation and retention read the wall clock. The monotonic
/// clock is only used to notice jumps of the wall clock between file opens.
pub trait Clock: Send + Sync {
    fn now(&self) -> UnixInstant;

    fn ticks(&self) -> Instant;
}

/// Reads the system realtime and monotonic clocks.
#[derive(Copy, Clone, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> UnixInstant {
        UnixInstant::now()
    }

    fn ticks(&self) -> Instant {
        Instant::now()
    }
}

/// A clock which only moves when told to. Intended for tests which need to
/// cross hour, day or retention boundaries.
pub struct ManualClock {
    wall: UnixInstant,
    ticks: Instant,
    wall_offset: AtomicI64,
    tick_offset: AtomicU64,
}

impl ManualClock {
    /// Create a clock which reads `secs` seconds after the unix epoch.
    pub fn from_unix_secs(secs: u64) -> Self {
        Self {
            wall: UnixInstant::EPOCH + Duration::from_secs(secs),
            ticks: Instant::now(),
            wall_offset: AtomicI64::new(0),
            tick_offset: AtomicU64::new(0),
        }
    }

    /// Move both clocks forward, as if time had passed normally.
    pub fn advance(&self, duration: Duration) {
        self.wall_offset
            .fetch_add(duration.as_nanos() as i64, Ordering::Relaxed);
        self.tick_offset
            .fetch_add(duration.as_nanos() as u64, Ordering::Relaxed);
    }

    /// Move only the wall clock forward, as a device sleep or a clock change
    /// would.
    pub fn jump(&self, duration: Duration) {
        self.wall_offset
            .fetch_add(duration.as_nanos() as i64, Ordering::Relaxed);
    }

    /// Move only the wall clock backward.
    pub fn rewind(&self, duration: Duration) {
        self.wall_offset
            .fetch_sub(duration.as_nanos() as i64, Ordering::Relaxed);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> UnixInstant {
        let offset = self.wall_offset.load(Ordering::Relaxed);
        if offset >= 0 {
            self.wall + Duration::from_nanos(offset as u64)
        } else {
            self.wall - Duration::from_nanos(offset.unsigned_abs())
        }
    }

    fn ticks(&self) -> Instant {
        self.ticks + Duration::from_nanos(self.tick_offset.load(Ordering::Relaxed))
    }
}

/// Whole seconds since the unix epoch.
pub(crate) fn unix_secs(instant: UnixInstant) -> u64 {
    instant.duration_since(UnixInstant::EPOCH).as_nanos() / NANOS_PER_SEC
}

pub(crate) fn unix_instant(secs: u64) -> UnixInstant {
    UnixInstant::EPOCH + Duration::from_secs(secs)
}

/// Whole seconds since the unix epoch for a filesystem timestamp. Times before
/// the epoch read as zero.
pub(crate) fn system_secs(time: SystemTime) -> u64 {
    time.duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Calendar view of a unix timestamp. All calendar decisions are made in UTC.
pub(crate) fn calendar(secs: u64) -> OffsetDateTime {
    OffsetDateTime::from_unix_timestamp(secs as i64).unwrap_or(OffsetDateTime::UNIX_EPOCH)
}

pub(crate) fn same_day(a: u64, b: u64) -> bool {
    calendar(a).date() == calendar(b).date()
}
