// Copyright 2021 Twitter, Inc.
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

use clocksource::datetime::DateTime;
use clocksource::precise::UnixInstant;
use log::{Level, Record};

/// Renders a `log` record into the bytes handed to `Engine::append`.
pub type FormatFunction = fn(
    write: &mut dyn std::io::Write,
    now: UnixInstant,
    record: &Record,
) -> Result<(), std::io::Error>;

/// `[<L>][<datetime>][<module>, <file>:<line>] <message>`
pub fn default_format(
    w: &mut dyn std::io::Write,
    now: UnixInstant,
    record: &Record,
) -> Result<(), std::io::Error> {
    writeln!(
        w,
        "[{}][{}][{}, {}:{}] {}",
        level_tag(record.level()),
        DateTime::from(now),
        record.module_path().unwrap_or("<unnamed>"),
        record.file().unwrap_or("<unknown>"),
        record.line().unwrap_or(0),
        record.args()
    )
}

fn level_tag(level: Level) -> char {
    match level {
        Level::Error => 'E',
        Level::Warn => 'W',
        Level::Info => 'I',
        Level::Debug => 'D',
        Level::Trace => 'V',
    }
}
