// Copyright 2021 Twitter, Inc.
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

use crate::*;
use log::{LevelFilter, Log, Metadata, Record, SetLoggerError};
use std::sync::Arc;

const INTERNAL_TARGETS: [&str; 2] = ["maplog", "logbuf"];

/// Routes records from the `log` facade into an `Engine`, using the record's
/// level as its `SeverityKey`.
///
/// Records emitted by this crate and by `logbuf` are ignored, so the engine
/// never persists its own diagnostics through this path.
pub struct MapLogger {
    engine: Arc<Engine>,
    level_filter: LevelFilter,
    format: FormatFunction,
}

impl MapLogger {
    pub fn new(engine: Arc<Engine>) -> Self {
        Self {
            engine,
            level_filter: LevelFilter::Trace,
            format: default_format,
        }
    }

    /// Sets the most verbose level which will be forwarded.
    pub fn level_filter(mut self, level_filter: LevelFilter) -> Self {
        self.level_filter = level_filter;
        self
    }

    /// Sets the function which renders each record.
    pub fn format(mut self, format: FormatFunction) -> Self {
        self.format = format;
        self
    }

    /// Register as the global logger.
    pub fn start(self) -> Result<(), SetLoggerError> {
        let level_filter = self.level_filter;
        log::set_boxed_logger(Box::new(self)).map(|()| log::set_max_level(level_filter))
    }
}

fn is_internal(target: &str) -> bool {
    INTERNAL_TARGETS.iter().any(|name| {
        target
            .strip_prefix(name)
            .map(|rest| rest.is_empty() || rest.starts_with("::"))
            .unwrap_or(false)
    })
}

impl Log for MapLogger {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        metadata.level() <= self.level_filter && !is_internal(metadata.target())
    }

    fn log(&self, record: &Record<'_>) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let mut line = Vec::new();
        if (self.format)(&mut line, self.engine.now(), record).is_ok() {
            self.engine.append(SeverityKey::from(record.level()), &line);
        }
    }

    fn flush(&self) {
        self.engine.flush();
    }
}
