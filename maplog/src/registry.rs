// Copyright 2021 Twitter, Inc.
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

use crate::appender::LogAppender;
use crate::engine::Context;
use crate::SeverityKey;
use ahash::AHashMap;
use parking_lot::Mutex;
use std::sync::Arc;

struct State {
    appenders: AHashMap<SeverityKey, Arc<LogAppender>>,
    closed: bool,
}

/// The appenders of an engine, created on first use of each key.
pub(crate) struct Registry {
    state: Mutex<State>,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                appenders: AHashMap::new(),
                closed: false,
            }),
        }
    }

    /// The appender for `key`, created and recovered if this is the first use
    /// of the key. Returns `None` once the registry is torn down.
    pub fn get_or_create(&self, key: SeverityKey, ctx: &Context) -> Option<Arc<LogAppender>> {
        let mut state = self.state.lock();
        if let Some(appender) = state.appenders.get(&key) {
            return Some(appender.clone());
        }
        if state.closed {
            return None;
        }

        let appender = Arc::new(LogAppender::new(key, ctx));
        appender.recover(ctx);
        state.appenders.insert(key, appender.clone());
        Some(appender)
    }

    /// Every appender ordered by key, and whether the registry is closed.
    pub fn snapshot(&self) -> (Vec<Arc<LogAppender>>, bool) {
        let state = self.state.lock();
        let mut appenders: Vec<_> = state.appenders.values().cloned().collect();
        appenders.sort_by_key(|a| a.key());
        (appenders, state.closed)
    }

    #[cfg(test)]
    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Release every appender and refuse to create new ones.
    pub fn teardown(&self, ctx: &Context) {
        let mut state = self.state.lock();
        state.closed = true;
        for (_, appender) in state.appenders.drain() {
            appender.deinit(ctx);
        }
    }
}
