// Copyright 2021 Twitter, Inc.
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

use crate::engine::Core;
use core::time::Duration;
use log::{debug, error};
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

#[derive(Default)]
struct State {
    pending: bool,
    stop: bool,
}

/// Wakes the flush worker.
#[derive(Default)]
pub(crate) struct Signal {
    state: Mutex<State>,
    cond: Condvar,
}

impl Signal {
    pub fn notify(&self) {
        self.state.lock().pending = true;
        self.cond.notify_all();
    }

    pub fn request_stop(&self) {
        self.state.lock().stop = true;
        self.cond.notify_all();
    }

    pub fn clear_stop(&self) {
        self.state.lock().stop = false;
    }

    #[cfg(test)]
    pub fn is_pending(&self) -> bool {
        self.state.lock().pending
    }

    /// Block until notified or until `timeout` passes. Returns `true` if the
    /// worker should exit.
    pub fn wait(&self, timeout: Duration) -> bool {
        let mut state = self.state.lock();
        if !state.pending && !state.stop {
            self.cond.wait_for(&mut state, timeout);
        }
        state.pending = false;
        state.stop
    }
}

/// Owns the background worker which drains every appender.
#[derive(Default)]
pub(crate) struct Scheduler {
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl Scheduler {
    /// Start the worker unless it is already running.
    pub fn ensure_running(&self, core: &Arc<Core>) {
        let mut handle = self.handle.lock();
        if let Some(running) = handle.as_ref() {
            if !running.is_finished() {
                return;
            }
        }
        if let Some(finished) = handle.take() {
            let _ = finished.join();
        }

        core.ctx.signal.clear_stop();
        let worker = core.clone();
        match thread::Builder::new()
            .name("maplog-flush".to_string())
            .spawn(move || run(worker))
        {
            Ok(h) => *handle = Some(h),
            Err(e) => error!("failed to start flush worker: {}", e),
        }
    }

    /// Ask the worker to do a final pass and wait for it to exit.
    pub fn stop(&self, core: &Core) {
        let handle = self.handle.lock().take();
        core.ctx.signal.request_stop();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                error!("flush worker panicked");
            }
        }
    }
}

fn run(core: Arc<Core>) {
    debug!("flush worker started");
    loop {
        if !core.drain_all() {
            break;
        }
        if core.ctx.signal.wait(core.ctx.config.flush_interval) {
            core.drain_all();
            break;
        }
    }
    debug!("flush worker exited");
}
