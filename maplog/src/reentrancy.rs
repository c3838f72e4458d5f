// Copyright 2021 Twitter, Inc.
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! Bounds recursive calls into the append path on one thread.
//!
//! Console sinks, codecs and `log` adapters may end up appending while an
//! append is already running on the same thread. The first nested call is
//! turned into a single console diagnostic which is persisted once the
//! outermost call finishes. Deeper calls, and calls beyond `MAX_DEPTH`, are
//! dropped.

use core::cell::RefCell;
use core::marker::PhantomData;

const MAX_DEPTH: usize = 10;
const MAX_RECORD_TEXT: usize = 4096;

#[derive(Default)]
struct Recursion {
    depth: usize,
    pending: Option<String>,
}

thread_local! {
    static RECURSION: RefCell<Recursion> = RefCell::new(Recursion::default());
}

/// Marks the current thread as inside the append path until dropped.
pub(crate) struct Entry {
    depth: usize,
    // must be dropped on the thread which created it
    _thread: PhantomData<*const ()>,
}

pub(crate) fn enter() -> Entry {
    let depth = RECURSION.with(|r| {
        let mut r = r.borrow_mut();
        r.depth += 1;
        r.depth
    });
    Entry {
        depth,
        _thread: PhantomData,
    }
}

impl Entry {
    #[cfg(test)]
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Decide what to do with `record` at this depth.
    pub fn admit(&self, record: &[u8]) -> Admission {
        if self.depth < 2 {
            return Admission::Proceed;
        }
        if self.depth > MAX_DEPTH {
            return Admission::Dropped;
        }
        RECURSION.with(|r| {
            let mut r = r.borrow_mut();
            if r.pending.is_some() {
                return Admission::Dropped;
            }
            let mut text = format!(
                "[F][ ERROR!!! maplog append recursive calls!!!, count:{} ",
                self.depth
            );
            let end = record.len().min(MAX_RECORD_TEXT);
            text.push_str(&String::from_utf8_lossy(&record[..end]));
            if !text.ends_with('\n') {
                text.push('\n');
            }
            r.pending = Some(text.clone());
            Admission::Diverted(text)
        })
    }

    /// Take the stashed diagnostic. Only the outermost call gets it.
    pub fn take_pending(&self) -> Option<String> {
        if self.depth != 1 {
            return None;
        }
        RECURSION.with(|r| r.borrow_mut().pending.take())
    }
}

impl Drop for Entry {
    fn drop(&mut self) {
        RECURSION.with(|r| {
            let mut r = r.borrow_mut();
            r.depth = r.depth.saturating_sub(1);
        });
    }
}

#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Admission {
    /// Not nested, append normally.
    Proceed,
    /// Nested. The diagnostic goes to the console only and is persisted
    /// later by the outermost call.
    Diverted(String),
    Dropped,
}
