// Copyright 2021 Twitter, Inc.
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! This crate provides `LogBuffer`, a fixed-capacity staging area for encoded
//! log records.
//!
//! A `LogBuffer` is preferably backed by a memory-mapped file. Bytes written
//! into a mapped buffer are in the page cache as soon as `write` returns, so a
//! process which dies before draining the buffer leaves them behind in the
//! file. Re-opening the same file recovers the staged bytes, which can then be
//! drained as usual. When the file can not be created or mapped the buffer
//! falls back to plain heap memory.
//!
//! Records pass through a `Codec` on their way in. The buffer never inspects
//! the encoded bytes and preserves no record boundaries: `flush` returns the
//! concatenation of everything written since the previous flush.
//!
//! A `LogBuffer` does no locking of its own. Owners that share one between
//! threads must serialize `write` and `flush`.
//!
//! ```no_run
//! use logbuf::{LogBuffer, Plain};
//! use std::sync::Arc;
//!
//! let mut buffer = LogBuffer::open("/tmp/app.mmap0", 150 * 1024, Arc::new(Plain));
//! assert!(buffer.write(b"hello\n"));
//! let staged = buffer.flush();
//! assert_eq!(staged, b"hello\n");
//! ```

mod codec;
mod error;
mod mapped;

pub use codec::{Codec, Plain};
pub use error::Error;

use mapped::Mapped;
use std::path::Path;
use std::sync::Arc;

enum Storage {
    Mapped(Mapped),
    Heap(Box<[u8]>),
}

impl Storage {
    fn payload(&self) -> &[u8] {
        match self {
            Self::Mapped(m) => m.payload(),
            Self::Heap(h) => h,
        }
    }

    fn payload_mut(&mut self) -> &mut [u8] {
        match self {
            Self::Mapped(m) => m.payload_mut(),
            Self::Heap(h) => h,
        }
    }
}

/// A fixed-capacity buffer of encoded log records.
pub struct LogBuffer {
    storage: Storage,
    capacity: usize,
    len: usize,
    codec: Arc<dyn Codec>,
    scratch: Vec<u8>,
}

impl LogBuffer {
    /// Create a buffer backed by heap memory. Its contents are lost if the
    /// process exits before they are drained.
    pub fn heap(capacity: usize, codec: Arc<dyn Codec>) -> Self {
        Self {
            storage: Storage::Heap(vec![0; capacity].into_boxed_slice()),
            capacity,
            len: 0,
            codec,
            scratch: Vec::new(),
        }
    }

    /// Create a buffer backed by the file at `path`.
    ///
    /// If the file already holds a valid staged payload, for example because
    /// the previous process crashed, the payload is kept and will be returned
    /// by the next `flush`.
    pub fn mapped<P: AsRef<Path>>(
        path: P,
        capacity: usize,
        codec: Arc<dyn Codec>,
    ) -> Result<Self, Error> {
        if capacity == 0 || capacity > u32::MAX as usize {
            return Err(Error::InvalidCapacity);
        }
        let (mapped, len) = Mapped::open(path.as_ref(), capacity)?;
        Ok(Self {
            storage: Storage::Mapped(mapped),
            capacity,
            len,
            codec,
            scratch: Vec::new(),
        })
    }

    /// Create a buffer backed by the file at `path`, falling back to heap
    /// memory if the file can not be mapped.
    pub fn open<P: AsRef<Path>>(path: P, capacity: usize, codec: Arc<dyn Codec>) -> Self {
        match Self::mapped(path.as_ref(), capacity, codec.clone()) {
            Ok(buffer) => buffer,
            Err(e) => {
                log::warn!("falling back to heap log buffer: {}", e);
                Self::heap(capacity, codec)
            }
        }
    }

    /// Encode and append a record. Returns `false`, leaving the existing
    /// contents untouched, if the encoded record does not fit.
    pub fn write(&mut self, record: &[u8]) -> bool {
        let mut scratch = std::mem::take(&mut self.scratch);
        scratch.clear();
        self.codec.encode(record, &mut scratch);

        let fits = self.append_encoded(&scratch);
        self.scratch = scratch;
        fits
    }

    fn append_encoded(&mut self, encoded: &[u8]) -> bool {
        let end = match self.len.checked_add(encoded.len()) {
            Some(end) if end <= self.capacity => end,
            _ => return false,
        };

        let start = self.len;
        self.storage.payload_mut()[start..end].copy_from_slice(encoded);
        self.set_len(end);
        true
    }

    /// Encode a record without staging it. Used when records are persisted
    /// immediately but must still go through the codec.
    pub fn encode(&self, record: &[u8]) -> Vec<u8> {
        let mut encoded = Vec::with_capacity(record.len());
        self.codec.encode(record, &mut encoded);
        encoded
    }

    /// Drain and return every staged byte, leaving the buffer empty.
    pub fn flush(&mut self) -> Vec<u8> {
        let staged = self.storage.payload()[..self.len].to_vec();
        self.set_len(0);
        staged
    }

    fn set_len(&mut self, len: usize) {
        self.len = len;
        if let Storage::Mapped(ref mut m) = self.storage {
            m.set_len(len);
        }
    }

    /// The number of staged bytes.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The maximum number of staged bytes.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns `true` if the buffer is backed by a mapped file.
    pub fn is_mapped(&self) -> bool {
        matches!(self.storage, Storage::Mapped(_))
    }

    /// The path of the backing file, if any.
    pub fn path(&self) -> Option<&Path> {
        match &self.storage {
            Storage::Mapped(m) => Some(m.path()),
            Storage::Heap(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Upper;

    impl Codec for Upper {
        fn encode(&self, input: &[u8], output: &mut Vec<u8>) {
            output.extend(input.iter().map(|b| b.to_ascii_uppercase()));
        }
    }

    #[test]
    fn heap_round_trip() {
        let mut buffer = LogBuffer::heap(64, Arc::new(Plain));
        assert!(!buffer.is_mapped());
        assert!(buffer.write(b"abc"));
        assert!(buffer.write(b"def"));
        assert_eq!(buffer.len(), 6);

        assert_eq!(buffer.flush(), b"abcdef");
        assert!(buffer.is_empty());

        // a full-capacity write succeeds once drained
        assert!(buffer.write(&[b'x'; 64]));
        assert_eq!(buffer.flush().len(), 64);
    }

    #[test]
    fn oversized_write_is_rejected() {
        let mut buffer = LogBuffer::heap(8, Arc::new(Plain));
        assert!(buffer.write(b"12345"));
        assert!(!buffer.write(b"6789"));
        assert_eq!(buffer.len(), 5);
        assert_eq!(buffer.flush(), b"12345");
    }

    #[test]
    fn records_pass_through_codec() {
        let mut buffer = LogBuffer::heap(16, Arc::new(Upper));
        assert!(buffer.write(b"hi"));
        assert_eq!(buffer.encode(b"ok"), b"OK");
        assert_eq!(buffer.flush(), b"HI");
    }

    #[test]
    fn mapped_contents_survive_a_crash() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.mmap3");

        let mut buffer = LogBuffer::mapped(&path, 128, Arc::new(Plain)).unwrap();
        assert!(buffer.is_mapped());
        assert!(buffer.write(b"before the crash"));

        // skip the destructor, as a dying process would
        std::mem::forget(buffer);

        let mut buffer = LogBuffer::mapped(&path, 128, Arc::new(Plain)).unwrap();
        assert_eq!(buffer.len(), 16);
        assert_eq!(buffer.flush(), b"before the crash");
        assert_eq!(buffer.len(), 0);
    }

    #[test]
    fn drop_zeroes_mapped_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.mmap0");

        let mut buffer = LogBuffer::mapped(&path, 32, Arc::new(Plain)).unwrap();
        assert!(buffer.write(b"secret"));
        drop(buffer);

        let contents = std::fs::read(&path).unwrap();
        assert!(contents.iter().all(|b| *b == 0));

        let buffer = LogBuffer::mapped(&path, 32, Arc::new(Plain)).unwrap();
        assert!(buffer.is_empty());
    }

    #[test]
    fn resized_file_discards_stale_payload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.mmap1");

        let mut buffer = LogBuffer::mapped(&path, 32, Arc::new(Plain)).unwrap();
        assert!(buffer.write(b"stale"));
        std::mem::forget(buffer);

        let buffer = LogBuffer::mapped(&path, 64, Arc::new(Plain)).unwrap();
        assert!(buffer.is_empty());
        assert_eq!(buffer.capacity(), 64);
    }

    #[test]
    fn open_falls_back_to_heap() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("test.mmap0");

        let mut buffer = LogBuffer::open(&path, 16, Arc::new(Plain));
        assert!(!buffer.is_mapped());
        assert!(buffer.path().is_none());
        assert!(buffer.write(b"still works"));
        assert_eq!(buffer.flush(), b"still works");
    }
}
