// Copyright 2021 Twitter, Inc.
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

use crate::Error;
use memmap2::MmapMut;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

const MAGIC: [u8; 4] = *b"MLB1";

/// Bytes reserved at the front of the mapping: magic followed by the
/// little-endian length of the staged payload.
pub(crate) const HEADER_LEN: usize = 8;

/// A memory-mapped staging region.
///
/// The region is zeroed and unmapped when dropped, so encoded records do not
/// outlive the buffer on disk.
pub(crate) struct Mapped {
    path: PathBuf,
    mmap: MmapMut,
}

impl Mapped {
    /// Maps the file at `path`, creating or resizing it to hold `capacity`
    /// payload bytes. Returns the mapping and the length of any payload left
    /// behind by a previous process.
    pub fn open(path: &Path, capacity: usize) -> Result<(Self, usize), Error> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .map_err(|source| Error::Open {
                path: path.to_owned(),
                source,
            })?;

        let size = (HEADER_LEN + capacity) as u64;
        let current = file
            .metadata()
            .map_err(|source| Error::Open {
                path: path.to_owned(),
                source,
            })?
            .len();

        if current != size {
            file.set_len(size).map_err(|source| Error::Resize {
                path: path.to_owned(),
                source,
            })?;
        }

        // SAFETY: the file is private to the owning appender and only ever
        // accessed through this mapping while it is alive.
        let mmap = unsafe { MmapMut::map_mut(&file) }.map_err(|source| Error::Map {
            path: path.to_owned(),
            source,
        })?;

        let mut mapped = Self {
            path: path.to_owned(),
            mmap,
        };

        // a resized file can not hold a trustworthy payload
        let recovered = if current == size {
            mapped.recovered_len(capacity)
        } else {
            None
        };

        let len = match recovered {
            Some(len) => len,
            None => {
                mapped.mmap[0..4].copy_from_slice(&MAGIC);
                mapped.set_len(0);
                0
            }
        };

        Ok((mapped, len))
    }

    fn recovered_len(&self, capacity: usize) -> Option<usize> {
        if self.mmap[0..4] != MAGIC {
            return None;
        }
        let mut len = [0; 4];
        len.copy_from_slice(&self.mmap[4..8]);
        let len = u32::from_le_bytes(len) as usize;
        if len > capacity {
            None
        } else {
            Some(len)
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn payload(&self) -> &[u8] {
        &self.mmap[HEADER_LEN..]
    }

    pub fn payload_mut(&mut self) -> &mut [u8] {
        &mut self.mmap[HEADER_LEN..]
    }

    /// Records the staged length. Callers copy the payload first and publish
    /// the length afterwards.
    pub fn set_len(&mut self, len: usize) {
        self.mmap[4..8].copy_from_slice(&(len as u32).to_le_bytes());
    }
}

impl Drop for Mapped {
    fn drop(&mut self) {
        self.mmap.fill(0);
        if let Err(e) = self.mmap.flush() {
            log::warn!(
                "failed to flush zeroed buffer {}: {}",
                self.path.display(),
                e
            );
        }
    }
}
