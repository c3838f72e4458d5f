// Copyright 2021 Twitter, Inc.
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

use std::path::PathBuf;
use thiserror::Error;

/// Errors returned while setting up a mapped buffer.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum Error {
    #[error("capacity must be non-zero and fit in a u32")]
    InvalidCapacity,
    #[error("failed to open buffer file {path}: {source}")]
    Open {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to size buffer file {path}: {source}")]
    Resize {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to map buffer file {path}: {source}")]
    Map {
        path: PathBuf,
        source: std::io::Error,
    },
}
