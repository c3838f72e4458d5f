// Copyright 2021 Twitter, Inc.
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors produced by the engine.
///
/// Only `Config` and `CreateDirectory` ever reach a caller, from
/// `Config::builder(..).build()` and `Engine::open`. Everything else is
/// absorbed on the append path and reported to the console.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum Error {
    #[error("invalid configuration: {0}")]
    Config(&'static str),
    #[error("failed to create directory {path}: {source}")]
    CreateDirectory { path: PathBuf, source: io::Error },
    #[error("open file error: {source}, path:{}", .path.display())]
    Open { path: PathBuf, source: io::Error },
    #[error("write file error:{code}")]
    Write { code: i32, source: io::Error },
    #[error("write file error:{code}, rollback failed: {source}")]
    Rollback { code: i32, source: io::Error },
    #[error("no log file is open")]
    NotOpen,
    #[error("source and destination are the same file: {0}")]
    SamePath(PathBuf),
    #[error("merge of {src} into {dst} copied {copied} of {expected} bytes")]
    Merge {
        src: PathBuf,
        dst: PathBuf,
        copied: u64,
        expected: u64,
    },
    #[error(transparent)]
    Io(#[from] io::Error),
}
