// Copyright 2021 Twitter, Inc.
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

/// Transforms a plain record into the bytes which are staged and persisted.
///
/// Compression and encryption live behind this trait. Implementations which
/// need a key should take it at construction time. Encoded blocks are written
/// back to back with no extra framing, so a codec whose output must be parsed
/// later is expected to be self-delimiting.
pub trait Codec: Send + Sync {
    fn encode(&self, input: &[u8], output: &mut Vec<u8>);
}

/// A codec which stages records exactly as they were given.
#[derive(Copy, Clone, Debug, Default)]
pub struct Plain;

impl Codec for Plain {
    fn encode(&self, input: &[u8], output: &mut Vec<u8>) {
        output.extend_from_slice(input);
    }
}
