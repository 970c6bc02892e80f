//! Chunk descriptors.

use alloc::sync::Arc;
use slotmap::{Key, KeyData};

slotmap::new_key_type! {
    /// Key for referencing chunk buffers in a [`ChunkBank`](crate::ChunkBank).
    pub struct ChunkKey;
}

impl ChunkKey {
    /// Opaque 64-bit form of the key, as stored in save states.
    pub fn to_bits(self) -> u64 {
        self.data().as_ffi()
    }

    /// Rebuild a key from [`to_bits`](Self::to_bits) output.
    pub fn from_bits(bits: u64) -> Self {
        KeyData::from_ffi(bits).into()
    }
}

/// Immutable description of a playable chunk.
///
/// `data` is shared with the bank that owns it; cloning a `ChunkSource` never
/// copies sample data. A `loop_len` of zero means the chunk plays once.
///
/// Loop bounds are not validated: `loop_start + loop_len <= len` is the
/// asset pipeline's responsibility.
#[derive(Clone, Debug)]
pub struct ChunkSource {
    /// Bank entry this chunk was taken from
    pub key: ChunkKey,
    /// Signed 8-bit mono samples
    pub data: Arc<[u8]>,
    /// Total length in samples
    pub len: u16,
    /// First sample of the loop region
    pub loop_start: u16,
    /// Loop region length in samples (0 = no loop)
    pub loop_len: u16,
}

impl ChunkSource {
    /// Describe a chunk without a loop.
    pub fn new(key: ChunkKey, data: Arc<[u8]>, len: u16) -> Self {
        Self {
            key,
            data,
            len,
            loop_start: 0,
            loop_len: 0,
        }
    }

    /// Set the loop region.
    pub fn with_loop(mut self, loop_start: u16, loop_len: u16) -> Self {
        self.loop_start = loop_start;
        self.loop_len = loop_len;
        self
    }

    /// Returns true if the chunk has a loop region.
    pub fn is_looping(&self) -> bool {
        self.loop_len > 0
    }

    /// One past the last sample the device may read.
    ///
    /// Looping chunks stop at the end of their loop region, anything after
    /// it is never heard.
    pub fn play_len(&self) -> u32 {
        if self.is_looping() {
            self.loop_start as u32 + self.loop_len as u32
        } else {
            self.len as u32
        }
    }
}
