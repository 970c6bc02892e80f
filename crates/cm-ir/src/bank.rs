//! Chunk bank: owner of all chunk sample buffers.

use alloc::sync::Arc;
use arrayvec::ArrayString;
use slotmap::SlotMap;

use crate::chunk::{ChunkKey, ChunkSource};

/// A named sample buffer held by the bank.
#[derive(Clone, Debug)]
pub struct Chunk {
    /// Chunk name (truncated to 26 bytes)
    pub name: ArrayString<26>,
    /// Signed 8-bit mono samples
    pub data: Arc<[u8]>,
}

/// Asset store that owns chunk buffers and hands out stable keys.
///
/// Save states record [`ChunkKey`]s rather than sample data, so a state can
/// only be restored against the bank (or a rebuilt bank with the same keys)
/// that produced it.
#[derive(Clone, Debug, Default)]
pub struct ChunkBank {
    chunks: SlotMap<ChunkKey, Chunk>,
}

impl ChunkBank {
    /// Create an empty bank.
    pub fn new() -> Self {
        Self {
            chunks: SlotMap::with_key(),
        }
    }

    /// Add a chunk, returning its key.
    pub fn insert(&mut self, name: &str, data: impl Into<Arc<[u8]>>) -> ChunkKey {
        let mut chunk = Chunk {
            name: ArrayString::new(),
            data: data.into(),
        };
        for c in name.chars() {
            if chunk.name.try_push(c).is_err() {
                break;
            }
        }
        self.chunks.insert(chunk)
    }

    /// Remove a chunk. Channels still playing it keep their own reference.
    pub fn remove(&mut self, key: ChunkKey) -> Option<Chunk> {
        self.chunks.remove(key)
    }

    /// Look up a chunk.
    pub fn get(&self, key: ChunkKey) -> Option<&Chunk> {
        self.chunks.get(key)
    }

    /// Build a descriptor for the whole chunk, clamping its length to `u16::MAX`.
    pub fn source(&self, key: ChunkKey) -> Option<ChunkSource> {
        let chunk = self.chunks.get(key)?;
        let len = chunk.data.len().min(u16::MAX as usize) as u16;
        Some(ChunkSource::new(key, chunk.data.clone(), len))
    }

    /// Rebuild a descriptor from saved fields.
    pub fn resolve(&self, key: ChunkKey, len: u16, loop_start: u16, loop_len: u16) -> Option<ChunkSource> {
        let chunk = self.chunks.get(key)?;
        Some(ChunkSource::new(key, chunk.data.clone(), len).with_loop(loop_start, loop_len))
    }

    /// Number of chunks in the bank.
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    /// Returns true if the bank holds no chunks.
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;
    use alloc::vec::Vec;

    #[test]
    fn source_shares_bank_buffer() {
        let mut bank = ChunkBank::new();
        let key = bank.insert("kick", vec![1u8, 2, 3]);
        let src = bank.source(key).unwrap();
        assert_eq!(src.len, 3);
        assert!(Arc::ptr_eq(&src.data, &bank.get(key).unwrap().data));
    }

    #[test]
    fn long_chunk_length_is_clamped() {
        let mut bank = ChunkBank::new();
        let key = bank.insert("long", vec![0u8; 70_000]);
        assert_eq!(bank.source(key).unwrap().len, u16::MAX);
    }

    #[test]
    fn long_name_is_truncated() {
        let mut bank = ChunkBank::new();
        let key = bank.insert("a name that is far longer than the limit", Vec::<u8>::new());
        assert_eq!(bank.get(key).unwrap().name.len(), 26);
    }

    #[test]
    fn removed_key_no_longer_resolves() {
        let mut bank = ChunkBank::new();
        let key = bank.insert("snare", vec![0u8; 16]);
        bank.remove(key);
        assert!(bank.resolve(key, 16, 0, 0).is_none());
        assert!(bank.is_empty());
    }

    #[test]
    fn resolve_applies_saved_loop() {
        let mut bank = ChunkBank::new();
        let key = bank.insert("pad", vec![0u8; 4000]);
        let src = bank.resolve(key, 4000, 1000, 2000).unwrap();
        assert_eq!((src.len, src.loop_start, src.loop_len), (4000, 1000, 2000));
    }
}
