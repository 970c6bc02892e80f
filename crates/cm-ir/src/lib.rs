//! Core data types for the chunkmix channel mixer.
//!
//! A chunk is a single digitized sound: a buffer of signed 8-bit samples with
//! an optional loop region. Chunks live in a [`ChunkBank`]; channels only ever
//! hold shared references to bank buffers plus the descriptor needed to play them.
//!
//! Designed to be `no_std` compatible with the `alloc` crate.

#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

mod bank;
mod chunk;

pub use bank::{Chunk, ChunkBank};
pub use chunk::{ChunkKey, ChunkSource};
