//! Save-state codec for chunkmix.
//!
//! A save state is a small header followed by length-prefixed records of
//! version-gated fields. Writers emit every field the current version knows;
//! readers take the fields the stream's version carries and skip whatever
//! trailing fields a newer writer appended.

mod codec;

pub use codec::{Field, Mode, StateCodec, Version, CURRENT_VERSION, MAGIC};

/// Error type for save-state encoding and decoding.
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    /// Stream does not start with the save-state magic
    #[error("not a chunkmix save state")]
    BadMagic,
    /// Stream ended inside the header or a record
    #[error("save state is truncated")]
    Truncated,
    /// A reader consumed more bytes than the record holds
    #[error("record of {len} bytes overrun: {consumed} bytes read")]
    RecordOverrun { len: u16, consumed: u64 },
    /// A writer produced a record too large for its length prefix
    #[error("record of {0} bytes exceeds the 65535-byte limit")]
    RecordTooLarge(u64),
    /// Primitive field read or write failed
    #[error("field codec error: {0}")]
    Codec(#[from] binrw::Error),
}
