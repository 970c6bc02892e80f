//! Ordered, version-gated field codec.

use std::io::Cursor;

use binrw::{BinReaderExt, BinResult, BinWriterExt};

use crate::StateError;

/// Save-state format version.
pub type Version = u16;

/// Version written by [`StateCodec::saver`].
pub const CURRENT_VERSION: Version = 3;

/// Magic bytes at the start of every save state.
pub const MAGIC: [u8; 4] = *b"CMXS";

const HEADER_LEN: usize = MAGIC.len() + 2;

/// Direction a codec moves data in.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mode {
    Save,
    Load,
}

/// A value that can be stored as a save-state field (little-endian).
pub trait Field: Sized {
    fn write_to(&self, stream: &mut Cursor<Vec<u8>>) -> BinResult<()>;
    fn read_from(stream: &mut Cursor<Vec<u8>>) -> BinResult<Self>;
}

macro_rules! impl_field {
    ($($ty:ty),*) => {
        $(
            impl Field for $ty {
                fn write_to(&self, stream: &mut Cursor<Vec<u8>>) -> BinResult<()> {
                    stream.write_le(self)
                }

                fn read_from(stream: &mut Cursor<Vec<u8>>) -> BinResult<Self> {
                    stream.read_le()
                }
            }
        )*
    };
}

impl_field!(u8, u16, u32, u64, i8, i16, i32);

impl Field for bool {
    fn write_to(&self, stream: &mut Cursor<Vec<u8>>) -> BinResult<()> {
        stream.write_le(&(*self as u8))
    }

    fn read_from(stream: &mut Cursor<Vec<u8>>) -> BinResult<Self> {
        Ok(stream.read_le::<u8>()? != 0)
    }
}

/// Bidirectional save-state stream.
///
/// The same sequence of [`entry`](Self::entry) calls both saves and loads a
/// structure, so a type describes its layout once. Each entry names the
/// version that introduced it: when saving, every entry up to the codec's
/// version is written; when loading, entries newer than the stream's version
/// leave the target value untouched.
pub struct StateCodec {
    mode: Mode,
    version: Version,
    stream: Cursor<Vec<u8>>,
}

impl StateCodec {
    /// Start a save state at [`CURRENT_VERSION`].
    pub fn saver() -> Self {
        Self::saver_with_version(CURRENT_VERSION)
    }

    /// Start a save state at an explicit version.
    pub fn saver_with_version(version: Version) -> Self {
        let mut buf = Vec::with_capacity(256);
        buf.extend_from_slice(&MAGIC);
        buf.extend_from_slice(&version.to_le_bytes());
        let mut stream = Cursor::new(buf);
        stream.set_position(HEADER_LEN as u64);
        Self {
            mode: Mode::Save,
            version,
            stream,
        }
    }

    /// Open a save state for loading, validating its header.
    pub fn loader(bytes: &[u8]) -> Result<Self, StateError> {
        if bytes.len() < HEADER_LEN {
            return Err(StateError::Truncated);
        }
        if bytes[..MAGIC.len()] != MAGIC {
            return Err(StateError::BadMagic);
        }
        let version = u16::from_le_bytes([bytes[4], bytes[5]]);
        let mut stream = Cursor::new(bytes.to_vec());
        stream.set_position(HEADER_LEN as u64);
        Ok(Self {
            mode: Mode::Load,
            version,
            stream,
        })
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn is_saving(&self) -> bool {
        self.mode == Mode::Save
    }

    pub fn is_loading(&self) -> bool {
        self.mode == Mode::Load
    }

    /// Version being written, or the version the loaded stream was written at.
    pub fn version(&self) -> Version {
        self.version
    }

    /// Save or load one field introduced in version `since`.
    pub fn entry<T: Field>(&mut self, value: &mut T, since: Version) -> Result<(), StateError> {
        if since > self.version {
            return Ok(());
        }
        match self.mode {
            Mode::Save => value.write_to(&mut self.stream)?,
            Mode::Load => *value = T::read_from(&mut self.stream).map_err(truncated)?,
        }
        Ok(())
    }

    /// Save or load a group of entries framed by a `u16` byte length.
    ///
    /// On load, bytes the closure does not consume are skipped, which lets
    /// older readers step over fields appended by newer writers.
    pub fn record<F>(&mut self, f: F) -> Result<(), StateError>
    where
        F: FnOnce(&mut Self) -> Result<(), StateError>,
    {
        match self.mode {
            Mode::Save => {
                let start = self.stream.position();
                self.stream.write_le(&0u16)?;
                f(self)?;
                let end = self.stream.position();
                let len = end - start - 2;
                if len > u16::MAX as u64 {
                    return Err(StateError::RecordTooLarge(len));
                }
                self.stream.set_position(start);
                self.stream.write_le(&(len as u16))?;
                self.stream.set_position(end);
            }
            Mode::Load => {
                let len: u16 = self.stream.read_le().map_err(truncated)?;
                let start = self.stream.position();
                let end = start + len as u64;
                if end > self.stream.get_ref().len() as u64 {
                    return Err(StateError::Truncated);
                }
                f(self)?;
                let consumed = self.stream.position() - start;
                if consumed > len as u64 {
                    return Err(StateError::RecordOverrun { len, consumed });
                }
                self.stream.set_position(end);
            }
        }
        Ok(())
    }

    /// Finish a save, returning the encoded bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.stream.into_inner()
    }
}

fn truncated(err: binrw::Error) -> StateError {
    match err {
        binrw::Error::Io(ref io) if io.kind() == std::io::ErrorKind::UnexpectedEof => {
            StateError::Truncated
        }
        other => StateError::Codec(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Default, PartialEq)]
    struct Sample {
        flag: bool,
        level: u8,
        offset: u32,
        extra: u16,
    }

    impl Sample {
        fn save_or_load(&mut self, codec: &mut StateCodec) -> Result<(), StateError> {
            codec.record(|c| {
                c.entry(&mut self.flag, 1)?;
                c.entry(&mut self.level, 1)?;
                c.entry(&mut self.offset, 2)?;
                c.entry(&mut self.extra, 3)
            })
        }
    }

    #[test]
    fn header_carries_magic_and_version() {
        let bytes = StateCodec::saver().into_bytes();
        assert_eq!(&bytes[..4], b"CMXS");
        assert_eq!(u16::from_le_bytes([bytes[4], bytes[5]]), CURRENT_VERSION);
        assert_eq!(StateCodec::loader(&bytes).unwrap().version(), CURRENT_VERSION);
    }

    #[test]
    fn fields_roundtrip_at_same_version() {
        let mut saver = StateCodec::saver_with_version(3);
        let mut original = Sample { flag: true, level: 200, offset: 123_456, extra: 7 };
        original.save_or_load(&mut saver).unwrap();
        let bytes = saver.into_bytes();

        let mut loader = StateCodec::loader(&bytes).unwrap();
        let mut restored = Sample::default();
        restored.save_or_load(&mut loader).unwrap();
        assert_eq!(restored, original);
    }

    #[test]
    fn fields_newer_than_stream_keep_defaults() {
        let mut saver = StateCodec::saver_with_version(1);
        Sample { flag: true, level: 9, offset: 99, extra: 5 }
            .save_or_load(&mut saver)
            .unwrap();
        let bytes = saver.into_bytes();

        let mut loader = StateCodec::loader(&bytes).unwrap();
        let mut restored = Sample { flag: false, level: 0, offset: 42, extra: 11 };
        restored.save_or_load(&mut loader).unwrap();
        assert_eq!(restored, Sample { flag: true, level: 9, offset: 42, extra: 11 });
    }

    #[test]
    fn older_reader_skips_unknown_trailing_fields() {
        let mut saver = StateCodec::saver_with_version(3);
        for level in [10u8, 20] {
            Sample { flag: true, level, offset: 1, extra: 0xBEEF }
                .save_or_load(&mut saver)
                .unwrap();
        }
        let bytes = saver.into_bytes();

        // A reader that only knows the version-1 fields.
        let mut loader = StateCodec::loader(&bytes).unwrap();
        let mut levels = Vec::new();
        for _ in 0..2 {
            let mut level = 0u8;
            loader
                .record(|c| {
                    let mut flag = false;
                    c.entry(&mut flag, 1)?;
                    c.entry(&mut level, 1)
                })
                .unwrap();
            levels.push(level);
        }
        assert_eq!(levels, [10, 20]);
    }

    #[test]
    fn reading_past_record_end_is_an_error() {
        let mut saver = StateCodec::saver();
        saver.record(|c| c.entry(&mut 1u8, 1)).unwrap();
        saver.entry(&mut 0xFFFF_FFFFu32, 1).unwrap();
        let bytes = saver.into_bytes();

        let mut loader = StateCodec::loader(&bytes).unwrap();
        let err = loader.record(|c| c.entry(&mut 0u32, 1)).unwrap_err();
        assert!(matches!(err, StateError::RecordOverrun { len: 1, consumed: 4 }));
    }

    #[test]
    fn bad_magic_is_rejected() {
        let err = StateCodec::loader(b"RIFF\x02\x00").err().unwrap();
        assert!(matches!(err, StateError::BadMagic));
    }

    #[test]
    fn short_stream_is_truncated() {
        assert!(matches!(StateCodec::loader(b"CMX").err().unwrap(), StateError::Truncated));

        let mut saver = StateCodec::saver();
        Sample::default().save_or_load(&mut saver).unwrap();
        let mut bytes = saver.into_bytes();
        bytes.truncate(bytes.len() - 2);
        let mut loader = StateCodec::loader(&bytes).unwrap();
        let err = Sample::default().save_or_load(&mut loader).unwrap_err();
        assert!(matches!(err, StateError::Truncated));
    }

    #[test]
    fn bool_is_one_byte() {
        let mut saver = StateCodec::saver();
        saver.entry(&mut true, 1).unwrap();
        assert_eq!(saver.into_bytes().len(), HEADER_LEN + 1);
    }
}
