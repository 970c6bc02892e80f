//! Contract between the channel table and a voice device.

use std::sync::Arc;

use cm_ir::ChunkSource;

/// Per-channel read callback context.
///
/// Carries the channel it was bound to and a shared reference to the chunk
/// buffer. The device calls [`read`](Self::read) from its render path without
/// touching the channel table.
#[derive(Clone, Debug)]
pub struct ChunkReader {
    channel: u8,
    data: Arc<[u8]>,
}

impl ChunkReader {
    pub fn new(channel: u8, data: Arc<[u8]>) -> Self {
        Self { channel, data }
    }

    /// Channel this reader was bound to by `play`.
    pub fn channel(&self) -> u8 {
        self.channel
    }

    /// Copy `staging.len()` samples starting at `wpos` into `staging`.
    ///
    /// # Panics
    ///
    /// Panics if the range runs past the chunk buffer. The device's waveform
    /// length is the only bound honoured here.
    pub fn read(&self, staging: &mut [u8], wpos: usize) {
        staging.copy_from_slice(&self.data[wpos..wpos + staging.len()]);
    }
}

/// What the device needs to play one channel.
///
/// `len` is the last readable sample plus one; when `loop_len` is non-zero
/// the device wraps from `len` back to `len - loop_len`.
#[derive(Clone, Debug)]
pub struct Waveform {
    /// Interleaved channel count (always 1)
    pub channels: u8,
    /// Bits per sample (always 8)
    pub bits: u8,
    /// Source playback rate in Hz
    pub frequency: u32,
    /// Playable length in samples
    pub len: u32,
    /// Loop length in samples (0 = one-shot)
    pub loop_len: u32,
    /// Sample source
    pub reader: ChunkReader,
}

impl Waveform {
    /// Build the waveform for `source` bound to `channel`.
    pub fn for_chunk(channel: u8, source: &ChunkSource, frequency: u16) -> Self {
        Self {
            channels: 1,
            bits: 8,
            frequency: frequency as u32,
            len: source.play_len(),
            loop_len: source.loop_len as u32,
            reader: ChunkReader::new(channel, source.data.clone()),
        }
    }

    pub fn is_looping(&self) -> bool {
        self.loop_len > 0
    }

    /// First sample of the loop region.
    pub fn loop_start(&self) -> u32 {
        self.len - self.loop_len
    }
}

/// A bank of hardware voices, one per channel slot.
///
/// All calls come from the control path with the channel table locked.
/// Implementations render on their own schedule and must not call back into
/// the table from `start_channel` or `stop_channel`.
pub trait VoiceDevice {
    /// Rate the device outputs samples at.
    fn output_sample_rate(&self) -> u32;

    /// Start (or restart) playback on `slot`, replacing whatever it played.
    fn start_channel(&mut self, slot: u8, wave: Waveform);

    /// Silence `slot`.
    fn stop_channel(&mut self, slot: u8);

    /// Set per-side gains in `[0.0, 1.0]`.
    fn set_channel_volume(&mut self, slot: u8, left: f32, right: f32);

    /// Current read cursor of `slot`, in source samples.
    fn channel_position(&self, slot: u8) -> u32;

    /// Move the read cursor of `slot`.
    fn set_channel_position(&mut self, slot: u8, position: u32);
}
