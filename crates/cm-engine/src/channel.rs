//! Channel state for one hardware slot.

use cm_ir::ChunkSource;

use crate::device::Waveform;

/// Mixing state for a single channel slot.
///
/// The default value is the inert state every slot starts in and returns to
/// on stop.
#[derive(Clone, Debug, Default)]
pub struct Channel {
    /// Is the slot producing audio?
    pub active: bool,
    /// Current volume (0-255)
    pub volume: u8,
    /// Bound chunk (only meaningful while active)
    pub source: Option<ChunkSource>,
    /// Playback increment (24.8 fixed-point)
    pub increment: u32,
    /// Requested playback rate in Hz
    pub frequency: u16,
}

impl Channel {
    /// Fresh state for a slot that just started `source`.
    ///
    /// Volume starts at zero; the table applies the requested volume after
    /// comparing it with what the slot had before.
    pub fn started(source: ChunkSource, frequency: u16, increment: u32) -> Self {
        Self {
            active: true,
            volume: 0,
            source: Some(source),
            increment,
            frequency,
        }
    }

    /// Return to the inert state.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Waveform to hand the device for this channel, if one is bound.
    pub fn waveform(&self, slot: u8) -> Option<Waveform> {
        let source = self.source.as_ref()?;
        Some(Waveform::for_chunk(slot, source, self.frequency))
    }

    /// Loop region `(start, len)` of the bound chunk, or `(0, 0)` when idle.
    pub fn loop_region(&self) -> (u16, u16) {
        self.source
            .as_ref()
            .map_or((0, 0), |s| (s.loop_start, s.loop_len))
    }
}
