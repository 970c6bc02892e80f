//! Voice: render-side playback of one channel slot.

use arrayvec::ArrayVec;
use cm_engine::{playback_increment, Frame, Waveform};

/// Samples pulled from the chunk reader per refill.
const STAGING_LEN: usize = 64;

/// A single voice producing audio from a chunk waveform.
pub(crate) struct Voice {
    /// Waveform handed over by the last start
    wave: Option<Waveform>,
    /// Is the voice currently producing audio?
    playing: bool,
    /// Current position in source samples (24.8 fixed-point)
    position: u32,
    /// Playback increment (24.8 fixed-point)
    increment: u32,
    left_gain: f32,
    right_gain: f32,
    /// Samples most recently read from the chunk
    staging: ArrayVec<u8, STAGING_LEN>,
    /// Source index of `staging[0]`
    staged_from: u32,
}

impl Voice {
    pub(crate) fn new() -> Self {
        Self {
            wave: None,
            playing: false,
            position: 0,
            increment: 0,
            left_gain: 0.0,
            right_gain: 0.0,
            staging: ArrayVec::new(),
            staged_from: 0,
        }
    }

    /// Start `wave` from its first sample. Gain carries over from before.
    pub(crate) fn start(&mut self, wave: Waveform, sample_rate: u32) {
        let frequency = wave.frequency.min(u16::MAX as u32) as u16;
        self.increment = playback_increment(frequency, sample_rate);
        self.position = 0;
        self.wave = Some(wave);
        self.playing = true;
        self.staging.clear();
    }

    /// Silence the voice and drop its gain.
    pub(crate) fn stop(&mut self) {
        self.playing = false;
        self.wave = None;
        self.left_gain = 0.0;
        self.right_gain = 0.0;
        self.staging.clear();
    }

    pub(crate) fn set_gain(&mut self, left: f32, right: f32) {
        self.left_gain = left;
        self.right_gain = right;
    }

    /// Move to source sample `position`. Cursors past the 24-bit range pin
    /// to its end.
    pub(crate) fn seek(&mut self, position: u32) {
        self.position = position.saturating_mul(256);
        self.staging.clear();
    }

    /// Integer source-sample index of the cursor.
    pub(crate) fn position(&self) -> u32 {
        self.position >> 8
    }

    pub(crate) fn is_playing(&self) -> bool {
        self.playing
    }

    /// Mix this voice into `out`, advancing the cursor one step per frame.
    pub(crate) fn render_into(&mut self, out: &mut [Frame]) {
        let Self {
            wave,
            playing,
            position,
            increment,
            left_gain,
            right_gain,
            staging,
            staged_from,
        } = self;
        let Some(wave) = wave.as_ref() else {
            return;
        };
        if !*playing {
            return;
        }

        for frame in out.iter_mut() {
            if !wrap_cursor(position, wave) {
                *playing = false;
                return;
            }
            let idx = *position >> 8;

            if idx < *staged_from || idx >= *staged_from + staging.len() as u32 {
                let count = (wave.len - idx).min(STAGING_LEN as u32) as usize;
                staging.clear();
                staging.extend(core::iter::repeat(0).take(count));
                wave.reader.read(&mut staging[..], idx as usize);
                *staged_from = idx;
            }

            let raw = staging[(idx - *staged_from) as usize] as i8;
            let value = raw as i16 * 256;
            frame.mix(Frame::with_gain(value, *left_gain, *right_gain));

            *position = position.wrapping_add(*increment);
        }
        if !wrap_cursor(position, wave) {
            *playing = false;
        }
    }
}

/// Fold a cursor that ran past the end back into the loop region.
/// Returns false when a one-shot waveform has finished.
fn wrap_cursor(position: &mut u32, wave: &Waveform) -> bool {
    let idx = *position >> 8;
    if idx < wave.len {
        return true;
    }
    if wave.loop_len == 0 {
        return false;
    }
    let loop_start = wave.len.saturating_sub(wave.loop_len);
    let idx = loop_start + (idx - loop_start) % wave.loop_len;
    *position = (idx << 8) | (*position & 0xFF);
    true
}
