//! Instrumented device for unit tests.

use crate::device::{VoiceDevice, Waveform};
use crate::table::NUM_CHANNELS;

#[derive(Debug, Default)]
pub(crate) struct RecordingDevice {
    pub rate: u32,
    pub starts: Vec<(u8, Waveform)>,
    pub stops: Vec<u8>,
    pub volumes: Vec<(u8, f32, f32)>,
    pub positions: [u32; NUM_CHANNELS],
}

impl RecordingDevice {
    pub fn new(rate: u32) -> Self {
        Self {
            rate,
            ..Default::default()
        }
    }
}

impl VoiceDevice for RecordingDevice {
    fn output_sample_rate(&self) -> u32 {
        self.rate
    }

    fn start_channel(&mut self, slot: u8, wave: Waveform) {
        self.positions[slot as usize] = 0;
        self.starts.push((slot, wave));
    }

    fn stop_channel(&mut self, slot: u8) {
        self.stops.push(slot);
    }

    fn set_channel_volume(&mut self, slot: u8, left: f32, right: f32) {
        self.volumes.push((slot, left, right));
    }

    fn channel_position(&self, slot: u8) -> u32 {
        self.positions[slot as usize]
    }

    fn set_channel_position(&mut self, slot: u8, position: u32) {
        self.positions[slot as usize] = position;
    }
}
