//! Mixer configuration.

use cm_audio::DEFAULT_COMMAND_CAPACITY;

/// Default mixer output rate in Hz.
pub const DEFAULT_SAMPLE_RATE: u32 = 22050;

/// Settings fixed for the lifetime of a [`Controller`](crate::Controller).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MixerConfig {
    /// Output rate of the software device, in Hz
    pub sample_rate: u32,
    /// Capacity of the control-to-render command ring
    pub command_capacity: usize,
}

impl MixerConfig {
    pub fn with_sample_rate(mut self, sample_rate: u32) -> Self {
        self.sample_rate = sample_rate;
        self
    }
}

impl Default for MixerConfig {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            command_capacity: DEFAULT_COMMAND_CAPACITY,
        }
    }
}
