//! Rate, time and volume conversions.
//!
//! Playback increments are 24.8 fixed-point: the number of source samples
//! consumed per output sample, times 256.

/// Compute the 24.8 fixed-point playback increment for a chunk played at
/// `frequency` Hz on a device running at `sample_rate` Hz.
pub fn playback_increment(frequency: u16, sample_rate: u32) -> u32 {
    if sample_rate == 0 {
        return 0;
    }
    ((frequency as u32) << 8) / sample_rate
}

/// Recover the playback frequency from a stored increment.
///
/// Exact whenever the increment was produced from a frequency that divides
/// evenly into the output rate; otherwise rounds down.
pub fn frequency_from_increment(increment: u32, sample_rate: u32) -> u16 {
    let freq = (increment as u64 * sample_rate as u64) >> 8;
    freq.min(u16::MAX as u64) as u16
}

/// Number of output samples in `ms` milliseconds, rounded down.
pub fn samples_from_ms(ms: u32, sample_rate: u32) -> u64 {
    (ms as u64 * sample_rate as u64) / 1000
}

/// Convert a 0-255 channel volume to a device gain in `[0.0, 1.0]`.
pub fn volume_to_gain(volume: u8) -> f32 {
    (volume as f32 / 255.0).clamp(0.0, 1.0)
}
