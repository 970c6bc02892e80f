//! Channel mixer core for chunkmix.
//!
//! Owns the fixed table of hardware channels, the contract a voice device
//! must honour, and the sample clock that turns consumed audio into timer
//! events for the sequencer.

mod channel;
mod clock;
mod device;
mod frame;
mod frequency;
#[cfg(test)]
mod mock;
mod persist;
mod table;

pub use channel::Channel;
pub use clock::{SampleClock, TimerCallback, TimerHandle};
pub use device::{ChunkReader, VoiceDevice, Waveform};
pub use frame::Frame;
pub use frequency::{frequency_from_increment, playback_increment, samples_from_ms, volume_to_gain};
pub use persist::{VER_CHANNELS, VER_FREQUENCY};
pub use table::{ChannelTable, NUM_CHANNELS};
