//! Audio backends for chunkmix.
//!
//! [`SoftwareDevice`] is the [`VoiceDevice`](cm_engine::VoiceDevice) the
//! channel table talks to; its paired [`VoiceRenderer`] turns the commands it
//! receives into stereo frames on the audio thread. [`CpalOutput`] carries
//! those frames to the sound card.

mod cpal_backend;
mod soft_device;
mod traits;
mod voice;

pub use cpal_backend::CpalOutput;
pub use soft_device::{SoftwareDevice, TimerControl, VoiceCommand, VoiceRenderer, DEFAULT_COMMAND_CAPACITY};
pub use traits::{AudioError, AudioOutput};
