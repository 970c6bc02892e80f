//! The channel table: play, stop and volume control under one lock.

use cm_ir::ChunkSource;
use parking_lot::Mutex;
use tracing::debug;

use crate::channel::Channel;
use crate::device::{VoiceDevice, Waveform};
use crate::frequency::{playback_increment, volume_to_gain};

/// Number of hardware channels.
pub const NUM_CHANNELS: usize = 4;

pub(crate) struct TableState<D> {
    pub(crate) channels: [Channel; NUM_CHANNELS],
    pub(crate) device: D,
}

/// Fixed table of channels driving a [`VoiceDevice`].
///
/// Every operation holds the table lock for its whole duration, so control
/// calls from several threads (game logic, a sequencer timer, save/restore)
/// never interleave. A device's render loop does not need this lock: each
/// `play` hands the device a fully built [`Waveform`] it reads on its own.
/// Timer callbacks that call back into the table from the render thread do
/// take it, and wait while a control call holds it.
///
/// Channel ids index a fixed array; passing an id `>= NUM_CHANNELS` is a
/// caller bug and panics.
pub struct ChannelTable<D> {
    pub(crate) state: Mutex<TableState<D>>,
}

impl<D: VoiceDevice> ChannelTable<D> {
    /// Create a table with every channel inert.
    pub fn new(device: D) -> Self {
        Self {
            state: Mutex::new(TableState {
                channels: Default::default(),
                device,
            }),
        }
    }

    /// Output rate of the underlying device.
    pub fn output_rate(&self) -> u32 {
        self.state.lock().device.output_sample_rate()
    }

    /// Start `source` on `channel` at `frequency` Hz.
    ///
    /// Always starts from a fresh channel state: the previous chunk, loop
    /// region and increment are discarded, never merged. The device volume
    /// is only pushed when `volume` differs from the channel's previous one.
    pub fn play(&self, channel: u8, source: &ChunkSource, frequency: u16, volume: u8) {
        debug!(channel, frequency, volume, "play channel");
        assert_channel(channel);

        let mut guard = self.state.lock();
        let state = &mut *guard;
        let rate = state.device.output_sample_rate();
        let ch = &mut state.channels[channel as usize];
        let previous_volume = ch.volume;

        *ch = Channel::started(source.clone(), frequency, playback_increment(frequency, rate));
        // The waveform is complete before the device sees it; the render
        // path reads nothing else.
        let wave = Waveform::for_chunk(channel, source, frequency);
        state.device.start_channel(channel, wave);

        ch.volume = volume;
        if previous_volume != volume {
            let gain = volume_to_gain(volume);
            state.device.set_channel_volume(channel, gain, gain);
        }
    }

    /// Silence `channel` and reset it. Stopping an inert channel only
    /// repeats the device call.
    pub fn stop(&self, channel: u8) {
        debug!(channel, "stop channel");
        assert_channel(channel);

        let mut state = self.state.lock();
        state.device.stop_channel(channel);
        state.channels[channel as usize].reset();
    }

    /// Change the volume of `channel` without touching its playback.
    pub fn set_volume(&self, channel: u8, volume: u8) {
        debug!(channel, volume, "set channel volume");
        assert_channel(channel);

        let mut guard = self.state.lock();
        let state = &mut *guard;
        let ch = &mut state.channels[channel as usize];
        if ch.volume != volume {
            ch.volume = volume;
            let gain = volume_to_gain(volume);
            state.device.set_channel_volume(channel, gain, gain);
        }
    }

    /// Silence every channel and reset the whole table.
    pub fn stop_all(&self) {
        debug!("stop all channels");
        let mut state = self.state.lock();
        for slot in 0..NUM_CHANNELS as u8 {
            state.device.stop_channel(slot);
        }
        for ch in state.channels.iter_mut() {
            ch.reset();
        }
    }

    /// Software mixing hook. Intentionally empty: the device pulls samples
    /// itself through each channel's [`ChunkReader`](crate::ChunkReader).
    pub fn mix(&self, _buf: &mut [i8]) {}

    /// Snapshot of one channel.
    pub fn channel(&self, channel: u8) -> Channel {
        assert_channel(channel);
        self.state.lock().channels[channel as usize].clone()
    }

    /// Snapshot of every channel.
    pub fn channels(&self) -> [Channel; NUM_CHANNELS] {
        self.state.lock().channels.clone()
    }

    /// Run `f` against the device with the table locked.
    pub fn with_device<R>(&self, f: impl FnOnce(&mut D) -> R) -> R {
        f(&mut self.state.lock().device)
    }

    /// Tear the table down, returning its device.
    pub fn into_device(self) -> D {
        self.state.into_inner().device
    }
}

fn assert_channel(channel: u8) {
    assert!(
        (channel as usize) < NUM_CHANNELS,
        "channel {} out of range (0..{})",
        channel,
        NUM_CHANNELS
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::RecordingDevice;
    use cm_ir::ChunkKey;
    use std::sync::Arc;

    const RATE: u32 = 22050;

    fn chunk(len: u16) -> ChunkSource {
        ChunkSource::new(ChunkKey::default(), Arc::from(vec![0u8; len as usize]), len)
    }

    fn table() -> ChannelTable<RecordingDevice> {
        ChannelTable::new(RecordingDevice::new(RATE))
    }

    #[test]
    fn play_activates_every_channel() {
        let table = table();
        for (i, freq) in [8000u16, 11025, 22050, 44100].into_iter().enumerate() {
            table.play(i as u8, &chunk(100), freq, 100 + i as u8);
            let ch = table.channel(i as u8);
            assert!(ch.active);
            assert_eq!(ch.volume, 100 + i as u8);
            assert_eq!(ch.increment, ((freq as u32) << 8) / RATE);
        }
    }

    #[test]
    fn looping_chunk_configures_device_loop() {
        let table = table();
        table.play(0, &chunk(4000).with_loop(1000, 2000), 11025, 255);
        assert_eq!(table.channel(0).increment, 128);
        table.with_device(|dev| {
            let (slot, wave) = dev.starts.last().unwrap();
            assert_eq!(*slot, 0);
            assert_eq!(wave.len, 3000);
            assert_eq!(wave.loop_len, 2000);
            assert_eq!(wave.frequency, 11025);
        });
    }

    #[test]
    fn play_pushes_volume_only_when_changed() {
        let table = table();
        table.play(1, &chunk(100), 11025, 128);
        table.play(1, &chunk(100), 11025, 128);
        table.with_device(|dev| {
            assert_eq!(dev.starts.len(), 2);
            assert_eq!(dev.volumes.len(), 1);
        });
    }

    #[test]
    fn replay_discards_previous_loop_and_source() {
        let table = table();
        table.play(2, &chunk(4000).with_loop(1000, 2000), 11025, 200);
        table.play(2, &chunk(500), 22050, 50);

        let ch = table.channel(2);
        assert_eq!(ch.loop_region(), (0, 0));
        assert_eq!(ch.source.as_ref().unwrap().len, 500);
        assert_eq!(ch.volume, 50);
        assert_eq!(ch.increment, 256);
        table.with_device(|dev| {
            let (_, wave) = dev.starts.last().unwrap();
            assert_eq!(wave.loop_len, 0);
            assert_eq!(wave.len, 500);
            assert_eq!(dev.volumes.last().unwrap().1, volume_to_gain(50));
        });
    }

    #[test]
    fn stop_is_idempotent() {
        let table = table();
        table.play(3, &chunk(100), 11025, 90);
        table.stop(3);
        let after_first = table.channel(3);
        table.stop(3);
        let after_second = table.channel(3);

        assert!(!after_second.active);
        assert_eq!(after_first.volume, after_second.volume);
        assert_eq!(after_first.increment, after_second.increment);
        assert!(after_second.source.is_none());
        table.with_device(|dev| assert_eq!(dev.stops, [3, 3]));
    }

    #[test]
    fn set_volume_same_value_updates_device_once() {
        let table = table();
        table.set_volume(0, 77);
        table.set_volume(0, 77);
        table.with_device(|dev| assert_eq!(dev.volumes.len(), 1));
        assert_eq!(table.channel(0).volume, 77);
    }

    #[test]
    fn set_volume_leaves_active_state_alone() {
        let table = table();
        table.set_volume(1, 10);
        assert!(!table.channel(1).active);
        table.play(1, &chunk(100), 11025, 10);
        table.set_volume(1, 20);
        assert!(table.channel(1).active);
    }

    #[test]
    fn stop_all_stops_every_slot_once() {
        let table = table();
        table.play(0, &chunk(100), 11025, 10);
        table.play(2, &chunk(100), 11025, 20);
        table.stop_all();

        assert!(table.channels().iter().all(|ch| !ch.active && ch.volume == 0));
        table.with_device(|dev| assert_eq!(dev.stops, [0, 1, 2, 3]));
    }

    #[test]
    fn mix_is_a_passthrough() {
        let table = table();
        table.play(0, &chunk(100), 11025, 10);
        let mut buf = [5i8; 16];
        table.mix(&mut buf);
        assert_eq!(buf, [5i8; 16]);
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn out_of_range_channel_panics() {
        table().play(NUM_CHANNELS as u8, &chunk(10), 11025, 1);
    }

    #[test]
    fn table_is_shareable_across_threads() {
        let table = Arc::new(table());
        let handles: Vec<_> = (0..NUM_CHANNELS as u8)
            .map(|slot| {
                let table = table.clone();
                std::thread::spawn(move || {
                    for v in 0..50u8 {
                        table.play(slot, &chunk(64), 11025, v);
                        table.set_volume(slot, v.wrapping_add(1));
                    }
                    table.stop(slot);
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert!(table.channels().iter().all(|ch| !ch.active));
        table.with_device(|dev| assert_eq!(dev.starts.len(), NUM_CHANNELS * 50));
    }
}
