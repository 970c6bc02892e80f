//! Save and restore of the channel table.

use cm_ir::{ChunkBank, ChunkKey};
use cm_state::{StateCodec, StateError, Version};
use tracing::{debug, warn};

use crate::channel::Channel;
use crate::device::{VoiceDevice, Waveform};
use crate::frequency::{frequency_from_increment, volume_to_gain};
use crate::table::{ChannelTable, TableState, NUM_CHANNELS};

/// Version that introduced the per-channel records.
pub const VER_CHANNELS: Version = 2;
/// Version that added the channel frequency to each record.
pub const VER_FREQUENCY: Version = 3;

/// Flat, serializable view of one channel.
#[derive(Debug, Default, PartialEq)]
struct ChannelRecord {
    active: bool,
    volume: u8,
    cursor: u32,
    increment: u32,
    chunk: u64,
    len: u16,
    loop_start: u16,
    loop_len: u16,
    frequency: u16,
}

impl ChannelRecord {
    /// Snapshot `ch`; the cursor is read from the device only while active.
    fn capture<D: VoiceDevice>(ch: &Channel, device: &D, slot: u8) -> Self {
        let mut record = Self {
            active: ch.active,
            volume: ch.volume,
            cursor: 0,
            increment: ch.increment,
            frequency: ch.frequency,
            ..Self::default()
        };
        if let Some(source) = &ch.source {
            record.chunk = source.key.to_bits();
            record.len = source.len;
            record.loop_start = source.loop_start;
            record.loop_len = source.loop_len;
        }
        if ch.active {
            record.cursor = device.channel_position(slot);
        }
        record
    }

    fn save_or_load(&mut self, codec: &mut StateCodec) -> Result<(), StateError> {
        codec.record(|c| {
            c.entry(&mut self.active, VER_CHANNELS)?;
            c.entry(&mut self.volume, VER_CHANNELS)?;
            c.entry(&mut self.cursor, VER_CHANNELS)?;
            c.entry(&mut self.increment, VER_CHANNELS)?;
            c.entry(&mut self.chunk, VER_CHANNELS)?;
            c.entry(&mut self.len, VER_CHANNELS)?;
            c.entry(&mut self.loop_start, VER_CHANNELS)?;
            c.entry(&mut self.loop_len, VER_CHANNELS)?;
            c.entry(&mut self.frequency, VER_FREQUENCY)
        })
    }
}

impl<D: VoiceDevice> ChannelTable<D> {
    /// Save or restore every channel, in index order, under one lock.
    ///
    /// On restore, active channels re-resolve their chunk through `bank`,
    /// restart their device slot, seek to the saved cursor and reapply the
    /// saved volume. Inactive channels have their slot stopped. Fields the
    /// stream predates keep the values the channel had before the restore.
    ///
    /// A failure partway through leaves the channels already restored as
    /// they are.
    pub fn save_or_load(&self, codec: &mut StateCodec, bank: &ChunkBank) -> Result<(), StateError> {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        let stream_version = codec.version();

        for slot in 0..NUM_CHANNELS as u8 {
            let mut record =
                ChannelRecord::capture(&state.channels[slot as usize], &state.device, slot);
            record.save_or_load(codec)?;
            if codec.is_loading() {
                if stream_version >= VER_CHANNELS && stream_version < VER_FREQUENCY {
                    let rate = state.device.output_sample_rate();
                    record.frequency = frequency_from_increment(record.increment, rate);
                }
                restore_channel(state, slot, record, bank);
            }
        }
        debug!(version = stream_version, loading = codec.is_loading(), "channel table state");
        Ok(())
    }
}

fn restore_channel<D: VoiceDevice>(
    state: &mut TableState<D>,
    slot: u8,
    record: ChannelRecord,
    bank: &ChunkBank,
) {
    let ch = &mut state.channels[slot as usize];

    if !record.active {
        *ch = Channel {
            volume: record.volume,
            increment: record.increment,
            frequency: record.frequency,
            ..Channel::default()
        };
        state.device.stop_channel(slot);
        let gain = volume_to_gain(record.volume);
        state.device.set_channel_volume(slot, gain, gain);
        return;
    }

    let key = ChunkKey::from_bits(record.chunk);
    let Some(source) = bank.resolve(key, record.len, record.loop_start, record.loop_len) else {
        warn!(channel = slot, chunk = record.chunk, "saved chunk no longer in bank, channel left silent");
        ch.reset();
        state.device.stop_channel(slot);
        return;
    };

    let wave = Waveform::for_chunk(slot, &source, record.frequency);
    *ch = Channel {
        active: true,
        volume: record.volume,
        source: Some(source),
        increment: record.increment,
        frequency: record.frequency,
    };
    state.device.start_channel(slot, wave);
    state.device.set_channel_position(slot, record.cursor);
    let gain = volume_to_gain(record.volume);
    state.device.set_channel_volume(slot, gain, gain);
}
