//! Software implementation of the voice device.
//!
//! The control side ([`SoftwareDevice`], [`TimerControl`]) and the render
//! side ([`VoiceRenderer`]) share a single-producer command ring and one
//! atomic cursor per slot. When the ring is full, commands coalesce into a
//! per-slot backlog that keeps only the latest state, so the newest request
//! for a slot is never the one lost. The renderer itself only ever
//! `try_lock`s the producer side; timer callbacks that call back into a
//! [`ChannelTable`](cm_engine::ChannelTable) may still wait on the table lock.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

use cm_engine::{
    Frame, SampleClock, TimerCallback, TimerHandle, VoiceDevice, Waveform, NUM_CHANNELS,
};
use parking_lot::Mutex;
use ringbuf::traits::{Consumer, Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};
use tracing::warn;

use crate::voice::Voice;

/// Command ring capacity used when none is configured.
pub const DEFAULT_COMMAND_CAPACITY: usize = 256;

/// A control-side request for the renderer.
///
/// `generation` tags a cursor change so the renderer never publishes a
/// cursor from before it.
pub enum VoiceCommand {
    Start {
        slot: u8,
        wave: Waveform,
        generation: u32,
    },
    Stop {
        slot: u8,
    },
    Volume {
        slot: u8,
        left: f32,
        right: f32,
    },
    Seek {
        slot: u8,
        position: u32,
        generation: u32,
    },
    ArmTimer {
        handle: TimerHandle,
        delay_ms: u32,
        callback: TimerCallback,
    },
    DisarmTimer {
        handle: TimerHandle,
    },
}

#[derive(Default)]
struct SlotBacklog {
    stop: Option<VoiceCommand>,
    start: Option<VoiceCommand>,
    volume: Option<VoiceCommand>,
    seek: Option<VoiceCommand>,
}

/// Latest unsent state, replayed per slot in the order stop, start, volume,
/// seek, then arm, disarm.
#[derive(Default)]
struct Backlog {
    slots: [SlotBacklog; NUM_CHANNELS],
    arm: Option<VoiceCommand>,
    disarm: Option<VoiceCommand>,
}

impl Backlog {
    fn field(&mut self, command: &VoiceCommand) -> &mut Option<VoiceCommand> {
        match *command {
            VoiceCommand::Stop { slot } => &mut self.slots[slot as usize].stop,
            VoiceCommand::Start { slot, .. } => &mut self.slots[slot as usize].start,
            VoiceCommand::Volume { slot, .. } => &mut self.slots[slot as usize].volume,
            VoiceCommand::Seek { slot, .. } => &mut self.slots[slot as usize].seek,
            VoiceCommand::ArmTimer { .. } => &mut self.arm,
            VoiceCommand::DisarmTimer { .. } => &mut self.disarm,
        }
    }

    /// Fold `command` in as the newest request.
    fn record(&mut self, command: VoiceCommand) {
        match command {
            // A start rewinds the cursor and keeps the gain
            VoiceCommand::Start { slot, .. } => self.slots[slot as usize].seek = None,
            // A stop clears the gain
            VoiceCommand::Stop { slot } => {
                let slot = &mut self.slots[slot as usize];
                slot.start = None;
                slot.volume = None;
            }
            VoiceCommand::ArmTimer { .. } => self.disarm = None,
            _ => {}
        }
        let field = self.field(&command);
        *field = Some(command);
    }

    /// Put back a command just taken by [`pop_oldest`](Self::pop_oldest).
    fn restore(&mut self, command: VoiceCommand) {
        let field = self.field(&command);
        *field = Some(command);
    }

    fn pop_oldest(&mut self) -> Option<VoiceCommand> {
        let Self { slots, arm, disarm } = self;
        slots
            .iter_mut()
            .flat_map(|slot| [&mut slot.stop, &mut slot.start, &mut slot.volume, &mut slot.seek])
            .chain([arm, disarm])
            .find_map(Option::take)
    }

    fn is_empty(&self) -> bool {
        self.arm.is_none()
            && self.disarm.is_none()
            && self
                .slots
                .iter()
                .all(|s| {
                    s.stop.is_none() && s.start.is_none() && s.volume.is_none() && s.seek.is_none()
                })
    }
}

struct CommandQueue {
    producer: HeapProd<VoiceCommand>,
    backlog: Backlog,
    /// Handle of the last timer sent to the renderer
    armed: Option<TimerHandle>,
}

impl CommandQueue {
    /// Move backlog into the ring until it is empty or the ring is full.
    fn flush(&mut self) {
        while let Some(command) = self.backlog.pop_oldest() {
            if let Err(command) = self.producer.try_push(command) {
                self.backlog.restore(command);
                return;
            }
        }
    }

    fn send(&mut self, command: VoiceCommand) {
        match command {
            VoiceCommand::ArmTimer { handle, .. } => self.armed = Some(handle),
            VoiceCommand::DisarmTimer { handle } => {
                // Anything else is already replaced or disarmed
                if self.armed != Some(handle) {
                    return;
                }
                self.armed = None;
            }
            _ => {}
        }

        if !self.backlog.is_empty() {
            self.flush();
            if !self.backlog.is_empty() {
                self.backlog.record(command);
                return;
            }
        }
        if let Err(command) = self.producer.try_push(command) {
            warn!("voice command ring full, coalescing commands");
            self.backlog.record(command);
        }
    }
}

/// State shared by both sides of the voice bank.
struct Shared {
    queue: Mutex<CommandQueue>,
    /// Set while the queue's backlog holds commands
    backlogged: AtomicBool,
    /// Per slot: cursor generation in the high half, cursor in the low half
    positions: [AtomicU64; NUM_CHANNELS],
}

fn pack(generation: u32, position: u32) -> u64 {
    (generation as u64) << 32 | position as u64
}

fn generation_of(packed: u64) -> u32 {
    (packed >> 32) as u32
}

impl Shared {
    fn send(&self, command: VoiceCommand) {
        let mut queue = self.queue.lock();
        queue.send(command);
        self.backlogged
            .store(!queue.backlog.is_empty(), Ordering::Release);
    }

    /// Publish a control-side cursor under a new generation and return it.
    fn move_cursor(&self, slot: u8, position: u32) -> u32 {
        let cell = &self.positions[slot as usize];
        let generation = generation_of(cell.load(Ordering::Acquire)).wrapping_add(1);
        cell.store(pack(generation, position), Ordering::Release);
        generation
    }
}

/// Control side of the software voice bank.
pub struct SoftwareDevice {
    sample_rate: u32,
    shared: Arc<Shared>,
    next_timer: Arc<AtomicU32>,
}

impl SoftwareDevice {
    /// Create a device and its renderer, connected by a ring of `capacity`
    /// commands.
    pub fn new(sample_rate: u32, capacity: usize) -> (Self, VoiceRenderer) {
        let (producer, consumer) = HeapRb::<VoiceCommand>::new(capacity.max(1)).split();
        let shared = Arc::new(Shared {
            queue: Mutex::new(CommandQueue {
                producer,
                backlog: Backlog::default(),
                armed: None,
            }),
            backlogged: AtomicBool::new(false),
            positions: Default::default(),
        });

        let device = Self {
            sample_rate,
            shared: shared.clone(),
            next_timer: Arc::new(AtomicU32::new(1)),
        };
        let renderer = VoiceRenderer {
            sample_rate,
            voices: std::array::from_fn(|_| Voice::new()),
            generations: [0; NUM_CHANNELS],
            commands: consumer,
            shared,
            clock: SampleClock::new(sample_rate),
        };
        (device, renderer)
    }

    /// Handle for arming the renderer's sample clock from any thread.
    pub fn timers(&self) -> TimerControl {
        TimerControl {
            shared: self.shared.clone(),
            next_id: self.next_timer.clone(),
        }
    }
}

impl VoiceDevice for SoftwareDevice {
    fn output_sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn start_channel(&mut self, slot: u8, wave: Waveform) {
        let generation = self.shared.move_cursor(slot, 0);
        self.shared.send(VoiceCommand::Start {
            slot,
            wave,
            generation,
        });
    }

    fn stop_channel(&mut self, slot: u8) {
        self.shared.send(VoiceCommand::Stop { slot });
    }

    fn set_channel_volume(&mut self, slot: u8, left: f32, right: f32) {
        self.shared.send(VoiceCommand::Volume { slot, left, right });
    }

    fn channel_position(&self, slot: u8) -> u32 {
        self.shared.positions[slot as usize].load(Ordering::Acquire) as u32
    }

    fn set_channel_position(&mut self, slot: u8, position: u32) {
        let generation = self.shared.move_cursor(slot, position);
        self.shared.send(VoiceCommand::Seek {
            slot,
            position,
            generation,
        });
    }
}

/// Registers the periodic sequencer timer with the renderer.
///
/// The renderer's [`SampleClock`] holds one timer; arming a new one replaces
/// it. Callbacks run on the render thread between two samples.
#[derive(Clone)]
pub struct TimerControl {
    shared: Arc<Shared>,
    next_id: Arc<AtomicU32>,
}

impl TimerControl {
    /// Fire `callback` after `delay_ms` of rendered audio.
    pub fn add_timer(&self, delay_ms: u32, callback: TimerCallback) -> TimerHandle {
        let handle = TimerHandle::new(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.shared.send(VoiceCommand::ArmTimer {
            handle,
            delay_ms,
            callback,
        });
        handle
    }

    /// Remove the timer if `handle` is still the armed one.
    pub fn remove_timer(&self, handle: TimerHandle) {
        self.shared.send(VoiceCommand::DisarmTimer { handle });
    }
}

/// Render side of the software voice bank.
pub struct VoiceRenderer {
    sample_rate: u32,
    voices: [Voice; NUM_CHANNELS],
    /// Cursor generation each voice was last started or seeked under
    generations: [u32; NUM_CHANNELS],
    commands: HeapCons<VoiceCommand>,
    shared: Arc<Shared>,
    clock: SampleClock,
}

impl VoiceRenderer {
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn clock(&self) -> &SampleClock {
        &self.clock
    }

    /// Is `slot` producing audio?
    pub fn is_voice_playing(&self, slot: u8) -> bool {
        self.voices[slot as usize].is_playing()
    }

    /// Fill `out` with mixed frames.
    ///
    /// The buffer is split at every clock event so timer callbacks, and the
    /// commands they queue, take effect on the exact sample they fire at.
    pub fn render(&mut self, out: &mut [Frame]) {
        out.fill(Frame::silence());
        self.drain_commands();

        let mut done = 0;
        while done < out.len() {
            let left = out.len() - done;
            let span = match self.clock.samples_until_event() {
                Some(until) => until.min(left as u64) as usize,
                None => left,
            };
            for voice in self.voices.iter_mut() {
                voice.render_into(&mut out[done..done + span]);
            }
            done += span;
            if self.clock.advance(span as u64) > 0 {
                self.drain_commands();
            }
        }

        self.publish_positions();
    }

    /// Render a single frame.
    pub fn render_frame(&mut self) -> Frame {
        let mut frame = [Frame::silence()];
        self.render(&mut frame);
        frame[0]
    }

    fn drain_commands(&mut self) {
        while let Some(command) = self.commands.try_pop() {
            self.apply(command);
        }
        if !self.shared.backlogged.load(Ordering::Acquire) {
            return;
        }

        let shared = Arc::clone(&self.shared);
        // A control thread holding the lock will flush on its own
        let Some(mut queue) = shared.queue.try_lock() else {
            return;
        };
        // Anything pushed before we took the lock is older than the backlog
        while let Some(command) = self.commands.try_pop() {
            self.apply(command);
        }
        while let Some(command) = queue.backlog.pop_oldest() {
            self.apply(command);
        }
        shared.backlogged.store(false, Ordering::Release);
    }

    /// Store each voice cursor unless the control side moved it since the
    /// voice's last start or seek.
    fn publish_positions(&self) {
        let cells = self.shared.positions.iter();
        for ((voice, cell), &generation) in self.voices.iter().zip(cells).zip(&self.generations) {
            let current = cell.load(Ordering::Acquire);
            if generation_of(current) != generation {
                continue;
            }
            // Losing the race means a newer cursor was just stored
            let _ = cell.compare_exchange(
                current,
                pack(generation, voice.position()),
                Ordering::AcqRel,
                Ordering::Relaxed,
            );
        }
    }

    fn apply(&mut self, command: VoiceCommand) {
        match command {
            VoiceCommand::Start {
                slot,
                wave,
                generation,
            } => {
                self.generations[slot as usize] = generation;
                self.voices[slot as usize].start(wave, self.sample_rate)
            }
            VoiceCommand::Stop { slot } => self.voices[slot as usize].stop(),
            VoiceCommand::Volume { slot, left, right } => {
                self.voices[slot as usize].set_gain(left, right)
            }
            VoiceCommand::Seek {
                slot,
                position,
                generation,
            } => {
                self.generations[slot as usize] = generation;
                self.voices[slot as usize].seek(position)
            }
            VoiceCommand::ArmTimer {
                handle,
                delay_ms,
                callback,
            } => self.clock.arm(handle, delay_ms, callback),
            VoiceCommand::DisarmTimer { handle } => {
                self.clock.remove_timer(handle);
            }
        }
    }
}
