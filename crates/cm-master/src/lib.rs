//! Headless controller for the chunkmix mixer.
//!
//! Bundles the chunk bank, the channel table, the software voice device and
//! an optional sound-card thread behind one API shared by the CLI and tests.

mod config;
mod wav;

use cm_audio::{AudioError, AudioOutput, CpalOutput, SoftwareDevice, TimerControl, VoiceRenderer};
use cm_state::{StateCodec, StateError};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::{error, info, warn};

// Re-export common types so callers don't need cm-ir/cm-engine directly.
pub use cm_engine::{Channel, ChannelTable, Frame, TimerCallback, TimerHandle, NUM_CHANNELS};
pub use cm_ir::{ChunkBank, ChunkKey, ChunkSource};
pub use config::{MixerConfig, DEFAULT_SAMPLE_RATE};
pub use wav::{frames_to_wav, write_wav};

/// Frames rendered per block on the audio thread.
const BLOCK_FRAMES: usize = 256;

/// Error type for controller operations.
#[derive(Debug, thiserror::Error)]
pub enum ControllerError {
    #[error("unknown chunk {0:?}")]
    UnknownChunk(ChunkKey),
    #[error(transparent)]
    State(#[from] StateError),
    #[error(transparent)]
    Audio(#[from] AudioError),
    /// The renderer is owned by the running audio thread
    #[error("renderer is busy on the audio thread")]
    RendererBusy,
    /// The audio thread panicked and took the renderer with it
    #[error("renderer was lost when the audio thread panicked")]
    RendererLost,
}

/// Headless mixer controller.
pub struct Controller {
    config: MixerConfig,
    bank: ChunkBank,
    table: Arc<ChannelTable<SoftwareDevice>>,
    timers: TimerControl,
    renderer: Option<VoiceRenderer>,
    playback: Option<PlaybackHandle>,
}

struct PlaybackHandle {
    stop_signal: Arc<AtomicBool>,
    frames_rendered: Arc<AtomicU64>,
    thread: Option<JoinHandle<VoiceRenderer>>,
}

impl Controller {
    pub fn new(config: MixerConfig) -> Self {
        let (device, renderer) = SoftwareDevice::new(config.sample_rate, config.command_capacity);
        let timers = device.timers();
        Self {
            config,
            bank: ChunkBank::new(),
            table: Arc::new(ChannelTable::new(device)),
            timers,
            renderer: Some(renderer),
            playback: None,
        }
    }

    pub fn config(&self) -> &MixerConfig {
        &self.config
    }

    pub fn sample_rate(&self) -> u32 {
        self.config.sample_rate
    }

    /// Shared handle to the channel table, for timer callbacks.
    pub fn table(&self) -> &Arc<ChannelTable<SoftwareDevice>> {
        &self.table
    }

    // --- Chunks ---

    pub fn bank(&self) -> &ChunkBank {
        &self.bank
    }

    /// Add a chunk of signed 8-bit mono samples to the bank.
    pub fn load_chunk(&mut self, name: &str, data: Vec<u8>) -> ChunkKey {
        let key = self.bank.insert(name, data);
        info!(name, ?key, "loaded chunk");
        key
    }

    /// Descriptor for a whole chunk, ready to pass to [`play`](Self::play).
    pub fn source(&self, key: ChunkKey) -> Result<ChunkSource, ControllerError> {
        self.bank.source(key).ok_or(ControllerError::UnknownChunk(key))
    }

    // --- Channels ---

    pub fn play(&self, channel: u8, source: &ChunkSource, frequency: u16, volume: u8) {
        self.table.play(channel, source, frequency, volume);
    }

    /// Play a whole bank chunk without a loop.
    pub fn play_chunk(
        &self,
        channel: u8,
        key: ChunkKey,
        frequency: u16,
        volume: u8,
    ) -> Result<(), ControllerError> {
        let source = self.source(key)?;
        self.table.play(channel, &source, frequency, volume);
        Ok(())
    }

    pub fn stop(&self, channel: u8) {
        self.table.stop(channel);
    }

    pub fn set_volume(&self, channel: u8, volume: u8) {
        self.table.set_volume(channel, volume);
    }

    pub fn stop_all(&self) {
        self.table.stop_all();
    }

    pub fn channel(&self, channel: u8) -> Channel {
        self.table.channel(channel)
    }

    // --- Timers ---

    /// Arm the sequencer timer, replacing any armed one.
    ///
    /// The callback runs on whichever thread renders audio. A callback that
    /// calls into [`table`](Self::table) takes the table lock there, so on the
    /// audio thread it blocks briefly while a control call holds that lock.
    pub fn add_timer(&self, delay_ms: u32, callback: TimerCallback) -> TimerHandle {
        self.timers.add_timer(delay_ms, callback)
    }

    pub fn remove_timer(&self, handle: TimerHandle) {
        self.timers.remove_timer(handle);
    }

    // --- Save states ---

    /// Serialize every channel at the current save-state version.
    pub fn save_state(&self) -> Result<Vec<u8>, ControllerError> {
        let mut codec = StateCodec::saver();
        self.table.save_or_load(&mut codec, &self.bank)?;
        Ok(codec.into_bytes())
    }

    /// Restore every channel from `bytes`, resolving chunks against the bank.
    pub fn load_state(&self, bytes: &[u8]) -> Result<(), ControllerError> {
        let mut codec = StateCodec::loader(bytes)?;
        if let Err(err) = self.table.save_or_load(&mut codec, &self.bank) {
            warn!(%err, "save state only partially restored");
            return Err(err.into());
        }
        info!(version = codec.version(), "restored save state");
        Ok(())
    }

    // --- Real-time playback ---

    /// Stream the mixer to the default sound card on a background thread.
    pub fn start_audio(&mut self) -> Result<(), ControllerError> {
        if self.playback.is_some() {
            return Ok(());
        }
        let renderer = self.renderer.take().ok_or(ControllerError::RendererLost)?;

        let stop_signal = Arc::new(AtomicBool::new(false));
        let frames_rendered = Arc::new(AtomicU64::new(0));
        let (ready_tx, ready_rx) = mpsc::sync_channel(1);

        let stop = stop_signal.clone();
        let frames = frames_rendered.clone();
        let thread = std::thread::spawn(move || audio_thread(renderer, stop, frames, ready_tx));

        match ready_rx.recv() {
            Ok(Ok(())) => {
                info!(sample_rate = self.config.sample_rate, "audio started");
                self.playback = Some(PlaybackHandle {
                    stop_signal,
                    frames_rendered,
                    thread: Some(thread),
                });
                Ok(())
            }
            Ok(Err(err)) => {
                self.renderer = thread.join().ok();
                Err(err.into())
            }
            Err(_) => {
                self.renderer = thread.join().ok();
                Err(ControllerError::RendererLost)
            }
        }
    }

    /// Stop the audio thread and take the renderer back.
    pub fn stop_audio(&mut self) {
        if let Some(mut pb) = self.playback.take() {
            pb.stop_signal.store(true, Ordering::Relaxed);
            if let Some(handle) = pb.thread.take() {
                match handle.join() {
                    Ok(renderer) => self.renderer = Some(renderer),
                    Err(_) => error!("audio thread panicked"),
                }
            }
            info!("audio stopped");
        }
    }

    pub fn is_audio_running(&self) -> bool {
        self.playback.is_some()
    }

    /// Frames the audio thread has rendered so far.
    pub fn frames_rendered(&self) -> u64 {
        self.playback
            .as_ref()
            .map_or(0, |p| p.frames_rendered.load(Ordering::Relaxed))
    }

    // --- Offline rendering ---

    /// Render `count` frames on the calling thread.
    pub fn render_frames(&mut self, count: usize) -> Result<Vec<Frame>, ControllerError> {
        let renderer = self.renderer_mut()?;
        let mut frames = vec![Frame::silence(); count];
        for block in frames.chunks_mut(BLOCK_FRAMES) {
            renderer.render(block);
        }
        Ok(frames)
    }

    /// Render `seconds` of audio and encode it as WAV.
    pub fn render_to_wav(&mut self, seconds: u32) -> Result<Vec<u8>, ControllerError> {
        let count = self.config.sample_rate as usize * seconds as usize;
        let frames = self.render_frames(count)?;
        Ok(wav::frames_to_wav(&frames, self.config.sample_rate))
    }

    fn renderer_mut(&mut self) -> Result<&mut VoiceRenderer, ControllerError> {
        if self.playback.is_some() {
            return Err(ControllerError::RendererBusy);
        }
        self.renderer.as_mut().ok_or(ControllerError::RendererLost)
    }
}

impl Default for Controller {
    fn default() -> Self {
        Self::new(MixerConfig::default())
    }
}

impl Drop for Controller {
    fn drop(&mut self) {
        self.stop_audio();
    }
}

fn audio_thread(
    mut renderer: VoiceRenderer,
    stop_signal: Arc<AtomicBool>,
    frames_rendered: Arc<AtomicU64>,
    ready: mpsc::SyncSender<Result<(), AudioError>>,
) -> VoiceRenderer {
    let (mut output, consumer) = match CpalOutput::new(renderer.sample_rate()) {
        Ok(pair) => pair,
        Err(err) => {
            let _ = ready.send(Err(err));
            return renderer;
        }
    };
    if let Err(err) = output.build_stream(consumer).and_then(|()| output.start()) {
        let _ = ready.send(Err(err));
        return renderer;
    }
    let _ = ready.send(Ok(()));

    let mut block = [Frame::silence(); BLOCK_FRAMES];
    'render: while !stop_signal.load(Ordering::Relaxed) {
        render_block(&mut renderer, &mut block);
        for &frame in block.iter() {
            if !output.write_spin(frame, &stop_signal) {
                break 'render;
            }
        }
        frames_rendered.fetch_add(BLOCK_FRAMES as u64, Ordering::Relaxed);
    }

    if let Err(err) = output.stop() {
        warn!(%err, "failed to pause audio stream");
    }
    renderer
}

#[cfg(feature = "alloc_check")]
fn render_block(renderer: &mut VoiceRenderer, block: &mut [Frame]) {
    assert_no_alloc::assert_no_alloc(|| renderer.render(block));
}

#[cfg(not(feature = "alloc_check"))]
fn render_block(renderer: &mut VoiceRenderer, block: &mut [Frame]) {
    renderer.render(block);
}
