//! Allocation-free render path tests.
//!
//! These tests verify that `VoiceRenderer::render()` does not allocate once
//! the voices are running. Commands are drained during a warm-up render,
//! so what is measured is the steady state the audio thread sits in.
//!
//! Just run `cargo test`; no feature flags needed.

use assert_no_alloc::{assert_no_alloc, AllocDisabler};

#[cfg(debug_assertions)]
#[global_allocator]
static A: AllocDisabler = AllocDisabler;

use cm_audio::{SoftwareDevice, VoiceRenderer, DEFAULT_COMMAND_CAPACITY};
use cm_engine::{ChannelTable, Frame, NUM_CHANNELS};
use cm_ir::{ChunkBank, ChunkSource};

const RATE: u32 = 22050;

fn noise_chunk(bank: &mut ChunkBank, len: usize) -> ChunkSource {
    let data: Vec<u8> = (0..len as u32).map(|i| (i.wrapping_mul(2_654_435_761) >> 24) as u8).collect();
    let key = bank.insert("noise", data);
    bank.source(key).unwrap()
}

/// Render `duration_frames` in blocks of `block`, aborting on any heap allocation.
fn assert_render_alloc_free(renderer: &mut VoiceRenderer, duration_frames: usize, block: usize) {
    let mut buf = vec![Frame::silence(); block];
    renderer.render(&mut buf);

    assert_no_alloc(|| {
        for _ in 0..duration_frames / block {
            renderer.render(&mut buf);
        }
    });
}

#[test]
fn looping_voices_alloc_free() {
    let (device, mut renderer) = SoftwareDevice::new(RATE, DEFAULT_COMMAND_CAPACITY);
    let table = ChannelTable::new(device);
    let mut bank = ChunkBank::new();
    let source = noise_chunk(&mut bank, 4000).with_loop(1000, 2000);
    for slot in 0..NUM_CHANNELS as u8 {
        table.play(slot, &source, 8000 + slot as u16 * 4000, 255);
    }
    assert_render_alloc_free(&mut renderer, RATE as usize * 5, 256);
}

#[test]
fn finished_one_shots_alloc_free() {
    let (device, mut renderer) = SoftwareDevice::new(RATE, DEFAULT_COMMAND_CAPACITY);
    let table = ChannelTable::new(device);
    let mut bank = ChunkBank::new();
    let source = noise_chunk(&mut bank, 300);
    table.play(0, &source, 22050, 200);
    table.play(1, &source, 44100, 100);
    assert_render_alloc_free(&mut renderer, RATE as usize * 2, 64);
}

#[test]
fn single_frame_blocks_alloc_free() {
    let (device, mut renderer) = SoftwareDevice::new(RATE, DEFAULT_COMMAND_CAPACITY);
    let table = ChannelTable::new(device);
    let mut bank = ChunkBank::new();
    let source = noise_chunk(&mut bank, 1000).with_loop(0, 1000);
    table.play(3, &source, 11025, 128);
    assert_render_alloc_free(&mut renderer, RATE as usize, 1);
}
