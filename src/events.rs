//! Wire types crossing from the engine thread into the audio callback.

use std::sync::Arc;

use crate::audio::instrument::{fallback_params, SynthParams};
use crate::audio::SampleBank;

/// Commands consumed by the render side. Pushed through an SPSC ring; the
/// callback applies them at the start of the buffer it is rendering.
#[derive(Debug, Clone)]
pub enum VoiceCommand {
    NoteOn {
        channel: u8,
        note: u8,
        gain: f32,
        hold_seconds: f64,
    },
    ReleaseChannel {
        channel: u8,
    },
    ReleaseAll,
    ChannelGain {
        channel: u8,
        gain: f32,
    },
    MasterGain {
        gain: f32,
    },
}

/// What a channel currently sounds like. Published with arc-swap so the
/// audio callback reads it lock-free; notes capture their source when they
/// start, so a swap never cuts a sounding note.
#[derive(Debug, Clone)]
pub enum RenderKind {
    Synth(SynthParams),
    Sampled(Arc<SampleBank>),
}

pub type ChannelTable = [RenderKind; 16];

pub fn default_table() -> ChannelTable {
    std::array::from_fn(|_| RenderKind::Synth(fallback_params()))
}
