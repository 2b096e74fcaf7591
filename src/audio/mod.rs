mod gm;
pub mod instrument;
pub(crate) mod output;
pub(crate) mod registry;
mod voice;

pub use gm::{program_name, program_params};
pub use instrument::{Adsr, InstrumentKind, SampleManifest, SampleSetDef, SynthParams, Wave};
pub use output::{start_output, OutputStream};
pub use registry::{ChannelRegistry, PERCUSSION_CHANNEL};
pub use voice::{SampleBank, SampleLibrary, Voice, VoiceFactory, SAMPLE_LOAD_TIMEOUT};

use crate::events::RenderKind;

pub fn midi_to_freq(note: u8) -> f32 {
    440.0 * 2.0_f32.powf((f32::from(note) - 69.0) / 12.0)
}

pub fn gain_to_db(gain: f32) -> f32 {
    20.0 * gain.max(1e-4).log10()
}

pub fn db_to_gain(db: f32) -> f32 {
    10.0_f32.powf(db / 20.0)
}

/// The pass-through sink a voice connects into. The real implementation
/// feeds the cpal callback; tests substitute a recorder.
pub trait NoteSink: Send + Sync {
    fn configure(&self, channel: u8, kind: RenderKind);
    fn note_on(&self, channel: u8, note: u8, gain: f32, hold_seconds: f64);
    fn release_channel(&self, channel: u8);
    fn release_all(&self);
    fn set_channel_gain(&self, channel: u8, gain: f32);
    fn set_master_gain(&self, gain: f32);
}

/// Note-on/off notifications at scheduled times, for the visualizer
/// collaborator. Fire-and-forget; implementations must not block or panic.
pub trait NoteObserver: Send + Sync {
    fn on_note_on(&self, note: u8, velocity: u8);
    fn on_note_off(&self, note: u8);
}

/// Default observer: trace-level breadcrumbs only.
pub struct LogObserver;

impl NoteObserver for LogObserver {
    fn on_note_on(&self, note: u8, velocity: u8) {
        tracing::trace!(note, velocity, "note on");
    }

    fn on_note_off(&self, note: u8) {
        tracing::trace!(note, "note off");
    }
}
