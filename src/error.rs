use std::path::PathBuf;

use thiserror::Error;

/// Errors that abort a single load attempt. The engine survives them: a
/// failed load leaves the previously loaded file untouched.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("malformed MIDI file: {0}")]
    Parse(String),
    #[error("SMPTE time division is not supported")]
    UnsupportedTiming,
    #[error("MIDI header declares zero ticks per beat")]
    ZeroTicksPerBeat,
}

impl From<midly::Error> for LoadError {
    fn from(err: midly::Error) -> Self {
        LoadError::Parse(err.to_string())
    }
}

/// Non-fatal voice construction failures. Every variant degrades to the
/// fallback synthesized voice; playback never halts on one of these.
#[derive(Debug, Error)]
pub enum VoiceError {
    #[error("failed to decode sample {}: {reason}", .path.display())]
    SampleDecode { path: PathBuf, reason: String },
    #[error("sample set {name:?} has no usable zones")]
    EmptyBank { name: String },
    #[error("sample load for program {program} timed out after {seconds}s")]
    SampleTimeout { program: u8, seconds: u64 },
}

/// Audio device bring-up failures, surfaced once at the warm-up gate.
#[derive(Debug, Error)]
pub enum AudioError {
    #[error("no audio output device available")]
    NoDevice,
    #[error(transparent)]
    Config(#[from] cpal::DefaultStreamConfigError),
    #[error(transparent)]
    Build(#[from] cpal::BuildStreamError),
    #[error(transparent)]
    Play(#[from] cpal::PlayStreamError),
}

/// Offline render failures.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error(transparent)]
    Wav(#[from] hound::Error),
}
