pub mod audio;
pub mod engine;
pub mod error;
pub mod events;
pub mod midi;
pub mod render;
pub mod timing;

pub use engine::{spawn_engine, EngineCommand, EngineConfig, EngineHandle, EngineUpdate};
pub use error::{AudioError, LoadError, RenderError, VoiceError};
pub use timing::{PlaybackState, Transport};
