pub mod scheduler;
pub mod tempo;
pub mod transport;

pub use scheduler::{pair_notes, EventScheduler, NoteEvent, PairedNotes};
pub use tempo::{TempoBreakpoint, TempoMap};
pub use transport::{PlaybackState, Transport};
