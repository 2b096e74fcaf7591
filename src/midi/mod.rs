//! MIDI file front end: turns SMF bytes into the flat track/event list the
//! rest of the engine consumes. Byte-level parsing is midly's job; this
//! module only reshapes its events and rejects timings we cannot play.

use std::path::Path;

use midly::{MetaMessage, MidiMessage, Smf, Timing, TrackEventKind as SmfEventKind};
use tracing::debug;

use crate::error::LoadError;

#[derive(Debug, Clone)]
pub struct MidiData {
    pub ticks_per_beat: u16,
    pub tracks: Vec<MidiTrack>,
}

#[derive(Debug, Clone, Default)]
pub struct MidiTrack {
    pub events: Vec<TrackEvent>,
}

/// One event at an absolute tick position within its track.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackEvent {
    pub tick: u64,
    pub kind: EventKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    NoteOn { channel: u8, note: u8, velocity: u8 },
    NoteOff { channel: u8, note: u8 },
    Tempo { microseconds_per_beat: u32 },
    ProgramChange { channel: u8, program: u8 },
}

impl MidiData {
    /// Highest absolute tick across every track and event kind.
    pub fn max_tick(&self) -> u64 {
        self.tracks
            .iter()
            .flat_map(|t| t.events.iter())
            .map(|e| e.tick)
            .max()
            .unwrap_or(0)
    }

    pub fn note_count(&self) -> usize {
        self.tracks
            .iter()
            .flat_map(|t| t.events.iter())
            .filter(|e| matches!(e.kind, EventKind::NoteOn { .. }))
            .count()
    }
}

pub fn load_file(path: &Path) -> Result<MidiData, LoadError> {
    let bytes = std::fs::read(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse(&bytes)
}

pub fn parse(bytes: &[u8]) -> Result<MidiData, LoadError> {
    let smf = Smf::parse(bytes)?;

    let ticks_per_beat = match smf.header.timing {
        Timing::Metrical(tpb) => tpb.as_int(),
        Timing::Timecode(..) => return Err(LoadError::UnsupportedTiming),
    };
    if ticks_per_beat == 0 {
        return Err(LoadError::ZeroTicksPerBeat);
    }

    let mut tracks = Vec::with_capacity(smf.tracks.len());
    for smf_track in &smf.tracks {
        let mut track = MidiTrack::default();
        let mut tick: u64 = 0;
        for event in smf_track {
            tick += u64::from(event.delta.as_int());
            let kind = match event.kind {
                SmfEventKind::Midi { channel, message } => {
                    let channel = channel.as_int();
                    match message {
                        // Running-status convention: velocity 0 is a release.
                        MidiMessage::NoteOn { key, vel } if vel.as_int() == 0 => {
                            Some(EventKind::NoteOff {
                                channel,
                                note: key.as_int(),
                            })
                        }
                        MidiMessage::NoteOn { key, vel } => Some(EventKind::NoteOn {
                            channel,
                            note: key.as_int(),
                            velocity: vel.as_int(),
                        }),
                        MidiMessage::NoteOff { key, .. } => Some(EventKind::NoteOff {
                            channel,
                            note: key.as_int(),
                        }),
                        MidiMessage::ProgramChange { program } => {
                            Some(EventKind::ProgramChange {
                                channel,
                                program: program.as_int(),
                            })
                        }
                        _ => None,
                    }
                }
                SmfEventKind::Meta(MetaMessage::Tempo(us_per_beat)) => Some(EventKind::Tempo {
                    microseconds_per_beat: us_per_beat.as_int(),
                }),
                _ => None,
            };
            if let Some(kind) = kind {
                track.events.push(TrackEvent { tick, kind });
            }
        }
        tracks.push(track);
    }

    let data = MidiData {
        ticks_per_beat,
        tracks,
    };
    debug!(
        tracks = data.tracks.len(),
        notes = data.note_count(),
        ticks_per_beat,
        "parsed MIDI file"
    );
    Ok(data)
}
