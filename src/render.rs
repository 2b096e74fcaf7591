//! Offline rendering: the same paired notes and the same DSP as live
//! playback, driven by a sample counter instead of the wall clock.

use std::path::Path;

use tracing::info;

use crate::audio::output::RenderBank;
use crate::audio::{instrument, program_params, PERCUSSION_CHANNEL};
use crate::error::RenderError;
use crate::events::{default_table, ChannelTable, RenderKind, VoiceCommand};
use crate::midi::{EventKind, MidiData};
use crate::timing::scheduler::pair_notes;
use crate::timing::tempo::TempoMap;

pub const RENDER_SAMPLE_RATE: u32 = 44_100;
const FRAME_SIZE: usize = 512;
/// Tail appended after the last note so releases ring out.
const TAIL_SECONDS: f64 = 2.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderStats {
    pub seconds: f64,
    pub notes: usize,
}

/// Channel configs for offline use: synthesized definitions only, primed
/// from the file's program changes. Sample sets stay a live-playback
/// concern.
fn build_table(data: &MidiData) -> ChannelTable {
    let mut table = default_table();
    table[usize::from(PERCUSSION_CHANNEL)] =
        RenderKind::Synth(instrument::percussion_params());
    for event in data.tracks.iter().flat_map(|t| t.events.iter()) {
        if let EventKind::ProgramChange { channel, program } = event.kind {
            if channel != PERCUSSION_CHANNEL && channel < 16 {
                table[usize::from(channel)] = RenderKind::Synth(program_params(program));
            }
        }
    }
    table
}

pub fn render_wav(data: &MidiData, path: &Path) -> Result<RenderStats, RenderError> {
    let tempo = TempoMap::from_midi(data);
    let paired = pair_notes(data, &tempo);
    let sr = f64::from(RENDER_SAMPLE_RATE);

    let mut events: Vec<(u64, VoiceCommand)> = paired
        .tracks
        .iter()
        .flatten()
        .map(|n| {
            let gain = (f32::from(n.velocity) / 127.0).clamp(0.1, 1.0);
            (
                (n.start_seconds * sr) as u64,
                VoiceCommand::NoteOn {
                    channel: n.channel,
                    note: n.note,
                    gain,
                    hold_seconds: n.duration_seconds,
                },
            )
        })
        .collect();
    events.sort_by_key(|(at, _)| *at);

    let end_seconds = paired
        .tracks
        .iter()
        .flatten()
        .map(|n| n.start_seconds + n.duration_seconds)
        .fold(0.0f64, f64::max)
        + TAIL_SECONDS;
    let total_samples = (end_seconds * sr) as u64;

    let table = build_table(data);
    let mut bank = RenderBank::new(RENDER_SAMPLE_RATE as f32);

    let spec = hound::WavSpec {
        channels: 2,
        sample_rate: RENDER_SAMPLE_RATE,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec)?;

    let mut frame = vec![0.0f32; FRAME_SIZE * 2];
    let mut cursor: u64 = 0;
    let mut next_event = 0;
    while cursor < total_samples {
        // Events land at the boundary of the frame containing them.
        while next_event < events.len() && events[next_event].0 < cursor + FRAME_SIZE as u64 {
            bank.apply(&events[next_event].1, &table);
            next_event += 1;
        }
        bank.render(&mut frame, 2);
        for &sample in &frame {
            writer.write_sample((sample.clamp(-1.0, 1.0) * f32::from(i16::MAX)) as i16)?;
        }
        cursor += FRAME_SIZE as u64;
    }
    writer.finalize()?;

    let stats = RenderStats {
        seconds: end_seconds,
        notes: paired.note_count(),
    };
    info!(path = %path.display(), seconds = stats.seconds, notes = stats.notes, "rendered WAV");
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::midi::{MidiTrack, TrackEvent};

    fn tiny_file() -> MidiData {
        MidiData {
            ticks_per_beat: 480,
            tracks: vec![MidiTrack {
                events: vec![
                    TrackEvent {
                        tick: 0,
                        kind: EventKind::ProgramChange {
                            channel: 0,
                            program: 56,
                        },
                    },
                    TrackEvent {
                        tick: 0,
                        kind: EventKind::NoteOn {
                            channel: 0,
                            note: 60,
                            velocity: 100,
                        },
                    },
                    TrackEvent {
                        tick: 240,
                        kind: EventKind::NoteOff {
                            channel: 0,
                            note: 60,
                        },
                    },
                ],
            }],
        }
    }

    #[test]
    fn renders_a_playable_wav() {
        let path = std::env::temp_dir().join("cantio-render-test.wav");
        let stats = render_wav(&tiny_file(), &path).unwrap();
        assert_eq!(stats.notes, 1);
        assert!(stats.seconds > 2.0);

        let mut reader = hound::WavReader::open(&path).unwrap();
        let spec = reader.spec();
        assert_eq!(spec.channels, 2);
        assert_eq!(spec.sample_rate, RENDER_SAMPLE_RATE);
        let loud = reader
            .samples::<i16>()
            .filter_map(Result::ok)
            .any(|s| s.abs() > 100);
        assert!(loud, "rendered file should contain audible samples");
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn program_changes_shape_the_offline_table() {
        let table = build_table(&tiny_file());
        match &table[0] {
            RenderKind::Synth(params) => assert_eq!(*params, program_params(56)),
            other => panic!("unexpected config {other:?}"),
        }
        assert!(matches!(
            table[usize::from(PERCUSSION_CHANNEL)],
            RenderKind::Synth(_)
        ));
    }
}
