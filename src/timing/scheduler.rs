//! Note pairing and the armed-event batch that drives playback.
//!
//! Every `schedule_from` pass retires the previous batch wholesale and arms
//! a fresh one; there is no incremental patching. Reschedule cost is linear
//! in note count and tempo/seek changes are rare user actions.

use std::collections::HashMap;
use std::collections::VecDeque;

use tracing::{debug, warn};

use crate::audio::{ChannelRegistry, NoteObserver};
use crate::midi::{EventKind, MidiData};
use crate::timing::tempo::TempoMap;

/// Floor under paired note lengths; shorter attacks are inaudible on some
/// backends.
pub const MIN_NOTE_SECONDS: f64 = 0.05;

/// Substitute length for a noteOn whose track never releases it. Upstream
/// data defect, recovered locally.
pub const DANGLING_NOTE_SECONDS: f64 = 0.25;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NoteEvent {
    pub track: usize,
    pub channel: u8,
    pub note: u8,
    pub velocity: u8,
    pub start_seconds: f64,
    pub duration_seconds: f64,
}

#[derive(Debug, Clone, Default)]
pub struct PairedNotes {
    /// Notes grouped by source track, each sorted by start time.
    pub tracks: Vec<Vec<NoteEvent>>,
    /// How many onsets had no matching release.
    pub dangling: usize,
}

impl PairedNotes {
    pub fn note_count(&self) -> usize {
        self.tracks.iter().map(|t| t.len()).sum()
    }
}

/// Pairs each noteOn with the next later noteOff sharing (note, channel,
/// track). Pending onsets queue FIFO, so overlapping same-pitch notes pair
/// in onset order.
pub fn pair_notes(data: &MidiData, tempo: &TempoMap) -> PairedNotes {
    let mut paired = PairedNotes::default();

    for (track_index, track) in data.tracks.iter().enumerate() {
        let mut open: HashMap<(u8, u8), VecDeque<(f64, u8)>> = HashMap::new();
        let mut notes = Vec::new();

        for event in &track.events {
            match event.kind {
                EventKind::NoteOn {
                    channel,
                    note,
                    velocity,
                } => {
                    let start = tempo.ticks_to_seconds(event.tick, data.ticks_per_beat);
                    open.entry((note, channel))
                        .or_default()
                        .push_back((start, velocity));
                }
                EventKind::NoteOff { channel, note } => {
                    let end = tempo.ticks_to_seconds(event.tick, data.ticks_per_beat);
                    if let Some(queue) = open.get_mut(&(note, channel)) {
                        if let Some((start, velocity)) = queue.pop_front() {
                            notes.push(NoteEvent {
                                track: track_index,
                                channel,
                                note,
                                velocity,
                                start_seconds: start,
                                duration_seconds: (end - start).max(MIN_NOTE_SECONDS),
                            });
                        }
                    }
                }
                _ => {}
            }
        }

        for ((note, channel), queue) in open {
            for (start, velocity) in queue {
                paired.dangling += 1;
                notes.push(NoteEvent {
                    track: track_index,
                    channel,
                    note,
                    velocity,
                    start_seconds: start,
                    duration_seconds: DANGLING_NOTE_SECONDS,
                });
            }
        }

        notes.sort_by(|a, b| a.start_seconds.total_cmp(&b.start_seconds));
        paired.tracks.push(notes);
    }

    if paired.dangling > 0 {
        warn!(
            dangling = paired.dangling,
            "noteOn events without a matching noteOff; substituting {DANGLING_NOTE_SECONDS}s"
        );
    }
    paired
}

#[derive(Debug, Clone, Copy)]
enum ArmedKind {
    Attack {
        channel: u8,
        note: u8,
        velocity: u8,
        wall_duration: f64,
    },
    NotifyOff {
        note: u8,
    },
}

#[derive(Debug, Clone, Copy)]
struct ArmedEvent {
    /// Wall-clock seconds after the batch epoch.
    fire_at: f64,
    kind: ArmedKind,
}

/// The pending timers of one scheduling pass. Cancelling clears the whole
/// list in one operation; a half-cancelled batch cannot exist.
#[derive(Debug, Default)]
struct ScheduledBatch {
    armed: Vec<ArmedEvent>,
    next: usize,
}

impl ScheduledBatch {
    fn cancel(&mut self) {
        self.armed.clear();
        self.next = 0;
    }

    fn pending(&self) -> usize {
        self.armed.len() - self.next
    }
}

pub struct EventScheduler {
    notes: Vec<NoteEvent>,
    batch: ScheduledBatch,
}

impl EventScheduler {
    pub fn new(paired: &PairedNotes) -> Self {
        let mut notes: Vec<NoteEvent> = paired.tracks.iter().flatten().copied().collect();
        notes.sort_by(|a, b| a.start_seconds.total_cmp(&b.start_seconds));
        Self {
            notes,
            batch: ScheduledBatch::default(),
        }
    }

    /// Retires the previous batch and arms every note at or after `offset`.
    /// Wall offsets are scaled by `100 / tempo_percent`; musical times are
    /// untouched, which is what makes a later reschedule from the current
    /// musical position exact.
    pub fn schedule_from(&mut self, offset_seconds: f64, tempo_percent: u16) -> usize {
        self.batch.cancel();
        let scale = 100.0 / f64::from(tempo_percent);

        let mut armed = Vec::new();
        for note in &self.notes {
            if note.start_seconds < offset_seconds {
                continue;
            }
            let wall_start = (note.start_seconds - offset_seconds) * scale;
            let wall_duration = note.duration_seconds * scale;
            armed.push(ArmedEvent {
                fire_at: wall_start,
                kind: ArmedKind::Attack {
                    channel: note.channel,
                    note: note.note,
                    velocity: note.velocity,
                    wall_duration,
                },
            });
            armed.push(ArmedEvent {
                fire_at: wall_start + wall_duration,
                kind: ArmedKind::NotifyOff { note: note.note },
            });
        }
        // Stable sort: simultaneous events keep registration order.
        armed.sort_by(|a, b| a.fire_at.total_cmp(&b.fire_at));

        let count = armed.len() / 2;
        self.batch = ScheduledBatch { armed, next: 0 };
        debug!(
            offset_seconds,
            tempo_percent,
            notes = count,
            "scheduled batch"
        );
        count
    }

    pub fn cancel(&mut self) {
        self.batch.cancel();
    }

    /// Fires everything due at `elapsed_wall` seconds after the batch
    /// epoch, in non-decreasing fire order. Observer calls are
    /// fire-and-forget notifications.
    pub fn poll(
        &mut self,
        elapsed_wall: f64,
        registry: &mut ChannelRegistry,
        observer: &dyn NoteObserver,
    ) -> usize {
        let mut fired = 0;
        while self.batch.next < self.batch.armed.len() {
            let event = self.batch.armed[self.batch.next];
            if event.fire_at > elapsed_wall {
                break;
            }
            self.batch.next += 1;
            fired += 1;
            match event.kind {
                ArmedKind::Attack {
                    channel,
                    note,
                    velocity,
                    wall_duration,
                } => {
                    registry.play_note(channel, note, velocity, wall_duration);
                    observer.on_note_on(note, velocity);
                }
                ArmedKind::NotifyOff { note } => observer.on_note_off(note),
            }
        }
        fired
    }

    pub fn pending(&self) -> usize {
        self.batch.pending()
    }

    pub(crate) fn next_fire_at(&self) -> Option<f64> {
        self.batch.armed.get(self.batch.next).map(|e| e.fire_at)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use parking_lot::Mutex;

    use super::*;
    use crate::audio::test_support::RecordingSink;
    use crate::audio::{SampleLibrary, VoiceFactory};
    use crate::midi::{MidiTrack, TrackEvent};

    fn track(events: Vec<TrackEvent>) -> MidiTrack {
        MidiTrack { events }
    }

    fn on(tick: u64, channel: u8, note: u8, velocity: u8) -> TrackEvent {
        TrackEvent {
            tick,
            kind: EventKind::NoteOn {
                channel,
                note,
                velocity,
            },
        }
    }

    fn off(tick: u64, channel: u8, note: u8) -> TrackEvent {
        TrackEvent {
            tick,
            kind: EventKind::NoteOff { channel, note },
        }
    }

    fn tempo_event(tick: u64, microseconds_per_beat: u32) -> TrackEvent {
        TrackEvent {
            tick,
            kind: EventKind::Tempo {
                microseconds_per_beat,
            },
        }
    }

    #[derive(Default)]
    struct CollectingObserver {
        events: Mutex<Vec<(&'static str, u8)>>,
    }

    impl NoteObserver for CollectingObserver {
        fn on_note_on(&self, note: u8, _velocity: u8) {
            self.events.lock().push(("on", note));
        }

        fn on_note_off(&self, note: u8) {
            self.events.lock().push(("off", note));
        }
    }

    fn test_registry() -> (Arc<RecordingSink>, ChannelRegistry) {
        let sink = Arc::new(RecordingSink::default());
        let factory = VoiceFactory::new(sink.clone(), Arc::new(SampleLibrary::empty()));
        let registry = ChannelRegistry::new(factory, sink.clone());
        (sink, registry)
    }

    #[test]
    fn two_track_single_note_scenario() {
        let data = MidiData {
            ticks_per_beat: 480,
            tracks: vec![
                track(vec![tempo_event(0, 500_000)]),
                track(vec![on(0, 0, 60, 100), off(480, 0, 60)]),
            ],
        };
        let tempo = TempoMap::from_midi(&data);
        let paired = pair_notes(&data, &tempo);

        assert_eq!(paired.note_count(), 1);
        assert_eq!(paired.dangling, 0);
        assert_eq!(
            paired.tracks[1][0],
            NoteEvent {
                track: 1,
                channel: 0,
                note: 60,
                velocity: 100,
                start_seconds: 0.0,
                duration_seconds: 0.5,
            }
        );
    }

    #[test]
    fn overlapping_same_pitch_notes_pair_fifo() {
        let data = MidiData {
            ticks_per_beat: 480,
            tracks: vec![track(vec![
                on(0, 0, 60, 100),
                on(240, 0, 60, 90),
                off(480, 0, 60),
                off(960, 0, 60),
            ])],
        };
        let tempo = TempoMap::from_midi(&data);
        let paired = pair_notes(&data, &tempo);
        let notes = &paired.tracks[0];

        assert_eq!(notes.len(), 2);
        assert_eq!(notes[0].velocity, 100);
        assert_eq!(notes[0].start_seconds, 0.0);
        assert_eq!(notes[0].duration_seconds, 0.5);
        assert_eq!(notes[1].velocity, 90);
        assert_eq!(notes[1].start_seconds, 0.25);
        assert_eq!(notes[1].duration_seconds, 0.75);
    }

    #[test]
    fn dangling_note_gets_default_duration() {
        let data = MidiData {
            ticks_per_beat: 480,
            tracks: vec![track(vec![on(0, 0, 64, 80)])],
        };
        let tempo = TempoMap::from_midi(&data);
        let paired = pair_notes(&data, &tempo);

        assert_eq!(paired.dangling, 1);
        assert_eq!(paired.tracks[0][0].duration_seconds, DANGLING_NOTE_SECONDS);
    }

    #[test]
    fn zero_length_note_is_clamped_to_minimum() {
        let data = MidiData {
            ticks_per_beat: 480,
            tracks: vec![track(vec![on(100, 0, 60, 80), off(100, 0, 60)])],
        };
        let tempo = TempoMap::from_midi(&data);
        let paired = pair_notes(&data, &tempo);
        assert_eq!(paired.tracks[0][0].duration_seconds, MIN_NOTE_SECONDS);
    }

    #[test]
    fn events_before_the_offset_are_skipped() {
        let data = MidiData {
            ticks_per_beat: 480,
            tracks: vec![track(vec![
                on(0, 0, 60, 100),
                off(480, 0, 60),
                on(960, 0, 62, 100),
                off(1440, 0, 62),
            ])],
        };
        let tempo = TempoMap::from_midi(&data);
        let mut scheduler = EventScheduler::new(&pair_notes(&data, &tempo));

        assert_eq!(scheduler.schedule_from(0.0, 100), 2);
        assert_eq!(scheduler.schedule_from(0.5, 100), 1);
        assert_eq!(scheduler.pending(), 2); // one attack + one notify-off
    }

    #[test]
    fn tempo_scale_halves_wall_offsets_and_durations() {
        let data = MidiData {
            ticks_per_beat: 480,
            tracks: vec![track(vec![on(9600, 0, 60, 100), off(10560, 0, 60)])],
        };
        // 120 BPM: note starts at 10s, lasts 1s of musical time.
        let tempo = TempoMap::from_midi(&data);
        let mut scheduler = EventScheduler::new(&pair_notes(&data, &tempo));

        scheduler.schedule_from(10.0, 200);
        assert_eq!(scheduler.next_fire_at(), Some(0.0));

        scheduler.schedule_from(0.0, 200);
        assert_eq!(scheduler.next_fire_at(), Some(5.0));

        let (_sink, mut registry) = test_registry();
        let observer = CollectingObserver::default();
        scheduler.schedule_from(10.0, 200);
        scheduler.poll(0.6, &mut registry, &observer);

        // Attack at 0.0, notify-off at 0.5 wall seconds: both fired by 0.6.
        assert_eq!(
            observer.events.lock().as_slice(),
            &[("on", 60), ("off", 60)]
        );
    }

    #[test]
    fn poll_fires_in_order_and_drains_once() {
        let data = MidiData {
            ticks_per_beat: 480,
            tracks: vec![track(vec![
                on(0, 0, 60, 100),
                off(240, 0, 60),
                on(480, 1, 62, 90),
                off(720, 1, 62),
            ])],
        };
        let tempo = TempoMap::from_midi(&data);
        let mut scheduler = EventScheduler::new(&pair_notes(&data, &tempo));
        let (_sink, mut registry) = test_registry();
        let observer = CollectingObserver::default();

        scheduler.schedule_from(0.0, 100);
        assert_eq!(scheduler.poll(0.3, &mut registry, &observer), 2);
        assert_eq!(scheduler.poll(0.3, &mut registry, &observer), 0);
        assert_eq!(scheduler.poll(10.0, &mut registry, &observer), 2);
        assert_eq!(scheduler.pending(), 0);

        assert_eq!(
            observer.events.lock().as_slice(),
            &[("on", 60), ("off", 60), ("on", 62), ("off", 62)]
        );
    }

    #[test]
    fn rescheduling_cancels_the_previous_batch() {
        let data = MidiData {
            ticks_per_beat: 480,
            tracks: vec![track(vec![on(0, 0, 60, 100), off(480, 0, 60)])],
        };
        let tempo = TempoMap::from_midi(&data);
        let mut scheduler = EventScheduler::new(&pair_notes(&data, &tempo));

        scheduler.schedule_from(0.0, 100);
        let first_pending = scheduler.pending();
        scheduler.schedule_from(0.0, 100);
        assert_eq!(scheduler.pending(), first_pending);

        scheduler.cancel();
        assert_eq!(scheduler.pending(), 0);
        let (_sink, mut registry) = test_registry();
        let observer = CollectingObserver::default();
        assert_eq!(scheduler.poll(100.0, &mut registry, &observer), 0);
    }
}
