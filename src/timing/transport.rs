//! Play/pause/stop/seek state machine over the scheduler and registry.

use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tracing::{debug, info};

use crate::audio::{ChannelRegistry, NoteObserver, PERCUSSION_CHANNEL, SAMPLE_LOAD_TIMEOUT};
use crate::midi::MidiData;
use crate::timing::scheduler::{pair_notes, EventScheduler, PairedNotes};
use crate::timing::tempo::TempoMap;

pub const MIN_TEMPO_PERCENT: u16 = 25;
pub const MAX_TEMPO_PERCENT: u16 = 300;
const DEFAULT_VOLUME_PERCENT: u8 = 70;

/// Playing and Paused are distinct states, so the two can never be true at
/// once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Stopped,
    Playing,
    Paused,
}

struct WallClock {
    epoch: Instant,
    /// Musical position when the clock started.
    base: f64,
}

pub struct Transport {
    paired: PairedNotes,
    scheduler: EventScheduler,
    registry: ChannelRegistry,
    observer: Arc<dyn NoteObserver>,
    state: PlaybackState,
    clock: Option<WallClock>,
    current_time: f64,
    duration: f64,
    tempo_percent: u16,
    volume_percent: u8,
}

impl Transport {
    pub fn new(
        data: &MidiData,
        mut registry: ChannelRegistry,
        observer: Arc<dyn NoteObserver>,
    ) -> Self {
        let tempo = TempoMap::from_midi(data);
        let duration = tempo.duration_seconds(data);
        let paired = pair_notes(data, &tempo);
        let scheduler = EventScheduler::new(&paired);

        registry.apply_program_changes(data);
        registry.set_master_volume(DEFAULT_VOLUME_PERCENT);

        info!(
            duration,
            notes = paired.note_count(),
            "transport ready"
        );
        Self {
            paired,
            scheduler,
            registry,
            observer,
            state: PlaybackState::Stopped,
            clock: None,
            current_time: 0.0,
            duration,
            tempo_percent: 100,
            volume_percent: DEFAULT_VOLUME_PERCENT,
        }
    }

    fn rate(&self) -> f64 {
        f64::from(self.tempo_percent) / 100.0
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn is_playing(&self) -> bool {
        self.state == PlaybackState::Playing
    }

    pub fn duration(&self) -> f64 {
        self.duration
    }

    pub fn tempo_percent(&self) -> u16 {
        self.tempo_percent
    }

    pub fn volume_percent(&self) -> u8 {
        self.volume_percent
    }

    pub fn pending_events(&self) -> usize {
        self.scheduler.pending()
    }

    /// Current musical position in seconds, clamped to the file length.
    pub fn position(&self) -> f64 {
        match (&self.state, &self.clock) {
            (PlaybackState::Playing, Some(clock)) => {
                (clock.base + clock.epoch.elapsed().as_secs_f64() * self.rate())
                    .min(self.duration)
            }
            _ => self.current_time,
        }
    }

    pub fn play(&mut self) {
        self.play_from(self.current_time);
    }

    pub fn play_from(&mut self, offset_seconds: f64) {
        let offset = offset_seconds.clamp(0.0, self.duration);
        self.scheduler.schedule_from(offset, self.tempo_percent);
        self.clock = Some(WallClock {
            epoch: Instant::now(),
            base: offset,
        });
        self.current_time = offset;
        self.state = PlaybackState::Playing;
        debug!(offset, tempo = self.tempo_percent, "playing");
    }

    /// Stops the clock and silences sustained notes; the position survives
    /// for a later resume.
    pub fn pause(&mut self) {
        if self.state != PlaybackState::Playing {
            return;
        }
        self.current_time = self.position();
        self.clock = None;
        self.state = PlaybackState::Paused;
        self.scheduler.cancel();
        self.registry.release_all_voices();
        debug!(position = self.current_time, "paused");
    }

    /// Terminal reset. Idempotent: a second stop leaves the same state.
    pub fn stop(&mut self) {
        self.state = PlaybackState::Stopped;
        self.clock = None;
        self.current_time = 0.0;
        self.scheduler.cancel();
        self.registry.release_all_voices();
    }

    pub fn seek(&mut self, seconds: f64) {
        let target = seconds.clamp(0.0, self.duration);
        if self.state == PlaybackState::Playing {
            self.registry.release_all_voices();
            self.play_from(target);
        } else {
            self.current_time = target;
        }
    }

    /// Clamped to [25, 300]. While playing this is pause-at-position,
    /// retune, resume: armed timers never keep firing at a stale rate.
    pub fn set_tempo(&mut self, percent: u16) {
        let percent = percent.clamp(MIN_TEMPO_PERCENT, MAX_TEMPO_PERCENT);
        if percent == self.tempo_percent {
            return;
        }
        self.tempo_percent = percent;
        if self.state == PlaybackState::Playing {
            let position = self.position();
            self.registry.release_all_voices();
            self.play_from(position);
        }
    }

    pub fn set_volume(&mut self, percent: u8) {
        self.volume_percent = percent.min(100);
        self.registry.set_master_volume(self.volume_percent);
    }

    /// Reprograms every active melodic channel. Uniform policy with
    /// `set_tempo`: pause at the current position, swap, resume.
    pub fn change_instrument(&mut self, program: u8) {
        let was_playing = self.state == PlaybackState::Playing;
        let position = self.position();
        if was_playing {
            self.pause();
        }

        let mut channels = self.registry.active_channels();
        if channels.is_empty() {
            channels.push(0);
        }
        for channel in channels {
            if channel != PERCUSSION_CHANNEL {
                self.registry.set_program(channel, program);
            }
        }

        if was_playing {
            self.play_from(position);
        }
    }

    pub fn set_channel_mute(&mut self, channel: u8, muted: bool) {
        self.registry.set_mute(channel, muted);
    }

    pub fn set_solo(&mut self, channel: Option<u8>) {
        self.registry.set_solo(channel);
    }

    /// Advances the clock, fires due events, and auto-stops at the end.
    /// Driven from the engine loop.
    pub fn tick(&mut self) {
        if self.state != PlaybackState::Playing {
            return;
        }
        let Some(clock) = &self.clock else {
            return;
        };
        let elapsed = clock.epoch.elapsed().as_secs_f64();
        self.current_time = (clock.base + elapsed * self.rate()).min(self.duration);
        self.scheduler
            .poll(elapsed, &mut self.registry, self.observer.as_ref());

        if self.current_time >= self.duration {
            info!("reached end of file");
            self.stop();
        }
    }

    /// Applies finished (or expired) sample loads. Engine-tick duty.
    pub fn service_sample_loads(&mut self) {
        self.registry.service_loads(SAMPLE_LOAD_TIMEOUT);
    }

    pub fn registry(&self) -> &ChannelRegistry {
        &self.registry
    }

    pub fn dispose(&mut self) {
        self.stop();
        self.registry.dispose();
    }

    pub fn export_to_json(&self) -> ExportData {
        export_data(&self.paired)
    }
}

/// Per-track note list with times rounded to 4 decimals, unscaled musical
/// time.
pub fn export_data(paired: &PairedNotes) -> ExportData {
    ExportData {
        tracks: paired
            .tracks
            .iter()
            .map(|notes| ExportTrack {
                notes: notes
                    .iter()
                    .map(|n| ExportNote {
                        note: n.note,
                        time: round4(n.start_seconds),
                        duration: round4(n.duration_seconds),
                        velocity: n.velocity,
                    })
                    .collect(),
            })
            .collect(),
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ExportData {
    pub tracks: Vec<ExportTrack>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ExportTrack {
    pub notes: Vec<ExportNote>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ExportNote {
    pub note: u8,
    pub time: f64,
    pub duration: f64,
    pub velocity: u8,
}

fn round4(x: f64) -> f64 {
    (x * 10_000.0).round() / 10_000.0
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::audio::test_support::{RecordingSink, SinkCall};
    use crate::audio::{LogObserver, SampleLibrary, VoiceFactory};
    use crate::midi::{EventKind, MidiTrack, TrackEvent};

    fn note_pair(tick_on: u64, tick_off: u64, channel: u8, note: u8) -> Vec<TrackEvent> {
        vec![
            TrackEvent {
                tick: tick_on,
                kind: EventKind::NoteOn {
                    channel,
                    note,
                    velocity: 100,
                },
            },
            TrackEvent {
                tick: tick_off,
                kind: EventKind::NoteOff { channel, note },
            },
        ]
    }

    fn data(events: Vec<TrackEvent>) -> MidiData {
        MidiData {
            ticks_per_beat: 480,
            tracks: vec![MidiTrack { events }],
        }
    }

    fn transport_for(data: &MidiData) -> (Arc<RecordingSink>, Transport) {
        let sink = Arc::new(RecordingSink::default());
        let factory = VoiceFactory::new(sink.clone(), Arc::new(SampleLibrary::empty()));
        let registry = ChannelRegistry::new(factory, sink.clone());
        let transport = Transport::new(data, registry, Arc::new(LogObserver));
        (sink, transport)
    }

    #[test]
    fn stop_twice_is_idempotent() {
        let (_sink, mut transport) = transport_for(&data(note_pair(0, 480, 0, 60)));
        transport.play();
        transport.stop();
        let (position, pending, state) = (
            transport.position(),
            transport.pending_events(),
            transport.state(),
        );
        transport.stop();
        assert_eq!(transport.position(), position);
        assert_eq!(transport.position(), 0.0);
        assert_eq!(transport.pending_events(), pending);
        assert_eq!(transport.pending_events(), 0);
        assert_eq!(transport.state(), state);
        assert_eq!(transport.state(), PlaybackState::Stopped);
    }

    #[test]
    fn pause_preserves_position_and_releases_voices() {
        let (sink, mut transport) = transport_for(&data(note_pair(0, 4800, 0, 60)));
        transport.play_from(1.0);
        sink.take();
        transport.pause();

        assert_eq!(transport.state(), PlaybackState::Paused);
        assert!(transport.position() >= 1.0);
        assert!(sink.take().contains(&SinkCall::ReleaseAll));

        // Invalid transition: pausing while stopped changes nothing.
        transport.stop();
        transport.pause();
        assert_eq!(transport.state(), PlaybackState::Stopped);
    }

    #[test]
    fn tempo_is_clamped_and_preserves_musical_position() {
        // Note at musical 10s (tick 9600 at 120 BPM).
        let (_sink, mut transport) = transport_for(&data(note_pair(9600, 10560, 0, 60)));
        transport.set_tempo(10);
        assert_eq!(transport.tempo_percent(), MIN_TEMPO_PERCENT);
        transport.set_tempo(999);
        assert_eq!(transport.tempo_percent(), MAX_TEMPO_PERCENT);

        transport.set_tempo(100);
        transport.play_from(10.0);
        transport.set_tempo(200);

        assert_eq!(transport.state(), PlaybackState::Playing);
        // Still at musical 10s (a few microseconds of wall time at most),
        // and the attack is armed essentially immediately.
        assert!((transport.position() - 10.0).abs() < 0.05);
        let next = transport.scheduler.next_fire_at().unwrap();
        assert!(next < 0.05, "attack should be due right away, got {next}");
    }

    #[test]
    fn seek_clamps_to_duration() {
        let (_sink, mut transport) = transport_for(&data(note_pair(0, 960, 0, 60)));
        transport.seek(500.0);
        assert_eq!(transport.position(), transport.duration());
        transport.seek(-3.0);
        assert_eq!(transport.position(), 0.0);
    }

    #[test]
    fn playback_auto_stops_at_the_end() {
        let (_sink, mut transport) = transport_for(&data(note_pair(0, 480, 0, 60)));
        let end = transport.duration();
        transport.play_from(end);
        transport.tick();
        assert_eq!(transport.state(), PlaybackState::Stopped);
        assert_eq!(transport.position(), 0.0);
    }

    #[test]
    fn change_instrument_resumes_from_the_same_offset() {
        let (_sink, mut transport) = transport_for(&data(note_pair(0, 9600, 0, 60)));
        transport.play_from(2.0);
        transport.change_instrument(40);

        assert_eq!(transport.state(), PlaybackState::Playing);
        assert!((transport.position() - 2.0).abs() < 0.05);
        assert_eq!(transport.registry().program_for(0), Some(40));

        // Percussion channel keeps its kit.
        transport.stop();
        transport.set_channel_mute(9, false);
        transport.change_instrument(12);
        assert_eq!(transport.registry().program_for(9), None);
    }

    #[test]
    fn volume_is_clamped_to_percent_range() {
        let (sink, mut transport) = transport_for(&data(note_pair(0, 480, 0, 60)));
        sink.take();
        transport.set_volume(150);
        assert_eq!(transport.volume_percent(), 100);
        assert!(sink.take().contains(&SinkCall::MasterGain(1.0)));
    }

    #[test]
    fn export_rounds_to_four_decimals() {
        // 160 ticks at 120 BPM = 0.1666... seconds.
        let (_sink, transport) = transport_for(&data(note_pair(160, 320, 0, 72)));
        let export = transport.export_to_json();
        assert_eq!(export.tracks.len(), 1);
        let note = &export.tracks[0].notes[0];
        assert_eq!(note.time, 0.1667);
        assert_eq!(note.duration, 0.1667);
        assert_eq!(note.note, 72);

        let json = serde_json::to_string(&export).unwrap();
        assert!(json.contains("\"note\":72"));
    }
}
