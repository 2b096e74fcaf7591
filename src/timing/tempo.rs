//! Piecewise-constant tempo map: converts tick positions into seconds.

use crate::midi::{EventKind, MidiData};

/// 120 BPM, the SMF default when a file carries no tempo meta event.
pub const DEFAULT_MICROSECONDS_PER_BEAT: u32 = 500_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TempoBreakpoint {
    pub tick: u64,
    pub microseconds_per_beat: u32,
}

/// Ordered tempo breakpoints, immutable once built for a loaded file.
#[derive(Debug, Clone)]
pub struct TempoMap {
    breakpoints: Vec<TempoBreakpoint>,
}

impl TempoMap {
    /// Collects tempo meta events across all tracks. Sorting is stable, so
    /// breakpoints sharing a tick keep their encounter order and the last
    /// one governs the interval that follows.
    pub fn from_midi(data: &MidiData) -> Self {
        let mut breakpoints: Vec<TempoBreakpoint> = data
            .tracks
            .iter()
            .flat_map(|t| t.events.iter())
            .filter_map(|e| match e.kind {
                EventKind::Tempo {
                    microseconds_per_beat,
                } => Some(TempoBreakpoint {
                    tick: e.tick,
                    microseconds_per_beat,
                }),
                _ => None,
            })
            .collect();
        breakpoints.sort_by_key(|bp| bp.tick);

        if breakpoints.first().map(|bp| bp.tick) != Some(0) {
            breakpoints.insert(
                0,
                TempoBreakpoint {
                    tick: 0,
                    microseconds_per_beat: DEFAULT_MICROSECONDS_PER_BEAT,
                },
            );
        }
        Self { breakpoints }
    }

    pub fn breakpoints(&self) -> &[TempoBreakpoint] {
        &self.breakpoints
    }

    /// Walks the map breakpoint by breakpoint, accumulating the seconds each
    /// tempo governs. O(breakpoints), which stays cheap: tempo changes are
    /// rare next to notes.
    pub fn ticks_to_seconds(&self, tick: u64, ticks_per_beat: u16) -> f64 {
        debug_assert!(ticks_per_beat > 0, "checked at load");
        let tpb = f64::from(ticks_per_beat);
        let mut seconds = 0.0;
        let mut cursor = 0u64;
        let mut tempo = f64::from(DEFAULT_MICROSECONDS_PER_BEAT);

        for bp in &self.breakpoints {
            if bp.tick >= tick {
                break;
            }
            seconds += (bp.tick - cursor) as f64 / tpb * tempo / 1_000_000.0;
            cursor = bp.tick;
            tempo = f64::from(bp.microseconds_per_beat);
        }
        seconds + (tick - cursor) as f64 / tpb * tempo / 1_000_000.0
    }

    /// Wall-clock length of the file: the time of its furthest event.
    pub fn duration_seconds(&self, data: &MidiData) -> f64 {
        self.ticks_to_seconds(data.max_tick(), data.ticks_per_beat)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::midi::{MidiTrack, TrackEvent};

    fn data_with_tempos(tempos: &[(u64, u32)]) -> MidiData {
        let events = tempos
            .iter()
            .map(|&(tick, microseconds_per_beat)| TrackEvent {
                tick,
                kind: EventKind::Tempo {
                    microseconds_per_beat,
                },
            })
            .collect();
        MidiData {
            ticks_per_beat: 480,
            tracks: vec![MidiTrack { events }],
        }
    }

    #[test]
    fn default_breakpoint_when_file_has_none() {
        let map = TempoMap::from_midi(&data_with_tempos(&[]));
        assert_eq!(
            map.breakpoints(),
            &[TempoBreakpoint {
                tick: 0,
                microseconds_per_beat: DEFAULT_MICROSECONDS_PER_BEAT
            }]
        );
    }

    #[test]
    fn synthetic_zero_breakpoint_prepended() {
        let map = TempoMap::from_midi(&data_with_tempos(&[(960, 250_000)]));
        assert_eq!(map.breakpoints()[0].tick, 0);
        assert_eq!(
            map.breakpoints()[0].microseconds_per_beat,
            DEFAULT_MICROSECONDS_PER_BEAT
        );
        assert_eq!(map.breakpoints()[1].tick, 960);
    }

    #[test]
    fn one_beat_at_120_bpm_is_half_a_second() {
        let map = TempoMap::from_midi(&data_with_tempos(&[(0, 500_000)]));
        assert_eq!(map.ticks_to_seconds(480, 480), 0.5);
        assert_eq!(map.ticks_to_seconds(0, 480), 0.0);
    }

    #[test]
    fn accumulates_across_tempo_changes() {
        // One beat at 120 BPM, then one beat at 240 BPM.
        let map = TempoMap::from_midi(&data_with_tempos(&[(0, 500_000), (480, 250_000)]));
        let total = map.ticks_to_seconds(960, 480);
        assert!((total - 0.75).abs() < 1e-12);
    }

    #[test]
    fn monotonically_non_decreasing() {
        let map = TempoMap::from_midi(&data_with_tempos(&[
            (0, 500_000),
            (100, 100_000),
            (400, 1_000_000),
            (400, 750_000),
        ]));
        let mut last = 0.0;
        for tick in 0..1000u64 {
            let s = map.ticks_to_seconds(tick, 480);
            assert!(s >= last, "regressed at tick {tick}");
            last = s;
        }
    }

    #[test]
    fn tied_breakpoints_keep_encounter_order() {
        let map = TempoMap::from_midi(&data_with_tempos(&[(0, 500_000), (0, 250_000)]));
        // The later entry at tick 0 governs everything after it.
        assert_eq!(map.ticks_to_seconds(480, 480), 0.25);
    }

    #[test]
    fn duration_is_time_of_furthest_event() {
        let mut data = data_with_tempos(&[(0, 500_000)]);
        data.tracks[0].events.push(TrackEvent {
            tick: 1920,
            kind: EventKind::NoteOff {
                channel: 0,
                note: 60,
            },
        });
        let map = TempoMap::from_midi(&data);
        assert_eq!(map.duration_seconds(&data), 2.0);
    }
}
