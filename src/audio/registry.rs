use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::audio::voice::{LoadResult, Voice, VoiceFactory};
use crate::audio::NoteSink;
use crate::audio::gain_to_db;
use crate::error::VoiceError;
use crate::midi::{EventKind, MidiData};

pub const PERCUSSION_CHANNEL: u8 = 9;
const CHANNEL_COUNT: u8 = 16;

struct ChannelState {
    program: u8,
    voice: Voice,
    generation: u64,
}

struct PendingLoad {
    generation: u64,
    program: u8,
    started: Instant,
}

/// Owns one voice per active channel plus the mute/solo state. Everything
/// here is mutated from the engine thread only; loader completions arrive
/// as values and are applied under the generation check.
pub struct ChannelRegistry {
    factory: VoiceFactory,
    sink: Arc<dyn NoteSink>,
    channels: HashMap<u8, ChannelState>,
    muted: HashSet<u8>,
    solo: Option<u8>,
    pending: HashMap<u8, PendingLoad>,
    next_generation: u64,
}

impl ChannelRegistry {
    pub fn new(factory: VoiceFactory, sink: Arc<dyn NoteSink>) -> Self {
        Self {
            factory,
            sink,
            channels: HashMap::new(),
            muted: HashSet::new(),
            solo: None,
            pending: HashMap::new(),
            next_generation: 0,
        }
    }

    fn bump_generation(&mut self) -> u64 {
        self.next_generation += 1;
        self.next_generation
    }

    /// Replaces the channel's voice. No-op when the program is unchanged
    /// and a voice already exists. Releasing the old voice is best-effort:
    /// a stuck voice must never block playback.
    pub fn set_program(&mut self, channel: u8, program: u8) {
        if channel >= CHANNEL_COUNT {
            return;
        }
        if let Some(state) = self.channels.get(&channel) {
            if state.program == program {
                return;
            }
            state.voice.release_all();
        }

        let generation = self.bump_generation();
        let voice = self.factory.create_voice(channel, program, generation);
        if voice.awaiting_samples() {
            self.pending.insert(
                channel,
                PendingLoad {
                    generation,
                    program,
                    started: Instant::now(),
                },
            );
        } else {
            // Any in-flight load now belongs to a superseded assignment.
            self.pending.remove(&channel);
        }
        self.channels.insert(
            channel,
            ChannelState {
                program,
                voice,
                generation,
            },
        );
        debug!(channel, program, generation, "channel reprogrammed");
    }

    fn ensure_channel(&mut self, channel: u8) {
        if !self.channels.contains_key(&channel) {
            self.set_program(channel, 0);
        }
    }

    fn effectively_muted(&self, channel: u8) -> bool {
        if let Some(solo) = self.solo {
            if solo != channel {
                return true;
            }
        }
        self.muted.contains(&channel)
    }

    pub fn play_note(&mut self, channel: u8, note: u8, velocity: u8, duration_seconds: f64) {
        if channel >= CHANNEL_COUNT || note > 127 {
            return;
        }
        if self.effectively_muted(channel) {
            return;
        }
        self.ensure_channel(channel);
        // The 0.1 floor keeps near-silent attacks from becoming no-ops.
        let gain = (f32::from(velocity) / 127.0).clamp(0.1, 1.0);
        if let Some(state) = self.channels.get(&channel) {
            state
                .voice
                .trigger_attack_release(note, duration_seconds, gain);
        }
    }

    pub fn set_mute(&mut self, channel: u8, muted: bool) {
        if muted {
            self.muted.insert(channel);
        } else {
            self.muted.remove(&channel);
        }
    }

    pub fn is_muted(&self, channel: u8) -> bool {
        self.muted.contains(&channel)
    }

    pub fn set_solo(&mut self, channel: Option<u8>) {
        self.solo = channel;
    }

    pub fn solo(&self) -> Option<u8> {
        self.solo
    }

    /// Panic stop: releases everything that is sounding. Idempotent.
    pub fn release_all_voices(&self) {
        self.sink.release_all();
    }

    pub fn set_channel_volume(&mut self, channel: u8, volume: u8) {
        if let Some(state) = self.channels.get(&channel) {
            let gain = (f32::from(volume.min(127)) / 127.0).max(0.001);
            state.voice.set_volume(gain_to_db(gain));
        }
    }

    pub fn set_master_volume(&self, percent: u8) {
        self.sink
            .set_master_gain(f32::from(percent.min(100)) / 100.0);
    }

    pub fn program_for(&self, channel: u8) -> Option<u8> {
        self.channels.get(&channel).map(|s| s.program)
    }

    pub fn active_channels(&self) -> Vec<u8> {
        let mut channels: Vec<u8> = self.channels.keys().copied().collect();
        channels.sort_unstable();
        channels
    }

    /// Primes channels from the file's program-change events so the right
    /// instruments exist before the first note sounds.
    pub fn apply_program_changes(&mut self, data: &MidiData) {
        for event in data.tracks.iter().flat_map(|t| t.events.iter()) {
            if let EventKind::ProgramChange { channel, program } = event.kind {
                self.set_program(channel, program);
            }
        }
    }

    /// Drains loader completions and expires loads that overstayed the
    /// timeout. Called from the engine tick.
    pub fn service_loads(&mut self, timeout: Duration) {
        while let Some(result) = self.factory.poll_loaded() {
            self.apply_load_result(result);
        }
        self.expire_loads(timeout);
    }

    pub(crate) fn apply_load_result(&mut self, result: LoadResult) {
        let Some(pending) = self.pending.get(&result.channel) else {
            debug!(
                channel = result.channel,
                program = result.program,
                "discarding load result with no pending assignment"
            );
            return;
        };
        if pending.generation != result.generation {
            // Expected benign race: the channel was reprogrammed while the
            // load was in flight. The result is dropped, not installed.
            debug!(
                channel = result.channel,
                stale = result.generation,
                current = pending.generation,
                "discarding stale sample load"
            );
            return;
        }
        self.pending.remove(&result.channel);

        match result.outcome {
            Ok(bank) => {
                if let Some(state) = self.channels.get_mut(&result.channel) {
                    if state.generation == result.generation {
                        info!(
                            channel = result.channel,
                            bank = %bank.name,
                            zones = bank.zone_count(),
                            "sample bank installed"
                        );
                        state.voice.install_bank(Arc::new(bank));
                    }
                }
            }
            Err(err) => {
                warn!(channel = result.channel, %err, "falling back to synthesized voice");
                if let Some(state) = self.channels.get_mut(&result.channel) {
                    if state.generation == result.generation {
                        state.voice.degrade_to_fallback();
                    }
                }
            }
        }
    }

    fn expire_loads(&mut self, timeout: Duration) {
        let expired: Vec<(u8, u64, u8)> = self
            .pending
            .iter()
            .filter(|(_, p)| p.started.elapsed() >= timeout)
            .map(|(&channel, p)| (channel, p.generation, p.program))
            .collect();
        for (channel, generation, program) in expired {
            self.pending.remove(&channel);
            let err = VoiceError::SampleTimeout {
                program,
                seconds: timeout.as_secs(),
            };
            warn!(channel, %err, "sample load expired");
            if let Some(state) = self.channels.get_mut(&channel) {
                if state.generation == generation {
                    state.voice.degrade_to_fallback();
                }
            }
        }
    }

    /// Releases every owned voice and clears all maps. Safe to call more
    /// than once.
    pub fn dispose(&mut self) {
        for state in self.channels.values() {
            state.voice.dispose();
        }
        self.channels.clear();
        self.muted.clear();
        self.pending.clear();
        self.solo = None;
        self.sink.release_all();
    }

    #[cfg(test)]
    pub(crate) fn backdate_pending(&mut self, channel: u8, by: Duration) {
        if let Some(pending) = self.pending.get_mut(&channel) {
            pending.started = Instant::now() - by;
        }
    }
}
