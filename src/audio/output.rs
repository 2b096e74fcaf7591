//! The real-time backend: a cpal stream whose callback drains voice
//! commands from an SPSC ring and renders per-channel polyphony. Channel
//! configurations arrive through arc-swap; notes capture their source when
//! they start, so a config swap never cuts a sounding note.

use std::sync::Arc;

use arc_swap::ArcSwap;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use parking_lot::Mutex;
use ringbuf::{
    HeapProd, HeapRb,
    traits::{Consumer, Producer, Split},
};
use tracing::{info, warn};

use crate::audio::instrument::{sample_adsr, Adsr, Wave};
use crate::audio::{midi_to_freq, NoteSink};
use crate::error::AudioError;
use crate::events::{default_table, ChannelTable, RenderKind, VoiceCommand};

const COMMAND_QUEUE_SIZE: usize = 4096;
const MAX_NOTES_PER_CHANNEL: usize = 32;

/// Control-side handle: the sink voices connect into. Safe to share across
/// threads; the cpal stream itself stays with the engine.
pub struct AudioOutput {
    producer: Mutex<HeapProd<VoiceCommand>>,
    configs: Arc<ArcSwap<ChannelTable>>,
}

impl AudioOutput {
    fn push(&self, command: VoiceCommand) {
        if self.producer.lock().try_push(command).is_err() {
            warn!("voice command queue full; dropping command");
        }
    }
}

impl NoteSink for AudioOutput {
    fn configure(&self, channel: u8, kind: RenderKind) {
        if channel >= 16 {
            return;
        }
        let mut table = (**self.configs.load()).clone();
        table[usize::from(channel)] = kind;
        self.configs.store(Arc::new(table));
    }

    fn note_on(&self, channel: u8, note: u8, gain: f32, hold_seconds: f64) {
        self.push(VoiceCommand::NoteOn {
            channel,
            note,
            gain,
            hold_seconds,
        });
    }

    fn release_channel(&self, channel: u8) {
        self.push(VoiceCommand::ReleaseChannel { channel });
    }

    fn release_all(&self) {
        self.push(VoiceCommand::ReleaseAll);
    }

    fn set_channel_gain(&self, channel: u8, gain: f32) {
        self.push(VoiceCommand::ChannelGain { channel, gain });
    }

    fn set_master_gain(&self, gain: f32) {
        self.push(VoiceCommand::MasterGain { gain });
    }
}

pub struct OutputStream {
    pub sink: Arc<AudioOutput>,
    _stream: cpal::Stream,
}

/// One-time warm-up: builds the device stream and starts it. Subsequent
/// plays reuse the same stream.
pub fn start_output() -> Result<OutputStream, AudioError> {
    let host = cpal::default_host();
    let device = host.default_output_device().ok_or(AudioError::NoDevice)?;
    let config = device.default_output_config()?;
    let stream_config: cpal::StreamConfig = config.into();

    let sample_rate = stream_config.sample_rate as f32;
    let out_channels = usize::from(stream_config.channels);

    let ring = HeapRb::<VoiceCommand>::new(COMMAND_QUEUE_SIZE);
    let (producer, mut consumer) = ring.split();
    let configs = Arc::new(ArcSwap::from_pointee(default_table()));

    let callback_configs = configs.clone();
    let mut bank = RenderBank::new(sample_rate);
    let stream = device.build_output_stream(
        &stream_config,
        move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
            let table = callback_configs.load();
            while let Some(command) = consumer.try_pop() {
                bank.apply(&command, &table);
            }
            bank.render(data, out_channels);
        },
        |err| warn!(%err, "audio stream error"),
        None,
    )?;
    stream.play()?;

    info!(sample_rate, channels = out_channels, "audio output running");
    Ok(OutputStream {
        sink: Arc::new(AudioOutput {
            producer: Mutex::new(producer),
            configs,
        }),
        _stream: stream,
    })
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Stage {
    Attack,
    Decay,
    Sustain,
    Release { from: f32 },
    Done,
}

#[derive(Debug, Clone)]
struct Envelope {
    adsr: Adsr,
    stage: Stage,
    level: f32,
    time: f32,
}

impl Envelope {
    fn new(adsr: Adsr) -> Self {
        Self {
            adsr,
            stage: Stage::Attack,
            level: 0.0,
            time: 0.0,
        }
    }

    fn release(&mut self) {
        if !matches!(self.stage, Stage::Release { .. } | Stage::Done) {
            self.stage = Stage::Release { from: self.level };
            self.time = 0.0;
        }
    }

    fn finish(&mut self) {
        self.stage = Stage::Done;
        self.level = 0.0;
    }

    fn is_done(&self) -> bool {
        self.stage == Stage::Done
    }

    fn next(&mut self, dt: f32) -> f32 {
        match self.stage {
            Stage::Attack => {
                self.level = if self.adsr.attack <= 0.0 {
                    1.0
                } else {
                    (self.time / self.adsr.attack).min(1.0)
                };
                self.time += dt;
                if self.time >= self.adsr.attack {
                    self.stage = Stage::Decay;
                    self.time = 0.0;
                }
            }
            Stage::Decay => {
                let progress = if self.adsr.decay <= 0.0 {
                    1.0
                } else {
                    (self.time / self.adsr.decay).min(1.0)
                };
                self.level = 1.0 - (1.0 - self.adsr.sustain) * progress;
                self.time += dt;
                if self.time >= self.adsr.decay {
                    self.stage = Stage::Sustain;
                    self.level = self.adsr.sustain;
                }
            }
            Stage::Sustain => {
                self.level = self.adsr.sustain;
            }
            Stage::Release { from } => {
                let progress = if self.adsr.release <= 0.0 {
                    1.0
                } else {
                    (self.time / self.adsr.release).min(1.0)
                };
                self.level = from * (1.0 - progress);
                self.time += dt;
                if progress >= 1.0 {
                    self.finish();
                }
            }
            Stage::Done => {
                self.level = 0.0;
            }
        }
        self.level
    }
}

#[derive(Debug)]
enum NoteSource {
    Osc {
        wave: Wave,
        phase: f32,
        step: f32,
        patch_gain: f32,
    },
    Sample {
        data: Arc<[f32]>,
        pos: f64,
        step: f64,
    },
}

#[derive(Debug)]
struct ActiveNote {
    note: u8,
    gain: f32,
    /// Samples until the automatic release fires.
    hold_left: f64,
    env: Envelope,
    source: NoteSource,
}

impl ActiveNote {
    fn next_sample(&mut self, dt: f32) -> f32 {
        if self.hold_left > 0.0 {
            self.hold_left -= 1.0;
            if self.hold_left <= 0.0 {
                self.env.release();
            }
        }
        let amp = self.env.next(dt);
        if self.env.is_done() {
            return 0.0;
        }

        let raw = match &mut self.source {
            NoteSource::Osc {
                wave,
                phase,
                step,
                patch_gain,
            } => {
                let value = match wave {
                    Wave::Sine => (*phase * std::f32::consts::TAU).sin(),
                    Wave::Triangle => 1.0 - 4.0 * (*phase - 0.5).abs(),
                    Wave::Square => {
                        if *phase < 0.5 {
                            -1.0
                        } else {
                            1.0
                        }
                    }
                    Wave::Saw => *phase * 2.0 - 1.0,
                };
                *phase += *step;
                if *phase >= 1.0 {
                    *phase -= 1.0;
                }
                value * *patch_gain
            }
            NoteSource::Sample { data, pos, step } => {
                let index = *pos as usize;
                if index + 1 >= data.len() {
                    self.env.finish();
                    return 0.0;
                }
                let frac = (*pos - index as f64) as f32;
                let value = data[index] + (data[index + 1] - data[index]) * frac;
                *pos += *step;
                value
            }
        };
        raw * amp * self.gain
    }

    fn releasing(&self) -> bool {
        matches!(self.env.stage, Stage::Release { .. } | Stage::Done)
    }
}

#[derive(Debug)]
struct Strip {
    notes: Vec<ActiveNote>,
    gain: f32,
}

impl Strip {
    fn note_on(&mut self, kind: &RenderKind, note: u8, gain: f32, hold_seconds: f64, sr: f32) {
        // Same-pitch retrigger cuts the prior sustain into its release.
        for existing in &mut self.notes {
            if existing.note == note && !existing.releasing() {
                existing.env.release();
            }
        }
        if self.notes.len() >= MAX_NOTES_PER_CHANNEL {
            self.notes.remove(0);
        }

        let (source, adsr) = match kind {
            RenderKind::Synth(params) => (
                NoteSource::Osc {
                    wave: params.wave,
                    phase: 0.0,
                    step: midi_to_freq(note) / sr,
                    patch_gain: params.gain,
                },
                params.adsr,
            ),
            RenderKind::Sampled(bank) => match bank.nearest_zone(note) {
                Some(zone) => {
                    let ratio = 2.0_f64.powf(f64::from(i16::from(note) - i16::from(zone.root)) / 12.0);
                    (
                        NoteSource::Sample {
                            data: zone.data.clone(),
                            pos: 0.0,
                            step: ratio * f64::from(zone.sample_rate) / f64::from(sr),
                        },
                        sample_adsr(),
                    )
                }
                None => return,
            },
        };

        self.notes.push(ActiveNote {
            note,
            gain,
            hold_left: hold_seconds * f64::from(sr),
            env: Envelope::new(adsr),
            source,
        });
    }

    fn release_all(&mut self) {
        for note in &mut self.notes {
            note.env.release();
        }
    }
}

/// Per-channel render state shared between the live callback and the
/// offline renderer.
pub(crate) struct RenderBank {
    sample_rate: f32,
    strips: [Strip; 16],
    master_gain: f32,
}

impl RenderBank {
    pub(crate) fn new(sample_rate: f32) -> Self {
        Self {
            sample_rate,
            strips: std::array::from_fn(|_| Strip {
                notes: Vec::new(),
                gain: 1.0,
            }),
            master_gain: 0.7,
        }
    }

    pub(crate) fn apply(&mut self, command: &VoiceCommand, configs: &ChannelTable) {
        match command {
            VoiceCommand::NoteOn {
                channel,
                note,
                gain,
                hold_seconds,
            } => {
                let sr = self.sample_rate;
                if let Some(strip) = self.strips.get_mut(usize::from(*channel)) {
                    strip.note_on(
                        &configs[usize::from(*channel)],
                        *note,
                        *gain,
                        *hold_seconds,
                        sr,
                    );
                }
            }
            VoiceCommand::ReleaseChannel { channel } => {
                if let Some(strip) = self.strips.get_mut(usize::from(*channel)) {
                    strip.release_all();
                }
            }
            VoiceCommand::ReleaseAll => {
                for strip in &mut self.strips {
                    strip.release_all();
                }
            }
            VoiceCommand::ChannelGain { channel, gain } => {
                if let Some(strip) = self.strips.get_mut(usize::from(*channel)) {
                    strip.gain = *gain;
                }
            }
            VoiceCommand::MasterGain { gain } => {
                self.master_gain = *gain;
            }
        }
    }

    /// Renders interleaved frames, writing the mix to the first two output
    /// channels.
    pub(crate) fn render(&mut self, data: &mut [f32], out_channels: usize) {
        data.fill(0.0);
        if out_channels == 0 {
            return;
        }
        let frames = data.len() / out_channels;
        let dt = 1.0 / self.sample_rate;

        for frame in 0..frames {
            let mut mix = 0.0f32;
            for strip in &mut self.strips {
                let mut sum = 0.0f32;
                for note in &mut strip.notes {
                    sum += note.next_sample(dt);
                }
                mix += sum * strip.gain;
            }
            let sample = mix * self.master_gain;
            let base = frame * out_channels;
            data[base] = sample;
            if out_channels > 1 {
                data[base + 1] = sample;
            }
        }

        for strip in &mut self.strips {
            strip.notes.retain(|n| !n.env.is_done());
        }
    }

    pub(crate) fn active_notes(&self) -> usize {
        self.strips.iter().map(|s| s.notes.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::instrument::{percussion_params, SynthParams};
    use crate::audio::voice::test_bank;

    fn synth_table(params: SynthParams) -> ChannelTable {
        std::array::from_fn(|_| RenderKind::Synth(params))
    }

    fn note_on(channel: u8, note: u8, hold: f64) -> VoiceCommand {
        VoiceCommand::NoteOn {
            channel,
            note,
            gain: 1.0,
            hold_seconds: hold,
        }
    }

    #[test]
    fn triggered_note_produces_audio() {
        let table = synth_table(percussion_params());
        let mut bank = RenderBank::new(44_100.0);
        bank.apply(&note_on(0, 60, 0.5), &table);

        let mut buffer = vec![0.0f32; 512 * 2];
        bank.render(&mut buffer, 2);
        assert!(buffer.iter().any(|&s| s.abs() > 1e-4));
        assert_eq!(bank.active_notes(), 1);
    }

    #[test]
    fn zero_master_gain_silences_the_mix() {
        let table = synth_table(percussion_params());
        let mut bank = RenderBank::new(44_100.0);
        bank.apply(&VoiceCommand::MasterGain { gain: 0.0 }, &table);
        bank.apply(&note_on(0, 60, 0.5), &table);

        let mut buffer = vec![0.0f32; 256 * 2];
        bank.render(&mut buffer, 2);
        assert!(buffer.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn released_notes_decay_and_are_retired() {
        let params = SynthParams {
            wave: Wave::Sine,
            adsr: Adsr {
                attack: 0.0,
                decay: 0.0,
                sustain: 1.0,
                release: 0.01,
            },
            gain: 1.0,
        };
        let table = synth_table(params);
        let mut bank = RenderBank::new(44_100.0);
        bank.apply(&note_on(0, 60, 10.0), &table);
        bank.apply(&VoiceCommand::ReleaseAll, &table);

        // 0.01s release at 44.1kHz is 441 samples; a full second clears it.
        let mut buffer = vec![0.0f32; 44_100 * 2];
        bank.render(&mut buffer, 2);
        assert_eq!(bank.active_notes(), 0);
    }

    #[test]
    fn same_pitch_retrigger_replaces_prior_sustain() {
        let table = synth_table(percussion_params());
        let mut bank = RenderBank::new(44_100.0);
        bank.apply(&note_on(0, 60, 1.0), &table);
        bank.apply(&note_on(0, 60, 1.0), &table);

        let strip = &bank.strips[0];
        assert_eq!(strip.notes.len(), 2);
        assert!(strip.notes[0].releasing());
        assert!(!strip.notes[1].releasing());
    }

    #[test]
    fn sampled_note_finishes_when_data_runs_out() {
        let mut table = synth_table(percussion_params());
        table[0] = RenderKind::Sampled(Arc::new(test_bank("piano", &[60])));
        let mut bank = RenderBank::new(44_100.0);
        bank.apply(&note_on(0, 60, 5.0), &table);
        assert_eq!(bank.active_notes(), 1);

        let mut buffer = vec![0.0f32; 128 * 2];
        bank.render(&mut buffer, 2);
        // The test bank holds a handful of samples; the note exhausts them
        // inside one buffer and is retired.
        assert_eq!(bank.active_notes(), 0);
    }

    #[test]
    fn hold_expiry_triggers_the_release_automatically() {
        let params = SynthParams {
            wave: Wave::Saw,
            adsr: Adsr {
                attack: 0.0,
                decay: 0.0,
                sustain: 1.0,
                release: 0.001,
            },
            gain: 1.0,
        };
        let table = synth_table(params);
        let mut bank = RenderBank::new(1_000.0);
        // Hold for 100 samples, release lasts 1 sample.
        bank.apply(&note_on(0, 60, 0.1), &table);

        let mut buffer = vec![0.0f32; 300];
        bank.render(&mut buffer, 1);
        assert_eq!(bank.active_notes(), 0);
    }
}
