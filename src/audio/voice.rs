use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crossbeam::channel::{Receiver, Sender};
use tracing::{debug, warn};

use crate::audio::instrument::{
    self, InstrumentKind, SampleManifest, SampleSetDef, note_name_to_midi,
};
use crate::audio::{NoteSink, db_to_gain};
use crate::error::VoiceError;
use crate::events::RenderKind;

/// A load that has not resolved within this window fails over to the
/// fallback synthesis voice.
pub const SAMPLE_LOAD_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct SampleZone {
    pub root: u8,
    pub sample_rate: u32,
    pub data: Arc<[f32]>,
}

/// Decoded sample set for one instrument, zones sorted by root note.
#[derive(Clone)]
pub struct SampleBank {
    pub name: String,
    zones: Vec<SampleZone>,
}

impl SampleBank {
    pub fn nearest_zone(&self, note: u8) -> Option<&SampleZone> {
        self.zones
            .iter()
            .min_by_key(|z| (i16::from(z.root) - i16::from(note)).abs())
    }

    pub fn zone_count(&self) -> usize {
        self.zones.len()
    }
}

impl fmt::Debug for SampleBank {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SampleBank")
            .field("name", &self.name)
            .field("zones", &self.zones.len())
            .finish()
    }
}

/// The on-disk sample collection: a root directory plus its `samples.ron`
/// manifest. A missing manifest just means every program is synthesized.
pub struct SampleLibrary {
    root: PathBuf,
    manifest: SampleManifest,
}

impl SampleLibrary {
    pub fn load(root: &Path) -> Self {
        let manifest_path = root.join("samples.ron");
        let manifest = match std::fs::read_to_string(&manifest_path) {
            Ok(text) => match ron::from_str(&text) {
                Ok(manifest) => manifest,
                Err(err) => {
                    warn!(path = %manifest_path.display(), %err, "ignoring malformed sample manifest");
                    SampleManifest::default()
                }
            },
            Err(_) => SampleManifest::default(),
        };
        Self {
            root: root.to_path_buf(),
            manifest,
        }
    }

    pub fn empty() -> Self {
        Self {
            root: PathBuf::new(),
            manifest: SampleManifest::default(),
        }
    }

    #[cfg(test)]
    pub(crate) fn with_manifest(manifest: SampleManifest) -> Self {
        Self {
            root: PathBuf::new(),
            manifest,
        }
    }

    pub fn manifest(&self) -> &SampleManifest {
        &self.manifest
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

/// Capability object for one channel's sound. Owned exclusively by the
/// registry; all it can do is trigger, release, and adjust volume through
/// the sink it was built over.
pub struct Voice {
    channel: u8,
    kind: InstrumentKind,
    bank: Option<Arc<SampleBank>>,
    sink: Arc<dyn NoteSink>,
}

impl Voice {
    fn new(channel: u8, kind: InstrumentKind, sink: Arc<dyn NoteSink>) -> Self {
        let voice = Self {
            channel,
            kind,
            bank: None,
            sink,
        };
        voice.sink.configure(channel, voice.render_kind());
        voice
    }

    fn render_kind(&self) -> RenderKind {
        match &self.kind {
            InstrumentKind::Synthesized(params) => RenderKind::Synth(*params),
            InstrumentKind::Percussion => RenderKind::Synth(instrument::percussion_params()),
            InstrumentKind::Sampled { .. } => match &self.bank {
                Some(bank) => RenderKind::Sampled(bank.clone()),
                // Placeholder until the asynchronous load lands.
                None => RenderKind::Synth(instrument::fallback_params()),
            },
        }
    }

    pub fn kind(&self) -> &InstrumentKind {
        &self.kind
    }

    /// True while a sampled voice is still playing through its placeholder.
    pub fn awaiting_samples(&self) -> bool {
        matches!(self.kind, InstrumentKind::Sampled { .. }) && self.bank.is_none()
    }

    pub fn trigger_attack_release(&self, note: u8, duration_seconds: f64, velocity_gain: f32) {
        self.sink
            .note_on(self.channel, note, velocity_gain, duration_seconds);
    }

    pub fn release_all(&self) {
        self.sink.release_channel(self.channel);
    }

    pub fn set_volume(&self, db: f32) {
        self.sink.set_channel_gain(self.channel, db_to_gain(db));
    }

    /// Transparently swaps the placeholder for the loaded bank.
    pub(crate) fn install_bank(&mut self, bank: Arc<SampleBank>) {
        self.bank = Some(bank);
        self.sink.configure(self.channel, self.render_kind());
    }

    /// Falls back to plain synthesis after a failed or timed-out load.
    pub(crate) fn degrade_to_fallback(&mut self) {
        self.kind = InstrumentKind::Synthesized(instrument::fallback_params());
        self.bank = None;
        self.sink.configure(self.channel, self.render_kind());
    }

    pub fn dispose(&self) {
        self.sink.release_channel(self.channel);
    }
}

pub(crate) struct LoadRequest {
    pub channel: u8,
    pub generation: u64,
    pub program: u8,
    pub name: String,
    pub def: SampleSetDef,
    pub root: PathBuf,
}

pub(crate) struct LoadResult {
    pub channel: u8,
    pub generation: u64,
    pub program: u8,
    pub outcome: Result<SampleBank, VoiceError>,
}

/// Background worker decoding sample sets. Completions are polled from the
/// engine thread, never applied from here: the registry stays the single
/// writer of channel state.
struct SampleLoader {
    request_tx: Sender<LoadRequest>,
    result_rx: Receiver<LoadResult>,
}

impl SampleLoader {
    fn spawn() -> Self {
        let (request_tx, request_rx) = crossbeam::channel::unbounded::<LoadRequest>();
        let (result_tx, result_rx) = crossbeam::channel::unbounded();

        std::thread::spawn(move || {
            for req in request_rx.iter() {
                let outcome = load_bank(&req);
                if let Err(err) = &outcome {
                    warn!(program = req.program, channel = req.channel, %err, "sample load failed");
                }
                let _ = result_tx.send(LoadResult {
                    channel: req.channel,
                    generation: req.generation,
                    program: req.program,
                    outcome,
                });
            }
        });

        Self {
            request_tx,
            result_rx,
        }
    }
}

/// Builds voices for the registry. Sampled programs come back immediately
/// with a placeholder; the real bank arrives later through `poll_loaded`.
pub struct VoiceFactory {
    sink: Arc<dyn NoteSink>,
    library: Arc<SampleLibrary>,
    loader: SampleLoader,
}

impl VoiceFactory {
    pub fn new(sink: Arc<dyn NoteSink>, library: Arc<SampleLibrary>) -> Self {
        Self {
            sink,
            library,
            loader: SampleLoader::spawn(),
        }
    }

    pub fn create_voice(&self, channel: u8, program: u8, generation: u64) -> Voice {
        if channel == 9 {
            return Voice::new(channel, InstrumentKind::Percussion, self.sink.clone());
        }

        let kind = instrument::kind_for_program(program, self.library.manifest());
        if let InstrumentKind::Sampled { name, def } = &kind {
            debug!(channel, program, name, "queueing sample load");
            let _ = self.loader.request_tx.send(LoadRequest {
                channel,
                generation,
                program,
                name: name.clone(),
                def: def.clone(),
                root: self.library.root().to_path_buf(),
            });
        }
        Voice::new(channel, kind, self.sink.clone())
    }

    pub(crate) fn poll_loaded(&self) -> Option<LoadResult> {
        self.loader.result_rx.try_recv().ok()
    }
}

fn load_bank(req: &LoadRequest) -> Result<SampleBank, VoiceError> {
    let base = req.root.join(&req.def.base_dir);
    let mut zones = Vec::with_capacity(req.def.files.len());
    for (note_name, file) in &req.def.files {
        let Some(root) = note_name_to_midi(note_name) else {
            warn!(name = %req.name, note_name, "skipping unparseable note name");
            continue;
        };
        let path = base.join(file);
        let (sample_rate, data) = load_wav_mono(&path)?;
        zones.push(SampleZone {
            root,
            sample_rate,
            data: data.into(),
        });
    }
    if zones.is_empty() {
        return Err(VoiceError::EmptyBank {
            name: req.name.clone(),
        });
    }
    zones.sort_by_key(|z| z.root);
    Ok(SampleBank {
        name: req.name.clone(),
        zones,
    })
}

#[cfg(test)]
pub(crate) fn test_bank(name: &str, roots: &[u8]) -> SampleBank {
    SampleBank {
        name: name.to_string(),
        zones: roots
            .iter()
            .map(|&root| SampleZone {
                root,
                sample_rate: 44_100,
                data: vec![0.0f32; 8].into(),
            })
            .collect(),
    }
}

fn load_wav_mono(path: &Path) -> Result<(u32, Vec<f32>), VoiceError> {
    let decode_err = |reason: String| VoiceError::SampleDecode {
        path: path.to_path_buf(),
        reason,
    };

    let mut reader = hound::WavReader::open(path).map_err(|e| decode_err(e.to_string()))?;
    let spec = reader.spec();
    let raw: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<Result<Vec<f32>, hound::Error>>()
            .map_err(|e| decode_err(e.to_string()))?,
        hound::SampleFormat::Int => {
            let scale = 1.0 / (1i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 * scale))
                .collect::<Result<Vec<f32>, hound::Error>>()
                .map_err(|e| decode_err(e.to_string()))?
        }
    };

    let channels = usize::from(spec.channels.max(1));
    let mono = if channels == 1 {
        raw
    } else {
        raw.chunks(channels)
            .map(|frame| frame.iter().sum::<f32>() / channels as f32)
            .collect()
    };
    Ok((spec.sample_rate, mono))
}
