use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::audio::gm;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Wave {
    Sine,
    Triangle,
    Square,
    Saw,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Adsr {
    /// Seconds
    pub attack: f32,
    /// Seconds
    pub decay: f32,
    /// 0.0 -> 1.0
    pub sustain: f32,
    /// Seconds
    pub release: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SynthParams {
    pub wave: Wave,
    pub adsr: Adsr,
    pub gain: f32,
}

/// One instrument's sample set as declared in the RON manifest: note-name
/// keyed files relative to `base_dir`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SampleSetDef {
    pub base_dir: String,
    pub files: Vec<(String, String)>,
}

/// Root document of `samples.ron`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SampleManifest {
    pub instruments: BTreeMap<String, SampleSetDef>,
}

/// Closed set of instrument backends, decided once at voice construction.
#[derive(Debug, Clone)]
pub enum InstrumentKind {
    Synthesized(SynthParams),
    Sampled { name: String, def: SampleSetDef },
    Percussion,
}

/// Generic piano parameters: the placeholder while samples load and the
/// fallback when they never arrive.
pub fn fallback_params() -> SynthParams {
    gm::program_params(0)
}

/// Channel 9's kit. A single membrane-ish patch: near-instant attack, no
/// sustain, pitch taken from the drum note itself.
pub fn percussion_params() -> SynthParams {
    SynthParams {
        wave: Wave::Sine,
        adsr: Adsr {
            attack: 0.001,
            decay: 0.2,
            sustain: 0.0,
            release: 0.3,
        },
        gain: 1.0,
    }
}

/// Sampled notes keep their recorded timbre; the envelope only shapes the
/// onset and the tail after release.
pub fn sample_adsr() -> Adsr {
    Adsr {
        attack: 0.002,
        decay: 0.0,
        sustain: 1.0,
        release: 0.12,
    }
}

/// Resolves a program number to its backend kind. Out-of-range programs
/// fall back to program 0; channel 9 is decided by the caller.
pub fn kind_for_program(program: u8, manifest: &SampleManifest) -> InstrumentKind {
    let program = if program > 127 { 0 } else { program };
    let name = gm::program_name(program);
    match manifest.instruments.get(name) {
        Some(def) => InstrumentKind::Sampled {
            name: name.to_string(),
            def: def.clone(),
        },
        None => InstrumentKind::Synthesized(gm::program_params(program)),
    }
}

/// Parses note names as they appear in sample manifests: letter, optional
/// accidental (`#`, `s`, or `b`), octave -1..=9. `"C4"` -> 60.
pub fn note_name_to_midi(name: &str) -> Option<u8> {
    let mut chars = name.chars();
    let letter = chars.next()?.to_ascii_uppercase();
    let mut semitone: i32 = match letter {
        'C' => 0,
        'D' => 2,
        'E' => 4,
        'F' => 5,
        'G' => 7,
        'A' => 9,
        'B' => 11,
        _ => return None,
    };
    let rest: String = chars.collect();
    let octave_str = match rest.chars().next() {
        Some('#') | Some('s') => {
            semitone += 1;
            &rest[1..]
        }
        Some('b') => {
            semitone -= 1;
            &rest[1..]
        }
        _ => rest.as_str(),
    };
    let octave: i32 = octave_str.parse().ok()?;
    let midi = (octave + 1) * 12 + semitone;
    u8::try_from(midi).ok().filter(|&n| n <= 127)
}
