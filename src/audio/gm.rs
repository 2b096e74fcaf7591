//! The General-MIDI program table: 128 instrument names with the synthesis
//! parameters standing in for them. Data, not logic; the factory indexes it
//! and never branches on names.

use crate::audio::instrument::{Adsr, SynthParams, Wave};

// (name, wave, [attack, decay, sustain, release], gain)
#[rustfmt::skip]
static GM_PROGRAMS: [(&str, Wave, [f32; 4], f32); 128] = [
    // Piano (0-7)
    ("acoustic-grand-piano",  Wave::Sine,     [0.005, 0.10, 0.30, 1.00], 1.0),
    ("bright-acoustic-piano", Wave::Triangle, [0.002, 0.10, 0.20, 0.80], 1.0),
    ("electric-grand-piano",  Wave::Triangle, [0.010, 0.50, 0.10, 0.50], 1.0),
    ("honky-tonk-piano",      Wave::Square,   [0.010, 0.20, 0.40, 0.60], 0.8),
    ("electric-piano-1",      Wave::Triangle, [0.005, 0.30, 0.20, 0.70], 1.0),
    ("electric-piano-2",      Wave::Triangle, [0.010, 0.40, 0.15, 0.60], 1.0),
    ("harpsichord",           Wave::Saw,      [0.001, 0.15, 0.05, 0.30], 0.8),
    ("clavinet",              Wave::Square,   [0.001, 0.10, 0.10, 0.20], 0.8),
    // Chromatic percussion (8-15)
    ("celesta",               Wave::Sine,     [0.001, 0.20, 0.00, 0.30], 1.0),
    ("glockenspiel",          Wave::Sine,     [0.001, 0.30, 0.00, 0.50], 1.0),
    ("music-box",             Wave::Sine,     [0.001, 0.50, 0.00, 0.80], 1.0),
    ("vibraphone",            Wave::Sine,     [0.010, 1.00, 0.20, 2.00], 1.0),
    ("marimba",               Wave::Sine,     [0.001, 0.50, 0.00, 0.80], 1.0),
    ("xylophone",             Wave::Triangle, [0.001, 0.20, 0.00, 0.30], 1.0),
    ("tubular-bells",         Wave::Sine,     [0.010, 2.00, 0.10, 3.00], 1.0),
    ("dulcimer",              Wave::Saw,      [0.001, 0.40, 0.05, 0.60], 0.8),
    // Organ (16-23)
    ("drawbar-organ",         Wave::Sine,     [0.010, 0.00, 1.00, 0.10], 0.7),
    ("percussive-organ",      Wave::Triangle, [0.001, 0.20, 0.50, 0.20], 0.7),
    ("rock-organ",            Wave::Square,   [0.001, 0.00, 1.00, 0.05], 0.6),
    ("church-organ",          Wave::Sine,     [0.100, 0.00, 1.00, 0.30], 0.7),
    ("reed-organ",            Wave::Triangle, [0.050, 0.10, 0.80, 0.50], 0.7),
    ("accordion",             Wave::Square,   [0.020, 0.10, 0.90, 0.30], 0.6),
    ("harmonica",             Wave::Square,   [0.010, 0.20, 0.70, 0.40], 0.7),
    ("tango-accordion",       Wave::Square,   [0.030, 0.10, 0.85, 0.40], 0.6),
    // Guitar (24-31)
    ("nylon-string-guitar",   Wave::Saw,      [0.002, 0.50, 0.05, 0.60], 0.8),
    ("steel-string-guitar",   Wave::Saw,      [0.002, 0.40, 0.05, 0.50], 0.8),
    ("jazz-guitar",           Wave::Triangle, [0.005, 0.30, 0.40, 0.80], 0.9),
    ("clean-guitar",          Wave::Saw,      [0.005, 0.20, 0.30, 1.00], 0.8),
    ("muted-guitar",          Wave::Square,   [0.001, 0.08, 0.05, 0.10], 0.8),
    ("overdriven-guitar",     Wave::Square,   [0.005, 0.20, 0.60, 0.40], 0.7),
    ("distortion-guitar",     Wave::Square,   [0.005, 0.15, 0.70, 0.30], 0.7),
    ("guitar-harmonics",      Wave::Sine,     [0.002, 0.40, 0.10, 0.80], 0.9),
    // Bass (32-39)
    ("acoustic-bass",         Wave::Sine,     [0.005, 0.30, 0.30, 0.50], 1.0),
    ("fingered-bass",         Wave::Triangle, [0.005, 0.25, 0.40, 0.40], 1.0),
    ("picked-bass",           Wave::Saw,      [0.002, 0.20, 0.30, 0.30], 0.9),
    ("fretless-bass",         Wave::Sine,     [0.010, 0.30, 0.50, 0.50], 1.0),
    ("slap-bass-1",           Wave::Saw,      [0.001, 0.15, 0.20, 0.20], 0.9),
    ("slap-bass-2",           Wave::Saw,      [0.001, 0.12, 0.25, 0.20], 0.9),
    ("synth-bass-1",          Wave::Square,   [0.002, 0.20, 0.40, 0.20], 0.8),
    ("synth-bass-2",          Wave::Saw,      [0.002, 0.25, 0.35, 0.25], 0.8),
    // Strings (40-47)
    ("violin",                Wave::Saw,      [0.080, 0.10, 0.80, 0.40], 0.8),
    ("viola",                 Wave::Saw,      [0.090, 0.10, 0.80, 0.40], 0.8),
    ("cello",                 Wave::Saw,      [0.100, 0.10, 0.80, 0.50], 0.8),
    ("contrabass",            Wave::Saw,      [0.120, 0.10, 0.80, 0.50], 0.8),
    ("tremolo-strings",       Wave::Saw,      [0.050, 0.05, 0.70, 0.30], 0.7),
    ("pizzicato-strings",     Wave::Saw,      [0.002, 0.25, 0.00, 0.30], 0.9),
    ("orchestral-harp",       Wave::Triangle, [0.002, 0.60, 0.05, 1.00], 0.9),
    ("timpani",               Wave::Sine,     [0.001, 0.40, 0.00, 0.60], 1.0),
    // Ensemble (48-55)
    ("string-ensemble-1",     Wave::Saw,      [0.150, 0.10, 0.85, 0.60], 0.6),
    ("string-ensemble-2",     Wave::Saw,      [0.200, 0.10, 0.85, 0.70], 0.6),
    ("synth-strings-1",       Wave::Saw,      [0.120, 0.20, 0.80, 0.80], 0.6),
    ("synth-strings-2",       Wave::Triangle, [0.150, 0.20, 0.80, 0.90], 0.6),
    ("choir-aahs",            Wave::Triangle, [0.200, 0.10, 0.90, 0.80], 0.6),
    ("voice-oohs",            Wave::Sine,     [0.150, 0.10, 0.85, 0.70], 0.6),
    ("synth-choir",           Wave::Triangle, [0.180, 0.20, 0.85, 0.90], 0.6),
    ("orchestra-hit",         Wave::Saw,      [0.005, 0.30, 0.00, 0.40], 0.9),
    // Brass (56-63)
    ("trumpet",               Wave::Saw,      [0.030, 0.10, 0.80, 0.30], 0.8),
    ("trombone",              Wave::Saw,      [0.040, 0.10, 0.80, 0.35], 0.8),
    ("tuba",                  Wave::Saw,      [0.050, 0.10, 0.80, 0.40], 0.8),
    ("muted-trumpet",         Wave::Square,   [0.030, 0.10, 0.70, 0.25], 0.7),
    ("french-horn",           Wave::Triangle, [0.060, 0.10, 0.80, 0.40], 0.8),
    ("brass-section",         Wave::Saw,      [0.040, 0.10, 0.85, 0.35], 0.7),
    ("synth-brass-1",         Wave::Saw,      [0.030, 0.15, 0.75, 0.30], 0.7),
    ("synth-brass-2",         Wave::Square,   [0.040, 0.15, 0.70, 0.35], 0.7),
    // Reed (64-71)
    ("soprano-sax",           Wave::Saw,      [0.040, 0.10, 0.75, 0.30], 0.8),
    ("alto-sax",              Wave::Saw,      [0.040, 0.10, 0.75, 0.35], 0.8),
    ("tenor-sax",             Wave::Saw,      [0.050, 0.10, 0.75, 0.35], 0.8),
    ("baritone-sax",          Wave::Saw,      [0.050, 0.10, 0.75, 0.40], 0.8),
    ("oboe",                  Wave::Square,   [0.030, 0.10, 0.70, 0.25], 0.8),
    ("english-horn",          Wave::Square,   [0.040, 0.10, 0.70, 0.30], 0.8),
    ("bassoon",               Wave::Square,   [0.050, 0.10, 0.70, 0.35], 0.8),
    ("clarinet",              Wave::Square,   [0.030, 0.10, 0.75, 0.25], 0.8),
    // Pipe (72-79)
    ("piccolo",               Wave::Sine,     [0.020, 0.10, 0.70, 0.20], 0.9),
    ("flute",                 Wave::Sine,     [0.030, 0.10, 0.75, 0.25], 0.9),
    ("recorder",              Wave::Sine,     [0.020, 0.10, 0.75, 0.20], 0.9),
    ("pan-flute",             Wave::Triangle, [0.040, 0.10, 0.70, 0.30], 0.9),
    ("blown-bottle",          Wave::Sine,     [0.060, 0.15, 0.60, 0.40], 0.8),
    ("shakuhachi",            Wave::Triangle, [0.080, 0.15, 0.65, 0.50], 0.8),
    ("whistle",               Wave::Sine,     [0.010, 0.05, 0.80, 0.15], 0.9),
    ("ocarina",               Wave::Sine,     [0.020, 0.08, 0.80, 0.20], 0.9),
    // Synth lead (80-87)
    ("lead-square",           Wave::Square,   [0.005, 0.10, 0.80, 0.15], 0.7),
    ("lead-sawtooth",         Wave::Saw,      [0.005, 0.10, 0.80, 0.15], 0.7),
    ("lead-calliope",         Wave::Sine,     [0.030, 0.10, 0.75, 0.25], 0.8),
    ("lead-chiff",            Wave::Triangle, [0.010, 0.15, 0.60, 0.20], 0.8),
    ("lead-charang",          Wave::Saw,      [0.005, 0.12, 0.70, 0.20], 0.7),
    ("lead-voice",            Wave::Triangle, [0.050, 0.15, 0.75, 0.40], 0.8),
    ("lead-fifths",           Wave::Saw,      [0.010, 0.10, 0.75, 0.25], 0.7),
    ("lead-bass",             Wave::Square,   [0.005, 0.15, 0.60, 0.20], 0.8),
    // Synth pad (88-95)
    ("pad-new-age",           Wave::Triangle, [0.300, 0.30, 0.80, 1.20], 0.6),
    ("pad-warm",              Wave::Sine,     [0.250, 0.30, 0.85, 1.00], 0.6),
    ("pad-polysynth",         Wave::Saw,      [0.150, 0.20, 0.80, 0.80], 0.6),
    ("pad-choir",             Wave::Triangle, [0.300, 0.20, 0.85, 1.00], 0.6),
    ("pad-bowed",             Wave::Sine,     [0.350, 0.30, 0.80, 1.20], 0.6),
    ("pad-metallic",          Wave::Saw,      [0.200, 0.30, 0.70, 1.00], 0.6),
    ("pad-halo",              Wave::Triangle, [0.400, 0.30, 0.80, 1.50], 0.6),
    ("pad-sweep",             Wave::Saw,      [0.500, 0.40, 0.75, 1.50], 0.6),
    // Synth effects (96-103)
    ("fx-rain",               Wave::Sine,     [0.100, 0.50, 0.40, 1.00], 0.7),
    ("fx-soundtrack",         Wave::Saw,      [0.300, 0.40, 0.60, 1.20], 0.6),
    ("fx-crystal",            Wave::Sine,     [0.002, 0.60, 0.10, 1.00], 0.8),
    ("fx-atmosphere",         Wave::Triangle, [0.200, 0.40, 0.60, 1.20], 0.6),
    ("fx-brightness",         Wave::Sine,     [0.100, 0.30, 0.70, 1.00], 0.7),
    ("fx-goblins",            Wave::Triangle, [0.400, 0.50, 0.50, 1.50], 0.6),
    ("fx-echoes",             Wave::Sine,     [0.150, 0.40, 0.50, 1.20], 0.7),
    ("fx-sci-fi",             Wave::Saw,      [0.200, 0.40, 0.60, 1.20], 0.6),
    // Ethnic (104-111)
    ("sitar",                 Wave::Saw,      [0.002, 0.50, 0.10, 0.80], 0.8),
    ("banjo",                 Wave::Saw,      [0.001, 0.30, 0.05, 0.40], 0.8),
    ("shamisen",              Wave::Saw,      [0.001, 0.25, 0.05, 0.35], 0.8),
    ("koto",                  Wave::Triangle, [0.002, 0.40, 0.05, 0.60], 0.8),
    ("kalimba",               Wave::Sine,     [0.001, 0.30, 0.00, 0.40], 0.9),
    ("bagpipe",               Wave::Square,   [0.050, 0.10, 0.90, 0.30], 0.6),
    ("fiddle",                Wave::Saw,      [0.070, 0.10, 0.80, 0.40], 0.8),
    ("shanai",                Wave::Square,   [0.040, 0.10, 0.75, 0.30], 0.8),
    // Percussive (112-119)
    ("tinkle-bell",           Wave::Sine,     [0.001, 0.40, 0.00, 0.60], 0.9),
    ("agogo",                 Wave::Sine,     [0.001, 0.15, 0.00, 0.20], 0.9),
    ("steel-drums",           Wave::Sine,     [0.002, 0.40, 0.10, 0.60], 0.9),
    ("woodblock",             Wave::Sine,     [0.001, 0.08, 0.00, 0.10], 1.0),
    ("taiko-drum",            Wave::Sine,     [0.001, 0.30, 0.00, 0.40], 1.0),
    ("melodic-tom",           Wave::Sine,     [0.001, 0.25, 0.00, 0.35], 1.0),
    ("synth-drum",            Wave::Triangle, [0.001, 0.20, 0.00, 0.30], 1.0),
    ("reverse-cymbal",        Wave::Saw,      [0.500, 0.10, 0.00, 0.10], 0.7),
    // Sound effects (120-127)
    ("guitar-fret-noise",     Wave::Saw,      [0.001, 0.10, 0.00, 0.10], 0.6),
    ("breath-noise",          Wave::Triangle, [0.050, 0.20, 0.00, 0.30], 0.6),
    ("seashore",              Wave::Triangle, [0.500, 0.50, 0.30, 1.50], 0.5),
    ("bird-tweet",            Wave::Sine,     [0.010, 0.10, 0.00, 0.15], 0.7),
    ("telephone-ring",        Wave::Square,   [0.001, 0.05, 0.80, 0.05], 0.6),
    ("helicopter",            Wave::Saw,      [0.100, 0.30, 0.60, 0.50], 0.5),
    ("applause",              Wave::Triangle, [0.300, 0.40, 0.40, 1.00], 0.5),
    ("gunshot",               Wave::Saw,      [0.001, 0.15, 0.00, 0.20], 0.8),
];

pub fn program_name(program: u8) -> &'static str {
    GM_PROGRAMS[usize::from(program & 0x7f)].0
}

pub fn program_params(program: u8) -> SynthParams {
    let (_, wave, [attack, decay, sustain, release], gain) =
        GM_PROGRAMS[usize::from(program & 0x7f)];
    SynthParams {
        wave,
        adsr: Adsr {
            attack,
            decay,
            sustain,
            release,
        },
        gain,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_covers_every_program() {
        assert_eq!(GM_PROGRAMS.len(), 128);
        for program in 0..=127u8 {
            assert!(!program_name(program).is_empty());
            let params = program_params(program);
            assert!(params.adsr.attack >= 0.0);
            assert!((0.0..=1.0).contains(&params.adsr.sustain));
            assert!(params.gain > 0.0);
        }
    }

    #[test]
    fn program_zero_is_the_grand_piano() {
        assert_eq!(program_name(0), "acoustic-grand-piano");
        assert_eq!(program_params(0).wave, Wave::Sine);
    }
}
