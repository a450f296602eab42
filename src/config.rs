//! Read-only synthesizer parameter tables
//!
//! Scales, keys, rhythms, chords, chip waves, and filter envelopes are
//! immutable ordered record lists. Name lookups go through separate
//! name-to-index maps built once on first use.

use std::collections::HashMap;
use std::sync::OnceLock;

/// Song-internal timing units per beat.
pub const PARTS_PER_BEAT: u32 = 24;
/// Native synth ticks per part.
pub const TICKS_PER_PART: u32 = 2;
/// Semitone spacing between adjacent noise-channel pitch rows.
pub const NOISE_INTERVAL: i32 = 6;
/// Base MIDI pitch for noise/spectrum channels.
pub const SPECTRUM_BASE_PITCH: i32 = 24;
/// Number of pitch rows on a drumset channel.
pub const DRUM_COUNT: usize = 12;
/// Instrument volume slider range (the last setting is mute).
pub const VOLUME_RANGE: u32 = 8;
/// Log scale factor for the instrument volume slider.
pub const VOLUME_LOG_SCALE: f64 = -0.5;
/// Loudest note pin volume setting.
pub const MAX_PIN_VOLUME: f64 = 3.0;

/// A scale preset: which of the 12 semitones are part of the scale.
pub struct Scale {
    pub name: &'static str,
    pub flags: [bool; 12],
}

pub const SCALES: &[Scale] = &[
    Scale { name: "easy :)",         flags: [true, false, true, false, true, false, false, true, false, true, false, false] },
    Scale { name: "easy :(",         flags: [true, false, false, true, false, true, false, true, false, false, true, false] },
    Scale { name: "island :)",       flags: [true, false, false, false, true, true, false, true, false, false, false, true] },
    Scale { name: "island :(",       flags: [true, true, false, true, false, false, false, true, true, false, false, false] },
    Scale { name: "blues :)",        flags: [true, false, true, true, true, false, false, true, false, true, false, false] },
    Scale { name: "blues :(",        flags: [true, false, false, true, false, true, true, true, false, false, true, false] },
    Scale { name: "normal :)",       flags: [true, false, true, false, true, true, false, true, false, true, false, true] },
    Scale { name: "normal :(",       flags: [true, false, true, true, false, true, false, true, true, false, true, false] },
    Scale { name: "dbl harmonic :)", flags: [true, true, false, false, true, true, false, true, true, false, false, true] },
    Scale { name: "dbl harmonic :(", flags: [true, false, true, true, false, false, true, true, true, false, false, true] },
    Scale { name: "enigma",          flags: [true, false, true, false, true, false, true, false, true, false, true, false] },
    Scale { name: "expert",          flags: [true; 12] },
];

/// A key preset. `base_pitch` is the MIDI note number of the key's
/// lowest octave-0 root (C0 is MIDI note 12).
pub struct Key {
    pub name: &'static str,
    pub base_pitch: i32,
}

pub const KEYS: &[Key] = &[
    Key { name: "C",  base_pitch: 12 },
    Key { name: "C♯", base_pitch: 13 },
    Key { name: "D",  base_pitch: 14 },
    Key { name: "D♯", base_pitch: 15 },
    Key { name: "E",  base_pitch: 16 },
    Key { name: "F",  base_pitch: 17 },
    Key { name: "F♯", base_pitch: 18 },
    Key { name: "G",  base_pitch: 19 },
    Key { name: "G♯", base_pitch: 20 },
    Key { name: "A",  base_pitch: 21 },
    Key { name: "A♯", base_pitch: 22 },
    Key { name: "B",  base_pitch: 23 },
];

/// A rhythm preset: sub-beat grid plus the cyclic arpeggio step tables
/// used when a chord has more pitches than available polyphony.
pub struct Rhythm {
    pub name: &'static str,
    pub steps_per_beat: u32,
    pub ticks_per_arpeggio: u32,
    pub arpeggio_patterns: &'static [&'static [usize]],
}

pub const RHYTHMS: &[Rhythm] = &[
    Rhythm { name: "÷3 (triplets)", steps_per_beat: 3, ticks_per_arpeggio: 4, arpeggio_patterns: &[&[0], &[0, 0, 1, 1], &[0, 1, 2, 1], &[0, 1, 2, 3]] },
    Rhythm { name: "÷4 (standard)", steps_per_beat: 4, ticks_per_arpeggio: 3, arpeggio_patterns: &[&[0], &[0, 0, 1, 1], &[0, 1, 2, 1], &[0, 1, 2, 3]] },
    Rhythm { name: "÷6",            steps_per_beat: 6, ticks_per_arpeggio: 4, arpeggio_patterns: &[&[0], &[0, 1], &[0, 1, 2, 1], &[0, 1, 2, 3]] },
    Rhythm { name: "÷8",            steps_per_beat: 8, ticks_per_arpeggio: 3, arpeggio_patterns: &[&[0], &[0, 1], &[0, 1, 2, 1], &[0, 1, 2, 3]] },
    Rhythm { name: "freehand",      steps_per_beat: 24, ticks_per_arpeggio: 3, arpeggio_patterns: &[&[0], &[0, 1], &[0, 1, 2, 1], &[0, 1, 2, 3]] },
];

/// A chord preset: how simultaneous note pitches are played.
pub struct Chord {
    pub name: &'static str,
    pub harmonizes: bool,
    pub arpeggiates: bool,
    pub custom_interval: bool,
    pub strum_parts: u32,
}

pub const CHORDS: &[Chord] = &[
    Chord { name: "harmony",         harmonizes: true,  arpeggiates: false, custom_interval: false, strum_parts: 0 },
    Chord { name: "strum",           harmonizes: true,  arpeggiates: false, custom_interval: false, strum_parts: 1 },
    Chord { name: "arpeggio",        harmonizes: false, arpeggiates: true,  custom_interval: false, strum_parts: 0 },
    Chord { name: "custom interval", harmonizes: true,  arpeggiates: true,  custom_interval: true,  strum_parts: 0 },
];

/// Chip waveform names, in slider order. Per-wave MIDI programs live in
/// `midi::constants`.
pub const CHIP_WAVES: &[&str] = &[
    "rounded",
    "triangle",
    "square",
    "1/4 pulse",
    "1/8 pulse",
    "sawtooth",
    "double saw",
    "double pulse",
    "spiky",
];

/// Filter envelope shape families.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvelopeType {
    Custom,
    Steady,
    Punch,
    Flare,
    Twang,
    Swell,
    Tremolo,
    Tremolo2,
    Decay,
}

/// A filter envelope preset.
pub struct Envelope {
    pub name: &'static str,
    pub envelope_type: EnvelopeType,
    pub speed: f64,
}

pub const ENVELOPES: &[Envelope] = &[
    Envelope { name: "custom",   envelope_type: EnvelopeType::Custom,   speed: 0.0 },
    Envelope { name: "steady",   envelope_type: EnvelopeType::Steady,   speed: 0.0 },
    Envelope { name: "punch",    envelope_type: EnvelopeType::Punch,    speed: 0.0 },
    Envelope { name: "flare 1",  envelope_type: EnvelopeType::Flare,    speed: 32.0 },
    Envelope { name: "flare 2",  envelope_type: EnvelopeType::Flare,    speed: 8.0 },
    Envelope { name: "flare 3",  envelope_type: EnvelopeType::Flare,    speed: 2.0 },
    Envelope { name: "twang 1",  envelope_type: EnvelopeType::Twang,    speed: 32.0 },
    Envelope { name: "twang 2",  envelope_type: EnvelopeType::Twang,    speed: 8.0 },
    Envelope { name: "twang 3",  envelope_type: EnvelopeType::Twang,    speed: 2.0 },
    Envelope { name: "swell 1",  envelope_type: EnvelopeType::Swell,    speed: 32.0 },
    Envelope { name: "swell 2",  envelope_type: EnvelopeType::Swell,    speed: 8.0 },
    Envelope { name: "swell 3",  envelope_type: EnvelopeType::Swell,    speed: 2.0 },
    Envelope { name: "tremolo1", envelope_type: EnvelopeType::Tremolo,  speed: 4.0 },
    Envelope { name: "tremolo2", envelope_type: EnvelopeType::Tremolo,  speed: 2.0 },
    Envelope { name: "tremolo3", envelope_type: EnvelopeType::Tremolo,  speed: 1.0 },
    Envelope { name: "tremolo4", envelope_type: EnvelopeType::Tremolo2, speed: 4.0 },
    Envelope { name: "tremolo5", envelope_type: EnvelopeType::Tremolo2, speed: 2.0 },
    Envelope { name: "tremolo6", envelope_type: EnvelopeType::Tremolo2, speed: 1.0 },
    Envelope { name: "decay 1",  envelope_type: EnvelopeType::Decay,    speed: 10.0 },
    Envelope { name: "decay 2",  envelope_type: EnvelopeType::Decay,    speed: 7.0 },
    Envelope { name: "decay 3",  envelope_type: EnvelopeType::Decay,    speed: 4.0 },
];

fn name_index_map<T, F: Fn(&T) -> &'static str>(records: &'static [T], name: F) -> HashMap<&'static str, usize> {
    records.iter().enumerate().map(|(i, r)| (name(r), i)).collect()
}

/// Look up a scale preset index by name.
pub fn scale_index(name: &str) -> Option<usize> {
    static MAP: OnceLock<HashMap<&'static str, usize>> = OnceLock::new();
    MAP.get_or_init(|| name_index_map(SCALES, |s| s.name)).get(name).copied()
}

/// Look up a key index by name.
pub fn key_index(name: &str) -> Option<usize> {
    static MAP: OnceLock<HashMap<&'static str, usize>> = OnceLock::new();
    MAP.get_or_init(|| name_index_map(KEYS, |k| k.name)).get(name).copied()
}

/// Look up a rhythm preset index by name.
pub fn rhythm_index(name: &str) -> Option<usize> {
    static MAP: OnceLock<HashMap<&'static str, usize>> = OnceLock::new();
    MAP.get_or_init(|| name_index_map(RHYTHMS, |r| r.name)).get(name).copied()
}

/// Look up a chord preset index by name.
pub fn chord_index(name: &str) -> Option<usize> {
    static MAP: OnceLock<HashMap<&'static str, usize>> = OnceLock::new();
    MAP.get_or_init(|| name_index_map(CHORDS, |c| c.name)).get(name).copied()
}

/// True when the scale's flag pair marks a minor diatonic scale.
pub fn scale_is_minor(scale: usize) -> bool {
    let flags = &SCALES[scale].flags;
    flags[3] && !flags[4]
}
