//! Standard MIDI File constants and General MIDI lookup tables

/// SMF chunk type magics.
pub mod chunk {
    /// "MThd"
    pub const HEADER: u32 = 0x4D546864;
    /// "MTrk"
    pub const TRACK: u32 = 0x4D54726B;
}

/// SMF format 1: simultaneous tracks sharing one timeline.
pub const FORMAT_SIMULTANEOUS_TRACKS: u16 = 1;

/// Channel event status bytes (high nibble; low nibble carries the
/// channel number).
pub mod event {
    pub const NOTE_OFF: u8 = 0x80;
    pub const NOTE_ON: u8 = 0x90;
    pub const CONTROL_CHANGE: u8 = 0xB0;
    pub const PROGRAM_CHANGE: u8 = 0xC0;
    pub const PITCH_BEND: u8 = 0xE0;
    pub const META: u8 = 0xFF;
}

/// Meta event message types.
pub mod meta {
    pub const TEXT: u8 = 0x01;
    pub const TRACK_NAME: u8 = 0x03;
    pub const INSTRUMENT_NAME: u8 = 0x04;
    pub const MARKER: u8 = 0x06;
    pub const END_OF_TRACK: u8 = 0x2F;
    pub const TEMPO: u8 = 0x51;
    pub const TIME_SIGNATURE: u8 = 0x58;
    pub const KEY_SIGNATURE: u8 = 0x59;
}

/// Control change numbers.
pub mod control {
    pub const SET_PARAMETER_MSB: u8 = 0x06;
    pub const VOLUME_MSB: u8 = 0x07;
    pub const EXPRESSION_MSB: u8 = 0x0B;
    pub const SET_PARAMETER_LSB: u8 = 0x26;
    pub const REGISTERED_PARAMETER_NUMBER_LSB: u8 = 0x64;
    pub const REGISTERED_PARAMETER_NUMBER_MSB: u8 = 0x65;
}

/// Registered parameter numbers (MSB, LSB pairs).
pub mod rpn {
    pub const PITCH_BEND_RANGE: (u8, u8) = (0x00, 0x00);
    pub const RESET: (u8, u8) = (0x7F, 0x7F);
}

/// Centered (no-bend) 14-bit pitch bend value.
pub const DEFAULT_PITCH_BEND: u16 = 0x2000;
/// Full expression, the value a channel starts at.
pub const DEFAULT_EXPRESSION: u8 = 0x7F;

/// The reserved General MIDI percussion channel.
pub const PERCUSSION_CHANNEL: u8 = 9;

/// Pitch bend window in semitones, either direction.
pub const PITCH_BEND_RANGE: i32 = 24;

/// Velocity for every melodic note-on.
pub const DEFAULT_NOTE_VELOCITY: u8 = 90;

/// MIDI ticks per native synth tick.
pub const MIDI_TICKS_PER_NATIVE_TICK: u64 = 2;

/// SMF division: MIDI ticks per beat, independent of tempo.
pub const MIDI_TICKS_PER_BEAT: u64 =
    MIDI_TICKS_PER_NATIVE_TICK * crate::config::TICKS_PER_PART as u64 * crate::config::PARTS_PER_BEAT as u64;

/// MIDI ticks per song-internal part.
pub const MIDI_TICKS_PER_PART: u64 = MIDI_TICKS_PER_NATIVE_TICK * crate::config::TICKS_PER_PART as u64;

/// General MIDI programs for chip waves whose filter envelope sustains.
/// Indexed by chip wave.
pub const SUSTAIN_PROGRAMS: &[u8] = &[
    0x4A, // rounded -> recorder
    0x47, // triangle -> clarinet
    0x50, // square -> square wave
    0x46, // 1/4 pulse -> bassoon
    0x44, // 1/8 pulse -> oboe
    0x51, // sawtooth -> sawtooth wave
    0x51, // double saw -> sawtooth wave
    0x51, // double pulse -> sawtooth wave
    0x51, // spiky -> sawtooth wave
];

/// General MIDI programs for chip waves whose filter envelope decays or
/// twangs. Indexed by chip wave.
pub const DECAY_PROGRAMS: &[u8] = &[
    0x21, // rounded -> fingered bass
    0x2E, // triangle -> harp
    0x2E, // square -> harp
    0x06, // 1/4 pulse -> harpsichord
    0x18, // 1/8 pulse -> nylon guitar
    0x19, // sawtooth -> steel guitar
    0x19, // double saw -> steel guitar
    0x6A, // double pulse -> shamisen
    0x6A, // spiky -> shamisen
];

/// Fallback program when no rule matches.
pub const PROGRAM_SAWTOOTH: u8 = 81;
/// Percussive program for noise-type instruments outside the percussion
/// channel.
pub const PROGRAM_TAIKO: u8 = 116;
pub const PROGRAM_TIMPANI: u8 = 47;
pub const PROGRAM_PAN_FLUTE: u8 = 75;
pub const PROGRAM_STEEL_GUITAR: u8 = 0x19;
pub const PROGRAM_ELECTRIC_GRAND: u8 = 2;

/// Octaves the taiko-like noise presets sound below their notated pitch.
pub const TAIKO_SUBHARMONIC_OCTAVES: i32 = 1;

/// General MIDI percussion notes for the 12 drumset pitch rows.
pub const DRUMSET_NOTES: &[u8] = &[
    36, // Bass Drum 1
    41, // Low Floor Tom
    45, // Low Tom
    48, // Hi-Mid Tom
    40, // Electric Snare
    39, // Hand Clap
    59, // Ride Cymbal 2
    49, // Crash Cymbal 1
    46, // Open Hi-Hat
    55, // Splash Cymbal
    69, // Cabasa
    54, // Tambourine
];

// The master volume and expression controls apply a roughly quartic
// volume curve; these invert a linear multiplier back into the 0-127
// control range.

pub fn volume_mult_to_midi_volume(volume_mult: f64) -> f64 {
    (volume_mult * 0.3844015376046128).powf(0.25) * 127.0
}

pub fn volume_mult_to_midi_expression(volume_mult: f64) -> f64 {
    volume_mult.powf(0.25) * 127.0
}

/// Linear amplitude of an instrument volume slider setting.
pub fn instrument_volume_to_volume_mult(volume: u32) -> f64 {
    if volume >= crate::config::VOLUME_RANGE - 1 {
        0.0
    } else {
        2.0_f64.powf(crate::config::VOLUME_LOG_SCALE * volume as f64)
    }
}

/// Linear amplitude of a note pin volume setting.
pub fn note_volume_to_volume_mult(volume: f64) -> f64 {
    (volume.max(0.0) / crate::config::MAX_PIN_VOLUME).powf(1.5)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_program_tables_cover_every_chip_wave() {
        assert_eq!(SUSTAIN_PROGRAMS.len(), crate::config::CHIP_WAVES.len());
        assert_eq!(DECAY_PROGRAMS.len(), crate::config::CHIP_WAVES.len());
    }

    #[test]
    fn test_drumset_table_covers_every_drum_row() {
        assert_eq!(DRUMSET_NOTES.len(), crate::config::DRUM_COUNT);
    }

    #[test]
    fn test_volume_conversions_hit_the_control_extremes() {
        // Slider 0 is full volume; the curve maps it to control value 100.
        let loudest = volume_mult_to_midi_volume(instrument_volume_to_volume_mult(0));
        assert!((loudest - 100.0).abs() < 1e-6);
        assert_eq!(instrument_volume_to_volume_mult(7), 0.0);
        let full = volume_mult_to_midi_expression(note_volume_to_volume_mult(3.0));
        assert!((full - 127.0).abs() < 1e-9);
        assert_eq!(note_volume_to_volume_mult(0.0), 0.0);
    }
}
