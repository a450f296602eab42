//! Composition data model
//!
//! A song is an ordered list of channels; each channel owns instruments,
//! patterns, and a per-bar pattern index table. The JSON representation
//! names scale/key/rhythm presets by name, resolved through the config
//! name maps.

use crate::config::{self, Chord, EnvelopeType};
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// A complete composition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Song {
    /// Scale preset index (named on the wire).
    #[serde(with = "scale_name")]
    pub scale: usize,
    /// Key index, C=0 counting up to B=11 (named on the wire).
    #[serde(with = "key_name")]
    pub key: usize,
    /// Tempo in beats per minute.
    pub tempo: u32,
    pub beats_per_bar: u32,
    pub bar_count: usize,
    pub loop_start: usize,
    pub loop_length: usize,
    /// Rhythm preset index (named on the wire).
    #[serde(with = "rhythm_name")]
    pub rhythm: usize,
    pub channels: Vec<Channel>,
}

/// Channel kind: continuous-pitch or noise-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelKind {
    Pitch,
    Noise,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Channel {
    #[serde(rename = "type")]
    pub kind: ChannelKind,
    pub instruments: Vec<Instrument>,
    pub patterns: Vec<Pattern>,
    /// One entry per bar: 1-based pattern index, 0 for an empty bar.
    pub bars: Vec<usize>,
}

impl Channel {
    /// Pattern playing in the given bar, if any.
    pub fn pattern_at(&self, bar: usize) -> Option<&Pattern> {
        match self.bars.get(bar) {
            Some(&index) if index > 0 => self.patterns.get(index - 1),
            _ => None,
        }
    }

    pub fn is_noise(&self) -> bool {
        self.kind == ChannelKind::Noise
    }
}

/// Synthesis families. Program selection and polyphony rules dispatch on
/// this tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InstrumentType {
    #[serde(rename = "chip")]
    Chip,
    #[serde(rename = "FM")]
    Fm,
    #[serde(rename = "noise")]
    Noise,
    #[serde(rename = "spectrum")]
    Spectrum,
    #[serde(rename = "drumset")]
    Drumset,
    #[serde(rename = "harmonics")]
    Harmonics,
    #[serde(rename = "PWM")]
    Pwm,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Instrument {
    #[serde(rename = "type")]
    pub instrument_type: InstrumentType,
    /// Volume slider setting, 0 (loudest) to 7 (mute).
    pub volume: u32,
    /// Chip wave index, meaningful for `Chip` instruments.
    #[serde(default)]
    pub wave: usize,
    /// Filter envelope preset index.
    #[serde(default)]
    pub filter_envelope: usize,
    /// Chord preset index.
    #[serde(default)]
    pub chord: usize,
}

impl Instrument {
    pub fn filter_envelope_type(&self) -> EnvelopeType {
        config::ENVELOPES[self.filter_envelope].envelope_type
    }

    pub fn chord(&self) -> &'static Chord {
        &config::CHORDS[self.chord]
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pattern {
    /// Index into the owning channel's instrument list.
    pub instrument: usize,
    pub notes: Vec<Note>,
}

/// A note: a time span, one or more simultaneous pitches, and an envelope
/// defined by pins.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Note {
    /// Start offset within the bar, in parts.
    pub start: u32,
    /// End offset within the bar, in parts.
    pub end: u32,
    /// Simultaneous pitch rows, as semitone offsets from the channel root.
    pub pitches: Vec<i32>,
    pub pins: Vec<Pin>,
}

/// An envelope control point. Volume and interval are linearly
/// interpolated between consecutive pins.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pin {
    /// Time offset from the note start, in parts. The first pin is at 0.
    pub time: u32,
    /// Volume setting, 0 to 3.
    pub volume: f64,
    /// Pitch offset in scale steps relative to the note's pitches.
    pub interval: f64,
}

impl Note {
    /// The interval the note spends the most time at: the longest flat
    /// span between consecutive pins, falling back to the loudest pin's
    /// interval when no span is flat.
    pub fn pick_main_interval(&self) -> f64 {
        let mut longest_flat_duration = 0;
        let mut main_interval = 0.0;
        for pair in self.pins.windows(2) {
            if pair[0].interval == pair[1].interval {
                let duration = pair[1].time - pair[0].time;
                if longest_flat_duration < duration {
                    longest_flat_duration = duration;
                    main_interval = pair[0].interval;
                }
            }
        }
        if longest_flat_duration == 0 {
            // Start below any valid volume so the first pin wins ties.
            let mut loudest_volume = -1.0;
            for pin in &self.pins {
                if loudest_volume < pin.volume {
                    loudest_volume = pin.volume;
                    main_interval = pin.interval;
                }
            }
        }
        main_interval
    }
}

impl Song {
    /// Check the structural invariants the export engine relies on.
    /// Called once when a song is loaded from external input; the export
    /// passes themselves trust the model.
    pub fn validate(&self) -> Result<()> {
        if self.bar_count == 0 {
            return Err(Error::SongFormat("song has no bars".into()));
        }
        if self.loop_length == 0 || self.loop_start + self.loop_length > self.bar_count {
            return Err(Error::SongFormat(format!(
                "loop [{}, {}) outside of {} bars",
                self.loop_start,
                self.loop_start + self.loop_length,
                self.bar_count
            )));
        }
        if self.scale >= config::SCALES.len() {
            return Err(Error::SongFormat(format!("scale index {} out of range", self.scale)));
        }
        if self.key >= config::KEYS.len() {
            return Err(Error::SongFormat(format!("key index {} out of range", self.key)));
        }
        if self.rhythm >= config::RHYTHMS.len() {
            return Err(Error::SongFormat(format!("rhythm index {} out of range", self.rhythm)));
        }
        if self.tempo == 0 {
            return Err(Error::SongFormat("tempo must be positive".into()));
        }
        for (channel_index, channel) in self.channels.iter().enumerate() {
            if channel.instruments.is_empty() {
                return Err(Error::SongFormat(format!("channel {channel_index} has no instruments")));
            }
            if channel.bars.len() != self.bar_count {
                return Err(Error::SongFormat(format!(
                    "channel {channel_index} has {} bar entries, song has {} bars",
                    channel.bars.len(),
                    self.bar_count
                )));
            }
            for &bar in &channel.bars {
                if bar > channel.patterns.len() {
                    return Err(Error::SongFormat(format!(
                        "channel {channel_index} references pattern {bar} of {}",
                        channel.patterns.len()
                    )));
                }
            }
            for instrument in &channel.instruments {
                if instrument.volume >= config::VOLUME_RANGE {
                    return Err(Error::SongFormat(format!(
                        "instrument volume {} out of range",
                        instrument.volume
                    )));
                }
                if instrument.wave >= config::CHIP_WAVES.len()
                    || instrument.filter_envelope >= config::ENVELOPES.len()
                    || instrument.chord >= config::CHORDS.len()
                {
                    return Err(Error::SongFormat("instrument preset index out of range".into()));
                }
            }
            for pattern in &channel.patterns {
                if pattern.instrument >= channel.instruments.len() {
                    return Err(Error::SongFormat(format!(
                        "pattern instrument {} out of range in channel {channel_index}",
                        pattern.instrument
                    )));
                }
                for note in &pattern.notes {
                    if note.start > note.end {
                        return Err(Error::SongFormat("note starts after it ends".into()));
                    }
                    if note.pitches.is_empty() || note.pitches.len() > 4 {
                        return Err(Error::SongFormat(format!(
                            "note must have 1 to 4 pitches, has {}",
                            note.pitches.len()
                        )));
                    }
                    if note.pins.len() < 2 {
                        return Err(Error::SongFormat("note needs at least two pins".into()));
                    }
                    if note.pins[0].time != 0 {
                        return Err(Error::SongFormat("note's first pin must be at time 0".into()));
                    }
                    if note.pins[note.pins.len() - 1].time != note.end - note.start {
                        return Err(Error::SongFormat("note's last pin must be at the note end".into()));
                    }
                    if note.pins.windows(2).any(|pair| pair[0].time > pair[1].time) {
                        return Err(Error::SongFormat("note pins out of order".into()));
                    }
                    for pin in &note.pins {
                        if !(0.0..=config::MAX_PIN_VOLUME).contains(&pin.volume) {
                            return Err(Error::SongFormat(format!(
                                "note pin volume {} out of range",
                                pin.volume
                            )));
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// Parse and validate a song from its JSON representation.
    pub fn from_json(data: &[u8]) -> Result<Self> {
        let song: Song = serde_json::from_slice(data)?;
        song.validate()?;
        Ok(song)
    }
}

macro_rules! name_map_serde {
    ($module:ident, $table:path, $lookup:path, $what:literal) => {
        mod $module {
            use serde::de::Error as _;
            use serde::{Deserialize, Deserializer, Serializer};

            pub fn serialize<S: Serializer>(index: &usize, serializer: S) -> std::result::Result<S::Ok, S::Error> {
                serializer.serialize_str($table[*index].name)
            }

            pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<usize, D::Error> {
                let name = String::deserialize(deserializer)?;
                $lookup(&name).ok_or_else(|| D::Error::custom(format!(concat!("unknown ", $what, ": {}"), name)))
            }
        }
    };
}

name_map_serde!(scale_name, crate::config::SCALES, crate::config::scale_index, "scale");
name_map_serde!(key_name, crate::config::KEYS, crate::config::key_index, "key");
name_map_serde!(rhythm_name, crate::config::RHYTHMS, crate::config::rhythm_index, "rhythm");

#[cfg(test)]
mod tests {
    use super::*;

    fn note(start: u32, end: u32, pins: Vec<Pin>) -> Note {
        Note { start, end, pitches: vec![0], pins }
    }

    #[test]
    fn test_pick_main_interval_flat_span() {
        let n = note(
            0,
            24,
            vec![
                Pin { time: 0, volume: 3.0, interval: 0.0 },
                Pin { time: 6, volume: 3.0, interval: 2.0 },
                Pin { time: 24, volume: 3.0, interval: 2.0 },
            ],
        );
        // Longest flat span is at interval 2.
        assert_eq!(n.pick_main_interval(), 2.0);
    }

    #[test]
    fn test_pick_main_interval_falls_back_to_loudest_pin() {
        let n = note(
            0,
            12,
            vec![
                Pin { time: 0, volume: 1.0, interval: 0.0 },
                Pin { time: 6, volume: 3.0, interval: 5.0 },
                Pin { time: 12, volume: 2.0, interval: 7.0 },
            ],
        );
        assert_eq!(n.pick_main_interval(), 5.0);
    }

    #[test]
    fn test_pick_main_interval_silent_note_uses_first_pin() {
        let n = note(
            0,
            12,
            vec![
                Pin { time: 0, volume: 0.0, interval: 3.0 },
                Pin { time: 12, volume: 0.0, interval: 7.0 },
            ],
        );
        // No flat span and every pin silent: the first pin still decides.
        assert_eq!(n.pick_main_interval(), 3.0);
    }

    #[test]
    fn test_json_round_trip_uses_preset_names() {
        let song = Song {
            scale: 0,
            key: 2,
            tempo: 150,
            beats_per_bar: 8,
            bar_count: 1,
            loop_start: 0,
            loop_length: 1,
            rhythm: 1,
            channels: vec![],
        };
        let json = serde_json::to_string(&song).unwrap();
        assert!(json.contains("\"easy :)\""));
        assert!(json.contains("\"D\""));
        assert!(json.contains("\"÷4 (standard)\""));
        let back: Song = serde_json::from_str(&json).unwrap();
        assert_eq!(back.scale, 0);
        assert_eq!(back.key, 2);
        assert_eq!(back.rhythm, 1);
    }

    #[test]
    fn test_validate_rejects_bad_pattern_instrument() {
        let song = Song {
            scale: 0,
            key: 0,
            tempo: 120,
            beats_per_bar: 8,
            bar_count: 1,
            loop_start: 0,
            loop_length: 1,
            rhythm: 1,
            channels: vec![Channel {
                kind: ChannelKind::Pitch,
                instruments: vec![Instrument {
                    instrument_type: InstrumentType::Chip,
                    volume: 0,
                    wave: 0,
                    filter_envelope: 1,
                    chord: 0,
                }],
                patterns: vec![Pattern { instrument: 3, notes: vec![] }],
                bars: vec![1],
            }],
        };
        assert!(song.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_out_of_range_presets() {
        let base = Song {
            scale: 0,
            key: 0,
            tempo: 120,
            beats_per_bar: 8,
            bar_count: 1,
            loop_start: 0,
            loop_length: 1,
            rhythm: 1,
            channels: vec![],
        };
        let mut song = base.clone();
        song.scale = crate::config::SCALES.len();
        assert!(song.validate().is_err());
        let mut song = base.clone();
        song.rhythm = crate::config::RHYTHMS.len();
        assert!(song.validate().is_err());
        assert!(base.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_out_of_range_pin_volume() {
        let mut song = Song {
            scale: 0,
            key: 0,
            tempo: 120,
            beats_per_bar: 8,
            bar_count: 1,
            loop_start: 0,
            loop_length: 1,
            rhythm: 1,
            channels: vec![Channel {
                kind: ChannelKind::Pitch,
                instruments: vec![Instrument {
                    instrument_type: InstrumentType::Chip,
                    volume: 0,
                    wave: 0,
                    filter_envelope: 1,
                    chord: 0,
                }],
                patterns: vec![Pattern {
                    instrument: 0,
                    notes: vec![note(
                        0,
                        12,
                        vec![
                            Pin { time: 0, volume: 3.0, interval: 0.0 },
                            Pin { time: 12, volume: 3.0, interval: 0.0 },
                        ],
                    )],
                }],
                bars: vec![1],
            }],
        };
        assert!(song.validate().is_ok());
        song.channels[0].patterns[0].notes[0].pins[0].volume = 4.0;
        assert!(song.validate().is_err());
    }
}
