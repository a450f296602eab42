//! Export orchestration
//!
//! Expands the loop selection into a linear bar timeline, assigns
//! composition channels to MIDI channels, and dispatches to the format
//! encoders. The result is an immutable byte buffer plus a suggested
//! file name and MIME type; persisting it is the caller's job.

use crate::error::Result;
use crate::midi;
use crate::song::{InstrumentType, Song};
use crate::synth::Synthesizer;
use crate::wav;

/// Output format selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ExportFormat {
    Wav,
    Midi,
    Json,
}

/// Export options, validated by the caller before the engine runs.
#[derive(Debug, Clone)]
pub struct ExportOptions {
    pub enable_intro: bool,
    pub enable_outro: bool,
    /// How many times the loop section plays. At least 1.
    pub loop_count: u32,
    /// Target file name without extension, sanitized upstream.
    pub file_name: String,
    pub format: ExportFormat,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            enable_intro: true,
            enable_outro: true,
            loop_count: 1,
            file_name: "song".into(),
            format: ExportFormat::Midi,
        }
    }
}

/// A finished export: one immutable buffer ready to hand to whatever
/// saves files.
#[derive(Debug)]
pub struct ExportFile {
    pub data: Vec<u8>,
    pub name: String,
    pub mime: &'static str,
}

/// A MIDI track assignment for one composition channel, or the synthetic
/// meta track when `channel` is `None`.
#[derive(Debug, Clone)]
pub struct TrackDescriptor {
    pub channel: Option<usize>,
    pub midi_channel: u8,
    pub is_noise: bool,
    pub is_drumset: bool,
    pub name: String,
}

impl TrackDescriptor {
    pub fn is_meta(&self) -> bool {
        self.channel.is_none()
    }
}

/// Expand the intro/loop/outro selection into the flat list of source
/// bar indices actually rendered.
pub fn unrolled_bars(song: &Song, options: &ExportOptions) -> Vec<usize> {
    let mut bars = Vec::new();
    if options.enable_intro {
        bars.extend(0..song.loop_start);
    }
    for _ in 0..options.loop_count {
        bars.extend(song.loop_start..song.loop_start + song.loop_length);
    }
    if options.enable_outro {
        bars.extend(song.loop_start + song.loop_length..song.bar_count);
    }
    bars
}

/// Assign each composition channel a MIDI channel, in order, skipping
/// the reserved percussion channel. The first channel whose lead
/// instrument is a drumset takes the percussion channel instead; any
/// later drumset channel is treated as an ordinary melodic channel.
pub fn map_tracks(song: &Song) -> Vec<TrackDescriptor> {
    let mut tracks = vec![TrackDescriptor {
        channel: None,
        midi_channel: 0,
        is_noise: false,
        is_drumset: false,
        name: String::new(),
    }];

    let mut midi_channel_counter: u8 = 0;
    let mut found_a_drumset = false;
    let mut pitch_ordinal = 0;
    let mut noise_ordinal = 0;
    for (index, channel) in song.channels.iter().enumerate() {
        let name = if channel.is_noise() {
            noise_ordinal += 1;
            format!("noise channel {noise_ordinal}")
        } else {
            pitch_ordinal += 1;
            format!("pitch channel {pitch_ordinal}")
        };
        if !found_a_drumset
            && channel.instruments[0].instrument_type == InstrumentType::Drumset
        {
            // Only one true percussion track per export; it always lands
            // on the reserved channel.
            tracks.push(TrackDescriptor {
                channel: Some(index),
                midi_channel: midi::constants::PERCUSSION_CHANNEL,
                is_noise: true,
                is_drumset: true,
                name,
            });
            found_a_drumset = true;
        } else {
            tracks.push(TrackDescriptor {
                channel: Some(index),
                midi_channel: midi_channel_counter,
                is_noise: channel.is_noise(),
                is_drumset: false,
                name,
            });
            midi_channel_counter += 1;
            if midi_channel_counter == midi::constants::PERCUSSION_CHANNEL {
                midi_channel_counter += 1;
            }
        }
    }
    tracks
}

/// Run one export and hand back the finished file.
pub fn export(song: &Song, options: &ExportOptions, synth: &mut dyn Synthesizer) -> Result<ExportFile> {
    let (data, extension, mime) = match options.format {
        ExportFormat::Midi => (midi::encode(song, options)?, "mid", "audio/midi"),
        ExportFormat::Wav => (wav::encode(song, options, synth)?, "wav", "audio/wav"),
        ExportFormat::Json => (serde_json::to_vec_pretty(song)?, "json", "application/json"),
    };
    tracing::debug!(format = ?options.format, bytes = data.len(), "export finished");
    Ok(ExportFile {
        data,
        name: format!("{}.{}", options.file_name.trim(), extension),
        mime,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::song::{Channel, ChannelKind, Instrument, InstrumentType};

    fn song_with_bars(loop_start: usize, loop_length: usize, bar_count: usize) -> Song {
        Song {
            scale: 0,
            key: 0,
            tempo: 120,
            beats_per_bar: 8,
            bar_count,
            loop_start,
            loop_length,
            rhythm: 1,
            channels: vec![],
        }
    }

    fn options(intro: bool, outro: bool, loops: u32) -> ExportOptions {
        ExportOptions {
            enable_intro: intro,
            enable_outro: outro,
            loop_count: loops,
            ..ExportOptions::default()
        }
    }

    #[test]
    fn test_unroll_intro_loop_outro() {
        let song = song_with_bars(2, 3, 8);
        let bars = unrolled_bars(&song, &options(true, true, 2));
        assert_eq!(bars, vec![0, 1, 2, 3, 4, 2, 3, 4, 5, 6, 7]);
    }

    #[test]
    fn test_unroll_loop_only() {
        let song = song_with_bars(0, 4, 4);
        let bars = unrolled_bars(&song, &options(false, false, 2));
        assert_eq!(bars, vec![0, 1, 2, 3, 0, 1, 2, 3]);
    }

    #[test]
    fn test_unroll_length_identity() {
        for &(loop_start, loop_length, bar_count) in &[(0usize, 4usize, 4usize), (2, 3, 8), (1, 1, 5)] {
            for intro in [false, true] {
                for outro in [false, true] {
                    for repeat in 1..=3u32 {
                        let song = song_with_bars(loop_start, loop_length, bar_count);
                        let bars = unrolled_bars(&song, &options(intro, outro, repeat));
                        let expected = if intro { loop_start } else { 0 }
                            + loop_length * repeat as usize
                            + if outro { bar_count - loop_start - loop_length } else { 0 };
                        assert_eq!(bars.len(), expected);
                    }
                }
            }
        }
    }

    fn channel(kind: ChannelKind, instrument_type: InstrumentType) -> Channel {
        Channel {
            kind,
            instruments: vec![Instrument {
                instrument_type,
                volume: 0,
                wave: 0,
                filter_envelope: 1,
                chord: 0,
            }],
            patterns: vec![],
            bars: vec![0],
        }
    }

    #[test]
    fn test_map_tracks_skips_percussion_channel() {
        let mut song = song_with_bars(0, 1, 1);
        for _ in 0..11 {
            song.channels.push(channel(ChannelKind::Pitch, InstrumentType::Chip));
        }
        let tracks = map_tracks(&song);
        assert!(tracks[0].is_meta());
        let channels: Vec<u8> = tracks[1..].iter().map(|t| t.midi_channel).collect();
        assert_eq!(channels, vec![0, 1, 2, 3, 4, 5, 6, 7, 8, 10, 11]);
    }

    #[test]
    fn test_map_tracks_first_drumset_takes_channel_nine() {
        let mut song = song_with_bars(0, 1, 1);
        song.channels.push(channel(ChannelKind::Pitch, InstrumentType::Chip));
        song.channels.push(channel(ChannelKind::Noise, InstrumentType::Drumset));
        song.channels.push(channel(ChannelKind::Noise, InstrumentType::Drumset));
        let tracks = map_tracks(&song);
        assert_eq!(tracks[2].midi_channel, 9);
        assert!(tracks[2].is_drumset);
        // The second drumset gets an ordinary sequential channel.
        assert_eq!(tracks[3].midi_channel, 1);
        assert!(!tracks[3].is_drumset);
        assert!(tracks[3].is_noise);
    }

    #[test]
    fn test_track_names_count_per_kind() {
        let mut song = song_with_bars(0, 1, 1);
        song.channels.push(channel(ChannelKind::Pitch, InstrumentType::Chip));
        song.channels.push(channel(ChannelKind::Pitch, InstrumentType::Fm));
        song.channels.push(channel(ChannelKind::Noise, InstrumentType::Noise));
        let tracks = map_tracks(&song);
        assert_eq!(tracks[1].name, "pitch channel 1");
        assert_eq!(tracks[2].name, "pitch channel 2");
        assert_eq!(tracks[3].name, "noise channel 1");
    }
}
