//! Synthesis service seam
//!
//! The export engine consumes synthesis as an opaque "render this score
//! to samples" service behind the [`Synthesizer`] trait; the real audio
//! engine lives outside this crate. [`ChipSynth`] is a deliberately
//! naive built-in renderer so the command line wav path works on its
//! own.

use crate::config;
use crate::error::Result;
use crate::midi::constants::{instrument_volume_to_volume_mult, note_volume_to_volume_mult};
use crate::song::Song;

/// External synthesis collaborator: one blocking call filling the whole
/// sample buffer with normalized values in [-1, 1].
pub trait Synthesizer {
    /// Render the song into `buffer`, starting `intro_skip_bars` bars in
    /// and playing the loop section `loop_repeat_count` times.
    fn render(
        &mut self,
        song: &Song,
        buffer: &mut [f32],
        intro_skip_bars: usize,
        loop_repeat_count: u32,
    ) -> Result<()>;
}

/// Minimal stand-in renderer: square waves with pin envelopes for pitch
/// channels, shift-register noise for noise channels. Not a substitute
/// for the real synthesis engine.
pub struct ChipSynth {
    pub sample_rate: u32,
}

impl ChipSynth {
    pub fn new(sample_rate: u32) -> Self {
        Self { sample_rate }
    }
}

impl Synthesizer for ChipSynth {
    fn render(
        &mut self,
        song: &Song,
        buffer: &mut [f32],
        intro_skip_bars: usize,
        loop_repeat_count: u32,
    ) -> Result<()> {
        buffer.fill(0.0);

        let samples_per_bar =
            (self.sample_rate as f64 * 60.0 * song.beats_per_bar as f64 / song.tempo as f64)
                .round() as usize;
        let samples_per_part =
            samples_per_bar as f64 / (song.beats_per_bar * config::PARTS_PER_BEAT) as f64;

        // Rebuild the linear timeline: everything from the skip point on,
        // with the loop section repeated.
        let mut bars = Vec::new();
        bars.extend(intro_skip_bars..song.loop_start);
        for _ in 0..loop_repeat_count {
            bars.extend(song.loop_start..song.loop_start + song.loop_length);
        }
        bars.extend(song.loop_start + song.loop_length..song.bar_count);

        for channel in &song.channels {
            let is_noise = channel.is_noise();
            let channel_root = if is_noise {
                config::SPECTRUM_BASE_PITCH
            } else {
                config::KEYS[song.key].base_pitch
            };
            let interval_scale = if is_noise { config::NOISE_INTERVAL } else { 1 };
            let mut phase: f64 = 0.0;
            let mut lfsr: u32 = 1;

            for (bar_position, &bar) in bars.iter().enumerate() {
                let Some(pattern) = channel.pattern_at(bar) else { continue };
                let instrument = &channel.instruments[pattern.instrument];
                let instrument_amp = instrument_volume_to_volume_mult(instrument.volume) * 0.15;
                let bar_offset = bar_position * samples_per_bar;

                for note in &pattern.notes {
                    let pitch = channel_root + note.pitches[0] * interval_scale;
                    for pair in note.pins.windows(2) {
                        // Pin times are relative to the note start.
                        let from =
                            bar_offset + ((note.start + pair[0].time) as f64 * samples_per_part) as usize;
                        let to =
                            bar_offset + ((note.start + pair[1].time) as f64 * samples_per_part) as usize;
                        if to <= from {
                            continue;
                        }
                        for i in from..to.min(buffer.len()) {
                            let t = (i - from) as f64 / (to - from) as f64;
                            let volume = pair[0].volume + t * (pair[1].volume - pair[0].volume);
                            let interval = pair[0].interval + t * (pair[1].interval - pair[0].interval);
                            let midi_pitch = pitch as f64 + interval * interval_scale as f64;
                            let freq = 440.0 * 2.0_f64.powf((midi_pitch - 69.0) / 12.0);
                            phase = (phase + freq / self.sample_rate as f64).fract();
                            let wave = if is_noise {
                                // Galois LFSR, stepped once per sample.
                                let bit = lfsr & 1;
                                lfsr >>= 1;
                                if bit == 1 {
                                    lfsr ^= 0x4000;
                                }
                                bit as f64 * 2.0 - 1.0
                            } else if phase < 0.5 {
                                1.0
                            } else {
                                -1.0
                            };
                            let amp = instrument_amp * note_volume_to_volume_mult(volume);
                            buffer[i] += (wave * amp) as f32;
                        }
                    }
                }
            }
        }

        for sample in buffer.iter_mut() {
            *sample = sample.clamp(-1.0, 1.0);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::song::{Channel, ChannelKind, Instrument, InstrumentType, Note, Pattern, Pin};

    fn one_note_song() -> Song {
        Song {
            scale: 0,
            key: 0,
            tempo: 120,
            beats_per_bar: 4,
            bar_count: 1,
            loop_start: 0,
            loop_length: 1,
            rhythm: 1,
            channels: vec![Channel {
                kind: ChannelKind::Pitch,
                instruments: vec![Instrument {
                    instrument_type: InstrumentType::Chip,
                    volume: 0,
                    wave: 2,
                    filter_envelope: 1,
                    chord: 0,
                }],
                patterns: vec![Pattern {
                    instrument: 0,
                    notes: vec![Note {
                        start: 0,
                        end: 96,
                        pitches: vec![12],
                        pins: vec![
                            Pin { time: 0, volume: 3.0, interval: 0.0 },
                            Pin { time: 96, volume: 3.0, interval: 0.0 },
                        ],
                    }],
                }],
                bars: vec![1],
            }],
        }
    }

    #[test]
    fn test_renders_audible_samples() {
        let song = one_note_song();
        let mut synth = ChipSynth::new(44100);
        let mut buffer = vec![0.0f32; 44100];
        synth.render(&song, &mut buffer, 0, 1).unwrap();
        assert!(buffer.iter().any(|&s| s != 0.0));
        assert!(buffer.iter().all(|&s| (-1.0..=1.0).contains(&s)));
    }

    #[test]
    fn test_empty_song_renders_silence() {
        let mut song = one_note_song();
        song.channels[0].bars = vec![0];
        let mut synth = ChipSynth::new(44100);
        let mut buffer = vec![1.0f32; 1000];
        synth.render(&song, &mut buffer, 0, 1).unwrap();
        assert!(buffer.iter().all(|&s| s == 0.0));
    }
}
