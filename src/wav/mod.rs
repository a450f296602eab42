//! PCM/WAV encoder
//!
//! Renders the unrolled timeline through the external synthesis service
//! and packages the samples into a canonical RIFF/WAVE container: fixed
//! 44-byte header, uncompressed integer samples.

use crate::error::{Error, Result};
use crate::export::{self, ExportOptions};
use crate::midi::ByteWriter;
use crate::song::Song;
use crate::synth::Synthesizer;

/// Output sample rate.
pub const SAMPLE_RATE: u32 = 44100;
/// Output sample width. 1 (unsigned), 2, and 4 byte widths are
/// supported by [`encode_pcm`].
pub const BYTES_PER_SAMPLE: u32 = 2;

/// Whole samples in one bar at the given rate.
pub fn samples_per_bar(song: &Song, sample_rate: u32) -> usize {
    (sample_rate as f64 * 60.0 * song.beats_per_bar as f64 / song.tempo as f64).round() as usize
}

/// Render the song and encode it as 16-bit mono WAV.
pub fn encode(song: &Song, options: &ExportOptions, synth: &mut dyn Synthesizer) -> Result<Vec<u8>> {
    let unrolled = export::unrolled_bars(song, options);
    let sample_frames = samples_per_bar(song, SAMPLE_RATE) * unrolled.len();
    let mut samples = vec![0.0f32; sample_frames];

    let intro_skip_bars = if options.enable_intro { 0 } else { song.loop_start };
    synth.render(song, &mut samples, intro_skip_bars, options.loop_count)?;

    encode_pcm(&samples, SAMPLE_RATE, BYTES_PER_SAMPLE, 1, 1)
}

/// Package normalized samples into a RIFF/WAVE PCM container.
///
/// When the source and output channel counts differ, samples are taken
/// at `src_channel_count` stride and each written `wav_channel_count`
/// times.
pub fn encode_pcm(
    samples: &[f32],
    sample_rate: u32,
    bytes_per_sample: u32,
    src_channel_count: usize,
    wav_channel_count: usize,
) -> Result<Vec<u8>> {
    match bytes_per_sample {
        1 | 2 | 4 => {}
        other => return Err(Error::UnsupportedSampleWidth(other)),
    }
    let bits_per_sample = 8 * bytes_per_sample;
    let sample_frames = samples.len() / src_channel_count;
    let sample_count = wav_channel_count * sample_frames;
    let data_size = sample_count * bytes_per_sample as usize;

    let mut writer = ByteWriter::with_capacity(44 + data_size);
    writer.write_u32_be(0x52494646); // "RIFF"
    writer.write_u32_le(36 + data_size as u32); // size of remaining file
    writer.write_u32_be(0x57415645); // "WAVE"
    writer.write_u32_be(0x666D7420); // "fmt "
    writer.write_u32_le(16); // size of following header
    writer.write_u16_le(1); // not compressed
    writer.write_u16_le(wav_channel_count as u16);
    writer.write_u32_le(sample_rate);
    writer.write_u32_le(sample_rate * bytes_per_sample * wav_channel_count as u32);
    writer.write_u16_le(bytes_per_sample as u16); // block align
    writer.write_u16_le(bits_per_sample as u16);
    writer.write_u32_be(0x64617461); // "data"
    writer.write_u32_le(data_size as u32);

    let (stride, repeat) = if src_channel_count == wav_channel_count {
        (1, 1)
    } else {
        (src_channel_count, wav_channel_count)
    };

    if bytes_per_sample > 1 {
        // Multi-byte samples are signed.
        let scale = ((1u32 << (bits_per_sample - 1)) - 1) as f64;
        for frame in 0..sample_frames {
            let value = (samples[frame * stride].clamp(-1.0, 1.0) as f64 * scale).round();
            for _ in 0..repeat {
                match bytes_per_sample {
                    2 => writer.write_i16_le(value as i16),
                    _ => writer.write_i32_le(value as i32),
                }
            }
        }
    } else {
        // 8-bit samples are a special case: unsigned, biased by 128.
        for frame in 0..sample_frames {
            let value = (samples[frame * stride].clamp(-1.0, 1.0) as f64 * 127.0 + 128.0).round();
            for _ in 0..repeat {
                writer.write_u8(value.clamp(0.0, 255.0) as u8);
            }
        }
    }

    Ok(writer.into_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_silent_second_is_byte_exact() {
        let samples = vec![0.0f32; 44100];
        let data = encode_pcm(&samples, 44100, 2, 1, 1).unwrap();
        assert_eq!(data.len(), 44 + 44100 * 2);
        assert!(data[44..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_header_fields() {
        let data = encode_pcm(&[0.0, 0.5, -0.5], 44100, 2, 1, 1).unwrap();
        assert_eq!(&data[0..4], b"RIFF");
        assert_eq!(&data[8..12], b"WAVE");
        assert_eq!(&data[12..16], b"fmt ");
        assert_eq!(u16::from_le_bytes([data[22], data[23]]), 1); // mono
        assert_eq!(u32::from_le_bytes([data[24], data[25], data[26], data[27]]), 44100);
        assert_eq!(u16::from_le_bytes([data[34], data[35]]), 16); // bit depth
        assert_eq!(&data[36..40], b"data");
        assert_eq!(u32::from_le_bytes([data[40], data[41], data[42], data[43]]), 6);
    }

    #[test]
    fn test_full_scale_samples_clamp() {
        let data = encode_pcm(&[1.0, -1.0, 2.0, -2.0], 44100, 2, 1, 1).unwrap();
        let max = i16::from_le_bytes([data[44], data[45]]);
        let min = i16::from_le_bytes([data[46], data[47]]);
        assert_eq!(max, i16::MAX);
        assert_eq!(min, -i16::MAX);
        // Out-of-range input clamps to the same extremes.
        assert_eq!(i16::from_le_bytes([data[48], data[49]]), i16::MAX);
        assert_eq!(i16::from_le_bytes([data[50], data[51]]), -i16::MAX);
    }

    #[test]
    fn test_eight_bit_bias() {
        let data = encode_pcm(&[0.0, 1.0, -1.0], 44100, 1, 1, 1).unwrap();
        assert_eq!(&data[44..], &[128, 255, 1]);
    }

    #[test]
    fn test_three_byte_samples_rejected() {
        assert!(matches!(
            encode_pcm(&[0.0], 44100, 3, 1, 1),
            Err(Error::UnsupportedSampleWidth(3))
        ));
    }

    #[test]
    fn test_mono_to_stereo_repeat() {
        let data = encode_pcm(&[0.5, -0.5], 44100, 2, 1, 2).unwrap();
        assert_eq!(u16::from_le_bytes([data[22], data[23]]), 2);
        let l0 = i16::from_le_bytes([data[44], data[45]]);
        let r0 = i16::from_le_bytes([data[46], data[47]]);
        assert_eq!(l0, r0);
    }
}
