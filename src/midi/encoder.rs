//! Standard MIDI File encoder
//!
//! Translates the tick-and-pin note representation into discrete MIDI
//! events: one meta track (tempo, signatures, loop markers) followed by
//! one track per composition channel. The note event scheduler walks
//! every note's envelope pins tick-by-tick, turning continuous pitch and
//! volume into de-duplicated pitch-bend, expression, and note-on/off
//! events.

use super::constants::{
    chunk, control, event, instrument_volume_to_volume_mult, meta, note_volume_to_volume_mult, rpn,
    volume_mult_to_midi_expression, volume_mult_to_midi_volume, DECAY_PROGRAMS, DEFAULT_EXPRESSION,
    DEFAULT_NOTE_VELOCITY, DEFAULT_PITCH_BEND, DRUMSET_NOTES, FORMAT_SIMULTANEOUS_TRACKS,
    MIDI_TICKS_PER_BEAT, MIDI_TICKS_PER_PART, PITCH_BEND_RANGE, PROGRAM_ELECTRIC_GRAND,
    PROGRAM_PAN_FLUTE, PROGRAM_SAWTOOTH, PROGRAM_STEEL_GUITAR, PROGRAM_TAIKO, PROGRAM_TIMPANI,
    SUSTAIN_PROGRAMS, TAIKO_SUBHARMONIC_OCTAVES,
};
use super::writer::ByteWriter;
use crate::config::{self, EnvelopeType};
use crate::error::{Error, Result};
use crate::export::{self, ExportOptions, TrackDescriptor};
use crate::song::{Channel, Instrument, InstrumentType, Song};

fn lerp(low: f64, high: f64, t: f64) -> f64 {
    low + t * (high - low)
}

/// Encode a song as a format-1 Standard MIDI File.
pub fn encode(song: &Song, options: &ExportOptions) -> Result<Vec<u8>> {
    let unrolled = export::unrolled_bars(song, options);
    let tracks = export::map_tracks(song);
    let midi_ticks_per_bar = MIDI_TICKS_PER_BEAT * song.beats_per_bar as u64;
    let total_time = midi_ticks_per_bar * unrolled.len() as u64;

    let mut writer = ByteWriter::with_capacity(1024);
    writer.write_u32_be(chunk::HEADER);
    writer.write_u32_be(6);
    writer.write_u16_be(FORMAT_SIMULTANEOUS_TRACKS);
    writer.write_u16_be(tracks.len() as u16);
    writer.write_u16_be(MIDI_TICKS_PER_BEAT as u16);

    for track in &tracks {
        writer.write_u32_be(chunk::TRACK);

        // Placeholder for the chunk length, overwritten once the track's
        // final size is known.
        let track_start_index = writer.position();
        writer.write_u32_be(0);

        let mut tw = TrackWriter {
            writer: &mut writer,
            midi_channel: track.midi_channel,
            prev_time: 0,
        };

        match track.channel {
            None => encode_meta_track(song, options, unrolled.len(), &mut tw)?,
            Some(channel) => {
                encode_channel_track(song, &song.channels[channel], track, &unrolled, &mut tw)?
            }
        }

        tw.write_event_time(total_time)?;
        tw.writer.write_u8(event::META);
        tw.writer.write_midi_7_bits(meta::END_OF_TRACK);
        tw.writer.write_variable_length(0);

        let track_length = writer.position() - track_start_index - 4;
        writer.patch_u32_be(track_start_index, track_length as u32);
    }

    Ok(writer.into_bytes())
}

/// Per-track write cursor enforcing the monotonic-time invariant.
struct TrackWriter<'a> {
    writer: &'a mut ByteWriter,
    midi_channel: u8,
    prev_time: u64,
}

impl TrackWriter<'_> {
    /// Write the delta time for the next event. Events may never move
    /// backwards on a track.
    fn write_event_time(&mut self, time: u64) -> Result<()> {
        if time < self.prev_time {
            return Err(Error::EventTimeBackwards { time, prev: self.prev_time });
        }
        self.writer.write_variable_length(time - self.prev_time);
        self.prev_time = time;
        Ok(())
    }

    fn write_control(&mut self, message: u8, value: i64) -> Result<()> {
        if !(0..=0x7F).contains(&value) {
            return Err(Error::ControlValueOutOfRange(value));
        }
        self.writer.write_u8(event::CONTROL_CHANGE | self.midi_channel);
        self.writer.write_midi_7_bits(message);
        self.writer.write_midi_7_bits(value as u8);
        Ok(())
    }

    fn write_meta_text(&mut self, message: u8, text: &str) {
        self.writer.write_u8(event::META);
        self.writer.write_midi_7_bits(message);
        self.writer.write_midi_ascii(text);
    }

    fn write_pitch_bend(&mut self, bend: u16) {
        self.writer.write_u8(event::PITCH_BEND | self.midi_channel);
        self.writer.write_midi_7_bits((bend & 0x7F) as u8);
        self.writer.write_midi_7_bits((bend >> 7) as u8);
    }

    fn write_note(&mut self, status: u8, pitch: u8, velocity: u8) {
        self.writer.write_u8(status | self.midi_channel);
        self.writer.write_midi_7_bits(pitch);
        self.writer.write_midi_7_bits(velocity);
    }
}

/// Sharp (positive) or flat (negative) count for the key signature,
/// derived by walking the circle of fifths. Assumes a diatonic
/// major/minor scale; non-diatonic presets get a musically approximate
/// signature.
pub fn key_signature_sharps(key: usize, is_minor: bool) -> i8 {
    let mut num_sharps = key as i32;
    // Odd key indices are reached via the sharp side of the circle.
    if key % 2 == 1 {
        num_sharps += 6;
    }
    // The A minor scale has zero sharps; rotate accordingly.
    if is_minor {
        num_sharps += 9;
    }
    while num_sharps > 6 {
        num_sharps -= 12;
    }
    num_sharps as i8
}

/// Tempo, time signature, key signature, and the loop boundary markers.
fn encode_meta_track(
    song: &Song,
    options: &ExportOptions,
    unrolled_bar_count: usize,
    tw: &mut TrackWriter<'_>,
) -> Result<()> {
    let midi_ticks_per_bar = MIDI_TICKS_PER_BEAT * song.beats_per_bar as u64;

    tw.write_event_time(0)?;
    tw.write_meta_text(meta::TEXT, "Composed with chipexport");

    let microseconds_per_beat = (60_000_000.0 / song.tempo as f64).round() as u32;
    tw.write_event_time(0)?;
    tw.writer.write_u8(event::META);
    tw.writer.write_midi_7_bits(meta::TEMPO);
    tw.writer.write_variable_length(3);
    tw.writer.write_u24_be(microseconds_per_beat);

    tw.write_event_time(0)?;
    tw.writer.write_u8(event::META);
    tw.writer.write_midi_7_bits(meta::TIME_SIGNATURE);
    tw.writer.write_variable_length(4);
    tw.writer.write_u8(song.beats_per_bar as u8); // numerator
    tw.writer.write_u8(2); // denominator exponent: 2^2, always quarter notes
    tw.writer.write_u8(24); // MIDI clocks per metronome tick
    tw.writer.write_u8(8); // 32nd notes per 24 MIDI clocks

    let is_minor = config::scale_is_minor(song.scale);
    tw.write_event_time(0)?;
    tw.writer.write_u8(event::META);
    tw.writer.write_midi_7_bits(meta::KEY_SIGNATURE);
    tw.writer.write_variable_length(2);
    tw.writer.write_i8(key_signature_sharps(song.key, is_minor));
    tw.writer.write_u8(is_minor as u8);

    let mut bar_start_time: u64 = 0;
    if options.enable_intro {
        bar_start_time += midi_ticks_per_bar * song.loop_start as u64;
    }
    tw.write_event_time(bar_start_time)?;
    tw.write_meta_text(meta::MARKER, "Loop Start");

    for loop_index in 0..options.loop_count {
        bar_start_time += midi_ticks_per_bar * song.loop_length as u64;
        tw.write_event_time(bar_start_time)?;
        let marker = if loop_index < options.loop_count - 1 { "Loop Repeat" } else { "Loop End" };
        tw.write_meta_text(meta::MARKER, marker);
    }

    if options.enable_outro {
        bar_start_time +=
            midi_ticks_per_bar * (song.bar_count - song.loop_start - song.loop_length) as u64;
    }
    let expected = midi_ticks_per_bar * unrolled_bar_count as u64;
    if bar_start_time != expected {
        return Err(Error::BarLengthMismatch { expected, actual: bar_start_time });
    }
    Ok(())
}

/// A program number for the General MIDI instrument closest to the given
/// synthesis settings, split between sustaining and decaying programs by
/// the filter envelope family.
fn instrument_program(instrument: &Instrument, is_noise: bool) -> u8 {
    let decays = matches!(
        instrument.filter_envelope_type(),
        EnvelopeType::Decay | EnvelopeType::Twang
    );
    match instrument.instrument_type {
        // Drumsets beyond the one percussion track just get taiko.
        InstrumentType::Drumset => PROGRAM_TAIKO,
        InstrumentType::Noise | InstrumentType::Spectrum => {
            if is_noise {
                PROGRAM_TAIKO
            } else if decays {
                PROGRAM_TIMPANI
            } else {
                PROGRAM_PAN_FLUTE
            }
        }
        InstrumentType::Chip => {
            let programs = if decays { DECAY_PROGRAMS } else { SUSTAIN_PROGRAMS };
            programs.get(instrument.wave).copied().unwrap_or(PROGRAM_SAWTOOTH)
        }
        InstrumentType::Pwm => {
            if decays { PROGRAM_STEEL_GUITAR } else { PROGRAM_SAWTOOTH }
        }
        InstrumentType::Fm | InstrumentType::Harmonics => {
            if decays { PROGRAM_ELECTRIC_GRAND } else { PROGRAM_SAWTOOTH }
        }
    }
}

/// How many simultaneous MIDI tones a chord on this instrument gets.
fn polyphony_for(instrument: &Instrument) -> usize {
    let chord = instrument.chord();
    if chord.arpeggiates {
        if chord.harmonizes {
            match instrument.instrument_type {
                InstrumentType::Chip => 2,
                InstrumentType::Fm => 4,
                other => {
                    tracing::warn!(
                        ?other,
                        "unrecognized instrument type for harmonizing arpeggio"
                    );
                    1
                }
            }
        } else {
            1
        }
    } else {
        4
    }
}

/// Instrument-name meta, program change, and channel volume, emitted
/// when the track's active instrument changes.
fn write_instrument_settings(
    tw: &mut TrackWriter<'_>,
    channel: &Channel,
    instrument_index: usize,
    time: u64,
    is_drumset: bool,
    is_noise: bool,
    prev_instrument: &mut Option<usize>,
) -> Result<()> {
    if *prev_instrument == Some(instrument_index) {
        return Ok(());
    }
    *prev_instrument = Some(instrument_index);
    let instrument = &channel.instruments[instrument_index];

    tw.write_event_time(time)?;
    tw.write_meta_text(meta::INSTRUMENT_NAME, &format!("Instrument {}", instrument_index + 1));

    if !is_drumset {
        tw.write_event_time(time)?;
        tw.writer.write_u8(event::PROGRAM_CHANGE | tw.midi_channel);
        tw.writer.write_midi_7_bits(instrument_program(instrument, is_noise));
    }

    let channel_volume =
        volume_mult_to_midi_volume(instrument_volume_to_volume_mult(instrument.volume));
    tw.write_event_time(time)?;
    tw.write_control(control::VOLUME_MSB, channel_volume.round().min(127.0) as i64)?;
    Ok(())
}

/// The note event scheduler: one composition channel onto one MIDI track.
fn encode_channel_track(
    song: &Song,
    channel: &Channel,
    track: &TrackDescriptor,
    unrolled_bars: &[usize],
    tw: &mut TrackWriter<'_>,
) -> Result<()> {
    let is_noise = track.is_noise;
    let is_drumset = track.is_drumset;
    let midi_ticks_per_bar = MIDI_TICKS_PER_BEAT * song.beats_per_bar as u64;
    let rhythm = &config::RHYTHMS[song.rhythm];

    tw.write_event_time(0)?;
    tw.write_meta_text(meta::TRACK_NAME, &track.name);

    // Pitch bend range handshake: select the pitch-bend-range RPN, set
    // its semitone/cent value, then reset the active RPN so later
    // control data isn't misread.
    tw.write_event_time(0)?;
    tw.write_control(control::REGISTERED_PARAMETER_NUMBER_MSB, rpn::PITCH_BEND_RANGE.0 as i64)?;
    tw.write_event_time(0)?;
    tw.write_control(control::REGISTERED_PARAMETER_NUMBER_LSB, rpn::PITCH_BEND_RANGE.1 as i64)?;
    tw.write_event_time(0)?;
    tw.write_control(control::SET_PARAMETER_MSB, PITCH_BEND_RANGE as i64)?;
    tw.write_event_time(0)?;
    tw.write_control(control::SET_PARAMETER_LSB, 0)?;
    tw.write_event_time(0)?;
    tw.write_control(control::REGISTERED_PARAMETER_NUMBER_MSB, rpn::RESET.0 as i64)?;
    tw.write_event_time(0)?;
    tw.write_control(control::REGISTERED_PARAMETER_NUMBER_LSB, rpn::RESET.1 as i64)?;

    let mut prev_instrument: Option<usize> = None;
    if unrolled_bars.first().and_then(|&bar| channel.pattern_at(bar)).is_none() {
        // Establish a program at track start even though no pattern
        // kicks in until later.
        write_instrument_settings(tw, channel, 0, 0, is_drumset, is_noise, &mut prev_instrument)?;
    }

    let mut prev_pitch_bend = DEFAULT_PITCH_BEND;
    let mut prev_expression = DEFAULT_EXPRESSION;
    let mut should_reset_expression_and_pitch_bend = false;
    let channel_root = if is_noise {
        config::SPECTRUM_BASE_PITCH
    } else {
        config::KEYS[song.key].base_pitch
    };
    let interval_scale: i32 = if is_noise { config::NOISE_INTERVAL } else { 1 };

    let mut bar_start_time: u64 = 0;
    for &bar in unrolled_bars {
        let Some(pattern) = channel.pattern_at(bar) else {
            // Silent bar: bring a drifted pitch bend or expression back
            // to rest, once per gap.
            if should_reset_expression_and_pitch_bend {
                should_reset_expression_and_pitch_bend = false;

                if prev_expression != DEFAULT_EXPRESSION {
                    prev_expression = DEFAULT_EXPRESSION;
                    tw.write_event_time(bar_start_time)?;
                    tw.write_control(control::EXPRESSION_MSB, prev_expression as i64)?;
                }

                if prev_pitch_bend != DEFAULT_PITCH_BEND {
                    prev_pitch_bend = DEFAULT_PITCH_BEND;
                    tw.write_event_time(bar_start_time)?;
                    tw.write_pitch_bend(prev_pitch_bend);
                }
            }
            bar_start_time += midi_ticks_per_bar;
            continue;
        };

        let instrument = &channel.instruments[pattern.instrument];
        write_instrument_settings(
            tw,
            channel,
            pattern.instrument,
            bar_start_time,
            is_drumset,
            is_noise,
            &mut prev_instrument,
        )?;

        let uses_arpeggio = instrument.chord().arpeggiates;
        let polyphony = polyphony_for(instrument);

        for note in &pattern.notes {
            // A zero-length note runs no ticks and sounds no tones.
            if note.start == note.end {
                continue;
            }
            let note_start_time = bar_start_time + note.start as u64 * MIDI_TICKS_PER_PART;
            let note_end_time = bar_start_time + note.end as u64 * MIDI_TICKS_PER_PART;
            let mut pin_time = note_start_time;
            let mut pin_volume = note.pins[0].volume;
            let mut pin_interval = note.pins[0].interval;
            let mut prev_pitches = [0u8; 4];
            let mut next_pitches = [0u8; 4];
            let tone_count = polyphony.min(note.pitches.len());
            let velocity = if is_drumset {
                ((DEFAULT_NOTE_VELOCITY as f64 * note.pins[0].volume / config::MAX_PIN_VOLUME)
                    .round() as u8)
                    .max(1)
            } else {
                DEFAULT_NOTE_VELOCITY
            };

            // The bend window is only +/- 24 semitones from the base
            // pitch. Choose a base offset that keeps every pin's interval
            // within that window for the whole note, so the bend range is
            // used as fully as possible without ever exceeding it.
            let main_interval = note.pick_main_interval();
            let mut pitch_offset = main_interval * interval_scale as f64;
            if !is_drumset {
                let mut max_pitch_offset = PITCH_BEND_RANGE as f64;
                let mut min_pitch_offset = -PITCH_BEND_RANGE as f64;
                for pin in &note.pins[1..] {
                    let interval = pin.interval * interval_scale as f64;
                    max_pitch_offset = max_pitch_offset.min(interval + PITCH_BEND_RANGE as f64);
                    min_pitch_offset = min_pitch_offset.max(interval - PITCH_BEND_RANGE as f64);
                }
                pitch_offset = pitch_offset.max(min_pitch_offset).min(max_pitch_offset);
            }

            for pin_index in 1..note.pins.len() {
                let next_pin = &note.pins[pin_index];
                let next_pin_time = note_start_time + next_pin.time as u64 * MIDI_TICKS_PER_PART;
                let next_pin_volume = next_pin.volume;
                let next_pin_interval = next_pin.interval;

                let length = next_pin_time - pin_time;
                for midi_tick in 0..length {
                    let midi_tick_time = pin_time + midi_tick;
                    let t = midi_tick as f64 / length as f64;
                    let linear_volume = lerp(pin_volume, next_pin_volume, t);
                    let linear_interval = lerp(pin_interval, next_pin_interval, t);

                    let interval = linear_interval * interval_scale as f64 - pitch_offset;

                    let pitch_bend = (8192.0 * (1.0 + interval / PITCH_BEND_RANGE as f64))
                        .round()
                        .clamp(0.0, 16383.0) as u16;
                    let expression = volume_mult_to_midi_expression(
                        note_volume_to_volume_mult(linear_volume),
                    )
                    .round()
                    .min(127.0) as u8;

                    if pitch_bend != prev_pitch_bend {
                        tw.write_event_time(midi_tick_time)?;
                        tw.write_pitch_bend(pitch_bend);
                        prev_pitch_bend = pitch_bend;
                    }

                    if expression != prev_expression && !is_drumset {
                        tw.write_event_time(midi_tick_time)?;
                        tw.write_control(control::EXPRESSION_MSB, expression as i64)?;
                        prev_expression = expression;
                    }

                    let note_starting = midi_tick_time == note_start_time;
                    for tone_index in 0..tone_count {
                        let mut next_pitch = note.pitches[tone_index];
                        let resolved: u8;
                        if is_drumset {
                            let drum_index = (next_pitch as f64 + pitch_offset).round() as i32;
                            resolved = *usize::try_from(drum_index)
                                .ok()
                                .and_then(|i| DRUMSET_NOTES.get(i))
                                .ok_or(Error::UnmappedDrumPitch(drum_index))?;
                        } else {
                            if uses_arpeggio
                                && note.pitches.len() > tone_index + 1
                                && tone_index == tone_count - 1
                            {
                                // The last tone slot cycles through the
                                // chord pitches the polyphony cap left
                                // out.
                                let midi_ticks_since_beat =
                                    (midi_tick_time - bar_start_time) % MIDI_TICKS_PER_BEAT;
                                let midi_ticks_per_arpeggio = rhythm.ticks_per_arpeggio as u64
                                    * MIDI_TICKS_PER_PART
                                    / config::TICKS_PER_PART as u64;
                                let arpeggio =
                                    (midi_ticks_since_beat / midi_ticks_per_arpeggio) as usize;
                                let arpeggio_pattern =
                                    rhythm.arpeggio_patterns[note.pitches.len() - 1 - tone_index];
                                next_pitch = note.pitches
                                    [tone_index + arpeggio_pattern[arpeggio % arpeggio_pattern.len()]];
                            }
                            let mut value = channel_root as f64
                                + next_pitch as f64 * interval_scale as f64
                                + pitch_offset;
                            if is_noise {
                                // Taiko-like noise presets sound an
                                // octave below their notated pitch.
                                value -= (12 * TAIKO_SUBHARMONIC_OCTAVES) as f64;
                                value *= 2.0;
                            }
                            resolved = value.round().clamp(0.0, 127.0) as u8;
                        }
                        next_pitches[tone_index] = resolved;

                        // Strict off-before-on per slot so one channel
                        // never carries two of the same pitch.
                        if !note_starting && prev_pitches[tone_index] != next_pitches[tone_index] {
                            tw.write_event_time(midi_tick_time)?;
                            tw.write_note(event::NOTE_OFF, prev_pitches[tone_index], velocity);
                        }
                    }

                    for tone_index in 0..tone_count {
                        if note_starting || prev_pitches[tone_index] != next_pitches[tone_index] {
                            tw.write_event_time(midi_tick_time)?;
                            tw.write_note(event::NOTE_ON, next_pitches[tone_index], velocity);
                            prev_pitches[tone_index] = next_pitches[tone_index];
                        }
                    }
                }

                pin_time = next_pin_time;
                pin_volume = next_pin_volume;
                pin_interval = next_pin_interval;
            }

            // End all tones.
            for tone_index in 0..tone_count {
                tw.write_event_time(note_end_time)?;
                tw.write_note(event::NOTE_OFF, prev_pitches[tone_index], velocity);
            }

            should_reset_expression_and_pitch_bend = true;
        }

        bar_start_time += midi_ticks_per_bar;
    }

    Ok(())
}
