//! Standard MIDI File reader
//!
//! Parses the files the encoder produces back into an event model. Used
//! by the integration tests to verify output and by the `mid2json`
//! diagnostic tool.

use super::constants::{chunk, control, event, meta};
use crate::error::{Error, Result};
use serde::Serialize;

/// Parsed SMF header chunk.
#[derive(Debug, Clone, Serialize)]
pub struct MidiHeader {
    pub format: u16,
    pub track_count: u16,
    pub ticks_per_beat: u16,
}

/// A parsed MIDI event.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum MidiEvent {
    NoteOff { channel: u8, pitch: u8, velocity: u8 },
    NoteOn { channel: u8, pitch: u8, velocity: u8 },
    ControlChange { channel: u8, controller: u8, value: u8 },
    ProgramChange { channel: u8, program: u8 },
    PitchBend { channel: u8, value: u16 },
    Text { text: String },
    TrackName { text: String },
    InstrumentName { text: String },
    Marker { text: String },
    Tempo { microseconds_per_beat: u32 },
    TimeSignature { numerator: u8, denominator_exponent: u8 },
    KeySignature { sharps: i8, minor: bool },
    EndOfTrack,
    OtherMeta { message: u8, data: Vec<u8> },
}

/// An event with its absolute time in MIDI ticks.
#[derive(Debug, Clone, Serialize)]
pub struct TimedEvent {
    pub time: u64,
    #[serde(flatten)]
    pub event: MidiEvent,
}

/// A fully parsed MIDI file.
#[derive(Debug, Clone, Serialize)]
pub struct MidiFile {
    pub header: MidiHeader,
    pub tracks: Vec<Vec<TimedEvent>>,
}

impl MidiFile {
    /// Parse a complete Standard MIDI File.
    pub fn parse(data: &[u8]) -> Result<Self> {
        let mut reader = MidiReader::new(data);
        let header = reader.parse_header()?;
        let mut tracks = Vec::with_capacity(header.track_count as usize);
        for _ in 0..header.track_count {
            tracks.push(reader.parse_track()?);
        }
        Ok(Self { header, tracks })
    }
}

/// Cursor over raw SMF bytes.
pub struct MidiReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> MidiReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn read_u8(&mut self) -> Result<u8> {
        if self.pos >= self.data.len() {
            return Err(Error::MidiParse("unexpected end of data".into()));
        }
        let b = self.data[self.pos];
        self.pos += 1;
        Ok(b)
    }

    fn read_u16_be(&mut self) -> Result<u16> {
        let hi = self.read_u8()? as u16;
        let lo = self.read_u8()? as u16;
        Ok((hi << 8) | lo)
    }

    fn read_u24_be(&mut self) -> Result<u32> {
        let b0 = self.read_u8()? as u32;
        let b1 = self.read_u8()? as u32;
        let b2 = self.read_u8()? as u32;
        Ok((b0 << 16) | (b1 << 8) | b2)
    }

    fn read_u32_be(&mut self) -> Result<u32> {
        let hi = self.read_u16_be()? as u32;
        let lo = self.read_u16_be()? as u32;
        Ok((hi << 16) | lo)
    }

    fn read_bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        if self.pos + len > self.data.len() {
            return Err(Error::MidiParse("unexpected end of data".into()));
        }
        let bytes = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(bytes)
    }

    /// Read a variable-length quantity.
    fn read_variable_length(&mut self) -> Result<u64> {
        let mut value: u64 = 0;
        loop {
            let byte = self.read_u8()?;
            value = (value << 7) | (byte & 0x7F) as u64;
            if byte & 0x80 == 0 {
                return Ok(value);
            }
        }
    }

    /// Parse the MThd chunk.
    pub fn parse_header(&mut self) -> Result<MidiHeader> {
        if self.read_u32_be()? != chunk::HEADER {
            return Err(Error::MidiParse("missing MThd chunk".into()));
        }
        let length = self.read_u32_be()?;
        if length != 6 {
            return Err(Error::MidiParse(format!("unexpected header length {length}")));
        }
        Ok(MidiHeader {
            format: self.read_u16_be()?,
            track_count: self.read_u16_be()?,
            ticks_per_beat: self.read_u16_be()?,
        })
    }

    /// Parse one MTrk chunk into absolute-time events.
    pub fn parse_track(&mut self) -> Result<Vec<TimedEvent>> {
        if self.read_u32_be()? != chunk::TRACK {
            return Err(Error::MidiParse("missing MTrk chunk".into()));
        }
        let length = self.read_u32_be()? as usize;
        let track_end = self.pos + length;
        if track_end > self.data.len() {
            return Err(Error::MidiParse("track chunk overruns file".into()));
        }

        let mut events = Vec::new();
        let mut time: u64 = 0;
        while self.pos < track_end {
            time += self.read_variable_length()?;
            let status = self.read_u8()?;
            let parsed = if status == event::META {
                self.parse_meta_event()?
            } else {
                self.parse_channel_event(status)?
            };
            let end_of_track = parsed == MidiEvent::EndOfTrack;
            events.push(TimedEvent { time, event: parsed });
            if end_of_track {
                break;
            }
        }
        if self.pos != track_end {
            return Err(Error::MidiParse("track length does not match contents".into()));
        }
        Ok(events)
    }

    fn parse_meta_event(&mut self) -> Result<MidiEvent> {
        let message = self.read_u8()? & 0x7F;
        let length = self.read_variable_length()? as usize;
        let data = self.read_bytes(length)?;
        let text = || String::from_utf8_lossy(data).into_owned();
        Ok(match message {
            meta::TEXT => MidiEvent::Text { text: text() },
            meta::TRACK_NAME => MidiEvent::TrackName { text: text() },
            meta::INSTRUMENT_NAME => MidiEvent::InstrumentName { text: text() },
            meta::MARKER => MidiEvent::Marker { text: text() },
            meta::END_OF_TRACK => MidiEvent::EndOfTrack,
            meta::TEMPO if data.len() == 3 => MidiEvent::Tempo {
                microseconds_per_beat: ((data[0] as u32) << 16) | ((data[1] as u32) << 8) | data[2] as u32,
            },
            meta::TIME_SIGNATURE if data.len() == 4 => MidiEvent::TimeSignature {
                numerator: data[0],
                denominator_exponent: data[1],
            },
            meta::KEY_SIGNATURE if data.len() == 2 => MidiEvent::KeySignature {
                sharps: data[0] as i8,
                minor: data[1] != 0,
            },
            _ => MidiEvent::OtherMeta { message, data: data.to_vec() },
        })
    }

    fn parse_channel_event(&mut self, status: u8) -> Result<MidiEvent> {
        let channel = status & 0x0F;
        Ok(match status & 0xF0 {
            event::NOTE_OFF => MidiEvent::NoteOff {
                channel,
                pitch: self.read_u8()?,
                velocity: self.read_u8()?,
            },
            event::NOTE_ON => MidiEvent::NoteOn {
                channel,
                pitch: self.read_u8()?,
                velocity: self.read_u8()?,
            },
            event::CONTROL_CHANGE => MidiEvent::ControlChange {
                channel,
                controller: self.read_u8()?,
                value: self.read_u8()?,
            },
            event::PROGRAM_CHANGE => MidiEvent::ProgramChange { channel, program: self.read_u8()? },
            event::PITCH_BEND => {
                let lsb = self.read_u8()? as u16;
                let msb = self.read_u8()? as u16;
                MidiEvent::PitchBend { channel, value: (msb << 7) | lsb }
            }
            _ => {
                return Err(Error::MidiParse(format!("unsupported status byte 0x{status:02X}")));
            }
        })
    }
}

impl MidiEvent {
    /// The controller number when this is a control change.
    pub fn controller(&self) -> Option<u8> {
        match self {
            MidiEvent::ControlChange { controller, .. } => Some(*controller),
            _ => None,
        }
    }

    pub fn is_expression(&self) -> bool {
        self.controller() == Some(control::EXPRESSION_MSB)
    }
}
