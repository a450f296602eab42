use std::io;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Midi event time cannot go backwards: {time} after {prev}")]
    EventTimeBackwards { time: u64, prev: u64 },

    #[error("Miscalculated number of bars: meta track covers {actual} midi ticks, timeline has {expected}")]
    BarLengthMismatch { expected: u64, actual: u64 },

    #[error("Midi control event value out of range: {0}")]
    ControlValueOutOfRange(i64),

    #[error("Could not find corresponding drumset pitch: {0}")]
    UnmappedDrumPitch(i32),

    #[error("Unsupported sample size: {0} bytes")]
    UnsupportedSampleWidth(u32),

    #[error("Song format error: {0}")]
    SongFormat(String),

    #[error("Midi parse error: {0}")]
    MidiParse(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
