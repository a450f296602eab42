pub mod config;
pub mod error;
pub mod export;
pub mod midi;
pub mod song;
pub mod synth;
pub mod wav;

pub use error::Error;
pub use export::{export, ExportFile, ExportFormat, ExportOptions};
pub use song::Song;
