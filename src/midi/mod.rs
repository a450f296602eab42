pub mod constants;
pub mod encoder;
pub mod reader;
pub mod writer;

pub use encoder::encode;
pub use reader::{MidiEvent, MidiFile, MidiReader, TimedEvent};
pub use writer::ByteWriter;
