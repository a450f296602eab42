//! MIDI to JSON converter

use clap::Parser;
use std::fs::File;
use std::io::Write;
use std::path::PathBuf;

use chipexport::midi::MidiFile;

#[derive(Parser, Debug)]
#[command(name = "mid2json")]
#[command(version = "0.1.0")]
#[command(about = "Convert Standard MIDI Files to JSON", long_about = None)]
struct Args {
    /// Input MIDI file
    input: PathBuf,

    /// Output JSON file (writes to stdout if not specified)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Output compact JSON (default is pretty-printed)
    #[arg(short, long)]
    compact: bool,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let data = std::fs::read(&args.input)?;

    let file = MidiFile::parse(&data)?;

    let json_string = if args.compact {
        serde_json::to_string(&file)?
    } else {
        serde_json::to_string_pretty(&file)?
    };

    match args.output {
        Some(path) => {
            let mut file = File::create(path)?;
            file.write_all(json_string.as_bytes())?;
            file.write_all(b"\n")?;
        }
        None => {
            println!("{}", json_string);
        }
    }

    Ok(())
}
