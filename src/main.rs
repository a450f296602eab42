use clap::Parser;
use std::path::PathBuf;

use chipexport::export::{export, ExportFormat, ExportOptions};
use chipexport::song::Song;
use chipexport::synth::ChipSynth;
use chipexport::wav;

#[derive(Parser, Debug)]
#[command(name = "chipexport")]
#[command(version = "0.1.0")]
#[command(about = "Export a chiptune song to MIDI, WAV, or JSON", long_about = None)]
struct Args {
    /// Input song JSON file
    input: PathBuf,

    /// Output file (defaults to the input name with the format's extension)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "midi")]
    format: ExportFormat,

    /// Skip the bars before the loop section
    #[arg(long)]
    no_intro: bool,

    /// Skip the bars after the loop section
    #[arg(long)]
    no_outro: bool,

    /// How many times the loop section plays
    #[arg(short, long, default_value = "1", value_parser = clap::value_parser!(u32).range(1..))]
    loop_count: u32,
}

fn main() -> Result<(), chipexport::Error> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    let data = std::fs::read(&args.input)?;
    let song = Song::from_json(&data)?;

    let file_name = args
        .input
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "song".into());

    let options = ExportOptions {
        enable_intro: !args.no_intro && song.loop_start > 0,
        enable_outro: !args.no_outro && song.loop_start + song.loop_length < song.bar_count,
        loop_count: args.loop_count,
        file_name,
        format: args.format,
    };

    let mut synth = ChipSynth::new(wav::SAMPLE_RATE);
    let file = export(&song, &options, &mut synth)?;

    let output = args.output.unwrap_or_else(|| PathBuf::from(&file.name));
    std::fs::write(&output, &file.data)?;
    eprintln!("wrote {} ({} bytes, {})", output.display(), file.data.len(), file.mime);

    Ok(())
}
