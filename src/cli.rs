use clap::Parser;
use std::path::PathBuf;

use sectionist::structure::boundaries::BoundaryStrategy;

#[derive(Parser, Debug)]
#[command(name = "sectionist", about = "Song structure, key and chord analysis")]
pub struct Cli {
    /// Input audio files (WAV, MP3, FLAC, OGG, M4A, AAC, AIFF)
    pub files: Vec<PathBuf>,

    /// Config file (defaults to sectionist.toml or the user config dir)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Write the JSON report here instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Single-line JSON
    #[arg(long)]
    pub compact: bool,

    /// Minimum section length in seconds
    #[arg(long)]
    pub min_segment: Option<f32>,

    /// Boundary detection strategy
    #[arg(long, value_enum)]
    pub strategy: Option<BoundaryStrategy>,

    /// Keep raw labelled sections without merging
    #[arg(long)]
    pub no_post_process: bool,

    /// List supported audio formats and exit
    #[arg(long)]
    pub formats: bool,
}
