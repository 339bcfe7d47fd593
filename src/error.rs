use std::path::PathBuf;
use thiserror::Error;

/// Errors surfaced by the analysis pipeline.
///
/// Degenerate audio (silence, very short input, failed beat tracking) is not an
/// error: every stage has a fallback and still yields a valid result.
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("audio file not found: {}", .0.display())]
    InputNotFound(PathBuf),

    #[error("failed to open audio file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to decode audio: {0}")]
    Decode(#[from] symphonia::core::errors::Error),

    #[error("no audio tracks found in {}", .0.display())]
    NoAudioTrack(PathBuf),

    #[error("unknown sample rate in {}", .0.display())]
    UnknownSampleRate(PathBuf),

    #[error("resampling failed: {0}")]
    Resample(String),

    #[error("feature '{family}' has {found} frames, expected {expected}")]
    FrameMismatch {
        family: &'static str,
        expected: usize,
        found: usize,
    },

    #[error("invalid analysis configuration: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, AnalysisError>;
