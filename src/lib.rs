//! Song structure, key and chord analysis for audio files.
//!
//! [`analyze`] decodes a file, extracts frame-level features and returns an
//! [`AnalysisResult`] with labelled sections, the global key and any key
//! changes, a chord timeline and the estimated tempo.

pub mod analyzer;
pub mod audio;
pub mod config;
pub mod error;
pub mod harmony;
pub mod structure;

pub use analyzer::{analyze, analyze_waveform, analyze_with_config, AnalysisResult};
pub use config::{AnalysisConfig, Config};
pub use error::{AnalysisError, Result};
