use serde::Deserialize;
use std::path::Path;

use crate::error::{AnalysisError, Result};
use crate::structure::boundaries::BoundaryStrategy;

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub analysis: AnalysisConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

/// Tunables for one analysis run. Defaults reproduce the stock pipeline.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Rate every decoded file is resampled to before analysis
    pub sample_rate: u32,
    /// STFT size shared by every spectral feature
    pub fft_size: usize,
    /// Frame stride of the structural features
    pub hop_size: usize,
    /// Frame stride of the chord chroma (finer than `hop_size`)
    pub chord_hop_size: usize,
    /// Re-aggregate features onto the beat grid when beat tracking succeeds
    pub beat_sync: bool,
    pub strategy: BoundaryStrategy,
    /// Minimum section length enforced by the boundary detector (seconds)
    pub min_segment_length: f32,
    pub post_process: bool,
    /// Sections shorter than this are merged into a neighbour (seconds)
    pub merge_threshold: f32,
    pub key_window: f32,
    pub key_change_threshold: f32,
    pub chord_window: f32,
    pub chord_threshold: f32,
    pub chord_merge_gap: f32,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            sample_rate: 22050,
            fft_size: 2048,
            hop_size: 1024,
            chord_hop_size: 512,
            beat_sync: true,
            strategy: BoundaryStrategy::Novelty,
            min_segment_length: 6.0,
            post_process: true,
            merge_threshold: 5.0,
            key_window: 10.0,
            key_change_threshold: 0.3,
            chord_window: 2.0,
            chord_threshold: 0.3,
            chord_merge_gap: 0.5,
        }
    }
}

impl AnalysisConfig {
    pub fn validate(&self) -> Result<()> {
        if self.sample_rate == 0 {
            return Err(AnalysisError::Config("sample_rate must be positive".into()));
        }
        if self.fft_size < 2 {
            return Err(AnalysisError::Config("fft_size must be at least 2".into()));
        }
        if self.hop_size == 0 || self.chord_hop_size == 0 {
            return Err(AnalysisError::Config("hop sizes must be positive".into()));
        }
        let windows = [
            ("min_segment_length", self.min_segment_length),
            ("key_window", self.key_window),
            ("chord_window", self.chord_window),
        ];
        for (name, value) in windows {
            if !(value > 0.0) {
                return Err(AnalysisError::Config(format!("{} must be positive", name)));
            }
        }
        if self.merge_threshold < 0.0 || self.chord_merge_gap < 0.0 {
            return Err(AnalysisError::Config("merge thresholds must not be negative".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_pretty")]
    pub pretty: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            pretty: default_pretty(),
        }
    }
}

fn default_pretty() -> bool { true }

pub fn load_config(path: &Path) -> Option<Config> {
    let content = std::fs::read_to_string(path).ok()?;
    match toml::from_str(&content) {
        Ok(config) => Some(config),
        Err(err) => {
            log::warn!("Invalid config {}: {}", path.display(), err);
            None
        }
    }
}
