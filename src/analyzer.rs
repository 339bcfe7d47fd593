use serde::Serialize;
use std::path::Path;

use crate::audio::decode::{self, Waveform};
use crate::audio::extract::extract_features;
use crate::config::AnalysisConfig;
use crate::error::{AnalysisError, Result};
use crate::harmony::chords::{self, Chord};
use crate::harmony::key::{self, Key, KeyChange};
use crate::structure::{self, Section};

/// Everything one analysis run reports about a track.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AnalysisResult {
    pub duration: f32,
    pub tempo: f32,
    pub key: Key,
    pub key_changes: Vec<KeyChange>,
    pub sections: Vec<Section>,
    pub beats_detected: usize,
    pub chords: Vec<Chord>,
}

/// Analyse an audio file with the default configuration.
pub fn analyze(path: &Path) -> Result<AnalysisResult> {
    analyze_with_config(path, &AnalysisConfig::default())
}

/// Decode, resample and analyse an audio file.
pub fn analyze_with_config(path: &Path, config: &AnalysisConfig) -> Result<AnalysisResult> {
    if !path.exists() {
        return Err(AnalysisError::InputNotFound(path.to_path_buf()));
    }
    config.validate()?;

    log::info!("Analyzing {}", path.display());
    let waveform = decode::decode_audio(path)?;
    let waveform = decode::resample(waveform, config.sample_rate)?;
    analyze_waveform(&waveform, config)
}

/// Run the full pipeline on an already-decoded mono waveform.
///
/// The waveform is analysed at its own sample rate; callers that want the
/// configured analysis rate resample first.
pub fn analyze_waveform(waveform: &Waveform, config: &AnalysisConfig) -> Result<AnalysisResult> {
    config.validate()?;
    let duration = waveform.duration();
    let features = extract_features(waveform, config)?;

    let (sections, (key_estimate, chords)) = rayon::join(
        || structure::analyze_structure(&features, duration, config),
        || {
            rayon::join(
                || {
                    key::detect_key(
                        &features.chroma,
                        &features.frame_times,
                        duration,
                        config.key_window,
                        config.key_change_threshold,
                    )
                },
                || chords::detect_chords(waveform, config),
            )
        },
    );

    log::info!(
        "Key: {} ({} changes), {} sections, {} chords",
        key_estimate.key,
        key_estimate.changes.len(),
        sections.len(),
        chords.len()
    );

    // Spans shorter than the rounding step collapse to start == end and are dropped.
    Ok(AnalysisResult {
        duration: round_to(duration, 2),
        tempo: round_to(features.tempo_bpm, 1),
        key: key_estimate.key,
        key_changes: key_estimate
            .changes
            .into_iter()
            .map(|change| KeyChange {
                timestamp: round_to(change.timestamp, 2),
                confidence: round_to(change.confidence, 2),
                ..change
            })
            .collect(),
        sections: sections
            .into_iter()
            .map(|section| Section {
                start: round_to(section.start, 2),
                end: round_to(section.end, 2),
                confidence: round_to(section.confidence, 2),
                ..section
            })
            .filter(|section| section.end > section.start)
            .collect(),
        beats_detected: features.beat_times.len(),
        chords: chords
            .into_iter()
            .map(|chord| Chord {
                start: round_to(chord.start, 2),
                end: round_to(chord.end, 2),
                confidence: round_to(chord.confidence, 2),
                ..chord
            })
            .filter(|chord| chord.end > chord.start)
            .collect(),
    })
}

fn round_to(value: f32, decimals: i32) -> f32 {
    let scale = 10f32.powi(decimals);
    (value * scale).round() / scale
}
