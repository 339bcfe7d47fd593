//! Triad recognition over fixed windows of a finer-hop chromagram.

use std::sync::OnceLock;

use serde::Serialize;

use super::{cosine_similarity, l1_normalize, NOTE_NAMES};
use crate::audio::decode::Waveform;
use crate::audio::extract::chromagram;
use crate::audio::features::Matrix;
use crate::audio::stft;
use crate::config::AnalysisConfig;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Chord {
    pub name: String,
    pub start: f32,
    pub end: f32,
    pub confidence: f32,
}

struct ChordTemplate {
    name: String,
    weights: [f32; 12],
}

/// Binary major and minor triads on all 12 roots: `"C"`, `"Cm"`, `"C#"`, ...
fn chord_templates() -> &'static [ChordTemplate] {
    static TEMPLATES: OnceLock<Vec<ChordTemplate>> = OnceLock::new();
    TEMPLATES.get_or_init(|| {
        let mut templates = Vec::with_capacity(24);
        for (root, note) in NOTE_NAMES.iter().enumerate() {
            for (third, suffix) in [(4, ""), (3, "m")] {
                let mut weights = [0.0; 12];
                for interval in [0, third, 7] {
                    weights[(root + interval) % 12] = 1.0;
                }
                templates.push(ChordTemplate {
                    name: format!("{note}{suffix}"),
                    weights,
                });
            }
        }
        templates
    })
}

#[cfg(test)]
pub fn chord_vocabulary() -> Vec<&'static str> {
    chord_templates().iter().map(|t| t.name.as_str()).collect()
}

/// Best template for one pitch-class vector, if it clears `threshold`.
fn match_chord(pitch_classes: &[f32], threshold: f32) -> Option<(&'static str, f32)> {
    let distribution = l1_normalize(pitch_classes);
    let (name, score) = chord_templates()
        .iter()
        .map(|t| (t.name.as_str(), cosine_similarity(&distribution, &t.weights)))
        .fold(("", f32::NEG_INFINITY), |best, candidate| {
            if candidate.1 > best.1 {
                candidate
            } else {
                best
            }
        });
    (score > threshold).then_some((name, score))
}

/// Chords for a whole waveform, computed on the `chord_hop_size` grid.
pub fn detect_chords(waveform: &Waveform, config: &AnalysisConfig) -> Vec<Chord> {
    let spec = stft::stft(
        &waveform.samples,
        waveform.sample_rate,
        config.fft_size,
        config.chord_hop_size,
    );
    let chroma = chromagram(&spec);
    let frame_times: Vec<f32> = (0..spec.n_frames()).map(|f| spec.frame_time(f)).collect();

    let chords = detect_chords_in_chroma(
        &chroma,
        &frame_times,
        waveform.duration(),
        config.chord_window,
        config.chord_threshold,
    );
    let chords = merge_chords(chords, config.chord_merge_gap);
    log::debug!("Detected {} chord segments", chords.len());
    chords
}

/// One candidate per `window` seconds; windows whose best match does not
/// exceed `threshold` produce nothing.
pub fn detect_chords_in_chroma(
    chroma: &Matrix,
    frame_times: &[f32],
    duration: f32,
    window: f32,
    threshold: f32,
) -> Vec<Chord> {
    let mut chords = Vec::new();
    if window <= 0.0 {
        return chords;
    }

    let mut start = 0.0f32;
    while start < duration {
        let end = (start + window).min(duration);
        let first = frame_times.partition_point(|&t| t < start);
        let last = frame_times.partition_point(|&t| t < start + window);
        if first < last {
            if let Some((name, confidence)) = match_chord(&chroma.row_means(first, last), threshold) {
                chords.push(Chord {
                    name: name.to_string(),
                    start,
                    end,
                    confidence,
                });
            }
        }
        start += window;
    }
    chords
}

/// Fuse neighbouring chords with the same name separated by less than
/// `max_gap` seconds. The fused confidence is the mean of the pair.
pub fn merge_chords(chords: Vec<Chord>, max_gap: f32) -> Vec<Chord> {
    let mut merged: Vec<Chord> = Vec::with_capacity(chords.len());
    for chord in chords {
        match merged.last_mut() {
            Some(prev) if prev.name == chord.name && chord.start - prev.end < max_gap => {
                prev.end = chord.end;
                prev.confidence = (prev.confidence + chord.confidence) / 2.0;
            }
            _ => merged.push(chord),
        }
    }
    merged
}
