//! Song structure: novelty curves, boundary detection, section labelling and
//! merging.

pub mod boundaries;
pub mod labeling;
pub mod novelty;
pub mod postprocess;

use serde::Serialize;

use crate::audio::features::FeatureSet;
use crate::config::AnalysisConfig;

/// A named, time-aligned section of a song.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Section {
    pub name: String,
    pub start: f32,
    pub end: f32,
    pub confidence: f32,
}

impl Section {
    pub fn duration(&self) -> f32 {
        self.end - self.start
    }
}

/// Boundaries, labels and (optionally) merging for one feature set.
pub fn analyze_structure(features: &FeatureSet, duration: f32, config: &AnalysisConfig) -> Vec<Section> {
    let boundaries = config
        .strategy
        .detect(features, duration, config.min_segment_length);
    let sections = labeling::label_sections(&boundaries, features);
    if config.post_process {
        postprocess::merge_sections(sections, config.merge_threshold)
    } else {
        sections
    }
}
