//! Krumhansl-Schmuckler key estimation and windowed key-change detection.

use std::fmt;
use std::sync::OnceLock;

use serde::{Serialize, Serializer};

use super::{l1_normalize, pearson, NOTE_NAMES};
use crate::audio::features::Matrix;

const MAJOR_PROFILE: [f32; 12] = [
    6.35, 2.23, 3.48, 2.33, 4.38, 4.09, 2.52, 5.19, 2.39, 3.66, 2.29, 2.88,
];
const MINOR_PROFILE: [f32; 12] = [
    6.33, 2.68, 3.52, 5.38, 2.60, 3.53, 2.54, 4.75, 3.98, 2.69, 3.34, 3.17,
];

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Mode {
    Major,
    Minor,
}

/// A tonic pitch class plus mode. Displays as `"C major"`, `"F# minor"`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Key {
    pub tonic: usize,
    pub mode: Mode,
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mode = match self.mode {
            Mode::Major => "major",
            Mode::Minor => "minor",
        };
        write!(f, "{} {}", NOTE_NAMES[self.tonic % 12], mode)
    }
}

impl Serialize for Key {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

struct KeyProfile {
    key: Key,
    weights: [f32; 12],
}

/// Roll `profile` right by `shift` so index `shift` carries the tonic weight.
fn rotate(profile: &[f32; 12], shift: usize) -> [f32; 12] {
    let mut out = [0.0; 12];
    for (i, w) in profile.iter().enumerate() {
        out[(i + shift) % 12] = *w;
    }
    out
}

/// The 24 key profiles, majors first, each L1-normalised.
fn key_profiles() -> &'static [KeyProfile] {
    static PROFILES: OnceLock<Vec<KeyProfile>> = OnceLock::new();
    PROFILES.get_or_init(|| {
        let modes = [(Mode::Major, &MAJOR_PROFILE), (Mode::Minor, &MINOR_PROFILE)];
        modes
            .iter()
            .flat_map(|&(mode, profile)| {
                (0..12).map(move |tonic| {
                    let rotated = l1_normalize(&rotate(profile, tonic));
                    let mut weights = [0.0; 12];
                    weights.copy_from_slice(&rotated);
                    KeyProfile {
                        key: Key { tonic, mode },
                        weights,
                    }
                })
            })
            .collect()
    })
}

/// All 24 key names in profile order.
#[cfg(test)]
pub fn key_vocabulary() -> Vec<String> {
    key_profiles().iter().map(|p| p.key.to_string()).collect()
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct KeyMatch {
    pub key: Key,
    pub correlation: f32,
}

/// Best-correlated key for a 12-bin pitch-class distribution.
///
/// Undefined correlations count as zero; ties go to the first profile.
pub fn best_key(pitch_classes: &[f32]) -> KeyMatch {
    let distribution = l1_normalize(pitch_classes);
    let mut best = KeyMatch {
        key: Key {
            tonic: 0,
            mode: Mode::Major,
        },
        correlation: f32::NEG_INFINITY,
    };
    for profile in key_profiles() {
        let r = pearson(&distribution, &profile.weights);
        let r = if r.is_nan() { 0.0 } else { r };
        if r > best.correlation {
            best = KeyMatch {
                key: profile.key,
                correlation: r,
            };
        }
    }
    best
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct KeyChange {
    pub timestamp: f32,
    pub from_key: Key,
    pub to_key: Key,
    pub confidence: f32,
}

#[derive(Clone, Debug, PartialEq)]
pub struct KeyEstimate {
    pub key: Key,
    pub confidence: f32,
    pub changes: Vec<KeyChange>,
}

/// Global key plus modulations between overlapping windows.
///
/// Windows are `window` seconds long with 50% overlap and select chroma
/// frames by their timestamp. Tracks shorter than two windows report no
/// changes. A change is reported at a window's start when its key differs
/// from the previous window's and correlates above `change_threshold`.
pub fn detect_key(
    chroma: &Matrix,
    frame_times: &[f32],
    duration: f32,
    window: f32,
    change_threshold: f32,
) -> KeyEstimate {
    let overall = best_key(&chroma.row_means(0, chroma.n_cols()));
    log::debug!(
        "Global key {} (r = {:.3})",
        overall.key,
        overall.correlation
    );

    let mut changes = Vec::new();
    if window > 0.0 && duration >= 2.0 * window {
        let hop = window / 2.0;
        let mut previous: Option<Key> = None;
        let mut start = 0.0f32;
        while start + window <= duration + 1e-3 {
            let first = frame_times.partition_point(|&t| t < start);
            let last = frame_times.partition_point(|&t| t < start + window);
            if first < last {
                let local = best_key(&chroma.row_means(first, last));
                if let Some(prev) = previous {
                    if local.key != prev && local.correlation > change_threshold {
                        log::debug!("Key change {} -> {} at {:.1}s", prev, local.key, start);
                        changes.push(KeyChange {
                            timestamp: start,
                            from_key: prev,
                            to_key: local.key,
                            confidence: local.correlation.clamp(0.0, 1.0),
                        });
                    }
                }
                previous = Some(local.key);
            }
            start += hop;
        }
    }

    KeyEstimate {
        key: overall.key,
        confidence: overall.correlation.clamp(0.0, 1.0),
        changes,
    }
}
