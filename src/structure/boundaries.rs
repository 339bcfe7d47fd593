use serde::Deserialize;

use super::novelty::{self, NoveltyCurves};
use crate::audio::features::FeatureSet;

/// Below this many frames no boundary analysis is attempted.
pub const MIN_ANALYSIS_FRAMES: usize = 32;

const THRESHOLD_STD_FACTOR: f32 = 0.5;
const MIN_PROMINENCE: f32 = 0.1;

// Frame-comparison detector
const BASIC_WINDOW: f32 = 5.0;
const BASIC_STEP: f32 = 2.0;
const BASIC_THRESHOLD: f32 = 0.3;
const BASIC_MIN_SECTION: f32 = 12.0;

/// How section boundaries are located.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum BoundaryStrategy {
    /// Fixed-window before/after feature comparison
    Basic,
    /// Peak picking on the weighted novelty curve
    Novelty,
}

impl BoundaryStrategy {
    /// Boundary timestamps: strictly increasing, `0.0` first, `duration` last.
    pub fn detect(&self, features: &FeatureSet, duration: f32, min_segment_length: f32) -> Vec<f32> {
        let boundaries = match self {
            BoundaryStrategy::Basic => detect_boundaries_basic(features, duration),
            BoundaryStrategy::Novelty => {
                let curves = novelty::compute_novelty(features);
                detect_boundaries_novelty(&curves, &features.frame_times, duration, min_segment_length)
            }
        };
        log::info!(
            "Detected {} segments with boundaries at: {:?}",
            boundaries.len().saturating_sub(1),
            boundaries
        );
        boundaries
    }
}

/// `parts` equal-length segments spanning `[0, duration]`.
pub fn equal_split(duration: f32, parts: usize) -> Vec<f32> {
    if duration <= 0.0 {
        return vec![0.0];
    }
    let mut boundaries: Vec<f32> = (0..parts)
        .map(|i| duration * i as f32 / parts as f32)
        .collect();
    boundaries.push(duration);
    boundaries
}

fn median_frame_period(frame_times: &[f32]) -> Option<f32> {
    let mut diffs: Vec<f32> = frame_times
        .windows(2)
        .map(|w| w[1] - w[0])
        .filter(|d| *d > 0.0)
        .collect();
    if diffs.is_empty() {
        return None;
    }
    diffs.sort_by(|a, b| a.total_cmp(b));
    Some(diffs[diffs.len() / 2])
}

/// Accept candidates in order, keeping every gap (including the one to
/// `duration`) at least `min_gap` long.
fn space_boundaries(candidates: impl IntoIterator<Item = f32>, duration: f32, min_gap: f32) -> Vec<f32> {
    let mut boundaries = vec![0.0f32];
    for t in candidates {
        let last = *boundaries.last().unwrap_or(&0.0);
        if t - last >= min_gap && duration - t >= min_gap {
            boundaries.push(t);
        }
    }
    boundaries.push(duration);
    boundaries
}

pub fn detect_boundaries_novelty(
    curves: &NoveltyCurves,
    frame_times: &[f32],
    duration: f32,
    min_segment_length: f32,
) -> Vec<f32> {
    if duration <= 0.0 {
        return vec![0.0];
    }
    if frame_times.len() < MIN_ANALYSIS_FRAMES {
        log::warn!(
            "Only {} frames, using equal-thirds sectioning",
            frame_times.len()
        );
        return equal_split(duration, 3);
    }

    let usable = |c: &&[f32]| c.len() == frame_times.len() && c.iter().all(|v| v.is_finite());
    let novelty = match curves
        .combined
        .as_deref()
        .filter(usable)
        .or_else(|| curves.get("harmonic").filter(usable))
    {
        Some(curve) => curve,
        None => {
            log::warn!("No suitable novelty function found, using equal-thirds sectioning");
            return equal_split(duration, 3);
        }
    };

    let Some(frame_period) = median_frame_period(frame_times) else {
        return equal_split(duration, 3);
    };

    let n = novelty.len() as f32;
    let mean = novelty.iter().sum::<f32>() / n;
    let std = (novelty.iter().map(|v| (v - mean).powi(2)).sum::<f32>() / n).sqrt();
    let threshold = mean + THRESHOLD_STD_FACTOR * std;
    let distance = ((min_segment_length / frame_period) as usize).max(1);

    let peaks = find_peaks(
        novelty,
        &PeakOptions {
            height: threshold,
            distance,
            prominence: MIN_PROMINENCE,
        },
    );
    log::debug!(
        "Novelty threshold {:.3} (mean {:.3}, std {:.3}), distance {} frames, {} peaks",
        threshold,
        mean,
        std,
        distance,
        peaks.len()
    );

    let boundaries = space_boundaries(
        peaks.iter().map(|&p| frame_times[p]),
        duration,
        min_segment_length,
    );

    if boundaries.len() < 3 {
        log::warn!("Too few boundaries detected, using equal-thirds sectioning");
        return equal_split(duration, 3);
    }
    boundaries
}

/// Compare 5 s of features before and after candidate points every 2 s.
pub fn detect_boundaries_basic(features: &FeatureSet, duration: f32) -> Vec<f32> {
    if duration <= 0.0 {
        return vec![0.0];
    }
    let n = features.n_frames();
    if n < MIN_ANALYSIS_FRAMES {
        log::warn!("Only {} frames, using equal-quarters sectioning", n);
        return equal_split(duration, 4);
    }
    let Some(frame_period) = median_frame_period(&features.frame_times) else {
        return equal_split(duration, 4);
    };

    let window = ((BASIC_WINDOW / frame_period) as usize).max(1);
    let step = ((BASIC_STEP / frame_period) as usize).max(1);

    let mut candidates = Vec::new();
    let mut i = window;
    while i + window < n {
        let before = i - window;
        let after = i + window;

        let chroma_before = features.chroma.row_means(before, i);
        let chroma_after = features.chroma.row_means(i, after);
        let chroma_diff = chroma_before
            .iter()
            .zip(chroma_after.iter())
            .map(|(a, b)| (a - b).powi(2))
            .sum::<f32>()
            .sqrt();
        let energy_diff =
            (features.energy.row_means(before, i)[0] - features.energy.row_means(i, after)[0]).abs();
        let brightness_diff =
            (features.spectral.row_means(before, i)[0] - features.spectral.row_means(i, after)[0]).abs();

        let score = chroma_diff + energy_diff * 5.0 + brightness_diff / 1000.0;
        if score > BASIC_THRESHOLD {
            candidates.push(features.frame_times[i]);
        }
        i += step;
    }

    let boundaries = space_boundaries(candidates, duration, BASIC_MIN_SECTION);
    if boundaries.len() < 3 {
        return equal_split(duration, 3);
    }
    boundaries
}

#[derive(Debug, Clone)]
pub struct PeakOptions {
    /// Minimum peak value
    pub height: f32,
    /// Minimum spacing between peaks, in samples
    pub distance: usize,
    pub prominence: f32,
}

/// Local maxima filtered by height, spacing and prominence, in that order.
/// Plateaus report their middle sample.
pub fn find_peaks(x: &[f32], opts: &PeakOptions) -> Vec<usize> {
    let n = x.len();
    if n < 3 {
        return Vec::new();
    }

    let mut peaks = Vec::new();
    let mut i = 1;
    while i < n - 1 {
        if x[i - 1] < x[i] {
            let mut ahead = i + 1;
            while ahead < n - 1 && x[ahead] == x[i] {
                ahead += 1;
            }
            if x[ahead] < x[i] {
                peaks.push((i + ahead - 1) / 2);
                i = ahead;
                continue;
            }
        }
        i += 1;
    }

    peaks.retain(|&p| x[p] >= opts.height);

    if opts.distance > 1 && peaks.len() > 1 {
        let mut keep = vec![true; peaks.len()];
        let mut order: Vec<usize> = (0..peaks.len()).collect();
        order.sort_by(|&a, &b| x[peaks[b]].total_cmp(&x[peaks[a]]).then(a.cmp(&b)));
        for &j in &order {
            if !keep[j] {
                continue;
            }
            for k in (0..j).rev() {
                if peaks[j] - peaks[k] >= opts.distance {
                    break;
                }
                keep[k] = false;
            }
            for k in j + 1..peaks.len() {
                if peaks[k] - peaks[j] >= opts.distance {
                    break;
                }
                keep[k] = false;
            }
        }
        peaks = peaks
            .into_iter()
            .zip(keep)
            .filter_map(|(p, k)| k.then_some(p))
            .collect();
    }

    peaks.retain(|&p| prominence(x, p) >= opts.prominence);
    peaks
}

/// Height of a peak above the higher of its two surrounding minima.
fn prominence(x: &[f32], peak: usize) -> f32 {
    let height = x[peak];

    let mut left_min = height;
    for &v in x[..peak].iter().rev() {
        if v > height {
            break;
        }
        left_min = left_min.min(v);
    }

    let mut right_min = height;
    for &v in &x[peak + 1..] {
        if v > height {
            break;
        }
        right_min = right_min.min(v);
    }

    height - left_min.max(right_min)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_valid(boundaries: &[f32], duration: f32) {
        assert_eq!(boundaries[0], 0.0);
        assert!((boundaries[boundaries.len() - 1] - duration).abs() < 1e-4);
        assert!(boundaries.windows(2).all(|w| w[1] > w[0]));
    }

    fn curves_from(combined: Vec<f32>) -> NoveltyCurves {
        NoveltyCurves {
            curves: Default::default(),
            combined: Some(combined),
        }
    }

    fn bump_curve(n: usize, centers: &[usize]) -> Vec<f32> {
        (0..n)
            .map(|i| {
                centers
                    .iter()
                    .map(|&c| (-0.5 * ((i as f32 - c as f32) / 2.0).powi(2)).exp())
                    .fold(0.0f32, f32::max)
            })
            .collect()
    }

    #[test]
    fn equal_split_spans_duration() {
        assert_eq!(equal_split(60.0, 3), vec![0.0, 20.0, 40.0, 60.0]);
        assert_eq!(equal_split(8.0, 4), vec![0.0, 2.0, 4.0, 6.0, 8.0]);
        assert_eq!(equal_split(0.0, 3), vec![0.0]);
    }

    #[test]
    fn picks_novelty_peaks() {
        // 0.5 s frames, 120 frames = 60 s, bumps at 10/25/40/50 s
        let frame_times: Vec<f32> = (0..120).map(|i| i as f32 * 0.5).collect();
        let curves = curves_from(bump_curve(120, &[20, 50, 80, 100]));
        let boundaries = detect_boundaries_novelty(&curves, &frame_times, 60.0, 6.0);
        assert_eq!(boundaries, vec![0.0, 10.0, 25.0, 40.0, 50.0, 60.0]);
    }

    #[test]
    fn enforces_minimum_gaps() {
        let frame_times: Vec<f32> = (0..120).map(|i| i as f32 * 0.5).collect();
        // bumps at 2 s (too close to start) and 58 s (too close to end)
        let curves = curves_from(bump_curve(120, &[4, 40, 116]));
        let boundaries = detect_boundaries_novelty(&curves, &frame_times, 60.0, 6.0);
        assert_valid(&boundaries, 60.0);
        assert!(boundaries.windows(2).all(|w| w[1] - w[0] >= 6.0));
    }

    #[test]
    fn short_input_falls_back_to_thirds() {
        let frame_times: Vec<f32> = (0..10).map(|i| i as f32).collect();
        let curves = curves_from(vec![0.0; 10]);
        assert_eq!(
            detect_boundaries_novelty(&curves, &frame_times, 9.0, 6.0),
            vec![0.0, 3.0, 6.0, 9.0]
        );
    }

    #[test]
    fn flat_curve_falls_back_to_thirds() {
        let frame_times: Vec<f32> = (0..100).map(|i| i as f32 * 0.5).collect();
        let curves = curves_from(vec![0.0; 100]);
        assert_eq!(
            detect_boundaries_novelty(&curves, &frame_times, 60.0, 6.0),
            vec![0.0, 20.0, 40.0, 60.0]
        );
    }

    #[test]
    fn missing_curves_fall_back_to_thirds() {
        let frame_times: Vec<f32> = (0..100).map(|i| i as f32 * 0.5).collect();
        let boundaries = detect_boundaries_novelty(&NoveltyCurves::default(), &frame_times, 30.0, 6.0);
        assert_eq!(boundaries, vec![0.0, 10.0, 20.0, 30.0]);
    }

    #[test]
    fn find_peaks_height_distance_prominence() {
        let x = [0.0, 1.0, 0.0, 0.5, 0.0, 0.9, 0.85, 0.9, 0.0, 0.2, 0.15, 0.2, 0.0];
        let all = find_peaks(&x, &PeakOptions { height: 0.0, distance: 1, prominence: 0.0 });
        assert_eq!(all, vec![1, 3, 5, 7, 9, 11]);

        let tall = find_peaks(&x, &PeakOptions { height: 0.6, distance: 1, prominence: 0.0 });
        assert_eq!(tall, vec![1, 5, 7]);

        let spaced = find_peaks(&x, &PeakOptions { height: 0.6, distance: 3, prominence: 0.0 });
        assert_eq!(spaced, vec![1, 5]);

        let prominent = find_peaks(&x, &PeakOptions { height: 0.0, distance: 1, prominence: 0.3 });
        assert_eq!(prominent, vec![1, 3, 5, 7]);
    }

    /// `n` frames every 0.5 s; chroma is pure C, switching to pure G at `switch`.
    fn stepped_features(n: usize, switch: Option<usize>) -> FeatureSet {
        use crate::audio::features::{Matrix, N_CHROMA, N_RHYTHM, N_SPECTRAL, N_TIMBRAL};

        let columns: Vec<Vec<f32>> = (0..n)
            .map(|i| {
                let mut c = vec![0.0; N_CHROMA];
                let pc = if switch.is_some_and(|s| i >= s) { 7 } else { 0 };
                c[pc] = 1.0;
                c
            })
            .collect();
        FeatureSet::new(
            Matrix::from_columns(&columns, N_CHROMA),
            Matrix::zeros(N_TIMBRAL, n),
            Matrix::filled(N_SPECTRAL, n, 1000.0),
            Matrix::filled(1, n, 0.2),
            Matrix::zeros(N_RHYTHM, n),
            (0..n).map(|i| i as f32 * 0.5).collect(),
            120.0,
            Vec::new(),
            false,
        )
        .unwrap()
    }

    #[test]
    fn basic_finds_chroma_step() {
        // switch at 30 s; the first 2 s-step window to see it is centred on 27 s
        let features = stepped_features(120, Some(60));
        let boundaries = BoundaryStrategy::Basic.detect(&features, 60.0, 6.0);
        assert_eq!(boundaries, vec![0.0, 27.0, 60.0]);
    }

    #[test]
    fn basic_short_input_uses_quarters() {
        let features = stepped_features(20, Some(10));
        assert_eq!(
            detect_boundaries_basic(&features, 10.0),
            vec![0.0, 2.5, 5.0, 7.5, 10.0]
        );
    }

    #[test]
    fn basic_flat_input_uses_thirds() {
        let features = stepped_features(120, None);
        assert_eq!(
            detect_boundaries_basic(&features, 60.0),
            vec![0.0, 20.0, 40.0, 60.0]
        );
    }

    #[test]
    fn plateau_reports_middle() {
        let x = [0.0, 1.0, 1.0, 1.0, 0.0];
        let peaks = find_peaks(&x, &PeakOptions { height: 0.0, distance: 1, prominence: 0.0 });
        assert_eq!(peaks, vec![2]);
    }
}
