use std::collections::BTreeMap;

use crate::audio::features::{FeatureSet, Matrix};

/// Combination weights, in `FAMILIES` order
const WEIGHTS: [f32; 4] = [0.4, 0.3, 0.2, 0.1];
pub const FAMILIES: [&str; 4] = ["harmonic", "timbral", "energy", "spectral"];

const FAMILY_SIGMA: f32 = 1.0;
const COMBINED_SIGMA: f32 = 1.5;
const EPSILON: f32 = 1e-8;

/// Per-family novelty curves in `[0, 1]`, aligned with the feature frame axis.
#[derive(Clone, Debug, Default)]
pub struct NoveltyCurves {
    pub curves: BTreeMap<&'static str, Vec<f32>>,
    pub combined: Option<Vec<f32>>,
}

impl NoveltyCurves {
    pub fn get(&self, family: &str) -> Option<&[f32]> {
        self.curves.get(family).map(|c| c.as_slice())
    }
}

pub fn compute_novelty(features: &FeatureSet) -> NoveltyCurves {
    let sources: [&Matrix; 4] = [
        &features.chroma,
        &features.timbral,
        &features.energy,
        &features.spectral,
    ];

    let mut curves = BTreeMap::new();
    for (family, matrix) in FAMILIES.iter().zip(sources) {
        curves.insert(*family, family_novelty(matrix));
    }

    let n = features.n_frames();
    let combined = if n >= 2 {
        let mut combined = vec![0.0f32; n];
        for (family, weight) in FAMILIES.iter().zip(WEIGHTS) {
            if let Some(curve) = curves.get(family).filter(|c| c.len() == n) {
                for (acc, v) in combined.iter_mut().zip(curve) {
                    *acc += weight * v;
                }
            }
        }
        Some(gaussian_filter1d(&combined, COMBINED_SIGMA))
    } else {
        None
    };

    log::debug!("Computed {} novelty functions", curves.len() + combined.is_some() as usize);
    NoveltyCurves { curves, combined }
}

/// Summed absolute first difference across rows, smoothed and peak-normalised.
///
/// `curve[t]` measures the change from frame `t - 1` into frame `t`; `curve[0]`
/// is zero. A matrix with fewer than two columns yields `[0.0]`.
pub fn family_novelty(matrix: &Matrix) -> Vec<f32> {
    let n = matrix.n_cols();
    if n < 2 {
        return vec![0.0];
    }

    let mut diff = vec![0.0f32; n];
    for row in matrix.rows() {
        for t in 1..n {
            diff[t] += (row[t] - row[t - 1]).abs();
        }
    }

    let smoothed = gaussian_filter1d(&diff, FAMILY_SIGMA);
    let max = smoothed.iter().copied().fold(0.0f32, f32::max);
    smoothed.iter().map(|v| v / (max + EPSILON)).collect()
}

/// Gaussian smoothing with reflected edges, truncated at four sigma.
pub fn gaussian_filter1d(signal: &[f32], sigma: f32) -> Vec<f32> {
    let n = signal.len();
    if n == 0 || sigma <= 0.0 {
        return signal.to_vec();
    }
    let radius = (4.0 * sigma + 0.5) as isize;
    let mut kernel: Vec<f32> = (-radius..=radius)
        .map(|x| (-0.5 * (x as f32 / sigma).powi(2)).exp())
        .collect();
    let sum: f32 = kernel.iter().sum();
    kernel.iter_mut().for_each(|k| *k /= sum);

    let reflect = |mut i: isize| -> usize {
        let n = n as isize;
        // symmetric reflection: d c b a | a b c d | d c b a
        loop {
            if i < 0 {
                i = -i - 1;
            } else if i >= n {
                i = 2 * n - i - 1;
            } else {
                return i as usize;
            }
        }
    };

    (0..n as isize)
        .map(|i| {
            kernel
                .iter()
                .enumerate()
                .map(|(k, w)| w * signal[reflect(i + k as isize - radius)])
                .sum()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::features::{N_CHROMA, N_RHYTHM, N_SPECTRAL, N_TIMBRAL};

    fn step_features(n: usize, step_at: usize) -> FeatureSet {
        let step = |rows: usize, lo: f32, hi: f32| {
            Matrix::from_rows(
                (0..rows)
                    .map(|_| (0..n).map(|t| if t < step_at { lo } else { hi }).collect())
                    .collect(),
            )
        };
        FeatureSet::new(
            step(N_CHROMA, 0.0, 1.0),
            step(N_TIMBRAL, -10.0, 5.0),
            step(N_SPECTRAL, 500.0, 2000.0),
            step(1, 0.1, 0.5),
            Matrix::zeros(N_RHYTHM, n),
            (0..n).map(|t| t as f32 * 0.5).collect(),
            120.0,
            Vec::new(),
            false,
        )
        .unwrap()
    }

    #[test]
    fn step_change_peaks_at_the_step() {
        let curves = compute_novelty(&step_features(40, 20));
        for family in FAMILIES {
            let curve = curves.get(family).unwrap();
            assert_eq!(curve.len(), 40);
            let peak = curve
                .iter()
                .enumerate()
                .max_by(|a, b| a.1.total_cmp(b.1))
                .map(|(i, _)| i)
                .unwrap();
            assert_eq!(peak, 20, "{family}");
            assert!(curve.iter().all(|v| (0.0..=1.0).contains(v)));
        }
        let combined = curves.combined.unwrap();
        assert_eq!(combined.len(), 40);
        assert!(combined[20] > combined[5]);
    }

    #[test]
    fn single_column_is_zero_curve() {
        let curve = family_novelty(&Matrix::zeros(12, 1));
        assert_eq!(curve, vec![0.0]);
    }

    #[test]
    fn constant_features_do_not_divide_by_zero() {
        let curve = family_novelty(&Matrix::filled(4, 10, 3.0));
        assert!(curve.iter().all(|v| *v == 0.0));
    }

    #[test]
    fn gaussian_preserves_constants_and_mass() {
        let smoothed = gaussian_filter1d(&[2.0; 10], 1.5);
        assert!(smoothed.iter().all(|v| (v - 2.0).abs() < 1e-5));

        let mut impulse = vec![0.0f32; 21];
        impulse[10] = 1.0;
        let smoothed = gaussian_filter1d(&impulse, 1.0);
        assert!((smoothed.iter().sum::<f32>() - 1.0).abs() < 1e-5);
        assert!(smoothed[10] > smoothed[9] && smoothed[9] > smoothed[8]);
    }
}
