use rayon::prelude::*;

use super::beats::{self, BeatTrack, DEFAULT_TEMPO};
use super::decode::Waveform;
use super::features::{FeatureSet, Matrix, N_CHROMA, N_RHYTHM, N_TIMBRAL};
use super::stft::{self, Spectrogram};
use crate::config::AnalysisConfig;
use crate::error::Result;

/// Lowest / highest frequencies folded into chroma (C1 .. ~D#8)
const CHROMA_FMIN: f32 = 32.7;
const CHROMA_FMAX: f32 = 5000.0;

const N_MELS: usize = 40;
const TOP_DB: f32 = 80.0;
const ROLLOFF_PERCENT: f32 = 0.85;

/// Autocorrelation window of the tempogram, in frames
const TEMPOGRAM_WINDOW: usize = 384;

/// How feature columns map onto time. Chosen once per run and applied to
/// every feature family.
#[derive(Clone, Debug)]
pub enum FrameAlignment {
    Uniform,
    BeatSynchronous {
        intervals: Vec<(usize, usize)>,
        track: BeatTrack,
    },
}

impl FrameAlignment {
    fn select(envelope: &[f32], n_frames: usize, frame_rate: f32, enabled: bool) -> Self {
        if !enabled {
            return FrameAlignment::Uniform;
        }
        match beats::track_beats(envelope, frame_rate) {
            Some(track) => {
                let intervals = beats::beat_intervals(&track.beat_frames, n_frames);
                log::info!(
                    "Tempo: {:.1} BPM, {} beats detected",
                    track.tempo_bpm,
                    track.beat_frames.len()
                );
                FrameAlignment::BeatSynchronous { intervals, track }
            }
            None => {
                log::warn!(
                    "Beat tracking failed, using frame-based analysis at {:.0} BPM default",
                    DEFAULT_TEMPO
                );
                FrameAlignment::Uniform
            }
        }
    }

    fn apply(&self, matrix: Matrix) -> Matrix {
        match self {
            FrameAlignment::Uniform => matrix,
            FrameAlignment::BeatSynchronous { intervals, .. } => beats::sync_median(&matrix, intervals),
        }
    }

    fn frame_times(&self, n_frames: usize, hop_size: usize, sample_rate: u32) -> Vec<f32> {
        match self {
            FrameAlignment::Uniform => (0..n_frames)
                .map(|f| stft::frame_time(f, hop_size, sample_rate))
                .collect(),
            FrameAlignment::BeatSynchronous { intervals, .. } => intervals
                .iter()
                .map(|&(start, _)| stft::frame_time(start, hop_size, sample_rate))
                .collect(),
        }
    }
}

/// Extract every feature family on the structural frame grid.
///
/// Never fails on degenerate audio: silence or very short input still yields a
/// `FeatureSet` with at least one column.
pub fn extract_features(waveform: &Waveform, config: &AnalysisConfig) -> Result<FeatureSet> {
    let samples = &waveform.samples;
    let sr = waveform.sample_rate;
    let spec = stft::stft(samples, sr, config.fft_size, config.hop_size);
    let n_frames = spec.n_frames();
    let frame_rate = sr as f32 / config.hop_size as f32;

    let (chroma, (timbral, (spectral, energy))) = rayon::join(
        || chromagram(&spec),
        || {
            rayon::join(
                || mfcc(&spec, N_TIMBRAL),
                || {
                    rayon::join(
                        || spectral_features(&spec, samples),
                        || rms_energy(samples, config.fft_size, config.hop_size),
                    )
                },
            )
        },
    );

    let envelope = beats::onset_envelope(&spec);
    let (rhythm, alignment) = rayon::join(
        || tempogram(&envelope, N_RHYTHM),
        || FrameAlignment::select(&envelope, n_frames, frame_rate, config.beat_sync),
    );

    let frame_times = alignment.frame_times(n_frames, config.hop_size, sr);
    let (tempo_bpm, beat_times, beat_synchronous) = match &alignment {
        FrameAlignment::Uniform => (DEFAULT_TEMPO, Vec::new(), false),
        FrameAlignment::BeatSynchronous { track, .. } => {
            (track.tempo_bpm, track.beat_times.clone(), true)
        }
    };

    let features = FeatureSet::new(
        alignment.apply(chroma),
        alignment.apply(timbral),
        alignment.apply(spectral),
        alignment.apply(energy),
        alignment.apply(rhythm),
        frame_times,
        tempo_bpm,
        beat_times,
        beat_synchronous,
    )?;

    log::info!(
        "Extracted features with {} time frames (beat-synchronous: {})",
        features.n_frames(),
        features.beat_synchronous
    );
    Ok(features)
}

fn pitch_class(freq: f32) -> usize {
    let midi = 69.0 + 12.0 * (freq / 440.0).log2();
    (midi.round() as i64).rem_euclid(12) as usize
}

/// 12-bin chroma (C = 0), each frame scaled so its strongest bin is 1.
/// Silent frames stay all-zero.
pub fn chromagram(spec: &Spectrogram) -> Matrix {
    let bin_classes: Vec<Option<usize>> = (0..spec.n_bins())
        .map(|k| {
            let f = spec.bin_frequency(k);
            (CHROMA_FMIN..=CHROMA_FMAX).contains(&f).then(|| pitch_class(f))
        })
        .collect();

    let columns: Vec<Vec<f32>> = spec
        .magnitudes
        .par_iter()
        .map(|frame| {
            let mut chroma = vec![0.0f32; N_CHROMA];
            for (mag, class) in frame.iter().zip(bin_classes.iter()) {
                if let Some(c) = class {
                    chroma[*c] += mag * mag;
                }
            }
            let max = chroma.iter().copied().fold(0.0f32, f32::max);
            if max > 0.0 {
                chroma.iter_mut().for_each(|v| *v /= max);
            }
            chroma
        })
        .collect();

    Matrix::from_columns(&columns, N_CHROMA)
}

struct MelFilter {
    start: usize,
    weights: Vec<f32>,
}

fn hz_to_mel(f: f32) -> f32 {
    2595.0 * (1.0 + f / 700.0).log10()
}

fn mel_to_hz(m: f32) -> f32 {
    700.0 * (10f32.powf(m / 2595.0) - 1.0)
}

fn mel_filterbank(spec: &Spectrogram, n_mels: usize) -> Vec<MelFilter> {
    let max_mel = hz_to_mel(spec.sample_rate as f32 / 2.0);
    let edges: Vec<f32> = (0..n_mels + 2)
        .map(|i| mel_to_hz(max_mel * i as f32 / (n_mels + 1) as f32))
        .collect();

    (0..n_mels)
        .map(|m| {
            let (lower, center, upper) = (edges[m], edges[m + 1], edges[m + 2]);
            let weights: Vec<(usize, f32)> = (0..spec.n_bins())
                .filter_map(|k| {
                    let f = spec.bin_frequency(k);
                    let w = if f > lower && f <= center {
                        (f - lower) / (center - lower)
                    } else if f > center && f < upper {
                        (upper - f) / (upper - center)
                    } else {
                        0.0
                    };
                    (w > 0.0).then_some((k, w))
                })
                .collect();
            let start = weights.first().map_or(0, |&(k, _)| k);
            MelFilter {
                start,
                weights: weights.into_iter().map(|(_, w)| w).collect(),
            }
        })
        .collect()
}

/// Mel-cepstral timbre coefficients (log-mel energies through an orthonormal DCT-II).
pub fn mfcc(spec: &Spectrogram, n_coefficients: usize) -> Matrix {
    let filters = mel_filterbank(spec, N_MELS);

    let log_mel: Vec<Vec<f32>> = spec
        .magnitudes
        .par_iter()
        .map(|frame| {
            filters
                .iter()
                .map(|filter| {
                    let energy: f32 = filter
                        .weights
                        .iter()
                        .enumerate()
                        .map(|(i, w)| {
                            let mag = frame[filter.start + i];
                            w * mag * mag
                        })
                        .sum();
                    10.0 * energy.max(1e-10).log10()
                })
                .collect()
        })
        .collect();

    let global_max = log_mel
        .iter()
        .flat_map(|frame| frame.iter().copied())
        .fold(f32::NEG_INFINITY, f32::max);
    let floor = global_max - TOP_DB;

    let n = N_MELS as f32;
    let basis: Vec<Vec<f32>> = (0..n_coefficients)
        .map(|k| {
            let scale = if k == 0 { (1.0 / n).sqrt() } else { (2.0 / n).sqrt() };
            (0..N_MELS)
                .map(|i| {
                    scale
                        * (std::f32::consts::PI * k as f32 * (2 * i + 1) as f32 / (2.0 * n)).cos()
                })
                .collect()
        })
        .collect();

    let columns: Vec<Vec<f32>> = log_mel
        .iter()
        .map(|frame| {
            basis
                .iter()
                .map(|b| b.iter().zip(frame.iter()).map(|(c, &v)| c * v.max(floor)).sum())
                .collect()
        })
        .collect();

    Matrix::from_columns(&columns, n_coefficients)
}

/// Rows: spectral centroid, 85% rolloff, bandwidth (all Hz), zero-crossing rate.
pub fn spectral_features(spec: &Spectrogram, samples: &[f32]) -> Matrix {
    let freqs: Vec<f32> = (0..spec.n_bins()).map(|k| spec.bin_frequency(k)).collect();

    let columns: Vec<Vec<f32>> = spec
        .magnitudes
        .par_iter()
        .enumerate()
        .map(|(frame_idx, mags)| {
            let total: f32 = mags.iter().sum();
            let (centroid, rolloff, bandwidth) = if total > 1e-10 {
                let centroid = mags
                    .iter()
                    .zip(freqs.iter())
                    .map(|(m, f)| m * f)
                    .sum::<f32>()
                    / total;

                let target = ROLLOFF_PERCENT * total;
                let mut cumulative = 0.0f32;
                let mut rolloff = freqs[freqs.len() - 1];
                for (m, f) in mags.iter().zip(freqs.iter()) {
                    cumulative += m;
                    if cumulative >= target {
                        rolloff = *f;
                        break;
                    }
                }

                let bandwidth = (mags
                    .iter()
                    .zip(freqs.iter())
                    .map(|(m, f)| m * (f - centroid).powi(2))
                    .sum::<f32>()
                    / total)
                    .sqrt();
                (centroid, rolloff, bandwidth)
            } else {
                (0.0, 0.0, 0.0)
            };

            let frame = stft::centered_frame(samples, frame_idx, spec.hop_size, spec.fft_size);
            let crossings = frame
                .windows(2)
                .filter(|w| (w[0] >= 0.0) != (w[1] >= 0.0))
                .count();
            let zcr = crossings as f32 / frame.len() as f32;

            vec![centroid, rolloff, bandwidth, zcr]
        })
        .collect();

    Matrix::from_columns(&columns, 4)
}

/// Short-time RMS over `frame_length` samples per frame.
pub fn rms_energy(samples: &[f32], frame_length: usize, hop_size: usize) -> Matrix {
    let n_frames = stft::frame_count(samples.len(), hop_size);
    let row: Vec<f32> = (0..n_frames)
        .map(|f| {
            let frame = stft::centered_frame(samples, f, hop_size, frame_length);
            (frame.iter().map(|s| s * s).sum::<f32>() / frame_length as f32).sqrt()
        })
        .collect();
    Matrix::from_rows(vec![row])
}

/// Local autocorrelation of the onset envelope over the first `n_lags` lags,
/// each column scaled by its lag-0 value.
pub fn tempogram(envelope: &[f32], n_lags: usize) -> Matrix {
    let n = envelope.len();
    let win = TEMPOGRAM_WINDOW.min(n.max(1));
    let hann = stft::hann_window(win);
    let half = (win / 2) as isize;

    let columns: Vec<Vec<f32>> = (0..n)
        .into_par_iter()
        .map(|t| {
            let segment: Vec<f32> = (0..win)
                .map(|i| {
                    let idx = t as isize - half + i as isize;
                    if idx >= 0 && (idx as usize) < n {
                        envelope[idx as usize] * hann[i]
                    } else {
                        0.0
                    }
                })
                .collect();

            let mut acf: Vec<f32> = (0..n_lags)
                .map(|lag| {
                    if lag >= win {
                        return 0.0;
                    }
                    segment[..win - lag]
                        .iter()
                        .zip(segment[lag..].iter())
                        .map(|(a, b)| a * b)
                        .sum()
                })
                .collect();

            let norm = acf.first().copied().unwrap_or(0.0);
            if norm > 1e-10 {
                acf.iter_mut().for_each(|v| *v /= norm);
            }
            acf
        })
        .collect();

    Matrix::from_columns(&columns, n_lags)
}
