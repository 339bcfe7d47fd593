use super::features::Matrix;
use super::stft::Spectrogram;

pub const DEFAULT_TEMPO: f32 = 120.0;

/// Fewer onsets than this and the beat grid is not trusted.
const MIN_BEATS: usize = 8;

/// Compression applied to magnitudes before differencing
const LOG_GAMMA: f32 = 100.0;

#[derive(Clone, Debug)]
pub struct BeatTrack {
    pub tempo_bpm: f32,
    /// Frame indices on the spectrogram grid, strictly increasing
    pub beat_frames: Vec<usize>,
    pub beat_times: Vec<f32>,
}

/// Half-wave rectified log-magnitude flux, one value per spectrogram frame.
pub fn onset_envelope(spec: &Spectrogram) -> Vec<f32> {
    let n = spec.n_frames();
    let mut envelope = vec![0.0f32; n];
    for i in 1..n {
        envelope[i] = spec.magnitudes[i]
            .iter()
            .zip(spec.magnitudes[i - 1].iter())
            .map(|(&cur, &prev)| {
                ((LOG_GAMMA * cur).ln_1p() - (LOG_GAMMA * prev).ln_1p()).max(0.0)
            })
            .sum();
    }
    envelope
}

/// Track beats from an onset envelope sampled at `frame_rate` frames per second.
///
/// Returns `None` when the envelope is flat or the onsets do not describe a
/// plausible tempo; callers fall back to the uniform frame grid.
pub fn track_beats(envelope: &[f32], frame_rate: f32) -> Option<BeatTrack> {
    let peak = envelope.iter().copied().fold(0.0f32, f32::max);
    if envelope.len() < 2 || peak <= 1e-8 || !(frame_rate > 0.0) {
        return None;
    }
    let normalized: Vec<f32> = envelope.iter().map(|v| v / peak).collect();

    let onsets = detect_onsets(&normalized, frame_rate);
    if onsets.len() < MIN_BEATS {
        log::debug!("Beat tracking: only {} onsets", onsets.len());
        return None;
    }

    let onset_times: Vec<f32> = onsets.iter().map(|&f| f as f32 / frame_rate).collect();
    let tempo_bpm = estimate_tempo(&onset_times)?;

    // Thin onsets that fall inside half a beat of the previous beat
    let min_gap = 0.5 * 60.0 / tempo_bpm;
    let mut beat_frames: Vec<usize> = Vec::with_capacity(onsets.len());
    let mut beat_times: Vec<f32> = Vec::with_capacity(onsets.len());
    for (&frame, &time) in onsets.iter().zip(onset_times.iter()) {
        if beat_times.last().map_or(true, |&last| time - last >= min_gap) {
            beat_frames.push(frame);
            beat_times.push(time);
        }
    }

    if beat_frames.len() < MIN_BEATS {
        return None;
    }

    Some(BeatTrack {
        tempo_bpm,
        beat_frames,
        beat_times,
    })
}

fn detect_onsets(envelope: &[f32], frame_rate: f32) -> Vec<usize> {
    // ~0.5s neighbourhood for the local mean
    let window = ((0.5 * frame_rate).round() as usize).max(1);
    let min_gap = 0.1;
    let mut onsets: Vec<usize> = Vec::new();

    for i in 0..envelope.len() {
        let start = i.saturating_sub(window);
        let end = (i + window + 1).min(envelope.len());
        let local_mean: f32 = envelope[start..end].iter().sum::<f32>() / (end - start) as f32;

        let threshold = local_mean * 1.5 + 0.01;

        if envelope[i] > threshold {
            let is_peak = (i == 0 || envelope[i] >= envelope[i - 1])
                && (i == envelope.len() - 1 || envelope[i] >= envelope[i + 1]);

            let far_enough = onsets
                .last()
                .map_or(true, |&last| (i - last) as f32 / frame_rate > min_gap);

            if is_peak && far_enough {
                onsets.push(i);
            }
        }
    }

    onsets
}

/// Median inter-onset interval over the 60-200 BPM range.
fn estimate_tempo(onset_times: &[f32]) -> Option<f32> {
    if onset_times.len() < 2 {
        return None;
    }

    let mut reasonable: Vec<f32> = onset_times
        .windows(2)
        .map(|w| w[1] - w[0])
        .filter(|&i| (0.3..=1.0).contains(&i))
        .collect();

    if reasonable.is_empty() {
        return None;
    }

    reasonable.sort_by(|a, b| a.total_cmp(b));
    let median_interval = reasonable[reasonable.len() / 2];
    Some(60.0 / median_interval)
}

/// Column ranges between consecutive beats, covering `[0, n_frames)`.
pub fn beat_intervals(beat_frames: &[usize], n_frames: usize) -> Vec<(usize, usize)> {
    let mut edges: Vec<usize> = Vec::with_capacity(beat_frames.len() + 2);
    edges.push(0);
    for &b in beat_frames {
        if b > *edges.last().unwrap_or(&0) && b < n_frames {
            edges.push(b);
        }
    }
    if n_frames > *edges.last().unwrap_or(&0) {
        edges.push(n_frames);
    }
    edges.windows(2).map(|w| (w[0], w[1])).collect()
}

/// Aggregate each row with the median of the frames inside each interval.
pub fn sync_median(matrix: &Matrix, intervals: &[(usize, usize)]) -> Matrix {
    let rows = matrix
        .rows()
        .iter()
        .map(|row| {
            intervals
                .iter()
                .map(|&(start, end)| median(&row[start..end]))
                .collect()
        })
        .collect();
    Matrix::from_rows(rows)
}

fn median(values: &[f32]) -> f32 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) * 0.5
    } else {
        sorted[mid]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn click_envelope(bpm: f32, frame_rate: f32, seconds: f32) -> Vec<f32> {
        let n = (seconds * frame_rate) as usize;
        let period = frame_rate * 60.0 / bpm;
        let mut env = vec![0.0f32; n];
        let mut t = 0.0f32;
        while (t as usize) < n {
            env[t as usize] = 1.0;
            t += period;
        }
        env
    }

    #[test]
    fn tracks_steady_clicks() {
        let frame_rate = 22050.0 / 512.0;
        let env = click_envelope(120.0, frame_rate, 20.0);
        let track = track_beats(&env, frame_rate).expect("beats");
        assert!((track.tempo_bpm - 120.0).abs() < 6.0, "tempo {}", track.tempo_bpm);
        assert!(track.beat_frames.len() >= 35);
        assert!(track.beat_frames.windows(2).all(|w| w[1] > w[0]));
    }

    #[test]
    fn flat_envelope_fails() {
        assert!(track_beats(&vec![0.0; 500], 43.0).is_none());
        assert!(track_beats(&[], 43.0).is_none());
    }

    #[test]
    fn sparse_onsets_fail() {
        // one onset every 10 seconds is not a tempo
        let frame_rate = 43.0;
        let mut env = vec![0.0f32; 43 * 60];
        for s in [0, 10, 25, 40, 50] {
            env[s * 43 + 1] = 1.0;
        }
        assert!(track_beats(&env, frame_rate).is_none());
    }

    #[test]
    fn intervals_cover_all_frames() {
        let intervals = beat_intervals(&[0, 3, 3, 7, 12], 10);
        assert_eq!(intervals, vec![(0, 3), (3, 7), (7, 10)]);
    }

    #[test]
    fn median_aggregation() {
        let m = Matrix::from_rows(vec![vec![1.0, 5.0, 3.0, 10.0, 2.0, 4.0]]);
        let synced = sync_median(&m, &[(0, 3), (3, 6)]);
        assert_eq!(synced.row(0), &[3.0, 4.0]);
    }
}
