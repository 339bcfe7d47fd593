use rayon::prelude::*;
use rustfft::{num_complex::Complex, FftPlanner};

/// Magnitude spectrogram on a centred frame grid: frame `t` is centred on
/// sample `t * hop_size`, with zero padding past either end of the signal.
#[derive(Clone, Debug)]
pub struct Spectrogram {
    /// `[frame][bin]`, `fft_size / 2 + 1` bins per frame
    pub magnitudes: Vec<Vec<f32>>,
    pub fft_size: usize,
    pub hop_size: usize,
    pub sample_rate: u32,
}

impl Spectrogram {
    pub fn n_frames(&self) -> usize {
        self.magnitudes.len()
    }

    pub fn n_bins(&self) -> usize {
        self.fft_size / 2 + 1
    }

    pub fn bin_frequency(&self, bin: usize) -> f32 {
        bin as f32 * self.sample_rate as f32 / self.fft_size as f32
    }

    pub fn frame_time(&self, frame: usize) -> f32 {
        frame_time(frame, self.hop_size, self.sample_rate)
    }
}

/// Number of centred frames for a signal: never less than one.
pub fn frame_count(n_samples: usize, hop_size: usize) -> usize {
    1 + n_samples / hop_size
}

pub fn frame_time(frame: usize, hop_size: usize, sample_rate: u32) -> f32 {
    (frame * hop_size) as f32 / sample_rate as f32
}

/// `len` samples centred on `frame * hop_size`, zero padded.
pub fn centered_frame(samples: &[f32], frame: usize, hop_size: usize, len: usize) -> Vec<f32> {
    let mut out = vec![0.0f32; len];
    let center = (frame * hop_size) as isize;
    let start = center - (len / 2) as isize;
    for (i, slot) in out.iter_mut().enumerate() {
        let idx = start + i as isize;
        if idx >= 0 && (idx as usize) < samples.len() {
            *slot = samples[idx as usize];
        }
    }
    out
}

pub fn stft(samples: &[f32], sample_rate: u32, fft_size: usize, hop_size: usize) -> Spectrogram {
    let n_frames = frame_count(samples.len(), hop_size);
    let hann = hann_window(fft_size);
    let half = fft_size / 2 + 1;

    let mut planner = FftPlanner::<f32>::new();
    let fft = planner.plan_fft_forward(fft_size);

    let magnitudes: Vec<Vec<f32>> = (0..n_frames)
        .into_par_iter()
        .map(|frame_idx| {
            let frame = centered_frame(samples, frame_idx, hop_size, fft_size);
            let mut buffer: Vec<Complex<f32>> = frame
                .iter()
                .zip(hann.iter())
                .map(|(&s, &w)| Complex::new(s * w, 0.0))
                .collect();
            fft.process(&mut buffer);
            buffer[..half].iter().map(|c| c.norm()).collect()
        })
        .collect();

    Spectrogram {
        magnitudes,
        fft_size,
        hop_size,
        sample_rate,
    }
}

pub fn hann_window(size: usize) -> Vec<f32> {
    if size < 2 {
        return vec![1.0; size];
    }
    (0..size)
        .map(|i| {
            0.5 * (1.0 - (2.0 * std::f32::consts::PI * i as f32 / (size - 1) as f32).cos())
        })
        .collect()
}
