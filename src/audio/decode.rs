use std::path::Path;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use crate::error::{AnalysisError, Result};

/// Extensions accepted by the analysis front ends.
pub const SUPPORTED_FORMATS: [&str; 8] = ["aac", "aif", "aiff", "flac", "m4a", "mp3", "ogg", "wav"];

/// Decoded mono audio. Owned by the caller, read-only to the pipeline.
#[derive(Clone, Debug)]
pub struct Waveform {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl Waveform {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self { samples, sample_rate }
    }

    pub fn duration(&self) -> f32 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f32 / self.sample_rate as f32
    }
}

pub fn is_supported(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|ext| SUPPORTED_FORMATS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

pub fn decode_audio(path: &Path) -> Result<Waveform> {
    if !path.exists() {
        return Err(AnalysisError::InputNotFound(path.to_path_buf()));
    }

    let file = std::fs::File::open(path).map_err(|source| AnalysisError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe().format(
        &hint,
        mss,
        &FormatOptions::default(),
        &MetadataOptions::default(),
    )?;

    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != symphonia::core::codecs::CODEC_TYPE_NULL)
        .ok_or_else(|| AnalysisError::NoAudioTrack(path.to_path_buf()))?;

    let track_id = track.id;
    let channels = track.codec_params.channels.map_or(1, |c| c.count());
    let sample_rate = track
        .codec_params
        .sample_rate
        .ok_or_else(|| AnalysisError::UnknownSampleRate(path.to_path_buf()))?;

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())?;

    let mut all_samples: Vec<f32> = Vec::new();

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(ref e))
                if e.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break;
            }
            Err(e) => return Err(e.into()),
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(d) => d,
            Err(SymphoniaError::DecodeError(err)) => {
                log::debug!("Skipping corrupt packet: {}", err);
                continue;
            }
            Err(e) => return Err(e.into()),
        };

        let spec = *decoded.spec();
        let num_frames = decoded.frames();

        let mut sample_buf = SampleBuffer::<f32>::new(num_frames as u64, spec);
        sample_buf.copy_interleaved_ref(decoded);

        let samples = sample_buf.samples();

        // Downmix to mono
        if channels == 1 {
            all_samples.extend_from_slice(samples);
        } else {
            for frame_samples in samples.chunks(channels) {
                let mono: f32 = frame_samples.iter().sum::<f32>() / channels as f32;
                all_samples.push(mono);
            }
        }
    }

    log::info!(
        "Decoded audio: {} samples, {}Hz, {:.1}s",
        all_samples.len(),
        sample_rate,
        all_samples.len() as f32 / sample_rate as f32
    );

    Ok(Waveform::new(all_samples, sample_rate))
}

/// Resample mono audio to `to_rate` using rubato. No-op when the rates match.
pub fn resample(waveform: Waveform, to_rate: u32) -> Result<Waveform> {
    use rubato::{Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction};

    if waveform.sample_rate == to_rate {
        return Ok(waveform);
    }
    if waveform.samples.is_empty() || waveform.sample_rate == 0 {
        return Ok(Waveform::new(Vec::new(), to_rate));
    }

    let params = SincInterpolationParameters {
        sinc_len: 256,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    };

    let ratio = to_rate as f64 / waveform.sample_rate as f64;
    let mut resampler = SincFixedIn::<f32>::new(
        ratio,
        2.0, // max relative ratio
        params,
        waveform.samples.len(),
        1, // mono
    )
    .map_err(|e| AnalysisError::Resample(e.to_string()))?;

    let input = vec![waveform.samples];
    let output = resampler
        .process(&input, None)
        .map_err(|e| AnalysisError::Resample(e.to_string()))?;

    let samples = output.into_iter().next().unwrap_or_default();
    log::debug!("Resampled to {}Hz: {} samples", to_rate, samples.len());
    Ok(Waveform::new(samples, to_rate))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_wav(path: &Path, samples: &[f32], sample_rate: u32, channels: u16) {
        let spec = hound::WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec).unwrap();
        for &s in samples {
            writer.write_sample((s * i16::MAX as f32) as i16).unwrap();
        }
        writer.finalize().unwrap();
    }

    #[test]
    fn missing_file_is_input_not_found() {
        let err = decode_audio(Path::new("/definitely/not/here.wav")).unwrap_err();
        assert!(matches!(err, AnalysisError::InputNotFound(_)));
    }

    #[test]
    fn decodes_and_downmixes_stereo_wav() {
        let path = std::env::temp_dir().join("sectionist_decode_stereo.wav");
        // left = 0.5, right = -0.5 -> mono silence
        let interleaved: Vec<f32> = (0..8000).flat_map(|_| [0.5, -0.5]).collect();
        write_wav(&path, &interleaved, 8000, 2);

        let waveform = decode_audio(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(waveform.sample_rate, 8000);
        assert_eq!(waveform.samples.len(), 8000);
        assert!(waveform.samples.iter().all(|s| s.abs() < 1e-3));
        assert!((waveform.duration() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn resample_changes_rate_and_length() {
        let samples: Vec<f32> = (0..44100)
            .map(|i| (2.0 * std::f32::consts::PI * 440.0 * i as f32 / 44100.0).sin())
            .collect();
        let out = resample(Waveform::new(samples, 44100), 22050).unwrap();
        assert_eq!(out.sample_rate, 22050);
        let expected = 22050.0;
        assert!((out.samples.len() as f32 - expected).abs() < expected * 0.05);
    }

    #[test]
    fn resample_empty_is_empty() {
        let out = resample(Waveform::new(Vec::new(), 44100), 22050).unwrap();
        assert!(out.samples.is_empty());
        assert_eq!(out.sample_rate, 22050);
    }

    #[test]
    fn supported_extensions() {
        assert!(is_supported(Path::new("song.MP3")));
        assert!(is_supported(Path::new("a/b/take.flac")));
        assert!(!is_supported(Path::new("notes.txt")));
        assert!(!is_supported(Path::new("noext")));
    }
}
