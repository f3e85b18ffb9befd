//! Log-mel spectrogram extraction.
//!
//! Converts 16 kHz mono PCM into the `[n_mels, T]` feature matrix the
//! generator was trained on: pre-emphasis, reflect-centered STFT, triangular
//! mel filterbank, dB conversion, symmetric normalization to `[-4, 4]`.
//! The hop of 200 samples at 16 kHz yields 80 mel frames per second, which
//! is what makes the aligner's `80 / fps` frame multiplier exact.

use ndarray::Array2;
use rustfft::{num_complex::Complex, FftPlanner};
use std::path::Path;

use crate::error::{MediaError, MediaResult};

/// Expected input sample rate.
pub const SAMPLE_RATE: u32 = 16_000;

/// Mel extraction parameters. The defaults are the generator's training
/// configuration; changing them desynchronizes audio and mouth motion.
#[derive(Debug, Clone)]
pub struct MelConfig {
    pub n_fft: usize,
    pub hop_length: usize,
    pub n_mels: usize,
    pub fmin: f64,
    pub fmax: f64,
    pub preemphasis: f32,
    pub ref_level_db: f32,
    pub min_level_db: f32,
    pub max_abs_value: f32,
}

impl Default for MelConfig {
    fn default() -> Self {
        Self {
            n_fft: 800,
            hop_length: 200,
            n_mels: 80,
            fmin: 55.0,
            fmax: 7600.0,
            preemphasis: 0.97,
            ref_level_db: 20.0,
            min_level_db: -100.0,
            max_abs_value: 4.0,
        }
    }
}

/// Read a 16 kHz mono WAV file into f32 samples in [-1, 1].
///
/// The media toolchain transcodes every audio input to this format first;
/// anything else arriving here is a pipeline bug surfaced as `InvalidAudio`.
pub fn load_wav_16k_mono(path: impl AsRef<Path>) -> MediaResult<Vec<f32>> {
    let path = path.as_ref();
    let mut reader = hound::WavReader::open(path)
        .map_err(|e| MediaError::invalid_audio(format!("cannot open {}: {e}", path.display())))?;
    let spec = reader.spec();

    if spec.sample_rate != SAMPLE_RATE || spec.channels != 1 {
        return Err(MediaError::invalid_audio(format!(
            "expected {} Hz mono, got {} Hz {}ch",
            SAMPLE_RATE, spec.sample_rate, spec.channels
        )));
    }

    let samples: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<Result<_, _>>()
            .map_err(|e| MediaError::invalid_audio(format!("bad sample: {e}")))?,
        hound::SampleFormat::Int => reader
            .samples::<i16>()
            .map(|s| s.map(|v| v as f32 / i16::MAX as f32))
            .collect::<Result<_, _>>()
            .map_err(|e| MediaError::invalid_audio(format!("bad sample: {e}")))?,
    };
    Ok(samples)
}

/// Compute the normalized log-mel spectrogram, shape `[n_mels, T]`.
///
/// NaN anywhere in the result is an input-validation failure.
pub fn melspectrogram(samples: &[f32], config: &MelConfig) -> MediaResult<Array2<f32>> {
    let pad = config.n_fft / 2;
    if samples.len() <= pad {
        return Err(MediaError::invalid_audio(format!(
            "audio too short for analysis: {} samples",
            samples.len()
        )));
    }

    let emphasized = apply_preemphasis(samples, config.preemphasis);
    let spectrum = stft_magnitudes(&emphasized, config.n_fft, config.hop_length);
    let filterbank = mel_filterbank(config);

    let n_frames = spectrum.nrows();
    let mut mel = Array2::<f32>::zeros((config.n_mels, n_frames));

    // filterbank [n_mels, n_bins] x spectrum [n_frames, n_bins]^T
    for m in 0..config.n_mels {
        for t in 0..n_frames {
            let mut acc = 0.0f32;
            for b in 0..filterbank.ncols() {
                acc += filterbank[[m, b]] * spectrum[[t, b]];
            }
            mel[[m, t]] = normalize_db(amp_to_db(acc, config), config);
        }
    }

    if mel.iter().any(|v| v.is_nan()) {
        return Err(MediaError::invalid_audio(
            "mel spectrogram contains NaN values",
        ));
    }
    Ok(mel)
}

/// First-order pre-emphasis filter.
fn apply_preemphasis(samples: &[f32], coefficient: f32) -> Vec<f32> {
    let mut out = Vec::with_capacity(samples.len());
    out.push(samples[0]);
    for i in 1..samples.len() {
        out.push(samples[i] - coefficient * samples[i - 1]);
    }
    out
}

/// Reflect-centered STFT magnitude frames, shape `[n_frames, n_fft/2 + 1]`.
fn stft_magnitudes(samples: &[f32], n_fft: usize, hop: usize) -> Array2<f32> {
    let pad = n_fft / 2;
    let mut padded = Vec::with_capacity(samples.len() + 2 * pad);
    padded.extend((1..=pad).rev().map(|i| samples[i]));
    padded.extend_from_slice(samples);
    padded.extend((samples.len() - pad - 1..samples.len() - 1).rev().map(|i| samples[i]));

    let window = hann_window(n_fft);
    let mut planner = FftPlanner::<f32>::new();
    let fft = planner.plan_fft_forward(n_fft);

    let n_bins = n_fft / 2 + 1;
    let n_frames = (padded.len() - n_fft) / hop + 1;
    let mut magnitudes = Array2::<f32>::zeros((n_frames, n_bins));

    let mut buffer = vec![Complex::new(0.0f32, 0.0); n_fft];
    for frame_idx in 0..n_frames {
        let start = frame_idx * hop;
        for (i, slot) in buffer.iter_mut().enumerate() {
            *slot = Complex::new(padded[start + i] * window[i], 0.0);
        }
        fft.process(&mut buffer);
        for (bin, value) in buffer[..n_bins].iter().enumerate() {
            magnitudes[[frame_idx, bin]] = value.norm();
        }
    }
    magnitudes
}

/// Periodic Hann window.
fn hann_window(n: usize) -> Vec<f32> {
    (0..n)
        .map(|i| 0.5 * (1.0 - (2.0 * std::f32::consts::PI * i as f32 / n as f32).cos()))
        .collect()
}

/// Convert frequency to mel scale.
fn hz_to_mel(freq: f64) -> f64 {
    2595.0 * (1.0 + freq / 700.0).log10()
}

/// Convert mel scale to frequency.
fn mel_to_hz(mel: f64) -> f64 {
    700.0 * (10f64.powf(mel / 2595.0) - 1.0)
}

/// Triangular mel filterbank, shape `[n_mels, n_fft/2 + 1]`.
fn mel_filterbank(config: &MelConfig) -> Array2<f32> {
    let n_bins = config.n_fft / 2 + 1;
    let mut filterbank = Array2::<f32>::zeros((config.n_mels, n_bins));

    let freqs: Vec<f64> = (0..n_bins)
        .map(|i| i as f64 * SAMPLE_RATE as f64 / config.n_fft as f64)
        .collect();

    let mel_min = hz_to_mel(config.fmin);
    let mel_max = hz_to_mel(config.fmax);
    let hz_pts: Vec<f64> = (0..=config.n_mels + 1)
        .map(|i| mel_min + (mel_max - mel_min) * i as f64 / (config.n_mels + 1) as f64)
        .map(mel_to_hz)
        .collect();

    for m in 0..config.n_mels {
        let (left, center, right) = (hz_pts[m], hz_pts[m + 1], hz_pts[m + 2]);
        for (b, &freq) in freqs.iter().enumerate() {
            let weight = if freq < left || freq > right {
                0.0
            } else if freq <= center {
                (freq - left) / (center - left)
            } else {
                (right - freq) / (right - center)
            };
            filterbank[[m, b]] = weight as f32;
        }
    }
    filterbank
}

/// Amplitude to decibels with a floor to avoid log of zero.
fn amp_to_db(amplitude: f32, config: &MelConfig) -> f32 {
    20.0 * amplitude.max(1e-5).log10() - config.ref_level_db
}

/// Symmetric normalization to `[-max_abs_value, max_abs_value]`.
fn normalize_db(db: f32, config: &MelConfig) -> f32 {
    let scaled =
        2.0 * config.max_abs_value * ((db - config.min_level_db) / -config.min_level_db)
            - config.max_abs_value;
    scaled.clamp(-config.max_abs_value, config.max_abs_value)
}
