use std::sync::Arc;

use ndarray::{Array1, Array2};
use rustfft::{num_complex::Complex, Fft, FftPlanner};
use serde::Deserialize;

pub const MFCC_COEFFICIENTS: usize = 13;

const FFT_SIZE: usize = 2048;
const HOP_SIZE: usize = 512;
const MEL_FILTERS: usize = 40;
const LOG_FLOOR: f32 = 1e-10;

/// Distance metric for comparing two fingerprints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioMetric {
    /// Euclidean distance between mean MFCC vectors; below the threshold is
    /// similar.
    Euclidean,
    /// Cosine similarity of the mean MFCC vectors; above the threshold is
    /// similar.
    Cosine,
}

impl AudioMetric {
    pub fn default_threshold(self) -> f64 {
        match self {
            AudioMetric::Euclidean => 80.0,
            AudioMetric::Cosine => 0.2,
        }
    }
}

/// Decides whether the audio on both sides of a candidate cut belongs to the
/// same scene. Seam for the scene tracker so it can be driven without DSP in
/// tests.
pub trait AudioComparator {
    fn are_similar(&self, before: &[f32], after: &[f32]) -> bool;
}

/// MFCC-based comparator: a 13-coefficient cepstral summary averaged across
/// analysis frames, compared under the configured metric. Deterministic for
/// identical input.
pub struct MfccComparator {
    metric: AudioMetric,
    threshold: f64,
    fft: Arc<dyn Fft<f32>>,
    window: Vec<f32>,
    filterbank: Array2<f32>,
}

impl MfccComparator {
    pub fn new(sample_rate: u32, metric: AudioMetric, threshold: Option<f64>) -> Self {
        Self {
            metric,
            threshold: threshold.unwrap_or_else(|| metric.default_threshold()),
            fft: FftPlanner::new().plan_fft_forward(FFT_SIZE),
            window: hann_window(FFT_SIZE),
            filterbank: mel_filterbank(sample_rate, FFT_SIZE, MEL_FILTERS),
        }
    }

    /// Mean MFCC vector across frames, or None for empty input.
    pub fn fingerprint(&self, samples: &[f32]) -> Option<Array1<f32>> {
        if samples.is_empty() {
            return None;
        }
        let mut sum = Array1::<f32>::zeros(MFCC_COEFFICIENTS);
        let mut frames = 0usize;
        let mut start = 0usize;
        while start < samples.len() {
            sum += &self.frame_mfcc(samples, start);
            frames += 1;
            start += HOP_SIZE;
        }
        Some(sum / frames as f32)
    }

    fn frame_mfcc(&self, samples: &[f32], start: usize) -> Array1<f32> {
        let mut buf: Vec<Complex<f32>> = (0..FFT_SIZE)
            .map(|i| {
                let sample = samples.get(start + i).copied().unwrap_or(0.0);
                Complex {
                    re: sample * self.window[i],
                    im: 0.0,
                }
            })
            .collect();
        self.fft.process(&mut buf);

        let bins = FFT_SIZE / 2 + 1;
        let power = Array1::from_iter(buf[..bins].iter().map(|c| c.norm_sqr()));
        let mel_energies = self.filterbank.dot(&power);
        let log_mel = mel_energies.mapv(|e| (e + LOG_FLOOR).ln());
        dct_ii(&log_mel, MFCC_COEFFICIENTS)
    }
}

impl AudioComparator for MfccComparator {
    fn are_similar(&self, before: &[f32], after: &[f32]) -> bool {
        let (Some(a), Some(b)) = (self.fingerprint(before), self.fingerprint(after)) else {
            // Missing evidence reads as "different" so a candidate cut is
            // kept rather than two scenes silently merged
            tracing::debug!("audio window empty, treating scenes as different");
            return false;
        };

        match self.metric {
            AudioMetric::Euclidean => {
                let distance = euclidean_distance(&a, &b);
                tracing::debug!(
                    distance = format!("{:.2}", distance),
                    threshold = self.threshold,
                    "audio fingerprint distance"
                );
                distance < self.threshold
            }
            AudioMetric::Cosine => {
                let similarity = cosine_similarity(&a, &b);
                tracing::debug!(
                    similarity = format!("{:.3}", similarity),
                    threshold = self.threshold,
                    "audio fingerprint similarity"
                );
                similarity > self.threshold
            }
        }
    }
}

fn euclidean_distance(a: &Array1<f32>, b: &Array1<f32>) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(&x, &y)| {
            let d = x as f64 - y as f64;
            d * d
        })
        .sum::<f64>()
        .sqrt()
}

fn cosine_similarity(a: &Array1<f32>, b: &Array1<f32>) -> f64 {
    let dot: f64 = a.iter().zip(b.iter()).map(|(&x, &y)| x as f64 * y as f64).sum();
    let norm_a = a.iter().map(|&x| x as f64 * x as f64).sum::<f64>().sqrt();
    let norm_b = b.iter().map(|&x| x as f64 * x as f64).sum::<f64>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

fn hann_window(size: usize) -> Vec<f32> {
    (0..size)
        .map(|i| {
            let phase = 2.0 * std::f32::consts::PI * i as f32 / (size - 1) as f32;
            0.5 - 0.5 * phase.cos()
        })
        .collect()
}

/// Triangular mel filterbank over the positive-frequency bins.
fn mel_filterbank(sample_rate: u32, fft_size: usize, filters: usize) -> Array2<f32> {
    let bins = fft_size / 2 + 1;
    let nyquist = sample_rate as f32 / 2.0;
    let mel_max = hz_to_mel(nyquist);

    // Filter edge positions as fractional bin indices
    let points: Vec<f32> = (0..filters + 2)
        .map(|i| {
            let mel = mel_max * i as f32 / (filters + 1) as f32;
            mel_to_hz(mel) / nyquist * (bins - 1) as f32
        })
        .collect();

    let mut bank = Array2::<f32>::zeros((filters, bins));
    for f in 0..filters {
        let (left, center, right) = (points[f], points[f + 1], points[f + 2]);
        for b in 0..bins {
            let x = b as f32;
            let weight = if x > left && x <= center {
                (x - left) / (center - left).max(1e-6)
            } else if x > center && x < right {
                (right - x) / (right - center).max(1e-6)
            } else {
                0.0
            };
            bank[(f, b)] = weight;
        }
    }
    bank
}

fn hz_to_mel(hz: f32) -> f32 {
    2595.0 * (1.0 + hz / 700.0).log10()
}

fn mel_to_hz(mel: f32) -> f32 {
    700.0 * (10f32.powf(mel / 2595.0) - 1.0)
}

fn dct_ii(input: &Array1<f32>, coefficients: usize) -> Array1<f32> {
    let n = input.len();
    let scale_first = (1.0 / n as f32).sqrt();
    let scale_rest = (2.0 / n as f32).sqrt();
    Array1::from_iter((0..coefficients).map(|k| {
        let sum: f32 = input
            .iter()
            .enumerate()
            .map(|(i, &x)| {
                x * (std::f32::consts::PI / n as f32 * (i as f32 + 0.5) * k as f32).cos()
            })
            .sum();
        if k == 0 {
            scale_first * sum
        } else {
            scale_rest * sum
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_RATE: u32 = 8000;

    fn sine(freq: f32, secs: f32) -> Vec<f32> {
        let count = (SAMPLE_RATE as f32 * secs) as usize;
        (0..count)
            .map(|i| {
                (2.0 * std::f32::consts::PI * freq * i as f32 / SAMPLE_RATE as f32).sin() * 0.5
            })
            .collect()
    }

    fn comparator(metric: AudioMetric) -> MfccComparator {
        MfccComparator::new(SAMPLE_RATE, metric, None)
    }

    #[test]
    fn fingerprint_has_thirteen_coefficients() {
        let c = comparator(AudioMetric::Euclidean);
        let fp = c.fingerprint(&sine(440.0, 1.0)).unwrap();
        assert_eq!(fp.len(), MFCC_COEFFICIENTS);
    }

    #[test]
    fn fingerprint_is_deterministic() {
        let c = comparator(AudioMetric::Euclidean);
        let samples = sine(440.0, 1.0);
        let a = c.fingerprint(&samples).unwrap();
        let b = c.fingerprint(&samples).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn fingerprint_of_empty_audio_is_none() {
        let c = comparator(AudioMetric::Euclidean);
        assert!(c.fingerprint(&[]).is_none());
    }

    #[test]
    fn identical_windows_are_similar() {
        let c = comparator(AudioMetric::Euclidean);
        let samples = sine(440.0, 1.0);
        assert!(c.are_similar(&samples, &samples));
    }

    #[test]
    fn empty_window_is_not_similar() {
        let c = comparator(AudioMetric::Euclidean);
        let samples = sine(440.0, 1.0);
        assert!(!c.are_similar(&samples, &[]));
        assert!(!c.are_similar(&[], &samples));
        assert!(!c.are_similar(&[], &[]));
    }

    #[test]
    fn identical_windows_under_cosine_are_similar() {
        let c = comparator(AudioMetric::Cosine);
        let samples = sine(440.0, 1.0);
        assert!(c.are_similar(&samples, &samples));
    }

    #[test]
    fn different_signals_have_positive_distance() {
        let c = comparator(AudioMetric::Euclidean);
        let a = c.fingerprint(&sine(440.0, 1.0)).unwrap();
        let b = c.fingerprint(&sine(2750.0, 1.0)).unwrap();
        assert!(euclidean_distance(&a, &b) > 0.0);
    }
}
