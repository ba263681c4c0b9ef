//! Welch power spectral density estimation.
//!
//! Segments overlap by half their length, each one is mean-detrended and
//! tapered with a periodic Hann window before its periodogram is taken. The
//! periodograms are averaged and scaled as a density (power per unit of
//! frequency).

use rustfft::{num_complex::Complex, FftPlanner};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

use crate::error::{InvalidParameter, Result};

/// Segment length used when none is configured, capped by the series length.
pub const DEFAULT_SEGMENT_LENGTH: usize = 256;

/// Power spectral density sampled on an ascending frequency grid.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Spectrum {
    pub frequencies: Vec<f64>,
    pub power: Vec<f64>,
}

impl Spectrum {
    pub fn len(&self) -> usize {
        self.frequencies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frequencies.is_empty()
    }

    /// Indices of the samples whose frequency lies in `[min, max)`.
    pub fn indices_in(&self, min: f64, max: f64) -> Vec<usize> {
        self.frequencies
            .iter()
            .enumerate()
            .filter(|(_, &f)| f >= min && f < max)
            .map(|(i, _)| i)
            .collect()
    }

    pub fn total_power(&self) -> f64 {
        self.power.iter().sum()
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct WelchEstimator {
    sampling_frequency: f64,
    segment_length: usize,
    two_sided: bool,
}

impl WelchEstimator {
    /// `segment_length == 0` selects the default length.
    pub fn new(sampling_frequency: f64, segment_length: usize, two_sided: bool) -> Result<WelchEstimator> {
        if !sampling_frequency.is_finite() || sampling_frequency <= 0.0 {
            return Err(InvalidParameter::SamplingFrequency(sampling_frequency).into());
        }
        let segment_length = if segment_length == 0 { DEFAULT_SEGMENT_LENGTH } else { segment_length };

        Ok(WelchEstimator { sampling_frequency, segment_length, two_sided })
    }

    /// Segment length effectively used for a series of `n` samples.
    pub fn effective_segment_length(&self, n: usize) -> usize {
        self.segment_length.min(n)
    }

    pub fn estimate(&self, series: &[f64]) -> Result<Spectrum> {
        if series.is_empty() {
            return Err(InvalidParameter::EmptySeries.into());
        }

        let nperseg = self.effective_segment_length(series.len());
        let step = nperseg - nperseg / 2;
        let n_segments = (series.len() - nperseg) / step + 1;

        let window = hann_window(nperseg);
        let scale = 1.0 / (self.sampling_frequency * window.iter().map(|w| w * w).sum::<f64>());

        let mut planner = FftPlanner::<f64>::new();
        let fft = planner.plan_fft_forward(nperseg);
        let mut buffer = vec![Complex::new(0.0, 0.0); nperseg];
        let mut accumulated = vec![0.0; nperseg];

        for segment in (0..n_segments).map(|s| &series[s * step..s * step + nperseg]) {
            for ((slot, value), w) in buffer.iter_mut().zip(detrend(segment)).zip(&window) {
                *slot = Complex::new(value * w, 0.0);
            }
            fft.process(&mut buffer);
            for (acc, c) in accumulated.iter_mut().zip(&buffer) {
                *acc += c.norm_sqr() * scale;
            }
        }
        for acc in accumulated.iter_mut() {
            *acc /= n_segments as f64;
        }

        let spectrum = if self.two_sided {
            two_sided(&accumulated, self.sampling_frequency)
        } else {
            one_sided(&accumulated, self.sampling_frequency)
        };
        Ok(spectrum)
    }
}

/// Periodic Hann window, the FFT-friendly variant.
fn hann_window(size: usize) -> Vec<f64> {
    if size == 1 {
        return vec![1.0];
    }
    (0..size).map(|i| 0.5 - 0.5 * (2.0 * PI * i as f64 / size as f64).cos()).collect()
}

/// Removes the segment mean. A constant segment maps to exact zeros.
fn detrend(segment: &[f64]) -> Vec<f64> {
    if segment.iter().all(|&v| v == segment[0]) {
        return vec![0.0; segment.len()];
    }
    let mean = segment.iter().sum::<f64>() / segment.len() as f64;
    segment.iter().map(|v| v - mean).collect()
}

fn one_sided(periodogram: &[f64], fs: f64) -> Spectrum {
    let n = periodogram.len();
    let bins = n / 2 + 1;
    let frequencies = (0..bins).map(|k| k as f64 * fs / n as f64).collect();
    let power = periodogram[..bins]
        .iter()
        .enumerate()
        .map(|(k, &p)| {
            // DC and, for even lengths, the Nyquist bin have no mirror image
            if k == 0 || (n % 2 == 0 && k == n / 2) { p } else { 2.0 * p }
        })
        .collect();
    Spectrum { frequencies, power }
}

fn two_sided(periodogram: &[f64], fs: f64) -> Spectrum {
    let n = periodogram.len();
    let mut pairs: Vec<(f64, f64)> = periodogram
        .iter()
        .enumerate()
        .map(|(k, &p)| {
            let k = if k < (n + 1) / 2 { k as f64 } else { k as f64 - n as f64 };
            (k * fs / n as f64, p)
        })
        .collect();
    pairs.sort_by(|a, b| a.0.total_cmp(&b.0));

    let (frequencies, power) = pairs.into_iter().unzip();
    Spectrum { frequencies, power }
}
