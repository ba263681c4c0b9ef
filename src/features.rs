use log::debug;
use ndarray::Array2;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::cohort::{CohortData, CohortSet};
use crate::data::CohortMatrices;
use crate::error::{InvalidParameter, Result};
use crate::param::Param;
use crate::spectrum::{Spectrum, WelchEstimator};

/// Floor added inside the logarithm of the spectral entropy.
pub const ENTROPY_FLOOR: f64 = 1e-12;

/// Half-open frequency interval `[min, max)`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct FrequencyBin {
    pub min: f64,
    pub max: f64,
}

impl FrequencyBin {
    pub fn new(min: f64, max: f64) -> Result<FrequencyBin> {
        if !min.is_finite() || !max.is_finite() || min >= max {
            return Err(InvalidParameter::InvalidBin { min, max }.into());
        }
        Ok(FrequencyBin { min, max })
    }

    /// `count` contiguous bins of equal width spanning `[start, stop)`.
    pub fn uniform(start: f64, stop: f64, count: usize) -> Result<Vec<FrequencyBin>> {
        if count == 0 {
            return Err(InvalidParameter::NoBins.into());
        }
        // edges computed from the span, not by repeated addition, so that 0 stays exact
        let edge = |i: usize| start + (stop - start) * i as f64 / count as f64;
        (0..count).map(|i| FrequencyBin::new(edge(i), edge(i + 1))).collect()
    }

    pub fn contains(&self, frequency: f64) -> bool {
        frequency >= self.min && frequency < self.max
    }
}

/// One scalar per bin computed from a power spectrum. `None` marks a bin
/// that no frequency sample falls into.
pub trait FeatureStrategy: Send + Sync {
    fn kind(&self) -> FeatureKind;

    fn compute(&self, spectrum: &Spectrum, bins: &[FrequencyBin]) -> Vec<Option<f64>>;
}

/// Frequency of the highest power inside the bin (first one on ties).
pub struct PeakFrequency;

/// Arithmetic mean of the bin's power values.
pub struct AveragePower;

/// Trapezoidal area under the power curve across the bin.
pub struct TotalPower;

/// Shannon entropy (bits) of the bin's power normalised to sum to 1.
pub struct SpectralEntropy;

impl FeatureStrategy for PeakFrequency {
    fn kind(&self) -> FeatureKind {
        FeatureKind::peak_frequency
    }

    fn compute(&self, spectrum: &Spectrum, bins: &[FrequencyBin]) -> Vec<Option<f64>> {
        bins.iter()
            .map(|bin| {
                let mut best: Option<usize> = None;
                for i in spectrum.indices_in(bin.min, bin.max) {
                    if best.map_or(true, |b| spectrum.power[i] > spectrum.power[b]) {
                        best = Some(i);
                    }
                }
                best.map(|i| spectrum.frequencies[i])
            })
            .collect()
    }
}

impl FeatureStrategy for AveragePower {
    fn kind(&self) -> FeatureKind {
        FeatureKind::average_power
    }

    fn compute(&self, spectrum: &Spectrum, bins: &[FrequencyBin]) -> Vec<Option<f64>> {
        bins.iter()
            .map(|bin| {
                let indices = spectrum.indices_in(bin.min, bin.max);
                if indices.is_empty() {
                    return None;
                }
                Some(indices.iter().map(|&i| spectrum.power[i]).sum::<f64>() / indices.len() as f64)
            })
            .collect()
    }
}

impl FeatureStrategy for TotalPower {
    fn kind(&self) -> FeatureKind {
        FeatureKind::total_power
    }

    fn compute(&self, spectrum: &Spectrum, bins: &[FrequencyBin]) -> Vec<Option<f64>> {
        bins.iter()
            .map(|bin| {
                let indices = spectrum.indices_in(bin.min, bin.max);
                if indices.is_empty() {
                    return None;
                }
                let area = indices
                    .windows(2)
                    .map(|w| {
                        let (a, b) = (w[0], w[1]);
                        (spectrum.frequencies[b] - spectrum.frequencies[a]) * (spectrum.power[a] + spectrum.power[b]) / 2.0
                    })
                    .sum();
                Some(area)
            })
            .collect()
    }
}

impl FeatureStrategy for SpectralEntropy {
    fn kind(&self) -> FeatureKind {
        FeatureKind::spectral_entropy
    }

    fn compute(&self, spectrum: &Spectrum, bins: &[FrequencyBin]) -> Vec<Option<f64>> {
        if spectrum.total_power() == 0.0 {
            return vec![Some(0.0); bins.len()];
        }

        bins.iter()
            .map(|bin| {
                let power: Vec<f64> = spectrum.indices_in(bin.min, bin.max).iter().map(|&i| spectrum.power[i]).collect();
                let bin_power: f64 = power.iter().sum();
                if bin_power == 0.0 {
                    return Some(0.0);
                }
                let entropy = -power
                    .iter()
                    .map(|p| p / bin_power)
                    .map(|q| q * (q + ENTROPY_FLOOR).log2())
                    .sum::<f64>();
                Some(entropy)
            })
            .collect()
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[allow(non_camel_case_types)]
pub enum FeatureKind {
    peak_frequency,
    average_power,
    total_power,
    spectral_entropy,
}

impl FeatureKind {
    pub fn strategy(self) -> Box<dyn FeatureStrategy> {
        match self {
            FeatureKind::peak_frequency => Box::new(PeakFrequency),
            FeatureKind::average_power => Box::new(AveragePower),
            FeatureKind::total_power => Box::new(TotalPower),
            FeatureKind::spectral_entropy => Box::new(SpectralEntropy),
        }
    }
}

impl fmt::Display for FeatureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// What to do with a bin that holds no frequency sample.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[allow(non_camel_case_types)]
pub enum MissingBinPolicy {
    fail,
    zero_fill,
}

/// Turns one subject's per-region series into a feature vector laid out
/// region-major: `[region0 bin0..binB, region1 bin0..binB, ...]`.
pub struct FeatureExtractor {
    estimator: WelchEstimator,
    bins: Vec<FrequencyBin>,
    strategy: Box<dyn FeatureStrategy>,
    missing_bin: MissingBinPolicy,
}

impl FeatureExtractor {
    pub fn new(
        estimator: WelchEstimator,
        bins: Vec<FrequencyBin>,
        strategy: Box<dyn FeatureStrategy>,
        missing_bin: MissingBinPolicy,
    ) -> Result<FeatureExtractor> {
        if bins.is_empty() {
            return Err(InvalidParameter::NoBins.into());
        }
        Ok(FeatureExtractor { estimator, bins, strategy, missing_bin })
    }

    pub fn from_param(param: &Param) -> Result<FeatureExtractor> {
        let estimator = WelchEstimator::new(
            param.spectrum.sampling_frequency,
            param.spectrum.segment_length,
            param.spectrum.two_sided,
        )?;
        FeatureExtractor::new(
            estimator,
            param.features.frequency_bins()?,
            param.features.strategy.strategy(),
            param.features.missing_bin,
        )
    }

    pub fn kind(&self) -> FeatureKind {
        self.strategy.kind()
    }

    pub fn bins(&self) -> &[FrequencyBin] {
        &self.bins
    }

    pub fn feature_len(&self, regions: usize) -> usize {
        regions * self.bins.len()
    }

    /// One value per bin for a single series.
    pub fn extract_series(&self, series: &[f64]) -> Result<Vec<f64>> {
        let spectrum = self.estimator.estimate(series)?;
        self.strategy
            .compute(&spectrum, &self.bins)
            .into_iter()
            .zip(&self.bins)
            .enumerate()
            .map(|(i, (value, bin))| match (value, self.missing_bin) {
                (Some(v), _) => Ok(v),
                (None, MissingBinPolicy::zero_fill) => Ok(0.0),
                (None, MissingBinPolicy::fail) => {
                    Err(InvalidParameter::EmptyFrequencyBin { bin: i, min: bin.min, max: bin.max }.into())
                }
            })
            .collect()
    }

    pub fn extract_subject(&self, regions: &[Vec<f64>]) -> Result<Vec<f64>> {
        let mut features = Vec::with_capacity(self.feature_len(regions.len()));
        for series in regions {
            features.extend(self.extract_series(series)?);
        }
        Ok(features)
    }

    /// Subjects x features matrix of one cohort, subjects in input order.
    pub fn extract_cohort(&self, data: &CohortData) -> Result<Array2<f64>> {
        for (subject, regions) in data.subjects.iter().enumerate() {
            if let Some(region) = regions.iter().position(|series| series.is_empty()) {
                return Err(InvalidParameter::EmptyTimeSeries { cohort: data.cohort, subject, region }.into());
            }
        }

        let rows: Vec<Vec<f64>> = data
            .subjects
            .par_iter()
            .map(|regions| self.extract_subject(regions))
            .collect::<Result<Vec<_>>>()?;

        let width = self.feature_len(data.region_len());
        if let Some(row) = rows.iter().find(|row| row.len() != width) {
            return Err(InvalidParameter::FeatureLengthMismatch { lengths: vec![width, row.len()] }.into());
        }

        let mut matrix = Array2::zeros((rows.len(), width));
        for (mut target, row) in matrix.rows_mut().into_iter().zip(&rows) {
            for (cell, value) in target.iter_mut().zip(row) {
                *cell = *value;
            }
        }

        debug!("{}: {} subjects x {} {} features", data.cohort, rows.len(), width, self.kind());
        Ok(matrix)
    }

    pub fn extract_all(&self, set: &CohortSet) -> Result<CohortMatrices> {
        let mut matrices = Vec::with_capacity(set.cohorts.len());
        for data in &set.cohorts {
            matrices.push((data.cohort, self.extract_cohort(data)?));
        }
        Ok(CohortMatrices { matrices })
    }
}
