use thiserror::Error;

use crate::cohort::Cohort;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid parameter: {0}")]
    InvalidParameter(#[from] InvalidParameter),

    #[error("classifier failure: {0}")]
    Classifier(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

/// Reason a caller-supplied input was rejected. Always raised before any
/// fold runs.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum InvalidParameter {
    #[error("K={k} is outside [1, {available}]")]
    FeatureCount { k: usize, available: usize },

    #[error("feature vector length differs across cohorts ({lengths:?}) and no reconciliation was requested")]
    FeatureLengthMismatch { lengths: Vec<usize> },

    #[error("cohort {cohort} has {subjects} subject(s), at least 2 are required")]
    CohortTooSmall { cohort: Cohort, subjects: usize },

    #[error("empty time series")]
    EmptySeries,

    #[error("empty time series (cohort {cohort}, subject {subject}, region {region})")]
    EmptyTimeSeries { cohort: Cohort, subject: usize, region: usize },

    #[error("no frequency sample falls in bin #{bin} [{min}, {max})")]
    EmptyFrequencyBin { bin: usize, min: f64, max: f64 },

    #[error("invalid frequency bin [{min}, {max})")]
    InvalidBin { min: f64, max: f64 },

    #[error("no frequency bins were configured")]
    NoBins,

    #[error("sampling frequency must be finite and positive, got {0}")]
    SamplingFrequency(f64),

    #[error("cohort {cohort}: subject {subject} does not match the region/sample layout of the cohort")]
    RaggedTensor { cohort: Cohort, subject: usize },

    #[error("cohort {0} is missing")]
    MissingCohort(Cohort),

    #[error("cohort {0} is given more than once")]
    DuplicateCohort(Cohort),

    #[error("cohort {cohort} has {regions} region(s) where {expected} were expected")]
    RegionCountMismatch { cohort: Cohort, regions: usize, expected: usize },
}
