use crate::error::{Error, Result};
use crate::features::{FeatureKind, FrequencyBin, MissingBinPolicy};
use crate::sweep::OutputMode;
use log::warn;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;

// Field definitions and associated default values

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Param {
    #[serde(default)]
    pub general: General,
    #[serde(default)]
    pub data: Data,
    #[serde(default)]
    pub spectrum: Spectrum,
    #[serde(default)]
    pub features: Features,
    #[serde(default)]
    pub svm: Svm,
    #[serde(default)]
    pub sweep: Sweep,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct General {
    #[serde(default = "one_default")]
    pub thread_number: usize,
    #[serde(default = "log_base_default")]
    pub log_base: String,
    #[serde(default = "log_suffix_default")]
    pub log_suffix: String,
    #[serde(default = "log_level_default")]
    pub log_level: String,
    #[serde(default = "true_default")]
    pub display_colorful: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Data {
    #[serde(default = "empty_string")]
    pub path: String,
    #[serde(default = "true_default")]
    pub truncate_regions: bool,
    #[serde(default = "true_default")]
    pub truncate_features: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Spectrum {
    #[serde(default = "sampling_frequency_default")]
    pub sampling_frequency: f64,
    #[serde(default = "uzero_default")]
    pub segment_length: usize,
    #[serde(default = "true_default")]
    pub two_sided: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Features {
    #[serde(default = "strategy_default")]
    pub strategy: FeatureKind,
    #[serde(default = "bins_default")]
    pub bins: Vec<(f64, f64)>,
    #[serde(default = "bin_start_default")]
    pub bin_start: f64,
    #[serde(default = "bin_stop_default")]
    pub bin_stop: f64,
    #[serde(default = "bin_count_default")]
    pub bin_count: usize,
    #[serde(default = "missing_bin_default")]
    pub missing_bin: MissingBinPolicy,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Svm {
    #[serde(default = "c_default")]
    pub c: f64,
    #[serde(default = "zero_default")]
    pub kernel_eps: f64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Sweep {
    #[serde(default = "one_default")]
    pub k_start: usize,
    #[serde(default = "uzero_default")]
    pub k_stop: usize,
    #[serde(default = "uzero_default")]
    pub k_step: usize,
    #[serde(default = "output_default")]
    pub output: OutputMode,
    #[serde(default = "empty_string")]
    pub output_path: String,
}

// Default section definitions

impl Default for General {
    fn default() -> Self {
        serde_json::from_value(serde_json::json!({})).unwrap()
    }
}

impl Default for Data {
    fn default() -> Self {
        serde_json::from_value(serde_json::json!({})).unwrap()
    }
}

impl Default for Spectrum {
    fn default() -> Self {
        serde_json::from_value(serde_json::json!({})).unwrap()
    }
}

impl Default for Features {
    fn default() -> Self {
        serde_json::from_value(serde_json::json!({})).unwrap()
    }
}

impl Default for Svm {
    fn default() -> Self {
        serde_json::from_value(serde_json::json!({})).unwrap()
    }
}

impl Default for Sweep {
    fn default() -> Self {
        serde_json::from_value(serde_json::json!({})).unwrap()
    }
}

impl Default for Param {
    fn default() -> Self {
        serde_json::from_value(serde_json::json!({})).unwrap()
    }
}

impl Param {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Features {
    /// Explicit `bins` win over the uniform `bin_start..bin_stop` grid.
    pub fn frequency_bins(&self) -> Result<Vec<FrequencyBin>> {
        if self.bins.is_empty() {
            FrequencyBin::uniform(self.bin_start, self.bin_stop, self.bin_count)
        } else {
            self.bins.iter().map(|&(min, max)| FrequencyBin::new(min, max)).collect()
        }
    }
}

pub fn get(param_file: String) -> Result<Param> {
    let param_file_reader = File::open(param_file)?;
    let param_reader = BufReader::new(param_file_reader);

    let mut config: Param = serde_yaml::from_reader(param_reader)?;

    validate(&mut config).map_err(Error::Config)?;

    Ok(config)
}

pub fn validate(param: &mut Param) -> std::result::Result<(), String> {
    if !param.general.log_base.is_empty() {
        param.general.display_colorful = false;
    }

    if param.general.thread_number == 0 {
        warn!("thread_number=0: falling back to a single worker thread.");
        param.general.thread_number = 1;
    }

    if !param.spectrum.sampling_frequency.is_finite() || param.spectrum.sampling_frequency <= 0.0 {
        return Err(format!(
            "Invalid sampling_frequency={}. Must be finite and > 0.",
            param.spectrum.sampling_frequency
        ));
    }

    validate_bins(param)?;

    if !param.svm.c.is_finite() || param.svm.c <= 0.0 {
        return Err(format!("Invalid svm.c={:.3}. Must be > 0.", param.svm.c));
    }
    if !param.svm.kernel_eps.is_finite() || param.svm.kernel_eps < 0.0 {
        return Err(format!(
            "Invalid svm.kernel_eps={:.3}. Must be >= 0 (0 selects the scale heuristic).",
            param.svm.kernel_eps
        ));
    }

    validate_sweep(param)?;
    Ok(())
}

fn validate_bins(param: &Param) -> std::result::Result<(), String> {
    let bins = param.features.frequency_bins().map_err(|e| e.to_string())?;

    let nyquist = param.spectrum.sampling_frequency / 2.0;
    let lowest = if param.spectrum.two_sided { -nyquist } else { 0.0 };
    if bins.iter().any(|bin| bin.max <= lowest || bin.min > nyquist) {
        warn!(
            "Some frequency bins lie outside the estimated spectrum [{}, {}]: they will hold no frequency sample.",
            lowest, nyquist
        );
    }

    if param.features.missing_bin == MissingBinPolicy::zero_fill {
        warn!("missing_bin=zero_fill: bins without frequency samples are written as 0.0.");
    }

    Ok(())
}

fn validate_sweep(param: &Param) -> std::result::Result<(), String> {
    if param.sweep.k_start == 0 {
        return Err("Invalid k_start=0. The number of selected features must be >= 1.".to_string());
    }

    if param.sweep.k_stop != 0 && param.sweep.k_stop < param.sweep.k_start {
        return Err(format!(
            "Invalid sweep range: k_stop={} < k_start={}.",
            param.sweep.k_stop, param.sweep.k_start
        ));
    }

    if param.sweep.output != OutputMode::log && param.sweep.output_path.is_empty() {
        return Err(format!("Output mode {:?} requires sweep.output_path.", param.sweep.output));
    }

    Ok(())
}

// Default value definitions

fn empty_string() -> String {
    "".to_string()
}
fn log_base_default() -> String {
    "".to_string()
}
fn log_suffix_default() -> String {
    "log".to_string()
}
fn log_level_default() -> String {
    "info".to_string()
}
fn strategy_default() -> FeatureKind {
    FeatureKind::peak_frequency
}
fn bins_default() -> Vec<(f64, f64)> {
    Vec::new()
}
fn bin_start_default() -> f64 {
    -0.5
}
fn bin_stop_default() -> f64 {
    0.5
}
fn bin_count_default() -> usize {
    20
}
fn missing_bin_default() -> MissingBinPolicy {
    MissingBinPolicy::fail
}
fn sampling_frequency_default() -> f64 {
    1.0
}
fn c_default() -> f64 {
    1.0
}
fn output_default() -> OutputMode {
    OutputMode::log
}
fn true_default() -> bool {
    true
}
fn zero_default() -> f64 {
    0.0
}
fn uzero_default() -> usize {
    0
}
fn one_default() -> usize {
    1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_param() {
        let param = Param::default();
        assert_eq!(param.general.thread_number, 1);
        assert_eq!(param.general.log_level, "info");
        assert_eq!(param.spectrum.sampling_frequency, 1.0);
        assert!(param.spectrum.two_sided, "the default spectrum must be two-sided");
        assert_eq!(param.features.strategy, FeatureKind::peak_frequency);
        assert_eq!(param.features.missing_bin, MissingBinPolicy::fail);
        assert_eq!(param.sweep.k_start, 1);
        assert_eq!(param.sweep.output, OutputMode::log);
    }

    #[test]
    fn test_default_bins_cover_two_sided_range() {
        let bins = Param::default().features.frequency_bins().unwrap();
        assert_eq!(bins.len(), 20);
        assert_eq!(bins[0].min, -0.5);
        assert_eq!(bins[10].min, 0.0, "the grid must hit 0 exactly");
        assert_eq!(bins[19].max, 0.5);
    }

    #[test]
    fn test_explicit_bins_override_grid() {
        let yaml = "features:\n  strategy: total_power\n  bins: [[0.0, 0.1], [0.1, 0.25]]\n";
        let param: Param = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(param.features.strategy, FeatureKind::total_power);
        let bins = param.features.frequency_bins().unwrap();
        assert_eq!(bins, vec![FrequencyBin::new(0.0, 0.1).unwrap(), FrequencyBin::new(0.1, 0.25).unwrap()]);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut param = Param::default();
        param.spectrum.sampling_frequency = 0.0;
        assert!(validate(&mut param).is_err(), "fs=0 must be rejected");

        let mut param = Param::default();
        param.features.bins = vec![(0.2, 0.1)];
        assert!(validate(&mut param).is_err(), "reversed bin must be rejected");

        let mut param = Param::default();
        param.features.bin_count = 0;
        assert!(validate(&mut param).is_err(), "empty grid must be rejected");

        let mut param = Param::default();
        param.svm.c = -1.0;
        assert!(validate(&mut param).is_err(), "negative C must be rejected");

        let mut param = Param::default();
        param.sweep.k_start = 5;
        param.sweep.k_stop = 2;
        assert!(validate(&mut param).is_err(), "k_stop < k_start must be rejected");

        let mut param = Param::default();
        param.sweep.output = OutputMode::csv;
        assert!(validate(&mut param).is_err(), "csv output needs a path");
    }

    #[test]
    fn test_param_yaml_round_trip() {
        let mut param = Param::default();
        param.features.strategy = FeatureKind::spectral_entropy;
        param.sweep.k_stop = 12;
        let yaml = serde_yaml::to_string(&param).unwrap();
        let loaded: Param = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(loaded, param, "every field must survive a YAML round trip");
    }

    #[test]
    fn test_validate_adjusts_logging_and_threads() {
        let mut param = Param::default();
        param.general.log_base = "run".to_string();
        param.general.thread_number = 0;
        validate(&mut param).unwrap();
        assert!(!param.general.display_colorful, "file logging disables colours");
        assert_eq!(param.general.thread_number, 1);
    }
}
