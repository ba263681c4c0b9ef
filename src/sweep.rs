use chrono::Local;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::cinfo;
use crate::cv::CrossValidationEvaluator;
use crate::error::{InvalidParameter, Result};
use crate::features::FeatureKind;
use crate::param::Param;
use crate::utils::k_range;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[allow(non_camel_case_types)]
pub enum OutputMode {
    log,
    csv,
    json,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SweepPoint {
    pub k: usize,
    pub hit_rate: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SweepReport {
    pub version: String,
    pub timestamp: String,
    pub strategy: FeatureKind,
    pub feature_len: usize,
    pub points: Vec<SweepPoint>,
}

/// `CARGO_PKG_VERSION#short-sha`, the sha coming from build.rs.
pub fn version() -> String {
    format!("{}#{}", env!("CARGO_PKG_VERSION"), option_env!("SPECTRAL_COHORTS_GIT_SHA").unwrap_or("unknown"))
}

impl SweepReport {
    pub fn new(strategy: FeatureKind, feature_len: usize) -> SweepReport {
        SweepReport {
            version: version(),
            timestamp: Local::now().format("%Y-%m-%d_%H-%M-%S").to_string(),
            strategy,
            feature_len,
            points: Vec::new(),
        }
    }

    /// The curve as (K, hit rate) pairs.
    pub fn curve(&self) -> Vec<(usize, f64)> {
        self.points.iter().map(|p| (p.k, p.hit_rate)).collect()
    }

    pub fn write<P: AsRef<Path>>(&self, mode: OutputMode, path: P, colorful: bool) -> Result<()> {
        match mode {
            OutputMode::log => {
                cinfo!(colorful, "\x1b[1;96m{} features, {} strategy\x1b[0m", self.feature_len, self.strategy);
                for point in &self.points {
                    cinfo!(colorful, "K={:<5} hit rate {:.2}%", point.k, point.hit_rate * 100.0);
                }
            }
            OutputMode::csv => {
                let mut writer = csv::Writer::from_path(path.as_ref())?;
                for point in &self.points {
                    writer.serialize(point)?;
                }
                writer.flush()?;
                info!("Sweep written to {}", path.as_ref().display());
            }
            OutputMode::json => {
                let writer = BufWriter::new(File::create(path.as_ref())?);
                serde_json::to_writer_pretty(writer, self)?;
                info!("Sweep written to {}", path.as_ref().display());
            }
        }
        Ok(())
    }
}

/// Evaluates K over `start, start+step, ..., stop`.
pub struct SweepRunner {
    evaluator: CrossValidationEvaluator,
    strategy: FeatureKind,
    k_start: usize,
    k_stop: usize,
    k_step: usize,
    colorful: bool,
}

impl SweepRunner {
    /// `k_stop == 0` means every feature, `k_step == 0` the default step
    /// `floor((feature_count + 1) / 5)` (at least 1).
    pub fn new(
        evaluator: CrossValidationEvaluator,
        strategy: FeatureKind,
        k_start: usize,
        k_stop: usize,
        k_step: usize,
    ) -> SweepRunner {
        SweepRunner { evaluator, strategy, k_start, k_stop, k_step, colorful: false }
    }

    pub fn from_param(evaluator: CrossValidationEvaluator, param: &Param) -> SweepRunner {
        let mut runner = SweepRunner::new(
            evaluator,
            param.features.strategy,
            param.sweep.k_start,
            param.sweep.k_stop,
            param.sweep.k_step,
        );
        runner.colorful = param.general.display_colorful;
        runner
    }

    /// The K values to run. Every one is checked against the feature count
    /// before the first evaluation.
    pub fn ks(&self) -> Result<Vec<usize>> {
        let available = self.evaluator.feature_len();
        let stop = if self.k_stop == 0 { available } else { self.k_stop };
        let step = if self.k_step == 0 { ((available + 1) / 5).max(1) } else { self.k_step };

        if self.k_start == 0 || self.k_start > available {
            return Err(InvalidParameter::FeatureCount { k: self.k_start, available }.into());
        }
        if stop > available {
            return Err(InvalidParameter::FeatureCount { k: stop, available }.into());
        }
        Ok(k_range(self.k_start, stop, step))
    }

    /// Stops between two K values once `running` drops, returning the
    /// points completed so far.
    pub fn run(&self, running: &AtomicBool) -> Result<SweepReport> {
        let ks = self.ks()?;
        let mut report = SweepReport::new(self.strategy, self.evaluator.feature_len());

        cinfo!(
            self.colorful,
            "\x1b[1;93mSweeping K over {:?} ({} folds each)\x1b[0m",
            ks,
            self.evaluator.dataset().sample_len
        );
        for k in ks {
            if !running.load(Ordering::Relaxed) {
                warn!("Sweep interrupted, {} K value(s) completed", report.points.len());
                break;
            }
            let result = self.evaluator.evaluate(k)?;
            info!("K={} hit rate {:.2}% ({}/{})", k, result.hit_rate * 100.0, result.correct, result.n_folds);
            report.points.push(SweepPoint { k, hit_rate: result.hit_rate });
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::SvmClassifier;
    use crate::cohort::Cohort;
    use crate::data::{CohortMatrices, LabeledDataset};
    use crate::error::Error;
    use ndarray::Array2;

    fn create_test_evaluator(features: usize) -> CrossValidationEvaluator {
        let matrices = Cohort::ALL
            .iter()
            .map(|&cohort| {
                let m = Array2::from_shape_fn((3, features), |(i, j)| {
                    cohort.label() as f64 * 5.0 + ((i * 7 + j * 3) % 5) as f64 * 0.2
                });
                (cohort, m)
            })
            .collect();
        let dataset = LabeledDataset::from_cohorts(&CohortMatrices { matrices }).unwrap();
        CrossValidationEvaluator::new(dataset, SvmClassifier::new(1.0, 0.0), 1).unwrap()
    }

    #[test]
    fn test_default_k_range() {
        let runner = SweepRunner::new(create_test_evaluator(10), FeatureKind::peak_frequency, 1, 0, 0);
        assert_eq!(runner.ks().unwrap(), vec![1, 3, 5, 7, 9], "step floor(11/5)=2 up to the feature count");

        let runner = SweepRunner::new(create_test_evaluator(3), FeatureKind::peak_frequency, 1, 0, 0);
        assert_eq!(runner.ks().unwrap(), vec![1, 2, 3], "the default step never drops to 0");
    }

    #[test]
    fn test_out_of_range_stop_is_rejected() {
        let runner = SweepRunner::new(create_test_evaluator(4), FeatureKind::total_power, 1, 5, 1);
        assert!(matches!(
            runner.ks(),
            Err(Error::InvalidParameter(InvalidParameter::FeatureCount { k: 5, available: 4 }))
        ));
    }

    #[test]
    fn test_interrupted_sweep_returns_prefix() {
        let runner = SweepRunner::new(create_test_evaluator(4), FeatureKind::average_power, 1, 4, 1);
        let stopped = AtomicBool::new(false);
        let report = runner.run(&stopped).unwrap();
        assert!(report.points.is_empty(), "no K should run once the flag is down");
        assert_eq!(report.strategy, FeatureKind::average_power);
    }

    #[test]
    fn test_sweep_points_follow_ks() {
        let runner = SweepRunner::new(create_test_evaluator(4), FeatureKind::peak_frequency, 2, 4, 2);
        let report = runner.run(&AtomicBool::new(true)).unwrap();
        let ks: Vec<usize> = report.curve().iter().map(|(k, _)| *k).collect();
        assert_eq!(ks, vec![2, 4]);
        assert!(report.points.iter().all(|p| (0.0..=1.0).contains(&p.hit_rate)));
        assert!(report.version.starts_with(env!("CARGO_PKG_VERSION")));
    }

    #[test]
    fn test_write_csv_and_json() {
        let mut report = SweepReport::new(FeatureKind::spectral_entropy, 10);
        report.points = vec![SweepPoint { k: 1, hit_rate: 0.5 }, SweepPoint { k: 3, hit_rate: 0.75 }];

        let dir = std::env::temp_dir();
        let csv_path = dir.join(format!("spectral_cohorts_sweep_{}.csv", std::process::id()));
        report.write(OutputMode::csv, &csv_path, false).unwrap();
        let content = std::fs::read_to_string(&csv_path).unwrap();
        assert_eq!(content, "k,hit_rate\n1,0.5\n3,0.75\n");

        let json_path = dir.join(format!("spectral_cohorts_sweep_{}.json", std::process::id()));
        report.write(OutputMode::json, &json_path, false).unwrap();
        let loaded: SweepReport = serde_json::from_reader(File::open(&json_path).unwrap()).unwrap();
        assert_eq!(loaded, report);

        std::fs::remove_file(csv_path).unwrap();
        std::fs::remove_file(json_path).unwrap();
    }
}
