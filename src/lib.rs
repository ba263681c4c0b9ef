#![allow(non_snake_case)]

pub mod classifier;
pub mod cohort;
pub mod cv;
pub mod data;
pub mod error;
pub mod features;
pub mod param;
pub mod selection;
pub mod spectrum;
pub mod sweep;
pub mod utils;

use cohort::CohortSet;
use cv::{CrossValidationEvaluator, EvaluationResult};
use data::LabeledDataset;
use error::Result;
use features::FeatureExtractor;
use param::Param;
use sweep::{SweepReport, SweepRunner};

use log::debug;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

/// Region reconciliation, feature extraction on a pool of
/// `general.thread_number` workers, then feature-count reconciliation. Each
/// reconciliation either happens explicitly (and is logged) or its mismatch
/// is an error.
pub fn prepare_dataset(mut set: CohortSet, param: &Param) -> Result<LabeledDataset> {
    if param.data.truncate_regions {
        set.truncate_regions();
    } else {
        set.check_regions()?;
    }
    cinfo!(param.general.display_colorful, "\x1b[2;97m{}\x1b[0m", set);

    let extractor = FeatureExtractor::from_param(param)?;
    let thread_pool = rayon::ThreadPoolBuilder::new().num_threads(param.general.thread_number.max(1)).build()?;
    let mut matrices = thread_pool.install(|| extractor.extract_all(&set))?;
    if param.data.truncate_features {
        matrices.truncate_to_min_features();
    }

    let dataset = LabeledDataset::from_cohorts(&matrices)?;
    debug!("{:?}", dataset);
    Ok(dataset)
}

/// Hit rate for a single K.
pub fn evaluate_k(set: CohortSet, k: usize, param: &Param) -> Result<EvaluationResult> {
    let dataset = prepare_dataset(set, param)?;
    CrossValidationEvaluator::from_param(dataset, param)?.evaluate(k)
}

pub fn run(param: &Param, running: Arc<AtomicBool>) -> Result<SweepReport> {
    let set = CohortSet::load_json(&param.data.path)?;
    run_on_cohorts(set, param, running)
}

pub fn run_on_cohorts(set: CohortSet, param: &Param, running: Arc<AtomicBool>) -> Result<SweepReport> {
    let start = std::time::Instant::now();

    let dataset = prepare_dataset(set, param)?;
    let evaluator = CrossValidationEvaluator::from_param(dataset, param)?;
    let report = SweepRunner::from_param(evaluator, param).run(&running)?;

    cinfo!(
        param.general.display_colorful,
        "Sweep of {} K value(s) completed in {:.2}s",
        report.points.len(),
        start.elapsed().as_secs_f64()
    );
    Ok(report)
}
