use log::debug;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::classifier::SvmClassifier;
use crate::data::LabeledDataset;
use crate::error::{InvalidParameter, Result};
use crate::param::Param;
use crate::selection::select_features;

/// Outcome of holding out a single subject.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FoldOutcome {
    pub held_out: usize,
    pub features: Vec<usize>,
    pub predicted: usize,
    pub truth: usize,
}

impl FoldOutcome {
    pub fn is_hit(&self) -> bool {
        self.predicted == self.truth
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EvaluationResult {
    pub k: usize,
    pub hit_rate: f64,
    pub correct: usize,
    pub n_folds: usize,
    pub predictions: Vec<usize>,
    pub truths: Vec<usize>,
    /// Top-K feature indices chosen inside each fold, in fold order.
    pub fold_rankings: Vec<Vec<usize>>,
}

impl EvaluationResult {
    fn from_folds(k: usize, folds: Vec<FoldOutcome>) -> EvaluationResult {
        let n_folds = folds.len();
        let correct = folds.iter().filter(|fold| fold.is_hit()).count();
        let hit_rate = if n_folds == 0 { 0.0 } else { correct as f64 / n_folds as f64 };

        let mut predictions = Vec::with_capacity(n_folds);
        let mut truths = Vec::with_capacity(n_folds);
        let mut fold_rankings = Vec::with_capacity(n_folds);
        for fold in folds {
            predictions.push(fold.predicted);
            truths.push(fold.truth);
            fold_rankings.push(fold.features);
        }

        EvaluationResult { k, hit_rate, correct, n_folds, predictions, truths, fold_rankings }
    }
}

/// Leave-one-subject-out evaluation: every fold ranks features on its own
/// training rows, standardises, fits and predicts the held-out subject.
pub struct CrossValidationEvaluator {
    dataset: LabeledDataset,
    classifier: SvmClassifier,
    thread_number: usize,
}

impl CrossValidationEvaluator {
    /// Fails when a cohort holds fewer than two subjects.
    pub fn new(dataset: LabeledDataset, classifier: SvmClassifier, thread_number: usize) -> Result<CrossValidationEvaluator> {
        dataset.check_classes()?;
        Ok(CrossValidationEvaluator { dataset, classifier, thread_number: thread_number.max(1) })
    }

    pub fn from_param(dataset: LabeledDataset, param: &Param) -> Result<CrossValidationEvaluator> {
        CrossValidationEvaluator::new(dataset, SvmClassifier::from_param(&param.svm), param.general.thread_number)
    }

    pub fn dataset(&self) -> &LabeledDataset {
        &self.dataset
    }

    pub fn feature_len(&self) -> usize {
        self.dataset.feature_len
    }

    /// Runs all folds for one K. K is checked before any fold starts.
    pub fn evaluate(&self, k: usize) -> Result<EvaluationResult> {
        if k == 0 || k > self.dataset.feature_len {
            return Err(InvalidParameter::FeatureCount { k, available: self.dataset.feature_len }.into());
        }

        let n = self.dataset.sample_len;
        let thread_pool = rayon::ThreadPoolBuilder::new().num_threads(self.thread_number).build()?;

        let folds: Vec<FoldOutcome> =
            thread_pool.install(|| (0..n).into_par_iter().map(|s| self.run_fold(s, k)).collect::<Result<Vec<_>>>())?;

        Ok(EvaluationResult::from_folds(k, folds))
    }

    /// Holds out row `held_out`; nothing computed here sees that row before
    /// the final prediction.
    pub fn run_fold(&self, held_out: usize, k: usize) -> Result<FoldOutcome> {
        debug!("Subject {}/{}, K={}", held_out + 1, self.dataset.sample_len, k);

        let training = self.dataset.without_sample(held_out);
        let features = select_features(&training.X, &training.y, k)?;

        let train_X = training.project(&features);
        let test_row = self.dataset.row(held_out).select(ndarray::Axis(0), &features);
        let predicted = self.classifier.fit_predict(&train_X, &training.y, &test_row)?;

        Ok(FoldOutcome { held_out, features, predicted, truth: self.dataset.y[held_out] })
    }
}
