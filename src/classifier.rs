//! Per-fold standardisation and the multi-class RBF support vector machine.
//!
//! Three binary machines are trained one-vs-rest; the class whose machine
//! reports the highest probability wins, the lowest label on ties.

use linfa::dataset::Pr;
use linfa::traits::{Fit, Predict};
use linfa::Dataset;
use linfa_svm::{Svm, SvmParams};
use ndarray::{Array1, Array2, Axis};

use crate::error::{Error, Result};
use crate::param;
use crate::selection::N_CLASSES;
use crate::utils::mean_and_variance;

/// Centres each column on its training mean and divides by its population
/// standard deviation. Zero-variance columns are only centred.
#[derive(Clone, Debug, PartialEq)]
pub struct StandardScaler {
    pub mean: Array1<f64>,
    pub scale: Array1<f64>,
}

impl StandardScaler {
    pub fn fit(X: &Array2<f64>) -> StandardScaler {
        let mut mean = Array1::zeros(X.ncols());
        let mut scale = Array1::ones(X.ncols());
        for (j, column) in X.axis_iter(Axis(1)).enumerate() {
            let (m, variance) = mean_and_variance(&column.to_vec());
            mean[j] = m;
            if variance > 0.0 {
                scale[j] = variance.sqrt();
            }
        }
        StandardScaler { mean, scale }
    }

    pub fn transform(&self, X: &Array2<f64>) -> Array2<f64> {
        (X - &self.mean) / &self.scale
    }

    pub fn transform_row(&self, row: &Array1<f64>) -> Array1<f64> {
        (row - &self.mean) / &self.scale
    }
}

/// Width of the Gaussian kernel `exp(-|x-y|^2 / eps)`. A configured value
/// wins; otherwise `features * variance(X)` over the whole matrix.
pub fn kernel_eps(X: &Array2<f64>, configured: f64) -> f64 {
    if configured > 0.0 {
        return configured;
    }
    let n_features = X.ncols().max(1) as f64;
    let values: Vec<f64> = X.iter().copied().collect();
    let (_, variance) = mean_and_variance(&values);
    if variance > 0.0 {
        n_features * variance
    } else {
        n_features
    }
}

pub struct SvmClassifier {
    c: f64,
    kernel_eps: f64,
}

pub struct FittedSvm {
    scaler: StandardScaler,
    machines: Vec<(usize, Svm<f64, Pr>)>,
}

impl SvmClassifier {
    pub fn new(c: f64, kernel_eps: f64) -> SvmClassifier {
        SvmClassifier { c, kernel_eps }
    }

    pub fn from_param(svm: &param::Svm) -> SvmClassifier {
        SvmClassifier::new(svm.c, svm.kernel_eps)
    }

    /// Fits the scaler and the one-vs-rest machines on the training rows.
    pub fn fit(&self, X: &Array2<f64>, y: &[usize]) -> Result<FittedSvm> {
        if X.nrows() != y.len() || X.nrows() == 0 {
            return Err(Error::Classifier(format!("{} rows for {} labels", X.nrows(), y.len())));
        }

        let scaler = StandardScaler::fit(X);
        let scaled = scaler.transform(X);
        let eps = kernel_eps(&scaled, self.kernel_eps);

        let params: SvmParams<f64, Pr> = Svm::<f64, Pr>::params().pos_neg_weights(self.c, self.c).gaussian_kernel(eps);

        let mut machines = Vec::with_capacity(N_CLASSES);
        for label in 0..N_CLASSES {
            let targets: Array1<bool> = y.iter().map(|&l| l == label).collect();
            if !targets.iter().any(|&t| t) {
                continue;
            }
            let dataset = Dataset::new(scaled.clone(), targets);
            let machine = params
                .fit(&dataset)
                .map_err(|e| Error::Classifier(format!("class {}: {}", label, e)))?;
            machines.push((label, machine));
        }

        Ok(FittedSvm { scaler, machines })
    }

    /// Trains on `(X, y)` and labels a single held-out row.
    pub fn fit_predict(&self, X: &Array2<f64>, y: &[usize], test: &Array1<f64>) -> Result<usize> {
        self.fit(X, y)?.predict_row(test)
    }
}

impl FittedSvm {
    pub fn predict(&self, X: &Array2<f64>) -> Result<Vec<usize>> {
        let scaled = self.scaler.transform(X);
        let mut best: Vec<Option<(usize, f32)>> = vec![None; X.nrows()];

        for (label, machine) in &self.machines {
            let probabilities: Array1<Pr> = machine.predict(&scaled);
            for (slot, p) in best.iter_mut().zip(probabilities.iter()) {
                let p = **p;
                // strict comparison keeps the lowest label on ties
                if slot.map_or(true, |(_, current)| p > current) {
                    *slot = Some((*label, p));
                }
            }
        }

        best.into_iter()
            .map(|slot| slot.map(|(label, _)| label).ok_or_else(|| Error::Classifier("no fitted machine".to_string())))
            .collect()
    }

    pub fn predict_row(&self, row: &Array1<f64>) -> Result<usize> {
        let X = row.clone().insert_axis(Axis(0));
        let predictions = self.predict(&X)?;
        predictions.first().copied().ok_or_else(|| Error::Classifier("empty prediction".to_string()))
    }
}
