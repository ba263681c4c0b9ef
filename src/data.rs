use log::warn;
use ndarray::{Array1, Array2, Axis};
use std::fmt;

use crate::cohort::Cohort;
use crate::error::{InvalidParameter, Result};

/// One subjects x features matrix per cohort, in label order.
#[derive(Clone, Debug, PartialEq)]
pub struct CohortMatrices {
    pub matrices: Vec<(Cohort, Array2<f64>)>,
}

impl CohortMatrices {
    pub fn feature_lens(&self) -> Vec<usize> {
        self.matrices.iter().map(|(_, m)| m.ncols()).collect()
    }

    /// Common feature count, or an error when the cohorts disagree.
    pub fn check_feature_lens(&self) -> Result<usize> {
        let lengths = self.feature_lens();
        match lengths.first() {
            Some(&first) if lengths.iter().all(|&l| l == first) => Ok(first),
            _ => Err(InvalidParameter::FeatureLengthMismatch { lengths }.into()),
        }
    }

    /// Drops trailing columns so every cohort keeps the smallest feature
    /// count. Returns that count.
    pub fn truncate_to_min_features(&mut self) -> usize {
        let min_features = self.feature_lens().into_iter().min().unwrap_or(0);
        for (cohort, matrix) in self.matrices.iter_mut() {
            if matrix.ncols() > min_features {
                warn!("Cohort {}: truncating {} features to {}", cohort, matrix.ncols(), min_features);
                *matrix = matrix.slice(ndarray::s![.., ..min_features]).to_owned();
            }
        }
        min_features
    }
}

/// Rows of all cohorts stacked in label order with their labels alongside.
#[derive(Clone)]
pub struct LabeledDataset {
    pub X: Array2<f64>,
    pub y: Vec<usize>,
    pub samples: Vec<String>,
    pub feature_len: usize,
    pub sample_len: usize,
}

impl LabeledDataset {
    /// Stacks the cohort matrices. Feature counts must already agree.
    pub fn from_cohorts(cohorts: &CohortMatrices) -> Result<LabeledDataset> {
        let feature_len = cohorts.check_feature_lens()?;

        let views: Vec<_> = cohorts.matrices.iter().map(|(_, m)| m.view()).collect();
        let X = if views.is_empty() {
            Array2::zeros((0, feature_len))
        } else {
            ndarray::concatenate(Axis(0), &views)
                .map_err(|_| InvalidParameter::FeatureLengthMismatch { lengths: cohorts.feature_lens() })?
        };

        let mut y = Vec::with_capacity(X.nrows());
        let mut samples = Vec::with_capacity(X.nrows());
        for (cohort, matrix) in &cohorts.matrices {
            for i in 0..matrix.nrows() {
                y.push(cohort.label());
                samples.push(format!("{}#{}", cohort, i));
            }
        }

        Ok(LabeledDataset { sample_len: X.nrows(), feature_len, X, y, samples })
    }

    /// Fails when a class has fewer than two rows: the between-group test is
    /// undefined there.
    pub fn check_classes(&self) -> Result<()> {
        for cohort in Cohort::ALL {
            let subjects = self.y.iter().filter(|&&label| label == cohort.label()).count();
            if subjects < 2 {
                return Err(InvalidParameter::CohortTooSmall { cohort, subjects }.into());
            }
        }
        Ok(())
    }

    pub fn class_counts(&self) -> [usize; 3] {
        let mut counts = [0; 3];
        for &label in &self.y {
            counts[label] += 1;
        }
        counts
    }

    /// filter the dataset for some samples (represented by a slice of indices)
    pub fn subset(&self, samples: &[usize]) -> LabeledDataset {
        LabeledDataset {
            X: self.X.select(Axis(0), samples),
            y: samples.iter().map(|&i| self.y[i]).collect(),
            samples: samples.iter().map(|&i| self.samples[i].clone()).collect(),
            feature_len: self.feature_len,
            sample_len: samples.len(),
        }
    }

    /// Every row but `held_out`, order preserved.
    pub fn without_sample(&self, held_out: usize) -> LabeledDataset {
        let kept: Vec<usize> = (0..self.sample_len).filter(|&i| i != held_out).collect();
        self.subset(&kept)
    }

    /// Keeps only the given columns, in the given order.
    pub fn project(&self, features: &[usize]) -> Array2<f64> {
        self.X.select(Axis(1), features)
    }

    pub fn row(&self, sample: usize) -> Array1<f64> {
        self.X.row(sample).to_owned()
    }
}

impl fmt::Display for LabeledDataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let counts = self.class_counts();
        writeln!(f, "Features: {}   Samples: {}", self.feature_len, self.sample_len)?;
        for cohort in Cohort::ALL {
            writeln!(f, "  {:<18} {}", cohort.name(), counts[cohort.label()])?;
        }

        // Limit to the first 10 rows
        for (i, sample) in self.samples.iter().enumerate().take(10) {
            let row_display: String =
                self.X.row(i).iter().map(|v| format!("{:.3}", v)).collect::<Vec<_>>().join("\t");
            let truncated_row = if row_display.len() > 80 { format!("{}...", &row_display[..77]) } else { row_display };
            writeln!(f, "{:<22} {}", sample, truncated_row)?;
        }

        Ok(())
    }
}

impl fmt::Debug for LabeledDataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Reuse the Display formatter
        write!(f, "{}", self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use ndarray::array;

    fn create_test_matrices() -> CohortMatrices {
        CohortMatrices {
            matrices: vec![
                (Cohort::Healthy, array![[0.0, 1.0, 2.0], [0.1, 1.1, 2.1]]),
                (Cohort::AdhdInattentive, array![[10.0, 11.0, 12.0], [10.1, 11.1, 12.1], [10.2, 11.2, 12.2]]),
                (Cohort::AdhdHyperactive, array![[20.0, 21.0, 22.0], [20.1, 21.1, 22.1]]),
            ],
        }
    }

    #[test]
    fn test_from_cohorts_preserves_row_order_and_labels() {
        let data = LabeledDataset::from_cohorts(&create_test_matrices()).unwrap();
        assert_eq!(data.sample_len, 7);
        assert_eq!(data.feature_len, 3);
        assert_eq!(data.y, vec![0, 0, 1, 1, 1, 2, 2], "labels must follow the stacked cohort rows");
        assert_eq!(data.X[[3, 0]], 10.1, "row order must be preserved inside a cohort");
        assert_eq!(data.samples[5], "adhd_hyperactive#0");
        assert_eq!(data.class_counts(), [2, 3, 2]);
        assert!(data.check_classes().is_ok());
    }

    #[test]
    fn test_feature_length_mismatch_is_explicit() {
        let mut cohorts = create_test_matrices();
        cohorts.matrices[1].1 = array![[10.0, 11.0], [10.1, 11.1], [10.2, 11.2]];

        assert!(matches!(
            LabeledDataset::from_cohorts(&cohorts),
            Err(Error::InvalidParameter(InvalidParameter::FeatureLengthMismatch { .. }))
        ), "unreconciled feature counts must be rejected");

        assert_eq!(cohorts.truncate_to_min_features(), 2);
        assert_eq!(cohorts.feature_lens(), vec![2, 2, 2]);
        let data = LabeledDataset::from_cohorts(&cohorts).unwrap();
        assert_eq!(data.X.row(0).to_vec(), vec![0.0, 1.0], "truncation keeps the leading columns");
    }

    #[test]
    fn test_check_classes_requires_two_subjects() {
        let data = LabeledDataset::from_cohorts(&create_test_matrices()).unwrap();
        let reduced = data.subset(&[0, 1, 2, 3, 5]);
        assert!(matches!(
            reduced.check_classes(),
            Err(Error::InvalidParameter(InvalidParameter::CohortTooSmall { cohort: Cohort::AdhdHyperactive, subjects: 1 }))
        ));
    }

    #[test]
    fn test_subset_and_without_sample() {
        let data = LabeledDataset::from_cohorts(&create_test_matrices()).unwrap();

        let subset = data.subset(&[6, 0]);
        assert_eq!(subset.y, vec![2, 0], "the subset y should follow the given indices");
        assert_eq!(subset.X.row(0).to_vec(), vec![20.1, 21.1, 22.1]);
        assert_eq!(subset.sample_len, 2);

        let training = data.without_sample(3);
        assert_eq!(training.sample_len, 6);
        assert!(!training.samples.contains(&"adhd_inattentive#1".to_string()), "the held-out row must be gone");
        assert_eq!(training.y, vec![0, 0, 1, 1, 2, 2]);
    }

    #[test]
    fn test_project_keeps_requested_column_order() {
        let data = LabeledDataset::from_cohorts(&create_test_matrices()).unwrap();
        let projected = data.project(&[2, 0]);
        assert_eq!(projected.dim(), (7, 2));
        assert_eq!(projected.row(2).to_vec(), vec![12.0, 10.0]);
    }
}
