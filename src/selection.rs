//! Univariate feature ranking by one-way ANOVA across the three cohorts.
//!
//! Ranking is recomputed from scratch on every call: the evaluator calls it
//! once per fold with that fold's training rows only.

use ndarray::{Array2, ArrayView1};
use rayon::prelude::*;
use statrs::distribution::{ContinuousCDF, FisherSnedecor};
use std::cmp::Ordering;

use crate::error::{InvalidParameter, Result};

/// Number of cohorts compared by the test.
pub const N_CLASSES: usize = 3;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AnovaResult {
    pub f_statistic: f64,
    pub p_value: f64,
}

/// One-way ANOVA F-test over the non-empty groups.
///
/// The p-value is NaN whenever the test is undefined: fewer than two groups,
/// no residual degree of freedom, or every group constant (zero within-group
/// variance).
pub fn one_way_anova(groups: &[Vec<f64>]) -> AnovaResult {
    let groups: Vec<&Vec<f64>> = groups.iter().filter(|g| !g.is_empty()).collect();
    let k = groups.len();
    let n: usize = groups.iter().map(|g| g.len()).sum();

    if k < 2 || n <= k {
        return AnovaResult { f_statistic: f64::NAN, p_value: f64::NAN };
    }
    if groups.iter().all(|g| g.iter().all(|&v| v == g[0])) {
        return AnovaResult { f_statistic: f64::NAN, p_value: f64::NAN };
    }

    let grand_mean = groups.iter().flat_map(|g| g.iter()).sum::<f64>() / n as f64;
    let mut ss_between = 0.0;
    let mut ss_within = 0.0;
    for g in &groups {
        let mean = g.iter().sum::<f64>() / g.len() as f64;
        ss_between += g.len() as f64 * (mean - grand_mean).powi(2);
        ss_within += g.iter().map(|v| (v - mean).powi(2)).sum::<f64>();
    }

    let df_between = (k - 1) as f64;
    let df_within = (n - k) as f64;
    let f_statistic = (ss_between / df_between) / (ss_within / df_within);

    let p_value = match FisherSnedecor::new(df_between, df_within) {
        Ok(dist) if f_statistic.is_finite() => dist.sf(f_statistic),
        _ => f64::NAN,
    };

    AnovaResult { f_statistic, p_value }
}

/// A feature's test outcome. `p_value` is always finite: undefined tests are
/// stored as 1.0 with `defined == false` and rank after every defined one.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FeatureScore {
    pub index: usize,
    pub f_statistic: f64,
    pub p_value: f64,
    pub defined: bool,
}

fn score_feature(index: usize, column: ArrayView1<f64>, y: &[usize]) -> FeatureScore {
    let mut groups = vec![Vec::new(); N_CLASSES];
    for (&value, &label) in column.iter().zip(y) {
        if label < N_CLASSES {
            groups[label].push(value);
        }
    }

    let anova = one_way_anova(&groups);
    if anova.p_value.is_finite() {
        FeatureScore { index, f_statistic: anova.f_statistic, p_value: anova.p_value, defined: true }
    } else {
        FeatureScore { index, f_statistic: anova.f_statistic, p_value: 1.0, defined: false }
    }
}

/// All features ordered by ascending p-value, undefined tests last, ties kept
/// in column order.
pub fn rank_features(X: &Array2<f64>, y: &[usize]) -> Vec<FeatureScore> {
    let mut scores: Vec<FeatureScore> =
        (0..X.ncols()).into_par_iter().map(|j| score_feature(j, X.column(j), y)).collect();

    // stable sort: equal keys keep ascending column index
    scores.sort_by(|a, b| match (a.defined, b.defined) {
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        _ => a.p_value.total_cmp(&b.p_value),
    });
    scores
}

/// Indices of the `k` most separable columns.
pub fn select_features(X: &Array2<f64>, y: &[usize], k: usize) -> Result<Vec<usize>> {
    if k == 0 || k > X.ncols() {
        return Err(InvalidParameter::FeatureCount { k, available: X.ncols() }.into());
    }
    Ok(rank_features(X, y).into_iter().take(k).map(|score| score.index).collect())
}
