use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use crate::error::{InvalidParameter, Result};

/// The three subject groups compared by the classifier. The label is fixed
/// per variant and never derived from iteration order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Cohort {
    Healthy,
    AdhdInattentive,
    AdhdHyperactive,
}

impl Cohort {
    pub const ALL: [Cohort; 3] = [Cohort::Healthy, Cohort::AdhdInattentive, Cohort::AdhdHyperactive];

    pub fn label(self) -> usize {
        match self {
            Cohort::Healthy => 0,
            Cohort::AdhdInattentive => 1,
            Cohort::AdhdHyperactive => 2,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Cohort::Healthy => "healthy",
            Cohort::AdhdInattentive => "adhd_inattentive",
            Cohort::AdhdHyperactive => "adhd_hyperactive",
        }
    }
}

impl fmt::Display for Cohort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Raw recordings of one cohort, shaped subjects x regions x samples.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CohortData {
    pub cohort: Cohort,
    pub subjects: Vec<Vec<Vec<f64>>>,
}

impl CohortData {
    pub fn new(cohort: Cohort, subjects: Vec<Vec<Vec<f64>>>) -> CohortData {
        CohortData { cohort, subjects }
    }

    pub fn subject_len(&self) -> usize {
        self.subjects.len()
    }

    pub fn region_len(&self) -> usize {
        self.subjects.first().map_or(0, |s| s.len())
    }

    pub fn sample_len(&self) -> usize {
        self.subjects.first().and_then(|s| s.first()).map_or(0, |r| r.len())
    }

    /// Checks the tensor is rectangular with non-empty series and holds at
    /// least two subjects.
    pub fn validate(&self) -> Result<()> {
        if self.subjects.len() < 2 {
            return Err(InvalidParameter::CohortTooSmall { cohort: self.cohort, subjects: self.subjects.len() }.into());
        }

        let regions = self.region_len();
        let samples = self.sample_len();
        for (subject, series) in self.subjects.iter().enumerate() {
            if series.len() != regions {
                return Err(InvalidParameter::RaggedTensor { cohort: self.cohort, subject }.into());
            }
            for (region, values) in series.iter().enumerate() {
                if values.is_empty() {
                    return Err(InvalidParameter::EmptyTimeSeries { cohort: self.cohort, subject, region }.into());
                }
                if values.len() != samples {
                    return Err(InvalidParameter::RaggedTensor { cohort: self.cohort, subject }.into());
                }
            }
        }
        if regions == 0 {
            return Err(InvalidParameter::RegionCountMismatch { cohort: self.cohort, regions: 0, expected: 1 }.into());
        }

        Ok(())
    }
}

/// The three cohorts in canonical label order.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CohortSet {
    pub cohorts: Vec<CohortData>,
}

impl CohortSet {
    /// Builds the set from an explicit list; every cohort must appear exactly
    /// once. Entries are reordered by label, subjects keep their order.
    pub fn new(mut cohorts: Vec<CohortData>) -> Result<CohortSet> {
        for (i, data) in cohorts.iter().enumerate() {
            if cohorts[..i].iter().any(|other| other.cohort == data.cohort) {
                return Err(InvalidParameter::DuplicateCohort(data.cohort).into());
            }
        }
        for cohort in Cohort::ALL {
            if !cohorts.iter().any(|data| data.cohort == cohort) {
                return Err(InvalidParameter::MissingCohort(cohort).into());
            }
        }
        cohorts.sort_by_key(|data| data.cohort.label());

        for data in &cohorts {
            data.validate()?;
        }

        Ok(CohortSet { cohorts })
    }

    /// Reads `[{"cohort": "healthy", "subjects": [[[...]]]}, ...]`.
    pub fn load_json<P: AsRef<Path>>(path: P) -> Result<CohortSet> {
        let path = path.as_ref();
        info!("Loading cohorts from {}...", path.display());
        let reader = BufReader::new(File::open(path)?);
        let cohorts: Vec<CohortData> = serde_json::from_reader(reader)?;
        CohortSet::new(cohorts)
    }

    pub fn region_counts(&self) -> Vec<usize> {
        self.cohorts.iter().map(CohortData::region_len).collect()
    }

    /// Fails unless every cohort records the same number of regions.
    pub fn check_regions(&self) -> Result<usize> {
        let expected = self.cohorts.first().map_or(0, CohortData::region_len);
        for data in &self.cohorts {
            if data.region_len() != expected {
                return Err(InvalidParameter::RegionCountMismatch {
                    cohort: data.cohort,
                    regions: data.region_len(),
                    expected,
                }
                .into());
            }
        }
        Ok(expected)
    }

    /// Keeps the first `min` regions of every subject, `min` being the
    /// smallest region count across cohorts. Returns that count.
    pub fn truncate_regions(&mut self) -> usize {
        let min_regions = self.region_counts().into_iter().min().unwrap_or(0);
        for data in self.cohorts.iter_mut() {
            if data.region_len() > min_regions {
                warn!("Cohort {}: keeping {} of {} regions", data.cohort, min_regions, data.region_len());
                for subject in data.subjects.iter_mut() {
                    subject.truncate(min_regions);
                }
            }
        }
        min_regions
    }
}

impl fmt::Display for CohortSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for data in &self.cohorts {
            writeln!(
                f,
                "{:<18} subjects: {:<4} regions: {:<4} samples: {}",
                data.cohort.name(),
                data.subject_len(),
                data.region_len(),
                data.sample_len()
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    fn cohort(cohort: Cohort, subjects: usize, regions: usize, samples: usize) -> CohortData {
        let subjects = (0..subjects)
            .map(|s| (0..regions).map(|r| (0..samples).map(|i| (s + r + i) as f64).collect()).collect())
            .collect();
        CohortData::new(cohort, subjects)
    }

    #[test]
    fn test_cohort_labels_are_fixed() {
        assert_eq!(Cohort::Healthy.label(), 0);
        assert_eq!(Cohort::AdhdInattentive.label(), 1);
        assert_eq!(Cohort::AdhdHyperactive.label(), 2);
        let labels: Vec<usize> = Cohort::ALL.iter().map(|c| c.label()).collect();
        assert_eq!(labels, vec![0, 1, 2], "ALL must follow label order");
    }

    #[test]
    fn test_new_reorders_by_label() {
        let set = CohortSet::new(vec![
            cohort(Cohort::AdhdHyperactive, 2, 1, 8),
            cohort(Cohort::Healthy, 3, 1, 8),
            cohort(Cohort::AdhdInattentive, 2, 1, 8),
        ])
        .unwrap();
        let order: Vec<Cohort> = set.cohorts.iter().map(|d| d.cohort).collect();
        assert_eq!(order, Cohort::ALL.to_vec(), "cohorts must be stored in label order");
        assert_eq!(set.cohorts[0].subject_len(), 3, "subjects move with their cohort");
    }

    #[test]
    fn test_new_rejects_missing_and_duplicate_cohorts() {
        let missing = CohortSet::new(vec![cohort(Cohort::Healthy, 2, 1, 8), cohort(Cohort::AdhdInattentive, 2, 1, 8)]);
        assert!(matches!(
            missing,
            Err(Error::InvalidParameter(InvalidParameter::MissingCohort(Cohort::AdhdHyperactive)))
        ));

        let duplicate = CohortSet::new(vec![
            cohort(Cohort::Healthy, 2, 1, 8),
            cohort(Cohort::Healthy, 2, 1, 8),
            cohort(Cohort::AdhdHyperactive, 2, 1, 8),
        ]);
        assert!(matches!(duplicate, Err(Error::InvalidParameter(InvalidParameter::DuplicateCohort(Cohort::Healthy)))));
    }

    #[test]
    fn test_validate_rejects_small_ragged_and_empty() {
        let small = cohort(Cohort::Healthy, 1, 2, 8);
        assert!(matches!(
            small.validate(),
            Err(Error::InvalidParameter(InvalidParameter::CohortTooSmall { subjects: 1, .. }))
        ));

        let mut ragged = cohort(Cohort::Healthy, 3, 2, 8);
        ragged.subjects[1][0].pop();
        assert!(matches!(
            ragged.validate(),
            Err(Error::InvalidParameter(InvalidParameter::RaggedTensor { subject: 1, .. }))
        ));

        let mut empty = cohort(Cohort::Healthy, 3, 2, 8);
        for subject in empty.subjects.iter_mut() {
            subject[1].clear();
        }
        assert!(matches!(
            empty.validate(),
            Err(Error::InvalidParameter(InvalidParameter::EmptyTimeSeries { subject: 0, region: 1, .. }))
        ));
    }

    #[test]
    fn test_truncate_regions_to_minimum() {
        let mut set = CohortSet::new(vec![
            cohort(Cohort::Healthy, 2, 4, 8),
            cohort(Cohort::AdhdInattentive, 2, 3, 8),
            cohort(Cohort::AdhdHyperactive, 2, 5, 8),
        ])
        .unwrap();
        assert!(set.check_regions().is_err(), "differing region counts must be reported");

        assert_eq!(set.truncate_regions(), 3);
        assert_eq!(set.region_counts(), vec![3, 3, 3]);
        assert_eq!(set.check_regions().unwrap(), 3);
        assert_eq!(set.cohorts[0].subjects[1][2], cohort(Cohort::Healthy, 2, 4, 8).subjects[1][2], "kept regions must be untouched");
    }

    #[test]
    fn test_cohort_serde_names() {
        let json = serde_json::to_string(&Cohort::AdhdInattentive).unwrap();
        assert_eq!(json, "\"adhd_inattentive\"");
        let data: Vec<CohortData> = serde_json::from_str(
            r#"[{"cohort": "healthy", "subjects": [[[1.0, 2.0]], [[3.0, 4.0]]]}]"#,
        )
        .unwrap();
        assert_eq!(data[0].cohort, Cohort::Healthy);
        assert_eq!(data[0].sample_len(), 2);
    }
}
