use std::collections::BTreeSet;
use crate::corpus::TrainingSet;
use crate::data::Instances;
use crate::error::Result;
use crate::strategy::{PointWiseSelector, SetWiseSelector};
use crate::utils::euclidean_distance;

/// Keeps the `n` training slices whose feature means are closest to the test slice's.
pub struct NearestSets {
    pub n: usize,
}

impl SetWiseSelector for NearestSets {
    fn name(&self) -> &str { "NearestSets" }

    fn apply(&self, test: &Instances, training: TrainingSet) -> Result<TrainingSet> {
        if training.len() <= self.n { return Ok(training) }

        let target = test.feature_means();
        let mut distances: Vec<(usize, f64)> = training.iter()
            .enumerate()
            .map(|(i, s)| (i, euclidean_distance(&target, &s.data.feature_means())))
            .collect();
        distances.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));
        let kept: BTreeSet<usize> = distances.iter().take(self.n).map(|(i, _)| *i).collect();

        Ok(training.into_slices().into_iter()
            .enumerate()
            .filter(|(i, _)| kept.contains(i))
            .map(|(_, s)| s)
            .collect())
    }
}

/// Relevancy filter of Burak et al.: keeps the union of the `k` nearest training rows of every test row.
pub struct BurakFilter {
    pub k: usize,
}

impl PointWiseSelector for BurakFilter {
    fn name(&self) -> &str { "BurakFilter" }

    fn apply(&self, test: &Instances, training: Instances) -> Result<Instances> {
        let mut selected = BTreeSet::new();
        for row in &test.X {
            let mut distances: Vec<(usize, f64)> = training.X.iter()
                .enumerate()
                .map(|(i, candidate)| (i, euclidean_distance(row, candidate)))
                .collect();
            distances.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));
            selected.extend(distances.iter().take(self.k).map(|(i, _)| *i));
        }
        let indices: Vec<usize> = selected.into_iter().collect();
        Ok(training.subset(&indices))
    }
}
