use statrs::distribution::{Continuous, Normal};
use crate::corpus::TrainingSet;
use crate::data::Instances;
use crate::error::{CpdpError, Result};
use crate::processing::zscore;
use crate::strategy::{Model, SetWiseTestAwareTrainer, SetWiseTrainer, TestAwareTrainer, Trainer};
use crate::utils::{euclidean_distance, mean_and_std};

const MIN_STD: f64 = 1e-6;

/// Predicts the same score for every row
pub struct ConstantModel {
    pub score: f64,
}

impl Model for ConstantModel {
    fn predict(&self, _row: &[f64]) -> f64 { self.score }
}

/// Two-class Gaussian naive Bayes over weighted rows
pub struct GaussianModel {
    log_priors: [f64; 2],
    normals: [Vec<Normal>; 2],
}

impl GaussianModel {
    pub fn fit(trainer: &str, data: &Instances) -> Result<GaussianModel> {
        if data.is_empty() {
            return Err(CpdpError::training(trainer, "no training rows"));
        }
        let n_features = data.features.len();
        let mut weight = [0.0_f64; 2];
        let mut sums = [vec![0.0; n_features], vec![0.0; n_features]];

        for ((row, y), w) in data.X.iter().zip(data.y.iter()).zip(data.weights.iter()) {
            let c = if *y > 0.0 { 1 } else { 0 };
            weight[c] += w;
            for (s, v) in sums[c].iter_mut().zip(row.iter()) { *s += w * v }
        }

        let total = weight[0] + weight[1];
        if !(total > 0.0) {
            return Err(CpdpError::training(trainer, "training rows carry no weight"));
        }

        let means: Vec<Vec<f64>> = (0..2)
            .map(|c| sums[c].iter().map(|s| if weight[c] > 0.0 { s / weight[c] } else { 0.0 }).collect())
            .collect();

        let mut squares = [vec![0.0; n_features], vec![0.0; n_features]];
        for ((row, y), w) in data.X.iter().zip(data.y.iter()).zip(data.weights.iter()) {
            let c = if *y > 0.0 { 1 } else { 0 };
            for (j, v) in row.iter().enumerate() { squares[c][j] += w * (v - means[c][j]).powi(2) }
        }

        let mut normals: [Vec<Normal>; 2] = [Vec::with_capacity(n_features), Vec::with_capacity(n_features)];
        for c in 0..2 {
            for j in 0..n_features {
                let var = if weight[c] > 0.0 { squares[c][j] / weight[c] } else { 0.0 };
                let std = var.sqrt().max(MIN_STD);
                let normal = Normal::new(means[c][j], std)
                    .map_err(|e| CpdpError::training(trainer, format!("feature {}: {}", data.features[j], e)))?;
                normals[c].push(normal);
            }
        }

        Ok(GaussianModel {
            log_priors: [(weight[0] / total).ln(), (weight[1] / total).ln()],
            normals,
        })
    }

    fn log_likelihood(&self, c: usize, row: &[f64]) -> f64 {
        self.log_priors[c] + self.normals[c].iter().zip(row.iter()).map(|(n, v)| n.ln_pdf(*v)).sum::<f64>()
    }
}

impl Model for GaussianModel {
    fn predict(&self, row: &[f64]) -> f64 {
        let l0 = self.log_likelihood(0, row);
        let l1 = self.log_likelihood(1, row);
        if l1 == f64::NEG_INFINITY { return 0.0 }
        if l0 == f64::NEG_INFINITY { return 1.0 }
        1.0 / (1.0 + (l0 - l1).exp())
    }
}

/// Weighted average of member scores
pub struct VotingModel {
    pub members: Vec<(f64, Box<dyn Model>)>,
}

impl Model for VotingModel {
    fn predict(&self, row: &[f64]) -> f64 {
        let total: f64 = self.members.iter().map(|(w, _)| w).sum();
        self.members.iter().map(|(w, m)| w * m.predict(row)).sum::<f64>() / total
    }
}

/// Applies the test-side standardization before delegating to the wrapped model
pub struct StandardizedModel {
    pub means: Vec<f64>,
    pub stds: Vec<f64>,
    pub inner: GaussianModel,
}

impl Model for StandardizedModel {
    fn predict(&self, row: &[f64]) -> f64 {
        let z: Vec<f64> = row.iter().zip(self.means.iter().zip(self.stds.iter()))
            .map(|(v, (m, s))| if *s > 0.0 { (v - m) / s } else { v - m })
            .collect();
        self.inner.predict(&z)
    }
}

/// Majority class: the score is the (weighted) share of defective rows
pub struct ZeroR;

impl Trainer for ZeroR {
    fn name(&self) -> &str { "ZeroR" }

    fn fit(&self, training: &Instances) -> Result<Box<dyn Model>> {
        let total: f64 = training.weights.iter().sum();
        if !(total > 0.0) {
            return Err(CpdpError::training(self.name(), "no training rows"));
        }
        let defective: f64 = training.y.iter().zip(training.weights.iter())
            .filter(|(y, _)| **y > 0.0)
            .map(|(_, w)| w)
            .sum();
        Ok(Box::new(ConstantModel { score: defective / total }))
    }
}

pub struct NaiveBayes;

impl Trainer for NaiveBayes {
    fn name(&self) -> &str { "NaiveBayes" }

    fn fit(&self, training: &Instances) -> Result<Box<dyn Model>> {
        Ok(Box::new(GaussianModel::fit(self.name(), training)?))
    }
}

/// One naive Bayes per training slice, equal votes
pub struct SetWiseVoting;

impl SetWiseTrainer for SetWiseVoting {
    fn name(&self) -> &str { "SetWiseVoting" }

    fn fit(&self, training: &TrainingSet) -> Result<Box<dyn Model>> {
        let mut members: Vec<(f64, Box<dyn Model>)> = Vec::new();
        for slice in training.iter().filter(|s| !s.data.is_empty()) {
            let model: Box<dyn Model> = Box::new(GaussianModel::fit(self.name(), &slice.data)?);
            members.push((1.0, model));
        }
        if members.is_empty() {
            return Err(CpdpError::training(self.name(), "no non-empty training slice"));
        }
        Ok(Box::new(VotingModel { members }))
    }
}

/// One naive Bayes per training slice, each vote weighted by the slice's similarity to the test data
pub struct SimilarityWeightedVoting;

impl SetWiseTestAwareTrainer for SimilarityWeightedVoting {
    fn name(&self) -> &str { "SimilarityWeightedVoting" }

    fn fit(&self, training: &TrainingSet, test: &Instances) -> Result<Box<dyn Model>> {
        let target = test.feature_means();
        let mut members: Vec<(f64, Box<dyn Model>)> = Vec::new();
        for slice in training.iter().filter(|s| !s.data.is_empty()) {
            let weight = 1.0 / (1.0 + euclidean_distance(&target, &slice.data.feature_means()));
            let model: Box<dyn Model> = Box::new(GaussianModel::fit(self.name(), &slice.data)?);
            members.push((weight, model));
        }
        if members.is_empty() {
            return Err(CpdpError::training(self.name(), "no non-empty training slice"));
        }
        Ok(Box::new(VotingModel { members }))
    }
}

/// Naive Bayes on standardized data: the corpus is standardized with its own statistics,
/// test rows with the statistics of the test slice.
pub struct TestNormalizedNaiveBayes;

impl TestAwareTrainer for TestNormalizedNaiveBayes {
    fn name(&self) -> &str { "TestNormalizedNaiveBayes" }

    fn fit(&self, test: &Instances, training: &Instances) -> Result<Box<dyn Model>> {
        let inner = GaussianModel::fit(self.name(), &zscore(training.clone()))?;
        let (means, stds): (Vec<f64>, Vec<f64>) = (0..test.features.len())
            .map(|j| mean_and_std(&test.column_values(j)))
            .unzip();
        Ok(Box::new(StandardizedModel { means, stds, inner }))
    }
}
