//! Capabilities plugged into the pipeline.
//!
//! Set-wise stages see the training data as a [`TrainingSet`] of per-version slices,
//! point-wise stages see one merged [`Instances`] table. Every stage receives its
//! training data by value and hands back the (possibly different) result; the test
//! slice is borrowed, mutably for processors that transform it alongside.

use crate::corpus::TrainingSet;
use crate::data::Instances;
use crate::error::Result;

/// A fitted model. Predictions are defect-proneness scores in [0, 1].
pub trait Model: Send + Sync {
    fn predict(&self, row: &[f64]) -> f64;
}

pub trait SetWiseProcessor: Send + Sync {
    fn name(&self) -> &str;
    fn apply(&self, test: &mut Instances, training: TrainingSet) -> Result<TrainingSet>;
}

pub trait SetWiseSelector: Send + Sync {
    fn name(&self) -> &str;
    fn apply(&self, test: &Instances, training: TrainingSet) -> Result<TrainingSet>;
}

pub trait PointWiseProcessor: Send + Sync {
    fn name(&self) -> &str;
    fn apply(&self, test: &mut Instances, training: Instances) -> Result<Instances>;
}

/// Selectors may subset or re-weight the rows of the corpus
pub trait PointWiseSelector: Send + Sync {
    fn name(&self) -> &str;
    fn apply(&self, test: &Instances, training: Instances) -> Result<Instances>;
}

pub trait SetWiseTrainer: Send + Sync {
    fn name(&self) -> &str;
    fn fit(&self, training: &TrainingSet) -> Result<Box<dyn Model>>;
}

pub trait SetWiseTestAwareTrainer: Send + Sync {
    fn name(&self) -> &str;
    fn fit(&self, training: &TrainingSet, test: &Instances) -> Result<Box<dyn Model>>;
}

pub trait Trainer: Send + Sync {
    fn name(&self) -> &str;
    fn fit(&self, training: &Instances) -> Result<Box<dyn Model>>;
}

pub trait TestAwareTrainer: Send + Sync {
    fn name(&self) -> &str;
    fn fit(&self, test: &Instances, training: &Instances) -> Result<Box<dyn Model>>;
}

/// A model produced for one (version, fold), tagged with the trainer that built it
pub struct FittedModel {
    pub name: String,
    pub model: Box<dyn Model>,
}
