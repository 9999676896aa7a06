use std::collections::HashSet;
use std::fmt;
use log::{debug, error};
use crate::corpus::TrainingSet;
use crate::data::Instances;
use crate::error::{CpdpError, Result};
use crate::strategy::{
    FittedModel, PointWiseProcessor, PointWiseSelector, SetWiseProcessor, SetWiseSelector,
    SetWiseTestAwareTrainer, SetWiseTrainer, TestAwareTrainer, Trainer,
};

/// Where the engine currently is, carried into every log line
#[derive(Clone, Debug)]
pub struct IterationContext {
    pub experiment: String,
    pub version: String,
    pub repeat: usize,
    pub fold: usize,
    pub progress: usize,
    pub total: usize,
}

impl IterationContext {
    pub fn empty_training_data(&self) -> CpdpError {
        CpdpError::EmptyTrainingData {
            experiment: self.experiment.clone(),
            version: self.version.clone(),
            repeat: self.repeat,
            fold: self.fold,
        }
    }
}

impl fmt::Display for IterationContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] [{:02}/{:02}] {} (repeat {}, fold {})",
            self.experiment, self.progress, self.total, self.version, self.repeat, self.fold)
    }
}

/// What is left after all stages ran: the transformed test slice, the final corpus
/// and the models of every trainer that fitted successfully
pub struct PipelineOutput {
    pub test: Instances,
    pub training: Instances,
    pub models: Vec<FittedModel>,
    pub failed_trainers: Vec<String>,
}

/// Ordered chain of strategies. All set-wise stages run, then the training set is
/// merged, then the point-wise stages run on the single corpus.
#[derive(Default)]
pub struct Pipeline {
    pub setwise_preprocessors: Vec<Box<dyn SetWiseProcessor>>,
    pub setwise_selectors: Vec<Box<dyn SetWiseSelector>>,
    pub setwise_postprocessors: Vec<Box<dyn SetWiseProcessor>>,
    pub setwise_trainers: Vec<Box<dyn SetWiseTrainer>>,
    pub setwise_testaware_trainers: Vec<Box<dyn SetWiseTestAwareTrainer>>,
    pub preprocessors: Vec<Box<dyn PointWiseProcessor>>,
    pub pointwise_selectors: Vec<Box<dyn PointWiseSelector>>,
    pub postprocessors: Vec<Box<dyn PointWiseProcessor>>,
    pub trainers: Vec<Box<dyn Trainer>>,
    pub testaware_trainers: Vec<Box<dyn TestAwareTrainer>>,
}

impl Pipeline {
    pub fn new() -> Pipeline {
        Pipeline::default()
    }

    /// Trainer names in evaluation order
    pub fn trainer_names(&self) -> Vec<String> {
        self.setwise_trainers.iter().map(|t| t.name().to_string())
            .chain(self.setwise_testaware_trainers.iter().map(|t| t.name().to_string()))
            .chain(self.trainers.iter().map(|t| t.name().to_string()))
            .chain(self.testaware_trainers.iter().map(|t| t.name().to_string()))
            .collect()
    }

    pub fn run(&self, ctx: &IterationContext, test: Instances, training: TrainingSet) -> Result<PipelineOutput> {
        self.run_except(ctx, test, training, &HashSet::new())
    }

    /// Same as [`Pipeline::run`], without fitting the trainers named in `done`
    pub fn run_except(
        &self,
        ctx: &IterationContext,
        mut test: Instances,
        training: TrainingSet,
        done: &HashSet<String>,
    ) -> Result<PipelineOutput> {
        if training.is_empty() {
            return Err(ctx.empty_training_data());
        }

        let mut models = Vec::new();
        let mut failed_trainers = Vec::new();

        let training = self.run_setwise_stages(ctx, &mut test, training)?;

        for trainer in self.setwise_trainers.iter().filter(|t| pending(ctx, t.name(), done)) {
            debug!("{}: applying setwise trainer {}", ctx, trainer.name());
            collect_model(ctx, trainer.name(), trainer.fit(&training), &mut models, &mut failed_trainers);
        }
        for trainer in self.setwise_testaware_trainers.iter().filter(|t| pending(ctx, t.name(), done)) {
            debug!("{}: applying testdata aware setwise trainer {}", ctx, trainer.name());
            collect_model(ctx, trainer.name(), trainer.fit(&training, &test), &mut models, &mut failed_trainers);
        }

        let corpus = training.merge()?.ok_or_else(|| ctx.empty_training_data())?;
        let corpus = self.run_pointwise_stages(ctx, &mut test, corpus)?;
        if corpus.is_empty() {
            return Err(ctx.empty_training_data());
        }

        for trainer in self.trainers.iter().filter(|t| pending(ctx, t.name(), done)) {
            debug!("{}: applying trainer {}", ctx, trainer.name());
            collect_model(ctx, trainer.name(), trainer.fit(&corpus), &mut models, &mut failed_trainers);
        }
        for trainer in self.testaware_trainers.iter().filter(|t| pending(ctx, t.name(), done)) {
            debug!("{}: applying testdata aware trainer {}", ctx, trainer.name());
            collect_model(ctx, trainer.name(), trainer.fit(&test, &corpus), &mut models, &mut failed_trainers);
        }

        Ok(PipelineOutput { test, training: corpus, models, failed_trainers })
    }

    fn run_setwise_stages(&self, ctx: &IterationContext, test: &mut Instances, mut training: TrainingSet) -> Result<TrainingSet> {
        for processor in &self.setwise_preprocessors {
            debug!("{}: applying setwise preprocessor {}", ctx, processor.name());
            training = processor.apply(test, training)?;
        }
        for selector in &self.setwise_selectors {
            debug!("{}: applying setwise selection {}", ctx, selector.name());
            training = selector.apply(test, training)?;
        }
        for processor in &self.setwise_postprocessors {
            debug!("{}: applying setwise postprocessor {}", ctx, processor.name());
            training = processor.apply(test, training)?;
        }
        Ok(training)
    }

    fn run_pointwise_stages(&self, ctx: &IterationContext, test: &mut Instances, mut corpus: Instances) -> Result<Instances> {
        for processor in &self.preprocessors {
            debug!("{}: applying preprocessor {}", ctx, processor.name());
            corpus = processor.apply(test, corpus)?;
        }
        for selector in &self.pointwise_selectors {
            debug!("{}: applying pointwise selection {}", ctx, selector.name());
            corpus = selector.apply(test, corpus)?;
        }
        for processor in &self.postprocessors {
            debug!("{}: applying postprocessor {}", ctx, processor.name());
            corpus = processor.apply(test, corpus)?;
        }
        Ok(corpus)
    }
}

fn pending(ctx: &IterationContext, name: &str, done: &HashSet<String>) -> bool {
    if done.contains(name) {
        debug!("{}: {} already evaluated", ctx, name);
        return false;
    }
    true
}

fn collect_model(
    ctx: &IterationContext,
    name: &str,
    fitted: Result<Box<dyn crate::strategy::Model>>,
    models: &mut Vec<FittedModel>,
    failed: &mut Vec<String>,
) {
    match fitted {
        Ok(model) => models.push(FittedModel { name: name.to_string(), model }),
        Err(e) => {
            error!("{}: trainer {} failed, skipping its result: {}", ctx, name, e);
            failed.push(name.to_string());
        }
    }
}
