//! Name → constructor tables, resolved once when an experiment is built from its
//! configuration. Unknown names are configuration errors.

use std::str::FromStr;
use std::sync::Arc;
use crate::corpus::TrainingPolicy;
use crate::data::{CsvFolderLoader, Loader};
use crate::error::{CpdpError, Result};
use crate::filter::{MinDefectiveFilter, MinInstanceFilter, ProjectFilter, VersionFilter};
use crate::param::{self, LoaderParam, StageParam};
use crate::pipeline::Pipeline;
use crate::processing::{BinaryClass, LogTransform, ZScore};
use crate::selection::{BurakFilter, NearestSets};
use crate::store::{JsonLinesResultStore, MemoryResultStore, ResultStore};
use crate::strategy::{
    PointWiseProcessor, PointWiseSelector, SetWiseProcessor, SetWiseSelector,
    SetWiseTestAwareTrainer, SetWiseTrainer, TestAwareTrainer, Trainer,
};
use crate::training::{NaiveBayes, SetWiseVoting, SimilarityWeightedVoting, TestNormalizedNaiveBayes, ZeroR};

fn unknown(kind: &str, name: &str) -> CpdpError {
    CpdpError::Config(format!("unknown {} '{}'", kind, name))
}

fn parse_param<T: FromStr>(stage: &StageParam, default: T) -> Result<T> {
    let raw = stage.param.trim();
    if raw.is_empty() { return Ok(default) }
    raw.parse::<T>()
        .map_err(|_| CpdpError::Config(format!("{}: invalid parameter '{}'", stage.name, stage.param)))
}

pub fn training_policy(execution: &str) -> Result<TrainingPolicy> {
    match execution {
        "CrossProjectExperiment" => Ok(TrainingPolicy::ExcludeSameProject),
        "AllOtherVersionsExperiment" => Ok(TrainingPolicy::AllOtherVersions),
        "AllVersionsExperiment" => Ok(TrainingPolicy::AllVersions),
        "WithinProjectExperiment" => Ok(TrainingPolicy::SameProject),
        "CrossVersionExperiment" => Ok(TrainingPolicy::OlderVersionsOfProject),
        other => Err(unknown("execution strategy", other)),
    }
}

pub fn setwise_processor(stage: &StageParam) -> Result<Box<dyn SetWiseProcessor>> {
    match stage.name.as_str() {
        "BinaryClass" => Ok(Box::new(BinaryClass)),
        "ZScore" => Ok(Box::new(ZScore)),
        "LogTransform" => Ok(Box::new(LogTransform)),
        other => Err(unknown("set-wise processor", other)),
    }
}

pub fn pointwise_processor(stage: &StageParam) -> Result<Box<dyn PointWiseProcessor>> {
    match stage.name.as_str() {
        "BinaryClass" => Ok(Box::new(BinaryClass)),
        "ZScore" => Ok(Box::new(ZScore)),
        "LogTransform" => Ok(Box::new(LogTransform)),
        other => Err(unknown("point-wise processor", other)),
    }
}

pub fn setwise_selector(stage: &StageParam) -> Result<Box<dyn SetWiseSelector>> {
    match stage.name.as_str() {
        "NearestSets" => Ok(Box::new(NearestSets { n: parse_param(stage, 5)? })),
        other => Err(unknown("set-wise selector", other)),
    }
}

pub fn pointwise_selector(stage: &StageParam) -> Result<Box<dyn PointWiseSelector>> {
    match stage.name.as_str() {
        "BurakFilter" => Ok(Box::new(BurakFilter { k: parse_param(stage, 10)? })),
        other => Err(unknown("point-wise selector", other)),
    }
}

pub fn setwise_trainer(stage: &StageParam) -> Result<Box<dyn SetWiseTrainer>> {
    match stage.name.as_str() {
        "SetWiseVoting" => Ok(Box::new(SetWiseVoting)),
        other => Err(unknown("set-wise trainer", other)),
    }
}

pub fn setwise_testaware_trainer(stage: &StageParam) -> Result<Box<dyn SetWiseTestAwareTrainer>> {
    match stage.name.as_str() {
        "SimilarityWeightedVoting" => Ok(Box::new(SimilarityWeightedVoting)),
        other => Err(unknown("test-aware set-wise trainer", other)),
    }
}

pub fn trainer(stage: &StageParam) -> Result<Box<dyn Trainer>> {
    match stage.name.as_str() {
        "ZeroR" => Ok(Box::new(ZeroR)),
        "NaiveBayes" => Ok(Box::new(NaiveBayes)),
        other => Err(unknown("trainer", other)),
    }
}

pub fn testaware_trainer(stage: &StageParam) -> Result<Box<dyn TestAwareTrainer>> {
    match stage.name.as_str() {
        "TestNormalizedNaiveBayes" => Ok(Box::new(TestNormalizedNaiveBayes)),
        other => Err(unknown("test-aware trainer", other)),
    }
}

pub fn version_filter(stage: &StageParam) -> Result<Box<dyn VersionFilter>> {
    match stage.name.as_str() {
        "MinInstanceFilter" => Ok(Box::new(MinInstanceFilter { min: parse_param(stage, 1)? })),
        "MinDefectiveFilter" => Ok(Box::new(MinDefectiveFilter { min: parse_param(stage, 1)? })),
        "ProjectFilter" => Ok(Box::new(ProjectFilter {
            projects: stage.param.split(',').map(|p| p.trim().to_string()).filter(|p| !p.is_empty()).collect(),
        })),
        other => Err(unknown("version filter", other)),
    }
}

pub fn loader(loader: &LoaderParam) -> Result<Box<dyn Loader>> {
    match loader.name.as_str() {
        "CsvFolderLoader" => Ok(Box::new(CsvFolderLoader::new(&loader.path, &loader.label))),
        other => Err(unknown("loader", other)),
    }
}

/// `None` for the `none` kind; a JSON-lines store without path lives in the results directory
pub fn storage(storage: &param::Storage, results_path: &str) -> Result<Option<Arc<dyn ResultStore>>> {
    match storage.kind.as_str() {
        "none" => Ok(None),
        "memory" => Ok(Some(Arc::new(MemoryResultStore::new()))),
        "jsonl" => {
            let dir = if storage.path.is_empty() { results_path } else { storage.path.as_str() };
            Ok(Some(Arc::new(JsonLinesResultStore::new(dir))))
        }
        other => Err(unknown("storage kind", other)),
    }
}

fn build<T: ?Sized>(stages: &[StageParam], ctor: fn(&StageParam) -> Result<Box<T>>) -> Result<Vec<Box<T>>> {
    stages.iter().map(ctor).collect()
}

pub fn pipeline(p: &param::Pipeline) -> Result<Pipeline> {
    Ok(Pipeline {
        setwise_preprocessors: build(&p.setwise_preprocessors, setwise_processor)?,
        setwise_selectors: build(&p.setwise_selectors, setwise_selector)?,
        setwise_postprocessors: build(&p.setwise_postprocessors, setwise_processor)?,
        setwise_trainers: build(&p.setwise_trainers, setwise_trainer)?,
        setwise_testaware_trainers: build(&p.setwise_testaware_trainers, setwise_testaware_trainer)?,
        preprocessors: build(&p.preprocessors, pointwise_processor)?,
        pointwise_selectors: build(&p.pointwise_selectors, pointwise_selector)?,
        postprocessors: build(&p.postprocessors, pointwise_processor)?,
        trainers: build(&p.trainers, trainer)?,
        testaware_trainers: build(&p.testaware_trainers, testaware_trainer)?,
    })
}
