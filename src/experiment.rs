use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use chrono::Local;
use log::{debug, error, warn};
use serde::{Serialize, Deserialize};
use crate::cinfo;
use crate::corpus::{Assembler, TrainingPolicy, SliceRoles};
use crate::cv::CV;
use crate::data::{Loader, Version};
use crate::error::{CpdpError, Result};
use crate::eval::{Evaluator, HeaderState, StoredRows};
use crate::filter::{passes_all, VersionFilter};
use crate::param::Param;
use crate::pipeline::{IterationContext, Pipeline};
use crate::registry;
use crate::store::ResultStore;

/// Engine lifecycle. The repeat, fold and version loops all happen in `Running`.
/// A fatal error ends the run in `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EngineState {
    Initializing,
    Loading,
    Filtering,
    Running,
    Completed,
    Failed,
}

/// An iteration, or a trainer within an iteration, that produced no result
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct IterationFailure {
    pub version: String,
    pub repeat: usize,
    pub fold: usize,
    pub trainer: Option<String>,
    pub message: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ExperimentSummary {
    pub name: String,
    pub engine_version: String,
    pub timestamp: String,
    pub versions: usize,
    pub test_versions: usize,
    pub evaluations: usize,
    pub rows_written: usize,
    pub skipped_iterations: usize,
    pub failures: Vec<IterationFailure>,
    pub execution_time: f64,
}

/// Package version, build commit and profile, e.g. `0.1.0#3f2a9c1-dirty (debug)`
pub fn engine_version() -> String {
    let version = match option_env!("CPDP_GIT_SHA") {
        Some(sha) => format!("{}#{}", env!("CARGO_PKG_VERSION"), sha),
        None => env!("CARGO_PKG_VERSION").to_string(),
    };
    match option_env!("CPDP_BUILD_PROFILE") {
        Some(profile) if profile != "release" => format!("{} ({})", version, profile),
        _ => version,
    }
}

/// One configured experiment: a sequential state machine over
/// repeats × folds × test versions.
pub struct Experiment {
    pub name: String,
    pub assembler: Assembler,
    pub repeats: usize,
    pub folds: usize,
    pub resume: bool,
    pub display_colorful: bool,
    pub results_path: PathBuf,
    pub loaders: Vec<Box<dyn Loader>>,
    pub version_filters: Vec<Box<dyn VersionFilter>>,
    pub test_version_filters: Vec<Box<dyn VersionFilter>>,
    pub pipeline: Pipeline,
    pub evaluator: Evaluator,
    pub stores: Vec<Arc<dyn ResultStore>>,
    state: EngineState,
}

struct RunCounters {
    evaluations: usize,
    rows_written: usize,
    skipped: usize,
    failures: Vec<IterationFailure>,
}

impl Experiment {
    /// Experiment with no loader, filter or stage, 10 × 10 folds
    pub fn new(name: &str, policy: TrainingPolicy, results_path: &str) -> Experiment {
        Experiment {
            name: name.to_string(),
            assembler: Assembler::new(policy, SliceRoles::Conventional),
            repeats: 10,
            folds: 10,
            resume: false,
            display_colorful: false,
            results_path: PathBuf::from(results_path),
            loaders: Vec::new(),
            version_filters: Vec::new(),
            test_version_filters: Vec::new(),
            pipeline: Pipeline::new(),
            evaluator: Evaluator::new(),
            stores: Vec::new(),
            state: EngineState::Initializing,
        }
    }

    /// Resolve every named collaborator of `param`. `stores` come on top of the configured one.
    pub fn from_param(param: &Param, stores: Vec<Arc<dyn ResultStore>>) -> Result<Experiment> {
        let policy = registry::training_policy(&param.general.execution)?;
        let mut exp = Experiment::new(&param.general.name, policy, &param.general.results_path);
        exp.assembler.roles = param.cv.slice_roles;
        exp.repeats = param.cv.repeats;
        exp.folds = param.cv.folds;
        exp.resume = param.general.resume;
        exp.display_colorful = param.general.display_colorful;

        exp.loaders = param.data.loaders.iter().map(registry::loader).collect::<Result<_>>()?;
        exp.version_filters = param.data.version_filters.iter().map(registry::version_filter).collect::<Result<_>>()?;
        exp.test_version_filters = param.data.test_version_filters.iter().map(registry::version_filter).collect::<Result<_>>()?;
        exp.pipeline = registry::pipeline(&param.pipeline)?;

        exp.stores = stores;
        if let Some(store) = registry::storage(&param.storage, &param.general.results_path)? {
            exp.stores.push(store);
        }
        Ok(exp)
    }

    pub fn with_loader(mut self, loader: Box<dyn Loader>) -> Experiment {
        self.loaders.push(loader);
        self
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    fn transition(&mut self, next: EngineState) {
        debug!("[{}] {:?} -> {:?}", self.name, self.state, next);
        self.state = next;
    }

    pub fn result_file(&self) -> PathBuf {
        self.results_path.join(format!("{}.csv", self.name))
    }

    pub fn run(&mut self) -> Result<ExperimentSummary> {
        let result = self.run_states();
        if let Err(e) = &result {
            error!("[{}] failed while {:?}: {}", self.name, self.state, e);
            self.transition(EngineState::Failed);
        }
        result
    }

    fn run_states(&mut self) -> Result<ExperimentSummary> {
        let start = Instant::now();
        let timestamp = Local::now().format("%Y-%m-%d_%H-%M-%S").to_string();

        if self.folds < 2 || self.repeats < 1 {
            return Err(CpdpError::Config(format!("[{}] needs at least 1 repeat and 2 folds", self.name)));
        }
        if self.pipeline.trainer_names().is_empty() {
            return Err(CpdpError::Config(format!("[{}] no trainer configured", self.name)));
        }
        self.evaluator.configure(self.result_file());

        self.transition(EngineState::Loading);
        let mut versions: Vec<Version> = Vec::new();
        for loader in &self.loaders {
            versions.extend(loader.load()?);
        }
        versions.sort();
        let loaded = versions.len();
        versions.dedup();
        if versions.len() < loaded {
            warn!("[{}] {} duplicated versions ignored", self.name, loaded - versions.len());
        }

        self.transition(EngineState::Filtering);
        for filter in &self.version_filters {
            filter.apply(&mut versions);
        }
        let is_test_version: Vec<bool> = versions.iter().map(|v| passes_all(v, &self.test_version_filters)).collect();
        let test_versions = is_test_version.iter().filter(|t| **t).count();
        cinfo!(self.display_colorful, "[{}] \x1b[1;97m{} versions\x1b[0m, {} evaluated, {:?} policy",
            self.name, versions.len(), test_versions, self.assembler.policy);
        if test_versions == 0 {
            warn!("[{}] no version left to evaluate", self.name);
        }

        self.transition(EngineState::Running);
        let counters = self.run_loops(&versions, &is_test_version)?;

        self.transition(EngineState::Completed);
        let summary = ExperimentSummary {
            name: self.name.clone(),
            engine_version: engine_version(),
            timestamp,
            versions: versions.len(),
            test_versions,
            evaluations: counters.evaluations,
            rows_written: counters.rows_written,
            skipped_iterations: counters.skipped,
            failures: counters.failures,
            execution_time: start.elapsed().as_secs_f64(),
        };
        cinfo!(self.display_colorful, "[{}] \x1b[1;92mcompleted\x1b[0m: {} evaluations, {} rows, {} skipped, {} failures in {:.2}s",
            summary.name, summary.evaluations, summary.rows_written, summary.skipped_iterations,
            summary.failures.len(), summary.execution_time);
        Ok(summary)
    }

    fn run_loops(&self, versions: &[Version], is_test_version: &[bool]) -> Result<RunCounters> {
        let total = is_test_version.iter().filter(|t| **t).count() * self.repeats * self.folds;
        let trainer_names = self.pipeline.trainer_names();
        let in_file = if self.resume { self.evaluator.existing_rows()? } else { HashSet::new() };
        let mut header_state = if in_file.is_empty() { HeaderState::new() } else { HeaderState::already_written() };
        let mut counters = RunCounters { evaluations: 0, rows_written: 0, skipped: 0, failures: Vec::new() };
        let mut progress = 0;

        for repeat in 0..self.repeats {
            let partitions: Vec<CV> = versions.iter().map(|v| CV::new(v.instances.len(), self.folds, repeat)).collect();

            for fold in 0..self.folds {
                for (i, version) in versions.iter().enumerate() {
                    if !is_test_version[i] { continue }
                    progress += 1;
                    let ctx = IterationContext {
                        experiment: self.name.clone(),
                        version: version.id(),
                        repeat,
                        fold,
                        progress,
                        total,
                    };

                    let stored = if self.resume {
                        StoredRows::lookup(&ctx, &trainer_names, &in_file, &self.stores)?
                    } else {
                        StoredRows::none()
                    };
                    if trainer_names.iter().all(|t| stored.complete(t)) {
                        debug!("{}: results already stored, skipping", ctx);
                        counters.skipped += 1;
                        continue;
                    }

                    match self.iteration(&ctx, versions, &partitions, i, &mut header_state, &stored) {
                        Ok((rows, failed)) => {
                            counters.evaluations += 1;
                            counters.rows_written += rows;
                            for trainer in failed {
                                counters.failures.push(IterationFailure {
                                    version: ctx.version.clone(), repeat, fold,
                                    message: format!("trainer {} failed", trainer),
                                    trainer: Some(trainer),
                                });
                            }
                        }
                        Err(e) if e.is_fatal() => {
                            error!("{}: aborting experiment: {}", ctx, e);
                            return Err(e);
                        }
                        Err(e) => {
                            error!("{}: {}", ctx, e);
                            counters.failures.push(IterationFailure {
                                version: ctx.version.clone(), repeat, fold, trainer: None, message: e.to_string(),
                            });
                        }
                    }
                    cinfo!(self.display_colorful, "{}: \x1b[92mfinished\x1b[0m", ctx);
                }
            }
        }
        Ok(counters)
    }

    fn iteration(
        &self,
        ctx: &IterationContext,
        versions: &[Version],
        partitions: &[CV],
        test_idx: usize,
        header_state: &mut HeaderState,
        stored: &StoredRows,
    ) -> Result<(usize, Vec<String>)> {
        let assembly = self.assembler.assemble(versions, partitions, test_idx, ctx.fold);
        debug!("{}: {} training slices ({} rows), {} test rows",
            ctx, assembly.training.len(), assembly.training.total_rows(), assembly.test.data.len());

        // captured before any processor touches the test slice
        let efforts = assembly.test.data.efforts();
        let num_bugs = assembly.test.data.num_bugs();

        let done: HashSet<String> = self.pipeline.trainer_names().into_iter().filter(|t| stored.complete(t)).collect();
        let output = self.pipeline.run_except(ctx, assembly.test.data, assembly.training, &done)?;
        let rows = self.evaluator.apply(ctx, &output, &efforts, &num_bugs, header_state, &self.stores, stored)?;
        Ok((rows, output.failed_trainers))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{Instances, MemoryLoader};
    use crate::store::{MemoryResultStore, ResultRow, RowKey};
    use crate::strategy::{Model, Trainer};
    use crate::training::ZeroR;
    use std::fs;

    struct AlwaysFails;
    impl Trainer for AlwaysFails {
        fn name(&self) -> &str { "AlwaysFails" }
        fn fit(&self, _training: &Instances) -> Result<Box<dyn Model>> {
            Err(CpdpError::training("AlwaysFails", "cannot fit"))
        }
    }

    struct FullDisk;
    impl ResultStore for FullDisk {
        fn contains_result(&self, _experiment: &str, _version: &str, _classifier: &str) -> Result<usize> { Ok(0) }
        fn has_row(&self, _experiment: &str, _key: &RowKey) -> Result<bool> { Ok(false) }
        fn append(&self, _row: &ResultRow) -> Result<()> {
            Err(CpdpError::Storage("no space left".to_string()))
        }
    }

    fn results_dir(name: &str) -> String {
        let dir = std::env::temp_dir().join(format!("cpdp_exp_{}_{}", name, std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        dir.to_string_lossy().to_string()
    }

    fn experiment(name: &str, dir: &str) -> Experiment {
        let mut exp = Experiment::new(name, TrainingPolicy::AllOtherVersions, dir)
            .with_loader(Box::new(MemoryLoader {
                versions: vec![Version::test("camel", "1.0", 40), Version::test("ant", "1.3", 40)],
            }));
        exp.repeats = 1;
        exp.folds = 4;
        exp.pipeline.trainers.push(Box::new(ZeroR));
        exp
    }

    #[test]
    fn test_state_machine_reaches_completed() {
        let dir = results_dir("states");
        let mut exp = experiment("states", &dir);
        assert_eq!(exp.state(), EngineState::Initializing);
        let summary = exp.run().unwrap();
        assert_eq!(exp.state(), EngineState::Completed);
        assert_eq!(summary.versions, 2);
        assert_eq!(summary.evaluations, 8);
        assert_eq!(summary.rows_written, 8);
        assert!(summary.failures.is_empty());
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_store_failure_ends_in_failed_state() {
        let dir = results_dir("fulldisk");
        let mut exp = experiment("fulldisk", &dir);
        exp.stores.push(Arc::new(FullDisk));
        assert!(matches!(exp.run(), Err(CpdpError::Storage(_))));
        assert_eq!(exp.state(), EngineState::Failed);
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_engine_version_starts_with_package_version() {
        assert!(engine_version().starts_with(env!("CARGO_PKG_VERSION")));
    }

    #[test]
    fn test_rows_follow_repeat_fold_version_order() {
        let dir = results_dir("order");
        let store = Arc::new(MemoryResultStore::new());
        let mut exp = experiment("order", &dir);
        exp.stores.push(store.clone());
        exp.run().unwrap();

        let order: Vec<(usize, String)> = store.rows().iter().map(|r| (r.fold, r.version.clone())).collect();
        assert_eq!(order[0], (0, "ant-1.3".to_string()));
        assert_eq!(order[1], (0, "camel-1.0".to_string()));
        assert_eq!(order[2], (1, "ant-1.3".to_string()));
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_trainer_failure_is_recorded_and_siblings_continue() {
        let dir = results_dir("failing");
        let mut exp = experiment("failing", &dir);
        exp.pipeline.trainers.push(Box::new(AlwaysFails));
        let summary = exp.run().unwrap();

        assert_eq!(summary.evaluations, 8);
        assert_eq!(summary.rows_written, 8);
        assert_eq!(summary.failures.len(), 8);
        assert!(summary.failures.iter().all(|f| f.trainer.as_deref() == Some("AlwaysFails")));
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_empty_corpus_is_local_to_the_iteration() {
        let dir = results_dir("empty");
        let mut exp = experiment("empty", &dir);
        // only ant-1.4 has an older version of its own project
        exp.assembler.policy = TrainingPolicy::OlderVersionsOfProject;
        exp.loaders.push(Box::new(MemoryLoader { versions: vec![Version::test("ant", "1.4", 40)] }));
        let summary = exp.run().unwrap();

        assert_eq!(summary.versions, 3);
        assert_eq!(summary.evaluations, 4);
        assert_eq!(summary.failures.len(), 8);
        assert!(summary.failures.iter().all(|f| f.version != "ant-1.4" && f.trainer.is_none()));
        assert!(summary.failures[0].message.contains("no training data"));
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_test_version_filters_keep_training_candidates() {
        let dir = results_dir("testfilter");
        let mut exp = experiment("testfilter", &dir);
        exp.test_version_filters.push(Box::new(crate::filter::ProjectFilter { projects: vec!["camel".to_string()] }));
        let store = Arc::new(MemoryResultStore::new());
        exp.stores.push(store.clone());
        let summary = exp.run().unwrap();

        assert_eq!(summary.test_versions, 1);
        assert_eq!(summary.evaluations, 4);
        assert!(store.rows().iter().all(|r| r.version == "ant-1.3" && r.size_training == 30));
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_missing_trainer_is_a_config_error() {
        let dir = results_dir("notrainer");
        let mut exp = experiment("notrainer", &dir);
        exp.pipeline.trainers.clear();
        assert!(matches!(exp.run(), Err(CpdpError::Config(_))));
        assert_eq!(exp.state(), EngineState::Failed);
    }

    #[test]
    fn test_from_param_resolves_names() {
        let mut param = Param::new();
        param.general.name = "from-param".to_string();
        param.general.execution = "WithinProjectExperiment".to_string();
        param.pipeline.trainers.push(crate::param::StageParam::new("NaiveBayes", ""));
        param.storage.kind = "memory".to_string();

        let exp = Experiment::from_param(&param, Vec::new()).unwrap();
        assert!(matches!(exp.assembler.policy, TrainingPolicy::SameProject));
        assert_eq!(exp.stores.len(), 1);
        assert_eq!(exp.pipeline.trainer_names(), vec!["NaiveBayes"]);

        param.general.execution = "Unknown".to_string();
        assert!(Experiment::from_param(&param, Vec::new()).is_err());
    }
}
