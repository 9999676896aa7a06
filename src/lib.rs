#![allow(non_snake_case)]

pub mod utils;
pub mod error;
pub mod data;
pub mod filter;
pub mod cv;
pub mod corpus;
pub mod strategy;
pub mod processing;
pub mod selection;
pub mod training;
pub mod pipeline;
pub mod metrics;
pub mod eval;
pub mod store;
pub mod registry;
pub mod param;
pub mod experiment;

use crate::error::{CpdpError, Result};
use crate::experiment::{Experiment, ExperimentSummary};
use crate::store::ResultStore;
use param::Param;
use rayon::prelude::*;
use log::{error, warn};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Build and run one experiment. `stores` are shared with the other experiments of the run.
pub fn run(param: &Param, stores: Vec<Arc<dyn ResultStore>>) -> Result<ExperimentSummary> {
    let mut experiment = Experiment::from_param(param, stores)?;
    cinfo!(param.general.display_colorful, "\x1b[1;96m[{}]\x1b[0m {} with {} repeats x {} folds, results in {}",
        param.general.name, param.general.execution, param.cv.repeats, param.cv.folds,
        experiment.result_file().display());
    experiment.run()
}

/// Run isolated experiments on a pool of `thread_number` workers.
///
/// Once `stop` is set (SIGINT/SIGTERM in the binary), experiments that have not started
/// yet are not scheduled and report a configuration error; running ones complete.
pub fn run_all(params: &[Param], thread_number: usize, stop: Arc<AtomicBool>) -> Vec<Result<ExperimentSummary>> {
    let pool = match rayon::ThreadPoolBuilder::new().num_threads(thread_number.max(1)).build() {
        Ok(pool) => pool,
        Err(e) => {
            error!("Cannot build a pool of {} threads: {}", thread_number, e);
            return params.iter().map(|_| Err(CpdpError::Config(format!("thread pool: {}", e)))).collect();
        }
    };

    pool.install(|| {
        params.par_iter().map(|param| {
            if stop.load(Ordering::Relaxed) {
                warn!("[{}] not started: run interrupted", param.general.name);
                return Err(CpdpError::Config(format!("[{}] interrupted before start", param.general.name)));
            }
            let result = run(param, Vec::new());
            if let Err(e) = &result {
                error!("[{}] failed: {}", param.general.name, e);
            }
            result
        }).collect()
    })
}
