use std::collections::HashSet;
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use log::debug;
use crate::error::{CpdpError, Result};
use crate::metrics::{self, METRIC_NAMES};
use crate::pipeline::{IterationContext, PipelineOutput};
use crate::store::{ResultRow, ResultStore, RowKey};

pub const DEFAULT_THRESHOLD: f64 = 0.5;

/// Whether the result-file header still has to be written for the current experiment.
/// Owned by the engine loop and threaded into every evaluation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HeaderState {
    written: bool,
}

impl HeaderState {
    pub fn new() -> HeaderState {
        HeaderState { written: false }
    }

    pub fn already_written() -> HeaderState {
        HeaderState { written: true }
    }

    pub fn pending(&self) -> bool {
        !self.written
    }

    pub fn mark_written(&mut self) {
        self.written = true;
    }
}

impl Default for HeaderState {
    fn default() -> Self {
        HeaderState::new()
    }
}

/// Classifiers of one iteration whose row already exists, per destination.
/// Empty when the run does not resume: every row is then written everywhere.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StoredRows {
    pub in_file: HashSet<String>,
    /// One set per store, in store order
    pub in_stores: Vec<HashSet<String>>,
}

impl StoredRows {
    pub fn none() -> StoredRows {
        StoredRows::default()
    }

    /// Rows of `classifiers` already present in the result file and in every store
    pub fn lookup(
        ctx: &IterationContext,
        classifiers: &[String],
        in_file: &HashSet<RowKey>,
        stores: &[Arc<dyn ResultStore>],
    ) -> Result<StoredRows> {
        let key = |classifier: &String| RowKey::new(&ctx.version, ctx.repeat, ctx.fold, classifier);
        let mut stored = StoredRows {
            in_file: classifiers.iter().filter(|&c| in_file.contains(&key(c))).cloned().collect(),
            in_stores: Vec::with_capacity(stores.len()),
        };
        for store in stores {
            let mut held = HashSet::new();
            for classifier in classifiers {
                if store.has_row(&ctx.experiment, &key(classifier))? {
                    held.insert(classifier.clone());
                }
            }
            stored.in_stores.push(held);
        }
        Ok(stored)
    }

    /// True when no destination misses the row of `classifier`
    pub fn complete(&self, classifier: &str) -> bool {
        self.in_file.contains(classifier) && self.in_stores.iter().all(|held| held.contains(classifier))
    }

    fn in_store(&self, store: usize, classifier: &str) -> bool {
        self.in_stores.get(store).map(|held| held.contains(classifier)).unwrap_or(false)
    }
}

pub fn header() -> Vec<String> {
    ["experiment", "version", "repeat", "fold", "classifier", "size_test", "size_training"]
        .iter()
        .chain(METRIC_NAMES.iter())
        .map(|s| s.to_string())
        .collect()
}

fn record(row: &ResultRow) -> Vec<String> {
    let mut fields = vec![
        row.experiment.clone(),
        row.version.clone(),
        row.repeat.to_string(),
        row.fold.to_string(),
        row.classifier.clone(),
        row.size_test.to_string(),
        row.size_training.to_string(),
    ];
    fields.extend(row.metrics.iter().map(|(_, v)| v.to_string()));
    fields
}

/// Scores fitted models on the test slice and writes one row per model
pub struct Evaluator {
    output: Option<PathBuf>,
    pub threshold: f64,
}

impl Evaluator {
    pub fn new() -> Evaluator {
        Evaluator { output: None, threshold: DEFAULT_THRESHOLD }
    }

    /// Must be called before the first evaluation
    pub fn configure(&mut self, path: PathBuf) {
        self.output = Some(path);
    }

    pub fn output(&self) -> Option<&Path> {
        self.output.as_deref()
    }

    /// Keys of the rows already in the result file; empty when there is no such file
    pub fn existing_rows(&self) -> Result<HashSet<RowKey>> {
        let mut keys = HashSet::new();
        let path = match &self.output {
            Some(path) if path.exists() => path,
            _ => return Ok(keys),
        };
        let mut reader = csv::ReaderBuilder::new().has_headers(true).from_path(path)?;
        for record in reader.records() {
            let record = record?;
            let field = |i: usize| record.get(i).unwrap_or("");
            let index = |i: usize| field(i).parse::<usize>()
                .map_err(|_| CpdpError::Storage(format!("{}: unreadable row {:?}", path.display(), record)));
            keys.insert(RowKey::new(field(1), index(2)?, index(3)?, field(4)));
        }
        debug!("{}: {} rows already written", path.display(), keys.len());
        Ok(keys)
    }

    pub fn rows(&self, ctx: &IterationContext, output: &PipelineOutput, efforts: &[f64], num_bugs: &[f64]) -> Vec<ResultRow> {
        output.models.iter().map(|fitted| {
            let scores: Vec<f64> = output.test.X.iter().map(|row| fitted.model.predict(row)).collect();
            ResultRow {
                experiment: ctx.experiment.clone(),
                version: ctx.version.clone(),
                repeat: ctx.repeat,
                fold: ctx.fold,
                classifier: fitted.name.clone(),
                size_test: output.test.len(),
                size_training: output.training.len(),
                metrics: metrics::compute(&scores, num_bugs, efforts, self.threshold),
                efforts: efforts.to_vec(),
                num_bugs: num_bugs.to_vec(),
            }
        }).collect()
    }

    /// Writes the rows of every fitted model, header first when still pending, then
    /// forwards them to the stores. A row goes only to the destinations of `stored`
    /// that miss it. Returns the number of rows that were new somewhere.
    pub fn apply(
        &self,
        ctx: &IterationContext,
        output: &PipelineOutput,
        efforts: &[f64],
        num_bugs: &[f64],
        header_state: &mut HeaderState,
        stores: &[Arc<dyn ResultStore>],
        stored: &StoredRows,
    ) -> Result<usize> {
        let path = self.output.as_ref()
            .ok_or_else(|| CpdpError::Config("evaluator used before being configured".to_string()))?;

        let rows: Vec<ResultRow> = self.rows(ctx, output, efforts, num_bugs).into_iter()
            .filter(|row| !stored.complete(&row.classifier))
            .collect();
        if rows.is_empty() { return Ok(0) }
        let file_rows: Vec<&ResultRow> = rows.iter().filter(|row| !stored.in_file.contains(&row.classifier)).collect();
        if file_rows.is_empty() {
            return self.forward(&rows, stores, stored);
        }

        if let Some(dir) = path.parent() {
            if !dir.as_os_str().is_empty() { fs::create_dir_all(dir)? }
        }

        let pending = header_state.pending();
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .append(!pending)
            .truncate(pending)
            .open(path)?;
        let mut writer = csv::WriterBuilder::new().has_headers(false).from_writer(file);
        if pending {
            debug!("{}: writing header to {}", ctx, path.display());
            writer.write_record(header())?;
        }
        for row in &file_rows {
            writer.write_record(record(row))?;
        }
        writer.flush()?;
        if pending { header_state.mark_written() }

        self.forward(&rows, stores, stored)
    }

    fn forward(&self, rows: &[ResultRow], stores: &[Arc<dyn ResultStore>], stored: &StoredRows) -> Result<usize> {
        for row in rows {
            for (i, store) in stores.iter().enumerate() {
                if !stored.in_store(i, &row.classifier) {
                    store.append(row)?;
                }
            }
        }
        Ok(rows.len())
    }
}

impl Default for Evaluator {
    fn default() -> Self {
        Evaluator::new()
    }
}
