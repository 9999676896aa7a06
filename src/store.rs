use std::collections::{HashMap, HashSet};
use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use log::debug;
use serde::{Serialize, Deserialize};
use crate::error::{CpdpError, Result};

/// One evaluated (version, repeat, fold, classifier). Immutable once written.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ResultRow {
    pub experiment: String,
    pub version: String,
    pub repeat: usize,
    pub fold: usize,
    pub classifier: String,
    pub size_test: usize,
    pub size_training: usize,
    pub metrics: Vec<(String, f64)>,
    pub efforts: Vec<f64>,
    pub num_bugs: Vec<f64>,
}

/// Identity of a row within one experiment
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Hash)]
pub struct RowKey {
    pub version: String,
    pub repeat: usize,
    pub fold: usize,
    pub classifier: String,
}

impl RowKey {
    pub fn new(version: &str, repeat: usize, fold: usize, classifier: &str) -> RowKey {
        RowKey { version: version.to_string(), repeat, fold, classifier: classifier.to_string() }
    }
}

impl ResultRow {
    pub fn key(&self) -> RowKey {
        RowKey::new(&self.version, self.repeat, self.fold, &self.classifier)
    }
}

/// Append-only persistence of result rows.
///
/// Stores are shared between concurrently running experiments and must serialize
/// their own appends.
pub trait ResultStore: Send + Sync {
    /// Number of rows already stored for (experiment, version, classifier)
    fn contains_result(&self, experiment: &str, version: &str, classifier: &str) -> Result<usize>;

    /// Whether the row of one (version, repeat, fold, classifier) is already stored
    fn has_row(&self, experiment: &str, key: &RowKey) -> Result<bool>;

    fn append(&self, row: &ResultRow) -> Result<()>;
}

fn storage_error(e: impl std::fmt::Display) -> CpdpError {
    CpdpError::Storage(e.to_string())
}

/// Keeps rows in memory, mostly for tests and library callers
#[derive(Default)]
pub struct MemoryResultStore {
    rows: Mutex<Vec<ResultRow>>,
}

impl MemoryResultStore {
    pub fn new() -> MemoryResultStore {
        MemoryResultStore::default()
    }

    pub fn rows(&self) -> Vec<ResultRow> {
        self.rows.lock().map(|rows| rows.clone()).unwrap_or_default()
    }
}

impl ResultStore for MemoryResultStore {
    fn contains_result(&self, experiment: &str, version: &str, classifier: &str) -> Result<usize> {
        let rows = self.rows.lock().map_err(storage_error)?;
        Ok(rows.iter()
            .filter(|r| r.experiment == experiment && r.version == version && r.classifier == classifier)
            .count())
    }

    fn has_row(&self, experiment: &str, key: &RowKey) -> Result<bool> {
        let rows = self.rows.lock().map_err(storage_error)?;
        Ok(rows.iter().any(|r| r.experiment == experiment && r.key() == *key))
    }

    fn append(&self, row: &ResultRow) -> Result<()> {
        self.rows.lock().map_err(storage_error)?.push(row.clone());
        Ok(())
    }
}

/// What is known of one experiment file
#[derive(Default)]
struct StoredIndex {
    counts: HashMap<(String, String), usize>,
    keys: HashSet<RowKey>,
}

impl StoredIndex {
    fn insert(&mut self, key: RowKey) {
        *self.counts.entry((key.version.clone(), key.classifier.clone())).or_insert(0) += 1;
        self.keys.insert(key);
    }
}

/// One `<dir>/<experiment>.jsonl` file per experiment, one JSON object per line.
/// The keys of a file are read from disk once, then maintained in memory.
pub struct JsonLinesResultStore {
    dir: PathBuf,
    index: Mutex<HashMap<String, StoredIndex>>,
}

impl JsonLinesResultStore {
    pub fn new(dir: &str) -> JsonLinesResultStore {
        JsonLinesResultStore { dir: PathBuf::from(dir), index: Mutex::new(HashMap::new()) }
    }

    pub fn file_for(&self, experiment: &str) -> PathBuf {
        self.dir.join(format!("{}.jsonl", experiment))
    }

    fn read_index(path: &Path) -> Result<StoredIndex> {
        let mut index = StoredIndex::default();
        if !path.exists() { return Ok(index) }

        let reader = BufReader::new(fs::File::open(path)?);
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() { continue }
            let key: RowKey = serde_json::from_str(&line)
                .map_err(|e| CpdpError::Storage(format!("{}: {}", path.display(), e)))?;
            index.insert(key);
        }
        debug!("{}: {} stored rows", path.display(), index.keys.len());
        Ok(index)
    }

    /// Run `f` on the index of `experiment`, loading it on first use
    fn with_index<T>(&self, experiment: &str, f: impl FnOnce(&mut StoredIndex) -> Result<T>) -> Result<T> {
        let mut index = self.index.lock().map_err(storage_error)?;
        if !index.contains_key(experiment) {
            let loaded = Self::read_index(&self.file_for(experiment))?;
            index.insert(experiment.to_string(), loaded);
        }
        match index.get_mut(experiment) {
            Some(stored) => f(stored),
            None => Err(CpdpError::Storage(format!("no index for {}", experiment))),
        }
    }
}

impl ResultStore for JsonLinesResultStore {
    fn contains_result(&self, experiment: &str, version: &str, classifier: &str) -> Result<usize> {
        self.with_index(experiment, |stored| {
            Ok(stored.counts.get(&(version.to_string(), classifier.to_string())).copied().unwrap_or(0))
        })
    }

    fn has_row(&self, experiment: &str, key: &RowKey) -> Result<bool> {
        self.with_index(experiment, |stored| Ok(stored.keys.contains(key)))
    }

    fn append(&self, row: &ResultRow) -> Result<()> {
        let path = self.file_for(&row.experiment);
        let dir = &self.dir;
        self.with_index(&row.experiment, |stored| {
            fs::create_dir_all(dir)?;
            let line = serde_json::to_string(row).map_err(storage_error)?;
            let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
            writeln!(file, "{}", line)?;
            stored.insert(row.key());
            Ok(())
        })
    }
}
