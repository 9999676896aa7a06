use crate::corpus::SliceRoles;
use crate::error::{CpdpError, Result};
use log::warn;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;

pub const STORAGE_KINDS: [&str; 3] = ["none", "memory", "jsonl"];

// Field definitions and associated default values

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Param {
    #[serde(default)]
    pub general: General,
    #[serde(default)]
    pub data: Data,
    #[serde(default)]
    pub cv: CV,
    #[serde(default)]
    pub pipeline: Pipeline,
    #[serde(default)]
    pub storage: Storage,
    #[serde(skip)]
    pub tag: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct General {
    #[serde(default = "empty_string")]
    pub name: String,
    #[serde(default = "execution_default")]
    pub execution: String,
    #[serde(default = "results_path_default")]
    pub results_path: String,
    #[serde(default = "false_default")]
    pub resume: bool,
    #[serde(default = "one_default")]
    pub thread_number: usize,
    #[serde(default = "empty_string")]
    pub log_base: String,
    #[serde(default = "log_suffix_default")]
    pub log_suffix: String,
    #[serde(default = "log_level_default")]
    pub log_level: String,
    #[serde(default = "true_default")]
    pub display_colorful: bool,
}

/// A named strategy and its raw parameter string (e.g. `{name: BurakFilter, param: "10"}`)
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct StageParam {
    pub name: String,
    #[serde(default = "empty_string")]
    pub param: String,
}

impl StageParam {
    pub fn new(name: &str, param: &str) -> StageParam {
        StageParam { name: name.to_string(), param: param.to_string() }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct LoaderParam {
    #[serde(default = "loader_default")]
    pub name: String,
    pub path: String,
    #[serde(default = "label_default")]
    pub label: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Data {
    #[serde(default)]
    pub loaders: Vec<LoaderParam>,
    #[serde(default)]
    pub version_filters: Vec<StageParam>,
    #[serde(default)]
    pub test_version_filters: Vec<StageParam>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct CV {
    #[serde(default = "ten_default")]
    pub repeats: usize,
    #[serde(default = "ten_default")]
    pub folds: usize,
    #[serde(default = "slice_roles_default")]
    pub slice_roles: SliceRoles,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Pipeline {
    #[serde(default)]
    pub setwise_preprocessors: Vec<StageParam>,
    #[serde(default)]
    pub setwise_selectors: Vec<StageParam>,
    #[serde(default)]
    pub setwise_postprocessors: Vec<StageParam>,
    #[serde(default)]
    pub setwise_trainers: Vec<StageParam>,
    #[serde(default)]
    pub setwise_testaware_trainers: Vec<StageParam>,
    #[serde(default)]
    pub preprocessors: Vec<StageParam>,
    #[serde(default)]
    pub pointwise_selectors: Vec<StageParam>,
    #[serde(default)]
    pub postprocessors: Vec<StageParam>,
    #[serde(default)]
    pub trainers: Vec<StageParam>,
    #[serde(default)]
    pub testaware_trainers: Vec<StageParam>,
}

impl Pipeline {
    pub fn trainer_count(&self) -> usize {
        self.setwise_trainers.len() + self.setwise_testaware_trainers.len()
            + self.trainers.len() + self.testaware_trainers.len()
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Storage {
    #[serde(default = "storage_kind_default")]
    pub kind: String,
    /// Directory of the JSON-lines store; the results path when empty
    #[serde(default = "empty_string")]
    pub path: String,
}

impl Default for General {
    fn default() -> Self {
        serde_json::from_value(serde_json::json!({})).unwrap()
    }
}

impl Default for Data {
    fn default() -> Self {
        serde_json::from_value(serde_json::json!({})).unwrap()
    }
}

impl Default for CV {
    fn default() -> Self {
        serde_json::from_value(serde_json::json!({})).unwrap()
    }
}

impl Default for Pipeline {
    fn default() -> Self {
        serde_json::from_value(serde_json::json!({})).unwrap()
    }
}

impl Default for Storage {
    fn default() -> Self {
        serde_json::from_value(serde_json::json!({})).unwrap()
    }
}

impl Default for Param {
    fn default() -> Self {
        serde_json::from_value(serde_json::json!({})).unwrap()
    }
}

impl Param {
    pub fn new() -> Self {
        Self::default()
    }
}

pub fn get(param_file: &str) -> Result<Param> {
    let param_file_reader = File::open(param_file)?;
    let param_reader = BufReader::new(param_file_reader);

    let mut config: Param = serde_yaml::from_reader(param_reader)?;
    config.tag = param_file.to_string();

    validate(&mut config).map_err(|e| CpdpError::Config(format!("{}: {}", param_file, e)))?;

    Ok(config)
}

pub fn validate(param: &mut Param) -> std::result::Result<(), String> {
    if param.general.log_base.len() > 0 {
        param.general.display_colorful = false;
    }

    if param.general.name.trim().is_empty() {
        return Err("general.name must name the experiment".to_string());
    }

    if param.cv.repeats < 1 {
        return Err(format!("cv.repeats must be at least 1 (got {})", param.cv.repeats));
    }

    if param.cv.folds < 2 {
        return Err(format!("cv.folds must be at least 2 (got {})", param.cv.folds));
    }

    if param.pipeline.trainer_count() == 0 {
        return Err("the pipeline declares no trainer".to_string());
    }

    if !STORAGE_KINDS.contains(&param.storage.kind.as_str()) {
        return Err(format!("unknown storage kind '{}' (expected one of {})",
            param.storage.kind, STORAGE_KINDS.join(", ")));
    }

    if param.general.thread_number == 0 {
        warn!("general.thread_number=0, using one thread");
        param.general.thread_number = 1;
    }

    if param.data.loaders.is_empty() {
        warn!("[{}] no loader declared: the experiment will only see versions provided programmatically", param.general.name);
    }

    if param.general.resume && param.storage.kind == "memory" {
        warn!("[{}] resume=true with a memory store: every iteration runs again to refill the store, \
            rows already in the result file are not written again", param.general.name);
    }

    Ok(())
}

fn empty_string() -> String {
    "".to_string()
}
fn execution_default() -> String {
    "CrossProjectExperiment".to_string()
}
fn results_path_default() -> String {
    "results".to_string()
}
fn log_suffix_default() -> String {
    "log".to_string()
}
fn log_level_default() -> String {
    "info".to_string()
}
fn loader_default() -> String {
    "CsvFolderLoader".to_string()
}
fn label_default() -> String {
    "bug".to_string()
}
fn storage_kind_default() -> String {
    "none".to_string()
}
fn slice_roles_default() -> SliceRoles {
    SliceRoles::Conventional
}
fn false_default() -> bool {
    false
}
fn true_default() -> bool {
    true
}
fn one_default() -> usize {
    1
}
fn ten_default() -> usize {
    10
}

#[cfg(test)]
mod tests {
    use super::*;

    const YAML: &str = "
general:
  name: cross-project-nb
  execution: CrossProjectExperiment
  results_path: out
  resume: true
data:
  loaders:
    - path: data/jureczko
  version_filters:
    - name: MinInstanceFilter
      param: \"5\"
cv:
  repeats: 2
  folds: 5
  slice_roles: inverted
pipeline:
  setwise_preprocessors:
    - name: BinaryClass
  pointwise_selectors:
    - name: BurakFilter
      param: \"10\"
  trainers:
    - name: NaiveBayes
storage:
  kind: jsonl
";

    #[test]
    fn test_defaults() {
        let param = Param::new();
        assert_eq!(param.cv.repeats, 10);
        assert_eq!(param.cv.folds, 10);
        assert_eq!(param.cv.slice_roles, SliceRoles::Conventional);
        assert_eq!(param.general.execution, "CrossProjectExperiment");
        assert_eq!(param.general.thread_number, 1);
        assert_eq!(param.storage.kind, "none");
        assert!(!param.general.resume);
    }

    #[test]
    fn test_yaml_sections_and_stage_defaults() {
        let mut param: Param = serde_yaml::from_str(YAML).unwrap();
        assert!(validate(&mut param).is_ok());
        assert_eq!(param.general.name, "cross-project-nb");
        assert_eq!(param.cv.repeats, 2);
        assert_eq!(param.cv.slice_roles, SliceRoles::Inverted);
        assert_eq!(param.data.loaders[0].name, "CsvFolderLoader");
        assert_eq!(param.data.loaders[0].label, "bug");
        assert_eq!(param.pipeline.setwise_preprocessors[0], StageParam::new("BinaryClass", ""));
        assert_eq!(param.pipeline.pointwise_selectors[0].param, "10");
        assert_eq!(param.pipeline.trainer_count(), 1);
    }

    #[test]
    fn test_validate_rejects_invalid_settings() {
        let mut param: Param = serde_yaml::from_str(YAML).unwrap();
        param.cv.folds = 1;
        assert!(validate(&mut param).unwrap_err().contains("folds"));

        let mut param: Param = serde_yaml::from_str(YAML).unwrap();
        param.cv.repeats = 0;
        assert!(validate(&mut param).is_err());

        let mut param: Param = serde_yaml::from_str(YAML).unwrap();
        param.general.name = " ".to_string();
        assert!(validate(&mut param).is_err());

        let mut param: Param = serde_yaml::from_str(YAML).unwrap();
        param.pipeline.trainers.clear();
        assert!(validate(&mut param).unwrap_err().contains("trainer"));

        let mut param: Param = serde_yaml::from_str(YAML).unwrap();
        param.storage.kind = "sql".to_string();
        assert!(validate(&mut param).unwrap_err().contains("sql"));
    }

    #[test]
    fn test_log_file_disables_colours() {
        let mut param: Param = serde_yaml::from_str(YAML).unwrap();
        param.general.log_base = "run".to_string();
        validate(&mut param).unwrap();
        assert!(!param.general.display_colorful);
    }

    #[test]
    fn test_get_reads_and_validates_file() {
        let dir = std::env::temp_dir().join(format!("cpdp_param_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let good = dir.join("good.yaml");
        std::fs::write(&good, YAML).unwrap();
        let bad = dir.join("bad.yaml");
        std::fs::write(&bad, YAML.replace("folds: 5", "folds: 0")).unwrap();

        let param = get(&good.to_string_lossy()).unwrap();
        assert_eq!(param.tag, good.to_string_lossy());
        assert!(matches!(get(&bad.to_string_lossy()), Err(CpdpError::Config(_))));
        assert!(get(&dir.join("missing.yaml").to_string_lossy()).is_err());
        let _ = std::fs::remove_dir_all(&dir);
    }
}
