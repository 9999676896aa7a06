use serde::{Serialize, Deserialize};
use std::cmp::Ordering;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use log::{debug, error, info, warn};
use crate::error::{CpdpError, Result};
use crate::utils::natural_cmp;

/// Columns used as effort measure, in priority order (JURECZKO, NASA/MDP, AEEEM, RELINK, SMARTSHARK).
pub const EFFORT_COLUMNS: [&str; 5] = ["loc", "LOC_EXECUTABLE", "numberOfLinesOfCode", "CountLineCodeExe", "LOC"];

/// Effort of a row when no effort column exists.
pub const DEFAULT_EFFORT: f64 = 1.0;

/// A table of instances: one row per module/file, numeric features and one label.
#[derive(Clone, Serialize, Deserialize, PartialEq)]
pub struct Instances {
    pub X: Vec<Vec<f64>>,         // Row-major feature values
    pub y: Vec<f64>,              // Label: defect count or defect presence
    pub features: Vec<String>,    // Feature names, same order as the X columns
    pub label: String,            // Name of the label column
    pub weights: Vec<f64>,        // Row weights (1.0 unless a selector re-weights)
}

impl Instances {
    /// Create an empty table with the given schema
    pub fn new(features: Vec<String>, label: &str) -> Instances {
        Instances {
            X: Vec::new(),
            y: Vec::new(),
            features,
            label: label.to_string(),
            weights: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.y.len()
    }

    pub fn is_empty(&self) -> bool {
        self.y.is_empty()
    }

    pub fn push(&mut self, row: Vec<f64>, y: f64) {
        self.X.push(row);
        self.y.push(y);
        self.weights.push(1.0);
    }

    /// Check if another table shares the same schema (same features, same order)
    pub fn check_compatibility(&self, other: &Instances) -> bool {
        self.features == other.features
    }

    /// A new table holding the given rows, in the given order
    pub fn subset(&self, indices: &[usize]) -> Instances {
        Instances {
            X: indices.iter().map(|&i| self.X[i].clone()).collect(),
            y: indices.iter().map(|&i| self.y[i]).collect(),
            features: self.features.clone(),
            label: self.label.clone(),
            weights: indices.iter().map(|&i| self.weights[i]).collect(),
        }
    }

    /// Append every row of `other`, which must share the schema
    pub fn add(&mut self, other: &Instances) -> Result<()> {
        if !self.check_compatibility(other) {
            return Err(CpdpError::data("merged table", format!(
                "cannot merge tables with different features: {}", self.schema_difference(other))));
        }
        self.X.extend(other.X.iter().cloned());
        self.y.extend(other.y.iter().copied());
        self.weights.extend(other.weights.iter().copied());
        Ok(())
    }

    /// Describe how the feature lists of two tables differ
    pub fn schema_difference(&self, other: &Instances) -> String {
        let only_here: Vec<&str> = self.features.iter().filter(|f| !other.features.contains(f)).map(String::as_str).collect();
        let only_there: Vec<&str> = other.features.iter().filter(|f| !self.features.contains(f)).map(String::as_str).collect();
        if only_here.is_empty() && only_there.is_empty() {
            return format!("same features in another order [{}] vs [{}]", self.features.join(","), other.features.join(","));
        }
        format!("[{}] only on one side, [{}] only on the other", only_here.join(","), only_there.join(","))
    }

    pub fn column(&self, name: &str) -> Option<usize> {
        self.features.iter().position(|f| f == name)
    }

    pub fn column_values(&self, j: usize) -> Vec<f64> {
        self.X.iter().map(|row| row[j]).collect()
    }

    /// Per-row effort, looked up through [`EFFORT_COLUMNS`]; constant 1.0 without such a column.
    pub fn efforts(&self) -> Vec<f64> {
        match EFFORT_COLUMNS.iter().find_map(|name| self.column(name)) {
            Some(j) => self.column_values(j),
            None => vec![DEFAULT_EFFORT; self.len()],
        }
    }

    /// Per-row bug count, read from the label
    pub fn num_bugs(&self) -> Vec<f64> {
        self.y.clone()
    }

    /// Number of rows labelled defective (label > 0)
    pub fn defective_count(&self) -> usize {
        self.y.iter().filter(|&&v| v > 0.0).count()
    }

    /// Column means, used as a cheap characteristic vector of the table
    pub fn feature_means(&self) -> Vec<f64> {
        let n = self.len().max(1) as f64;
        let mut means = vec![0.0; self.features.len()];
        for row in &self.X {
            for (m, v) in means.iter_mut().zip(row.iter()) { *m += v }
        }
        means.iter_mut().for_each(|m| *m /= n);
        means
    }
}

impl fmt::Debug for Instances {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Instances: {} rows x {} features (label {}, {} defective)",
            self.len(), self.features.len(), self.label, self.defective_count())
    }
}

/// One project snapshot and its instances
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Version {
    pub project: String,
    pub version: String,
    pub instances: Instances,
}

impl Version {
    pub fn new(project: &str, version: &str, instances: Instances) -> Version {
        Version { project: project.to_string(), version: version.to_string(), instances }
    }

    /// Identifier used in logs and result rows
    pub fn id(&self) -> String {
        format!("{}-{}", self.project, self.version)
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.project == other.project && self.version == other.version
    }
}

impl Eq for Version {}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        natural_cmp(&self.project, &other.project)
            .then_with(|| natural_cmp(&self.version, &other.version))
    }
}

/// Source of versions. Loaders may be chained, their results are accumulated.
pub trait Loader: Send + Sync {
    fn load(&self) -> Result<Vec<Version>>;
}

/// Versions already in memory
pub struct MemoryLoader {
    pub versions: Vec<Version>,
}

impl Loader for MemoryLoader {
    fn load(&self) -> Result<Vec<Version>> {
        Ok(self.versions.clone())
    }
}

/// Loads `<path>/<project>/<version>.csv`: one sub-directory per project, one CSV file per version.
///
/// Feature columns are decided over the whole load: a column is kept when it is numeric in
/// every version, so that all versions share one schema. A version whose file cannot be read
/// (missing label column, unreadable label, malformed CSV) is skipped.
pub struct CsvFolderLoader {
    pub path: PathBuf,
    pub label: String,
}

impl CsvFolderLoader {
    pub fn new(path: &str, label: &str) -> CsvFolderLoader {
        CsvFolderLoader { path: PathBuf::from(path), label: label.to_string() }
    }

    fn sorted_entries(dir: &Path) -> Result<Vec<PathBuf>> {
        let mut entries: Vec<PathBuf> = fs::read_dir(dir)?
            .filter_map(|e| e.ok().map(|e| e.path()))
            .collect();
        entries.sort();
        Ok(entries)
    }

    /// Every readable `(project, version, table)` under the root
    fn read_tables(&self) -> Result<Vec<(String, String, RawTable)>> {
        let mut tables = Vec::new();
        for project_dir in Self::sorted_entries(&self.path)? {
            if !project_dir.is_dir() { continue }
            let project = project_dir.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default();

            for file in Self::sorted_entries(&project_dir)? {
                let is_csv = file.extension().map(|e| e.eq_ignore_ascii_case("csv")).unwrap_or(false);
                if !is_csv { continue }
                let version = file.file_stem().map(|n| n.to_string_lossy().to_string()).unwrap_or_default();
                match RawTable::read(&file, &self.label) {
                    Ok(table) => tables.push((project.clone(), version, table)),
                    Err(e) => error!("{}-{}: version skipped: {}", project, version, e),
                }
            }
        }
        Ok(tables)
    }
}

impl Loader for CsvFolderLoader {
    fn load(&self) -> Result<Vec<Version>> {
        info!("Loading versions from {}...", self.path.display());
        let tables = self.read_tables()?;

        let mut features: Vec<String> = match tables.first() {
            Some((_, _, first)) => first.numeric_columns(),
            None => Vec::new(),
        };
        for (project, version, table) in tables.iter().skip(1) {
            let numeric = table.numeric_columns();
            features.retain(|f| {
                let keep = numeric.contains(f);
                if !keep { warn!("{}-{}: column {} is missing or not numeric, dropped from every version", project, version, f) }
                keep
            });
        }

        let mut versions = Vec::new();
        for (project, version, table) in &tables {
            match table.to_instances(&features, &self.label) {
                Ok(instances) => {
                    debug!("{}-{}: {:?}", project, version, instances);
                    versions.push(Version::new(project, version, instances));
                }
                Err(e) => error!("{}-{}: version skipped: {}", project, version, e),
            }
        }

        if versions.is_empty() {
            warn!("No version found under {}", self.path.display());
        }
        Ok(versions)
    }
}

/// Parse a label value: numbers are kept (defect counts), boolean-like words map to 0/1
pub fn parse_label(value: &str) -> Option<f64> {
    if let Ok(v) = value.parse::<f64>() { return Some(v) }
    match value.to_ascii_lowercase().as_str() {
        "true" | "yes" | "buggy" | "defective" | "y" => Some(1.0),
        "false" | "no" | "clean" | "n" => Some(0.0),
        _ => None
    }
}

/// One CSV file, parsed but not yet turned into features
pub struct RawTable {
    source: String,
    headers: Vec<String>,
    label_idx: usize,
    records: Vec<csv::StringRecord>,
}

impl RawTable {
    /// A missing label column is a data error
    pub fn read(path: &Path, label: &str) -> Result<RawTable> {
        let source = path.display().to_string();
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::All)
            .from_path(path)?;

        let headers: Vec<String> = reader.headers()?.iter().map(String::from).collect();
        let label_idx = headers.iter().position(|h| h == label)
            .ok_or_else(|| CpdpError::data(&source, format!("missing label column '{}'", label)))?;
        let records: Vec<csv::StringRecord> = reader.records().collect::<std::result::Result<_, _>>()?;
        Ok(RawTable { source, headers, label_idx, records })
    }

    /// Columns other than the label whose every value is numeric, in file order
    pub fn numeric_columns(&self) -> Vec<String> {
        (0..self.headers.len())
            .filter(|&j| j != self.label_idx)
            .filter(|&j| {
                let numeric = self.records.iter().all(|r| r.get(j).map(|v| v.parse::<f64>().is_ok()).unwrap_or(false));
                if !numeric { debug!("{}: non-numeric column {}", self.source, self.headers[j]) }
                numeric
            })
            .map(|j| self.headers[j].clone())
            .collect()
    }

    /// Table restricted to `features`, which must all be numeric columns of this file
    pub fn to_instances(&self, features: &[String], label: &str) -> Result<Instances> {
        let feature_idx: Vec<usize> = features.iter()
            .map(|f| self.headers.iter().position(|h| h == f)
                .ok_or_else(|| CpdpError::data(&self.source, format!("missing column '{}'", f))))
            .collect::<Result<_>>()?;

        let mut instances = Instances::new(features.to_vec(), label);
        for (line, record) in self.records.iter().enumerate() {
            let raw = record.get(self.label_idx).unwrap_or("");
            let y = parse_label(raw)
                .ok_or_else(|| CpdpError::data(&self.source, format!("row {}: unreadable label '{}'", line + 1, raw)))?;
            let row = feature_idx.iter()
                .map(|&j| record.get(j).and_then(|v| v.parse::<f64>().ok()).unwrap_or(0.0))
                .collect();
            instances.push(row, y);
        }
        Ok(instances)
    }
}

/// Load one CSV file into an [`Instances`] table, keeping its numeric columns
pub fn load_csv_instances(path: &Path, label: &str) -> Result<Instances> {
    let table = RawTable::read(path, label)?;
    table.to_instances(&table.numeric_columns(), label)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::string_vec;
    use std::io::Write;

    impl Instances {
        /// rows: (features..., label); features named f0..fn, label "bug"
        pub fn test_with_rows(rows: &[(&[f64], f64)]) -> Instances {
            let n_features = rows.first().map(|r| r.0.len()).unwrap_or(0);
            let mut instances = Instances::new((0..n_features).map(|j| format!("f{}", j)).collect(), "bug");
            for (x, y) in rows {
                instances.push(x.to_vec(), *y);
            }
            instances
        }

        /// n rows with a linear signal: defective when f0 is large
        pub fn test_linear(n: usize, offset: f64) -> Instances {
            let mut instances = Instances::new(string_vec!["loc", "wmc"], "bug");
            for i in 0..n {
                let x = i as f64 + offset;
                let y = if i % 3 == 0 { 1.0 } else { 0.0 };
                instances.push(vec![10.0 + x + 50.0 * y, (i % 7) as f64], y);
            }
            instances
        }
    }

    impl Version {
        pub fn test(project: &str, version: &str, n: usize) -> Version {
            Version::new(project, version, Instances::test_linear(n, 0.0))
        }
    }

    #[test]
    fn test_efforts_use_first_known_column() {
        let mut instances = Instances::new(string_vec!["wmc", "LOC", "loc"], "bug");
        instances.push(vec![1.0, 200.0, 100.0], 0.0);
        instances.push(vec![2.0, 400.0, 300.0], 2.0);
        assert_eq!(instances.efforts(), vec![100.0, 300.0]);
    }

    #[test]
    fn test_efforts_default_to_constant_without_effort_column() {
        let instances = Instances::test_with_rows(&[(&[1.0, 2.0], 0.0), (&[3.0, 4.0], 1.0), (&[5.0, 6.0], 3.0)]);
        assert_eq!(instances.efforts(), vec![1.0, 1.0, 1.0]);
        assert_eq!(instances.num_bugs(), vec![0.0, 1.0, 3.0]);
    }

    #[test]
    fn test_subset_and_add_preserve_schema() {
        let data = Instances::test_linear(10, 0.0);
        let mut a = data.subset(&[0, 1, 2]);
        let b = data.subset(&[7, 8]);
        a.add(&b).unwrap();
        assert_eq!(a.len(), 5);
        assert_eq!(a.y, vec![data.y[0], data.y[1], data.y[2], data.y[7], data.y[8]]);
        assert_eq!(a.features, data.features);
        // source untouched
        assert_eq!(b.len(), 2);
    }

    #[test]
    fn test_add_rejects_incompatible_schema() {
        let mut a = Instances::test_linear(3, 0.0);
        let b = Instances::test_with_rows(&[(&[1.0], 0.0)]);
        assert!(a.add(&b).is_err());
        assert_eq!(a.len(), 3);
    }

    #[test]
    fn test_schema_difference_names_the_features() {
        let mut a = Instances::new(string_vec!["loc"], "bug");
        let b = Instances::new(string_vec!["wmc"], "bug");
        match a.add(&b) {
            Err(CpdpError::Data { msg, .. }) => {
                assert!(msg.contains("[loc]"));
                assert!(msg.contains("[wmc]"));
            }
            other => panic!("expected a data error, got {:?}", other),
        }
        let c = Instances::new(string_vec!["wmc", "loc"], "bug");
        let d = Instances::new(string_vec!["loc", "wmc"], "bug");
        assert!(c.schema_difference(&d).contains("another order"));
    }

    #[test]
    fn test_version_order_is_by_project_then_version() {
        let mut versions = vec![
            Version::test("camel", "1.10", 1),
            Version::test("ant", "1.7", 1),
            Version::test("camel", "1.9", 1),
            Version::test("ant", "1.3", 1),
        ];
        versions.sort();
        let ids: Vec<String> = versions.iter().map(|v| v.id()).collect();
        assert_eq!(ids, vec!["ant-1.3", "ant-1.7", "camel-1.9", "camel-1.10"]);
    }

    #[test]
    fn test_parse_label() {
        assert_eq!(parse_label("3"), Some(3.0));
        assert_eq!(parse_label("TRUE"), Some(1.0));
        assert_eq!(parse_label("clean"), Some(0.0));
        assert_eq!(parse_label("maybe"), None);
    }

    fn write_file(path: &Path, content: &str) {
        let mut file = fs::File::create(path).unwrap();
        file.write_all(content.as_bytes()).unwrap();
    }

    #[test]
    fn test_csv_folder_loader_reads_projects_and_drops_text_columns() {
        let root = std::env::temp_dir().join("cpdp_test_csv_folder_loader");
        let _ = fs::remove_dir_all(&root);
        fs::create_dir_all(root.join("ant")).unwrap();
        fs::create_dir_all(root.join("camel")).unwrap();
        write_file(&root.join("ant").join("1.3.csv"), "name,wmc,loc,bug\norg.A,3,120,0\norg.B,5,300,2\n");
        write_file(&root.join("camel").join("1.0.csv"), "name,wmc,loc,bug\norg.C,1,50,1\n");
        write_file(&root.join("camel").join("notes.txt"), "ignored");

        let loader = CsvFolderLoader::new(root.to_str().unwrap(), "bug");
        let versions = loader.load().unwrap();

        assert_eq!(versions.len(), 2);
        assert_eq!(versions[0].id(), "ant-1.3");
        assert_eq!(versions[0].instances.features, vec!["wmc", "loc"]);
        assert_eq!(versions[0].instances.y, vec![0.0, 2.0]);
        assert_eq!(versions[0].instances.efforts(), vec![120.0, 300.0]);
        assert_eq!(versions[1].id(), "camel-1.0");

        fs::remove_dir_all(&root).unwrap();
    }

    #[test]
    fn test_unreadable_version_is_skipped_and_siblings_load() {
        let root = std::env::temp_dir().join("cpdp_test_unreadable_version");
        let _ = fs::remove_dir_all(&root);
        fs::create_dir_all(root.join("ant")).unwrap();
        write_file(&root.join("ant").join("1.3.csv"), "wmc,loc,bug\n3,120,0\n5,300,2\n");
        write_file(&root.join("ant").join("1.4.csv"), "wmc,loc\n3,120\n");
        write_file(&root.join("ant").join("1.5.csv"), "wmc,loc,bug\n3,120,maybe\n");

        let versions = CsvFolderLoader::new(root.to_str().unwrap(), "bug").load().unwrap();

        let ids: Vec<String> = versions.iter().map(|v| v.id()).collect();
        assert_eq!(ids, vec!["ant-1.3"]);
        assert_eq!(versions[0].instances.len(), 2);
        fs::remove_dir_all(&root).unwrap();
    }

    #[test]
    fn test_feature_columns_are_shared_by_every_version() {
        let root = std::env::temp_dir().join("cpdp_test_shared_schema");
        let _ = fs::remove_dir_all(&root);
        fs::create_dir_all(root.join("ant")).unwrap();
        fs::create_dir_all(root.join("camel")).unwrap();
        // cbo holds a text cell in camel, rfc only exists in ant
        write_file(&root.join("ant").join("1.3.csv"), "cbo,wmc,rfc,loc,bug\n1,3,7,120,0\n2,5,9,300,1\n");
        write_file(&root.join("camel").join("1.0.csv"), "loc,cbo,wmc,bug\n50,n/a,1,1\n70,4,2,0\n");

        let versions = CsvFolderLoader::new(root.to_str().unwrap(), "bug").load().unwrap();

        assert_eq!(versions.len(), 2);
        assert_eq!(versions[0].instances.features, vec!["wmc", "loc"]);
        assert_eq!(versions[1].instances.features, vec!["wmc", "loc"]);
        assert_eq!(versions[1].instances.X, vec![vec![1.0, 50.0], vec![2.0, 70.0]]);
        assert!(versions[0].instances.check_compatibility(&versions[1].instances));
        fs::remove_dir_all(&root).unwrap();
    }

    #[test]
    fn test_missing_label_column_is_a_data_error() {
        let root = std::env::temp_dir().join("cpdp_test_missing_label");
        let _ = fs::remove_dir_all(&root);
        fs::create_dir_all(&root).unwrap();
        let file = root.join("1.0.csv");
        write_file(&file, "wmc,loc\n1,2\n");

        match load_csv_instances(&file, "bug") {
            Err(CpdpError::Data { msg, .. }) => assert!(msg.contains("bug")),
            other => panic!("expected a data error, got {:?}", other.map(|i| i.len())),
        }
        fs::remove_dir_all(&root).unwrap();
    }
}
