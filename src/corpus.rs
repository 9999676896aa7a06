use std::fmt;
use log::debug;
use serde::{Serialize, Deserialize};
use crate::cv::CV;
use crate::data::{Instances, Version};
use crate::error::CpdpError;

/// Which side of a fold a slice comes from
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SlicePart {
    Test,
    Train,
}

/// Identity of a slice: two slices with the same id hold the same rows
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SliceId {
    pub version: usize,
    pub repeat: usize,
    pub fold: usize,
    pub part: SlicePart,
}

/// Rows of one version for one (repeat, fold, part)
#[derive(Clone, Debug)]
pub struct Slice {
    pub id: SliceId,
    pub project: String,
    pub version: String,
    pub data: Instances,
}

impl Slice {
    /// Version id and fold side, as shown in error messages
    pub fn label(&self) -> String {
        format!("{}-{} ({:?} part of fold {})", self.project, self.version, self.id.part, self.id.fold)
    }
}

/// Collection of per-version training slices, with set semantics over slice identity.
/// Set-wise stages consume a `TrainingSet` and return a new one.
#[derive(Clone, Debug, Default)]
pub struct TrainingSet {
    slices: Vec<Slice>,
}

impl TrainingSet {
    pub fn new() -> TrainingSet {
        TrainingSet { slices: Vec::new() }
    }

    /// Add a slice unless a slice with the same id is already present
    pub fn insert(&mut self, slice: Slice) -> bool {
        if self.slices.iter().any(|s| s.id == slice.id) {
            return false;
        }
        self.slices.push(slice);
        true
    }

    pub fn len(&self) -> usize {
        self.slices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slices.is_empty()
    }

    pub fn total_rows(&self) -> usize {
        self.slices.iter().map(|s| s.data.len()).sum()
    }

    pub fn slices(&self) -> &[Slice] {
        &self.slices
    }

    pub fn iter(&self) -> impl Iterator<Item = &Slice> {
        self.slices.iter()
    }

    pub fn into_slices(self) -> Vec<Slice> {
        self.slices
    }

    pub fn retain<F: FnMut(&Slice) -> bool>(mut self, f: F) -> TrainingSet {
        self.slices.retain(f);
        self
    }

    /// Transform the data of every slice, keeping identities
    pub fn map_data<E, F>(self, mut f: F) -> Result<TrainingSet, E>
    where F: FnMut(Instances) -> Result<Instances, E> {
        let mut slices = Vec::with_capacity(self.slices.len());
        for slice in self.slices {
            let Slice { id, project, version, data } = slice;
            slices.push(Slice { id, project, version, data: f(data)? });
        }
        Ok(TrainingSet { slices })
    }

    /// Unify every slice into one table. None when there is no row to train on.
    pub fn merge(self) -> crate::error::Result<Option<Instances>> {
        let mut slices = self.slices.into_iter();
        let (mut merged, mut sources) = match slices.next() {
            Some(first) => {
                let label = first.label();
                (first.data, vec![label])
            }
            None => return Ok(None),
        };
        for slice in slices {
            if !merged.check_compatibility(&slice.data) {
                return Err(CpdpError::data(&slice.label(), format!(
                    "cannot merge with {}: {}", sources.join(", "), merged.schema_difference(&slice.data))));
            }
            merged.add(&slice.data)?;
            sources.push(slice.label());
        }
        if merged.is_empty() { Ok(None) } else { Ok(Some(merged)) }
    }
}

impl FromIterator<Slice> for TrainingSet {
    fn from_iter<I: IntoIterator<Item = Slice>>(iter: I) -> Self {
        let mut set = TrainingSet::new();
        for slice in iter { set.insert(slice); }
        set
    }
}

/// Custom eligibility predicate: (candidate, test version, all versions) -> eligible
pub type EligibilityFn = fn(&Version, &Version, &[Version]) -> bool;

/// Decides which versions may contribute training data for a test version
#[derive(Clone, Copy)]
pub enum TrainingPolicy {
    /// every version, the version under test included (through its complementary slice)
    AllVersions,
    /// every version but the one under test
    AllOtherVersions,
    /// only versions of other projects
    ExcludeSameProject,
    /// versions of the same project, the version under test included
    SameProject,
    /// strictly older versions of the same project
    OlderVersionsOfProject,
    Custom(EligibilityFn),
}

impl TrainingPolicy {
    pub fn is_training_eligible(&self, candidate: &Version, test: &Version, versions: &[Version]) -> bool {
        match self {
            TrainingPolicy::AllVersions => true,
            TrainingPolicy::AllOtherVersions => candidate != test,
            TrainingPolicy::ExcludeSameProject => candidate.project != test.project,
            TrainingPolicy::SameProject => candidate.project == test.project,
            TrainingPolicy::OlderVersionsOfProject => candidate.project == test.project && candidate < test,
            TrainingPolicy::Custom(f) => f(candidate, test, versions),
        }
    }
}

impl fmt::Debug for TrainingPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TrainingPolicy::AllVersions => "AllVersions",
            TrainingPolicy::AllOtherVersions => "AllOtherVersions",
            TrainingPolicy::ExcludeSameProject => "ExcludeSameProject",
            TrainingPolicy::SameProject => "SameProject",
            TrainingPolicy::OlderVersionsOfProject => "OlderVersionsOfProject",
            TrainingPolicy::Custom(_) => "Custom",
        };
        write!(f, "{}", name)
    }
}

/// Which fold side is evaluated and which side feeds the training corpus.
/// `Conventional` evaluates on the test fold and trains on train folds; `Inverted` swaps both.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum SliceRoles {
    Conventional,
    Inverted,
}

impl SliceRoles {
    pub fn evaluated_part(&self) -> SlicePart {
        match self {
            SliceRoles::Conventional => SlicePart::Test,
            SliceRoles::Inverted => SlicePart::Train,
        }
    }

    pub fn training_part(&self) -> SlicePart {
        match self {
            SliceRoles::Conventional => SlicePart::Train,
            SliceRoles::Inverted => SlicePart::Test,
        }
    }
}

/// Output of the assembler: the evaluated slice and its candidate training slices
pub struct Assembly {
    pub test: Slice,
    pub training: TrainingSet,
}

/// Builds, for one test slice, the set of eligible training slices
#[derive(Clone, Copy, Debug)]
pub struct Assembler {
    pub policy: TrainingPolicy,
    pub roles: SliceRoles,
}

impl Assembler {
    pub fn new(policy: TrainingPolicy, roles: SliceRoles) -> Assembler {
        Assembler { policy, roles }
    }

    /// `partitions[i]` is the partition of `versions[i]` for the current repeat.
    /// Sources are never modified: slices are copies of the selected rows.
    pub fn assemble(&self, versions: &[Version], partitions: &[CV], test_idx: usize, fold: usize) -> Assembly {
        let test_version = &versions[test_idx];
        let test = make_slice(versions, partitions, test_idx, fold, self.roles.evaluated_part());

        let mut training = TrainingSet::new();
        for (i, candidate) in versions.iter().enumerate() {
            if !self.policy.is_training_eligible(candidate, test_version, versions) { continue }
            let slice = make_slice(versions, partitions, i, fold, self.roles.training_part());
            if !training.insert(slice) {
                debug!("{} already in the training set, skipping duplicate slice", candidate.id());
            }
        }

        Assembly { test, training }
    }
}

pub fn make_slice(versions: &[Version], partitions: &[CV], idx: usize, fold: usize, part: SlicePart) -> Slice {
    let version = &versions[idx];
    let cv = &partitions[idx];
    let data = match part {
        SlicePart::Test => cv.test_cv(&version.instances, fold),
        SlicePart::Train => cv.train_cv(&version.instances, fold),
    };
    Slice {
        id: SliceId { version: idx, repeat: cv.repeat, fold, part },
        project: version.project.clone(),
        version: version.version.clone(),
        data,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn versions_and_partitions(specs: &[(&str, &str, usize)], repeat: usize) -> (Vec<Version>, Vec<CV>) {
        let versions: Vec<Version> = specs.iter().map(|(p, v, n)| Version::test(p, v, *n)).collect();
        let partitions = versions.iter().map(|v| CV::new(v.instances.len(), 10, repeat)).collect();
        (versions, partitions)
    }

    #[test]
    fn test_training_set_ignores_duplicate_slices() {
        let (versions, partitions) = versions_and_partitions(&[("ant", "1.3", 30), ("camel", "1.0", 30)], 0);
        let mut set = TrainingSet::new();
        assert!(set.insert(make_slice(&versions, &partitions, 1, 2, SlicePart::Train)));
        assert!(!set.insert(make_slice(&versions, &partitions, 1, 2, SlicePart::Train)));
        assert!(set.insert(make_slice(&versions, &partitions, 1, 2, SlicePart::Test)));
        assert_eq!(set.len(), 2);
        assert_eq!(set.total_rows(), 30);
    }

    #[test]
    fn test_assembler_two_versions_conventional() {
        let (versions, partitions) = versions_and_partitions(&[("ant", "1.3", 100), ("camel", "1.0", 100)], 0);
        let assembler = Assembler::new(TrainingPolicy::AllOtherVersions, SliceRoles::Conventional);

        for fold in 0..10 {
            let assembly = assembler.assemble(&versions, &partitions, 0, fold);
            assert_eq!(assembly.test.data.len(), 10);
            assert_eq!(assembly.training.len(), 1);
            let slice = &assembly.training.slices()[0];
            assert_eq!(slice.project, "camel");
            assert_eq!(slice.id.fold, fold);
            assert!(slice.data.len() <= 100);
        }
    }

    #[test]
    fn test_assembler_self_slice_is_disjoint_from_test() {
        let (versions, partitions) = versions_and_partitions(&[("ant", "1.3", 47)], 2);
        for roles in [SliceRoles::Conventional, SliceRoles::Inverted] {
            let assembler = Assembler::new(TrainingPolicy::AllVersions, roles);
            let assembly = assembler.assemble(&versions, &partitions, 0, 4);
            let cv = &partitions[0];
            let test_rows: HashSet<usize> = match roles.evaluated_part() {
                SlicePart::Test => cv.test_indices(4).iter().copied().collect(),
                SlicePart::Train => cv.train_indices(4).into_iter().collect(),
            };
            let train_rows: HashSet<usize> = match roles.training_part() {
                SlicePart::Test => cv.test_indices(4).iter().copied().collect(),
                SlicePart::Train => cv.train_indices(4).into_iter().collect(),
            };
            assert!(test_rows.is_disjoint(&train_rows));
            assert_eq!(assembly.training.total_rows() + assembly.test.data.len(), 47);
        }
    }

    #[test]
    fn test_policy_rejecting_everything_gives_empty_training_set() {
        let (versions, partitions) = versions_and_partitions(&[("ant", "1.3", 20), ("ant", "1.4", 20)], 0);
        let assembler = Assembler::new(TrainingPolicy::ExcludeSameProject, SliceRoles::Conventional);
        let assembly = assembler.assemble(&versions, &partitions, 0, 0);
        assert!(assembly.training.is_empty());
        assert!(assembly.training.merge().unwrap().is_none());
    }

    #[test]
    fn test_policies() {
        let versions = vec![Version::test("ant", "1.3", 1), Version::test("ant", "1.4", 1), Version::test("camel", "1.0", 1)];
        let (a13, a14, c10) = (&versions[0], &versions[1], &versions[2]);

        assert!(TrainingPolicy::AllVersions.is_training_eligible(a14, a14, &versions));
        assert!(!TrainingPolicy::AllOtherVersions.is_training_eligible(a14, a14, &versions));
        assert!(TrainingPolicy::ExcludeSameProject.is_training_eligible(c10, a14, &versions));
        assert!(!TrainingPolicy::ExcludeSameProject.is_training_eligible(a13, a14, &versions));
        assert!(TrainingPolicy::SameProject.is_training_eligible(a14, a14, &versions));
        assert!(TrainingPolicy::OlderVersionsOfProject.is_training_eligible(a13, a14, &versions));
        assert!(!TrainingPolicy::OlderVersionsOfProject.is_training_eligible(a14, a13, &versions));

        fn only_camel(candidate: &Version, _: &Version, _: &[Version]) -> bool { candidate.project == "camel" }
        let custom = TrainingPolicy::Custom(only_camel);
        assert!(custom.is_training_eligible(c10, a13, &versions));
        assert!(!custom.is_training_eligible(a14, a13, &versions));
    }

    #[test]
    fn test_merge_names_the_clashing_versions_and_features() {
        let mut camel = Version::test("camel", "1.0", 20);
        camel.instances.features = vec!["loc".to_string(), "cbo".to_string()];
        let versions = vec![Version::test("ant", "1.3", 20), camel, Version::test("ivy", "2.0", 20)];
        let partitions: Vec<CV> = versions.iter().map(|v| CV::new(v.instances.len(), 4, 0)).collect();
        let assembly = Assembler::new(TrainingPolicy::AllOtherVersions, SliceRoles::Conventional)
            .assemble(&versions, &partitions, 2, 0);

        match assembly.training.merge() {
            Err(CpdpError::Data { version, msg }) => {
                assert!(version.starts_with("camel-1.0"));
                assert!(msg.contains("ant-1.3"));
                assert!(msg.contains("wmc") && msg.contains("cbo"));
            }
            other => panic!("expected a data error, got {:?}", other.map(|m| m.map(|i| i.len()))),
        }
    }

    #[test]
    fn test_merge_does_not_duplicate_rows() {
        let (versions, partitions) = versions_and_partitions(&[("ant", "1.3", 30), ("camel", "1.0", 40), ("ivy", "2.0", 50)], 1);
        let assembler = Assembler::new(TrainingPolicy::AllOtherVersions, SliceRoles::Conventional);
        let assembly = assembler.assemble(&versions, &partitions, 0, 0);
        let expected = assembly.training.total_rows();
        let merged = assembly.training.merge().unwrap().unwrap();
        assert_eq!(merged.len(), expected);
        assert_eq!(merged.len(), 36 + 45);
        // sources untouched
        assert_eq!(versions[1].instances.len(), 40);
    }
}
