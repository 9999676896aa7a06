use log::debug;
use crate::data::Version;

/// Version filters prune the version list before an experiment starts.
/// `is_filtered` answers true when the version must be discarded.
pub trait VersionFilter: Send + Sync {
    fn name(&self) -> &str;

    fn is_filtered(&self, version: &Version) -> bool;

    fn apply(&self, versions: &mut Vec<Version>) {
        versions.retain(|v| {
            let filtered = self.is_filtered(v);
            if filtered { debug!("{}: removing {}", self.name(), v.id()) }
            !filtered
        });
    }
}

/// Removes versions with fewer than `min` instances
pub struct MinInstanceFilter {
    pub min: usize,
}

impl VersionFilter for MinInstanceFilter {
    fn name(&self) -> &str { "MinInstanceFilter" }

    fn is_filtered(&self, version: &Version) -> bool {
        version.instances.len() < self.min
    }
}

/// Removes versions with fewer than `min` defective instances
pub struct MinDefectiveFilter {
    pub min: usize,
}

impl VersionFilter for MinDefectiveFilter {
    fn name(&self) -> &str { "MinDefectiveFilter" }

    fn is_filtered(&self, version: &Version) -> bool {
        version.instances.defective_count() < self.min
    }
}

/// Removes every version of the listed projects
pub struct ProjectFilter {
    pub projects: Vec<String>,
}

impl VersionFilter for ProjectFilter {
    fn name(&self) -> &str { "ProjectFilter" }

    fn is_filtered(&self, version: &Version) -> bool {
        self.projects.iter().any(|p| *p == version.project)
    }
}

/// A version passes the chain when no filter discards it
pub fn passes_all(version: &Version, filters: &[Box<dyn VersionFilter>]) -> bool {
    filters.iter().all(|f| !f.is_filtered(version))
}
