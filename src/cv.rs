use rand::SeedableRng;
use rand::seq::SliceRandom;
use rand_chacha::ChaCha8Rng;
use serde::{Serialize, Deserialize};
use crate::data::Instances;
use crate::utils::balanced_chunk_bounds;

/// Seed of the row shuffle for one repeat. It depends on the repeat index only, so two
/// versions with the same row count are shuffled identically within a repeat.
pub fn seed_for_repeat(repeat: usize) -> u64 {
    repeat as u64 + 1
}

/// This class implements the cross validation partition of one version for one repeat:
/// rows are shuffled once, then cut into `folds` contiguous test folds.
///
/// When the row count is not a multiple of `folds`, the first `n % folds` test folds hold
/// one row more than the others; fold sizes never differ by more than one row. With fewer
/// rows than folds the trailing test folds are empty.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct CV {
    pub repeat: usize,
    pub folds: usize,
    pub order: Vec<usize>,
}

impl CV {
    pub fn new(n_rows: usize, folds: usize, repeat: usize) -> CV {
        let mut rng = ChaCha8Rng::seed_from_u64(seed_for_repeat(repeat));
        let mut order: Vec<usize> = (0..n_rows).collect();
        order.shuffle(&mut rng);

        CV { repeat, folds, order }
    }

    pub fn n_rows(&self) -> usize {
        self.order.len()
    }

    /// Row indices of test fold `fold`
    pub fn test_indices(&self, fold: usize) -> &[usize] {
        let (start, end) = balanced_chunk_bounds(self.order.len(), self.folds, fold);
        &self.order[start..end]
    }

    /// Row indices of every other fold, in shuffled order
    pub fn train_indices(&self, fold: usize) -> Vec<usize> {
        let (start, end) = balanced_chunk_bounds(self.order.len(), self.folds, fold);
        self.order[..start].iter().chain(self.order[end..].iter()).copied().collect()
    }

    pub fn test_cv(&self, data: &Instances, fold: usize) -> Instances {
        data.subset(self.test_indices(fold))
    }

    pub fn train_cv(&self, data: &Instances, fold: usize) -> Instances {
        data.subset(&self.train_indices(fold))
    }

    /// (train, test) row indices of every fold
    pub fn get_ids(&self) -> Vec<(Vec<usize>, Vec<usize>)> {
        (0..self.folds)
            .map(|fold| (self.train_indices(fold), self.test_indices(fold).to_vec()))
            .collect()
    }
}
