//! Seeded k-fold partitioning of row indices.
//!
//! The permutation is a Fisher–Yates shuffle driven by `ChaCha8Rng`, whose
//! output stream is fixed by its seed on every platform. For `i` from `n − 1`
//! down to `1`, `j` is drawn uniformly from `0..=i` as a `u64`, whatever the
//! width of `usize`, and positions `i` and `j` are swapped. The shuffled order is cut into `k` contiguous groups, the
//! first `n mod k` groups holding one extra row.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum CrossValidationError {
    #[error("The fold count must be at least 2, got {0}")]
    InvalidFoldCount(usize),

    #[error("{rows} rows are too few for {folds}-fold cross-validation (need at least {required})")]
    InsufficientData {
        rows: usize,
        folds: usize,
        required: usize,
    },
}

/// One cross-validation iteration: the held-out group and everything else.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CvSplit {
    pub fold: usize,
    pub train: Vec<usize>,
    pub test: Vec<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KFold {
    folds: usize,
    seed: u64,
}

impl KFold {
    pub fn new(folds: usize, seed: u64) -> Result<Self, CrossValidationError> {
        if folds < 2 {
            return Err(CrossValidationError::InvalidFoldCount(folds));
        }
        Ok(Self { folds, seed })
    }

    pub fn folds(&self) -> usize {
        self.folds
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Seeded permutation of `0..n`.
    pub fn permutation(&self, n: usize) -> Vec<usize> {
        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);
        let mut indices: Vec<usize> = (0..n).collect();
        for i in (1..n).rev() {
            let j = rng.gen_range(0..=i as u64) as usize;
            indices.swap(i, j);
        }
        indices
    }

    /// Sizes of the `k` groups; earlier groups absorb the remainder.
    pub fn fold_sizes(&self, n: usize) -> Vec<usize> {
        let base = n / self.folds;
        let remainder = n % self.folds;
        (0..self.folds)
            .map(|i| if i < remainder { base + 1 } else { base })
            .collect()
    }

    /// The contiguous groups of the shuffled order, one per fold.
    pub fn assign(&self, n: usize) -> Result<Vec<Vec<usize>>, CrossValidationError> {
        let required = 2 * self.folds;
        if n < required {
            return Err(CrossValidationError::InsufficientData {
                rows: n,
                folds: self.folds,
                required,
            });
        }
        let order = self.permutation(n);
        let mut groups = Vec::with_capacity(self.folds);
        let mut start = 0;
        for size in self.fold_sizes(n) {
            groups.push(order[start..start + size].to_vec());
            start += size;
        }
        Ok(groups)
    }

    /// Train/test index pairs for every fold of `n` rows.
    pub fn split(&self, n: usize) -> Result<Vec<CvSplit>, CrossValidationError> {
        let groups = self.assign(n)?;
        let splits = (0..groups.len())
            .map(|fold| CvSplit {
                fold,
                test: groups[fold].clone(),
                train: groups
                    .iter()
                    .enumerate()
                    .filter(|(other, _)| *other != fold)
                    .flat_map(|(_, group)| group.iter().copied())
                    .collect(),
            })
            .collect();
        Ok(splits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn folds_partition_every_row_exactly_once() {
        for folds in 2..=6 {
            for n in (2 * folds)..(2 * folds + 15) {
                let kfold = KFold::new(folds, 7).unwrap();
                let splits = kfold.split(n).unwrap();
                assert_eq!(splits.len(), folds);

                let mut seen = vec![0usize; n];
                for split in &splits {
                    for &i in &split.test {
                        seen[i] += 1;
                    }
                    assert_eq!(split.train.len() + split.test.len(), n);
                    let mut all: Vec<usize> =
                        split.train.iter().chain(&split.test).copied().collect();
                    all.sort_unstable();
                    assert_eq!(all, (0..n).collect::<Vec<_>>());
                }
                assert!(seen.iter().all(|&c| c == 1), "n={n}, k={folds}");
            }
        }
    }

    #[test]
    fn remainder_goes_to_earliest_folds() {
        let kfold = KFold::new(4, 1).unwrap();
        assert_eq!(kfold.fold_sizes(11), vec![3, 3, 3, 2]);
        let groups = kfold.assign(11).unwrap();
        let sizes: Vec<usize> = groups.iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![3, 3, 3, 2]);
    }

    #[test]
    fn same_seed_same_assignment() {
        let a = KFold::new(5, 42).unwrap().split(37).unwrap();
        let b = KFold::new(5, 42).unwrap().split(37).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn different_seed_changes_order() {
        let a = KFold::new(3, 1).unwrap().permutation(50);
        let b = KFold::new(3, 2).unwrap().permutation(50);
        assert_ne!(a, b);
        let mut sorted = a.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, (0..50).collect::<Vec<_>>());
    }

    #[test]
    fn shuffle_draws_sixty_four_bit_indices() {
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        let mut expected: Vec<usize> = (0..23).collect();
        for i in (1..23u64).rev() {
            let j: u64 = rng.gen_range(0..=i);
            expected.swap(i as usize, j as usize);
        }
        assert_eq!(KFold::new(5, 42).unwrap().permutation(23), expected);
    }

    #[test]
    fn rejects_degenerate_configurations() {
        assert_eq!(
            KFold::new(1, 0).unwrap_err(),
            CrossValidationError::InvalidFoldCount(1)
        );
        assert_eq!(
            KFold::new(5, 0).unwrap().split(9).unwrap_err(),
            CrossValidationError::InsufficientData {
                rows: 9,
                folds: 5,
                required: 10
            }
        );
    }
}
