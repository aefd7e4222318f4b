//! Compiler configuration.

use strata_core::schema::DEFAULT_INDEX_BLOCK_SIZE;

/// Settings shared by every compilation of one compiler instance.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CompilerConfig {
    /// Seed of the random generator shared by all random functions of a query.
    pub random_seed: (u64, u64),
    /// Upper bound on crossed-table anchors tried by join reordering.
    pub max_join_permutations: usize,
    /// Initial capacity of the sort tree.
    pub sort_key_capacity: usize,
    /// Default index value block size for `CREATE TABLE ... index`.
    pub index_value_block_size: usize,
    /// Keywords match regardless of case. Always on.
    pub case_insensitive_keywords: bool,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            random_seed: (0xdead_beef, 0xcafe_babe),
            max_join_permutations: 64,
            sort_key_capacity: 1024,
            index_value_block_size: DEFAULT_INDEX_BLOCK_SIZE,
            case_insensitive_keywords: true,
        }
    }
}

impl CompilerConfig {
    /// Creates the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the random seed.
    pub fn with_random_seed(mut self, s0: u64, s1: u64) -> Self {
        self.random_seed = (s0, s1);
        self
    }

    /// Sets the join permutation bound.
    pub fn with_max_join_permutations(mut self, max: usize) -> Self {
        self.max_join_permutations = max.max(1);
        self
    }

    /// Sets the sort tree capacity.
    pub fn with_sort_key_capacity(mut self, capacity: usize) -> Self {
        self.sort_key_capacity = capacity;
        self
    }
}
