//! [`FeasOptions`]: the full set of tunable parameters for a feasibility or visibility problem,
//! gathered in one getter/setter struct (spec §6) rather than threaded through as loose arguments.

use crate::feasibility::FwAlgo;
pub use crate::inflation::UseDistrSymmetries;
use crate::oracle::StopMode;

/// Which solver walks the inflation events: every raw event, or the compressed symmetric tree
/// across a thread pool. Distinct from [`crate::feasibility::SearchMode`]: that one carries
/// runtime data (thread count, an already-read cached tree), while this one is the caller's
/// pre-run configuration, mirroring [`crate::visibility::SearchConfig`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SearchMode {
    /// Enumerate every raw inflation event.
    BruteForce,
    /// Walk the compressed symmetric event tree.
    TreeSearch,
}

/// Whether the event tree should be read from, written to, or left untouched on disk (spec §6).
/// The library never performs this I/O itself (`trineq_cli` does, around a `FeasibilityProblem`);
/// this only records which behavior was requested.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SymtreeIo {
    /// Build the tree fresh and don't persist it.
    None,
    /// Read a previously-written tree from disk instead of rebuilding it.
    Read,
    /// Build the tree fresh and persist it to disk afterwards.
    Write,
}

/// The full parameter set for a feasibility or visibility problem (spec §6), gathered into one
/// getter/setter struct the way `pineappl::subgrid::SubgridParams` gathers subgrid interpolation
/// parameters.
#[derive(Clone, Debug)]
pub struct FeasOptions {
    inflation_size: [usize; 3],
    constraint_descriptions: Vec<Vec<String>>,
    search_mode: SearchMode,
    use_distr_symmetries: UseDistrSymmetries,
    stop_mode: StopMode,
    fw_algo: FwAlgo,
    store_bounds: bool,
    n_threads: usize,
    symtree_io: SymtreeIo,
}

impl Default for FeasOptions {
    fn default() -> Self {
        Self {
            inflation_size: [0, 0, 0],
            constraint_descriptions: Vec::new(),
            search_mode: SearchMode::TreeSearch,
            use_distr_symmetries: UseDistrSymmetries::Yes,
            stop_mode: StopMode::Opt,
            fw_algo: FwAlgo::FullyCorrective,
            store_bounds: true,
            n_threads: 1,
            symtree_io: SymtreeIo::None,
        }
    }
}

impl FeasOptions {
    /// Returns the inflation size `(n_alpha, n_beta, n_gamma)`.
    #[must_use]
    pub const fn inflation_size(&self) -> [usize; 3] {
        self.inflation_size
    }

    /// Sets the inflation size `(n_alpha, n_beta, n_gamma)`.
    pub fn set_inflation_size(&mut self, inflation_size: [usize; 3]) {
        self.inflation_size = inflation_size;
    }

    /// Returns the parsed constraint descriptions.
    #[must_use]
    pub fn constraint_descriptions(&self) -> &[Vec<String>] {
        &self.constraint_descriptions
    }

    /// Sets the constraint descriptions.
    pub fn set_constraint_descriptions(&mut self, constraint_descriptions: Vec<Vec<String>>) {
        self.constraint_descriptions = constraint_descriptions;
    }

    /// Returns the configured search mode.
    #[must_use]
    pub const fn search_mode(&self) -> SearchMode {
        self.search_mode
    }

    /// Sets the search mode.
    pub fn set_search_mode(&mut self, search_mode: SearchMode) {
        self.search_mode = search_mode;
    }

    /// Returns whether the target distribution's own symmetries are used.
    #[must_use]
    pub const fn use_distr_symmetries(&self) -> UseDistrSymmetries {
        self.use_distr_symmetries
    }

    /// Sets whether the target distribution's own symmetries are used.
    pub fn set_use_distr_symmetries(&mut self, use_distr_symmetries: UseDistrSymmetries) {
        self.use_distr_symmetries = use_distr_symmetries;
    }

    /// Returns the configured stop mode.
    #[must_use]
    pub const fn stop_mode(&self) -> StopMode {
        self.stop_mode
    }

    /// Sets the stop mode.
    pub fn set_stop_mode(&mut self, stop_mode: StopMode) {
        self.stop_mode = stop_mode;
    }

    /// Returns the configured Frank-Wolfe algorithm.
    #[must_use]
    pub const fn fw_algo(&self) -> FwAlgo {
        self.fw_algo
    }

    /// Sets the Frank-Wolfe algorithm.
    pub fn set_fw_algo(&mut self, fw_algo: FwAlgo) {
        self.fw_algo = fw_algo;
    }

    /// Returns whether bound rules are stored in the dual vector.
    #[must_use]
    pub const fn store_bounds(&self) -> bool {
        self.store_bounds
    }

    /// Sets whether bound rules are stored in the dual vector.
    pub fn set_store_bounds(&mut self, store_bounds: bool) {
        self.store_bounds = store_bounds;
    }

    /// Returns the configured thread count.
    #[must_use]
    pub const fn n_threads(&self) -> usize {
        self.n_threads
    }

    /// Sets the thread count used by the tree-search oracle's worker pool.
    ///
    /// # Panics
    ///
    /// Panics if `n_threads` is zero.
    pub fn set_n_threads(&mut self, n_threads: usize) {
        assert!(n_threads >= 1, "n_threads must be at least 1");
        self.n_threads = n_threads;
    }

    /// Returns the configured symmetric-tree I/O mode.
    #[must_use]
    pub const fn symtree_io(&self) -> SymtreeIo {
        self.symtree_io
    }

    /// Sets the symmetric-tree I/O mode.
    pub fn set_symtree_io(&mut self, symtree_io: SymtreeIo) {
        self.symtree_io = symtree_io;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_options_match_the_documented_sensible_defaults() {
        let options = FeasOptions::default();
        assert_eq!(options.search_mode(), SearchMode::TreeSearch);
        assert_eq!(options.use_distr_symmetries(), UseDistrSymmetries::Yes);
        assert_eq!(options.stop_mode(), StopMode::Opt);
        assert_eq!(options.fw_algo(), FwAlgo::FullyCorrective);
        assert!(options.store_bounds());
        assert_eq!(options.n_threads(), 1);
        assert_eq!(options.symtree_io(), SymtreeIo::None);
    }

    #[test]
    fn setters_round_trip_through_getters() {
        let mut options = FeasOptions::default();
        options.set_inflation_size([2, 2, 1]);
        options.set_search_mode(SearchMode::BruteForce);
        options.set_n_threads(4);
        options.set_symtree_io(SymtreeIo::Write);

        assert_eq!(options.inflation_size(), [2, 2, 1]);
        assert_eq!(options.search_mode(), SearchMode::BruteForce);
        assert_eq!(options.n_threads(), 4);
        assert_eq!(options.symtree_io(), SymtreeIo::Write);
    }

    #[test]
    #[should_panic(expected = "n_threads must be at least 1")]
    fn zero_threads_is_rejected() {
        let mut options = FeasOptions::default();
        options.set_n_threads(0);
    }
}
