//! The feasibility driver: alternates a Frank–Wolfe solve with a linear-minimization oracle call
//! until either a certificate of nonlocality is found or the Frank–Wolfe iterate collapses back
//! to the origin (spec §4.13).

use crate::constraint_set::ConstraintSet;
use crate::error::{Error, Result};
use crate::event::Event;
use crate::frank_wolfe::{Engine, FrankWolfe, FullyCorrective, Pairwise};
use crate::inflation::{Inflation, InflationSize, UseDistrSymmetries};
use crate::network::TargetDistr;
use crate::oracle::{self, BruteForce, Optimize, StopMode, TreeSearch};
use crate::tree::EventTree;
use num_integer::Integer;
use std::collections::BTreeSet;

/// The outcome of [`FeasibilityProblem::get_feasibility`] (spec §4.13).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Status {
    /// A certificate was found: the rounded dual vector is non-negative on every inflation event
    /// and strictly positive on the target distribution.
    Nonlocal,
    /// The Frank–Wolfe iterate collapsed to the origin before a certificate was found. This does
    /// not prove the distribution is local, only that this run of the algorithm didn't certify
    /// nonlocality.
    Inconclusive,
}

/// Whether [`FeasibilityProblem::update_target_distribution`] should replay every inflation event
/// memorized so far against the new distribution, or start the Frank–Wolfe active set over.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RetainEvents {
    /// Replay every previously memorized event (spec §4.13): useful when scanning a family of
    /// target distributions close to one another, since most of the active set usually survives.
    Yes,
    /// Discard the active set and start over with just the all-zero event.
    No,
}

/// Which Frank–Wolfe subproblem solver to use (spec §4.12).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FwAlgo {
    /// [`FullyCorrective`].
    FullyCorrective,
    /// [`Pairwise`].
    Pairwise,
}

/// Which linear-minimization oracle to use (spec §4.11).
pub enum SearchMode {
    /// [`BruteForce`]: enumerate every raw inflation event.
    BruteForce,
    /// [`TreeSearch`]: walk the compressed symmetric event tree across `n_threads` workers,
    /// optionally reusing an already-filled tree read back from the symmetric-event-tree cache
    /// file (spec §6) instead of rebuilding it.
    TreeSearch {
        /// Worker count for the oracle's dedicated thread pool.
        n_threads: usize,
        /// An already-filled tree, if one was read from the cache file.
        cached_tree: Option<EventTree>,
    },
}

enum SearchEngine {
    BruteForce,
    TreeSearch(TreeSearch),
}

/// An inflation feasibility problem: an [`Inflation`], the [`ConstraintSet`] derived from it, and
/// the Frank–Wolfe/oracle solvers working over them (spec §4.13).
pub struct FeasibilityProblem {
    inflation: Inflation,
    constraints: ConstraintSet,
    frank_wolfe: Engine,
    search: SearchEngine,
    stop_mode: StopMode,
    n_iterations: usize,
}

impl FeasibilityProblem {
    /// Builds an inflation of `distr` at `size`, its constraint set from
    /// `constraint_descriptions`, and the Frank–Wolfe/oracle solvers requested, then seeds the
    /// Frank–Wolfe active set with the all-zero event.
    ///
    /// # Errors
    ///
    /// Returns an error if any constraint description is malformed (spec §4.6).
    pub fn new(
        mut distr: TargetDistr,
        size: InflationSize,
        use_distr_symmetries: UseDistrSymmetries,
        constraint_descriptions: &[Vec<String>],
        store_bounds: bool,
        fw_algo: FwAlgo,
        search_mode: SearchMode,
        stop_mode: StopMode,
    ) -> Result<Self> {
        let inflation = Inflation::new(&distr, size, use_distr_symmetries);
        let mut constraints = ConstraintSet::new(&inflation, constraint_descriptions, store_bounds)?;
        constraints.set_target_distribution(&mut distr);

        let quovec_size = constraints.quovec_size();
        let frank_wolfe = match fw_algo {
            FwAlgo::FullyCorrective => Engine::FullyCorrective(FullyCorrective::new(quovec_size)),
            FwAlgo::Pairwise => Engine::Pairwise(Pairwise::new(quovec_size)),
        };

        let search = match search_mode {
            SearchMode::BruteForce => SearchEngine::BruteForce,
            SearchMode::TreeSearch { n_threads, cached_tree } => SearchEngine::TreeSearch(match cached_tree {
                Some(tree) => TreeSearch::with_tree(tree, n_threads),
                None => TreeSearch::new(&inflation, n_threads),
            }),
        };

        let mut problem = Self { inflation, constraints, frank_wolfe, search, stop_mode, n_iterations: 0 };
        problem.init_frank_wolfe();
        Ok(problem)
    }

    /// The inflation this problem was built over.
    #[must_use]
    pub const fn inflation(&self) -> &Inflation {
        &self.inflation
    }

    /// The constraint set this problem was built over, including its current dual vector.
    #[must_use]
    pub const fn constraints(&self) -> &ConstraintSet {
        &self.constraints
    }

    /// The inflation and a mutable handle on the constraint set, borrowed disjointly: useful for
    /// certificate I/O, which needs to read a dual vector into the constraint set while
    /// re-checking it against the (unchanged) inflation.
    pub fn inflation_and_constraints_mut(&mut self) -> (&Inflation, &mut ConstraintSet) {
        (&self.inflation, &mut self.constraints)
    }

    /// The number of Frank–Wolfe/oracle rounds run by the last [`Self::get_feasibility`] call.
    #[must_use]
    pub const fn n_iterations(&self) -> usize {
        self.n_iterations
    }

    /// The filled symmetric event tree, if [`SearchMode::TreeSearch`] was selected, for persisting
    /// to the cache file (spec §6).
    #[must_use]
    pub fn symtree(&self) -> Option<&EventTree> {
        match &self.search {
            SearchEngine::TreeSearch(tree_search) => Some(tree_search.tree()),
            SearchEngine::BruteForce => None,
        }
    }

    /// Runs the main Frank–Wolfe/oracle loop (spec §4.13):
    ///
    /// 1. Solve the Frank–Wolfe subproblem over the events memorized so far. If the solution isn't
    ///    valid (the iterate collapsed to the origin), report [`Status::Inconclusive`].
    /// 2. Round the solution's direction to an integer dual vector and set it on the constraint
    ///    set.
    /// 3. Run the oracle to find the inflation event minimizing this dual vector's inner product.
    ///    If that minimum is strictly positive, the dual vector is a certificate: report
    ///    [`Status::Nonlocal`].
    /// 4. Otherwise, memorize the minimizing event and go back to step 1.
    ///
    /// # Errors
    ///
    /// Propagates any error from the Frank–Wolfe solver or from setting the rounded dual vector.
    pub fn get_feasibility(&mut self) -> Result<Status> {
        self.n_iterations = 0;

        loop {
            let fw_solution = self.frank_wolfe.solve()?;
            if !fw_solution.valid {
                return Ok(Status::Inconclusive);
            }

            let rounded = round_and_rescale(&fw_solution.vec, self.constraints.max_dual_vector_component());
            self.constraints.set_dual_vector_from_quovec(&rounded)?;

            let oracle_solution = self.optimize();
            self.n_iterations += 1;

            if oracle_solution.score > 0 {
                return Ok(Status::Nonlocal);
            }

            self.memorize_event(&oracle_solution.event);
        }
    }

    /// Updates the target distribution, checking that its symmetry group is still compatible with
    /// this problem's inflation (spec §4.9, §4.13).
    ///
    /// # Errors
    ///
    /// Returns [`Error::SymmetriesChanged`] if `distr`'s symmetry group is incompatible with the
    /// inflation this problem was built over.
    pub fn update_target_distribution(&mut self, mut distr: TargetDistr, retain: RetainEvents) -> Result<()> {
        if !self.inflation.has_symmetries_compatible_with(&distr) {
            return Err(Error::SymmetriesChanged);
        }

        let events_to_replay = match retain {
            RetainEvents::Yes => Some(self.frank_wolfe.stored_events().clone()),
            RetainEvents::No => None,
        };

        self.constraints.set_target_distribution(&mut distr);
        self.frank_wolfe.reset();

        match events_to_replay {
            Some(events) => {
                for event in &events {
                    self.memorize_event(event);
                }
            }
            None => self.init_frank_wolfe(),
        }

        Ok(())
    }

    fn optimize(&mut self) -> oracle::Solution {
        match &mut self.search {
            SearchEngine::BruteForce => BruteForce::new(&self.inflation).optimize(&self.constraints, self.stop_mode),
            SearchEngine::TreeSearch(tree_search) => tree_search.optimize(&self.constraints, self.stop_mode),
        }
    }

    fn memorize_event(&mut self, event: &Event) {
        let quovec = self.constraints.inflation_event_quovec(event);
        let denom = 0.001 * self.constraints.quovec_denom();
        self.frank_wolfe.memorize_event_and_quovec(event, &quovec, denom);
    }

    fn init_frank_wolfe(&mut self) {
        let event = self.inflation.all_zero_event();
        self.memorize_event(&event);
    }
}

/// Rounds a Frank–Wolfe direction `vec` to an integer dual vector (spec §4.13): scales every
/// component so that the largest has absolute value `0.95 * bound`, truncates towards zero, then
/// divides through by the result's GCD to keep the integers small. `vec` is all zero only if every
/// stored vertex is the origin, which never happens (the all-zero event always contributes zero,
/// but at least one memorized event is non-trivial by the time the Frank–Wolfe solution is valid).
fn round_and_rescale(vec: &[f64], bound: i64) -> Vec<i64> {
    let max_abs = vec.iter().fold(0.0_f64, |acc, &x| acc.max(x.abs()));
    if max_abs == 0.0 {
        return vec![0; vec.len()];
    }

    #[allow(clippy::cast_precision_loss)]
    let scale = 0.95 * bound as f64 / max_abs;
    #[allow(clippy::cast_possible_truncation)]
    let mut rounded: Vec<i64> = vec.iter().map(|&x| (x * scale) as i64).collect();
    simplify_by_gcd(&mut rounded);
    rounded
}

/// Divides every entry of `values` by their overall GCD in place.
fn simplify_by_gcd(values: &mut [i64]) {
    let mut the_gcd = values[0];
    for &v in &values[1..] {
        the_gcd = the_gcd.gcd(&v);
        if the_gcd == 1 {
            return;
        }
    }
    if the_gcd > 1 {
        for v in values.iter_mut() {
            *v /= the_gcd;
        }
    }
}
