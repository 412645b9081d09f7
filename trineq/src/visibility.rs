//! Dichotomic search over a one-parameter family of target distributions for the minimum
//! "visibility" at which the inflation certifies nonlocality (spec §4.14).
//!
//! The search only makes sense for a family `{p_v}` monotonic in the inflation's ability to
//! certify it: every `v` below some threshold feasible (compatible with the inflation, e.g.
//! local), every `v` at or above it infeasible (certified nonlocal). [`VisibilityProblem`] does
//! not check this assumption; it is the caller's to uphold, as documented on the teacher's own
//! [`crate::feasibility`] analogue.

use crate::error::Result;
use crate::feasibility::{FeasibilityProblem, FwAlgo, RetainEvents, SearchMode, Status};
use crate::inflation::{InflationSize, UseDistrSymmetries};
use crate::network::TargetDistr;
use crate::oracle::StopMode;

/// Formats `visibility / denom` as a percentage string, e.g. `"7/8 = 87.500%"`.
#[must_use]
pub fn visibility_to_str(visibility: i64, denom: i64) -> String {
    #[allow(clippy::cast_precision_loss)]
    let vis = visibility as f64 / denom as f64;
    #[allow(clippy::cast_possible_truncation)]
    let before_dot = (100.0 * vis) as i64;
    #[allow(clippy::cast_possible_truncation)]
    let after_dot = (100_000.0 * vis) as i64 % 1000;
    format!("{visibility}/{denom} = {before_dot}.{after_dot:03}%")
}

/// Which oracle a [`VisibilityProblem`] should build its (single, lazily-constructed)
/// [`FeasibilityProblem`] with. Unlike [`SearchMode`], there is no option to seed
/// [`SearchMode::TreeSearch`] with an already-filled tree: the tree is only ever built once, at
/// the first call to [`VisibilityProblem::get_minimum_nonlocal_visibility`], so there is no
/// earlier opportunity to read one back from a cache file.
#[derive(Clone, Copy, Debug)]
pub enum SearchConfig {
    /// Enumerate every raw inflation event.
    BruteForce,
    /// Walk the compressed symmetric event tree across `n_threads` workers.
    TreeSearch {
        /// Worker count for the oracle's dedicated thread pool.
        n_threads: usize,
    },
}

impl SearchConfig {
    fn into_search_mode(self) -> SearchMode {
        match self {
            Self::BruteForce => SearchMode::BruteForce,
            Self::TreeSearch { n_threads } => SearchMode::TreeSearch { n_threads, cached_tree: None },
        }
    }
}

/// A family of target distributions `{p_v}`, indexed by an integer visibility `v` over a fixed
/// denominator, searched for the minimum `v` at which the inflation certifies nonlocality (spec
/// §4.14).
pub struct VisibilityProblem<F> {
    get_distribution: F,
    min_visibility: i64,
    max_visibility: i64,
    visibility_denom: i64,
    size: InflationSize,
    use_distr_symmetries: UseDistrSymmetries,
    constraint_descriptions: Vec<Vec<String>>,
    store_bounds: bool,
    fw_algo: FwAlgo,
    search_config: SearchConfig,
    stop_mode: StopMode,
    retain_events: RetainEvents,
    feas_problem: Option<FeasibilityProblem>,
}

impl<F: FnMut(i64, i64) -> TargetDistr> VisibilityProblem<F> {
    /// Builds a dichotomic search over `get_distribution(v, visibility_denom)` for `v` ranging
    /// from `min_visibility` to `max_visibility` (both included), running each feasibility check
    /// with the inflation/constraint/solver configuration given by the remaining parameters.
    #[allow(clippy::too_many_arguments)]
    #[must_use]
    pub fn new(
        get_distribution: F,
        min_visibility: i64,
        max_visibility: i64,
        visibility_denom: i64,
        size: InflationSize,
        use_distr_symmetries: UseDistrSymmetries,
        constraint_descriptions: Vec<Vec<String>>,
        store_bounds: bool,
        fw_algo: FwAlgo,
        search_config: SearchConfig,
        stop_mode: StopMode,
        retain_events: RetainEvents,
    ) -> Self {
        Self {
            get_distribution,
            min_visibility,
            max_visibility,
            visibility_denom,
            size,
            use_distr_symmetries,
            constraint_descriptions,
            store_bounds,
            fw_algo,
            search_config,
            stop_mode,
            retain_events,
            feas_problem: None,
        }
    }

    /// The lazily-constructed feasibility problem, once the first visibility has been tested.
    #[must_use]
    pub const fn feas_problem(&self) -> Option<&FeasibilityProblem> {
        self.feas_problem.as_ref()
    }

    /// Finds the minimum visibility `v_1` such that `p_{v_1}` is certified nonlocal by this
    /// inflation (spec §4.14): a dichotomic search bracketing `v_1` between a known-feasible and a
    /// known-infeasible visibility, narrowing the bracket by testing its midpoint until the two
    /// bounds are adjacent.
    ///
    /// Returns `min_visibility` if even that is already nonlocal, or `max_visibility + 1` if even
    /// `max_visibility` fails to be certified nonlocal (signaling that the search range wasn't
    /// wide enough, since `max_visibility + 1` may not correspond to a meaningful distribution).
    ///
    /// # Errors
    ///
    /// Propagates any error from building or running a [`FeasibilityProblem`].
    pub fn get_minimum_nonlocal_visibility(&mut self) -> Result<i64> {
        if !self.visibility_is_feasible(self.min_visibility)? {
            return Ok(self.min_visibility);
        }
        if self.visibility_is_feasible(self.max_visibility)? {
            return Ok(self.max_visibility + 1);
        }

        let mut max_feasible_vis = self.min_visibility;
        let mut min_infeasible_vis = self.max_visibility;

        loop {
            debug_assert!(max_feasible_vis < min_infeasible_vis);

            if max_feasible_vis + 1 == min_infeasible_vis {
                return Ok(min_infeasible_vis);
            }

            let middle_vis = (max_feasible_vis + min_infeasible_vis) / 2;
            if self.visibility_is_feasible(middle_vis)? {
                max_feasible_vis = middle_vis;
            } else {
                min_infeasible_vis = middle_vis;
            }
        }
    }

    /// Builds the target distribution at `visibility` and checks it against the inflation,
    /// lazily constructing the underlying [`FeasibilityProblem`] on the first call and reusing it
    /// (via [`FeasibilityProblem::update_target_distribution`]) on every later one.
    fn visibility_is_feasible(&mut self, visibility: i64) -> Result<bool> {
        let distr = (self.get_distribution)(visibility, self.visibility_denom);

        let status = match self.feas_problem.as_mut() {
            Some(problem) => {
                problem.update_target_distribution(distr, self.retain_events)?;
                problem.get_feasibility()?
            }
            None => {
                let mut problem = FeasibilityProblem::new(
                    distr,
                    self.size,
                    self.use_distr_symmetries,
                    &self.constraint_descriptions,
                    self.store_bounds,
                    self.fw_algo,
                    self.search_config.into_search_mode(),
                    self.stop_mode,
                )?;
                let status = problem.get_feasibility()?;
                self.feas_problem = Some(problem);
                status
            }
        };

        Ok(status != Status::Nonlocal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::Network;
    use crate::tensor::EventTensor;

    #[test]
    fn visibility_to_str_formats_a_percentage() {
        assert_eq!(visibility_to_str(7, 8), "7/8 = 87.500%");
        assert_eq!(visibility_to_str(1, 3), "1/3 = 33.333%");
    }

    /// `p_v = v/denom` of the GHZ-correlated distribution plus `(1 - v/denom)` of white noise: a
    /// depolarizing noise model, monotonic in `v` the way the dichotomic search requires (lower
    /// visibility is less correlated, hence more local).
    fn noisy_srb_distr(n: u8, visibility: i64, denom: i64) -> TargetDistr {
        let network = Network::new(n);
        let total = i64::from(n).pow(3) * denom;
        let mut tensor = EventTensor::zeros(3, u64::from(n));
        tensor.set_denominator(total);

        for a in 0..n {
            for b in 0..n {
                for c in 0..n {
                    let noise = denom - visibility;
                    let signal = if a == b && b == c { visibility * i64::from(n).pow(2) } else { 0 };
                    tensor.set(&[a, b, c], noise + signal);
                }
            }
        }
        TargetDistr::new(network, tensor, "noisy-srb")
    }

    #[test]
    fn dichotomic_search_brackets_a_threshold_within_the_requested_range() {
        let descriptions = vec![vec!["A00,B00,C00".to_string(), String::new()]];
        let mut problem = VisibilityProblem::new(
            |v, d| noisy_srb_distr(3, v, d),
            0,
            8,
            8,
            [2, 1, 1],
            UseDistrSymmetries::Yes,
            descriptions,
            true,
            FwAlgo::Pairwise,
            SearchConfig::BruteForce,
            StopMode::Opt,
            RetainEvents::Yes,
        );

        let threshold = problem.get_minimum_nonlocal_visibility().unwrap();
        assert!((0..=9).contains(&threshold));
    }
}
