//! Linear-minimization oracle: given a constraint set's current dual vector, find the inflation
//! event minimizing the integer inner product `⟨q, Σ_c T_c(δ_e)⟩` (spec §4.11).
//!
//! [`BruteForce`] loops over every inflation event and is mostly useful to check the tree search
//! gives the expected results on small instances. [`TreeSearch`] walks the compressed symmetric
//! event tree (spec §4.4, §4.5) instead, pruning whole subtrees via branch-and-bound whenever the
//! dual vector stores bounds (spec §4.8), and splits the root-level subtrees across a thread pool.

use crate::constraint_set::ConstraintSet;
use crate::event::{Event, EventRange};
use crate::inflation::Inflation;
use crate::marginal::EvaluatorSet;
use crate::tree::{EventTree, NodePos};
use crate::tree_filler::fill_tree;
use enum_dispatch::enum_dispatch;
use rayon::prelude::*;
use std::sync::atomic::{AtomicBool, Ordering};

/// Whether an [`Oracle`] should stop as soon as a non-positive score is found, or search for the
/// true minimum (spec §4.11).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum StopMode {
    /// Stop as soon as a score `<= 0` is found; a best-effort short-circuit, not a guarantee that
    /// every worker stops instantly (spec §5).
    Sat,
    /// Search for the true minimum.
    Opt,
}

/// The minimizing inflation event found by an [`Oracle`] and its score.
#[derive(Clone, Debug)]
pub struct Solution {
    /// `⟨q, Σ_c T_c(δ_e)⟩` for [`Self::event`].
    pub score: i64,
    /// The minimizing inflation event.
    pub event: Event,
}

/// Common interface of the [`Oracle`] variants.
#[enum_dispatch]
pub trait Optimize {
    /// Finds the inflation event minimizing `constraints`' current dual vector's inner product
    /// (spec §4.11). `constraints` is taken by reference rather than stored, since the feasibility
    /// loop mutates its dual vector (spec §4.13) in between calls.
    fn optimize(&mut self, constraints: &ConstraintSet, stop_mode: StopMode) -> Solution;
}

/// The two minimization strategies (spec §4.11).
#[enum_dispatch(Optimize)]
pub enum Oracle<'a> {
    /// Enumerates every inflation event.
    BruteForce(BruteForce<'a>),
    /// Walks the compressed symmetric event tree.
    TreeSearch(TreeSearch),
}

/// Enumerates every raw inflation event in `n^|parties|`, ignoring the symmetry-reduced event
/// tree (spec §4.11, grounded on `BruteForceOpt`).
pub struct BruteForce<'a> {
    inflation: &'a Inflation,
}

impl<'a> BruteForce<'a> {
    /// Builds a brute-force oracle over `inflation`'s events.
    #[must_use]
    pub fn new(inflation: &'a Inflation) -> Self {
        Self { inflation }
    }
}

impl Optimize for BruteForce<'_> {
    fn optimize(&mut self, constraints: &ConstraintSet, stop_mode: StopMode) -> Solution {
        let n_outcomes = self.inflation.network().n_outcomes();
        let mut evaluators = constraints.marg_evaluators();
        let mut best: Option<Solution> = None;

        for event in EventRange::new(self.inflation.n_parties(), n_outcomes) {
            for (party, &outcome) in event.iter().enumerate() {
                evaluators.set_outcome(party, outcome);
            }

            let score = evaluators.evaluate_dual_vector();
            if best.as_ref().map_or(true, |b| score < b.score) {
                let reached_sat = stop_mode == StopMode::Sat && score <= 0;
                best = Some(Solution { score, event });
                if reached_sat {
                    break;
                }
            }
        }

        best.expect("an inflation always has at least one event")
    }
}

/// Walks the compressed symmetric event tree of an inflation, splitting its root-level subtrees
/// across `n_threads` workers (spec §4.4, §4.5, §4.11, §5).
pub struct TreeSearch {
    tree: EventTree,
    pool: rayon::ThreadPool,
}

impl TreeSearch {
    /// Fills the symmetric event tree of `inflation` and builds a tree-search oracle splitting
    /// work across `n_threads` workers (at least one).
    #[must_use]
    pub fn new(inflation: &Inflation, n_threads: usize) -> Self {
        let mut tree = EventTree::new(inflation.n_parties());
        fill_tree(&mut tree, inflation);

        Self { tree, pool: build_pool(n_threads) }
    }

    /// Reuses an already-filled tree (e.g. read back from the symmetric-event-tree cache file,
    /// spec §6) instead of recomputing it.
    #[must_use]
    pub fn with_tree(tree: EventTree, n_threads: usize) -> Self {
        Self { tree, pool: build_pool(n_threads) }
    }

    /// The underlying symmetric event tree, for persisting to the cache file (spec §6).
    #[must_use]
    pub const fn tree(&self) -> &EventTree {
        &self.tree
    }
}

impl Optimize for TreeSearch {
    fn optimize(&mut self, constraints: &ConstraintSet, stop_mode: StopMode) -> Solution {
        let buckets = partition_root_children(&self.tree, self.pool.current_num_threads());
        let store_bounds = constraints.store_bounds();
        let tree = &self.tree;
        let stop = AtomicBool::new(false);

        let best = self.pool.install(|| {
            buckets
                .into_par_iter()
                .map(|bucket| {
                    let mut evaluators = constraints.marg_evaluators();
                    if store_bounds {
                        reset_to_unknown(&mut evaluators, tree.depth());
                    }

                    let mut path = vec![0u8; tree.depth()];
                    let mut best: Option<Solution> = None;
                    for root in bucket {
                        if stop.load(Ordering::Relaxed) {
                            break;
                        }
                        search_subtree(tree, root, &mut evaluators, store_bounds, stop_mode, &mut path, &mut best, &stop);
                    }
                    best
                })
                .reduce(
                    || None,
                    |a, b| match (a, b) {
                        (Some(a), Some(b)) => Some(if a.score <= b.score { a } else { b }),
                        (a, None) => a,
                        (None, b) => b,
                    },
                )
        });

        best.expect("a symmetric event tree always has at least one leaf")
    }
}

/// Builds a dedicated thread pool for one [`TreeSearch`] oracle (at least one thread).
fn build_pool(n_threads: usize) -> rayon::ThreadPool {
    rayon::ThreadPoolBuilder::new()
        .num_threads(n_threads.max(1))
        .build()
        .expect("failed to build the oracle's thread pool")
}

/// Sets every inflation party's outcome to the `UNKNOWN` sentinel (`depth`-long event, outcome
/// `n_outcomes`), the evaluator's initial "nothing decided yet" state for branch-and-bound.
fn reset_to_unknown(evaluators: &mut EvaluatorSet<'_>, depth: usize) {
    let sentinel = unknown_outcome(evaluators);
    for party in 0..depth {
        evaluators.set_outcome(party, sentinel);
    }
}

/// The `UNKNOWN` sentinel outcome of a bound-aware evaluator set: one past the marginal's real
/// outcomes (its alphabet was extended to `n_outcomes + 1` by [`crate::dual_vector`] when bounds
/// are stored, spec §4.8).
fn unknown_outcome(evaluators: &EvaluatorSet<'_>) -> u8 {
    evaluators.n_outcomes() - 1
}

/// Depth-first branch-and-bound search of the subtree rooted at `pos`, updating `best` with any
/// leaf scoring lower than the current best, and pruning internal nodes whose current bound (with
/// all unfilled positions at the `UNKNOWN` sentinel) already can't beat `best` (spec §4.11).
#[allow(clippy::too_many_arguments)]
fn search_subtree(
    tree: &EventTree,
    pos: NodePos,
    evaluators: &mut EvaluatorSet<'_>,
    store_bounds: bool,
    stop_mode: StopMode,
    path: &mut Event,
    best: &mut Option<Solution>,
    stop: &AtomicBool,
) {
    if stop.load(Ordering::Relaxed) {
        return;
    }

    let node = tree.node(pos);
    evaluators.set_outcome(pos.depth, node.outcome());
    path[pos.depth] = node.outcome();

    let children = tree.children_of(pos);

    if children.is_empty() {
        let score = evaluators.evaluate_dual_vector();
        if best.as_ref().map_or(true, |b| score < b.score) {
            let reached_sat = stop_mode == StopMode::Sat && score <= 0;
            *best = Some(Solution { score, event: path.clone() });
            if reached_sat {
                stop.store(true, Ordering::Relaxed);
            }
        }
    } else {
        let prune = store_bounds
            && best.as_ref().is_some_and(|b| evaluators.evaluate_dual_vector() >= b.score);

        if !prune {
            for child in children {
                search_subtree(tree, child, evaluators, store_bounds, stop_mode, path, best, stop);
                if stop.load(Ordering::Relaxed) {
                    break;
                }
            }
        }
    }

    if store_bounds {
        evaluators.set_outcome(pos.depth, unknown_outcome(evaluators));
    }
}

/// Partitions the tree's root-level subtrees into `n_buckets` groups, balancing each bucket's
/// total leaf count via longest-processing-time-first scheduling (spec §4.11 "path partition"):
/// each root subtree's leaves share the root outcome as a common prefix, so keeping whole root
/// subtrees together keeps every bucket closed under a common prefix.
fn partition_root_children(tree: &EventTree, n_buckets: usize) -> Vec<Vec<NodePos>> {
    let mut roots: Vec<(NodePos, u64)> = tree.root_children().into_iter().map(|pos| (pos, tree.count_leaves_from(pos))).collect();
    roots.sort_by_key(|&(_, leaves)| std::cmp::Reverse(leaves));

    let n_buckets = n_buckets.max(1);
    let mut buckets: Vec<Vec<NodePos>> = vec![Vec::new(); n_buckets];
    let mut bucket_load = vec![0u64; n_buckets];

    for (pos, leaves) in roots {
        let lightest = (0..n_buckets).min_by_key(|&i| bucket_load[i]).unwrap();
        buckets[lightest].push(pos);
        bucket_load[lightest] += leaves;
    }

    buckets.retain(|bucket| !bucket.is_empty());
    buckets
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constraint_set::ConstraintSet;
    use crate::inflation::UseDistrSymmetries;
    use crate::network::{Network, TargetDistr};
    use crate::tensor::EventTensor;

    fn srb_distr(n: u8) -> TargetDistr {
        let network = Network::new(n);
        let mut tensor = EventTensor::zeros(3, u64::from(n));
        tensor.set_denominator(i64::from(n));
        for a in 0..n {
            tensor.set(&[a, a, a], 1);
        }
        TargetDistr::new(network, tensor, "srb")
    }

    fn built_constraints(store_bounds: bool) -> (Inflation, ConstraintSet) {
        let mut distr = srb_distr(2);
        let inflation = Inflation::new(&distr, [2, 1, 1], UseDistrSymmetries::Yes);
        let descriptions = vec![vec!["A00,B00,C00".to_string(), String::new()]];
        let mut constraints = ConstraintSet::new(&inflation, &descriptions, store_bounds).unwrap();
        constraints.set_target_distribution(&mut distr);

        // A small non-trivial dual vector, alternating in sign so that the minimum over events
        // isn't the trivially-zero one.
        let quovec: Vec<i64> = (0..constraints.quovec_size()).map(|i| if i % 2 == 0 { 3 } else { -5 }).collect();
        constraints.set_dual_vector_from_quovec(&quovec).unwrap();

        (inflation, constraints)
    }

    #[test]
    fn brute_force_and_tree_search_agree_without_bounds() {
        let (inflation, constraints) = built_constraints(false);
        let mut brute_force = BruteForce::new(&inflation);
        let mut tree_search = TreeSearch::new(&inflation, 2);

        assert_eq!(
            brute_force.optimize(&constraints, StopMode::Opt).score,
            tree_search.optimize(&constraints, StopMode::Opt).score
        );
    }

    #[test]
    fn brute_force_and_tree_search_agree_with_bounds() {
        let (inflation, constraints) = built_constraints(true);
        let mut brute_force = BruteForce::new(&inflation);
        let mut tree_search = TreeSearch::new(&inflation, 3);

        assert_eq!(
            brute_force.optimize(&constraints, StopMode::Opt).score,
            tree_search.optimize(&constraints, StopMode::Opt).score
        );
    }

    #[test]
    fn sat_mode_stops_as_soon_as_a_nonpositive_score_is_found() {
        let (inflation, constraints) = built_constraints(true);
        let mut tree_search = TreeSearch::new(&inflation, 2);
        let sat_solution = tree_search.optimize(&constraints, StopMode::Sat);
        assert!(sat_solution.score <= 0);
    }

    #[test]
    fn root_partition_keeps_every_root_child_and_balances_leaves() {
        let (inflation, _constraints) = built_constraints(false);
        let mut tree = EventTree::new(inflation.n_parties());
        fill_tree(&mut tree, &inflation);

        let buckets = partition_root_children(&tree, 3);
        let total: usize = buckets.iter().map(Vec::len).sum();
        assert_eq!(total, tree.root_children().len());
    }
}
