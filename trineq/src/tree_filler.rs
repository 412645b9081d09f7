//! Fills an [`EventTree`] with the symmetrized inflation events of an [`Inflation`] (spec §4.5).
//!
//! The naive approach — enumerate every inflation event, keep the lexicographically-smallest
//! representative of each orbit, then rebuild a tree from that list — is infeasible once the
//! inflation has more than a handful of parties. Instead we grow the tree depth-first, carrying
//! along only the symmetries that can still possibly matter at each depth: a symmetry that has
//! already pushed the working event strictly above its image can never pull it back down, so it
//! is dropped: a symmetry that still points past the filled prefix (an "unknown" position) is
//! kept for the next depth: and a symmetry that pulls the event strictly below its image prunes
//! the whole branch outcome immediately.

use crate::event::Event;
use crate::inflation::Inflation;
use crate::symmetry::OutcomeSym;
use crate::tree::EventTree;

struct TreeFiller<'a> {
    tree: &'a mut EventTree,
    n_parties: usize,
    n_outcomes: u8,
    unknown: u8,
    inverse_party_syms: Vec<Vec<usize>>,
    outcome_syms: Vec<OutcomeSym>,
    working_event: Event,
}

/// Stores the symmetrized events of `inflation` as a compressed tree in `tree`.
///
/// # Panics
///
/// Panics if `tree`'s depth doesn't match `inflation`'s number of parties.
pub fn fill_tree(tree: &mut EventTree, inflation: &Inflation) {
    assert_eq!(tree.depth(), inflation.n_parties(), "tree depth must match the inflation's party count");

    let mut inverse_party_syms = Vec::new();
    let mut outcome_syms = Vec::new();
    for sigma in inflation.inflation_symmetries() {
        inverse_party_syms.push(sigma.party().inverse_image().to_vec());
        outcome_syms.push(sigma.outcome().clone());
    }

    let n_parties = inflation.n_parties();
    let n_outcomes = inflation.network().n_outcomes();
    let mut filler = TreeFiller {
        tree,
        n_parties,
        n_outcomes,
        unknown: n_outcomes,
        inverse_party_syms,
        outcome_syms,
        working_event: vec![n_outcomes; n_parties],
    };

    let all_syms: Vec<usize> = (0..filler.outcome_syms.len()).collect();
    let root_children = filler.find_children(0, &all_syms);
    assert!(!root_children.is_empty(), "an inflation always has at least one symmetrized event");

    filler.tree.finish_initialization();
}

impl TreeFiller<'_> {
    /// Fills `working_event[depth]` with every candidate outcome, keeping only those for which
    /// the working event is still a lexicographically-smallest representative of its orbit under
    /// `current_syms`; recurses to fill the remaining depths, and inserts a node for every
    /// surviving (and non-empty, unless at the last depth) outcome.
    fn find_children(&mut self, depth: usize, current_syms: &[usize]) -> Vec<usize> {
        debug_assert_eq!(self.working_event[depth], self.unknown);

        let not_at_last_depth = depth < self.n_parties - 1;
        let mut child_nodes = Vec::new();

        for outcome_to_fill in 0..self.n_outcomes {
            self.working_event[depth] = outcome_to_fill;

            let mut is_symmetrized = true;
            let mut next_syms = Vec::new();

            for &sym_index in current_syms {
                let inverse_party_sym = &self.inverse_party_syms[sym_index];
                let outcome_sym = &self.outcome_syms[sym_index];

                for depth_bis in 0..self.n_parties {
                    let source = self.working_event[inverse_party_sym[depth_bis]];

                    // The symmetry still reaches into an unfilled position: we cannot yet tell
                    // whether it helps symmetrize the event, so it survives to the next depth.
                    if source == self.unknown {
                        if not_at_last_depth {
                            next_syms.push(sym_index);
                        }
                        break;
                    }

                    let base_outcome = self.working_event[depth_bis];
                    let transformed = outcome_sym.apply(source);

                    if transformed < base_outcome {
                        is_symmetrized = false;
                        break;
                    }
                    if transformed > base_outcome {
                        // The image is already strictly above the working event: filling the
                        // rest cannot change that, so this symmetry can never prune a future
                        // branch. Drop it.
                        break;
                    }
                    // Equal at this position: keep comparing the next one.
                }

                if !is_symmetrized {
                    break;
                }
            }

            if !is_symmetrized {
                continue;
            }

            let children = if not_at_last_depth {
                let children = self.find_children(depth + 1, &next_syms);
                if children.is_empty() {
                    continue;
                }
                children
            } else {
                Vec::new()
            };

            child_nodes.push(self.tree.insert_node(depth, outcome_to_fill, children));
        }

        self.working_event[depth] = self.unknown;
        child_nodes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
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

    #[test]
    fn fills_a_nonempty_tree_matching_inflation_party_count() {
        let distr = srb_distr(2);
        let inflation = Inflation::new(&distr, [1, 1, 1], crate::inflation::UseDistrSymmetries::Yes);
        let mut tree = EventTree::new(inflation.n_parties());
        fill_tree(&mut tree, &inflation);
        assert_eq!(tree.depth(), inflation.n_parties());
        assert!(tree.n_leaves() > 0);
    }

    #[test]
    fn leaf_count_never_exceeds_the_unreduced_event_count() {
        let distr = srb_distr(2);
        let inflation = Inflation::new(&distr, [1, 1, 1], crate::inflation::UseDistrSymmetries::No);
        let mut tree = EventTree::new(inflation.n_parties());
        fill_tree(&mut tree, &inflation);
        let unreduced = 2u64.pow(u32::try_from(inflation.n_parties()).unwrap());
        assert!(tree.n_leaves() <= unreduced);
    }

    #[test]
    fn larger_symmetry_group_never_increases_leaf_count() {
        let distr = srb_distr(2);
        let with_sym = Inflation::new(&distr, [2, 1, 1], crate::inflation::UseDistrSymmetries::Yes);
        let without_sym = Inflation::new(&distr, [2, 1, 1], crate::inflation::UseDistrSymmetries::No);

        let mut tree_with = EventTree::new(with_sym.n_parties());
        fill_tree(&mut tree_with, &with_sym);
        let mut tree_without = EventTree::new(without_sym.n_parties());
        fill_tree(&mut tree_without, &without_sym);

        assert!(tree_with.n_leaves() <= tree_without.n_leaves());
    }
}
