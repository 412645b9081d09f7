//! Compiled marginal permutations and an incremental evaluator for inner products against a
//! dual vector (spec §4.7).
//!
//! For an inflation marginal `marg` and a constraint symmetry group `G`, the reduced set of
//! marginal permutations `RedPermutedMargs(marg)` lets us write the inner product of a dual
//! vector against the marginal-extracted events of an inflation event as a sum over a small,
//! symmetry-deduplicated set of terms rather than over every raw marginal permutation. The
//! [`Evaluator`] compiles this into per-inflation-party update rules so that, during the tree
//! search (spec §4.11), a single outcome assignment updates every affected term in `O(1)` instead
//! of recomputing the whole sum.

use crate::event::Event;
use crate::inflation::Inflation;
use crate::symmetry::{Group, OutcomeSym, PartySym, Symmetry};
use crate::tensor::compute_weights;
use rustc_hash::FxHashMap;
use std::collections::BTreeSet;

/// A marginal permutation `(sigma, pi)`: an outcome permutation `sigma` and a map `pi` from
/// marginal-party position to inflation-party index.
#[derive(Clone, Debug, Eq, PartialEq, PartialOrd, Ord)]
pub struct Permutation {
    outcome_sym: OutcomeSym,
    parties: Vec<usize>,
}

/// An update rule: changing the outcome of one inflation party updates the marginal event
/// extracted by marginal permutation `marg_perm_index` at the position weighted by
/// `party_weight`.
#[derive(Clone, Debug)]
struct UpdateRule {
    marg_perm_index: usize,
    inverse_outcome_sym: OutcomeSym,
    party_weight: i64,
}

/// A compiled, per-thread-cloneable evaluator of inner products against a dual vector, built from
/// a [`Marginal`]'s reduced marginal permutations (spec §4.7).
#[derive(Clone)]
pub struct Evaluator<'a> {
    is_scalar_marginal: bool,
    inflation_event: Event,
    n_outcomes: u8,
    marg_event_hashes: Vec<i64>,
    party_to_update_rules: Vec<Vec<UpdateRule>>,
    dual_vector: Option<&'a crate::tensor::EventTensor>,
    scale: Option<&'a i64>,
}

impl<'a> Evaluator<'a> {
    fn new(
        n_inflation_parties: usize,
        n_marginal_parties: usize,
        n_outcomes: u8,
        n_marg_perms: usize,
        party_to_update_rules: Vec<Vec<UpdateRule>>,
    ) -> Self {
        Self {
            is_scalar_marginal: n_marginal_parties == 0,
            inflation_event: vec![0; n_inflation_parties],
            n_outcomes,
            marg_event_hashes: vec![0; n_marg_perms],
            party_to_update_rules,
            dual_vector: None,
            scale: None,
        }
    }

    /// Sets the dual vector `F` whose inner product with the marginal-extracted events will be
    /// evaluated.
    ///
    /// # Panics
    ///
    /// Panics if already set.
    pub fn set_dual_vector_reference(&mut self, dual_vector: &'a crate::tensor::EventTensor) {
        assert!(self.dual_vector.is_none(), "dual vector reference already set");
        self.dual_vector = Some(dual_vector);
    }

    /// Sets the scale factor multiplying the evaluated inner product.
    ///
    /// # Panics
    ///
    /// Panics if already set.
    pub fn set_scale_reference(&mut self, scale: &'a i64) {
        assert!(self.scale.is_none(), "scale reference already set");
        self.scale = Some(scale);
    }

    /// Updates the outcome of `inflation_party`, incrementally updating every marginal-extracted
    /// event hash this party feeds into.
    ///
    /// # Panics
    ///
    /// Panics if `outcome` is out of range.
    pub fn set_outcome(&mut self, inflation_party: usize, outcome: u8) {
        assert!(outcome < self.n_outcomes, "outcome out of range");

        if self.is_scalar_marginal || outcome == self.inflation_event[inflation_party] {
            return;
        }

        for rule in &self.party_to_update_rules[inflation_party] {
            let new_outcome = rule.inverse_outcome_sym.apply(outcome);
            let old_outcome = rule.inverse_outcome_sym.apply(self.inflation_event[inflation_party]);
            self.marg_event_hashes[rule.marg_perm_index] +=
                (i64::from(new_outcome) - i64::from(old_outcome)) * rule.party_weight;
        }

        self.inflation_event[inflation_party] = outcome;
    }

    /// Evaluates `scale * sum_{marg_perm} F(extract(inflation_event, marg_perm))`.
    ///
    /// # Panics
    ///
    /// Panics if the dual vector or scale reference hasn't been set.
    #[must_use]
    pub fn evaluate_dual_vector(&self) -> i64 {
        let dual_vector = self.dual_vector.expect("dual vector reference not set");
        let scale = self.scale.expect("scale reference not set");

        let score = if self.is_scalar_marginal {
            dual_vector.get_by_hash(0)
        } else {
            self.marg_event_hashes
                .iter()
                .map(|&hash| dual_vector.get_by_hash(u64::try_from(hash).unwrap()))
                .sum()
        };

        scale * score
    }

    /// The underlying inflation event, as currently assigned via [`Self::set_outcome`].
    #[must_use]
    pub fn inflation_event(&self) -> &Event {
        &self.inflation_event
    }

    /// This evaluator's outcome alphabet size: the network's outcome count, plus one for the
    /// `UNKNOWN` sentinel when bounds are stored (spec §4.8).
    #[must_use]
    pub const fn n_outcomes(&self) -> u8 {
        self.n_outcomes
    }
}

/// A set of [`Evaluator`]s evaluated and updated together, summing their results (spec §4.7,
/// used to sum the contributions of several constraints sharing the same underlying inflation
/// event).
#[derive(Clone)]
pub struct EvaluatorSet<'a> {
    evaluators: Vec<Evaluator<'a>>,
}

impl<'a> EvaluatorSet<'a> {
    /// Builds an `EvaluatorSet` from already-constructed evaluators.
    #[must_use]
    pub fn new(evaluators: Vec<Evaluator<'a>>) -> Self {
        assert!(!evaluators.is_empty(), "an evaluator set needs at least one evaluator");
        Self { evaluators }
    }

    /// Sums [`Evaluator::evaluate_dual_vector`] over every evaluator.
    #[must_use]
    pub fn evaluate_dual_vector(&self) -> i64 {
        self.evaluators.iter().map(Evaluator::evaluate_dual_vector).sum()
    }

    /// Forwards to [`Evaluator::set_outcome`] on every evaluator.
    pub fn set_outcome(&mut self, inflation_party: usize, outcome: u8) {
        for evaluator in &mut self.evaluators {
            evaluator.set_outcome(inflation_party, outcome);
        }
    }

    /// The shared underlying inflation event (every evaluator tracks the same one).
    #[must_use]
    pub fn inflation_event(&self) -> &Event {
        self.evaluators[0].inflation_event()
    }

    /// The outcome alphabet size shared by every evaluator in the set.
    #[must_use]
    pub fn n_outcomes(&self) -> u8 {
        self.evaluators[0].n_outcomes()
    }
}

/// An inflation marginal over a set of inflation parties, with its reduced marginal permutations
/// and marginal symmetry group precomputed (spec §4.7).
pub struct Marginal {
    marginal_parties: Vec<usize>,
    store_bounds: bool,
    marginal_symmetries: Group,
    marginal_permutations: Vec<Permutation>,
}

impl Marginal {
    /// Builds a `Marginal` over `marginal_parties` (a set of inflation party indices, no
    /// duplicates) under the given constraint symmetry group.
    ///
    /// # Panics
    ///
    /// Panics if `marginal_parties` contains duplicates.
    #[must_use]
    pub fn new(inflation: &Inflation, marginal_parties: Vec<usize>, constraint_group: &Group, store_bounds: bool) -> Self {
        let distinct: BTreeSet<usize> = marginal_parties.iter().copied().collect();
        assert_eq!(distinct.len(), marginal_parties.len(), "a marginal cannot repeat a party");

        let marginal_symmetries = init_marginal_symmetries(&marginal_parties, constraint_group);
        let marginal_permutations = init_marginal_permutations(inflation, &marginal_parties, &marginal_symmetries);

        Self { marginal_parties, store_bounds, marginal_symmetries, marginal_permutations }
    }

    /// The inflation party indices this marginal is defined over.
    #[must_use]
    pub fn parties(&self) -> &[usize] {
        &self.marginal_parties
    }

    /// Number of parties in this marginal.
    #[must_use]
    pub fn n_parties(&self) -> usize {
        self.marginal_parties.len()
    }

    /// The number of reduced marginal permutations, or `1` for the trivial (empty) marginal.
    #[must_use]
    pub fn denom(&self) -> i64 {
        if self.marginal_parties.is_empty() {
            1
        } else {
            i64::try_from(self.marginal_permutations.len()).unwrap()
        }
    }

    /// The marginal symmetry group (the constraint group acting on marginal-party indices).
    #[must_use]
    pub const fn marginal_symmetries(&self) -> &Group {
        &self.marginal_symmetries
    }

    /// Whether dual vectors evaluated against this marginal store bound information (spec §4.8).
    #[must_use]
    pub const fn store_bounds(&self) -> bool {
        self.store_bounds
    }

    /// The reduced marginal permutations.
    #[must_use]
    pub fn permutations(&self) -> &[Permutation] {
        &self.marginal_permutations
    }

    /// Extracts the marginal event `extract(inflation_event, marg_perm) = sigma^-1 . inflation_event . pi`
    /// for a single marginal permutation.
    #[must_use]
    pub fn extract_marg_perm_event(&self, inflation_event: &[u8], marg_perm: &Permutation) -> Event {
        marg_perm
            .parties
            .iter()
            .map(|&inf_party| marg_perm.outcome_sym.apply_inverse(inflation_event[inf_party]))
            .collect()
    }

    /// Extracts the marginal event for every reduced marginal permutation.
    #[must_use]
    pub fn extract_marg_perm_events(&self, inflation_event: &[u8]) -> Vec<Event> {
        self.marginal_permutations
            .iter()
            .map(|marg_perm| self.extract_marg_perm_event(inflation_event, marg_perm))
            .collect()
    }

    /// Compiles an [`Evaluator`] for this marginal against an inflation of `n_inflation_parties`
    /// parties and `n_outcomes` (network) outcomes per party.
    #[must_use]
    pub fn evaluator<'a>(&self, n_inflation_parties: usize, n_outcomes: u8) -> Evaluator<'a> {
        let outcomes_per_party = if self.store_bounds { n_outcomes + 1 } else { n_outcomes };
        let weights = compute_weights(self.n_parties(), u64::from(outcomes_per_party));

        let mut party_to_update_rules: Vec<Vec<UpdateRule>> = vec![Vec::new(); n_inflation_parties];

        for (marg_perm_index, marg_perm) in self.marginal_permutations.iter().enumerate() {
            for (marginal_party, &inf_party) in marg_perm.parties.iter().enumerate() {
                let mut inverse_outcome_sym = marg_perm.outcome_sym.inverted();
                if self.store_bounds {
                    inverse_outcome_sym = inverse_outcome_sym.extend_with_fixed_point();
                }
                party_to_update_rules[inf_party].push(UpdateRule {
                    marg_perm_index,
                    inverse_outcome_sym,
                    party_weight: weights[marginal_party],
                });
            }
        }

        Evaluator::new(n_inflation_parties, self.n_parties(), outcomes_per_party, self.marginal_permutations.len(), party_to_update_rules)
    }
}

fn init_marginal_symmetries(marginal_parties: &[usize], constraint_group: &Group) -> Group {
    assert!(!constraint_group.is_empty(), "a constraint group cannot be empty");

    if marginal_parties.is_empty() {
        return Group::new();
    }

    let inf_to_marg: FxHashMap<usize, usize> =
        marginal_parties.iter().enumerate().map(|(marg_idx, &inf_idx)| (inf_idx, marg_idx)).collect();

    constraint_group
        .iter()
        .map(|inf_sym| {
            let marg_party_sym: Vec<usize> = (0..marginal_parties.len())
                .map(|marg_idx| inf_to_marg[&inf_sym.party().image()[marginal_parties[marg_idx]]])
                .collect();
            Symmetry::new(PartySym::new(marg_party_sym, true), inf_sym.outcome().clone())
        })
        .collect()
}

fn init_marginal_permutations(inflation: &Inflation, marginal_parties: &[usize], marginal_symmetries: &Group) -> Vec<Permutation> {
    if marginal_parties.is_empty() {
        return Vec::new();
    }

    let mut marg_perm_set: BTreeSet<Permutation> = BTreeSet::new();

    for inf_sym in inflation.inflation_symmetries() {
        let transformed_marg_parties = inf_sym.party().act_entrywise(marginal_parties);
        let marg_perm = Permutation { outcome_sym: inf_sym.outcome().clone(), parties: transformed_marg_parties.clone() };

        let is_representative = !marginal_symmetries.iter().any(|marg_sym| {
            let other_outcome_sym = marg_perm.outcome_sym.composition_after(&marg_sym.outcome().inverted());
            let other_marg_parties = marg_sym.party().act_on_list(&transformed_marg_parties);
            let other_marg_perm = Permutation { outcome_sym: other_outcome_sym, parties: other_marg_parties };
            other_marg_perm < marg_perm
        });

        if is_representative {
            marg_perm_set.insert(marg_perm);
        }
    }

    marg_perm_set.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
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

    #[test]
    fn empty_marginal_has_denom_one() {
        let distr = srb_distr(2);
        let inflation = Inflation::new(&distr, [1, 1, 1], UseDistrSymmetries::Yes);
        let marginal = Marginal::new(&inflation, Vec::new(), inflation.inflation_symmetries(), false);
        assert_eq!(marginal.denom(), 1);
        assert!(marginal.permutations().is_empty());
    }

    #[test]
    fn single_party_marginal_has_at_least_one_permutation() {
        let distr = srb_distr(2);
        let inflation = Inflation::new(&distr, [2, 1, 1], UseDistrSymmetries::Yes);
        let marginal = Marginal::new(&inflation, vec![0], inflation.inflation_symmetries(), false);
        assert!(!marginal.permutations().is_empty());
        assert_eq!(marginal.denom(), i64::try_from(marginal.permutations().len()).unwrap());
    }

    #[test]
    fn evaluator_tracks_outcome_assignments() {
        let distr = srb_distr(2);
        let inflation = Inflation::new(&distr, [1, 1, 1], UseDistrSymmetries::Yes);
        let marginal = Marginal::new(&inflation, vec![0], inflation.inflation_symmetries(), false);
        let mut evaluator = marginal.evaluator(inflation.n_parties(), inflation.network().n_outcomes());
        evaluator.set_outcome(0, 1);
        assert_eq!(evaluator.inflation_event()[0], 1);
    }
}
