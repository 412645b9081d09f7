//! Party and outcome permutations, and the combined [`Symmetry`] they form (spec §3, §4.3).

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeSet;

/// The image of a permutation on party indices, i.e. `sym[i]` is the image of party `i`.
pub type PartyIndex = usize;

/// A bijection on `{0..k-1}` together with a parity bit, used both as a network automorphism and
/// (lifted) as an inflation party symmetry (spec §3 `PartySym`).
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct PartySym {
    sym: Vec<PartyIndex>,
    inverse: Vec<PartyIndex>,
    even: bool,
}

impl PartySym {
    /// Constructs a `PartySym` from the image `sym` of the permutation, with parity `even`.
    #[must_use]
    pub fn new(sym: Vec<PartyIndex>, even: bool) -> Self {
        let mut inverse = vec![0; sym.len()];
        for (i, &s) in sym.iter().enumerate() {
            inverse[s] = i;
        }
        Self { sym, inverse, even }
    }

    /// The identity permutation on `n` parties.
    #[must_use]
    pub fn identity(n: usize) -> Self {
        Self::new((0..n).collect(), true)
    }

    /// Number of parties this permutation acts on.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sym.len()
    }

    /// Whether this permutation acts on zero parties.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sym.is_empty()
    }

    /// `true` if the permutation has even parity (signature one).
    #[must_use]
    pub const fn is_even(&self) -> bool {
        self.even
    }

    /// The image `(sigma(0), sigma(1), ...)`.
    #[must_use]
    pub fn image(&self) -> &[PartyIndex] {
        &self.sym
    }

    /// The image of the inverse permutation.
    #[must_use]
    pub fn inverse_image(&self) -> &[PartyIndex] {
        &self.inverse
    }

    /// Applies the permutation entrywise on a list of party indices.
    #[must_use]
    pub fn act_entrywise(&self, input: &[PartyIndex]) -> Vec<PartyIndex> {
        input.iter().map(|&i| self.sym[i]).collect()
    }

    /// Acts on `input`, viewed as a function `{0..k-1} -> T`, the way [`Symmetry::act_on_event`]
    /// acts on events: `output[i] = input[sigma^-1(i)]`.
    #[must_use]
    pub fn act_on_list<T: Clone>(&self, input: &[T]) -> Vec<T> {
        self.inverse.iter().map(|&j| input[j].clone()).collect()
    }

    /// Returns `sigma ∘ other`, i.e. `self` applied after `other`.
    #[must_use]
    pub fn composition_after(&self, other: &Self) -> Self {
        let sym = other.sym.iter().map(|&i| self.sym[i]).collect();
        Self::new(sym, self.even == other.even)
    }
}

impl Ord for PartySym {
    fn cmp(&self, other: &Self) -> Ordering {
        self.sym.cmp(&other.sym)
    }
}

impl PartialOrd for PartySym {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// A bijection on `{0..n-1}` (spec §3 `OutcomeSym`).
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct OutcomeSym {
    sym: Vec<u8>,
    inverse: Vec<u8>,
}

impl OutcomeSym {
    /// Constructs an `OutcomeSym` from the image `sym` of the permutation.
    #[must_use]
    pub fn new(sym: Vec<u8>) -> Self {
        let mut inverse = vec![0; sym.len()];
        for (i, &s) in sym.iter().enumerate() {
            inverse[usize::from(s)] = u8::try_from(i).unwrap();
        }
        Self { sym, inverse }
    }

    /// The identity permutation on `n` outcomes.
    #[must_use]
    pub fn identity(n: usize) -> Self {
        Self::new((0..n).map(|i| u8::try_from(i).unwrap()).collect())
    }

    /// Number of outcomes this permutation acts on.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sym.len()
    }

    /// Whether this permutation acts on zero outcomes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sym.is_empty()
    }

    /// The image `(sigma(0), ..., sigma(n-1))`.
    #[must_use]
    pub fn image(&self) -> &[u8] {
        &self.sym
    }

    /// The image of the inverse permutation.
    #[must_use]
    pub fn inverse_image(&self) -> &[u8] {
        &self.inverse
    }

    /// Applies the permutation to a single outcome.
    #[must_use]
    pub fn apply(&self, outcome: u8) -> u8 {
        self.sym[usize::from(outcome)]
    }

    /// Applies the inverse permutation to a single outcome.
    #[must_use]
    pub fn apply_inverse(&self, outcome: u8) -> u8 {
        self.inverse[usize::from(outcome)]
    }

    /// `true` if this is the identity permutation.
    #[must_use]
    pub fn is_trivial(&self) -> bool {
        self.sym.iter().enumerate().all(|(i, &s)| usize::from(s) == i)
    }

    /// Returns `sigma ∘ other`, i.e. `self` applied after `other`.
    #[must_use]
    pub fn composition_after(&self, other: &Self) -> Self {
        Self::new(other.sym.iter().map(|&o| self.apply(o)).collect())
    }

    /// Returns the inverse permutation.
    #[must_use]
    pub fn inverted(&self) -> Self {
        Self::new(self.inverse.clone())
    }

    /// Returns a copy of this symmetry extended by one extra fixed point (`n -> n`), used when
    /// lifting a plain outcome symmetry into the bound-aware `UNKNOWN`-extended alphabet
    /// (spec §4.8).
    #[must_use]
    pub fn extend_with_fixed_point(&self) -> Self {
        let n = u8::try_from(self.sym.len()).unwrap();
        let mut sym = self.sym.clone();
        sym.push(n);
        Self::new(sym)
    }
}

impl Ord for OutcomeSym {
    fn cmp(&self, other: &Self) -> Ordering {
        self.sym.cmp(&other.sym)
    }
}

impl PartialOrd for OutcomeSym {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// A combined party and outcome permutation acting on events (spec §3, §4.3).
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Symmetry {
    party: PartySym,
    outcome: OutcomeSym,
}

impl Symmetry {
    /// Constructs a `Symmetry` from a party and an outcome permutation.
    #[must_use]
    pub fn new(party: PartySym, outcome: OutcomeSym) -> Self {
        Self { party, outcome }
    }

    /// The identity symmetry on `n_parties` parties and `n_outcomes` outcomes.
    #[must_use]
    pub fn identity(n_parties: usize, n_outcomes: usize) -> Self {
        Self::new(PartySym::identity(n_parties), OutcomeSym::identity(n_outcomes))
    }

    /// The underlying party permutation.
    #[must_use]
    pub const fn party(&self) -> &PartySym {
        &self.party
    }

    /// The underlying outcome permutation.
    #[must_use]
    pub const fn outcome(&self) -> &OutcomeSym {
        &self.outcome
    }

    /// Acts on `event`, writing `output[i] = outcome(event[party^-1(i)])` (spec §3).
    pub fn act_on_event(&self, event: &[u8], output: &mut [u8]) {
        let inv = self.party.inverse_image();
        for i in 0..output.len() {
            output[i] = self.outcome.apply(event[inv[i]]);
        }
    }

    /// Convenience wrapper around [`Self::act_on_event`] that allocates the output.
    #[must_use]
    pub fn apply_to_event(&self, event: &[u8]) -> Vec<u8> {
        let mut out = vec![0; event.len()];
        self.act_on_event(event, &mut out);
        out
    }

    /// Returns `self ∘ other`, i.e. `self` applied after `other`.
    #[must_use]
    pub fn composition_after(&self, other: &Self) -> Self {
        Self::new(
            self.party.composition_after(&other.party),
            self.outcome.composition_after(&other.outcome),
        )
    }
}

impl Ord for Symmetry {
    fn cmp(&self, other: &Self) -> Ordering {
        // spec §3: lexicographic on (OutcomeSym, PartySym) images.
        self.outcome
            .cmp(&other.outcome)
            .then_with(|| self.party.cmp(&other.party))
    }
}

impl PartialOrd for Symmetry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// A symmetry group, stored as an ordered set of [`Symmetry`] (spec §4.3).
pub type Group = BTreeSet<Symmetry>;

/// Checks closure of `group` under composition (spec §8 property 1); `debug_assert!`-friendly,
/// quadratic in `|group|`, intended for tests only.
#[must_use]
pub fn is_closed_under_composition(group: &Group) -> bool {
    group
        .iter()
        .all(|sigma| group.iter().all(|tau| group.contains(&sigma.composition_after(tau))))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn swap_party_sym() -> PartySym {
        PartySym::new(vec![1, 0], false)
    }

    #[test]
    fn party_sym_composition_is_identity() {
        let swap = swap_party_sym();
        let id = swap.composition_after(&swap);
        assert_eq!(id.image(), &[0, 1]);
        assert!(id.is_even());
    }

    #[test]
    fn outcome_sym_inverse_round_trips() {
        let sym = OutcomeSym::new(vec![2, 0, 1]);
        let inv = sym.inverted();
        for o in 0..3u8 {
            assert_eq!(inv.apply(sym.apply(o)), o);
        }
    }

    #[test]
    fn symmetry_action_matches_definition() {
        let party = swap_party_sym();
        let outcome = OutcomeSym::new(vec![1, 0]);
        let sigma = Symmetry::new(party, outcome);
        let event = [0u8, 1u8];
        let out = sigma.apply_to_event(&event);
        // output[i] = outcome(event[party^-1(i)]); party is its own inverse here.
        assert_eq!(out[0], sigma.outcome().apply(event[1]));
        assert_eq!(out[1], sigma.outcome().apply(event[0]));
    }

    #[test]
    fn composition_matches_sequential_action() {
        let sigma = Symmetry::new(swap_party_sym(), OutcomeSym::new(vec![1, 0]));
        let tau = Symmetry::new(PartySym::identity(2), OutcomeSym::new(vec![0, 1]));
        let event = [0u8, 1u8];

        let composed = sigma.composition_after(&tau).apply_to_event(&event);
        let sequential = sigma.apply_to_event(&tau.apply_to_event(&event));
        assert_eq!(composed, sequential);
    }

    #[test]
    fn group_generated_by_swap_is_closed() {
        let mut group = Group::new();
        group.insert(Symmetry::identity(2, 2));
        group.insert(Symmetry::new(swap_party_sym(), OutcomeSym::identity(2)));
        assert!(is_closed_under_composition(&group));
    }
}
