//! The triangle network and a target distribution defined over it (spec §3, §4 item 4).

use crate::event::EventRange;
use crate::symmetry::{Group, OutcomeSym, PartySym, Symmetry};
use crate::tensor::EventTensor;
use itertools::Itertools;
use rustc_hash::FxHashMap;

/// The (fixed) triangle network: three parties A, B, C, each with `n_outcomes` outcomes.
///
/// Non-goal (spec §1): no support for networks other than the triangle.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Network {
    n_outcomes: u8,
}

/// The three party names of the triangle network, in index order.
pub const PARTY_NAMES: [char; 3] = ['A', 'B', 'C'];

impl Network {
    /// Constructs the triangle network with `n_outcomes` outcomes per party.
    ///
    /// # Panics
    ///
    /// Panics if `n_outcomes == 0`.
    #[must_use]
    pub fn new(n_outcomes: u8) -> Self {
        assert!(n_outcomes > 0, "a network needs at least one outcome per party");
        Self { n_outcomes }
    }

    /// Number of outcomes per party.
    #[must_use]
    pub const fn n_outcomes(&self) -> u8 {
        self.n_outcomes
    }

    /// Number of parties: always 3 for the triangle network.
    #[must_use]
    pub const fn n_parties(&self) -> usize {
        3
    }

    /// The six party permutations of `{A, B, C}`, each carrying its parity.
    #[must_use]
    pub fn party_permutations() -> Vec<PartySym> {
        vec![
            PartySym::new(vec![0, 1, 2], true),  // identity
            PartySym::new(vec![1, 0, 2], false), // swap A, B
            PartySym::new(vec![0, 2, 1], false), // swap B, C
            PartySym::new(vec![2, 1, 0], false), // swap A, C
            PartySym::new(vec![1, 2, 0], true),  // 3-cycle A->B->C->A
            PartySym::new(vec![2, 0, 1], true),  // 3-cycle A->C->B->A
        ]
    }

    /// All `n!` outcome permutations.
    #[must_use]
    pub fn outcome_permutations(&self) -> Vec<OutcomeSym> {
        (0..self.n_outcomes)
            .permutations(usize::from(self.n_outcomes))
            .map(OutcomeSym::new)
            .collect()
    }

    /// The full symmetry group: `6 * n!` elements (spec §3).
    #[must_use]
    pub fn full_symmetry_group(&self) -> Group {
        let parties = Self::party_permutations();
        let outcomes = self.outcome_permutations();
        parties
            .into_iter()
            .cartesian_product(outcomes)
            .map(|(p, o)| Symmetry::new(p, o))
            .collect()
    }

    /// The trivial group: just the identity.
    #[must_use]
    pub fn trivial_symmetry_group(&self) -> Group {
        [Symmetry::identity(3, usize::from(self.n_outcomes))]
            .into_iter()
            .collect()
    }
}

/// A probability distribution over the triangle network, plus its symmetry group (spec §3).
pub struct TargetDistr {
    network: Network,
    tensor: EventTensor,
    symmetry_group: Group,
    short_name: String,
    marginal_cache: FxHashMap<Vec<usize>, EventTensor>,
}

impl TargetDistr {
    /// Constructs a target distribution from its event tensor, computing its symmetry group (the
    /// subgroup of the full group that leaves the tensor's numerators invariant) once.
    ///
    /// # Panics
    ///
    /// Panics if `tensor` is not a valid probability distribution, or its shape doesn't match
    /// `network`.
    #[must_use]
    pub fn new(network: Network, tensor: EventTensor, short_name: impl Into<String>) -> Self {
        assert_eq!(tensor.k(), network.n_parties());
        assert_eq!(tensor.base(), u64::from(network.n_outcomes()));
        assert!(tensor.is_probability_distribution());

        let symmetry_group = network
            .full_symmetry_group()
            .into_iter()
            .filter(|sigma| is_invariant_under(&tensor, sigma))
            .collect();

        Self {
            network,
            tensor,
            symmetry_group,
            short_name: short_name.into(),
            marginal_cache: FxHashMap::default(),
        }
    }

    /// The underlying network.
    #[must_use]
    pub const fn network(&self) -> &Network {
        &self.network
    }

    /// The distribution's event tensor.
    #[must_use]
    pub const fn tensor(&self) -> &EventTensor {
        &self.tensor
    }

    /// The subgroup of the full network symmetry group that leaves this distribution invariant.
    #[must_use]
    pub const fn symmetry_group(&self) -> &Group {
        &self.symmetry_group
    }

    /// A short, filename-safe identifier for this distribution (used in symtree cache filenames).
    #[must_use]
    pub fn short_name(&self) -> &str {
        &self.short_name
    }

    /// The marginal of this distribution over the ordered party subset `parties`, simplified to
    /// lowest terms and cached for subsequent calls.
    pub fn marginal(&mut self, parties: &[usize]) -> &EventTensor {
        if !self.marginal_cache.contains_key(parties) {
            let marginal = compute_marginal(&self.tensor, parties);
            self.marginal_cache.insert(parties.to_vec(), marginal);
        }
        &self.marginal_cache[parties]
    }
}

fn is_invariant_under(tensor: &EventTensor, sigma: &Symmetry) -> bool {
    let base = u8::try_from(tensor.base()).unwrap();
    EventRange::new(tensor.k(), base).all(|event| {
        let image = sigma.apply_to_event(&event);
        tensor.get(&image) == tensor.get(&event)
    })
}

/// Sums `tensor` over every party not in `parties`, keeping the order given by `parties`
/// (spec §3 `TargetDistr`, "marginal computation").
fn compute_marginal(tensor: &EventTensor, parties: &[usize]) -> EventTensor {
    let base = u8::try_from(tensor.base()).unwrap();
    let mut marginal = EventTensor::zeros(parties.len(), tensor.base());
    marginal.set_denominator(tensor.denominator());

    for event in EventRange::new(tensor.k(), base) {
        let sub_event: Vec<u8> = parties.iter().map(|&p| event[p]).collect();
        let current = marginal.get(&sub_event);
        marginal.set(&sub_event, current + tensor.get(&event));
    }

    marginal.simplify();
    marginal
}

#[cfg(test)]
mod tests {
    use super::*;

    fn srb_tensor(n: u8, denom: i64) -> EventTensor {
        // a simple shared-random-bit-like distribution: p(a,a,a) = 1/n, zero elsewhere
        let mut t = EventTensor::zeros(3, u64::from(n));
        t.set_denominator(denom);
        for a in 0..n {
            t.set(&[a, a, a], denom / i64::from(n));
        }
        t
    }

    #[test]
    fn full_group_has_expected_cardinality() {
        let network = Network::new(2);
        assert_eq!(network.full_symmetry_group().len(), 6 * 2);
    }

    #[test]
    fn srb_distribution_keeps_full_party_and_outcome_symmetry() {
        let network = Network::new(2);
        let tensor = srb_tensor(2, 2);
        let distr = TargetDistr::new(network, tensor, "srb");
        // every party permutation and outcome permutation fixes p(a,a,a)
        assert_eq!(distr.symmetry_group().len(), network.full_symmetry_group().len());
    }

    #[test]
    fn marginal_sums_out_unselected_parties() {
        let network = Network::new(2);
        let tensor = srb_tensor(2, 2);
        let mut distr = TargetDistr::new(network, tensor, "srb");
        let marg = distr.marginal(&[0, 1]);
        assert_eq!(marg.get(&[0, 0]), marg.denominator() / 2);
        assert_eq!(marg.get(&[1, 1]), marg.denominator() / 2);
        assert_eq!(marg.get(&[0, 1]), 0);
    }
}
