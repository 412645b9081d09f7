//! A dual vector `F` over a marginal's reduced event orbits, stored as coefficients of a
//! "quotiented vector" (quovec) and embedded into an [`EventTensor`] (spec §4.8).
//!
//! When a dual vector needs to support the branch-and-bound tree search (spec §4.11), it also
//! stores *bounds*: the alphabet is extended with one extra `UNKNOWN` outcome, and every
//! partially-filled event's orbit is assigned the min (lower bound) or max (upper bound) of the
//! coefficients reachable by filling in its first unknown position.

use crate::error::{Error, Result};
use crate::event::{hash_event, Event};
use crate::marginal::Marginal;
use crate::orbit::{compute_orbits, OrbitPartition};
use crate::symmetry::{Group, Symmetry};
use crate::tensor::EventTensor;
use std::collections::BTreeSet;

/// Whether a [`DualVector`] computes lower or upper bounds on partially-filled events. The
/// left-hand side of a constraint (positive scale) needs lower bounds; the right-hand side
/// (negative scale) needs upper bounds, so that both always underestimate the true minimum of
/// the overall inner product during tree search (spec §4.8, §4.11).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum BoundType {
    /// The dual vector computes lower bounds.
    Lower,
    /// The dual vector computes upper bounds.
    Upper,
}

/// A quotiented-vector coefficient: one value per orbit of the marginal's event space under its
/// constraint symmetry group.
pub type Quovec = Vec<i64>;

/// A dual vector `F` embedded from a [`Quovec`], with orbit bookkeeping and (optionally) bound
/// rules for partially-filled events (spec §4.8).
pub struct DualVector {
    n_parties: usize,
    store_bounds: bool,
    bound_type: BoundType,
    tensor: EventTensor,
    n_orbits_no_unknown: usize,
    orbit_repr_no_unknown: Vec<Event>,
    quovec_index_to_orbit: Vec<Vec<u64>>,
    event_to_quovec_index: Vec<usize>,
    bound_rules: Vec<(usize, Vec<usize>)>,
}

impl DualVector {
    /// Builds a `DualVector` over `marginal`'s parties, computing its orbit partition (under
    /// `marginal`'s constraint symmetry group, extended with a fixed unknown point if
    /// `marginal.store_bounds()`) and, if applicable, its bound rules.
    #[must_use]
    pub fn new(marginal: &Marginal, bound_type: BoundType, n_outcomes: u8) -> Self {
        let n_parties = marginal.n_parties();
        let store_bounds = marginal.store_bounds();
        let outcomes_per_party = if store_bounds { n_outcomes + 1 } else { n_outcomes };
        let tensor = EventTensor::zeros(n_parties, u64::from(outcomes_per_party));

        if n_parties == 0 {
            return Self {
                n_parties,
                store_bounds,
                bound_type,
                tensor,
                n_orbits_no_unknown: 0,
                orbit_repr_no_unknown: Vec::new(),
                quovec_index_to_orbit: Vec::new(),
                event_to_quovec_index: Vec::new(),
                bound_rules: Vec::new(),
            };
        }

        let group_for_orbits = orbit_group(marginal, store_bounds);
        let partition = compute_orbits(&group_for_orbits, n_parties, outcomes_per_party);

        let (n_orbits_no_unknown, orbit_repr_no_unknown, quovec_index_to_orbit, event_to_quovec_index) =
            split_orbits_by_unknown(&partition, n_outcomes, tensor.numerators().len());

        let mut dual_vector = Self {
            n_parties,
            store_bounds,
            bound_type,
            tensor,
            n_orbits_no_unknown,
            orbit_repr_no_unknown,
            quovec_index_to_orbit,
            event_to_quovec_index,
            bound_rules: Vec::new(),
        };
        dual_vector.init_bound_rules(&partition, n_outcomes);
        dual_vector
    }

    /// The embedded dual vector, as an [`EventTensor`] over the marginal's parties.
    #[must_use]
    pub const fn tensor(&self) -> &EventTensor {
        &self.tensor
    }

    /// Maps an event hash to its quovec (orbit) index.
    #[must_use]
    pub fn event_to_quovec_index(&self) -> &[usize] {
        &self.event_to_quovec_index
    }

    /// Total number of orbits, including those containing an unknown outcome.
    #[must_use]
    pub fn n_orbits_with_unknown(&self) -> usize {
        self.quovec_index_to_orbit.len()
    }

    /// Number of orbits with no unknown outcome.
    #[must_use]
    pub const fn n_orbits_no_unknown(&self) -> usize {
        self.n_orbits_no_unknown
    }

    /// Orbit representatives with no unknown outcome.
    #[must_use]
    pub fn orbit_repr_no_unknown(&self) -> &[Event] {
        &self.orbit_repr_no_unknown
    }

    /// This dual vector's current coefficients, one per no-unknown orbit, in the same order
    /// [`Self::set_from_quovec`] reads them back in (spec §6, for certificate serialization).
    #[must_use]
    pub fn quovec(&self) -> Quovec {
        if self.n_parties == 0 {
            return vec![self.tensor.get(&[])];
        }
        self.orbit_repr_no_unknown.iter().map(|repr| self.tensor.get(repr)).collect()
    }

    /// Sets this dual vector's coefficients (and, if applicable, its bounds) from `quovec`,
    /// reading starting at `start_pos` (used when several constraints' quovecs are packed into
    /// one flat list, spec §4.10).
    ///
    /// # Panics
    ///
    /// Panics if `quovec` doesn't have enough remaining entries, or (for a scalar dual vector)
    /// if `start_pos != 0` or `quovec.len() != 1`.
    pub fn set_from_quovec(&mut self, quovec: &[i64], start_pos: usize) {
        if self.n_parties == 0 {
            assert_eq!(start_pos, 0);
            assert_eq!(quovec.len(), 1);
            self.tensor.set_by_hash(0, quovec[0]);
            return;
        }

        assert!(quovec.len() - start_pos >= self.n_orbits_no_unknown);

        for quovec_index in 0..self.n_orbits_no_unknown {
            self.set_orbit_coeff(quovec_index, quovec[start_pos + quovec_index]);
        }

        if !self.store_bounds {
            return;
        }

        let mut quovec_with_unknown = vec![0i64; self.n_orbits_with_unknown()];
        quovec_with_unknown[..self.n_orbits_no_unknown]
            .copy_from_slice(&quovec[start_pos..start_pos + self.n_orbits_no_unknown]);

        for (to_update, feasible) in &self.bound_rules {
            let mut bound = quovec_with_unknown[feasible[0]];
            for &idx in &feasible[1..] {
                bound = self.min_or_max(bound, quovec_with_unknown[idx]);
            }
            quovec_with_unknown[*to_update] = bound;
            self.set_orbit_coeff(*to_update, bound);
        }
    }

    /// Checks that every no-unknown orbit coefficient stays strictly within `(-bound, bound)`
    /// (spec §4.10's overflow safety margin).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Overflow`] if any coefficient reaches `bound` in absolute value.
    pub fn hard_assert_within_bound(&self, bound: i64) -> Result<()> {
        for repr in &self.orbit_repr_no_unknown {
            let component = self.tensor.get(repr);
            if component >= bound || component <= -bound {
                return Err(Error::Overflow { value: component, bound });
            }
        }
        Ok(())
    }

    fn min_or_max(&self, a: i64, b: i64) -> i64 {
        match self.bound_type {
            BoundType::Upper => a.max(b),
            BoundType::Lower => a.min(b),
        }
    }

    fn set_orbit_coeff(&mut self, quovec_index: usize, coeff: i64) {
        for &hash in self.quovec_index_to_orbit[quovec_index].clone().iter() {
            self.tensor.set_by_hash(hash, coeff);
        }
    }

    fn init_bound_rules(&mut self, partition: &OrbitPartition, n_outcomes: u8) {
        if !self.store_bounds {
            return;
        }

        let base = self.tensor.base();
        for repr in &partition.representatives {
            let Some(pos) = repr.iter().position(|&o| o == n_outcomes) else {
                continue;
            };

            let to_update = self.event_to_quovec_index[usize::try_from(hash_event(repr, base)).unwrap()];

            let mut other_event = repr.clone();
            let mut feasible_set: BTreeSet<usize> = BTreeSet::new();
            for outcome in 0..n_outcomes {
                other_event[pos] = outcome;
                feasible_set.insert(self.event_to_quovec_index[usize::try_from(hash_event(&other_event, base)).unwrap()]);
            }

            self.bound_rules.push((to_update, feasible_set.into_iter().collect()));
        }
    }
}

fn orbit_group(marginal: &Marginal, store_bounds: bool) -> Group {
    if !store_bounds {
        return marginal.marginal_symmetries().clone();
    }
    marginal
        .marginal_symmetries()
        .iter()
        .map(|sym| Symmetry::new(sym.party().clone(), sym.outcome().extend_with_fixed_point()))
        .collect()
}

/// Splits `partition`'s orbits into two index ranges — no-unknown first, then with-unknown — and
/// builds the event-hash -> quovec-index lookup table (spec §4.8 "Orbits").
#[allow(clippy::type_complexity)]
fn split_orbits_by_unknown(
    partition: &OrbitPartition,
    n_outcomes: u8,
    n_events: usize,
) -> (usize, Vec<Event>, Vec<Vec<u64>>, Vec<usize>) {
    let mut quovec_index_to_orbit: Vec<Vec<u64>> = Vec::with_capacity(partition.len());
    let mut event_to_quovec_index = vec![0usize; n_events];
    let mut orbit_repr_no_unknown = Vec::new();

    for (orbit_idx, repr) in partition.representatives.iter().enumerate() {
        if repr.contains(&n_outcomes) {
            continue;
        }
        let new_index = quovec_index_to_orbit.len();
        for &hash in &partition.members[orbit_idx] {
            event_to_quovec_index[usize::try_from(hash).unwrap()] = new_index;
        }
        quovec_index_to_orbit.push(partition.members[orbit_idx].clone());
        orbit_repr_no_unknown.push(repr.clone());
    }
    let n_orbits_no_unknown = quovec_index_to_orbit.len();

    for (orbit_idx, repr) in partition.representatives.iter().enumerate() {
        if !repr.contains(&n_outcomes) {
            continue;
        }
        let new_index = quovec_index_to_orbit.len();
        for &hash in &partition.members[orbit_idx] {
            event_to_quovec_index[usize::try_from(hash).unwrap()] = new_index;
        }
        quovec_index_to_orbit.push(partition.members[orbit_idx].clone());
    }

    (n_orbits_no_unknown, orbit_repr_no_unknown, quovec_index_to_orbit, event_to_quovec_index)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inflation::{Inflation, UseDistrSymmetries};
    use crate::network::{Network, TargetDistr};
    use crate::tensor::EventTensor as Tensor;

    fn srb_distr(n: u8) -> TargetDistr {
        let network = Network::new(n);
        let mut tensor = Tensor::zeros(3, u64::from(n));
        tensor.set_denominator(i64::from(n));
        for a in 0..n {
            tensor.set(&[a, a, a], 1);
        }
        TargetDistr::new(network, tensor, "srb")
    }

    #[test]
    fn scalar_marginal_round_trips() {
        let distr = srb_distr(2);
        let inflation = Inflation::new(&distr, [1, 1, 1], UseDistrSymmetries::Yes);
        let marginal = Marginal::new(&inflation, Vec::new(), inflation.inflation_symmetries(), false);
        let mut dual_vector = DualVector::new(&marginal, BoundType::Lower, 2);
        dual_vector.set_from_quovec(&[7], 0);
        assert_eq!(dual_vector.tensor().get(&[]), 7);
    }

    #[test]
    fn no_bounds_quovec_sets_every_orbit() {
        let distr = srb_distr(2);
        let inflation = Inflation::new(&distr, [1, 1, 1], UseDistrSymmetries::Yes);
        let marginal = Marginal::new(&inflation, vec![0], inflation.inflation_symmetries(), false);
        let mut dual_vector = DualVector::new(&marginal, BoundType::Lower, 2);
        let quovec = vec![0i64; dual_vector.n_orbits_no_unknown()];
        dual_vector.set_from_quovec(&quovec, 0);
        assert_eq!(dual_vector.n_orbits_with_unknown(), dual_vector.n_orbits_no_unknown());
    }

    #[test]
    fn bounds_extend_orbit_count_and_compute_min_max() {
        let distr = srb_distr(2);
        let inflation = Inflation::new(&distr, [1, 1, 1], UseDistrSymmetries::Yes);
        let marginal = Marginal::new(&inflation, vec![0], inflation.inflation_symmetries(), true);
        let dual_vector = DualVector::new(&marginal, BoundType::Lower, 2);
        assert!(dual_vector.n_orbits_with_unknown() > dual_vector.n_orbits_no_unknown());
    }

    #[test]
    fn overflow_bound_is_enforced() {
        let distr = srb_distr(2);
        let inflation = Inflation::new(&distr, [1, 1, 1], UseDistrSymmetries::Yes);
        let marginal = Marginal::new(&inflation, vec![0], inflation.inflation_symmetries(), false);
        let mut dual_vector = DualVector::new(&marginal, BoundType::Lower, 2);
        let quovec = vec![100i64; dual_vector.n_orbits_no_unknown()];
        dual_vector.set_from_quovec(&quovec, 0);
        assert!(dual_vector.hard_assert_within_bound(50).is_err());
    }
}
