//! A single inflation constraint `q_{marg_0...marg_{k-1},marg_rhs} = p_{marg_0}...p_{marg_{k-1}}
//! . q_{marg_rhs}`, and the machinery to evaluate its contribution to a quovec on a deterministic
//! inflation event (spec §4.9).

use crate::constraint_parser::ParsedConstraint;
use crate::dual_vector::{BoundType, DualVector};
use crate::error::Result;
use crate::event::{hash_event, Event, EventRange};
use crate::inflation::Inflation;
use crate::marginal::{Evaluator, Marginal};
use crate::network::TargetDistr;
use crate::symmetry::Group;
use std::collections::BTreeSet;

/// A single inflation constraint, compiled from a human-readable description (spec §4.6, §4.9).
pub struct Constraint {
    pretty_description: String,
    lhs_inflation_marginal: Marginal,
    rhs_inflation_marginal: Marginal,
    target_distribution_fixed: bool,
    target_marginal_names: Vec<Vec<usize>>,
    rhs_target_tensor: crate::tensor::EventTensor,
    lhs_dual_vector: DualVector,
    rhs_reduced_dual_vector: DualVector,
    lhs_scale: i64,
    rhs_scale: i64,
}

impl Constraint {
    /// Parses `description` against `inflation` and builds the constraint, failing if the
    /// description is malformed or refers to parties that aren't d-separated / injectable
    /// (spec §4.6).
    pub fn new(inflation: &Inflation, description: &[String], store_bounds: bool) -> Result<Self> {
        let parsed = ParsedConstraint::parse(inflation, description).map_err(anyhow::Error::from)?;

        let constraint_group = constraint_group(inflation, parsed.lhs_marg_parties(), parsed.rhs_marg_parties());

        let lhs_inflation_marginal =
            Marginal::new(inflation, parsed.lhs_marg_parties().to_vec(), &constraint_group, store_bounds);
        let rhs_inflation_marginal =
            Marginal::new(inflation, parsed.rhs_marg_parties().to_vec(), &constraint_group, store_bounds);

        let n_outcomes = inflation.network().n_outcomes();
        let rhs_target_k = parsed.lhs_marg_parties().len() - parsed.rhs_marg_parties().len();
        let rhs_target_tensor = crate::tensor::EventTensor::zeros(rhs_target_k, u64::from(n_outcomes));

        let lhs_dual_vector = DualVector::new(&lhs_inflation_marginal, BoundType::Lower, n_outcomes);
        let rhs_reduced_dual_vector = DualVector::new(&rhs_inflation_marginal, BoundType::Upper, n_outcomes);

        Ok(Self {
            pretty_description: pretty_description(description),
            lhs_inflation_marginal,
            rhs_inflation_marginal,
            target_distribution_fixed: false,
            target_marginal_names: parsed.target_marg_names().to_vec(),
            rhs_target_tensor,
            lhs_dual_vector,
            rhs_reduced_dual_vector,
            lhs_scale: 1,
            rhs_scale: 1,
        })
    }

    /// The constraint's human-readable description, e.g. `q(A00,B00,C00) = p(A00,B00,C00) * q()`.
    #[must_use]
    pub fn pretty_description(&self) -> &str {
        &self.pretty_description
    }

    /// The underlying left-hand-side [`DualVector`].
    #[must_use]
    pub const fn dual_vector(&self) -> &DualVector {
        &self.lhs_dual_vector
    }

    /// The number of entries in this constraint's quovec (excluding bound orbits).
    #[must_use]
    pub fn quovec_size(&self) -> usize {
        self.lhs_dual_vector.n_orbits_no_unknown()
    }

    /// The left-hand-side denominator `|RedPermutedMargs(marg_0...marg_{k-1},marg_rhs)|`.
    #[must_use]
    pub fn lhs_denom(&self) -> i64 {
        self.lhs_inflation_marginal.denom()
    }

    /// Sets the left-hand-side scale factor.
    ///
    /// # Panics
    ///
    /// Panics if `scale` isn't strictly positive.
    pub fn set_lhs_scale(&mut self, scale: i64) {
        assert!(scale > 0, "lhs scale must be strictly positive");
        self.lhs_scale = scale;
    }

    /// The right-hand-side denominator `denom(p) * |RedPermutedMargs(marg_rhs)|`.
    #[must_use]
    pub fn rhs_denom(&self) -> i64 {
        self.rhs_target_tensor.denominator() * self.rhs_inflation_marginal.denom()
    }

    /// Sets the right-hand-side scale factor. The sign is flipped internally: the right-hand side
    /// of the constraint is subtracted from the left-hand side.
    ///
    /// # Panics
    ///
    /// Panics if `scale` isn't strictly positive.
    pub fn set_rhs_scale(&mut self, scale: i64) {
        assert!(scale > 0, "rhs scale must be strictly positive");
        self.rhs_scale = -scale;
    }

    /// Updates the target distribution: recomputes `p_{marg_0}...p_{marg_{k-1}}` and the reduced
    /// right-hand-side dual vector.
    ///
    /// # Panics
    ///
    /// Panics if `distr`'s symmetries aren't compatible with the inflation this constraint was
    /// built from (checked by the caller via [`Inflation::has_symmetries_compatible_with`]).
    pub fn set_target_distribution(&mut self, distr: &mut TargetDistr) {
        self.target_distribution_fixed = true;

        let target_marginals: Vec<crate::tensor::EventTensor> =
            self.target_marginal_names.iter().map(|names| distr.marginal(names).clone()).collect();

        self.rhs_target_tensor = crate::tensor::EventTensor::tensor_product(&target_marginals);

        self.update_rhs_reduced_dual_vector();
    }

    /// Sets the left-hand-side dual vector from `coeffs`, reading starting at `start_pos`, and
    /// updates the reduced right-hand-side dual vector accordingly.
    pub fn set_dual_vector_from_quovec(&mut self, coeffs: &[i64], start_pos: usize) {
        self.lhs_dual_vector.set_from_quovec(coeffs, start_pos);
        self.update_rhs_reduced_dual_vector();
    }

    /// Builds the evaluator pair `(lhs, rhs)` wired up to this constraint's dual vectors and
    /// scales, ready to be fed outcome assignments during the tree search (spec §4.11).
    #[must_use]
    pub fn marg_evaluators<'a>(&'a self, n_inflation_parties: usize, n_outcomes: u8) -> (Evaluator<'a>, Evaluator<'a>) {
        let mut lhs_eval = self.lhs_inflation_marginal.evaluator(n_inflation_parties, n_outcomes);
        lhs_eval.set_dual_vector_reference(self.lhs_dual_vector.tensor());
        lhs_eval.set_scale_reference(&self.lhs_scale);

        let mut rhs_eval = self.rhs_inflation_marginal.evaluator(n_inflation_parties, n_outcomes);
        rhs_eval.set_dual_vector_reference(self.rhs_reduced_dual_vector.tensor());
        rhs_eval.set_scale_reference(&self.rhs_scale);

        (lhs_eval, rhs_eval)
    }

    /// Adds this constraint's contribution to `ret[offset..offset + quovec_size()]` for the
    /// deterministic inflation distribution supported on `inflation_event` (spec §4.9).
    ///
    /// # Panics
    ///
    /// Panics if the target distribution hasn't been set, if `inflation_event`'s length is wrong,
    /// or if `ret` is too short.
    pub fn compute_inflation_event_quovec(&self, inflation_event: &Event, ret: &mut [i64], offset: usize) {
        assert!(self.target_distribution_fixed, "target distribution must be set before evaluating a quovec");
        assert!(ret.len() - offset >= self.quovec_size());

        let base = self.lhs_dual_vector.tensor().base();
        let event_to_quovec_index = self.lhs_dual_vector.event_to_quovec_index();

        for lhs_marg_event in self.lhs_inflation_marginal.extract_marg_perm_events(inflation_event) {
            let hash = hash_event(&lhs_marg_event, base);
            ret[offset + event_to_quovec_index[usize::try_from(hash).unwrap()]] += self.lhs_scale;
        }

        if self.rhs_inflation_marginal.n_parties() == 0 {
            for target_tensor_event in EventRange::new(self.rhs_target_tensor.k(), u8::try_from(base).unwrap()) {
                let hash = hash_event(&target_tensor_event, base);
                ret[offset + event_to_quovec_index[usize::try_from(hash).unwrap()]] +=
                    self.rhs_target_tensor.get(&target_tensor_event) * self.rhs_scale;
            }
        } else {
            let mut rhs_total_event = vec![0u8; self.lhs_dual_vector.tensor().k()];

            for target_tensor_event in EventRange::new(self.rhs_target_tensor.k(), u8::try_from(base).unwrap()) {
                rhs_total_event[..target_tensor_event.len()].copy_from_slice(&target_tensor_event);

                for rhs_marg_event in self.rhs_inflation_marginal.extract_marg_perm_events(inflation_event) {
                    rhs_total_event[target_tensor_event.len()..].copy_from_slice(&rhs_marg_event);
                    let hash = hash_event(&rhs_total_event, base);
                    ret[offset + event_to_quovec_index[usize::try_from(hash).unwrap()]] +=
                        self.rhs_target_tensor.get(&target_tensor_event) * self.rhs_scale;
                }
            }
        }

        debug_assert_eq!(ret[offset..offset + self.quovec_size()].iter().sum::<i64>(), 0);
    }

    fn update_rhs_reduced_dual_vector(&mut self) {
        assert!(self.target_distribution_fixed, "target distribution must be set first");

        let base = self.lhs_dual_vector.tensor().base();

        let rhs_reduced_quovec = if self.rhs_reduced_dual_vector.tensor().is_scalar() {
            let mut sum = 0i64;
            for target_tensor_event in EventRange::new(self.rhs_target_tensor.k(), u8::try_from(base).unwrap()) {
                sum += self.lhs_dual_vector.tensor().get(&target_tensor_event) * self.rhs_target_tensor.get(&target_tensor_event);
            }
            vec![sum]
        } else {
            let n_orbits = self.rhs_reduced_dual_vector.n_orbits_no_unknown();
            let mut rhs_reduced_quovec = vec![0i64; n_orbits];
            let mut lhs_dual_vector_event = vec![0u8; self.lhs_dual_vector.tensor().k()];
            let rhs_target_k = self.rhs_target_tensor.k();

            for rhs_dual_vector_event in self.rhs_reduced_dual_vector.orbit_repr_no_unknown().to_vec() {
                lhs_dual_vector_event[rhs_target_k..].copy_from_slice(&rhs_dual_vector_event);

                for target_tensor_event in EventRange::new(rhs_target_k, u8::try_from(base).unwrap()) {
                    lhs_dual_vector_event[..rhs_target_k].copy_from_slice(&target_tensor_event);

                    let rhs_hash = hash_event(&rhs_dual_vector_event, self.rhs_reduced_dual_vector.tensor().base());
                    let quovec_index =
                        self.rhs_reduced_dual_vector.event_to_quovec_index()[usize::try_from(rhs_hash).unwrap()];

                    rhs_reduced_quovec[quovec_index] +=
                        self.rhs_target_tensor.get(&target_tensor_event) * self.lhs_dual_vector.tensor().get(&lhs_dual_vector_event);
                }
            }

            rhs_reduced_quovec
        };

        self.rhs_reduced_dual_vector.set_from_quovec(&rhs_reduced_quovec, 0);
    }
}

/// Computes the constraint symmetry group: the subgroup of `inflation`'s symmetries leaving both
/// `lhs_marg \ rhs_marg` and `rhs_marg` invariant as sets (spec §4.9).
///
/// # Panics
///
/// Panics if `lhs_marg` is empty.
#[must_use]
pub fn constraint_group(inflation: &Inflation, lhs_marg: &[usize], rhs_marg: &[usize]) -> Group {
    assert!(!lhs_marg.is_empty(), "a constraint needs a non-empty left-hand side");

    let b_parties: BTreeSet<usize> = rhs_marg.iter().copied().collect();
    let a_parties: BTreeSet<usize> = lhs_marg.iter().copied().filter(|p| !b_parties.contains(p)).collect();

    inflation
        .inflation_symmetries()
        .iter()
        .filter(|sym| {
            let transformed_a: BTreeSet<usize> = a_parties.iter().map(|&p| sym.party().image()[p]).collect();
            let transformed_b: BTreeSet<usize> = b_parties.iter().map(|&p| sym.party().image()[p]).collect();
            transformed_a == a_parties && transformed_b == b_parties
        })
        .cloned()
        .collect()
}

/// Formats a constraint description as `q(marg_0 , ... , marg_rhs) = p(marg_0) * ... * q(marg_rhs)`.
#[must_use]
pub fn pretty_description(description: &[String]) -> String {
    let stripped: Vec<String> = description.iter().map(|s| s.chars().filter(|c| !c.is_whitespace()).collect()).collect();
    let (factors, rhs) = stripped.split_at(stripped.len() - 1);
    let rhs = &rhs[0];

    let mut lhs_parts: Vec<&str> = factors.iter().map(String::as_str).collect();
    if !rhs.is_empty() {
        lhs_parts.push(rhs);
    }

    let mut rhs_parts: Vec<String> = factors.iter().map(|f| format!("p({f})")).collect();
    if !rhs.is_empty() {
        rhs_parts.push(format!("q({rhs})"));
    }

    format!("q({}) = {}", lhs_parts.join(" , "), rhs_parts.join(" * "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inflation::UseDistrSymmetries;
    use crate::network::Network;
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
    fn pretty_description_formats_factors_and_rhs() {
        let description = vec!["A00,B00,C00".to_string(), "A11,B11,C11".to_string(), String::new()];
        let pretty = pretty_description(&description);
        assert_eq!(pretty, "q(A00,B00,C00 , A11,B11,C11) = p(A00,B00,C00) * p(A11,B11,C11)");
    }

    #[test]
    fn builds_a_well_formed_constraint_and_evaluates_a_quovec() {
        let mut distr = srb_distr(2);
        let inflation = Inflation::new(&distr, [2, 2, 2], UseDistrSymmetries::Yes);
        let description = vec!["A00,B00,C00".to_string(), String::new()];
        let mut constraint = Constraint::new(&inflation, &description, false).unwrap();

        constraint.set_target_distribution(&mut distr);
        assert!(constraint.quovec_size() > 0);

        let event = inflation.all_zero_event();
        let mut ret = vec![0i64; constraint.quovec_size()];
        constraint.compute_inflation_event_quovec(&event, &mut ret, 0);
        assert_eq!(ret.iter().sum::<i64>(), 0);
    }
}
