//! A set of inflation constraints and the exact-integer scale-balancing arithmetic that lets
//! every constraint's inner product be evaluated with the same shared integer scale (spec §4.10).

use crate::constraint::Constraint;
use crate::error::{Error, Result};
use crate::event::Event;
use crate::inflation::Inflation;
use crate::marginal::EvaluatorSet;
use crate::network::TargetDistr;
use num_bigint::BigInt;
use num_integer::Integer;
use num_traits::ToPrimitive;

/// A set of [`Constraint`]s that, together with the inflation size, determines the inflation
/// problem at hand (spec §4.9, §4.10).
pub struct ConstraintSet {
    constraints: Vec<Constraint>,
    store_bounds: bool,
    quovec_size: usize,
    quovec_denom: f64,
    max_dual_vector_component: i64,
    n_inflation_parties: usize,
    n_outcomes: u8,
}

impl ConstraintSet {
    /// Parses every description in `constraint_descriptions` against `inflation` and builds the
    /// constraint set.
    ///
    /// # Errors
    ///
    /// Returns an error if any description is malformed (spec §4.6).
    ///
    /// # Panics
    ///
    /// Panics if `constraint_descriptions` is empty.
    pub fn new(inflation: &Inflation, constraint_descriptions: &[Vec<String>], store_bounds: bool) -> Result<Self> {
        assert!(!constraint_descriptions.is_empty(), "a constraint set needs at least one constraint");

        let mut constraints = Vec::with_capacity(constraint_descriptions.len());
        for description in constraint_descriptions {
            constraints.push(Constraint::new(inflation, description, store_bounds)?);
        }

        let quovec_size = constraints.iter().map(Constraint::quovec_size).sum();

        Ok(Self {
            constraints,
            store_bounds,
            quovec_size,
            quovec_denom: 1.0,
            max_dual_vector_component: 0,
            n_inflation_parties: inflation.n_parties(),
            n_outcomes: inflation.network().n_outcomes(),
        })
    }

    /// Whether the underlying dual vectors store branch-and-bound bounds.
    #[must_use]
    pub const fn store_bounds(&self) -> bool {
        self.store_bounds
    }

    /// The total quovec size, the sum of every constraint's quovec size.
    #[must_use]
    pub const fn quovec_size(&self) -> usize {
        self.quovec_size
    }

    /// The maximal absolute value a dual vector component can take without risking overflow
    /// during an inner product evaluation.
    #[must_use]
    pub const fn max_dual_vector_component(&self) -> i64 {
        self.max_dual_vector_component
    }

    /// The overall scale factor by which evaluated inner products and quovecs are multiplied,
    /// relative to their true value (used to normalize Frank-Wolfe numerics).
    #[must_use]
    pub const fn quovec_denom(&self) -> f64 {
        self.quovec_denom
    }

    /// The constraints making up this set.
    #[must_use]
    pub fn constraints(&self) -> &[Constraint] {
        &self.constraints
    }

    /// Builds the combined [`EvaluatorSet`] over every constraint's left- and right-hand-side
    /// marginal evaluators.
    #[must_use]
    pub fn marg_evaluators(&self) -> EvaluatorSet<'_> {
        let mut evaluators = Vec::with_capacity(self.constraints.len() * 2);
        for constraint in &self.constraints {
            let (lhs, rhs) = constraint.marg_evaluators(self.n_inflation_parties, self.n_outcomes);
            evaluators.push(lhs);
            evaluators.push(rhs);
        }
        EvaluatorSet::new(evaluators)
    }

    /// Updates every constraint's target distribution, then rebalances the scale factors (spec
    /// §4.10).
    pub fn set_target_distribution(&mut self, distr: &mut TargetDistr) {
        for constraint in &mut self.constraints {
            constraint.set_target_distribution(distr);
        }
        self.update_constraint_scale_factors();
    }

    /// Sets every constraint's dual vector from the flat `coeffs` quovec, then checks the
    /// overflow bound.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Overflow`] if any resulting dual vector component exceeds
    /// [`Self::max_dual_vector_component`] in absolute value.
    ///
    /// # Panics
    ///
    /// Panics if `coeffs.len() != self.quovec_size()`.
    pub fn set_dual_vector_from_quovec(&mut self, coeffs: &[i64]) -> Result<()> {
        assert_eq!(coeffs.len(), self.quovec_size, "quovec has the wrong size");

        let mut offset = 0;
        for constraint in &mut self.constraints {
            constraint.set_dual_vector_from_quovec(coeffs, offset);
            offset += constraint.quovec_size();
        }
        assert_eq!(offset, self.quovec_size);

        self.hard_assert_quovecs_within_bound()
    }

    /// Computes `{totconstraintmap(det_distr(inflation_event))}` for every constraint, as one flat
    /// quovec (spec §4.9).
    ///
    /// # Panics
    ///
    /// Panics if `inflation_event`'s length doesn't match the inflation's party count, or if a
    /// target distribution hasn't been set yet.
    #[must_use]
    pub fn inflation_event_quovec(&self, inflation_event: &Event) -> Vec<i64> {
        let mut ret = vec![0i64; self.quovec_size];
        let mut offset = 0;
        for constraint in &self.constraints {
            constraint.compute_inflation_event_quovec(inflation_event, &mut ret, offset);
            offset += constraint.quovec_size();
        }
        assert_eq!(offset, self.quovec_size);
        ret
    }

    fn hard_assert_quovecs_within_bound(&self) -> Result<()> {
        for constraint in &self.constraints {
            constraint.dual_vector().hard_assert_within_bound(self.max_dual_vector_component)?;
        }
        Ok(())
    }

    /// Computes per-constraint LHS/RHS scale factors balancing out every constraint's LHS/RHS
    /// denominators (spec §4.10): for constraint `i`, `lhs_scale_i = rhs_denom_i * prod_{j != i}
    /// (lhs_denom_j * rhs_denom_j)` and symmetrically for `rhs_scale_i`, all divided by their
    /// overall GCD to keep the integers small. Also recomputes the overflow-safe bound on dual
    /// vector components and resets every dual vector to zero (which is always within bound).
    fn update_constraint_scale_factors(&mut self) {
        let n = self.constraints.len();
        let mut scale_factors = vec![BigInt::from(1); 2 * n];

        self.quovec_denom = 1.0;

        for i in 0..n {
            let lhs_denom_i = self.constraints[i].lhs_denom();
            let rhs_denom_i = self.constraints[i].rhs_denom();
            self.quovec_denom *= lhs_denom_i.to_f64().unwrap() * rhs_denom_i.to_f64().unwrap();

            for j in 0..n {
                scale_factors[2 * j] *= rhs_denom_i;
                scale_factors[2 * j + 1] *= lhs_denom_i;
                if i == j {
                    continue;
                }
                scale_factors[2 * j] *= lhs_denom_i;
                scale_factors[2 * j + 1] *= rhs_denom_i;
            }
        }

        let gcd = simplify_by_gcd(&mut scale_factors);
        self.quovec_denom /= gcd;

        for i in 0..n {
            let lhs_scale = scale_factors[2 * i].to_i64().expect("lhs scale factor overflowed i64");
            let rhs_scale = scale_factors[2 * i + 1].to_i64().expect("rhs scale factor overflowed i64");
            self.constraints[i].set_lhs_scale(lhs_scale);
            self.constraints[i].set_rhs_scale(rhs_scale);
        }

        let safety_factor = 10i64;
        let divide_by = safety_factor
            * scale_factors[0].to_i64().expect("scale factor overflowed i64")
            * self.constraints[0].lhs_denom()
            * 2
            * i64::try_from(n).unwrap();
        self.max_dual_vector_component = i64::MAX / divide_by;

        let zero_quovec = vec![0i64; self.quovec_size];
        self.set_dual_vector_from_quovec(&zero_quovec).expect("the zero quovec must always respect the overflow bound");
    }
}

/// Divides every entry of `scale_factors` by their overall GCD (all entries are positive, so
/// ordinary integer division is floor division), returning the GCD as an `f64`.
fn simplify_by_gcd(scale_factors: &mut [BigInt]) -> f64 {
    let mut the_gcd = scale_factors[0].clone();
    for sf in &scale_factors[1..] {
        the_gcd = the_gcd.gcd(sf);
        if the_gcd == BigInt::from(1) {
            return 1.0;
        }
    }

    let gcd_f64 = the_gcd.to_f64().unwrap_or(f64::MAX);
    for sf in scale_factors.iter_mut() {
        *sf /= &the_gcd;
    }
    gcd_f64
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
    fn balances_scales_and_evaluates_zero_sum_quovec() {
        let mut distr = srb_distr(2);
        let inflation = Inflation::new(&distr, [2, 2, 2], UseDistrSymmetries::Yes);
        let descriptions = vec![
            vec!["A00,B00,C00".to_string(), String::new()],
            vec!["A11,B11,C11".to_string(), String::new()],
        ];
        let mut set = ConstraintSet::new(&inflation, &descriptions, false).unwrap();
        set.set_target_distribution(&mut distr);

        assert!(set.max_dual_vector_component() > 0);

        let event = inflation.all_zero_event();
        let quovec = set.inflation_event_quovec(&event);
        assert_eq!(quovec.len(), set.quovec_size());
    }

    #[test]
    fn rejects_dual_vector_exceeding_the_overflow_bound() {
        let mut distr = srb_distr(2);
        let inflation = Inflation::new(&distr, [1, 1, 1], UseDistrSymmetries::Yes);
        let descriptions = vec![vec!["A00,B00,C00".to_string(), String::new()]];
        let mut set = ConstraintSet::new(&inflation, &descriptions, false).unwrap();
        set.set_target_distribution(&mut distr);

        let huge = vec![i64::MAX / 2; set.quovec_size()];
        assert!(matches!(set.set_dual_vector_from_quovec(&huge), Err(Error::Overflow { .. })));
    }
}
