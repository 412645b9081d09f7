//! [`EventTensor`]: a dense, exact-rational-valued function over `outcomes^k` (spec §3, §4.1).

use crate::event::{hash_event, Event};
use itertools::Itertools;
use num_integer::Integer;
use serde::{Deserialize, Serialize};

/// A dense function over events of a fixed length `k` and alphabet size `base`, represented as
/// integer numerators sharing one positive denominator.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EventTensor {
    numerators: Vec<i64>,
    denominator: i64,
    base: u64,
    k: usize,
}

impl EventTensor {
    /// Constructs a zero tensor over events of length `k` with `base` outcomes per position.
    ///
    /// # Panics
    ///
    /// Panics if `base.pow(k)` overflows `usize`.
    #[must_use]
    pub fn zeros(k: usize, base: u64) -> Self {
        let size = usize::try_from(base.pow(u32::try_from(k).unwrap())).unwrap();
        Self {
            numerators: vec![0; size],
            denominator: 1,
            base,
            k,
        }
    }

    /// Number of parties (length of an event) this tensor is defined over.
    #[must_use]
    pub const fn k(&self) -> usize {
        self.k
    }

    /// The alphabet size used for hashing events into indices.
    #[must_use]
    pub const fn base(&self) -> u64 {
        self.base
    }

    /// The shared positive denominator.
    #[must_use]
    pub const fn denominator(&self) -> i64 {
        self.denominator
    }

    /// Sets the shared denominator. Does not rescale the numerators.
    pub fn set_denominator(&mut self, denominator: i64) {
        debug_assert!(denominator > 0, "denominator must stay positive");
        self.denominator = denominator;
    }

    /// `true` iff `k == 0`, i.e. this tensor holds a single scalar.
    #[must_use]
    pub const fn is_scalar(&self) -> bool {
        self.k == 0
    }

    /// Returns the numerator for `event`.
    #[must_use]
    pub fn get(&self, event: &[u8]) -> i64 {
        self.get_by_hash(hash_event(event, self.base))
    }

    /// Returns the numerator at flat index `hash`.
    #[must_use]
    pub fn get_by_hash(&self, hash: u64) -> i64 {
        self.numerators[usize::try_from(hash).unwrap()]
    }

    /// Sets the numerator for `event`.
    pub fn set(&mut self, event: &[u8], numerator: i64) {
        let hash = hash_event(event, self.base);
        self.set_by_hash(hash, numerator);
    }

    /// Sets the numerator at flat index `hash`.
    pub fn set_by_hash(&mut self, hash: u64, numerator: i64) {
        self.numerators[usize::try_from(hash).unwrap()] = numerator;
    }

    /// The scalar value of a `k == 0` tensor, i.e. `numerator[0] / denominator`.
    ///
    /// # Panics
    ///
    /// Panics if this tensor is not scalar.
    #[must_use]
    pub fn scalar(&self) -> (i64, i64) {
        assert!(self.is_scalar(), "scalar() called on a non-scalar tensor");
        (self.numerators[0], self.denominator)
    }

    /// Raw access to the numerator array, in hash order.
    #[must_use]
    pub fn numerators(&self) -> &[i64] {
        &self.numerators
    }

    /// Computes the tensor product of `factors`, concatenating party axes left to right,
    /// multiplying numerators and denominators (spec §4.1). All factors must share `base`.
    ///
    /// # Panics
    ///
    /// Panics if `factors` is empty or the factors don't share the same `base`.
    #[must_use]
    pub fn tensor_product(factors: &[Self]) -> Self {
        assert!(!factors.is_empty(), "tensor_product needs at least one factor");
        let base = factors[0].base;
        assert!(factors.iter().all(|f| f.base == base), "factors must share the same base");

        let k: usize = factors.iter().map(Self::k).sum();
        let denominator = factors.iter().map(Self::denominator).product();
        let mut result = Self::zeros(k, base);
        result.set_denominator(denominator);

        let ranges = factors
            .iter()
            .map(|f| crate::event::EventRange::new(f.k(), u8::try_from(f.base).unwrap()));

        for combo in ranges.multi_cartesian_product() {
            let mut event = Event::new();
            let mut numerator = 1i64;
            for (factor, sub_event) in factors.iter().zip(&combo) {
                event.extend_from_slice(sub_event);
                numerator *= factor.get(sub_event);
            }
            result.set(&event, numerator);
        }

        result
    }

    /// Divides all numerators and the denominator by their greatest common divisor.
    pub fn simplify(&mut self) {
        let mut g = self.denominator.unsigned_abs();
        for &n in &self.numerators {
            g = g.gcd(&n.unsigned_abs());
            if g == 1 {
                return;
            }
        }
        if g <= 1 {
            return;
        }
        let g = i64::try_from(g).unwrap();
        self.denominator /= g;
        for n in &mut self.numerators {
            *n /= g;
        }
    }

    /// `true` iff all numerators are non-negative and sum to the denominator, i.e. this tensor
    /// represents a (not necessarily normalized-to-lowest-terms) probability distribution.
    #[must_use]
    pub fn is_probability_distribution(&self) -> bool {
        self.numerators.iter().all(|&n| n >= 0) && self.numerators.iter().sum::<i64>() == self.denominator
    }
}

/// Per-position hash weights for events of length `n_parties` over `base` outcomes, i.e.
/// `(base^0, base^1, ..., base^(n_parties - 1))` (matches [`crate::event::hash_event`]'s
/// convention), used to update an event hash incrementally without recomputing it from scratch.
#[must_use]
pub fn compute_weights(n_parties: usize, base: u64) -> Vec<i64> {
    let mut weights = Vec::with_capacity(n_parties);
    let mut weight = 1i64;
    for _ in 0..n_parties {
        weights.push(weight);
        weight *= i64::try_from(base).unwrap();
    }
    weights
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tensor_product_concatenates_and_multiplies() {
        let mut a = EventTensor::zeros(1, 2);
        a.set(&[0], 1);
        a.set(&[1], 1);
        a.set_denominator(2);

        let mut b = EventTensor::zeros(1, 2);
        b.set(&[0], 3);
        b.set(&[1], 1);
        b.set_denominator(4);

        let product = EventTensor::tensor_product(&[a, b]);
        assert_eq!(product.k(), 2);
        assert_eq!(product.denominator(), 8);
        assert_eq!(product.get(&[0, 0]), 3);
        assert_eq!(product.get(&[1, 1]), 1);
    }

    #[test]
    fn simplify_divides_by_gcd() {
        let mut t = EventTensor::zeros(1, 2);
        t.set(&[0], 4);
        t.set(&[1], 6);
        t.set_denominator(10);
        t.simplify();
        assert_eq!(t.get(&[0]), 2);
        assert_eq!(t.get(&[1]), 3);
        assert_eq!(t.denominator(), 5);
    }

    #[test]
    fn recognizes_probability_distribution() {
        let mut t = EventTensor::zeros(1, 2);
        t.set(&[0], 1);
        t.set(&[1], 1);
        t.set_denominator(2);
        assert!(t.is_probability_distribution());

        t.set(&[0], -1);
        assert!(!t.is_probability_distribution());
    }
}
