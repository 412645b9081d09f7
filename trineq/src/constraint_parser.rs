//! Parses human-readable inflation-constraint descriptions into party indices (spec §4.6).
//!
//! A constraint is written as a list of comma-separated party-name marginals, e.g.
//! `["A00,B00,C00", "A11,B11,C11", ""]`, read as `(marg_0, ..., marg_{k-1}, marg_rhs)`: the last
//! entry is the right-hand side, every other entry a left-hand-side factor. The empty string
//! denotes the empty set.

use crate::inflation::Inflation;
use crate::network::PARTY_NAMES;
use std::collections::BTreeSet;
use thiserror::Error;

/// Errors raised while parsing or validating a constraint description (spec §7).
#[derive(Debug, Error)]
pub enum ParseConstraintError {
    #[error("a constraint description needs at least two marginals (got {0})")]
    TooFewMarginals(usize),
    #[error("marginal \"{0}\" contains an empty party name, is there an extra comma in there?")]
    EmptyPartyName(String),
    #[error("marginal \"{marginal}\" contains \"{party}\", which is not a valid party name")]
    InvalidPartyName { marginal: String, party: String },
    #[error("marginal \"{0}\" lists the same party more than once")]
    DuplicateParty(String),
    #[error("marginal {lhs} is not d-separated from marginal {rhs}")]
    NotDSeparated { lhs: String, rhs: String },
    #[error("marginal \"{0}\" is not an injectable set")]
    NotInjectable(String),
}

type Result<T> = std::result::Result<T, ParseConstraintError>;

/// A fully parsed and validated constraint description: inflation party indices for the
/// left- and right-hand sides, plus the network-level marginal each left-hand factor corresponds
/// to in the target distribution (spec §4.6, §4.9).
#[derive(Clone, Debug)]
pub struct ParsedConstraint {
    lhs_marg_parties: Vec<usize>,
    rhs_marg_parties: Vec<usize>,
    target_marg_names: Vec<Vec<usize>>,
}

impl ParsedConstraint {
    /// Parses and validates `description` against `inflation`: every entry must name a set of
    /// valid, distinct inflation parties; every pair of marginals (including the right-hand side)
    /// must be d-separated; and every left-hand-side marginal must be an injectable set.
    pub fn parse(inflation: &Inflation, description: &[String]) -> Result<Self> {
        if description.len() < 2 {
            return Err(ParseConstraintError::TooFewMarginals(description.len()));
        }

        let mut as_indices = Vec::with_capacity(description.len());
        for name in description {
            let parties = parse_inflation_marginal(inflation, name)?;
            let distinct: BTreeSet<usize> = parties.iter().copied().collect();
            if distinct.len() != parties.len() {
                return Err(ParseConstraintError::DuplicateParty(name.clone()));
            }
            as_indices.push(parties);
        }

        for i in 0..description.len() {
            for j in (i + 1)..description.len() {
                if !inflation.are_d_separated(&as_indices[i], &as_indices[j]) {
                    return Err(ParseConstraintError::NotDSeparated {
                        lhs: description[i].clone(),
                        rhs: description[j].clone(),
                    });
                }
            }
        }

        for (marg, name) in as_indices[..as_indices.len() - 1].iter().zip(description) {
            if !inflation.is_injectable_set(marg) {
                return Err(ParseConstraintError::NotInjectable(name.clone()));
            }
        }

        let lhs_marg_parties = as_indices.iter().flatten().copied().collect();
        let rhs_marg_parties = as_indices.last().unwrap().clone();

        let target_marg_names = as_indices[..as_indices.len() - 1]
            .iter()
            .map(|marg| {
                marg.iter()
                    .map(|&party_index| network_party_index(inflation.party_name(party_index)))
                    .collect()
            })
            .collect();

        Ok(Self { lhs_marg_parties, rhs_marg_parties, target_marg_names })
    }

    /// The left-hand-side inflation party indices: the union of every marginal in the
    /// description, including the right-hand side.
    #[must_use]
    pub fn lhs_marg_parties(&self) -> &[usize] {
        &self.lhs_marg_parties
    }

    /// The right-hand-side inflation party indices, i.e. the last marginal in the description.
    #[must_use]
    pub fn rhs_marg_parties(&self) -> &[usize] {
        &self.rhs_marg_parties
    }

    /// The target-distribution marginal (network party indices) corresponding to each
    /// left-hand-side factor marginal (everything but the right-hand side).
    #[must_use]
    pub fn target_marg_names(&self) -> &[Vec<usize>] {
        &self.target_marg_names
    }
}

/// Parses a single comma-separated marginal name, e.g. `" A11, A22,B00 "`, into inflation party
/// indices. The empty string (after removing spaces) parses to the empty list.
pub fn parse_inflation_marginal(inflation: &Inflation, name: &str) -> Result<Vec<usize>> {
    let stripped: String = name.chars().filter(|c| !c.is_whitespace()).collect();
    if stripped.is_empty() {
        return Ok(Vec::new());
    }

    stripped
        .split(',')
        .map(|party| {
            if party.is_empty() {
                return Err(ParseConstraintError::EmptyPartyName(name.to_string()));
            }
            if !inflation.is_valid_party_name(party) {
                return Err(ParseConstraintError::InvalidPartyName {
                    marginal: name.to_string(),
                    party: party.to_string(),
                });
            }
            Ok(inflation.party_index_by_name(party).unwrap())
        })
        .collect()
}

/// Strips the copy indices off an inflation party name (e.g. `"A00"` -> network index of `'A'`).
fn network_party_index(inflation_party_name: &str) -> usize {
    let letter = inflation_party_name.chars().next().unwrap();
    PARTY_NAMES.iter().position(|&c| c == letter).unwrap()
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

    fn inflation(size: [usize; 3]) -> Inflation {
        let distr = srb_distr(2);
        Inflation::new(&distr, size, UseDistrSymmetries::Yes)
    }

    #[test]
    fn parses_comma_separated_names_ignoring_spaces() {
        let inf = inflation([2, 2, 2]);
        let parsed = parse_inflation_marginal(&inf, " A00 , B00 ").unwrap();
        assert_eq!(parsed.len(), 2);
    }

    #[test]
    fn empty_string_parses_to_empty_set() {
        let inf = inflation([2, 2, 2]);
        assert!(parse_inflation_marginal(&inf, "   ").unwrap().is_empty());
    }

    #[test]
    fn rejects_unknown_party_names() {
        let inf = inflation([2, 2, 2]);
        assert!(matches!(
            parse_inflation_marginal(&inf, "Z99"),
            Err(ParseConstraintError::InvalidPartyName { .. })
        ));
    }

    #[test]
    fn rejects_too_few_marginals() {
        let inf = inflation([2, 2, 2]);
        let err = ParsedConstraint::parse(&inf, &["A00,B00,C00".to_string()]).unwrap_err();
        assert!(matches!(err, ParseConstraintError::TooFewMarginals(1)));
    }

    #[test]
    fn accepts_a_well_formed_constraint() {
        let inf = inflation([2, 2, 2]);
        let description = vec!["A00,B00,C00".to_string(), "A11,B11,C11".to_string(), String::new()];
        let parsed = ParsedConstraint::parse(&inf, &description).unwrap();
        assert_eq!(parsed.lhs_marg_parties().len(), 6);
        assert!(parsed.rhs_marg_parties().is_empty());
        assert_eq!(parsed.target_marg_names().len(), 2);
        assert_eq!(parsed.target_marg_names()[0].len(), 3);
    }

    #[test]
    fn rejects_non_injectable_lhs_marginal() {
        let inf = inflation([2, 2, 2]);
        // A00,A01 is not injectable: it's not mapped to a single representative network party.
        let description = vec!["A00,A01".to_string(), String::new()];
        let err = ParsedConstraint::parse(&inf, &description).unwrap_err();
        assert!(matches!(err, ParseConstraintError::NotInjectable(_)));
    }
}
