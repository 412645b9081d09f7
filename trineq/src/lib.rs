//! Inflation-hierarchy nonlocality certificates for the triangle causal network: given a target
//! distribution and an inflation size, searches for a dual-vector certificate that is
//! non-negative on every inflation event but strictly positive on the distribution.

pub mod certificate;
pub mod constraint;
pub mod constraint_parser;
pub mod constraint_set;
pub mod dual_vector;
pub mod error;
pub mod event;
pub mod feasibility;
pub mod frank_wolfe;
pub mod inflation;
pub mod marginal;
pub mod network;
pub mod oracle;
pub mod orbit;
pub mod problem;
pub mod symmetry;
pub mod tensor;
pub mod tree;
pub mod tree_filler;
pub mod visibility;
