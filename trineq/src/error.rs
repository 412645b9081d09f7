//! The crate's catch-all error type.

use thiserror::Error;

/// Errors produced anywhere in `trineq`.
#[derive(Debug, Error)]
pub enum Error {
    /// A dual-vector orbit coefficient exceeded the overflow bound `B_max` (spec §4.8, §4.10).
    #[error("dual vector component {value} exceeds the overflow bound {bound}")]
    Overflow {
        /// The offending coefficient.
        value: i64,
        /// The bound it was required to stay under.
        bound: i64,
    },
    /// A constraint description failed validation (spec §4.6).
    #[error("invalid constraint description: {0}")]
    Validation(String),
    /// A target-distribution update presented a symmetry subgroup incompatible with the one the
    /// inflation was built with (spec §4.9, §4.13).
    #[error("symmetries have changed: the target distribution's symmetry group is no longer \
        compatible with this constraint's inflation")]
    SymmetriesChanged,
    /// The Frank-Wolfe subproblem solver reported anything other than optimal (spec §4.12).
    #[error("Frank-Wolfe subproblem did not reach an optimal, feasible solution: {0}")]
    SolverNonOptimal(String),
    /// Metadata, version, or constraint descriptions on disk differ from the live problem
    /// (spec §6).
    #[error("file format mismatch: {0}")]
    FileFormatMismatch(String),
    /// A debug-only invariant was violated (spec §7). Only ever constructed in debug builds.
    #[error("invariant violation: {0}")]
    Invariant(String),
    /// Any error that doesn't originate in this crate.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// This crate's `Result` alias.
pub type Result<T> = std::result::Result<T, Error>;
