//! Error types for generation and tree validation.

use crate::statement::StatementId;
use thiserror::Error;

/// Value pools of the [`ValueGenerator`](crate::values::ValueGenerator).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Pool {
    VariableNames,
    JobNames,
    Strings,
}

impl std::fmt::Display for Pool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Pool::VariableNames => "variable names",
            Pool::JobNames => "job names",
            Pool::Strings => "strings",
        };
        f.write_str(name)
    }
}

/// Fatal errors of a generation session.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum GenerationError {
    /// A value pool ran dry. Pools are sized well above any sane target,
    /// so this indicates a misconfigured session.
    #[error("value pool exhausted: {pool}")]
    PoolExhausted { pool: Pool },

    #[error("invalid session configuration: {0}")]
    InvalidConfig(String),

    /// The grow/simplify loop never produced a tree of the target size.
    #[error("generation did not converge after {rounds} rounds")]
    DidNotConverge { rounds: usize },
}

/// A broken structural invariant. Always a bug in the generator or simplifier.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum InvariantViolation {
    #[error("root statement must be a coroutine scope, found {found}")]
    RootNotScope { found: &'static str },

    #[error("statement id {0} appears more than once")]
    DuplicateId(StatementId),

    #[error("usage of `{var}` has no visible declaration")]
    DanglingUsage { var: String },

    #[error("`{var}` is declared more than once")]
    DuplicateDeclaration { var: String },
}
