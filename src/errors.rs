//! Error taxonomy for the impact computation engine
//!
//! Validation errors are rejected before any matrix work begins; not-found
//! errors abort the whole batch rather than silently skipping the offending
//! key; numerical errors are fatal for the affected evaluation; invariant
//! errors indicate a bug between builder, solver and characterization, not a
//! user mistake.

use thiserror::Error;

use crate::models::MethodKey;

#[derive(Debug, Error)]
pub enum EngineError {
    // Validation: rejected before touching the graph.
    #[error("no impact methods specified, at least one method is required")]
    NoMethods,
    #[error("no demands specified, at least one demand is required")]
    NoDemands,
    #[error("demand {0} has no process amounts")]
    EmptyDemand(usize),
    #[error("malformed method key '{0}', expected 'family | category | indicator'")]
    MalformedMethodKey(String),
    #[error("malformed demand '{0}', expected 'process_id=amount[,process_id=amount]'")]
    MalformedDemand(String),
    #[error("unknown flow kind '{0}'")]
    UnknownFlowKind(String),

    // Not found: the offending id/key is named, the whole batch aborts.
    #[error("process '{0}' not found")]
    ProcessNotFound(String),
    #[error("method '{0}' not found")]
    MethodNotFound(MethodKey),
    #[error("process '{0}' has no production exchange defining its reference output")]
    GraphIncomplete(String),
    #[error("demand references process '{0}' outside the built system")]
    DemandIndex(String),

    // Numerical: identical input yields the identical failure, never retried.
    #[error("technosphere matrix is singular, no unique scaling vector exists")]
    SingularMatrix,

    // Internal invariants: a contract violation between components.
    #[error("dimension mismatch in {context}: {left} vs {right}")]
    DimensionMismatch {
        context: &'static str,
        left: usize,
        right: usize,
    },
    #[error("factorization built for matrix revision {handle} applied to revision {matrix}")]
    StaleFactorization { handle: u64, matrix: u64 },

    #[error("evaluation cancelled")]
    Cancelled,

    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),
}
