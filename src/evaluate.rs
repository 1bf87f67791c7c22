//! Evaluation orchestrator
//!
//! Drives the matrix builder, solver and characterization engine for a
//! batch of demands against a list of methods, reusing every expensive
//! intermediate: the system matrices are built once over the union of all
//! demanded processes, the technosphere matrix is factorized once, and each
//! method's characterization matrix is built once. Any failure aborts the
//! whole batch; no partial result is ever returned.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::characterize::CharacterizationCache;
use crate::db::{MethodRegistry, ProcessStore};
use crate::errors::EngineError;
use crate::matrix;
use crate::models::{Demand, EvalReport, EvalResults, EvalStats, MethodKey};
use crate::solver::{self, FactorizationCache};

/// Cooperative cancellation flag, checked between demand iterations.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Entry point of the computation engine.
///
/// Owns nothing but references to the two collaborators; all caches are
/// created per [`evaluate`](Evaluator::evaluate) call, so independent
/// evaluations never share mutable state.
pub struct Evaluator<'a> {
    store: &'a dyn ProcessStore,
    registry: &'a dyn MethodRegistry,
    cancel: CancelToken,
}

impl<'a> Evaluator<'a> {
    pub fn new(store: &'a dyn ProcessStore, registry: &'a dyn MethodRegistry) -> Self {
        Evaluator {
            store,
            registry,
            cancel: CancelToken::new(),
        }
    }

    /// Attach a cancellation token shared with the caller.
    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Compute per-demand, per-method impact scores.
    pub fn evaluate(
        &self,
        demands: &[Demand],
        methods: &[MethodKey],
    ) -> Result<EvalReport, EngineError> {
        // Validation happens before any matrix work.
        if methods.is_empty() {
            return Err(EngineError::NoMethods);
        }
        if demands.is_empty() {
            return Err(EngineError::NoDemands);
        }
        // A demand without amounts can never be scored; skipping it would
        // return a result missing one slot, which callers could mistake
        // for a complete batch.
        for (idx, demand) in demands.iter().enumerate() {
            if demand.amounts.is_empty() {
                return Err(EngineError::EmptyDemand(idx));
            }
        }
        for key in methods {
            if !self.registry.method_exists(key)? {
                return Err(EngineError::MethodNotFound(key.clone()));
            }
        }

        // One build over the union of all demanded processes, in input
        // order, deduplicated.
        let mut roots: Vec<String> = Vec::new();
        for demand in demands {
            for (process_id, _) in &demand.amounts {
                if !roots.contains(process_id) {
                    roots.push(process_id.clone());
                }
            }
        }
        let matrices = matrix::build(self.store, &roots)?;

        let mut factorizations = FactorizationCache::new();
        let mut characterizations = CharacterizationCache::new(matrices.revision);

        // Characterization matrices up front, one per method.
        for key in methods {
            characterizations.matrix(self.registry, &matrices, key)?;
        }

        let mut results = EvalResults::default();
        let mut solves = 0;

        for (idx, demand) in demands.iter().enumerate() {
            if self.cancel.is_cancelled() {
                return Err(EngineError::Cancelled);
            }

            let label = match demand.amounts.first() {
                Some((process_id, _)) => self.store.resolve(process_id)?.label(),
                None => return Err(EngineError::EmptyDemand(idx)),
            };

            let factorization = factorizations.factorization(&matrices);
            let scaling = solver::solve(factorization, &matrices, demand)?;
            solves += 1;
            let g = solver::inventory(&matrices, &scaling)?;

            for key in methods {
                let c = characterizations.matrix(self.registry, &matrices, key)?;
                let scores = crate::characterize::characterize(c, &g)?;
                results.insert(&label, key, scores.sum());
            }
        }

        let stats = EvalStats {
            factorizations: factorizations.builds(),
            solves,
            characterization_builds: characterizations.builds(),
        };
        Ok(EvalReport { results, stats })
    }
}
