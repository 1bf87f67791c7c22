//! System matrix construction from the process graph
//!
//! Builds the square technosphere matrix A and the rectangular biosphere
//! matrix B over exactly the processes reachable from a set of demanded
//! process ids, together with the explicit id-to-index tables every
//! downstream component is keyed by.
//!
//! Conventions follow the standard LCA formulation: the diagonal of A holds
//! each process's reference production amount, off-diagonal entries are the
//! negated inputs drawn from other processes, so that `A·s = f` balances
//! production against consumption. B holds elementary-flow amounts per unit
//! of process activity.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};

use nalgebra::DMatrix;

use crate::db::ProcessStore;
use crate::errors::EngineError;
use crate::models::FlowKind;

// Monotonically increasing revision tag, assigned per built matrix pair.
static NEXT_REVISION: AtomicU64 = AtomicU64::new(1);

/// Bidirectional id-to-index table for one matrix axis.
#[derive(Debug, Clone, Default)]
pub struct IndexTable {
    order: Vec<String>,
    by_id: HashMap<String, usize>,
}

impl IndexTable {
    /// Index of `id`, assigning the next free slot on first sight.
    fn intern(&mut self, id: &str) -> usize {
        if let Some(&idx) = self.by_id.get(id) {
            return idx;
        }
        let idx = self.order.len();
        self.order.push(id.to_string());
        self.by_id.insert(id.to_string(), idx);
        idx
    }

    pub fn get(&self, id: &str) -> Option<usize> {
        self.by_id.get(id).copied()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

/// Immutable output of one builder invocation.
#[derive(Debug, Clone)]
pub struct SystemMatrices {
    pub technosphere: DMatrix<f64>,
    pub biosphere: DMatrix<f64>,
    pub processes: IndexTable,
    pub elementary: IndexTable,
    /// Identifies this exact matrix instance; factorizations and
    /// characterization matrices are valid only for a matching revision.
    pub revision: u64,
}

/// Build A and B over the technosphere slice reachable from `roots`.
///
/// Traversal is breadth-first from the demanded processes, following
/// non-zero technosphere flows; matrix indices are assigned in discovery
/// order. Fails with [`EngineError::ProcessNotFound`] if a root or a
/// referenced supplier is missing from the store, and with
/// [`EngineError::GraphIncomplete`] if a reachable process has no production
/// exchange (its diagonal entry would be zero and A unsolvable).
pub fn build(store: &dyn ProcessStore, roots: &[String]) -> Result<SystemMatrices, EngineError> {
    let mut processes = IndexTable::default();
    let mut elementary = IndexTable::default();

    // Accumulated (row, col, value) triplets; duplicates sum on assembly.
    let mut techno_triplets: Vec<(usize, usize, f64)> = Vec::new();
    let mut bio_triplets: Vec<(usize, usize, f64)> = Vec::new();

    let mut queue: VecDeque<(String, usize)> = VecDeque::new();
    for root in roots {
        if !store.exists(root)? {
            return Err(EngineError::ProcessNotFound(root.clone()));
        }
        if processes.get(root).is_none() {
            let col = processes.intern(root);
            queue.push_back((root.clone(), col));
        }
    }

    while let Some((process_id, col)) = queue.pop_front() {
        let mut has_production = false;

        for flow in store.outgoing_exchanges(&process_id)? {
            if flow.amount == 0.0 {
                continue;
            }
            match flow.kind {
                FlowKind::Production => {
                    has_production = true;
                    techno_triplets.push((col, col, flow.amount));
                }
                FlowKind::Technosphere => {
                    let supplier = &flow.target_id;
                    let row = match processes.get(supplier) {
                        Some(row) => row,
                        None => {
                            if !store.exists(supplier)? {
                                return Err(EngineError::ProcessNotFound(supplier.clone()));
                            }
                            let row = processes.intern(supplier);
                            queue.push_back((supplier.clone(), row));
                            row
                        }
                    };
                    techno_triplets.push((row, col, -flow.amount));
                }
                FlowKind::Biosphere => {
                    let row = elementary.intern(&flow.target_id);
                    bio_triplets.push((row, col, flow.amount));
                }
            }
        }

        if !has_production {
            return Err(EngineError::GraphIncomplete(process_id));
        }
    }

    let n = processes.len();
    let mut technosphere = DMatrix::zeros(n, n);
    for (row, col, value) in techno_triplets {
        technosphere[(row, col)] += value;
    }

    let mut biosphere = DMatrix::zeros(elementary.len(), n);
    for (row, col, value) in bio_triplets {
        biosphere[(row, col)] += value;
    }

    Ok(SystemMatrices {
        technosphere,
        biosphere,
        processes,
        elementary,
        revision: NEXT_REVISION.fetch_add(1, Ordering::Relaxed),
    })
}
