//! Linear solver and factorization cache
//!
//! One LU decomposition of the technosphere matrix serves every demand
//! solved against the same matrix instance; the cache is keyed by the
//! matrix revision and rebuilds whenever the revision changes, so a stale
//! decomposition is never reused silently.

use nalgebra::linalg::LU;
use nalgebra::{DVector, Dyn};

use crate::errors::EngineError;
use crate::matrix::SystemMatrices;
use crate::models::Demand;

/// Reusable LU decomposition of one technosphere matrix instance.
pub struct Factorization {
    lu: LU<f64, Dyn, Dyn>,
    revision: u64,
}

/// Session-scoped cache holding at most one factorization.
#[derive(Default)]
pub struct FactorizationCache {
    entry: Option<Factorization>,
    builds: usize,
}

impl FactorizationCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// The factorization for `matrices`, decomposing lazily on first use
    /// and re-decomposing when the matrix revision has changed.
    pub fn factorization(&mut self, matrices: &SystemMatrices) -> &Factorization {
        let stale = match &self.entry {
            Some(entry) => entry.revision != matrices.revision,
            None => true,
        };
        if stale {
            self.builds += 1;
            self.entry = None;
        }
        self.entry.get_or_insert_with(|| Factorization {
            lu: matrices.technosphere.clone().lu(),
            revision: matrices.revision,
        })
    }

    /// Number of decompositions performed so far (reuse instrumentation).
    pub fn builds(&self) -> usize {
        self.builds
    }
}

/// Solve `A·s = f` for the scaling vector of one demand.
pub fn solve(
    factorization: &Factorization,
    matrices: &SystemMatrices,
    demand: &Demand,
) -> Result<DVector<f64>, EngineError> {
    if factorization.revision != matrices.revision {
        return Err(EngineError::StaleFactorization {
            handle: factorization.revision,
            matrix: matrices.revision,
        });
    }

    let n = matrices.processes.len();
    let mut rhs = DVector::zeros(n);
    for (process_id, amount) in &demand.amounts {
        let idx = matrices
            .processes
            .get(process_id)
            .ok_or_else(|| EngineError::DemandIndex(process_id.clone()))?;
        rhs[idx] += amount;
    }

    factorization
        .lu
        .solve(&rhs)
        .ok_or(EngineError::SingularMatrix)
}

/// Elementary-flow inventory `g = B·s` for one scaling vector.
pub fn inventory(
    matrices: &SystemMatrices,
    scaling: &DVector<f64>,
) -> Result<DVector<f64>, EngineError> {
    if scaling.len() != matrices.processes.len() {
        return Err(EngineError::DimensionMismatch {
            context: "inventory",
            left: matrices.biosphere.ncols(),
            right: scaling.len(),
        });
    }
    Ok(&matrices.biosphere * scaling)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{self, SqliteStore};
    use crate::matrix;
    use crate::models::{Flow, FlowKind, Process};
    use rusqlite::Connection;

    fn add_process(conn: &Connection, id: &str) {
        db::upsert_process(
            conn,
            &Process {
                id: id.into(),
                name: format!("{} process", id),
                location: "GLO".into(),
                dataset: "demo".into(),
            },
        )
        .unwrap();
    }

    fn add_flow(conn: &Connection, process: &str, target: &str, amount: f64, kind: FlowKind) {
        db::insert_exchange(
            conn,
            &Flow {
                process_id: process.into(),
                target_id: target.into(),
                amount,
                kind,
            },
        )
        .unwrap();
    }

    fn memory_db() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        db::init_schema(&conn).unwrap();
        conn
    }

    fn two_process_matrices(conn: &Connection) -> crate::matrix::SystemMatrices {
        add_process(conn, "p1");
        add_process(conn, "p2");
        add_flow(conn, "p1", "p1", 1.0, FlowKind::Production);
        add_flow(conn, "p1", "p2", 2.0, FlowKind::Technosphere);
        add_flow(conn, "p2", "p2", 1.0, FlowKind::Production);
        add_flow(conn, "p2", "e", 5.0, FlowKind::Biosphere);
        let store = SqliteStore::new(conn);
        matrix::build(&store, &["p1".to_string()]).unwrap()
    }

    #[test]
    fn scaling_vector_for_reference_system() {
        let conn = memory_db();
        let matrices = two_process_matrices(&conn);
        let mut cache = FactorizationCache::new();

        let factorization = cache.factorization(&matrices);
        let s = solve(factorization, &matrices, &Demand::single("p1", 1.0)).unwrap();

        let i1 = matrices.processes.get("p1").unwrap();
        let i2 = matrices.processes.get("p2").unwrap();
        assert!((s[i1] - 1.0).abs() < 1e-12);
        assert!((s[i2] - 2.0).abs() < 1e-12);

        let g = inventory(&matrices, &s).unwrap();
        let ie = matrices.elementary.get("e").unwrap();
        assert!((g[ie] - 10.0).abs() < 1e-12);
    }

    #[test]
    fn factorization_is_reused_across_solves() {
        let conn = memory_db();
        let matrices = two_process_matrices(&conn);
        let mut cache = FactorizationCache::new();

        for amount in [1.0, 2.0, 3.0] {
            let factorization = cache.factorization(&matrices);
            solve(factorization, &matrices, &Demand::single("p1", amount)).unwrap();
        }
        assert_eq!(cache.builds(), 1);
    }

    #[test]
    fn cache_rebuilds_on_new_revision() {
        let conn = memory_db();
        let matrices = two_process_matrices(&conn);
        let store = SqliteStore::new(&conn);
        let rebuilt = matrix::build(&store, &["p1".to_string()]).unwrap();

        let mut cache = FactorizationCache::new();
        cache.factorization(&matrices);
        cache.factorization(&rebuilt);
        assert_eq!(cache.builds(), 2);
    }

    #[test]
    fn cache_alternates_between_revisions() {
        let conn = memory_db();
        let matrices = two_process_matrices(&conn);
        let store = SqliteStore::new(&conn);
        let rebuilt = matrix::build(&store, &["p1".to_string()]).unwrap();

        let mut cache = FactorizationCache::new();
        // Each revision change invalidates the single cached entry; a
        // repeat of the same revision reuses it.
        solve(
            cache.factorization(&matrices),
            &matrices,
            &Demand::single("p1", 1.0),
        )
        .unwrap();
        solve(
            cache.factorization(&rebuilt),
            &rebuilt,
            &Demand::single("p1", 1.0),
        )
        .unwrap();
        solve(
            cache.factorization(&rebuilt),
            &rebuilt,
            &Demand::single("p1", 2.0),
        )
        .unwrap();
        solve(
            cache.factorization(&matrices),
            &matrices,
            &Demand::single("p1", 3.0),
        )
        .unwrap();
        assert_eq!(cache.builds(), 3);
    }

    #[test]
    fn stale_factorization_is_rejected() {
        let conn = memory_db();
        let matrices = two_process_matrices(&conn);
        let store = SqliteStore::new(&conn);
        let rebuilt = matrix::build(&store, &["p1".to_string()]).unwrap();

        let mut cache = FactorizationCache::new();
        let factorization = cache.factorization(&matrices);
        assert!(matches!(
            solve(factorization, &rebuilt, &Demand::single("p1", 1.0)),
            Err(EngineError::StaleFactorization { .. })
        ));
    }

    #[test]
    fn unknown_demand_id_is_demand_index_error() {
        let conn = memory_db();
        let matrices = two_process_matrices(&conn);
        let mut cache = FactorizationCache::new();

        let factorization = cache.factorization(&matrices);
        assert!(matches!(
            solve(factorization, &matrices, &Demand::single("ghost", 1.0)),
            Err(EngineError::DemandIndex(id)) if id == "ghost"
        ));
    }

    #[test]
    fn singular_matrix_is_reported() {
        // Two processes that each consume exactly one unit of the other:
        // A = [[1, -1], [-1, 1]], determinant 0.
        let conn = memory_db();
        add_process(&conn, "p1");
        add_process(&conn, "p2");
        add_flow(&conn, "p1", "p1", 1.0, FlowKind::Production);
        add_flow(&conn, "p1", "p2", 1.0, FlowKind::Technosphere);
        add_flow(&conn, "p2", "p2", 1.0, FlowKind::Production);
        add_flow(&conn, "p2", "p1", 1.0, FlowKind::Technosphere);
        let store = SqliteStore::new(&conn);
        let matrices = matrix::build(&store, &["p1".to_string()]).unwrap();

        let mut cache = FactorizationCache::new();
        let factorization = cache.factorization(&matrices);
        assert!(matches!(
            solve(factorization, &matrices, &Demand::single("p1", 1.0)),
            Err(EngineError::SingularMatrix)
        ));
    }

    #[test]
    fn inventory_rejects_wrong_dimension() {
        let conn = memory_db();
        let matrices = two_process_matrices(&conn);
        let short = DVector::zeros(1);
        assert!(matches!(
            inventory(&matrices, &short),
            Err(EngineError::DimensionMismatch { .. })
        ));
    }
}
