//! Characterization of inventories into impact scores
//!
//! Each method key resolves to a characterization matrix with one row per
//! impact category over the session's elementary-flow index (the registry
//! yields one category per 3-part key, so the built matrix has a single
//! row; the matrix form is kept so multi-category methods slot in without
//! touching the callers). Matrices are cached per method key for the
//! lifetime of an evaluation session and pinned to the matrix revision they
//! were indexed against.

use std::collections::HashMap;

use nalgebra::{DMatrix, DVector};

use crate::db::MethodRegistry;
use crate::errors::EngineError;
use crate::matrix::SystemMatrices;
use crate::models::MethodKey;

/// Build the characterization matrix for one method over a given
/// elementary-flow index. Factors for flows absent from the index carry no
/// weight in this system and are dropped; indexed flows without a factor
/// stay at zero.
pub fn build_characterization(
    registry: &dyn MethodRegistry,
    matrices: &SystemMatrices,
    key: &MethodKey,
) -> Result<DMatrix<f64>, EngineError> {
    if !registry.method_exists(key)? {
        return Err(EngineError::MethodNotFound(key.clone()));
    }
    let factors = registry.characterization_factors(key)?;

    let mut c = DMatrix::zeros(1, matrices.elementary.len());
    for (flow_id, factor) in factors {
        if let Some(col) = matrices.elementary.get(&flow_id) {
            c[(0, col)] = factor;
        }
    }
    Ok(c)
}

/// Per-category scores for one inventory: each row of C dotted with g.
pub fn characterize(c: &DMatrix<f64>, g: &DVector<f64>) -> Result<DVector<f64>, EngineError> {
    if c.ncols() != g.len() {
        return Err(EngineError::DimensionMismatch {
            context: "characterize",
            left: c.ncols(),
            right: g.len(),
        });
    }
    Ok(c * g)
}

/// Session-scoped cache of characterization matrices, keyed by method and
/// valid for a single matrix revision.
pub struct CharacterizationCache {
    revision: u64,
    matrices: HashMap<MethodKey, DMatrix<f64>>,
    builds: usize,
}

impl CharacterizationCache {
    pub fn new(revision: u64) -> Self {
        CharacterizationCache {
            revision,
            matrices: HashMap::new(),
            builds: 0,
        }
    }

    /// The characterization matrix for `key`, built on first request.
    pub fn matrix(
        &mut self,
        registry: &dyn MethodRegistry,
        matrices: &SystemMatrices,
        key: &MethodKey,
    ) -> Result<&DMatrix<f64>, EngineError> {
        if matrices.revision != self.revision {
            // Flow indices changed under us; cached rows are meaningless.
            self.matrices.clear();
            self.revision = matrices.revision;
        }
        if !self.matrices.contains_key(key) {
            let c = build_characterization(registry, matrices, key)?;
            self.matrices.insert(key.clone(), c);
            self.builds += 1;
        }
        Ok(&self.matrices[key])
    }

    /// Number of characterization matrices built so far.
    pub fn builds(&self) -> usize {
        self.builds
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{self, SqliteStore};
    use crate::matrix;
    use crate::models::{Flow, FlowKind, Process};
    use rusqlite::Connection;

    fn memory_db() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        db::init_schema(&conn).unwrap();
        conn
    }

    fn system_with_method(conn: &Connection) -> (crate::matrix::SystemMatrices, MethodKey) {
        db::upsert_process(
            conn,
            &Process {
                id: "p1".into(),
                name: "p1".into(),
                location: "GLO".into(),
                dataset: "demo".into(),
            },
        )
        .unwrap();
        db::insert_exchange(
            conn,
            &Flow {
                process_id: "p1".into(),
                target_id: "p1".into(),
                amount: 1.0,
                kind: FlowKind::Production,
            },
        )
        .unwrap();
        db::insert_exchange(
            conn,
            &Flow {
                process_id: "p1".into(),
                target_id: "e".into(),
                amount: 5.0,
                kind: FlowKind::Biosphere,
            },
        )
        .unwrap();

        let key = MethodKey::new("demo", "climate change", "GWP");
        db::upsert_method(conn, &key).unwrap();
        db::upsert_factor(conn, &key, "e", 3.0).unwrap();
        // A factor for a flow this system never emits.
        db::upsert_factor(conn, &key, "elsewhere", 99.0).unwrap();

        let store = SqliteStore::new(conn);
        let matrices = matrix::build(&store, &["p1".to_string()]).unwrap();
        (matrices, key)
    }

    #[test]
    fn builds_row_over_session_flow_index() {
        let conn = memory_db();
        let (matrices, key) = system_with_method(&conn);
        let store = SqliteStore::new(&conn);

        let c = build_characterization(&store, &matrices, &key).unwrap();
        assert_eq!(c.nrows(), 1);
        assert_eq!(c.ncols(), matrices.elementary.len());
        let ie = matrices.elementary.get("e").unwrap();
        assert_eq!(c[(0, ie)], 3.0);
    }

    #[test]
    fn unknown_method_is_not_found() {
        let conn = memory_db();
        let (matrices, _) = system_with_method(&conn);
        let store = SqliteStore::new(&conn);

        let missing = MethodKey::new("no", "such", "method");
        assert!(matches!(
            build_characterization(&store, &matrices, &missing),
            Err(EngineError::MethodNotFound(key)) if key == missing
        ));
    }

    #[test]
    fn characterize_weights_inventory() {
        let conn = memory_db();
        let (matrices, key) = system_with_method(&conn);
        let store = SqliteStore::new(&conn);

        let c = build_characterization(&store, &matrices, &key).unwrap();
        let g = DVector::from_element(matrices.elementary.len(), 10.0);
        let scores = characterize(&c, &g).unwrap();
        assert_eq!(scores.len(), 1);
        assert!((scores.sum() - 30.0).abs() < 1e-12);
    }

    #[test]
    fn characterize_rejects_wrong_dimension() {
        let c = DMatrix::zeros(1, 3);
        let g = DVector::zeros(2);
        assert!(matches!(
            characterize(&c, &g),
            Err(EngineError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn cache_builds_each_method_once() {
        let conn = memory_db();
        let (matrices, key) = system_with_method(&conn);
        let store = SqliteStore::new(&conn);

        let mut cache = CharacterizationCache::new(matrices.revision);
        cache.matrix(&store, &matrices, &key).unwrap();
        cache.matrix(&store, &matrices, &key).unwrap();
        assert_eq!(cache.builds(), 1);
    }

    #[test]
    fn cache_invalidates_on_revision_change() {
        let conn = memory_db();
        let (matrices, key) = system_with_method(&conn);
        let store = SqliteStore::new(&conn);
        let rebuilt = matrix::build(&store, &["p1".to_string()]).unwrap();

        let mut cache = CharacterizationCache::new(matrices.revision);
        cache.matrix(&store, &matrices, &key).unwrap();
        cache.matrix(&store, &rebuilt, &key).unwrap();
        assert_eq!(cache.builds(), 2);
    }
}
