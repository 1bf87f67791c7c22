//! Database schema, store operations, and the collaborator traits the
//! engine consumes
//!
//! The computation core never talks to SQLite directly; it goes through
//! [`ProcessStore`] and [`MethodRegistry`], both implemented here by
//! [`SqliteStore`]. The core never mutates the store.

use std::collections::HashMap;

use rusqlite::{Connection, OptionalExtension, params};

use crate::errors::EngineError;
use crate::models::{Flow, FlowKind, MethodKey, Process};

/// Read-only view of the process graph.
pub trait ProcessStore {
    fn resolve(&self, process_id: &str) -> Result<Process, EngineError>;
    fn outgoing_exchanges(&self, process_id: &str) -> Result<Vec<Flow>, EngineError>;
    fn exists(&self, process_id: &str) -> Result<bool, EngineError>;
}

/// Read-only view of the impact-assessment method registry.
pub trait MethodRegistry {
    fn list_methods(&self) -> Result<Vec<MethodKey>, EngineError>;
    fn characterization_factors(
        &self,
        key: &MethodKey,
    ) -> Result<HashMap<String, f64>, EngineError>;
    fn method_exists(&self, key: &MethodKey) -> Result<bool, EngineError>;
}

/// Initialize the database schema
pub fn init_schema(conn: &Connection) -> Result<(), EngineError> {
    conn.execute_batch(
        r#"
        -- Processes (technosphere nodes)
        CREATE TABLE IF NOT EXISTS processes (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            location TEXT NOT NULL,
            dataset TEXT NOT NULL
        );

        -- Exchanges owned by a process: production (reference output),
        -- technosphere (input from another process) or biosphere
        -- (elementary flow to/from the environment)
        CREATE TABLE IF NOT EXISTS exchanges (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            process_id TEXT NOT NULL,
            target_id TEXT NOT NULL,
            amount REAL NOT NULL,
            kind TEXT NOT NULL
        );

        -- Impact-assessment methods, keyed by (family, category, indicator)
        CREATE TABLE IF NOT EXISTS methods (
            family TEXT NOT NULL,
            category TEXT NOT NULL,
            indicator TEXT NOT NULL,
            PRIMARY KEY (family, category, indicator)
        );

        -- Characterization factors per method and elementary flow
        CREATE TABLE IF NOT EXISTS characterization_factors (
            family TEXT NOT NULL,
            category TEXT NOT NULL,
            indicator TEXT NOT NULL,
            flow_id TEXT NOT NULL,
            factor REAL NOT NULL,
            PRIMARY KEY (family, category, indicator, flow_id)
        );

        CREATE INDEX IF NOT EXISTS idx_exchanges_process ON exchanges(process_id);
        CREATE INDEX IF NOT EXISTS idx_factors_method
            ON characterization_factors(family, category, indicator);
        "#,
    )?;
    Ok(())
}

/// Insert or replace a process
pub fn upsert_process(conn: &Connection, process: &Process) -> Result<(), EngineError> {
    conn.execute(
        "INSERT OR REPLACE INTO processes (id, name, location, dataset)
         VALUES (?1, ?2, ?3, ?4)",
        (
            &process.id,
            &process.name,
            &process.location,
            &process.dataset,
        ),
    )?;
    Ok(())
}

/// Insert an exchange
pub fn insert_exchange(conn: &Connection, flow: &Flow) -> Result<(), EngineError> {
    conn.execute(
        "INSERT INTO exchanges (process_id, target_id, amount, kind)
         VALUES (?1, ?2, ?3, ?4)",
        (
            &flow.process_id,
            &flow.target_id,
            flow.amount,
            flow.kind.as_str(),
        ),
    )?;
    Ok(())
}

/// Insert or replace a method
pub fn upsert_method(conn: &Connection, key: &MethodKey) -> Result<(), EngineError> {
    conn.execute(
        "INSERT OR REPLACE INTO methods (family, category, indicator)
         VALUES (?1, ?2, ?3)",
        (&key.family, &key.category, &key.indicator),
    )?;
    Ok(())
}

/// Insert or replace a characterization factor for a method
pub fn upsert_factor(
    conn: &Connection,
    key: &MethodKey,
    flow_id: &str,
    factor: f64,
) -> Result<(), EngineError> {
    conn.execute(
        "INSERT OR REPLACE INTO characterization_factors
             (family, category, indicator, flow_id, factor)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![&key.family, &key.category, &key.indicator, flow_id, factor],
    )?;
    Ok(())
}

/// Clear all imported data (for re-import)
pub fn clear_data(conn: &Connection) -> Result<(), EngineError> {
    conn.execute_batch(
        r#"
        DELETE FROM characterization_factors;
        DELETE FROM methods;
        DELETE FROM exchanges;
        DELETE FROM processes;
        "#,
    )?;
    Ok(())
}

/// List all processes, ordered by name
pub fn list_processes(conn: &Connection) -> Result<Vec<Process>, EngineError> {
    let mut stmt =
        conn.prepare("SELECT id, name, location, dataset FROM processes ORDER BY name")?;
    let rows = stmt.query_map([], |row| {
        Ok(Process {
            id: row.get(0)?,
            name: row.get(1)?,
            location: row.get(2)?,
            dataset: row.get(3)?,
        })
    })?;

    let mut results = Vec::new();
    for row in rows {
        results.push(row?);
    }
    Ok(results)
}

/// SQLite-backed implementation of both collaborator traits.
pub struct SqliteStore<'a> {
    conn: &'a Connection,
}

impl<'a> SqliteStore<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        SqliteStore { conn }
    }
}

impl ProcessStore for SqliteStore<'_> {
    fn resolve(&self, process_id: &str) -> Result<Process, EngineError> {
        let process = self
            .conn
            .prepare("SELECT id, name, location, dataset FROM processes WHERE id = ?1")?
            .query_row([process_id], |row| {
                Ok(Process {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    location: row.get(2)?,
                    dataset: row.get(3)?,
                })
            })
            .optional()?;
        process.ok_or_else(|| EngineError::ProcessNotFound(process_id.to_string()))
    }

    fn outgoing_exchanges(&self, process_id: &str) -> Result<Vec<Flow>, EngineError> {
        let mut stmt = self.conn.prepare(
            "SELECT process_id, target_id, amount, kind
             FROM exchanges
             WHERE process_id = ?1
             ORDER BY id",
        )?;
        let rows = stmt.query_map([process_id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, f64>(2)?,
                row.get::<_, String>(3)?,
            ))
        })?;

        let mut flows = Vec::new();
        for row in rows {
            let (process_id, target_id, amount, kind) = row?;
            flows.push(Flow {
                process_id,
                target_id,
                amount,
                kind: FlowKind::parse(&kind)?,
            });
        }
        Ok(flows)
    }

    fn exists(&self, process_id: &str) -> Result<bool, EngineError> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM processes WHERE id = ?1",
            [process_id],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }
}

impl MethodRegistry for SqliteStore<'_> {
    fn list_methods(&self) -> Result<Vec<MethodKey>, EngineError> {
        let mut stmt = self.conn.prepare(
            "SELECT family, category, indicator FROM methods
             ORDER BY family, category, indicator",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(MethodKey {
                family: row.get(0)?,
                category: row.get(1)?,
                indicator: row.get(2)?,
            })
        })?;

        let mut results = Vec::new();
        for row in rows {
            results.push(row?);
        }
        Ok(results)
    }

    fn characterization_factors(
        &self,
        key: &MethodKey,
    ) -> Result<HashMap<String, f64>, EngineError> {
        let mut stmt = self.conn.prepare(
            "SELECT flow_id, factor FROM characterization_factors
             WHERE family = ?1 AND category = ?2 AND indicator = ?3",
        )?;
        let rows = stmt.query_map([&key.family, &key.category, &key.indicator], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, f64>(1)?))
        })?;

        let mut factors = HashMap::new();
        for row in rows {
            let (flow_id, factor) = row?;
            factors.insert(flow_id, factor);
        }
        Ok(factors)
    }

    fn method_exists(&self, key: &MethodKey) -> Result<bool, EngineError> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM methods
             WHERE family = ?1 AND category = ?2 AND indicator = ?3",
            [&key.family, &key.category, &key.indicator],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }
}
