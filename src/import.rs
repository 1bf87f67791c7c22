//! JSON product-system import
//!
//! Loads a whole product system (processes with their exchanges, methods
//! with their characterization factors) from a JSON document into the
//! store. This is the local stand-in for pulling a release from a remote
//! catalog.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use rusqlite::Connection;
use serde::Deserialize;

use crate::db;
use crate::models::{Flow, FlowKind, MethodKey, Process};

#[derive(Debug, Deserialize)]
struct ProcessDoc {
    id: String,
    name: String,
    location: String,
    dataset: String,
    #[serde(default)]
    exchanges: Vec<ExchangeDoc>,
}

#[derive(Debug, Deserialize)]
struct ExchangeDoc {
    target: String,
    amount: f64,
    kind: String,
}

#[derive(Debug, Deserialize)]
struct MethodDoc {
    family: String,
    category: String,
    indicator: String,
    #[serde(default)]
    factors: BTreeMap<String, f64>,
}

#[derive(Debug, Deserialize)]
struct SystemDoc {
    #[serde(default)]
    processes: Vec<ProcessDoc>,
    #[serde(default)]
    methods: Vec<MethodDoc>,
}

/// Counts of imported rows
#[derive(Debug, Default)]
pub struct ImportStats {
    pub processes: usize,
    pub exchanges: usize,
    pub methods: usize,
    pub factors: usize,
}

impl fmt::Display for ImportStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Import Summary ===")?;
        writeln!(f, "Processes: {}", self.processes)?;
        writeln!(f, "Exchanges: {}", self.exchanges)?;
        writeln!(f, "Methods:   {}", self.methods)?;
        writeln!(f, "Factors:   {}", self.factors)?;
        Ok(())
    }
}

/// Import a product system from a JSON file into the database
pub fn import_file(conn: &Connection, path: &Path) -> Result<ImportStats> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    import_str(conn, &content)
}

/// Import a product system from a JSON string into the database
pub fn import_str(conn: &Connection, json: &str) -> Result<ImportStats> {
    let doc: SystemDoc = serde_json::from_str(json).context("Failed to parse system JSON")?;
    let mut stats = ImportStats::default();

    for process_doc in &doc.processes {
        db::upsert_process(
            conn,
            &Process {
                id: process_doc.id.clone(),
                name: process_doc.name.clone(),
                location: process_doc.location.clone(),
                dataset: process_doc.dataset.clone(),
            },
        )?;
        stats.processes += 1;

        for exchange in &process_doc.exchanges {
            db::insert_exchange(
                conn,
                &Flow {
                    process_id: process_doc.id.clone(),
                    target_id: exchange.target.clone(),
                    amount: exchange.amount,
                    kind: FlowKind::parse(&exchange.kind)
                        .with_context(|| format!("process '{}'", process_doc.id))?,
                },
            )?;
            stats.exchanges += 1;
        }
    }

    for method_doc in &doc.methods {
        let key = MethodKey::new(
            method_doc.family.clone(),
            method_doc.category.clone(),
            method_doc.indicator.clone(),
        );
        db::upsert_method(conn, &key)?;
        stats.methods += 1;
        for (flow_id, factor) in &method_doc.factors {
            db::upsert_factor(conn, &key, flow_id, *factor)?;
            stats.factors += 1;
        }
    }

    Ok(stats)
}
