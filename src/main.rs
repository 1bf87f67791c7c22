//! LCA Calculator
//!
//! A life cycle impact assessment calculator: stores a product system
//! (processes and exchanges) plus impact-assessment methods in SQLite and
//! computes impact scores for functional demands.

mod characterize;
mod db;
mod errors;
mod evaluate;
mod import;
mod matrix;
mod models;
mod solver;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use rusqlite::Connection;

use crate::db::{MethodRegistry, ProcessStore, SqliteStore};
use crate::evaluate::Evaluator;
use crate::models::{Demand, MethodKey};

#[derive(Parser)]
#[command(name = "lca-calculator")]
#[command(about = "Life cycle impact assessment calculator")]
struct Cli {
    /// Path to the SQLite database
    #[arg(short, long, default_value = "lca_data.db")]
    database: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Import a product system from a JSON file
    Import {
        /// Path to the system JSON document
        file: PathBuf,

        /// Clear existing data before import
        #[arg(long)]
        clear: bool,
    },

    /// Compute impact scores for one or more demands
    Evaluate {
        /// Demand as "process_id=amount" or "id1=a1,id2=a2" (repeatable)
        #[arg(short = 'f', long = "demand", required = true)]
        demands: Vec<String>,

        /// Method as "family | category | indicator" (repeatable)
        #[arg(short, long = "method", required = true)]
        methods: Vec<String>,

        /// Show reuse statistics alongside the scores
        #[arg(short, long)]
        verbose: bool,
    },

    /// List all processes in the database
    ListProcesses,

    /// List all impact-assessment methods
    ListMethods,

    /// Show details for a specific process
    Process {
        /// Process ID
        id: String,
    },

    /// Initialize empty database with schema
    Init,

    /// Load a small sample product system for testing
    LoadSample,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let conn = Connection::open(&cli.database)?;
    db::init_schema(&conn)?;

    match cli.command {
        Commands::Import { file, clear } => {
            if clear {
                println!("Clearing existing data...");
                db::clear_data(&conn)?;
            }

            let stats = import::import_file(&conn, &file)?;
            println!("\n{}", stats);
        }

        Commands::Evaluate {
            demands,
            methods,
            verbose,
        } => {
            let demands: Vec<Demand> = demands
                .iter()
                .map(|s| Demand::parse(s))
                .collect::<Result<_, _>>()?;
            let methods: Vec<MethodKey> = methods
                .iter()
                .map(|s| MethodKey::parse(s))
                .collect::<Result<_, _>>()?;

            let store = SqliteStore::new(&conn);
            let evaluator = Evaluator::new(&store, &store);
            let report = evaluator.evaluate(&demands, &methods)?;

            println!("{}", report.results);
            if verbose {
                println!(
                    "Factorizations: {}, solves: {}, characterization matrices: {}",
                    report.stats.factorizations,
                    report.stats.solves,
                    report.stats.characterization_builds
                );
            }
        }

        Commands::ListProcesses => {
            let processes = db::list_processes(&conn)?;
            if processes.is_empty() {
                println!("No processes in database. Run 'import' or 'load-sample' first.");
            } else {
                println!("{:<24} {:<30} {:<8} {}", "ID", "Name", "Location", "Dataset");
                println!("{}", "-".repeat(72));
                for p in processes {
                    println!("{:<24} {:<30} {:<8} {}", p.id, p.name, p.location, p.dataset);
                }
            }
        }

        Commands::ListMethods => {
            let store = SqliteStore::new(&conn);
            let methods = store.list_methods()?;
            if methods.is_empty() {
                println!("No methods in database. Run 'import' or 'load-sample' first.");
            } else {
                println!("Impact-assessment methods:");
                for key in methods {
                    println!("  {}", key);
                }
            }
        }

        Commands::Process { id } => {
            let store = SqliteStore::new(&conn);
            let process = store.resolve(&id)?;
            println!("Process: {}", process.name);
            println!("  ID: {}", process.id);
            println!("  Location: {}", process.location);
            println!("  Dataset: {}", process.dataset);

            let exchanges = store.outgoing_exchanges(&id)?;
            if !exchanges.is_empty() {
                println!("  Exchanges:");
                for flow in exchanges {
                    println!(
                        "    {:<13} {} @ {}",
                        flow.kind.as_str(),
                        flow.target_id,
                        flow.amount
                    );
                }
            }
        }

        Commands::Init => {
            println!("Database initialized at: {}", cli.database.display());
        }

        Commands::LoadSample => {
            load_sample_data(&conn)?;
            println!("Sample data loaded successfully!");
        }
    }

    Ok(())
}

/// Load a small steel-production system with two impact methods
fn load_sample_data(conn: &Connection) -> Result<()> {
    use crate::models::{Flow, FlowKind, Process};

    db::clear_data(conn)?;

    let processes = [
        ("electricity", "electricity production, grid mix", "RER"),
        ("pig-iron", "pig iron production, blast furnace", "RER"),
        ("steel", "steel production, converter", "RER"),
        ("transport", "transport, freight, lorry", "RER"),
    ];
    for (id, name, location) in processes {
        db::upsert_process(
            conn,
            &Process {
                id: id.to_string(),
                name: name.to_string(),
                location: location.to_string(),
                dataset: "sample".to_string(),
            },
        )?;
    }

    // (process, target, amount, kind); amounts per unit of reference output.
    let exchanges = [
        ("electricity", "electricity", 1.0, FlowKind::Production),
        ("electricity", "co2", 0.42, FlowKind::Biosphere),
        ("electricity", "ch4", 0.0008, FlowKind::Biosphere),
        ("electricity", "so2", 0.0011, FlowKind::Biosphere),
        ("pig-iron", "pig-iron", 1.0, FlowKind::Production),
        ("pig-iron", "electricity", 0.35, FlowKind::Technosphere),
        ("pig-iron", "transport", 0.12, FlowKind::Technosphere),
        ("pig-iron", "co2", 1.6, FlowKind::Biosphere),
        ("steel", "steel", 1.0, FlowKind::Production),
        ("steel", "pig-iron", 0.94, FlowKind::Technosphere),
        ("steel", "electricity", 0.6, FlowKind::Technosphere),
        ("steel", "co2", 0.23, FlowKind::Biosphere),
        ("steel", "so2", 0.0004, FlowKind::Biosphere),
        ("transport", "transport", 1.0, FlowKind::Production),
        ("transport", "co2", 0.062, FlowKind::Biosphere),
        ("transport", "ch4", 0.0001, FlowKind::Biosphere),
    ];
    for (process, target, amount, kind) in exchanges {
        db::insert_exchange(
            conn,
            &Flow {
                process_id: process.to_string(),
                target_id: target.to_string(),
                amount,
                kind,
            },
        )?;
    }

    let gwp = MethodKey::new("IPCC 2021", "climate change", "GWP 100a");
    db::upsert_method(conn, &gwp)?;
    db::upsert_factor(conn, &gwp, "co2", 1.0)?;
    db::upsert_factor(conn, &gwp, "ch4", 29.8)?;

    let acid = MethodKey::new("ReCiPe 2016", "acidification", "SO2 eq");
    db::upsert_method(conn, &acid)?;
    db::upsert_factor(conn, &acid, "so2", 1.0)?;

    println!("Loaded {} sample processes and 2 methods", processes.len());
    Ok(())
}
