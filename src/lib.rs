//! # schemaguard
//!
//! Safe-migration simulation engine for Postgres-flavored DDL. Given a schema
//! snapshot and a migration script, the engine simulates the script against an
//! in-memory copy of the schema and reports what would change, what breaks,
//! what locks it takes, how risky it is, how to run it safely, and how to
//! roll it back. No database connection is involved; everything runs on the
//! snapshot.
//!
//! ```no_run
//! use schemaguard::config::{Environment, Settings};
//! use schemaguard::pipeline::SafeMigrationEngine;
//! use serde_json::json;
//!
//! let engine = SafeMigrationEngine::new(Settings::new());
//! let payload = json!({"schemas": [{"name": "public", "tables": []}]});
//! let outcome = engine.simulate_payload(
//!     payload,
//!     "CREATE TABLE users (id int PRIMARY KEY);",
//!     Environment::Staging,
//! );
//! assert!(outcome.ok);
//! ```

pub mod analysis;
pub mod config;
pub mod error;
pub mod parser;
pub mod pipeline;
pub mod simulation;
pub mod snapshot;

pub use config::{Environment, Settings};
pub use error::{EngineError, EngineResult};
pub use pipeline::{SafeMigrationEngine, SafeMigrationSimulation, SimulationOutcome};
