#![forbid(unsafe_code)]

//! Core domain model and business logic for the Pedidose calculator.
//!
//! This crate provides:
//! - Domain types (medications, overrides, default edits, results)
//! - The sandboxed dose formula evaluator
//! - The built-in medication catalog
//! - Override resolution and the dose engine
//! - Persistence (override store, calculation journal, CSV export)

pub mod types;
pub mod error;
pub mod formula;
pub mod catalog;
pub mod config;
pub mod logging;
pub mod store;
pub mod resolver;
pub mod engine;
pub mod journal;
pub mod export;

// Re-export commonly used types
pub use error::{Error, Result};
pub use types::*;
pub use catalog::{build_default_catalog, get_default_catalog};
pub use config::Config;
pub use formula::{Bindings, FormulaError};
pub use store::{AdminStore, FileStore, MemoryStore};
pub use resolver::{find_default_edit, resolve};
pub use engine::DoseEngine;
pub use journal::{JsonlSink, RecordSink};
