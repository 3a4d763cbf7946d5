//! Error types for the dose_core library.

use std::io;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for dose_core operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// IO error occurred
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// CSV error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// TOML parsing error
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Configuration validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Catalog validation error
    #[error("Catalog validation error: {0}")]
    CatalogValidation(String),

    /// Override/default-edit store error
    #[error("Store error: {0}")]
    Store(String),

    /// Dose formula failed to parse or evaluate
    #[error("Formula error: {0}")]
    Formula(#[from] crate::formula::FormulaError),

    /// No override, default edit, or built-in rule matched the medication
    #[error("Medication not found: {name}")]
    MedicationNotFound { name: String },

    /// Generic error
    #[error("{0}")]
    Other(String),
}
