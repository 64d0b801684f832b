use std::path::PathBuf;

use thiserror::Error;

/// dalgen errors
#[derive(Error, Debug)]
pub enum DalgenError {
    #[error("No type mapping for '{db_type}' ({context})")]
    UnmappedType { db_type: String, context: String },

    #[error("No key column found in '{table}' while building {statement} statement")]
    NoKeyColumnFound { table: String, statement: String },

    #[error("Sample execution of '{procedure}' failed: {message}")]
    SampleExecutionFailed { procedure: String, message: String },

    #[error("Settings file not found: {}", .0.display())]
    ConfigFileMissing(PathBuf),

    #[error("Failed to connect to database: {0}")]
    CatalogConnectionFailed(String),

    #[error("Failed to read catalog object '{object}': {message}")]
    Catalog { object: String, message: String },

    #[error("Code generation failed for '{object}': {message}")]
    CodeGen { object: String, message: String },

    #[error("Failed to write output: {0}")]
    Output(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl DalgenError {
    /// Whether this error aborts the whole run rather than a single catalog item
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            DalgenError::Catalog { .. }
                | DalgenError::SampleExecutionFailed { .. }
                | DalgenError::NoKeyColumnFound { .. }
        )
    }
}
