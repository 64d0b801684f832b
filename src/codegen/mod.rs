//! Code generation
//!
//! This module turns an introspected [`Schema`] into data access source code.

use std::fs;
use std::path::Path;

use tracing::debug;

use crate::prelude::{DalgenError, Schema};

pub mod csharp;

pub use csharp::CSharpGenerator;

/// Trait for language-specific code generators
pub trait CodeGenerator {
    /// Generate the complete output text for the given schema
    fn generate(&self, schema: &Schema) -> Result<String, DalgenError>;
}

/// Write generated code, creating the parent directory if needed
pub fn write_output(path: &Path, code: &str) -> Result<(), DalgenError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
            debug!(path = ?parent, "Ensured output directory");
        }
    }
    fs::write(path, code)?;
    Ok(())
}
