//! # dalgen
//!
//! Generate a C# data access layer from a SQL Server catalog
//!
//! This crate provides a CLI tool and library for reading table, view and stored
//! procedure metadata and generating typed wrapper classes for them.

pub mod codegen;
pub mod config;
pub mod defaults;
pub mod error;
pub mod introspect;
pub mod params;
pub mod sanitize;
pub mod schema;
pub mod typemap;

pub mod prelude {
    pub use crate::codegen::{write_output, CSharpGenerator, CodeGenerator};
    pub use crate::config::DbConfig;
    pub use crate::error::DalgenError;
    pub use crate::introspect::{CatalogIntrospector, Introspector, MemoryCatalog, TableFilter};
    pub use crate::params::GenerationParameters;
    pub use crate::schema::{Schema, StoredProcedure, Table};
    pub use crate::typemap::TypeMap;
}

#[cfg(feature = "mssql")]
pub use introspect::MssqlCatalog;
