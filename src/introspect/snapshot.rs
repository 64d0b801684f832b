//! In-memory catalog loaded from a YAML snapshot
//!
//! A snapshot describes tables, views and stored procedures the same way a live
//! catalog reports them, including the result shape a sample execution would
//! capture. Used for offline generation and in tests.

use std::cell::Cell;
use std::path::Path;
use std::rc::Rc;
use std::time::Duration;

use indexmap::IndexMap;
use serde::Deserialize;
use tracing::{debug, error, trace};

use super::{CatalogReader, SampleSession};
use crate::error::DalgenError;
use crate::schema::{RawField, RawParameter, SampleResult};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CatalogSnapshot {
    pub tables: Vec<TableSnapshot>,
    pub views: Vec<TableSnapshot>,
    pub procedures: Vec<ProcedureSnapshot>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TableSnapshot {
    pub name: String,
    #[serde(default)]
    pub fields: Vec<RawField>,
    #[serde(default)]
    pub primary_key: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProcedureSnapshot {
    pub name: String,
    #[serde(default)]
    pub parameters: Vec<RawParameter>,
    #[serde(default)]
    pub definition: Option<String>,
    /// Result shape returned when the procedure is sampled
    #[serde(default)]
    pub sample: Option<SampleResult>,
    /// Error raised when the procedure is sampled
    #[serde(default)]
    pub sample_error: Option<String>,
    /// Error raised when the procedure metadata is read
    #[serde(default)]
    pub error: Option<String>,
}

impl CatalogSnapshot {
    pub fn load(path: &Path) -> Result<Self, DalgenError> {
        if !path.exists() {
            error!(path = ?path, "Catalog snapshot not found");
            return Err(DalgenError::CatalogConnectionFailed(format!(
                "snapshot {} does not exist",
                path.display()
            )));
        }

        debug!(path = ?path, "Loading catalog snapshot");
        let text = std::fs::read_to_string(path).map_err(|e| {
            error!(path = ?path, error = %e, "Failed to read catalog snapshot");
            DalgenError::CatalogConnectionFailed(format!("failed to read snapshot {}: {}", path.display(), e))
        })?;
        Self::from_yaml_str(&text)
    }

    pub fn from_yaml_str(text: &str) -> Result<Self, DalgenError> {
        serde_yaml::from_str(text)
            .map_err(|e| DalgenError::CatalogConnectionFailed(format!("invalid snapshot: {}", e)))
    }
}

type SampleOutcome = Result<SampleResult, String>;

/// Catalog reader backed by a [`CatalogSnapshot`]
///
/// Objects are listed in snapshot order. Rollbacks performed by sample sessions
/// are counted and available through [`MemoryCatalog::rollbacks`].
#[derive(Debug)]
pub struct MemoryCatalog {
    tables: IndexMap<String, TableSnapshot>,
    views: IndexMap<String, TableSnapshot>,
    procedures: IndexMap<String, ProcedureSnapshot>,
    samples: Rc<IndexMap<String, SampleOutcome>>,
    rollbacks: Rc<Cell<usize>>,
}

impl MemoryCatalog {
    pub fn new(snapshot: CatalogSnapshot) -> Self {
        let samples = snapshot
            .procedures
            .iter()
            .map(|p| {
                let outcome = match (&p.sample_error, &p.sample) {
                    (Some(message), _) => Err(message.clone()),
                    (None, Some(sample)) => Ok(sample.clone()),
                    (None, None) => Ok(SampleResult::default()),
                };
                (p.name.to_lowercase(), outcome)
            })
            .collect();

        Self {
            tables: snapshot.tables.into_iter().map(|t| (t.name.clone(), t)).collect(),
            views: snapshot.views.into_iter().map(|v| (v.name.clone(), v)).collect(),
            procedures: snapshot
                .procedures
                .into_iter()
                .map(|p| (p.name.clone(), p))
                .collect(),
            samples: Rc::new(samples),
            rollbacks: Rc::new(Cell::new(0)),
        }
    }

    pub fn load(path: &Path) -> Result<Self, DalgenError> {
        CatalogSnapshot::load(path).map(Self::new)
    }

    /// Number of sample transactions rolled back so far
    pub fn rollbacks(&self) -> usize {
        self.rollbacks.get()
    }

    fn object<'a>(
        objects: &'a IndexMap<String, TableSnapshot>,
        name: &str,
    ) -> Result<&'a TableSnapshot, DalgenError> {
        objects.get(name).ok_or_else(|| DalgenError::Catalog {
            object: name.to_string(),
            message: "object not found in snapshot".to_string(),
        })
    }

    fn procedure(&self, name: &str) -> Result<&ProcedureSnapshot, DalgenError> {
        let procedure = self.procedures.get(name).ok_or_else(|| DalgenError::Catalog {
            object: name.to_string(),
            message: "procedure not found in snapshot".to_string(),
        })?;
        match &procedure.error {
            Some(message) => Err(DalgenError::Catalog {
                object: name.to_string(),
                message: message.clone(),
            }),
            None => Ok(procedure),
        }
    }
}

impl CatalogReader for MemoryCatalog {
    type Session = MemorySession;

    fn list_tables(&mut self) -> Result<Vec<String>, DalgenError> {
        Ok(self.tables.keys().cloned().collect())
    }

    fn list_views(&mut self) -> Result<Vec<String>, DalgenError> {
        Ok(self.views.keys().cloned().collect())
    }

    fn list_procedures(&mut self) -> Result<Vec<String>, DalgenError> {
        Ok(self.procedures.keys().cloned().collect())
    }

    fn table_fields(&mut self, table: &str) -> Result<Vec<RawField>, DalgenError> {
        Ok(Self::object(&self.tables, table)?.fields.clone())
    }

    fn view_fields(&mut self, view: &str) -> Result<Vec<RawField>, DalgenError> {
        Ok(Self::object(&self.views, view)?.fields.clone())
    }

    fn primary_keys(&mut self, table: &str) -> Result<Vec<String>, DalgenError> {
        Ok(Self::object(&self.tables, table)?.primary_key.clone())
    }

    fn procedure_parameters(&mut self, procedure: &str) -> Result<Vec<RawParameter>, DalgenError> {
        Ok(self.procedure(procedure)?.parameters.clone())
    }

    fn procedure_definition(&mut self, procedure: &str) -> Result<Option<String>, DalgenError> {
        Ok(self.procedure(procedure)?.definition.clone())
    }

    fn open_sample_session(&mut self) -> Result<MemorySession, DalgenError> {
        Ok(MemorySession {
            samples: Rc::clone(&self.samples),
            rollbacks: Rc::clone(&self.rollbacks),
            in_transaction: false,
        })
    }
}

/// Sample session answering `exec` batches from the snapshot
#[derive(Debug)]
pub struct MemorySession {
    samples: Rc<IndexMap<String, SampleOutcome>>,
    rollbacks: Rc<Cell<usize>>,
    in_transaction: bool,
}

/// Procedure name of an `exec schema.name args` batch
fn executed_procedure(sql: &str) -> Option<&str> {
    let mut words = sql.split_whitespace();
    let verb = words.next()?;
    if !verb.eq_ignore_ascii_case("exec") && !verb.eq_ignore_ascii_case("execute") {
        return None;
    }
    let target = words.next()?;
    target.rsplit('.').next()
}

impl SampleSession for MemorySession {
    fn begin(&mut self) -> Result<(), DalgenError> {
        self.in_transaction = true;
        Ok(())
    }

    fn execute(&mut self, sql: &str, _timeout: Duration) -> Result<SampleResult, DalgenError> {
        let name = executed_procedure(sql).ok_or_else(|| DalgenError::Config(format!("unsupported batch: {}", sql)))?;
        trace!(procedure = ?name, in_transaction = self.in_transaction, "Answering sample from snapshot");
        match self.samples.get(&name.to_lowercase()) {
            Some(Ok(sample)) => Ok(sample.clone()),
            Some(Err(message)) => Err(DalgenError::SampleExecutionFailed {
                procedure: name.to_string(),
                message: message.clone(),
            }),
            None => Err(DalgenError::SampleExecutionFailed {
                procedure: name.to_string(),
                message: "Could not find stored procedure".to_string(),
            }),
        }
    }

    fn rollback(&mut self) -> Result<(), DalgenError> {
        self.in_transaction = false;
        self.rollbacks.set(self.rollbacks.get() + 1);
        Ok(())
    }
}
