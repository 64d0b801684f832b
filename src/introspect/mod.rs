//! Catalog introspection
//!
//! This module reads catalog metadata through a [`CatalogReader`] and builds the
//! [`Schema`] consumed by code generation. Each catalog backend has its own
//! submodule; the SQL Server one is feature-gated.

use std::time::Duration;

use tracing::{debug, error, info, trace, warn};

use crate::error::DalgenError;
use crate::params::GenerationParameters;
use crate::sanitize::Sanitizer;
use crate::schema::{Field, Parameter, RawField, RawParameter, SampleResult, Schema, StoredProcedure, Table, TableKind};

pub mod snapshot;

pub use snapshot::{CatalogSnapshot, MemoryCatalog};

#[cfg(feature = "mssql")]
mod mssql;

#[cfg(feature = "mssql")]
pub use mssql::MssqlCatalog;

/// Filters to apply during introspection and generation
#[derive(Debug, Default, Clone)]
pub struct TableFilter {
    /// Only include these tables (if Some)
    pub include: Option<Vec<String>>,
    /// Upper-cased table names that are never generated
    pub excluded: Vec<String>,
    /// Upper-cased prefix of table names that are never generated
    pub excluded_prefix: Option<String>,
}

impl TableFilter {
    /// Check if a table or view is excluded from generation
    pub fn is_excluded(&self, table_name: &str) -> bool {
        let upper = table_name.trim().to_uppercase();
        if self.excluded.iter().any(|t| *t == upper) {
            return true;
        }
        self.excluded_prefix
            .as_deref()
            .is_some_and(|prefix| upper.starts_with(prefix))
    }
}

/// A connection dedicated to sample executions
///
/// Dropping the session closes its connection.
pub trait SampleSession {
    fn begin(&mut self) -> Result<(), DalgenError>;

    /// Execute a batch and capture the shape of every result set it returns
    fn execute(&mut self, sql: &str, timeout: Duration) -> Result<SampleResult, DalgenError>;

    fn rollback(&mut self) -> Result<(), DalgenError>;
}

/// Read access to a database catalog
pub trait CatalogReader {
    type Session: SampleSession;

    fn list_tables(&mut self) -> Result<Vec<String>, DalgenError>;

    fn list_views(&mut self) -> Result<Vec<String>, DalgenError>;

    fn list_procedures(&mut self) -> Result<Vec<String>, DalgenError>;

    fn table_fields(&mut self, table: &str) -> Result<Vec<RawField>, DalgenError>;

    fn view_fields(&mut self, view: &str) -> Result<Vec<RawField>, DalgenError>;

    fn primary_keys(&mut self, table: &str) -> Result<Vec<String>, DalgenError>;

    /// Parameters in catalog order
    fn procedure_parameters(&mut self, procedure: &str) -> Result<Vec<RawParameter>, DalgenError>;

    fn procedure_definition(&mut self, procedure: &str) -> Result<Option<String>, DalgenError>;

    /// Open a new connection for a sample execution
    fn open_sample_session(&mut self) -> Result<Self::Session, DalgenError>;
}

/// Trait for catalog introspection implementations
pub trait Introspector {
    /// Introspect the catalog and return structured schema information
    fn introspect(&mut self) -> Result<Schema, DalgenError>;
}

/// Load the fields of a table or view, sorted by name
pub fn load_fields<R: CatalogReader>(reader: &mut R, name: &str, kind: TableKind) -> Result<Vec<Field>, DalgenError> {
    let raw = match kind {
        TableKind::Table => reader.table_fields(name)?,
        TableKind::View => reader.view_fields(name)?,
    };
    trace!(object = ?name, fields = raw.len(), "Found fields");

    let table = Table::new(name, kind, raw.into_iter().map(Field::from_raw).collect());
    Ok(table.fields)
}

/// Load a table or view including key flags
pub fn load_table<R: CatalogReader>(reader: &mut R, name: &str, kind: TableKind) -> Result<Table, DalgenError> {
    let fields = load_fields(reader, name, kind)?;
    let mut table = Table::new(name, kind, fields);

    if kind == TableKind::Table {
        let keys = reader.primary_keys(name)?;
        trace!(table = ?name, keys = ?keys, "Found primary key");
        table.mark_keys(&keys);
    }

    Ok(table)
}

/// Load procedure parameters in catalog order, without `@RETURN_VALUE`
pub fn load_parameters<R: CatalogReader>(
    reader: &mut R,
    procedure: &str,
    sanitizer: &Sanitizer,
) -> Result<Vec<Parameter>, DalgenError> {
    let mut parameters = Vec::new();
    for raw in reader.procedure_parameters(procedure)? {
        if let Some(param) = Parameter::from_raw(raw, sanitizer)? {
            parameters.push(param);
        }
    }
    Ok(parameters)
}

/// Open transaction on a sample session, rolled back when dropped
struct SampleTransaction<'a, S: SampleSession> {
    session: &'a mut S,
    procedure: &'a str,
}

impl<'a, S: SampleSession> SampleTransaction<'a, S> {
    fn begin(session: &'a mut S, procedure: &'a str) -> Result<Self, DalgenError> {
        session.begin()?;
        Ok(Self { session, procedure })
    }
}

impl<S: SampleSession> Drop for SampleTransaction<'_, S> {
    fn drop(&mut self) {
        match self.session.rollback() {
            Ok(()) => trace!(procedure = ?self.procedure, "Sample transaction rolled back"),
            Err(e) => warn!(procedure = ?self.procedure, error = %e, "Failed to roll back sample transaction"),
        }
    }
}

/// Execute `sql` on a fresh session inside a transaction that is always rolled back
pub fn capture_sample<R: CatalogReader>(
    reader: &mut R,
    procedure: &str,
    sql: &str,
    timeout: Duration,
) -> Result<SampleResult, DalgenError> {
    let failed = |e: DalgenError| match e {
        DalgenError::SampleExecutionFailed { .. } => e,
        other => DalgenError::SampleExecutionFailed {
            procedure: procedure.to_string(),
            message: other.to_string(),
        },
    };

    let mut session = reader.open_sample_session().map_err(failed)?;
    let tx = SampleTransaction::begin(&mut session, procedure).map_err(failed)?;
    debug!(procedure = ?procedure, sql = ?sql, "Executing sample");
    let result = tx.session.execute(sql, timeout).map_err(failed);
    drop(tx);
    result
}

/// Capture the result shape of a procedure; failures are logged and yield `None`
pub fn load_sample_result<R: CatalogReader>(
    reader: &mut R,
    procedure: &str,
    sql: &str,
    timeout: Duration,
) -> Option<SampleResult> {
    match capture_sample(reader, procedure, sql, timeout) {
        Ok(sample) => {
            debug!(procedure = ?procedure, tables = sample.tables.len(), "Captured sample result");
            Some(sample)
        }
        Err(e) => {
            error!(procedure = ?procedure, error = %e, "Sample execution failed, skipping data wrapper");
            None
        }
    }
}

/// Placeholder argument used when sampling a procedure with parameters
pub fn dummy_argument(sql_type: &str) -> &'static str {
    match sql_type {
        "bit" | "decimal" | "numeric" | "int" | "smallint" | "tinyint" | "bigint" | "money" | "smallmoney"
        | "float" | "real" => "1",
        "char" | "varchar" | "text" | "nchar" | "nvarchar" | "ntext" => "''",
        "datetime" | "smalldatetime" | "datetime2" | "date" => "'20090101'",
        _ => "null",
    }
}

/// Build the batch used to sample a procedure
pub fn sample_statement(schema: &str, procedure: &StoredProcedure, with_args: bool) -> String {
    let mut sql = format!("exec {}.{}", schema, procedure.name);
    if with_args && !procedure.parameters.is_empty() {
        let args: Vec<String> = procedure
            .parameters
            .iter()
            .map(|p| {
                if p.is_out() {
                    "null".to_string()
                } else {
                    dummy_argument(&p.sql_type).to_string()
                }
            })
            .collect();
        sql.push(' ');
        sql.push_str(&args.join(", "));
    }
    sql
}

/// Load one stored procedure on a best-effort basis
///
/// Non-fatal failures are logged and recorded in `load_error`; the procedure is
/// returned with whatever was read before the failure.
pub fn load_procedure<R: CatalogReader>(
    reader: &mut R,
    name: &str,
    params: &GenerationParameters,
    sanitizer: &Sanitizer,
) -> Result<StoredProcedure, DalgenError> {
    let mut procedure = StoredProcedure::new(name, params.returns_data(name));

    match load_parameters(reader, name, sanitizer) {
        Ok(parameters) => procedure.parameters = parameters,
        Err(e) if e.is_fatal() => return Err(e),
        Err(e) => {
            error!(procedure = ?name, error = %e, "Failed to load parameters");
            procedure.load_error = Some(e.to_string());
            return Ok(procedure);
        }
    }

    match reader.procedure_definition(name) {
        Ok(definition) => procedure.definition = definition,
        Err(e) if e.is_fatal() => return Err(e),
        Err(e) => {
            error!(procedure = ?name, error = %e, "Failed to load definition");
            procedure.load_error = Some(e.to_string());
            return Ok(procedure);
        }
    }

    if procedure.returns_data && params.wants_sample(procedure.definition.as_deref()) {
        let sql = sample_statement(&params.catalog_schema, &procedure, params.sp_sample_with_dummy_args);
        procedure.sample = load_sample_result(reader, name, &sql, params.sample_timeout());
    }

    Ok(procedure)
}

/// Introspector over any catalog reader
pub struct CatalogIntrospector<'a, R: CatalogReader> {
    reader: &'a mut R,
    params: &'a GenerationParameters,
    sanitizer: Sanitizer,
}

impl<'a, R: CatalogReader> CatalogIntrospector<'a, R> {
    pub fn new(reader: &'a mut R, params: &'a GenerationParameters) -> Self {
        Self {
            reader,
            params,
            sanitizer: Sanitizer::new(),
        }
    }

    fn load_objects(&mut self, names: Vec<String>, kind: TableKind) -> Result<Vec<Table>, DalgenError> {
        let mut objects = Vec::with_capacity(names.len());
        for name in names {
            debug!(object = ?name, kind = kind.as_str(), "Introspecting");
            match load_table(self.reader, &name, kind) {
                Ok(table) => objects.push(table),
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => error!(object = ?name, error = %e, "Skipping object"),
            }
        }
        Ok(objects)
    }
}

impl<R: CatalogReader> Introspector for CatalogIntrospector<'_, R> {
    fn introspect(&mut self) -> Result<Schema, DalgenError> {
        info!("Starting catalog introspection");
        let filter = self.params.table_filter();

        let table_names: Vec<String> = match &filter.include {
            Some(selected) => selected.clone(),
            None => self.reader.list_tables()?,
        };
        debug!(count = table_names.len(), "Tables to load");
        let tables = self.load_objects(table_names, TableKind::Table)?;

        let view_names = self.reader.list_views()?;
        debug!(count = view_names.len(), "Views to load");
        let views = self.load_objects(view_names, TableKind::View)?;

        let mut procedures = Vec::new();
        if self.params.use_sps {
            let names = self.reader.list_procedures()?;
            debug!(count = names.len(), "Stored procedures to load");
            for name in names {
                debug!(procedure = ?name, "Introspecting stored procedure");
                procedures.push(load_procedure(self.reader, &name, self.params, &self.sanitizer)?);
            }
        }

        info!(
            tables = tables.len(),
            views = views.len(),
            procedures = procedures.len(),
            "Catalog introspection complete"
        );

        Ok(Schema {
            tables,
            views,
            procedures,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{ParamDirection, ResultColumn, ResultTable};
    use crate::typemap::RuntimeType;
    use snapshot::{ProcedureSnapshot, TableSnapshot};

    fn field(name: &str, db_type: &str) -> RawField {
        RawField {
            name: name.to_string(),
            db_type: db_type.to_string(),
            length: -1,
            precision: 0,
            scale: 0,
            nullable: true,
            identity: false,
            computed: false,
            default: None,
        }
    }

    fn param(name: &str, sql_type: &str) -> RawParameter {
        RawParameter {
            name: name.to_string(),
            sql_type: sql_type.to_string(),
            direction: ParamDirection::In,
            precision: 0,
            scale: 0,
            size: 0,
        }
    }

    fn overlaps_sample() -> SampleResult {
        SampleResult {
            tables: vec![ResultTable {
                columns: vec![ResultColumn {
                    name: "overlaps".to_string(),
                    runtime_type: RuntimeType::Int32,
                }],
                row_count: 1,
            }],
        }
    }

    fn catalog() -> MemoryCatalog {
        MemoryCatalog::new(CatalogSnapshot {
            tables: vec![TableSnapshot {
                name: "room".to_string(),
                fields: vec![field("name", "varchar"), field("ID", "int")],
                primary_key: vec!["id".to_string()],
            }],
            views: vec![TableSnapshot {
                name: "v_rooms".to_string(),
                fields: vec![field("name", "varchar")],
                primary_key: vec![],
            }],
            procedures: vec![
                ProcedureSnapshot {
                    name: "grp_getoverlaps".to_string(),
                    parameters: vec![
                        param("@RETURN_VALUE", "int"),
                        param("@id_room", "int"),
                        param("@d1", "datetime"),
                    ],
                    definition: Some("select 1 as overlaps".to_string()),
                    sample: Some(overlaps_sample()),
                    sample_error: None,
                    error: None,
                },
                ProcedureSnapshot {
                    name: "grp_broken".to_string(),
                    parameters: vec![],
                    definition: None,
                    sample: None,
                    sample_error: Some("Invalid object name".to_string()),
                    error: None,
                },
            ],
        })
    }

    #[test]
    fn test_is_excluded() {
        let filter = TableFilter {
            include: None,
            excluded: vec!["SYSDIAGRAMS".to_string()],
            excluded_prefix: Some("TMP_".to_string()),
        };
        assert!(filter.is_excluded("sysdiagrams"));
        assert!(filter.is_excluded("tmp_import"));
        assert!(!filter.is_excluded("rooms"));
    }

    #[test]
    fn test_load_table_sorts_and_marks_keys() {
        let mut reader = catalog();
        let table = load_table(&mut reader, "room", TableKind::Table).unwrap();
        let names: Vec<_> = table.fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["ID", "name"]);
        assert!(table.fields[0].key);
        assert!(!table.fields[1].key);
    }

    #[test]
    fn test_load_parameters_preserves_order() {
        let mut reader = catalog();
        let params = load_parameters(&mut reader, "grp_getoverlaps", &Sanitizer::new()).unwrap();
        let names: Vec<_> = params.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["id_room", "d1"]);
    }

    #[test]
    fn test_sample_always_rolled_back() {
        let mut reader = catalog();
        let sample = load_sample_result(&mut reader, "grp_getoverlaps", "exec dbo.grp_getoverlaps", Duration::from_secs(1));
        assert_eq!(sample, Some(overlaps_sample()));
        assert_eq!(reader.rollbacks(), 1);

        let sample = load_sample_result(&mut reader, "grp_broken", "exec dbo.grp_broken", Duration::from_secs(1));
        assert_eq!(sample, None);
        assert_eq!(reader.rollbacks(), 2);
    }

    #[test]
    fn test_capture_sample_error_kind() {
        let mut reader = catalog();
        let err = capture_sample(&mut reader, "grp_broken", "exec dbo.grp_broken", Duration::from_secs(1)).unwrap_err();
        assert!(matches!(err, DalgenError::SampleExecutionFailed { .. }));
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_sample_statement() {
        let mut procedure = StoredProcedure::new("grp_getoverlaps", true);
        procedure.parameters = load_parameters(&mut catalog(), "grp_getoverlaps", &Sanitizer::new()).unwrap();
        assert_eq!(sample_statement("dbo", &procedure, false), "exec dbo.grp_getoverlaps");
        assert_eq!(
            sample_statement("dbo", &procedure, true),
            "exec dbo.grp_getoverlaps 1, '20090101'"
        );
    }

    #[test]
    fn test_introspect_keeps_failed_procedures() {
        let mut reader = catalog();
        let params = GenerationParameters {
            use_sps: true,
            ..Default::default()
        };
        let schema = CatalogIntrospector::new(&mut reader, &params).introspect().unwrap();

        assert_eq!(schema.tables.len(), 1);
        assert_eq!(schema.views.len(), 1);
        assert_eq!(schema.procedures.len(), 2);
        assert!(schema.procedures[0].sample.is_some());
        assert!(schema.procedures[1].sample.is_none());
        assert_eq!(reader.rollbacks(), 2);
    }

    #[test]
    fn test_introspect_unmapped_parameter_is_fatal() {
        let mut reader = MemoryCatalog::new(CatalogSnapshot {
            procedures: vec![ProcedureSnapshot {
                name: "gsp_place".to_string(),
                parameters: vec![param("@shape", "geometry")],
                definition: None,
                sample: None,
                sample_error: None,
                error: None,
            }],
            ..Default::default()
        });
        let params = GenerationParameters {
            use_sps: true,
            ..Default::default()
        };
        let err = CatalogIntrospector::new(&mut reader, &params).introspect().unwrap_err();
        assert!(matches!(err, DalgenError::UnmappedType { .. }));
    }

    #[test]
    fn test_introspect_skips_unreadable_table() {
        let mut reader = catalog();
        let params = GenerationParameters {
            selected_tables: vec!["room".to_string(), "missing".to_string()],
            ..Default::default()
        };
        let schema = CatalogIntrospector::new(&mut reader, &params).introspect().unwrap();
        assert_eq!(schema.tables.len(), 1);
        assert_eq!(schema.tables[0].name, "room");
    }
}
