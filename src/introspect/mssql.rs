//! SQL Server catalog reader

use std::rc::Rc;
use std::time::Duration;

use futures::TryStreamExt;
use tiberius::{AuthMethod, Client, ColumnData, ColumnType, Config, EncryptionLevel, Query, QueryItem, Row};
use tokio::net::TcpStream;
use tokio::runtime::Runtime;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};
use tracing::{debug, error, info, trace};

use super::{CatalogReader, SampleSession};
use crate::config::DbConfig;
use crate::error::DalgenError;
use crate::schema::{ParamDirection, RawField, RawParameter, ResultColumn, ResultTable, SampleResult};
use crate::typemap::RuntimeType;

type SqlClient = Client<Compat<TcpStream>>;

const COLUMNS_QUERY: &str = r#"
    SELECT
        COLUMN_NAME,
        DATA_TYPE,
        CAST(ISNULL(CHARACTER_MAXIMUM_LENGTH, -1) AS INT),
        CAST(ISNULL(NUMERIC_PRECISION, 0) AS INT),
        CAST(ISNULL(NUMERIC_SCALE, 0) AS INT),
        CAST(CASE WHEN IS_NULLABLE = 'YES' THEN 1 ELSE 0 END AS INT),
        CAST(ISNULL(COLUMNPROPERTY(OBJECT_ID(TABLE_SCHEMA + '.' + TABLE_NAME), COLUMN_NAME, 'IsIdentity'), 0) AS INT),
        CAST(ISNULL(COLUMNPROPERTY(OBJECT_ID(TABLE_SCHEMA + '.' + TABLE_NAME), COLUMN_NAME, 'IsComputed'), 0) AS INT),
        COLUMN_DEFAULT
    FROM INFORMATION_SCHEMA.COLUMNS
    WHERE TABLE_SCHEMA = @P1 AND TABLE_NAME = @P2
    ORDER BY ORDINAL_POSITION
"#;

const PRIMARY_KEY_QUERY: &str = r#"
    SELECT kcu.COLUMN_NAME
    FROM INFORMATION_SCHEMA.TABLE_CONSTRAINTS tc
    JOIN INFORMATION_SCHEMA.KEY_COLUMN_USAGE kcu
        ON tc.CONSTRAINT_NAME = kcu.CONSTRAINT_NAME
        AND tc.TABLE_SCHEMA = kcu.TABLE_SCHEMA
        AND tc.TABLE_NAME = kcu.TABLE_NAME
    WHERE tc.CONSTRAINT_TYPE = 'PRIMARY KEY'
        AND tc.TABLE_SCHEMA = @P1 AND tc.TABLE_NAME = @P2
    ORDER BY kcu.ORDINAL_POSITION
"#;

const OBJECTS_QUERY: &str = r#"
    SELECT TABLE_NAME
    FROM INFORMATION_SCHEMA.TABLES
    WHERE TABLE_SCHEMA = @P1 AND TABLE_TYPE = @P2
    ORDER BY TABLE_NAME
"#;

const PROCEDURES_QUERY: &str = r#"
    SELECT ROUTINE_NAME
    FROM INFORMATION_SCHEMA.ROUTINES
    WHERE ROUTINE_SCHEMA = @P1 AND ROUTINE_TYPE = 'PROCEDURE'
    ORDER BY ROUTINE_NAME
"#;

const PARAMETERS_QUERY: &str = r#"
    SELECT
        p.name,
        TYPE_NAME(p.user_type_id),
        CAST(p.max_length AS INT),
        CAST(p.precision AS INT),
        CAST(p.scale AS INT),
        CAST(p.is_output AS INT)
    FROM sys.parameters p
    WHERE p.object_id = OBJECT_ID(@P1)
    ORDER BY p.parameter_id
"#;

const DEFINITION_QUERY: &str = "SELECT OBJECT_DEFINITION(OBJECT_ID(@P1))";

/// Catalog reader for a live SQL Server database
///
/// Queries run on a current-thread tokio runtime owned by the reader.
pub struct MssqlCatalog {
    runtime: Rc<Runtime>,
    config: DbConfig,
    schema: String,
    client: SqlClient,
}

fn build_config(db: &DbConfig) -> Config {
    let mut config = Config::new();
    config.host(&db.host);
    config.port(db.port);
    config.database(&db.database);
    config.authentication(AuthMethod::sql_server(&db.user, &db.password));
    if db.trust_cert {
        config.trust_cert();
    }
    config.encryption(EncryptionLevel::Required);
    config
}

async fn connect(db: &DbConfig) -> Result<SqlClient, DalgenError> {
    let config = build_config(db);
    let tcp = TcpStream::connect(config.get_addr()).await.map_err(|e| {
        error!(connection = %db.redacted_connection_string(), error = %e, "TCP connect failed");
        DalgenError::CatalogConnectionFailed(e.to_string())
    })?;
    tcp.set_nodelay(true).ok();

    Client::connect(config, tcp.compat_write()).await.map_err(|e| {
        error!(connection = %db.redacted_connection_string(), error = %e, "Login failed");
        DalgenError::CatalogConnectionFailed(e.to_string())
    })
}

fn catalog_error(object: &str, e: impl std::fmt::Display) -> DalgenError {
    DalgenError::Catalog {
        object: object.to_string(),
        message: e.to_string(),
    }
}

fn text(row: &Row, idx: usize, object: &str) -> Result<Option<String>, DalgenError> {
    row.try_get::<&str, _>(idx)
        .map(|v| v.map(str::to_string))
        .map_err(|e| catalog_error(object, e))
}

fn int(row: &Row, idx: usize, object: &str) -> Result<i32, DalgenError> {
    row.try_get::<i32, _>(idx)
        .map(|v| v.unwrap_or(0))
        .map_err(|e| catalog_error(object, e))
}

fn small(row: &Row, idx: usize, object: &str) -> Result<u8, DalgenError> {
    let value = int(row, idx, object)?;
    u8::try_from(value).map_err(|e| catalog_error(object, e))
}

impl MssqlCatalog {
    /// Connect to the catalog; objects are read from `schema`
    pub fn connect(config: &DbConfig, schema: &str) -> Result<Self, DalgenError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| DalgenError::CatalogConnectionFailed(e.to_string()))?;

        info!(connection = %config.redacted_connection_string(), "Connecting to SQL Server");
        let client = runtime.block_on(connect(config))?;
        debug!("Connected");

        Ok(Self {
            runtime: Rc::new(runtime),
            config: config.clone(),
            schema: schema.to_string(),
            client,
        })
    }

    fn query_rows(&mut self, object: &str, sql: &str, binds: &[&str]) -> Result<Vec<Row>, DalgenError> {
        trace!(object = ?object, "Running catalog query");
        let client = &mut self.client;
        self.runtime.block_on(async {
            let mut query = Query::new(sql);
            for bind in binds {
                query.bind(bind.to_string());
            }
            let stream = query.query(client).await.map_err(|e| catalog_error(object, e))?;
            stream.into_first_result().await.map_err(|e| catalog_error(object, e))
        })
    }

    fn list_names(&mut self, sql: &str, binds: &[&str]) -> Result<Vec<String>, DalgenError> {
        let rows = self.query_rows("catalog", sql, binds)?;
        let mut names = Vec::with_capacity(rows.len());
        for row in &rows {
            if let Some(name) = text(row, 0, "catalog")? {
                names.push(name);
            }
        }
        Ok(names)
    }

    fn fields(&mut self, object: &str) -> Result<Vec<RawField>, DalgenError> {
        let schema = self.schema.clone();
        let rows = self.query_rows(object, COLUMNS_QUERY, &[schema.as_str(), object])?;
        rows.iter()
            .map(|row| {
                Ok(RawField {
                    name: text(row, 0, object)?.unwrap_or_default(),
                    db_type: text(row, 1, object)?.unwrap_or_default(),
                    length: int(row, 2, object)?,
                    precision: small(row, 3, object)?,
                    scale: small(row, 4, object)?,
                    nullable: int(row, 5, object)? == 1,
                    identity: int(row, 6, object)? == 1,
                    computed: int(row, 7, object)? == 1,
                    default: text(row, 8, object)?,
                })
            })
            .collect()
    }

    fn qualified(&self, name: &str) -> String {
        format!("{}.{}", self.schema, name)
    }
}

impl CatalogReader for MssqlCatalog {
    type Session = MssqlSession;

    fn list_tables(&mut self) -> Result<Vec<String>, DalgenError> {
        let schema = self.schema.clone();
        self.list_names(OBJECTS_QUERY, &[schema.as_str(), "BASE TABLE"])
    }

    fn list_views(&mut self) -> Result<Vec<String>, DalgenError> {
        let schema = self.schema.clone();
        self.list_names(OBJECTS_QUERY, &[schema.as_str(), "VIEW"])
    }

    fn list_procedures(&mut self) -> Result<Vec<String>, DalgenError> {
        let schema = self.schema.clone();
        self.list_names(PROCEDURES_QUERY, &[schema.as_str()])
    }

    fn table_fields(&mut self, table: &str) -> Result<Vec<RawField>, DalgenError> {
        self.fields(table)
    }

    fn view_fields(&mut self, view: &str) -> Result<Vec<RawField>, DalgenError> {
        self.fields(view)
    }

    fn primary_keys(&mut self, table: &str) -> Result<Vec<String>, DalgenError> {
        let schema = self.schema.clone();
        let rows = self.query_rows(table, PRIMARY_KEY_QUERY, &[schema.as_str(), table])?;
        let mut keys = Vec::new();
        for row in &rows {
            if let Some(name) = text(row, 0, table)? {
                keys.push(name);
            }
        }
        Ok(keys)
    }

    fn procedure_parameters(&mut self, procedure: &str) -> Result<Vec<RawParameter>, DalgenError> {
        let qualified = self.qualified(procedure);
        let rows = self.query_rows(procedure, PARAMETERS_QUERY, &[qualified.as_str()])?;
        rows.iter()
            .map(|row| {
                let sql_type = text(row, 1, procedure)?.unwrap_or_default().to_lowercase();
                let mut size = int(row, 2, procedure)?;
                // sys.parameters reports byte lengths
                if size > 0 && matches!(sql_type.as_str(), "nchar" | "nvarchar") {
                    size /= 2;
                }
                let direction = if int(row, 5, procedure)? == 1 {
                    ParamDirection::InOut
                } else {
                    ParamDirection::In
                };
                Ok(RawParameter {
                    name: text(row, 0, procedure)?.unwrap_or_default(),
                    sql_type,
                    direction,
                    precision: small(row, 3, procedure)?,
                    scale: small(row, 4, procedure)?,
                    size,
                })
            })
            .collect()
    }

    fn procedure_definition(&mut self, procedure: &str) -> Result<Option<String>, DalgenError> {
        let qualified = self.qualified(procedure);
        let rows = self.query_rows(procedure, DEFINITION_QUERY, &[qualified.as_str()])?;
        match rows.first() {
            Some(row) => text(row, 0, procedure),
            None => Ok(None),
        }
    }

    fn open_sample_session(&mut self) -> Result<MssqlSession, DalgenError> {
        let client = self.runtime.block_on(connect(&self.config))?;
        Ok(MssqlSession {
            runtime: Rc::clone(&self.runtime),
            client,
        })
    }
}

/// Dedicated connection for one sample execution
pub struct MssqlSession {
    runtime: Rc<Runtime>,
    client: SqlClient,
}

impl MssqlSession {
    fn simple(&mut self, sql: &str) -> Result<(), DalgenError> {
        let client = &mut self.client;
        self.runtime.block_on(async {
            let stream = client
                .simple_query(sql)
                .await
                .map_err(|e| DalgenError::Config(e.to_string()))?;
            stream
                .into_results()
                .await
                .map_err(|e| DalgenError::Config(e.to_string()))?;
            Ok(())
        })
    }
}

/// Runtime type of a result column as reported by the wire metadata
fn runtime_type(column_type: ColumnType) -> RuntimeType {
    match column_type {
        ColumnType::Int1 => RuntimeType::Byte,
        ColumnType::Int2 => RuntimeType::Int16,
        ColumnType::Int4 | ColumnType::Intn => RuntimeType::Int32,
        ColumnType::Int8 => RuntimeType::Int64,
        ColumnType::Bit | ColumnType::Bitn => RuntimeType::Boolean,
        ColumnType::Float4 => RuntimeType::Single,
        ColumnType::Float8 | ColumnType::Floatn => RuntimeType::Double,
        ColumnType::Money | ColumnType::Money4 | ColumnType::Decimaln | ColumnType::Numericn => RuntimeType::Decimal,
        ColumnType::Datetime
        | ColumnType::Datetime4
        | ColumnType::Datetimen
        | ColumnType::Daten
        | ColumnType::Datetime2 => RuntimeType::DateTime,
        ColumnType::DatetimeOffsetn => RuntimeType::DateTimeOffset,
        ColumnType::Timen => RuntimeType::TimeSpan,
        ColumnType::Guid => RuntimeType::Guid,
        ColumnType::BigVarBin | ColumnType::BigBinary | ColumnType::Image => RuntimeType::Binary,
        ColumnType::BigVarChar
        | ColumnType::BigChar
        | ColumnType::NVarchar
        | ColumnType::NChar
        | ColumnType::Text
        | ColumnType::NText
        | ColumnType::Xml => RuntimeType::String,
        _ => RuntimeType::Object,
    }
}

/// Narrow `intn`/`floatn` columns using a decoded value
fn refine(runtime_type: RuntimeType, value: &ColumnData<'_>) -> RuntimeType {
    match (runtime_type, value) {
        (RuntimeType::Int32, ColumnData::U8(Some(_))) => RuntimeType::Byte,
        (RuntimeType::Int32, ColumnData::I16(Some(_))) => RuntimeType::Int16,
        (RuntimeType::Int32, ColumnData::I64(Some(_))) => RuntimeType::Int64,
        (RuntimeType::Double, ColumnData::F32(Some(_))) => RuntimeType::Single,
        _ => runtime_type,
    }
}

impl SampleSession for MssqlSession {
    fn begin(&mut self) -> Result<(), DalgenError> {
        self.simple("BEGIN TRANSACTION")
    }

    fn execute(&mut self, sql: &str, timeout: Duration) -> Result<SampleResult, DalgenError> {
        let client = &mut self.client;
        let capture = async {
            let mut stream = client
                .simple_query(sql)
                .await
                .map_err(|e| DalgenError::Config(e.to_string()))?;
            let mut tables: Vec<ResultTable> = Vec::new();
            while let Some(item) = stream
                .try_next()
                .await
                .map_err(|e| DalgenError::Config(e.to_string()))?
            {
                match item {
                    QueryItem::Metadata(meta) => tables.push(ResultTable {
                        columns: meta
                            .columns()
                            .iter()
                            .map(|c| ResultColumn {
                                name: c.name().to_string(),
                                runtime_type: runtime_type(c.column_type()),
                            })
                            .collect(),
                        row_count: 0,
                    }),
                    QueryItem::Row(row) => {
                        if let Some(table) = tables.last_mut() {
                            if table.row_count == 0 {
                                for (column, (_, value)) in table.columns.iter_mut().zip(row.cells()) {
                                    column.runtime_type = refine(column.runtime_type, value);
                                }
                            }
                            table.row_count += 1;
                        }
                    }
                }
            }
            Ok(SampleResult { tables })
        };

        self.runtime
            .block_on(async { tokio::time::timeout(timeout, capture).await })
            .map_err(|_| DalgenError::Config(format!("timed out after {}s", timeout.as_secs())))?
    }

    fn rollback(&mut self) -> Result<(), DalgenError> {
        self.simple("IF @@TRANCOUNT > 0 ROLLBACK TRANSACTION")
    }
}
