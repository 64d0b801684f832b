//! Type mapping
//!
//! Maps SQL Server catalog types to C# scalar types. Three independent tables are
//! kept: column types (keyed by type name and nullability), stored procedure
//! parameter types (keyed by [`ParamType`], with separate input and output
//! representations) and runtime types reported by live result sets.

use std::collections::{HashMap, HashSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::DalgenError;

/// Portable classification of a stored procedure parameter, independent of the
/// vendor type name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamType {
    AnsiString,
    AnsiStringFixedLength,
    Binary,
    Boolean,
    Byte,
    Currency,
    Date,
    DateTime,
    DateTime2,
    DateTimeOffset,
    Decimal,
    Double,
    Guid,
    Int16,
    Int32,
    Int64,
    Object,
    Single,
    String,
    StringFixedLength,
    Time,
    Xml,
}

impl ParamType {
    /// Classify a SQL Server type name
    pub fn from_sql_type(sql_type: &str) -> Option<Self> {
        let param_type = match sql_type.trim().to_lowercase().as_str() {
            "bigint" => ParamType::Int64,
            "binary" | "varbinary" | "image" | "timestamp" | "rowversion" => ParamType::Binary,
            "bit" => ParamType::Boolean,
            "char" => ParamType::AnsiStringFixedLength,
            "date" => ParamType::Date,
            "datetime" | "smalldatetime" => ParamType::DateTime,
            "datetime2" => ParamType::DateTime2,
            "datetimeoffset" => ParamType::DateTimeOffset,
            "decimal" | "numeric" => ParamType::Decimal,
            "float" => ParamType::Double,
            "int" => ParamType::Int32,
            "money" | "smallmoney" => ParamType::Currency,
            "nchar" => ParamType::StringFixedLength,
            "nvarchar" | "ntext" | "sysname" => ParamType::String,
            "real" => ParamType::Single,
            "smallint" => ParamType::Int16,
            "sql_variant" => ParamType::Object,
            "time" => ParamType::Time,
            "tinyint" => ParamType::Byte,
            "uniqueidentifier" => ParamType::Guid,
            "varchar" | "text" => ParamType::AnsiString,
            "xml" => ParamType::Xml,
            _ => return None,
        };
        Some(param_type)
    }

    /// Name of the matching `System.Data.DbType` member
    pub fn as_str(&self) -> &'static str {
        match self {
            ParamType::AnsiString => "AnsiString",
            ParamType::AnsiStringFixedLength => "AnsiStringFixedLength",
            ParamType::Binary => "Binary",
            ParamType::Boolean => "Boolean",
            ParamType::Byte => "Byte",
            ParamType::Currency => "Currency",
            ParamType::Date => "Date",
            ParamType::DateTime => "DateTime",
            ParamType::DateTime2 => "DateTime2",
            ParamType::DateTimeOffset => "DateTimeOffset",
            ParamType::Decimal => "Decimal",
            ParamType::Double => "Double",
            ParamType::Guid => "Guid",
            ParamType::Int16 => "Int16",
            ParamType::Int32 => "Int32",
            ParamType::Int64 => "Int64",
            ParamType::Object => "Object",
            ParamType::Single => "Single",
            ParamType::String => "String",
            ParamType::StringFixedLength => "StringFixedLength",
            ParamType::Time => "Time",
            ParamType::Xml => "Xml",
        }
    }
}

impl fmt::Display for ParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Runtime type of a column in a live result set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuntimeType {
    Int32,
    Int16,
    Int64,
    UInt32,
    Byte,
    Boolean,
    String,
    DateTime,
    DateTimeOffset,
    TimeSpan,
    Guid,
    Single,
    Double,
    Decimal,
    Binary,
    Object,
}

/// Lookup tables for all type resolution
///
/// Built once with [`TypeMap::sql_server`] and passed by reference to the
/// emitters. Individual entries can be replaced through the `with_*` builders.
#[derive(Debug, Clone)]
pub struct TypeMap {
    columns: HashMap<(String, bool), String>,
    params_in: HashMap<ParamType, String>,
    params_out: HashMap<ParamType, String>,
    runtime: HashMap<RuntimeType, String>,
    unicode: HashSet<String>,
}

impl TypeMap {
    /// Mappings for SQL Server catalogs and C# output
    pub fn sql_server() -> Self {
        let mut map = Self {
            columns: HashMap::new(),
            params_in: HashMap::new(),
            params_out: HashMap::new(),
            runtime: HashMap::new(),
            unicode: ["nchar", "ntext", "nvarchar"]
                .iter()
                .map(|t| t.to_string())
                .collect(),
        };

        // (sql type, not-null type, nullable type)
        let columns = [
            ("bigint", "long", "long?"),
            ("binary", "byte[]", "byte[]"),
            ("bit", "bool", "bool?"),
            ("char", "string", "string"),
            ("date", "DateTime", "DateTime?"),
            ("datetime", "DateTime", "DateTime?"),
            ("datetime2", "DateTime", "DateTime?"),
            ("datetimeoffset", "DateTimeOffset", "DateTimeOffset?"),
            ("decimal", "decimal", "decimal?"),
            ("float", "double", "double?"),
            ("image", "byte[]", "byte[]"),
            ("int", "int", "int?"),
            ("money", "decimal", "decimal?"),
            ("nchar", "string", "string"),
            ("ntext", "string", "string"),
            ("numeric", "decimal", "decimal?"),
            ("nvarchar", "string", "string"),
            ("real", "float", "float?"),
            ("smalldatetime", "DateTime", "DateTime?"),
            ("smallint", "short", "short?"),
            ("smallmoney", "decimal", "decimal?"),
            ("sql_variant", "object", "object"),
            ("text", "string", "string"),
            ("time", "TimeSpan", "TimeSpan?"),
            ("timestamp", "byte[]", "byte[]"),
            ("tinyint", "byte", "byte?"),
            ("uniqueidentifier", "System.Guid", "Guid?"),
            ("varbinary", "byte[]", "byte[]"),
            ("varchar", "string", "string"),
            ("xml", "string", "string"),
        ];
        for (db_type, not_null, nullable) in columns {
            map.columns
                .insert((db_type.to_string(), false), not_null.to_string());
            map.columns
                .insert((db_type.to_string(), true), nullable.to_string());
        }

        // (parameter type, input type, output type)
        let params = [
            (ParamType::Int64, "long?", "Int64"),
            (ParamType::Binary, "byte[]", "byte[]"),
            (ParamType::Boolean, "bool?", "bool"),
            (ParamType::AnsiStringFixedLength, "string", "string"),
            (ParamType::DateTime, "DateTime?", "DateTime"),
            (ParamType::DateTime2, "DateTime?", "DateTime"),
            (ParamType::DateTimeOffset, "DateTimeOffset?", "DateTimeOffset"),
            (ParamType::Date, "DateTime?", "DateTime"),
            (ParamType::Decimal, "decimal?", "decimal"),
            (ParamType::Double, "double?", "double"),
            (ParamType::Int32, "int?", "int"),
            (ParamType::Currency, "decimal?", "decimal"),
            (ParamType::StringFixedLength, "string", "string"),
            (ParamType::String, "string", "string"),
            (ParamType::Single, "Single?", "Single"),
            (ParamType::Int16, "short?", "short"),
            (ParamType::Byte, "byte?", "byte"),
            (ParamType::Guid, "Guid?", "Guid"),
            (ParamType::AnsiString, "string", "string"),
            (ParamType::Xml, "string", "string"),
            (ParamType::Time, "TimeSpan?", "TimeSpan"),
            (ParamType::Object, "object", "object"),
        ];
        for (param_type, input, output) in params {
            map.params_in.insert(param_type, input.to_string());
            map.params_out.insert(param_type, output.to_string());
        }

        let runtime = [
            (RuntimeType::Int32, "int?"),
            (RuntimeType::Int16, "Int16?"),
            (RuntimeType::Int64, "Int64?"),
            (RuntimeType::UInt32, "uint?"),
            (RuntimeType::Byte, "byte?"),
            (RuntimeType::Boolean, "bool?"),
            (RuntimeType::String, "string"),
            (RuntimeType::DateTime, "DateTime?"),
            (RuntimeType::DateTimeOffset, "DateTimeOffset?"),
            (RuntimeType::TimeSpan, "TimeSpan?"),
            (RuntimeType::Guid, "Guid?"),
            (RuntimeType::Single, "float?"),
            (RuntimeType::Double, "double?"),
            (RuntimeType::Decimal, "decimal?"),
            (RuntimeType::Binary, "Byte[]"),
            (RuntimeType::Object, "object"),
        ];
        for (runtime_type, cs_type) in runtime {
            map.runtime.insert(runtime_type, cs_type.to_string());
        }

        map
    }

    /// Replace or add a column mapping
    pub fn with_column(mut self, db_type: &str, nullable: bool, target: &str) -> Self {
        self.columns
            .insert((db_type.to_lowercase(), nullable), target.to_string());
        self
    }

    /// Replace or add a parameter mapping for both directions
    pub fn with_param(mut self, param_type: ParamType, input: &str, output: &str) -> Self {
        self.params_in.insert(param_type, input.to_string());
        self.params_out.insert(param_type, output.to_string());
        self
    }

    /// Resolve the C# type of a table or view column
    ///
    /// A non-nullable column of length 1 that would map to `string` maps to
    /// `char` instead.
    pub fn resolve(&self, db_type: &str, nullable: bool, length: i32) -> Result<String, DalgenError> {
        let key = (db_type.to_lowercase(), nullable);
        let resolved = self
            .columns
            .get(&key)
            .ok_or_else(|| DalgenError::UnmappedType {
                db_type: db_type.to_string(),
                context: if nullable { "nullable column" } else { "column" }.to_string(),
            })?;

        if !nullable && length == 1 && resolved == "string" {
            return Ok("char".to_string());
        }
        Ok(resolved.clone())
    }

    /// Resolve the C# type of a stored procedure parameter
    pub fn resolve_param(&self, param_type: ParamType, for_output: bool) -> Result<String, DalgenError> {
        let (table, context) = if for_output {
            (&self.params_out, "output parameter")
        } else {
            (&self.params_in, "input parameter")
        };
        table
            .get(&param_type)
            .cloned()
            .ok_or_else(|| DalgenError::UnmappedType {
                db_type: param_type.to_string(),
                context: context.to_string(),
            })
    }

    /// Resolve the C# type of a result-set column
    pub fn resolve_runtime(&self, runtime_type: RuntimeType) -> Result<String, DalgenError> {
        self.runtime
            .get(&runtime_type)
            .cloned()
            .ok_or_else(|| DalgenError::UnmappedType {
                db_type: format!("{:?}", runtime_type),
                context: "result column".to_string(),
            })
    }

    /// Whether the column type stores unicode text
    pub fn is_unicode(&self, db_type: &str) -> bool {
        self.unicode.contains(&db_type.to_lowercase())
    }
}

impl Default for TypeMap {
    fn default() -> Self {
        Self::sql_server()
    }
}
