//! Schema data structures
//!
//! These types represent catalog information and form the contract between
//! introspection (produces) and code generation (consumes).

use serde::{Deserialize, Serialize};

use crate::defaults;
use crate::error::DalgenError;
use crate::sanitize::Sanitizer;
use crate::typemap::{ParamType, RuntimeType};

/// Everything read from one catalog
#[derive(Debug, Clone, Default)]
pub struct Schema {
    pub tables: Vec<Table>,
    pub views: Vec<Table>,
    pub procedures: Vec<StoredProcedure>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TableKind {
    Table,
    View,
}

impl TableKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TableKind::Table => "table",
            TableKind::View => "view",
        }
    }
}

/// Database table or view
#[derive(Debug, Clone)]
pub struct Table {
    pub name: String,
    pub kind: TableKind,
    /// Sorted by name
    pub fields: Vec<Field>,
}

impl Table {
    /// Build a table, sorting fields by name regardless of catalog order
    pub fn new(name: impl Into<String>, kind: TableKind, mut fields: Vec<Field>) -> Self {
        fields.sort_by(|a, b| {
            a.name
                .to_lowercase()
                .cmp(&b.name.to_lowercase())
                .then_with(|| a.name.cmp(&b.name))
        });
        Self {
            name: name.into(),
            kind,
            fields,
        }
    }

    pub fn is_table(&self) -> bool {
        self.kind == TableKind::Table
    }

    /// Generated class name: the kind's prefix followed by the PascalCase name
    pub fn class_name(&self, table_prefix: &str, view_prefix: &str) -> String {
        let prefix = match self.kind {
            TableKind::Table => table_prefix,
            TableKind::View => view_prefix,
        };
        format!("{}{}", prefix, to_pascal_case(&self.name))
    }

    /// Flag key fields, matching names case-insensitively
    pub fn mark_keys(&mut self, key_columns: &[String]) {
        for field in &mut self.fields {
            field.key = key_columns
                .iter()
                .any(|k| k.eq_ignore_ascii_case(&field.name));
        }
    }

    pub fn key_fields(&self) -> Vec<&Field> {
        self.fields.iter().filter(|f| f.key).collect()
    }
}

/// Column description as returned by the catalog
#[derive(Debug, Clone, Deserialize)]
pub struct RawField {
    pub name: String,
    pub db_type: String,
    /// Character or byte length; -1 when not applicable or `max`
    #[serde(default = "no_length")]
    pub length: i32,
    #[serde(default)]
    pub precision: u8,
    #[serde(default)]
    pub scale: u8,
    #[serde(default)]
    pub nullable: bool,
    #[serde(default)]
    pub identity: bool,
    #[serde(default)]
    pub computed: bool,
    #[serde(default)]
    pub default: Option<String>,
}

fn no_length() -> i32 {
    -1
}

/// A table or view column
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub name: String,
    pub db_type: String,
    pub length: i32,
    pub precision: u8,
    pub scale: u8,
    pub nullable: bool,
    pub identity: bool,
    pub key: bool,
    pub computed: bool,
    /// Never written by generated insert/update code
    pub readonly: bool,
    /// Normalized C# default expression
    pub default_value: Option<String>,
}

impl Field {
    pub fn from_raw(raw: RawField) -> Self {
        let db_type = raw.db_type.to_lowercase();
        let default_value = defaults::normalize(raw.default.as_deref(), &db_type, raw.nullable, raw.length);
        let readonly = raw.identity || raw.computed || is_append_only(&db_type);
        Self {
            name: raw.name,
            db_type,
            length: raw.length,
            precision: raw.precision,
            scale: raw.scale,
            nullable: raw.nullable,
            identity: raw.identity,
            key: false,
            computed: raw.computed,
            readonly,
            default_value,
        }
    }

    /// Type as written in the `DbType` attribute, e.g. `varchar(50)` or `decimal(18,2)`
    pub fn db_type_with_size(&self) -> String {
        if self.length > 0 {
            format!("{}({})", self.db_type, self.length)
        } else if matches!(self.db_type.as_str(), "decimal" | "numeric") {
            format!("{}({},{})", self.db_type, self.precision, self.scale)
        } else {
            self.db_type.clone()
        }
    }
}

/// Row-version columns are maintained by the server
fn is_append_only(db_type: &str) -> bool {
    matches!(db_type, "timestamp" | "rowversion")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamDirection {
    In,
    Out,
    InOut,
}

/// Parameter description as returned by the catalog
#[derive(Debug, Clone, Deserialize)]
pub struct RawParameter {
    pub name: String,
    pub sql_type: String,
    #[serde(default = "input_direction")]
    pub direction: ParamDirection,
    #[serde(default)]
    pub precision: u8,
    #[serde(default)]
    pub scale: u8,
    #[serde(default)]
    pub size: i32,
}

fn input_direction() -> ParamDirection {
    ParamDirection::In
}

/// A stored procedure parameter
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    /// Name without the leading `@`
    pub name: String,
    pub code_name: String,
    pub direction: ParamDirection,
    pub param_type: ParamType,
    pub sql_type: String,
    pub precision: u8,
    pub scale: u8,
    pub size: i32,
}

impl Parameter {
    /// Convert a catalog parameter
    ///
    /// Returns `Ok(None)` for the `@RETURN_VALUE` pseudo-parameter.
    pub fn from_raw(raw: RawParameter, sanitizer: &Sanitizer) -> Result<Option<Self>, DalgenError> {
        if raw.name.eq_ignore_ascii_case("@RETURN_VALUE") {
            return Ok(None);
        }

        let name = raw.name.trim_start_matches('@').to_string();
        let param_type = ParamType::from_sql_type(&raw.sql_type).ok_or_else(|| DalgenError::UnmappedType {
            db_type: raw.sql_type.clone(),
            context: format!("parameter @{}", name),
        })?;

        Ok(Some(Self {
            code_name: sanitizer.sanitize(&name),
            name,
            direction: raw.direction,
            param_type,
            sql_type: raw.sql_type.to_lowercase(),
            precision: raw.precision,
            scale: raw.scale,
            size: raw.size,
        }))
    }

    pub fn is_out(&self) -> bool {
        matches!(self.direction, ParamDirection::Out | ParamDirection::InOut)
    }
}

/// A stored procedure
#[derive(Debug, Clone)]
pub struct StoredProcedure {
    pub name: String,
    /// Catalog order, never sorted
    pub parameters: Vec<Parameter>,
    pub returns_data: bool,
    pub definition: Option<String>,
    pub sample: Option<SampleResult>,
    /// Set when metadata loading stopped early
    pub load_error: Option<String>,
}

impl StoredProcedure {
    pub fn new(name: impl Into<String>, returns_data: bool) -> Self {
        Self {
            name: name.into(),
            parameters: Vec::new(),
            returns_data,
            definition: None,
            sample: None,
            load_error: None,
        }
    }
}

/// Shape of the result sets captured from one sample execution
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SampleResult {
    pub tables: Vec<ResultTable>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ResultTable {
    pub columns: Vec<ResultColumn>,
    #[serde(default)]
    pub row_count: usize,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ResultColumn {
    pub name: String,
    pub runtime_type: RuntimeType,
}

/// Convert a catalog name to PascalCase
///
/// An underscore makes the next character uppercase and is dropped, except a
/// leading underscore which is kept. Every other character is lowercased.
pub fn to_pascal_case(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    let mut upper_next = true;
    for (i, c) in s.chars().enumerate() {
        if c == '_' {
            if i == 0 {
                result.push('_');
            }
            upper_next = true;
        } else if upper_next {
            result.extend(c.to_uppercase());
            upper_next = false;
        } else {
            result.extend(c.to_lowercase());
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw_field(name: &str, db_type: &str) -> RawField {
        RawField {
            name: name.to_string(),
            db_type: db_type.to_string(),
            length: -1,
            precision: 0,
            scale: 0,
            nullable: false,
            identity: false,
            computed: false,
            default: None,
        }
    }

    fn raw_param(name: &str, sql_type: &str) -> RawParameter {
        RawParameter {
            name: name.to_string(),
            sql_type: sql_type.to_string(),
            direction: ParamDirection::In,
            precision: 0,
            scale: 0,
            size: 0,
        }
    }

    #[test]
    fn test_to_pascal_case() {
        assert_eq!(to_pascal_case("grp_admingetlatest"), "GrpAdmingetlatest");
        assert_eq!(to_pascal_case("user_name"), "UserName");
        assert_eq!(to_pascal_case("ABC"), "Abc");
        assert_eq!(to_pascal_case("_x_y"), "_XY");
        assert_eq!(to_pascal_case("Room"), "Room");
    }

    #[test]
    fn test_fields_sorted_by_name() {
        let fields = ["zeta", "Alpha", "mid", "beta"]
            .iter()
            .map(|n| Field::from_raw(raw_field(n, "int")))
            .collect();
        let table = Table::new("t", TableKind::Table, fields);
        let names: Vec<_> = table.fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["Alpha", "beta", "mid", "zeta"]);
    }

    #[test]
    fn test_readonly_derivation() {
        let mut identity = raw_field("id", "int");
        identity.identity = true;
        assert!(Field::from_raw(identity).readonly);

        let mut computed = raw_field("total", "money");
        computed.computed = true;
        assert!(Field::from_raw(computed).readonly);

        assert!(Field::from_raw(raw_field("ver", "timestamp")).readonly);
        assert!(!Field::from_raw(raw_field("name", "varchar")).readonly);
    }

    #[test]
    fn test_field_default_normalized() {
        let mut raw = raw_field("active", "bit");
        raw.default = Some("((1))".to_string());
        assert_eq!(Field::from_raw(raw).default_value.as_deref(), Some("true"));
    }

    #[test]
    fn test_mark_keys_case_insensitive() {
        let fields = vec![
            Field::from_raw(raw_field("ID", "int")),
            Field::from_raw(raw_field("name", "varchar")),
        ];
        let mut table = Table::new("t", TableKind::Table, fields);
        table.mark_keys(&["id".to_string()]);
        let keys: Vec<_> = table.key_fields().iter().map(|f| f.name.clone()).collect();
        assert_eq!(keys, vec!["ID".to_string()]);
    }

    #[test]
    fn test_db_type_with_size() {
        let mut raw = raw_field("name", "varchar");
        raw.length = 50;
        assert_eq!(Field::from_raw(raw).db_type_with_size(), "varchar(50)");

        let mut raw = raw_field("price", "decimal");
        raw.precision = 18;
        raw.scale = 2;
        assert_eq!(Field::from_raw(raw).db_type_with_size(), "decimal(18,2)");

        assert_eq!(Field::from_raw(raw_field("id", "int")).db_type_with_size(), "int");
    }

    #[test]
    fn test_return_value_excluded() {
        let sanitizer = Sanitizer::new();
        let param = Parameter::from_raw(raw_param("@RETURN_VALUE", "int"), &sanitizer).unwrap();
        assert!(param.is_none());
    }

    #[test]
    fn test_parameter_from_raw() {
        let sanitizer = Sanitizer::new();
        let mut raw = raw_param("@class", "int");
        raw.direction = ParamDirection::InOut;
        let param = Parameter::from_raw(raw, &sanitizer).unwrap().unwrap();
        assert_eq!(param.name, "class");
        assert_eq!(param.code_name, "_class");
        assert_eq!(param.param_type, ParamType::Int32);
        assert!(param.is_out());
    }

    #[test]
    fn test_parameter_unmapped_type() {
        let sanitizer = Sanitizer::new();
        let err = Parameter::from_raw(raw_param("@shape", "geometry"), &sanitizer).unwrap_err();
        assert!(matches!(err, DalgenError::UnmappedType { .. }));
    }
}
