//! Table and view wrapper classes

use serde::Serialize;
use tracing::{debug, trace};

use super::statements::{table_statements, StatementDecl};
use crate::error::DalgenError;
use crate::introspect::TableFilter;
use crate::params::GenerationParameters;
use crate::sanitize::Sanitizer;
use crate::schema::{Field, Table, TableKind};
use crate::typemap::TypeMap;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PropertyDecl {
    /// Column name as bound by the `DataField` attribute
    pub column_name: String,
    pub member_name: String,
    pub member_type: String,
    /// Rendered `DataField` arguments
    pub attribute_args: String,
    pub key: bool,
    pub identity: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DefaultDecl {
    pub member_name: String,
    pub value: String,
}

/// Everything needed to render one entity class
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntityDecl {
    pub class_name: String,
    pub table_name: String,
    pub kind: TableKind,
    pub base_class: String,
    pub properties: Vec<PropertyDecl>,
    /// Assignments applied by the constructor
    pub defaults: Vec<DefaultDecl>,
    pub query_object: bool,
    pub statements: Vec<StatementDecl>,
}

/// Builds [`EntityDecl`]s from catalog tables
pub struct EntityEmitter<'a> {
    params: &'a GenerationParameters,
    type_map: &'a TypeMap,
    sanitizer: &'a Sanitizer,
    filter: TableFilter,
}

impl<'a> EntityEmitter<'a> {
    pub fn new(params: &'a GenerationParameters, type_map: &'a TypeMap, sanitizer: &'a Sanitizer) -> Self {
        Self {
            params,
            type_map,
            sanitizer,
            filter: params.table_filter(),
        }
    }

    /// Column name after case folding
    pub fn column_name(&self, name: &str) -> String {
        if self.params.make_names_lowercase {
            name.to_lowercase()
        } else {
            name.to_string()
        }
    }

    pub fn member_name(&self, column_name: &str) -> String {
        self.sanitizer
            .sanitize(&format!("{}{}", self.params.member_prefix, column_name))
    }

    pub fn base_class(&self) -> String {
        self.params
            .base_class_for_tables
            .clone()
            .unwrap_or_else(|| "object".to_string())
    }

    /// Build the declaration for a table or view
    ///
    /// Returns `Ok(None)` for excluded tables.
    pub fn build(&self, table: &Table) -> Result<Option<EntityDecl>, DalgenError> {
        if self.filter.is_excluded(&table.name) {
            debug!(table = ?table.name, "Excluded from generation");
            return Ok(None);
        }

        let mut properties = Vec::with_capacity(table.fields.len());
        let mut defaults = Vec::new();

        for field in &table.fields {
            let property = self.property(table, field)?;
            trace!(table = ?table.name, member = ?property.member_name, member_type = ?property.member_type, "Property");

            if !field.identity && !field.computed {
                if let Some(value) = &field.default_value {
                    defaults.push(DefaultDecl {
                        member_name: property.member_name.clone(),
                        value: value.clone(),
                    });
                }
            }
            properties.push(property);
        }

        let statements = if self.params.generate_sql_statements && table.is_table() {
            table_statements(table)
                .into_iter()
                .map(|s| StatementDecl {
                    sql: s.sql.replace('"', "\"\""),
                    ..s
                })
                .collect()
        } else {
            Vec::new()
        };

        Ok(Some(EntityDecl {
            class_name: table.class_name(&self.params.class_prefix, &self.params.view_prefix),
            table_name: table.name.clone(),
            kind: table.kind,
            base_class: self.base_class(),
            properties,
            defaults,
            query_object: self.params.generate_query_object,
            statements,
        }))
    }

    fn property(&self, table: &Table, field: &Field) -> Result<PropertyDecl, DalgenError> {
        let column_name = self.column_name(&field.name);
        let member_type = self
            .type_map
            .resolve(&field.db_type, field.nullable, field.length)
            .map_err(|e| match e {
                DalgenError::UnmappedType { db_type, .. } => DalgenError::UnmappedType {
                    db_type,
                    context: format!("{}.{}", table.name, field.name),
                },
                other => other,
            })?;

        let mut args = vec![
            format!("\"{}\"", column_name),
            format!("DbType=\"{}\"", field.db_type_with_size()),
        ];
        if field.readonly || !table.is_table() {
            args.push("ReadOnly=true".to_string());
        }
        if field.nullable {
            args.push("Nullable=true".to_string());
        }
        if field.identity {
            args.push("Identity=true".to_string());
        }
        if field.key {
            args.push("Key=true".to_string());
        }
        if field.length >= 0 {
            args.push(format!("MaxLen={}", field.length));
        }
        if self.type_map.is_unicode(&field.db_type) {
            args.push("Unicode=true".to_string());
        }

        Ok(PropertyDecl {
            member_name: self.member_name(&column_name),
            column_name,
            member_type,
            attribute_args: args.join(", "),
            key: field.key,
            identity: field.identity,
        })
    }
}
