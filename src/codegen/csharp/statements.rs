//! Parameterized SQL statements for table wrappers

use std::collections::{HashMap, HashSet};

use serde::Serialize;
use tracing::warn;

use crate::error::DalgenError;
use crate::schema::{Field, Table};

/// A statement constant emitted into an entity class
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatementDecl {
    /// Constant name, e.g. `InsertStatement`
    pub name: String,
    /// Statement kind used in the doc comment
    pub kind: String,
    pub sql: String,
}

fn quote(name: &str) -> String {
    format!("[{}]", name.replace(']', "]]"))
}

/// SQL parameter name for every field, keyed by column name
///
/// Characters outside `[A-Za-z0-9_]` become `_`; names that collide after
/// cleanup get a numeric suffix.
fn parameter_names(table: &Table) -> HashMap<&str, String> {
    let mut used = HashSet::new();
    let mut names = HashMap::with_capacity(table.fields.len());
    for field in &table.fields {
        let base: String = field
            .name
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
            .collect();
        let mut name = base.clone();
        let mut suffix = 0;
        while !used.insert(name.to_lowercase()) {
            suffix += 1;
            name = format!("{}{}", base, suffix);
        }
        names.insert(field.name.as_str(), name);
    }
    names
}

fn parameter(names: &HashMap<&str, String>, field: &Field) -> String {
    match names.get(field.name.as_str()) {
        Some(name) => format!("@{}", name),
        None => format!("@{}", field.name),
    }
}

fn assignments<'a>(fields: impl Iterator<Item = &'a Field>, names: &HashMap<&str, String>) -> Vec<String> {
    fields
        .map(|f| format!("{} = {}", quote(&f.name), parameter(names, f)))
        .collect()
}

fn key_condition(table: &Table, names: &HashMap<&str, String>, statement: &str) -> Result<String, DalgenError> {
    let keys = table.key_fields();
    if keys.is_empty() {
        return Err(DalgenError::NoKeyColumnFound {
            table: table.name.clone(),
            statement: statement.to_string(),
        });
    }
    Ok(assignments(keys.into_iter(), names).join(" and "))
}

/// `insert` over every writable field
pub fn insert_statement(table: &Table) -> String {
    let writable: Vec<&Field> = table.fields.iter().filter(|f| !f.readonly).collect();
    if writable.is_empty() {
        return format!("insert into {} default values", quote(&table.name));
    }
    let columns: Vec<String> = writable.iter().map(|f| quote(&f.name)).collect();
    let names = parameter_names(table);
    let values: Vec<String> = writable.iter().map(|f| parameter(&names, f)).collect();
    format!(
        "insert into {} ({}) values ({})",
        quote(&table.name),
        columns.join(", "),
        values.join(", ")
    )
}

/// `update` of every writable non-key field, keyed by the key fields
///
/// Returns `Ok(None)` when there is nothing to set.
pub fn update_statement(table: &Table) -> Result<Option<String>, DalgenError> {
    let names = parameter_names(table);
    let condition = key_condition(table, &names, "update")?;
    let set = assignments(table.fields.iter().filter(|f| !f.readonly && !f.key), &names);
    if set.is_empty() {
        return Ok(None);
    }
    Ok(Some(format!(
        "update {} set {} where {}",
        quote(&table.name),
        set.join(", "),
        condition
    )))
}

pub fn delete_statement(table: &Table) -> Result<String, DalgenError> {
    let names = parameter_names(table);
    let condition = key_condition(table, &names, "delete")?;
    Ok(format!("delete from {} where {}", quote(&table.name), condition))
}

/// All statements for a table; statements that cannot be built are logged and skipped
pub fn table_statements(table: &Table) -> Vec<StatementDecl> {
    let mut statements = vec![StatementDecl {
        name: "InsertStatement".to_string(),
        kind: "insert".to_string(),
        sql: insert_statement(table),
    }];

    match update_statement(table) {
        Ok(Some(sql)) => statements.push(StatementDecl {
            name: "UpdateStatement".to_string(),
            kind: "update".to_string(),
            sql,
        }),
        Ok(None) => {}
        Err(e) => warn!(table = ?table.name, error = %e, "Skipping update statement"),
    }

    match delete_statement(table) {
        Ok(sql) => statements.push(StatementDecl {
            name: "DeleteStatement".to_string(),
            kind: "delete".to_string(),
            sql,
        }),
        Err(e) => warn!(table = ?table.name, error = %e, "Skipping delete statement"),
    }

    statements
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{RawField, TableKind};

    fn field(name: &str, identity: bool) -> Field {
        Field::from_raw(RawField {
            name: name.to_string(),
            db_type: "int".to_string(),
            length: -1,
            precision: 0,
            scale: 0,
            nullable: false,
            identity,
            computed: false,
            default: None,
        })
    }

    fn room(with_key: bool) -> Table {
        let mut table = Table::new(
            "room",
            TableKind::Table,
            vec![field("id", true), field("floor", false), field("beds", false)],
        );
        if with_key {
            table.mark_keys(&["id".to_string()]);
        }
        table
    }

    #[test]
    fn test_insert_skips_readonly() {
        assert_eq!(
            insert_statement(&room(true)),
            "insert into [room] ([beds], [floor]) values (@beds, @floor)"
        );
    }

    #[test]
    fn test_update_and_delete() {
        let table = room(true);
        assert_eq!(
            update_statement(&table).unwrap().as_deref(),
            Some("update [room] set [beds] = @beds, [floor] = @floor where [id] = @id")
        );
        assert_eq!(delete_statement(&table).unwrap(), "delete from [room] where [id] = @id");
    }

    #[test]
    fn test_no_key_column() {
        let table = room(false);
        let err = update_statement(&table).unwrap_err();
        assert!(matches!(err, DalgenError::NoKeyColumnFound { ref statement, .. } if statement == "update"));
        assert!(matches!(delete_statement(&table), Err(DalgenError::NoKeyColumnFound { .. })));
    }

    #[test]
    fn test_parameter_names_are_cleaned() {
        let mut table = Table::new(
            "order line",
            TableKind::Table,
            vec![
                field("line id", true),
                field("unit price", false),
                field("unit_price", false),
                field("qty-ordered", false),
            ],
        );
        table.mark_keys(&["line id".to_string()]);

        assert_eq!(
            insert_statement(&table),
            "insert into [order line] ([qty-ordered], [unit price], [unit_price]) values (@qty_ordered, @unit_price, @unit_price1)"
        );
        assert_eq!(
            delete_statement(&table).unwrap(),
            "delete from [order line] where [line id] = @line_id"
        );
        assert_eq!(
            update_statement(&table).unwrap().as_deref(),
            Some("update [order line] set [qty-ordered] = @qty_ordered, [unit price] = @unit_price, [unit_price] = @unit_price1 where [line id] = @line_id")
        );
    }

    #[test]
    fn test_table_statements_skip_keyless() {
        let names: Vec<_> = table_statements(&room(false)).into_iter().map(|s| s.name).collect();
        assert_eq!(names, vec!["InsertStatement"]);

        let names: Vec<_> = table_statements(&room(true)).into_iter().map(|s| s.name).collect();
        assert_eq!(names, vec!["InsertStatement", "UpdateStatement", "DeleteStatement"]);
    }
}
