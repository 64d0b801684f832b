//! Registry of emitted entities
//!
//! Filled by the driver as entity classes are emitted and consumed by the
//! surfaces that need a table-name to class lookup (db context, `DalMappings`).

use indexmap::IndexMap;
use serde::Serialize;

use super::entity::EntityDecl;
use super::procedure::csharp_bool;
use crate::schema::TableKind;

#[derive(Debug, Clone, Serialize)]
pub struct RegisteredMember {
    pub column_name: String,
    pub member_name: String,
    pub key: bool,
    pub identity: bool,
}

/// One emitted table or view wrapper
#[derive(Debug, Clone, Serialize)]
pub struct RegisteredEntity {
    pub table_name: String,
    pub class_name: String,
    pub kind: TableKind,
    /// Identifier used for the context property
    pub property_name: String,
    pub members: Vec<RegisteredMember>,
}

impl RegisteredEntity {
    pub fn from_decl(decl: &EntityDecl, property_name: String) -> Self {
        Self {
            table_name: decl.table_name.clone(),
            class_name: decl.class_name.clone(),
            kind: decl.kind,
            property_name,
            members: decl
                .properties
                .iter()
                .map(|p| RegisteredMember {
                    column_name: p.column_name.clone(),
                    member_name: p.member_name.clone(),
                    key: p.key,
                    identity: p.identity,
                })
                .collect(),
        }
    }

    /// The key member, when the key consists of exactly one field
    pub fn single_key(&self) -> Option<&RegisteredMember> {
        let mut keys = self.members.iter().filter(|m| m.key);
        match (keys.next(), keys.next()) {
            (Some(key), None) => Some(key),
            _ => None,
        }
    }
}

/// Entities in emission order, keyed by table name
#[derive(Debug, Default)]
pub struct EntityRegistry {
    entities: IndexMap<String, RegisteredEntity>,
}

impl EntityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an entity; a later registration for the same table replaces the earlier one
    pub fn register(&mut self, entity: RegisteredEntity) {
        self.entities.insert(entity.table_name.clone(), entity);
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &RegisteredEntity> {
        self.entities.values()
    }

    /// Rows for the `DalMappings` class; only physical tables are mapped
    pub fn mapping_rows(&self) -> Vec<MappingRow> {
        self.iter()
            .filter(|e| e.kind == TableKind::Table)
            .map(|e| {
                let key = e.single_key();
                MappingRow {
                    table_name: e.table_name.clone(),
                    class_name: e.class_name.clone(),
                    key_field: match key {
                        Some(k) => format!("@\"{}\"", k.column_name),
                        None => "null".to_string(),
                    },
                    key_is_identity: csharp_bool(key.is_some_and(|k| k.identity)).to_string(),
                }
            })
            .collect()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MappingRow {
    pub table_name: String,
    pub class_name: String,
    /// C# literal: verbatim string or `null`
    pub key_field: String,
    /// C# literal: `true` or `false`
    pub key_is_identity: String,
}
