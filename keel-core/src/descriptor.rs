use crate::{Declaration, SqlType, Value};
use std::sync::Arc;

/// Reflected schema of one entity type. Built once by the [`Reflector`](crate::Reflector)
/// and shared immutably afterwards.
#[derive(Debug)]
pub struct TableDescriptor {
    pub type_name: &'static str,
    pub name: String,
    /// Persisted columns in slot order, `extends` columns spliced in place.
    pub columns: Vec<ColumnDescriptor>,
    /// Indexes into `columns`.
    pub primary_key: Vec<usize>,
    pub indexes: Vec<IndexDescriptor>,
    /// Composite unique constraints. Single column ones are flagged on the column.
    pub uniques: Vec<IndexDescriptor>,
    /// Type names of the embedded entities.
    pub extends: Vec<&'static str>,
    pub auto_increment: Option<usize>,
    pub version: Option<usize>,
    /// Columns holding the key of an associated entity.
    pub cascades: Vec<usize>,
    /// Number of slots exchanged through [`Entity::write_fields`](crate::Entity::write_fields).
    pub slots: usize,
}

#[derive(Debug, Clone)]
pub struct ColumnDescriptor {
    pub field: &'static str,
    pub name: String,
    pub slot: usize,
    /// Typed NULL of the field type, decides the column type when `sql_type` is absent.
    pub prototype: Value,
    pub sql_type: Option<SqlType>,
    /// The Rust field is an `Option`.
    pub optional: bool,
    /// Rendered as nullable in the table definition.
    pub nullable: bool,
    pub default: Option<String>,
    pub primary_key: bool,
    pub auto_increment: bool,
    pub unique: bool,
    pub indexed: bool,
    pub version: bool,
    pub created: bool,
    pub updated: bool,
    pub association: Option<Association>,
}

/// Link from a cascade column to the associated entity.
#[derive(Debug, Clone)]
pub struct Association {
    /// Position in [`Entity::associations`](crate::Entity::associations).
    pub index: usize,
    pub declaration: &'static Declaration,
    pub table: Arc<TableDescriptor>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexDescriptor {
    pub name: String,
    pub columns: Vec<String>,
    pub unique: bool,
}

impl TableDescriptor {
    /// Find a column by database name or by field name.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|c| c.name == name)
            .or_else(|| self.columns.iter().position(|c| c.field == name))
    }

    pub fn column(&self, name: &str) -> Option<&ColumnDescriptor> {
        self.column_index(name).map(|i| &self.columns[i])
    }

    pub fn primary_key_columns(&self) -> impl Iterator<Item = &ColumnDescriptor> {
        self.primary_key.iter().map(|i| &self.columns[*i])
    }
}

impl ColumnDescriptor {
    /// Created, updated and version columns are written by the engine.
    pub fn is_automatic(&self) -> bool {
        self.created || self.updated || self.version
    }

    pub fn is_boolean(&self) -> bool {
        matches!(self.prototype, Value::Boolean(..))
    }
}
