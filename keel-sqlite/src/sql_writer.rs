use keel_core::{ColumnDescriptor, SqlWriter, TableDescriptor, Value};
use std::fmt::Write;

/// Sqlite dialect: storage class types and `INTEGER PRIMARY KEY AUTOINCREMENT` keys.
#[derive(Debug, Default, Clone, Copy)]
pub struct SqliteSqlWriter {}

impl SqlWriter for SqliteSqlWriter {
    fn as_dyn(&self) -> &dyn SqlWriter {
        self
    }

    fn write_column_type(&self, out: &mut String, value: &Value) {
        match value {
            Value::Boolean(..)
            | Value::Int8(..)
            | Value::Int16(..)
            | Value::Int32(..)
            | Value::Int64(..)
            | Value::UInt8(..)
            | Value::UInt16(..)
            | Value::UInt32(..)
            | Value::UInt64(..) => out.push_str("INTEGER"),
            Value::Float32(..) | Value::Float64(..) => out.push_str("REAL"),
            // Stored as text to keep every digit.
            Value::Decimal(..) => out.push_str("TEXT"),
            v if v.is_binary() => out.push_str("BLOB"),
            Value::Blob(..) => out.push_str("BLOB"),
            _ => out.push_str("TEXT"),
        }
    }

    fn write_column_definition(
        &self,
        out: &mut String,
        table: &TableDescriptor,
        column: &ColumnDescriptor,
    ) {
        self.write_identifier_quoted(out, &column.name);
        out.push(' ');
        match &column.sql_type {
            // Sqlite only accepts an autoincrement key declared exactly as INTEGER.
            _ if column.auto_increment => out.push_str("INTEGER"),
            Some(sql_type) => {
                let _ = write!(out, "{}", sql_type);
            }
            None => self.write_column_type(out, &column.prototype),
        }
        let single_key = column.primary_key && table.primary_key.len() == 1;
        if single_key {
            out.push_str(" PRIMARY KEY");
            if column.auto_increment {
                self.write_auto_increment(out);
            }
        } else if !column.nullable {
            out.push_str(" NOT NULL");
        }
        if let Some(default) = &column.default {
            out.push_str(" DEFAULT ");
            out.push_str(default);
        }
        if column.unique && !single_key {
            out.push_str(" UNIQUE");
        }
    }
}
