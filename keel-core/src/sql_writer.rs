use crate::{
    Assignment, ColumnDescriptor, Conjunction, Delete, IndexDescriptor, Insert, Order, Ordering,
    Predicate, PredicateKind, Projection, Select, SetValue, TableDescriptor, Update, Value,
    is_plain_identifier, separated_by,
};
use std::fmt::{self, Display, Write};

/// Rendered statement: text with `?` placeholders and the parameters in placeholder order.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Sql {
    pub text: String,
    pub params: Vec<Value>,
}

impl Sql {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Display for Sql {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// Dialect of a backend.
///
/// The default methods write portable SQL with `"` quoted identifiers. A driver overrides the
/// pieces its backend spells differently, typically the column types.
pub trait SqlWriter: Send + Sync {
    fn as_dyn(&self) -> &dyn SqlWriter;

    fn write_escaped(&self, out: &mut String, value: &str, search: char, replace: &str) {
        let mut position = 0;
        for (i, c) in value.char_indices() {
            if c == search {
                out.push_str(&value[position..i]);
                out.push_str(replace);
                position = i + c.len_utf8();
            }
        }
        out.push_str(&value[position..]);
    }

    fn write_identifier_quoted(&self, out: &mut String, value: &str) {
        out.push('"');
        self.write_escaped(out, value, '"', r#""""#);
        out.push('"');
    }

    /// Plain names are quoted, anything else (aliases, expressions) is written verbatim.
    fn write_table_name(&self, out: &mut String, value: &str) {
        if is_plain_identifier(value) {
            self.write_identifier_quoted(out, value);
        } else {
            out.push_str(value);
        }
    }

    fn write_placeholder(&self, out: &mut Sql, value: Value) {
        out.text.push('?');
        out.params.push(value);
    }

    fn write_column_type(&self, out: &mut String, value: &Value) {
        match value {
            Value::Boolean(..) => out.push_str("BOOLEAN"),
            Value::Int8(..) => out.push_str("TINYINT"),
            Value::Int16(..) => out.push_str("SMALLINT"),
            Value::Int32(..) => out.push_str("INTEGER"),
            Value::Int64(..) => out.push_str("BIGINT"),
            Value::UInt8(..) => out.push_str("SMALLINT"),
            Value::UInt16(..) => out.push_str("INTEGER"),
            Value::UInt32(..) => out.push_str("BIGINT"),
            Value::UInt64(..) => out.push_str("NUMERIC(20)"),
            Value::Float32(..) => out.push_str("REAL"),
            Value::Float64(..) => out.push_str("DOUBLE PRECISION"),
            Value::Decimal(.., precision, scale) => {
                out.push_str("DECIMAL");
                if (precision, scale) != (&0, &0) {
                    let _ = write!(out, "({},{})", precision, scale);
                }
            }
            Value::Char(..) => out.push_str("CHAR(1)"),
            Value::Varchar(..) | Value::Unknown(..) | Value::Null => out.push_str("VARCHAR"),
            Value::Blob(..) => out.push_str("BLOB"),
            Value::Date(..) => out.push_str("DATE"),
            Value::Time(..) => out.push_str("TIME"),
            Value::Timestamp(..) => out.push_str("TIMESTAMP"),
            Value::TimestampWithTimezone(..) => out.push_str("TIMESTAMP WITH TIME ZONE"),
            Value::Uuid(..) => out.push_str("UUID"),
            v if v.is_binary() => out.push_str("BLOB"),
            Value::List(..) | Value::Map(..) => out.push_str("TEXT"),
        }
    }

    fn write_auto_increment(&self, out: &mut String) {
        out.push_str(" AUTOINCREMENT");
    }

    fn write_column_definition(&self, out: &mut String, table: &TableDescriptor, column: &ColumnDescriptor) {
        self.write_identifier_quoted(out, &column.name);
        out.push(' ');
        match &column.sql_type {
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

    fn write_create_table(
        &self,
        out: &mut String,
        table: &TableDescriptor,
        name: &str,
        if_not_exists: bool,
    ) {
        out.push_str("CREATE TABLE ");
        if if_not_exists {
            out.push_str("IF NOT EXISTS ");
        }
        self.write_table_name(out, name);
        out.push_str(" (\n");
        separated_by(
            out,
            &table.columns,
            |out, column| self.write_column_definition(out, table, column),
            ",\n",
        );
        if table.primary_key.len() > 1 {
            out.push_str(",\nPRIMARY KEY (");
            separated_by(
                out,
                table.primary_key_columns(),
                |out, column| self.write_identifier_quoted(out, &column.name),
                ", ",
            );
            out.push(')');
        }
        out.push_str("\n);");
    }

    /// Column added to an existing table. Key and uniqueness constraints are left out, and
    /// NOT NULL only comes with a default.
    fn write_add_column(
        &self,
        out: &mut String,
        _table: &TableDescriptor,
        name: &str,
        column: &ColumnDescriptor,
    ) {
        out.push_str("ALTER TABLE ");
        self.write_table_name(out, name);
        out.push_str(" ADD COLUMN ");
        self.write_identifier_quoted(out, &column.name);
        out.push(' ');
        match &column.sql_type {
            Some(sql_type) => {
                let _ = write!(out, "{}", sql_type);
            }
            None => self.write_column_type(out, &column.prototype),
        }
        if let Some(default) = &column.default {
            if !column.nullable {
                out.push_str(" NOT NULL");
            }
            out.push_str(" DEFAULT ");
            out.push_str(default);
        }
        out.push(';');
    }

    fn write_drop_table(&self, out: &mut String, name: &str, if_exists: bool) {
        out.push_str("DROP TABLE ");
        if if_exists {
            out.push_str("IF EXISTS ");
        }
        self.write_table_name(out, name);
        out.push(';');
    }

    fn write_create_index(
        &self,
        out: &mut String,
        table: &str,
        index: &IndexDescriptor,
        if_not_exists: bool,
    ) {
        out.push_str(if index.unique {
            "CREATE UNIQUE INDEX "
        } else {
            "CREATE INDEX "
        });
        if if_not_exists {
            out.push_str("IF NOT EXISTS ");
        }
        self.write_identifier_quoted(out, &index.name);
        out.push_str(" ON ");
        self.write_table_name(out, table);
        out.push_str(" (");
        separated_by(
            out,
            &index.columns,
            |out, column| self.write_identifier_quoted(out, column),
            ", ",
        );
        out.push_str(");");
    }

    fn write_projection(&self, out: &mut String, value: &Projection) {
        match value {
            Projection::Column { table, name } => {
                if let Some(table) = table {
                    self.write_table_name(out, table);
                    out.push('.');
                }
                self.write_identifier_quoted(out, name);
            }
            Projection::Raw(raw) => out.push_str(raw),
        }
    }

    /// Predicates are combined left to right, a change of conjunction groups what came before.
    fn write_predicates(&self, out: &mut Sql, predicates: &[Predicate]) {
        let mut text = String::new();
        let mut params = Vec::new();
        let mut previous: Option<Conjunction> = None;
        for (i, predicate) in predicates.iter().enumerate() {
            if i > 0 {
                if i > 1 && previous.is_some_and(|p| p != predicate.conjunction) {
                    text.insert(0, '(');
                    text.push(')');
                }
                text.push_str(match predicate.conjunction {
                    Conjunction::And => " AND ",
                    Conjunction::Or => " OR ",
                });
                previous = Some(predicate.conjunction);
            }
            match &predicate.kind {
                PredicateKind::Raw(fragment) => {
                    text.push('(');
                    text.push_str(fragment);
                    text.push(')');
                }
                PredicateKind::Equals(column) => {
                    self.write_projection(&mut text, column);
                    text.push_str(" = ?");
                }
            }
            params.extend(predicate.params.iter().cloned());
        }
        out.text.push_str(&text);
        out.params.extend(params);
    }

    fn write_where(&self, out: &mut Sql, predicates: &[Predicate]) {
        if !predicates.is_empty() {
            out.text.push_str(" WHERE ");
            self.write_predicates(out, predicates);
        }
    }

    fn write_limit(&self, out: &mut String, limit: Option<u64>, offset: Option<u64>) {
        match (limit, offset) {
            (Some(limit), offset) => {
                let _ = write!(out, " LIMIT {limit}");
                if let Some(offset) = offset {
                    let _ = write!(out, " OFFSET {offset}");
                }
            }
            (None, Some(offset)) => {
                let _ = write!(out, " LIMIT -1 OFFSET {offset}");
            }
            (None, None) => {}
        }
    }

    fn write_select(&self, out: &mut Sql, select: &Select) {
        out.text.push_str("SELECT ");
        if select.distinct {
            out.text.push_str("DISTINCT ");
        }
        separated_by(
            &mut out.text,
            &select.projection,
            |out, column| self.write_projection(out, column),
            ", ",
        );
        out.text.push_str(" FROM ");
        self.write_table_name(&mut out.text, &select.table);
        for join in &select.joins {
            let _ = write!(out.text, " {} ", join.join_type);
            self.write_table_name(&mut out.text, &join.table);
            if !join.on.is_empty() {
                out.text.push_str(" ON ");
                out.text.push_str(&join.on);
            }
            out.params.extend(join.params.iter().cloned());
        }
        self.write_where(out, &select.filter);
        if let Some(group_by) = &select.group_by {
            out.text.push_str(" GROUP BY ");
            out.text.push_str(group_by);
        }
        if let Some(having) = &select.having {
            out.text.push_str(" HAVING ");
            out.text.push_str(&having.fragment);
            out.params.extend(having.params.iter().cloned());
        }
        if !select.order_by.is_empty() {
            out.text.push_str(" ORDER BY ");
            separated_by(
                &mut out.text,
                &select.order_by,
                |out, ordering| match ordering {
                    Ordering::Raw(raw) => out.push_str(raw),
                    Ordering::Column(column, order) => {
                        self.write_projection(out, column);
                        out.push_str(match order {
                            Order::Asc => " ASC",
                            Order::Desc => " DESC",
                        });
                    }
                },
                ", ",
            );
        }
        self.write_limit(&mut out.text, select.limit, select.offset);
    }

    fn write_count(&self, out: &mut Sql, select: &Select) {
        if select.distinct || select.group_by.is_some() {
            out.text.push_str("SELECT COUNT(*) FROM (");
            self.write_select(out, select);
            out.text.push_str(") AS \"counted\"");
        } else {
            let count = Select {
                projection: vec![Projection::Raw("COUNT(*)".into())],
                order_by: Vec::new(),
                limit: None,
                offset: None,
                ..select.clone()
            };
            self.write_select(out, &count);
        }
        out.text.push(';');
    }

    fn write_insert(&self, out: &mut Sql, insert: &Insert) {
        out.text.push_str("INSERT INTO ");
        self.write_table_name(&mut out.text, &insert.table);
        if insert.columns.is_empty() {
            out.text.push_str(" DEFAULT VALUES;");
            return;
        }
        out.text.push_str(" (");
        separated_by(
            &mut out.text,
            &insert.columns,
            |out, column| self.write_identifier_quoted(out, column),
            ", ",
        );
        out.text.push_str(") VALUES (");
        for (i, value) in insert.values.iter().enumerate() {
            if i > 0 {
                out.text.push_str(", ");
            }
            self.write_placeholder(out, value.clone());
        }
        out.text.push_str(");");
    }

    fn write_assignment(&self, out: &mut Sql, assignment: &Assignment) {
        self.write_identifier_quoted(&mut out.text, &assignment.column);
        out.text.push_str(" = ");
        match &assignment.value {
            SetValue::Param(value) => self.write_placeholder(out, value.clone()),
            SetValue::Increment(step) => {
                self.write_identifier_quoted(&mut out.text, &assignment.column);
                let _ = write!(out.text, " + {step}");
            }
        }
    }

    fn write_update(&self, out: &mut Sql, update: &Update) {
        out.text.push_str("UPDATE ");
        self.write_table_name(&mut out.text, &update.table);
        out.text.push_str(" SET ");
        for (i, assignment) in update.set.iter().enumerate() {
            if i > 0 {
                out.text.push_str(", ");
            }
            self.write_assignment(out, assignment);
        }
        self.write_where(out, &update.filter);
        out.text.push(';');
    }

    fn write_delete(&self, out: &mut Sql, delete: &Delete) {
        out.text.push_str("DELETE FROM ");
        self.write_table_name(&mut out.text, &delete.table);
        self.write_where(out, &delete.filter);
        out.text.push(';');
    }

    fn write_transaction_begin(&self, out: &mut String) {
        out.push_str("BEGIN;");
    }

    fn write_transaction_commit(&self, out: &mut String) {
        out.push_str("COMMIT;");
    }

    fn write_transaction_rollback(&self, out: &mut String) {
        out.push_str("ROLLBACK;");
    }
}

/// Portable SQL, used by the rendering tests and as the base of the drivers.
#[derive(Debug, Default, Clone, Copy)]
pub struct GenericSqlWriter;

impl GenericSqlWriter {
    pub fn new() -> Self {
        Self
    }
}

impl SqlWriter for GenericSqlWriter {
    fn as_dyn(&self) -> &dyn SqlWriter {
        self
    }
}
