//! Turns a table descriptor, the builder state and the slot values of an entity into the
//! plans rendered by a [`SqlWriter`](crate::SqlWriter). Nothing here touches a connection.

use crate::{
    Codec, ColumnDescriptor, Condition, Conjunction, JoinClause, MappingError, Order, OrderBy,
    Result, Sql, SqlWriter, Statement, TableDescriptor, Value, cache_key, is_plain_identifier,
};
use time::{OffsetDateTime, PrimitiveDateTime};

/// A selected expression or a column reference.
#[derive(Debug, Clone, PartialEq)]
pub enum Projection {
    Column { table: Option<String>, name: String },
    Raw(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum PredicateKind {
    /// Parenthesized when rendered.
    Raw(String),
    Equals(Projection),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    pub conjunction: Conjunction,
    pub kind: PredicateKind,
    pub params: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Ordering {
    Raw(String),
    Column(Projection, Order),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Select {
    pub table: String,
    pub distinct: bool,
    pub projection: Vec<Projection>,
    pub joins: Vec<JoinClause>,
    pub filter: Vec<Predicate>,
    pub group_by: Option<String>,
    pub having: Option<Condition>,
    pub order_by: Vec<Ordering>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Insert {
    pub table: String,
    pub columns: Vec<String>,
    pub values: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SetValue {
    Param(Value),
    Increment(i64),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    pub column: String,
    pub value: SetValue,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Update {
    pub table: String,
    pub set: Vec<Assignment>,
    pub filter: Vec<Predicate>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Delete {
    pub table: String,
    pub filter: Vec<Predicate>,
}

/// Selected columns, `Some(i)` where the projection maps to the `i`-th column of the table.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectionPlan {
    pub projection: Vec<Projection>,
    pub positions: Vec<Option<usize>>,
}

/// Context shared by the planning functions of one operation.
pub struct Planner<'a> {
    pub table: &'a TableDescriptor,
    /// Table name used in the statement, either the reflected one or the override.
    pub table_name: &'a str,
    pub statement: &'a Statement,
    pub codec: Codec,
}

impl<'a> Planner<'a> {
    pub fn new(
        table: &'a TableDescriptor,
        table_name: &'a str,
        statement: &'a Statement,
        codec: Codec,
    ) -> Self {
        Self {
            table,
            table_name,
            statement,
            codec,
        }
    }

    /// Columns are qualified with the table name when other tables are joined.
    fn qualifier(&self) -> Option<String> {
        (!self.statement.joins.is_empty()).then(|| self.table_name.to_string())
    }

    fn column_ref(&self, column: &ColumnDescriptor) -> Projection {
        Projection::Column {
            table: self.qualifier(),
            name: column.name.clone(),
        }
    }

    /// Reflected column by database or field name, else a plain identifier, else raw text.
    pub fn resolve(&self, name: &str) -> (Projection, Option<usize>) {
        if let Some(i) = self.table.column_index(name) {
            (self.column_ref(&self.table.columns[i]), Some(i))
        } else if is_plain_identifier(name) {
            (
                Projection::Column {
                    table: self.qualifier(),
                    name: name.to_string(),
                },
                None,
            )
        } else {
            (Projection::Raw(name.to_string()), None)
        }
    }

    fn is_omitted(&self, column: &ColumnDescriptor) -> bool {
        self.statement
            .omit
            .iter()
            .any(|v| *v == column.name || *v == column.field)
    }

    fn is_listed(&self, column: &ColumnDescriptor) -> bool {
        self.statement
            .columns
            .iter()
            .any(|v| *v == column.name || *v == column.field)
    }

    pub fn projection(&self) -> ProjectionPlan {
        let mut result = ProjectionPlan {
            projection: Vec::new(),
            positions: Vec::new(),
        };
        if self.statement.columns.is_empty() {
            for (i, column) in self.table.columns.iter().enumerate() {
                if !self.is_omitted(column) {
                    result.projection.push(self.column_ref(column));
                    result.positions.push(Some(i));
                }
            }
        } else {
            for name in &self.statement.columns {
                let (projection, position) = self.resolve(name);
                result.projection.push(projection);
                result.positions.push(position);
            }
        }
        result
    }

    fn encode(&self, column: &ColumnDescriptor, value: Value) -> Result<Value> {
        self.codec.encode(column, value)
    }

    /// Equality on every non zero column of `slots`, timestamps excluded. Booleans set to
    /// `false` take part only with `use_bool`.
    pub fn derived(&self, slots: &[Value]) -> Result<Vec<Predicate>> {
        let mut result = Vec::new();
        for column in &self.table.columns {
            if column.created || column.updated {
                continue;
            }
            let value = &slots[column.slot];
            let included = if column.is_boolean() && self.statement.use_bool {
                !value.is_null()
            } else {
                !value.is_zero()
            };
            if included {
                result.push(Predicate {
                    conjunction: Conjunction::And,
                    kind: PredicateKind::Equals(self.column_ref(column)),
                    params: vec![self.encode(column, value.clone())?],
                });
            }
        }
        Ok(result)
    }

    /// Equality on the primary key.
    pub fn key(&self, key: Vec<Value>) -> Result<Vec<Predicate>> {
        if self.table.primary_key.is_empty() {
            return Err(MappingError::validation(format!(
                "`{}` has no primary key",
                self.table.type_name
            )));
        }
        if key.len() != self.table.primary_key.len() {
            return Err(MappingError::validation(format!(
                "`{}` has {} primary key columns but {} values were given",
                self.table.type_name,
                self.table.primary_key.len(),
                key.len()
            )));
        }
        self.table
            .primary_key_columns()
            .zip(key)
            .map(|(column, value)| {
                Ok(Predicate {
                    conjunction: Conjunction::And,
                    kind: PredicateKind::Equals(self.column_ref(column)),
                    params: vec![self.encode(column, value)?],
                })
            })
            .collect()
    }

    /// Primary key values of `slots`, `None` when any of them is zero.
    pub fn key_of(&self, slots: &[Value]) -> Option<Vec<Value>> {
        if self.table.primary_key.is_empty() {
            return None;
        }
        self.table
            .primary_key_columns()
            .map(|c| {
                let value = &slots[c.slot];
                (!value.is_zero()).then(|| value.clone())
            })
            .collect()
    }

    /// Cache key of a pure primary key lookup with the default projection, `None` for
    /// anything else.
    pub fn lookup_key(&self, slots: &[Value]) -> Option<String> {
        if !self.statement.is_plain_lookup() {
            return None;
        }
        let only_key = self
            .table
            .columns
            .iter()
            .filter(|c| !c.primary_key && !c.created && !c.updated)
            .all(|c| {
                let value = &slots[c.slot];
                if c.is_boolean() && self.statement.use_bool {
                    value.is_null()
                } else {
                    value.is_zero()
                }
            });
        if !only_key {
            return None;
        }
        let key_unset = self
            .table
            .primary_key_columns()
            .all(|c| slots[c.slot].is_zero());
        let key = match (&self.statement.id, self.key_of(slots)) {
            (Some(id), None) if key_unset => id.clone(),
            (None, Some(key)) => key,
            _ => return None,
        };
        cache_key(&key)
    }

    /// Builder predicates, then the `id` shortcut.
    pub fn conditions(&self) -> Result<Vec<Predicate>> {
        let mut result: Vec<Predicate> = self
            .statement
            .conditions
            .iter()
            .map(|c| {
                Ok(Predicate {
                    conjunction: c.conjunction,
                    kind: PredicateKind::Raw(c.fragment.clone()),
                    params: c
                        .params
                        .iter()
                        .map(|v| self.codec.encode_value(v.clone()))
                        .collect::<Result<_>>()?,
                })
            })
            .collect::<Result<_>>()?;
        if let Some(id) = &self.statement.id {
            result.extend(self.key(id.clone())?);
        }
        Ok(result)
    }

    pub fn select(&self, filter: Vec<Predicate>) -> Result<(Select, ProjectionPlan)> {
        let plan = self.projection();
        let order_by = self
            .statement
            .order_by
            .iter()
            .map(|v| match v {
                OrderBy::Fragment(fragment) => Ordering::Raw(fragment.clone()),
                OrderBy::Column(name, order) => Ordering::Column(self.resolve(name).0, *order),
            })
            .collect();
        let joins = self
            .statement
            .joins
            .iter()
            .map(|join| {
                Ok(JoinClause {
                    params: join
                        .params
                        .iter()
                        .map(|v| self.codec.encode_value(v.clone()))
                        .collect::<Result<_>>()?,
                    ..join.clone()
                })
            })
            .collect::<Result<_>>()?;
        let having = match &self.statement.having {
            Some(having) => Some(Condition {
                params: having
                    .params
                    .iter()
                    .map(|v| self.codec.encode_value(v.clone()))
                    .collect::<Result<_>>()?,
                ..having.clone()
            }),
            None => None,
        };
        Ok((
            Select {
                table: self.table_name.to_string(),
                distinct: self.statement.distinct,
                projection: plan.projection.clone(),
                joins,
                filter,
                group_by: self.statement.group_by.clone(),
                having,
                order_by,
                limit: self.statement.limit,
                offset: self.statement.offset,
            },
            plan,
        ))
    }

    /// Columns written by an insert. Zero values are written too, except NULLs and zeros of
    /// columns that declare a default or hold an association without a key. Updates `slots`
    /// with the values the engine assigns (timestamps, version), the caller writes them back
    /// into the entity.
    pub fn insert(&self, slots: &mut [Value], now: OffsetDateTime) -> Result<Insert> {
        let mut insert = Insert {
            table: self.table_name.to_string(),
            columns: Vec::new(),
            values: Vec::new(),
        };
        for column in &self.table.columns {
            let automatic_time =
                (column.created || column.updated) && !self.statement.no_auto_time;
            if automatic_time {
                slots[column.slot] = current_time(&column.prototype, now)?;
            } else if column.version {
                slots[column.slot] = version_one(&column.prototype)?;
            } else {
                let value = &slots[column.slot];
                if column.auto_increment && value.is_zero() {
                    continue;
                }
                if self.is_omitted(column) {
                    continue;
                }
                let listed = self.is_listed(column);
                if !self.statement.columns.is_empty() && !listed {
                    continue;
                }
                let skipped = column.default.is_some()
                    || column.association.is_some()
                    || value.is_null();
                if !listed && skipped && value.is_zero() {
                    continue;
                }
            }
            insert.columns.push(column.name.clone());
            insert
                .values
                .push(self.encode(column, slots[column.slot].clone())?);
        }
        Ok(insert)
    }

    /// Update of the rows chosen by the builder and `filter` (predicates derived from a
    /// condition entity), else by the primary key of `slots`. Without any of them only
    /// `use_bool` or explicit `cols` allow touching the whole table. Updates `slots` with the
    /// new timestamps, the caller bumps the version after a successful execution.
    pub fn update(
        &self,
        slots: &mut [Value],
        filter: Vec<Predicate>,
        now: OffsetDateTime,
    ) -> Result<Update> {
        let mut set = Vec::new();
        if self.statement.columns.is_empty() {
            for column in &self.table.columns {
                if column.primary_key || column.is_automatic() || self.is_omitted(column) {
                    continue;
                }
                let value = &slots[column.slot];
                let included = if column.is_boolean() && self.statement.use_bool {
                    !value.is_null()
                } else {
                    !value.is_zero()
                };
                if included {
                    set.push(Assignment {
                        column: column.name.clone(),
                        value: SetValue::Param(self.encode(column, value.clone())?),
                    });
                }
            }
        } else {
            for name in &self.statement.columns {
                let Some(i) = self.table.column_index(name) else {
                    return Err(MappingError::validation(format!(
                        "`{name}` is not a column of `{}`",
                        self.table.type_name
                    )));
                };
                let column = &self.table.columns[i];
                if column.is_automatic() || self.is_omitted(column) {
                    continue;
                }
                set.push(Assignment {
                    column: column.name.clone(),
                    value: SetValue::Param(self.encode(column, slots[column.slot].clone())?),
                });
            }
        }
        if set.is_empty() {
            return Err(MappingError::validation(format!(
                "Nothing to update in `{}`, every field is zero or omitted",
                self.table.type_name
            )));
        }
        for column in &self.table.columns {
            if column.updated && !self.statement.no_auto_time {
                slots[column.slot] = current_time(&column.prototype, now)?;
                set.push(Assignment {
                    column: column.name.clone(),
                    value: SetValue::Param(self.encode(column, slots[column.slot].clone())?),
                });
            } else if column.version {
                set.push(Assignment {
                    column: column.name.clone(),
                    value: SetValue::Increment(1),
                });
            }
        }
        let mut predicates = self.conditions()?;
        predicates.extend(filter);
        if predicates.is_empty() {
            match self.key_of(slots) {
                Some(key) => predicates = self.key(key)?,
                None if self.statement.use_bool || !self.statement.columns.is_empty() => {}
                None => {
                    return Err(MappingError::validation(format!(
                        "Update of `{}` without a condition or a primary key",
                        self.table.type_name
                    )));
                }
            }
        }
        if let Some(i) = self.table.version {
            let column = &self.table.columns[i];
            let version = &slots[column.slot];
            if !version.is_zero() {
                predicates.push(Predicate {
                    conjunction: Conjunction::And,
                    kind: PredicateKind::Equals(self.column_ref(column)),
                    params: vec![self.encode(column, version.clone())?],
                });
            }
        }
        Ok(Update {
            table: self.table_name.to_string(),
            set,
            filter: predicates,
        })
    }

    pub fn delete(&self, slots: &[Value]) -> Result<Delete> {
        let mut filter = self.conditions()?;
        filter.extend(self.derived(slots)?);
        if filter.is_empty() {
            return Err(MappingError::validation(format!(
                "Delete from `{}` without any condition",
                self.table.type_name
            )));
        }
        Ok(Delete {
            table: self.table_name.to_string(),
            filter,
        })
    }

    /// Decode a row selected with `plan` into one item per slot.
    pub fn decode(&self, plan: &ProjectionPlan, values: Vec<Value>) -> Result<Decoded> {
        decode_row(self.table, &plan.positions, values, self.codec)
    }
}

/// Slot items for [`Entity::read_fields`](crate::Entity::read_fields) and the keys of the
/// associated entities found in the row.
#[derive(Debug, Default)]
pub struct Decoded {
    pub slots: Vec<Option<Value>>,
    /// `(association index, key)`.
    pub associations: Vec<(usize, Value)>,
}

pub fn decode_row(
    table: &TableDescriptor,
    positions: &[Option<usize>],
    values: Vec<Value>,
    codec: Codec,
) -> Result<Decoded> {
    let mut result = Decoded {
        slots: vec![None; table.slots],
        associations: Vec::new(),
    };
    for (position, value) in positions.iter().zip(values) {
        let Some(i) = position else {
            continue;
        };
        let column = &table.columns[*i];
        match &column.association {
            Some(association) => {
                if !value.is_null() {
                    let key = codec.decode(column, value)?;
                    result.associations.push((association.index, key));
                }
            }
            None => result.slots[column.slot] = Some(codec.decode(column, value)?),
        }
    }
    Ok(result)
}

/// Render a select as a complete statement.
pub fn render_select(writer: &dyn SqlWriter, select: &Select) -> Sql {
    let mut sql = Sql::new();
    writer.write_select(&mut sql, select);
    sql.text.push(';');
    sql
}

/// Timestamp of the kind stored in a created or updated column.
pub fn current_time(prototype: &Value, now: OffsetDateTime) -> Result<Value> {
    let seconds = now.unix_timestamp();
    Ok(match prototype {
        Value::Date(..) => Value::Date(Some(now.date())),
        Value::Time(..) => Value::Time(Some(now.time())),
        Value::Timestamp(..) => Value::Timestamp(Some(PrimitiveDateTime::new(now.date(), now.time()))),
        Value::TimestampWithTimezone(..) => Value::TimestampWithTimezone(Some(now)),
        Value::Int32(..) => Value::Int32(Some(i32::try_from(seconds)?)),
        Value::Int64(..) => Value::Int64(Some(seconds)),
        Value::UInt32(..) => Value::UInt32(Some(u32::try_from(seconds)?)),
        Value::UInt64(..) => Value::UInt64(Some(u64::try_from(seconds)?)),
        v => {
            return Err(MappingError::validation(format!(
                "Cannot store a timestamp in a {v:?} column"
            )));
        }
    })
}

fn version_one(prototype: &Value) -> Result<Value> {
    Ok(match prototype {
        Value::Int8(..) => Value::Int8(Some(1)),
        Value::Int16(..) => Value::Int16(Some(1)),
        Value::Int32(..) => Value::Int32(Some(1)),
        Value::Int64(..) => Value::Int64(Some(1)),
        Value::UInt8(..) => Value::UInt8(Some(1)),
        Value::UInt16(..) => Value::UInt16(Some(1)),
        Value::UInt32(..) => Value::UInt32(Some(1)),
        Value::UInt64(..) => Value::UInt64(Some(1)),
        v => {
            return Err(MappingError::validation(format!(
                "A version column cannot be a {v:?}"
            )));
        }
    })
}

/// The version value after a successful update.
pub fn next_version(value: &Value) -> Value {
    match value {
        Value::Int8(v) => Value::Int8(Some(v.unwrap_or(0).wrapping_add(1))),
        Value::Int16(v) => Value::Int16(Some(v.unwrap_or(0).wrapping_add(1))),
        Value::Int32(v) => Value::Int32(Some(v.unwrap_or(0).wrapping_add(1))),
        Value::Int64(v) => Value::Int64(Some(v.unwrap_or(0).wrapping_add(1))),
        Value::UInt8(v) => Value::UInt8(Some(v.unwrap_or(0).wrapping_add(1))),
        Value::UInt16(v) => Value::UInt16(Some(v.unwrap_or(0).wrapping_add(1))),
        Value::UInt32(v) => Value::UInt32(Some(v.unwrap_or(0).wrapping_add(1))),
        Value::UInt64(v) => Value::UInt64(Some(v.unwrap_or(0).wrapping_add(1))),
        v => v.clone(),
    }
}
