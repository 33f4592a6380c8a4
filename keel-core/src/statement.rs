use crate::{Declaration, Entity, MappingError, Value};
use std::fmt::{self, Display};

/// How a predicate is attached to the ones before it.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum Conjunction {
    #[default]
    And,
    Or,
}

/// A raw predicate with its `?` parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    pub conjunction: Conjunction,
    pub fragment: String,
    pub params: Vec<Value>,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum JoinType {
    #[default]
    Inner,
    Left,
    Right,
    Full,
    Cross,
}

impl Display for JoinType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            JoinType::Inner => "INNER JOIN",
            JoinType::Left => "LEFT JOIN",
            JoinType::Right => "RIGHT JOIN",
            JoinType::Full => "FULL OUTER JOIN",
            JoinType::Cross => "CROSS JOIN",
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct JoinClause {
    pub join_type: JoinType,
    pub table: String,
    pub on: String,
    pub params: Vec<Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Order {
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq)]
pub enum OrderBy {
    /// Raw ordering text, kept verbatim.
    Fragment(String),
    /// Column name, resolved and quoted when rendered.
    Column(String, Order),
}

/// Table used instead of the one of the entity.
#[derive(Debug, Clone)]
pub enum TableTarget {
    Name(String),
    Entity(&'static Declaration),
}

/// Accumulated state of the next terminal operation.
///
/// Every builder call on a session appends here, every terminal operation takes the whole
/// state (leaving a fresh one behind) whether it succeeds or not.
#[derive(Debug, Default, Clone)]
pub struct Statement {
    pub conditions: Vec<Condition>,
    /// Primary key values from [`Statement::id`].
    pub id: Option<Vec<Value>>,
    pub columns: Vec<String>,
    pub omit: Vec<String>,
    pub joins: Vec<JoinClause>,
    pub group_by: Option<String>,
    pub having: Option<Condition>,
    pub order_by: Vec<OrderBy>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
    pub distinct: bool,
    pub table: Option<TableTarget>,
    pub no_cache: bool,
    pub use_bool: bool,
    pub no_auto_time: bool,
    /// Raised by the terminal operation, before anything reaches the database.
    pub pending_error: Option<MappingError>,
}

/// Positional parameters of a raw fragment.
///
/// Implemented for `()`, vectors, arrays and tuples (up to eight elements) of anything that
/// converts into a [`Value`].
pub trait Params {
    fn into_values(self) -> Vec<Value>;
}

impl Params for () {
    fn into_values(self) -> Vec<Value> {
        Vec::new()
    }
}

impl<T: Into<Value>> Params for Vec<T> {
    fn into_values(self) -> Vec<Value> {
        self.into_iter().map(Into::into).collect()
    }
}

impl<T: Into<Value>, const N: usize> Params for [T; N] {
    fn into_values(self) -> Vec<Value> {
        self.into_iter().map(Into::into).collect()
    }
}

macro_rules! impl_params {
    ($($name:ident),+) => {
        impl<$($name: Into<Value>),+> Params for ($($name,)+) {
            #[allow(non_snake_case)]
            fn into_values(self) -> Vec<Value> {
                let ($($name,)+) = self;
                vec![$($name.into()),+]
            }
        }
    };
}
impl_params!(A);
impl_params!(A, B);
impl_params!(A, B, C);
impl_params!(A, B, C, D);
impl_params!(A, B, C, D, E);
impl_params!(A, B, C, D, E, F);
impl_params!(A, B, C, D, E, F, G);
impl_params!(A, B, C, D, E, F, G, H);

impl Statement {
    pub fn new() -> Self {
        Self::default()
    }

    fn push_condition(&mut self, conjunction: Conjunction, fragment: &str, params: Vec<Value>) {
        self.conditions.push(Condition {
            conjunction,
            fragment: fragment.trim().to_string(),
            params,
        });
    }

    /// Raw predicate with `?` placeholders, ANDed with the others.
    pub fn filter(&mut self, fragment: &str, params: impl Params) -> &mut Self {
        self.push_condition(Conjunction::And, fragment, params.into_values());
        self
    }

    pub fn and(&mut self, fragment: &str, params: impl Params) -> &mut Self {
        self.push_condition(Conjunction::And, fragment, params.into_values());
        self
    }

    pub fn or(&mut self, fragment: &str, params: impl Params) -> &mut Self {
        self.push_condition(Conjunction::Or, fragment, params.into_values());
        self
    }

    /// `column IN (?, ...)`. An empty list is rejected by the terminal operation.
    pub fn in_list<V: Into<Value>>(
        &mut self,
        column: &str,
        values: impl IntoIterator<Item = V>,
    ) -> &mut Self {
        let values: Vec<Value> = values.into_iter().map(Into::into).collect();
        if values.is_empty() {
            self.pending_error.get_or_insert(MappingError::Validation(format!(
                "`in_list` on `{column}` needs at least one value"
            )));
            return self;
        }
        let mut fragment = String::with_capacity(column.len() + 6 + values.len() * 3);
        fragment.push_str(column);
        fragment.push_str(" IN (");
        for i in 0..values.len() {
            if i > 0 {
                fragment.push_str(", ");
            }
            fragment.push('?');
        }
        fragment.push(')');
        self.push_condition(Conjunction::And, &fragment, values);
        self
    }

    /// Primary key equality, one value per key column in declaration order.
    pub fn id(&mut self, key: impl Params) -> &mut Self {
        self.id = Some(key.into_values());
        self
    }

    pub fn cols<S: Into<String>>(&mut self, columns: impl IntoIterator<Item = S>) -> &mut Self {
        self.columns.extend(columns.into_iter().map(Into::into));
        self
    }

    pub fn omit<S: Into<String>>(&mut self, columns: impl IntoIterator<Item = S>) -> &mut Self {
        self.omit.extend(columns.into_iter().map(Into::into));
        self
    }

    pub fn table(&mut self, name: impl Into<String>) -> &mut Self {
        self.table = Some(TableTarget::Name(name.into()));
        self
    }

    pub fn table_of<E: Entity>(&mut self) -> &mut Self {
        self.table = Some(TableTarget::Entity(E::declaration()));
        self
    }

    pub fn join(
        &mut self,
        join_type: JoinType,
        table: impl Into<String>,
        on: &str,
        params: impl Params,
    ) -> &mut Self {
        self.joins.push(JoinClause {
            join_type,
            table: table.into(),
            on: on.trim().to_string(),
            params: params.into_values(),
        });
        self
    }

    pub fn group_by(&mut self, fragment: &str) -> &mut Self {
        self.group_by = Some(fragment.trim().to_string());
        self
    }

    pub fn having(&mut self, fragment: &str, params: impl Params) -> &mut Self {
        self.having = Some(Condition {
            conjunction: Conjunction::And,
            fragment: fragment.trim().to_string(),
            params: params.into_values(),
        });
        self
    }

    pub fn order_by(&mut self, fragment: &str) -> &mut Self {
        self.order_by
            .push(OrderBy::Fragment(fragment.trim().to_string()));
        self
    }

    pub fn asc<S: Into<String>>(&mut self, columns: impl IntoIterator<Item = S>) -> &mut Self {
        self.order_by.extend(
            columns
                .into_iter()
                .map(|c| OrderBy::Column(c.into(), Order::Asc)),
        );
        self
    }

    pub fn desc<S: Into<String>>(&mut self, columns: impl IntoIterator<Item = S>) -> &mut Self {
        self.order_by.extend(
            columns
                .into_iter()
                .map(|c| OrderBy::Column(c.into(), Order::Desc)),
        );
        self
    }

    pub fn limit(&mut self, limit: u64) -> &mut Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(&mut self, offset: u64) -> &mut Self {
        self.offset = Some(offset);
        self
    }

    pub fn distinct(&mut self) -> &mut Self {
        self.distinct = true;
        self
    }

    pub fn no_cache(&mut self) -> &mut Self {
        self.no_cache = true;
        self
    }

    /// Boolean fields take part in derived conditions and update sets even when `false`.
    pub fn use_bool(&mut self) -> &mut Self {
        self.use_bool = true;
        self
    }

    pub fn no_auto_time(&mut self) -> &mut Self {
        self.no_auto_time = true;
        self
    }

    /// Nothing restricts the rows, apart from what the operation derives from its arguments.
    pub fn has_conditions(&self) -> bool {
        !self.conditions.is_empty() || self.id.is_some()
    }

    /// Default projection and no ordering, joins or grouping: a plain lookup by key.
    pub fn is_plain_lookup(&self) -> bool {
        self.conditions.is_empty()
            && self.columns.is_empty()
            && self.omit.is_empty()
            && self.joins.is_empty()
            && self.group_by.is_none()
            && self.having.is_none()
            && self.order_by.is_empty()
            && self.offset.is_none()
            && !self.distinct
            && self.table.is_none()
            && !self.no_cache
    }
}
