use crate::{Driver, Error, Prepared, Result, Value, truncate_long};
use std::sync::Arc;

/// Statement handed to an [`Executor`](crate::Executor): SQL text run as a script, or a
/// statement the driver prepared and the session bound the parameters of.
#[derive(Debug)]
pub enum Query<D: Driver> {
    Raw(String),
    Prepared(D::Prepared),
}

impl<D: Driver> Query<D> {
    pub fn is_prepared(&self) -> bool {
        matches!(self, Query::Prepared(..))
    }

    /// Prepared handle, for binding by position or resetting the parameters.
    pub fn prepared(&mut self) -> Result<&mut D::Prepared> {
        match self {
            Query::Prepared(prepared) => Ok(prepared),
            Query::Raw(sql) => Err(Error::msg(format!(
                "Raw SQL takes no parameters: `{}`",
                truncate_long!(sql)
            ))),
        }
    }

    /// Bind the next parameter.
    pub fn bind(&mut self, value: impl Into<Value>) -> Result<&mut Self> {
        self.prepared()?.bind(value.into())?;
        Ok(self)
    }
}

/// Outcome of an INSERT, UPDATE or DELETE. The counts of a script add up.
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowsAffected {
    pub rows_affected: u64,
    /// Key generated by the last insert, when the backend reports one.
    pub last_affected_id: Option<i64>,
    /// A versioned update matched no row: the in-memory version is stale or the row is gone.
    pub conflict: bool,
}

impl Extend<RowsAffected> for RowsAffected {
    fn extend<T: IntoIterator<Item = RowsAffected>>(&mut self, iter: T) {
        for item in iter {
            self.rows_affected += item.rows_affected;
            self.last_affected_id = item.last_affected_id.or(self.last_affected_id);
            self.conflict |= item.conflict;
        }
    }
}

/// Column labels shared by every row of one result.
pub type RowNames = Arc<[String]>;
pub type Row = Box<[Value]>;

/// A fetched row, `values[i]` is labeled `labels[i]`.
#[derive(Debug, Clone, PartialEq)]
pub struct RowLabeled {
    pub labels: RowNames,
    pub values: Row,
}

impl RowLabeled {
    pub fn new(labels: RowNames, values: Row) -> Self {
        Self { labels, values }
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Value of the first column labeled `label`.
    pub fn get_column(&self, label: &str) -> Option<&Value> {
        self.labels
            .iter()
            .position(|v| v == label)
            .map(|i| &self.values[i])
    }
}

/// Item of [`Executor::run`](crate::Executor::run).
#[derive(Debug)]
pub enum QueryResult {
    Row(RowLabeled),
    Affected(RowsAffected),
}
