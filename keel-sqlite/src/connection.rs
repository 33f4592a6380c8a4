use crate::{
    CBox, SqliteDriver, SqlitePrepared, connection_error,
    extract::{extract_name, extract_value},
};
use async_stream::try_stream;
use keel_core::{
    ColumnMeta, Connection, Context, Driver, Error, Executor, IndexMeta, Query, QueryResult,
    Result, Row, RowLabeled, RowNames, RowsAffected, TableMeta, Value,
    future::Either,
    stream::{Stream, StreamExt, TryStreamExt},
    truncate_long,
};
use libsqlite3_sys::{
    SQLITE_DONE, SQLITE_OK, SQLITE_OPEN_CREATE, SQLITE_OPEN_READWRITE, SQLITE_OPEN_URI,
    SQLITE_ROW, sqlite3, sqlite3_busy_timeout, sqlite3_close, sqlite3_column_count,
    sqlite3_db_handle, sqlite3_finalize, sqlite3_last_insert_rowid, sqlite3_open_v2,
    sqlite3_prepare_v2, sqlite3_step, sqlite3_stmt, sqlite3_total_changes64,
};
use std::{
    ffi::{CString, c_char, c_int},
    pin::pin,
    ptr,
    sync::atomic::{AtomicPtr, Ordering},
};
use tokio::task::spawn_blocking;

/// Milliseconds a statement waits on a locked database before failing.
const BUSY_TIMEOUT: c_int = 5000;

/// Connection to a sqlite database file, opened from `sqlite://<path>[?<uri parameters>]`.
///
/// `sqlite://:memory:` opens a private in memory database, it lives as long as the connection.
pub struct SqliteConnection {
    pub(crate) connection: CBox<*mut sqlite3>,
}

type Statement = CBox<*mut sqlite3_stmt>;

/// Compile the first statement of `sql`, returning it (`None` for blanks and comments) with the
/// text left after it.
fn prepare_one(connection: *mut sqlite3, sql: &[u8]) -> Result<(Option<Statement>, &[u8])> {
    unsafe {
        let mut statement = CBox::new(ptr::null_mut(), |p| {
            sqlite3_finalize(p);
        });
        let mut tail: *const c_char = ptr::null();
        let rc = sqlite3_prepare_v2(
            connection,
            sql.as_ptr() as *const c_char,
            sql.len() as c_int,
            &mut *statement,
            &mut tail,
        );
        if rc != SQLITE_OK {
            return Err(connection_error(connection));
        }
        let consumed = if tail.is_null() {
            sql.len()
        } else {
            (tail as usize).saturating_sub(sql.as_ptr() as usize).min(sql.len())
        };
        let rest = if consumed == 0 {
            &sql[sql.len()..]
        } else {
            &sql[consumed..]
        };
        let statement = (!statement.is_null()).then_some(statement);
        Ok((statement, rest))
    }
}

fn total_changes(statement: &Statement) -> i64 {
    unsafe { sqlite3_total_changes64(sqlite3_db_handle(**statement)) }
}

fn affected(statement: &Statement, before: i64) -> RowsAffected {
    unsafe {
        let connection = sqlite3_db_handle(**statement);
        let rows = sqlite3_total_changes64(connection) - before;
        RowsAffected {
            rows_affected: rows.max(0) as u64,
            last_affected_id: (rows > 0).then(|| sqlite3_last_insert_rowid(connection)),
            conflict: false,
        }
    }
}

/// Step the statement to completion: one item per row, or the affected count when the
/// statement returns no columns. The first error ends the stream.
fn run_statement(statement: Statement) -> impl Stream<Item = Result<QueryResult>> + Send {
    try_stream! {
        let count = unsafe { sqlite3_column_count(*statement) };
        let labels = (0..count)
            .map(|i| extract_name(*statement, i))
            .collect::<Result<RowNames>>()?;
        let before = total_changes(&statement);
        loop {
            match unsafe { sqlite3_step(*statement) } {
                SQLITE_ROW => {
                    let values = (0..count)
                        .map(|i| extract_value(*statement, i))
                        .collect::<Result<Row>>()?;
                    yield QueryResult::Row(RowLabeled::new(labels.clone(), values));
                }
                SQLITE_DONE => {
                    if count == 0 {
                        yield QueryResult::Affected(affected(&statement, before));
                    }
                    break;
                }
                _ => {
                    let error = connection_error(unsafe { sqlite3_db_handle(*statement) });
                    log::error!("{:#}", error);
                    Err::<(), Error>(error)?;
                }
            }
        }
    }
}

impl SqliteConnection {
    /// Run every statement of a script, in order.
    pub(crate) fn run_unprepared(
        &mut self,
        sql: String,
    ) -> impl Stream<Item = Result<QueryResult>> + Send {
        let connection = CBox::new(*self.connection, |_| {});
        try_stream! {
            let context = format!("While executing:\n{}", truncate_long!(sql));
            let sql = CString::new(sql).context("The query contains a NUL character")?;
            let mut rest = sql.as_bytes();
            while !rest.iter().all(u8::is_ascii_whitespace) {
                let (statement, tail) = prepare_one(*connection, rest).context(context.clone())?;
                rest = tail;
                let Some(statement) = statement else {
                    continue;
                };
                let mut stream = pin!(run_statement(statement));
                while let Some(value) = stream.next().await {
                    yield value?;
                }
            }
        }
    }

    async fn rows(&mut self, sql: String) -> Result<Vec<RowLabeled>> {
        self.fetch(Query::Raw(sql)).try_collect().await
    }
}

fn text(row: &RowLabeled, label: &str) -> Option<String> {
    match row.get_column(label) {
        Some(Value::Varchar(Some(v))) => Some(v.clone()),
        Some(Value::Int64(Some(v))) => Some(v.to_string()),
        Some(Value::Float64(Some(v))) => Some(v.to_string()),
        _ => None,
    }
}

fn integer(row: &RowLabeled, label: &str) -> i64 {
    match row.get_column(label) {
        Some(Value::Int64(Some(v))) => *v,
        _ => 0,
    }
}

fn quoted(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

impl Executor for SqliteConnection {
    type Driver = SqliteDriver;

    fn driver(&self) -> &Self::Driver {
        &SqliteDriver {}
    }

    async fn prepare(&mut self, query: String) -> Result<Query<SqliteDriver>> {
        let connection = AtomicPtr::new(*self.connection);
        let context = format!("While preparing the query:\n{}", truncate_long!(query));
        let prepared = spawn_blocking(move || {
            let connection = connection.load(Ordering::Relaxed);
            let (statement, rest) = prepare_one(connection, query.as_bytes())?;
            if !rest.iter().all(u8::is_ascii_whitespace) {
                return Err(Error::msg("Cannot prepare more than one statement at a time"));
            }
            statement.ok_or_else(|| Error::msg("The query is empty"))
        })
        .await?
        .context(context)
        .map_err(|e| {
            log::error!("{:#}", e);
            e
        })?;
        Ok(Query::Prepared(SqlitePrepared::new(prepared)))
    }

    fn run(&mut self, query: Query<SqliteDriver>) -> impl Stream<Item = Result<QueryResult>> + Send {
        match query {
            Query::Raw(sql) => Either::Left(self.run_unprepared(sql)),
            Query::Prepared(prepared) => Either::Right(run_statement(prepared.statement)),
        }
    }
}

impl Connection for SqliteConnection {
    async fn connect(url: &str) -> Result<SqliteConnection> {
        let prefix = format!("{}://", <Self::Driver as Driver>::NAME);
        let Some(path) = url.strip_prefix(&prefix) else {
            let error = Error::msg(format!(
                "Expected sqlite connection url to start with `{}`",
                &prefix
            ));
            log::error!("{:#}", error);
            return Err(error);
        };
        let context = || format!("Error while decoding connection URL: `{}`", url);
        let filename = CString::new(format!("file:{path}")).with_context(context)?;
        let mut connection = CBox::new(ptr::null_mut(), |p| {
            unsafe { sqlite3_close(p) };
        });
        let rc = unsafe {
            sqlite3_open_v2(
                filename.as_ptr(),
                &mut *connection,
                SQLITE_OPEN_URI | SQLITE_OPEN_READWRITE | SQLITE_OPEN_CREATE,
                ptr::null(),
            )
        };
        if rc != SQLITE_OK {
            let error = if connection.is_null() {
                Error::msg("Out of memory while opening the database")
            } else {
                connection_error(*connection)
            }
            .context(format!("Cannot open `{}`", url));
            log::error!("{:#}", error);
            return Err(error);
        }
        unsafe {
            sqlite3_busy_timeout(*connection, BUSY_TIMEOUT);
        }
        log::debug!("Connected to {}", url);
        Ok(Self { connection })
    }

    async fn db_metas(&mut self) -> Result<Vec<TableMeta>> {
        let tables = self
            .rows(
                "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name;"
                    .into(),
            )
            .await
            .context("While listing the tables")?;
        let mut result = Vec::with_capacity(tables.len());
        for table in tables {
            let Some(name) = text(&table, "name") else {
                continue;
            };
            let columns = self
                .rows(format!("PRAGMA table_info({});", quoted(&name)))
                .await
                .with_context(|| format!("While reading the columns of `{name}`"))?
                .iter()
                .map(|row| ColumnMeta {
                    name: text(row, "name").unwrap_or_default(),
                    sql_type: text(row, "type").unwrap_or_default(),
                    nullable: integer(row, "notnull") == 0 && integer(row, "pk") == 0,
                    default: text(row, "dflt_value"),
                    primary_key: integer(row, "pk") > 0,
                })
                .collect();
            let mut indexes = Vec::new();
            for index in self
                .rows(format!("PRAGMA index_list({});", quoted(&name)))
                .await
                .with_context(|| format!("While reading the indexes of `{name}`"))?
            {
                // Only indexes created explicitly, constraints get an automatic one.
                if text(&index, "origin").as_deref() != Some("c") {
                    continue;
                }
                let Some(index_name) = text(&index, "name") else {
                    continue;
                };
                let columns = self
                    .rows(format!("PRAGMA index_info({});", quoted(&index_name)))
                    .await?
                    .iter()
                    .filter_map(|row| text(row, "name"))
                    .collect();
                indexes.push(IndexMeta {
                    name: index_name,
                    columns,
                    unique: integer(&index, "unique") != 0,
                });
            }
            result.push(TableMeta {
                name,
                columns,
                indexes,
            });
        }
        Ok(result)
    }
}
