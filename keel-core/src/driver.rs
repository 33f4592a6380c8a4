use crate::{Connection, Prepared, SqlWriter};

/// Entry point of a backend: names the connection, prepared statement and dialect types.
pub trait Driver: Send + Sync + Sized + 'static {
    type Connection: Connection<Driver = Self>;
    type SqlWriter: SqlWriter;
    type Prepared: Prepared;

    /// Scheme of the connection URLs, like `sqlite` in `sqlite://file.db`.
    const NAME: &'static str;

    fn sql_writer(&self) -> Self::SqlWriter;
}
