use crate::{Executor, Result, TableMeta};
use std::future::Future;

pub trait Connection: Executor {
    /// Open a connection to the given URL.
    fn connect(url: &str) -> impl Future<Output = Result<Self>> + Send;

    /// Tables, columns and indexes currently present in the database.
    fn db_metas(&mut self) -> impl Future<Output = Result<Vec<TableMeta>>> + Send;
}
