mod cache;
mod cascade;
mod iterate;
mod products;
mod schema;
mod simple;
mod transactions;
mod users;
mod values;
mod versioned;

use crate::{
    cache::cache, cascade::cascade, iterate::iterate, products::products, schema::schema,
    simple::simple, transactions::transactions, users::users, values::values,
    versioned::versioned,
};
use keel::{Driver, Engine};
use log::LevelFilter;
use std::env;

pub use log;

pub fn init_logs() {
    let mut logger = env_logger::builder();
    logger
        .is_test(true)
        .format_file(true)
        .format_line_number(true);
    if env::var("RUST_LOG").is_err() {
        logger.filter_level(LevelFilter::Warn);
    }
    let _ = logger.try_init();
}

/// Run every scenario against the database behind `engine`. The scenarios create and drop
/// their own tables.
pub async fn execute_tests<D: Driver>(engine: Engine<D>) {
    simple(&engine).await;
    values(&engine).await;
    users(&engine).await;
    versioned(&engine).await;
    products(&engine).await;
    iterate(&engine).await;
    cascade(&engine).await;
    transactions(&engine).await;
    schema(&engine).await;
    cache(&engine).await;
}

/// Evaluate the code with logging turned off, for failures that are expected.
#[macro_export]
macro_rules! silent_logs {
    ($($code:tt)+) => {{
        let level = $crate::log::max_level();
        $crate::log::set_max_level($crate::log::LevelFilter::Off);
        let result = { $($code)+ };
        $crate::log::set_max_level(level);
        result
    }};
}
