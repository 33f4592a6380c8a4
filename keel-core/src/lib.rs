mod as_value;
mod cache;
mod codec;
mod connection;
mod descriptor;
mod driver;
mod engine;
mod entity;
mod error;
mod executor;
mod metadata;
mod naming;
mod planner;
mod prepared;
mod query;
mod reflector;
mod session;
mod sql_writer;
mod statement;
mod tag;
mod util;
mod value;

pub use ::anyhow::Context;
pub use as_value::*;
pub use cache::*;
pub use codec::*;
pub use connection::*;
pub use descriptor::*;
pub use driver::*;
pub use engine::*;
pub use entity::*;
pub use error::*;
pub use executor::*;
pub use metadata::*;
pub use naming::*;
pub use planner::*;
pub use prepared::*;
pub use query::*;
pub use reflector::*;
pub use session::*;
pub use sql_writer::*;
pub use statement::*;
pub use tag::*;
pub use util::*;
pub use value::*;
pub mod stream {
    pub use ::futures::stream::*;
}
pub use ::futures::future;

pub type Result<T> = anyhow::Result<T>;
pub type Error = anyhow::Error;
