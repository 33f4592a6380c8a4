use crate::{Result, Value};
use std::fmt::Display;

/// A parameterized, backend-prepared query handle.
///
/// Drivers parse the statement once and bind the positional `?` parameters afterwards.
///
/// # Binding Semantics
/// * `bind` appends a value (driver chooses actual placeholder numbering).
/// * `bind_index` sets the parameter at `index` (from 0).
pub trait Prepared: Send + Sync + Display {
    /// Append a parameter value.
    fn bind(&mut self, value: Value) -> Result<&mut Self>;
    /// Bind a value at a specific index.
    fn bind_index(&mut self, value: Value, index: u64) -> Result<&mut Self>;
    /// Remove every bound value, the next `bind` fills the first parameter again.
    fn clear_bindings(&mut self) -> Result<&mut Self>;
}
