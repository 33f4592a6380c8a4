use crate::{CBox, connection_error};
use keel_core::{
    Error, Prepared, Result, Value, format_date, format_time, format_timestamp,
    format_timestamp_with_timezone, truncate_long,
};
use libsqlite3_sys::*;
use std::{
    ffi::{CStr, c_int},
    fmt::{self, Display},
    os::raw::{c_char, c_void},
};

/// Statement compiled by sqlite, parameters are bound in place.
pub struct SqlitePrepared {
    pub(crate) statement: CBox<*mut sqlite3_stmt>,
    /// Next parameter filled by `bind`, from 0.
    pub(crate) index: u64,
}

impl SqlitePrepared {
    pub(crate) fn new(statement: CBox<*mut sqlite3_stmt>) -> Self {
        unsafe {
            sqlite3_clear_bindings(*statement);
        }
        Self {
            statement,
            index: 0,
        }
    }

    fn bind_text(&mut self, index: c_int, value: &str) -> c_int {
        unsafe {
            sqlite3_bind_text(
                *self.statement,
                index,
                value.as_ptr() as *const c_char,
                value.len() as c_int,
                SQLITE_TRANSIENT(),
            )
        }
    }

    fn bind_integer(&mut self, index: c_int, value: i64) -> c_int {
        unsafe { sqlite3_bind_int64(*self.statement, index, value) }
    }

    fn sql(&self) -> String {
        unsafe {
            let sql = sqlite3_sql(*self.statement);
            if sql.is_null() {
                return String::new();
            }
            CStr::from_ptr(sql).to_string_lossy().into_owned()
        }
    }
}

impl Prepared for SqlitePrepared {
    fn bind(&mut self, value: Value) -> Result<&mut Self> {
        let index = self.index;
        self.bind_index(value, index)
    }

    fn bind_index(&mut self, value: Value, index: u64) -> Result<&mut Self> {
        let position = index as c_int + 1;
        let rc = match value {
            v if v.is_null() => unsafe { sqlite3_bind_null(*self.statement, position) },
            Value::Boolean(Some(v)) => self.bind_integer(position, v as i64),
            Value::Int8(Some(v)) => self.bind_integer(position, v as i64),
            Value::Int16(Some(v)) => self.bind_integer(position, v as i64),
            Value::Int32(Some(v)) => self.bind_integer(position, v as i64),
            Value::Int64(Some(v)) => self.bind_integer(position, v),
            Value::UInt8(Some(v)) => self.bind_integer(position, v as i64),
            Value::UInt16(Some(v)) => self.bind_integer(position, v as i64),
            Value::UInt32(Some(v)) => self.bind_integer(position, v as i64),
            Value::UInt64(Some(v)) => {
                let Ok(v) = i64::try_from(v) else {
                    let error = Error::msg(format!(
                        "Cannot bind the u64 value `{v}` into a sqlite integer, it is out of bounds"
                    ));
                    log::error!("{:#}", error);
                    return Err(error);
                };
                self.bind_integer(position, v)
            }
            Value::Float32(Some(v)) => unsafe {
                sqlite3_bind_double(*self.statement, position, v as f64)
            },
            Value::Float64(Some(v)) => unsafe {
                sqlite3_bind_double(*self.statement, position, v)
            },
            Value::Decimal(Some(v), ..) => self.bind_text(position, &v.to_string()),
            Value::Char(Some(v)) => self.bind_text(position, v.encode_utf8(&mut [0; 4])),
            Value::Varchar(Some(v)) | Value::Unknown(Some(v)) => self.bind_text(position, &v),
            Value::Blob(Some(v)) => unsafe {
                sqlite3_bind_blob(
                    *self.statement,
                    position,
                    v.as_ptr() as *const c_void,
                    v.len() as c_int,
                    SQLITE_TRANSIENT(),
                )
            },
            Value::Date(Some(v)) => self.bind_text(position, &format_date(&v)?),
            Value::Time(Some(v)) => self.bind_text(position, &format_time(&v)?),
            Value::Timestamp(Some(v)) => self.bind_text(position, &format_timestamp(&v)?),
            Value::TimestampWithTimezone(Some(v)) => {
                self.bind_text(position, &format_timestamp_with_timezone(&v)?)
            }
            Value::Uuid(Some(v)) => self.bind_text(position, &v.to_string()),
            _ => {
                let error = Error::msg(format!("Cannot use a {:?} as a query parameter", value));
                log::error!("{:#}", error);
                return Err(error);
            }
        };
        if rc != SQLITE_OK {
            let connection = unsafe { sqlite3_db_handle(*self.statement) };
            let sql = self.sql();
            let error = connection_error(connection).context(format!(
                "Cannot bind parameter {} to query:\n{}",
                index,
                truncate_long!(sql)
            ));
            log::error!("{:#}", error);
            return Err(error);
        }
        self.index = index + 1;
        Ok(self)
    }

    fn clear_bindings(&mut self) -> Result<&mut Self> {
        unsafe {
            sqlite3_reset(*self.statement);
            sqlite3_clear_bindings(*self.statement);
        }
        self.index = 0;
        Ok(self)
    }
}

impl Display for SqlitePrepared {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sql = self.sql();
        write!(f, "{}", truncate_long!(sql))
    }
}

impl fmt::Debug for SqlitePrepared {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqlitePrepared")
            .field("statement", &self.sql())
            .field("index", &self.index)
            .finish()
    }
}
