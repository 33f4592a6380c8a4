use crate::{
    ColumnDescriptor, MappingError, Result, Value, format_date, format_time, format_timestamp,
    format_timestamp_with_timezone,
};

/// Converts field values to driver values and back.
///
/// The driver sees booleans as integers (unless the backend is configured with native
/// booleans), byte lists as blobs and lists or maps as text literals like `[1,2]` and
/// `{'a':1}`. Decoding is the inverse, guided by the column prototype: the result is a value
/// that the field type accepts in [`AsValue::try_from_value`](crate::AsValue::try_from_value).
#[derive(Debug, Default, Clone, Copy)]
pub struct Codec {
    pub native_bool: bool,
}

impl Codec {
    pub fn new(native_bool: bool) -> Self {
        Self { native_bool }
    }

    pub fn encode(&self, column: &ColumnDescriptor, value: Value) -> Result<Value> {
        self.encode_value(value).map_err(|e| {
            MappingError::type_mismatch(&column.name, format!("{e:#}"))
        })
    }

    /// Encode a value that is not bound to a column, like a filter parameter.
    pub fn encode_value(&self, value: Value) -> Result<Value> {
        Ok(match value {
            Value::Boolean(v) if !self.native_bool => Value::Int32(v.map(i32::from)),
            Value::List(v, inner) if matches!(*inner, Value::UInt8(..)) => match v {
                None => Value::Blob(None),
                Some(v) => Value::Blob(Some(
                    v.into_iter()
                        .map(|v| match v {
                            Value::UInt8(Some(b)) => Ok(b),
                            v => Err(crate::Error::msg(format!(
                                "Unexpected {v:?} in a byte list"
                            ))),
                        })
                        .collect::<Result<_>>()?,
                )),
            },
            v @ (Value::List(..) | Value::Map(..)) => {
                if v.is_null() {
                    Value::Varchar(None)
                } else {
                    let mut out = String::new();
                    write_compound(&mut out, &v)?;
                    Value::Varchar(Some(out))
                }
            }
            v => v,
        })
    }

    pub fn decode(&self, column: &ColumnDescriptor, value: Value) -> Result<Value> {
        let prototype = &column.prototype;
        if value.is_null() {
            if column.optional {
                return Ok(Value::Null);
            }
            return prototype.zero().ok_or_else(|| {
                MappingError::type_mismatch(
                    &column.name,
                    format!("NULL cannot be stored in the non optional field `{}`", column.field),
                )
            });
        }
        Ok(match value {
            Value::Blob(Some(v)) if matches!(prototype, Value::List(..)) => {
                if !prototype.is_binary() {
                    return Err(MappingError::type_mismatch(
                        &column.name,
                        "a blob cannot become a list of non byte values",
                    ));
                }
                Value::List(
                    Some(v.iter().map(|b| Value::UInt8(Some(*b))).collect()),
                    Box::new(Value::UInt8(None)),
                )
            }
            Value::Varchar(..) | Value::Char(..) if prototype.is_binary() => {
                return Err(MappingError::type_mismatch(
                    &column.name,
                    "text cannot become a byte buffer",
                ));
            }
            Value::Varchar(Some(v)) if prototype.is_compound() && v.trim().is_empty() => {
                prototype.zero().unwrap_or(Value::Null)
            }
            Value::Varchar(Some(v))
                if !matches!(prototype, Value::Varchar(..) | Value::Char(..) | Value::Unknown(..)) =>
            {
                Value::Unknown(Some(v))
            }
            v => v,
        })
    }
}

/// Text literal of a list or map, the format parsed back by [`AsValue::extract`](crate::AsValue::extract).
pub fn write_compound(out: &mut String, value: &Value) -> Result<()> {
    match value {
        v if v.is_null() => out.push_str("null"),
        Value::Boolean(Some(v)) => out.push_str(if *v { "true" } else { "false" }),
        Value::Int8(Some(v)) => out.push_str(itoa::Buffer::new().format(*v)),
        Value::Int16(Some(v)) => out.push_str(itoa::Buffer::new().format(*v)),
        Value::Int32(Some(v)) => out.push_str(itoa::Buffer::new().format(*v)),
        Value::Int64(Some(v)) => out.push_str(itoa::Buffer::new().format(*v)),
        Value::UInt8(Some(v)) => out.push_str(itoa::Buffer::new().format(*v)),
        Value::UInt16(Some(v)) => out.push_str(itoa::Buffer::new().format(*v)),
        Value::UInt32(Some(v)) => out.push_str(itoa::Buffer::new().format(*v)),
        Value::UInt64(Some(v)) => out.push_str(itoa::Buffer::new().format(*v)),
        Value::Float32(Some(v)) => out.push_str(ryu::Buffer::new().format(*v)),
        Value::Float64(Some(v)) => out.push_str(ryu::Buffer::new().format(*v)),
        Value::Decimal(Some(v), ..) => out.push_str(&v.to_string()),
        Value::Char(Some(v)) => write_quoted(out, v.encode_utf8(&mut [0; 4])),
        Value::Varchar(Some(v)) | Value::Unknown(Some(v)) => write_quoted(out, v),
        Value::Blob(Some(v)) => {
            out.push('\'');
            out.push_str(&hex::encode(v));
            out.push('\'');
        }
        Value::Date(Some(v)) => write_quoted(out, &format_date(v)?),
        Value::Time(Some(v)) => write_quoted(out, &format_time(v)?),
        Value::Timestamp(Some(v)) => write_quoted(out, &format_timestamp(v)?),
        Value::TimestampWithTimezone(Some(v)) => {
            write_quoted(out, &format_timestamp_with_timezone(v)?)
        }
        Value::Uuid(Some(v)) => write_quoted(out, &v.to_string()),
        Value::List(Some(values), ..) => {
            out.push('[');
            for (i, v) in values.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_compound(out, v)?;
            }
            out.push(']');
        }
        Value::Map(Some(entries), ..) => {
            out.push('{');
            for (i, (k, v)) in entries.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_compound(out, k)?;
                out.push(':');
                write_compound(out, v)?;
            }
            out.push('}');
        }
        _ => out.push_str("null"),
    }
    Ok(())
}

fn write_quoted(out: &mut String, value: &str) {
    out.push('\'');
    for c in value.chars() {
        if c == '\'' {
            out.push('\'');
        }
        out.push(c);
    }
    out.push('\'');
}
