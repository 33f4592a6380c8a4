use rust_decimal::Decimal;
use time::{Date, OffsetDateTime, PrimitiveDateTime, Time};
use uuid::Uuid;

/// Dynamically typed value exchanged with the drivers.
///
/// Every variant carries an `Option`: `None` is the typed NULL, which is also what
/// [`AsValue::as_empty_value`](crate::AsValue::as_empty_value) returns and what the
/// reflector stores as the column prototype.
#[derive(Default, Debug, Clone)]
pub enum Value {
    #[default]
    Null,
    Boolean(Option<bool>),
    Int8(Option<i8>),
    Int16(Option<i16>),
    Int32(Option<i32>),
    Int64(Option<i64>),
    UInt8(Option<u8>),
    UInt16(Option<u16>),
    UInt32(Option<u32>),
    UInt64(Option<u64>),
    Float32(Option<f32>),
    Float64(Option<f64>),
    Decimal(Option<Decimal>, /* prec: */ u8, /* scale: */ u8),
    Char(Option<char>),
    Varchar(Option<String>),
    Blob(Option<Box<[u8]>>),
    Date(Option<Date>),
    Time(Option<Time>),
    Timestamp(Option<PrimitiveDateTime>),
    TimestampWithTimezone(Option<OffsetDateTime>),
    Uuid(Option<Uuid>),
    List(Option<Vec<Value>>, /* type: */ Box<Value>),
    Map(
        Option<Vec<(Value, Value)>>,
        /* key: */ Box<Value>,
        /* value: */ Box<Value>,
    ),
    /// Text whose type is decided by the reader, parsed through [`AsValue::parse`](crate::AsValue::parse).
    Unknown(Option<String>),
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Boolean(l), Self::Boolean(r)) => l == r,
            (Self::Int8(l), Self::Int8(r)) => l == r,
            (Self::Int16(l), Self::Int16(r)) => l == r,
            (Self::Int32(l), Self::Int32(r)) => l == r,
            (Self::Int64(l), Self::Int64(r)) => l == r,
            (Self::UInt8(l), Self::UInt8(r)) => l == r,
            (Self::UInt16(l), Self::UInt16(r)) => l == r,
            (Self::UInt32(l), Self::UInt32(r)) => l == r,
            (Self::UInt64(l), Self::UInt64(r)) => l == r,
            (Self::Float32(l), Self::Float32(r)) => l == r,
            (Self::Float64(l), Self::Float64(r)) => l == r,
            (Self::Decimal(l, ..), Self::Decimal(r, ..)) => l == r,
            (Self::Char(l), Self::Char(r)) => l == r,
            (Self::Varchar(l), Self::Varchar(r)) => l == r,
            (Self::Blob(l), Self::Blob(r)) => l == r,
            (Self::Date(l), Self::Date(r)) => l == r,
            (Self::Time(l), Self::Time(r)) => l == r,
            (Self::Timestamp(l), Self::Timestamp(r)) => l == r,
            (Self::TimestampWithTimezone(l), Self::TimestampWithTimezone(r)) => l == r,
            (Self::Uuid(l), Self::Uuid(r)) => l == r,
            (Self::List(l, ..), Self::List(r, ..)) => l == r && self.same_type(other),
            (Self::Map(l, ..), Self::Map(r, ..)) => l == r && self.same_type(other),
            (Self::Unknown(l), Self::Unknown(r)) => l == r,
            _ => self.is_null() && other.is_null() && self.same_type(other),
        }
    }
}

impl Value {
    pub fn same_type(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::List(.., l), Self::List(.., r)) => l.same_type(r),
            (Self::Map(.., l_key, l_value), Self::Map(.., r_key, r_value)) => {
                l_key.same_type(r_key) && l_value.same_type(r_value)
            }
            _ => core::mem::discriminant(self) == core::mem::discriminant(other),
        }
    }

    pub fn is_null(&self) -> bool {
        match self {
            Value::Null => true,
            Value::Boolean(v) => v.is_none(),
            Value::Int8(v) => v.is_none(),
            Value::Int16(v) => v.is_none(),
            Value::Int32(v) => v.is_none(),
            Value::Int64(v) => v.is_none(),
            Value::UInt8(v) => v.is_none(),
            Value::UInt16(v) => v.is_none(),
            Value::UInt32(v) => v.is_none(),
            Value::UInt64(v) => v.is_none(),
            Value::Float32(v) => v.is_none(),
            Value::Float64(v) => v.is_none(),
            Value::Decimal(v, ..) => v.is_none(),
            Value::Char(v) => v.is_none(),
            Value::Varchar(v) => v.is_none(),
            Value::Blob(v) => v.is_none(),
            Value::Date(v) => v.is_none(),
            Value::Time(v) => v.is_none(),
            Value::Timestamp(v) => v.is_none(),
            Value::TimestampWithTimezone(v) => v.is_none(),
            Value::Uuid(v) => v.is_none(),
            Value::List(v, ..) => v.is_none(),
            Value::Map(v, ..) => v.is_none(),
            Value::Unknown(v) => v.is_none(),
        }
    }

    /// True for NULL and for the natural zero of each type: `0`, `0.0`, `false`, empty text,
    /// blobs and containers, the nil uuid and the `'\0'` char.
    pub fn is_zero(&self) -> bool {
        match self {
            Value::Boolean(Some(v)) => !v,
            Value::Int8(Some(v)) => *v == 0,
            Value::Int16(Some(v)) => *v == 0,
            Value::Int32(Some(v)) => *v == 0,
            Value::Int64(Some(v)) => *v == 0,
            Value::UInt8(Some(v)) => *v == 0,
            Value::UInt16(Some(v)) => *v == 0,
            Value::UInt32(Some(v)) => *v == 0,
            Value::UInt64(Some(v)) => *v == 0,
            Value::Float32(Some(v)) => *v == 0.0,
            Value::Float64(Some(v)) => *v == 0.0,
            Value::Decimal(Some(v), ..) => v.is_zero(),
            Value::Char(Some(v)) => *v == '\0',
            Value::Varchar(Some(v)) => v.is_empty(),
            Value::Blob(Some(v)) => v.is_empty(),
            Value::Uuid(Some(v)) => v.is_nil(),
            Value::List(Some(v), ..) => v.is_empty(),
            Value::Map(Some(v), ..) => v.is_empty(),
            Value::Unknown(Some(v)) => v.is_empty(),
            _ => self.is_null(),
        }
    }

    /// The non-null zero of the same type, `None` for types without a natural zero (temporal ones).
    pub fn zero(&self) -> Option<Value> {
        Some(match self {
            Value::Boolean(..) => Value::Boolean(Some(false)),
            Value::Int8(..) => Value::Int8(Some(0)),
            Value::Int16(..) => Value::Int16(Some(0)),
            Value::Int32(..) => Value::Int32(Some(0)),
            Value::Int64(..) => Value::Int64(Some(0)),
            Value::UInt8(..) => Value::UInt8(Some(0)),
            Value::UInt16(..) => Value::UInt16(Some(0)),
            Value::UInt32(..) => Value::UInt32(Some(0)),
            Value::UInt64(..) => Value::UInt64(Some(0)),
            Value::Float32(..) => Value::Float32(Some(0.0)),
            Value::Float64(..) => Value::Float64(Some(0.0)),
            Value::Decimal(.., prec, scale) => Value::Decimal(Some(Decimal::ZERO), *prec, *scale),
            Value::Char(..) => Value::Char(Some('\0')),
            Value::Varchar(..) => Value::Varchar(Some(String::new())),
            Value::Blob(..) => Value::Blob(Some(Box::new([]))),
            Value::Uuid(..) => Value::Uuid(Some(Uuid::nil())),
            Value::List(.., inner) => Value::List(Some(Vec::new()), inner.clone()),
            Value::Map(.., key, value) => Value::Map(Some(Vec::new()), key.clone(), value.clone()),
            _ => return None,
        })
    }

    pub fn is_integer(&self) -> bool {
        matches!(
            self,
            Value::Int8(..)
                | Value::Int16(..)
                | Value::Int32(..)
                | Value::Int64(..)
                | Value::UInt8(..)
                | Value::UInt16(..)
                | Value::UInt32(..)
                | Value::UInt64(..)
        )
    }

    pub fn is_temporal(&self) -> bool {
        matches!(
            self,
            Value::Date(..) | Value::Time(..) | Value::Timestamp(..) | Value::TimestampWithTimezone(..)
        )
    }

    /// Byte buffers: blobs and lists of `u8`.
    pub fn is_binary(&self) -> bool {
        match self {
            Value::Blob(..) => true,
            Value::List(.., inner) => matches!(inner.as_ref(), Value::UInt8(..)),
            _ => false,
        }
    }

    /// Lists (other than byte buffers) and maps.
    pub fn is_compound(&self) -> bool {
        matches!(self, Value::List(..) | Value::Map(..)) && !self.is_binary()
    }

    /// Canonical text used to key rows by primary key, `None` for NULL and non keyable types.
    pub fn as_key(&self) -> Option<String> {
        let mut buffer = itoa::Buffer::new();
        Some(match self {
            Value::Boolean(Some(v)) => (if *v { "1" } else { "0" }).into(),
            Value::Int8(Some(v)) => buffer.format(*v).into(),
            Value::Int16(Some(v)) => buffer.format(*v).into(),
            Value::Int32(Some(v)) => buffer.format(*v).into(),
            Value::Int64(Some(v)) => buffer.format(*v).into(),
            Value::UInt8(Some(v)) => buffer.format(*v).into(),
            Value::UInt16(Some(v)) => buffer.format(*v).into(),
            Value::UInt32(Some(v)) => buffer.format(*v).into(),
            Value::UInt64(Some(v)) => buffer.format(*v).into(),
            Value::Decimal(Some(v), ..) => v.normalize().to_string(),
            Value::Char(Some(v)) => v.to_string(),
            Value::Varchar(Some(v)) | Value::Unknown(Some(v)) => v.clone(),
            Value::Blob(Some(v)) => hex::encode(v),
            Value::Date(Some(v)) => v.to_string(),
            Value::Time(Some(v)) => v.to_string(),
            Value::Timestamp(Some(v)) => v.to_string(),
            Value::TimestampWithTimezone(Some(v)) => v.to_string(),
            Value::Uuid(Some(v)) => v.to_string(),
            _ => return None,
        })
    }
}
