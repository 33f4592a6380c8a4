use crate::{Error, Result, Value, consume_while, truncate_long};
use anyhow::Context;
use atoi::FromRadix10SignedChecked;
use fast_float::parse_partial;
use rust_decimal::{Decimal, prelude::FromPrimitive, prelude::ToPrimitive};
use std::{
    any,
    borrow::Cow,
    collections::{BTreeMap, HashMap},
    fmt::Display,
    hash::Hash,
};
use time::format_description::parse_borrowed;
use uuid::Uuid;

/// Conversion between native Rust types and the dynamically typed [`Value`].
///
/// Every field of an entity must implement it. The derive macros use
/// [`AsValue::as_empty_value`] as the column prototype (the typed NULL that tells the
/// reflector and the SQL writer which type the column has), [`AsValue::as_value`] when
/// writing and [`AsValue::try_from_value`] when decoding rows.
///
/// # Parsing contract
/// - `parse` delegates to `extract` then verifies the input is exhausted.
/// - `extract` must advance the input slice only on success.
/// - Compound values (lists and maps) are stored as text like `[1,2]` or `{'a':1}` and are
///   decoded by parsing a [`Value::Unknown`], which is why each element type implements
///   `extract`.
///
/// ```rust
/// use keel_core::{AsValue, Value};
/// let v = 42i32.as_value();
/// assert!(matches!(v, Value::Int32(Some(42))));
/// let n: i32 = AsValue::try_from_value(v).unwrap();
/// assert_eq!(n, 42);
/// ```
pub trait AsValue {
    /// Typed NULL of this type.
    fn as_empty_value() -> Value;
    fn as_value(self) -> Value;
    /// Convert a dynamic value, accepting the canonical variant, compatible numeric widths
    /// (range checked) and [`Value::Unknown`] text through [`AsValue::parse`].
    fn try_from_value(value: Value) -> Result<Self>
    where
        Self: Sized;
    fn parse(input: impl AsRef<str>) -> Result<Self>
    where
        Self: Sized,
    {
        let mut value = input.as_ref();
        let result = Self::extract(&mut value)?;
        if !value.trim_ascii().is_empty() {
            return Err(Error::msg(format!(
                "Value `{}` parsed correctly as {} but it did not consume all the input (remaining: `{}`)",
                truncate_long!(input.as_ref()),
                any::type_name::<Self>(),
                truncate_long!(value),
            )));
        }
        Ok(result)
    }
    /// Parse a prefix of `input`, advancing it past the consumed text.
    fn extract(input: &mut &str) -> Result<Self>
    where
        Self: Sized,
    {
        Err(Error::msg(format!(
            "Cannot parse '{}' as {}",
            truncate_long!(input),
            any::type_name::<Self>()
        )))
    }
}

impl<T: AsValue> From<T> for Value {
    fn from(value: T) -> Self {
        value.as_value()
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Varchar(Some(value.into()))
    }
}

fn convert_integer<T, S>(value: S) -> Result<T>
where
    T: TryFrom<S>,
    S: Display + Copy,
{
    T::try_from(value).map_err(|_| {
        Error::msg(format!(
            "Value {value} is out of range for {}",
            any::type_name::<T>()
        ))
    })
}

fn cannot_convert<T>(value: &Value) -> Error {
    Error::msg(format!("Cannot convert {value:?} to {}", any::type_name::<T>()))
}

/// Strips an optional leading quote and requires the matching closing quote after `f` succeeded.
fn extract_quoted<T>(input: &mut &str, f: impl FnOnce(&mut &str) -> Result<T>) -> Result<T> {
    let mut value = *input;
    let quote = if value.starts_with(['"', '\'']) {
        let q = &value[0..1];
        value = &value[1..];
        q
    } else {
        ""
    };
    let result = f(&mut value)?;
    if !value.starts_with(quote) {
        return Err(Error::msg(format!(
            "Unterminated quoted value `{}`",
            truncate_long!(input)
        )));
    }
    *input = &value[quote.len()..];
    Ok(result)
}

macro_rules! impl_as_value {
    ($source:ty, $destination:path $(, $pat_rest:pat => $expr_rest:expr)* $(,)?) => {
        impl AsValue for $source {
            fn as_empty_value() -> Value {
                $destination(None)
            }
            fn as_value(self) -> Value {
                $destination(Some(self as _))
            }
            fn try_from_value(value: Value) -> Result<Self> {
                match value {
                    $($pat_rest => $expr_rest,)*
                    Value::Int8(Some(v)) => convert_integer(v),
                    Value::Int16(Some(v)) => convert_integer(v),
                    Value::Int32(Some(v)) => convert_integer(v),
                    Value::Int64(Some(v)) => convert_integer(v),
                    Value::UInt8(Some(v)) => convert_integer(v),
                    Value::UInt16(Some(v)) => convert_integer(v),
                    Value::UInt32(Some(v)) => convert_integer(v),
                    Value::UInt64(Some(v)) => convert_integer(v),
                    Value::Decimal(Some(v), ..) => {
                        if !v.is_integer() {
                            return Err(Error::msg(format!(
                                "Value {v}: Decimal is not an integer, cannot convert to {}",
                                any::type_name::<Self>(),
                            )));
                        }
                        let v = v.to_i128().ok_or_else(|| cannot_convert::<Self>(&value))?;
                        convert_integer(v)
                    }
                    Value::Unknown(Some(ref v)) => Self::parse(v),
                    _ => Err(cannot_convert::<Self>(&value)),
                }
            }
            fn extract(input: &mut &str) -> Result<Self> {
                extract_quoted(input, |value| {
                    let (number, used) = <$source>::from_radix_10_signed_checked(value.as_bytes());
                    match number {
                        Some(number) if used > 0 => {
                            *value = &value[used..];
                            Ok(number)
                        }
                        _ => Err(Error::msg(format!(
                            "Cannot extract {} from `{}`",
                            any::type_name::<Self>(),
                            truncate_long!(value),
                        ))),
                    }
                })
            }
        }
    };
}
impl_as_value!(i8, Value::Int8);
impl_as_value!(i16, Value::Int16);
impl_as_value!(i32, Value::Int32);
impl_as_value!(i64, Value::Int64);
impl_as_value!(u8, Value::UInt8);
impl_as_value!(u16, Value::UInt16);
impl_as_value!(u32, Value::UInt32);
impl_as_value!(u64, Value::UInt64);

macro_rules! impl_as_value {
    ($source:ty, $destination:path, $extract:expr $(, $pat_rest:pat => $expr_rest:expr)* $(,)?) => {
        impl AsValue for $source {
            fn as_empty_value() -> Value {
                $destination(None)
            }
            fn as_value(self) -> Value {
                $destination(Some(self.into()))
            }
            fn try_from_value(value: Value) -> Result<Self> {
                match value {
                    $destination(Some(v), ..) => Ok(v.into()),
                    $($pat_rest => $expr_rest,)*
                    #[allow(unreachable_patterns)]
                    Value::Unknown(Some(ref v)) => <Self as AsValue>::parse(v),
                    _ => Err(cannot_convert::<Self>(&value)),
                }
            }
            fn extract(value: &mut &str) -> Result<Self> {
                $extract(value)
            }
        }
    };
}
impl_as_value!(
    bool,
    Value::Boolean,
    |input: &mut &str| {
        extract_quoted(input, |input| {
            let mut value = *input;
            let result = consume_while(&mut value, |v| v.is_alphanumeric() || *v == '_');
            let result = match result {
                x if x.eq_ignore_ascii_case("true") || x.eq_ignore_ascii_case("t") || x.eq("1") => true,
                x if x.eq_ignore_ascii_case("false") || x.eq_ignore_ascii_case("f") || x.eq("0") => false,
                _ => return Err(Error::msg(format!("Cannot parse boolean from '{}'", truncate_long!(input)))),
            };
            *input = value;
            Ok(result)
        })
    },
    Value::Int8(Some(v)) => Ok(v != 0),
    Value::Int16(Some(v)) => Ok(v != 0),
    Value::Int32(Some(v)) => Ok(v != 0),
    Value::Int64(Some(v)) => Ok(v != 0),
    Value::UInt8(Some(v)) => Ok(v != 0),
    Value::UInt16(Some(v)) => Ok(v != 0),
    Value::UInt32(Some(v)) => Ok(v != 0),
    Value::UInt64(Some(v)) => Ok(v != 0),
    Value::Varchar(Some(ref v)) => <Self as AsValue>::parse(v),
);

macro_rules! extract_float {
    ($input:expr) => {
        extract_quoted($input, |value| {
            let (num, tail) = parse_partial(*value).with_context(|| {
                format!(
                    "Cannot extract a floating point value from `{}`",
                    truncate_long!(value)
                )
            })?;
            *value = &value[tail..];
            Ok(num)
        })
    };
}
impl_as_value!(
    f32,
    Value::Float32,
    |input: &mut &str| extract_float!(input),
    Value::Float64(Some(v)) => Ok(v as _),
    Value::Int64(Some(v)) => Ok(v as _),
    Value::Int32(Some(v)) => Ok(v as _),
    Value::Decimal(Some(v), ..) => v
        .to_f32()
        .ok_or_else(|| Error::msg(format!("Cannot convert decimal {v} to f32"))),
);
impl_as_value!(
    f64,
    Value::Float64,
    |input: &mut &str| extract_float!(input),
    Value::Float32(Some(v)) => Ok(v as _),
    Value::Int64(Some(v)) => Ok(v as _),
    Value::Int32(Some(v)) => Ok(v as _),
    Value::Decimal(Some(v), ..) => v
        .to_f64()
        .ok_or_else(|| Error::msg(format!("Cannot convert decimal {v} to f64"))),
);

/// Quoted text with doubled delimiters as escapes, or bare text up to a structural character.
fn extract_text(input: &mut &str) -> Result<String> {
    let value = *input;
    let delimiter = match value.chars().next() {
        Some(c @ ('\'' | '"')) => c,
        _ => {
            let mut rest = value;
            let text = consume_while(&mut rest, |c| !matches!(c, ',' | ']' | '}' | ':'));
            *input = rest;
            return Ok(text.trim_end().to_string());
        }
    };
    let body = &value[1..];
    let mut result = String::with_capacity(body.len());
    let mut chars = body.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        if c == delimiter {
            if let Some((_, next)) = chars.peek()
                && *next == delimiter
            {
                result.push(c);
                chars.next();
                continue;
            }
            *input = &body[i + c.len_utf8()..];
            return Ok(result);
        }
        result.push(c);
    }
    Err(Error::msg(format!(
        "Unterminated string `{}`",
        truncate_long!(value)
    )))
}

impl_as_value!(
    char,
    Value::Char,
    |input: &mut &str| {
        let mut value = *input;
        let text = extract_text(&mut value)?;
        let mut chars = text.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) => {
                *input = value;
                Ok(c)
            }
            _ => Err(Error::msg(format!("Cannot extract a char from `{}`", truncate_long!(input)))),
        }
    },
    Value::Varchar(Some(ref v)) => {
        let mut chars = v.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) => Ok(c),
            _ => Err(Error::msg(format!("Cannot convert `{v}` containing other than one character into a char"))),
        }
    }
);
impl_as_value!(
    String,
    Value::Varchar,
    extract_text,
    Value::Char(Some(v)) => Ok(v.into()),
    Value::Unknown(Some(v)) => Ok(v),
);
impl_as_value!(
    Box<[u8]>,
    Value::Blob,
    |input: &mut &str| {
        extract_quoted(input, |value| {
            let mut rest = value.strip_prefix("\\x").unwrap_or(value);
            let digits = consume_while(&mut rest, char::is_ascii_hexdigit);
            let result = hex::decode(digits)
                .map(Into::into)
                .with_context(|| format!("While decoding `{}` as a blob", truncate_long!(value)))?;
            *value = rest;
            Ok(result)
        })
    },
    Value::List(Some(v), ..) => v.into_iter().map(u8::try_from_value).collect(),
);
impl_as_value!(
    Uuid,
    Value::Uuid,
    |input: &mut &str| {
        extract_quoted(input, |value| {
            let text = value
                .get(0..36)
                .ok_or_else(|| Error::msg(format!("Cannot extract a uuid from `{}`", truncate_long!(value))))?;
            let uuid = Uuid::parse_str(text)
                .with_context(|| format!("Cannot extract a uuid from `{}`", truncate_long!(value)))?;
            *value = &value[36..];
            Ok(uuid)
        })
    },
    Value::Varchar(Some(ref v)) => <Self as AsValue>::parse(v),
);

macro_rules! parse_time {
    ($value: ident, $($formats:literal),+ $(,)?) => {
        'value: {
            for format in [$($formats,)+] {
                let format = parse_borrowed::<2>(format)?;
                let mut parsed = time::parsing::Parsed::new();
                let remaining = parsed.parse_items($value.as_bytes(), &format);
                if let Ok(remaining) = remaining {
                    let result = parsed.try_into()?;
                    *$value = &$value[($value.len() - remaining.len())..];
                    break 'value Ok(result);
                }
            }
            Err(Error::msg(format!(
                "Cannot extract from `{}` as {}",
                truncate_long!($value),
                any::type_name::<Self>()
            )))
        }
    }
}

impl_as_value!(
    time::Date,
    Value::Date,
    |input: &mut &str| extract_quoted(input, |v| parse_time!(v, "[year]-[month]-[day]")),
    Value::Timestamp(Some(v)) => Ok(v.date()),
    Value::Varchar(Some(ref v)) => <Self as AsValue>::parse(v),
);
impl_as_value!(
    time::Time,
    Value::Time,
    |input: &mut &str| {
        extract_quoted(input, |v| {
            parse_time!(
                v,
                "[hour]:[minute]:[second].[subsecond]",
                "[hour]:[minute]:[second]",
                "[hour]:[minute]",
            )
        })
    },
    Value::Varchar(Some(ref v)) => <Self as AsValue>::parse(v),
);
impl_as_value!(
    time::PrimitiveDateTime,
    Value::Timestamp,
    |input: &mut &str| {
        extract_quoted(input, |v| {
            parse_time!(
                v,
                "[year]-[month]-[day] [hour]:[minute]:[second].[subsecond]",
                "[year]-[month]-[day] [hour]:[minute]:[second]",
                "[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond]",
                "[year]-[month]-[day]T[hour]:[minute]:[second]",
                "[year]-[month]-[day] [hour]:[minute]",
            )
        })
    },
    Value::TimestampWithTimezone(Some(v)) => Ok(time::PrimitiveDateTime::new(v.date(), v.time())),
    Value::Varchar(Some(ref v)) => <Self as AsValue>::parse(v),
);
impl_as_value!(
    time::OffsetDateTime,
    Value::TimestampWithTimezone,
    |input: &mut &str| {
        extract_quoted(input, |v| {
            parse_time!(
                v,
                "[year]-[month]-[day] [hour]:[minute]:[second].[subsecond][offset_hour sign:mandatory]:[offset_minute]",
                "[year]-[month]-[day] [hour]:[minute]:[second][offset_hour sign:mandatory]:[offset_minute]",
                "[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond][offset_hour sign:mandatory]:[offset_minute]",
                "[year]-[month]-[day]T[hour]:[minute]:[second][offset_hour sign:mandatory]:[offset_minute]",
            )
        })
    },
    Value::Timestamp(Some(v)) => Ok(v.assume_utc()),
    Value::Varchar(Some(ref v)) => <Self as AsValue>::parse(v),
);

impl AsValue for Decimal {
    fn as_empty_value() -> Value {
        Value::Decimal(None, 0, 0)
    }
    fn as_value(self) -> Value {
        Value::Decimal(Some(self), 0, self.scale() as _)
    }
    fn try_from_value(value: Value) -> Result<Self> {
        match value {
            Value::Decimal(Some(v), ..) => Ok(v),
            Value::Int8(Some(v)) => Ok(v.into()),
            Value::Int16(Some(v)) => Ok(v.into()),
            Value::Int32(Some(v)) => Ok(v.into()),
            Value::Int64(Some(v)) => Ok(v.into()),
            Value::UInt8(Some(v)) => Ok(v.into()),
            Value::UInt16(Some(v)) => Ok(v.into()),
            Value::UInt32(Some(v)) => Ok(v.into()),
            Value::UInt64(Some(v)) => Ok(v.into()),
            Value::Float32(Some(v)) => {
                Decimal::from_f32(v).ok_or_else(|| cannot_convert::<Self>(&value))
            }
            Value::Float64(Some(v)) => {
                Decimal::from_f64(v).ok_or_else(|| cannot_convert::<Self>(&value))
            }
            Value::Varchar(Some(ref v)) | Value::Unknown(Some(ref v)) => Self::parse(v),
            _ => Err(cannot_convert::<Self>(&value)),
        }
    }
    fn extract(input: &mut &str) -> Result<Self> {
        extract_quoted(input, |value| {
            let mut rest = *value;
            let text = consume_while(&mut rest, |c| c.is_ascii_digit() || matches!(c, '-' | '+' | '.'));
            let result = Decimal::from_str_exact(text).with_context(|| {
                format!("Cannot extract a Decimal from `{}`", truncate_long!(value))
            })?;
            *value = rest;
            Ok(result)
        })
    }
}

impl<'a> AsValue for Cow<'a, str> {
    fn as_empty_value() -> Value {
        Value::Varchar(None)
    }
    fn as_value(self) -> Value {
        Value::Varchar(Some(self.into_owned()))
    }
    fn try_from_value(value: Value) -> Result<Self> {
        String::try_from_value(value).map(Cow::Owned)
    }
    fn extract(input: &mut &str) -> Result<Self> {
        extract_text(input).map(Cow::Owned)
    }
}

impl<T: AsValue> AsValue for Option<T> {
    fn as_empty_value() -> Value {
        T::as_empty_value()
    }
    fn as_value(self) -> Value {
        match self {
            Some(v) => v.as_value(),
            None => T::as_empty_value(),
        }
    }
    fn try_from_value(value: Value) -> Result<Self> {
        if value.is_null() {
            return Ok(None);
        }
        T::try_from_value(value).map(Some)
    }
    fn extract(input: &mut &str) -> Result<Self> {
        if input
            .get(0..4)
            .is_some_and(|v| v.eq_ignore_ascii_case("null"))
        {
            *input = &input[4..];
            return Ok(None);
        }
        T::extract(input).map(Some)
    }
}

impl<T: AsValue> AsValue for Box<T> {
    fn as_empty_value() -> Value {
        T::as_empty_value()
    }
    fn as_value(self) -> Value {
        (*self).as_value()
    }
    fn try_from_value(value: Value) -> Result<Self> {
        T::try_from_value(value).map(Box::new)
    }
    fn extract(input: &mut &str) -> Result<Self> {
        T::extract(input).map(Box::new)
    }
}

/// Iterates the comma separated items of a `[..]` or `{..}` literal, `item` consumes one entry.
fn extract_sequence(
    input: &mut &str,
    opening: char,
    closing: char,
    type_name: &str,
    mut item: impl FnMut(&mut &str) -> Result<()>,
) -> Result<()> {
    let original = *input;
    let error = || {
        Error::msg(format!(
            "Cannot extract `{}` as {}",
            truncate_long!(original),
            type_name
        ))
    };
    let mut value = original;
    value = value.strip_prefix(opening).ok_or_else(error)?.trim_ascii_start();
    loop {
        if let Some(rest) = value.strip_prefix(closing) {
            *input = rest;
            return Ok(());
        }
        item(&mut value)?;
        value = value.trim_ascii_start();
        match value.chars().next() {
            Some(',') => value = value[1..].trim_ascii_start(),
            Some(c) if c == closing => {}
            _ => return Err(error()),
        }
    }
}

impl<T: AsValue> AsValue for Vec<T> {
    fn as_empty_value() -> Value {
        Value::List(None, Box::new(T::as_empty_value()))
    }
    fn as_value(self) -> Value {
        Value::List(
            Some(self.into_iter().map(AsValue::as_value).collect()),
            Box::new(T::as_empty_value()),
        )
    }
    fn try_from_value(value: Value) -> Result<Self> {
        match value {
            Value::List(Some(v), ..) => v.into_iter().map(T::try_from_value).collect(),
            Value::List(None, ..) => Ok(Vec::new()),
            Value::Blob(Some(v)) => v
                .iter()
                .map(|b| T::try_from_value(Value::UInt8(Some(*b))))
                .collect(),
            Value::Unknown(Some(ref v)) => <Self as AsValue>::parse(v),
            _ => Err(cannot_convert::<Self>(&value)),
        }
    }
    fn extract(input: &mut &str) -> Result<Self> {
        let mut result = Vec::new();
        extract_sequence(input, '[', ']', any::type_name::<Self>(), |value| {
            result.push(T::extract(value)?);
            Ok(())
        })?;
        Ok(result)
    }
}

macro_rules! impl_as_value {
    ($map:ident, $($key_trait:path),+) => {
        impl<K: AsValue $(+ $key_trait)+, V: AsValue> AsValue for $map<K, V> {
            fn as_empty_value() -> Value {
                Value::Map(None, Box::new(K::as_empty_value()), Box::new(V::as_empty_value()))
            }
            fn as_value(self) -> Value {
                Value::Map(
                    Some(self.into_iter().map(|(k, v)| (k.as_value(), v.as_value())).collect()),
                    Box::new(K::as_empty_value()),
                    Box::new(V::as_empty_value()),
                )
            }
            fn try_from_value(value: Value) -> Result<Self> {
                match value {
                    Value::Map(Some(v), ..) => v
                        .into_iter()
                        .map(|(k, v)| Ok((K::try_from_value(k)?, V::try_from_value(v)?)))
                        .collect(),
                    Value::Map(None, ..) => Ok($map::new()),
                    Value::Unknown(Some(ref v)) => <Self as AsValue>::parse(v),
                    _ => Err(cannot_convert::<Self>(&value)),
                }
            }
            fn extract(input: &mut &str) -> Result<Self> {
                let mut result = $map::new();
                extract_sequence(input, '{', '}', any::type_name::<Self>(), |value| {
                    let key = K::extract(value)?;
                    *value = value.trim_ascii_start();
                    *value = value.strip_prefix(':').ok_or_else(|| {
                        Error::msg(format!("Expected `:` in map literal at `{}`", truncate_long!(value)))
                    })?;
                    *value = value.trim_ascii_start();
                    result.insert(key, V::extract(value)?);
                    Ok(())
                })?;
                Ok(result)
            }
        }
    };
}
impl_as_value!(HashMap, Eq, Hash);
impl_as_value!(BTreeMap, Ord);
