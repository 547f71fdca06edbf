//! Runtime value binding
//!
//! `FieldValue` is the exhaustive tagged union over every runtime kind the
//! engine knows how to bind as a backend parameter. Conversions from JSON
//! are driven by the declared [`ColumnType`] of the target column, so a
//! kind with no registered conversion fails with
//! [`DataError::UnsupportedType`] instead of being silently coerced.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde_json::Value as JsonValue;
use sqlx::postgres::PgArguments;
use sqlx::query::Query;
use sqlx::Postgres;
use tracing::trace;
use uuid::Uuid;

use crate::error::{DataError, DataResult};

/// A JSON object used as the wire form of one stored row
pub type Document = serde_json::Map<String, JsonValue>;

/// Storage column types a field descriptor may declare
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Boolean,
    SmallInt,
    Integer,
    BigInt,
    Float,
    Double,
    Text,
    Bytes,
    Uuid,
    Timestamp,
    Date,
    Time,
    Enumerated,
}

impl ColumnType {
    /// SQL type text used for schema generation
    pub fn sql_type(&self) -> &'static str {
        match self {
            ColumnType::Boolean => "BOOLEAN",
            ColumnType::SmallInt => "SMALLINT",
            ColumnType::Integer => "INTEGER",
            ColumnType::BigInt => "BIGINT",
            ColumnType::Float => "REAL",
            ColumnType::Double => "DOUBLE PRECISION",
            ColumnType::Text => "TEXT",
            ColumnType::Bytes => "BYTEA",
            ColumnType::Uuid => "UUID",
            ColumnType::Timestamp => "TIMESTAMPTZ",
            ColumnType::Date => "DATE",
            ColumnType::Time => "TIME",
            ColumnType::Enumerated => "TEXT",
        }
    }
}

/// A typed value ready to be bound as a backend parameter
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Null,
    Bool(bool),
    SmallInt(i16),
    Int(i32),
    BigInt(i64),
    Float(f32),
    Double(f64),
    Text(String),
    Bytes(Vec<u8>),
    Uuid(Uuid),
    Timestamp(DateTime<Utc>),
    Date(NaiveDate),
    Time(NaiveTime),
    /// Enumerated value carried by its textual name
    Enum(String),
}

impl FieldValue {
    /// Check if the value is null
    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    /// The column type this value binds as, `None` for null
    pub fn kind(&self) -> Option<ColumnType> {
        match self {
            FieldValue::Null => None,
            FieldValue::Bool(_) => Some(ColumnType::Boolean),
            FieldValue::SmallInt(_) => Some(ColumnType::SmallInt),
            FieldValue::Int(_) => Some(ColumnType::Integer),
            FieldValue::BigInt(_) => Some(ColumnType::BigInt),
            FieldValue::Float(_) => Some(ColumnType::Float),
            FieldValue::Double(_) => Some(ColumnType::Double),
            FieldValue::Text(_) => Some(ColumnType::Text),
            FieldValue::Bytes(_) => Some(ColumnType::Bytes),
            FieldValue::Uuid(_) => Some(ColumnType::Uuid),
            FieldValue::Timestamp(_) => Some(ColumnType::Timestamp),
            FieldValue::Date(_) => Some(ColumnType::Date),
            FieldValue::Time(_) => Some(ColumnType::Time),
            FieldValue::Enum(_) => Some(ColumnType::Enumerated),
        }
    }

    /// Convert to the JSON wire form
    pub fn to_json(&self) -> JsonValue {
        match self {
            FieldValue::Null => JsonValue::Null,
            FieldValue::Bool(b) => JsonValue::Bool(*b),
            FieldValue::SmallInt(i) => JsonValue::Number(serde_json::Number::from(*i)),
            FieldValue::Int(i) => JsonValue::Number(serde_json::Number::from(*i)),
            FieldValue::BigInt(i) => JsonValue::Number(serde_json::Number::from(*i)),
            FieldValue::Float(f) => serde_json::Number::from_f64(f64::from(*f))
                .map(JsonValue::Number)
                .unwrap_or(JsonValue::Null),
            FieldValue::Double(f) => serde_json::Number::from_f64(*f)
                .map(JsonValue::Number)
                .unwrap_or(JsonValue::Null),
            FieldValue::Text(s) => JsonValue::String(s.clone()),
            FieldValue::Bytes(b) => JsonValue::Array(
                b.iter()
                    .map(|&x| JsonValue::Number(serde_json::Number::from(x)))
                    .collect(),
            ),
            FieldValue::Uuid(u) => JsonValue::String(u.to_string()),
            FieldValue::Timestamp(dt) => JsonValue::String(dt.to_rfc3339()),
            FieldValue::Date(d) => JsonValue::String(d.to_string()),
            FieldValue::Time(t) => JsonValue::String(t.to_string()),
            FieldValue::Enum(name) => JsonValue::String(name.clone()),
        }
    }

    /// Convert a JSON value into the typed form a column declares.
    ///
    /// There is one conversion per declared column type; anything else is
    /// an `UnsupportedType` error, never a coercion or truncation.
    pub fn from_json(ty: ColumnType, json: &JsonValue) -> DataResult<FieldValue> {
        if json.is_null() {
            return Ok(FieldValue::Null);
        }
        match ty {
            ColumnType::Boolean => json
                .as_bool()
                .map(FieldValue::Bool)
                .ok_or_else(|| unconvertible(ty, json)),
            ColumnType::SmallInt => json
                .as_i64()
                .and_then(|i| i16::try_from(i).ok())
                .map(FieldValue::SmallInt)
                .ok_or_else(|| unconvertible(ty, json)),
            ColumnType::Integer => json
                .as_i64()
                .and_then(|i| i32::try_from(i).ok())
                .map(FieldValue::Int)
                .ok_or_else(|| unconvertible(ty, json)),
            ColumnType::BigInt => json
                .as_i64()
                .map(FieldValue::BigInt)
                .ok_or_else(|| unconvertible(ty, json)),
            ColumnType::Float => json
                .as_f64()
                .map(|f| FieldValue::Float(f as f32))
                .ok_or_else(|| unconvertible(ty, json)),
            ColumnType::Double => json
                .as_f64()
                .map(FieldValue::Double)
                .ok_or_else(|| unconvertible(ty, json)),
            ColumnType::Text => json
                .as_str()
                .map(|s| FieldValue::Text(s.to_string()))
                .ok_or_else(|| unconvertible(ty, json)),
            ColumnType::Bytes => json
                .as_array()
                .and_then(|arr| {
                    arr.iter()
                        .map(|v| v.as_u64().and_then(|b| u8::try_from(b).ok()))
                        .collect::<Option<Vec<u8>>>()
                })
                .map(FieldValue::Bytes)
                .ok_or_else(|| unconvertible(ty, json)),
            ColumnType::Uuid => json
                .as_str()
                .and_then(|s| Uuid::parse_str(s).ok())
                .map(FieldValue::Uuid)
                .ok_or_else(|| unconvertible(ty, json)),
            ColumnType::Timestamp => json
                .as_str()
                .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                .map(|dt| FieldValue::Timestamp(dt.with_timezone(&Utc)))
                .ok_or_else(|| unconvertible(ty, json)),
            ColumnType::Date => json
                .as_str()
                .and_then(|s| s.parse::<NaiveDate>().ok())
                .map(FieldValue::Date)
                .ok_or_else(|| unconvertible(ty, json)),
            ColumnType::Time => json
                .as_str()
                .and_then(|s| s.parse::<NaiveTime>().ok())
                .map(FieldValue::Time)
                .ok_or_else(|| unconvertible(ty, json)),
            ColumnType::Enumerated => json
                .as_str()
                .map(|s| FieldValue::Enum(s.to_string()))
                .ok_or_else(|| unconvertible(ty, json)),
        }
    }
}

fn unconvertible(ty: ColumnType, json: &JsonValue) -> DataError {
    DataError::UnsupportedType(format!("cannot convert {json} into a {ty:?} column value"))
}

/// Bind one value onto a prepared sqlx query.
///
/// Exhaustive over every [`FieldValue`] variant; enumerated values bind by
/// their textual name.
pub fn bind_value<'q>(
    query: Query<'q, Postgres, PgArguments>,
    value: &FieldValue,
) -> Query<'q, Postgres, PgArguments> {
    trace!(?value, "bind parameter");
    match value {
        FieldValue::Null => query.bind(Option::<String>::None),
        FieldValue::Bool(b) => query.bind(*b),
        FieldValue::SmallInt(i) => query.bind(*i),
        FieldValue::Int(i) => query.bind(*i),
        FieldValue::BigInt(i) => query.bind(*i),
        FieldValue::Float(f) => query.bind(*f),
        FieldValue::Double(f) => query.bind(*f),
        FieldValue::Text(s) => query.bind(s.clone()),
        FieldValue::Bytes(b) => query.bind(b.clone()),
        FieldValue::Uuid(u) => query.bind(*u),
        FieldValue::Timestamp(dt) => query.bind(*dt),
        FieldValue::Date(d) => query.bind(*d),
        FieldValue::Time(t) => query.bind(*t),
        FieldValue::Enum(name) => query.bind(name.clone()),
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Bool(value)
    }
}

impl From<i16> for FieldValue {
    fn from(value: i16) -> Self {
        FieldValue::SmallInt(value)
    }
}

impl From<i32> for FieldValue {
    fn from(value: i32) -> Self {
        FieldValue::Int(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::BigInt(value)
    }
}

impl From<f32> for FieldValue {
    fn from(value: f32) -> Self {
        FieldValue::Float(value)
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        FieldValue::Double(value)
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Text(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(value.to_string())
    }
}

impl From<Vec<u8>> for FieldValue {
    fn from(value: Vec<u8>) -> Self {
        FieldValue::Bytes(value)
    }
}

impl From<Uuid> for FieldValue {
    fn from(value: Uuid) -> Self {
        FieldValue::Uuid(value)
    }
}

impl From<DateTime<Utc>> for FieldValue {
    fn from(value: DateTime<Utc>) -> Self {
        FieldValue::Timestamp(value)
    }
}

impl From<NaiveDate> for FieldValue {
    fn from(value: NaiveDate) -> Self {
        FieldValue::Date(value)
    }
}

impl From<NaiveTime> for FieldValue {
    fn from(value: NaiveTime) -> Self {
        FieldValue::Time(value)
    }
}

impl<T> From<Option<T>> for FieldValue
where
    T: Into<FieldValue>,
{
    fn from(value: Option<T>) -> Self {
        match value {
            Some(v) => v.into(),
            None => FieldValue::Null,
        }
    }
}
