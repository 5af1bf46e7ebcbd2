//! Column values and the typed accessor used to move them in and out of record fields.

use std::fmt;

use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};

/// Core value types for SQLite operations
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
    Boolean(bool),
}

/// Discriminant of a [`Value`], used for declared field types and diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    Null,
    Integer,
    Real,
    Text,
    Blob,
    Boolean,
}

impl ValueKind {
    /// The zero value a freshly allocated field of this kind holds.
    pub fn zero(self) -> Value {
        match self {
            ValueKind::Null => Value::Null,
            ValueKind::Integer => Value::Integer(0),
            ValueKind::Real => Value::Real(0.0),
            ValueKind::Text => Value::Text(String::new()),
            ValueKind::Blob => Value::Blob(Vec::new()),
            ValueKind::Boolean => Value::Boolean(false),
        }
    }

    /// Convert `value` into this kind if that loses nothing.
    ///
    /// NULL is accepted by every kind. Integers widen to reals, and 0/1
    /// integers become booleans since SQLite has no boolean storage class.
    /// On failure the untouched value is handed back.
    pub fn coerce(self, value: Value) -> Result<Value, Value> {
        match (self, value) {
            (_, Value::Null) => Ok(Value::Null),
            (ValueKind::Null, other) => Err(other),
            (ValueKind::Integer, v @ Value::Integer(_)) => Ok(v),
            (ValueKind::Integer, Value::Boolean(b)) => Ok(Value::Integer(i64::from(b))),
            (ValueKind::Real, v @ Value::Real(_)) => Ok(v),
            (ValueKind::Real, Value::Integer(i)) => Ok(Value::Real(i as f64)),
            (ValueKind::Text, v @ Value::Text(_)) => Ok(v),
            (ValueKind::Blob, v @ Value::Blob(_)) => Ok(v),
            (ValueKind::Boolean, v @ Value::Boolean(_)) => Ok(v),
            (ValueKind::Boolean, Value::Integer(0)) => Ok(Value::Boolean(false)),
            (ValueKind::Boolean, Value::Integer(1)) => Ok(Value::Boolean(true)),
            (_, other) => Err(other),
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueKind::Null => "null",
            ValueKind::Integer => "integer",
            ValueKind::Real => "real",
            ValueKind::Text => "text",
            ValueKind::Blob => "blob",
            ValueKind::Boolean => "boolean",
        };
        f.write_str(name)
    }
}

impl Value {
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Null => ValueKind::Null,
            Value::Integer(_) => ValueKind::Integer,
            Value::Real(_) => ValueKind::Real,
            Value::Text(_) => ValueKind::Text,
            Value::Blob(_) => ValueKind::Blob,
            Value::Boolean(_) => ValueKind::Boolean,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("NULL"),
            Value::Integer(i) => write!(f, "{i}"),
            Value::Real(r) => write!(f, "{r}"),
            Value::Text(s) => f.write_str(s),
            Value::Blob(b) => write!(f, "<{} bytes>", b.len()),
            Value::Boolean(b) => write!(f, "{b}"),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Integer(i64::from(v))
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::Integer(i64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Real(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Boolean(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Blob(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        use rusqlite::types::Value as Sql;
        Ok(match self {
            Value::Null => ToSqlOutput::Owned(Sql::Null),
            Value::Integer(i) => ToSqlOutput::Owned(Sql::Integer(*i)),
            Value::Real(r) => ToSqlOutput::Owned(Sql::Real(*r)),
            Value::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
            Value::Blob(b) => ToSqlOutput::Borrowed(ValueRef::Blob(b)),
            Value::Boolean(b) => ToSqlOutput::Owned(Sql::Integer(i64::from(*b))),
        })
    }
}

impl FromSql for Value {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        Ok(match value {
            ValueRef::Null => Value::Null,
            ValueRef::Integer(i) => Value::Integer(i),
            ValueRef::Real(r) => Value::Real(r),
            ValueRef::Text(bytes) => Value::Text(
                std::str::from_utf8(bytes)
                    .map_err(|err| FromSqlError::Other(Box::new(err)))?
                    .to_string(),
            ),
            ValueRef::Blob(bytes) => Value::Blob(bytes.to_vec()),
        })
    }
}

/// A Rust type that can live in a record field mapped to one column.
pub trait ColumnValue: Sized {
    /// Declared column kind of the field.
    const KIND: ValueKind;

    fn to_value(&self) -> Value;

    /// Convert a column value into the field type, handing the value back on mismatch.
    fn from_value(value: Value) -> Result<Self, Value>;
}

impl ColumnValue for i64 {
    const KIND: ValueKind = ValueKind::Integer;

    fn to_value(&self) -> Value {
        Value::Integer(*self)
    }

    fn from_value(value: Value) -> Result<Self, Value> {
        match Self::KIND.coerce(value)? {
            Value::Integer(i) => Ok(i),
            other => Err(other),
        }
    }
}

impl ColumnValue for i32 {
    const KIND: ValueKind = ValueKind::Integer;

    fn to_value(&self) -> Value {
        Value::Integer(i64::from(*self))
    }

    fn from_value(value: Value) -> Result<Self, Value> {
        match Self::KIND.coerce(value)? {
            Value::Integer(i) => i32::try_from(i).map_err(|_| Value::Integer(i)),
            other => Err(other),
        }
    }
}

impl ColumnValue for u32 {
    const KIND: ValueKind = ValueKind::Integer;

    fn to_value(&self) -> Value {
        Value::Integer(i64::from(*self))
    }

    fn from_value(value: Value) -> Result<Self, Value> {
        match Self::KIND.coerce(value)? {
            Value::Integer(i) => u32::try_from(i).map_err(|_| Value::Integer(i)),
            other => Err(other),
        }
    }
}

impl ColumnValue for f64 {
    const KIND: ValueKind = ValueKind::Real;

    fn to_value(&self) -> Value {
        Value::Real(*self)
    }

    fn from_value(value: Value) -> Result<Self, Value> {
        match Self::KIND.coerce(value)? {
            Value::Real(r) => Ok(r),
            other => Err(other),
        }
    }
}

impl ColumnValue for bool {
    const KIND: ValueKind = ValueKind::Boolean;

    fn to_value(&self) -> Value {
        Value::Boolean(*self)
    }

    fn from_value(value: Value) -> Result<Self, Value> {
        match Self::KIND.coerce(value)? {
            Value::Boolean(b) => Ok(b),
            other => Err(other),
        }
    }
}

impl ColumnValue for String {
    const KIND: ValueKind = ValueKind::Text;

    fn to_value(&self) -> Value {
        Value::Text(self.clone())
    }

    fn from_value(value: Value) -> Result<Self, Value> {
        match value {
            Value::Text(s) => Ok(s),
            other => Err(other),
        }
    }
}

impl ColumnValue for Vec<u8> {
    const KIND: ValueKind = ValueKind::Blob;

    fn to_value(&self) -> Value {
        Value::Blob(self.clone())
    }

    fn from_value(value: Value) -> Result<Self, Value> {
        match value {
            Value::Blob(b) => Ok(b),
            other => Err(other),
        }
    }
}

impl<T: ColumnValue> ColumnValue for Option<T> {
    const KIND: ValueKind = T::KIND;

    fn to_value(&self) -> Value {
        self.as_ref().map_or(Value::Null, ColumnValue::to_value)
    }

    fn from_value(value: Value) -> Result<Self, Value> {
        match value {
            Value::Null => Ok(None),
            other => T::from_value(other).map(Some),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integers_widen_to_reals_but_not_back() {
        assert_eq!(f64::from_value(Value::Integer(3)), Ok(3.0));
        assert_eq!(i64::from_value(Value::Real(3.0)), Err(Value::Real(3.0)));
    }

    #[test]
    fn sqlite_integers_read_back_as_booleans() {
        assert_eq!(bool::from_value(Value::Integer(1)), Ok(true));
        assert_eq!(bool::from_value(Value::Integer(0)), Ok(false));
        assert_eq!(bool::from_value(Value::Integer(7)), Err(Value::Integer(7)));
    }

    #[test]
    fn narrow_integers_reject_overflow() {
        assert_eq!(i32::from_value(Value::Integer(i64::MAX)), Err(Value::Integer(i64::MAX)));
        assert_eq!(u32::from_value(Value::Integer(-1)), Err(Value::Integer(-1)));
    }

    #[test]
    fn null_maps_to_none_only_for_optional_fields() {
        assert_eq!(Option::<String>::from_value(Value::Null), Ok(None));
        assert_eq!(String::from_value(Value::Null), Err(Value::Null));
        assert_eq!(
            Option::<i64>::from_value(Value::Integer(5)),
            Ok(Some(5))
        );
    }

    #[test]
    fn text_never_coerces() {
        assert!(ValueKind::Integer.coerce(Value::from("1")).is_err());
        assert!(ValueKind::Text.coerce(Value::Integer(1)).is_err());
    }
}
