//! Record introspection.
//!
//! A [`Record`] exposes its type name, its field names in declaration order,
//! the current field values aligned with those names, and positional write
//! access for row binding. Structs get the impl from [`record!`](crate::record!);
//! shapes only known at runtime use [`DynamicRecord`].

use crate::error::{OrmError, Result};
use crate::value::{Value, ValueKind};

/// Name of the identity field, compared ignoring ASCII case.
pub const ID_FIELD: &str = "id";

/// A fixed-shape value mapped to one table.
///
/// `field_names` order is the canonical column order and must not change
/// between calls for the same type.
pub trait Record: Send + Sync {
    fn type_name(&self) -> &str;

    fn field_names(&self) -> Vec<&str>;

    /// Current values, positionally aligned with [`Record::field_names`].
    fn field_values(&self) -> Vec<Value>;

    fn field_by_name(&self, name: &str) -> Option<Value> {
        let idx = self.field_names().iter().position(|f| *f == name)?;
        self.field_values().into_iter().nth(idx)
    }

    fn set_field(&mut self, name: &str, value: Value) -> Result<()>;

    /// Write into the field slot at `idx` of the declaration order.
    fn set_field_at(&mut self, idx: usize, value: Value) -> Result<()> {
        let name = match self.field_names().get(idx) {
            Some(name) => name.to_string(),
            None => {
                return Err(OrmError::NoSuchField {
                    record: self.type_name().to_string(),
                    field: format!("#{idx}"),
                })
            }
        };
        self.set_field(&name, value)
    }

    /// A fresh, zero-valued, writable instance of the same shape.
    fn blank(&self) -> Self
    where
        Self: Sized;
}

/// Declare a struct and derive its [`Record`] impl.
///
/// The struct name becomes the table name and the field names become the
/// column names, in declaration order. Every field type must implement
/// [`ColumnValue`](crate::ColumnValue) and `Default`.
///
/// ```
/// rust_orm::record! {
///     #[derive(Debug, Clone, PartialEq)]
///     pub struct TestUser {
///         pub id: i64,
///         pub name: String,
///     }
/// }
///
/// use rust_orm::Record;
/// let user = TestUser { id: 1, name: "Alice".into() };
/// assert_eq!(user.type_name(), "TestUser");
/// assert_eq!(user.field_names(), vec!["id", "name"]);
/// ```
#[macro_export]
macro_rules! record {
    (
        $(#[$meta:meta])*
        $vis:vis struct $name:ident {
            $( $(#[$fmeta:meta])* $fvis:vis $field:ident : $ty:ty ),* $(,)?
        }
    ) => {
        $(#[$meta])*
        $vis struct $name {
            $( $(#[$fmeta])* $fvis $field: $ty, )*
        }

        impl $crate::Record for $name {
            fn type_name(&self) -> &str {
                stringify!($name)
            }

            fn field_names(&self) -> ::std::vec::Vec<&str> {
                ::std::vec![$(stringify!($field)),*]
            }

            fn field_values(&self) -> ::std::vec::Vec<$crate::Value> {
                ::std::vec![$($crate::ColumnValue::to_value(&self.$field)),*]
            }

            fn set_field(
                &mut self,
                name: &str,
                value: $crate::Value,
            ) -> ::std::result::Result<(), $crate::OrmError> {
                match name {
                    $(
                        stringify!($field) => {
                            let found = value.kind();
                            self.$field = <$ty as $crate::ColumnValue>::from_value(value)
                                .map_err(|_| $crate::OrmError::TypeMismatch {
                                    record: stringify!($name).to_string(),
                                    field: name.to_string(),
                                    expected: <$ty as $crate::ColumnValue>::KIND,
                                    found,
                                })?;
                            Ok(())
                        }
                    )*
                    _ => Err($crate::OrmError::NoSuchField {
                        record: stringify!($name).to_string(),
                        field: name.to_string(),
                    }),
                }
            }

            fn blank(&self) -> Self {
                Self {
                    $( $field: ::std::default::Default::default(), )*
                }
            }
        }
    };
}

#[derive(Debug, Clone, PartialEq)]
struct DynamicField {
    name: String,
    kind: ValueKind,
    value: Value,
}

/// A record whose shape is described at runtime.
///
/// Fields keep the order they were added in. A frozen record rejects writes
/// with [`OrmError::NotMutable`].
#[derive(Debug, Clone, PartialEq)]
pub struct DynamicRecord {
    name: String,
    fields: Vec<DynamicField>,
    frozen: bool,
}

impl DynamicRecord {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
            frozen: false,
        }
    }

    /// Add a field holding the zero value of `kind`.
    pub fn with_field(mut self, name: impl Into<String>, kind: ValueKind) -> Self {
        self.fields.push(DynamicField {
            name: name.into(),
            kind,
            value: kind.zero(),
        });
        self
    }

    /// Add a field holding `value`; its kind is declared from the value.
    pub fn with_value(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        let value = value.into();
        self.fields.push(DynamicField {
            name: name.into(),
            kind: value.kind(),
            value,
        });
        self
    }

    pub fn freeze(mut self) -> Self {
        self.frozen = true;
        self
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.iter().find(|f| f.name == name).map(|f| &f.value)
    }
}

impl Record for DynamicRecord {
    fn type_name(&self) -> &str {
        &self.name
    }

    fn field_names(&self) -> Vec<&str> {
        self.fields.iter().map(|f| f.name.as_str()).collect()
    }

    fn field_values(&self) -> Vec<Value> {
        self.fields.iter().map(|f| f.value.clone()).collect()
    }

    fn field_by_name(&self, name: &str) -> Option<Value> {
        self.get(name).cloned()
    }

    fn set_field(&mut self, name: &str, value: Value) -> Result<()> {
        let record = self.name.clone();
        let frozen = self.frozen;
        let field = self
            .fields
            .iter_mut()
            .find(|f| f.name == name)
            .ok_or_else(|| OrmError::NoSuchField {
                record: record.clone(),
                field: name.to_string(),
            })?;
        if frozen {
            return Err(OrmError::NotMutable {
                record,
                field: name.to_string(),
            });
        }
        // Null-kind fields are untyped and take anything.
        if field.kind == ValueKind::Null {
            field.value = value;
            return Ok(());
        }
        let found = value.kind();
        field.value = field.kind.coerce(value).map_err(|_| OrmError::TypeMismatch {
            record,
            field: name.to_string(),
            expected: field.kind,
            found,
        })?;
        Ok(())
    }

    fn blank(&self) -> Self {
        Self {
            name: self.name.clone(),
            fields: self
                .fields
                .iter()
                .map(|f| DynamicField {
                    name: f.name.clone(),
                    kind: f.kind,
                    value: f.kind.zero(),
                })
                .collect(),
            frozen: false,
        }
    }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn validate<R: Record + ?Sized>(record: &R) -> Result<()> {
    let name = record.type_name();
    if !is_identifier(name) {
        return Err(OrmError::NotARecord(format!(
            "type name {name:?} is not a plain identifier"
        )));
    }
    let fields = record.field_names();
    if fields.is_empty() {
        return Err(OrmError::NotARecord(format!("{name} declares no fields")));
    }
    if let Some(bad) = fields.iter().find(|f| !is_identifier(f)) {
        return Err(OrmError::NotARecord(format!(
            "{name} field {bad:?} is not a plain identifier"
        )));
    }
    if fields.len() != record.field_values().len() {
        return Err(OrmError::NotARecord(format!(
            "{name} field names and values are misaligned"
        )));
    }
    Ok(())
}

pub fn is_record<R: Record + ?Sized>(record: &R) -> bool {
    validate(record).is_ok()
}

pub fn type_name<R: Record + ?Sized>(record: &R) -> Result<&str> {
    validate(record)?;
    Ok(record.type_name())
}

pub fn field_names<R: Record + ?Sized>(record: &R) -> Vec<String> {
    record.field_names().into_iter().map(str::to_string).collect()
}

pub fn field_values<R: Record + ?Sized>(record: &R) -> Vec<Value> {
    record.field_values()
}

pub fn field_by_name<R: Record + ?Sized>(record: &R, name: &str) -> Option<Value> {
    record.field_by_name(name)
}

pub fn set_field<R: Record + ?Sized>(record: &mut R, name: &str, value: impl Into<Value>) -> Result<()> {
    record.set_field(name, value.into())
}

/// The introspected (name, fields, values) triple of one record instance.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityShape {
    pub type_name: String,
    pub fields: Vec<String>,
    pub values: Vec<Value>,
}

impl EntityShape {
    /// Introspect `record`, failing with [`OrmError::NotARecord`] if it has no usable shape.
    pub fn of<R: Record + ?Sized>(record: &R) -> Result<Self> {
        validate(record)?;
        Ok(Self {
            type_name: record.type_name().to_string(),
            fields: field_names(record),
            values: record.field_values(),
        })
    }

    pub fn id_index(&self) -> Option<usize> {
        self.fields.iter().position(|f| f.eq_ignore_ascii_case(ID_FIELD))
    }

    /// The identity field as declared, or [`OrmError::MissingIdField`].
    pub fn id_field(&self) -> Result<&str> {
        self.id_index()
            .map(|idx| self.fields[idx].as_str())
            .ok_or_else(|| OrmError::MissingIdField(self.type_name.clone()))
    }

    pub fn id_value(&self) -> Option<&Value> {
        self.id_index().and_then(|idx| self.values.get(idx))
    }
}
