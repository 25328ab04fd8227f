//! Field values
//!
//! The codec works on a name → [`Value`] mapping rather than on concrete
//! record types; [`crate::record::Record`] bridges the two.

use std::collections::HashMap;

use super::{CodecError, CodecResult};

/// A single decoded or to-be-encoded field value
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    Bool(bool),
    /// Any integer wire type; `i128` covers both `i64` and `u64` exactly
    Int(i128),
    Float(f64),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Bool(_) => "bool",
            Value::Int(_) => "integer",
            Value::Float(_) => "float",
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i128> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Int(i) => Some(*i as f64),
            Value::Bool(_) => None,
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<f32> for Value {
    fn from(value: f32) -> Self {
        Value::Float(value.into())
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

macro_rules! int_value {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for Value {
                fn from(value: $ty) -> Self {
                    Value::Int(value.into())
                }
            }

            impl FromValue for $ty {
                fn from_value(field: &str, value: Value) -> CodecResult<Self> {
                    match value {
                        Value::Int(v) => <$ty>::try_from(v).map_err(|_| CodecError::OutOfRange {
                            field: field.to_string(),
                            value: v,
                            min: <$ty>::MIN.into(),
                            max: <$ty>::MAX.into(),
                        }),
                        other => Err(CodecError::TypeMismatch {
                            field: field.to_string(),
                            expected: "integer",
                            found: other.type_name(),
                        }),
                    }
                }
            }
        )*
    };
}

int_value!(u8, i8, u16, i16, u32, i32, u64, i64);

/// Conversion out of a [`Value`] for typed record reconstruction
pub trait FromValue: Sized {
    fn from_value(field: &str, value: Value) -> CodecResult<Self>;
}

impl FromValue for bool {
    fn from_value(field: &str, value: Value) -> CodecResult<Self> {
        value.as_bool().ok_or_else(|| CodecError::TypeMismatch {
            field: field.to_string(),
            expected: "bool",
            found: value.type_name(),
        })
    }
}

impl FromValue for f64 {
    fn from_value(field: &str, value: Value) -> CodecResult<Self> {
        value.as_float().ok_or_else(|| CodecError::TypeMismatch {
            field: field.to_string(),
            expected: "float",
            found: value.type_name(),
        })
    }
}

impl FromValue for f32 {
    fn from_value(field: &str, value: Value) -> CodecResult<Self> {
        f64::from_value(field, value).map(|v| v as f32)
    }
}

impl FromValue for Value {
    fn from_value(_field: &str, value: Value) -> CodecResult<Self> {
        Ok(value)
    }
}

/// Field values keyed by field name
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldValues {
    values: HashMap<String, Value>,
}

impl FieldValues {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            values: HashMap::with_capacity(capacity),
        }
    }

    /// Builder-style insert
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.values.insert(name.into(), value.into())
    }

    pub fn value(&self, name: &str) -> Option<Value> {
        self.values.get(name).copied()
    }

    /// Typed lookup; a missing name is [`CodecError::MissingField`]
    pub fn get<T: FromValue>(&self, name: &str) -> CodecResult<T> {
        let value = self
            .value(name)
            .ok_or_else(|| CodecError::MissingField(name.to_string()))?;
        T::from_value(name, value)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Value)> {
        self.values.iter().map(|(name, value)| (name.as_str(), *value))
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for FieldValues {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut values = FieldValues::new();
        for (name, value) in iter {
            values.insert(name, value);
        }
        values
    }
}
