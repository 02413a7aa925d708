//! Reading raw channel properties against a [`ProtocolSchema`].
//!
//! [`PropertyReader`] never stops at the first problem: each typed getter records
//! its violation and returns `None`, and [`PropertyReader::finish`] reports them
//! all at once.

use std::time::Duration;

use serde_json::{Map, Value};

use crate::error::{ConfigValidationError, FieldViolation};
use crate::schema::{FieldType, ProtocolSchema};

pub type Properties = Map<String, Value>;

/// Borrow `raw` as an object. `null` is treated as an empty object.
pub fn as_object(raw: &Value) -> Result<Properties, ConfigValidationError> {
    match raw {
        Value::Object(map) => Ok(map.clone()),
        Value::Null => Ok(Map::new()),
        _ => Err(ConfigValidationError::NotAnObject),
    }
}

/// The protocol named by the `protocol` property, or by `type` when that is absent.
pub fn protocol_name(properties: &Properties) -> Option<String> {
    ["protocol", "type"].iter().find_map(|key| {
        properties
            .get(*key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    })
}

/// Overlay values nested under `property_key` onto the root-level values.
///
/// Nested values win; a nested `null` does not erase a root value.
pub fn merge_nested(properties: &Properties, property_key: &str) -> Properties {
    let mut merged = properties.clone();
    if let Some(Value::Object(nested)) = properties.get(property_key) {
        for (key, value) in nested {
            if !value.is_null() {
                merged.insert(key.clone(), value.clone());
            }
        }
    }
    merged
}

/// Typed, violation-collecting access to one protocol's properties.
pub struct PropertyReader<'a> {
    schema: &'a ProtocolSchema,
    values: &'a Properties,
    violations: Vec<FieldViolation>,
}

impl<'a> PropertyReader<'a> {
    pub fn new(schema: &'a ProtocolSchema, values: &'a Properties) -> Self {
        Self {
            schema,
            values,
            violations: Vec::new(),
        }
    }

    /// Record a problem that a typed getter cannot detect.
    pub fn violate(&mut self, field: &str, message: impl Into<String>) {
        self.violations.push(FieldViolation::new(field, message));
    }

    pub fn has_violation(&self, field: &str) -> bool {
        self.violations.iter().any(|v| v.field == field)
    }

    pub fn string(&mut self, key: &str) -> Option<String> {
        let field_type = self.field_type(key, &[FieldType::String, FieldType::Secret]);
        match self.raw(key)? {
            Raw::Value(Value::String(s)) => Some(if field_type == Some(FieldType::Secret) {
                s.clone()
            } else {
                s.trim().to_string()
            }),
            Raw::Value(Value::Number(n)) => Some(n.to_string()),
            Raw::Value(Value::Bool(b)) => Some(b.to_string()),
            Raw::Value(_) => self.invalid(key, "must be a string"),
            Raw::Default(d) => Some(d),
        }
    }

    pub fn number(&mut self, key: &str) -> Option<i64> {
        self.field_type(key, &[FieldType::Number]);
        match self.raw(key)? {
            Raw::Value(value) => match parse_integer(value) {
                Some(n) => Some(n),
                None => self.invalid(key, "must be a whole number"),
            },
            Raw::Default(d) => d.parse().ok(),
        }
    }

    pub fn boolean(&mut self, key: &str) -> Option<bool> {
        self.field_type(key, &[FieldType::Boolean]);
        match self.raw(key)? {
            Raw::Value(Value::Bool(b)) => Some(*b),
            Raw::Value(Value::String(s)) => match s.trim().to_ascii_lowercase().as_str() {
                "true" => Some(true),
                "false" => Some(false),
                _ => self.invalid(key, "must be true or false"),
            },
            Raw::Value(_) => self.invalid(key, "must be true or false"),
            Raw::Default(d) => d.parse().ok(),
        }
    }

    pub fn duration(&mut self, key: &str) -> Option<Duration> {
        self.field_type(key, &[FieldType::Duration]);
        let millis = match self.raw(key)? {
            Raw::Value(value) => parse_integer(value),
            Raw::Default(d) => d.parse().ok(),
        };
        match millis {
            Some(ms) if ms >= 0 => Some(Duration::from_millis(ms as u64)),
            _ => self.invalid(key, "must be a non-negative number of milliseconds"),
        }
    }

    /// Read a number into `T`, recording a violation when below `min` or out of range.
    pub fn number_in<T: TryFrom<i64>>(&mut self, key: &str, min: i64) -> Option<T> {
        let n = self.number(key)?;
        if n < min {
            return self.invalid(key, format!("must be at least {min}"));
        }
        match T::try_from(n) {
            Ok(v) => Some(v),
            Err(_) => self.invalid(key, "is out of range"),
        }
    }

    pub fn finish(self) -> Result<(), ConfigValidationError> {
        if self.violations.is_empty() {
            Ok(())
        } else {
            Err(ConfigValidationError::Fields(self.violations))
        }
    }

    fn raw(&mut self, key: &str) -> Option<Raw<'a>> {
        let value = self.values.get(key).filter(|v| !is_blank(v));
        if let Some(value) = value {
            return Some(Raw::Value(value));
        }
        let schema = self.schema;
        let field = schema.field(key);
        if let Some(default) = field.and_then(|f| f.default()) {
            return Some(Raw::Default(default.to_string()));
        }
        if field.is_some_and(|f| f.required) {
            self.violate(key, "is required");
        }
        None
    }

    fn field_type(&self, key: &str, expected: &[FieldType]) -> Option<FieldType> {
        let field_type = self.schema.field(key).map(|f| f.field_type);
        debug_assert!(
            field_type.is_none_or(|t| expected.contains(&t)),
            "field '{key}' read with the wrong type"
        );
        field_type
    }

    fn invalid<T>(&mut self, key: &str, message: impl Into<String>) -> Option<T> {
        self.violate(key, message);
        None
    }
}

enum Raw<'a> {
    Value(&'a Value),
    Default(String),
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        _ => false,
    }
}

fn parse_integer(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
