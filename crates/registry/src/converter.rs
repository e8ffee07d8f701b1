//! Property converters
//!
//! A converter translates between the value a caller supplies (API side) and
//! the value kept in the store. `convert` runs on write, `revert` on read.
//! The conversion parameter registered for the key is handed to the
//! converter when it is instantiated.

use std::fmt;
use std::sync::Arc;
use stratagraph_core::{SecurityContext, StrataError, StrataResult, Value};

/// Two-way value conversion for one property
pub trait PropertyConverter: Send + Sync {
    /// API value → stored value
    fn convert(&self, source: &Value) -> StrataResult<Value>;

    /// Stored value → API value
    fn revert(&self, source: &Value) -> StrataResult<Value>;
}

/// Factory for `Named` converter kinds
pub type ConverterFactory = Arc<
    dyn Fn(&SecurityContext, Option<&Value>) -> StrataResult<Box<dyn PropertyConverter>>
        + Send
        + Sync,
>;

/// Converter registered for a property
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ConverterKind {
    /// Integers, numeric strings and whole floats to `Int`
    Integer,
    /// Booleans and "true"/"false"/"1"/"0" strings to `Bool`
    Boolean,
    /// Strings stored lowercased
    Lowercase,
    /// Converter built by the factory registered under this name
    Named(String),
}

impl fmt::Display for ConverterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConverterKind::Integer => write!(f, "Integer"),
            ConverterKind::Boolean => write!(f, "Boolean"),
            ConverterKind::Lowercase => write!(f, "Lowercase"),
            ConverterKind::Named(name) => write!(f, "Named({})", name),
        }
    }
}

/// Parses integers; the parameter, if an `Int`, is used when the input is
/// null
pub struct IntegerConverter {
    default: Option<i64>,
}

impl IntegerConverter {
    /// Converter with an optional default for null input
    pub fn new(parameter: Option<&Value>) -> Self {
        Self {
            default: parameter.and_then(Value::as_int),
        }
    }
}

impl PropertyConverter for IntegerConverter {
    fn convert(&self, source: &Value) -> StrataResult<Value> {
        match source {
            Value::Null => Ok(self.default.map(Value::Int).unwrap_or(Value::Null)),
            Value::Int(i) => Ok(Value::Int(*i)),
            Value::Float(f) if f.fract() == 0.0 && f.is_finite() => Ok(Value::Int(*f as i64)),
            Value::String(s) => s
                .trim()
                .parse::<i64>()
                .map(Value::Int)
                .map_err(|e| StrataError::conversion(format!("{:?} is not an integer: {}", s, e))),
            other => Err(StrataError::conversion(format!(
                "cannot convert {} to integer",
                other.type_name()
            ))),
        }
    }

    fn revert(&self, source: &Value) -> StrataResult<Value> {
        Ok(source.clone())
    }
}

/// Parses booleans
pub struct BooleanConverter;

impl PropertyConverter for BooleanConverter {
    fn convert(&self, source: &Value) -> StrataResult<Value> {
        match source {
            Value::Null => Ok(Value::Null),
            Value::Bool(b) => Ok(Value::Bool(*b)),
            Value::Int(i) => Ok(Value::Bool(*i != 0)),
            Value::String(s) => match s.trim().to_lowercase().as_str() {
                "true" | "1" | "yes" => Ok(Value::Bool(true)),
                "false" | "0" | "no" => Ok(Value::Bool(false)),
                _ => Err(StrataError::conversion(format!("{:?} is not a boolean", s))),
            },
            other => Err(StrataError::conversion(format!(
                "cannot convert {} to boolean",
                other.type_name()
            ))),
        }
    }

    fn revert(&self, source: &Value) -> StrataResult<Value> {
        Ok(source.clone())
    }
}

/// Stores strings lowercased; non-strings pass through
pub struct LowercaseConverter;

impl PropertyConverter for LowercaseConverter {
    fn convert(&self, source: &Value) -> StrataResult<Value> {
        Ok(match source {
            Value::String(s) => Value::String(s.to_lowercase()),
            other => other.clone(),
        })
    }

    fn revert(&self, source: &Value) -> StrataResult<Value> {
        Ok(source.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integer_converter() {
        let c = IntegerConverter::new(None);
        assert_eq!(c.convert(&Value::from("42")).unwrap(), Value::Int(42));
        assert_eq!(c.convert(&Value::Float(3.0)).unwrap(), Value::Int(3));
        assert_eq!(c.convert(&Value::Null).unwrap(), Value::Null);
        assert!(matches!(
            c.convert(&Value::from("abc")),
            Err(StrataError::Conversion(_))
        ));
    }

    #[test]
    fn test_integer_converter_default_parameter() {
        let c = IntegerConverter::new(Some(&Value::Int(7)));
        assert_eq!(c.convert(&Value::Null).unwrap(), Value::Int(7));
    }

    #[test]
    fn test_boolean_converter() {
        let c = BooleanConverter;
        assert_eq!(c.convert(&Value::from("TRUE")).unwrap(), Value::Bool(true));
        assert_eq!(c.convert(&Value::Int(0)).unwrap(), Value::Bool(false));
        assert!(c.convert(&Value::from("maybe")).is_err());
    }

    #[test]
    fn test_lowercase_converter() {
        let c = LowercaseConverter;
        assert_eq!(
            c.convert(&Value::from("Alice@Example.COM")).unwrap(),
            Value::from("alice@example.com")
        );
        assert_eq!(c.convert(&Value::Int(1)).unwrap(), Value::Int(1));
    }
}
