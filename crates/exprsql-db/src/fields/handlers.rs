//! Type handlers that override how a field's values are bound.

use std::fmt::Debug;

use exprsql_core::{SqlError, SqlResult};

use crate::value::{NativeType, Value};

/// Converts a host value into the value handed to the database driver.
///
/// Handlers are attached per field with
/// [`FieldDef::type_handler`](super::FieldDef::type_handler) and only apply to
/// object-form values (`set_object`, `set_value`, `set_bulk` rows, key
/// predicates). Expression-context values follow the fixed coercion rules.
pub trait TypeHandler: Debug + Send + Sync {
    /// A short name used in diagnostics.
    fn name(&self) -> &str;

    /// Converts `value` for a column declared as `native`.
    fn to_db_value(&self, value: &Value, native: NativeType) -> SqlResult<Value>;
}

/// Always binds enums by their declared name, even on numeric columns.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnumNameHandler;

impl TypeHandler for EnumNameHandler {
    fn name(&self) -> &str {
        "enum_name"
    }

    fn to_db_value(&self, value: &Value, _native: NativeType) -> SqlResult<Value> {
        Ok(match value {
            Value::Enum(e) => Value::String(e.name.clone()),
            other => other.clone(),
        })
    }
}

/// Serializes records and lists into a JSON document string.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonHandler;

impl TypeHandler for JsonHandler {
    fn name(&self) -> &str {
        "json"
    }

    fn to_db_value(&self, value: &Value, _native: NativeType) -> SqlResult<Value> {
        match value {
            Value::Null => Ok(Value::Null),
            other => {
                let json = to_json(other)?;
                serde_json::to_string(&json)
                    .map(Value::String)
                    .map_err(|e| SqlError::TypeMismatch(format!("Cannot serialize value: {e}")))
            }
        }
    }
}

fn to_json(value: &Value) -> SqlResult<serde_json::Value> {
    Ok(match value {
        Value::Null => serde_json::Value::Null,
        Value::Bool(b) => serde_json::Value::Bool(*b),
        Value::Int(i) => serde_json::json!(i),
        Value::Float(f) => serde_json::json!(f),
        Value::Json(j) => j.clone(),
        Value::Enum(e) => serde_json::Value::String(e.name.clone()),
        Value::List(items) => {
            serde_json::Value::Array(items.iter().map(to_json).collect::<SqlResult<_>>()?)
        }
        Value::Record(record) => {
            let mut map = serde_json::Map::new();
            for (member, v) in record.iter() {
                map.insert(member.to_string(), to_json(v)?);
            }
            serde_json::Value::Object(map)
        }
        Value::Bytes(_) => {
            return Err(SqlError::TypeMismatch(
                "Binary values cannot be stored as JSON".to_string(),
            ))
        }
        other => serde_json::Value::String(other.to_string()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::{EnumValue, Record};

    #[test]
    fn test_enum_name_handler() {
        let v = EnumNameHandler
            .to_db_value(&Value::Enum(EnumValue::new("Gender", "Male", 1)), NativeType::Byte)
            .unwrap();
        assert_eq!(v, Value::String("Male".into()));
        let passthrough = EnumNameHandler.to_db_value(&Value::Int(5), NativeType::Int32).unwrap();
        assert_eq!(passthrough, Value::Int(5));
    }

    #[test]
    fn test_json_handler_record() {
        let record = Record::new().with("a", 1).with("b", "x");
        let v = JsonHandler
            .to_db_value(&Value::Record(record), NativeType::Json)
            .unwrap();
        assert_eq!(v, Value::String(r#"{"a":1,"b":"x"}"#.into()));
    }

    #[test]
    fn test_json_handler_null_passes_through() {
        let v = JsonHandler.to_db_value(&Value::Null, NativeType::Json).unwrap();
        assert!(v.is_null());
    }

    #[test]
    fn test_json_handler_rejects_bytes() {
        let err = JsonHandler
            .to_db_value(&Value::Bytes(vec![1, 2]), NativeType::Json)
            .unwrap_err();
        assert!(matches!(err, SqlError::TypeMismatch(_)));
    }
}
