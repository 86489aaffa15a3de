//! Value-shape descriptors.
//!
//! Full type-to-schema mapping lives outside this crate; the engine only
//! needs the OpenAPI `type`/`format` pair for a runtime value and a
//! wrapper for pre-built data formats.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

/// OpenAPI `type` and `format` of a runtime value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValueShape {
    pub type_name: &'static str,
    pub format: Option<&'static str>,
}

/// Derives the shape of a JSON value.
///
/// Integers that fit in 32 bits are `int32`, other integers `int64`, and
/// every non-integral number is a `double`.
pub fn describe_value(value: &Value) -> ValueShape {
    match value {
        Value::Bool(_) => ValueShape {
            type_name: "boolean",
            format: None,
        },
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                let format = if i32::try_from(i).is_ok() {
                    "int32"
                } else {
                    "int64"
                };
                ValueShape {
                    type_name: "integer",
                    format: Some(format),
                }
            } else if n.is_u64() {
                ValueShape {
                    type_name: "integer",
                    format: Some("int64"),
                }
            } else {
                ValueShape {
                    type_name: "number",
                    format: Some("double"),
                }
            }
        }
        Value::String(_) => ValueShape {
            type_name: "string",
            format: None,
        },
        Value::Array(_) => ValueShape {
            type_name: "array",
            format: None,
        },
        Value::Object(_) | Value::Null => ValueShape {
            type_name: "object",
            format: None,
        },
    }
}

/// JSON-schema-like description of the data an event carries or a
/// function accepts.
///
/// Serialised as a plain JSON object, e.g.
/// `{"dataObject": {"type": "string"}}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DataFormat(Map<String, Value>);

impl DataFormat {
    /// Creates an empty data format.
    pub fn new() -> Self {
        Self::default()
    }

    /// A format with a single root node and the given schema.
    pub fn single(root: impl Into<String>, schema: Value) -> Self {
        let mut map = Map::new();
        map.insert(root.into(), schema);
        Self(map)
    }

    /// A format whose root node is a primitive type.
    pub fn primitive(root: impl Into<String>, type_name: &str, format: Option<&str>) -> Self {
        let mut schema = json!({ "type": type_name });
        if let Some(format) = format {
            schema["format"] = Value::String(format.to_string());
        }
        Self::single(root, schema)
    }

    /// A format for events that carry no data (`{"dataObject": {}}`).
    pub fn empty() -> Self {
        Self::single("dataObject", Value::Object(Map::new()))
    }

    /// Builds a format from an arbitrary JSON value; only objects qualify.
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(map) => Some(Self(map)),
            _ => None,
        }
    }

    /// Adds or replaces a node.
    pub fn insert(&mut self, key: impl Into<String>, schema: Value) {
        self.0.insert(key.into(), schema);
    }

    /// Returns the schema of a node.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns the underlying JSON object.
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn describes_primitives() {
        assert_eq!(describe_value(&json!(true)).type_name, "boolean");
        assert_eq!(describe_value(&json!("x")).type_name, "string");
        assert_eq!(describe_value(&json!("x")).format, None);

        let small = describe_value(&json!(42));
        assert_eq!(small.type_name, "integer");
        assert_eq!(small.format, Some("int32"));

        let big = describe_value(&json!(10_000_000_000_i64));
        assert_eq!(big.format, Some("int64"));

        let float = describe_value(&json!(1.5));
        assert_eq!(float.type_name, "number");
        assert_eq!(float.format, Some("double"));
    }

    #[test]
    fn describes_containers() {
        assert_eq!(describe_value(&json!([1, 2])).type_name, "array");
        assert_eq!(describe_value(&json!({"a": 1})).type_name, "object");
    }

    #[test]
    fn primitive_format_serialises_flat() {
        let format = DataFormat::primitive("dataObject", "integer", Some("int32"));
        let json = serde_json::to_value(&format).unwrap();
        assert_eq!(
            json,
            json!({"dataObject": {"type": "integer", "format": "int32"}})
        );
    }

    #[test]
    fn from_value_rejects_non_objects() {
        assert!(DataFormat::from_value(json!([1])).is_none());
        assert!(DataFormat::from_value(json!({"a": {}})).is_some());
        assert_eq!(DataFormat::empty().len(), 1);
    }
}
