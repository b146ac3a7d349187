//! String and JSON conversion into [`ModelValue`]s.
//!
//! Simple-type binding converts raw strings from value providers; body
//! binding converts parsed JSON guided by metadata.

use crate::metadata::{EnumSpec, ModelMetadataProvider, ModelType, ScalarKind};
use crate::value::{EnumValue, ModelList, ModelMap, ModelObject, ModelValue};
use chrono::DateTime;
use serde_json::Value as Json;
use thiserror::Error;

/// A value could not be converted to the target type.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("cannot convert {found} to {expected}{}", path_suffix(.path))]
pub struct ConversionError {
    /// Target type name.
    pub expected: String,
    /// Short description of the rejected input.
    pub found: String,
    /// JSON path of the rejected value (`$` for the root).
    pub path: Option<String>,
}

fn path_suffix(path: &Option<String>) -> String {
    path.as_ref()
        .map(|p| format!(" at {p}"))
        .unwrap_or_default()
}

impl ConversionError {
    fn new(expected: &ModelType, found: impl Into<String>) -> Self {
        Self {
            expected: expected.to_string(),
            found: found.into(),
            path: None,
        }
    }

    fn at(mut self, path: &str) -> Self {
        self.path.get_or_insert_with(|| path.to_string());
        self
    }
}

/// Converts a raw string to a simple type.
///
/// Leading and trailing whitespace is ignored for everything but strings.
pub fn convert_from_str(model_type: &ModelType, raw: &str) -> Result<ModelValue, ConversionError> {
    match model_type {
        ModelType::Nullable(inner) => {
            if raw.trim().is_empty() {
                Ok(ModelValue::Null)
            } else {
                convert_from_str(inner, raw)
            }
        }
        ModelType::Scalar(kind) => convert_scalar(*kind, raw)
            .ok_or_else(|| ConversionError::new(model_type, format!("'{raw}'"))),
        ModelType::Enum(spec) => {
            convert_enum(spec, raw).ok_or_else(|| ConversionError::new(model_type, format!("'{raw}'")))
        }
        other => Err(ConversionError::new(other, "a string")),
    }
}

fn convert_scalar(kind: ScalarKind, raw: &str) -> Option<ModelValue> {
    let trimmed = raw.trim();
    match kind {
        ScalarKind::String => Some(ModelValue::String(raw.to_string())),
        ScalarKind::Bool => match trimmed.to_ascii_lowercase().as_str() {
            "true" => Some(ModelValue::Bool(true)),
            "false" => Some(ModelValue::Bool(false)),
            _ => None,
        },
        ScalarKind::Int => trimmed.parse().ok().map(ModelValue::Int),
        ScalarKind::UInt => trimmed.parse().ok().map(ModelValue::UInt),
        ScalarKind::Float => trimmed
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .map(ModelValue::Float),
        ScalarKind::Char => {
            let mut chars = raw.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) => Some(ModelValue::Char(c)),
                _ => None,
            }
        }
        ScalarKind::Uuid => trimmed.parse().ok().map(ModelValue::Uuid),
        ScalarKind::DateTime => DateTime::parse_from_rfc3339(trimmed)
            .ok()
            .map(ModelValue::DateTime),
    }
}

/// Converts a variant name (case-insensitive), a defined numeric value, or for
/// flags enums a comma-separated list of names.
fn convert_enum(spec: &EnumSpec, raw: &str) -> Option<ModelValue> {
    let trimmed = raw.trim();
    if let Ok(number) = trimmed.parse::<i64>() {
        return spec
            .variants
            .iter()
            .find(|(_, value)| *value == number)
            .map(|(name, value)| {
                ModelValue::Enum(EnumValue {
                    name: name.clone(),
                    value: *value,
                })
            });
    }

    let lookup = |name: &str| {
        spec.variants
            .iter()
            .find(|(variant, _)| variant.eq_ignore_ascii_case(name.trim()))
    };

    if spec.flags && trimmed.contains(',') {
        let mut names = Vec::new();
        let mut combined = 0_i64;
        for part in trimmed.split(',') {
            let (name, value) = lookup(part)?;
            names.push(name.as_str());
            combined |= *value;
        }
        return Some(ModelValue::Enum(EnumValue {
            name: names.join(", "),
            value: combined,
        }));
    }

    lookup(trimmed).map(|(name, value)| {
        ModelValue::Enum(EnumValue {
            name: name.clone(),
            value: *value,
        })
    })
}

/// Converts parsed JSON to a model of `model_type`.
///
/// Unknown object members are ignored. Complex objects only receive the
/// properties present in the JSON.
pub fn convert_from_json(
    json: &Json,
    model_type: &ModelType,
    provider: &ModelMetadataProvider,
) -> Result<ModelValue, ConversionError> {
    convert_json_at(json, model_type, provider, "$")
}

fn convert_json_at(
    json: &Json,
    model_type: &ModelType,
    provider: &ModelMetadataProvider,
    path: &str,
) -> Result<ModelValue, ConversionError> {
    if json.is_null() {
        return if model_type.accepts_null() {
            Ok(ModelValue::Null)
        } else {
            Err(ConversionError::new(model_type, "null").at(path))
        };
    }

    match model_type {
        ModelType::Nullable(inner) => convert_json_at(json, inner, provider, path),
        ModelType::Scalar(kind) => {
            convert_json_scalar(json, *kind).ok_or_else(|| mismatch(json, model_type, path))
        }
        ModelType::Enum(spec) => {
            let raw = match json {
                Json::String(s) => s.clone(),
                Json::Number(n) => n.to_string(),
                _ => return Err(mismatch(json, model_type, path)),
            };
            convert_enum(spec, &raw).ok_or_else(|| mismatch(json, model_type, path))
        }
        ModelType::Collection(element) => {
            let Json::Array(items) = json else {
                return Err(mismatch(json, model_type, path));
            };
            let items = items
                .iter()
                .enumerate()
                .map(|(i, item)| convert_json_at(item, element, provider, &format!("{path}[{i}]")))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(ModelValue::List(ModelList::new(items)))
        }
        ModelType::Dictionary(key_type, value_type) => {
            let Json::Object(members) = json else {
                return Err(mismatch(json, model_type, path));
            };
            let mut entries = Vec::with_capacity(members.len());
            for (key, value) in members {
                let member_path = format!("{path}.{key}");
                let key = convert_from_str(key_type, key).map_err(|e| e.at(&member_path))?;
                let value = convert_json_at(value, value_type, provider, &member_path)?;
                entries.push((key, value));
            }
            Ok(ModelValue::Map(ModelMap::new(entries)))
        }
        ModelType::Complex(name) => {
            let Json::Object(members) = json else {
                return Err(mismatch(json, model_type, path));
            };
            let Some(descriptor) = provider.type_descriptor(name) else {
                return Err(ConversionError::new(model_type, "an unregistered type").at(path));
            };
            let object = ModelObject::new(name.clone());
            for property in &descriptor.properties {
                let member = members
                    .iter()
                    .find(|(key, _)| key.eq_ignore_ascii_case(&property.name));
                if let Some((key, value)) = member {
                    let value =
                        convert_json_at(value, &property.model_type, provider, &format!("{path}.{key}"))?;
                    object.set(property.name.clone(), value);
                }
            }
            Ok(ModelValue::Object(object))
        }
        ModelType::FormFile
        | ModelType::FormCollection
        | ModelType::CancellationToken
        | ModelType::Service(_) => Err(mismatch(json, model_type, path)),
    }
}

fn convert_json_scalar(json: &Json, kind: ScalarKind) -> Option<ModelValue> {
    match (kind, json) {
        (ScalarKind::String, Json::String(s)) => Some(ModelValue::String(s.clone())),
        (ScalarKind::Bool, Json::Bool(b)) => Some(ModelValue::Bool(*b)),
        (ScalarKind::Int, Json::Number(n)) => n.as_i64().map(ModelValue::Int),
        (ScalarKind::UInt, Json::Number(n)) => n.as_u64().map(ModelValue::UInt),
        (ScalarKind::Float, Json::Number(n)) => n.as_f64().map(ModelValue::Float),
        (ScalarKind::Char | ScalarKind::Uuid | ScalarKind::DateTime, Json::String(s)) => {
            convert_scalar(kind, s)
        }
        _ => None,
    }
}

fn mismatch(json: &Json, expected: &ModelType, path: &str) -> ConversionError {
    let found = match json {
        Json::Null => "null",
        Json::Bool(_) => "a boolean",
        Json::Number(_) => "a number",
        Json::String(_) => "a string",
        Json::Array(_) => "an array",
        Json::Object(_) => "an object",
    };
    ConversionError::new(expected, found).at(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{PropertyDescriptor, TypeDescriptor};
    use serde_json::json;

    fn color() -> ModelType {
        ModelType::enumeration(EnumSpec::new("Color", ["Red", "Green", "Blue"]))
    }

    #[test]
    fn test_scalar_conversion() {
        assert_eq!(convert_from_str(&ModelType::int(), " 42 "), Ok(ModelValue::Int(42)));
        assert_eq!(convert_from_str(&ModelType::bool(), "TRUE"), Ok(ModelValue::Bool(true)));
        assert!(convert_from_str(&ModelType::int(), "4x").is_err());
        assert!(convert_from_str(&ModelType::float(), "NaN").is_err());
        assert_eq!(
            convert_from_str(&ModelType::nullable(ModelType::int()), "  "),
            Ok(ModelValue::Null)
        );
    }

    #[test]
    fn test_enum_conversion() {
        let parsed = convert_from_str(&color(), "green").expect("green");
        assert_eq!(parsed.as_i64(), Some(1));
        assert_eq!(convert_from_str(&color(), "2").expect("2").as_i64(), Some(2));
        assert!(convert_from_str(&color(), "7").is_err());
        assert!(convert_from_str(&color(), "Purple").is_err());
    }

    #[test]
    fn test_flags_enum_conversion() {
        let access = ModelType::enumeration(EnumSpec::flags(
            "Access",
            [("Read", 1), ("Write", 2), ("Delete", 4)],
        ));
        let ModelValue::Enum(value) = convert_from_str(&access, "read, delete").expect("flags") else {
            panic!("expected enum");
        };
        assert_eq!(value.value, 5);
        assert_eq!(value.name, "Read, Delete");
    }

    #[test]
    fn test_json_complex_conversion() {
        let provider = ModelMetadataProvider::builder()
            .register(
                TypeDescriptor::new("Order")
                    .property(PropertyDescriptor::new("id", ModelType::int()))
                    .property(PropertyDescriptor::new("lines", ModelType::list_of(ModelType::string())))
                    .property(PropertyDescriptor::new("note", ModelType::string())),
            )
            .build();

        let json = json!({ "ID": 7, "lines": ["a", "b"], "extra": true });
        let value = convert_from_json(&json, &ModelType::complex("Order"), &provider).expect("order");
        let order = value.as_object().expect("object");
        assert_eq!(order.get("id"), Some(ModelValue::Int(7)));
        assert_eq!(order.get("lines").and_then(|l| l.as_list().map(|l| l.len())), Some(2));
        assert!(!order.contains("note"));
    }

    #[test]
    fn test_json_error_path() {
        let provider = ModelMetadataProvider::default();
        let err = convert_from_json(
            &json!([1, "two"]),
            &ModelType::list_of(ModelType::int()),
            &provider,
        )
        .expect_err("mismatch");
        assert_eq!(err.path.as_deref(), Some("$[1]"));
        assert_eq!(err.found, "a string");
    }

    #[test]
    fn test_json_null_for_value_type() {
        let provider = ModelMetadataProvider::default();
        assert!(convert_from_json(&Json::Null, &ModelType::int(), &provider).is_err());
        assert_eq!(
            convert_from_json(&Json::Null, &ModelType::string(), &provider),
            Ok(ModelValue::Null)
        );
    }
}
