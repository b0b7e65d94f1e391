//! JSON Schema → call signature translation.
//!
//! A [`Signature`] is built once per discovered operation and validates argument maps
//! before anything is forwarded to the child server.

use indexmap::IndexMap;
use serde_json::{json, Map, Value};
use thiserror::Error;

/// Accepted shape of a single argument.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldKind {
    String,
    Number,
    /// A number with no fractional part.
    Integer,
    Boolean,
    /// Closed set of string choices.
    Enum(Vec<String>),
    Array(Box<FieldKind>),
    Object(Signature),
    /// Free-form object without declared properties.
    Map,
    /// Anything, including shapes the translation does not understand.
    Any,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldSpec {
    pub kind: FieldKind,
    pub required: bool,
    pub nullable: bool,
    pub default: Option<Value>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Signature {
    fields: IndexMap<String, FieldSpec>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SignatureError {
    #[error("arguments must be a JSON object")]
    NotAnObject,

    #[error("missing required argument \"{0}\"")]
    Missing(String),

    #[error("argument \"{field}\" must be {expected}, got {found}")]
    TypeMismatch {
        field: String,
        expected: String,
        found: String,
    },

    #[error("argument \"{field}\" must be one of: {allowed}")]
    NotInChoice { field: String, allowed: String },
}

impl Signature {
    /// Zero-parameter signature.
    pub fn empty() -> Self {
        Signature::default()
    }

    /// Translates an object schema. Anything that is not an object with `properties`
    /// yields an empty signature.
    pub fn from_schema(schema: &Value) -> Self {
        let Some(properties) = schema.get("properties").and_then(Value::as_object) else {
            return Signature::empty();
        };
        let required: Vec<&str> = schema
            .get("required")
            .and_then(Value::as_array)
            .map(|names| names.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default();

        let fields = properties
            .iter()
            .map(|(name, prop)| {
                let (kind, nullable) = FieldKind::from_property(prop);
                let description = prop
                    .get("description")
                    .or_else(|| prop.get("title"))
                    .and_then(Value::as_str)
                    .filter(|text| !text.is_empty())
                    .map(str::to_string);
                let spec = FieldSpec {
                    kind,
                    required: required.contains(&name.as_str()),
                    nullable,
                    default: prop.get("default").cloned(),
                    description,
                };
                (name.clone(), spec)
            })
            .collect();
        Signature { fields }
    }

    /// Every name becomes a required string, in order.
    pub fn required_strings(names: &[String]) -> Self {
        let fields = names
            .iter()
            .map(|name| {
                let spec = FieldSpec {
                    kind: FieldKind::String,
                    required: true,
                    nullable: false,
                    default: None,
                    description: Some(format!("Value for {{{}}}", name)),
                };
                (name.clone(), spec)
            })
            .collect();
        Signature { fields }
    }

    pub fn fields(&self) -> &IndexMap<String, FieldSpec> {
        &self.fields
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Checks `args` and returns the map to forward: declared fields only, nulls
    /// removed, defaults filled in.
    pub fn validate(&self, args: &Value) -> Result<Map<String, Value>, SignatureError> {
        match args {
            Value::Null => self.validate_object(&Map::new(), ""),
            Value::Object(map) => self.validate_object(map, ""),
            _ => Err(SignatureError::NotAnObject),
        }
    }

    fn validate_object(
        &self,
        args: &Map<String, Value>,
        prefix: &str,
    ) -> Result<Map<String, Value>, SignatureError> {
        let mut cleaned = Map::new();
        for (name, spec) in &self.fields {
            let path = if prefix.is_empty() {
                name.clone()
            } else {
                format!("{}.{}", prefix, name)
            };
            match args.get(name) {
                Some(value) if !value.is_null() => {
                    let checked = spec.kind.check(value, &path)?;
                    cleaned.insert(name.clone(), checked);
                }
                provided => {
                    let explicit_null = provided.is_some();
                    if explicit_null && spec.nullable {
                        continue;
                    }
                    // A null default means "leave it out".
                    if let Some(default) = spec.default.as_ref().filter(|d| !d.is_null()) {
                        cleaned.insert(name.clone(), default.clone());
                    } else if spec.required {
                        return Err(SignatureError::Missing(path));
                    }
                }
            }
        }
        Ok(cleaned)
    }

    /// JSON Schema rendering used by listings.
    pub fn to_json_schema(&self) -> Value {
        let mut properties = Map::new();
        let mut required = Vec::new();
        for (name, spec) in &self.fields {
            let mut prop = spec.kind.to_json_schema();
            if let Value::Object(ref mut obj) = prop {
                if let Some(description) = &spec.description {
                    obj.insert("description".to_string(), json!(description));
                }
                if let Some(default) = &spec.default {
                    obj.insert("default".to_string(), default.clone());
                }
                if spec.nullable {
                    obj.insert("nullable".to_string(), json!(true));
                }
            }
            properties.insert(name.clone(), prop);
            if spec.required {
                required.push(json!(name));
            }
        }
        json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }
}

impl FieldKind {
    /// Returns the kind and whether a null variant was present.
    fn from_property(prop: &Value) -> (FieldKind, bool) {
        if !prop.is_object() {
            return (FieldKind::Any, false);
        }

        if let Some(variants) = prop
            .get("anyOf")
            .or_else(|| prop.get("oneOf"))
            .and_then(Value::as_array)
        {
            let non_null: Vec<&Value> = variants.iter().filter(|v| !is_null_variant(v)).collect();
            if non_null.len() == 1 {
                let (kind, inner_nullable) = FieldKind::from_property(non_null[0]);
                return (kind, inner_nullable || non_null.len() < variants.len());
            }
            return (FieldKind::Any, false);
        }

        match prop.get("type") {
            Some(Value::String(type_name)) => (FieldKind::from_type(type_name, prop), false),
            // ["string", "null"] style unions.
            Some(Value::Array(types)) => {
                let names: Vec<&str> = types.iter().filter_map(Value::as_str).collect();
                let non_null: Vec<&str> = names.iter().copied().filter(|t| *t != "null").collect();
                if non_null.len() == 1 {
                    (
                        FieldKind::from_type(non_null[0], prop),
                        non_null.len() < names.len(),
                    )
                } else {
                    (FieldKind::Any, false)
                }
            }
            _ => (FieldKind::Any, false),
        }
    }

    fn from_type(type_name: &str, prop: &Value) -> FieldKind {
        match type_name {
            "string" => match prop.get("enum").and_then(Value::as_array) {
                Some(choices) => FieldKind::Enum(
                    choices
                        .iter()
                        .filter_map(Value::as_str)
                        .map(str::to_string)
                        .collect(),
                ),
                None => FieldKind::String,
            },
            "number" => FieldKind::Number,
            "integer" => FieldKind::Integer,
            "boolean" => FieldKind::Boolean,
            "array" => {
                let item = prop
                    .get("items")
                    .map(|items| FieldKind::from_property(items).0)
                    .unwrap_or(FieldKind::Any);
                FieldKind::Array(Box::new(item))
            }
            "object" => {
                if prop.get("properties").is_some_and(Value::is_object) {
                    FieldKind::Object(Signature::from_schema(prop))
                } else {
                    FieldKind::Map
                }
            }
            _ => FieldKind::Any,
        }
    }

    fn check(&self, value: &Value, path: &str) -> Result<Value, SignatureError> {
        let mismatch = |expected: &str| SignatureError::TypeMismatch {
            field: path.to_string(),
            expected: expected.to_string(),
            found: json_type_name(value).to_string(),
        };

        match self {
            FieldKind::String => value.is_string().then(|| value.clone()).ok_or_else(|| mismatch("a string")),
            FieldKind::Number => value.is_number().then(|| value.clone()).ok_or_else(|| mismatch("a number")),
            FieldKind::Integer => is_whole_number(value)
                .then(|| value.clone())
                .ok_or_else(|| mismatch("an integer")),
            FieldKind::Boolean => value.is_boolean().then(|| value.clone()).ok_or_else(|| mismatch("a boolean")),
            FieldKind::Enum(choices) => {
                let text = value.as_str().ok_or_else(|| mismatch("a string"))?;
                if choices.iter().any(|choice| choice == text) {
                    Ok(value.clone())
                } else {
                    Err(SignatureError::NotInChoice {
                        field: path.to_string(),
                        allowed: choices.join(", "),
                    })
                }
            }
            FieldKind::Array(item) => {
                let items = value.as_array().ok_or_else(|| mismatch("an array"))?;
                items
                    .iter()
                    .enumerate()
                    .map(|(index, element)| item.check(element, &format!("{}[{}]", path, index)))
                    .collect::<Result<Vec<_>, _>>()
                    .map(Value::Array)
            }
            FieldKind::Object(signature) => {
                let map = value.as_object().ok_or_else(|| mismatch("an object"))?;
                signature.validate_object(map, path).map(Value::Object)
            }
            FieldKind::Map => value.is_object().then(|| value.clone()).ok_or_else(|| mismatch("an object")),
            FieldKind::Any => Ok(value.clone()),
        }
    }

    fn to_json_schema(&self) -> Value {
        match self {
            FieldKind::String => json!({"type": "string"}),
            FieldKind::Number => json!({"type": "number"}),
            FieldKind::Integer => json!({"type": "integer"}),
            FieldKind::Boolean => json!({"type": "boolean"}),
            FieldKind::Enum(choices) => json!({"type": "string", "enum": choices}),
            FieldKind::Array(item) => json!({"type": "array", "items": item.to_json_schema()}),
            FieldKind::Object(signature) => signature.to_json_schema(),
            FieldKind::Map => json!({"type": "object"}),
            FieldKind::Any => json!({}),
        }
    }
}

fn is_null_variant(variant: &Value) -> bool {
    variant.as_str() == Some("null") || variant.get("type").and_then(Value::as_str) == Some("null")
}

fn is_whole_number(value: &Value) -> bool {
    if value.is_i64() || value.is_u64() {
        return true;
    }
    value
        .as_f64()
        .map(|number| number.is_finite() && number.fract() == 0.0)
        .unwrap_or(false)
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
