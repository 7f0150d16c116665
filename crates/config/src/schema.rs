//! Data-driven schema validation for nested configuration mappings.
//!
//! A [`Schema`] describes the expected shape of a JSON value tree. The
//! `OptionallyKeyedBy` form accepts either a plain leaf value or a nested
//! `by-<attr>:` conditional over the listed attributes, matching the shape
//! that [`crate::keyed_by::resolve_keyed_by`] later collapses.

use kindling_core::{Error, Result};
use regex::Regex;
use serde_json::Value;

/// Expected shape of a configuration value.
#[derive(Debug, Clone)]
pub enum Schema {
    /// Anything goes.
    Any,
    Bool,
    Int,
    Str,
    /// A string from a closed set.
    Enum(Vec<&'static str>),
    /// A string matching the regex (anchored).
    Pattern(&'static str),
    /// A list whose items all match the inner schema.
    Seq(Box<Schema>),
    /// A mapping with arbitrary string keys and uniform values.
    Map(Box<Schema>),
    /// A mapping with declared fields. `extra` permits undeclared keys.
    Object { fields: Vec<Field>, extra: bool },
    /// Either a `leaf` value or a `by-<attr>` conditional over `attrs`.
    OptionallyKeyedBy {
        attrs: Vec<&'static str>,
        leaf: Box<Schema>,
    },
}

#[derive(Debug, Clone)]
pub struct Field {
    pub name: &'static str,
    pub required: bool,
    pub schema: Schema,
}

impl Field {
    pub fn required(name: &'static str, schema: Schema) -> Self {
        Field {
            name,
            required: true,
            schema,
        }
    }

    pub fn optional(name: &'static str, schema: Schema) -> Self {
        Field {
            name,
            required: false,
            schema,
        }
    }
}

impl Schema {
    pub fn object(fields: Vec<Field>) -> Self {
        Schema::Object {
            fields,
            extra: false,
        }
    }

    pub fn open_object(fields: Vec<Field>) -> Self {
        Schema::Object {
            fields,
            extra: true,
        }
    }

    pub fn keyed_by(attrs: Vec<&'static str>, leaf: Schema) -> Self {
        Schema::OptionallyKeyedBy {
            attrs,
            leaf: Box::new(leaf),
        }
    }

    /// Validate `value`, reporting the failing path under `descriptor`.
    pub fn validate(&self, value: &Value, descriptor: &str) -> Result<()> {
        match self {
            Schema::Any => Ok(()),
            Schema::Bool => match value {
                Value::Bool(_) => Ok(()),
                other => Err(type_error(descriptor, "a boolean", other)),
            },
            Schema::Int => match value {
                Value::Number(number) if number.is_i64() || number.is_u64() => Ok(()),
                other => Err(type_error(descriptor, "an integer", other)),
            },
            Schema::Str => match value {
                Value::String(_) => Ok(()),
                other => Err(type_error(descriptor, "a string", other)),
            },
            Schema::Enum(values) => match value {
                Value::String(text) if values.iter().any(|allowed| allowed == text) => Ok(()),
                other => Err(type_error(
                    descriptor,
                    &format!("one of {values:?}"),
                    other,
                )),
            },
            Schema::Pattern(pattern) => {
                let text = value.as_str().ok_or_else(|| {
                    type_error(descriptor, &format!("a string matching /{pattern}/"), value)
                })?;
                let regex = Regex::new(&format!("^(?:{pattern})$"))
                    .map_err(|err| Error::schema(descriptor, format!("bad pattern: {err}")))?;
                if regex.is_match(text) {
                    Ok(())
                } else {
                    Err(Error::schema(
                        descriptor,
                        format!("'{text}' does not match /{pattern}/"),
                    ))
                }
            }
            Schema::Seq(item) => {
                let items = value
                    .as_array()
                    .ok_or_else(|| type_error(descriptor, "a list", value))?;
                for (index, entry) in items.iter().enumerate() {
                    item.validate(entry, &format!("{descriptor}[{index}]"))?;
                }
                Ok(())
            }
            Schema::Map(inner) => {
                let map = value
                    .as_object()
                    .ok_or_else(|| type_error(descriptor, "a mapping", value))?;
                for (key, entry) in map {
                    inner.validate(entry, &format!("{descriptor}.{key}"))?;
                }
                Ok(())
            }
            Schema::Object { fields, extra } => {
                let map = value
                    .as_object()
                    .ok_or_else(|| type_error(descriptor, "a mapping", value))?;
                for field in fields {
                    match map.get(field.name) {
                        Some(entry) => {
                            field
                                .schema
                                .validate(entry, &format!("{descriptor}.{}", field.name))?;
                        }
                        None if field.required => {
                            return Err(Error::schema(
                                descriptor,
                                format!("missing required key '{}'", field.name),
                            ));
                        }
                        None => {}
                    }
                }
                if !extra {
                    let known: Vec<&str> = fields.iter().map(|field| field.name).collect();
                    for key in map.keys() {
                        if !known.contains(&key.as_str()) {
                            return Err(Error::schema(
                                descriptor,
                                format!("unexpected key '{key}'"),
                            ));
                        }
                    }
                }
                Ok(())
            }
            Schema::OptionallyKeyedBy { attrs, leaf } => {
                validate_keyed_by(attrs, leaf, value, descriptor)
            }
        }
    }
}

fn validate_keyed_by(
    attrs: &[&'static str],
    leaf: &Schema,
    value: &Value,
    descriptor: &str,
) -> Result<()> {
    if let Some(map) = value.as_object() {
        if map.len() == 1 {
            if let Some((key, branches)) = map.iter().next() {
                if let Some(attr) = key.strip_prefix("by-") {
                    if !attrs.iter().any(|allowed| *allowed == attr) {
                        return Err(Error::schema(
                            descriptor,
                            format!("'{key}' is not an allowed conditional here"),
                        ));
                    }
                    let branches = branches.as_object().ok_or_else(|| {
                        type_error(&format!("{descriptor}.{key}"), "a mapping", branches)
                    })?;
                    for (branch, nested) in branches {
                        validate_keyed_by(
                            attrs,
                            leaf,
                            nested,
                            &format!("{descriptor}.{key}.{branch}"),
                        )?;
                    }
                    return Ok(());
                }
            }
        }
    }
    leaf.validate(value, descriptor)
}

fn type_error(descriptor: &str, expected: &str, actual: &Value) -> Error {
    Error::schema(descriptor, format!("expected {expected}, got {actual}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn worker_schema() -> Schema {
        Schema::object(vec![
            Field::required("os", Schema::Enum(vec!["linux", "macosx", "windows"])),
            Field::optional("cores", Schema::Int),
        ])
    }

    #[test]
    fn object_validates_fields_and_rejects_extras() {
        let schema = worker_schema();
        assert!(schema.validate(&json!({"os": "linux"}), "worker").is_ok());
        assert!(schema
            .validate(&json!({"os": "linux", "cores": 4}), "worker")
            .is_ok());

        let err = schema.validate(&json!({"cores": 4}), "worker").unwrap_err();
        assert!(err.to_string().contains("missing required key 'os'"));

        let err = schema
            .validate(&json!({"os": "linux", "gpu": true}), "worker")
            .unwrap_err();
        assert!(err.to_string().contains("unexpected key 'gpu'"));
    }

    #[test]
    fn pattern_is_anchored() {
        let schema = Schema::Pattern("[a-z]+-[0-9]+");
        assert!(schema.validate(&json!("build-1"), "label").is_ok());
        assert!(schema.validate(&json!("xbuild-1x"), "label").is_err());
    }

    #[test]
    fn keyed_by_accepts_leaf_or_conditional() {
        let schema = Schema::keyed_by(vec!["platform"], Schema::Int);
        assert!(schema.validate(&json!(1), "tier").is_ok());
        assert!(schema
            .validate(&json!({"by-platform": {"linux": 1, "default": 2}}), "tier")
            .is_ok());
        assert!(schema
            .validate(&json!({"by-os": {"linux": 1}}), "tier")
            .is_err());
        // Leaf type still enforced inside branches.
        assert!(schema
            .validate(&json!({"by-platform": {"linux": "one"}}), "tier")
            .is_err());
    }

    #[test]
    fn nested_keyed_by_validates_recursively() {
        let schema = Schema::keyed_by(vec!["platform", "level"], Schema::Str);
        let value = json!({"by-platform": {
            "linux": {"by-level": {"1": "small", "default": "large"}},
            "default": "medium",
        }});
        assert!(schema.validate(&value, "worker-type").is_ok());
    }
}
