//! Schema validation.
//!
//! Validates a configuration value against a [`Schema`] before anything is
//! sent to Datadog. Every problem becomes a [`Diagnostic`] whose `attribute`
//! is the full path of the offending value, e.g. `display[0].message`.
//!
//! # Example
//!
//! ```
//! use hemmer_provider_datadog::schema::{Attribute, Schema};
//! use hemmer_provider_datadog::validation::{int_between, validate};
//! use serde_json::json;
//!
//! let schema = Schema::v0()
//!     .with_attribute("name", Attribute::required_string())
//!     .with_attribute("priority", Attribute::optional_int64().with_validator(int_between(1, 5)));
//!
//! assert!(validate(&schema, &json!({"name": "cpu", "priority": 3})).is_empty());
//!
//! let diagnostics = validate(&schema, &json!({"name": "cpu", "priority": 9}));
//! assert_eq!(diagnostics.len(), 1);
//! assert_eq!(diagnostics[0].attribute, Some("priority".to_string()));
//! ```

use crate::error::ProviderError;
use crate::schema::{Attribute, AttributeType, Block, Diagnostic, NestedBlock, Schema, Validator};
use serde_json::Value;
use std::collections::BTreeMap;

/// Validate a configuration value against a schema.
///
/// Returns a list of diagnostics for any validation errors found.
/// An empty list means the value is valid.
///
/// # Validation Rules
///
/// - Required attributes must be present and non-null
/// - Computed-only attributes must not be set
/// - Attribute types and enum values must match the schema
/// - Attribute validators run on every non-null value
/// - Nested blocks are lists of objects, validated recursively with min/max item constraints
pub fn validate(schema: &Schema, value: &Value) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();
    validate_block(&schema.block, value, "", &mut diagnostics);
    diagnostics
}

/// Validate a JSON value against a schema, returning Ok if valid or Err with diagnostics.
pub fn validate_result(schema: &Schema, value: &Value) -> Result<(), Vec<Diagnostic>> {
    let diagnostics = validate(schema, value);
    if diagnostics.iter().any(Diagnostic::is_error) {
        Err(diagnostics)
    } else {
        Ok(())
    }
}

/// Collapse error diagnostics into a single [`ProviderError`].
///
/// A lone attribute error keeps its path; several errors are joined into one
/// [`ProviderError::Validation`] message.
pub fn diagnostics_to_error(diagnostics: &[Diagnostic]) -> Option<ProviderError> {
    let errors: Vec<&Diagnostic> = diagnostics.iter().filter(|d| d.is_error()).collect();
    match errors.as_slice() {
        [] => None,
        [single] => Some(match &single.attribute {
            Some(attribute) => ProviderError::InvalidAttribute {
                attribute: attribute.clone(),
                message: describe(single),
            },
            None => ProviderError::Validation(describe(single)),
        }),
        many => Some(ProviderError::Validation(
            many.iter().map(|d| describe(d)).collect::<Vec<_>>().join("; "),
        )),
    }
}

fn describe(diagnostic: &Diagnostic) -> String {
    match &diagnostic.detail {
        Some(detail) => format!("{}: {}", diagnostic.summary, detail),
        None => diagnostic.summary.clone(),
    }
}

fn validate_block(block: &Block, value: &Value, path: &str, diagnostics: &mut Vec<Diagnostic>) {
    let obj = match value {
        Value::Object(map) => map,
        Value::Null => return,
        _ => {
            diagnostics.push(
                Diagnostic::error("Expected object")
                    .with_detail(format!("Got {}", value_type_name(value)))
                    .with_attribute_if_not_empty(path),
            );
            return;
        },
    };

    for (name, attr) in &block.attributes {
        let attr_path = join_path(path, name);
        validate_attribute(attr, obj.get(name), &attr_path, diagnostics);
    }

    for (name, nested_block) in &block.blocks {
        let block_path = join_path(path, name);
        validate_nested_block(nested_block, obj.get(name), &block_path, diagnostics);
    }
}

fn validate_attribute(
    attr: &Attribute,
    value: Option<&Value>,
    path: &str,
    diagnostics: &mut Vec<Diagnostic>,
) {
    match value {
        None | Some(Value::Null) => {
            if attr.flags.required {
                diagnostics.push(
                    Diagnostic::error(format!("Missing required attribute '{}'", path))
                        .with_detail("This attribute is required and must be provided")
                        .with_attribute(path),
                );
            }
        },
        Some(_) if attr.flags.is_computed_only() => {
            diagnostics.push(
                Diagnostic::error(format!("Attribute '{}' is read-only", path))
                    .with_detail("This value is set by Datadog and cannot be configured")
                    .with_attribute(path),
            );
        },
        Some(v) => {
            let before = diagnostics.len();
            validate_attribute_type(&attr.attr_type, v, path, diagnostics);
            // Custom checks assume a well-typed value.
            if diagnostics.len() == before {
                for validator in &attr.validators {
                    for message in validator.check(v) {
                        diagnostics.push(
                            Diagnostic::error(format!("Invalid value for '{}'", path))
                                .with_detail(message)
                                .with_attribute(path),
                        );
                    }
                }
            }
        },
    }
}

fn validate_attribute_type(
    attr_type: &AttributeType,
    value: &Value,
    path: &str,
    diagnostics: &mut Vec<Diagnostic>,
) {
    match attr_type {
        AttributeType::String => {
            if !value.is_string() {
                diagnostics.push(type_error(path, "string", value));
            }
        },
        AttributeType::Int64 => {
            if !is_int64(value) {
                diagnostics.push(type_error(path, "int64", value));
            }
        },
        AttributeType::Float64 => {
            if !value.is_number() {
                diagnostics.push(type_error(path, "float64", value));
            }
        },
        AttributeType::Bool => {
            if !value.is_boolean() {
                diagnostics.push(type_error(path, "bool", value));
            }
        },
        AttributeType::Enum(allowed) => match value.as_str() {
            Some(s) if allowed.iter().any(|a| a == s) => {},
            Some(s) => diagnostics.push(
                Diagnostic::error(format!("Invalid value for '{}'", path))
                    .with_detail(format!(
                        "Expected one of [{}], got \"{}\"",
                        allowed.join(", "),
                        s
                    ))
                    .with_attribute(path),
            ),
            None => diagnostics.push(type_error(path, "string", value)),
        },
        AttributeType::List(element_type) | AttributeType::Set(element_type) => {
            if let Some(arr) = value.as_array() {
                for (i, elem) in arr.iter().enumerate() {
                    let elem_path = format!("{}[{}]", path, i);
                    validate_attribute_type(element_type, elem, &elem_path, diagnostics);
                }
            } else {
                let expected = if matches!(attr_type, AttributeType::Set(_)) {
                    "set"
                } else {
                    "list"
                };
                diagnostics.push(type_error(path, expected, value));
            }
        },
        AttributeType::Map(value_type) => {
            if let Some(obj) = value.as_object() {
                for (key, val) in obj {
                    let key_path = format!("{}.{}", path, key);
                    validate_attribute_type(value_type, val, &key_path, diagnostics);
                }
            } else {
                diagnostics.push(type_error(path, "map", value));
            }
        },
        AttributeType::Object(attrs) => {
            if let Some(obj) = value.as_object() {
                validate_object_type(attrs, obj, path, diagnostics);
            } else {
                diagnostics.push(type_error(path, "object", value));
            }
        },
        AttributeType::Dynamic => {},
    }
}

fn validate_object_type(
    attrs: &BTreeMap<String, AttributeType>,
    obj: &serde_json::Map<String, Value>,
    path: &str,
    diagnostics: &mut Vec<Diagnostic>,
) {
    for (name, attr_type) in attrs {
        if let Some(value) = obj.get(name).filter(|v| !v.is_null()) {
            validate_attribute_type(attr_type, value, &join_path(path, name), diagnostics);
        }
    }
}

fn validate_nested_block(
    nested: &NestedBlock,
    value: Option<&Value>,
    path: &str,
    diagnostics: &mut Vec<Diagnostic>,
) {
    match value {
        None | Some(Value::Null) => {
            if nested.min_items > 0 {
                diagnostics.push(
                    Diagnostic::error(format!(
                        "Block '{}' requires at least {} item(s)",
                        path, nested.min_items
                    ))
                    .with_attribute(path),
                );
            }
        },
        Some(Value::Array(arr)) => {
            let len = arr.len() as u32;

            if len < nested.min_items {
                diagnostics.push(
                    Diagnostic::error(format!(
                        "Block '{}' requires at least {} item(s), got {}",
                        path, nested.min_items, len
                    ))
                    .with_attribute(path),
                );
            }

            // 0 means unlimited
            if nested.max_items > 0 && len > nested.max_items {
                diagnostics.push(
                    Diagnostic::error(format!(
                        "Block '{}' allows at most {} item(s), got {}",
                        path, nested.max_items, len
                    ))
                    .with_attribute(path),
                );
            }

            for (i, item) in arr.iter().enumerate() {
                let item_path = format!("{}[{}]", path, i);
                validate_block(&nested.block, item, &item_path, diagnostics);
            }
        },
        Some(v) => {
            diagnostics.push(
                Diagnostic::error(format!("Expected list for block '{}'", path))
                    .with_detail(format!("Got {}", value_type_name(v)))
                    .with_attribute(path),
            );
        },
    }
}

// Reusable validators

/// Integer value within `min..=max`.
pub fn int_between(min: i64, max: i64) -> Validator {
    Validator::new(move |value| match value.as_i64() {
        Some(n) if (min..=max).contains(&n) => vec![],
        Some(n) => vec![format!("expected a value between {min} and {max}, got {n}")],
        None => vec![],
    })
}

/// String that is not empty after trimming whitespace.
pub fn string_not_blank() -> Validator {
    Validator::new(|value| match value.as_str() {
        Some(s) if s.trim().is_empty() => vec!["must not be empty".to_string()],
        _ => vec![],
    })
}

/// String that parses as a JSON object.
pub fn string_is_json_object() -> Validator {
    Validator::new(|value| {
        let Some(s) = value.as_str() else {
            return vec![];
        };
        match serde_json::from_str::<Value>(s) {
            Ok(Value::Object(_)) => vec![],
            Ok(other) => vec![format!(
                "expected a JSON object, got a JSON {}",
                value_type_name(&other)
            )],
            Err(err) => vec![format!("invalid JSON: {err}")],
        }
    })
}

/// String that parses as a YAML mapping.
pub fn string_is_yaml_mapping() -> Validator {
    Validator::new(|value| {
        let Some(s) = value.as_str() else {
            return vec![];
        };
        match serde_yaml::from_str::<Value>(s) {
            Ok(Value::Object(_)) => vec![],
            Ok(other) => vec![format!(
                "expected a YAML mapping, got {}",
                value_type_name(&other)
            )],
            Err(err) => vec![format!("invalid YAML: {err}")],
        }
    })
}

// Helper functions

fn join_path(base: &str, name: &str) -> String {
    if base.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", base, name)
    }
}

fn value_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn is_int64(value: &Value) -> bool {
    match value {
        Value::Number(n) => {
            n.is_i64()
                || n.as_f64().is_some_and(|f| {
                    f.fract() == 0.0 && f >= i64::MIN as f64 && f <= i64::MAX as f64
                })
        },
        _ => false,
    }
}

fn type_error(path: &str, expected: &str, got: &Value) -> Diagnostic {
    Diagnostic::error(format!("Invalid type for attribute '{}'", path))
        .with_detail(format!(
            "Expected {}, got {}",
            expected,
            value_type_name(got)
        ))
        .with_attribute(path)
}

trait DiagnosticExt {
    fn with_attribute_if_not_empty(self, path: &str) -> Self;
}

impl DiagnosticExt for Diagnostic {
    fn with_attribute_if_not_empty(self, path: &str) -> Self {
        if path.is_empty() {
            self
        } else {
            self.with_attribute(path)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Attribute, AttributeFlags, Block, NestedBlock, Schema};
    use serde_json::json;

    #[test]
    fn test_validate_required_string() {
        let schema = Schema::v0().with_attribute("name", Attribute::required_string());

        assert!(validate(&schema, &json!({"name": "cpu high"})).is_empty());

        let diagnostics = validate(&schema, &json!({}));
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].attribute, Some("name".to_string()));

        let diagnostics = validate(&schema, &json!({"name": null}));
        assert_eq!(diagnostics.len(), 1);

        let diagnostics = validate(&schema, &json!({"name": 123}));
        assert_eq!(diagnostics.len(), 1);
        assert!(diagnostics[0].summary.contains("Invalid type"));
    }

    #[test]
    fn test_validate_computed_only_rejected_when_set() {
        let schema = Schema::v0().with_attribute("url", Attribute::computed_string());

        assert!(validate(&schema, &json!({})).is_empty());

        let diagnostics = validate(&schema, &json!({"url": "/monitors/1"}));
        assert_eq!(diagnostics.len(), 1);
        assert!(diagnostics[0].summary.contains("read-only"));
    }

    #[test]
    fn test_validate_optional_computed_accepts_value() {
        let schema = Schema::v0().with_attribute("team", Attribute::optional_computed_string());
        assert!(validate(&schema, &json!({"team": "core"})).is_empty());
    }

    #[test]
    fn test_validate_int64() {
        let schema = Schema::v0().with_attribute("count", Attribute::required_int64());

        assert!(validate(&schema, &json!({"count": 42})).is_empty());
        assert!(validate(&schema, &json!({"count": 42.0})).is_empty());
        assert_eq!(validate(&schema, &json!({"count": 42.5})).len(), 1);
        assert_eq!(validate(&schema, &json!({"count": "42"})).len(), 1);
    }

    #[test]
    fn test_validate_enum() {
        let schema =
            Schema::v0().with_attribute("type", Attribute::required_enum(&["browser", "ios"]));

        assert!(validate(&schema, &json!({"type": "ios"})).is_empty());

        let diagnostics = validate(&schema, &json!({"type": "windows"}));
        assert_eq!(diagnostics.len(), 1);
        assert!(diagnostics[0]
            .detail
            .as_deref()
            .unwrap()
            .contains("Expected one of [browser, ios]"));
    }

    #[test]
    fn test_validate_list_paths_use_brackets() {
        let schema = Schema::v0().with_attribute(
            "tags",
            Attribute::new(
                AttributeType::set(AttributeType::String),
                AttributeFlags::optional(),
            ),
        );

        assert!(validate(&schema, &json!({"tags": ["a", "b"]})).is_empty());

        let diagnostics = validate(&schema, &json!({"tags": ["a", 123, "c"]}));
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].attribute, Some("tags[1]".to_string()));
    }

    #[test]
    fn test_validate_map() {
        let schema = Schema::v0().with_attribute(
            "labels",
            Attribute::new(
                AttributeType::map(AttributeType::String),
                AttributeFlags::required(),
            ),
        );

        assert!(validate(&schema, &json!({"labels": {"env": "prod"}})).is_empty());

        let diagnostics = validate(&schema, &json!({"labels": {"env": "prod", "count": 42}}));
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].attribute, Some("labels.count".to_string()));
    }

    #[test]
    fn test_validate_single_block() {
        let schema = Schema::v0().with_block(
            "display",
            NestedBlock::single(Block::new().with_attribute("message", Attribute::optional_bool()))
                .with_min_items(1),
        );

        assert!(validate(&schema, &json!({"display": [{"message": true}]})).is_empty());

        let diagnostics = validate(&schema, &json!({}));
        assert_eq!(diagnostics.len(), 1);

        let diagnostics = validate(
            &schema,
            &json!({"display": [{"message": true}, {"message": false}]}),
        );
        assert_eq!(diagnostics.len(), 1);
        assert!(diagnostics[0].summary.contains("at most 1"));

        let diagnostics = validate(&schema, &json!({"display": [{"message": "yes"}]}));
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(
            diagnostics[0].attribute,
            Some("display[0].message".to_string())
        );
    }

    #[test]
    fn test_validate_deeply_nested() {
        let schema = Schema::v0().with_block(
            "widget",
            NestedBlock::list(
                Block::new()
                    .with_attribute("title", Attribute::required_string())
                    .with_block(
                        "request",
                        NestedBlock::list(
                            Block::new().with_attribute("q", Attribute::required_string()),
                        ),
                    ),
            ),
        );

        let diagnostics = validate(
            &schema,
            &json!({"widget": [{"title": "cpu", "request": [{"q": 123}]}]}),
        );
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(
            diagnostics[0].attribute,
            Some("widget[0].request[0].q".to_string())
        );
    }

    #[test]
    fn test_custom_validators() {
        let schema = Schema::v0()
            .with_attribute(
                "priority",
                Attribute::optional_int64().with_validator(int_between(1, 5)),
            )
            .with_attribute(
                "monitor",
                Attribute::required_string().with_validator(string_is_json_object()),
            );

        assert!(validate(&schema, &json!({"priority": 5, "monitor": "{}"})).is_empty());

        let diagnostics = validate(&schema, &json!({"priority": 0, "monitor": "{nope"}));
        assert_eq!(diagnostics.len(), 2);

        let diagnostics = validate(&schema, &json!({"monitor": "[1, 2]"}));
        assert_eq!(diagnostics.len(), 1);
        assert!(diagnostics[0].detail.as_deref().unwrap().contains("JSON object"));
    }

    #[test]
    fn test_validator_skipped_on_type_error() {
        let schema = Schema::v0().with_attribute(
            "priority",
            Attribute::optional_int64().with_validator(int_between(1, 5)),
        );

        let diagnostics = validate(&schema, &json!({"priority": "high"}));
        assert_eq!(diagnostics.len(), 1);
        assert!(diagnostics[0].summary.contains("Invalid type"));
    }

    #[test]
    fn test_yaml_and_blank_validators() {
        let yaml = string_is_yaml_mapping();
        assert!(yaml.check(&json!("schema-version: v2\ndd-service: api\n")).is_empty());
        assert_eq!(yaml.check(&json!("- a\n- b\n")).len(), 1);
        assert_eq!(yaml.check(&json!("key: [unclosed")).len(), 1);

        let blank = string_not_blank();
        assert!(blank.check(&json!("x")).is_empty());
        assert_eq!(blank.check(&json!("   ")).len(), 1);
    }

    #[test]
    fn test_validate_object_type() {
        let mut object_attrs = BTreeMap::new();
        object_attrs.insert("host".to_string(), AttributeType::String);
        object_attrs.insert("port".to_string(), AttributeType::Int64);

        let schema = Schema::v0().with_attribute(
            "endpoint",
            Attribute::new(
                AttributeType::Object(object_attrs),
                AttributeFlags::required(),
            ),
        );

        let diagnostics = validate(
            &schema,
            &json!({"endpoint": {"host": "localhost", "port": "8080"}}),
        );
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].attribute, Some("endpoint.port".to_string()));
    }

    #[test]
    fn test_validate_root_not_object() {
        let schema = Schema::v0().with_attribute("name", Attribute::required_string());

        let diagnostics = validate(&schema, &json!("not an object"));
        assert_eq!(diagnostics.len(), 1);
        assert!(diagnostics[0].summary.contains("Expected object"));
    }

    #[test]
    fn test_diagnostics_to_error() {
        assert!(diagnostics_to_error(&[Diagnostic::warning("meh")]).is_none());

        let single = diagnostics_to_error(&[Diagnostic::error("bad").with_attribute("name")]);
        assert!(matches!(
            single,
            Some(ProviderError::InvalidAttribute { ref attribute, .. }) if attribute == "name"
        ));

        let many = diagnostics_to_error(&[Diagnostic::error("a"), Diagnostic::error("b")]);
        assert!(matches!(many, Some(ProviderError::Validation(ref m)) if m == "a; b"));
    }

    #[test]
    fn test_validate_result_helper() {
        let schema = Schema::v0().with_attribute("name", Attribute::required_string());

        assert!(validate_result(&schema, &json!({"name": "test"})).is_ok());
        assert_eq!(validate_result(&schema, &json!({})).unwrap_err().len(), 1);
    }
}
