//! Schema types for describing provider, resource and data source structure.
//!
//! A schema lists the attributes a resource exposes, their types, and how the
//! engine may use them. Beyond the serializable description, an attribute can
//! carry three hooks that the diff engine and the validator consult:
//!
//! - [`Validator`]: extra checks run against a configured value.
//! - [`DiffSuppressor`]: decides that two different values mean the same thing.
//! - [`StateNormalizer`]: rewrites a value into canonical form before it is
//!   stored or compared.
//!
//! ```
//! use hemmer_provider_datadog::schema::{Attribute, Schema, StateNormalizer};
//!
//! let schema = Schema::v0()
//!     .with_attribute("name", Attribute::required_string())
//!     .with_attribute(
//!         "query",
//!         Attribute::required_string().with_normalizer(StateNormalizer::trim()),
//!     )
//!     .with_attribute("url", Attribute::computed_string());
//!
//! assert!(schema.attribute("query").is_some());
//! ```

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// The type of an attribute value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributeType {
    /// A string value.
    String,
    /// A 64-bit integer.
    Int64,
    /// A 64-bit floating point number.
    Float64,
    /// A boolean value.
    Bool,
    /// A string restricted to a fixed set of values.
    Enum(Vec<String>),
    /// A list of values of a single type.
    List(Box<AttributeType>),
    /// A set of unique values of a single type.
    Set(Box<AttributeType>),
    /// A map from string keys to values of a single type.
    Map(Box<AttributeType>),
    /// An object with a fixed set of attributes.
    Object(BTreeMap<String, AttributeType>),
    /// A dynamic type that can hold any value (use sparingly).
    Dynamic,
}

impl AttributeType {
    /// Create a list type.
    pub fn list(element_type: AttributeType) -> Self {
        Self::List(Box::new(element_type))
    }

    /// Create a set type.
    pub fn set(element_type: AttributeType) -> Self {
        Self::Set(Box::new(element_type))
    }

    /// Create a map type.
    pub fn map(element_type: AttributeType) -> Self {
        Self::Map(Box::new(element_type))
    }

    /// Create an object type.
    pub fn object(attributes: BTreeMap<String, AttributeType>) -> Self {
        Self::Object(attributes)
    }

    /// Create an enum type from its allowed values.
    pub fn one_of(values: &[&str]) -> Self {
        Self::Enum(values.iter().map(|v| v.to_string()).collect())
    }
}

/// Describes how an attribute can be used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct AttributeFlags {
    /// The attribute is required in configuration.
    pub required: bool,
    /// The attribute is optional in configuration.
    pub optional: bool,
    /// The attribute is computed by the provider (read-only).
    pub computed: bool,
    /// The attribute is sensitive and should be hidden in logs/UI.
    pub sensitive: bool,
}

impl AttributeFlags {
    /// Create flags for a required attribute.
    pub fn required() -> Self {
        Self {
            required: true,
            ..Default::default()
        }
    }

    /// Create flags for an optional attribute.
    pub fn optional() -> Self {
        Self {
            optional: true,
            ..Default::default()
        }
    }

    /// Create flags for a computed attribute (read-only, set by provider).
    pub fn computed() -> Self {
        Self {
            computed: true,
            ..Default::default()
        }
    }

    /// Create flags for an optional+computed attribute (can be set, but has default from provider).
    pub fn optional_computed() -> Self {
        Self {
            optional: true,
            computed: true,
            ..Default::default()
        }
    }

    /// Mark the attribute as sensitive.
    pub fn sensitive(mut self) -> Self {
        self.sensitive = true;
        self
    }

    /// Whether the attribute is set only by the provider.
    pub fn is_computed_only(&self) -> bool {
        self.computed && !self.optional && !self.required
    }
}

/// Check run against a configured attribute value.
///
/// The closure returns error messages; an empty vector means the value is
/// acceptable. Null values are never passed to validators.
#[derive(Clone)]
pub struct Validator(Arc<dyn Fn(&Value) -> Vec<String> + Send + Sync>);

impl Validator {
    /// Wrap a check function.
    pub fn new(check: impl Fn(&Value) -> Vec<String> + Send + Sync + 'static) -> Self {
        Self(Arc::new(check))
    }

    /// Run the check.
    pub fn check(&self, value: &Value) -> Vec<String> {
        (self.0)(value)
    }
}

impl fmt::Debug for Validator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Validator(..)")
    }
}

/// Decides whether a change from `old` to `new` is cosmetic.
///
/// Only consulted when both values are present and the attribute does not
/// force replacement. The predicate also sees the normalized configuration
/// of the enclosing block, so it can consult sibling attributes.
#[derive(Clone)]
pub struct DiffSuppressor(Arc<dyn Fn(&Value, &Value, &Map<String, Value>) -> bool + Send + Sync>);

impl DiffSuppressor {
    /// Wrap a comparison function.
    pub fn new(
        equivalent: impl Fn(&Value, &Value, &Map<String, Value>) -> bool + Send + Sync + 'static,
    ) -> Self {
        Self(Arc::new(equivalent))
    }

    /// Suppress differences between numbers that are equal as floats,
    /// e.g. `"1"` and `"1.0"`.
    pub fn float_int() -> Self {
        Self::new(|old, new, _| match (as_f64(old), as_f64(new)) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        })
    }

    /// Suppress differences in letter case.
    pub fn case_insensitive() -> Self {
        Self::new(|old, new, _| match (old.as_str(), new.as_str()) {
            (Some(a), Some(b)) => a.eq_ignore_ascii_case(b),
            _ => false,
        })
    }

    /// Whether `old` and `new` should be treated as equal, given the
    /// configuration they appear in.
    pub fn suppresses(&self, old: &Value, new: &Value, config: &Map<String, Value>) -> bool {
        (self.0)(old, new, config)
    }
}

impl fmt::Debug for DiffSuppressor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("DiffSuppressor(..)")
    }
}

/// Rewrites a value into canonical form. Must be idempotent.
#[derive(Clone)]
pub struct StateNormalizer(Arc<dyn Fn(&Value) -> Value + Send + Sync>);

impl StateNormalizer {
    /// Wrap a normalization function.
    pub fn new(normalize: impl Fn(&Value) -> Value + Send + Sync + 'static) -> Self {
        Self(Arc::new(normalize))
    }

    /// Trim surrounding whitespace from string values.
    pub fn trim() -> Self {
        Self::new(|value| match value {
            Value::String(s) => Value::String(s.trim().to_string()),
            other => other.clone(),
        })
    }

    /// Apply the normalization.
    pub fn apply(&self, value: &Value) -> Value {
        (self.0)(value)
    }
}

impl fmt::Debug for StateNormalizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("StateNormalizer(..)")
    }
}

fn as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Describes a single attribute in a schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attribute {
    /// The type of the attribute.
    #[serde(rename = "type")]
    pub attr_type: AttributeType,
    /// Flags describing how the attribute can be used.
    #[serde(flatten)]
    pub flags: AttributeFlags,
    /// Human-readable description of the attribute.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// If set, changing this attribute forces resource replacement.
    #[serde(default)]
    pub force_new: bool,
    /// Default value for the attribute (JSON-encoded).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    /// Extra checks run during validation.
    #[serde(skip)]
    pub validators: Vec<Validator>,
    /// Cosmetic-difference predicate used by the diff engine.
    #[serde(skip)]
    pub diff_suppress: Option<DiffSuppressor>,
    /// Canonicalization applied before storage and before diffing.
    #[serde(skip)]
    pub normalizer: Option<StateNormalizer>,
}

impl Attribute {
    /// Create a new attribute with the given type and flags.
    pub fn new(attr_type: AttributeType, flags: AttributeFlags) -> Self {
        Self {
            attr_type,
            flags,
            description: None,
            force_new: false,
            default: None,
            validators: Vec::new(),
            diff_suppress: None,
            normalizer: None,
        }
    }

    /// Create a required string attribute.
    pub fn required_string() -> Self {
        Self::new(AttributeType::String, AttributeFlags::required())
    }

    /// Create an optional string attribute.
    pub fn optional_string() -> Self {
        Self::new(AttributeType::String, AttributeFlags::optional())
    }

    /// Create a computed string attribute.
    pub fn computed_string() -> Self {
        Self::new(AttributeType::String, AttributeFlags::computed())
    }

    /// Create an optional string attribute the provider fills in when omitted.
    pub fn optional_computed_string() -> Self {
        Self::new(AttributeType::String, AttributeFlags::optional_computed())
    }

    /// Create a required int64 attribute.
    pub fn required_int64() -> Self {
        Self::new(AttributeType::Int64, AttributeFlags::required())
    }

    /// Create an optional int64 attribute.
    pub fn optional_int64() -> Self {
        Self::new(AttributeType::Int64, AttributeFlags::optional())
    }

    /// Create a computed int64 attribute.
    pub fn computed_int64() -> Self {
        Self::new(AttributeType::Int64, AttributeFlags::computed())
    }

    /// Create an optional bool attribute.
    pub fn optional_bool() -> Self {
        Self::new(AttributeType::Bool, AttributeFlags::optional())
    }

    /// Create a required enum attribute.
    pub fn required_enum(values: &[&str]) -> Self {
        Self::new(AttributeType::one_of(values), AttributeFlags::required())
    }

    /// Create an optional enum attribute.
    pub fn optional_enum(values: &[&str]) -> Self {
        Self::new(AttributeType::one_of(values), AttributeFlags::optional())
    }

    /// Create an optional set of strings.
    pub fn optional_string_set() -> Self {
        Self::new(
            AttributeType::set(AttributeType::String),
            AttributeFlags::optional(),
        )
    }

    /// Create a required, ordered list of strings.
    pub fn required_string_list() -> Self {
        Self::new(
            AttributeType::list(AttributeType::String),
            AttributeFlags::required(),
        )
    }

    /// Set the description for this attribute.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Mark this attribute as forcing resource replacement when changed.
    pub fn with_force_new(mut self) -> Self {
        self.force_new = true;
        self
    }

    /// Set a default value for this attribute.
    pub fn with_default(mut self, default: Value) -> Self {
        self.default = Some(default);
        self
    }

    /// Mark this attribute as sensitive.
    pub fn sensitive(mut self) -> Self {
        self.flags.sensitive = true;
        self
    }

    /// Add a validation check.
    pub fn with_validator(mut self, validator: Validator) -> Self {
        self.validators.push(validator);
        self
    }

    /// Set the diff suppression predicate.
    pub fn with_diff_suppress(mut self, suppressor: DiffSuppressor) -> Self {
        self.diff_suppress = Some(suppressor);
        self
    }

    /// Set the state normalizer.
    pub fn with_normalizer(mut self, normalizer: StateNormalizer) -> Self {
        self.normalizer = Some(normalizer);
        self
    }

    /// Apply the normalizer, if any. Null passes through untouched.
    pub fn normalize(&self, value: &Value) -> Value {
        match (&self.normalizer, value) {
            (_, Value::Null) | (None, _) => value.clone(),
            (Some(normalizer), _) => normalizer.apply(value),
        }
    }
}

/// The nesting mode for a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BlockNestingMode {
    /// A single nested block (at most one).
    #[default]
    Single,
    /// A list of nested blocks (zero or more, ordered).
    List,
    /// A set of nested blocks (zero or more, unordered, unique).
    Set,
}

/// A nested block within a schema.
///
/// Blocks are used for structured values that have their own set of
/// attributes (e.g. the `display` block of a Slack channel).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Block {
    /// The attributes within this block.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, Attribute>,
    /// Nested blocks within this block.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub blocks: BTreeMap<String, NestedBlock>,
    /// Human-readable description of the block.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Block {
    /// Create a new empty block.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an attribute to this block.
    pub fn with_attribute(mut self, name: impl Into<String>, attr: Attribute) -> Self {
        self.attributes.insert(name.into(), attr);
        self
    }

    /// Add a nested block to this block.
    pub fn with_block(mut self, name: impl Into<String>, block: NestedBlock) -> Self {
        self.blocks.insert(name.into(), block);
        self
    }

    /// Set the description for this block.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// A nested block with its nesting mode and constraints.
///
/// Nested blocks are always represented in state as a JSON array of objects,
/// including `Single` blocks, which hold at most one element.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NestedBlock {
    /// The block definition.
    #[serde(flatten)]
    pub block: Block,
    /// How the block is nested (single, list, set).
    #[serde(default)]
    pub nesting_mode: BlockNestingMode,
    /// Minimum number of blocks required.
    #[serde(default)]
    pub min_items: u32,
    /// Maximum number of blocks allowed (0 = unlimited).
    #[serde(default)]
    pub max_items: u32,
}

impl NestedBlock {
    /// Create a single nested block (0 or 1 allowed).
    pub fn single(block: Block) -> Self {
        Self {
            block,
            nesting_mode: BlockNestingMode::Single,
            min_items: 0,
            max_items: 1,
        }
    }

    /// Create a list of nested blocks.
    pub fn list(block: Block) -> Self {
        Self {
            block,
            nesting_mode: BlockNestingMode::List,
            min_items: 0,
            max_items: 0,
        }
    }

    /// Create a set of nested blocks.
    pub fn set(block: Block) -> Self {
        Self {
            block,
            nesting_mode: BlockNestingMode::Set,
            min_items: 0,
            max_items: 0,
        }
    }

    /// Set the minimum number of blocks required.
    pub fn with_min_items(mut self, min: u32) -> Self {
        self.min_items = min;
        self
    }

    /// Set the maximum number of blocks allowed.
    pub fn with_max_items(mut self, max: u32) -> Self {
        self.max_items = max;
        self
    }
}

/// Schema for a resource or data source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Schema {
    /// The version of this schema.
    #[serde(default)]
    pub version: u64,
    /// The root block containing all attributes and nested blocks.
    #[serde(flatten)]
    pub block: Block,
}

impl Schema {
    /// Create a new schema with the given version.
    pub fn new(version: u64) -> Self {
        Self {
            version,
            block: Block::new(),
        }
    }

    /// Create a schema at version 0.
    pub fn v0() -> Self {
        Self::new(0)
    }

    /// Add an attribute to the schema.
    pub fn with_attribute(mut self, name: impl Into<String>, attr: Attribute) -> Self {
        self.block.attributes.insert(name.into(), attr);
        self
    }

    /// Add a nested block to the schema.
    pub fn with_block(mut self, name: impl Into<String>, block: NestedBlock) -> Self {
        self.block.blocks.insert(name.into(), block);
        self
    }

    /// Set the description of the schema.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.block.description = Some(description.into());
        self
    }

    /// Look up a top-level attribute.
    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.block.attributes.get(name)
    }

    /// Names of the top-level attributes that force replacement.
    pub fn force_new_attributes(&self) -> impl Iterator<Item = &str> {
        self.block
            .attributes
            .iter()
            .filter(|(_, attr)| attr.force_new)
            .map(|(name, _)| name.as_str())
    }
}

impl Default for Schema {
    fn default() -> Self {
        Self::v0()
    }
}

/// Schema for the provider configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ProviderSchema {
    /// Schema for provider configuration.
    #[serde(default)]
    pub provider: Schema,
    /// Schemas for each resource type.
    #[serde(default)]
    pub resources: BTreeMap<String, Schema>,
    /// Schemas for each data source type.
    #[serde(default)]
    pub data_sources: BTreeMap<String, Schema>,
}

impl ProviderSchema {
    /// Create a new empty provider schema.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the provider configuration schema.
    pub fn with_provider_config(mut self, schema: Schema) -> Self {
        self.provider = schema;
        self
    }

    /// Add a resource schema.
    pub fn with_resource(mut self, name: impl Into<String>, schema: Schema) -> Self {
        self.resources.insert(name.into(), schema);
        self
    }

    /// Add a data source schema.
    pub fn with_data_source(mut self, name: impl Into<String>, schema: Schema) -> Self {
        self.data_sources.insert(name.into(), schema);
        self
    }
}

/// Diagnostic severity level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiagnosticSeverity {
    /// An error that prevents the operation from completing.
    Error,
    /// A warning that doesn't prevent the operation but should be addressed.
    Warning,
}

/// A diagnostic message from the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    /// The severity of the diagnostic.
    pub severity: DiagnosticSeverity,
    /// A short summary of the issue.
    pub summary: String,
    /// A detailed description of the issue.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    /// The attribute path where the issue occurred.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attribute: Option<String>,
}

impl Diagnostic {
    /// Create an error diagnostic.
    pub fn error(summary: impl Into<String>) -> Self {
        Self {
            severity: DiagnosticSeverity::Error,
            summary: summary.into(),
            detail: None,
            attribute: None,
        }
    }

    /// Create a warning diagnostic.
    pub fn warning(summary: impl Into<String>) -> Self {
        Self {
            severity: DiagnosticSeverity::Warning,
            summary: summary.into(),
            detail: None,
            attribute: None,
        }
    }

    /// Add detail to this diagnostic.
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    /// Set the attribute path for this diagnostic.
    pub fn with_attribute(mut self, attribute: impl Into<String>) -> Self {
        self.attribute = Some(attribute.into());
        self
    }

    /// Whether this diagnostic is an error.
    pub fn is_error(&self) -> bool {
        self.severity == DiagnosticSeverity::Error
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_attribute_type_constructors() {
        let list = AttributeType::list(AttributeType::String);
        assert!(matches!(list, AttributeType::List(_)));

        let kinds = AttributeType::one_of(&["browser", "ios"]);
        assert_eq!(
            kinds,
            AttributeType::Enum(vec!["browser".to_string(), "ios".to_string()])
        );
    }

    #[test]
    fn test_attribute_flags() {
        let computed = AttributeFlags::computed();
        assert!(computed.is_computed_only());

        let optional_computed = AttributeFlags::optional_computed();
        assert!(optional_computed.optional);
        assert!(optional_computed.computed);
        assert!(!optional_computed.is_computed_only());

        let sensitive = AttributeFlags::computed().sensitive();
        assert!(sensitive.sensitive);
    }

    #[test]
    fn test_attribute_builders() {
        let attr = Attribute::required_enum(&["metric alert", "log alert"])
            .with_description("Monitor type")
            .with_force_new();

        assert!(matches!(attr.attr_type, AttributeType::Enum(_)));
        assert!(attr.flags.required);
        assert!(attr.force_new);
        assert!(attr.normalizer.is_none());
    }

    #[test]
    fn test_trim_normalizer_is_idempotent() {
        let attr = Attribute::required_string().with_normalizer(StateNormalizer::trim());
        let once = attr.normalize(&json!("  avg(last_5m):cpu > 1 \n"));
        assert_eq!(once, json!("avg(last_5m):cpu > 1"));
        assert_eq!(attr.normalize(&once), once);
        assert_eq!(attr.normalize(&Value::Null), Value::Null);
    }

    #[test]
    fn test_float_int_suppressor() {
        let suppress = DiffSuppressor::float_int();
        assert!(suppress.suppresses(&json!("1"), &json!("1.0"), &Map::new()));
        assert!(suppress.suppresses(&json!(2), &json!("2.00"), &Map::new()));
        assert!(!suppress.suppresses(&json!("1"), &json!("1.5"), &Map::new()));
        assert!(!suppress.suppresses(&json!("abc"), &json!("abc"), &Map::new()));
    }

    #[test]
    fn test_case_insensitive_suppressor() {
        let suppress = DiffSuppressor::case_insensitive();
        assert!(suppress.suppresses(&json!("US1"), &json!("us1"), &Map::new()));
        assert!(!suppress.suppresses(&json!("us1"), &json!("eu1"), &Map::new()));
    }

    #[test]
    fn test_schema_builder() {
        let schema = Schema::v0()
            .with_attribute("name", Attribute::required_string())
            .with_attribute("type", Attribute::required_string().with_force_new())
            .with_attribute("id", Attribute::computed_string())
            .with_block(
                "display",
                NestedBlock::single(
                    Block::new().with_attribute("message", Attribute::optional_bool()),
                ),
            );

        assert!(schema.attribute("name").is_some());
        assert!(schema.block.blocks.contains_key("display"));
        assert_eq!(schema.force_new_attributes().collect::<Vec<_>>(), vec!["type"]);
    }

    #[test]
    fn test_schema_serializes_without_hooks() {
        let schema = Schema::v0().with_attribute(
            "query",
            Attribute::required_string().with_normalizer(StateNormalizer::trim()),
        );
        let value = serde_json::to_value(&schema).unwrap();
        assert_eq!(value["attributes"]["query"]["type"], json!("string"));
        assert!(value["attributes"]["query"].get("normalizer").is_none());
    }

    #[test]
    fn test_provider_schema() {
        let provider_schema = ProviderSchema::new()
            .with_provider_config(
                Schema::v0().with_attribute("api_key", Attribute::optional_string().sensitive()),
            )
            .with_resource(
                "datadog_role",
                Schema::v0().with_attribute("name", Attribute::required_string()),
            )
            .with_data_source(
                "datadog_monitors",
                Schema::v0().with_attribute("name_filter", Attribute::optional_string()),
            );

        assert!(provider_schema
            .provider
            .block
            .attributes
            .contains_key("api_key"));
        assert!(provider_schema.resources.contains_key("datadog_role"));
        assert!(provider_schema.data_sources.contains_key("datadog_monitors"));
    }

    #[test]
    fn test_diagnostic() {
        let err = Diagnostic::error("Invalid configuration")
            .with_detail("The value must be positive")
            .with_attribute("priority");

        assert!(err.is_error());
        assert_eq!(err.summary, "Invalid configuration");
        assert_eq!(err.attribute, Some("priority".to_string()));
        assert!(!Diagnostic::warning("heads up").is_error());
    }
}
