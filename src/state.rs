//! Per-resource state as seen by the lifecycle driver.
//!
//! Hosts exchange state as a flat JSON object with the remote ID stored under
//! `"id"`. [`InstanceState`] splits that ID out so the driver can reason about
//! presence: an instance with an empty ID does not exist remotely.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ProviderError;
use crate::schema::Schema;

/// Attribute map plus the remote identifier of one resource instance.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InstanceState {
    /// Remote identifier. Empty means "not present remotely".
    #[serde(default)]
    pub id: String,
    /// Attribute values keyed by schema name.
    #[serde(default)]
    pub attributes: Map<String, Value>,
    /// The last create or update left the object in an unknown condition;
    /// the next plan replaces it.
    #[serde(default)]
    pub tainted: bool,
    /// Set only on the state returned from a successful create.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub newly_created: bool,
}

impl InstanceState {
    /// Create an empty, absent instance.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an instance carrying only an ID (the starting point for import).
    pub fn with_id(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    /// Build an instance from the host's JSON object.
    ///
    /// A string or numeric `"id"` key becomes the ID; everything else is kept
    /// as attributes. `null` yields an empty instance.
    pub fn from_value(value: &Value) -> Result<Self, ProviderError> {
        let mut attributes = match value {
            Value::Object(map) => map.clone(),
            Value::Null => Map::new(),
            other => {
                return Err(ProviderError::Validation(format!(
                    "expected resource state to be an object, got {other}"
                )))
            },
        };

        let id = match attributes.remove("id") {
            Some(Value::String(s)) => s,
            Some(Value::Number(n)) => n.to_string(),
            Some(Value::Null) | None => String::new(),
            Some(other) => {
                return Err(ProviderError::InvalidAttribute {
                    attribute: "id".to_string(),
                    message: format!("expected a string, got {other}"),
                })
            },
        };

        Ok(Self {
            id,
            attributes,
            ..Self::default()
        })
    }

    /// Render the instance back into the host's JSON object.
    ///
    /// An absent instance renders its ID as `null`.
    pub fn to_value(&self) -> Value {
        let mut object = self.attributes.clone();
        let id = if self.id.is_empty() {
            Value::Null
        } else {
            Value::String(self.id.clone())
        };
        object.insert("id".to_string(), id);
        Value::Object(object)
    }

    /// Whether the instance exists remotely.
    pub fn is_present(&self) -> bool {
        !self.id.is_empty()
    }

    /// Mark the instance absent. Attributes are retained.
    pub fn clear_id(&mut self) {
        self.id.clear();
    }

    /// Get a non-null attribute.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.attributes.get(name).filter(|v| !v.is_null())
    }

    /// Get a string attribute.
    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(Value::as_str)
    }

    /// Get a bool attribute.
    pub fn get_bool(&self, name: &str) -> Option<bool> {
        self.get(name).and_then(Value::as_bool)
    }

    /// Get a string attribute, failing with an attribute error if missing.
    pub fn require_str(&self, name: &str) -> Result<&str, ProviderError> {
        self.get_str(name)
            .ok_or_else(|| ProviderError::InvalidAttribute {
                attribute: name.to_string(),
                message: "a value is required".to_string(),
            })
    }

    /// Set an attribute. `null` removes it.
    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        let name = name.into();
        if value.is_null() {
            self.attributes.remove(&name);
        } else {
            self.attributes.insert(name, value);
        }
    }

    /// The subset of attributes a user may configure, as a JSON object.
    ///
    /// Computed-only attributes are dropped so the result can be validated as
    /// configuration.
    pub fn config_view(&self, schema: &Schema) -> Value {
        let object = self
            .attributes
            .iter()
            .filter(|(name, _)| {
                schema
                    .attribute(name)
                    .map(|attr| !attr.flags.is_computed_only())
                    .unwrap_or_else(|| schema.block.blocks.contains_key(name.as_str()))
            })
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();
        Value::Object(object)
    }
}

/// Whether a value counts as "not set": null, `""`, `[]` or `{}`.
///
/// Unset optional attributes and empty values are equivalent both on the wire
/// (both are omitted) and in diffs.
pub fn is_unset(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.is_empty(),
        Some(Value::Array(a)) => a.is_empty(),
        Some(Value::Object(o)) => o.is_empty(),
        Some(_) => false,
    }
}
