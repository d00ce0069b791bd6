//! Whole-document resources whose payload is a user-supplied JSON or YAML
//! string.
//!
//! The string is forwarded to Datadog as-is. What comes back carries
//! server-assigned fields (ids, timestamps, authors) the user never wrote, so
//! both sides are passed through a [`Scrubber`] before they are stored or
//! compared. Two documents are equal when their scrubbed canonical forms are
//! byte-identical.
//!
//! ```
//! use hemmer_provider_datadog::codec::opaque::Scrubber;
//!
//! let scrubber = Scrubber::json().computed_fields(&["id", "created_at"]);
//! let user = r#"{"name": "cpu", "type": "metric alert"}"#;
//! let server = r#"{"type":"metric alert","id":42,"name":"cpu","created_at":"2024-01-01"}"#;
//!
//! assert!(scrubber.equivalent(user, server));
//! ```

use std::fmt;
use std::sync::Arc;

use serde_json::{Map, Value};

use crate::error::ProviderError;
use crate::schema::StateNormalizer;

/// Document syntax of an opaque attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpaqueFormat {
    /// JSON document.
    Json,
    /// YAML document.
    Yaml,
}

impl fmt::Display for OpaqueFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Json => f.write_str("JSON"),
            Self::Yaml => f.write_str("YAML"),
        }
    }
}

/// Resource-specific rewrite run after the generic scrub steps.
pub type ScrubHook = fn(&mut Value);

/// Canonicalizes an opaque document.
///
/// Scrubbing, in order: remove computed fields, drop `null` object members,
/// trim configured string fields, run resource hooks, then render with
/// sorted keys.
#[derive(Debug, Clone)]
pub struct Scrubber {
    format: OpaqueFormat,
    computed: Vec<Vec<String>>,
    trimmed: Vec<String>,
    hooks: Vec<ScrubHook>,
}

impl Scrubber {
    /// Create a scrubber for the given format.
    pub fn new(format: OpaqueFormat) -> Self {
        Self {
            format,
            computed: Vec::new(),
            trimmed: Vec::new(),
            hooks: Vec::new(),
        }
    }

    /// Create a JSON scrubber.
    pub fn json() -> Self {
        Self::new(OpaqueFormat::Json)
    }

    /// Create a YAML scrubber.
    pub fn yaml() -> Self {
        Self::new(OpaqueFormat::Yaml)
    }

    /// Remove a server-assigned field. Dotted paths address nested objects,
    /// e.g. `metadata.managed`.
    pub fn computed(mut self, path: &str) -> Self {
        self.computed
            .push(path.split('.').map(str::to_string).collect());
        self
    }

    /// Remove several top-level server-assigned fields.
    pub fn computed_fields(self, fields: &[&str]) -> Self {
        fields.iter().fold(self, |scrubber, field| scrubber.computed(field))
    }

    /// Trim surrounding whitespace from a top-level string field.
    pub fn trimmed(mut self, field: &str) -> Self {
        self.trimmed.push(field.to_string());
        self
    }

    /// Add a resource-specific rewrite.
    pub fn with_hook(mut self, hook: ScrubHook) -> Self {
        self.hooks.push(hook);
        self
    }

    /// The document format.
    pub fn format(&self) -> OpaqueFormat {
        self.format
    }

    /// Parse a document. The top level must be an object.
    pub fn parse(&self, text: &str) -> Result<Value, ProviderError> {
        let value: Value = match self.format {
            OpaqueFormat::Json => serde_json::from_str(text)?,
            OpaqueFormat::Yaml => serde_yaml::from_str(text)?,
        };
        if !value.is_object() {
            return Err(ProviderError::Validation(format!(
                "expected a {} object at the top level",
                self.format
            )));
        }
        Ok(value)
    }

    /// Apply the scrub steps to a parsed document.
    pub fn scrub_value(&self, mut value: Value) -> Value {
        for path in &self.computed {
            let path: Vec<&str> = path.iter().map(String::as_str).collect();
            super::typed::delete_key(&mut value, &path);
        }
        drop_null_members(&mut value);
        if let Some(object) = value.as_object_mut() {
            for field in &self.trimmed {
                if let Some(Value::String(s)) = object.get_mut(field) {
                    *s = s.trim().to_string();
                }
            }
        }
        for hook in &self.hooks {
            hook(&mut value);
        }
        value
    }

    /// Render a document canonically: sorted keys, no insignificant
    /// whitespace for JSON, block style for YAML.
    pub fn render(&self, value: &Value) -> Result<String, ProviderError> {
        let canonical = sort_keys(value);
        Ok(match self.format {
            OpaqueFormat::Json => serde_json::to_string(&canonical)?,
            OpaqueFormat::Yaml => serde_yaml::to_string(&canonical)?,
        })
    }

    /// Parse, scrub and render.
    pub fn scrub(&self, text: &str) -> Result<String, ProviderError> {
        let value = self.parse(text)?;
        self.render(&self.scrub_value(value))
    }

    /// Scrub a document that arrived already parsed (e.g. nested inside a
    /// JSON response) and render it in this scrubber's format.
    pub fn scrub_parsed(&self, value: &Value) -> Result<String, ProviderError> {
        self.render(&self.scrub_value(value.clone()))
    }

    /// Whether two documents are equivalent after scrubbing.
    ///
    /// Documents that fail to parse are compared verbatim.
    pub fn equivalent(&self, a: &str, b: &str) -> bool {
        match (self.scrub(a), self.scrub(b)) {
            (Ok(a), Ok(b)) => a == b,
            _ => a == b,
        }
    }

    /// A [`StateNormalizer`] that replaces a document string with its
    /// scrubbed canonical form. Unparseable strings pass through unchanged so
    /// validation can report them.
    pub fn normalizer(&self) -> StateNormalizer {
        let scrubber = Arc::new(self.clone());
        StateNormalizer::new(move |value| match value.as_str().map(|s| scrubber.scrub(s)) {
            Some(Ok(canonical)) => Value::String(canonical),
            _ => value.clone(),
        })
    }
}

/// Whether the identity of a document changed between `old` and `new`.
///
/// `identity` extracts the fields that name the object remotely. Documents
/// that fail to parse never report an identity change; validation rejects
/// them separately.
pub fn identity_changed(
    scrubber: &Scrubber,
    old: &str,
    new: &str,
    identity: impl Fn(&Value) -> Option<Value>,
) -> bool {
    match (scrubber.parse(old), scrubber.parse(new)) {
        (Ok(old), Ok(new)) => identity(&old) != identity(&new),
        _ => false,
    }
}

fn drop_null_members(value: &mut Value) {
    match value {
        Value::Object(object) => {
            object.retain(|_, v| !v.is_null());
            for child in object.values_mut() {
                drop_null_members(child);
            }
        },
        Value::Array(items) => {
            for child in items.iter_mut() {
                drop_null_members(child);
            }
        },
        _ => {},
    }
}

fn sort_keys(value: &Value) -> Value {
    match value {
        Value::Object(object) => {
            let mut entries: Vec<(&String, &Value)> = object.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            let sorted: Map<String, Value> = entries
                .into_iter()
                .map(|(k, v)| (k.clone(), sort_keys(v)))
                .collect();
            Value::Object(sorted)
        },
        Value::Array(items) => Value::Array(items.iter().map(sort_keys).collect()),
        other => other.clone(),
    }
}
