//! Remote identifiers.
//!
//! Most resources use the ID Datadog assigns. Some have none of their own and
//! are addressed by a composite of user-visible fields (a Slack channel is
//! `account_name:channel_name`), and some are organization-wide singletons
//! with a fixed ID. Data sources that do not map to one object derive a
//! stable ID by hashing their query.

use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use crate::error::ProviderError;
use crate::schema::Validator;

/// How a resource type identifies its remote object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Identity {
    /// Datadog assigns the ID on create.
    Remote,
    /// The ID is built from attribute values.
    Composite(CompositeId),
    /// There is exactly one object per organization.
    Singleton(&'static str),
}

/// Format of a composite ID: named fields joined by a separator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompositeId {
    fields: &'static [&'static str],
    separator: char,
}

impl CompositeId {
    /// Describe a composite ID.
    pub const fn new(fields: &'static [&'static str], separator: char) -> Self {
        Self { fields, separator }
    }

    /// The field names, in order.
    pub fn fields(&self) -> &'static [&'static str] {
        self.fields
    }

    /// The expected shape, e.g. `account_name:channel_name`.
    pub fn pattern(&self) -> String {
        self.fields.join(self.separator.to_string().as_str())
    }

    /// Validator for an attribute that becomes one part of this ID. It
    /// rejects the separator before anything is sent.
    pub fn part_validator(&self) -> Validator {
        let separator = self.separator;
        Validator::new(move |value| match value.as_str() {
            Some(s) if s.contains(separator) => {
                vec![format!("must not contain `{separator}`")]
            },
            _ => vec![],
        })
    }

    /// Join parts into an ID. Every part must be non-empty and free of the
    /// separator.
    pub fn format(&self, parts: &[&str]) -> Result<String, ProviderError> {
        if parts.len() != self.fields.len() {
            return Err(ProviderError::Internal(format!(
                "composite id `{}` needs {} parts, got {}",
                self.pattern(),
                self.fields.len(),
                parts.len()
            )));
        }
        if let Some(i) = parts.iter().position(|p| p.is_empty()) {
            return Err(ProviderError::InvalidAttribute {
                attribute: self.fields[i].to_string(),
                message: "must not be empty".to_string(),
            });
        }
        if let Some(i) = parts.iter().position(|p| p.contains(self.separator)) {
            return Err(ProviderError::InvalidAttribute {
                attribute: self.fields[i].to_string(),
                message: format!("must not contain `{}`", self.separator),
            });
        }
        Ok(parts.join(self.separator.to_string().as_str()))
    }

    /// Split an ID into its parts. Missing or extra separators are rejected.
    pub fn parse<'a>(&self, id: &'a str) -> Result<Vec<&'a str>, ProviderError> {
        let parts: Vec<&str> = id.split(self.separator).collect();
        let found = parts.len() - 1;
        if parts.len() != self.fields.len() || parts.iter().any(|p| p.is_empty()) {
            return Err(ProviderError::InvalidAttribute {
                attribute: "id".to_string(),
                message: format!(
                    "expected an id of the form `{}` with {} `{}` separator(s), got {:?} ({} found)",
                    self.pattern(),
                    self.fields.len() - 1,
                    self.separator,
                    id,
                    found
                ),
            });
        }
        Ok(parts)
    }

    /// Parse an ID into an attribute map keyed by field name.
    pub fn attributes(&self, id: &str) -> Result<Map<String, Value>, ProviderError> {
        let parts = self.parse(id)?;
        Ok(self
            .fields
            .iter()
            .zip(parts)
            .map(|(field, part)| (field.to_string(), Value::String(part.to_string())))
            .collect())
    }
}

/// Stable ID for a data source query: the hex SHA-256 of `key=value` pairs,
/// sorted by key and joined with `&`.
pub fn query_hash_id<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> String {
    let mut pairs: Vec<(&str, &str)> = pairs.into_iter().collect();
    pairs.sort_unstable();
    let canonical = pairs
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&");

    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    format!("{:x}", hasher.finalize())
}
