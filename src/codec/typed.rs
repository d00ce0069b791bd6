//! Attribute-level mapping between instance state and Datadog payloads.
//!
//! Requests are assembled with [`WireBuilder`], which omits unset and empty
//! values so an unset optional attribute and an empty one produce the same
//! payload. Responses are folded back into state with [`StateWriter`], which
//! records a diagnostic rather than panicking when the API returns a value of
//! an unexpected shape.
//!
//! ```
//! use hemmer_provider_datadog::codec::typed::WireBuilder;
//! use hemmer_provider_datadog::state::InstanceState;
//! use serde_json::json;
//!
//! let mut state = InstanceState::new();
//! state.set("name", json!("cpu"));
//! state.set("message", json!(""));
//!
//! let wire = WireBuilder::new(&state).copy("name").copy("message").build();
//! assert_eq!(serde_json::Value::Object(wire), json!({"name": "cpu"}));
//! ```

use serde_json::{Map, Value};

use crate::error::ProviderError;
use crate::schema::Diagnostic;
use crate::state::{is_unset, InstanceState};

/// Builds a request object from state, skipping unset values.
#[derive(Debug)]
pub struct WireBuilder<'a> {
    state: &'a InstanceState,
    object: Map<String, Value>,
}

impl<'a> WireBuilder<'a> {
    /// Start an empty request object.
    pub fn new(state: &'a InstanceState) -> Self {
        Self {
            state,
            object: Map::new(),
        }
    }

    /// Copy an attribute under its own name.
    pub fn copy(self, attr: &str) -> Self {
        self.copy_as(attr, attr)
    }

    /// Copy an attribute under a different wire key.
    pub fn copy_as(mut self, attr: &str, key: &str) -> Self {
        if let Some(value) = self.state.get(attr) {
            if !is_unset(Some(value)) {
                self.object.insert(key.to_string(), value.clone());
            }
        }
        self
    }

    /// Copy a set-valued attribute, sorted so the payload is deterministic.
    pub fn copy_set_as(mut self, attr: &str, key: &str) -> Self {
        if let Some(Value::Array(items)) = self.state.get(attr) {
            if !items.is_empty() {
                let mut items = items.clone();
                items.sort_by_cached_key(|v| v.to_string());
                items.dedup();
                self.object.insert(key.to_string(), Value::Array(items));
            }
        }
        self
    }

    /// Insert a computed value. Unset values are skipped.
    pub fn insert(mut self, key: &str, value: Value) -> Self {
        if !is_unset(Some(&value)) {
            self.object.insert(key.to_string(), value);
        }
        self
    }

    /// Finish the object.
    pub fn build(self) -> Map<String, Value> {
        self.object
    }
}

/// Folds a response object into instance state.
///
/// Keys missing from the response clear the corresponding attribute.
#[derive(Debug)]
pub struct StateWriter<'a> {
    wire: &'a Map<String, Value>,
    state: &'a mut InstanceState,
    diagnostics: Vec<Diagnostic>,
}

impl<'a> StateWriter<'a> {
    /// Start writing `wire` into `state`.
    pub fn new(wire: &'a Map<String, Value>, state: &'a mut InstanceState) -> Self {
        Self {
            wire,
            state,
            diagnostics: Vec::new(),
        }
    }

    /// Copy a string field.
    pub fn string(&mut self, attr: &str, key: &str) -> &mut Self {
        self.typed(attr, key, "string", Value::is_string)
    }

    /// Copy a bool field.
    pub fn bool(&mut self, attr: &str, key: &str) -> &mut Self {
        self.typed(attr, key, "bool", Value::is_boolean)
    }

    /// Copy an integer field.
    pub fn int(&mut self, attr: &str, key: &str) -> &mut Self {
        self.typed(attr, key, "integer", |v| v.is_i64() || v.is_u64())
    }

    /// Copy an array of strings.
    pub fn strings(&mut self, attr: &str, key: &str) -> &mut Self {
        self.typed(attr, key, "list of strings", |v| {
            v.as_array()
                .is_some_and(|items| items.iter().all(Value::is_string))
        })
    }

    /// Copy a numeric field into a string attribute, e.g. a threshold.
    pub fn number_as_string(&mut self, attr: &str, key: &str) -> &mut Self {
        match self.wire.get(key) {
            None | Some(Value::Null) => self.state.set(attr, Value::Null),
            Some(Value::Number(n)) => self.state.set(attr, Value::String(n.to_string())),
            Some(Value::String(s)) => self.state.set(attr, Value::String(s.clone())),
            Some(other) => self.mismatch(attr, key, "number", other),
        }
        self
    }

    /// Set an attribute directly.
    pub fn set(&mut self, attr: &str, value: Value) -> &mut Self {
        self.state.set(attr, value);
        self
    }

    /// Record a problem found while interpreting the response.
    pub fn push(&mut self, diagnostic: Diagnostic) -> &mut Self {
        self.diagnostics.push(diagnostic);
        self
    }

    /// Finish and return any diagnostics.
    pub fn finish(self) -> Vec<Diagnostic> {
        self.diagnostics
    }

    fn typed(
        &mut self,
        attr: &str,
        key: &str,
        expected: &str,
        accepts: impl Fn(&Value) -> bool,
    ) -> &mut Self {
        match self.wire.get(key) {
            None | Some(Value::Null) => self.state.set(attr, Value::Null),
            Some(v) if accepts(v) => self.state.set(attr, v.clone()),
            Some(other) => self.mismatch(attr, key, expected, other),
        }
        self
    }

    fn mismatch(&mut self, attr: &str, key: &str, expected: &str, got: &Value) {
        self.diagnostics.push(
            Diagnostic::error(format!("Unexpected value for '{key}' in Datadog response"))
                .with_detail(format!("Expected {expected}, got {got}"))
                .with_attribute(attr),
        );
    }
}

/// Take the single element of a `MaxItems = 1` block.
pub fn unwrap_single(value: Option<&Value>) -> Option<&Map<String, Value>> {
    match value? {
        Value::Array(items) => items.first().and_then(Value::as_object),
        Value::Object(object) => Some(object),
        _ => None,
    }
}

/// Wrap an object as the single element of a block.
pub fn wrap_single(object: Map<String, Value>) -> Value {
    Value::Array(vec![Value::Object(object)])
}

/// Build a JSON:API request document.
pub fn jsonapi_document(
    kind: &str,
    id: Option<&str>,
    attributes: Map<String, Value>,
    relationships: Option<Map<String, Value>>,
) -> Value {
    let mut data = Map::new();
    data.insert("type".to_string(), Value::String(kind.to_string()));
    if let Some(id) = id {
        data.insert("id".to_string(), Value::String(id.to_string()));
    }
    data.insert("attributes".to_string(), Value::Object(attributes));
    if let Some(relationships) = relationships.filter(|r| !r.is_empty()) {
        data.insert("relationships".to_string(), Value::Object(relationships));
    }

    let mut document = Map::new();
    document.insert("data".to_string(), Value::Object(data));
    Value::Object(document)
}

/// The primary resource of a JSON:API response document.
#[derive(Debug, Clone, Copy)]
pub struct Envelope<'a> {
    /// `data.id`, if present.
    pub id: Option<&'a Value>,
    /// `data.attributes`.
    pub attributes: &'a Map<String, Value>,
    /// `data.relationships`, if present.
    pub relationships: Option<&'a Map<String, Value>>,
}

/// Flatten a JSON:API response document.
///
/// `data` may be an object or an array; for an array the first element is
/// used.
pub fn flatten_envelope(wire: &Value) -> Result<Envelope<'_>, ProviderError> {
    let data = match wire.get("data") {
        Some(Value::Array(items)) => items.first(),
        Some(data @ Value::Object(_)) => Some(data),
        _ => None,
    }
    .ok_or_else(|| ProviderError::Internal("response is missing the `data` object".to_string()))?;

    let attributes = data
        .get("attributes")
        .and_then(Value::as_object)
        .ok_or_else(|| {
            ProviderError::Internal("response is missing `data.attributes`".to_string())
        })?;

    Ok(Envelope {
        id: data.get("id"),
        attributes,
        relationships: data.get("relationships").and_then(Value::as_object),
    })
}

/// Render an ID value as a string. Integral numbers print without a
/// fractional part.
pub fn id_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => match (n.as_u64(), n.as_i64(), n.as_f64()) {
            (Some(u), _, _) => Some(u.to_string()),
            (_, Some(i), _) => Some(i.to_string()),
            (_, _, Some(f)) => Some(format!("{f:.0}")),
            _ => None,
        },
        _ => None,
    }
}

/// The remote ID carried by a response: `data.id` for JSON:API documents,
/// top-level `id` otherwise.
pub fn response_id(wire: &Value) -> Option<String> {
    match wire.get("data") {
        Some(Value::Object(data)) => data.get("id").and_then(id_string),
        Some(Value::Array(items)) => items
            .first()
            .and_then(|item| item.get("id"))
            .and_then(id_string),
        _ => wire.get("id").and_then(id_string),
    }
}

/// Normalize a tag the way Datadog does on ingest.
///
/// Lowercases, replaces characters outside `[a-z0-9_:./-]` with `_`,
/// collapses runs of `_`, drops leading characters until the first letter,
/// caps the length at 200 characters and strips trailing `_`.
pub fn normalize_tag(tag: &str) -> String {
    let mut out = String::with_capacity(tag.len());
    for c in tag.chars().flat_map(char::to_lowercase) {
        if out.is_empty() && !c.is_alphabetic() {
            continue;
        }
        let c = if c.is_alphanumeric() || matches!(c, '_' | ':' | '.' | '/' | '-') {
            c
        } else {
            '_'
        };
        if c == '_' && out.ends_with('_') {
            continue;
        }
        out.push(c);
    }

    let capped: String = out.chars().take(200).collect();
    capped.trim_end_matches('_').to_string()
}

/// Recursively remove nulls, empty arrays and empty objects.
///
/// Objects and arrays that become empty after pruning are removed as well.
pub fn remove_empty_values(value: &mut Value) {
    match value {
        Value::Object(object) => {
            for child in object.values_mut() {
                remove_empty_values(child);
            }
            object.retain(|_, v| !is_empty_container(v));
        },
        Value::Array(items) => {
            for child in items.iter_mut() {
                remove_empty_values(child);
            }
        },
        _ => {},
    }
}

fn is_empty_container(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Array(items) => items.is_empty(),
        Value::Object(object) => object.is_empty(),
        _ => false,
    }
}

/// Remove the key at `path` (a sequence of object keys). Missing
/// intermediate keys are ignored.
pub fn delete_key(value: &mut Value, path: &[&str]) {
    match path {
        [] => {},
        [last] => {
            if let Some(object) = value.as_object_mut() {
                object.remove(*last);
            }
        },
        [first, rest @ ..] => {
            if let Some(child) = value.get_mut(*first) {
                delete_key(child, rest);
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn state(attributes: Value) -> InstanceState {
        InstanceState::from_value(&attributes).unwrap()
    }

    #[test]
    fn test_wire_builder_omits_unset_and_empty() {
        let state = state(json!({
            "name": "cpu",
            "message": "",
            "tags": [],
            "priority": 0,
            "enabled": false
        }));
        let wire = WireBuilder::new(&state)
            .copy("name")
            .copy("message")
            .copy_set_as("tags", "tags")
            .copy("priority")
            .copy_as("enabled", "is_enabled")
            .copy("missing")
            .build();

        assert_eq!(
            Value::Object(wire),
            json!({"name": "cpu", "priority": 0, "is_enabled": false})
        );
    }

    #[test]
    fn test_wire_builder_sorts_sets() {
        let state = state(json!({"tags": ["team:b", "env:a", "team:b"]}));
        let wire = WireBuilder::new(&state).copy_set_as("tags", "tags").build();
        assert_eq!(wire["tags"], json!(["env:a", "team:b"]));
    }

    #[test]
    fn test_state_writer_copies_and_clears() {
        let mut target = state(json!({"name": "old", "message": "stale"}));
        let wire = json!({"name": "cpu", "priority": 3, "tags": ["a"], "critical": 1.0});
        let diagnostics = {
            let wire = wire.as_object().unwrap();
            let mut writer = StateWriter::new(wire, &mut target);
            writer
                .string("name", "name")
                .string("message", "message")
                .int("priority", "priority")
                .strings("tags", "tags")
                .number_as_string("critical", "critical");
            writer.finish()
        };

        assert!(diagnostics.is_empty());
        assert_eq!(target.get_str("name"), Some("cpu"));
        assert!(target.get("message").is_none());
        assert_eq!(target.get("priority"), Some(&json!(3)));
        assert_eq!(target.get_str("critical"), Some("1.0"));
    }

    #[test]
    fn test_state_writer_reports_type_mismatch() {
        let mut target = InstanceState::new();
        let wire = json!({"name": 42});
        let mut writer = StateWriter::new(wire.as_object().unwrap(), &mut target);
        writer.string("name", "name");
        let diagnostics = writer.finish();

        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].attribute.as_deref(), Some("name"));
    }

    #[test]
    fn test_single_block_wrapping() {
        let mut object = Map::new();
        object.insert("message".to_string(), json!(true));
        let wrapped = wrap_single(object.clone());
        assert_eq!(wrapped, json!([{"message": true}]));
        assert_eq!(unwrap_single(Some(&wrapped)), Some(&object));
        assert_eq!(unwrap_single(Some(&json!([]))), None);
        assert_eq!(unwrap_single(None), None);
    }

    #[test]
    fn test_jsonapi_document_and_flatten() {
        let mut attributes = Map::new();
        attributes.insert("name".to_string(), json!("ops"));
        let document = jsonapi_document("roles", Some("r-1"), attributes, None);
        assert_eq!(
            document,
            json!({"data": {"type": "roles", "id": "r-1", "attributes": {"name": "ops"}}})
        );

        let envelope = flatten_envelope(&document).unwrap();
        assert_eq!(envelope.id, Some(&json!("r-1")));
        assert_eq!(envelope.attributes["name"], json!("ops"));
        assert!(envelope.relationships.is_none());
    }

    #[test]
    fn test_flatten_envelope_array_and_errors() {
        let wire = json!({"data": [{"attributes": {"schema": {"dd-service": "api"}}}]});
        let envelope = flatten_envelope(&wire).unwrap();
        assert_eq!(envelope.attributes["schema"]["dd-service"], json!("api"));

        assert!(flatten_envelope(&json!({"data": []})).is_err());
        assert!(flatten_envelope(&json!({"data": {"id": "1"}})).is_err());
    }

    #[test]
    fn test_response_id() {
        assert_eq!(response_id(&json!({"id": 12345})), Some("12345".to_string()));
        assert_eq!(response_id(&json!({"id": 1.2345e4})), Some("12345".to_string()));
        assert_eq!(response_id(&json!({"id": "abc-def"})), Some("abc-def".to_string()));
        assert_eq!(
            response_id(&json!({"data": {"id": "r-1", "attributes": {}}})),
            Some("r-1".to_string())
        );
        assert_eq!(response_id(&json!({"id": ""})), None);
        assert_eq!(response_id(&json!({})), None);
    }

    #[test]
    fn test_normalize_tag() {
        assert_eq!(normalize_tag("My Service"), "my_service");
        assert_eq!(normalize_tag("Env:Prod"), "env:prod");
        assert_eq!(normalize_tag("__init__"), "init");
        assert_eq!(normalize_tag("5-2 arsenal"), "arsenal");
        assert_eq!(normalize_tag("a!!!b???"), "a_b");
        assert_eq!(normalize_tag("team/core-infra"), "team/core-infra");
        assert_eq!(normalize_tag(&"x".repeat(250)).len(), 200);
    }

    #[test]
    fn test_normalize_tag_is_idempotent() {
        for tag in ["My Service", "a!!!b???", "__init__", "Env:Prod", "ÄBC def"] {
            let once = normalize_tag(tag);
            assert_eq!(normalize_tag(&once), once, "tag {tag:?}");
        }
    }

    #[test]
    fn test_normalize_tag_cap_lands_on_underscore() {
        let tag = format!("{}!b", "a".repeat(199));
        let once = normalize_tag(&tag);
        assert_eq!(once, "a".repeat(199));
        assert_eq!(normalize_tag(&once), once);
    }

    #[test]
    fn test_remove_empty_values() {
        let mut value = json!({
            "keep": {"nested_keep": "value", "nested_nil": null},
            "remove": {},
            "empty": [],
            "deep": {"deeper": {"empty_array": [], "keep_this": "value"}},
            "items": [{"keep": "value", "remove": null}, {"empty_map": {}, "keep": "value2"}],
            "number": 42,
            "only_nulls": {"a": null}
        });
        remove_empty_values(&mut value);

        assert_eq!(
            value,
            json!({
                "keep": {"nested_keep": "value"},
                "deep": {"deeper": {"keep_this": "value"}},
                "items": [{"keep": "value"}, {"keep": "value2"}],
                "number": 42
            })
        );
    }

    #[test]
    fn test_delete_key() {
        let mut value = json!({"test": true, "field-two": false});
        delete_key(&mut value, &["test"]);
        assert_eq!(value, json!({"field-two": false}));

        let mut value = json!({"test": {"nested": "field"}, "field-two": false});
        delete_key(&mut value, &["test", "nested"]);
        assert_eq!(value, json!({"test": {}, "field-two": false}));

        delete_key(&mut value, &["missing", "nested"]);
        assert_eq!(value, json!({"test": {}, "field-two": false}));
    }
}
