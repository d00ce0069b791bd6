//! `datadog_monitor_json`: a monitor supplied as a JSON document.

use serde_json::{Map, Value};

use crate::client::{ApiRequest, RequestBody};
use crate::codec::opaque::{identity_changed, Scrubber};
use crate::codec::typed::StateWriter;
use crate::error::ProviderError;
use crate::resource::Resource;
use crate::schema::{Attribute, Diagnostic, Schema};
use crate::state::InstanceState;
use crate::validation::string_is_json_object;

use super::monitor::canonical_monitor_type;
use super::unexpected_response;

const COLLECTION: &str = "api/v1/monitor";

/// Fields Datadog adds to a monitor that are never part of its definition.
pub const MONITOR_COMPUTED_FIELDS: &[&str] = &[
    "author_handle",
    "author_name",
    "classification",
    "created",
    "created_at",
    "creator",
    "deleted",
    "id",
    "modified",
    "modified_at",
    "org_id",
    "overall_state",
    "overall_state_modified",
    "restricted_roles",
    "url",
];

fn alias_monitor_type(document: &mut Value) {
    if let Some(Value::String(kind)) = document.get_mut("type") {
        *kind = canonical_monitor_type(kind).to_string();
    }
}

/// A monitor managed as a JSON document.
#[derive(Debug, Clone)]
pub struct MonitorJson {
    scrubber: Scrubber,
}

impl Default for MonitorJson {
    fn default() -> Self {
        Self::new()
    }
}

impl MonitorJson {
    /// Create the resource with the monitor scrubber.
    pub fn new() -> Self {
        Self {
            scrubber: Scrubber::json()
                .computed_fields(MONITOR_COMPUTED_FIELDS)
                .trimmed("name")
                .trimmed("query")
                .trimmed("message")
                .with_hook(alias_monitor_type),
        }
    }

    /// The scrubber applied to both configuration and responses.
    pub fn scrubber(&self) -> &Scrubber {
        &self.scrubber
    }
}

impl Resource for MonitorJson {
    fn type_name(&self) -> &'static str {
        "datadog_monitor_json"
    }

    fn schema(&self) -> Schema {
        Schema::v0()
            .with_description("A Datadog monitor defined by its JSON representation.")
            .with_attribute(
                "monitor",
                Attribute::required_string()
                    .with_description("The JSON formatted definition of the monitor.")
                    .with_validator(string_is_json_object())
                    .with_normalizer(self.scrubber.normalizer()),
            )
            .with_attribute(
                "url",
                Attribute::optional_computed_string().with_description("The URL of the monitor."),
            )
    }

    fn create_endpoint(&self, _desired: &InstanceState) -> Result<ApiRequest, ProviderError> {
        Ok(ApiRequest::post(COLLECTION))
    }

    fn read_endpoint(&self, id: &str) -> Result<ApiRequest, ProviderError> {
        Ok(ApiRequest::get(COLLECTION).segment(id))
    }

    fn update_endpoint(&self, id: &str, _desired: &InstanceState) -> Result<ApiRequest, ProviderError> {
        Ok(ApiRequest::put(COLLECTION).segment(id))
    }

    fn delete_endpoint(&self, id: &str) -> Result<Option<ApiRequest>, ProviderError> {
        Ok(Some(ApiRequest::delete(COLLECTION).segment(id)))
    }

    fn build_request(&self, desired: &InstanceState) -> Result<RequestBody, ProviderError> {
        Ok(RequestBody::raw_json(desired.require_str("monitor")?))
    }

    fn write_state(&self, wire: &Value, state: &mut InstanceState) -> Vec<Diagnostic> {
        let Some(object) = wire.as_object() else {
            return vec![unexpected_response("monitor", wire)];
        };

        let mut writer = StateWriter::new(object, state);
        writer.string("url", "url");
        match self.scrubber.scrub_parsed(wire) {
            Ok(document) => {
                writer.set("monitor", Value::String(document));
            },
            Err(err) => {
                writer.push(
                    Diagnostic::error("Could not canonicalize the monitor returned by Datadog")
                        .with_detail(err.to_string())
                        .with_attribute("monitor"),
                );
            },
        }
        writer.finish()
    }

    fn replace_paths(&self, prior: &InstanceState, desired: &Map<String, Value>) -> Vec<String> {
        let (Some(old), Some(new)) = (
            prior.get_str("monitor"),
            desired.get("monitor").and_then(Value::as_str),
        ) else {
            return Vec::new();
        };

        let monitor_type = |document: &Value| {
            document
                .get("type")
                .and_then(Value::as_str)
                .map(|kind| Value::String(canonical_monitor_type(kind).to_string()))
        };
        if identity_changed(&self.scrubber, old, new, monitor_type) {
            vec!["monitor".to_string()]
        } else {
            Vec::new()
        }
    }
}
