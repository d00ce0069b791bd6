//! `datadog_dashboard_json`: a dashboard supplied as a JSON document.

use serde_json::Value;

use crate::client::{ApiRequest, RequestBody};
use crate::codec::opaque::Scrubber;
use crate::codec::typed::StateWriter;
use crate::error::ProviderError;
use crate::resource::Resource;
use crate::schema::{Attribute, Diagnostic, Schema};
use crate::state::InstanceState;
use crate::validation::string_is_json_object;

use super::unexpected_response;

const COLLECTION: &str = "api/v1/dashboard";

/// Fields Datadog adds to a dashboard.
pub const DASHBOARD_COMPUTED_FIELDS: &[&str] = &[
    "author_handle",
    "author_name",
    "created_at",
    "id",
    "modified_at",
    "url",
];

/// Widget ids are assigned by Datadog, including inside group widgets.
fn remove_widget_ids(widgets: &mut Value) {
    let Some(widgets) = widgets.as_array_mut() else {
        return;
    };
    for widget in widgets {
        let Some(widget) = widget.as_object_mut() else {
            continue;
        };
        widget.remove("id");
        if let Some(nested) = widget
            .get_mut("definition")
            .and_then(|definition| definition.get_mut("widgets"))
        {
            remove_widget_ids(nested);
        }
    }
}

fn prepare_dashboard(document: &mut Value) {
    let Some(dashboard) = document.as_object_mut() else {
        return;
    };
    if let Some(widgets) = dashboard.get_mut("widgets") {
        remove_widget_ids(widgets);
    }
    // restricted_roles supersedes is_read_only
    if dashboard.get("restricted_roles").is_some_and(Value::is_array) {
        dashboard.remove("is_read_only");
    }
    if let Some(Value::Array(notify)) = dashboard.get_mut("notify_list") {
        notify.sort_by(|a, b| a.as_str().cmp(&b.as_str()));
    }
}

/// A dashboard managed as a JSON document.
#[derive(Debug, Clone)]
pub struct DashboardJson {
    scrubber: Scrubber,
}

impl Default for DashboardJson {
    fn default() -> Self {
        Self::new()
    }
}

impl DashboardJson {
    /// Create the resource with the dashboard scrubber.
    pub fn new() -> Self {
        Self {
            scrubber: Scrubber::json()
                .computed_fields(DASHBOARD_COMPUTED_FIELDS)
                .with_hook(prepare_dashboard),
        }
    }

    /// The scrubber applied to both configuration and responses.
    pub fn scrubber(&self) -> &Scrubber {
        &self.scrubber
    }
}

impl Resource for DashboardJson {
    fn type_name(&self) -> &'static str {
        "datadog_dashboard_json"
    }

    fn schema(&self) -> Schema {
        Schema::v0()
            .with_description("A Datadog dashboard defined by its JSON representation.")
            .with_attribute(
                "dashboard",
                Attribute::required_string()
                    .with_description("The JSON formatted definition of the dashboard.")
                    .with_validator(string_is_json_object())
                    .with_normalizer(self.scrubber.normalizer()),
            )
            .with_attribute(
                "url",
                Attribute::optional_computed_string()
                    .with_description("The URL of the dashboard."),
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
        Ok(RequestBody::raw_json(desired.require_str("dashboard")?))
    }

    fn write_state(&self, wire: &Value, state: &mut InstanceState) -> Vec<Diagnostic> {
        let Some(object) = wire.as_object() else {
            return vec![unexpected_response("dashboard", wire)];
        };

        let mut writer = StateWriter::new(object, state);
        writer.string("url", "url");
        if !object.contains_key("layout_type") {
            writer.push(
                Diagnostic::warning("Dashboard response has no layout_type")
                    .with_attribute("dashboard"),
            );
        }
        match self.scrubber.scrub_parsed(wire) {
            Ok(document) => {
                writer.set("dashboard", Value::String(document));
            },
            Err(err) => {
                writer.push(
                    Diagnostic::error("Could not canonicalize the dashboard returned by Datadog")
                        .with_detail(err.to_string())
                        .with_attribute("dashboard"),
                );
            },
        }
        writer.finish()
    }
}
