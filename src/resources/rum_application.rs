//! `datadog_rum_application`: a Real User Monitoring application.

use serde_json::{Map, Value};

use crate::client::{ApiRequest, RequestBody};
use crate::codec::typed::{flatten_envelope, jsonapi_document, StateWriter, WireBuilder};
use crate::error::ProviderError;
use crate::resource::Resource;
use crate::schema::{Attribute, AttributeFlags, AttributeType, Diagnostic, Schema};
use crate::state::InstanceState;
use crate::validation::string_not_blank;

const COLLECTION: &str = "api/v2/rum/applications";

/// Application platforms.
pub const RUM_APPLICATION_TYPES: &[&str] = &["browser", "ios", "android", "react-native", "flutter"];

const EVENT_PROCESSING_STATES: &[&str] = &["ALL", "ERROR_FOCUSED_MODE", "NONE"];
const RETENTION_STATES: &[&str] = &["MAX", "NONE"];

/// Product scale settings: (attribute, key under `product_scales`).
const SCALES: &[(&str, &str)] = &[
    ("rum_event_processing_state", "rum_event_processing_scale"),
    ("product_analytics_retention_state", "product_analytics_retention_scale"),
];

/// The state of a product scale, from `product_scales.{scale}.state` or the
/// flat attribute echoed back by older responses.
fn scale_state<'a>(attributes: &'a Map<String, Value>, attr: &str, scale: &str) -> Option<&'a Value> {
    attributes
        .get("product_scales")
        .and_then(|scales| scales.get(scale))
        .and_then(|scale| scale.get("state"))
        .or_else(|| attributes.get(attr))
        .filter(|state| state.is_string())
}

/// A RUM application.
#[derive(Debug, Clone, Copy, Default)]
pub struct RumApplication;

impl RumApplication {
    fn document(desired: &InstanceState, kind: &str, id: Option<&str>) -> Value {
        let mut builder = WireBuilder::new(desired).copy("name").copy("type");
        for (attr, _) in SCALES {
            builder = builder.copy(attr);
        }
        jsonapi_document(kind, id, builder.build(), None)
    }
}

impl Resource for RumApplication {
    fn type_name(&self) -> &'static str {
        "datadog_rum_application"
    }

    fn schema(&self) -> Schema {
        Schema::v0()
            .with_description("A Datadog RUM application.")
            .with_attribute(
                "name",
                Attribute::required_string()
                    .with_description("Name of the application.")
                    .with_validator(string_not_blank()),
            )
            .with_attribute(
                "type",
                Attribute::optional_enum(RUM_APPLICATION_TYPES)
                    .with_description("Platform of the application.")
                    .with_default(Value::String("browser".to_string()))
                    .with_force_new(),
            )
            .with_attribute(
                "client_token",
                Attribute::computed_string()
                    .with_description("Client token used by the RUM SDK.")
                    .sensitive(),
            )
            .with_attribute(
                "api_key_id",
                Attribute::computed_int64().with_description("ID of the API key backing the application."),
            )
            .with_attribute(
                "rum_event_processing_state",
                Attribute::new(
                    AttributeType::one_of(EVENT_PROCESSING_STATES),
                    AttributeFlags::optional_computed(),
                )
                .with_description("Which RUM events are processed and retained."),
            )
            .with_attribute(
                "product_analytics_retention_state",
                Attribute::new(
                    AttributeType::one_of(RETENTION_STATES),
                    AttributeFlags::optional_computed(),
                )
                .with_description("Whether product analytics data is retained."),
            )
    }

    fn create_endpoint(&self, _desired: &InstanceState) -> Result<ApiRequest, ProviderError> {
        Ok(ApiRequest::post(COLLECTION))
    }

    fn read_endpoint(&self, id: &str) -> Result<ApiRequest, ProviderError> {
        Ok(ApiRequest::get(COLLECTION).segment(id))
    }

    fn update_endpoint(&self, id: &str, _desired: &InstanceState) -> Result<ApiRequest, ProviderError> {
        Ok(ApiRequest::patch(COLLECTION).segment(id))
    }

    fn delete_endpoint(&self, id: &str) -> Result<Option<ApiRequest>, ProviderError> {
        Ok(Some(ApiRequest::delete(COLLECTION).segment(id)))
    }

    fn build_request(&self, desired: &InstanceState) -> Result<RequestBody, ProviderError> {
        Ok(RequestBody::Json(Self::document(desired, "rum_application_create", None)))
    }

    fn build_update_request(
        &self,
        id: &str,
        desired: &InstanceState,
    ) -> Result<RequestBody, ProviderError> {
        Ok(RequestBody::Json(Self::document(desired, "rum_application_update", Some(id))))
    }

    fn write_state(&self, wire: &Value, state: &mut InstanceState) -> Vec<Diagnostic> {
        let envelope = match flatten_envelope(wire) {
            Ok(envelope) => envelope,
            Err(err) => return vec![Diagnostic::from(err)],
        };
        let attributes = envelope.attributes;

        let mut writer = StateWriter::new(attributes, state);
        writer
            .string("name", "name")
            .string("type", "type")
            .string("client_token", "client_token")
            .int("api_key_id", "api_key_id");
        for (attr, scale) in SCALES {
            writer.set(
                attr,
                scale_state(attributes, attr, scale).cloned().unwrap_or(Value::Null),
            );
        }
        writer.finish()
    }
}
