//! `datadog_api_key`: an organization API key.

use serde_json::Value;

use crate::client::{ApiRequest, RequestBody};
use crate::codec::typed::{flatten_envelope, jsonapi_document, StateWriter, WireBuilder};
use crate::error::ProviderError;
use crate::resource::Resource;
use crate::schema::{Attribute, Diagnostic, Schema};
use crate::state::InstanceState;
use crate::validation::string_not_blank;

const COLLECTION: &str = "api/v2/api_keys";

/// An API key.
#[derive(Debug, Clone, Copy, Default)]
pub struct ApiKey;

impl ApiKey {
    fn document(desired: &InstanceState, id: Option<&str>) -> Value {
        let attributes = WireBuilder::new(desired).copy("name").build();
        jsonapi_document("api_keys", id, attributes, None)
    }
}

impl Resource for ApiKey {
    fn type_name(&self) -> &'static str {
        "datadog_api_key"
    }

    fn schema(&self) -> Schema {
        Schema::v0()
            .with_description("A Datadog API key.")
            .with_attribute(
                "name",
                Attribute::required_string()
                    .with_description("Name for the API key.")
                    .with_validator(string_not_blank()),
            )
            .with_attribute(
                "key",
                Attribute::computed_string()
                    .with_description("The value of the API key.")
                    .sensitive(),
            )
            .with_attribute("last4", Attribute::computed_string())
            .with_attribute("created_at", Attribute::computed_string())
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
        Ok(RequestBody::Json(Self::document(desired, None)))
    }

    fn build_update_request(
        &self,
        id: &str,
        desired: &InstanceState,
    ) -> Result<RequestBody, ProviderError> {
        Ok(RequestBody::Json(Self::document(desired, Some(id))))
    }

    fn write_state(&self, wire: &Value, state: &mut InstanceState) -> Vec<Diagnostic> {
        let envelope = match flatten_envelope(wire) {
            Ok(envelope) => envelope,
            Err(err) => return vec![Diagnostic::from(err)],
        };

        let mut writer = StateWriter::new(envelope.attributes, state);
        writer
            .string("name", "name")
            .string("last4", "last4")
            .string("created_at", "created_at");
        // Only some responses carry the secret; keep the one already known.
        if envelope.attributes.get("key").is_some_and(Value::is_string) {
            writer.string("key", "key");
        }
        writer.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::ResourceDriver;
    use crate::resources::test_support::{client, state, timeouts};
    use crate::testing::{assert_plan_no_changes, FakeDatadogApi};
    use serde_json::json;
    use std::sync::Arc;

    #[test]
    fn test_schema_marks_key_sensitive() {
        let schema = ApiKey.schema();
        let key = schema.attribute("key").unwrap();
        assert!(key.flags.sensitive);
        assert!(key.flags.is_computed_only());
    }

    #[test]
    fn test_key_survives_responses_without_it() {
        let mut target = InstanceState::with_id("k1");
        let created = json!({"data": {"id": "k1", "type": "api_keys", "attributes": {
            "name": "ci", "key": "abcd1234", "last4": "1234", "created_at": "2024-01-01"
        }}});
        assert!(ApiKey.write_state(&created, &mut target).is_empty());

        let listed = json!({"data": {"id": "k1", "type": "api_keys", "attributes": {
            "name": "ci-renamed", "last4": "1234", "created_at": "2024-01-01"
        }}});
        assert!(ApiKey.write_state(&listed, &mut target).is_empty());
        assert_eq!(target.get_str("key"), Some("abcd1234"));
        assert_eq!(target.get_str("name"), Some("ci-renamed"));
    }

    #[tokio::test]
    async fn test_lifecycle() {
        let api = Arc::new(FakeDatadogApi::new().with_server_fields(
            COLLECTION,
            json!({"key": "0123456789abcdef", "last4": "cdef", "created_at": "2024-01-01"}),
        ));
        let client = client(api.clone());
        let driver = ResourceDriver::new(&ApiKey, &client).with_timeouts(timeouts());
        let config = json!({"name": "ci"});

        let created = driver.create(state(config.clone())).await.unwrap();
        assert_eq!(created.get_str("key"), Some("0123456789abcdef"));
        assert_plan_no_changes(&driver.plan(Some(&created), &config).unwrap());

        let renamed = driver
            .update(&created, state(json!({"name": "deploys"})))
            .await
            .unwrap();
        assert_eq!(renamed.get_str("name"), Some("deploys"));
        assert_eq!(renamed.get_str("key"), Some("0123456789abcdef"));

        driver.delete(renamed).await.unwrap();
        assert!(api.paths().is_empty());
    }
}
