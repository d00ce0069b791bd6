//! `datadog_service_account`: a non-interactive user.
//!
//! Service accounts are created through `/api/v2/service_accounts` but live
//! under `/api/v2/users` afterwards. Deleting one disables it.

use serde_json::Value;

use crate::client::{ApiRequest, RequestBody};
use crate::codec::typed::{flatten_envelope, jsonapi_document, StateWriter, WireBuilder};
use crate::error::ProviderError;
use crate::resource::Resource;
use crate::schema::{Attribute, Diagnostic, Schema};
use crate::state::InstanceState;
use crate::validation::string_not_blank;

const CREATE: &str = "api/v2/service_accounts";
const USERS: &str = "api/v2/users";

/// A service account.
#[derive(Debug, Clone, Copy, Default)]
pub struct ServiceAccount;

impl Resource for ServiceAccount {
    fn type_name(&self) -> &'static str {
        "datadog_service_account"
    }

    fn schema(&self) -> Schema {
        Schema::v0()
            .with_description("A Datadog service account.")
            .with_attribute(
                "email",
                Attribute::required_string()
                    .with_description("Email of the service account.")
                    .with_validator(string_not_blank()),
            )
            .with_attribute(
                "name",
                Attribute::optional_string().with_description("Name of the service account."),
            )
            .with_attribute(
                "disabled",
                Attribute::optional_bool()
                    .with_description("Whether the service account is disabled.")
                    .with_default(Value::Bool(false)),
            )
    }

    fn create_endpoint(&self, _desired: &InstanceState) -> Result<ApiRequest, ProviderError> {
        Ok(ApiRequest::post(CREATE))
    }

    fn read_endpoint(&self, id: &str) -> Result<ApiRequest, ProviderError> {
        Ok(ApiRequest::get(USERS).segment(id))
    }

    fn update_endpoint(&self, id: &str, _desired: &InstanceState) -> Result<ApiRequest, ProviderError> {
        Ok(ApiRequest::patch(USERS).segment(id))
    }

    fn delete_endpoint(&self, id: &str) -> Result<Option<ApiRequest>, ProviderError> {
        Ok(Some(ApiRequest::delete(USERS).segment(id)))
    }

    fn build_request(&self, desired: &InstanceState) -> Result<RequestBody, ProviderError> {
        // `disabled` is not accepted on create; the next plan updates it.
        let attributes = WireBuilder::new(desired)
            .copy("email")
            .copy("name")
            .insert("service_account", Value::Bool(true))
            .build();
        Ok(RequestBody::Json(jsonapi_document("users", None, attributes, None)))
    }

    fn build_update_request(
        &self,
        id: &str,
        desired: &InstanceState,
    ) -> Result<RequestBody, ProviderError> {
        let attributes = WireBuilder::new(desired)
            .copy("email")
            .copy("name")
            .copy("disabled")
            .build();
        Ok(RequestBody::Json(jsonapi_document("users", Some(id), attributes, None)))
    }

    fn write_state(&self, wire: &Value, state: &mut InstanceState) -> Vec<Diagnostic> {
        let envelope = match flatten_envelope(wire) {
            Ok(envelope) => envelope,
            Err(err) => return vec![Diagnostic::from(err)],
        };

        let mut writer = StateWriter::new(envelope.attributes, state);
        writer
            .string("email", "email")
            .string("name", "name")
            .bool("disabled", "disabled");
        writer.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::ResourceDriver;
    use crate::resources::test_support::{client, state, timeouts};
    use crate::testing::{assert_plan_no_changes, assert_plan_updates_in_place, FakeDatadogApi};
    use reqwest::Method;
    use serde_json::json;
    use std::sync::Arc;

    fn fake() -> Arc<FakeDatadogApi> {
        Arc::new(
            FakeDatadogApi::new()
                .route_created(CREATE, USERS)
                .with_server_fields(CREATE, json!({"disabled": false, "handle": "ci@example.com"})),
        )
    }

    #[test]
    fn test_create_marks_service_account() {
        let desired = state(json!({"email": "ci@example.com", "disabled": true}));
        let RequestBody::Json(body) = ServiceAccount.build_request(&desired).unwrap() else {
            panic!("expected a JSON body");
        };
        assert_eq!(
            body,
            json!({"data": {
                "type": "users",
                "attributes": {"email": "ci@example.com", "service_account": true}
            }})
        );
    }

    #[tokio::test]
    async fn test_lifecycle() {
        let api = fake();
        let client = client(api.clone());
        let driver = ResourceDriver::new(&ServiceAccount, &client).with_timeouts(timeouts());
        let config = json!({"email": "ci@example.com", "name": "CI"});

        let created = driver.create(state(config.clone())).await.unwrap();
        assert_eq!(created.id, "fake-0001");
        assert_eq!(created.get_bool("disabled"), Some(false));
        assert!(api.object("api/v2/users/fake-0001").is_some());
        assert_plan_no_changes(&driver.plan(Some(&created), &config).unwrap());

        let disabled = json!({"email": "ci@example.com", "name": "CI", "disabled": true});
        assert_plan_updates_in_place(&driver.plan(Some(&created), &disabled).unwrap());
        let updated = driver.update(&created, state(disabled)).await.unwrap();
        assert_eq!(updated.get_bool("disabled"), Some(true));

        let patch = api
            .requests()
            .into_iter()
            .find(|r| r.method == Method::PATCH)
            .unwrap();
        assert_eq!(patch.path, "api/v2/users/fake-0001");
        assert_eq!(patch.body_value().unwrap()["data"]["id"], json!("fake-0001"));

        driver.delete(updated).await.unwrap();
        assert!(api.paths().is_empty());
    }
}
