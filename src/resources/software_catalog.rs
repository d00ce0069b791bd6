//! `datadog_software_catalog`: a Software Catalog entity (schema v3)
//! supplied as a YAML document.
//!
//! Entities are upserted with `POST` and addressed by their reference,
//! `kind:namespace/name`. Datadog answers a lookup of an unknown reference
//! with an empty result rather than a 404.

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::time::Instant;

use crate::client::{ApiRequest, DatadogClient, RequestBody};
use crate::codec::opaque::{identity_changed, Scrubber};
use crate::error::ProviderError;
use crate::resource::Resource;
use crate::schema::{Attribute, Diagnostic, Schema, Validator};
use crate::state::InstanceState;

const COLLECTION: &str = "api/v2/catalog/entity";

const DEFAULT_NAMESPACE: &str = "default";

/// The reference of an entity document, e.g. `service:default/cart`.
pub fn entity_reference(entity: &Value) -> Option<String> {
    let kind = entity.get("kind").and_then(Value::as_str).filter(|k| !k.is_empty())?;
    let metadata = entity.get("metadata")?;
    let name = metadata
        .get("name")
        .and_then(Value::as_str)
        .filter(|n| !n.is_empty())?;
    let namespace = metadata
        .get("namespace")
        .and_then(Value::as_str)
        .unwrap_or(DEFAULT_NAMESPACE);
    Some(format!("{kind}:{namespace}/{name}"))
}

fn api_major_version(version: &str) -> Option<u64> {
    version
        .trim()
        .trim_start_matches('v')
        .split('.')
        .next()?
        .parse()
        .ok()
}

fn entity_is_valid() -> Validator {
    Validator::new(|value| {
        let Some(text) = value.as_str() else {
            return vec![];
        };
        let entity: Value = match serde_yaml::from_str(text) {
            Ok(entity) => entity,
            Err(err) => return vec![format!("invalid YAML: {err}")],
        };
        if !entity.is_object() {
            return vec!["expected a YAML mapping".to_string()];
        }

        let mut problems = Vec::new();
        match entity.get("apiVersion").and_then(Value::as_str) {
            None => problems.push("apiVersion is missing".to_string()),
            Some(version) => match api_major_version(version) {
                Some(major) if major >= 3 => {},
                Some(_) => problems.push(format!("apiVersion v3 or above is required, got {version}")),
                None => problems.push(format!("invalid apiVersion {version:?}")),
            },
        }
        if entity.get("kind").and_then(Value::as_str).unwrap_or_default().is_empty() {
            problems.push("kind is missing".to_string());
        }
        if entity
            .pointer("/metadata/name")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .is_empty()
        {
            problems.push("metadata.name is missing".to_string());
        }
        problems
    })
}

/// The entity carried by an upsert or lookup response.
fn included_entity(wire: &Value) -> Option<&Value> {
    wire.get("included")?
        .as_array()?
        .first()?
        .pointer("/attributes/schema")
        .filter(|schema| schema.is_object())
}

/// A Software Catalog entity managed as a YAML document.
#[derive(Debug, Clone)]
pub struct SoftwareCatalog {
    scrubber: Scrubber,
}

impl Default for SoftwareCatalog {
    fn default() -> Self {
        Self::new()
    }
}

impl SoftwareCatalog {
    /// Create the resource with the entity scrubber.
    pub fn new() -> Self {
        Self {
            scrubber: Scrubber::yaml().computed("metadata.managed"),
        }
    }

    /// The scrubber applied to both configuration and responses.
    pub fn scrubber(&self) -> &Scrubber {
        &self.scrubber
    }
}

#[async_trait]
impl Resource for SoftwareCatalog {
    fn type_name(&self) -> &'static str {
        "datadog_software_catalog"
    }

    fn schema(&self) -> Schema {
        Schema::v0()
            .with_description("An entity in the Datadog Software Catalog.")
            .with_attribute(
                "entity",
                Attribute::required_string()
                    .with_description("The YAML definition of the entity (schema v3 or above).")
                    .with_validator(entity_is_valid())
                    .with_normalizer(self.scrubber.normalizer()),
            )
    }

    fn create_endpoint(&self, _desired: &InstanceState) -> Result<ApiRequest, ProviderError> {
        Ok(ApiRequest::post(COLLECTION))
    }

    fn read_endpoint(&self, id: &str) -> Result<ApiRequest, ProviderError> {
        Ok(ApiRequest::get(COLLECTION)
            .query("filter[ref]", id)
            .query("include", "schema"))
    }

    fn update_endpoint(&self, _id: &str, _desired: &InstanceState) -> Result<ApiRequest, ProviderError> {
        Ok(ApiRequest::post(COLLECTION))
    }

    fn delete_endpoint(&self, id: &str) -> Result<Option<ApiRequest>, ProviderError> {
        Ok(Some(ApiRequest::delete(COLLECTION).segment(id)))
    }

    fn build_request(&self, desired: &InstanceState) -> Result<RequestBody, ProviderError> {
        Ok(RequestBody::raw_yaml(desired.require_str("entity")?))
    }

    fn write_state(&self, wire: &Value, state: &mut InstanceState) -> Vec<Diagnostic> {
        let Some(entity) = included_entity(wire) else {
            return vec![Diagnostic::error("Datadog response carried no entity")
                .with_detail("expected `included[0].attributes.schema`")
                .with_attribute("entity")];
        };
        match self.scrubber.scrub_parsed(entity) {
            Ok(document) => {
                state.set("entity", Value::String(document));
                Vec::new()
            },
            Err(err) => vec![Diagnostic::error("Could not read the entity returned by Datadog")
                .with_detail(err.to_string())
                .with_attribute("entity")],
        }
    }

    fn id_from_response(&self, wire: &Value, _desired: &InstanceState) -> Option<String> {
        included_entity(wire).and_then(entity_reference)
    }

    async fn read_remote(
        &self,
        client: &DatadogClient,
        id: &str,
        deadline: Instant,
    ) -> Result<Option<Value>, ProviderError> {
        let request = self.read_endpoint(id)?;
        let context = format!("error retrieving entity with reference {id}");
        let wire = match client.send(&request, deadline, &context).await {
            Ok(response) => response.body_json()?,
            Err(err) if err.is_absent() => return Ok(None),
            Err(err) => return Err(err),
        };
        Ok(included_entity(&wire).is_some().then_some(wire))
    }

    fn replace_paths(&self, prior: &InstanceState, desired: &Map<String, Value>) -> Vec<String> {
        let reference = |entity: &Value| entity_reference(entity).map(Value::String);
        match (
            prior.get_str("entity"),
            desired.get("entity").and_then(Value::as_str),
        ) {
            (Some(old), Some(new)) if identity_changed(&self.scrubber, old, new, reference) => {
                vec!["entity".to_string()]
            },
            _ => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::{plan_change, ResourceDriver};
    use crate::resources::test_support::{client, state, timeouts};
    use crate::testing::{
        assert_error_contains, assert_plan_no_changes, assert_plan_replaces,
        assert_plan_updates_in_place, FakeDatadogApi,
    };
    use crate::validation::validate;
    use reqwest::Method;
    use serde_json::json;
    use std::sync::Arc;

    const ENTITY: &str = "\
apiVersion: v3
kind: service
metadata:
  name: cart
  owner: checkout
spec:
  lifecycle: production
";

    fn config(document: &str) -> Value {
        json!({ "entity": document })
    }

    fn response(entity: Value) -> Value {
        json!({"data": [], "included": [{"id": "x", "attributes": {"schema": entity}}]})
    }

    fn stored() -> Value {
        json!({
            "apiVersion": "v3",
            "kind": "service",
            "metadata": {
                "name": "cart",
                "owner": "checkout",
                "managed": {"createdAt": "2024-05-01T00:00:00Z"}
            },
            "spec": {"lifecycle": "production"}
        })
    }

    #[test]
    fn test_reference() {
        let entity: Value = serde_yaml::from_str(ENTITY).unwrap();
        assert_eq!(entity_reference(&entity).as_deref(), Some("service:default/cart"));

        let namespaced = json!({"kind": "team", "metadata": {"name": "a", "namespace": "ops"}});
        assert_eq!(entity_reference(&namespaced).as_deref(), Some("team:ops/a"));
        assert_eq!(entity_reference(&json!({"kind": "team"})), None);
    }

    #[test]
    fn test_validation() {
        let schema = SoftwareCatalog::new().schema();
        assert!(validate(&schema, &config(ENTITY)).is_empty());

        let v2 = ENTITY.replace("apiVersion: v3", "apiVersion: v2.2");
        assert_error_contains(&validate(&schema, &config(&v2)), "v3 or above");

        let kindless = "apiVersion: v3\nmetadata:\n  name: cart\n";
        assert_error_contains(&validate(&schema, &config(kindless)), "kind is missing");
    }

    #[test]
    fn test_scrub_drops_managed_metadata() {
        let resource = SoftwareCatalog::new();
        let from_server = resource.scrubber().scrub_parsed(&stored()).unwrap();
        assert_eq!(from_server, resource.scrubber().scrub(ENTITY).unwrap());
    }

    #[test]
    fn test_reference_change_forces_replacement() {
        let resource = SoftwareCatalog::new();
        let prior = state(json!({"id": "service:default/cart", "entity": ENTITY}));

        let relabelled = ENTITY.replace("production", "experimental");
        assert_plan_updates_in_place(
            &plan_change(&resource, Some(&prior), &config(&relabelled)).unwrap(),
        );

        let moved = ENTITY.replace("  name: cart", "  name: cart\n  namespace: shop");
        assert_plan_replaces(&plan_change(&resource, Some(&prior), &config(&moved)).unwrap());
    }

    #[tokio::test]
    async fn test_lifecycle() {
        let path = format!("{COLLECTION}/service:default/cart");
        let api = Arc::new(
            FakeDatadogApi::new()
                .on(Method::POST, COLLECTION, 200, response(stored()))
                .on(Method::GET, COLLECTION, 200, response(stored()))
                .with_object(&path, json!({})),
        );
        let client = client(api.clone());
        let resource = SoftwareCatalog::new();
        let driver = ResourceDriver::new(&resource, &client).with_timeouts(timeouts());

        let created = driver.create(state(config(ENTITY))).await.unwrap();
        assert_eq!(created.id, "service:default/cart");
        assert_plan_no_changes(&driver.plan(Some(&created), &config(ENTITY)).unwrap());

        let lookup = &api.requests()[1];
        assert_eq!(lookup.method, Method::GET);
        assert!(lookup
            .query
            .contains(&("filter[ref]".to_string(), "service:default/cart".to_string())));

        driver.delete(created).await.unwrap();
        assert!(api.object(&path).is_none());
    }

    #[tokio::test]
    async fn test_empty_lookup_is_absent() {
        let api = Arc::new(FakeDatadogApi::new().on(
            Method::GET,
            COLLECTION,
            200,
            json!({"data": [], "included": []}),
        ));
        let client = client(api);
        let resource = SoftwareCatalog::new();
        let driver = ResourceDriver::new(&resource, &client).with_timeouts(timeouts());

        let prior = state(json!({"id": "service:default/cart", "entity": ENTITY}));
        let refreshed = driver.read(prior).await.unwrap();
        assert!(!refreshed.is_present());
        assert_eq!(refreshed.get_str("entity"), Some(ENTITY));
        assert!(!driver.exists("service:default/cart").await.unwrap());
    }
}
