//! `datadog_service_definition_yaml`: a service catalog definition supplied
//! as a YAML document (schema `v2` or `v2.1`).
//!
//! Datadog upserts definitions: create and update both `POST` the document
//! to the collection, and the service name is the ID.

use serde_json::{Map, Value};

use crate::client::{ApiRequest, RequestBody};
use crate::codec::opaque::{identity_changed, Scrubber};
use crate::codec::typed::{flatten_envelope, normalize_tag};
use crate::error::ProviderError;
use crate::resource::Resource;
use crate::schema::{Attribute, Diagnostic, Schema, Validator};
use crate::state::InstanceState;

const COLLECTION: &str = "api/v2/services/definitions";

const SUPPORTED_VERSIONS: &[&str] = &["v2", "v2.1"];

/// Lists whose entries are identified by `name`.
const NAMED_LISTS: &[&str] = &["docs", "links", "repos"];

fn string_field<'a>(object: &'a Map<String, Value>, key: &str) -> &'a str {
    object.get(key).and_then(Value::as_str).unwrap_or_default()
}

fn sort_by_name(items: &mut [Value]) {
    items.sort_by(|a, b| {
        let name = |v: &Value| v.get("name").and_then(Value::as_str).map(str::to_string);
        name(a).cmp(&name(b))
    });
}

fn prepare_service_definition(document: &mut Value) {
    let Some(definition) = document.as_object_mut() else {
        return;
    };

    // Derived from the team field on ingest.
    definition.remove("dd-team");

    for key in NAMED_LISTS {
        match definition.get_mut(*key) {
            Some(Value::Array(items)) if items.is_empty() => {
                definition.remove(*key);
            },
            Some(Value::Array(items)) => sort_by_name(items),
            _ => {},
        }
    }

    if let Some(Value::String(service)) = definition.get_mut("dd-service") {
        *service = normalize_tag(service);
    }

    match definition.get_mut("tags") {
        Some(Value::Array(tags)) if tags.is_empty() => {
            definition.remove("tags");
        },
        Some(Value::Array(tags)) => {
            let mut normalized: Vec<String> = tags
                .iter()
                .filter_map(Value::as_str)
                .map(normalize_tag)
                .collect();
            normalized.sort();
            *tags = normalized.into_iter().map(Value::String).collect();
        },
        _ => {},
    }

    match definition.get_mut("contacts") {
        Some(Value::Array(contacts)) if contacts.is_empty() => {
            definition.remove("contacts");
        },
        Some(Value::Array(contacts)) => {
            let empty = Map::new();
            contacts.sort_by_cached_key(|contact| {
                let contact = contact.as_object().unwrap_or(&empty);
                (
                    string_field(contact, "type").to_string(),
                    string_field(contact, "contact").to_string(),
                    string_field(contact, "name").to_string(),
                )
            });
        },
        _ => {},
    }

    if definition.get("team").and_then(Value::as_str) == Some("") {
        definition.remove("team");
    }
    for key in ["extensions", "integrations"] {
        if definition
            .get(key)
            .and_then(Value::as_object)
            .is_some_and(Map::is_empty)
        {
            definition.remove(key);
        }
    }
}

fn definition_is_valid() -> Validator {
    Validator::new(|value| {
        let Some(text) = value.as_str() else {
            return vec![];
        };
        let definition: Value = match serde_yaml::from_str(text) {
            Ok(definition) => definition,
            Err(err) => return vec![format!("invalid YAML: {err}")],
        };
        let Some(definition) = definition.as_object() else {
            return vec!["expected a YAML mapping".to_string()];
        };
        if definition.contains_key("apiVersion") {
            return vec![
                "Backstage entity definitions are not supported here; use datadog_software_catalog"
                    .to_string(),
            ];
        }

        let mut problems = Vec::new();
        match definition.get("schema-version").and_then(Value::as_str) {
            Some(version) if SUPPORTED_VERSIONS.contains(&version) => {},
            Some(version) => problems.push(format!(
                "schema-version must be one of {}, but {version} is used",
                SUPPORTED_VERSIONS.join(", ")
            )),
            None => problems.push("schema-version is missing".to_string()),
        }
        if string_field(definition, "dd-service").is_empty() {
            problems.push("dd-service is missing".to_string());
        }
        problems
    })
}

fn service_name(document: &Value) -> Option<Value> {
    document
        .get("dd-service")
        .and_then(Value::as_str)
        .map(|service| Value::String(normalize_tag(service)))
}

/// A service definition managed as a YAML document.
#[derive(Debug, Clone)]
pub struct ServiceDefinitionYaml {
    scrubber: Scrubber,
}

impl Default for ServiceDefinitionYaml {
    fn default() -> Self {
        Self::new()
    }
}

impl ServiceDefinitionYaml {
    /// Create the resource with the service definition scrubber.
    pub fn new() -> Self {
        Self {
            scrubber: Scrubber::yaml().with_hook(prepare_service_definition),
        }
    }

    /// The scrubber applied to both configuration and responses.
    pub fn scrubber(&self) -> &Scrubber {
        &self.scrubber
    }

    fn schema_of(wire: &Value) -> Result<&Value, ProviderError> {
        flatten_envelope(wire)?
            .attributes
            .get("schema")
            .ok_or_else(|| {
                ProviderError::Internal("response is missing `data.attributes.schema`".to_string())
            })
    }
}

impl Resource for ServiceDefinitionYaml {
    fn type_name(&self) -> &'static str {
        "datadog_service_definition_yaml"
    }

    fn schema(&self) -> Schema {
        Schema::v0()
            .with_description("A service definition in the Datadog Service Catalog.")
            .with_attribute(
                "service_definition",
                Attribute::required_string()
                    .with_description("The YAML or JSON formatted definition of the service.")
                    .with_validator(definition_is_valid())
                    .with_normalizer(self.scrubber.normalizer()),
            )
    }

    fn create_endpoint(&self, _desired: &InstanceState) -> Result<ApiRequest, ProviderError> {
        Ok(ApiRequest::post(COLLECTION))
    }

    fn read_endpoint(&self, id: &str) -> Result<ApiRequest, ProviderError> {
        Ok(ApiRequest::get(COLLECTION).segment(id))
    }

    fn update_endpoint(&self, _id: &str, _desired: &InstanceState) -> Result<ApiRequest, ProviderError> {
        Ok(ApiRequest::post(COLLECTION))
    }

    fn delete_endpoint(&self, id: &str) -> Result<Option<ApiRequest>, ProviderError> {
        Ok(Some(ApiRequest::delete(COLLECTION).segment(id)))
    }

    fn build_request(&self, desired: &InstanceState) -> Result<RequestBody, ProviderError> {
        Ok(RequestBody::raw_yaml(desired.require_str("service_definition")?))
    }

    fn write_state(&self, wire: &Value, state: &mut InstanceState) -> Vec<Diagnostic> {
        let rendered = Self::schema_of(wire).and_then(|schema| self.scrubber.scrub_parsed(schema));
        match rendered {
            Ok(document) => {
                state.set("service_definition", Value::String(document));
                Vec::new()
            },
            Err(err) => vec![Diagnostic::error(
                "Could not read the service definition returned by Datadog",
            )
            .with_detail(err.to_string())
            .with_attribute("service_definition")],
        }
    }

    fn id_from_response(&self, wire: &Value, _desired: &InstanceState) -> Option<String> {
        Self::schema_of(wire)
            .ok()?
            .get("dd-service")
            .and_then(Value::as_str)
            .map(str::to_string)
    }

    fn replace_paths(&self, prior: &InstanceState, desired: &Map<String, Value>) -> Vec<String> {
        match (
            prior.get_str("service_definition"),
            desired.get("service_definition").and_then(Value::as_str),
        ) {
            (Some(old), Some(new)) if identity_changed(&self.scrubber, old, new, service_name) => {
                vec!["service_definition".to_string()]
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

    const DEFINITION: &str = "\
schema-version: v2.1
dd-service: Shopping Cart
team: ''
dd-team: checkout
tags:
  - Env:Prod
  - team:checkout
contacts:
  - type: slack
    contact: https://slack.example.com/checkout
  - type: email
    contact: checkout@example.com
links:
  - name: Runbook
    type: runbook
    url: https://wiki.example.com/runbook
  - name: Architecture
    type: doc
    url: https://wiki.example.com/arch
extensions: {}
";

    fn config(document: &str) -> Value {
        json!({ "service_definition": document })
    }

    #[test]
    fn test_scrubber_canonicalizes() {
        let resource = ServiceDefinitionYaml::new();
        let scrubbed: Value =
            serde_yaml::from_str(&resource.scrubber().scrub(DEFINITION).unwrap()).unwrap();

        assert_eq!(scrubbed["dd-service"], json!("shopping_cart"));
        assert_eq!(scrubbed["tags"], json!(["env:prod", "team:checkout"]));
        assert_eq!(scrubbed["contacts"][0]["type"], json!("email"));
        assert_eq!(scrubbed["links"][0]["name"], json!("Architecture"));
        assert!(scrubbed.get("dd-team").is_none());
        assert!(scrubbed.get("team").is_none());
        assert!(scrubbed.get("extensions").is_none());
    }

    #[test]
    fn test_scrubber_is_idempotent() {
        let scrubber = ServiceDefinitionYaml::new().scrubber().clone();
        let once = scrubber.scrub(DEFINITION).unwrap();
        assert_eq!(scrubber.scrub(&once).unwrap(), once);
    }

    #[test]
    fn test_scrubber_is_idempotent_for_capped_names() {
        let long = format!("{}!b", "a".repeat(199));
        let document = format!(
            "schema-version: v2.1\ndd-service: '{long}'\ntags:\n  - 'env:{long}'\n"
        );
        let scrubber = ServiceDefinitionYaml::new().scrubber().clone();
        let once = scrubber.scrub(&document).unwrap();
        assert_eq!(scrubber.scrub(&once).unwrap(), once);

        let scrubbed: Value = serde_yaml::from_str(&once).unwrap();
        assert_eq!(scrubbed["dd-service"], json!("a".repeat(199)));
    }

    #[test]
    fn test_validation() {
        let schema = ServiceDefinitionYaml::new().schema();
        assert!(validate(&schema, &config(DEFINITION)).is_empty());

        let old = validate(&schema, &config("schema-version: v1\ndd-service: cart\n"));
        assert_error_contains(&old, "schema-version must be one of");

        let nameless = validate(&schema, &config("schema-version: v2\n"));
        assert_error_contains(&nameless, "dd-service is missing");

        let backstage = validate(
            &schema,
            &config("apiVersion: backstage.io/v1alpha1\nkind: Component\n"),
        );
        assert_error_contains(&backstage, "datadog_software_catalog");
    }

    #[test]
    fn test_service_rename_forces_replacement() {
        let resource = ServiceDefinitionYaml::new();
        let prior = state(json!({"id": "shopping_cart", "service_definition": DEFINITION}));

        let cosmetic = DEFINITION.replace("Shopping Cart", "shopping cart");
        assert_plan_no_changes(&plan_change(&resource, Some(&prior), &config(&cosmetic)).unwrap());

        let relinked = DEFINITION.replace("name: Runbook", "name: Playbook");
        assert_plan_updates_in_place(
            &plan_change(&resource, Some(&prior), &config(&relinked)).unwrap(),
        );

        let renamed = DEFINITION.replace("Shopping Cart", "Basket");
        assert_plan_replaces(&plan_change(&resource, Some(&prior), &config(&renamed)).unwrap());
    }

    #[tokio::test]
    async fn test_create_posts_and_reads_back() {
        let stored = json!({
            "schema-version": "v2.1",
            "dd-service": "shopping_cart",
            "dd-team": "checkout",
            "tags": ["env:prod", "team:checkout"],
            "contacts": [
                {"type": "email", "contact": "checkout@example.com"},
                {"type": "slack", "contact": "https://slack.example.com/checkout"}
            ],
            "links": [
                {"name": "Architecture", "type": "doc", "url": "https://wiki.example.com/arch"},
                {"name": "Runbook", "type": "runbook", "url": "https://wiki.example.com/runbook"}
            ]
        });
        let api = Arc::new(
            FakeDatadogApi::new()
                .on(
                    Method::POST,
                    COLLECTION,
                    200,
                    json!({"data": [{"attributes": {"schema": stored.clone()}}]}),
                )
                .with_object(
                    &format!("{COLLECTION}/shopping_cart"),
                    json!({"data": {"attributes": {"schema": stored}}}),
                ),
        );
        let client = client(api.clone());
        let resource = ServiceDefinitionYaml::new();
        let driver = ResourceDriver::new(&resource, &client).with_timeouts(timeouts());

        let created = driver.create(state(config(DEFINITION))).await.unwrap();
        assert_eq!(created.id, "shopping_cart");
        assert_plan_no_changes(&driver.plan(Some(&created), &config(DEFINITION)).unwrap());

        let posted = api.requests()[0].body_value().unwrap();
        assert_eq!(posted["dd-service"], json!("Shopping Cart"));

        let deleted = driver.delete(created).await.unwrap();
        assert!(!deleted.is_present());
        assert_eq!(api.count(Method::DELETE), 1);
    }
}
