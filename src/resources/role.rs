//! `datadog_role`: a custom role and the permissions it grants.

use serde_json::{json, Map, Value};

use crate::client::{ApiRequest, RequestBody};
use crate::codec::typed::{flatten_envelope, jsonapi_document, StateWriter, WireBuilder};
use crate::error::ProviderError;
use crate::resource::Resource;
use crate::schema::{Attribute, Diagnostic, Schema};
use crate::state::InstanceState;
use crate::validation::string_not_blank;

const COLLECTION: &str = "api/v2/roles";

/// JSON:API relationship linking `kind` objects by ID.
pub(crate) fn relationship(kind: &str, ids: &[Value]) -> Value {
    let data: Vec<Value> = ids
        .iter()
        .filter_map(Value::as_str)
        .map(|id| json!({"type": kind, "id": id}))
        .collect();
    json!({ "data": data })
}

/// IDs of a JSON:API relationship, sorted. `None` when the relationship is
/// absent or empty.
pub(crate) fn relationship_ids(
    relationships: Option<&Map<String, Value>>,
    name: &str,
) -> Option<Vec<Value>> {
    let mut ids: Vec<Value> = relationships?
        .get(name)?
        .get("data")?
        .as_array()?
        .iter()
        .filter_map(|item| item.get("id").and_then(Value::as_str))
        .map(|id| Value::String(id.to_string()))
        .collect();
    if ids.is_empty() {
        return None;
    }
    ids.sort_by(|a, b| a.as_str().cmp(&b.as_str()));
    Some(ids)
}

/// A role.
#[derive(Debug, Clone, Copy, Default)]
pub struct Role;

impl Role {
    fn document(desired: &InstanceState, id: Option<&str>) -> Value {
        let attributes = WireBuilder::new(desired).copy("name").build();

        let mut relationships = Map::new();
        if let Some(Value::Array(permissions)) = desired.get("permissions") {
            relationships.insert(
                "permissions".to_string(),
                relationship("permissions", permissions),
            );
        }
        jsonapi_document("roles", id, attributes, Some(relationships))
    }
}

impl Resource for Role {
    fn type_name(&self) -> &'static str {
        "datadog_role"
    }

    fn schema(&self) -> Schema {
        Schema::v0()
            .with_description("A Datadog role.")
            .with_attribute(
                "name",
                Attribute::required_string()
                    .with_description("Name of the role.")
                    .with_validator(string_not_blank()),
            )
            .with_attribute(
                "permissions",
                Attribute::optional_string_set().with_description("IDs of granted permissions."),
            )
            .with_attribute(
                "user_count",
                Attribute::computed_int64().with_description("Number of users with the role."),
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
            .int("user_count", "user_count")
            .set(
                "permissions",
                relationship_ids(envelope.relationships, "permissions")
                    .map(Value::Array)
                    .unwrap_or(Value::Null),
            );
        writer.finish()
    }
}
