//! `datadog_role`: look up an existing role by name.

use async_trait::async_trait;
use serde_json::Value;
use tokio::time::Instant;
use tracing::instrument;

use crate::client::{ApiRequest, DatadogClient};
use crate::codec::typed::{id_string, StateWriter};
use crate::data_source::DataSource;
use crate::error::ProviderError;
use crate::schema::{Attribute, Diagnostic, Schema};
use crate::state::InstanceState;
use crate::validation::{diagnostics_to_error, string_not_blank};

const COLLECTION: &str = "api/v2/roles";

/// Finds a role by name.
#[derive(Debug, Clone, Copy, Default)]
pub struct RoleLookup;

/// Pick the role `filter` designates: the only result, or the single result
/// whose name matches exactly.
fn select<'a>(roles: &'a [Value], filter: &str) -> Result<&'a Value, ProviderError> {
    fn name_of(role: &Value) -> Option<&str> {
        role.pointer("/attributes/name").and_then(Value::as_str)
    }
    match roles {
        [] => Err(ProviderError::NotFound(format!(
            "no role found matching filter {filter:?}"
        ))),
        [only] => Ok(only),
        _ => {
            let mut exact = roles.iter().filter(|role| name_of(*role) == Some(filter));
            match (exact.next(), exact.next()) {
                (Some(role), None) => Ok(role),
                _ => Err(ProviderError::Validation(format!(
                    "your query returned more than one result for filter {filter:?}, please try a more specific search criteria"
                ))),
            }
        },
    }
}

#[async_trait]
impl DataSource for RoleLookup {
    fn type_name(&self) -> &'static str {
        "datadog_role"
    }

    fn schema(&self) -> Schema {
        Schema::v0()
            .with_description("Use this data source to retrieve an existing role.")
            .with_attribute(
                "filter",
                Attribute::required_string()
                    .with_description("A string on which to filter the roles.")
                    .with_validator(string_not_blank()),
            )
            .with_attribute(
                "name",
                Attribute::computed_string().with_description("Name of the role."),
            )
            .with_attribute(
                "user_count",
                Attribute::computed_int64().with_description("Number of users assigned to the role."),
            )
    }

    #[instrument(skip_all, name = "datadog_role.read")]
    async fn read(
        &self,
        client: &DatadogClient,
        config: &InstanceState,
        deadline: Instant,
    ) -> Result<InstanceState, ProviderError> {
        let filter = config.require_str("filter")?;
        let request = ApiRequest::get(COLLECTION).query("filter", filter);
        let wire = client
            .send(&request, deadline, "error querying roles")
            .await?
            .body_json()?;

        let roles = wire
            .get("data")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default();
        let role = select(roles, filter)?;

        let id = role.get("id").and_then(id_string).ok_or_else(|| {
            ProviderError::Internal("role in response carries no id".to_string())
        })?;
        let attributes = role
            .get("attributes")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();

        let mut state = config.clone();
        state.id = id;
        let diagnostics: Vec<Diagnostic> = {
            let mut writer = StateWriter::new(&attributes, &mut state);
            writer.string("name", "name").int("user_count", "user_count");
            writer.finish()
        };
        if let Some(err) = diagnostics_to_error(&diagnostics) {
            return Err(err);
        }
        Ok(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::test_support::{client, state};
    use crate::testing::FakeDatadogApi;
    use reqwest::Method;
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;

    fn role(id: &str, name: &str, users: i64) -> Value {
        json!({"id": id, "type": "roles", "attributes": {"name": name, "user_count": users}})
    }

    async fn lookup(roles: Vec<Value>, filter: &str) -> Result<InstanceState, ProviderError> {
        let api = Arc::new(FakeDatadogApi::new().on(
            Method::GET,
            COLLECTION,
            200,
            json!({ "data": roles }),
        ));
        let client = client(api);
        let deadline = Instant::now() + Duration::from_secs(2);
        RoleLookup
            .read(&client, &state(json!({ "filter": filter })), deadline)
            .await
    }

    #[tokio::test]
    async fn test_single_result() {
        let found = lookup(vec![role("r1", "Datadog Admin Role", 4)], "admin")
            .await
            .unwrap();
        assert_eq!(found.id, "r1");
        assert_eq!(found.get_str("name"), Some("Datadog Admin Role"));
        assert_eq!(found.get("user_count"), Some(&json!(4)));
    }

    #[tokio::test]
    async fn test_exact_match_wins() {
        let roles = vec![
            role("r1", "Datadog Read Only Role", 10),
            role("r2", "Datadog Read Only Role Extended", 1),
        ];
        let found = lookup(roles, "Datadog Read Only Role").await.unwrap();
        assert_eq!(found.id, "r1");
    }

    #[tokio::test]
    async fn test_ambiguous_and_missing() {
        let roles = vec![role("r1", "ops a", 1), role("r2", "ops b", 1)];
        let err = lookup(roles, "ops").await.unwrap_err();
        assert!(matches!(err, ProviderError::Validation(_)));

        let err = lookup(Vec::new(), "ops").await.unwrap_err();
        assert!(matches!(err, ProviderError::NotFound(_)));
    }
}
