//! `datadog_monitors`: monitors matching a name or tag search.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::time::Instant;
use tracing::{debug, instrument};

use crate::client::{ApiRequest, DatadogClient};
use crate::codec::typed::id_string;
use crate::data_source::DataSource;
use crate::error::ProviderError;
use crate::identity::query_hash_id;
use crate::schema::{Attribute, AttributeFlags, AttributeType, Schema};
use crate::state::InstanceState;

const COLLECTION: &str = "api/v1/monitor";

/// Filter attributes and the query parameter each one becomes.
const FILTERS: &[(&str, &str)] = &[
    ("name_filter", "name"),
    ("tags_filter", "tags"),
    ("monitor_tags_filter", "monitor_tags"),
];

/// Lists monitors by name and tags.
#[derive(Debug, Clone, Copy, Default)]
pub struct Monitors;

impl Monitors {
    /// `(attribute, query parameter, value)` for every filter that is set.
    /// Tag lists are joined with commas.
    fn filters(config: &InstanceState) -> Vec<(&'static str, &'static str, String)> {
        FILTERS
            .iter()
            .filter_map(|(attr, param)| {
                let value = match config.get(attr)? {
                    Value::String(s) if !s.is_empty() => s.clone(),
                    Value::Array(items) if !items.is_empty() => items
                        .iter()
                        .filter_map(Value::as_str)
                        .collect::<Vec<_>>()
                        .join(","),
                    _ => return None,
                };
                Some((*attr, *param, value))
            })
            .collect()
    }

    fn summary(monitor: &Value) -> Option<Value> {
        let id = monitor.get("id").and_then(id_string)?;
        let id: i64 = id.parse().ok()?;
        Some(json!({
            "id": id,
            "name": monitor.get("name").cloned().unwrap_or(Value::Null),
            "type": monitor.get("type").cloned().unwrap_or(Value::Null),
        }))
    }
}

#[async_trait]
impl DataSource for Monitors {
    fn type_name(&self) -> &'static str {
        "datadog_monitors"
    }

    fn schema(&self) -> Schema {
        let tag_list = || {
            Attribute::new(
                AttributeType::list(AttributeType::String),
                AttributeFlags::optional(),
            )
        };
        let summary = AttributeType::object(BTreeMap::from([
            ("id".to_string(), AttributeType::Int64),
            ("name".to_string(), AttributeType::String),
            ("type".to_string(), AttributeType::String),
        ]));

        Schema::v0()
            .with_description("Use this data source to list monitors for use in other resources.")
            .with_attribute(
                "name_filter",
                Attribute::optional_string().with_description("A monitor name to limit the search."),
            )
            .with_attribute(
                "tags_filter",
                tag_list().with_description("Scope tags to limit the search."),
            )
            .with_attribute(
                "monitor_tags_filter",
                tag_list().with_description("Monitor tags to limit the search."),
            )
            .with_attribute(
                "monitors",
                Attribute::new(AttributeType::list(summary), AttributeFlags::computed())
                    .with_description("The matching monitors."),
            )
    }

    #[instrument(skip_all, name = "datadog_monitors.read")]
    async fn read(
        &self,
        client: &DatadogClient,
        config: &InstanceState,
        deadline: Instant,
    ) -> Result<InstanceState, ProviderError> {
        let filters = Self::filters(config);
        let request = filters
            .iter()
            .fold(ApiRequest::get(COLLECTION), |request, (_, param, value)| {
                request.query(*param, value.as_str())
            });

        let response = client
            .send(&request, deadline, "error querying monitors")
            .await?;
        let monitors = match response.body_json()? {
            Value::Array(monitors) => monitors,
            other => {
                return Err(ProviderError::Internal(format!(
                    "expected a list of monitors, got {other}"
                )))
            },
        };
        if monitors.is_empty() {
            return Err(ProviderError::NotFound(
                "your query returned no result, please try a less specific search criteria"
                    .to_string(),
            ));
        }
        debug!(count = monitors.len(), "monitors found");

        let mut state = config.clone();
        state.id = query_hash_id(filters.iter().map(|(attr, _, value)| (*attr, value.as_str())));
        state.set(
            "monitors",
            Value::Array(monitors.iter().filter_map(Self::summary).collect()),
        );
        Ok(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::test_support::{client, state};
    use crate::testing::FakeDatadogApi;
    use crate::validation::validate;
    use std::sync::Arc;
    use std::time::Duration;

    fn deadline() -> Instant {
        Instant::now() + Duration::from_secs(2)
    }

    fn listing() -> Value {
        json!([
            {"id": 12, "name": "cpu high", "type": "metric alert", "query": "avg:cpu{*} > 90"},
            {"id": 15, "name": "cpu low", "type": "query alert", "query": "avg:cpu{*} < 5"}
        ])
    }

    #[test]
    fn test_monitors_is_computed() {
        let schema = Monitors.schema();
        let diagnostics = validate(&schema, &json!({"monitors": []}));
        assert_eq!(diagnostics.len(), 1);
        assert!(validate(&schema, &json!({"tags_filter": ["env:prod"]})).is_empty());
    }

    #[tokio::test]
    async fn test_read_sends_filters_and_summarizes() {
        let api = Arc::new(FakeDatadogApi::new().on(
            reqwest::Method::GET,
            COLLECTION,
            200,
            listing(),
        ));
        let client = client(api.clone());
        let config = state(json!({
            "name_filter": "cpu",
            "tags_filter": ["env:prod", "team:core"]
        }));

        let result = Monitors.read(&client, &config, deadline()).await.unwrap();
        assert_eq!(
            result.get("monitors"),
            Some(&json!([
                {"id": 12, "name": "cpu high", "type": "metric alert"},
                {"id": 15, "name": "cpu low", "type": "query alert"}
            ]))
        );
        assert_eq!(
            result.id,
            query_hash_id([("name_filter", "cpu"), ("tags_filter", "env:prod,team:core")])
        );

        let query = &api.requests()[0].query;
        assert!(query.contains(&("name".to_string(), "cpu".to_string())));
        assert!(query.contains(&("tags".to_string(), "env:prod,team:core".to_string())));
        assert!(!query.iter().any(|(k, _)| k == "monitor_tags"));
    }

    #[tokio::test]
    async fn test_id_is_stable_across_reads() {
        let api = Arc::new(FakeDatadogApi::new().on(
            reqwest::Method::GET,
            COLLECTION,
            200,
            listing(),
        ));
        let client = client(api);
        let config = state(json!({"monitor_tags_filter": ["service:web"]}));

        let first = Monitors.read(&client, &config, deadline()).await.unwrap();
        let second = Monitors.read(&client, &config, deadline()).await.unwrap();
        assert_eq!(first.id, second.id);
        assert!(!first.id.is_empty());
    }

    #[tokio::test]
    async fn test_no_result_is_an_error() {
        let api = Arc::new(FakeDatadogApi::new().on(
            reqwest::Method::GET,
            COLLECTION,
            200,
            json!([]),
        ));
        let client = client(api);

        let err = Monitors
            .read(&client, &state(json!({"name_filter": "nothing"})), deadline())
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::NotFound(_)));
    }
}
