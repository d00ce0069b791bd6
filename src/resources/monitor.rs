//! `datadog_monitor`: a monitor modelled attribute by attribute.

use serde_json::{json, Map, Number, Value};

use crate::client::{ApiRequest, RequestBody};
use crate::codec::typed::{unwrap_single, wrap_single, StateWriter, WireBuilder};
use crate::error::ProviderError;
use crate::resource::Resource;
use crate::schema::{
    Attribute, AttributeFlags, AttributeType, Block, Diagnostic, DiffSuppressor, NestedBlock,
    Schema, StateNormalizer, Validator,
};
use crate::state::InstanceState;
use crate::validation::{int_between, string_not_blank};

use super::unexpected_response;

const COLLECTION: &str = "api/v1/monitor";

/// Monitor types accepted by the v1 monitor API.
pub const MONITOR_TYPES: &[&str] = &[
    "audit alert",
    "ci-pipelines alert",
    "ci-tests alert",
    "composite",
    "cost alert",
    "database-monitoring alert",
    "error-tracking alert",
    "event alert",
    "event-v2 alert",
    "log alert",
    "metric alert",
    "network-performance alert",
    "process alert",
    "query alert",
    "rum alert",
    "service check",
    "slo alert",
    "synthetics alert",
    "trace-analytics alert",
];

/// Threshold fields under `options.thresholds`.
const THRESHOLDS: &[&str] = &[
    "critical",
    "critical_recovery",
    "ok",
    "unknown",
    "warning",
    "warning_recovery",
];

/// Boolean and integer fields under `options`.
const OPTIONS: &[&str] = &[
    "evaluation_delay",
    "include_tags",
    "new_group_delay",
    "notify_audit",
    "notify_no_data",
    "renotify_interval",
    "require_full_window",
    "timeout_h",
];

/// Datadog reports `query alert` monitors as `metric alert` and accepts
/// either on write.
pub(crate) fn canonical_monitor_type(kind: &str) -> &str {
    match kind {
        "query alert" => "metric alert",
        other => other,
    }
}

fn monitor_type_normalizer() -> StateNormalizer {
    StateNormalizer::new(|value| match value.as_str() {
        Some(kind) => Value::String(canonical_monitor_type(kind).to_string()),
        None => value.clone(),
    })
}

/// A monitor.
#[derive(Debug, Clone, Copy, Default)]
pub struct Monitor;

impl Monitor {
    fn thresholds(desired: &InstanceState) -> Result<Map<String, Value>, ProviderError> {
        let Some(block) = unwrap_single(desired.get("monitor_thresholds")) else {
            return Ok(Map::new());
        };

        let mut thresholds = Map::new();
        for name in THRESHOLDS {
            let Some(raw) = block.get(*name).and_then(Value::as_str) else {
                continue;
            };
            if raw.trim().is_empty() {
                continue;
            }
            thresholds.insert(name.to_string(), threshold_number(name, raw)?);
        }
        Ok(thresholds)
    }
}

fn threshold_number(name: &str, raw: &str) -> Result<Value, ProviderError> {
    let raw = raw.trim();
    if let Ok(n) = raw.parse::<i64>() {
        return Ok(json!(n));
    }
    raw.parse::<f64>()
        .ok()
        .and_then(Number::from_f64)
        .map(Value::Number)
        .ok_or_else(|| ProviderError::InvalidAttribute {
            attribute: format!("monitor_thresholds[0].{name}"),
            message: format!("expected a number, got {raw:?}"),
        })
}

fn threshold_attribute() -> Attribute {
    Attribute::optional_string()
        .with_validator(Validator::new(|value| match value.as_str().map(str::trim) {
            Some(s) if !s.is_empty() && s.parse::<f64>().is_err() => {
                vec![format!("expected a number, got {s:?}")]
            },
            _ => vec![],
        }))
        .with_diff_suppress(DiffSuppressor::float_int())
}

fn optional_computed(attr_type: AttributeType) -> Attribute {
    Attribute::new(attr_type, AttributeFlags::optional_computed())
}

impl Resource for Monitor {
    fn type_name(&self) -> &'static str {
        "datadog_monitor"
    }

    fn schema(&self) -> Schema {
        let thresholds = THRESHOLDS.iter().fold(
            Block::new().with_description("Alerting thresholds."),
            |block, name| block.with_attribute(*name, threshold_attribute()),
        );

        Schema::v0()
            .with_description("A Datadog monitor.")
            .with_attribute(
                "name",
                Attribute::required_string()
                    .with_description("Name of the monitor.")
                    .with_validator(string_not_blank()),
            )
            .with_attribute(
                "type",
                Attribute::required_enum(MONITOR_TYPES)
                    .with_description("Monitor type. Changing it recreates the monitor.")
                    .with_force_new()
                    .with_normalizer(monitor_type_normalizer()),
            )
            .with_attribute(
                "query",
                Attribute::required_string()
                    .with_description("The monitor query.")
                    .with_normalizer(StateNormalizer::trim()),
            )
            .with_attribute(
                "message",
                Attribute::optional_string()
                    .with_description("Notification message.")
                    .with_normalizer(StateNormalizer::trim()),
            )
            .with_attribute("tags", Attribute::optional_string_set())
            .with_attribute(
                "priority",
                Attribute::optional_int64().with_validator(int_between(1, 5)),
            )
            .with_attribute("restricted_roles", Attribute::optional_string_set())
            .with_attribute(
                "notify_no_data",
                Attribute::optional_bool().with_default(Value::Bool(false)),
            )
            .with_attribute(
                "include_tags",
                Attribute::optional_bool().with_default(Value::Bool(true)),
            )
            .with_attribute(
                "notify_audit",
                Attribute::optional_bool().with_default(Value::Bool(false)),
            )
            .with_attribute("require_full_window", optional_computed(AttributeType::Bool))
            .with_attribute("renotify_interval", optional_computed(AttributeType::Int64))
            .with_attribute("evaluation_delay", optional_computed(AttributeType::Int64))
            .with_attribute("new_group_delay", optional_computed(AttributeType::Int64))
            .with_attribute(
                "timeout_h",
                optional_computed(AttributeType::Int64).with_validator(int_between(0, 24)),
            )
            .with_block("monitor_thresholds", NestedBlock::single(thresholds))
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
        let options = OPTIONS
            .iter()
            .fold(WireBuilder::new(desired), |wire, name| wire.copy(name))
            .insert("thresholds", Value::Object(Self::thresholds(desired)?))
            .build();

        let body = WireBuilder::new(desired)
            .copy("name")
            .copy("type")
            .copy("query")
            .copy("message")
            .copy("priority")
            .copy_set_as("tags", "tags")
            .copy_set_as("restricted_roles", "restricted_roles")
            .insert("options", Value::Object(options))
            .build();
        Ok(RequestBody::Json(Value::Object(body)))
    }

    fn write_state(&self, wire: &Value, state: &mut InstanceState) -> Vec<Diagnostic> {
        let Some(object) = wire.as_object() else {
            return vec![unexpected_response("monitor", wire)];
        };

        let mut diagnostics = {
            let mut writer = StateWriter::new(object, state);
            writer
                .string("name", "name")
                .string("type", "type")
                .string("query", "query")
                .string("message", "message")
                .int("priority", "priority")
                .strings("tags", "tags")
                .strings("restricted_roles", "restricted_roles");
            writer.finish()
        };

        let empty = Map::new();
        let options = object
            .get("options")
            .and_then(Value::as_object)
            .unwrap_or(&empty);
        {
            let mut writer = StateWriter::new(options, state);
            writer
                .bool("notify_no_data", "notify_no_data")
                .bool("include_tags", "include_tags")
                .bool("notify_audit", "notify_audit")
                .bool("require_full_window", "require_full_window")
                .int("renotify_interval", "renotify_interval")
                .int("evaluation_delay", "evaluation_delay")
                .int("new_group_delay", "new_group_delay")
                .int("timeout_h", "timeout_h");
            diagnostics.extend(writer.finish());
        }

        let thresholds = options
            .get("thresholds")
            .and_then(Value::as_object)
            .unwrap_or(&empty);
        let mut block = Map::new();
        {
            let mut scratch = InstanceState::new();
            let mut writer = StateWriter::new(thresholds, &mut scratch);
            for name in THRESHOLDS {
                writer.number_as_string(name, name);
            }
            for diagnostic in writer.finish() {
                diagnostics.push(match diagnostic.attribute.clone() {
                    Some(name) => diagnostic.with_attribute(format!("monitor_thresholds[0].{name}")),
                    None => diagnostic,
                });
            }
            block.extend(scratch.attributes);
        }
        state.set(
            "monitor_thresholds",
            if block.is_empty() {
                Value::Null
            } else {
                wrap_single(block)
            },
        );

        diagnostics
    }
}
