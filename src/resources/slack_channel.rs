//! `datadog_integration_slack_channel`: a channel of a Slack integration
//! account.
//!
//! Channels have no ID of their own; they are addressed as
//! `account_name:channel_name`. Renaming a channel updates it in place and
//! moves the ID with it.

use serde_json::{Map, Value};

use crate::client::{ApiRequest, RequestBody};
use crate::codec::typed::{unwrap_single, wrap_single, StateWriter, WireBuilder};
use crate::error::ProviderError;
use crate::identity::{CompositeId, Identity};
use crate::resource::Resource;
use crate::schema::{Attribute, Block, Diagnostic, NestedBlock, Schema};
use crate::state::InstanceState;
use crate::validation::string_not_blank;

use super::unexpected_response;

const ACCOUNTS: &str = "api/v1/integration/slack/configuration/accounts";

/// `account_name:channel_name`.
pub const SLACK_CHANNEL_ID: CompositeId = CompositeId::new(&["account_name", "channel_name"], ':');

const DISPLAY_FIELDS: &[(&str, &str)] = &[
    ("message", "Show the main body of the alert event."),
    ("notified", "Show the list of @-handles in the alert event."),
    ("snapshot", "Show the alert event's snapshot image."),
    ("tags", "Show the scopes on which the monitor alerted."),
];

/// A Slack channel.
#[derive(Debug, Clone, Copy, Default)]
pub struct SlackChannel;

impl SlackChannel {
    fn channels(method: fn(&str) -> ApiRequest, account: &str) -> ApiRequest {
        method(ACCOUNTS).segment(account).segment("channels")
    }

    fn channel(method: fn(&str) -> ApiRequest, id: &str) -> Result<ApiRequest, ProviderError> {
        let parts = SLACK_CHANNEL_ID.parse(id)?;
        Ok(Self::channels(method, parts[0]).segment(parts[1]))
    }
}

impl Resource for SlackChannel {
    fn type_name(&self) -> &'static str {
        "datadog_integration_slack_channel"
    }

    fn schema(&self) -> Schema {
        let display = DISPLAY_FIELDS.iter().fold(
            Block::new().with_description(
                "Configuration options for what is shown in an alert event message.",
            ),
            |block, (name, description)| {
                block.with_attribute(
                    *name,
                    Attribute::optional_bool()
                        .with_description(*description)
                        .with_default(Value::Bool(true)),
                )
            },
        );

        Schema::v0()
            .with_description("A channel of a Datadog Slack integration account.")
            .with_attribute(
                "account_name",
                Attribute::required_string()
                    .with_description("Slack account name.")
                    .with_force_new()
                    .with_validator(string_not_blank())
                    .with_validator(SLACK_CHANNEL_ID.part_validator()),
            )
            .with_attribute(
                "channel_name",
                Attribute::required_string()
                    .with_description("Slack channel name.")
                    .with_validator(string_not_blank())
                    .with_validator(SLACK_CHANNEL_ID.part_validator()),
            )
            .with_block(
                "display",
                NestedBlock::single(display).with_min_items(1),
            )
    }

    fn identity(&self) -> Identity {
        Identity::Composite(SLACK_CHANNEL_ID)
    }

    fn create_endpoint(&self, desired: &InstanceState) -> Result<ApiRequest, ProviderError> {
        Ok(Self::channels(ApiRequest::post, desired.require_str("account_name")?))
    }

    fn read_endpoint(&self, id: &str) -> Result<ApiRequest, ProviderError> {
        Self::channel(ApiRequest::get, id)
    }

    fn update_endpoint(&self, id: &str, _desired: &InstanceState) -> Result<ApiRequest, ProviderError> {
        Self::channel(ApiRequest::patch, id)
    }

    fn delete_endpoint(&self, id: &str) -> Result<Option<ApiRequest>, ProviderError> {
        Self::channel(ApiRequest::delete, id).map(Some)
    }

    fn build_request(&self, desired: &InstanceState) -> Result<RequestBody, ProviderError> {
        let display: Map<String, Value> = unwrap_single(desired.get("display"))
            .map(|block| {
                DISPLAY_FIELDS
                    .iter()
                    .filter_map(|(name, _)| block.get(*name).map(|v| (name.to_string(), v.clone())))
                    .filter(|(_, v)| v.is_boolean())
                    .collect()
            })
            .unwrap_or_default();

        let body = WireBuilder::new(desired)
            .copy_as("channel_name", "name")
            .insert("display", Value::Object(display))
            .build();
        Ok(RequestBody::Json(Value::Object(body)))
    }

    fn write_state(&self, wire: &Value, state: &mut InstanceState) -> Vec<Diagnostic> {
        let Some(object) = wire.as_object() else {
            return vec![unexpected_response("Slack channel", wire)];
        };

        let mut diagnostics = {
            let mut writer = StateWriter::new(object, state);
            writer.string("channel_name", "name");
            writer.finish()
        };

        let display = match object.get("display") {
            Some(Value::Object(display)) => display.clone(),
            None | Some(Value::Null) => Map::new(),
            Some(other) => {
                diagnostics.push(
                    unexpected_response("display", other).with_attribute("display"),
                );
                Map::new()
            },
        };
        let mut block = InstanceState::new();
        {
            let mut writer = StateWriter::new(&display, &mut block);
            for (name, _) in DISPLAY_FIELDS {
                writer.bool(name, name);
            }
            diagnostics.extend(writer.finish().into_iter().map(|d| {
                let attribute = d.attribute.clone().unwrap_or_default();
                d.with_attribute(format!("display[0].{attribute}"))
            }));
        }
        state.set("display", wrap_single(block.attributes));

        diagnostics
    }

    fn id_after_update(&self, id: &str, wire: &Value, desired: &InstanceState) -> String {
        let account = desired.get_str("account_name");
        let channel = wire.get("name").and_then(Value::as_str);
        match (account, channel) {
            (Some(account), Some(channel)) => SLACK_CHANNEL_ID
                .format(&[account, channel])
                .unwrap_or_else(|_| id.to_string()),
            _ => id.to_string(),
        }
    }
}
