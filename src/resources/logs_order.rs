//! Organization-wide ordering of log indexes and log pipelines.
//!
//! Each organization has exactly one index order and one pipeline order.
//! Neither can be created or deleted: "create" overwrites the current order
//! and "delete" only forgets the local state.

use serde_json::Value;

use crate::client::{ApiRequest, RequestBody};
use crate::codec::typed::{StateWriter, WireBuilder};
use crate::error::ProviderError;
use crate::identity::Identity;
use crate::resource::Resource;
use crate::schema::{Attribute, Diagnostic, Schema};
use crate::state::InstanceState;

use super::unexpected_response;

/// One ordered list of names behind a singleton endpoint.
struct OrderSpec {
    type_name: &'static str,
    id: &'static str,
    path: &'static str,
    description: &'static str,
    attribute: &'static str,
    attribute_description: &'static str,
    wire_key: &'static str,
}

impl OrderSpec {
    fn schema(&self) -> Schema {
        Schema::v0()
            .with_description(self.description)
            .with_attribute(
                "name",
                Attribute::required_string().with_description("The name of the order."),
            )
            .with_attribute(
                self.attribute,
                Attribute::required_string_list().with_description(self.attribute_description),
            )
    }

    fn build_request(&self, desired: &InstanceState) -> Result<RequestBody, ProviderError> {
        match desired.get(self.attribute) {
            Some(Value::Array(items)) if !items.is_empty() => {},
            _ => {
                return Err(ProviderError::InvalidAttribute {
                    attribute: self.attribute.to_string(),
                    message: "the order must name at least one entry".to_string(),
                })
            },
        }
        let body = WireBuilder::new(desired)
            .copy_as(self.attribute, self.wire_key)
            .build();
        Ok(RequestBody::Json(Value::Object(body)))
    }

    fn write_state(&self, wire: &Value, state: &mut InstanceState) -> Vec<Diagnostic> {
        let Some(object) = wire.as_object() else {
            return vec![unexpected_response(self.wire_key, wire)];
        };
        let mut writer = StateWriter::new(object, state);
        writer.strings(self.attribute, self.wire_key);
        writer.finish()
    }
}

const INDEX_ORDER: OrderSpec = OrderSpec {
    type_name: "datadog_logs_index_order",
    id: "logs-index-order",
    path: "api/v1/logs/config/index-order",
    description: "The order in which log indexes are matched.",
    attribute: "indexes",
    attribute_description: "Index names, in matching order.",
    wire_key: "index_names",
};

const PIPELINE_ORDER: OrderSpec = OrderSpec {
    type_name: "datadog_logs_pipeline_order",
    id: "logs-pipeline-order",
    path: "api/v1/logs/config/pipeline-order",
    description: "The order in which log pipelines process logs.",
    attribute: "pipelines",
    attribute_description: "Pipeline IDs, in processing order.",
    wire_key: "pipeline_ids",
};

macro_rules! order_resource {
    ($(#[$meta:meta])* $name:ident, $spec:expr) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, Default)]
        pub struct $name;

        impl Resource for $name {
            fn type_name(&self) -> &'static str {
                $spec.type_name
            }

            fn schema(&self) -> Schema {
                $spec.schema()
            }

            fn identity(&self) -> Identity {
                Identity::Singleton($spec.id)
            }

            fn create_endpoint(&self, _desired: &InstanceState) -> Result<ApiRequest, ProviderError> {
                Ok(ApiRequest::put($spec.path))
            }

            fn read_endpoint(&self, _id: &str) -> Result<ApiRequest, ProviderError> {
                Ok(ApiRequest::get($spec.path))
            }

            fn update_endpoint(&self, _id: &str, _desired: &InstanceState) -> Result<ApiRequest, ProviderError> {
                Ok(ApiRequest::put($spec.path))
            }

            fn delete_endpoint(&self, _id: &str) -> Result<Option<ApiRequest>, ProviderError> {
                Ok(None)
            }

            fn build_request(&self, desired: &InstanceState) -> Result<RequestBody, ProviderError> {
                $spec.build_request(desired)
            }

            fn write_state(&self, wire: &Value, state: &mut InstanceState) -> Vec<Diagnostic> {
                $spec.write_state(wire, state)
            }
        }
    };
}

order_resource!(
    /// The log index order.
    LogsIndexOrder,
    INDEX_ORDER
);

order_resource!(
    /// The log pipeline order.
    LogsPipelineOrder,
    PIPELINE_ORDER
);
