//! Built-in Datadog resource types.
//!
//! Each module implements [`Resource`](crate::resource::Resource) for one
//! remote object type. Typed resources map attributes field by field with
//! [`codec::typed`](crate::codec::typed); document resources carry the whole
//! object as a JSON or YAML string and compare it through a
//! [`Scrubber`](crate::codec::opaque::Scrubber).

pub mod api_key;
pub mod dashboard_json;
pub mod logs_order;
pub mod monitor;
pub mod monitor_json;
pub mod role;
pub mod rum_application;
pub mod service_account;
pub mod service_definition;
pub mod slack_channel;
pub mod software_catalog;

use serde_json::Value;

use crate::schema::Diagnostic;

/// The diagnostic for a response that is not the object shape a resource
/// expects.
pub(crate) fn unexpected_response(kind: &str, wire: &Value) -> Diagnostic {
    let got = match wire {
        Value::Null => "an empty body".to_string(),
        Value::Array(_) => "an array".to_string(),
        other => format!("{other}"),
    };
    Diagnostic::error(format!("Expected a {kind} object in the Datadog response"))
        .with_detail(format!("Got {got}"))
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Arc;
    use std::time::Duration;

    use serde_json::Value;

    use crate::client::{DatadogClient, HttpTransport, RetryPolicy};
    use crate::driver::OperationTimeouts;
    use crate::state::InstanceState;

    /// A client that retries quickly.
    pub(crate) fn client(transport: Arc<dyn HttpTransport>) -> DatadogClient {
        DatadogClient::new(transport).with_retry_policy(RetryPolicy {
            enabled: true,
            initial_backoff: Duration::from_millis(5),
            max_backoff: Duration::from_millis(20),
            max_window: None,
        })
    }

    /// Timeouts short enough that a missing object fails a test quickly.
    pub(crate) fn timeouts() -> OperationTimeouts {
        let two_seconds = Duration::from_secs(2);
        OperationTimeouts {
            create: two_seconds,
            read: two_seconds,
            update: two_seconds,
            delete: two_seconds,
        }
    }

    pub(crate) fn state(value: Value) -> InstanceState {
        InstanceState::from_value(&value).unwrap()
    }
}
