//! The contract every managed Datadog object implements.
//!
//! A [`Resource`] describes one remote object type: its schema, where its
//! endpoints live, how state becomes a request body, and how a response
//! becomes state. The lifecycle itself (validate, call, translate errors,
//! write state) lives in [`ResourceDriver`](crate::driver::ResourceDriver) and
//! is the same for every type.

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::time::Instant;

use crate::client::{ApiRequest, DatadogClient, RequestBody};
use crate::codec::typed::response_id;
use crate::error::ProviderError;
use crate::identity::Identity;
use crate::schema::{Diagnostic, Schema};
use crate::state::InstanceState;

/// A remote object type managed by the provider.
#[async_trait]
pub trait Resource: Send + Sync {
    /// The type name, e.g. `datadog_monitor`.
    fn type_name(&self) -> &'static str;

    /// The attribute schema.
    fn schema(&self) -> Schema;

    /// How the remote object is identified.
    fn identity(&self) -> Identity {
        Identity::Remote
    }

    // =========================================================================
    // Endpoints
    // =========================================================================

    /// Endpoint that creates the object.
    fn create_endpoint(&self, desired: &InstanceState) -> Result<ApiRequest, ProviderError>;

    /// Endpoint that fetches the object.
    fn read_endpoint(&self, id: &str) -> Result<ApiRequest, ProviderError>;

    /// Endpoint that updates the object in place.
    fn update_endpoint(&self, id: &str, desired: &InstanceState) -> Result<ApiRequest, ProviderError>;

    /// Endpoint that deletes the object, or `None` when deleting only forgets
    /// local state (singletons).
    fn delete_endpoint(&self, id: &str) -> Result<Option<ApiRequest>, ProviderError>;

    // =========================================================================
    // Codec
    // =========================================================================

    /// Build the create payload from desired state.
    fn build_request(&self, desired: &InstanceState) -> Result<RequestBody, ProviderError>;

    /// Build the update payload. Defaults to the create payload.
    fn build_update_request(
        &self,
        _id: &str,
        desired: &InstanceState,
    ) -> Result<RequestBody, ProviderError> {
        self.build_request(desired)
    }

    /// Fold a create, read or update response into `state`.
    ///
    /// Must not touch `state.id`.
    fn write_state(&self, wire: &Value, state: &mut InstanceState) -> Vec<Diagnostic>;

    /// The ID of a newly created object.
    fn id_from_response(&self, wire: &Value, desired: &InstanceState) -> Option<String> {
        match self.identity() {
            Identity::Remote => response_id(wire),
            Identity::Singleton(id) => Some(id.to_string()),
            Identity::Composite(format) => {
                let parts: Option<Vec<&str>> = format
                    .fields()
                    .iter()
                    .map(|field| desired.get_str(field))
                    .collect();
                parts.and_then(|parts| format.format(&parts).ok())
            },
        }
    }

    /// The ID after an update. Only resources whose composite ID includes an
    /// updatable field return something other than `id`.
    fn id_after_update(&self, id: &str, _wire: &Value, _desired: &InstanceState) -> String {
        id.to_string()
    }

    // =========================================================================
    // Lifecycle hooks
    // =========================================================================

    /// Fetch the remote object. `Ok(None)` means it no longer exists.
    async fn read_remote(
        &self,
        client: &DatadogClient,
        id: &str,
        deadline: Instant,
    ) -> Result<Option<Value>, ProviderError> {
        let request = self.read_endpoint(id)?;
        let context = format!("error reading {} {}", self.type_name(), id);
        match client.send(&request, deadline, &context).await {
            Ok(response) => Ok(Some(response.body_json()?)),
            Err(err) if err.is_absent() => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// Seed state for an import of `id` before it is read.
    fn import_state(&self, id: &str, state: &mut InstanceState) -> Result<(), ProviderError> {
        match self.identity() {
            Identity::Remote => Ok(()),
            Identity::Composite(format) => {
                for (name, value) in format.attributes(id)? {
                    state.set(name, value);
                }
                Ok(())
            },
            Identity::Singleton(expected) if id == expected => Ok(()),
            Identity::Singleton(expected) => Err(ProviderError::InvalidAttribute {
                attribute: "id".to_string(),
                message: format!(
                    "{} is a singleton; import it with the id \"{}\"",
                    self.type_name(),
                    expected
                ),
            }),
        }
    }

    /// Extra paths whose change forces replacement, beyond attributes
    /// flagged `force_new`. `desired` is the normalized configuration.
    fn replace_paths(&self, _prior: &InstanceState, _desired: &Map<String, Value>) -> Vec<String> {
        Vec::new()
    }
}
