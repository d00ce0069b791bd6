//! The lifecycle driver.
//!
//! [`ResourceDriver`] runs plan, create, read, update, delete and import for
//! any [`Resource`]. Every operation follows the same shape: validate, call
//! the API, translate errors, and only then write state. A failed call never
//! leaves partially written state behind.

use std::time::Duration;

use serde_json::Value;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

use crate::client::DatadogClient;
use crate::diff;
use crate::error::ProviderError;
use crate::resource::Resource;
use crate::schema::{Diagnostic, Schema};
use crate::state::InstanceState;
use crate::types::PlanResult;
use crate::validation::{diagnostics_to_error, validate};

/// Deadline for each lifecycle operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OperationTimeouts {
    /// Create, including the read-back.
    pub create: Duration,
    /// Read.
    pub read: Duration,
    /// Update, including the read-back.
    pub update: Duration,
    /// Delete.
    pub delete: Duration,
}

impl Default for OperationTimeouts {
    fn default() -> Self {
        let ten_minutes = Duration::from_secs(600);
        Self {
            create: ten_minutes,
            read: ten_minutes,
            update: ten_minutes,
            delete: ten_minutes,
        }
    }
}

/// Runs the lifecycle of one resource type against one client.
pub struct ResourceDriver<'a> {
    resource: &'a dyn Resource,
    client: &'a DatadogClient,
    timeouts: OperationTimeouts,
    schema: Schema,
}

impl<'a> ResourceDriver<'a> {
    /// Create a driver with default timeouts.
    pub fn new(resource: &'a dyn Resource, client: &'a DatadogClient) -> Self {
        Self {
            resource,
            client,
            timeouts: OperationTimeouts::default(),
            schema: resource.schema(),
        }
    }

    /// Override the operation timeouts.
    pub fn with_timeouts(mut self, timeouts: OperationTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Validate configuration against the schema.
    pub fn validate(&self, config: &Value) -> Vec<Diagnostic> {
        validate(&self.schema, config)
    }

    /// Compute the plan for moving `prior` to `config`.
    pub fn plan(
        &self,
        prior: Option<&InstanceState>,
        config: &Value,
    ) -> Result<PlanResult, ProviderError> {
        plan_with_schema(self.resource, &self.schema, prior, config)
    }

    /// Create the remote object and return its state.
    ///
    /// On success the returned state has a non-empty ID and reflects a fresh
    /// read. On failure nothing is returned, so no ID is ever recorded for an
    /// object whose creation was not confirmed.
    #[instrument(skip(self, desired), fields(resource_type = self.resource.type_name()))]
    pub async fn create(&self, desired: InstanceState) -> Result<InstanceState, ProviderError> {
        let mut desired = desired;
        diff::apply_defaults(&self.schema, &mut desired.attributes);
        self.check(&self.validate(&desired.config_view(&self.schema)))?;

        let deadline = Instant::now() + self.timeouts.create;
        let request = self
            .resource
            .create_endpoint(&desired)?
            .body(self.resource.build_request(&desired)?);
        let context = format!("error creating {}", self.resource.type_name());
        let response = self.client.send(&request, deadline, &context).await?;
        let wire = response.body_json()?;

        let id = self
            .resource
            .id_from_response(&wire, &desired)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| {
                ProviderError::Internal(format!(
                    "{}: create succeeded but the response carried no id",
                    self.resource.type_name()
                ))
            })?;
        info!(id = %id, "created");

        let mut state = desired;
        state.id = id;
        if !wire.is_null() {
            self.write(&wire, &mut state)?;
        }

        let mut state = self.read_after_write(state, deadline).await?;
        state.newly_created = true;
        Ok(state)
    }

    /// Refresh state from the remote object.
    ///
    /// A remote object that no longer exists is not an error: the returned
    /// state has its ID cleared and keeps its other attributes.
    #[instrument(skip(self, state), fields(resource_type = self.resource.type_name(), id = %state.id))]
    pub async fn read(&self, state: InstanceState) -> Result<InstanceState, ProviderError> {
        let deadline = Instant::now() + self.timeouts.read;
        self.read_with_deadline(state, deadline).await
    }

    /// Apply an in-place update.
    ///
    /// Changes that force replacement are rejected; the host must delete and
    /// create instead.
    #[instrument(skip(self, prior, desired), fields(resource_type = self.resource.type_name(), id = %prior.id))]
    pub async fn update(
        &self,
        prior: &InstanceState,
        desired: InstanceState,
    ) -> Result<InstanceState, ProviderError> {
        if !prior.is_present() {
            return Err(ProviderError::Internal(format!(
                "{}: update called on an instance without an id",
                self.resource.type_name()
            )));
        }

        let plan = self.plan(Some(prior), &desired.config_view(&self.schema))?;
        if plan.requires_replace() {
            return Err(ProviderError::Internal(format!(
                "{}: update called with changes that force replacement: {}",
                self.resource.type_name(),
                plan.replace_paths.join(", ")
            )));
        }

        let mut desired = desired;
        diff::apply_defaults(&self.schema, &mut desired.attributes);
        desired.id = prior.id.clone();

        let deadline = Instant::now() + self.timeouts.update;
        let request = self
            .resource
            .update_endpoint(&prior.id, &desired)?
            .body(self.resource.build_update_request(&prior.id, &desired)?);
        let context = format!("error updating {} {}", self.resource.type_name(), prior.id);
        let response = self.client.send(&request, deadline, &context).await?;
        let wire = response.body_json()?;

        let mut state = desired;
        state.id = self.resource.id_after_update(&prior.id, &wire, &state);
        if !wire.is_null() {
            self.write(&wire, &mut state)?;
        }
        debug!(id = %state.id, "updated");

        self.read_after_write(state, deadline).await
    }

    /// Delete the remote object. An object that is already gone counts as
    /// deleted. Returns the state with its ID cleared.
    #[instrument(skip(self, state), fields(resource_type = self.resource.type_name(), id = %state.id))]
    pub async fn delete(&self, state: InstanceState) -> Result<InstanceState, ProviderError> {
        let mut state = state;
        if !state.is_present() {
            return Ok(state);
        }

        if let Some(request) = self.resource.delete_endpoint(&state.id)? {
            let deadline = Instant::now() + self.timeouts.delete;
            let context = format!("error deleting {} {}", self.resource.type_name(), state.id);
            match self.client.send(&request, deadline, &context).await {
                Ok(_) => info!("deleted"),
                Err(err) if err.is_absent() => info!("already deleted"),
                Err(err) => return Err(err),
            }
        } else {
            debug!("singleton; removing from state only");
        }

        state.clear_id();
        Ok(state)
    }

    /// Whether the remote object exists.
    pub async fn exists(&self, id: &str) -> Result<bool, ProviderError> {
        let deadline = Instant::now() + self.timeouts.read;
        Ok(self
            .resource
            .read_remote(self.client, id, deadline)
            .await?
            .is_some())
    }

    /// Adopt an existing remote object.
    #[instrument(skip(self), fields(resource_type = self.resource.type_name()))]
    pub async fn import(&self, id: &str) -> Result<InstanceState, ProviderError> {
        let mut state = InstanceState::with_id(id);
        self.resource.import_state(id, &mut state)?;

        let state = self.read(state).await?;
        if !state.is_present() {
            return Err(ProviderError::NotFound(format!(
                "cannot import non-existent remote object: {} {}",
                self.resource.type_name(),
                id
            )));
        }
        Ok(state)
    }

    async fn read_with_deadline(
        &self,
        state: InstanceState,
        deadline: Instant,
    ) -> Result<InstanceState, ProviderError> {
        if !state.is_present() {
            return Ok(state);
        }

        match self.resource.read_remote(self.client, &state.id, deadline).await? {
            None => {
                warn!(id = %state.id, "remote object no longer exists; clearing id");
                let mut state = state;
                state.clear_id();
                Ok(state)
            },
            Some(wire) => {
                let mut next = state.clone();
                self.write(&wire, &mut next)?;
                Ok(next)
            },
        }
    }

    /// Read back after create or update. Datadog is eventually consistent, so
    /// a 404 right after a write is retried until the deadline.
    async fn read_after_write(
        &self,
        state: InstanceState,
        deadline: Instant,
    ) -> Result<InstanceState, ProviderError> {
        let mut attempt = 0;
        loop {
            let refreshed = self.read_with_deadline(state.clone(), deadline).await?;
            if refreshed.is_present() {
                return Ok(refreshed);
            }

            let delay = self.client.retry_policy().backoff(attempt);
            if Instant::now() + delay >= deadline {
                return Err(ProviderError::DeadlineExceeded(format!(
                    "{} {} was written but could not be read back before the deadline; \
                     retry the operation",
                    self.resource.type_name(),
                    state.id
                )));
            }
            debug!(attempt, "object not visible yet; retrying read");
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }

    fn write(&self, wire: &Value, state: &mut InstanceState) -> Result<(), ProviderError> {
        let diagnostics = self.resource.write_state(wire, state);
        for warning in diagnostics.iter().filter(|d| !d.is_error()) {
            warn!(summary = %warning.summary, "response warning");
        }
        self.check(&diagnostics)?;
        diff::normalize_state(&self.schema, &mut state.attributes);
        Ok(())
    }

    fn check(&self, diagnostics: &[Diagnostic]) -> Result<(), ProviderError> {
        check(diagnostics)
    }
}

/// Compute the plan for moving `prior` to `config` without contacting the
/// API.
///
/// `config` of `null` plans a delete; an absent or missing prior plans a
/// create. Invalid configuration is an error.
pub fn plan_change(
    resource: &dyn Resource,
    prior: Option<&InstanceState>,
    config: &Value,
) -> Result<PlanResult, ProviderError> {
    plan_with_schema(resource, &resource.schema(), prior, config)
}

fn plan_with_schema(
    resource: &dyn Resource,
    schema: &Schema,
    prior: Option<&InstanceState>,
    config: &Value,
) -> Result<PlanResult, ProviderError> {
    if !config.is_null() {
        check(&validate(schema, config))?;
    }
    diff::plan(schema, prior, config, &|prior, desired| {
        resource.replace_paths(prior, desired)
    })
}

fn check(diagnostics: &[Diagnostic]) -> Result<(), ProviderError> {
    match diagnostics_to_error(diagnostics) {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::monitor::Monitor;
    use crate::resources::test_support::{client, state, timeouts};
    use crate::testing::{FakeDatadogApi, ScriptedTransport};
    use reqwest::Method;
    use serde_json::json;
    use std::sync::Arc;

    fn config() -> Value {
        json!({"name": "cpu", "type": "metric alert", "query": "avg:cpu{*} > 90"})
    }

    fn stored(id: u64) -> Value {
        json!({
            "id": id,
            "name": "cpu",
            "type": "metric alert",
            "query": "avg:cpu{*} > 90",
            "options": {"notify_no_data": false, "include_tags": true, "notify_audit": false}
        })
    }

    #[tokio::test]
    async fn test_create_reads_back_until_visible() {
        let transport = Arc::new(
            ScriptedTransport::new()
                .respond(200, stored(7))
                .respond(404, json!({"errors": ["Monitor not found"]}))
                .respond(200, stored(7)),
        );
        let client = client(transport.clone());
        let driver = ResourceDriver::new(&Monitor, &client).with_timeouts(timeouts());

        let created = driver.create(state(config())).await.unwrap();
        assert_eq!(created.id, "7");
        assert!(created.newly_created);
        assert_eq!(transport.request_count(), 3);
        assert_eq!(transport.remaining(), 0);
    }

    #[tokio::test]
    async fn test_create_without_id_fails() {
        let transport = Arc::new(ScriptedTransport::new().respond(200, json!({"name": "cpu"})));
        let client = client(transport.clone());
        let driver = ResourceDriver::new(&Monitor, &client).with_timeouts(timeouts());

        let err = driver.create(state(config())).await.unwrap_err();
        assert!(matches!(err, ProviderError::Internal(_)));
        assert_eq!(transport.request_count(), 1);
    }

    #[tokio::test]
    async fn test_create_rejected_by_api() {
        let transport = Arc::new(
            ScriptedTransport::new().respond(400, json!({"errors": ["The value provided for parameter 'query' is invalid"]})),
        );
        let client = client(transport);
        let driver = ResourceDriver::new(&Monitor, &client).with_timeouts(timeouts());

        let err = driver.create(state(config())).await.unwrap_err();
        assert!(matches!(err, ProviderError::InvalidRequest(_)));
        assert!(err.to_string().contains("error creating datadog_monitor"));
        assert!(err.to_string().contains("parameter 'query' is invalid"));
    }

    #[tokio::test]
    async fn test_create_rejects_invalid_config_before_calling_api() {
        let transport = Arc::new(ScriptedTransport::new());
        let client = client(transport.clone());
        let driver = ResourceDriver::new(&Monitor, &client).with_timeouts(timeouts());

        let mut bad = config();
        bad["priority"] = json!(9);
        assert!(driver.create(state(bad)).await.is_err());
        assert_eq!(transport.request_count(), 0);
    }

    #[tokio::test]
    async fn test_read_of_deleted_object_clears_id() {
        let api = Arc::new(FakeDatadogApi::new());
        let client = client(api.clone());
        let driver = ResourceDriver::new(&Monitor, &client).with_timeouts(timeouts());

        let created = driver.create(state(config())).await.unwrap();
        assert!(api.delete_out_of_band(&format!("api/v1/monitor/{}", created.id)));

        let refreshed = driver.read(created).await.unwrap();
        assert!(!refreshed.is_present());
        assert_eq!(refreshed.get_str("name"), Some("cpu"));
        assert!(!driver.exists("1").await.unwrap());
    }

    #[tokio::test]
    async fn test_update_refuses_replacement() {
        let api = Arc::new(FakeDatadogApi::new());
        let client = client(api.clone());
        let driver = ResourceDriver::new(&Monitor, &client).with_timeouts(timeouts());

        let created = driver.create(state(config())).await.unwrap();
        let mut retyped = config();
        retyped["type"] = json!("log alert");

        let err = driver.update(&created, state(retyped)).await.unwrap_err();
        assert!(err.to_string().contains("type"));
        assert_eq!(api.count(Method::PUT), 0);
    }

    #[tokio::test]
    async fn test_update_without_id_fails() {
        let api = Arc::new(FakeDatadogApi::new());
        let client = client(api.clone());
        let driver = ResourceDriver::new(&Monitor, &client).with_timeouts(timeouts());

        let err = driver
            .update(&InstanceState::new(), state(config()))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Internal(_)));
        assert!(api.requests().is_empty());
    }

    #[tokio::test]
    async fn test_delete_of_missing_object_succeeds() {
        let api = Arc::new(FakeDatadogApi::new());
        let client = client(api.clone());
        let driver = ResourceDriver::new(&Monitor, &client).with_timeouts(timeouts());

        let mut gone = state(config());
        gone.id = "99".to_string();
        let deleted = driver.delete(gone).await.unwrap();
        assert!(!deleted.is_present());
        assert_eq!(api.count(Method::DELETE), 1);

        let deleted = driver.delete(deleted).await.unwrap();
        assert!(!deleted.is_present());
        assert_eq!(api.count(Method::DELETE), 1);
    }

    #[tokio::test]
    async fn test_delete_failure_keeps_id() {
        let transport = Arc::new(
            ScriptedTransport::new().respond(403, json!({"errors": ["Forbidden"]})),
        );
        let client = client(transport);
        let driver = ResourceDriver::new(&Monitor, &client).with_timeouts(timeouts());

        let mut existing = state(config());
        existing.id = "12".to_string();
        let err = driver.delete(existing).await.unwrap_err();
        assert!(matches!(err, ProviderError::PermissionDenied(_)));
    }

    #[tokio::test]
    async fn test_import() {
        let api = Arc::new(FakeDatadogApi::new().with_object("api/v1/monitor/42", stored(42)));
        let client = client(api);
        let driver = ResourceDriver::new(&Monitor, &client).with_timeouts(timeouts());

        let imported = driver.import("42").await.unwrap();
        assert_eq!(imported.id, "42");
        assert_eq!(imported.get_str("query"), Some("avg:cpu{*} > 90"));
        assert!(!imported.newly_created);

        let err = driver.import("43").await.unwrap_err();
        assert!(matches!(err, ProviderError::NotFound(_)));
    }

    #[test]
    fn test_plan_change_without_client() {
        let plan = plan_change(&Monitor, None, &config()).unwrap();
        assert!(!plan.is_empty());
        assert!(plan_change(&Monitor, None, &json!({"name": "cpu"})).is_err());
    }
}
