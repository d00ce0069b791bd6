//! The Datadog provider.
//!
//! [`DatadogProvider`] resolves the provider configuration once, builds the
//! shared [`DatadogClient`], and dispatches every host call through the
//! [`Registry`] to the lifecycle driver.

use std::fmt;
use std::sync::{Arc, OnceLock};

use serde_json::Value;
use tokio::time::Instant;
use tracing::{debug, error, info, instrument};

use crate::client::{ApiRequest, DatadogClient, HttpTransport, ReqwestTransport, RetryPolicy};
use crate::config::ProviderConfig;
use crate::driver::{plan_change, OperationTimeouts, ResourceDriver};
use crate::error::ProviderError;
use crate::registry::Registry;
use crate::schema::{Diagnostic, ProviderSchema};
use crate::service::ProviderService;
use crate::state::InstanceState;
use crate::types::{ImportedResource, PlanResult};
use crate::validation::validate;

type EnvLookup = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// The Datadog provider.
pub struct DatadogProvider {
    registry: Registry,
    client: OnceLock<DatadogClient>,
    timeouts: OperationTimeouts,
    transport: Option<Arc<dyn HttpTransport>>,
    env: EnvLookup,
}

impl fmt::Debug for DatadogProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatadogProvider")
            .field("registry", &self.registry)
            .field("configured", &self.client.get().is_some())
            .field("timeouts", &self.timeouts)
            .finish_non_exhaustive()
    }
}

impl Default for DatadogProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl DatadogProvider {
    /// A provider serving every built-in type, reading fallbacks from the
    /// process environment.
    pub fn new() -> Self {
        Self {
            registry: Registry::datadog(),
            client: OnceLock::new(),
            timeouts: OperationTimeouts::default(),
            transport: None,
            env: Arc::new(|name| std::env::var(name).ok()),
        }
    }

    /// Serve a different set of types.
    pub fn with_registry(mut self, registry: Registry) -> Self {
        self.registry = registry;
        self
    }

    /// Override the operation timeouts.
    pub fn with_timeouts(mut self, timeouts: OperationTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Send requests through `transport` instead of HTTPS. The configured
    /// `api_url` and keys are then only validated, not used.
    pub fn with_transport(mut self, transport: Arc<dyn HttpTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Replace the environment lookup used for configuration fallbacks.
    pub fn with_env(mut self, env: impl Fn(&str) -> Option<String> + Send + Sync + 'static) -> Self {
        self.env = Arc::new(env);
        self
    }

    /// The registry of served types.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// The configured client.
    pub fn client(&self) -> Result<&DatadogClient, ProviderError> {
        self.client.get().ok_or_else(|| {
            ProviderError::Configuration("the provider has not been configured".to_string())
        })
    }

    fn driver(&self, resource_type: &str) -> Result<ResourceDriver<'_>, ProviderError> {
        let resource = self.registry.resource(resource_type)?;
        Ok(ResourceDriver::new(resource, self.client()?).with_timeouts(self.timeouts))
    }

    fn build_client(&self, config: &ProviderConfig) -> Result<DatadogClient, ProviderError> {
        let transport: Arc<dyn HttpTransport> = match &self.transport {
            Some(transport) => transport.clone(),
            None => Arc::new(ReqwestTransport::new(
                &config.api_url,
                &config.api_key,
                &config.app_key,
            )?),
        };
        let retry = RetryPolicy {
            enabled: config.retry_enabled,
            max_window: config.retry_timeout,
            ..RetryPolicy::default()
        };
        Ok(DatadogClient::new(transport)
            .with_retry_policy(retry)
            .with_request_timeout(config.http_timeout))
    }
}

async fn validate_keys(client: &DatadogClient, config: &ProviderConfig) -> Result<(), ProviderError> {
    let deadline = Instant::now() + config.http_timeout;
    let response = client
        .send(
            &ApiRequest::get("api/v1/validate"),
            deadline,
            "error validating the API key",
        )
        .await?;
    match response.body_json()?.get("valid").and_then(Value::as_bool) {
        Some(true) => Ok(()),
        _ => Err(ProviderError::PermissionDenied(
            "the API key was not accepted by Datadog".to_string(),
        )),
    }
}

#[async_trait::async_trait]
impl ProviderService for DatadogProvider {
    fn schema(&self) -> ProviderSchema {
        self.registry.provider_schema()
    }

    async fn validate_provider_config(&self, config: Value) -> Result<Vec<Diagnostic>, ProviderError> {
        let mut diagnostics = validate(&ProviderConfig::schema(), &config);
        if diagnostics.iter().any(Diagnostic::is_error) {
            return Ok(diagnostics);
        }
        if let Err(err) = ProviderConfig::resolve(&config, &*self.env) {
            diagnostics.push(err.into());
        }
        Ok(diagnostics)
    }

    #[instrument(skip(self, config), name = "provider.configure")]
    async fn configure(&self, config: Value) -> Result<Vec<Diagnostic>, ProviderError> {
        if self.client.get().is_some() {
            return Err(ProviderError::Configuration(
                "the provider is already configured; credentials cannot change after startup"
                    .to_string(),
            ));
        }

        let diagnostics = validate(&ProviderConfig::schema(), &config);
        if diagnostics.iter().any(Diagnostic::is_error) {
            return Ok(diagnostics);
        }

        let resolved = ProviderConfig::resolve(&config, &*self.env)?;
        let client = self.build_client(&resolved)?;
        if resolved.validate {
            validate_keys(&client, &resolved).await?;
        } else {
            debug!("skipping key validation");
        }

        self.client.set(client).map_err(|_| {
            ProviderError::Configuration("the provider is already configured".to_string())
        })?;
        info!(api_url = %resolved.api_url, retry = resolved.retry_enabled, "provider configured");
        Ok(diagnostics)
    }

    async fn validate_resource_config(
        &self,
        resource_type: &str,
        config: Value,
    ) -> Result<Vec<Diagnostic>, ProviderError> {
        let resource = self.registry.resource(resource_type)?;
        Ok(validate(&resource.schema(), &config))
    }

    #[instrument(skip(self, prior_state, config), name = "provider.plan")]
    async fn plan(
        &self,
        resource_type: &str,
        prior_state: Option<Value>,
        config: Value,
    ) -> Result<PlanResult, ProviderError> {
        let resource = self.registry.resource(resource_type)?;
        let prior = prior_state
            .as_ref()
            .map(InstanceState::from_value)
            .transpose()?;
        let plan = plan_change(resource, prior.as_ref(), &config)?;
        debug!(
            action = ?plan.action,
            changes = plan.changes.len(),
            replace = ?plan.replace_paths,
            "plan computed"
        );
        Ok(plan)
    }

    #[instrument(skip(self, planned_state), name = "provider.create")]
    async fn create(&self, resource_type: &str, planned_state: Value) -> Result<Value, ProviderError> {
        let desired = InstanceState::from_value(&planned_state)?;
        match self.driver(resource_type)?.create(desired).await {
            Ok(state) => Ok(state.to_value()),
            Err(err) => {
                error!(error = %err, "create failed");
                Err(err)
            },
        }
    }

    #[instrument(skip(self, current_state), name = "provider.read")]
    async fn read(&self, resource_type: &str, current_state: Value) -> Result<Value, ProviderError> {
        let state = InstanceState::from_value(&current_state)?;
        let state = self.driver(resource_type)?.read(state).await?;
        Ok(state.to_value())
    }

    #[instrument(skip(self, prior_state, planned_state), name = "provider.update")]
    async fn update(
        &self,
        resource_type: &str,
        prior_state: Value,
        planned_state: Value,
    ) -> Result<Value, ProviderError> {
        let prior = InstanceState::from_value(&prior_state)?;
        let desired = InstanceState::from_value(&planned_state)?;
        match self.driver(resource_type)?.update(&prior, desired).await {
            Ok(state) => Ok(state.to_value()),
            Err(err) => {
                error!(error = %err, "update failed");
                Err(err)
            },
        }
    }

    #[instrument(skip(self, current_state), name = "provider.delete")]
    async fn delete(&self, resource_type: &str, current_state: Value) -> Result<(), ProviderError> {
        let state = InstanceState::from_value(&current_state)?;
        self.driver(resource_type)?.delete(state).await?;
        Ok(())
    }

    #[instrument(skip(self), name = "provider.import")]
    async fn import_resource(
        &self,
        resource_type: &str,
        id: &str,
    ) -> Result<Vec<ImportedResource>, ProviderError> {
        let state = self.driver(resource_type)?.import(id).await?;
        Ok(vec![ImportedResource::new(resource_type, state.to_value())])
    }

    async fn validate_data_source_config(
        &self,
        data_source_type: &str,
        config: Value,
    ) -> Result<Vec<Diagnostic>, ProviderError> {
        let data_source = self.registry.data_source(data_source_type)?;
        Ok(validate(&data_source.schema(), &config))
    }

    #[instrument(skip(self, config), name = "provider.read_data_source")]
    async fn read_data_source(
        &self,
        data_source_type: &str,
        config: Value,
    ) -> Result<Value, ProviderError> {
        let data_source = self.registry.data_source(data_source_type)?;
        if let Some(err) = crate::validation::diagnostics_to_error(&validate(&data_source.schema(), &config)) {
            return Err(err);
        }

        let config = InstanceState::from_value(&config)?;
        let deadline = Instant::now() + self.timeouts.read;
        let state = data_source.read(self.client()?, &config, deadline).await?;
        Ok(state.to_value())
    }
}
