//! The table of resource and data source types the provider serves.
//!
//! A [`Registry`] is built once at startup and only read afterwards.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::config::ProviderConfig;
use crate::data_source::DataSource;
use crate::data_sources;
use crate::error::ProviderError;
use crate::resource::Resource;
use crate::resources;
use crate::schema::ProviderSchema;

/// Resource and data source types keyed by type name.
#[derive(Clone, Default)]
pub struct Registry {
    resources: BTreeMap<&'static str, Arc<dyn Resource>>,
    data_sources: BTreeMap<&'static str, Arc<dyn DataSource>>,
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("resources", &self.resources.keys().collect::<Vec<_>>())
            .field("data_sources", &self.data_sources.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Registry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Every built-in Datadog resource and data source.
    pub fn datadog() -> Self {
        Self::new()
            .with_resource(resources::monitor::Monitor)
            .with_resource(resources::monitor_json::MonitorJson::new())
            .with_resource(resources::dashboard_json::DashboardJson::new())
            .with_resource(resources::service_definition::ServiceDefinitionYaml::new())
            .with_resource(resources::software_catalog::SoftwareCatalog::new())
            .with_resource(resources::slack_channel::SlackChannel)
            .with_resource(resources::logs_order::LogsIndexOrder)
            .with_resource(resources::logs_order::LogsPipelineOrder)
            .with_resource(resources::role::Role)
            .with_resource(resources::service_account::ServiceAccount)
            .with_resource(resources::api_key::ApiKey)
            .with_resource(resources::rum_application::RumApplication)
            .with_data_source(data_sources::monitors::Monitors)
            .with_data_source(data_sources::role::RoleLookup)
    }

    /// Register a resource type. A later registration under the same name
    /// replaces the earlier one.
    pub fn with_resource(mut self, resource: impl Resource + 'static) -> Self {
        self.resources.insert(resource.type_name(), Arc::new(resource));
        self
    }

    /// Register a data source type.
    pub fn with_data_source(mut self, data_source: impl DataSource + 'static) -> Self {
        self.data_sources
            .insert(data_source.type_name(), Arc::new(data_source));
        self
    }

    /// Look up a resource type.
    pub fn resource(&self, type_name: &str) -> Result<&dyn Resource, ProviderError> {
        self.resources
            .get(type_name)
            .map(|r| r.as_ref())
            .ok_or_else(|| ProviderError::UnknownResource(type_name.to_string()))
    }

    /// Look up a data source type.
    pub fn data_source(&self, type_name: &str) -> Result<&dyn DataSource, ProviderError> {
        self.data_sources
            .get(type_name)
            .map(|d| d.as_ref())
            .ok_or_else(|| ProviderError::UnknownResource(format!("data source {}", type_name)))
    }

    /// Resource type names, sorted.
    pub fn resource_names(&self) -> Vec<&'static str> {
        self.resources.keys().copied().collect()
    }

    /// Data source type names, sorted.
    pub fn data_source_names(&self) -> Vec<&'static str> {
        self.data_sources.keys().copied().collect()
    }

    /// The combined schema, including the provider configuration block.
    pub fn provider_schema(&self) -> ProviderSchema {
        let schema = ProviderSchema::new().with_provider_config(ProviderConfig::schema());
        let schema = self
            .resources
            .iter()
            .fold(schema, |schema, (name, r)| schema.with_resource(*name, r.schema()));
        self.data_sources
            .iter()
            .fold(schema, |schema, (name, d)| schema.with_data_source(*name, d.schema()))
    }
}
