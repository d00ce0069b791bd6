//! Read-only lookups.

use async_trait::async_trait;
use tokio::time::Instant;

use crate::client::DatadogClient;
use crate::error::ProviderError;
use crate::schema::Schema;
use crate::state::InstanceState;

/// A data source: reads remote data into state without managing it.
#[async_trait]
pub trait DataSource: Send + Sync {
    /// The type name, e.g. `datadog_monitors`.
    fn type_name(&self) -> &'static str;

    /// The attribute schema.
    fn schema(&self) -> Schema;

    /// Resolve `config` into state. The returned state must carry a stable,
    /// non-empty ID.
    async fn read(
        &self,
        client: &DatadogClient,
        config: &InstanceState,
        deadline: Instant,
    ) -> Result<InstanceState, ProviderError>;
}
