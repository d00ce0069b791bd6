//! Hemmer Provider for Datadog
//!
//! This crate lets a Hemmer host engine manage Datadog objects declaratively.
//! It validates configuration against typed schemas, computes plans, and
//! reconciles state with the Datadog REST API.
//!
//! # Overview
//!
//! The crate provides:
//!
//! - **Schema types**: Attribute, block and provider schemas, with validators,
//!   defaults, diff suppressors and state normalizers
//! - **Plan engine**: Computes create, update, replace and no-op plans from
//!   prior state and configuration
//! - **Resource lifecycle**: One driver runs create, read, update, delete and
//!   import for every resource, with read-after-write and deadline handling
//! - **Datadog client**: Authenticated HTTP with retry on rate limiting and
//!   gateway failures
//! - **Resources and data sources**: Monitors, dashboards, catalog entries,
//!   Slack channels, log orders, roles, service accounts, API keys and RUM
//!   applications
//! - **Logging**: Integration with `tracing` for structured logging
//!
//! # Quick Start
//!
//! ```ignore
//! use hemmer_provider_datadog::{DatadogProvider, ProviderService};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), hemmer_provider_datadog::ProviderError> {
//!     hemmer_provider_datadog::init_logging();
//!
//!     let provider = DatadogProvider::new();
//!     provider.configure(json!({})).await?; // keys from DD_API_KEY / DD_APP_KEY
//!
//!     let config = json!({
//!         "name": "CPU high",
//!         "type": "metric alert",
//!         "query": "avg(last_5m):avg:system.cpu.user{*} > 90",
//!     });
//!     let plan = provider.plan("datadog_monitor", None, config).await?;
//!     let state = provider.create("datadog_monitor", plan.planned_state).await?;
//!     println!("created monitor {}", state["id"]);
//!     Ok(())
//! }
//! ```
//!
//! # Layout
//!
//! - [`service`]: the operations the host drives ([`ProviderService`])
//! - [`provider`]: [`DatadogProvider`], which dispatches those operations
//! - [`registry`]: the catalog of resource and data source types
//! - [`driver`]: the shared resource lifecycle
//! - [`resources`] and [`data_sources`]: the built-in types
//! - [`codec`]: state/wire translation and document scrubbing
//! - [`testing`]: an in-memory Datadog API and plan assertions

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod client;
pub mod codec;
pub mod config;
pub mod data_source;
pub mod data_sources;
pub mod diff;
pub mod driver;
pub mod error;
pub mod identity;
pub mod logging;
pub mod provider;
pub mod registry;
pub mod resource;
pub mod resources;
pub mod schema;
pub mod service;
pub mod state;
pub mod testing;
pub mod types;
pub mod validation;

// Re-export main types at crate root
pub use client::{DatadogClient, RetryPolicy};
pub use error::ProviderError;
pub use logging::{init_logging, init_logging_with_default, try_init_logging};
pub use provider::DatadogProvider;
pub use registry::Registry;
pub use schema::ProviderSchema;
pub use service::ProviderService;
pub use types::{AttributeChange, ImportedResource, PlanAction, PlanResult, ProviderMetadata};
pub use validation::{validate, validate_result};

// Re-export async_trait for convenience
pub use async_trait::async_trait;

// Re-export commonly used external types
pub use serde_json;
pub use tracing;
