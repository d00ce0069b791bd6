//! Translation between instance state and Datadog wire payloads.
//!
//! - [`typed`]: attribute-by-attribute mapping for schema-modelled resources.
//! - [`opaque`]: whole-document JSON/YAML resources whose payload is a
//!   user-supplied string.

pub mod opaque;
pub mod typed;

pub use opaque::{OpaqueFormat, Scrubber};
pub use typed::{StateWriter, WireBuilder};
