//! Data source implementations.

pub mod monitors;
pub mod role;
