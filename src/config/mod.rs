//! Configuration Module
//!
//! Provider, routing and recovery configuration.

pub mod loader;
pub mod provider;

pub use loader::ConfigLoader;
pub use provider::{GatewayConfig, ProviderConfig, ProviderKind, RoutingConfig, Tier};
