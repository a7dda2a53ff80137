//! Router Module
//!
//! Credential pools, initial routing, entitlement and failover policy.

pub mod entitlement;
pub mod failover;
pub mod key_pool;
pub mod strategy;

pub use entitlement::{AllowAll, EntitlementGate, ProviderTarget, TierGate};
pub use failover::{FailoverPolicy, ProviderStep, TriedSet};
pub use key_pool::{Credential, KeyPool, PoolMetrics};
pub use strategy::{Route, RoutingPolicy};
