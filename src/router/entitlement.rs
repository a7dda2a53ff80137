//! Entitlement Gate
//!
//! Decides whether a caller tier may route to a provider. The gate is queried
//! synchronously and must be free of side effects.

use crate::config::{GatewayConfig, ProviderKind, Tier};
use std::collections::HashMap;

/// Provider a route would move to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProviderTarget<'a> {
    pub name: &'a str,
    pub kind: ProviderKind,
}

impl<'a> ProviderTarget<'a> {
    pub fn new(name: &'a str, kind: ProviderKind) -> Self {
        Self { name, kind }
    }
}

/// Veto over provider edges
pub trait EntitlementGate: Send + Sync {
    fn allows(&self, target: &ProviderTarget<'_>, tier: Tier) -> bool;
}

impl<F> EntitlementGate for F
where
    F: Fn(&ProviderTarget<'_>, Tier) -> bool + Send + Sync,
{
    fn allows(&self, target: &ProviderTarget<'_>, tier: Tier) -> bool {
        self(target, tier)
    }
}

/// Gate that never vetoes
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl EntitlementGate for AllowAll {
    fn allows(&self, _target: &ProviderTarget<'_>, _tier: Tier) -> bool {
        true
    }
}

/// Minimum tier per provider, read from `min_tier`
#[derive(Debug, Clone, Default)]
pub struct TierGate {
    min_tiers: HashMap<String, Tier>,
}

impl TierGate {
    pub fn from_config(config: &GatewayConfig) -> Self {
        let min_tiers = config
            .providers
            .iter()
            .filter_map(|(name, p)| p.min_tier.map(|tier| (name.clone(), tier)))
            .collect();
        Self { min_tiers }
    }
}

impl EntitlementGate for TierGate {
    fn allows(&self, target: &ProviderTarget<'_>, tier: Tier) -> bool {
        self.min_tiers
            .get(target.name)
            .map_or(true, |required| tier >= *required)
    }
}
