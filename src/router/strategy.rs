//! Initial Routing
//!
//! Resolves the first (provider, model) pair of a call from the caller's
//! override, purpose and tier, and the global isolated-mode flag.

use crate::api::Purpose;
use crate::config::{GatewayConfig, ProviderConfig, Tier};
use crate::error::{GatewayError, Result};
use crate::router::entitlement::{EntitlementGate, ProviderTarget};
use std::fmt;

/// A (provider, model) pair one attempt is sent to
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Route {
    pub provider: String,
    pub model: String,
}

impl Route {
    pub fn new(provider: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            model: model.into(),
        }
    }

    /// Split "provider/model"; everything after the first slash is the model
    pub fn parse(model_string: &str) -> Option<Self> {
        let (provider, model) = model_string.split_once('/')?;
        if provider.is_empty() || model.is_empty() {
            return None;
        }
        Some(Self::new(provider, model))
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.provider, self.model)
    }
}

/// Chooses where a call starts
pub struct RoutingPolicy {
    config: GatewayConfig,
}

impl RoutingPolicy {
    pub fn new(config: GatewayConfig) -> Self {
        Self { config }
    }

    pub fn isolated(&self) -> bool {
        self.config.routing.isolated_mode
    }

    fn provider(&self, name: &str) -> Result<&ProviderConfig> {
        self.config
            .providers
            .get(name)
            .ok_or_else(|| GatewayError::ProviderNotFound(name.to_string()))
    }

    /// Resolve the initial route of a call
    pub fn select(
        &self,
        purpose: Purpose,
        tier: Tier,
        model_override: Option<&str>,
        gate: &dyn EntitlementGate,
    ) -> Result<Route> {
        if self.isolated() {
            return self.select_isolated(purpose, model_override);
        }

        if let Some(requested) = model_override {
            return self.select_override(requested);
        }

        let default = self
            .config
            .default_provider()
            .ok_or_else(|| GatewayError::Config("no providers configured".to_string()))?;

        let name = if self.allowed(default, tier, gate) {
            default
        } else {
            self.config
                .sorted_names()
                .into_iter()
                .find(|name| self.allowed(name, tier, gate))
                .ok_or_else(|| {
                    GatewayError::NoEligibleFallback {
                        attempts: 0,
                        last: format!("tier {:?} may not use any configured provider", tier),
                    }
                })?
        };

        let provider = self.provider(name)?;
        Ok(Route::new(name, provider.model_for(purpose)))
    }

    fn select_isolated(&self, purpose: Purpose, model_override: Option<&str>) -> Result<Route> {
        let offline = self.config.offline_provider().ok_or_else(|| {
            GatewayError::IsolationViolation(
                "isolated mode is on but no offline-capable provider is configured".to_string(),
            )
        })?;
        let provider = self.provider(offline)?;

        match model_override {
            None => Ok(Route::new(offline, provider.model_for(purpose))),
            Some(requested) => match Route::parse(requested) {
                Some(route) if self.config.providers.contains_key(&route.provider) => {
                    if route.provider == offline {
                        Ok(route)
                    } else {
                        Err(GatewayError::IsolationViolation(format!(
                            "model '{}' is served by '{}', only '{}' is reachable in isolated mode",
                            requested, route.provider, offline
                        )))
                    }
                }
                _ => Ok(Route::new(offline, requested)),
            },
        }
    }

    fn select_override(&self, requested: &str) -> Result<Route> {
        if let Some(route) = Route::parse(requested) {
            if self.config.providers.contains_key(&route.provider) {
                return Ok(route);
            }
        }

        // A bare model name: whoever serves it, else the default provider
        let owner = self
            .config
            .sorted_names()
            .into_iter()
            .find(|name| self.config.providers[*name].serves_model(requested))
            .or_else(|| self.config.default_provider())
            .ok_or_else(|| GatewayError::Config("no providers configured".to_string()))?;

        Ok(Route::new(owner, requested))
    }

    fn allowed(&self, name: &str, tier: Tier, gate: &dyn EntitlementGate) -> bool {
        match self.config.providers.get(name) {
            Some(provider) => gate.allows(&ProviderTarget::new(name, provider.kind), tier),
            None => false,
        }
    }
}
