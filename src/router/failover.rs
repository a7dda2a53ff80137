//! Failover Policy
//!
//! Model-level chains within a provider and provider-level edges between
//! providers. Read-only after construction. Every candidate is checked against
//! the call's tried set, so traversal terminates even on cyclic edges.

use crate::api::Purpose;
use crate::config::{GatewayConfig, ProviderConfig, Tier};
use crate::router::entitlement::{EntitlementGate, ProviderTarget};
use crate::router::strategy::Route;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::debug;

/// (provider, model) pairs already attempted during one call
#[derive(Debug, Default, Clone)]
pub struct TriedSet {
    pairs: HashSet<(String, String)>,
}

impl TriedSet {
    /// Returns false when the pair was already present
    pub fn insert(&mut self, route: &Route) -> bool {
        self.pairs
            .insert((route.provider.clone(), route.model.clone()))
    }

    pub fn contains(&self, provider: &str, model: &str) -> bool {
        self.pairs
            .iter()
            .any(|(p, m)| p == provider && m == model)
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

/// Outcome of asking for a provider-level fallback
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderStep {
    /// Try this route next
    Next(Route),

    /// No edge, or every model behind it was tried
    NoEdge,

    /// The entitlement gate refused the candidate
    Vetoed { candidate: String },

    /// Isolated mode removes all provider edges
    Isolated,
}

pub struct FailoverPolicy {
    providers: HashMap<String, ProviderConfig>,
    edges: HashMap<String, String>,
    isolated: bool,
    gate: Arc<dyn EntitlementGate>,
}

impl FailoverPolicy {
    /// Build chains from config; every edge is made bidirectional unless the
    /// target already declares its own fallback
    pub fn from_config(config: &GatewayConfig, gate: Arc<dyn EntitlementGate>) -> Self {
        let mut edges: HashMap<String, String> = config
            .providers
            .iter()
            .filter_map(|(name, p)| p.fallback_provider.clone().map(|to| (name.clone(), to)))
            .collect();

        let declared: Vec<(String, String)> =
            edges.iter().map(|(a, b)| (a.clone(), b.clone())).collect();
        for (from, to) in declared {
            edges.entry(to).or_insert(from);
        }

        Self {
            providers: config.providers.clone(),
            edges,
            isolated: config.routing.isolated_mode,
            gate,
        }
    }

    pub fn is_isolated(&self) -> bool {
        self.isolated
    }

    /// Provider this one fails over to, ignoring gate and isolation
    pub fn edge(&self, provider: &str) -> Option<&str> {
        self.edges.get(provider).map(String::as_str)
    }

    /// Next alternate model on the same provider; walks the list once
    pub fn next_model(&self, provider: &str, current: &str, tried: &TriedSet) -> Option<String> {
        let chain = &self.providers.get(provider)?.fallback_models;
        let start = chain
            .iter()
            .position(|m| m == current)
            .map_or(0, |idx| idx + 1);

        chain[start..]
            .iter()
            .find(|m| m.as_str() != current && !tried.contains(provider, m))
            .cloned()
    }

    /// Cross-provider fallback for a call of the given purpose and tier
    pub fn next_provider(
        &self,
        provider: &str,
        purpose: Purpose,
        tier: Tier,
        tried: &TriedSet,
    ) -> ProviderStep {
        if self.isolated {
            return ProviderStep::Isolated;
        }

        let Some(candidate) = self.edges.get(provider) else {
            return ProviderStep::NoEdge;
        };
        let Some(config) = self.providers.get(candidate) else {
            return ProviderStep::NoEdge;
        };

        if !self
            .gate
            .allows(&ProviderTarget::new(candidate, config.kind), tier)
        {
            debug!(from = provider, candidate = %candidate, ?tier, "failover vetoed by entitlement");
            return ProviderStep::Vetoed {
                candidate: candidate.clone(),
            };
        }

        let preferred = [config.model_for(purpose), config.default_model.as_str()];
        preferred
            .into_iter()
            .chain(config.fallback_models.iter().map(String::as_str))
            .find(|m| !tried.contains(candidate, m))
            .map_or(ProviderStep::NoEdge, |m| {
                ProviderStep::Next(Route::new(candidate.clone(), m))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ProviderKind, RoutingConfig};
    use crate::router::entitlement::{AllowAll, TierGate};

    fn config(isolated: bool) -> GatewayConfig {
        let mut config = GatewayConfig {
            routing: RoutingConfig {
                isolated_mode: isolated,
                ..RoutingConfig::default()
            },
            ..GatewayConfig::default()
        };
        config.providers.insert(
            "groq".to_string(),
            ProviderConfig::new(ProviderKind::Cloud, "https://api.groq.com", "big")
                .with_fallback_models(["medium", "small"])
                .with_fallback_provider("ollama"),
        );
        config.providers.insert(
            "ollama".to_string(),
            ProviderConfig::new(ProviderKind::Local, "http://localhost:11434", "llama3")
                .with_fallback_models(["phi3"])
                .with_min_tier(Tier::Elite),
        );
        config
    }

    fn policy(isolated: bool) -> FailoverPolicy {
        FailoverPolicy::from_config(&config(isolated), Arc::new(AllowAll))
    }

    #[test]
    fn test_model_chain_walks_once() {
        let policy = policy(false);
        let tried = TriedSet::default();

        assert_eq!(policy.next_model("groq", "big", &tried).as_deref(), Some("medium"));
        assert_eq!(policy.next_model("groq", "medium", &tried).as_deref(), Some("small"));
        assert_eq!(policy.next_model("groq", "small", &tried), None);
        assert_eq!(policy.next_model("nobody", "big", &tried), None);
    }

    #[test]
    fn test_model_chain_skips_tried() {
        let policy = policy(false);
        let mut tried = TriedSet::default();
        tried.insert(&Route::new("groq", "medium"));

        assert_eq!(policy.next_model("groq", "big", &tried).as_deref(), Some("small"));
    }

    #[test]
    fn test_edges_are_bidirectional() {
        let policy = policy(false);
        assert_eq!(policy.edge("groq"), Some("ollama"));
        assert_eq!(policy.edge("ollama"), Some("groq"));
    }

    #[test]
    fn test_provider_fallback_uses_purpose_model() {
        let policy = policy(false);
        let step = policy.next_provider("groq", Purpose::DeepReasoning, Tier::Elite, &TriedSet::default());
        assert_eq!(step, ProviderStep::Next(Route::new("ollama", "llama3")));
    }

    #[test]
    fn test_provider_fallback_never_repeats_pairs() {
        let policy = policy(false);
        let mut tried = TriedSet::default();
        for model in ["big", "medium", "small"] {
            tried.insert(&Route::new("groq", model));
        }

        let step = policy.next_provider("ollama", Purpose::FastScoring, Tier::Elite, &tried);
        assert_eq!(step, ProviderStep::NoEdge);
    }

    #[test]
    fn test_entitlement_veto() {
        let config = config(false);
        let policy = FailoverPolicy::from_config(&config, Arc::new(TierGate::from_config(&config)));

        let step = policy.next_provider("groq", Purpose::FastScoring, Tier::Pro, &TriedSet::default());
        assert_eq!(
            step,
            ProviderStep::Vetoed {
                candidate: "ollama".to_string()
            }
        );
    }

    #[test]
    fn test_isolated_removes_edges() {
        let policy = policy(true);
        let step = policy.next_provider("ollama", Purpose::FastScoring, Tier::Elite, &TriedSet::default());
        assert_eq!(step, ProviderStep::Isolated);

        // model-level fallback still works
        assert_eq!(
            policy.next_model("ollama", "llama3", &TriedSet::default()).as_deref(),
            Some("phi3")
        );
    }
}
