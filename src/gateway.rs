//! Gateway
//!
//! The single entry point for completions. Each call runs its own state
//! machine over shared, read-mostly routing state:
//!
//! ```text
//! SELECT -> ATTEMPT -> SUCCESS
//!              |
//!              +-> Auth / RateLimited -> cool key -> ATTEMPT (same route, next key)
//!              +-> Unavailable        -> next model -> ATTEMPT
//!              +-> Exhausted / no key / no model left -> next provider -> ATTEMPT
//!              +-> Fatal / nothing left -> terminal error
//! ```
//!
//! Only [`KeyPool`] state is mutated concurrently; everything else is fixed at
//! construction.

use crate::api::completion::truncate_context;
use crate::api::{CallResult, CompletionParams, Message, Purpose};
use crate::billing::{BillingSink, LogBillingSink, UsageRecord};
use crate::client::HttpClient;
use crate::config::{ConfigLoader, GatewayConfig, ProviderKind, Tier};
use crate::context::CallContext;
use crate::error::{ClassifiedError, GatewayError, Result};
use crate::provider::{build_client, AttemptRequest, Completion, ProviderClient};
use crate::router::{
    EntitlementGate, FailoverPolicy, KeyPool, PoolMetrics, ProviderStep, Route, RoutingPolicy,
    TierGate, TriedSet,
};
use backoff::ExponentialBackoffBuilder;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Assembles a [`Gateway`]; anything not supplied is built from configuration
pub struct GatewayBuilder {
    config: GatewayConfig,
    clients: HashMap<String, Arc<dyn ProviderClient>>,
    keys: HashMap<String, Vec<String>>,
    gate: Option<Arc<dyn EntitlementGate>>,
    billing: Option<Arc<dyn BillingSink>>,
}

impl GatewayBuilder {
    /// Use `client` instead of the HTTP client built for `provider`
    pub fn with_client(mut self, provider: impl Into<String>, client: Arc<dyn ProviderClient>) -> Self {
        self.clients.insert(provider.into(), client);
        self
    }

    /// Use `keys` instead of the keys found in the environment
    pub fn with_keys<I, S>(mut self, provider: impl Into<String>, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.keys
            .insert(provider.into(), keys.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_entitlement(mut self, gate: Arc<dyn EntitlementGate>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn with_billing(mut self, sink: Arc<dyn BillingSink>) -> Self {
        self.billing = Some(sink);
        self
    }

    pub fn build(mut self) -> Result<Gateway> {
        self.config.validate()?;

        if let Some(unknown) = self
            .clients
            .keys()
            .chain(self.keys.keys())
            .find(|name| !self.config.providers.contains_key(*name))
        {
            return Err(GatewayError::ProviderNotFound(unknown.clone()));
        }

        let mut shared_http: Option<HttpClient> = None;
        let mut clients = HashMap::new();
        let mut pools = HashMap::new();

        for (name, provider) in &self.config.providers {
            let client = match self.clients.remove(name) {
                Some(client) => client,
                None => {
                    let http = match shared_http.clone() {
                        Some(http) => http,
                        None => {
                            let created = HttpClient::new()?;
                            shared_http = Some(created.clone());
                            created
                        }
                    };
                    build_client(name, provider, http)
                }
            };

            let keys = match self.keys.remove(name) {
                Some(keys) => Some(keys),
                None if client.kind() == ProviderKind::Cloud => Some(provider.get_api_keys()),
                None => None,
            };
            if let Some(keys) = keys {
                let pool = KeyPool::new(name.clone(), keys);
                if pool.is_empty() {
                    warn!(provider = %name, "no credentials configured");
                }
                pools.insert(name.clone(), pool);
            }

            clients.insert(name.clone(), client);
        }

        let gate = self
            .gate
            .unwrap_or_else(|| Arc::new(TierGate::from_config(&self.config)));
        let failover = FailoverPolicy::from_config(&self.config, gate.clone());

        info!(
            providers = clients.len(),
            pools = pools.len(),
            isolated = self.config.routing.isolated_mode,
            "gateway ready"
        );

        Ok(Gateway {
            max_attempts: self.config.routing.max_attempts,
            rate_limit_cooldown: self.config.routing.rate_limit_cooldown(),
            auth_cooldown: self.config.routing.auth_cooldown(),
            max_prompt_chars: self.config.routing.max_prompt_chars,
            truncated_prompt_chars: self.config.routing.truncated_prompt_chars,
            routing: RoutingPolicy::new(self.config),
            failover,
            gate,
            clients,
            pools,
            billing: self.billing.unwrap_or_else(|| Arc::new(LogBillingSink)),
        })
    }
}

/// Resilient completion front-end over every configured provider
pub struct Gateway {
    routing: RoutingPolicy,
    failover: FailoverPolicy,
    gate: Arc<dyn EntitlementGate>,
    clients: HashMap<String, Arc<dyn ProviderClient>>,
    pools: HashMap<String, KeyPool>,
    billing: Arc<dyn BillingSink>,
    max_attempts: usize,
    rate_limit_cooldown: Duration,
    auth_cooldown: Duration,
    max_prompt_chars: usize,
    truncated_prompt_chars: usize,
}

/// Mutable bookkeeping of one call
struct CallState {
    route: Route,
    tried: TriedSet,
    attempts: usize,
    in_pool_retries: usize,
    last_failure: String,
}

impl CallState {
    fn move_to(&mut self, route: Route) {
        self.route = route;
        self.in_pool_retries = 0;
    }
}

impl Gateway {
    pub fn builder(config: GatewayConfig) -> GatewayBuilder {
        GatewayBuilder {
            config,
            clients: HashMap::new(),
            keys: HashMap::new(),
            gate: None,
            billing: None,
        }
    }

    /// Gateway over the layered configuration files and the environment
    pub fn from_env() -> Result<Self> {
        Self::from_config(ConfigLoader::new()?.into_config()?)
    }

    pub fn from_config(config: GatewayConfig) -> Result<Self> {
        Self::builder(config).build()
    }

    /// Complete `messages` with default sampling parameters
    pub async fn complete(
        &self,
        ctx: &CallContext,
        purpose: Purpose,
        messages: Vec<Message>,
        model_override: Option<&str>,
    ) -> Result<CallResult> {
        self.complete_with_params(ctx, purpose, messages, model_override, &CompletionParams::default())
            .await
    }

    pub async fn complete_with_params(
        &self,
        ctx: &CallContext,
        purpose: Purpose,
        mut messages: Vec<Message>,
        model_override: Option<&str>,
        params: &CompletionParams,
    ) -> Result<CallResult> {
        ctx.check()?;

        if let Some(chars) = truncate_context(
            &mut messages,
            params,
            self.max_prompt_chars,
            self.truncated_prompt_chars,
        ) {
            warn!(
                chars,
                limit = self.max_prompt_chars,
                kept = self.truncated_prompt_chars,
                "context too large; last message truncated"
            );
        }

        let route = self
            .routing
            .select(purpose, ctx.tier, model_override, self.gate.as_ref())?;
        debug!(route = %route, %purpose, tier = ?ctx.tier, "route selected");

        let mut call = CallState {
            route,
            tried: TriedSet::default(),
            attempts: 0,
            in_pool_retries: 0,
            last_failure: String::new(),
        };

        loop {
            if call.attempts >= self.max_attempts {
                warn!(attempts = call.attempts, last = %call.last_failure, "attempt ceiling reached");
                return Err(GatewayError::NoEligibleFallback {
                    attempts: call.attempts,
                    last: call.last_failure,
                });
            }
            ctx.check()?;

            call.attempts += 1;
            call.tried.insert(&call.route);

            let client = self
                .clients
                .get(&call.route.provider)
                .ok_or_else(|| GatewayError::ProviderNotFound(call.route.provider.clone()))?;
            let pool = self.pools.get(&call.route.provider);

            let credential = match pool {
                Some(pool) => match pool.next() {
                    Some(credential) => Some(credential),
                    None => {
                        call.last_failure = if pool.is_empty() {
                            format!("no credentials configured for '{}'", call.route.provider)
                        } else {
                            format!("all credentials for '{}' are cooling", call.route.provider)
                        };
                        self.provider_failover(&mut call, purpose, ctx.tier, !pool.is_empty())?;
                        continue;
                    }
                },
                None => None,
            };

            let attempt = AttemptRequest {
                credential: credential.as_ref(),
                model: &call.route.model,
                messages: &messages,
                params,
            };

            let outcome = match ctx.guard(client.complete(ctx, attempt)).await {
                Ok(outcome) => outcome,
                Err(abort) => {
                    if let Some(pool) = pool {
                        pool.record_aborted();
                    }
                    info!(route = %call.route, ?abort, "call aborted by caller");
                    return Err(abort.into());
                }
            };

            let err = match outcome {
                Ok(completion) => {
                    if let Some(pool) = pool {
                        pool.record_success();
                    }
                    return Ok(self.finish(call, completion));
                }
                Err(err) => err,
            };

            if let Some(pool) = pool {
                pool.record_failure();
            }
            warn!(
                route = %call.route,
                attempt = call.attempts,
                kind = err.kind(),
                error = %err,
                "attempt failed"
            );
            call.last_failure = format!("{}: {}", call.route, err);

            match (&err, pool.zip(credential.as_ref())) {
                (ClassifiedError::Fatal(message), _) => {
                    return Err(GatewayError::Fatal {
                        provider: call.route.provider.clone(),
                        message: message.clone(),
                    });
                }
                (ClassifiedError::Auth(_) | ClassifiedError::RateLimited { .. }, Some((pool, credential))) => {
                    let cooldown = match &err {
                        ClassifiedError::RateLimited { retry_after } => {
                            retry_after
                                .unwrap_or(self.rate_limit_cooldown)
                                .min(self.auth_cooldown)
                        }
                        _ => self.auth_cooldown,
                    };
                    pool.mark_cooling(credential, cooldown);
                    call.in_pool_retries += 1;

                    if pool.is_healthy() && call.in_pool_retries < pool.len() {
                        debug!(route = %call.route, retry = call.in_pool_retries, "retrying with next key");
                        continue;
                    }
                    return Err(GatewayError::AllCredentialsCooling {
                        provider: call.route.provider.clone(),
                        retry_after: pool.min_wait(),
                    });
                }
                (ClassifiedError::Unavailable(_), _) => {
                    let provider = call.route.provider.clone();
                    match self.failover.next_model(&provider, &call.route.model, &call.tried) {
                        Some(model) => {
                            info!(provider = %provider, from = %call.route.model, to = %model, "falling back to alternate model");
                            call.move_to(Route::new(provider, model));
                        }
                        None => self.provider_failover(&mut call, purpose, ctx.tier, false)?,
                    }
                }
                _ => self.provider_failover(&mut call, purpose, ctx.tier, false)?,
            }
        }
    }

    /// Retry retryable terminal errors with exponential backoff for up to `budget`
    pub async fn complete_with_backoff(
        &self,
        ctx: &CallContext,
        purpose: Purpose,
        messages: Vec<Message>,
        model_override: Option<&str>,
        params: &CompletionParams,
        budget: Duration,
    ) -> Result<CallResult> {
        let started = Instant::now();
        let policy = ExponentialBackoffBuilder::new()
            .with_initial_interval(Duration::from_millis(500))
            .with_max_interval(Duration::from_secs(30))
            .with_max_elapsed_time(Some(budget))
            .build();

        let messages = &messages;
        let retrying = backoff::future::retry(policy, move || async move {
            self.complete_with_params(ctx, purpose, messages.clone(), model_override, params)
                .await
                .map_err(|err| {
                    if !err.is_retryable() {
                        return backoff::Error::permanent(err);
                    }
                    match err.retry_after() {
                        Some(wait) if started.elapsed().saturating_add(wait) > budget => {
                            backoff::Error::permanent(err)
                        }
                        Some(wait) => {
                            debug!(wait_ms = wait.as_millis() as u64, "waiting for key recovery");
                            backoff::Error::retry_after(err, wait)
                        }
                        None => backoff::Error::transient(err),
                    }
                })
        });

        ctx.guard(retrying).await?
    }

    /// Metrics of every key pool, ordered by provider
    pub fn pool_metrics(&self) -> Vec<PoolMetrics> {
        let mut metrics: Vec<PoolMetrics> = self.pools.values().map(KeyPool::metrics).collect();
        metrics.sort_by(|a, b| a.provider.cmp(&b.provider));
        metrics
    }

    pub fn pool(&self, provider: &str) -> Option<&KeyPool> {
        self.pools.get(provider)
    }

    /// Configured provider names, sorted
    pub fn providers(&self) -> Vec<String> {
        let mut names: Vec<String> = self.clients.keys().cloned().collect();
        names.sort();
        names
    }

    fn provider_failover(
        &self,
        call: &mut CallState,
        purpose: Purpose,
        tier: Tier,
        starved: bool,
    ) -> Result<()> {
        let from = call.route.provider.clone();
        match self.failover.next_provider(&from, purpose, tier, &call.tried) {
            ProviderStep::Next(next) => {
                info!(from = %call.route, to = %next, "failing over to provider");
                call.move_to(next);
                Ok(())
            }
            ProviderStep::Isolated => Err(GatewayError::IsolationViolation(format!(
                "'{}' cannot serve the call ({}) and isolated mode forbids leaving it",
                from, call.last_failure
            ))),
            ProviderStep::Vetoed { candidate } => {
                call.last_failure = format!(
                    "{}; failover to '{}' not permitted for tier {:?}",
                    call.last_failure, candidate, tier
                );
                Err(self.exhausted(call, &from, starved))
            }
            ProviderStep::NoEdge => Err(self.exhausted(call, &from, starved)),
        }
    }

    fn exhausted(&self, call: &CallState, provider: &str, starved: bool) -> GatewayError {
        match self.pools.get(provider) {
            Some(pool) if starved => GatewayError::AllCredentialsCooling {
                provider: provider.to_string(),
                retry_after: pool.min_wait(),
            },
            _ => GatewayError::NoEligibleFallback {
                attempts: call.attempts,
                last: call.last_failure.clone(),
            },
        }
    }

    fn finish(&self, call: CallState, completion: Completion) -> CallResult {
        let Route { provider, model } = call.route;
        info!(provider = %provider, model = %model, attempts = call.attempts, "completion succeeded");

        let record = UsageRecord {
            provider: provider.clone(),
            model: model.clone(),
            input_tokens: completion.usage.prompt_tokens,
            output_tokens: completion.usage.completion_tokens,
        };
        let sink = self.billing.clone();
        tokio::spawn(async move {
            if let Err(err) = sink.record_usage(record).await {
                warn!(error = %err, "billing report failed");
            }
        });

        CallResult {
            text: completion.text,
            input_tokens: completion.usage.prompt_tokens,
            output_tokens: completion.usage.completion_tokens,
            provider_used: provider,
            model_used: model,
            attempts: call.attempts,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProviderConfig;
    use async_trait::async_trait;

    struct Echo;

    #[async_trait]
    impl ProviderClient for Echo {
        fn kind(&self) -> ProviderKind {
            ProviderKind::Local
        }

        async fn complete(
            &self,
            _ctx: &CallContext,
            attempt: AttemptRequest<'_>,
        ) -> std::result::Result<Completion, ClassifiedError> {
            Ok(Completion::new(
                format!("{} says hi", attempt.model),
                crate::api::Usage {
                    prompt_tokens: 2,
                    completion_tokens: 3,
                },
            ))
        }
    }

    fn config() -> GatewayConfig {
        let mut config = GatewayConfig::default();
        config.providers.insert(
            "ollama".to_string(),
            ProviderConfig::new(ProviderKind::Local, "http://localhost:11434/v1", "llama3"),
        );
        config
    }

    #[tokio::test]
    async fn test_local_provider_needs_no_pool() {
        let gateway = Gateway::builder(config())
            .with_client("ollama", Arc::new(Echo))
            .build()
            .unwrap();

        assert!(gateway.pool("ollama").is_none());
        assert!(gateway.pool_metrics().is_empty());
        assert_eq!(gateway.providers(), vec!["ollama".to_string()]);

        let result = gateway
            .complete(&CallContext::new(Tier::Hobby), Purpose::FastScoring, vec![Message::user("hi")], None)
            .await
            .unwrap();
        assert_eq!(result.text, "llama3 says hi");
        assert_eq!((result.input_tokens, result.output_tokens), (2, 3));
        assert_eq!(result.attempts, 1);
    }

    #[test]
    fn test_unknown_provider_rejected() {
        let err = Gateway::builder(config())
            .with_keys("groq", ["sk-1"])
            .build()
            .err()
            .unwrap();
        assert!(matches!(err, GatewayError::ProviderNotFound(name) if name == "groq"));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = config();
        config.routing.max_attempts = 0;
        assert!(matches!(
            Gateway::from_config(config),
            Err(GatewayError::Config(_))
        ));
    }
}
