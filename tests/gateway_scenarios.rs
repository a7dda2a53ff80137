//! End-to-end gateway behaviour against scripted in-memory providers.

use async_trait::async_trait;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use sidegate::{
    AllowAll, AttemptRequest, BillingSink, CallContext, CancelToken, ClassifiedError, Completion,
    CompletionParams, Credential, Gateway, GatewayConfig, GatewayError, Message, ProviderClient,
    ProviderConfig, ProviderKind, Purpose, RoutingConfig, Tier, Usage, UsageRecord,
};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

#[derive(Debug, Clone)]
enum Step {
    Reply(&'static str),
    Fail(ClassifiedError),
    Hang,
}

fn rate_limited() -> Step {
    Step::Fail(ClassifiedError::RateLimited { retry_after: None })
}

fn auth() -> Step {
    Step::Fail(ClassifiedError::Auth("invalid api key".to_string()))
}

fn unavailable() -> Step {
    Step::Fail(ClassifiedError::Unavailable("502 bad gateway".to_string()))
}

fn exhausted() -> Step {
    Step::Fail(ClassifiedError::Exhausted("insufficient_quota".to_string()))
}

fn fatal() -> Step {
    Step::Fail(ClassifiedError::Fatal("messages must not be empty".to_string()))
}

/// Provider that plays back a script, then repeats a fallback step
struct Scripted {
    kind: ProviderKind,
    script: Mutex<VecDeque<Step>>,
    otherwise: Step,
    calls: Mutex<Vec<(Option<String>, String)>>,
    last_messages: Mutex<Vec<String>>,
}

impl Scripted {
    fn new(kind: ProviderKind, script: Vec<Step>, otherwise: Step) -> Arc<Self> {
        Arc::new(Self {
            kind,
            script: Mutex::new(script.into()),
            otherwise,
            calls: Mutex::new(Vec::new()),
            last_messages: Mutex::new(Vec::new()),
        })
    }

    fn always(kind: ProviderKind, step: Step) -> Arc<Self> {
        Self::new(kind, Vec::new(), step)
    }

    fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    fn models(&self) -> Vec<String> {
        self.calls.lock().iter().map(|(_, m)| m.clone()).collect()
    }

    fn keys(&self) -> Vec<Option<String>> {
        self.calls.lock().iter().map(|(k, _)| k.clone()).collect()
    }
}

#[async_trait]
impl ProviderClient for Scripted {
    fn kind(&self) -> ProviderKind {
        self.kind
    }

    async fn complete(
        &self,
        _ctx: &CallContext,
        attempt: AttemptRequest<'_>,
    ) -> Result<Completion, ClassifiedError> {
        self.calls.lock().push((
            attempt.credential.map(|c| c.expose().to_string()),
            attempt.model.to_string(),
        ));
        if let Some(last) = attempt.messages.last() {
            self.last_messages.lock().push(last.content.to_string_content());
        }
        let step = self
            .script
            .lock()
            .pop_front()
            .unwrap_or_else(|| self.otherwise.clone());

        match step {
            Step::Reply(text) => Ok(Completion::new(
                text,
                Usage {
                    prompt_tokens: 11,
                    completion_tokens: 7,
                },
            )),
            Step::Fail(err) => Err(err),
            Step::Hang => std::future::pending().await,
        }
    }
}

fn config(isolated: bool) -> GatewayConfig {
    let mut config = GatewayConfig {
        routing: RoutingConfig {
            default_provider: Some("cloud".to_string()),
            offline_provider: Some("local".to_string()),
            isolated_mode: isolated,
            ..RoutingConfig::default()
        },
        ..GatewayConfig::default()
    };
    config.providers.insert(
        "cloud".to_string(),
        ProviderConfig::new(ProviderKind::Cloud, "https://api.example.com/v1", "primary")
            .with_fallback_models(["alt-1", "alt-2"])
            .with_fallback_provider("local"),
    );
    config.providers.insert(
        "local".to_string(),
        ProviderConfig::new(ProviderKind::Local, "http://localhost:11434/v1", "llama3")
            .with_min_tier(Tier::Elite),
    );
    config
}

fn gateway(config: GatewayConfig, cloud: &Arc<Scripted>, local: &Arc<Scripted>, keys: &[&str]) -> Gateway {
    Gateway::builder(config)
        .with_client("cloud", cloud.clone())
        .with_client("local", local.clone())
        .with_keys("cloud", keys.iter().copied())
        .build()
        .unwrap()
}

fn prompt() -> Vec<Message> {
    vec![Message::user("score this diff")]
}

fn elite() -> CallContext {
    CallContext::new(Tier::Elite)
}

#[tokio::test]
async fn rate_limited_keys_rotate_within_pool() {
    let cloud = Scripted::new(
        ProviderKind::Cloud,
        vec![rate_limited(), rate_limited()],
        Step::Reply("third time lucky"),
    );
    let local = Scripted::always(ProviderKind::Local, Step::Reply("local"));
    let gateway = gateway(config(false), &cloud, &local, &["k1", "k2", "k3"]);

    let result = gateway
        .complete(&elite(), Purpose::FastScoring, prompt(), None)
        .await
        .unwrap();

    assert_eq!(result.text, "third time lucky");
    assert_eq!(result.attempts, 3);
    assert_eq!(result.provider_used, "cloud");
    assert_eq!(result.model_used, "primary");
    assert_eq!(
        cloud.keys(),
        vec![Some("k1".to_string()), Some("k2".to_string()), Some("k3".to_string())]
    );
    assert_eq!(local.call_count(), 0);

    let pool = gateway.pool("cloud").unwrap();
    assert!(pool.is_cooling(&Credential::new("cloud", "k1")));
    assert!(pool.is_cooling(&Credential::new("cloud", "k2")));
    assert!(!pool.is_cooling(&Credential::new("cloud", "k3")));

    let metrics = pool.metrics();
    assert_eq!(metrics.cooling_keys, 2);
    assert_eq!(metrics.successful_requests, 1);
    assert_eq!(metrics.failed_requests, 2);
}

#[tokio::test]
async fn all_keys_revoked_reports_cooling_without_fallback() {
    let cloud = Scripted::always(ProviderKind::Cloud, auth());
    let local = Scripted::always(ProviderKind::Local, Step::Reply("local"));
    let gateway = gateway(config(false), &cloud, &local, &["k1", "k2", "k3"]);

    let err = gateway
        .complete(&elite(), Purpose::FastScoring, prompt(), None)
        .await
        .unwrap_err();

    match &err {
        GatewayError::AllCredentialsCooling { provider, retry_after } => {
            assert_eq!(provider, "cloud");
            let wait = retry_after.unwrap();
            assert!(wait > Duration::from_secs(23 * 3600));
        }
        other => panic!("expected AllCredentialsCooling, got {:?}", other),
    }
    assert!(err.is_retryable());
    assert_eq!(cloud.call_count(), 3);
    assert_eq!(cloud.models(), vec!["primary"; 3]);
    assert_eq!(local.call_count(), 0);
    assert!(!gateway.pool("cloud").unwrap().is_healthy());
}

#[tokio::test]
async fn unavailable_walks_models_then_fails_over() {
    let cloud = Scripted::always(ProviderKind::Cloud, unavailable());
    let local = Scripted::always(ProviderKind::Local, Step::Reply("from the basement"));
    let gateway = gateway(config(false), &cloud, &local, &["k1"]);

    let result = gateway
        .complete(&elite(), Purpose::DeepReasoning, prompt(), None)
        .await
        .unwrap();

    assert_eq!(result.attempts, 4);
    assert_eq!(result.provider_used, "local");
    assert_eq!(result.model_used, "llama3");
    assert_eq!(cloud.models(), vec!["primary", "alt-1", "alt-2"]);
    assert_eq!(local.call_count(), 1);
    assert_eq!(local.keys(), vec![None]);

    // transport failures never cool keys
    assert_eq!(gateway.pool("cloud").unwrap().metrics().cooling_keys, 0);
}

#[tokio::test]
async fn isolated_mode_never_reaches_cloud() {
    let cloud = Scripted::always(ProviderKind::Cloud, Step::Reply("cloud"));
    let local = Scripted::always(ProviderKind::Local, unavailable());
    let gateway = gateway(config(true), &cloud, &local, &["k1"]);

    let err = gateway
        .complete(&CallContext::new(Tier::Hobby), Purpose::FastScoring, prompt(), None)
        .await
        .unwrap_err();

    assert!(matches!(err, GatewayError::IsolationViolation(_)), "{:?}", err);
    assert!(!err.is_retryable());
    assert_eq!(local.call_count(), 1);
    assert_eq!(cloud.call_count(), 0);

    let err = gateway
        .complete(&elite(), Purpose::FastScoring, prompt(), Some("cloud/primary"))
        .await
        .unwrap_err();
    assert!(matches!(err, GatewayError::IsolationViolation(_)));
    assert_eq!(cloud.call_count(), 0);
}

#[tokio::test]
async fn fatal_stops_immediately() {
    let cloud = Scripted::always(ProviderKind::Cloud, fatal());
    let local = Scripted::always(ProviderKind::Local, Step::Reply("local"));
    let gateway = gateway(config(false), &cloud, &local, &["k1", "k2"]);

    let err = gateway
        .complete(&elite(), Purpose::FastScoring, prompt(), None)
        .await
        .unwrap_err();

    assert!(matches!(err, GatewayError::Fatal { ref provider, .. } if provider == "cloud"));
    assert!(!err.is_retryable());
    assert_eq!(cloud.call_count(), 1);
    assert_eq!(local.call_count(), 0);
    assert_eq!(gateway.pool("cloud").unwrap().metrics().cooling_keys, 0);
}

#[tokio::test]
async fn exhausted_fails_over_when_tier_allows() {
    let cloud = Scripted::always(ProviderKind::Cloud, exhausted());
    let local = Scripted::always(ProviderKind::Local, Step::Reply("local"));
    let gateway = gateway(config(false), &cloud, &local, &["k1", "k2"]);

    let result = gateway
        .complete(&elite(), Purpose::LiteFallback, prompt(), None)
        .await
        .unwrap();

    assert_eq!(result.provider_used, "local");
    assert_eq!(result.attempts, 2);
    assert_eq!(cloud.call_count(), 1);
}

#[tokio::test]
async fn entitlement_vetoes_failover() {
    let cloud = Scripted::always(ProviderKind::Cloud, exhausted());
    let local = Scripted::always(ProviderKind::Local, Step::Reply("local"));
    let gateway = gateway(config(false), &cloud, &local, &["k1"]);

    let err = gateway
        .complete(&CallContext::new(Tier::Pro), Purpose::FastScoring, prompt(), None)
        .await
        .unwrap_err();

    match err {
        GatewayError::NoEligibleFallback { attempts, last } => {
            assert_eq!(attempts, 1);
            assert!(last.contains("'local' not permitted"), "{}", last);
        }
        other => panic!("expected NoEligibleFallback, got {:?}", other),
    }
    assert_eq!(local.call_count(), 0);
}

#[tokio::test]
async fn custom_gate_replaces_tier_rules() {
    let cloud = Scripted::always(ProviderKind::Cloud, exhausted());
    let local = Scripted::always(ProviderKind::Local, Step::Reply("local"));
    let gateway = Gateway::builder(config(false))
        .with_client("cloud", cloud.clone())
        .with_client("local", local.clone())
        .with_keys("cloud", ["k1"])
        .with_entitlement(Arc::new(AllowAll))
        .build()
        .unwrap();

    let result = gateway
        .complete(&CallContext::new(Tier::Hobby), Purpose::FastScoring, prompt(), None)
        .await
        .unwrap();
    assert_eq!(result.provider_used, "local");
}

#[tokio::test]
async fn cooling_pool_fails_over_on_next_call() {
    let cloud = Scripted::new(ProviderKind::Cloud, vec![rate_limited()], Step::Reply("cloud"));
    let local = Scripted::always(ProviderKind::Local, Step::Reply("local"));
    let gateway = gateway(config(false), &cloud, &local, &["only-key"]);

    let err = gateway
        .complete(&elite(), Purpose::FastScoring, prompt(), None)
        .await
        .unwrap_err();
    assert!(matches!(err, GatewayError::AllCredentialsCooling { .. }));

    // elite callers route around the cooling pool without touching the network
    let result = gateway
        .complete(&elite(), Purpose::FastScoring, prompt(), None)
        .await
        .unwrap();
    assert_eq!(result.provider_used, "local");
    assert_eq!(result.attempts, 2);
    assert_eq!(cloud.call_count(), 1);

    // pro callers may not use local, so they are told to come back later
    let err = gateway
        .complete(&CallContext::new(Tier::Pro), Purpose::FastScoring, prompt(), None)
        .await
        .unwrap_err();
    match err {
        GatewayError::AllCredentialsCooling { provider, retry_after } => {
            assert_eq!(provider, "cloud");
            assert!(retry_after.is_some());
        }
        other => panic!("expected AllCredentialsCooling, got {:?}", other),
    }
    assert!(gateway.pool("cloud").unwrap().metrics().circuit_trips >= 2);
}

#[tokio::test]
async fn provider_without_keys_is_skipped() {
    let cloud = Scripted::always(ProviderKind::Cloud, Step::Reply("cloud"));
    let local = Scripted::always(ProviderKind::Local, Step::Reply("local"));
    let gateway = gateway(config(false), &cloud, &local, &[]);

    let result = gateway
        .complete(&elite(), Purpose::FastScoring, prompt(), None)
        .await
        .unwrap();
    assert_eq!(result.provider_used, "local");
    assert_eq!(cloud.call_count(), 0);
}

#[tokio::test]
async fn retry_after_hint_sets_cooldown() {
    let cloud = Scripted::new(
        ProviderKind::Cloud,
        vec![Step::Fail(ClassifiedError::RateLimited {
            retry_after: Some(Duration::from_secs(2)),
        })],
        Step::Reply("cloud"),
    );
    let local = Scripted::always(ProviderKind::Local, Step::Reply("local"));
    let gateway = gateway(config(false), &cloud, &local, &["k1"]);

    let err = gateway
        .complete(&CallContext::new(Tier::Pro), Purpose::FastScoring, prompt(), None)
        .await
        .unwrap_err();
    let wait = err.retry_after().unwrap();
    assert!(wait <= Duration::from_secs(2));
}

#[tokio::test]
async fn oversized_retry_after_hint_is_capped() {
    let cloud = Scripted::new(
        ProviderKind::Cloud,
        vec![Step::Fail(ClassifiedError::RateLimited {
            retry_after: Some(Duration::MAX),
        })],
        Step::Reply("cloud"),
    );
    let local = Scripted::always(ProviderKind::Local, Step::Reply("local"));
    let gateway = gateway(config(false), &cloud, &local, &["k1"]);

    let err = gateway
        .complete(&CallContext::new(Tier::Pro), Purpose::FastScoring, prompt(), None)
        .await
        .unwrap_err();
    let wait = err.retry_after().unwrap();
    assert!(wait <= RoutingConfig::default().auth_cooldown());
    assert!(wait > Duration::from_secs(3600));
}

#[tokio::test]
async fn oversized_context_is_truncated_before_sending() {
    let cloud = Scripted::always(ProviderKind::Cloud, Step::Reply("ok"));
    let local = Scripted::always(ProviderKind::Local, Step::Reply("local"));
    let mut config = config(false);
    config.routing.max_prompt_chars = 1_000;
    config.routing.truncated_prompt_chars = 200;
    let gateway = gateway(config, &cloud, &local, &["k1"]);

    let params = CompletionParams::default().with_system_prompt("be brief");
    let messages = vec![Message::user("context"), Message::user("x".repeat(5_000))];
    gateway
        .complete_with_params(&elite(), Purpose::FastScoring, messages, None, &params)
        .await
        .unwrap();

    let sent = cloud.last_messages.lock().clone();
    assert_eq!(sent.len(), 1);
    assert!(sent[0].starts_with(&"x".repeat(200)));
    assert!(sent[0].ends_with("[CONTEXT TRUNCATED]"));
    assert_eq!(sent[0].chars().filter(|c| *c == 'x').count(), 200);

    gateway
        .complete(&elite(), Purpose::FastScoring, prompt(), None)
        .await
        .unwrap();
    assert_eq!(cloud.last_messages.lock()[1], "score this diff");
}

#[tokio::test]
async fn backoff_waits_for_key_recovery() {
    let cloud = Scripted::new(
        ProviderKind::Cloud,
        vec![Step::Fail(ClassifiedError::RateLimited {
            retry_after: Some(Duration::from_millis(50)),
        })],
        Step::Reply("recovered"),
    );
    let local = Scripted::always(ProviderKind::Local, Step::Reply("local"));
    let gateway = gateway(config(false), &cloud, &local, &["k1"]);

    let result = gateway
        .complete_with_backoff(
            &CallContext::new(Tier::Pro),
            Purpose::FastScoring,
            prompt(),
            None,
            &CompletionParams::default(),
            Duration::from_secs(5),
        )
        .await
        .unwrap();

    assert_eq!(result.text, "recovered");
    assert_eq!(cloud.call_count(), 2);
    assert_eq!(local.call_count(), 0);
}

#[tokio::test]
async fn backoff_does_not_retry_fatal() {
    let cloud = Scripted::always(ProviderKind::Cloud, fatal());
    let local = Scripted::always(ProviderKind::Local, Step::Reply("local"));
    let gateway = gateway(config(false), &cloud, &local, &["k1"]);

    let err = gateway
        .complete_with_backoff(
            &elite(),
            Purpose::FastScoring,
            prompt(),
            None,
            &CompletionParams::default(),
            Duration::from_secs(5),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, GatewayError::Fatal { .. }));
    assert_eq!(cloud.call_count(), 1);
}

#[tokio::test]
async fn cancellation_aborts_without_cooling() {
    let cloud = Scripted::always(ProviderKind::Cloud, Step::Hang);
    let local = Scripted::always(ProviderKind::Local, Step::Reply("local"));
    let gateway = gateway(config(false), &cloud, &local, &["k1", "k2"]);

    let (handle, token) = CancelToken::new();
    let ctx = elite().with_cancellation(token);
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        handle.cancel();
    });

    let err = gateway
        .complete(&ctx, Purpose::FastScoring, prompt(), None)
        .await
        .unwrap_err();

    assert!(matches!(err, GatewayError::Cancelled));
    let metrics = gateway.pool("cloud").unwrap().metrics();
    assert_eq!(metrics.aborted_requests, 1);
    assert_eq!(metrics.failed_requests, 0);
    assert_eq!(metrics.cooling_keys, 0);
    assert_eq!(local.call_count(), 0);
}

#[tokio::test]
async fn deadline_aborts_without_cooling() {
    let cloud = Scripted::always(ProviderKind::Cloud, Step::Hang);
    let local = Scripted::always(ProviderKind::Local, Step::Reply("local"));
    let gateway = gateway(config(false), &cloud, &local, &["k1"]);

    let ctx = elite().with_timeout(Duration::from_millis(30));
    let err = gateway
        .complete(&ctx, Purpose::FastScoring, prompt(), None)
        .await
        .unwrap_err();

    assert!(matches!(err, GatewayError::DeadlineExceeded));
    assert!(gateway.pool("cloud").unwrap().is_healthy());
    assert_eq!(gateway.pool("cloud").unwrap().metrics().aborted_requests, 1);
}

struct ChannelSink(mpsc::UnboundedSender<UsageRecord>);

#[async_trait]
impl BillingSink for ChannelSink {
    async fn record_usage(&self, record: UsageRecord) -> sidegate::Result<()> {
        self.0
            .send(record)
            .map_err(|e| GatewayError::Internal(e.to_string()))
    }
}

struct BrokenSink;

#[async_trait]
impl BillingSink for BrokenSink {
    async fn record_usage(&self, _record: UsageRecord) -> sidegate::Result<()> {
        Err(GatewayError::Internal("billing store offline".to_string()))
    }
}

#[tokio::test]
async fn usage_is_billed_per_success() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let cloud = Scripted::new(ProviderKind::Cloud, vec![unavailable()], Step::Reply("ok"));
    let local = Scripted::always(ProviderKind::Local, Step::Reply("local"));
    let gateway = Gateway::builder(config(false))
        .with_client("cloud", cloud.clone())
        .with_client("local", local.clone())
        .with_keys("cloud", ["k1"])
        .with_billing(Arc::new(ChannelSink(tx)))
        .build()
        .unwrap();

    let result = gateway
        .complete(&elite(), Purpose::FastScoring, prompt(), None)
        .await
        .unwrap();

    let record = tokio::time::timeout(Duration::from_secs(1), rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(
        record,
        UsageRecord {
            provider: "cloud".to_string(),
            model: "alt-1".to_string(),
            input_tokens: 11,
            output_tokens: 7,
        }
    );
    assert_eq!((result.input_tokens, result.output_tokens), (11, 7));
}

#[tokio::test]
async fn billing_failure_does_not_fail_call() {
    let cloud = Scripted::always(ProviderKind::Cloud, Step::Reply("ok"));
    let local = Scripted::always(ProviderKind::Local, Step::Reply("local"));
    let gateway = Gateway::builder(config(false))
        .with_client("cloud", cloud.clone())
        .with_client("local", local.clone())
        .with_keys("cloud", ["k1"])
        .with_billing(Arc::new(BrokenSink))
        .build()
        .unwrap();

    let result = gateway
        .complete(&elite(), Purpose::FastScoring, prompt(), None)
        .await
        .unwrap();
    assert_eq!(result.text, "ok");
}

#[tokio::test]
async fn concurrent_calls_share_pool() {
    let cloud = Scripted::always(ProviderKind::Cloud, Step::Reply("ok"));
    let local = Scripted::always(ProviderKind::Local, Step::Reply("local"));
    let keys = ["k1", "k2", "k3", "k4"];
    let gateway = Arc::new(gateway(config(false), &cloud, &local, &keys));

    let calls = (0..32).map(|_| {
        let gateway = gateway.clone();
        tokio::spawn(async move {
            gateway
                .complete(&CallContext::new(Tier::Pro), Purpose::FastScoring, prompt(), None)
                .await
        })
    });
    let results = futures::future::join_all(calls).await;

    for result in results {
        assert_eq!(result.unwrap().unwrap().attempts, 1);
    }

    let metrics = gateway.pool("cloud").unwrap().metrics();
    assert_eq!(metrics.total_requests, 32);
    assert_eq!(metrics.successful_requests, 32);

    // round-robin spreads load evenly
    for key in keys {
        let used = cloud
            .keys()
            .iter()
            .filter(|k| k.as_deref() == Some(key))
            .count();
        assert_eq!(used, 8, "key {} used {} times", key, used);
    }
}

fn random_step(rng: &mut StdRng) -> Step {
    match rng.random_range(0..6) {
        0 => Step::Reply("ok"),
        1 => auth(),
        2 => rate_limited(),
        3 => unavailable(),
        4 => exhausted(),
        _ => fatal(),
    }
}

#[tokio::test]
async fn attempts_stay_bounded_under_random_failures() {
    for seed in 0..300u64 {
        let mut rng = StdRng::seed_from_u64(seed);

        let max_attempts = rng.random_range(1..=8);
        let mut config = config(rng.random_bool(0.2));
        config.routing.max_attempts = max_attempts;

        let cloud_script: Vec<Step> = (0..12).map(|_| random_step(&mut rng)).collect();
        let local_script: Vec<Step> = (0..12).map(|_| random_step(&mut rng)).collect();
        let cloud = Scripted::new(ProviderKind::Cloud, cloud_script, unavailable());
        let local = Scripted::new(ProviderKind::Local, local_script, unavailable());

        let keys: Vec<String> = (0..rng.random_range(0..=6)).map(|i| format!("key-{}", i)).collect();
        let gateway = Gateway::builder(config)
            .with_client("cloud", cloud.clone())
            .with_client("local", local.clone())
            .with_keys("cloud", keys)
            .build()
            .unwrap();

        for _ in 0..3 {
            let before = cloud.call_count() + local.call_count();
            let outcome = gateway
                .complete(&elite(), Purpose::FastScoring, prompt(), None)
                .await;
            let network_calls = cloud.call_count() + local.call_count() - before;

            assert!(
                network_calls <= max_attempts,
                "seed {}: {} calls with ceiling {}",
                seed,
                network_calls,
                max_attempts
            );
            match outcome {
                Ok(result) => assert!(result.attempts >= 1 && result.attempts <= max_attempts),
                Err(GatewayError::NoEligibleFallback { attempts, .. }) => {
                    assert!(attempts <= max_attempts)
                }
                Err(
                    GatewayError::AllCredentialsCooling { .. }
                    | GatewayError::IsolationViolation(_)
                    | GatewayError::Fatal { .. },
                ) => {}
                Err(other) => panic!("seed {}: unexpected error {:?}", seed, other),
            }
        }
    }
}
