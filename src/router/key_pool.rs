//! API Key Pool Management
//!
//! Round-robin credential rotation with per-key cooldowns. A credential is
//! either in the active rotation or in the cooldown map, never both. Expired
//! cooldowns are recovered lazily on `next()` and `is_healthy()`.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Longest time a key can stay out of rotation
pub const MAX_COOLDOWN: Duration = Duration::from_secs(365 * 86_400);

/// An opaque secret authorizing calls to one provider
#[derive(Clone)]
pub struct Credential {
    provider: Arc<str>,
    secret: Arc<str>,
}

impl Credential {
    pub fn new(provider: &str, secret: impl Into<String>) -> Self {
        Self {
            provider: Arc::from(provider),
            secret: Arc::from(secret.into()),
        }
    }

    pub fn provider(&self) -> &str {
        &self.provider
    }

    /// Raw secret, for building the Authorization header only
    pub fn expose(&self) -> &str {
        &self.secret
    }

    /// Last four characters, safe to log
    pub fn fingerprint(&self) -> String {
        let chars: Vec<char> = self.secret.chars().collect();
        let tail: String = chars[chars.len().saturating_sub(4)..].iter().collect();
        format!("...{}", tail)
    }
}

impl PartialEq for Credential {
    fn eq(&self, other: &Self) -> bool {
        self.provider == other.provider && self.secret == other.secret
    }
}

impl Eq for Credential {}

impl Hash for Credential {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.provider.hash(state);
        self.secret.hash(state);
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("provider", &self.provider)
            .field("key", &self.fingerprint())
            .finish()
    }
}

impl fmt::Display for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.provider, self.fingerprint())
    }
}

#[derive(Debug, Default)]
struct PoolState {
    /// Rotation order; head is handed out next
    active: VecDeque<Credential>,

    /// Credential -> instant it becomes eligible again
    cooling: HashMap<Credential, Instant>,
}

impl PoolState {
    fn recover(&mut self, now: Instant) -> usize {
        let mut expired: Vec<(Credential, Instant)> = self
            .cooling
            .iter()
            .filter(|(_, expiry)| **expiry <= now)
            .map(|(cred, expiry)| (cred.clone(), *expiry))
            .collect();
        expired.sort_by_key(|(_, expiry)| *expiry);

        for (cred, _) in &expired {
            self.cooling.remove(cred);
            self.active.push_back(cred.clone());
        }
        expired.len()
    }
}

/// Pool of credentials for one provider
#[derive(Debug)]
pub struct KeyPool {
    /// Provider name this pool belongs to
    provider: String,

    /// Number of distinct credentials loaded
    capacity: usize,

    state: Mutex<PoolState>,

    total_requests: AtomicU64,
    successful_requests: AtomicU64,
    failed_requests: AtomicU64,
    aborted_requests: AtomicU64,
    circuit_trips: AtomicU64,
}

impl KeyPool {
    /// Create a pool; duplicate and empty secrets are dropped
    pub fn new(provider: impl Into<String>, keys: Vec<String>) -> Self {
        let provider = provider.into();
        let mut active: VecDeque<Credential> = VecDeque::new();
        for key in keys {
            let cred = Credential::new(&provider, key.trim());
            if !cred.expose().is_empty() && !active.contains(&cred) {
                active.push_back(cred);
            }
        }

        info!(provider = %provider, keys = active.len(), "key pool loaded");

        Self {
            capacity: active.len(),
            provider,
            state: Mutex::new(PoolState {
                active,
                cooling: HashMap::new(),
            }),
            total_requests: AtomicU64::new(0),
            successful_requests: AtomicU64::new(0),
            failed_requests: AtomicU64::new(0),
            aborted_requests: AtomicU64::new(0),
            circuit_trips: AtomicU64::new(0),
        }
    }

    /// Get the provider name
    pub fn provider(&self) -> &str {
        &self.provider
    }

    /// Number of credentials in the pool, active or cooling
    pub fn len(&self) -> usize {
        self.capacity
    }

    pub fn is_empty(&self) -> bool {
        self.capacity == 0
    }

    /// Next credential in rotation, or `None` when every key is cooling
    pub fn next(&self) -> Option<Credential> {
        self.next_at(Instant::now())
    }

    pub fn next_at(&self, now: Instant) -> Option<Credential> {
        let mut state = self.state.lock();

        let recovered = state.recover(now);
        if recovered > 0 {
            debug!(provider = %self.provider, recovered, "recovered cooling keys");
        }

        match state.active.pop_front() {
            Some(cred) => {
                state.active.push_back(cred.clone());
                self.total_requests.fetch_add(1, Ordering::Relaxed);
                Some(cred)
            }
            None => {
                self.circuit_trips.fetch_add(1, Ordering::Relaxed);
                warn!(provider = %self.provider, "all keys are cooling; circuit open");
                None
            }
        }
    }

    /// Take a credential out of rotation for `duration`
    pub fn mark_cooling(&self, cred: &Credential, duration: Duration) -> bool {
        self.mark_cooling_at(cred, duration, Instant::now())
    }

    pub fn mark_cooling_at(&self, cred: &Credential, duration: Duration, now: Instant) -> bool {
        let mut state = self.state.lock();
        let duration = duration.min(MAX_COOLDOWN);
        let expiry = now.checked_add(duration).unwrap_or(now);

        if let Some(existing) = state.cooling.get_mut(cred) {
            if expiry > *existing {
                *existing = expiry;
            }
            return true;
        }

        let before = state.active.len();
        state.active.retain(|c| c != cred);
        if state.active.len() == before {
            return false;
        }

        state.cooling.insert(cred.clone(), expiry);
        warn!(
            provider = %self.provider,
            key = %cred.fingerprint(),
            cooldown_secs = duration.as_secs(),
            "key cooling"
        );
        true
    }

    /// Move every expired cooldown back to the tail of the rotation
    pub fn recover(&self) -> usize {
        self.recover_at(Instant::now())
    }

    pub fn recover_at(&self, now: Instant) -> usize {
        let recovered = self.state.lock().recover(now);
        if recovered > 0 {
            info!(provider = %self.provider, recovered, "keys recovered");
        }
        recovered
    }

    /// True iff at least one key is usable after a recovery sweep
    pub fn is_healthy(&self) -> bool {
        self.is_healthy_at(Instant::now())
    }

    pub fn is_healthy_at(&self, now: Instant) -> bool {
        let mut state = self.state.lock();
        state.recover(now);
        !state.active.is_empty()
    }

    /// Time until the soonest cooling key becomes eligible
    pub fn min_wait(&self) -> Option<Duration> {
        let now = Instant::now();
        self.state
            .lock()
            .cooling
            .values()
            .min()
            .map(|expiry| expiry.saturating_duration_since(now))
    }

    pub fn is_cooling(&self, cred: &Credential) -> bool {
        self.state.lock().cooling.contains_key(cred)
    }

    pub fn record_success(&self) {
        self.successful_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failure(&self) {
        self.failed_requests.fetch_add(1, Ordering::Relaxed);
    }

    /// Attempt cancelled by the caller; neither success nor failure
    pub fn record_aborted(&self) {
        self.aborted_requests.fetch_add(1, Ordering::Relaxed);
    }

    /// Snapshot of counters and key states
    pub fn metrics(&self) -> PoolMetrics {
        let (active_keys, cooling_keys) = {
            let state = self.state.lock();
            (state.active.len(), state.cooling.len())
        };
        let health_score = if self.capacity == 0 {
            0
        } else {
            (active_keys * 100 / self.capacity) as u8
        };
        let next_recovery_at = self.min_wait().and_then(|wait| {
            chrono::Duration::from_std(wait)
                .ok()
                .and_then(|wait| Utc::now().checked_add_signed(wait))
        });

        PoolMetrics {
            provider: self.provider.clone(),
            total_requests: self.total_requests.load(Ordering::Relaxed),
            successful_requests: self.successful_requests.load(Ordering::Relaxed),
            failed_requests: self.failed_requests.load(Ordering::Relaxed),
            aborted_requests: self.aborted_requests.load(Ordering::Relaxed),
            active_keys,
            cooling_keys,
            circuit_trips: self.circuit_trips.load(Ordering::Relaxed),
            health_score,
            next_recovery_at,
        }
    }

    #[cfg(test)]
    fn assert_exclusive(&self) {
        let state = self.state.lock();
        for cred in &state.active {
            assert!(!state.cooling.contains_key(cred), "{} both active and cooling", cred);
        }
        assert_eq!(state.active.len() + state.cooling.len(), self.capacity);
    }
}

/// Statistics about a key pool
#[derive(Debug, Clone, Serialize)]
pub struct PoolMetrics {
    pub provider: String,
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub aborted_requests: u64,
    pub active_keys: usize,
    pub cooling_keys: usize,
    pub circuit_trips: u64,
    /// Percentage of keys currently in rotation
    pub health_score: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_recovery_at: Option<DateTime<Utc>>,
}

impl PoolMetrics {
    /// Share of finished attempts that succeeded, 1.0 before any attempt
    pub fn success_rate(&self) -> f64 {
        let finished = self.successful_requests + self.failed_requests;
        if finished == 0 {
            1.0
        } else {
            self.successful_requests as f64 / finished as f64
        }
    }
}
