//! In-memory nonce store with TTL and capacity limits

use super::capacity::{
    CapacityError, CapacityLimit, CapacityPolicy, CapacityStrategy, EvictionEvent,
    EvictionReason, EvictionScope, LimitType, NonceStoreObserver, NoopNonceObserver,
};
use super::clock::{Clock, SystemClock};
use super::NonceStoreError;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, TimeDelta, Utc};
use rand::RngCore;
use rand::rngs::OsRng;
use secrecy::{ExposeSecret, SecretString};
use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::debug;

/// Default nonce lifetime.
pub const DEFAULT_TTL: Duration = Duration::from_secs(10 * 60);

/// Random bytes per nonce.
pub const NONCE_BYTES: usize = 32;

/// Longest accepted TTL; larger values are clamped.
pub const MAX_TTL: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// A nonce binding: which client asked for it and the private key that will
/// open the reply.
#[derive(Debug, Clone)]
pub struct NonceRecord {
    /// Requesting client id (trimmed).
    pub client_id: String,
    /// PEM private key.
    pub private_key: SecretString,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

/// Store settings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NonceStoreConfig {
    /// Nonce lifetime; zero falls back to [`DEFAULT_TTL`].
    pub ttl: Duration,
    /// Capacity limits.
    pub capacity: CapacityPolicy,
}

impl Default for NonceStoreConfig {
    fn default() -> Self {
        Self {
            ttl: DEFAULT_TTL,
            capacity: CapacityPolicy::unlimited(),
        }
    }
}

/// Short-lived `nonce -> (client, private key)` bindings.
///
/// A nonce is live while `now - created_at <= ttl`. Liveness is checked on
/// every read; expired records found along the way are removed. All
/// operations are atomic with respect to each other.
///
/// # Examples
///
/// ```rust
/// use forumlink::nonce::{NonceStore, NonceStoreConfig};
/// use forumlink::SecretString;
///
/// let store = NonceStore::new(NonceStoreConfig::default());
/// let nonce = store.create("wallet-1", SecretString::from("pem")).unwrap();
///
/// assert!(store.verify(&nonce, "wallet-1"));
/// store.consume(&nonce);
/// assert!(!store.verify(&nonce, "wallet-1"));
/// ```
pub struct NonceStore {
    entries: Mutex<HashMap<String, NonceRecord>>,
    ttl: TimeDelta,
    capacity: CapacityPolicy,
    clock: Arc<dyn Clock>,
    observer: Arc<dyn NonceStoreObserver>,
}

impl std::fmt::Debug for NonceStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NonceStore")
            .field("ttl", &self.ttl)
            .field("capacity", &self.capacity)
            .field("clock", &self.clock)
            .finish_non_exhaustive()
    }
}

impl NonceStore {
    /// Empty store on the system clock.
    pub fn new(config: NonceStoreConfig) -> Self {
        let ttl = if config.ttl.is_zero() {
            DEFAULT_TTL
        } else {
            config.ttl.min(MAX_TTL)
        };
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl: TimeDelta::from_std(ttl).unwrap_or(TimeDelta::minutes(10)),
            capacity: config.capacity,
            clock: Arc::new(SystemClock),
            observer: Arc::new(NoopNonceObserver),
        }
    }

    /// Replace the clock.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Replace the eviction observer.
    pub fn with_observer(mut self, observer: Arc<dyn NonceStoreObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Effective TTL.
    pub fn ttl(&self) -> Duration {
        self.ttl.to_std().unwrap_or(DEFAULT_TTL)
    }

    /// Capacity limits in effect.
    pub fn capacity(&self) -> &CapacityPolicy {
        &self.capacity
    }

    /// Mint a nonce bound to `client_id` and `private_key`.
    ///
    /// Expired entries are swept first, then the per-client and store-wide
    /// limits are enforced in that order.
    pub fn create(&self, client_id: &str, private_key: SecretString) -> Result<String, NonceStoreError> {
        let client_id = client_id.trim();
        if client_id.is_empty() {
            return Err(NonceStoreError::Validation("client_id must not be empty".to_string()));
        }
        let private_key = private_key.expose_secret().trim();
        if private_key.is_empty() {
            return Err(NonceStoreError::Validation("private key must not be empty".to_string()));
        }
        let private_key = SecretString::from(private_key);

        let mut events = Vec::new();
        let result = {
            let mut entries = self.lock();
            let now = self.clock.now();

            let expired = self.sweep(&mut entries, now);
            if expired > 0 {
                events.push(EvictionEvent {
                    count: expired,
                    scope: EvictionScope::Global,
                    reason: EvictionReason::Expired,
                });
            }

            self.enforce(&mut entries, client_id, now, &mut events)
                .map(|()| {
                    let nonce = generate_nonce();
                    entries.insert(
                        nonce.clone(),
                        NonceRecord {
                            client_id: client_id.to_string(),
                            private_key,
                            created_at: now,
                        },
                    );
                    nonce
                })
        };

        self.notify(&events);
        result.map_err(NonceStoreError::Capacity)
    }

    /// The record for `nonce`, if live.
    pub fn get(&self, nonce: &str) -> Option<NonceRecord> {
        let mut entries = self.lock();
        let now = self.clock.now();

        let live = entries.get(nonce).map(|record| self.is_live(record, now))?;
        if live {
            entries.get(nonce).cloned()
        } else {
            entries.remove(nonce);
            None
        }
    }

    /// True if `nonce` is live and bound to `client_id` (trimmed, non-empty).
    pub fn verify(&self, nonce: &str, client_id: &str) -> bool {
        let client_id = client_id.trim();
        if client_id.is_empty() {
            return false;
        }
        self.get(nonce)
            .is_some_and(|record| record.client_id == client_id)
    }

    /// Remove and return `nonce` if it is live and bound to `client_id`.
    ///
    /// The check and the removal happen under one lock, so at most one
    /// caller ever receives a given record. Expired records are dropped.
    pub fn take(&self, nonce: &str, client_id: &str) -> Option<NonceRecord> {
        let client_id = client_id.trim();
        if client_id.is_empty() {
            return None;
        }

        let mut entries = self.lock();
        let now = self.clock.now();
        let (live, owned) = entries
            .get(nonce)
            .map(|record| (self.is_live(record, now), record.client_id == client_id))?;
        match (live, owned) {
            (true, true) => entries.remove(nonce),
            (true, false) => None,
            (false, _) => {
                entries.remove(nonce);
                None
            }
        }
    }

    /// The private key bound to a live `nonce`.
    pub fn private_key(&self, nonce: &str) -> Option<SecretString> {
        self.get(nonce).map(|record| record.private_key)
    }

    /// When a live `nonce` expires.
    pub fn expiration(&self, nonce: &str) -> Option<DateTime<Utc>> {
        self.get(nonce).map(|record| self.expires_at(&record))
    }

    /// Earliest expiration among live nonces of `client_id`, or of the whole
    /// store when `None`.
    pub fn next_expiration(&self, client_id: Option<&str>) -> Option<DateTime<Utc>> {
        let entries = self.lock();
        let now = self.clock.now();
        self.next_expiration_locked(&entries, client_id, now)
    }

    /// Time until [`next_expiration`](Self::next_expiration), floored at zero.
    pub fn retry_after(&self, client_id: Option<&str>) -> Option<Duration> {
        let entries = self.lock();
        let now = self.clock.now();
        self.retry_after_locked(&entries, client_id, now)
    }

    /// Remove `nonce`. Idempotent; returns whether it was present.
    pub fn consume(&self, nonce: &str) -> bool {
        self.lock().remove(nonce).is_some()
    }

    /// Remove every expired entry and return how many were removed.
    pub fn cleanup(&self) -> usize {
        let removed = {
            let mut entries = self.lock();
            let now = self.clock.now();
            self.sweep(&mut entries, now)
        };
        if removed > 0 {
            debug!(removed = removed, "Swept expired nonces");
            self.notify(&[EvictionEvent {
                count: removed,
                scope: EvictionScope::Global,
                reason: EvictionReason::Expired,
            }]);
        }
        removed
    }

    /// Run [`cleanup`](Self::cleanup) every `interval` until the store is
    /// dropped or the handle is aborted.
    pub fn spawn_cleanup(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let store: Weak<Self> = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                match store.upgrade() {
                    Some(store) => {
                        store.cleanup();
                    }
                    None => break,
                }
            }
        })
    }

    /// Number of live nonces.
    pub fn len(&self) -> usize {
        let entries = self.lock();
        let now = self.clock.now();
        entries.values().filter(|r| self.is_live(r, now)).count()
    }

    /// True when no live nonce exists.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, NonceRecord>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn expires_at(&self, record: &NonceRecord) -> DateTime<Utc> {
        record
            .created_at
            .checked_add_signed(self.ttl)
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    fn is_live(&self, record: &NonceRecord, now: DateTime<Utc>) -> bool {
        now - record.created_at <= self.ttl
    }

    fn sweep(&self, entries: &mut HashMap<String, NonceRecord>, now: DateTime<Utc>) -> usize {
        let before = entries.len();
        entries.retain(|_, record| self.is_live(record, now));
        before - entries.len()
    }

    fn enforce(
        &self,
        entries: &mut HashMap<String, NonceRecord>,
        client_id: &str,
        now: DateTime<Utc>,
        events: &mut Vec<EvictionEvent>,
    ) -> Result<(), CapacityError> {
        if let Some(limit) = self.capacity.per_client {
            let count = entries.values().filter(|r| r.client_id == client_id).count();
            let scope = EvictionScope::Client(client_id.to_string());
            if !self.make_room(entries, limit, count, |r| r.client_id == client_id, scope, events) {
                return Err(CapacityError {
                    limit_type: LimitType::Client,
                    limit: limit.max,
                    client_id: Some(client_id.to_string()),
                    retry_after: self.retry_after_locked(entries, Some(client_id), now),
                });
            }
        }

        if let Some(limit) = self.capacity.total {
            let count = entries.len();
            if !self.make_room(entries, limit, count, |_| true, EvictionScope::Global, events) {
                return Err(CapacityError {
                    limit_type: LimitType::Global,
                    limit: limit.max,
                    client_id: None,
                    retry_after: self.retry_after_locked(entries, None, now),
                });
            }
        }

        Ok(())
    }

    /// Bring `count` below `limit.max`; false when the new nonce must be refused.
    fn make_room<P>(
        &self,
        entries: &mut HashMap<String, NonceRecord>,
        limit: CapacityLimit,
        count: usize,
        matches: P,
        scope: EvictionScope,
        events: &mut Vec<EvictionEvent>,
    ) -> bool
    where
        P: Fn(&NonceRecord) -> bool,
    {
        if count < limit.max {
            return true;
        }
        if limit.strategy == CapacityStrategy::RejectNew {
            return false;
        }

        let evicted = evict_oldest(entries, count + 1 - limit.max, matches);
        if evicted == 0 {
            return false;
        }
        debug!(evicted = evicted, scope = ?scope, "Evicted oldest nonces to make room");
        events.push(EvictionEvent {
            count: evicted,
            scope,
            reason: EvictionReason::Capacity,
        });
        true
    }

    fn next_expiration_locked(
        &self,
        entries: &HashMap<String, NonceRecord>,
        client_id: Option<&str>,
        now: DateTime<Utc>,
    ) -> Option<DateTime<Utc>> {
        let client_id = client_id.map(str::trim);
        entries
            .values()
            .filter(|r| self.is_live(r, now))
            .filter(|r| client_id.is_none_or(|c| r.client_id == c))
            .map(|r| self.expires_at(r))
            .min()
    }

    fn retry_after_locked(
        &self,
        entries: &HashMap<String, NonceRecord>,
        client_id: Option<&str>,
        now: DateTime<Utc>,
    ) -> Option<Duration> {
        self.next_expiration_locked(entries, client_id, now)
            .map(|at| (at - now).to_std().unwrap_or(Duration::ZERO))
    }

    fn notify(&self, events: &[EvictionEvent]) {
        for event in events {
            let _ = catch_unwind(AssertUnwindSafe(|| self.observer.on_evict(event)));
        }
    }
}

/// Remove up to `n` of the oldest records matching `matches`.
fn evict_oldest<P>(entries: &mut HashMap<String, NonceRecord>, n: usize, matches: P) -> usize
where
    P: Fn(&NonceRecord) -> bool,
{
    let mut candidates: Vec<(DateTime<Utc>, String)> = entries
        .iter()
        .filter(|(_, record)| matches(record))
        .map(|(nonce, record)| (record.created_at, nonce.clone()))
        .collect();
    candidates.sort();

    candidates
        .into_iter()
        .take(n)
        .filter(|(_, nonce)| entries.remove(nonce).is_some())
        .count()
}

/// 32 OS-random bytes, URL-safe base64 without padding.
fn generate_nonce() -> String {
    let mut bytes = [0u8; NONCE_BYTES];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}
