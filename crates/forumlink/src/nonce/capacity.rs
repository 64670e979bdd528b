//! Capacity limits and eviction notifications

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// What happens when a limit is reached.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CapacityStrategy {
    /// Refuse the new nonce.
    #[default]
    RejectNew,
    /// Evict the oldest live nonce in scope to make room.
    EvictOldest,
}

impl FromStr for CapacityStrategy {
    type Err = String;

    /// Accepts `reject_new`, `reject-new`, `rejectNew` and the same forms of
    /// `evict_oldest`, case-insensitively.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .trim()
            .chars()
            .filter(|c| *c != '_' && *c != '-')
            .collect::<String>()
            .to_ascii_lowercase();
        match normalized.as_str() {
            "rejectnew" => Ok(CapacityStrategy::RejectNew),
            "evictoldest" => Ok(CapacityStrategy::EvictOldest),
            _ => Err(format!("unknown capacity strategy: {}", s)),
        }
    }
}

/// One limit and its strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapacityLimit {
    /// Maximum number of live nonces, always at least 1.
    pub max: usize,
    /// Behavior at the limit.
    pub strategy: CapacityStrategy,
}

impl CapacityLimit {
    /// A limit of `max`; non-positive values mean unlimited (`None`).
    pub fn new(max: i64, strategy: CapacityStrategy) -> Option<Self> {
        usize::try_from(max)
            .ok()
            .filter(|max| *max > 0)
            .map(|max| Self { max, strategy })
    }
}

/// Per-client and store-wide limits, enforced independently.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapacityPolicy {
    /// Limit per client id.
    pub per_client: Option<CapacityLimit>,
    /// Limit across the whole store.
    pub total: Option<CapacityLimit>,
}

impl CapacityPolicy {
    /// No limits.
    pub fn unlimited() -> Self {
        Self::default()
    }

    /// Set the per-client limit; non-positive means unlimited.
    pub fn per_client(mut self, max: i64, strategy: CapacityStrategy) -> Self {
        self.per_client = CapacityLimit::new(max, strategy);
        self
    }

    /// Set the store-wide limit; non-positive means unlimited.
    pub fn total(mut self, max: i64, strategy: CapacityStrategy) -> Self {
        self.total = CapacityLimit::new(max, strategy);
        self
    }
}

/// Which limit was hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LimitType {
    /// The per-client limit.
    Client,
    /// The store-wide limit.
    Global,
}

impl fmt::Display for LimitType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LimitType::Client => f.write_str("client"),
            LimitType::Global => f.write_str("global"),
        }
    }
}

/// A nonce was refused because a limit was reached.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("nonce limit reached ({limit_type} limit {limit})")]
pub struct CapacityError {
    /// Which limit was hit.
    pub limit_type: LimitType,
    /// The limit value.
    pub limit: usize,
    /// The client, for per-client limits.
    pub client_id: Option<String>,
    /// Time until the next nonce in scope expires.
    pub retry_after: Option<Duration>,
}

/// Scope of an eviction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EvictionScope {
    /// Nonces of one client.
    Client(String),
    /// Any nonce in the store.
    Global,
}

/// Why nonces were evicted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvictionReason {
    /// Their TTL elapsed.
    Expired,
    /// A limit was reached under [`CapacityStrategy::EvictOldest`].
    Capacity,
}

/// One eviction notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvictionEvent {
    /// Number of nonces removed.
    pub count: usize,
    /// Which nonces were considered.
    pub scope: EvictionScope,
    /// Why they were removed.
    pub reason: EvictionReason,
}

/// Receives eviction notifications after the store lock is released.
///
/// Notifications are fire-and-forget: a panicking observer never fails the
/// store operation that triggered it.
pub trait NonceStoreObserver: Send + Sync {
    /// Called once per eviction batch.
    fn on_evict(&self, event: &EvictionEvent);
}

/// Observer that ignores every notification.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopNonceObserver;

impl NonceStoreObserver for NoopNonceObserver {
    fn on_evict(&self, _event: &EvictionEvent) {}
}
