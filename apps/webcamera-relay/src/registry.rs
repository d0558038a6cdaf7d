use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, warn};

pub const DEFAULT_MAX_ENTRIES: usize = 2048;
pub const DEFAULT_TTL: Duration = Duration::from_secs(600);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistryConfig {
    pub max_entries: usize,
    /// Fixed lifetime counted from insertion; access never extends it.
    pub ttl: Duration,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            max_entries: DEFAULT_MAX_ENTRIES,
            ttl: DEFAULT_TTL,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EvictionReason {
    Removed,
    Replaced,
    Expired,
    Capacity,
    Shutdown,
}

impl EvictionReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            EvictionReason::Removed => "removed",
            EvictionReason::Replaced => "replaced",
            EvictionReason::Expired => "expired",
            EvictionReason::Capacity => "capacity",
            EvictionReason::Shutdown => "shutdown",
        }
    }
}

impl fmt::Display for EvictionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("no live entry for `{0}`")]
    NotFound(String),
    #[error("identifier `{0}` is already in use")]
    IdentifierInUse(String),
}

#[derive(Debug, Error)]
#[error("failed to dispose `{id}`: {reason}")]
pub struct DisposalError {
    pub id: String,
    pub reason: String,
}

/// Side effect run once for every entry leaving the registry.
pub type EvictionHook<V> =
    Arc<dyn Fn(&str, &V, EvictionReason) -> Result<(), DisposalError> + Send + Sync>;

struct Entry<V> {
    value: V,
    created_at: Instant,
    seq: u64,
}

struct Inner<V> {
    entries: HashMap<String, Entry<V>>,
    /// Insertion sequence -> id, oldest first.
    order: BTreeMap<u64, String>,
    next_seq: u64,
}

impl<V> Inner<V> {
    fn take(&mut self, id: &str) -> Option<Entry<V>> {
        let entry = self.entries.remove(id)?;
        self.order.remove(&entry.seq);
        Some(entry)
    }

    fn take_expired(&mut self, now: Instant, ttl: Duration) -> Vec<(String, V)> {
        let expired: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, entry)| now.duration_since(entry.created_at) >= ttl)
            .map(|(id, _)| id.clone())
            .collect();
        expired
            .into_iter()
            .filter_map(|id| self.take(&id).map(|entry| (id, entry.value)))
            .collect()
    }

    fn take_oldest(&mut self) -> Option<(String, V)> {
        let (_, id) = self.order.pop_first()?;
        let entry = self.entries.remove(&id)?;
        Some((id, entry.value))
    }

    fn insert(&mut self, id: String, value: V, now: Instant) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.order.insert(seq, id.clone());
        self.entries.insert(
            id,
            Entry {
                value,
                created_at: now,
                seq,
            },
        );
    }
}

type Evicted<V> = Vec<(String, V, EvictionReason)>;

/// Bounded id -> value map with a fixed per-entry lifetime.
///
/// The lock only guards map updates. Evicted values are handed to the
/// eviction hook after it is released, so a slow or failing hook never
/// blocks other callers or leaves an entry half removed.
pub struct ExpiringRegistry<V> {
    config: RegistryConfig,
    inner: Mutex<Inner<V>>,
    on_evict: EvictionHook<V>,
}

impl<V> ExpiringRegistry<V>
where
    V: Clone + Send + Sync + 'static,
{
    pub fn new(config: RegistryConfig, on_evict: EvictionHook<V>) -> Self {
        let config = RegistryConfig {
            max_entries: config.max_entries.max(1),
            ..config
        };
        Self {
            config,
            inner: Mutex::new(Inner {
                entries: HashMap::new(),
                order: BTreeMap::new(),
                next_seq: 0,
            }),
            on_evict,
        }
    }

    pub fn config(&self) -> RegistryConfig {
        self.config
    }

    pub fn capacity(&self) -> usize {
        self.config.max_entries
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Inserts `value`, disposing any entry already stored under `id`.
    pub fn put(&self, id: &str, value: V) {
        let evicted = {
            let mut inner = self.inner.lock();
            let now = Instant::now();
            let mut evicted = self.expire_locked(&mut inner, now);
            if let Some(old) = inner.take(id) {
                evicted.push((id.to_string(), old.value, EvictionReason::Replaced));
            }
            self.make_room_locked(&mut inner, &mut evicted);
            inner.insert(id.to_string(), value, now);
            evicted
        };
        self.dispose_all(evicted);
    }

    /// Inserts `value` only when no live entry exists under `id`.
    pub fn put_if_absent(&self, id: &str, value: V) -> Result<(), RegistryError> {
        let evicted = {
            let mut inner = self.inner.lock();
            let now = Instant::now();
            let mut evicted = self.expire_locked(&mut inner, now);
            if inner.entries.contains_key(id) {
                drop(inner);
                self.dispose_all(evicted);
                return Err(RegistryError::IdentifierInUse(id.to_string()));
            }
            self.make_room_locked(&mut inner, &mut evicted);
            inner.insert(id.to_string(), value, now);
            evicted
        };
        self.dispose_all(evicted);
        Ok(())
    }

    pub fn get(&self, id: &str) -> Result<V, RegistryError> {
        let expired = {
            let mut inner = self.inner.lock();
            let now = Instant::now();
            let expired = match inner.entries.get(id) {
                Some(entry) if !self.is_expired(entry, now) => return Ok(entry.value.clone()),
                Some(_) => true,
                None => false,
            };
            if expired {
                inner.take(id).map(|entry| entry.value)
            } else {
                None
            }
        };
        if let Some(value) = expired {
            self.dispose(id, &value, EvictionReason::Expired);
        }
        Err(RegistryError::NotFound(id.to_string()))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_ok()
    }

    pub fn remove(&self, id: &str) -> Result<(), RegistryError> {
        let entry = self.inner.lock().take(id);
        match entry {
            Some(entry) => {
                self.dispose(id, &entry.value, EvictionReason::Removed);
                Ok(())
            }
            None => Err(RegistryError::NotFound(id.to_string())),
        }
    }

    /// Removes the entry under `id` only when `predicate` accepts its value.
    pub fn remove_if<F>(&self, id: &str, predicate: F) -> bool
    where
        F: FnOnce(&V) -> bool,
    {
        let entry = {
            let mut inner = self.inner.lock();
            let matches = inner
                .entries
                .get(id)
                .map_or(false, |entry| predicate(&entry.value));
            if matches {
                inner.take(id)
            } else {
                None
            }
        };
        match entry {
            Some(entry) => {
                self.dispose(id, &entry.value, EvictionReason::Removed);
                true
            }
            None => false,
        }
    }

    /// Evicts every expired entry and returns how many were dropped.
    pub fn sweep(&self) -> usize {
        let evicted = {
            let mut inner = self.inner.lock();
            self.expire_locked(&mut inner, Instant::now())
        };
        let count = evicted.len();
        self.dispose_all(evicted);
        count
    }

    /// Disposes every entry.
    pub fn clear(&self) {
        let evicted: Evicted<V> = {
            let mut inner = self.inner.lock();
            inner.order.clear();
            inner
                .entries
                .drain()
                .map(|(id, entry)| (id, entry.value, EvictionReason::Shutdown))
                .collect()
        };
        self.dispose_all(evicted);
    }

    /// Runs `sweep` every `interval` until the registry is dropped.
    pub fn spawn_sweeper(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let registry: Weak<Self> = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(registry) = registry.upgrade() else {
                    break;
                };
                let swept = registry.sweep();
                if swept > 0 {
                    debug!(swept, remaining = registry.len(), "registry sweep");
                }
            }
        })
    }

    fn is_expired(&self, entry: &Entry<V>, now: Instant) -> bool {
        now.duration_since(entry.created_at) >= self.config.ttl
    }

    fn expire_locked(&self, inner: &mut Inner<V>, now: Instant) -> Evicted<V> {
        inner
            .take_expired(now, self.config.ttl)
            .into_iter()
            .map(|(id, value)| (id, value, EvictionReason::Expired))
            .collect()
    }

    fn make_room_locked(&self, inner: &mut Inner<V>, evicted: &mut Evicted<V>) {
        while inner.entries.len() >= self.config.max_entries {
            match inner.take_oldest() {
                Some((id, value)) => evicted.push((id, value, EvictionReason::Capacity)),
                None => break,
            }
        }
    }

    fn dispose_all(&self, evicted: Evicted<V>) {
        for (id, value, reason) in evicted {
            self.dispose(&id, &value, reason);
        }
    }

    fn dispose(&self, id: &str, value: &V, reason: EvictionReason) {
        if let Err(err) = (self.on_evict)(id, value, reason) {
            warn!(id, reason = %reason, error = %err, "registry disposal failed");
        }
    }
}
