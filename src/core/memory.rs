//! Purpose: In-process cluster backend implementing the store capabilities.
//! Exports: `MemoryCluster`, `MemoryConnector`, `MemoryClient`.
//! Role: Local stand-in for a real cluster; used by tests and embedding callers.
//! Invariants: Clients from the same cluster share one record map.
//! Invariants: Writing `ERASE` to the last remaining bin deletes the record.
//! Invariants: Expired records read as missing and are purged on access.
use crate::core::error::{Error, ErrorKind};
use crate::core::policy::{
    EXISTS, EXISTS_CREATE_ONLY, EXISTS_IGNORE, EXISTS_REPLACE, EXISTS_REPLACE_ONLY,
    EXISTS_UPDATE_ONLY, GEN, GEN_EQ, GEN_GT, GEN_IGNORE, Policy,
};
use crate::core::record::{
    Bins, Record, RecordKey, RecordMetadata, TTL_DONT_UPDATE, TTL_NAMESPACE_DEFAULT,
    TTL_NEVER_EXPIRE, WriteMeta,
};
use crate::core::store::{ClientConfig, Connector, StoreClient};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

type ApiResult<T> = Result<T, Error>;

#[derive(Clone, Debug)]
struct StoredRecord {
    bins: Bins,
    generation: u32,
    expires_at: Option<Instant>,
}

impl StoredRecord {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|deadline| deadline <= now)
    }

    fn metadata(&self, now: Instant) -> RecordMetadata {
        let ttl = match self.expires_at {
            Some(deadline) => {
                let remaining = deadline.saturating_duration_since(now).as_secs();
                u32::try_from(remaining).unwrap_or(u32::MAX - 1)
            }
            None => u32::MAX,
        };
        RecordMetadata {
            generation: self.generation,
            ttl,
        }
    }
}

#[derive(Debug, Default)]
struct ClusterState {
    records: BTreeMap<RecordKey, StoredRecord>,
}

impl ClusterState {
    fn live(&mut self, key: &RecordKey, now: Instant) -> Option<&mut StoredRecord> {
        if self.records.get(key).is_some_and(|record| record.is_expired(now)) {
            self.records.remove(key);
        }
        self.records.get_mut(key)
    }
}

#[derive(Debug, Default)]
struct ClusterInner {
    state: Mutex<ClusterState>,
    connects: AtomicUsize,
    live_clients: AtomicUsize,
}

/// Shared record storage; cloning yields another handle to the same data.
#[derive(Clone, Debug, Default)]
pub struct MemoryCluster {
    inner: Arc<ClusterInner>,
}

impl MemoryCluster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_count(&self) -> usize {
        self.lock().records.len()
    }

    /// Total number of clients ever connected.
    pub fn connects(&self) -> usize {
        self.inner.connects.load(Ordering::SeqCst)
    }

    /// Clients connected and not yet closed.
    pub fn live_clients(&self) -> usize {
        self.inner.live_clients.load(Ordering::SeqCst)
    }

    fn lock(&self) -> MutexGuard<'_, ClusterState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(|poison| poison.into_inner())
    }
}

#[derive(Clone, Debug)]
pub struct MemoryConnector {
    cluster: MemoryCluster,
    refusal: Option<String>,
}

impl MemoryConnector {
    pub fn new(cluster: MemoryCluster) -> Self {
        Self {
            cluster,
            refusal: None,
        }
    }

    /// A connector whose every connect attempt fails with `message`.
    pub fn refusing(cluster: MemoryCluster, message: impl Into<String>) -> Self {
        Self {
            cluster,
            refusal: Some(message.into()),
        }
    }

    pub fn cluster(&self) -> &MemoryCluster {
        &self.cluster
    }
}

impl Connector for MemoryConnector {
    fn connect(&self, config: &ClientConfig) -> ApiResult<Box<dyn StoreClient>> {
        if config.hosts.is_empty() {
            return Err(Error::new(ErrorKind::Usage).with_message("no seed hosts configured"));
        }
        if let Some(message) = &self.refusal {
            return Err(Error::new(ErrorKind::Connection).with_message(message.clone()));
        }
        self.cluster.inner.connects.fetch_add(1, Ordering::SeqCst);
        self.cluster.inner.live_clients.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MemoryClient {
            cluster: self.cluster.clone(),
            connected: AtomicBool::new(true),
        }))
    }
}

#[derive(Debug)]
pub struct MemoryClient {
    cluster: MemoryCluster,
    connected: AtomicBool,
}

impl MemoryClient {
    fn ensure_connected(&self) -> ApiResult<()> {
        if self.connected.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(Error::new(ErrorKind::NotConnected).with_message("client has been closed"))
        }
    }

    fn read(&self, key: &RecordKey, with_bins: bool) -> ApiResult<Record> {
        self.ensure_connected()?;
        let now = Instant::now();
        let mut state = self.cluster.lock();
        let record = match state.live(key, now) {
            Some(stored) if with_bins => {
                Record::found(key.clone(), stored.metadata(now), stored.bins.clone())
            }
            Some(stored) => Record::found(key.clone(), stored.metadata(now), Bins::new()),
            None => Record::missing(key.clone()),
        };
        Ok(record)
    }
}

impl StoreClient for MemoryClient {
    fn exists(&self, key: &RecordKey, _policy: &Policy) -> ApiResult<Record> {
        self.read(key, false)
    }

    fn get(&self, key: &RecordKey, _policy: &Policy) -> ApiResult<Record> {
        self.read(key, true)
    }

    fn put(
        &self,
        key: &RecordKey,
        bins: &Bins,
        meta: &WriteMeta,
        policy: &Policy,
    ) -> ApiResult<()> {
        self.ensure_connected()?;
        let action = policy.get_str(EXISTS).unwrap_or(EXISTS_IGNORE);
        let now = Instant::now();
        let mut state = self.cluster.lock();
        let existing = state.live(key, now).cloned();

        let replace = match action {
            EXISTS_IGNORE | EXISTS_UPDATE_ONLY | EXISTS_CREATE_ONLY => false,
            EXISTS_REPLACE | EXISTS_REPLACE_ONLY => true,
            other => {
                return Err(Error::new(ErrorKind::Usage)
                    .with_message(format!("unsupported exists policy '{other}'"))
                    .with_key(key.to_string()));
            }
        };
        match (&existing, action) {
            (Some(_), EXISTS_CREATE_ONLY) => {
                return Err(Error::new(ErrorKind::Store)
                    .with_message("record already exists")
                    .with_key(key.to_string()));
            }
            (None, EXISTS_UPDATE_ONLY | EXISTS_REPLACE_ONLY) => {
                return Err(record_not_found(key));
            }
            _ => {}
        }
        let current = existing.as_ref().map_or(0, |record| record.generation);
        check_generation(policy, meta.generation, current, key)?;

        let mut merged = match (&existing, replace) {
            (Some(record), false) => record.bins.clone(),
            _ => Bins::new(),
        };
        for (name, value) in bins {
            if value.is_null() {
                merged.remove(name);
            } else {
                merged.insert(name.clone(), value.clone());
            }
        }
        if merged.is_empty() {
            state.records.remove(key);
            return Ok(());
        }

        let previous_expiry = existing.as_ref().and_then(|record| record.expires_at);
        let expires_at = expiry_for(meta.ttl, previous_expiry, now, key)?;
        let generation = existing.map_or(1, |record| record.generation.saturating_add(1));
        state.records.insert(
            key.clone(),
            StoredRecord {
                bins: merged,
                generation,
                expires_at,
            },
        );
        Ok(())
    }

    fn touch(&self, key: &RecordKey, ttl: i64, _policy: Option<&Policy>) -> ApiResult<()> {
        self.ensure_connected()?;
        let now = Instant::now();
        let mut state = self.cluster.lock();
        let record = state.live(key, now).ok_or_else(|| record_not_found(key))?;
        record.expires_at = expiry_for(Some(ttl), record.expires_at, now, key)?;
        record.generation = record.generation.saturating_add(1);
        Ok(())
    }

    fn close(&self) -> ApiResult<()> {
        if self.connected.swap(false, Ordering::SeqCst) {
            self.cluster.inner.live_clients.fetch_sub(1, Ordering::SeqCst);
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

impl Drop for MemoryClient {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

fn expiry_for(
    ttl: Option<i64>,
    previous: Option<Instant>,
    now: Instant,
    key: &RecordKey,
) -> ApiResult<Option<Instant>> {
    match ttl {
        None | Some(TTL_NAMESPACE_DEFAULT) | Some(TTL_NEVER_EXPIRE) => Ok(None),
        Some(TTL_DONT_UPDATE) => Ok(previous),
        // Record ttl is a u32 on the wire.
        Some(seconds) if seconds > 0 => u32::try_from(seconds)
            .ok()
            .and_then(|seconds| now.checked_add(Duration::from_secs(u64::from(seconds))))
            .map(Some)
            .ok_or_else(|| invalid_ttl(seconds, key)),
        Some(other) => Err(invalid_ttl(other, key)),
    }
}

fn invalid_ttl(ttl: i64, key: &RecordKey) -> Error {
    Error::new(ErrorKind::Usage)
        .with_message(format!("invalid ttl {ttl}"))
        .with_hint(format!("Use -2..={} seconds.", u32::MAX))
        .with_key(key.to_string())
}

fn check_generation(
    policy: &Policy,
    expected: Option<u32>,
    current: u32,
    key: &RecordKey,
) -> ApiResult<()> {
    let mode = policy.get_str(GEN).unwrap_or(GEN_IGNORE);
    let ok = match (mode, expected) {
        (GEN_IGNORE, _) => true,
        (GEN_EQ | GEN_GT, None) => {
            return Err(Error::new(ErrorKind::Usage)
                .with_message(format!("gen policy '{mode}' needs a metadata generation"))
                .with_key(key.to_string()));
        }
        (GEN_EQ, Some(expected)) => current == expected,
        (GEN_GT, Some(expected)) => expected > current,
        (other, _) => {
            return Err(Error::new(ErrorKind::Usage)
                .with_message(format!("unsupported gen policy '{other}'"))
                .with_key(key.to_string()));
        }
    };
    if ok {
        return Ok(());
    }
    Err(Error::new(ErrorKind::Store)
        .with_message(format!(
            "generation mismatch: policy {mode}, expected {}, found {current}",
            expected.unwrap_or_default()
        ))
        .with_key(key.to_string()))
}

fn record_not_found(key: &RecordKey) -> Error {
    Error::new(ErrorKind::Store)
        .with_message("record not found")
        .with_key(key.to_string())
}
