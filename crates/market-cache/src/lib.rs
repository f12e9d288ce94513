//! Advisory cache in front of the repositories. Redis-backed when available,
//! with a transparent in-memory fallback; in fail-silent mode (the default)
//! every error degrades to a miss so the cache can never take down a write
//! path.

pub mod keys;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use ingest_core::IngestError;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::time::Instant;

/// Per-entity TTL defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Company,
    Brokerage,
    StockRating,
    Generic,
}

impl EntityKind {
    pub fn ttl(&self) -> Duration {
        match self {
            EntityKind::Company => Duration::from_secs(2 * 3600),
            EntityKind::Brokerage => Duration::from_secs(4 * 3600),
            EntityKind::StockRating => Duration::from_secs(24 * 3600),
            EntityKind::Generic => Duration::from_secs(3600),
        }
    }
}

#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    errors: AtomicU64,
}

/// Point-in-time cache counters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheStats {
    pub backend: &'static str,
    pub hits: u64,
    pub misses: u64,
    pub errors: u64,
}

struct MemoryEntry {
    payload: String,
    expires_at: Instant,
}

#[derive(Clone)]
enum Backend {
    Redis(ConnectionManager),
    Memory(Arc<DashMap<String, MemoryEntry>>),
}

#[derive(Clone)]
pub struct CacheClient {
    backend: Backend,
    fail_silently: bool,
    counters: Arc<Counters>,
}

impl CacheClient {
    /// Connect to Redis; on any failure fall back to the in-memory backend.
    pub async fn connect(redis_url: Option<&str>) -> Self {
        if let Some(url) = redis_url {
            match Self::try_redis(url).await {
                Ok(manager) => {
                    tracing::info!("cache: connected to redis");
                    return Self::with_backend(Backend::Redis(manager));
                }
                Err(e) => {
                    tracing::warn!("cache: redis unavailable ({}), using memory fallback", e);
                }
            }
        }
        Self::in_memory()
    }

    async fn try_redis(url: &str) -> Result<ConnectionManager, IngestError> {
        let client =
            redis::Client::open(url).map_err(|e| IngestError::Cache(e.to_string()))?;
        let mut manager = client
            .get_connection_manager()
            .await
            .map_err(|e| IngestError::Cache(e.to_string()))?;
        let pong: String = redis::cmd("PING")
            .query_async(&mut manager)
            .await
            .map_err(|e| IngestError::Cache(e.to_string()))?;
        if pong != "PONG" {
            return Err(IngestError::Cache(format!("unexpected PING reply {:?}", pong)));
        }
        Ok(manager)
    }

    pub fn in_memory() -> Self {
        Self::with_backend(Backend::Memory(Arc::new(DashMap::new())))
    }

    fn with_backend(backend: Backend) -> Self {
        Self {
            backend,
            fail_silently: true,
            counters: Arc::new(Counters::default()),
        }
    }

    /// Turn errors into hard failures instead of misses. Tests only, mostly.
    pub fn strict(mut self) -> Self {
        self.fail_silently = false;
        self
    }

    fn backend_name(&self) -> &'static str {
        match self.backend {
            Backend::Redis(_) => "redis",
            Backend::Memory(_) => "memory",
        }
    }

    fn swallow<T: Default>(&self, err: IngestError) -> Result<T, IngestError> {
        self.counters.errors.fetch_add(1, Ordering::Relaxed);
        if self.fail_silently {
            tracing::debug!("cache error swallowed: {}", err);
            Ok(T::default())
        } else {
            Err(err)
        }
    }

    async fn get_raw(&self, key: &str) -> Result<Option<String>, IngestError> {
        match &self.backend {
            Backend::Redis(manager) => {
                let mut con = manager.clone();
                con.get(key)
                    .await
                    .map_err(|e| IngestError::Cache(e.to_string()))
            }
            Backend::Memory(map) => {
                let now = Instant::now();
                if let Some(entry) = map.get(key) {
                    if entry.expires_at > now {
                        return Ok(Some(entry.payload.clone()));
                    }
                }
                // Expired entries are reaped lazily.
                map.remove_if(key, |_, entry| entry.expires_at <= now);
                Ok(None)
            }
        }
    }

    async fn set_raw(&self, key: &str, payload: String, ttl: Duration) -> Result<(), IngestError> {
        match &self.backend {
            Backend::Redis(manager) => {
                let mut con = manager.clone();
                con.set_ex(key, payload, ttl.as_secs().max(1))
                    .await
                    .map_err(|e| IngestError::Cache(e.to_string()))
            }
            Backend::Memory(map) => {
                map.insert(
                    key.to_string(),
                    MemoryEntry {
                        payload,
                        expires_at: Instant::now() + ttl,
                    },
                );
                Ok(())
            }
        }
    }

    /// Typed read. A miss, a decode failure and (fail-silent) a backend
    /// error all come back as `None`.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, IngestError> {
        let raw = match self.get_raw(key).await {
            Ok(raw) => raw,
            Err(e) => return self.swallow(e),
        };
        match raw {
            Some(payload) => match serde_json::from_str(&payload) {
                Ok(value) => {
                    self.counters.hits.fetch_add(1, Ordering::Relaxed);
                    Ok(Some(value))
                }
                Err(e) => self.swallow(IngestError::Cache(format!("decode {}: {}", key, e))),
            },
            None => {
                self.counters.misses.fetch_add(1, Ordering::Relaxed);
                Ok(None)
            }
        }
    }

    /// Typed write with an explicit TTL.
    pub async fn set<T: Serialize>(
        &self,
        key: &str,
        value: &T,
        ttl: Duration,
    ) -> Result<(), IngestError> {
        let payload = match serde_json::to_string(value) {
            Ok(p) => p,
            Err(e) => {
                return self.swallow(IngestError::Cache(format!("encode {}: {}", key, e)))
            }
        };
        match self.set_raw(key, payload, ttl).await {
            Ok(()) => Ok(()),
            Err(e) => self.swallow(e),
        }
    }

    /// Typed write with the per-entity default TTL.
    pub async fn set_entity<T: Serialize>(
        &self,
        kind: EntityKind,
        key: &str,
        value: &T,
    ) -> Result<(), IngestError> {
        self.set(key, value, kind.ttl()).await
    }

    pub async fn delete(&self, key: &str) -> Result<(), IngestError> {
        let result = match &self.backend {
            Backend::Redis(manager) => {
                let mut con = manager.clone();
                con.del::<_, ()>(key)
                    .await
                    .map_err(|e| IngestError::Cache(e.to_string()))
            }
            Backend::Memory(map) => {
                map.remove(key);
                Ok(())
            }
        };
        match result {
            Ok(()) => Ok(()),
            Err(e) => self.swallow(e),
        }
    }

    /// Bulk read preserving input order; failed slots come back `None`.
    pub async fn mget<T: DeserializeOwned>(
        &self,
        cache_keys: &[String],
    ) -> Result<Vec<Option<T>>, IngestError> {
        let mut out = Vec::with_capacity(cache_keys.len());
        for key in cache_keys {
            out.push(self.get(key).await?);
        }
        Ok(out)
    }

    /// Bulk write sharing one TTL.
    pub async fn mset<T: Serialize>(
        &self,
        entries: &[(String, T)],
        ttl: Duration,
    ) -> Result<(), IngestError> {
        for (key, value) in entries {
            self.set(key, value, ttl).await?;
        }
        Ok(())
    }

    pub async fn exists(&self, key: &str) -> Result<bool, IngestError> {
        let result = match &self.backend {
            Backend::Redis(manager) => {
                let mut con = manager.clone();
                con.exists(key)
                    .await
                    .map_err(|e| IngestError::Cache(e.to_string()))
            }
            Backend::Memory(map) => Ok(map
                .get(key)
                .map(|entry| entry.expires_at > Instant::now())
                .unwrap_or(false)),
        };
        match result {
            Ok(v) => Ok(v),
            Err(e) => self.swallow(e),
        }
    }

    /// Remaining TTL, `None` when the key is missing or persistent.
    pub async fn ttl(&self, key: &str) -> Result<Option<Duration>, IngestError> {
        let result = match &self.backend {
            Backend::Redis(manager) => {
                let mut con = manager.clone();
                con.ttl::<_, i64>(key)
                    .await
                    .map(|secs| {
                        if secs > 0 {
                            Some(Duration::from_secs(secs as u64))
                        } else {
                            None
                        }
                    })
                    .map_err(|e| IngestError::Cache(e.to_string()))
            }
            Backend::Memory(map) => Ok(map.get(key).and_then(|entry| {
                let now = Instant::now();
                if entry.expires_at > now {
                    Some(entry.expires_at - now)
                } else {
                    None
                }
            })),
        };
        match result {
            Ok(v) => Ok(v),
            Err(e) => self.swallow(e),
        }
    }

    /// Reset a key's TTL.
    pub async fn expire(&self, key: &str, ttl: Duration) -> Result<(), IngestError> {
        let result = match &self.backend {
            Backend::Redis(manager) => {
                let mut con = manager.clone();
                con.expire::<_, ()>(key, ttl.as_secs() as i64)
                    .await
                    .map_err(|e| IngestError::Cache(e.to_string()))
            }
            Backend::Memory(map) => {
                if let Some(mut entry) = map.get_mut(key) {
                    entry.expires_at = Instant::now() + ttl;
                }
                Ok(())
            }
        };
        match result {
            Ok(()) => Ok(()),
            Err(e) => self.swallow(e),
        }
    }

    /// Drop everything. Used by `clear_first` population runs.
    pub async fn clear(&self) -> Result<(), IngestError> {
        let result = match &self.backend {
            Backend::Redis(manager) => {
                let mut con = manager.clone();
                redis::cmd("FLUSHDB")
                    .query_async::<()>(&mut con)
                    .await
                    .map_err(|e| IngestError::Cache(e.to_string()))
            }
            Backend::Memory(map) => {
                map.clear();
                Ok(())
            }
        };
        match result {
            Ok(()) => Ok(()),
            Err(e) => self.swallow(e),
        }
    }

    pub async fn ping(&self) -> Result<(), IngestError> {
        match &self.backend {
            Backend::Redis(manager) => {
                let mut con = manager.clone();
                let pong: String = redis::cmd("PING")
                    .query_async(&mut con)
                    .await
                    .map_err(|e| IngestError::Cache(e.to_string()))?;
                if pong == "PONG" {
                    Ok(())
                } else {
                    Err(IngestError::Cache(format!("unexpected PING reply {:?}", pong)))
                }
            }
            Backend::Memory(_) => Ok(()),
        }
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            backend: self.backend_name(),
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            errors: self.counters.errors.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Snapshot {
        symbol: String,
        price: f64,
    }

    fn sample() -> Snapshot {
        Snapshot {
            symbol: "AAPL".to_string(),
            price: 190.0,
        }
    }

    #[tokio::test]
    async fn set_get_round_trip() {
        let cache = CacheClient::in_memory();
        let key = keys::market_data("aapl");
        cache
            .set(&key, &sample(), Duration::from_secs(60))
            .await
            .unwrap();
        let got: Option<Snapshot> = cache.get(&key).await.unwrap();
        assert_eq!(got, Some(sample()));

        let stats = cache.stats();
        assert_eq!(stats.backend, "memory");
        assert_eq!(stats.hits, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn entries_expire() {
        let cache = CacheClient::in_memory();
        cache
            .set("k", &sample(), Duration::from_secs(1))
            .await
            .unwrap();
        tokio::time::advance(Duration::from_secs(2)).await;
        let got: Option<Snapshot> = cache.get("k").await.unwrap();
        assert_eq!(got, None);
        assert!(!cache.exists("k").await.unwrap());
    }

    #[tokio::test]
    async fn delete_and_clear() {
        let cache = CacheClient::in_memory();
        cache
            .set("a", &sample(), Duration::from_secs(60))
            .await
            .unwrap();
        cache
            .set("b", &sample(), Duration::from_secs(60))
            .await
            .unwrap();

        cache.delete("a").await.unwrap();
        assert!(!cache.exists("a").await.unwrap());
        assert!(cache.exists("b").await.unwrap());

        cache.clear().await.unwrap();
        assert!(!cache.exists("b").await.unwrap());
    }

    #[tokio::test]
    async fn corrupt_payload_reads_as_miss() {
        let cache = CacheClient::in_memory();
        cache
            .set_raw("bad", "{not json".to_string(), Duration::from_secs(60))
            .await
            .unwrap();
        let got: Option<Snapshot> = cache.get("bad").await.unwrap();
        assert_eq!(got, None);
        assert_eq!(cache.stats().errors, 1);
    }

    #[tokio::test]
    async fn strict_mode_surfaces_decode_errors() {
        let cache = CacheClient::in_memory().strict();
        cache
            .set_raw("bad", "{not json".to_string(), Duration::from_secs(60))
            .await
            .unwrap();
        let err = cache.get::<Snapshot>("bad").await.unwrap_err();
        assert_eq!(err.category(), "cache");
    }

    #[tokio::test]
    async fn entity_ttls_are_ordered() {
        assert!(EntityKind::Brokerage.ttl() > EntityKind::Company.ttl());
        assert!(EntityKind::StockRating.ttl() > EntityKind::Brokerage.ttl());
        assert_eq!(EntityKind::Generic.ttl(), Duration::from_secs(3600));
    }

    #[tokio::test]
    async fn mget_preserves_order() {
        let cache = CacheClient::in_memory();
        cache
            .set("one", &sample(), Duration::from_secs(60))
            .await
            .unwrap();
        let got: Vec<Option<Snapshot>> = cache
            .mget(&["one".to_string(), "two".to_string()])
            .await
            .unwrap();
        assert!(got[0].is_some());
        assert!(got[1].is_none());
    }
}
