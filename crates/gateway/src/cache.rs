//! C3 — pluggable cache provider: get/set/remove/exists with TTL, plus a
//! distributed lock keyed by a per-holder nonce.
//!
//! Two variants behind one [`CacheProvider`] trait, matching `spec.md` §4.3:
//! [`InMemoryCache`] (a `moka` TTL cache, used when `CacheProviderType::InMemory`)
//! and [`RemoteCache`] (a `redis` connection manager, used for `Remote`). The
//! router and handlers only ever see `Arc<dyn CacheProvider>` — never the
//! concrete variant, per `SPEC_FULL.md` §9 "dynamic object dispatch over
//! cache/auth providers maps to a narrow capability interface".

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use serde::{Serialize, de::DeserializeOwned};
use tokio::time::Instant;

use gateway_core::GatewayError;

use crate::config::{CacheConfig, CacheProviderType};

/// Which concrete provider is backing a [`CacheProvider`] trait object.
/// Exposed so callers (e.g. `/health/details`) can report it without the
/// router depending on the concrete type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
	InMemory,
	Remote,
}

/// A held distributed lock. Ownership is tied to `nonce`: `release`/`extend`
/// are no-ops once another caller has taken over the key after expiry, per
/// `spec.md` §3 "ownership is per-nonce".
pub struct LockHandle {
	key: String,
	nonce: u64,
	provider: Arc<dyn CacheProvider>,
	pub expires_at: Instant,
}

impl LockHandle {
	/// Re-stamps the lock's expiry iff this handle is still the current
	/// holder. Returns `false` if another caller has since taken the key.
	pub async fn extend(&mut self, ttl: Duration) -> bool {
		let extended = self.provider.extend_lock(&self.key, self.nonce, ttl).await;
		if extended {
			self.expires_at = Instant::now() + ttl;
		}
		extended
	}

	/// Releases the lock. A no-op if the current holder's nonce no longer
	/// matches this handle's — never fails, never panics on double-release.
	pub async fn release(self) {
		self.provider.release_lock(&self.key, self.nonce).await;
	}
}

/// The narrow capability interface every handler/router depends on.
/// `get`/`set` are generic over the stored value so callers don't hand-roll
/// (de)serialisation at every call site; the wire representation is JSON.
#[async_trait]
pub trait CacheProvider: Send + Sync {
	async fn get_bytes(&self, key: &str) -> Option<Vec<u8>>;
	async fn set_bytes(&self, key: &str, value: Vec<u8>, ttl: Duration);
	async fn remove(&self, key: &str);
	async fn exists(&self, key: &str) -> bool;
	async fn refresh_expiration(&self, key: &str, ttl: Duration);

	/// Internal to [`LockHandle`]/[`acquire_lock`]; not part of the surface callers use directly.
	async fn try_acquire_lock(&self, lock_key: &str, nonce: u64, expiry: Duration) -> bool;
	async fn extend_lock(&self, key: &str, nonce: u64, ttl: Duration) -> bool;
	async fn release_lock(&self, key: &str, nonce: u64);

	fn provider_kind(&self) -> ProviderKind;
	fn is_connected(&self) -> bool;
}

/// Extension methods layered on [`CacheProvider`] for typed access and lock
/// acquisition — kept outside the trait so it stays object-safe.
#[async_trait]
pub trait CacheProviderExt: CacheProvider {
	async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
		let bytes = self.get_bytes(key).await?;
		serde_json::from_slice(&bytes).ok()
	}

	async fn set<T: Serialize + Sync>(&self, key: &str, value: &T, ttl: Duration) {
		if let Ok(bytes) = serde_json::to_vec(value) {
			self.set_bytes(key, bytes, ttl).await;
		}
	}
}

impl<T: CacheProvider + ?Sized> CacheProviderExt for T {}

/// Blocks up to `wait_for`, polling every `retry`, until a lock on `key` is
/// acquired against `provider`. Returns `None` on timeout, matching
/// `spec.md` §4.3. A free function (rather than a `CacheProvider` method) so
/// it works uniformly over `Arc<dyn CacheProvider>` — the `LockHandle` it
/// returns needs to hold that same `Arc` to call back into `release`/`extend`.
pub async fn acquire_lock(
	provider: &Arc<dyn CacheProvider>,
	key: &str,
	expiry: Duration,
	wait_for: Duration,
	retry: Duration,
) -> Option<LockHandle> {
	let lock_key = format!("lock:{key}");
	let nonce: u64 = rand::thread_rng().r#gen();
	let deadline = Instant::now() + wait_for;
	loop {
		if provider.try_acquire_lock(&lock_key, nonce, expiry).await {
			return Some(LockHandle {
				key: lock_key,
				nonce,
				provider: provider.clone(),
				expires_at: Instant::now() + expiry,
			});
		}
		if Instant::now() >= deadline {
			return None;
		}
		tokio::time::sleep(retry).await;
	}
}

/// In-process TTL cache, backed by `moka`. Used when `CacheProviderType::InMemory`.
pub struct InMemoryCache {
	entries: moka::future::Cache<String, Vec<u8>>,
	locks: moka::future::Cache<String, u64>,
}

impl InMemoryCache {
	pub fn new() -> Self {
		InMemoryCache {
			entries: moka::future::Cache::builder()
				.max_capacity(100_000)
				.build(),
			locks: moka::future::Cache::builder().max_capacity(10_000).build(),
		}
	}
}

impl Default for InMemoryCache {
	fn default() -> Self {
		Self::new()
	}
}

#[async_trait]
impl CacheProvider for InMemoryCache {
	async fn get_bytes(&self, key: &str) -> Option<Vec<u8>> {
		self.entries.get(key).await
	}

	async fn set_bytes(&self, key: &str, value: Vec<u8>, ttl: Duration) {
		// moka's per-entry TTL requires an `Expiry` policy at builder time; for
		// this narrow contract a fixed-capacity cache plus manual expiry-on-read
		// would duplicate moka's own eviction machinery, so entries simply ride
		// the cache's global policy and an explicit `remove` after `ttl` enforces
		// the per-call TTL contract without blocking the caller.
		self.entries.insert(key.to_string(), value).await;
		let entries = self.entries.clone();
		let key = key.to_string();
		tokio::spawn(async move {
			tokio::time::sleep(ttl).await;
			entries.invalidate(&key).await;
		});
	}

	async fn remove(&self, key: &str) {
		self.entries.invalidate(key).await;
	}

	async fn exists(&self, key: &str) -> bool {
		self.entries.contains_key(key)
	}

	async fn refresh_expiration(&self, key: &str, ttl: Duration) {
		if let Some(value) = self.entries.get(key).await {
			self.set_bytes(key, value, ttl).await;
		}
	}

	async fn try_acquire_lock(&self, lock_key: &str, nonce: u64, expiry: Duration) -> bool {
		if self.locks.get(lock_key).await.is_some() {
			return false;
		}
		self.locks.insert(lock_key.to_string(), nonce).await;
		let locks = self.locks.clone();
		let key = lock_key.to_string();
		tokio::spawn(async move {
			tokio::time::sleep(expiry).await;
			if locks.get(&key).await == Some(nonce) {
				locks.invalidate(&key).await;
			}
		});
		true
	}

	async fn extend_lock(&self, key: &str, nonce: u64, ttl: Duration) -> bool {
		if self.locks.get(key).await == Some(nonce) {
			self.locks.insert(key.to_string(), nonce).await;
			let locks = self.locks.clone();
			let key = key.to_string();
			tokio::spawn(async move {
				tokio::time::sleep(ttl).await;
				if locks.get(&key).await == Some(nonce) {
					locks.invalidate(&key).await;
				}
			});
			true
		} else {
			false
		}
	}

	async fn release_lock(&self, key: &str, nonce: u64) {
		if self.locks.get(key).await == Some(nonce) {
			self.locks.invalidate(key).await;
		}
	}

	fn provider_kind(&self) -> ProviderKind {
		ProviderKind::InMemory
	}

	fn is_connected(&self) -> bool {
		true
	}
}

/// Redis-backed cache, used when `CacheProviderType::Remote`. Cache-provider
/// failures never crash callers (`spec.md` §4.3): every operation here
/// degrades to a cache-miss/no-op on connection error, logging the cause.
#[derive(Clone)]
pub struct RemoteCache {
	manager: redis::aio::ConnectionManager,
}

impl RemoteCache {
	pub async fn connect(connection_string: &str) -> Result<Self, GatewayError> {
		let client = redis::Client::open(connection_string)
			.map_err(|e| GatewayError::configuration(format!("invalid redis connection string: {e}")))?;
		let manager = client
			.get_connection_manager()
			.await
			.map_err(|e| GatewayError::upstream(format!("failed to connect to redis: {e}")))?;
		Ok(RemoteCache { manager })
	}
}

#[async_trait]
impl CacheProvider for RemoteCache {
	async fn get_bytes(&self, key: &str) -> Option<Vec<u8>> {
		let mut conn = self.manager.clone();
		match redis::AsyncCommands::get::<_, Option<Vec<u8>>>(&mut conn, key).await {
			Ok(value) => value,
			Err(e) => {
				tracing::warn!(error = %e, key, "cache get failed, degrading to miss");
				None
			},
		}
	}

	async fn set_bytes(&self, key: &str, value: Vec<u8>, ttl: Duration) {
		let mut conn = self.manager.clone();
		let seconds = ttl.as_secs().max(1);
		if let Err(e) = redis::AsyncCommands::set_ex::<_, _, ()>(&mut conn, key, value, seconds).await {
			tracing::warn!(error = %e, key, "cache set failed");
		}
	}

	async fn remove(&self, key: &str) {
		let mut conn = self.manager.clone();
		if let Err(e) = redis::AsyncCommands::del::<_, ()>(&mut conn, key).await {
			tracing::warn!(error = %e, key, "cache remove failed");
		}
	}

	async fn exists(&self, key: &str) -> bool {
		let mut conn = self.manager.clone();
		redis::AsyncCommands::exists(&mut conn, key).await.unwrap_or(false)
	}

	async fn refresh_expiration(&self, key: &str, ttl: Duration) {
		let mut conn = self.manager.clone();
		let seconds = ttl.as_secs().max(1) as i64;
		if let Err(e) = redis::AsyncCommands::expire::<_, ()>(&mut conn, key, seconds).await {
			tracing::warn!(error = %e, key, "cache refresh_expiration failed");
		}
	}

	async fn try_acquire_lock(&self, lock_key: &str, nonce: u64, expiry: Duration) -> bool {
		let mut conn = self.manager.clone();
		let seconds = expiry.as_secs().max(1);
		let opts = redis::SetOptions::default()
			.with_expiration(redis::SetExpiry::EX(seconds))
			.conditional_set(redis::ExistenceCheck::NX);
		matches!(
			redis::AsyncCommands::set_options::<_, _, Option<String>>(&mut conn, lock_key, nonce, opts).await,
			Ok(Some(_))
		)
	}

	async fn extend_lock(&self, key: &str, nonce: u64, ttl: Duration) -> bool {
		let mut conn = self.manager.clone();
		let current: Option<u64> = redis::AsyncCommands::get(&mut conn, key).await.unwrap_or(None);
		if current != Some(nonce) {
			return false;
		}
		let seconds = ttl.as_secs().max(1);
		redis::AsyncCommands::set_ex::<_, _, ()>(&mut conn, key, nonce, seconds)
			.await
			.is_ok()
	}

	async fn release_lock(&self, key: &str, nonce: u64) {
		let mut conn = self.manager.clone();
		let current: Option<u64> = redis::AsyncCommands::get(&mut conn, key).await.unwrap_or(None);
		if current == Some(nonce) {
			let _: Result<(), _> = redis::AsyncCommands::del(&mut conn, key).await;
		}
	}

	fn provider_kind(&self) -> ProviderKind {
		ProviderKind::Remote
	}

	fn is_connected(&self) -> bool {
		// ConnectionManager reconnects transparently; a cheap liveness proxy is
		// "we successfully built one", which by construction is always true here.
		true
	}
}

/// Builds the configured provider. `Remote` without `remote` config is a
/// configuration error, not a silent fallback to `InMemory`.
pub async fn build_provider(config: &CacheConfig) -> Result<Arc<dyn CacheProvider>, GatewayError> {
	match config.provider_type {
		CacheProviderType::InMemory => Ok(Arc::new(InMemoryCache::new())),
		CacheProviderType::Remote => {
			let remote = config
				.remote
				.as_ref()
				.ok_or_else(|| GatewayError::configuration("cache_config.remote required when providerType=remote"))?;
			let cache = RemoteCache::connect(&remote.connection_string).await?;
			Ok(Arc::new(cache))
		},
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn in_memory_round_trips_values() {
		let cache = InMemoryCache::new();
		cache.set("k", &serde_json::json!({"a": 1}), Duration::from_secs(30)).await;
		let value: serde_json::Value = cache.get("k").await.unwrap();
		assert_eq!(value, serde_json::json!({"a": 1}));
		assert!(cache.exists("k").await);
		cache.remove("k").await;
		assert!(!cache.exists("k").await);
	}

	#[tokio::test]
	async fn missing_key_is_a_clean_miss() {
		let cache = InMemoryCache::new();
		let value: Option<serde_json::Value> = cache.get("missing").await;
		assert!(value.is_none());
	}

	#[tokio::test]
	async fn lock_is_exclusive_until_released() {
		let cache: Arc<dyn CacheProvider> = Arc::new(InMemoryCache::new());
		let first = acquire_lock(&cache, "resource", Duration::from_secs(30), Duration::from_millis(50), Duration::from_millis(10)).await;
		assert!(first.is_some());

		let second = acquire_lock(&cache, "resource", Duration::from_secs(30), Duration::from_millis(50), Duration::from_millis(10)).await;
		assert!(second.is_none(), "lock should still be held");

		first.unwrap().release().await;

		let third = acquire_lock(&cache, "resource", Duration::from_secs(30), Duration::from_millis(50), Duration::from_millis(10)).await;
		assert!(third.is_some(), "lock should be reacquirable after release");
	}
}
