//! JWKS cache for the identity provider's signing keys.
//!
//! Keys are fetched from the provider's published JWKS endpoint and cached
//! for a configurable TTL (24 hours by default). A stale entry triggers a
//! refetch, but if that fetch fails the stale entry is still served: the
//! provider rotates keys rarely, and an unreachable provider must not lock
//! out a user whose key is already known.
//!
//! The cache envelope is persisted in the general store under
//! [`JWKS_CACHE_KEY`] after every successful fetch and loaded lazily on first
//! use.

use crate::config::{SessionConfig, DEFAULT_HTTP_TIMEOUT, DEFAULT_JWKS_CACHE_TTL};
use crate::errors::KeyError;
use crate::storage::{load_json, save_json, KeyValueStore};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OnceCell, RwLock};
use tracing::instrument;

/// General-store entry holding the persisted key set.
pub const JWKS_CACHE_KEY: &str = "jwksCache";

/// Connect timeout for JWKS fetches.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// JSON Web Key as published by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Jwk {
    /// Key type: "OKP", "RSA" or "EC".
    pub kty: String,

    /// Key ID, matched against the token header's `kid`.
    pub kid: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alg: Option<String>,

    #[serde(default, rename = "use", skip_serializing_if = "Option::is_none")]
    pub key_use: Option<String>,

    /// Curve name for OKP and EC keys.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crv: Option<String>,

    /// OKP public key, or EC x coordinate (base64url).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<String>,

    /// EC y coordinate (base64url).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<String>,

    /// RSA modulus (base64url).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub n: Option<String>,

    /// RSA public exponent (base64url).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub e: Option<String>,
}

/// A cached key and when it was fetched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JwksEntry {
    pub key_id: String,
    pub key_material: Jwk,
    pub fetched_at: DateTime<Utc>,
}

/// Body of the JWKS endpoint. Keys are parsed one by one so a single
/// unusable entry does not discard the whole set.
#[derive(Debug, Deserialize)]
struct JwksResponse {
    keys: Vec<serde_json::Value>,
}

/// Persisted form of the cache.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JwksEnvelope {
    keys: Vec<Jwk>,
    fetched_at: DateTime<Utc>,
}

struct CachedJwks {
    entries: HashMap<String, JwksEntry>,
    fetched_at: DateTime<Utc>,
}

impl CachedJwks {
    fn new(keys: Vec<Jwk>, fetched_at: DateTime<Utc>) -> Self {
        let entries = keys
            .into_iter()
            .map(|key| {
                let entry = JwksEntry {
                    key_id: key.kid.clone(),
                    key_material: key,
                    fetched_at,
                };
                (entry.key_id.clone(), entry)
            })
            .collect();
        Self {
            entries,
            fetched_at,
        }
    }

    fn is_fresh(&self, ttl: Duration, now: DateTime<Utc>) -> bool {
        // A fetch time in the future (clock moved back) counts as fresh.
        (now - self.fetched_at)
            .to_std()
            .map_or(true, |age| age < ttl)
    }

    fn envelope(&self) -> JwksEnvelope {
        let mut keys: Vec<Jwk> = self
            .entries
            .values()
            .map(|entry| entry.key_material.clone())
            .collect();
        keys.sort_by(|a, b| a.kid.cmp(&b.kid));
        JwksEnvelope {
            keys,
            fetched_at: self.fetched_at,
        }
    }
}

/// Fetches and caches the provider's signing keys.
pub struct JwksCache {
    jwks_url: String,
    http_client: reqwest::Client,
    store: Arc<dyn KeyValueStore>,
    cache: RwLock<Option<CachedJwks>>,
    loaded: OnceCell<()>,
    /// Held for the duration of a network fetch.
    fetch_lock: Mutex<()>,
    /// Bumped after every successful fetch.
    generation: AtomicU64,
    cache_ttl: Duration,
}

impl JwksCache {
    /// Cache with the default TTL and HTTP timeout.
    pub fn new(jwks_url: String, store: Arc<dyn KeyValueStore>) -> Self {
        Self::with_options(jwks_url, store, DEFAULT_JWKS_CACHE_TTL, DEFAULT_HTTP_TIMEOUT)
    }

    pub fn from_config(config: &SessionConfig, store: Arc<dyn KeyValueStore>) -> Self {
        Self::with_options(
            config.jwks_url.clone(),
            store,
            config.jwks_cache_ttl,
            config.http_timeout,
        )
    }

    /// # Arguments
    ///
    /// * `jwks_url` - the provider's JWKS endpoint
    /// * `store` - general store for the persisted envelope
    /// * `cache_ttl` - how long a fetched key set counts as fresh
    /// * `http_timeout` - total timeout for one fetch
    pub fn with_options(
        jwks_url: String,
        store: Arc<dyn KeyValueStore>,
        cache_ttl: Duration,
        http_timeout: Duration,
    ) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(http_timeout)
            .connect_timeout(CONNECT_TIMEOUT.min(http_timeout))
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!(target: "auth.jwks", error = %e, "Failed to build HTTP client with custom config, using defaults");
                reqwest::Client::new()
            });

        Self {
            jwks_url,
            http_client,
            store,
            cache: RwLock::new(None),
            loaded: OnceCell::new(),
            fetch_lock: Mutex::new(()),
            generation: AtomicU64::new(0),
            cache_ttl,
        }
    }

    /// Get the key for `kid`, fetching the key set when the cache is stale,
    /// empty or lacks the key.
    ///
    /// # Errors
    ///
    /// - `KeyError::UnknownSigningKey` if a freshly fetched set does not
    ///   contain `kid`, or the fetch failed and the cache does not contain it.
    /// - `KeyError::NoKeysAvailable` if the fetch failed and nothing is cached.
    #[instrument(skip(self), fields(kid = %kid))]
    pub async fn get_key(&self, kid: &str) -> Result<Jwk, KeyError> {
        self.ensure_loaded().await;

        let generation = self.generation.load(Ordering::SeqCst);
        if let Some(key) = self.fresh_key(kid).await {
            tracing::debug!(target: "auth.jwks", kid = %kid, "JWKS cache hit");
            return Ok(key);
        }

        let _fetch = self.fetch_lock.lock().await;

        // Another caller may have completed a fetch while we waited.
        if self.generation.load(Ordering::SeqCst) != generation {
            let cache = self.cache.read().await;
            if let Some(cached) = cache.as_ref() {
                if cached.is_fresh(self.cache_ttl, Utc::now()) {
                    return cached
                        .entries
                        .get(kid)
                        .map(|entry| entry.key_material.clone())
                        .ok_or(KeyError::UnknownSigningKey);
                }
            }
        }

        match self.fetch().await {
            Ok(keys) => {
                let cached = CachedJwks::new(keys, Utc::now());
                let key = cached
                    .entries
                    .get(kid)
                    .map(|entry| entry.key_material.clone());

                self.persist(&cached).await;
                *self.cache.write().await = Some(cached);
                self.generation.fetch_add(1, Ordering::SeqCst);

                key.ok_or_else(|| {
                    tracing::warn!(target: "auth.jwks", kid = %kid, "Key not found in JWKS after refresh");
                    KeyError::UnknownSigningKey
                })
            }
            Err(reason) => {
                tracing::warn!(target: "auth.jwks", kid = %kid, reason = %reason, "JWKS fetch failed, falling back to cache");
                self.lookup_cached(kid).await
            }
        }
    }

    /// Cache-only lookup: no network, staleness ignored.
    ///
    /// # Errors
    ///
    /// `KeyError::NoKeysAvailable` when nothing is cached, otherwise
    /// `KeyError::UnknownSigningKey` when `kid` is not cached.
    pub async fn cached_key(&self, kid: &str) -> Result<Jwk, KeyError> {
        self.ensure_loaded().await;
        self.lookup_cached(kid).await
    }

    /// When the cached key set was fetched, if one is cached.
    pub async fn fetched_at(&self) -> Option<DateTime<Utc>> {
        self.ensure_loaded().await;
        self.cache.read().await.as_ref().map(|c| c.fetched_at)
    }

    async fn fresh_key(&self, kid: &str) -> Option<Jwk> {
        let cache = self.cache.read().await;
        let cached = cache.as_ref()?;
        if !cached.is_fresh(self.cache_ttl, Utc::now()) {
            return None;
        }
        cached
            .entries
            .get(kid)
            .map(|entry| entry.key_material.clone())
    }

    async fn lookup_cached(&self, kid: &str) -> Result<Jwk, KeyError> {
        let cache = self.cache.read().await;
        let cached = cache.as_ref().ok_or(KeyError::NoKeysAvailable)?;
        cached
            .entries
            .get(kid)
            .map(|entry| entry.key_material.clone())
            .ok_or(KeyError::UnknownSigningKey)
    }

    async fn ensure_loaded(&self) {
        self.loaded
            .get_or_init(|| async {
                match load_json::<JwksEnvelope>(self.store.as_ref(), JWKS_CACHE_KEY).await {
                    Ok(Some(envelope)) => {
                        let mut cache = self.cache.write().await;
                        if cache.is_none() {
                            tracing::debug!(
                                target: "auth.jwks",
                                key_count = envelope.keys.len(),
                                fetched_at = %envelope.fetched_at,
                                "Loaded persisted JWKS"
                            );
                            *cache = Some(CachedJwks::new(envelope.keys, envelope.fetched_at));
                        }
                    }
                    Ok(None) => {}
                    Err(e) => {
                        tracing::warn!(target: "auth.jwks", error = %e, "Ignoring unreadable persisted JWKS");
                    }
                }
            })
            .await;
    }

    async fn persist(&self, cached: &CachedJwks) {
        if let Err(e) = save_json(self.store.as_ref(), JWKS_CACHE_KEY, &cached.envelope()).await {
            tracing::warn!(target: "auth.jwks", error = %e, "Failed to persist JWKS");
        }
    }

    async fn fetch(&self) -> Result<Vec<Jwk>, String> {
        tracing::debug!(target: "auth.jwks", url = %self.jwks_url, "Fetching JWKS");

        let response = self
            .http_client
            .get(&self.jwks_url)
            .send()
            .await
            .map_err(|e| format!("request failed: {e}"))?;

        if !response.status().is_success() {
            return Err(format!("endpoint returned {}", response.status()));
        }

        let body: JwksResponse = response
            .json()
            .await
            .map_err(|e| format!("unparsable body: {e}"))?;

        let total = body.keys.len();
        let keys: Vec<Jwk> = body
            .keys
            .into_iter()
            .filter_map(|value| serde_json::from_value(value).ok())
            .collect();

        if keys.len() < total {
            tracing::debug!(target: "auth.jwks", skipped = total - keys.len(), "Skipped unusable JWKS entries");
        }
        tracing::info!(target: "auth.jwks", key_count = keys.len(), "JWKS cache refreshed");

        Ok(keys)
    }
}
