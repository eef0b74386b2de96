//! Cached JSON Web Key Set.
//!
//! # Invariants
//! - Keys are only served while the cache is fresh; an expired set is dropped
//!   before it is refetched, so a failed refresh never falls back to it.
//! - Concurrent callers that find the cache expired trigger one fetch; the
//!   others wait on the write lock and reuse its result.
//! - An unknown `kid` refetches a fresh set at most once per
//!   [`MIN_REFETCH_INTERVAL`], so rotated keys are picked up without letting
//!   bogus tokens hammer the endpoint.

use std::time::{Duration, Instant};

use jsonwebtoken::jwk::{Jwk, JwkSet};
use reqwest::header::CACHE_CONTROL;
use tokio::sync::RwLock;

use crate::error::{Error, Result};
use crate::token::invalid_token;

/// Lifetime of a key set whose response carried no `max-age`.
pub const DEFAULT_KEYS_TTL: Duration = Duration::from_secs(5 * 60);

/// Upper bound on how long a key set is cached.
pub const MAX_KEYS_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Shortest gap between two fetches caused by unknown key ids.
pub const MIN_REFETCH_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug)]
struct CachedKeys {
    keys: JwkSet,
    fetched_at: Instant,
    expires_at: Instant,
}

impl CachedKeys {
    fn new(keys: JwkSet, ttl: Duration) -> Self {
        let now = Instant::now();
        Self {
            keys,
            fetched_at: now,
            expires_at: now + ttl.min(MAX_KEYS_TTL),
        }
    }

    fn is_fresh(&self) -> bool {
        Instant::now() < self.expires_at
    }

    fn has(&self, kid: &str) -> bool {
        self.keys.find(kid).is_some()
    }

    fn find(&self, kid: &str) -> Result<Jwk> {
        self.keys
            .find(kid)
            .cloned()
            .ok_or_else(|| invalid_token(format!("no signing key with kid '{kid}'")))
    }
}

/// A JWKS endpoint with a response cache.
#[derive(Debug)]
pub struct KeySource {
    url: String,
    http: reqwest::Client,
    cache: RwLock<Option<CachedKeys>>,
    refetch_interval: Duration,
}

impl KeySource {
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            http: reqwest::Client::new(),
            cache: RwLock::new(None),
            refetch_interval: MIN_REFETCH_INTERVAL,
        }
    }

    /// A source whose cache starts out holding `keys` for `ttl`.
    #[must_use]
    pub fn with_keys(url: impl Into<String>, keys: JwkSet, ttl: Duration) -> Self {
        Self {
            url: url.into(),
            http: reqwest::Client::new(),
            cache: RwLock::new(Some(CachedKeys::new(keys, ttl))),
            refetch_interval: MIN_REFETCH_INTERVAL,
        }
    }

    /// Change how often an unknown `kid` may trigger a refetch.
    #[must_use]
    pub const fn with_refetch_interval(mut self, interval: Duration) -> Self {
        self.refetch_interval = interval;
        self
    }

    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Find the key with id `kid`, refreshing the set if it expired or does
    /// not know `kid`.
    ///
    /// # Errors
    /// - `MissingAuth` (`invalid_token`) if no key has that id.
    /// - `InternalIssue` if the set expired and the fetch fails.
    pub async fn find(&self, kid: &str) -> Result<Jwk> {
        {
            let cache = self.cache.read().await;
            if let Some(cached) = cache.as_ref().filter(|c| c.is_fresh())
                && (cached.has(kid) || !self.may_refetch(cached))
            {
                return cached.find(kid);
            }
        }

        let mut cache = self.cache.write().await;
        if !cache.as_ref().is_some_and(CachedKeys::is_fresh) {
            *cache = None;
            *cache = Some(self.fetch().await?);
        } else if let Some(cached) = cache
            .as_mut()
            .filter(|c| !c.has(kid) && self.may_refetch(c))
        {
            tracing::debug!(%kid, "unknown key id, refetching signing keys");
            match self.fetch().await {
                Ok(fresh) => *cached = fresh,
                Err(e) => {
                    tracing::warn!("signing key refetch failed: {e}");
                    cached.fetched_at = Instant::now();
                }
            }
        }

        cache
            .as_ref()
            .ok_or_else(|| Error::internal().hint("key cache is empty after refresh"))?
            .find(kid)
    }

    fn may_refetch(&self, cached: &CachedKeys) -> bool {
        cached.fetched_at.elapsed() >= self.refetch_interval
    }

    async fn fetch(&self) -> Result<CachedKeys> {
        tracing::debug!(url = %self.url, "fetching signing keys");

        let response = self
            .http
            .get(&self.url)
            .send()
            .await
            .map_err(|e| Error::internal().caused_by(e).hint("fetching signing keys"))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::internal().hint(format!("key endpoint answered {status}")));
        }

        let ttl = response
            .headers()
            .get(CACHE_CONTROL)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_max_age)
            .unwrap_or(DEFAULT_KEYS_TTL);

        let keys = response
            .json::<JwkSet>()
            .await
            .map_err(|e| Error::internal().caused_by(e).hint("decoding signing keys"))?;

        tracing::info!(keys = keys.keys.len(), ttl_secs = ttl.as_secs(), "refreshed signing keys");
        Ok(CachedKeys::new(keys, ttl))
    }
}

/// The `max-age` directive of a `Cache-Control` value.
#[must_use]
pub fn parse_max_age(cache_control: &str) -> Option<Duration> {
    cache_control
        .split(',')
        .filter_map(|directive| {
            let (name, value) = directive.trim().split_once('=')?;
            name.trim()
                .eq_ignore_ascii_case("max-age")
                .then(|| value.trim().trim_matches('"').parse::<u64>().ok())
                .flatten()
        })
        .next()
        .map(Duration::from_secs)
}
