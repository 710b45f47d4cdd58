//! The multi-source public-key registry.

use crate::metrics;
use gatesync_cache::ConfigCache;
use gatesync_types::{KeyFetcher, PublicKeyInfo, PublicKeySource, time::now_unix};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;

/// Per-source refresh bookkeeping, readable for health and admin output.
#[derive(Debug, Clone, Default)]
pub struct SourceStats {
    pub refresh_count: u64,
    pub failure_count: u64,
    pub last_success_unix: Option<u64>,
    pub last_failure_unix: Option<u64>,
}

/// The defined, non-blocking outcome of a source refresh.
///
/// A failed refresh never removes previously cached keys; `retained` tells
/// the caller whether stale entries are still being served for the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceRefreshOutcome {
    Applied { keys: usize },
    Failed { retained: bool },
}

/// Resolves `(kid, issuer)` to verification-key material, backed by
/// independently refreshing sources.
///
/// All sources publish into one snapshot cache, but each refresh replaces
/// only its own source's entries: failure domains stay isolated, and a
/// fetch failure leaves the source's prior key set untouched.
pub struct PublicKeyRegistry {
    sources: Vec<Arc<PublicKeySource>>,
    fetcher: Arc<dyn KeyFetcher>,
    cache: ConfigCache<String, PublicKeyInfo>,
    /// Serializes cache rebuilds; lookups stay lock-free.
    apply_lock: Mutex<()>,
    stats: Mutex<HashMap<String, SourceStats>>,
    full_refreshes: AtomicU64,
    last_full_refresh_unix: AtomicU64,
    /// Lazily computed source-count gauge value.
    source_count: Mutex<Option<usize>>,
    shutdown: watch::Sender<bool>,
}

impl PublicKeyRegistry {
    /// Creates a registry over the configured sources.
    #[must_use]
    pub fn new(sources: Vec<PublicKeySource>, fetcher: Arc<dyn KeyFetcher>) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            sources: sources.into_iter().map(Arc::new).collect(),
            fetcher,
            cache: ConfigCache::new(),
            apply_lock: Mutex::new(()),
            stats: Mutex::new(HashMap::new()),
            full_refreshes: AtomicU64::new(0),
            last_full_refresh_unix: AtomicU64::new(0),
            source_count: Mutex::new(None),
            shutdown,
        }
    }

    /// Looks up a verification key.
    ///
    /// Resolution order: provider-prefixed `(sourceId|issuer, kid)` for
    /// sources configured that way, then `(issuer, kid)`, then the default
    /// source's unqualified kid. A miss returns `None`; the caller treats it
    /// as an authentication failure, not a system error.
    #[must_use]
    pub fn find_public_key(&self, kid: &str, issuer: Option<&str>) -> Option<Arc<PublicKeyInfo>> {
        if let Some(iss) = issuer {
            for source in &self.sources {
                if source.use_provider_prefixed_key
                    && let Some(found) = self.cache.get(&format!("{}|{iss}::{kid}", source.id))
                {
                    return Some(found);
                }
            }
            if let Some(found) = self.cache.get(&format!("{iss}::{kid}")) {
                return Some(found);
            }
        }
        let unqualified = self.cache.get(&kid.to_string());
        if unqualified.is_none() {
            metrics::record_lookup_miss();
        }
        unqualified
    }

    /// Refreshes a single source, wholesale-replacing only that source's
    /// entries on success and retaining the prior set on failure.
    pub async fn refresh_source(&self, source: &PublicKeySource) -> SourceRefreshOutcome {
        match self.fetcher.fetch_keys(source).await {
            Ok(keys) => {
                let count = keys.len();
                {
                    let _guard = self.apply_lock.lock().expect("apply lock");
                    let snapshot = self.cache.snapshot();
                    let mut next: HashMap<String, Arc<PublicKeyInfo>> = snapshot
                        .iter()
                        .filter(|(_, v)| v.source_id != source.id)
                        .map(|(k, v)| (k.clone(), Arc::clone(v)))
                        .collect();
                    for key in keys {
                        let shared = Arc::new(key);
                        for cache_key in cache_keys(source, &shared) {
                            next.insert(cache_key, Arc::clone(&shared));
                        }
                    }
                    self.cache.replace_shared(next);
                }

                self.stats
                    .lock()
                    .expect("stats lock")
                    .entry(source.id.clone())
                    .and_modify(|s| {
                        s.refresh_count += 1;
                        s.last_success_unix = Some(now_unix());
                    })
                    .or_insert_with(|| SourceStats {
                        refresh_count: 1,
                        last_success_unix: Some(now_unix()),
                        ..SourceStats::default()
                    });
                metrics::record_source_refresh(&source.id, true);
                metrics::record_cache_size(self.cache.len());
                tracing::info!(source = source.id.as_str(), keys = count, "key source refreshed");
                SourceRefreshOutcome::Applied { keys: count }
            }
            Err(e) => {
                let retained = self
                    .cache
                    .snapshot()
                    .values()
                    .any(|v| v.source_id == source.id);
                self.stats
                    .lock()
                    .expect("stats lock")
                    .entry(source.id.clone())
                    .and_modify(|s| {
                        s.failure_count += 1;
                        s.last_failure_unix = Some(now_unix());
                    })
                    .or_insert_with(|| SourceStats {
                        failure_count: 1,
                        last_failure_unix: Some(now_unix()),
                        ..SourceStats::default()
                    });
                metrics::record_source_refresh(&source.id, false);
                tracing::warn!(
                    source = source.id.as_str(),
                    error = %e,
                    retained,
                    "key source refresh failed, keeping previous key set"
                );
                SourceRefreshOutcome::Failed { retained }
            }
        }
    }

    /// Sweeps every configured source. Returns the number of keys applied
    /// across successful sources; failed sources keep serving their prior
    /// sets.
    pub async fn refresh_all(&self) -> usize {
        let mut applied = 0usize;
        for source in &self.sources {
            if let SourceRefreshOutcome::Applied { keys } = self.refresh_source(source).await {
                applied += keys;
            }
        }
        self.full_refreshes.fetch_add(1, Ordering::Relaxed);
        self.last_full_refresh_unix
            .store(now_unix(), Ordering::Relaxed);
        metrics::record_full_refresh();
        applied
    }

    /// Spawns one background refresh task per source, each on its own
    /// interval. Tasks stop when [`shutdown`](Self::shutdown) is called.
    pub fn spawn_refresh_tasks(self: &Arc<Self>) -> Vec<tokio::task::JoinHandle<()>> {
        let mut handles = Vec::with_capacity(self.sources.len());
        for source in &self.sources {
            let source = Arc::clone(source);
            let registry = Arc::clone(self);
            let mut shutdown = self.shutdown.subscribe();
            handles.push(tokio::spawn(async move {
                let mut ticker =
                    tokio::time::interval(Duration::from_secs(source.refresh_interval_secs.max(1)));
                // The first tick fires immediately; consume it so the
                // startup refresh stays under the coordinator's control.
                ticker.tick().await;
                loop {
                    tokio::select! {
                        changed = shutdown.changed() => {
                            if changed.is_err() || *shutdown.borrow() {
                                break;
                            }
                        }
                        _ = ticker.tick() => {
                            let _ = registry.refresh_source(&source).await;
                        }
                    }
                }
                tracing::debug!(source = source.id.as_str(), "key refresh task stopped");
            }));
        }
        handles
    }

    /// Signals all background refresh tasks to stop.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
    }

    /// Number of cached key entries (all namespaces).
    #[must_use]
    pub fn cache_size(&self) -> usize {
        self.cache.len()
    }

    /// Number of configured sources, computed lazily and cached until
    /// [`invalidate_source_count`](Self::invalidate_source_count).
    #[must_use]
    pub fn source_count(&self) -> usize {
        let mut cached = self.source_count.lock().expect("source count lock");
        if let Some(n) = *cached {
            return n;
        }
        let n = self.sources.len();
        *cached = Some(n);
        metrics::record_source_count(n);
        n
    }

    /// Drops the cached source count so the next read recomputes it.
    pub fn invalidate_source_count(&self) {
        *self.source_count.lock().expect("source count lock") = None;
    }

    /// Per-source refresh bookkeeping.
    #[must_use]
    pub fn source_stats(&self, source_id: &str) -> Option<SourceStats> {
        self.stats.lock().expect("stats lock").get(source_id).cloned()
    }

    /// Completed full-registry sweeps.
    #[must_use]
    pub fn full_refresh_count(&self) -> u64 {
        self.full_refreshes.load(Ordering::Relaxed)
    }

    /// Unix timestamp of the last full sweep, zero if none completed yet.
    #[must_use]
    pub fn last_full_refresh_unix(&self) -> u64 {
        self.last_full_refresh_unix.load(Ordering::Relaxed)
    }
}

/// Cache keys a single entry is published under.
///
/// The primary namespace depends on the owning source's configuration; a
/// default source additionally publishes issuer-qualified keys under the
/// bare kid so unqualified lookups can resolve them.
fn cache_keys(source: &PublicKeySource, key: &PublicKeyInfo) -> Vec<String> {
    let mut keys = Vec::with_capacity(2);
    match key.issuer.as_deref() {
        Some(issuer) if source.use_provider_prefixed_key => {
            keys.push(format!("{}|{issuer}::{}", source.id, key.kid));
        }
        Some(issuer) => keys.push(format!("{issuer}::{}", key.kid)),
        None => keys.push(key.kid.clone()),
    }
    if source.is_default && key.issuer.is_some() {
        keys.push(key.kid.clone());
    }
    keys
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use gatesync_types::{KeySourceType, SyncError, error::Result};

    fn make_source(id: &str) -> PublicKeySource {
        PublicKeySource {
            id: id.to_string(),
            source_type: KeySourceType::Jwks,
            url: format!("https://{id}.example.com/jwks"),
            auth_type: None,
            credentials: None,
            refresh_interval_secs: 300,
            issuer: Some(format!("https://{id}.example.com")),
            is_default: false,
            use_provider_prefixed_key: false,
        }
    }

    fn make_key(kid: &str, issuer: Option<&str>, source_id: &str) -> PublicKeyInfo {
        PublicKeyInfo::new(
            kid,
            format!("material-{kid}"),
            "RSA",
            issuer.map(ToString::to_string),
            source_id,
            None,
        )
        .unwrap()
    }

    /// In-memory fetcher whose per-source behavior can be flipped between
    /// serving keys and failing, mirroring a flaky upstream.
    struct FakeFetcher {
        responses: Mutex<HashMap<String, Option<Vec<PublicKeyInfo>>>>,
    }

    impl FakeFetcher {
        fn new() -> Self {
            Self {
                responses: Mutex::new(HashMap::new()),
            }
        }

        fn serve(&self, source_id: &str, keys: Vec<PublicKeyInfo>) {
            self.responses
                .lock()
                .unwrap()
                .insert(source_id.to_string(), Some(keys));
        }

        fn fail(&self, source_id: &str) {
            self.responses
                .lock()
                .unwrap()
                .insert(source_id.to_string(), None);
        }
    }

    #[async_trait]
    impl KeyFetcher for FakeFetcher {
        async fn fetch_keys(&self, source: &PublicKeySource) -> Result<Vec<PublicKeyInfo>> {
            match self.responses.lock().unwrap().get(&source.id) {
                Some(Some(keys)) => Ok(keys.clone()),
                _ => Err(SyncError::Fetch(format!("{} unreachable", source.id))),
            }
        }
    }

    fn registry_with(
        sources: Vec<PublicKeySource>,
    ) -> (Arc<PublicKeyRegistry>, Arc<FakeFetcher>) {
        let fetcher = Arc::new(FakeFetcher::new());
        let registry = Arc::new(PublicKeyRegistry::new(
            sources,
            Arc::clone(&fetcher) as Arc<dyn KeyFetcher>,
        ));
        (registry, fetcher)
    }

    #[tokio::test]
    async fn test_unknown_kid_returns_none() {
        let (registry, _) = registry_with(vec![make_source("a")]);
        assert!(registry.find_public_key("missing", None).is_none());
        assert!(
            registry
                .find_public_key("missing", Some("https://a.example.com"))
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_refresh_and_issuer_qualified_lookup() {
        let (registry, fetcher) = registry_with(vec![make_source("a")]);
        fetcher.serve("a", vec![make_key("k1", Some("https://a.example.com"), "a")]);

        let outcome = registry.refresh_source(&make_source("a")).await;
        assert_eq!(outcome, SourceRefreshOutcome::Applied { keys: 1 });

        let found = registry
            .find_public_key("k1", Some("https://a.example.com"))
            .unwrap();
        assert_eq!(found.kid, "k1");
        // Non-default source: not visible without issuer qualification.
        assert!(registry.find_public_key("k1", None).is_none());
    }

    #[tokio::test]
    async fn test_default_source_serves_bare_kid() {
        let mut source = make_source("idp");
        source.is_default = true;
        let (registry, fetcher) = registry_with(vec![copy(&source)]);
        fetcher.serve("idp", vec![make_key("k1", Some("https://idp.example.com"), "idp")]);
        registry.refresh_source(&source).await;

        assert!(registry.find_public_key("k1", None).is_some());
        // An unknown issuer still resolves through the default fallback.
        assert!(
            registry
                .find_public_key("k1", Some("https://elsewhere.example.com"))
                .is_some()
        );
    }

    #[tokio::test]
    async fn test_provider_prefixed_keys_do_not_collide() {
        let mut a = make_source("a");
        a.use_provider_prefixed_key = true;
        let mut b = make_source("b");
        b.use_provider_prefixed_key = true;

        let (registry, fetcher) =
            registry_with(vec![copy(&a), copy(&b)]);
        // Both issuers reuse the same kid.
        fetcher.serve("a", vec![make_key("shared", Some("https://a.example.com"), "a")]);
        fetcher.serve("b", vec![make_key("shared", Some("https://b.example.com"), "b")]);
        registry.refresh_source(&a).await;
        registry.refresh_source(&b).await;

        let from_a = registry
            .find_public_key("shared", Some("https://a.example.com"))
            .unwrap();
        let from_b = registry
            .find_public_key("shared", Some("https://b.example.com"))
            .unwrap();
        assert_eq!(from_a.source_id, "a");
        assert_eq!(from_b.source_id, "b");
    }

    #[tokio::test]
    async fn test_failure_retains_prior_keys() {
        let source = make_source("a");
        let (registry, fetcher) = registry_with(vec![copy(&source)]);
        fetcher.serve("a", vec![make_key("k1", Some("https://a.example.com"), "a")]);
        registry.refresh_source(&source).await;

        fetcher.fail("a");
        let outcome = registry.refresh_source(&source).await;
        assert_eq!(outcome, SourceRefreshOutcome::Failed { retained: true });

        // Prior entries stay retrievable and the failure is recorded.
        assert!(
            registry
                .find_public_key("k1", Some("https://a.example.com"))
                .is_some()
        );
        let stats = registry.source_stats("a").unwrap();
        assert_eq!(stats.refresh_count, 1);
        assert_eq!(stats.failure_count, 1);
        assert!(stats.last_failure_unix.is_some());
    }

    #[tokio::test]
    async fn test_cold_failure_is_defined_outcome() {
        let source = make_source("a");
        let (registry, fetcher) = registry_with(vec![copy(&source)]);
        fetcher.fail("a");
        let outcome = registry.refresh_source(&source).await;
        assert_eq!(outcome, SourceRefreshOutcome::Failed { retained: false });
        assert!(registry.find_public_key("k1", None).is_none());
    }

    #[tokio::test]
    async fn test_source_failure_domains_are_isolated() {
        let a = make_source("a");
        let b = make_source("b");
        let (registry, fetcher) =
            registry_with(vec![copy(&a), copy(&b)]);
        fetcher.serve("a", vec![make_key("ka", Some("https://a.example.com"), "a")]);
        fetcher.serve("b", vec![make_key("kb", Some("https://b.example.com"), "b")]);
        let applied = registry.refresh_all().await;
        assert_eq!(applied, 2);

        // Source b starts failing; a full sweep must keep b's cached keys
        // and still refresh a.
        fetcher.fail("b");
        registry.refresh_all().await;
        assert!(
            registry
                .find_public_key("ka", Some("https://a.example.com"))
                .is_some()
        );
        assert!(
            registry
                .find_public_key("kb", Some("https://b.example.com"))
                .is_some()
        );
        assert_eq!(registry.full_refresh_count(), 2);
        assert!(registry.last_full_refresh_unix() > 0);
    }

    #[tokio::test]
    async fn test_refresh_replaces_source_set_wholesale() {
        let source = make_source("a");
        let (registry, fetcher) = registry_with(vec![copy(&source)]);
        fetcher.serve(
            "a",
            vec![
                make_key("old-1", Some("https://a.example.com"), "a"),
                make_key("old-2", Some("https://a.example.com"), "a"),
            ],
        );
        registry.refresh_source(&source).await;
        assert_eq!(registry.cache_size(), 2);

        fetcher.serve("a", vec![make_key("new", Some("https://a.example.com"), "a")]);
        registry.refresh_source(&source).await;

        assert!(
            registry
                .find_public_key("old-1", Some("https://a.example.com"))
                .is_none()
        );
        assert!(
            registry
                .find_public_key("new", Some("https://a.example.com"))
                .is_some()
        );
        assert_eq!(registry.cache_size(), 1);
    }

    #[tokio::test]
    async fn test_source_count_lazy_and_invalidated() {
        let (registry, _) = registry_with(vec![make_source("a"), make_source("b")]);
        assert_eq!(registry.source_count(), 2);
        registry.invalidate_source_count();
        assert_eq!(registry.source_count(), 2);
    }

    /// Field-by-field copy helper; `PublicKeySource` is deliberately not
    /// `Clone` because of its credential field.
    fn copy(source: &PublicKeySource) -> PublicKeySource {
        PublicKeySource {
            id: source.id.clone(),
            source_type: source.source_type,
            url: source.url.clone(),
            auth_type: source.auth_type.clone(),
            credentials: None,
            refresh_interval_secs: source.refresh_interval_secs,
            issuer: source.issuer.clone(),
            is_default: source.is_default,
            use_provider_prefixed_key: source.use_provider_prefixed_key,
        }
    }
}
