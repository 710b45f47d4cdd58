//! The refresh coordinator: drives all cached domains from change
//! notifications, with bounded-retry reloads and polling fallback.

use crate::health::HealthReport;
use crate::retry::RetryPolicy;
use arc_swap::ArcSwap;
use gatesync_access::AccessControlEngine;
use gatesync_cache::ConfigCache;
use gatesync_keys::PublicKeyRegistry;
use gatesync_types::{
    ChangeEvent, ChangeEventType, EventBus, EventSubscription, RateLimitDefinition, RefreshMode,
    RegistrySource, RouteDefinition, error::Result,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::watch;

/// Runtime knobs for the coordinator, taken from configuration.
#[derive(Debug, Clone)]
pub struct CoordinatorSettings {
    /// Full-reload interval while in polling fallback.
    pub poll_interval: Duration,
    /// A disabled bus skips subscription entirely and stays in polling mode.
    pub bus_enabled: bool,
    /// Abort startup when the bus is unreachable instead of degrading.
    pub fail_fast: bool,
}

/// Entry counts from a full reload, per domain.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RefreshSummary {
    pub routes: usize,
    pub rate_limits: usize,
    pub access_configs: usize,
    pub keys: usize,
}

impl RefreshSummary {
    /// Total reloaded entries across all domains.
    #[must_use]
    pub fn total(&self) -> usize {
        self.routes + self.rate_limits + self.access_configs + self.keys
    }
}

/// Where the run loop goes after a phase ends.
enum Phase {
    EventDriven(Box<dyn EventSubscription>),
    Polling,
    Shutdown,
}

/// Coordinates refreshes of every cached configuration domain.
///
/// In `EVENT_DRIVEN` mode a bus subscription triggers targeted reloads; when
/// the bus is unreachable the coordinator degrades to `POLLING_FALLBACK`,
/// reloading everything on a timer until the bus recovers. A reload that
/// exhausts its retries keeps the previous snapshot — a half-applied view is
/// never published.
pub struct RefreshCoordinator {
    registry: Arc<dyn RegistrySource>,
    bus: Arc<dyn EventBus>,
    engine: Arc<AccessControlEngine>,
    keys: Arc<PublicKeyRegistry>,
    routes: ConfigCache<String, RouteDefinition>,
    rate_limits: ConfigCache<String, RateLimitDefinition>,
    retry: RetryPolicy,
    settings: CoordinatorSettings,
    mode: ArcSwap<RefreshMode>,
    bus_connected: AtomicBool,
    refresh_failures: AtomicU64,
}

impl RefreshCoordinator {
    /// Wires a coordinator from explicitly constructed collaborators.
    #[must_use]
    pub fn new(
        registry: Arc<dyn RegistrySource>,
        bus: Arc<dyn EventBus>,
        engine: Arc<AccessControlEngine>,
        keys: Arc<PublicKeyRegistry>,
        retry: RetryPolicy,
        settings: CoordinatorSettings,
    ) -> Self {
        Self {
            registry,
            bus,
            engine,
            keys,
            routes: ConfigCache::new(),
            rate_limits: ConfigCache::new(),
            retry,
            settings,
            mode: ArcSwap::from_pointee(RefreshMode::EventDriven),
            bus_connected: AtomicBool::new(false),
            refresh_failures: AtomicU64::new(0),
        }
    }

    /// Current refresh mode.
    #[must_use]
    pub fn mode(&self) -> RefreshMode {
        **self.mode.load()
    }

    /// Point-in-time health report for the health surface.
    #[must_use]
    pub fn health(&self) -> HealthReport {
        HealthReport::evaluate(
            self.mode(),
            self.bus_connected.load(Ordering::Relaxed),
            self.bus.channel(),
        )
    }

    /// The cached route definitions, for the route-construction layer.
    #[must_use]
    pub fn routes(&self) -> &ConfigCache<String, RouteDefinition> {
        &self.routes
    }

    /// The cached rate-limit definitions, for the enforcement layer.
    #[must_use]
    pub fn rate_limits(&self) -> &ConfigCache<String, RateLimitDefinition> {
        &self.rate_limits
    }

    /// Reload failures recorded since startup (retry exhaustions).
    #[must_use]
    pub fn refresh_failures(&self) -> u64 {
        self.refresh_failures.load(Ordering::Relaxed)
    }

    /// Manual/administrative full reload of every domain.
    ///
    /// Synchronous entry point: returns the per-domain reloaded entry
    /// counts. A domain that fails after retries contributes zero and keeps
    /// its previous snapshot.
    pub async fn refresh_now(&self) -> RefreshSummary {
        let started = Instant::now();
        let mut summary = RefreshSummary::default();
        if let Ok(n) = self.reload_routes().await {
            summary.routes = n;
        }
        if let Ok(n) = self.reload_rate_limits().await {
            summary.rate_limits = n;
        }
        if let Ok(n) = self.reload_access_configs().await {
            summary.access_configs = n;
        }
        summary.keys = self.keys.refresh_all().await;

        metrics::histogram!("gatesync_refresh_full_reload_seconds")
            .record(started.elapsed().as_secs_f64());
        tracing::info!(
            routes = summary.routes,
            rate_limits = summary.rate_limits,
            access_configs = summary.access_configs,
            keys = summary.keys,
            "full reload complete"
        );
        summary
    }

    /// Runs the coordinator until `shutdown` flips to `true`.
    ///
    /// # Errors
    ///
    /// Returns the subscription error when the bus is unreachable at startup
    /// and `fail_fast` is set; every later failure degrades instead.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        let mut subscription: Option<Box<dyn EventSubscription>> = if self.settings.bus_enabled {
            match self.bus.subscribe().await {
                Ok(sub) => {
                    self.bus_connected.store(true, Ordering::Relaxed);
                    self.set_mode(RefreshMode::EventDriven);
                    Some(sub)
                }
                Err(e) if self.settings.fail_fast => {
                    tracing::error!(error = %e, "message bus unreachable at startup (fail-fast)");
                    return Err(e);
                }
                Err(e) => {
                    tracing::warn!(error = %e, "message bus unreachable at startup, entering polling fallback");
                    self.enter_polling();
                    None
                }
            }
        } else {
            tracing::info!("message bus disabled, running in polling mode");
            self.enter_polling();
            None
        };

        // Initial population happens in either mode.
        self.refresh_now().await;

        loop {
            let phase = match subscription.take() {
                Some(sub) => self.run_event_driven(sub, &mut shutdown).await,
                None => self.run_polling(&mut shutdown).await,
            };
            match phase {
                Phase::EventDriven(sub) => subscription = Some(sub),
                Phase::Polling => subscription = None,
                Phase::Shutdown => break,
            }
        }
        tracing::info!("refresh coordinator stopped");
        Ok(())
    }

    /// Consumes notifications until the stream ends or shutdown is signaled.
    async fn run_event_driven(
        &self,
        mut subscription: Box<dyn EventSubscription>,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Phase {
        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        return Phase::Shutdown;
                    }
                }
                event = subscription.next_event() => match event {
                    Ok(Some(event)) => self.handle_event(&event).await,
                    Ok(None) => {
                        tracing::warn!("notification stream closed, entering polling fallback");
                        self.enter_polling();
                        return Phase::Polling;
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "notification stream failed, entering polling fallback");
                        self.enter_polling();
                        return Phase::Polling;
                    }
                }
            }
        }
    }

    /// Reloads everything on the poll interval and probes the bus for
    /// recovery on each tick.
    async fn run_polling(&self, shutdown: &mut watch::Receiver<bool>) -> Phase {
        let mut poll = tokio::time::interval(self.settings.poll_interval);
        // The immediate first tick is consumed: the caller already reloaded.
        poll.tick().await;
        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        return Phase::Shutdown;
                    }
                }
                _ = poll.tick() => {
                    if self.settings.bus_enabled {
                        match self.bus.subscribe().await {
                            Ok(sub) => {
                                self.bus_connected.store(true, Ordering::Relaxed);
                                self.set_mode(RefreshMode::EventDriven);
                                tracing::info!("message bus reachable again, resuming event-driven refresh");
                                // One immediate full reload so nothing that
                                // changed while disconnected is missed.
                                self.refresh_now().await;
                                return Phase::EventDriven(sub);
                            }
                            Err(e) => {
                                tracing::debug!(error = %e, "message bus still unreachable");
                            }
                        }
                    }
                    self.refresh_now().await;
                }
            }
        }
    }

    /// Applies one notification: targeted reload for known domains, full
    /// reload for bulk or unrecognized event types.
    async fn handle_event(&self, event: &ChangeEvent) {
        tracing::info!(
            event_id = %event.event_id,
            event_type = ?event.event_type,
            operation = ?event.operation,
            clients = event.client_ids.len(),
            "change notification received"
        );
        metrics::counter!("gatesync_refresh_events_total").increment(1);

        match event.event_type {
            ChangeEventType::RouteConfig => {
                let _ = self.reload_routes().await;
            }
            ChangeEventType::RateLimitConfig => {
                let _ = self.reload_rate_limits().await;
            }
            ChangeEventType::AccessConfig => {
                let _ = self.reload_access_configs().await;
            }
            ChangeEventType::KeyConfig => {
                self.keys.refresh_all().await;
            }
            ChangeEventType::Full | ChangeEventType::Unknown => {
                self.refresh_now().await;
            }
        }
    }

    async fn reload_routes(&self) -> Result<usize> {
        let registry = Arc::clone(&self.registry);
        let result = self
            .retry
            .run("routes", || {
                let registry = Arc::clone(&registry);
                async move { registry.fetch_routes().await }
            })
            .await;
        match result {
            Ok(routes) => {
                let count = routes.len();
                self.routes
                    .replace(routes.into_iter().map(|r| (r.id.clone(), r)).collect());
                metrics::counter!("gatesync_refresh_reloads_total", "domain" => "routes")
                    .increment(1);
                Ok(count)
            }
            Err(e) => {
                self.note_failure("routes", &e);
                Err(e)
            }
        }
    }

    async fn reload_rate_limits(&self) -> Result<usize> {
        let registry = Arc::clone(&self.registry);
        let result = self
            .retry
            .run("rate-limits", || {
                let registry = Arc::clone(&registry);
                async move { registry.fetch_rate_limits().await }
            })
            .await;
        match result {
            Ok(limits) => {
                let count = limits.len();
                self.rate_limits
                    .replace(limits.into_iter().map(|l| (l.id.clone(), l)).collect());
                metrics::counter!("gatesync_refresh_reloads_total", "domain" => "rate_limits")
                    .increment(1);
                Ok(count)
            }
            Err(e) => {
                self.note_failure("rate_limits", &e);
                Err(e)
            }
        }
    }

    async fn reload_access_configs(&self) -> Result<usize> {
        let registry = Arc::clone(&self.registry);
        let result = self
            .retry
            .run("access-configs", || {
                let registry = Arc::clone(&registry);
                async move { registry.fetch_access_configs().await }
            })
            .await;
        match result {
            Ok(configs) => {
                let count = self.engine.load_registry(configs);
                metrics::counter!("gatesync_refresh_reloads_total", "domain" => "access_configs")
                    .increment(1);
                Ok(count)
            }
            Err(e) => {
                self.note_failure("access_configs", &e);
                Err(e)
            }
        }
    }

    /// Records a retry-exhausted reload. The previous snapshot stays
    /// published.
    fn note_failure(&self, domain: &'static str, error: &gatesync_types::SyncError) {
        self.refresh_failures.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("gatesync_refresh_failures_total", "domain" => domain).increment(1);
        tracing::error!(domain, error = %error, "reload failed, keeping previous snapshot");
    }

    fn enter_polling(&self) {
        self.bus_connected.store(false, Ordering::Relaxed);
        self.set_mode(RefreshMode::PollingFallback);
    }

    fn set_mode(&self, mode: RefreshMode) {
        let previous = **self.mode.load();
        if previous != mode {
            tracing::info!(from = %previous, to = %mode, "refresh mode changed");
        }
        self.mode.store(Arc::new(mode));
        metrics::gauge!("gatesync_refresh_event_driven")
            .set(if mode == RefreshMode::EventDriven { 1.0 } else { 0.0 });
    }
}
