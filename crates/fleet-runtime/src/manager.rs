//! Tenant lifecycle: start, stop, reconcile against the registry, and the
//! admin operations on running tenants.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::Timelike;
use fleet_core::channel::{normalize_channel, ActiveHours};
use fleet_core::config::{FleetConfig, ManagerConfig};
use fleet_core::registry::TenantRegistry;
use fleet_core::types::{TenantConfig, TenantRole};
use fleet_core::Result;
use rand::Rng;
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::engine::{SignalBroadcastEngine, TriggerStatus};
use crate::runtime::TenantRuntime;
use crate::scheduler::ProbabilisticScheduler;
use crate::transport::{PostingRights, RetryPolicy, RetryingTransport, TransportConnector, TransportError};

// ---------------------------------------------------------------------------
// Health
// ---------------------------------------------------------------------------

/// Result of the periodic posting-rights check for one tenant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TenantHealth {
    /// Consecutive failed checks. Reset by a successful one.
    pub error_count: u32,
    pub last_error: Option<Instant>,
    pub last_check: Option<Instant>,
}

/// What one reconcile pass changed, by tenant token.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    pub started: Vec<String>,
    pub stopped: Vec<String>,
    pub paused: Vec<String>,
    pub resumed: Vec<String>,
    pub rechecked: Vec<String>,
}

impl ReconcileReport {
    pub fn is_empty(&self) -> bool {
        self.started.is_empty()
            && self.stopped.is_empty()
            && self.paused.is_empty()
            && self.resumed.is_empty()
            && self.rechecked.is_empty()
    }
}

// ---------------------------------------------------------------------------
// TenantLifecycleManager
// ---------------------------------------------------------------------------

/// Owns every running tenant of the process.
pub struct TenantLifecycleManager {
    registry: Arc<TenantRegistry>,
    engine: Arc<SignalBroadcastEngine>,
    scheduler: ProbabilisticScheduler,
    connector: Arc<dyn TransportConnector>,
    settings: ManagerConfig,
    retry: RetryPolicy,
    running: tokio::sync::Mutex<HashMap<String, Arc<TenantRuntime>>>,
    active_hours: Mutex<HashMap<String, ActiveHours>>,
    health: Mutex<HashMap<String, TenantHealth>>,
}

impl TenantLifecycleManager {
    pub fn new(
        config: &FleetConfig,
        registry: Arc<TenantRegistry>,
        connector: Arc<dyn TransportConnector>,
    ) -> Self {
        let engine = SignalBroadcastEngine::new(config).with_registry(Arc::clone(&registry));
        Self {
            registry,
            engine: Arc::new(engine),
            scheduler: ProbabilisticScheduler::new(&config.scheduler, &config.signal),
            connector,
            settings: config.manager.clone(),
            retry: RetryPolicy::from(&config.retry),
            running: tokio::sync::Mutex::new(HashMap::new()),
            active_hours: Mutex::new(HashMap::new()),
            health: Mutex::new(HashMap::new()),
        }
    }

    pub fn engine(&self) -> &Arc<SignalBroadcastEngine> {
        &self.engine
    }

    pub fn registry(&self) -> &Arc<TenantRegistry> {
        &self.registry
    }

    fn health_map(&self) -> MutexGuard<'_, HashMap<String, TenantHealth>> {
        self.health.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn hours_map(&self) -> MutexGuard<'_, HashMap<String, ActiveHours>> {
        self.active_hours.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub async fn runtime(&self, token: &str) -> Option<Arc<TenantRuntime>> {
        self.running.lock().await.get(token).cloned()
    }

    pub async fn running_tokens(&self) -> Vec<String> {
        let mut tokens: Vec<String> = self.running.lock().await.keys().cloned().collect();
        tokens.sort();
        tokens
    }

    pub fn health(&self, token: &str) -> Option<TenantHealth> {
        self.health_map().get(token).copied()
    }

    // ─── Start / stop ─────────────────────────────────────────────────────

    /// Start `tenant`, or return the runtime already running for its token.
    ///
    /// Configuration and connection errors are logged and yield `None`; they
    /// never affect other tenants.
    pub async fn start_tenant(&self, tenant: TenantConfig) -> Option<Arc<TenantRuntime>> {
        let runtime = {
            let mut running = self.running.lock().await;
            if let Some(existing) = running.get(&tenant.token) {
                return Some(Arc::clone(existing));
            }

            if tenant.token.trim().is_empty() {
                tracing::error!(tenant = %tenant.display_name, "tenant has no token, not starting");
                return None;
            }
            let Some(target) = normalize_channel(tenant.target_channel.as_deref()) else {
                tracing::error!(tenant = %tenant.display_name, "tenant has no target channel, not starting");
                return None;
            };

            let transport = match self.connector.connect(&tenant).await {
                Ok(t) => t,
                Err(e) => {
                    tracing::error!(tenant = %tenant.display_name, error = %e, "could not connect tenant");
                    return None;
                }
            };
            let transport = RetryingTransport::new(transport, self.retry.clone());
            let runtime = TenantRuntime::new(tenant, target, transport, self.engine.promotions());

            self.scheduler
                .start(Arc::clone(&self.engine), Arc::clone(&runtime));
            if self.settings.prime_on_start {
                let delay = self.priming_delay();
                runtime
                    .timers()
                    .schedule_after(delay, self.engine.trigger_task(&runtime, false));
            }
            running.insert(runtime.token().to_string(), Arc::clone(&runtime));
            runtime
        };

        self.health_map()
            .entry(runtime.token().to_string())
            .or_default();
        self.check_permissions(&runtime).await;
        tracing::info!(
            tenant = %runtime.display_name(),
            channel = %runtime.target(),
            "tenant started"
        );
        Some(runtime)
    }

    fn priming_delay(&self) -> Duration {
        let min = self.settings.priming_min_ms;
        let max = self.settings.priming_max_ms.max(min);
        Duration::from_millis(rand::thread_rng().gen_range(min..=max))
    }

    /// Stop a running tenant. Every timer it owns is cancelled before the
    /// transport is closed. Returns whether it was running.
    pub async fn stop_tenant(&self, token: &str) -> bool {
        let Some(runtime) = self.running.lock().await.remove(token) else {
            return false;
        };
        let cancelled = runtime.shutdown().await;
        self.health_map().remove(token);
        tracing::info!(tenant = %runtime.display_name(), cancelled, "tenant stopped");
        true
    }

    /// Start every active channel tenant, ignoring active hours. Returns how
    /// many are running afterwards.
    pub async fn start_all(&self) -> Result<usize> {
        for tenant in self
            .registry
            .get_active_tenants(Some(TenantRole::ChannelSignal))?
        {
            self.start_tenant(tenant).await;
        }
        let count = self.running.lock().await.len();
        if count == 0 {
            tracing::warn!("no active channel tenants; waiting for new ones");
        }
        Ok(count)
    }

    pub async fn shutdown_all(&self) {
        let drained: Vec<Arc<TenantRuntime>> = {
            let mut running = self.running.lock().await;
            running.drain().map(|(_, rt)| rt).collect()
        };
        for runtime in drained {
            runtime.shutdown().await;
            self.health_map().remove(runtime.token());
            tracing::info!(tenant = %runtime.display_name(), "tenant stopped");
        }
    }

    // ─── Reconcile ────────────────────────────────────────────────────────

    /// Reconcile against the registry using the local wall-clock hour.
    pub async fn reconcile(&self) -> Result<ReconcileReport> {
        self.reconcile_at(chrono::Local::now().hour()).await
    }

    /// Bring running tenants in line with the registry as of `hour`.
    pub async fn reconcile_at(&self, hour: u32) -> Result<ReconcileReport> {
        let mut report = ReconcileReport::default();
        let tenants = self
            .registry
            .get_active_tenants(Some(TenantRole::ChannelSignal))?;
        let wanted: HashSet<&str> = tenants.iter().map(|t| t.token.as_str()).collect();

        for token in self.running_tokens().await {
            if !wanted.contains(token.as_str()) {
                tracing::info!(token = %token, "tenant removed or deactivated, stopping");
                self.stop_tenant(&token).await;
                report.stopped.push(token);
            }
        }

        for tenant in tenants {
            let token = tenant.token.clone();
            let open = self.is_active_hour(&token, hour);
            let Some(runtime) = self.runtime(&token).await else {
                if open {
                    tracing::info!(tenant = %tenant.display_name, "new tenant found, starting");
                    if self.start_tenant(tenant).await.is_some() {
                        report.started.push(token);
                    }
                }
                continue;
            };

            if open && runtime.is_paused() {
                self.resume_tenant(&token).await;
                report.resumed.push(token.clone());
            } else if !open && !runtime.is_paused() {
                self.pause_tenant(&token).await;
                report.paused.push(token.clone());
            }

            sync_record(&runtime, &tenant);

            if self.needs_permission_check(&token) {
                self.check_permissions(&runtime).await;
                report.rechecked.push(token);
            }
        }

        if !report.is_empty() {
            tracing::debug!(?report, "reconcile pass");
        }
        Ok(report)
    }

    /// Run [`reconcile`](Self::reconcile) every `reconcile_secs` until the
    /// returned task is aborted.
    pub fn spawn_reconcile_loop(self: Arc<Self>) -> JoinHandle<()> {
        let period = Duration::from_secs(self.settings.reconcile_secs.max(1));
        tokio::spawn(async move {
            let mut ticks = tokio::time::interval_at(Instant::now() + period, period);
            ticks.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticks.tick().await;
                if let Err(e) = self.reconcile().await {
                    tracing::error!(error = %e, "reconcile failed");
                }
            }
        })
    }

    fn is_active_hour(&self, token: &str, hour: u32) -> bool {
        self.hours_map()
            .get(token)
            .map_or(true, |hours| hours.contains(hour))
    }

    fn needs_permission_check(&self, token: &str) -> bool {
        let recheck = Duration::from_secs(self.settings.permission_recheck_secs);
        match self.health_map().get(token) {
            Some(h) if h.error_count > 0 => true,
            Some(h) => h.last_check.map_or(true, |at| at.elapsed() > recheck),
            None => true,
        }
    }

    // ─── Permissions ──────────────────────────────────────────────────────

    /// Ask the platform whether `runtime` may post in its channel and update
    /// its health. On recovery from failed checks a forced sequence is
    /// scheduled.
    pub async fn check_permissions(&self, runtime: &Arc<TenantRuntime>) -> bool {
        let tenant = runtime.display_name();
        let result = runtime
            .transport()
            .check_posting_rights(runtime.target())
            .await;
        let now = Instant::now();

        let (granted, recovered) = {
            let mut health = self.health_map();
            let entry = health.entry(runtime.token().to_string()).or_default();
            match &result {
                Ok(PostingRights::Granted) => {
                    let previous = entry.error_count;
                    entry.error_count = 0;
                    entry.last_check = Some(now);
                    (true, previous > 0)
                }
                Ok(PostingRights::Denied { .. })
                | Err(TransportError::Forbidden(_))
                | Err(TransportError::BadRequest(_)) => {
                    entry.error_count += 1;
                    entry.last_error = Some(now);
                    entry.last_check = Some(now);
                    (false, false)
                }
                // transient failures say nothing about the rights themselves
                Err(_) => (false, false),
            }
        };

        match &result {
            Ok(PostingRights::Granted) => {
                tracing::info!(tenant = %tenant, channel = %runtime.target(), "posting rights ok");
            }
            Ok(PostingRights::Denied { status }) => {
                tracing::error!(tenant = %tenant, channel = %runtime.target(), status = %status, "insufficient posting rights");
            }
            Err(e) => {
                tracing::error!(tenant = %tenant, channel = %runtime.target(), error = %e, "posting rights check failed");
            }
        }

        if recovered {
            tracing::info!(tenant = %tenant, "posting rights recovered, forcing a sequence");
            runtime.reset_cooldown();
            let delay = Duration::from_secs(self.settings.recovery_trigger_delay_secs);
            runtime
                .timers()
                .schedule_after(delay, self.engine.trigger_task(runtime, true));
        }
        granted
    }

    // ─── Admin operations ─────────────────────────────────────────────────

    /// Clear the lock and cooldown of a running tenant and fire a forced
    /// sequence now. True only when the primary payload was delivered.
    pub async fn trigger_now(&self, token: &str) -> bool {
        let Some(runtime) = self.runtime(token).await else {
            tracing::warn!(token = %token, "trigger_now: tenant not running");
            return false;
        };
        runtime.reset_cooldown();
        match self.engine.trigger(&runtime, true).await {
            TriggerStatus::Ok => true,
            TriggerStatus::Skipped => false,
            TriggerStatus::Failed(reason) => {
                tracing::error!(tenant = %runtime.display_name(), reason = %reason, "trigger_now failed");
                false
            }
        }
    }

    /// Restrict `token` to the given local hours. An empty set means all
    /// day. Applied by the next reconcile pass.
    pub fn set_active_hours(&self, token: &str, hours: impl IntoIterator<Item = u32>) -> Result<()> {
        let hours = ActiveHours::new(hours)?;
        tracing::info!(token = %token, hours = ?hours.hours().collect::<Vec<_>>(), "active hours set");
        self.hours_map().insert(token.to_string(), hours);
        Ok(())
    }

    pub async fn pause_tenant(&self, token: &str) -> bool {
        let Some(runtime) = self.runtime(token).await else {
            return false;
        };
        runtime.set_paused(true);
        tracing::info!(tenant = %runtime.display_name(), "tenant paused");
        true
    }

    pub async fn resume_tenant(&self, token: &str) -> bool {
        let Some(runtime) = self.runtime(token).await else {
            return false;
        };
        runtime.set_paused(false);
        tracing::info!(tenant = %runtime.display_name(), "tenant resumed");
        true
    }

    /// Edit the in-memory record of a running tenant. The next sequence uses
    /// the new values.
    pub async fn update_config(&self, token: &str, edit: impl FnOnce(&mut TenantConfig)) -> bool {
        let Some(runtime) = self.runtime(token).await else {
            return false;
        };
        runtime.update_config(edit);
        tracing::info!(tenant = %runtime.display_name(), "tenant config updated");
        true
    }
}

/// Carry registry edits (links, display name) into a running tenant.
fn sync_record(runtime: &TenantRuntime, record: &TenantConfig) {
    let current = runtime.config_snapshot();
    if current.play_url != record.play_url
        || current.registration_link != record.registration_link
        || current.display_name != record.display_name
    {
        runtime.update_config(|c| {
            c.play_url = record.play_url.clone();
            c.registration_link = record.registration_link.clone();
            c.display_name = record.display_name.clone();
        });
        tracing::info!(tenant = %record.display_name, "tenant record reloaded");
    }
}
