//! The signal sequence: acquire, send, count down, complete, chain.
//!
//! A sequence belongs to one tenant and runs as
//!
//! ```text
//! trigger ─ acquire lock ─ [auxiliary media] ─ primary payload
//!    │                                            │ (failure: release lock, stop)
//!    │                                            ▼
//!    │                     checkpoints @ 3s, 120s, 240s ─ completion @ 300s
//!    │                                                        │
//!    └──────────── re-trigger after 6–15s ◄── release lock ◄──┘
//!                                               │
//!                                               └─ every Nth round: promotion
//! ```
//!
//! Every deferred step is scheduled on the tenant's [`TimerSet`], so stopping
//! the tenant cancels the rest of the sequence.
//!
//! [`TimerSet`]: crate::timers::TimerSet

use std::sync::Arc;
use std::time::Duration;

use fleet_core::config::{ContentConfig, FleetConfig, MediaAsset, MediaConfig, SignalConfig};
use fleet_core::registry::TenantRegistry;
use fleet_core::types::MediaKey;
use futures::future::BoxFuture;
use rand::seq::SliceRandom;
use rand::Rng;
use serde::Serialize;
use tokio::time::Instant;

use crate::payload::{render_countdown, SignalPayload};
use crate::runtime::TenantRuntime;
use crate::transport::{Delivery, OutboundMessage, TransportError};

/// Outcome of one [`SignalBroadcastEngine::trigger`] call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum TriggerStatus {
    /// The primary payload went out and the follow-ups are scheduled.
    Ok,
    /// Another sequence holds the tenant.
    Skipped,
    /// The primary payload could not be delivered. The lock is released.
    Failed(String),
}

impl TriggerStatus {
    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok)
    }
}

pub struct SignalBroadcastEngine {
    signal: SignalConfig,
    content: ContentConfig,
    media: MediaConfig,
    registry: Option<Arc<TenantRegistry>>,
}

impl SignalBroadcastEngine {
    pub fn new(config: &FleetConfig) -> Self {
        Self {
            signal: config.signal.clone(),
            content: config.content.clone(),
            media: config.media.clone(),
            registry: None,
        }
    }

    /// Persist newly obtained media handles through `registry`.
    pub fn with_registry(mut self, registry: Arc<TenantRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn signal_config(&self) -> &SignalConfig {
        &self.signal
    }

    /// Size of the promotional library, for sizing each tenant's bag.
    pub fn promotions(&self) -> usize {
        self.media.promotions.len()
    }

    // ─── Trigger ──────────────────────────────────────────────────────────

    /// Start one sequence on `runtime`.
    ///
    /// Unless `force` is set, a tenant already inside a sequence is skipped;
    /// a lock older than the stale threshold is cleared first. The lock is
    /// taken before any network I/O.
    pub async fn trigger(self: &Arc<Self>, runtime: &Arc<TenantRuntime>, force: bool) -> TriggerStatus {
        let tenant = runtime.display_name();
        let Some(call_count) = self.acquire(runtime, &tenant, force) else {
            tracing::debug!(tenant = %tenant, "sequence in progress, trigger skipped");
            return TriggerStatus::Skipped;
        };

        if (call_count - 1) % self.signal.aux_every.max(1) == 0 {
            if let Some(asset) = self.pick_auxiliary() {
                if let Err(e) = self.send_asset(runtime, asset).await {
                    tracing::warn!(tenant = %tenant, error = %e, "auxiliary media failed");
                }
            }
        }

        let text = self.build_payload(runtime).render(&self.content);
        match runtime
            .transport()
            .send(runtime.target(), &OutboundMessage::text(text))
            .await
        {
            Ok(delivery) => {
                tracing::info!(
                    tenant = %tenant,
                    channel = %runtime.target(),
                    message_id = ?delivery.message_id,
                    call_count,
                    "signal sent"
                );
            }
            Err(e) => {
                runtime.clear_lock();
                tracing::error!(tenant = %tenant, error = %e, "primary send failed, lock released");
                return TriggerStatus::Failed(e.to_string());
            }
        }

        self.schedule_follow_ups(runtime);
        TriggerStatus::Ok
    }

    /// Boxed [`trigger`](Self::trigger) for deferred scheduling, including
    /// from inside a running sequence.
    pub fn trigger_task(
        self: &Arc<Self>,
        runtime: &Arc<TenantRuntime>,
        force: bool,
    ) -> BoxFuture<'static, ()> {
        let engine = Arc::clone(self);
        let runtime = Arc::clone(runtime);
        Box::pin(async move {
            engine.trigger(&runtime, force).await;
        })
    }

    /// Take the lock in one critical section. Returns the new call count.
    fn acquire(&self, runtime: &TenantRuntime, tenant: &str, force: bool) -> Option<u64> {
        let stale = self.signal.stale_threshold();
        runtime.with_state(|st| {
            let now = Instant::now();
            if st.is_active && !force {
                let age = st
                    .last_signal_time
                    .map(|t| now.saturating_duration_since(t))
                    .unwrap_or(Duration::MAX);
                if age <= stale {
                    return None;
                }
                tracing::warn!(tenant = %tenant, age_secs = age.as_secs(), "clearing stale signal lock");
            }
            st.is_active = true;
            st.last_signal_time = Some(now);
            st.call_count += 1;
            Some(st.call_count)
        })
    }

    fn pick_auxiliary(&self) -> Option<&MediaAsset> {
        self.media.auxiliary.choose(&mut rand::thread_rng())
    }

    fn build_payload(&self, runtime: &TenantRuntime) -> SignalPayload {
        SignalPayload::generate(&mut rand::thread_rng(), &self.signal, &runtime.signal_link())
    }

    fn retrigger_delay(&self) -> Duration {
        let min = self.signal.retrigger_min_secs * 1000;
        let max = self.signal.retrigger_max_secs.max(self.signal.retrigger_min_secs) * 1000;
        Duration::from_millis(rand::thread_rng().gen_range(min..=max))
    }

    // ─── Follow-ups ───────────────────────────────────────────────────────

    fn schedule_follow_ups(self: &Arc<Self>, runtime: &Arc<TenantRuntime>) {
        let timers = runtime.timers();
        for (index, &offset) in self.signal.checkpoint_offsets_secs.iter().enumerate() {
            let engine = Arc::clone(self);
            let rt = Arc::clone(runtime);
            timers.schedule_after(Duration::from_secs(offset), async move {
                engine.send_checkpoint(&rt, index, offset).await;
            });
        }

        let engine = Arc::clone(self);
        let rt = Arc::clone(runtime);
        let completion = timers.schedule_after(self.signal.completion_offset(), async move {
            engine.complete(&rt).await;
        });
        if completion.is_none() {
            // tenant stopped while the payload was in flight
            runtime.clear_lock();
        }
    }

    async fn send_checkpoint(&self, runtime: &TenantRuntime, index: usize, offset: u64) {
        if let Some(Some(asset)) = self.media.checkpoint_media.get(index) {
            if let Err(e) = self.send_asset(runtime, asset).await {
                tracing::warn!(tenant = %runtime.display_name(), error = %e, "checkpoint media failed");
            }
        }
        let text = render_countdown(&self.content, offset, self.signal.completion_offset_secs);
        if let Err(e) = runtime
            .transport()
            .send(runtime.target(), &OutboundMessage::text(text))
            .await
        {
            tracing::warn!(tenant = %runtime.display_name(), offset, error = %e, "countdown notice failed");
        }
    }

    async fn complete(self: &Arc<Self>, runtime: &Arc<TenantRuntime>) {
        let tenant = runtime.display_name();
        let done = OutboundMessage::text(self.content.completion_text.clone());
        if let Err(e) = runtime.transport().send(runtime.target(), &done).await {
            tracing::warn!(tenant = %tenant, error = %e, "completion notice failed");
        }
        if let Some(asset) = &self.media.completion_media {
            if let Err(e) = self.send_asset(runtime, asset).await {
                tracing::warn!(tenant = %tenant, error = %e, "completion media failed");
            }
        }

        let rounds = runtime.with_state(|st| {
            st.is_active = false;
            st.rounds_completed += 1;
            st.rounds_completed
        });

        let delay = self.retrigger_delay();
        let engine = Arc::clone(self);
        let rt = Arc::clone(runtime);
        let next = runtime.timers().schedule_after(delay, async move {
            if rt.is_paused() {
                tracing::debug!(tenant = %rt.display_name(), "paused, chained trigger dropped");
                return;
            }
            engine.trigger_task(&rt, false).await;
        });
        tracing::info!(
            tenant = %tenant,
            rounds,
            next_in = ?delay,
            scheduled = next.is_some(),
            "sequence complete, lock released"
        );

        if rounds % self.signal.promo_every.max(1) == 0 {
            self.send_promotion(runtime).await;
        }
    }

    async fn send_promotion(&self, runtime: &TenantRuntime) {
        let index = runtime.with_state(|st| st.promo_bag.peek(&mut rand::thread_rng()));
        let Some(asset) = index.and_then(|i| self.media.promotions.get(i)) else {
            return;
        };
        match self.send_asset(runtime, asset).await {
            Ok(_) => runtime.with_state(|st| st.promo_bag.commit()),
            Err(e) => {
                tracing::warn!(tenant = %runtime.display_name(), error = %e, "promotion failed, kept in bag")
            }
        }
    }

    // ─── Media ────────────────────────────────────────────────────────────

    /// Send `asset`, preferring this tenant's cached handle for it, and
    /// remember any new handle the platform returns.
    async fn send_asset(
        &self,
        runtime: &TenantRuntime,
        asset: &MediaAsset,
    ) -> Result<Delivery, TransportError> {
        let (key, message) = runtime.media().message_for(asset);
        let delivery = runtime.transport().send(runtime.target(), &message).await?;
        if let Some(handle) = &delivery.media_handle {
            self.remember_media(runtime, &key, handle);
        }
        Ok(delivery)
    }

    fn remember_media(&self, runtime: &TenantRuntime, key: &MediaKey, handle: &str) {
        {
            let mut cache = runtime.media();
            if cache.get(key) == Some(handle) {
                return;
            }
            cache.insert(key, handle.to_string());
        }
        runtime.update_config(|c| {
            c.cached_media.insert(key.storage_key(), handle.to_string());
        });
        if let Some(registry) = &self.registry {
            if let Err(e) = registry.update_media_handle(runtime.token(), key, handle) {
                tracing::warn!(tenant = %runtime.display_name(), error = %e, "could not persist media handle");
            }
        }
    }
}
