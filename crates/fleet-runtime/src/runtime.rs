//! Per-tenant runtime state.

use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use fleet_core::types::{MediaKey, TenantConfig};
use serde::Serialize;
use tokio::time::Instant;

use crate::media::{MediaCache, ShuffleBag};
use crate::timers::TimerSet;
use crate::transport::RetryingTransport;

/// Whether a signal sequence currently holds the tenant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LockState {
    Idle,
    Active,
}

/// Mutable sequence state of one tenant. Only ever touched under
/// [`TenantRuntime::with_state`], never across an `.await`.
#[derive(Debug, Clone)]
pub struct SignalState {
    pub is_active: bool,
    pub last_signal_time: Option<Instant>,
    pub call_count: u64,
    pub rounds_completed: u64,
    pub paused: bool,
    pub promo_bag: ShuffleBag,
}

impl SignalState {
    fn new(promotions: usize) -> Self {
        Self {
            is_active: false,
            last_signal_time: None,
            call_count: 0,
            rounds_completed: 0,
            paused: false,
            promo_bag: ShuffleBag::new(promotions),
        }
    }

    pub fn lock_state(&self) -> LockState {
        if self.is_active {
            LockState::Active
        } else {
            LockState::Idle
        }
    }
}

/// A running tenant: its connected transport, its sequence state, its media
/// handle cache and every timer it owns.
pub struct TenantRuntime {
    token: String,
    target: String,
    config: RwLock<TenantConfig>,
    transport: RetryingTransport,
    state: Mutex<SignalState>,
    media: Mutex<MediaCache>,
    timers: Arc<TimerSet>,
}

impl std::fmt::Debug for TenantRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TenantRuntime")
            .field("tenant", &self.display_name())
            .field("target", &self.target)
            .finish_non_exhaustive()
    }
}

impl TenantRuntime {
    pub fn new(
        config: TenantConfig,
        target: String,
        transport: RetryingTransport,
        promotions: usize,
    ) -> Arc<Self> {
        let media = MediaCache::from_tenant(&config);
        Arc::new(Self {
            token: config.token.clone(),
            target,
            config: RwLock::new(config),
            transport,
            state: Mutex::new(SignalState::new(promotions)),
            media: Mutex::new(media),
            timers: TimerSet::new(),
        })
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    /// Normalized channel every message is sent to.
    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn transport(&self) -> &RetryingTransport {
        &self.transport
    }

    pub fn timers(&self) -> &Arc<TimerSet> {
        &self.timers
    }

    fn config(&self) -> std::sync::RwLockReadGuard<'_, TenantConfig> {
        self.config.read().unwrap_or_else(|e| e.into_inner())
    }

    pub fn config_snapshot(&self) -> TenantConfig {
        self.config().clone()
    }

    pub fn display_name(&self) -> String {
        self.config().display_name.clone()
    }

    pub fn signal_link(&self) -> String {
        self.config().signal_link().to_string()
    }

    /// Apply `edit` to the in-memory tenant record. Picked up by the next
    /// sequence.
    pub fn update_config(&self, edit: impl FnOnce(&mut TenantConfig)) {
        let mut config = self.config.write().unwrap_or_else(|e| e.into_inner());
        edit(&mut config);
    }

    fn state(&self) -> MutexGuard<'_, SignalState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Run `f` inside the state critical section.
    pub fn with_state<T>(&self, f: impl FnOnce(&mut SignalState) -> T) -> T {
        f(&mut self.state())
    }

    pub fn snapshot(&self) -> SignalState {
        self.state().clone()
    }

    pub fn lock_state(&self) -> LockState {
        self.state().lock_state()
    }

    pub fn clear_lock(&self) {
        self.state().is_active = false;
    }

    /// Clear the lock and forget the last signal time so the next trigger
    /// and the next tick both see a tenant past its cooldown.
    pub fn reset_cooldown(&self) {
        let mut state = self.state();
        state.is_active = false;
        state.last_signal_time = None;
    }

    pub fn set_paused(&self, paused: bool) -> bool {
        let mut state = self.state();
        let changed = state.paused != paused;
        state.paused = paused;
        changed
    }

    pub fn is_paused(&self) -> bool {
        self.state().paused
    }

    pub fn cached_media(&self, key: &MediaKey) -> Option<String> {
        self.media
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(key)
            .map(str::to_string)
    }

    pub(crate) fn media(&self) -> MutexGuard<'_, MediaCache> {
        self.media.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Cancel every timer, then release the transport.
    pub async fn shutdown(&self) -> usize {
        let cancelled = self.timers.cancel_all();
        self.transport.close().await;
        cancelled
    }
}
