//! Probabilistic per-tenant trigger schedule.
//!
//! Every tick the scheduler draws once against a per-minute probability.
//! Right after a signal the probability is scaled down linearly, recovering
//! to the base rate once the cooldown window has passed.

use std::sync::Arc;
use std::time::Duration;

use fleet_core::config::{SchedulerConfig, SignalConfig};
use rand::Rng;
use tokio::time::Instant;

use crate::engine::SignalBroadcastEngine;
use crate::runtime::TenantRuntime;
use crate::timers::TimerHandle;

/// What one tick decided.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TickDecision {
    Paused,
    Hold { probability: f64 },
    Fire { probability: f64 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProbabilisticScheduler {
    base_probability: f64,
    cooldown: Duration,
    stale_threshold: Duration,
    tick: Duration,
    first_tick: Duration,
}

impl ProbabilisticScheduler {
    pub fn new(scheduler: &SchedulerConfig, signal: &SignalConfig) -> Self {
        Self {
            base_probability: (scheduler.expected_daily_triggers / 1440.0).clamp(0.0, 1.0),
            cooldown: Duration::from_secs(scheduler.cooldown_secs),
            stale_threshold: signal.stale_threshold(),
            tick: Duration::from_secs(scheduler.tick_secs.max(1)),
            first_tick: Duration::from_secs(scheduler.first_tick_secs),
        }
    }

    pub fn base_probability(&self) -> f64 {
        self.base_probability
    }

    /// Per-tick probability given the time since the last signal. A tenant
    /// that never signalled is past its cooldown.
    pub fn probability(&self, since_last: Option<Duration>) -> f64 {
        match since_last {
            Some(elapsed) if elapsed < self.cooldown => {
                self.base_probability * elapsed.as_secs_f64() / self.cooldown.as_secs_f64()
            }
            _ => self.base_probability,
        }
    }

    /// One tick against `runtime` with the uniform draw `sample` in `[0, 1)`.
    /// Clears a stale lock before deciding.
    pub fn evaluate(&self, runtime: &TenantRuntime, sample: f64) -> TickDecision {
        let now = Instant::now();
        runtime.with_state(|st| {
            if st.paused {
                return TickDecision::Paused;
            }
            let since_last = st.last_signal_time.map(|t| now.saturating_duration_since(t));
            if st.is_active && since_last.map_or(true, |age| age > self.stale_threshold) {
                tracing::warn!(tenant = %runtime.display_name(), "tick found a stale signal lock, clearing");
                st.is_active = false;
            }
            let probability = self.probability(since_last);
            if sample < probability {
                TickDecision::Fire { probability }
            } else {
                TickDecision::Hold { probability }
            }
        })
    }

    /// Start the recurring tick for `runtime`. The tick task and every
    /// trigger it fires live in the tenant's timer set.
    pub fn start(
        &self,
        engine: Arc<SignalBroadcastEngine>,
        runtime: Arc<TenantRuntime>,
    ) -> Option<TimerHandle> {
        let scheduler = self.clone();
        let timers = Arc::clone(runtime.timers());
        timers.spawn_now(async move {
            let start = Instant::now() + scheduler.first_tick;
            let mut ticks = tokio::time::interval_at(start, scheduler.tick);
            ticks.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticks.tick().await;
                let sample: f64 = rand::thread_rng().gen();
                match scheduler.evaluate(&runtime, sample) {
                    TickDecision::Fire { probability } => {
                        tracing::info!(tenant = %runtime.display_name(), probability, "tick fired");
                        runtime
                            .timers()
                            .spawn_now(engine.trigger_task(&runtime, false));
                    }
                    TickDecision::Hold { probability } => {
                        tracing::trace!(tenant = %runtime.display_name(), probability, "tick held");
                    }
                    TickDecision::Paused => {}
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scheduler() -> ProbabilisticScheduler {
        ProbabilisticScheduler::new(&SchedulerConfig::default(), &SignalConfig::default())
    }

    #[test]
    fn base_rate_is_daily_expectation_per_minute() {
        let s = scheduler();
        assert!((s.base_probability() - 10.0 / 1440.0).abs() < 1e-12);
        assert_eq!(s.probability(None), s.base_probability());
    }

    #[test]
    fn cooldown_scales_linearly() {
        let s = scheduler();
        let base = s.base_probability();
        assert_eq!(s.probability(Some(Duration::ZERO)), 0.0);
        assert!((s.probability(Some(Duration::from_secs(300))) - base / 2.0).abs() < 1e-12);
        assert_eq!(s.probability(Some(Duration::from_secs(600))), base);
        assert_eq!(s.probability(Some(Duration::from_secs(7200))), base);
    }
}
