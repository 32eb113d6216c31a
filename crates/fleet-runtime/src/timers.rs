//! Per-tenant registry of delayed tasks.
//!
//! Every piece of deferred work a tenant owns (the scheduler tick, countdown
//! follow-ups, chained re-triggers) is spawned through a [`TimerSet`]. The
//! set hands back a typed [`TimerHandle`] and keeps an abort handle for each
//! live task, so stopping a tenant can cancel all of them at once.
//!
//! Cancellation closes the set under the same lock that guards insertion:
//! once [`TimerSet::cancel_all`] has begun, `schedule_after` returns `None`
//! and no new task can slip in behind it.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::task::AbortHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerId(u64);

#[derive(Default)]
struct Inner {
    next_id: u64,
    live: HashMap<TimerId, AbortHandle>,
    closed: bool,
}

#[derive(Default)]
pub struct TimerSet {
    inner: Mutex<Inner>,
}

/// Handle to one scheduled task.
#[derive(Clone)]
pub struct TimerHandle {
    id: TimerId,
    set: Arc<TimerSet>,
}

impl TimerHandle {
    pub fn id(&self) -> TimerId {
        self.id
    }

    /// Abort the task if it has not completed. Returns whether it was live.
    pub fn cancel(&self) -> bool {
        let handle = self.set.lock().live.remove(&self.id);
        match handle {
            Some(h) => {
                h.abort();
                true
            }
            None => false,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.set.lock().live.contains_key(&self.id)
    }
}

impl TimerSet {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // A poisoned set still holds valid handles; keep going.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Run `task` after `delay`. Returns `None` when the set is closed.
    pub fn schedule_after<F>(self: &Arc<Self>, delay: Duration, task: F) -> Option<TimerHandle>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut inner = self.lock();
        if inner.closed {
            return None;
        }
        let id = TimerId(inner.next_id);
        inner.next_id += 1;

        let set = Arc::downgrade(self);
        let join = tokio::spawn(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            task.await;
            if let Some(set) = set.upgrade() {
                set.lock().live.remove(&id);
            }
        });
        // Inserted while still holding the lock, so the task's own removal
        // above can never run first.
        inner.live.insert(id, join.abort_handle());
        Some(TimerHandle {
            id,
            set: Arc::clone(self),
        })
    }

    /// Run `task` on the next scheduler turn, tracked like any other timer.
    pub fn spawn_now<F>(self: &Arc<Self>, task: F) -> Option<TimerHandle>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.schedule_after(Duration::ZERO, task)
    }

    /// Close the set and abort every live task. Returns how many were
    /// aborted.
    pub fn cancel_all(&self) -> usize {
        let drained: Vec<AbortHandle> = {
            let mut inner = self.lock();
            inner.closed = true;
            inner.live.drain().map(|(_, h)| h).collect()
        };
        for handle in &drained {
            handle.abort();
        }
        drained.len()
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Number of tasks scheduled but not yet finished.
    pub fn pending(&self) -> usize {
        self.lock().live.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counter() -> Arc<AtomicUsize> {
        Arc::new(AtomicUsize::new(0))
    }

    #[tokio::test(start_paused = true)]
    async fn task_runs_after_delay_and_leaves_the_set() {
        let set = TimerSet::new();
        let hits = counter();
        let h = hits.clone();
        let handle = set
            .schedule_after(Duration::from_secs(5), async move {
                h.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();

        tokio::time::sleep(Duration::from_secs(4)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        assert!(handle.is_pending());

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(set.pending(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_all_aborts_and_closes() {
        let set = TimerSet::new();
        let hits = counter();
        for secs in [1, 2, 3] {
            let h = hits.clone();
            set.schedule_after(Duration::from_secs(secs), async move {
                h.fetch_add(1, Ordering::SeqCst);
            });
        }
        assert_eq!(set.pending(), 3);

        assert_eq!(set.cancel_all(), 3);
        assert!(set.is_closed());
        assert!(set
            .schedule_after(Duration::from_secs(1), async {})
            .is_none());

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn single_handle_cancel() {
        let set = TimerSet::new();
        let hits = counter();
        let h = hits.clone();
        let handle = set
            .schedule_after(Duration::from_secs(1), async move {
                h.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
        assert!(handle.cancel());
        assert!(!handle.cancel());
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        assert!(!set.is_closed());
    }
}
