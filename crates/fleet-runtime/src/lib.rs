//! `fleet-runtime` — the async side of the fleet: per-tenant signal
//! sequences, the probabilistic scheduler that fires them, and the manager
//! that keeps the set of running tenants in line with the registry.
//!
//! # Architecture
//!
//! ```text
//! TenantRegistry (fleet-core, redb)
//!     │  get_active_tenants, every reconcile pass
//!     ▼
//! TenantLifecycleManager   ← start / stop / pause / resume / trigger_now
//!     │                       permission health per tenant
//!     ▼
//! TenantRuntime            ← one per running tenant: RetryingTransport,
//!     │                       SignalState behind a Mutex, TimerSet
//!     ├── ProbabilisticScheduler tick (60s)
//!     └── SignalBroadcastEngine::trigger
//!             primary payload → countdown notices → completion → re-trigger
//! ```
//!
//! All deferred work of a tenant goes through its [`timers::TimerSet`];
//! stopping the tenant closes the set and aborts everything in it.

pub mod console;
pub mod engine;
pub mod manager;
pub mod media;
pub mod payload;
pub mod runtime;
pub mod scheduler;
pub mod timers;
pub mod transport;

pub use console::{ConsoleConnector, ConsoleTransport};
pub use engine::{SignalBroadcastEngine, TriggerStatus};
pub use manager::{ReconcileReport, TenantHealth, TenantLifecycleManager};
pub use runtime::{LockState, SignalState, TenantRuntime};
pub use scheduler::{ProbabilisticScheduler, TickDecision};
pub use timers::{TimerHandle, TimerSet};
pub use transport::{
    Delivery, MediaSource, OutboundMessage, PostingRights, RetryPolicy, RetryingTransport,
    Transport, TransportConnector, TransportError,
};
