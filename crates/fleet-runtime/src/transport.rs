//! Outbound messaging seam and the retry wrapper around it.

use std::sync::Arc;
use std::time::Duration;

use fleet_core::config::RetryConfig;
use fleet_core::types::{MediaKind, TenantConfig};
use futures::future::BoxFuture;
use thiserror::Error;

// ─── Messages ─────────────────────────────────────────────────────────────

/// Where the bytes of a media message come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaSource {
    /// A handle previously returned by the platform for this tenant.
    Handle(String),
    /// A URL or file reference the platform fetches on first upload.
    Url(String),
}

/// One outbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundMessage {
    Text(String),
    Media {
        kind: MediaKind,
        source: MediaSource,
        caption: Option<String>,
    },
}

impl OutboundMessage {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(text.into())
    }
}

/// What the platform returned for a successful send.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Delivery {
    pub message_id: Option<i64>,
    /// Reusable handle for uploaded media, when the platform assigned one.
    pub media_handle: Option<String>,
}

/// Result of asking the platform whether the tenant may post in its channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PostingRights {
    Granted,
    Denied { status: String },
}

// ─── Errors ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("rate limited: retry after {retry_after:?}")]
    RateLimited { retry_after: Duration },

    #[error("request timed out")]
    Timeout,

    #[error("network error: {0}")]
    Network(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("bad request: {0}")]
    BadRequest(String),
}

impl TransportError {
    /// Whether retrying the same request can succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::RateLimited { .. } | Self::Timeout | Self::Network(_)
        )
    }
}

// ─── Traits ───────────────────────────────────────────────────────────────

/// A connected platform client for one tenant.
pub trait Transport: Send + Sync {
    fn send<'a>(
        &'a self,
        target: &'a str,
        message: &'a OutboundMessage,
    ) -> BoxFuture<'a, Result<Delivery, TransportError>>;

    fn check_posting_rights<'a>(
        &'a self,
        target: &'a str,
    ) -> BoxFuture<'a, Result<PostingRights, TransportError>>;

    /// Release the underlying connection. Called once, after every timer of
    /// the tenant has been cancelled.
    fn close(&self) -> BoxFuture<'_, ()> {
        Box::pin(async {})
    }
}

/// Builds a [`Transport`] from a tenant's credentials.
pub trait TransportConnector: Send + Sync {
    fn connect<'a>(
        &'a self,
        tenant: &'a TenantConfig,
    ) -> BoxFuture<'a, Result<Arc<dyn Transport>, TransportError>>;
}

// ─── RetryPolicy ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_backoff: Duration,
    pub max_backoff: Duration,
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(c: &RetryConfig) -> Self {
        Self {
            max_attempts: c.max_attempts.max(1),
            base_backoff: Duration::from_millis(c.base_backoff_ms),
            max_backoff: Duration::from_millis(c.max_backoff_ms),
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl RetryPolicy {
    /// Backoff before attempt `attempt + 1`: doubles from `base_backoff`,
    /// capped at `max_backoff`. A rate-limit hint is honoured in full even
    /// when it exceeds the cap.
    pub fn delay_for(&self, attempt: u32, error: &TransportError) -> Duration {
        let exp = self
            .base_backoff
            .saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)))
            .min(self.max_backoff);
        match error {
            TransportError::RateLimited { retry_after } => exp.max(*retry_after),
            _ => exp,
        }
    }
}

// ─── RetryingTransport ────────────────────────────────────────────────────

/// Wraps a [`Transport`] with bounded retries for transient failures.
#[derive(Clone)]
pub struct RetryingTransport {
    inner: Arc<dyn Transport>,
    policy: RetryPolicy,
}

impl RetryingTransport {
    pub fn new(inner: Arc<dyn Transport>, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    pub fn inner(&self) -> &Arc<dyn Transport> {
        &self.inner
    }

    pub async fn send(
        &self,
        target: &str,
        message: &OutboundMessage,
    ) -> Result<Delivery, TransportError> {
        let mut attempt = 1;
        loop {
            match self.inner.send(target, message).await {
                Ok(delivery) => return Ok(delivery),
                Err(e) if e.is_transient() && attempt < self.policy.max_attempts => {
                    let delay = self.policy.delay_for(attempt, &e);
                    tracing::debug!(channel = %target, attempt, ?delay, error = %e, "transient send failure, retrying");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Permission checks are not retried; the periodic check is the retry.
    pub async fn check_posting_rights(&self, target: &str) -> Result<PostingRights, TransportError> {
        self.inner.check_posting_rights(target).await
    }

    pub async fn close(&self) {
        self.inner.close().await
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use tokio::time::Instant;

    /// Replays a scripted sequence of results, then succeeds.
    struct Scripted {
        script: Mutex<VecDeque<Result<Delivery, TransportError>>>,
        calls: Mutex<Vec<Instant>>,
    }

    impl Scripted {
        fn new(script: Vec<Result<Delivery, TransportError>>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script.into()),
                calls: Mutex::new(Vec::new()),
            })
        }
    }

    impl Transport for Scripted {
        fn send<'a>(
            &'a self,
            _target: &'a str,
            _message: &'a OutboundMessage,
        ) -> BoxFuture<'a, Result<Delivery, TransportError>> {
            Box::pin(async move {
                self.calls.lock().unwrap().push(Instant::now());
                self.script
                    .lock()
                    .unwrap()
                    .pop_front()
                    .unwrap_or_else(|| Ok(Delivery::default()))
            })
        }

        fn check_posting_rights<'a>(
            &'a self,
            _target: &'a str,
        ) -> BoxFuture<'a, Result<PostingRights, TransportError>> {
            Box::pin(async { Ok(PostingRights::Granted) })
        }
    }

    fn policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            base_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(4),
        }
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let p = policy();
        assert_eq!(p.delay_for(1, &TransportError::Timeout), Duration::from_secs(1));
        assert_eq!(p.delay_for(2, &TransportError::Timeout), Duration::from_secs(2));
        assert_eq!(p.delay_for(5, &TransportError::Timeout), Duration::from_secs(4));
    }

    #[test]
    fn rate_limit_waits_at_least_the_server_hint() {
        let p = policy();
        let e = TransportError::RateLimited {
            retry_after: Duration::from_secs(30),
        };
        assert_eq!(p.delay_for(1, &e), Duration::from_secs(30));
    }

    #[tokio::test(start_paused = true)]
    async fn transient_errors_are_retried_until_success() {
        let scripted = Scripted::new(vec![
            Err(TransportError::Network("reset".into())),
            Err(TransportError::RateLimited {
                retry_after: Duration::from_secs(10),
            }),
            Ok(Delivery {
                message_id: Some(9),
                media_handle: None,
            }),
        ]);
        let transport = RetryingTransport::new(scripted.clone(), policy());
        let start = Instant::now();

        let delivery = transport
            .send("@c", &OutboundMessage::text("hi"))
            .await
            .unwrap();

        assert_eq!(delivery.message_id, Some(9));
        let calls = scripted.calls.lock().unwrap().clone();
        assert_eq!(calls.len(), 3);
        assert_eq!(calls[1] - start, Duration::from_secs(1));
        // second backoff would be 2s, but the server asked for 10s
        assert_eq!(calls[2] - calls[1], Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn retries_are_bounded() {
        let scripted = Scripted::new(vec![
            Err(TransportError::Timeout),
            Err(TransportError::Timeout),
            Err(TransportError::Timeout),
            Ok(Delivery::default()),
        ]);
        let transport = RetryingTransport::new(scripted.clone(), policy());
        let err = transport
            .send("@c", &OutboundMessage::text("hi"))
            .await
            .unwrap_err();
        assert_eq!(err, TransportError::Timeout);
        assert_eq!(scripted.calls.lock().unwrap().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn permanent_errors_are_not_retried() {
        let scripted = Scripted::new(vec![Err(TransportError::Forbidden("kicked".into()))]);
        let transport = RetryingTransport::new(scripted.clone(), policy());
        let err = transport
            .send("@c", &OutboundMessage::text("hi"))
            .await
            .unwrap_err();
        assert!(!err.is_transient());
        assert_eq!(scripted.calls.lock().unwrap().len(), 1);
    }
}
