//! Dry-run transport: logs every outbound message instead of delivering it.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use fleet_core::types::TenantConfig;
use futures::future::BoxFuture;

use crate::transport::{
    Delivery, MediaSource, OutboundMessage, PostingRights, Transport, TransportConnector,
    TransportError,
};

pub struct ConsoleTransport {
    tenant: String,
    next_id: AtomicI64,
}

impl ConsoleTransport {
    pub fn new(tenant: impl Into<String>) -> Self {
        Self {
            tenant: tenant.into(),
            next_id: AtomicI64::new(1),
        }
    }
}

impl Transport for ConsoleTransport {
    fn send<'a>(
        &'a self,
        target: &'a str,
        message: &'a OutboundMessage,
    ) -> BoxFuture<'a, Result<Delivery, TransportError>> {
        Box::pin(async move {
            let message_id = self.next_id.fetch_add(1, Ordering::Relaxed);
            let media_handle = match message {
                OutboundMessage::Text(text) => {
                    tracing::info!(tenant = %self.tenant, channel = %target, message_id, "{text}");
                    None
                }
                OutboundMessage::Media {
                    kind,
                    source,
                    caption,
                } => {
                    tracing::info!(
                        tenant = %self.tenant,
                        channel = %target,
                        message_id,
                        kind = %kind,
                        source = ?source,
                        caption = caption.as_deref().unwrap_or(""),
                        "media"
                    );
                    match source {
                        MediaSource::Url(_) => Some(format!("console-{kind}-{message_id}")),
                        MediaSource::Handle(_) => None,
                    }
                }
            };
            Ok(Delivery {
                message_id: Some(message_id),
                media_handle,
            })
        })
    }

    fn check_posting_rights<'a>(
        &'a self,
        _target: &'a str,
    ) -> BoxFuture<'a, Result<PostingRights, TransportError>> {
        Box::pin(async { Ok(PostingRights::Granted) })
    }
}

/// Connects every tenant to a [`ConsoleTransport`].
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleConnector;

impl TransportConnector for ConsoleConnector {
    fn connect<'a>(
        &'a self,
        tenant: &'a TenantConfig,
    ) -> BoxFuture<'a, Result<Arc<dyn Transport>, TransportError>> {
        Box::pin(async move {
            let transport: Arc<dyn Transport> = Arc::new(ConsoleTransport::new(tenant.display_name.clone()));
            Ok(transport)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleet_core::types::MediaKind;

    #[tokio::test]
    async fn fresh_uploads_get_a_handle() {
        let t = ConsoleTransport::new("demo");
        let first = t
            .send(
                "@c",
                &OutboundMessage::Media {
                    kind: MediaKind::Video,
                    source: MediaSource::Url("https://cdn/a.mp4".into()),
                    caption: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(first.media_handle.as_deref(), Some("console-video-1"));

        let text = t.send("@c", &OutboundMessage::text("hi")).await.unwrap();
        assert_eq!(text.message_id, Some(2));
        assert_eq!(text.media_handle, None);
    }
}
