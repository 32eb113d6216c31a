//! Media handle caching and rotation helpers.

use std::collections::HashMap;

use fleet_core::config::MediaAsset;
use fleet_core::types::{MediaKey, MediaKind, TenantConfig};
use rand::seq::SliceRandom;
use rand::Rng;

use crate::transport::{MediaSource, OutboundMessage};

// ---------------------------------------------------------------------------
// MediaCache
// ---------------------------------------------------------------------------

/// Platform handles already obtained by one tenant, one namespace per
/// [`MediaKind`].
#[derive(Debug, Default, Clone)]
pub struct MediaCache {
    by_kind: HashMap<MediaKind, HashMap<String, String>>,
}

impl MediaCache {
    /// Seed from the handles persisted on the tenant record.
    pub fn from_tenant(tenant: &TenantConfig) -> Self {
        let mut cache = Self::default();
        for (raw, handle) in &tenant.cached_media {
            if let Some(key) = MediaKey::parse(raw) {
                cache.insert(&key, handle.clone());
            }
        }
        cache
    }

    pub fn get(&self, key: &MediaKey) -> Option<&str> {
        self.by_kind
            .get(&key.kind)
            .and_then(|m| m.get(&key.asset))
            .map(String::as_str)
    }

    pub fn insert(&mut self, key: &MediaKey, handle: String) {
        self.by_kind
            .entry(key.kind)
            .or_default()
            .insert(key.asset.clone(), handle);
    }

    pub fn len(&self) -> usize {
        self.by_kind.values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Build the outbound message for `asset`, reusing a cached handle when
    /// one exists.
    pub fn message_for(&self, asset: &MediaAsset) -> (MediaKey, OutboundMessage) {
        let key = MediaKey::new(asset.kind(), asset.source.clone());
        let source = match self.get(&key) {
            Some(handle) => MediaSource::Handle(handle.to_string()),
            None => MediaSource::Url(asset.source.clone()),
        };
        let message = OutboundMessage::Media {
            kind: key.kind,
            source,
            // stickers cannot carry a caption
            caption: match key.kind {
                MediaKind::Sticker => None,
                _ => asset.caption.clone(),
            },
        };
        (key, message)
    }
}

// ---------------------------------------------------------------------------
// ShuffleBag
// ---------------------------------------------------------------------------

/// Yields every index in `0..len` once, in random order, before any index
/// repeats.
///
/// [`ShuffleBag::peek`] refills an empty bag; the index is only consumed by
/// [`ShuffleBag::commit`], so an item whose delivery failed is offered again.
#[derive(Debug, Clone, Default)]
pub struct ShuffleBag {
    len: usize,
    remaining: Vec<usize>,
}

impl ShuffleBag {
    pub fn new(len: usize) -> Self {
        Self {
            len,
            remaining: Vec::new(),
        }
    }

    pub fn peek<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Option<usize> {
        if self.len == 0 {
            return None;
        }
        if self.remaining.is_empty() {
            self.remaining = (0..self.len).collect();
            self.remaining.shuffle(rng);
        }
        self.remaining.last().copied()
    }

    pub fn commit(&mut self) {
        self.remaining.pop();
    }

    /// Convenience for callers that consume unconditionally.
    pub fn draw<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Option<usize> {
        let next = self.peek(rng);
        self.commit();
        next
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn bag_exhausts_before_repeating() {
        let mut bag = ShuffleBag::new(5);
        let mut rng = rand::thread_rng();
        let mut seen = Vec::new();
        for _ in 0..10 {
            seen.push(bag.draw(&mut rng).unwrap());
        }
        let mut first: Vec<_> = seen[..5].to_vec();
        let mut second: Vec<_> = seen[5..].to_vec();
        first.sort_unstable();
        second.sort_unstable();
        assert_eq!(first, vec![0, 1, 2, 3, 4]);
        assert_eq!(second, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn peek_without_commit_offers_the_same_item() {
        let mut bag = ShuffleBag::new(3);
        let mut rng = rand::thread_rng();
        let a = bag.peek(&mut rng);
        assert_eq!(bag.peek(&mut rng), a);
        bag.commit();
        assert_ne!(bag.peek(&mut rng), a);
    }

    #[test]
    fn empty_bag_yields_nothing() {
        let mut bag = ShuffleBag::new(0);
        assert_eq!(bag.draw(&mut rand::thread_rng()), None);
    }

    #[test]
    fn cache_namespaces_are_independent_per_kind() {
        let mut cache = MediaCache::default();
        cache.insert(&MediaKey::new(MediaKind::Photo, "x"), "photo-handle".into());
        assert_eq!(cache.get(&MediaKey::new(MediaKind::Photo, "x")), Some("photo-handle"));
        assert_eq!(cache.get(&MediaKey::new(MediaKind::Video, "x")), None);
    }

    #[test]
    fn message_prefers_cached_handle_and_drops_sticker_caption() {
        let mut cache = MediaCache::default();
        let sticker = MediaAsset {
            source: "https://cdn/win.tgs".into(),
            caption: Some("ignored".into()),
            kind: None,
        };
        let (key, msg) = cache.message_for(&sticker);
        assert_eq!(
            msg,
            OutboundMessage::Media {
                kind: MediaKind::Sticker,
                source: MediaSource::Url("https://cdn/win.tgs".into()),
                caption: None,
            }
        );

        cache.insert(&key, "CAAD".into());
        let (_, msg) = cache.message_for(&sticker);
        assert!(matches!(
            msg,
            OutboundMessage::Media { source: MediaSource::Handle(ref h), .. } if h == "CAAD"
        ));
    }

    #[test]
    fn seeded_from_tenant_record() {
        let now = Utc::now();
        let tenant = TenantConfig {
            id: 1,
            token: "1:a".into(),
            display_name: "a".into(),
            role: fleet_core::types::TenantRole::ChannelSignal,
            registration_link: "r".into(),
            target_channel: Some("@c".into()),
            play_url: None,
            is_active: true,
            cached_media: [
                ("video:https://cdn/a.mp4".to_string(), "BAAD".to_string()),
                ("bogus".to_string(), "x".to_string()),
            ]
            .into_iter()
            .collect(),
            created_by: None,
            created_at: now,
            updated_at: now,
        };
        let cache = MediaCache::from_tenant(&tenant);
        assert_eq!(cache.len(), 1);
        assert_eq!(
            cache.get(&MediaKey::new(MediaKind::Video, "https://cdn/a.mp4")),
            Some("BAAD")
        );
    }
}
