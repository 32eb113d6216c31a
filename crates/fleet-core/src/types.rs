use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::FleetError;

// ---------------------------------------------------------------------------
// TenantRole
// ---------------------------------------------------------------------------

/// What a tenant does once it is running.
///
/// `Guide` tenants hold private conversations and are stored here only so the
/// registry is the single source of truth; the lifecycle manager runs
/// `ChannelSignal` tenants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TenantRole {
    Guide,
    ChannelSignal,
}

impl TenantRole {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Guide => "guide",
            Self::ChannelSignal => "channel_signal",
        }
    }
}

impl fmt::Display for TenantRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TenantRole {
    type Err = FleetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "guide" | "private" => Ok(Self::Guide),
            "channel_signal" | "channel" => Ok(Self::ChannelSignal),
            other => Err(FleetError::InvalidRole(other.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// MediaKind
// ---------------------------------------------------------------------------

/// Platform media categories. Each kind has its own handle namespace, so a
/// handle obtained for a photo is never reused for a video.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Sticker,
    Animation,
    Video,
    Photo,
}

impl MediaKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sticker => "sticker",
            Self::Animation => "animation",
            Self::Video => "video",
            Self::Photo => "photo",
        }
    }

    /// Infer the kind from a URL or file name suffix, ignoring any query
    /// string. Anything unrecognised is sent as a photo.
    pub fn from_source(source: &str) -> Self {
        let base = source
            .split('?')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        if base.ends_with(".tgs") || base.ends_with(".webp") {
            Self::Sticker
        } else if base.ends_with(".gif") {
            Self::Animation
        } else if [".mp4", ".mov", ".m4v", ".webm"]
            .iter()
            .any(|ext| base.ends_with(ext))
        {
            Self::Video
        } else {
            Self::Photo
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifies one cached media handle: `<kind>:<asset>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MediaKey {
    pub kind: MediaKind,
    pub asset: String,
}

impl MediaKey {
    pub fn new(kind: MediaKind, asset: impl Into<String>) -> Self {
        Self {
            kind,
            asset: asset.into(),
        }
    }

    /// The string form used as the key of `TenantConfig::cached_media`.
    pub fn storage_key(&self) -> String {
        format!("{}:{}", self.kind.as_str(), self.asset)
    }

    pub fn parse(raw: &str) -> Option<Self> {
        let (kind, asset) = raw.split_once(':')?;
        let kind = match kind {
            "sticker" => MediaKind::Sticker,
            "animation" => MediaKind::Animation,
            "video" => MediaKind::Video,
            "photo" => MediaKind::Photo,
            _ => return None,
        };
        Some(Self::new(kind, asset))
    }
}

// ---------------------------------------------------------------------------
// TenantConfig
// ---------------------------------------------------------------------------

/// One registered bot instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TenantConfig {
    pub id: u64,
    /// Platform credential; doubles as the unique tenant identifier.
    pub token: String,
    pub display_name: String,
    pub role: TenantRole,
    pub registration_link: String,
    /// Normalized channel identifier (see [`crate::channel::normalize_channel`]).
    #[serde(default)]
    pub target_channel: Option<String>,
    #[serde(default)]
    pub play_url: Option<String>,
    pub is_active: bool,
    /// `"<kind>:<asset>"` → platform media handle.
    #[serde(default)]
    pub cached_media: BTreeMap<String, String>,
    #[serde(default)]
    pub created_by: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TenantConfig {
    /// The link a signal points at: `play_url`, falling back to the
    /// registration link.
    pub fn signal_link(&self) -> &str {
        self.play_url
            .as_deref()
            .filter(|u| !u.trim().is_empty())
            .unwrap_or(&self.registration_link)
    }

    pub fn media_handle(&self, key: &MediaKey) -> Option<&str> {
        self.cached_media.get(&key.storage_key()).map(String::as_str)
    }
}

/// Input for [`crate::registry::TenantRegistry::create_tenant`].
#[derive(Debug, Clone, PartialEq)]
pub struct NewTenant {
    pub display_name: String,
    pub token: String,
    pub registration_link: String,
    pub channel_link: Option<String>,
    pub play_url: Option<String>,
    pub role: TenantRole,
    pub created_by: Option<i64>,
}

/// Addresses a tenant either by token or by registry serial.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TenantRef {
    Token(String),
    Id(u64),
}

impl TenantRef {
    /// All-digit input is an id; anything else is a token. Platform tokens
    /// always contain a `:`, so the two never collide.
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        match raw.parse::<u64>() {
            Ok(id) => Self::Id(id),
            Err(_) => Self::Token(raw.to_string()),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_parses_aliases() {
        assert_eq!("guide".parse::<TenantRole>().unwrap(), TenantRole::Guide);
        assert_eq!(
            "channel-signal".parse::<TenantRole>().unwrap(),
            TenantRole::ChannelSignal
        );
        assert_eq!(
            "channel".parse::<TenantRole>().unwrap(),
            TenantRole::ChannelSignal
        );
        assert!("admin".parse::<TenantRole>().is_err());
    }

    #[test]
    fn media_kind_from_source_ignores_query_and_case() {
        assert_eq!(MediaKind::from_source("a/win.TGS"), MediaKind::Sticker);
        assert_eq!(MediaKind::from_source("a/b.gif?x=1"), MediaKind::Animation);
        assert_eq!(MediaKind::from_source("a/clip.MP4"), MediaKind::Video);
        assert_eq!(MediaKind::from_source("a/pic.jpg"), MediaKind::Photo);
        assert_eq!(MediaKind::from_source("no-extension"), MediaKind::Photo);
    }

    #[test]
    fn media_key_storage_round_trips_through_parse() {
        let key = MediaKey::new(MediaKind::Video, "https://cdn/x.mp4");
        let parsed = MediaKey::parse(&key.storage_key()).unwrap();
        assert_eq!(parsed, key);
        assert!(MediaKey::parse("gif:thing").is_none());
    }

    #[test]
    fn tenant_ref_distinguishes_ids_from_tokens() {
        assert_eq!(TenantRef::parse(" 42 "), TenantRef::Id(42));
        assert_eq!(
            TenantRef::parse("123:ABC"),
            TenantRef::Token("123:ABC".into())
        );
    }
}
