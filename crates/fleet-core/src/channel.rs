//! Channel identifiers and time-of-day gating.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::error::{FleetError, Result};

/// Normalize an operator-supplied channel reference.
///
/// - `-100…` numeric ids are kept verbatim
/// - `@name` is kept verbatim
/// - `https://t.me/name` and `telegram.me` links become `@name`
/// - anything else is returned trimmed; empty input yields `None`
pub fn normalize_channel(raw: Option<&str>) -> Option<String> {
    let text = raw?.trim();
    if text.is_empty() {
        return None;
    }
    if text.starts_with("-100") && text[1..].chars().all(|c| c.is_ascii_digit()) {
        return Some(text.to_string());
    }
    if text.starts_with('@') {
        return Some(text.to_string());
    }
    for scheme in ["https://", "http://"] {
        if let Some(rest) = text.strip_prefix(scheme) {
            let (host, path) = rest.split_once('/').unwrap_or((rest, ""));
            if host == "t.me" || host == "telegram.me" {
                let name = path.trim_matches('/');
                return (!name.is_empty()).then(|| format!("@{name}"));
            }
        }
    }
    Some(text.to_string())
}

// ---------------------------------------------------------------------------
// ActiveHours
// ---------------------------------------------------------------------------

/// Local hours (0-23) during which a tenant may broadcast. An empty set
/// means the tenant is active all day.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveHours(BTreeSet<u32>);

impl ActiveHours {
    pub fn all_day() -> Self {
        Self::default()
    }

    pub fn new(hours: impl IntoIterator<Item = u32>) -> Result<Self> {
        let mut set = BTreeSet::new();
        for h in hours {
            if h > 23 {
                return Err(FleetError::InvalidHour(h));
            }
            set.insert(h);
        }
        Ok(Self(set))
    }

    pub fn contains(&self, hour: u32) -> bool {
        self.0.is_empty() || self.0.contains(&hour)
    }

    pub fn hours(&self) -> impl Iterator<Item = u32> + '_ {
        self.0.iter().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_keeps_numeric_ids_and_handles() {
        assert_eq!(
            normalize_channel(Some("-1001234567890")).as_deref(),
            Some("-1001234567890")
        );
        assert_eq!(normalize_channel(Some(" @signals ")).as_deref(), Some("@signals"));
    }

    #[test]
    fn normalize_converts_links_to_handles() {
        assert_eq!(
            normalize_channel(Some("https://t.me/signals/")).as_deref(),
            Some("@signals")
        );
        assert_eq!(
            normalize_channel(Some("http://telegram.me/other")).as_deref(),
            Some("@other")
        );
        assert_eq!(normalize_channel(Some("https://t.me/")), None);
    }

    #[test]
    fn normalize_passes_through_other_text() {
        assert_eq!(
            normalize_channel(Some("https://example.com/x")).as_deref(),
            Some("https://example.com/x")
        );
        assert_eq!(normalize_channel(Some("   ")), None);
        assert_eq!(normalize_channel(None), None);
    }

    #[test]
    fn empty_active_hours_means_all_day() {
        let hours = ActiveHours::all_day();
        assert!((0..24).all(|h| hours.contains(h)));
    }

    #[test]
    fn active_hours_gate_and_validation() {
        let hours = ActiveHours::new([9, 10, 22]).unwrap();
        assert!(hours.contains(9));
        assert!(!hours.contains(8));
        assert!(matches!(
            ActiveHours::new([24]),
            Err(FleetError::InvalidHour(24))
        ));
    }
}
