use crate::error::{FleetError, Result};
use crate::paths;
use crate::types::MediaKind;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

// ---------------------------------------------------------------------------
// SignalConfig
// ---------------------------------------------------------------------------

/// Timing and shape of one signal sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalConfig {
    /// An `active` lock older than this is treated as abandoned.
    #[serde(default = "default_stale_threshold")]
    pub stale_threshold_secs: u64,
    /// Countdown notices, as offsets from the primary send.
    #[serde(default = "default_checkpoints")]
    pub checkpoint_offsets_secs: Vec<u64>,
    /// Offset of the terminal step that releases the lock.
    #[serde(default = "default_completion_offset")]
    pub completion_offset_secs: u64,
    #[serde(default = "default_retrigger_min")]
    pub retrigger_min_secs: u64,
    #[serde(default = "default_retrigger_max")]
    pub retrigger_max_secs: u64,
    /// Send an auxiliary asset on every Nth trigger (1st, N+1th, ...).
    #[serde(default = "default_aux_every")]
    pub aux_every: u64,
    /// Send a promotional material after every Nth completed round.
    #[serde(default = "default_promo_every")]
    pub promo_every: u64,
    #[serde(default = "default_mines_min")]
    pub mines_min: u32,
    #[serde(default = "default_mines_max")]
    pub mines_max: u32,
    #[serde(default = "default_attempts_min")]
    pub attempts_min: u32,
    #[serde(default = "default_attempts_max")]
    pub attempts_max: u32,
    #[serde(default = "default_grid_width")]
    pub grid_width: u32,
    #[serde(default = "default_grid_height")]
    pub grid_height: u32,
}

fn default_stale_threshold() -> u64 {
    300
}

fn default_checkpoints() -> Vec<u64> {
    vec![3, 120, 240]
}

fn default_completion_offset() -> u64 {
    300
}

fn default_retrigger_min() -> u64 {
    6
}

fn default_retrigger_max() -> u64 {
    15
}

fn default_aux_every() -> u64 {
    3
}

fn default_promo_every() -> u64 {
    2
}

fn default_mines_min() -> u32 {
    3
}

fn default_mines_max() -> u32 {
    6
}

fn default_attempts_min() -> u32 {
    4
}

fn default_attempts_max() -> u32 {
    8
}

fn default_grid_width() -> u32 {
    6
}

fn default_grid_height() -> u32 {
    5
}

impl Default for SignalConfig {
    fn default() -> Self {
        Self {
            stale_threshold_secs: default_stale_threshold(),
            checkpoint_offsets_secs: default_checkpoints(),
            completion_offset_secs: default_completion_offset(),
            retrigger_min_secs: default_retrigger_min(),
            retrigger_max_secs: default_retrigger_max(),
            aux_every: default_aux_every(),
            promo_every: default_promo_every(),
            mines_min: default_mines_min(),
            mines_max: default_mines_max(),
            attempts_min: default_attempts_min(),
            attempts_max: default_attempts_max(),
            grid_width: default_grid_width(),
            grid_height: default_grid_height(),
        }
    }
}

impl SignalConfig {
    pub fn stale_threshold(&self) -> Duration {
        Duration::from_secs(self.stale_threshold_secs)
    }

    pub fn completion_offset(&self) -> Duration {
        Duration::from_secs(self.completion_offset_secs)
    }

    /// Minutes a signal stays valid, rounded up.
    pub fn validity_minutes(&self) -> u64 {
        self.completion_offset_secs.div_ceil(60)
    }
}

// ---------------------------------------------------------------------------
// SchedulerConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_tick")]
    pub tick_secs: u64,
    #[serde(default = "default_first_tick")]
    pub first_tick_secs: u64,
    #[serde(default = "default_daily_triggers")]
    pub expected_daily_triggers: f64,
    #[serde(default = "default_cooldown")]
    pub cooldown_secs: u64,
}

fn default_tick() -> u64 {
    60
}

fn default_first_tick() -> u64 {
    10
}

fn default_daily_triggers() -> f64 {
    10.0
}

fn default_cooldown() -> u64 {
    600
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_secs: default_tick(),
            first_tick_secs: default_first_tick(),
            expected_daily_triggers: default_daily_triggers(),
            cooldown_secs: default_cooldown(),
        }
    }
}

// ---------------------------------------------------------------------------
// ManagerConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManagerConfig {
    #[serde(default = "default_reconcile")]
    pub reconcile_secs: u64,
    #[serde(default = "default_permission_recheck")]
    pub permission_recheck_secs: u64,
    #[serde(default = "default_priming_min")]
    pub priming_min_ms: u64,
    #[serde(default = "default_priming_max")]
    pub priming_max_ms: u64,
    #[serde(default = "default_recovery_delay")]
    pub recovery_trigger_delay_secs: u64,
    /// Fire one sequence shortly after a tenant starts.
    #[serde(default = "default_prime_on_start")]
    pub prime_on_start: bool,
}

fn default_reconcile() -> u64 {
    15
}

fn default_permission_recheck() -> u64 {
    300
}

fn default_priming_min() -> u64 {
    1_000
}

fn default_priming_max() -> u64 {
    2_000
}

fn default_recovery_delay() -> u64 {
    2
}

fn default_prime_on_start() -> bool {
    true
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            reconcile_secs: default_reconcile(),
            permission_recheck_secs: default_permission_recheck(),
            priming_min_ms: default_priming_min(),
            priming_max_ms: default_priming_max(),
            recovery_trigger_delay_secs: default_recovery_delay(),
            prime_on_start: default_prime_on_start(),
        }
    }
}

// ---------------------------------------------------------------------------
// RetryConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_backoff")]
    pub base_backoff_ms: u64,
    #[serde(default = "default_max_backoff")]
    pub max_backoff_ms: u64,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_backoff() -> u64 {
    500
}

fn default_max_backoff() -> u64 {
    30_000
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_backoff_ms: default_base_backoff(),
            max_backoff_ms: default_max_backoff(),
        }
    }
}

// ---------------------------------------------------------------------------
// ContentConfig
// ---------------------------------------------------------------------------

/// Message templates. Placeholders: `{mines}`, `{attempts}`,
/// `{valid_minutes}`, `{link}`, `{grid}`, `{remaining_minutes}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentConfig {
    #[serde(default = "default_signal_template")]
    pub signal_template: String,
    #[serde(default = "default_countdown_template")]
    pub countdown_template: String,
    #[serde(default = "default_completion_text")]
    pub completion_text: String,
    #[serde(default = "default_marked_cell")]
    pub marked_cell: String,
    #[serde(default = "default_unmarked_cell")]
    pub unmarked_cell: String,
}

fn default_signal_template() -> String {
    "Signal\nMines: {mines}\nAttempts: {attempts}\nValid for: {valid_minutes} minutes\n\n{link}\n\n{grid}"
        .to_string()
}

fn default_countdown_template() -> String {
    "{remaining_minutes} min left".to_string()
}

fn default_completion_text() -> String {
    "Round complete".to_string()
}

fn default_marked_cell() -> String {
    "⭐".to_string()
}

fn default_unmarked_cell() -> String {
    "🟦".to_string()
}

impl Default for ContentConfig {
    fn default() -> Self {
        Self {
            signal_template: default_signal_template(),
            countdown_template: default_countdown_template(),
            completion_text: default_completion_text(),
            marked_cell: default_marked_cell(),
            unmarked_cell: default_unmarked_cell(),
        }
    }
}

// ---------------------------------------------------------------------------
// MediaConfig
// ---------------------------------------------------------------------------

/// One media asset: a URL or file reference plus an optional caption.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaAsset {
    pub source: String,
    #[serde(default)]
    pub caption: Option<String>,
    /// Overrides the kind inferred from the source suffix.
    #[serde(default)]
    pub kind: Option<MediaKind>,
}

impl MediaAsset {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            caption: None,
            kind: None,
        }
    }

    pub fn kind(&self) -> MediaKind {
        self.kind
            .unwrap_or_else(|| MediaKind::from_source(&self.source))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MediaConfig {
    /// Rotating assets sent ahead of every `aux_every`-th primary payload.
    #[serde(default)]
    pub auxiliary: Vec<MediaAsset>,
    /// Drawn from a shuffle bag after every `promo_every`-th round.
    #[serde(default)]
    pub promotions: Vec<MediaAsset>,
    /// Optional asset per countdown checkpoint, by index.
    #[serde(default)]
    pub checkpoint_media: Vec<Option<MediaAsset>>,
    /// Optional asset after the completion notice.
    #[serde(default)]
    pub completion_media: Option<MediaAsset>,
}

// ---------------------------------------------------------------------------
// FleetConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FleetConfig {
    #[serde(default)]
    pub signal: SignalConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub manager: ManagerConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub content: ContentConfig,
    #[serde(default)]
    pub media: MediaConfig,
}

impl FleetConfig {
    /// Load `.fleet/config.yaml`, falling back to defaults when absent.
    pub fn load(root: &Path) -> Result<Self> {
        let path = paths::config_path(root);
        if !path.exists() {
            return Ok(Self::default());
        }
        let data = std::fs::read_to_string(&path)?;
        let config: FleetConfig = serde_yaml::from_str(&data)?;
        Ok(config)
    }

    pub fn save(&self, root: &Path) -> Result<()> {
        std::fs::create_dir_all(paths::fleet_dir(root))?;
        let data = serde_yaml::to_string(self)?;
        std::fs::write(paths::config_path(root), data)?;
        Ok(())
    }

    /// Check the timing invariants the engine depends on.
    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();
        let mut error = |message: String| {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message,
            })
        };
        let s = &self.signal;

        if s.stale_threshold_secs < s.completion_offset_secs {
            error(format!(
                "signal.stale_threshold_secs ({}) must be >= completion_offset_secs ({})",
                s.stale_threshold_secs, s.completion_offset_secs
            ));
        }
        if let Some(&last) = s.checkpoint_offsets_secs.iter().max() {
            if last >= s.completion_offset_secs {
                error(format!(
                    "checkpoint offset {last}s is not before completion_offset_secs ({})",
                    s.completion_offset_secs
                ));
            }
        }
        if s.retrigger_min_secs > s.retrigger_max_secs {
            error("signal.retrigger_min_secs exceeds retrigger_max_secs".to_string());
        }
        if s.aux_every == 0 || s.promo_every == 0 {
            error("signal.aux_every and signal.promo_every must be >= 1".to_string());
        }
        if s.mines_min > s.mines_max || s.attempts_min > s.attempts_max {
            error("signal mines/attempts ranges are inverted".to_string());
        }
        if u64::from(s.attempts_max) > u64::from(s.grid_width) * u64::from(s.grid_height) {
            error("signal.attempts_max does not fit in the grid".to_string());
        }
        if self.scheduler.tick_secs == 0 {
            error("scheduler.tick_secs must be >= 1".to_string());
        }
        if self.manager.priming_min_ms > self.manager.priming_max_ms {
            error("manager.priming_min_ms exceeds priming_max_ms".to_string());
        }

        let mut warn = |message: String| {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message,
            })
        };
        if self.scheduler.expected_daily_triggers <= 0.0 {
            warn("scheduler.expected_daily_triggers <= 0: tenants only fire on demand".to_string());
        }
        if !s.checkpoint_offsets_secs.windows(2).all(|w| w[0] < w[1]) {
            warn("signal.checkpoint_offsets_secs is not strictly ascending".to_string());
        }
        if self.media.checkpoint_media.len() > s.checkpoint_offsets_secs.len() {
            warn("media.checkpoint_media has more entries than checkpoints".to_string());
        }
        if self.retry.max_attempts == 0 {
            warn("retry.max_attempts is 0: treated as a single attempt".to_string());
        }
        warnings
    }

    /// Fail when any error-level warning is present.
    pub fn ensure_valid(&self) -> Result<()> {
        let errors: Vec<String> = self
            .validate()
            .into_iter()
            .filter(|w| w.level == WarnLevel::Error)
            .map(|w| w.message)
            .collect();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(FleetError::InvalidConfig(errors.join("; ")))
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn defaults_are_valid() {
        let config = FleetConfig::default();
        assert!(config.validate().is_empty(), "{:?}", config.validate());
        assert_eq!(config.signal.checkpoint_offsets_secs, vec![3, 120, 240]);
        assert_eq!(config.signal.validity_minutes(), 5);
    }

    #[test]
    fn missing_file_loads_defaults() {
        let dir = TempDir::new().unwrap();
        let config = FleetConfig::load(dir.path()).unwrap();
        assert_eq!(config, FleetConfig::default());
    }

    #[test]
    fn partial_yaml_fills_in_defaults() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join(".fleet")).unwrap();
        std::fs::write(
            dir.path().join(".fleet/config.yaml"),
            "signal:\n  completion_offset_secs: 30\n  checkpoint_offsets_secs: [3, 12, 24]\n  stale_threshold_secs: 60\n",
        )
        .unwrap();
        let config = FleetConfig::load(dir.path()).unwrap();
        assert_eq!(config.signal.completion_offset_secs, 30);
        assert_eq!(config.signal.promo_every, 2);
        assert_eq!(config.scheduler.cooldown_secs, 600);
        config.ensure_valid().unwrap();
    }

    #[test]
    fn stale_threshold_below_completion_is_an_error() {
        let mut config = FleetConfig::default();
        config.signal.stale_threshold_secs = 10;
        let warnings = config.validate();
        assert!(warnings
            .iter()
            .any(|w| w.level == WarnLevel::Error && w.message.contains("stale_threshold")));
        assert!(matches!(
            config.ensure_valid(),
            Err(FleetError::InvalidConfig(_))
        ));
    }

    #[test]
    fn checkpoint_after_completion_is_an_error() {
        let mut config = FleetConfig::default();
        config.signal.checkpoint_offsets_secs = vec![3, 400];
        assert!(config.ensure_valid().is_err());
    }

    #[test]
    fn save_then_load_preserves_media() {
        let dir = TempDir::new().unwrap();
        let mut config = FleetConfig::default();
        config.media.promotions = vec![MediaAsset::new("https://cdn/a.mp4")];
        config.save(dir.path()).unwrap();
        let loaded = FleetConfig::load(dir.path()).unwrap();
        assert_eq!(loaded.media.promotions[0].kind(), MediaKind::Video);
    }
}
