use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::quality::QualityThresholds;

/// Consecutive acceptable frames needed before a capture is armed
/// (roughly 0.3–0.5 s at a 30–60 fps detector cadence).
pub const DEFAULT_STREAK_THRESHOLD: u32 = 10;
/// Extra delay between arming and the automatic capture.
pub const DEFAULT_DEBOUNCE_MS: u64 = 300;

/// What happens to an armed capture timer when the streak breaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StreakBreakPolicy {
    /// An unacceptable frame cancels the armed timer along with the count.
    #[default]
    CancelPending,
    /// The armed timer fires regardless; only the count is reset.
    KeepPending,
}

#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("streak threshold must be at least 1")]
    ZeroStreakThreshold,
    #[error("{name} must be a finite, non-negative number (got {value})")]
    InvalidThreshold { name: &'static str, value: f32 },
}

/// Tunables for the auto-capture engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub quality: QualityThresholds,
    pub streak_threshold: u32,
    pub debounce_ms: u64,
    pub streak_break: StreakBreakPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            quality: QualityThresholds::default(),
            streak_threshold: DEFAULT_STREAK_THRESHOLD,
            debounce_ms: DEFAULT_DEBOUNCE_MS,
            streak_break: StreakBreakPolicy::default(),
        }
    }
}

impl EngineConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.streak_threshold == 0 {
            return Err(ConfigError::ZeroStreakThreshold);
        }
        let q = &self.quality;
        for (name, value) in [
            ("min_eye_open", q.min_eye_open),
            ("max_angle_deg", q.max_angle_deg),
            ("min_face_extent", q.min_face_extent),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::InvalidThreshold { name, value });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_valid() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.streak_threshold, 10);
        assert_eq!(cfg.debounce(), Duration::from_millis(300));
        assert_eq!(cfg.streak_break, StreakBreakPolicy::CancelPending);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_rejects_zero_threshold() {
        let cfg = EngineConfig {
            streak_threshold: 0,
            ..EngineConfig::default()
        };
        assert_eq!(cfg.validate(), Err(ConfigError::ZeroStreakThreshold));
    }

    #[test]
    fn test_rejects_nan_quality_limit() {
        let mut cfg = EngineConfig::default();
        cfg.quality.max_angle_deg = f32::NAN;
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::InvalidThreshold {
                name: "max_angle_deg",
                ..
            })
        ));
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let cfg: EngineConfig =
            serde_json::from_str(r#"{ "debounce_ms": 150, "streak_break": "keep-pending" }"#)
                .unwrap();
        assert_eq!(cfg.debounce_ms, 150);
        assert_eq!(cfg.streak_threshold, DEFAULT_STREAK_THRESHOLD);
        assert_eq!(cfg.streak_break, StreakBreakPolicy::KeepPending);
        assert_eq!(cfg.quality, QualityThresholds::default());
    }
}
