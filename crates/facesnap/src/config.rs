use anyhow::{Context, Result};
use facesnap_core::{EngineConfig, StreakBreakPolicy};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::session::SessionSettings;

/// Runtime configuration: defaults, optionally overlaid by a TOML file,
/// then by `FACESNAP_*` environment variables.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    pub engine: EngineConfig,
    /// Upper bound on a single capture in milliseconds; 0 disables it.
    pub capture_timeout_ms: u64,
    /// End the session after the first successful capture.
    pub close_on_capture: bool,
    /// Directory simulated photos are reported under.
    pub photo_dir: PathBuf,
    /// Simulated camera latency in milliseconds.
    pub capture_latency_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = std::env::var("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
                PathBuf::from(home).join(".local/share")
            })
            .join("facesnap");

        Self {
            engine: EngineConfig::default(),
            capture_timeout_ms: 10_000,
            close_on_capture: true,
            photo_dir: data_dir.join("photos"),
            capture_latency_ms: 150,
        }
    }
}

impl Config {
    /// Load configuration from an optional TOML file and the environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let base = match path {
            Some(path) => Self::from_toml_file(path)?,
            None => Self::default(),
        };
        let config = base.overlay(|key| std::env::var(key).ok());
        config
            .engine
            .validate()
            .context("invalid engine configuration")?;
        Ok(config)
    }

    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        toml::from_str(&text).with_context(|| format!("failed to parse {}", path.display()))
    }

    /// Apply `FACESNAP_*` overrides. Unparseable values are ignored.
    pub fn overlay(mut self, var: impl Fn(&str) -> Option<String>) -> Self {
        let engine = &mut self.engine;
        engine.streak_threshold =
            env_or(&var, "FACESNAP_STREAK_THRESHOLD", engine.streak_threshold);
        engine.debounce_ms = env_or(&var, "FACESNAP_DEBOUNCE_MS", engine.debounce_ms);
        engine.quality.min_eye_open =
            env_or(&var, "FACESNAP_MIN_EYE_OPEN", engine.quality.min_eye_open);
        engine.quality.max_angle_deg =
            env_or(&var, "FACESNAP_MAX_ANGLE_DEG", engine.quality.max_angle_deg);
        engine.quality.min_face_extent =
            env_or(&var, "FACESNAP_MIN_FACE_EXTENT", engine.quality.min_face_extent);
        if let Some(policy) = var("FACESNAP_STREAK_BREAK").and_then(|v| parse_policy(&v)) {
            engine.streak_break = policy;
        }

        self.capture_timeout_ms =
            env_or(&var, "FACESNAP_CAPTURE_TIMEOUT_MS", self.capture_timeout_ms);
        self.capture_latency_ms =
            env_or(&var, "FACESNAP_CAPTURE_LATENCY_MS", self.capture_latency_ms);
        if let Some(v) = var("FACESNAP_CLOSE_ON_CAPTURE") {
            self.close_on_capture = v != "0";
        }
        if let Some(dir) = var("FACESNAP_PHOTO_DIR") {
            self.photo_dir = PathBuf::from(dir);
        }
        self
    }

    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            engine: self.engine.clone(),
            capture_timeout: (self.capture_timeout_ms > 0)
                .then(|| Duration::from_millis(self.capture_timeout_ms)),
            close_on_capture: self.close_on_capture,
        }
    }

    pub fn capture_latency(&self) -> Duration {
        Duration::from_millis(self.capture_latency_ms)
    }
}

fn env_or<T: std::str::FromStr>(
    var: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> T {
    var(key).and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn parse_policy(value: &str) -> Option<StreakBreakPolicy> {
    match value {
        "cancel-pending" => Some(StreakBreakPolicy::CancelPending),
        "keep-pending" => Some(StreakBreakPolicy::KeepPending),
        _ => None,
    }
}
