//! Runtime configuration
//!
//! Defaults match a 48kHz stereo stream with a 500ms conductor clock.
//! Values can be loaded from a JSON file and overridden through
//! `OSTINATO_*` environment variables.

use std::env;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{OstinatoError, Result};

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub conductor: ConductorConfig,
    pub playback: PlaybackConfig,
    pub session: SessionConfig,
}

/// Section conductor clock settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConductorConfig {
    /// Interval between conductor ticks
    pub tick_interval_ms: u64,
    /// A directive push still pending after this long counts as failed
    pub push_timeout_ms: u64,
}

impl Default for ConductorConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 500,
            push_timeout_ms: 5_000,
        }
    }
}

impl ConductorConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn push_timeout(&self) -> Duration {
        Duration::from_millis(self.push_timeout_ms)
    }
}

/// Gapless playback settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    /// Sample rate of incoming PCM (Hz)
    pub sample_rate: u32,
    /// Interleaved channel count of incoming PCM
    pub channels: u16,
    /// Chunks buffered (ingest + preload) before playback starts
    pub min_buffered: usize,
    /// Entries prepared ahead of the playing one
    pub preload_depth: usize,
    /// Time reserved to swap buffers before a chunk's natural end
    pub advance_lead_ms: u64,
    /// Startup latency of the output's start operation
    pub play_latency_ms: u64,
    /// Poll interval while the next entry is still loading
    pub stall_poll_ms: u64,
    /// Delay before a finished entry's resources are released
    pub release_delay_ms: u64,
    /// Cool-down after `clear()` before new chunks are accepted
    pub clear_cooldown_ms: u64,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48_000,
            channels: 2,
            min_buffered: 4,
            preload_depth: 2,
            advance_lead_ms: 120,
            play_latency_ms: 40,
            stall_poll_ms: 10,
            release_delay_ms: 300,
            clear_cooldown_ms: 50,
        }
    }
}

impl PlaybackConfig {
    /// Total lead time subtracted from each entry's duration
    pub fn lead_time(&self) -> Duration {
        Duration::from_millis(self.advance_lead_ms + self.play_latency_ms)
    }

    pub fn stall_poll(&self) -> Duration {
        Duration::from_millis(self.stall_poll_ms)
    }

    pub fn release_delay(&self) -> Duration {
        Duration::from_millis(self.release_delay_ms)
    }

    pub fn clear_cooldown(&self) -> Duration {
        Duration::from_millis(self.clear_cooldown_ms)
    }
}

/// Generation session settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Silence after which a stalled stream is reported
    pub stall_warn_after_ms: u64,
    /// How often the stall watch checks the stream
    pub stall_check_interval_ms: u64,
    /// Directive the backend receives before the conductor takes over
    pub initial_directive: String,
    pub bpm: u32,
    pub temperature: f32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            stall_warn_after_ms: 5_000,
            stall_check_interval_ms: 2_000,
            initial_directive: "very standard pop music".to_string(),
            bpm: 120,
            temperature: 1.5,
        }
    }
}

impl Config {
    /// Load configuration from a JSON file, then apply env overrides
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let mut config: Config = serde_json::from_str(&content)?;
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults with env overrides applied
    pub fn from_env() -> Result<Self> {
        let mut config = Config::default();
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Override fields from `OSTINATO_*` environment variables
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        if let Some(v) = env_number("OSTINATO_TICK_INTERVAL_MS")? {
            self.conductor.tick_interval_ms = v;
        }
        if let Some(v) = env_number("OSTINATO_PUSH_TIMEOUT_MS")? {
            self.conductor.push_timeout_ms = v;
        }
        if let Some(v) = env_number("OSTINATO_SAMPLE_RATE")? {
            self.playback.sample_rate = v;
        }
        if let Some(v) = env_number("OSTINATO_CHANNELS")? {
            self.playback.channels = v;
        }
        if let Some(v) = env_number("OSTINATO_MIN_BUFFERED")? {
            self.playback.min_buffered = v;
        }
        if let Some(v) = env_number("OSTINATO_PRELOAD_DEPTH")? {
            self.playback.preload_depth = v;
        }
        if let Some(v) = env_number("OSTINATO_ADVANCE_LEAD_MS")? {
            self.playback.advance_lead_ms = v;
        }
        if let Some(v) = env_number("OSTINATO_PLAY_LATENCY_MS")? {
            self.playback.play_latency_ms = v;
        }
        if let Some(v) = env_number("OSTINATO_STALL_WARN_AFTER_MS")? {
            self.session.stall_warn_after_ms = v;
        }
        Ok(())
    }

    /// Reject settings the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        let invalid = |reason: &str| {
            Err(OstinatoError::InvalidConfig {
                reason: reason.to_string(),
            })
        };

        if self.conductor.tick_interval_ms == 0 {
            return invalid("tick_interval_ms must be greater than 0");
        }
        if self.conductor.push_timeout_ms == 0 {
            return invalid("push_timeout_ms must be greater than 0");
        }
        if self.playback.sample_rate == 0 {
            return invalid("sample_rate must be greater than 0");
        }
        if self.playback.channels == 0 {
            return invalid("channels must be greater than 0");
        }
        if self.playback.preload_depth == 0 {
            return invalid("preload_depth must be greater than 0");
        }
        if self.playback.min_buffered == 0 {
            return invalid("min_buffered must be greater than 0");
        }
        if self.session.stall_check_interval_ms == 0 {
            return invalid("stall_check_interval_ms must be greater than 0");
        }
        Ok(())
    }
}

fn env_number<T: std::str::FromStr>(key: &str) -> Result<Option<T>> {
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| OstinatoError::InvalidConfig {
                reason: format!("{} is not a valid number: {:?}", key, raw),
            }),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_defaults_validate() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.playback.lead_time(), Duration::from_millis(160));
        assert_eq!(config.conductor.tick_interval(), Duration::from_millis(500));
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: Config =
            serde_json::from_str(r#"{"playback": {"min_buffered": 6}}"#).unwrap();
        assert_eq!(config.playback.min_buffered, 6);
        assert_eq!(config.playback.preload_depth, 2);
        assert_eq!(config.conductor, ConductorConfig::default());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ostinato.json");
        std::fs::write(&path, r#"{"conductor": {"tick_interval_ms": 250}}"#).unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.conductor.tick_interval_ms, 250);
    }

    #[test]
    fn test_validate_rejects_zero_preload() {
        let mut config = Config::default();
        config.playback.preload_depth = 0;
        let err = config.validate().unwrap_err();
        assert_eq!(err.error_code(), "INVALID_CONFIG");
    }

    #[test]
    fn test_validate_rejects_zero_threshold() {
        let mut config = Config::default();
        config.playback.min_buffered = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_push_timeout_default_and_validation() {
        let mut config = Config::default();
        assert_eq!(config.conductor.push_timeout(), Duration::from_millis(5_000));

        config.conductor.push_timeout_ms = 0;
        assert!(config.validate().is_err());
    }
}
