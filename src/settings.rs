/*
 * This file is part of displaytopo.
 *
 * Copyright (C) 2025 displaytopo contributors
 *
 * displaytopo is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * displaytopo is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with displaytopo. If not, see <https://www.gnu.org/licenses/>.
 */

//! Engine Settings
//!
//! Persistent tuning knobs stored as JSON in ~/.config/displaytopo/settings.json.
//! Every field has a default, so a missing or partial file is always usable.

use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::constants::{files, limits, paths, preview, strategy, validation};
use crate::data::Resolution;
use crate::error::{Result, TopologyError};

/// Engine settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct EngineSettings {
    /// Consensus validation retry policy
    #[serde(default)]
    pub validation: ValidationSettings,

    /// Topology apply behavior
    #[serde(default)]
    pub apply: ApplySettings,

    /// Enable strategy parameters
    #[serde(default)]
    pub strategies: StrategySettings,

    /// Interactive mode preview
    #[serde(default)]
    pub preview: PreviewSettings,
}

/// Consensus validation retry policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationSettings {
    /// Attempts before a validation times out
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// First retry delay in milliseconds, doubled per attempt
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Backoff ceiling in milliseconds
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

/// Topology apply behavior
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplySettings {
    /// Path arrays longer than this are filtered to active paths plus the
    /// toggled one before apply
    #[serde(default = "default_filter_threshold")]
    pub filter_threshold: usize,

    /// Issue a validate-only call before every destructive apply
    #[serde(default = "default_true")]
    pub dry_run: bool,
}

/// Enable strategy parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategySettings {
    /// Program invoked by the last-resort strategy
    #[serde(default = "default_layout_tool")]
    pub layout_tool: String,

    #[serde(default = "default_layout_tool_args")]
    pub layout_tool_args: Vec<String>,

    #[serde(default = "default_layout_tool_timeout_ms")]
    pub layout_tool_timeout_ms: u64,

    /// Wait after the layout tool returns, before validating
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,

    /// Mode used when a display has no cached or current mode
    #[serde(default = "default_fallback_mode")]
    pub fallback_mode: Resolution,
}

/// Interactive mode preview
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreviewSettings {
    /// Seconds a previewed mode is held before reverting
    #[serde(default = "default_hold_secs")]
    pub hold_secs: u64,
}

impl Default for ValidationSettings {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

impl Default for ApplySettings {
    fn default() -> Self {
        Self {
            filter_threshold: default_filter_threshold(),
            dry_run: true,
        }
    }
}

impl Default for StrategySettings {
    fn default() -> Self {
        Self {
            layout_tool: default_layout_tool(),
            layout_tool_args: default_layout_tool_args(),
            layout_tool_timeout_ms: default_layout_tool_timeout_ms(),
            settle_delay_ms: default_settle_delay_ms(),
            fallback_mode: default_fallback_mode(),
        }
    }
}

impl Default for PreviewSettings {
    fn default() -> Self {
        Self {
            hold_secs: default_hold_secs(),
        }
    }
}

fn default_max_attempts() -> u32 { validation::MAX_ATTEMPTS }
fn default_base_delay_ms() -> u64 { validation::BASE_DELAY.as_millis() as u64 }
fn default_max_delay_ms() -> u64 { validation::MAX_DELAY.as_millis() as u64 }
fn default_filter_threshold() -> usize { paths::FILTER_THRESHOLD }
fn default_true() -> bool { true }
fn default_layout_tool() -> String { strategy::LAYOUT_TOOL.to_string() }
fn default_layout_tool_args() -> Vec<String> { vec![strategy::LAYOUT_TOOL_EXTEND_ARG.to_string()] }
fn default_layout_tool_timeout_ms() -> u64 { strategy::LAYOUT_TOOL_TIMEOUT.as_millis() as u64 }
fn default_settle_delay_ms() -> u64 { strategy::SETTLE_DELAY.as_millis() as u64 }
fn default_hold_secs() -> u64 { preview::HOLD.as_secs() }

fn default_fallback_mode() -> Resolution {
    Resolution::new(
        strategy::FALLBACK_WIDTH,
        strategy::FALLBACK_HEIGHT,
        strategy::FALLBACK_REFRESH_HZ,
    )
}

impl ValidationSettings {
    /// Delay before retry `attempt` (1-based): `min(base * 2^(attempt-1), cap)`
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(32);
        let delay = self.base_delay_ms.saturating_mul(1u64 << exponent);
        Duration::from_millis(delay.min(self.max_delay_ms))
    }
}

impl StrategySettings {
    pub fn layout_tool_timeout(&self) -> Duration {
        Duration::from_millis(self.layout_tool_timeout_ms)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }
}

impl PreviewSettings {
    pub fn hold(&self) -> Duration {
        Duration::from_secs(self.hold_secs)
    }
}

impl EngineSettings {
    /// Reject settings the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.validation.max_attempts == 0 {
            return Err(TopologyError::config("validation.max_attempts must be at least 1"));
        }
        if self.validation.base_delay_ms > self.validation.max_delay_ms {
            return Err(TopologyError::config(
                "validation.base_delay_ms must not exceed validation.max_delay_ms",
            ));
        }
        if self.strategies.layout_tool.trim().is_empty() {
            return Err(TopologyError::config("strategies.layout_tool must not be empty"));
        }
        let fallback = self.strategies.fallback_mode;
        if fallback.width == 0 || fallback.height == 0 {
            return Err(TopologyError::config("strategies.fallback_mode must have a non-zero size"));
        }
        Ok(())
    }
}

/// Default settings file location
pub fn get_settings_path() -> Result<PathBuf> {
    let config_dir = dirs::config_dir()
        .ok_or_else(|| TopologyError::config("Could not determine config directory"))?;
    Ok(config_dir.join(files::CONFIG_DIR_NAME).join(files::SETTINGS_FILE))
}

/// Load settings from a JSON file; a missing file yields defaults
pub fn load_settings(path: &Path) -> Result<EngineSettings> {
    if !path.exists() {
        return Ok(EngineSettings::default());
    }

    let metadata = fs::metadata(path)
        .map_err(|e| TopologyError::config(format!("cannot read settings metadata: {}", e)))?;
    if metadata.len() > limits::MAX_SETTINGS_SIZE {
        return Err(TopologyError::config(format!(
            "settings file exceeds maximum size of {} bytes",
            limits::MAX_SETTINGS_SIZE
        )));
    }

    let content = fs::read_to_string(path)
        .map_err(|e| TopologyError::config(format!("Failed to read settings file: {}", e)))?;
    let settings: EngineSettings = serde_json::from_str(&content)
        .map_err(|e| TopologyError::config(format!("Failed to parse settings JSON: {}", e)))?;

    settings.validate()?;
    Ok(settings)
}

/// Save settings atomically (write a temp file, then rename)
pub fn save_settings(path: &Path, settings: &EngineSettings) -> Result<()> {
    settings.validate()?;

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| {
            TopologyError::config(format!("Failed to create config directory: {}", e))
        })?;
    }

    let json = serde_json::to_string_pretty(settings)?;
    let temp_path = path.with_extension("json.tmp");

    let mut file = fs::File::create(&temp_path)
        .map_err(|e| TopologyError::config(format!("Failed to create temp file: {}", e)))?;
    file.write_all(json.as_bytes())
        .map_err(|e| TopologyError::config(format!("Failed to write to temp file: {}", e)))?;
    file.sync_all()
        .map_err(|e| TopologyError::config(format!("Failed to sync temp file: {}", e)))?;
    drop(file);

    fs::rename(&temp_path, path)
        .map_err(|e| TopologyError::config(format!("Failed to rename temp file: {}", e)))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_match_constants() {
        let settings = EngineSettings::default();
        assert_eq!(settings.validation.max_attempts, 5);
        assert_eq!(settings.validation.base_delay_ms, 500);
        assert_eq!(settings.validation.max_delay_ms, 4000);
        assert_eq!(settings.apply.filter_threshold, 10);
        assert!(settings.apply.dry_run);
        assert_eq!(settings.strategies.layout_tool_args, vec!["/extend".to_string()]);
        assert_eq!(settings.preview.hold(), Duration::from_secs(15));
    }

    #[test]
    fn test_backoff_doubles_then_caps() {
        let v = ValidationSettings::default();
        assert_eq!(v.backoff(1), Duration::from_millis(500));
        assert_eq!(v.backoff(2), Duration::from_millis(1000));
        assert_eq!(v.backoff(3), Duration::from_millis(2000));
        assert_eq!(v.backoff(4), Duration::from_millis(4000));
        assert_eq!(v.backoff(5), Duration::from_millis(4000));
        assert_eq!(v.backoff(60), Duration::from_millis(4000));
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, r#"{"validation": {"max_attempts": 3}}"#).unwrap();

        let settings = load_settings(&path).unwrap();
        assert_eq!(settings.validation.max_attempts, 3);
        assert_eq!(settings.validation.base_delay_ms, 500);
        assert_eq!(settings.strategies, StrategySettings::default());
    }

    #[test]
    fn test_save_and_reload() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("settings.json");
        let mut settings = EngineSettings::default();
        settings.apply.dry_run = false;
        settings.strategies.settle_delay_ms = 250;

        save_settings(&path, &settings).unwrap();
        assert!(!path.with_extension("json.tmp").exists());
        assert_eq!(load_settings(&path).unwrap(), settings);
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = TempDir::new().unwrap();
        let settings = load_settings(&dir.path().join("absent.json")).unwrap();
        assert_eq!(settings, EngineSettings::default());
    }

    #[test]
    fn test_invalid_settings_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, r#"{"validation": {"max_attempts": 0}}"#).unwrap();
        assert!(matches!(load_settings(&path), Err(TopologyError::Config(_))));

        fs::write(&path, "x".repeat(limits::MAX_SETTINGS_SIZE as usize + 1)).unwrap();
        assert!(load_settings(&path).unwrap_err().to_string().contains("maximum size"));
    }
}
