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

//! Constants and configuration values for displaytopo
//!
//! Centralizes platform status codes, flag values, coordinate bounds and
//! timing defaults. Never use magic numbers in other files - add them here first.

use std::time::Duration;

/// Platform status codes returned by the topology query/apply protocol
pub mod status {
    pub const SUCCESS: u32 = 0;
    pub const ACCESS_DENIED: u32 = 5;
    pub const GEN_FAILURE: u32 = 31;
    pub const NOT_SUPPORTED: u32 = 50;
    pub const INVALID_PARAMETER: u32 = 87;
    pub const INSUFFICIENT_BUFFER: u32 = 122;
    pub const BAD_CONFIGURATION: u32 = 1610;
}

/// Status codes returned by the legacy per-device mode-change primitive
pub mod legacy_status {
    pub const SUCCESSFUL: i32 = 0;
    pub const RESTART: i32 = 1;
    pub const FAILED: i32 = -1;
    pub const BAD_MODE: i32 = -2;
    pub const NOT_UPDATED: i32 = -3;
    pub const BAD_FLAGS: i32 = -4;
    pub const BAD_PARAM: i32 = -5;
    pub const BAD_DUAL_VIEW: i32 = -6;
}

/// Desktop coordinate bounds enforced on every position
pub mod bounds {
    /// Smallest legal coordinate
    pub const MIN_COORD: i32 = -32768;

    /// Largest legal coordinate, also the limit for `x + width`
    pub const MAX_COORD: i32 = 32767;
}

/// Display naming conventions
pub mod naming {
    /// Prefix of logical display device names (`\\.\DISPLAY1`, ...)
    pub const DEVICE_PREFIX: &str = r"\\.\DISPLAY";

    /// Marker preceding the hardware UID inside an instance path
    pub const UID_MARKER: &str = "UID";
}

/// Path/mode builder parameters
pub mod paths {
    /// Path arrays larger than this are filtered before apply
    pub const FILTER_THRESHOLD: usize = 10;

    /// Bytes per pixel used when populating a source mode
    pub const DEFAULT_PIXEL_FORMAT_BPP: u32 = 32;

    /// Upper bound on legacy mode enumeration indices
    pub const MAX_ENUMERATED_MODES: u32 = 1024;

    /// Blanking overhead applied when synthesizing target timing totals
    pub const BLANKING_FACTOR_NUM: u32 = 11;
    pub const BLANKING_FACTOR_DEN: u32 = 10;
}

/// Consensus validation parameters
pub mod validation {
    use super::*;

    /// Maximum validation attempts before giving up
    pub const MAX_ATTEMPTS: u32 = 5;

    /// First retry delay; doubled on every subsequent mismatch
    pub const BASE_DELAY: Duration = Duration::from_millis(500);

    /// Ceiling for the exponential backoff
    pub const MAX_DELAY: Duration = Duration::from_millis(4000);
}

/// Enable strategy parameters
pub mod strategy {
    use super::*;

    /// External layout-switch tool invoked by the last-resort strategy
    pub const LAYOUT_TOOL: &str = "DisplaySwitch.exe";

    /// Argument asking the layout tool to extend the desktop
    pub const LAYOUT_TOOL_EXTEND_ARG: &str = "/extend";

    /// Bound on how long the layout tool may run
    pub const LAYOUT_TOOL_TIMEOUT: Duration = Duration::from_secs(10);

    /// Settle delay after the layout tool returns, before validation
    pub const SETTLE_DELAY: Duration = Duration::from_millis(3000);

    /// Poll interval while waiting on the layout tool
    pub const LAYOUT_TOOL_POLL: Duration = Duration::from_millis(100);

    /// Mode used to activate a display when nothing better is known
    pub const FALLBACK_WIDTH: u32 = 1920;
    pub const FALLBACK_HEIGHT: u32 = 1080;
    pub const FALLBACK_REFRESH_HZ: u32 = 60;
}

/// Interactive preview parameters
pub mod preview {
    use super::*;

    /// How long a previewed mode is held before reverting
    pub const HOLD: Duration = Duration::from_secs(15);
}

/// File and data size limits
pub mod limits {
    /// Maximum settings file size in bytes
    pub const MAX_SETTINGS_SIZE: u64 = 256 * 1024;

    /// Number of closest modes listed when a requested mode is unsupported
    pub const MODE_SUGGESTIONS: usize = 5;
}

/// Settings file location
pub mod files {
    /// Directory name under the user config directory
    pub const CONFIG_DIR_NAME: &str = "displaytopo";

    /// Settings file name
    pub const SETTINGS_FILE: &str = "settings.json";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_bounds_are_consistent() {
        assert!(validation::BASE_DELAY < validation::MAX_DELAY);
        // 500ms doubled three times reaches the 4s ceiling
        assert_eq!(validation::BASE_DELAY * 8, validation::MAX_DELAY);
    }

    #[test]
    fn test_coordinate_bounds() {
        assert_eq!(bounds::MIN_COORD, i16::MIN as i32);
        assert_eq!(bounds::MAX_COORD, i16::MAX as i32);
    }
}
