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


//! displaytopo - multi-monitor display topology engine
//!
//! Detects connected displays, ties logical adapter paths to stable hardware
//! identities, and applies desired layouts through a two-phase path/mode
//! protocol that drivers implement inconsistently.
//!
//! # Features
//!
//! - **Identity**: correlation of logical displays with hardware UIDs, and
//!   rebinding of presets after logical ids are reassigned
//! - **Enable strategies**: nine ordered techniques, each confirmed by
//!   consensus validation before it counts
//! - **Layout**: primary-anchored position normalization within the
//!   desktop coordinate bounds
//! - **Presets**: full topology apply with per-display error collection
//!
//! # Module Structure
//!
//! - `data/` - value types, presets, validation
//! - `platform/` - service traits, descriptors, simulated backend
//! - `identity/` - hardware identity resolution and rebinding
//! - `engine/` - path/mode builder, validator, strategies, orchestrator
//!
//! # Example
//!
//! ```no_run
//! use displaytopo::{DisplayManager, SimMonitor, SimulatedPlatform, Resolution, DisplayId};
//!
//! let platform = SimulatedPlatform::new(vec![
//!     SimMonitor::new(0, 4353, Resolution::new(1920, 1080, 60)),
//!     SimMonitor::new(1, 4354, Resolution::new(2560, 1440, 144)).at(1920, 0).disabled(),
//! ]);
//! let manager = DisplayManager::with_defaults(platform);
//!
//! let report = manager.enable_display(&DisplayId::from_source_id(1)).unwrap();
//! println!("enabled with {:?}", report.strategy);
//! ```

// Grouped modules
pub mod data;
pub mod engine;
pub mod identity;
pub mod platform;

// Standalone modules
pub mod constants;
pub mod logger;
pub mod manager;
pub mod settings;

/// Error types shared with the `dt-error` crate
pub mod error {
    pub use dt_error::*;
}

#[cfg(test)]
mod test_utils;

// Re-export primary types from data/
pub use data::{
    Correlation, DisplayId, DisplayIdentity, DisplayInfo, DisplayMode, DisplayTopologyEntry, Orientation,
    Position, Resolution, Topology, ValidationResult,
};

// Re-export validation functions from data/
pub use data::{span_in_bounds, validate_entries, validate_position};

// Re-export error types
pub use error::{RejectReason, Result, TopologyError};

// Re-export platform types
pub use platform::{
    CommandLayoutTool, DisplayEnumerator, HardwareInventory, LayoutTool, LegacyModeService, PlatformBackend,
    PlatformServices, SimBehavior, SimMonitor, SimulatedPlatform, TopologyService,
};

// Re-export identity functions
pub use identity::{rebind_entries, resolve, IdentityMap};

// Re-export engine types
pub use engine::{
    ApplyFailure, ApplyReport, DisableOutcome, EnableReport, ModeStore, PathTier, StrategyKind,
};

// Re-export the facade and settings
pub use manager::DisplayManager;
pub use settings::{get_settings_path, load_settings, save_settings, EngineSettings};
