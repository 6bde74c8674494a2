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

//! Display manager
//!
//! Public surface of the engine. Owns a platform backend, the layout tool,
//! the last-known mode store and the settings, and runs every operation
//! behind a panic guard so a misbehaving backend surfaces as an error
//! instead of unwinding into the host.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

use tracing::{debug, error, info};

use crate::data::{DisplayId, DisplayMode, Orientation, Position, Resolution, Topology};
use crate::engine::{
    self, apply_topology, ApplyFailure, ApplyReport, DisableOutcome, Detection, EnableContext, EnableReport,
    EngineContext, ModeStore, StrategyExecutor,
};
use crate::error::{Result, TopologyError};
use crate::platform::{CommandLayoutTool, LayoutTool, PlatformBackend, PlatformServices};
use crate::settings::EngineSettings;

/// Facade over the topology engine for one platform backend
pub struct DisplayManager<B: PlatformBackend> {
    backend: B,
    layout_tool: Box<dyn LayoutTool>,
    modes: ModeStore,
    settings: EngineSettings,
}

impl<B: PlatformBackend> DisplayManager<B> {
    pub fn new(backend: B, layout_tool: Box<dyn LayoutTool>, settings: EngineSettings) -> Self {
        Self {
            backend,
            layout_tool,
            modes: ModeStore::new(),
            settings,
        }
    }

    /// Default settings and the configured external layout tool
    pub fn with_defaults(backend: B) -> Self {
        let settings = EngineSettings::default();
        let tool = CommandLayoutTool::new(settings.strategies.layout_tool.clone());
        Self::new(backend, Box::new(tool), settings)
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Last-known modes captured on disable
    pub fn mode_store(&self) -> &ModeStore {
        &self.modes
    }

    pub fn services(&self) -> PlatformServices<'_> {
        PlatformServices::new(&self.backend, self.layout_tool.as_ref())
    }

    fn engine(&self) -> EngineContext<'_> {
        EngineContext::new(self.services(), &self.settings, &self.modes)
    }

    // ========================================================================
    // Detection
    // ========================================================================

    /// Connected displays plus their hardware identities
    pub fn detect(&self) -> Result<Detection> {
        guarded("detect", || engine::detect(self.services()))
    }

    /// Snapshot the live state, e.g. to re-apply after a failed preset
    pub fn capture_topology(&self, name: &str) -> Result<Topology> {
        guarded("capture_topology", || engine::capture_topology(self.services(), name))
    }

    // ========================================================================
    // Single-Display Operations
    // ========================================================================

    /// Change resolution and orientation, keeping the current position
    pub fn apply_display_mode(&self, display: &DisplayId, resolution: Resolution, orientation: Orientation) -> Result<()> {
        guarded("apply_display_mode", || {
            let services = self.services();
            let position = services
                .legacy
                .current_mode(display)
                .map(|m| m.position)
                .ok_or_else(|| TopologyError::DisplayNotFound(display.to_string()))?;
            engine::apply_display_mode(services, display, &DisplayMode::new(resolution, orientation, position))
        })
    }

    pub fn set_primary_display(&self, display: &DisplayId) -> Result<()> {
        guarded("set_primary_display", || {
            let ctx = self.engine();
            let detection = engine::detect(ctx.services)?;
            engine::set_primary(ctx, &detection.identities, display)
        })
    }

    /// Enable or disable a display
    ///
    /// Disabling always succeeds; use `disable_display` to see how.
    pub fn set_display_enabled(&self, display: &DisplayId, enabled: bool) -> Result<()> {
        if enabled {
            self.enable_display(display).map(|_| ())
        } else {
            self.disable_display(display);
            Ok(())
        }
    }

    /// Run the enable strategies until one is validated
    pub fn enable_display(&self, display: &DisplayId) -> Result<EnableReport> {
        guarded("enable_display", || {
            let ctx = self.engine();
            let detection = engine::detect(ctx.services)?;
            if detection.display(display).is_none() {
                return Err(TopologyError::DisplayNotFound(display.to_string()));
            }
            StrategyExecutor::standard().enable(&EnableContext::new(ctx, &detection.identities, display))
        })
    }

    /// Disable a display; an id the platform does not report is left alone
    pub fn disable_display(&self, display: &DisplayId) -> DisableOutcome {
        guard(
            "disable_display",
            || {
                let ctx = self.engine();
                let identities = match engine::detect(ctx.services) {
                    Ok(detection) if detection.display(display).is_none() => {
                        { let display_id = &display; debug!(display = %display_id, "Display not connected, nothing to disable") };
                        return DisableOutcome::AlreadyDisabled;
                    }
                    Ok(detection) => detection.identities,
                    Err(_) => Default::default(),
                };
                engine::disable_display(ctx, &identities, display)
            },
            |reason| DisableOutcome::AssumedDisabled { reason },
        )
    }

    /// Apply a mode for the configured hold time, then revert
    pub fn test_display_mode(&self, display: &DisplayId, mode: &DisplayMode) -> Result<()> {
        guarded("test_display_mode", || {
            engine::test_display_mode(self.services(), display, mode, self.settings.preview.hold())
        })
    }

    // ========================================================================
    // Multi-Display Operations
    // ========================================================================

    /// Move several displays in one validated apply
    pub fn apply_multiple_display_positions(&self, positions: &[(DisplayId, Position)]) -> Result<()> {
        guarded("apply_multiple_display_positions", || {
            let ctx = self.engine();
            let detection = engine::detect(ctx.services)?;
            if let Some((missing, _)) = positions.iter().find(|(id, _)| detection.display(id).is_none()) {
                return Err(TopologyError::DisplayNotFound(missing.to_string()));
            }
            engine::apply_positions(ctx, &detection.identities, positions)
        })
    }

    /// Apply a full preset
    pub fn apply_preset(&self, topology: &Topology) -> std::result::Result<ApplyReport, ApplyFailure> {
        info!(preset = %topology.name, "Applying preset");
        guard(
            "apply_preset",
            || apply_topology(self.engine(), topology),
            |reason| Err(ApplyFailure::Rejected(TopologyError::Internal(reason))),
        )
    }
}

// ============================================================================
// Panic Guards
// ============================================================================

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Run `f`, turning a panic into `on_panic(message)`
fn guard<T>(operation: &str, f: impl FnOnce() -> T, on_panic: impl FnOnce(String) -> T) -> T {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(value) => value,
        Err(payload) => {
            let message = format!("panic during {}: {}", operation, panic_message(payload.as_ref()));
            error!(operation, "{}", message);
            on_panic(message)
        }
    }
}

fn guarded<T>(operation: &str, f: impl FnOnce() -> Result<T>) -> Result<T> {
    guard(operation, f, |message| Err(TopologyError::Internal(message)))
}
