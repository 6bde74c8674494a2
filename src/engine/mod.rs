//! Topology engine
//!
//! - `paths` - path/mode query, lookup, population and apply
//! - `validator` - consensus state validation with backoff
//! - `mode_store` - last-known modes captured on disable
//! - `strategy` - enable state machine and disable
//! - `modes` - mode changes, preview, primary assignment, batch positions
//! - `position` - primary-anchored position normalization
//! - `orchestrator` - full topology apply

mod mode_store;
mod modes;
mod orchestrator;
mod paths;
mod position;
mod strategy;
mod validator;

use tracing::info;

use crate::constants::legacy_status;
use crate::data::{DisplayInfo, DisplayTopologyEntry, Topology};
use crate::error::{Result, TopologyError};
use crate::identity::{resolve, IdentityMap};
use crate::platform::{LegacyStatus, PlatformServices};
use crate::settings::EngineSettings;

pub use mode_store::ModeStore;
pub use modes::{apply_display_mode, apply_positions, enumerate_modes, set_primary, test_display_mode};
pub use orchestrator::{apply_topology, ApplyFailure, ApplyReport};
pub use paths::{
    find_path, find_path_strict, populate_modes, query_paths, PathMatch, PathModeBuilder, PathSelection, PathTier,
};
pub use position::{find_overlaps, normalize};
pub use strategy::{
    disable_display, AttemptOutcome, DisableOutcome, EnableContext, EnableReport, EnableState,
    EnableStrategy, StrategyAttempt, StrategyExecutor, StrategyKind,
};
pub use validator::{ConsensusSignals, StateValidator};

// ============================================================================
// Engine Context
// ============================================================================

/// Everything an engine operation needs besides its arguments
#[derive(Clone, Copy)]
pub struct EngineContext<'a> {
    pub services: PlatformServices<'a>,
    pub settings: &'a EngineSettings,
    pub modes: &'a ModeStore,
}

impl<'a> EngineContext<'a> {
    pub fn new(services: PlatformServices<'a>, settings: &'a EngineSettings, modes: &'a ModeStore) -> Self {
        Self {
            services,
            settings,
            modes,
        }
    }

    pub fn builder(&self) -> PathModeBuilder<'a> {
        PathModeBuilder::new(self.services.topology, &self.settings.apply)
    }

    pub fn validator<'b>(&'b self, identities: &'b IdentityMap) -> StateValidator<'b> {
        StateValidator::new(self.services, &self.settings.validation, identities)
    }
}

/// Map a legacy mode-change status to a result
pub(crate) fn check_legacy(code: LegacyStatus) -> Result<()> {
    if code == legacy_status::SUCCESSFUL {
        Ok(())
    } else {
        Err(TopologyError::legacy_rejected(code))
    }
}

// ============================================================================
// Detection
// ============================================================================

/// One detection pass: connected displays plus their physical identities
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub displays: Vec<DisplayInfo>,
    pub identities: IdentityMap,
}

impl Detection {
    pub fn display(&self, id: &crate::data::DisplayId) -> Option<&DisplayInfo> {
        self.displays.iter().find(|d| &d.id == id)
    }
}

/// Enumerate connected displays and resolve their identities
pub fn detect(services: PlatformServices<'_>) -> Result<Detection> {
    let displays = services.displays.list_displays()?;
    let identities = resolve(services.inventory, services.topology);
    info!(
        displays = displays.len(),
        enabled = displays.iter().filter(|d| d.is_enabled).count(),
        identified = identities.len(),
        "Detected displays"
    );
    Ok(Detection { displays, identities })
}

/// Snapshot the live state as a named topology
///
/// Capturing before an apply and re-applying the capture on failure is the
/// only rollback the engine offers.
pub fn capture_topology(services: PlatformServices<'_>, name: &str) -> Result<Topology> {
    let detection = detect(services)?;
    let entries = detection
        .displays
        .iter()
        .map(|d| {
            let mut entry = DisplayTopologyEntry::new(d.id.clone(), d.resolution, d.position)
                .with_orientation(d.orientation);
            entry.is_primary = d.is_primary && d.is_enabled;
            entry.is_enabled = d.is_enabled;
            entry.hardware_uid = detection.identities.get(&d.id).and_then(|i| i.physical_uid);
            entry
        })
        .collect();
    Ok(Topology::new(name, entries))
}
