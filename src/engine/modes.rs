//! Mode changes, mode preview, primary assignment and batch positioning

use std::thread;
use std::time::Duration;

use tracing::{debug, info, warn};

use super::paths::{find_path_strict, PathSelection};
use super::position::normalize;
use super::{check_legacy, EngineContext};
use crate::constants::{limits, paths as path_const};
use crate::data::{validate_position, DisplayId, DisplayMode, DisplayTopologyEntry, Position, Resolution};
use crate::error::{Result, TopologyError};
use crate::identity::IdentityMap;
use crate::platform::{ApplyFlags, LegacyModeService, ModeChangeFlags, ModeInfo, PlatformServices};

// ============================================================================
// Mode Enumeration
// ============================================================================

/// Every distinct resolution the legacy primitive reports for a display
pub fn enumerate_modes(legacy: &dyn LegacyModeService, display: &DisplayId) -> Vec<Resolution> {
    let mut supported: Vec<Resolution> = Vec::new();
    for index in 0..path_const::MAX_ENUMERATED_MODES {
        let Some(mode) = legacy.enum_settings(display, index) else {
            break;
        };
        if !supported.contains(&mode.resolution) {
            supported.push(mode.resolution);
        }
    }
    supported
}

/// Closest supported modes to a request, best first
fn closest_modes(requested: &Resolution, supported: &[Resolution]) -> Vec<String> {
    let mut ranked: Vec<&Resolution> = supported.iter().collect();
    ranked.sort_by_key(|r| requested.distance_to(r));
    ranked
        .into_iter()
        .take(limits::MODE_SUGGESTIONS)
        .map(|r| r.to_string())
        .collect()
}

// ============================================================================
// Mode Changes
// ============================================================================

/// Change a display's mode through the legacy primitive
///
/// The request is checked against the enumerated modes first; an unsupported
/// mode fails before any platform change with the closest alternatives.
pub fn apply_display_mode(services: PlatformServices<'_>, display: &DisplayId, mode: &DisplayMode) -> Result<()> {
    let supported = enumerate_modes(services.legacy, display);
    if !supported.contains(&mode.resolution) {
        { let display_id = &display; warn!(display = %display_id, requested = %mode.resolution, available = supported.len(), "Requested mode not supported") };
        return Err(TopologyError::ModeUnsupported {
            display: display.to_string(),
            requested: mode.resolution.to_string(),
            closest: closest_modes(&mode.resolution, &supported),
        });
    }

    check_legacy(services.legacy.test_mode(display, mode))?;
    check_legacy(services.legacy.apply_mode(display, mode, ModeChangeFlags::UPDATE_REGISTRY))?;

    { let display_id = &display; info!(
        display = %display_id,
        mode = %mode.resolution,
        orientation = mode.orientation.degrees(),
        position = %mode.position,
        "Applied display mode"
    ) };
    Ok(())
}

/// Apply a mode, hold it, then put the original mode back
///
/// Apply, hold and revert all run even when the apply failed. A failed revert
/// is reported only if the apply itself succeeded.
pub fn test_display_mode(
    services: PlatformServices<'_>,
    display: &DisplayId,
    mode: &DisplayMode,
    hold: Duration,
) -> Result<()> {
    let original = services
        .legacy
        .current_mode(display)
        .ok_or_else(|| TopologyError::DisplayNotFound(display.to_string()))?;

    let applied = apply_display_mode(services, display, mode);
    match &applied {
        Ok(()) => { let display_id = &display; info!(display = %display_id, hold_secs = hold.as_secs(), "Holding previewed mode") },
        Err(e) => { let display_id = &display; warn!(display = %display_id, error = %e, "Preview rejected, holding before revert") },
    }
    thread::sleep(hold);

    let reverted = check_legacy(services.legacy.apply_mode(display, &original, ModeChangeFlags::UPDATE_REGISTRY));
    match (&applied, reverted) {
        (_, Ok(())) => { let display_id = &display; debug!(display = %display_id, mode = %original.resolution, "Reverted previewed mode") },
        (Ok(()), Err(e)) => {
            { let display_id = &display; warn!(display = %display_id, error = %e, "Failed to revert previewed mode") };
            return Err(e);
        }
        (Err(_), Err(e)) => { let display_id = &display; warn!(display = %display_id, error = %e, "Failed to revert after rejected preview") },
    }
    applied
}

// ============================================================================
// Primary Assignment
// ============================================================================

/// Make an enabled display the primary one
///
/// The platform treats the display at the origin as primary, so the layout is
/// re-anchored on the new primary and applied as one batch. When the batch is
/// rejected, the legacy primitive stages the same layout and commits it.
pub fn set_primary(engine: EngineContext<'_>, identities: &IdentityMap, display: &DisplayId) -> Result<()> {
    let displays = engine.services.displays.list_displays()?;
    let target = displays
        .iter()
        .find(|d| &d.id == display)
        .ok_or_else(|| TopologyError::DisplayNotFound(display.to_string()))?;
    if !target.is_enabled {
        return Err(TopologyError::invalid_topology(format!(
            "{} is disabled and cannot be primary",
            display
        )));
    }
    if target.is_primary && target.position.is_origin() {
        { let display_id = &display; debug!(display = %display_id, "Display is already primary") };
        return Ok(());
    }

    let entries: Vec<DisplayTopologyEntry> = displays
        .iter()
        .filter(|d| d.is_enabled)
        .map(|d| {
            let mut entry = DisplayTopologyEntry::new(d.id.clone(), d.resolution, d.position)
                .with_orientation(d.orientation);
            entry.is_primary = &d.id == display;
            entry
        })
        .collect();
    let layout = normalize(&entries);
    let positions: Vec<(DisplayId, Position)> = layout.iter().map(|e| (e.display_id.clone(), e.position)).collect();

    match apply_positions(engine, identities, &positions) {
        Ok(()) => {
            { let display_id = &display; info!(display = %display_id, "Primary display set") };
            Ok(())
        }
        Err(e) => {
            { let display_id = &display; warn!(display = %display_id, error = %e, "Batch reposition failed, staging primary change through legacy primitive") };
            set_primary_legacy(engine.services.legacy, display, &layout)
        }
    }
}

fn set_primary_legacy(legacy: &dyn LegacyModeService, display: &DisplayId, layout: &[DisplayTopologyEntry]) -> Result<()> {
    let staged = ModeChangeFlags::UPDATE_REGISTRY | ModeChangeFlags::NO_RESET;

    // The new primary goes first so the others are placed relative to it
    let mut ordered: Vec<&DisplayTopologyEntry> = layout.iter().collect();
    ordered.sort_by_key(|e| &e.display_id != display);

    for entry in ordered {
        let flags = if &entry.display_id == display {
            staged | ModeChangeFlags::SET_PRIMARY
        } else {
            staged
        };
        check_legacy(legacy.apply_mode(&entry.display_id, &entry.mode(), flags))?;
    }
    check_legacy(legacy.commit_pending())?;

    { let display_id = &display; info!(display = %display_id, "Primary display set through legacy primitive") };
    Ok(())
}

// ============================================================================
// Batch Positioning
// ============================================================================

/// Move several displays in one validated multi-path apply
pub fn apply_positions(
    engine: EngineContext<'_>,
    identities: &IdentityMap,
    positions: &[(DisplayId, Position)],
) -> Result<()> {
    if positions.is_empty() {
        return Ok(());
    }

    let builder = engine.builder();
    let (paths, mut modes) = builder.query_paths(false)?;

    for (display, position) in positions {
        let found = find_path_strict(display, &paths, identities)?;
        let slot = paths[found.index]
            .source
            .mode_index
            .map(|i| i as usize)
            .filter(|&i| i < modes.len())
            .ok_or_else(|| TopologyError::path_not_found(display.as_str()))?;

        let ModeInfo::Source(source) = &mut modes[slot] else {
            return Err(TopologyError::internal(format!(
                "mode slot {} of {} is not a source mode",
                slot, display
            )));
        };
        validate_position(*position, source.width, source.height)?;
        { let display_id = &display; debug!(display = %display_id, from = %source.position, to = %position, "Repositioning display") };
        source.position = *position;
    }

    builder.apply(&paths, &modes, ApplyFlags::supplied(), PathSelection::All)?;
    info!(displays = positions.len(), "Applied display positions");
    Ok(())
}
