//! Input validation for topologies and positions
//!
//! Checks the invariants every topology must hold before the engine turns it
//! into platform calls:
//!
//! - at most one enabled entry is flagged primary
//! - display ids are unique
//! - every position lies within the desktop coordinate bounds

use std::collections::HashSet;

use crate::constants::bounds;
use crate::data::types::{DisplayTopologyEntry, Position};
use crate::error::{Result, TopologyError};

/// Whether a span starting at `start` with `extent` pixels fits the desktop bounds
pub fn span_in_bounds(start: i32, extent: u32) -> bool {
    start >= bounds::MIN_COORD && start as i64 + extent as i64 <= bounds::MAX_COORD as i64
}

/// Validates that a display of the given desktop size fits at `position`
pub fn validate_position(position: Position, width: u32, height: u32) -> Result<()> {
    match bounds_violation(position, width, height) {
        Some(reason) => Err(TopologyError::invalid_topology(reason)),
        None => Ok(()),
    }
}

fn bounds_violation(position: Position, width: u32, height: u32) -> Option<String> {
    if !span_in_bounds(position.x, width) {
        return Some(format!(
            "x={} with width {} exceeds [{}, {}]",
            position.x,
            width,
            bounds::MIN_COORD,
            bounds::MAX_COORD
        ));
    }
    if !span_in_bounds(position.y, height) {
        return Some(format!(
            "y={} with height {} exceeds [{}, {}]",
            position.y,
            height,
            bounds::MIN_COORD,
            bounds::MAX_COORD
        ));
    }
    None
}

/// Validates the structural invariants of a set of topology entries
pub fn validate_entries(entries: &[DisplayTopologyEntry]) -> Result<()> {
    let mut seen = HashSet::new();
    for entry in entries {
        if !seen.insert(&entry.display_id) {
            return Err(TopologyError::invalid_topology(format!(
                "duplicate display id {}",
                entry.display_id
            )));
        }
        if entry.resolution.width == 0 || entry.resolution.height == 0 {
            return Err(TopologyError::invalid_topology(format!(
                "{} has an empty resolution",
                entry.display_id
            )));
        }
    }

    let primaries = entries
        .iter()
        .filter(|e| e.is_enabled && e.is_primary)
        .count();
    if primaries > 1 {
        return Err(TopologyError::invalid_topology(format!(
            "{} enabled displays are flagged primary",
            primaries
        )));
    }

    for entry in entries.iter().filter(|e| e.is_enabled) {
        let (width, height) = entry.desktop_size();
        if let Some(reason) = bounds_violation(entry.position, width, height) {
            return Err(TopologyError::invalid_topology(format!(
                "{}: {}",
                entry.display_id, reason
            )));
        }
    }

    Ok(())
}
