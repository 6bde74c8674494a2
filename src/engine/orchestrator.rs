//! Topology Apply Orchestrator
//!
//! Turns a desired `Topology` into platform calls in a fixed order:
//!
//! 1. Detect, rebind entries by hardware UID, skip disconnected displays
//! 2. Disable the entries marked disabled (best effort)
//! 3. Enable the remaining entries and apply their requested modes
//! 4. Assign the primary display
//! 5. Normalize positions and apply them in one batch
//!
//! Failures in steps 2 and 3 are collected per display and processing
//! continues. Failures in steps 4 and 5 only produce warnings. Nothing is
//! rolled back; capture the live topology first to be able to re-apply it.

use serde_json::json;
use tracing::{info, warn};

use super::modes::{apply_display_mode, apply_positions, set_primary};
use super::position::{find_overlaps, normalize};
use super::strategy::{disable_display, DisableOutcome, EnableContext, EnableReport, StrategyExecutor};
use super::{detect, EngineContext};
use crate::data::{DisplayId, DisplayTopologyEntry, Position, Topology};
use crate::error::TopologyError;
use crate::identity::{rebind_entries, resolve, Remap};
use crate::logger::log_event;

/// What a topology apply did, display by display
#[derive(Debug, Clone, Default)]
pub struct ApplyReport {
    /// Name of the applied topology
    pub topology: String,
    pub remaps: Vec<Remap>,
    /// Entries for displays that are not connected
    pub skipped: Vec<DisplayId>,
    pub disabled: Vec<(DisplayId, DisableOutcome)>,
    pub enabled: Vec<(DisplayId, EnableReport)>,
    /// Displays whose mode was changed after enabling
    pub mode_changes: Vec<DisplayId>,
    pub primary: Option<DisplayId>,
    /// Final positions applied in the batch
    pub positions: Vec<(DisplayId, Position)>,
    pub overlaps: Vec<(DisplayId, DisplayId)>,
    pub warnings: Vec<String>,
}

impl ApplyReport {
    fn warn(&mut self, message: String) {
        warn!(topology = %self.topology, "{}", message);
        self.warnings.push(message);
    }
}

/// Why a topology apply did not fully succeed
#[derive(thiserror::Error, Debug)]
pub enum ApplyFailure {
    /// Nothing was applied
    #[error("Topology rejected: {0}")]
    Rejected(TopologyError),

    /// Some displays failed; everything else was applied
    #[error("{} display(s) failed to apply", .errors.len())]
    Partial {
        errors: Vec<(DisplayId, TopologyError)>,
        report: Box<ApplyReport>,
    },
}

impl ApplyFailure {
    /// Per-display errors; empty when the whole topology was rejected
    pub fn errors(&self) -> &[(DisplayId, TopologyError)] {
        match self {
            Self::Rejected(_) => &[],
            Self::Partial { errors, .. } => errors.as_slice(),
        }
    }

    pub fn report(&self) -> Option<&ApplyReport> {
        match self {
            Self::Rejected(_) => None,
            Self::Partial { report, .. } => Some(&**report),
        }
    }
}

/// Apply a full topology
pub fn apply_topology(engine: EngineContext<'_>, topology: &Topology) -> Result<ApplyReport, ApplyFailure> {
    topology.validate().map_err(ApplyFailure::Rejected)?;
    let detection = detect(engine.services).map_err(ApplyFailure::Rejected)?;

    info!(topology = %topology.name, entries = topology.entries.len(), "Applying topology");
    let mut report = ApplyReport {
        topology: topology.name.clone(),
        ..ApplyReport::default()
    };
    let mut errors: Vec<(DisplayId, TopologyError)> = Vec::new();

    let rebound = rebind_entries(&topology.entries, &detection.identities);
    report.remaps = rebound.remaps;

    let (connected, disconnected): (Vec<DisplayTopologyEntry>, Vec<DisplayTopologyEntry>) = rebound
        .entries
        .into_iter()
        .partition(|e| detection.display(&e.display_id).is_some());
    for entry in disconnected {
        report.warn(format!("{} is not connected, skipping", entry.display_id));
        report.skipped.push(entry.display_id);
    }

    // Disable
    for entry in connected.iter().filter(|e| !e.is_enabled) {
        let outcome = disable_display(engine, &detection.identities, &entry.display_id);
        if let DisableOutcome::AssumedDisabled { reason } = &outcome {
            report.warn(format!("{} may still be enabled: {}", entry.display_id, reason));
        }
        report.disabled.push((entry.display_id.clone(), outcome));
    }

    // Enable and apply modes
    let executor = StrategyExecutor::standard();
    let mut enabled: Vec<&DisplayTopologyEntry> = Vec::new();
    for entry in connected.iter().filter(|e| e.is_enabled) {
        let ctx = EnableContext::new(engine, &detection.identities, &entry.display_id).with_requested(entry.mode());
        match executor.enable(&ctx) {
            Ok(enable) => {
                report.enabled.push((entry.display_id.clone(), enable));
                enabled.push(entry);
            }
            Err(e) => {
                errors.push((entry.display_id.clone(), e));
                continue;
            }
        }

        let current = engine.services.legacy.current_mode(&entry.display_id);
        let position = current.map(|m| m.position).unwrap_or(entry.position);
        let needs_mode = current.map_or(true, |m| {
            m.resolution != entry.resolution || m.orientation != entry.orientation
        });
        if needs_mode {
            match apply_display_mode(engine.services, &entry.display_id, &entry.mode().at(position)) {
                Ok(()) => report.mode_changes.push(entry.display_id.clone()),
                Err(e) => errors.push((entry.display_id.clone(), e)),
            }
        }
    }

    // Enabling adds paths, so correlate again before addressing them
    let identities = resolve(engine.services.inventory, engine.services.topology);

    // Primary
    match enabled.iter().find(|e| e.is_primary) {
        Some(primary) => match set_primary(engine, &identities, &primary.display_id) {
            Ok(()) => report.primary = Some(primary.display_id.clone()),
            Err(e) => report.warn(format!("failed to make {} primary: {}", primary.display_id, e)),
        },
        None if !enabled.is_empty() => report.warn("no enabled entry is flagged primary".to_string()),
        None => {}
    }

    // Positions
    let layout = normalize(&enabled.iter().map(|e| (*e).clone()).collect::<Vec<_>>());
    report.overlaps = find_overlaps(&layout);
    for (a, b) in report.overlaps.clone() {
        report.warn(format!("{} overlaps {}", a, b));
    }
    let positions: Vec<(DisplayId, Position)> = layout.iter().map(|e| (e.display_id.clone(), e.position)).collect();
    match apply_positions(engine, &identities, &positions) {
        Ok(()) => report.positions = positions,
        Err(e) => report.warn(format!("failed to apply positions: {}", e)),
    }

    log_event(
        "topology_apply",
        json!({
            "name": topology.name,
            "content_hash": topology.content_hash,
            "remapped": report.remaps.len(),
            "skipped": report.skipped.len(),
            "disabled": report.disabled.len(),
            "enabled": report.enabled.len(),
            "mode_changes": report.mode_changes.len(),
            "warnings": report.warnings,
            "errors": errors.iter().map(|(id, e)| json!({"display": id, "error": e.to_string()})).collect::<Vec<_>>(),
        }),
    );

    if errors.is_empty() {
        info!(topology = %topology.name, warnings = report.warnings.len(), "Topology applied");
        Ok(report)
    } else {
        warn!(topology = %topology.name, failed = errors.len(), "Topology partially applied");
        Err(ApplyFailure::Partial {
            errors,
            report: Box::new(report),
        })
    }
}
