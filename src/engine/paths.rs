//! Platform Path/Mode Builder
//!
//! Wraps the two-phase query/apply protocol:
//!
//! - `query_paths` - size query, then the config query into arrays of that size
//! - `find_path` - logical id to path index through four fallback tiers
//! - `populate_modes` - fill empty mode slots for a path about to be activated
//! - `PathModeBuilder::apply` - dry-run then apply, with path filtering for
//!   drivers that reject large arrays
//!
//! Path and mode arrays are snapshots. They are re-queried before every apply
//! and never cached across operations.

use std::borrow::Cow;
use std::collections::HashMap;

use tracing::{debug, trace, warn};

use crate::constants::{paths as path_const, status};
use crate::data::{DisplayId, DisplayMode};
use crate::error::{Result, TopologyError};
use crate::identity::IdentityMap;
use crate::platform::{
    ApplyFlags, ModeInfo, PathInfo, QueryFlags, Rational, SourceMode, TargetMode, TopologyService,
};
use crate::settings::ApplySettings;

// ============================================================================
// Query
// ============================================================================

/// Query the current configuration
///
/// With `include_inactive` every known path is returned (including paths of
/// displays that are no longer attached), otherwise only active paths. The
/// mode array is padded with `Unused` slots up to the reported capacity so
/// `populate_modes` has room to work with.
pub fn query_paths(topology: &dyn TopologyService, include_inactive: bool) -> Result<(Vec<PathInfo>, Vec<ModeInfo>)> {
    let flags = if include_inactive {
        QueryFlags::ALL_PATHS
    } else {
        QueryFlags::ONLY_ACTIVE_PATHS
    };

    let sizes = topology
        .get_buffer_sizes(flags)
        .map_err(|status| TopologyError::QuerySizeFailed { status })?;
    let (paths, mut modes) = topology
        .query_config(flags, sizes)
        .map_err(|status| TopologyError::QueryFailed { status })?;

    if modes.len() < sizes.modes {
        modes.resize(sizes.modes, ModeInfo::Unused);
    }

    trace!(
        include_inactive,
        paths = paths.len(),
        modes = modes.len(),
        "Queried display configuration"
    );
    Ok((paths, modes))
}

// ============================================================================
// Path Lookup
// ============================================================================

/// Which lookup tier resolved a display to a path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PathTier {
    /// Source id matched, cross-checked against the resolved target id
    SourceAndTarget,
    /// Target id of the resolved identity matched
    TargetOnly,
    /// Display number used directly as the array index
    NumericIndex,
    /// Display number wrapped around the array length
    ModuloIndex,
}

impl PathTier {
    /// Whether the tier points at the display's own slot
    ///
    /// A wrapped index lands on some path for any id, including ids the
    /// platform does not know, so it may name a different display.
    pub fn is_exact(&self) -> bool {
        !matches!(self, Self::ModuloIndex)
    }
}

/// A resolved path and the tier that found it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PathMatch {
    pub index: usize,
    pub tier: PathTier,
}

type PathResolver = fn(&DisplayId, &[PathInfo], &IdentityMap) -> Option<usize>;

/// Ordered tiers; each covers a separate driver inconsistency
const RESOLVERS: [(PathTier, PathResolver); 4] = [
    (PathTier::SourceAndTarget, by_source_and_target),
    (PathTier::TargetOnly, by_target),
    (PathTier::NumericIndex, by_numeric_index),
    (PathTier::ModuloIndex, by_modulo_index),
];

/// Resolve a logical display id to a path index; first matching tier wins
pub fn find_path(display: &DisplayId, paths: &[PathInfo], identities: &IdentityMap) -> Result<PathMatch> {
    for (tier, resolver) in RESOLVERS {
        if let Some(index) = resolver(display, paths, identities) {
            { let display_id = &display; debug!(display = %display_id, ?tier, index, "Resolved display path") };
            return Ok(PathMatch { index, tier });
        }
    }
    Err(TopologyError::path_not_found(display.as_str()))
}

/// `find_path` for calls that change state: a wrapped-index match is refused
pub fn find_path_strict(display: &DisplayId, paths: &[PathInfo], identities: &IdentityMap) -> Result<PathMatch> {
    let found = find_path(display, paths, identities)?;
    if !found.tier.is_exact() {
        { let display_id = &display; warn!(display = %display_id, index = found.index, "Refusing wrapped path index for a state change") };
        return Err(TopologyError::path_not_found(display.as_str()));
    }
    Ok(found)
}

/// First candidate backed by an attached monitor, else the first candidate
fn prefer_available(paths: &[PathInfo], candidates: impl Iterator<Item = usize> + Clone) -> Option<usize> {
    candidates
        .clone()
        .find(|&i| paths[i].target.target_available)
        .or_else(|| candidates.into_iter().next())
}

fn by_source_and_target(display: &DisplayId, paths: &[PathInfo], identities: &IdentityMap) -> Option<usize> {
    let source_id = display.source_index()?;
    let with_source = (0..paths.len()).filter(move |&i| paths[i].source.id == source_id);

    match identities.get(display).and_then(|i| i.target_id) {
        Some(target_id) => prefer_available(paths, with_source.filter(move |&i| paths[i].target.id == target_id)),
        None => {
            // Without an identity to cross-check, only an unambiguous source id counts
            let mut matches = with_source;
            let first = matches.next()?;
            match matches.next() {
                None => Some(first),
                Some(_) => None,
            }
        }
    }
}

fn by_target(display: &DisplayId, paths: &[PathInfo], identities: &IdentityMap) -> Option<usize> {
    let target_id = identities.get(display)?.target_id?;
    prefer_available(paths, (0..paths.len()).filter(move |&i| paths[i].target.id == target_id))
}

fn by_numeric_index(display: &DisplayId, paths: &[PathInfo], _identities: &IdentityMap) -> Option<usize> {
    let index = display.source_index()? as usize;
    (index < paths.len()).then_some(index)
}

fn by_modulo_index(display: &DisplayId, paths: &[PathInfo], _identities: &IdentityMap) -> Option<usize> {
    if paths.is_empty() {
        return None;
    }
    Some(display.source_index()? as usize % paths.len())
}

// ============================================================================
// Mode Population
// ============================================================================

/// Point the path at source and target modes describing `mode`
///
/// Existing mode slots of the path are overwritten in place; missing ones are
/// allocated from `Unused` slots. Fails when not enough free slots exist.
pub fn populate_modes(paths: &mut [PathInfo], modes: &mut [ModeInfo], index: usize, mode: &DisplayMode) -> Result<()> {
    let path = paths
        .get(index)
        .copied()
        .ok_or_else(|| TopologyError::internal(format!("path index {} out of range", index)))?;
    let display = DisplayId::from_source_id(path.source.id);

    let valid_slot = |slot: Option<u32>, modes: &[ModeInfo]| slot.filter(|&i| (i as usize) < modes.len());
    let mut source_slot = valid_slot(path.source.mode_index, modes);
    let mut target_slot = valid_slot(path.target.mode_index, modes);

    let needed = source_slot.is_none() as usize + target_slot.is_none() as usize;
    let mut free = modes
        .iter()
        .enumerate()
        .filter(|(_, m)| m.is_unused())
        .map(|(i, _)| i as u32);
    if needed > 0 && modes.iter().filter(|m| m.is_unused()).count() < needed {
        { let display_id = &display; warn!(display = %display_id, needed, "No free mode slots to populate") };
        return Err(TopologyError::NoFreeModeSlots {
            display: display.to_string(),
        });
    }
    if source_slot.is_none() {
        source_slot = free.next();
    }
    if target_slot.is_none() {
        target_slot = free.next();
    }
    let (Some(source_slot), Some(target_slot)) = (source_slot, target_slot) else {
        return Err(TopologyError::NoFreeModeSlots {
            display: display.to_string(),
        });
    };

    let (width, height) = mode.desktop_size();
    let res = mode.resolution;
    modes[source_slot as usize] = ModeInfo::Source(SourceMode {
        adapter_id: path.source.adapter_id,
        id: path.source.id,
        width,
        height,
        pixel_format_bpp: path_const::DEFAULT_PIXEL_FORMAT_BPP,
        position: mode.position,
    });
    modes[target_slot as usize] = ModeInfo::Target(TargetMode::synthesize(
        path.target.adapter_id,
        path.target.id,
        res.width,
        res.height,
        res.refresh_hz,
    ));

    let path = &mut paths[index];
    path.source.mode_index = Some(source_slot);
    path.target.mode_index = Some(target_slot);
    path.target.rotation = mode.orientation;
    path.target.refresh = Rational::from_hz(res.refresh_hz);

    { let display_id = &display; debug!(display = %display_id, source_slot, target_slot, mode = %res, "Populated path modes") };
    Ok(())
}

// ============================================================================
// Apply
// ============================================================================

/// Which paths of a configuration are submitted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathSelection {
    /// Every path as supplied
    All,
    /// Filter to active paths plus the given one, only above the size threshold
    Auto(usize),
    /// Always filter to active paths plus the given one
    ActivePlus(usize),
    /// Active paths plus the given one, with the mode array compacted to the
    /// modes those paths reference
    Minimal(usize),
}

/// Executes applies against the topology service
pub struct PathModeBuilder<'a> {
    topology: &'a dyn TopologyService,
    settings: &'a ApplySettings,
}

impl<'a> PathModeBuilder<'a> {
    pub fn new(topology: &'a dyn TopologyService, settings: &'a ApplySettings) -> Self {
        Self { topology, settings }
    }

    pub fn query_paths(&self, include_inactive: bool) -> Result<(Vec<PathInfo>, Vec<ModeInfo>)> {
        query_paths(self.topology, include_inactive)
    }

    /// Submit a configuration
    ///
    /// Destructive applies are preceded by a validate-only call with the same
    /// arrays; a rejected dry run aborts with `ValidationFailed`.
    pub fn apply(&self, paths: &[PathInfo], modes: &[ModeInfo], flags: ApplyFlags, selection: PathSelection) -> Result<()> {
        let (paths, modes) = self.select(paths, modes, selection);

        if self.settings.dry_run && flags.is_destructive() {
            let code = self.topology.apply_config(&paths, &modes, flags.as_dry_run());
            if code != status::SUCCESS {
                warn!(status = code, paths = paths.len(), "Dry-run validation rejected configuration");
                return Err(TopologyError::ValidationFailed { status: code });
            }
        }

        let code = self.topology.apply_config(&paths, &modes, flags);
        if code != status::SUCCESS {
            warn!(status = code, paths = paths.len(), ?flags, "Display configuration apply rejected");
            return Err(TopologyError::config_rejected(code));
        }

        debug!(paths = paths.len(), ?selection, "Applied display configuration");
        Ok(())
    }

    fn select<'p>(
        &self,
        paths: &'p [PathInfo],
        modes: &'p [ModeInfo],
        selection: PathSelection,
    ) -> (Cow<'p, [PathInfo]>, Cow<'p, [ModeInfo]>) {
        match selection {
            PathSelection::All => (Cow::Borrowed(paths), Cow::Borrowed(modes)),
            PathSelection::Auto(keep) if paths.len() > self.settings.filter_threshold => {
                debug!(
                    paths = paths.len(),
                    threshold = self.settings.filter_threshold,
                    "Filtering large path array"
                );
                (Cow::Owned(filter_paths(paths, keep)), Cow::Borrowed(modes))
            }
            PathSelection::Auto(_) => (Cow::Borrowed(paths), Cow::Borrowed(modes)),
            PathSelection::ActivePlus(keep) => (Cow::Owned(filter_paths(paths, keep)), Cow::Borrowed(modes)),
            PathSelection::Minimal(keep) => {
                let (paths, modes) = compact_modes(filter_paths(paths, keep), modes);
                (Cow::Owned(paths), Cow::Owned(modes))
            }
        }
    }
}

/// Active paths plus the path at `keep`, in their original order
fn filter_paths(paths: &[PathInfo], keep: usize) -> Vec<PathInfo> {
    paths
        .iter()
        .enumerate()
        .filter(|(i, p)| *i == keep || p.is_active())
        .map(|(_, p)| *p)
        .collect()
}

/// Keep only referenced modes and renumber the path references
fn compact_modes(mut paths: Vec<PathInfo>, modes: &[ModeInfo]) -> (Vec<PathInfo>, Vec<ModeInfo>) {
    let mut remap: HashMap<u32, u32> = HashMap::new();
    let mut compacted = Vec::new();

    let mut relocate = |slot: &mut Option<u32>| {
        let Some(old) = *slot else { return };
        let Some(mode) = modes.get(old as usize) else {
            *slot = None;
            return;
        };
        let new = *remap.entry(old).or_insert_with(|| {
            compacted.push(*mode);
            (compacted.len() - 1) as u32
        });
        *slot = Some(new);
    };

    for path in paths.iter_mut() {
        relocate(&mut path.source.mode_index);
        relocate(&mut path.target.mode_index);
    }

    (paths, compacted)
}
