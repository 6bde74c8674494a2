//! Path and mode descriptors of the topology query/apply protocol
//!
//! These mirror the platform structures one-to-one but use `Option` for the
//! "no mode" sentinel. They are query-scoped: always re-fetched before an
//! apply and never persisted.

use bitflags::bitflags;

use crate::constants::paths as path_const;
use crate::data::{Orientation, Position};

bitflags! {
    /// Scope of a topology query
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct QueryFlags: u32 {
        /// Every path the platform knows, including inactive and historical ones
        const ALL_PATHS = 0x0000_0001;
        /// Only currently active paths
        const ONLY_ACTIVE_PATHS = 0x0000_0002;
        /// The configuration stored in the persistence database
        const DATABASE_CURRENT = 0x0000_0004;
    }

    /// Scope and behavior of a topology apply
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ApplyFlags: u32 {
        const TOPOLOGY_INTERNAL = 0x0000_0001;
        const TOPOLOGY_CLONE = 0x0000_0002;
        const TOPOLOGY_EXTEND = 0x0000_0004;
        const TOPOLOGY_EXTERNAL = 0x0000_0008;
        const USE_DATABASE_CURRENT = Self::TOPOLOGY_INTERNAL.bits()
            | Self::TOPOLOGY_CLONE.bits()
            | Self::TOPOLOGY_EXTEND.bits()
            | Self::TOPOLOGY_EXTERNAL.bits();
        const USE_SUPPLIED_DISPLAY_CONFIG = 0x0000_0020;
        /// Dry run: check the configuration without changing anything
        const VALIDATE = 0x0000_0040;
        const APPLY = 0x0000_0080;
        const NO_OPTIMIZATION = 0x0000_0100;
        const SAVE_TO_DATABASE = 0x0000_0200;
        /// Let the platform adjust modes that do not match exactly
        const ALLOW_CHANGES = 0x0000_0400;
        const PATH_PERSIST_IF_REQUIRED = 0x0000_0800;
        const FORCE_MODE_ENUMERATION = 0x0000_1000;
        const ALLOW_PATH_ORDER_CHANGES = 0x0000_2000;
    }

    /// Per-path state flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct PathFlags: u32 {
        const ACTIVE = 0x0000_0001;
    }

    /// Flags of the legacy per-device mode-change primitive
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ModeChangeFlags: u32 {
        const UPDATE_REGISTRY = 0x0000_0001;
        const TEST = 0x0000_0002;
        const FULLSCREEN = 0x0000_0004;
        const GLOBAL = 0x0000_0008;
        const SET_PRIMARY = 0x0000_0010;
        const NO_RESET = 0x1000_0000;
        const RESET = 0x4000_0000;
    }
}

impl ApplyFlags {
    /// Flags for applying a fully supplied configuration
    pub fn supplied() -> Self {
        Self::USE_SUPPLIED_DISPLAY_CONFIG | Self::APPLY | Self::SAVE_TO_DATABASE | Self::ALLOW_CHANGES
    }

    /// Same as `supplied()` but the platform must match modes exactly
    pub fn supplied_exact() -> Self {
        Self::USE_SUPPLIED_DISPLAY_CONFIG | Self::APPLY | Self::SAVE_TO_DATABASE
    }

    /// Whether these flags change live state
    pub fn is_destructive(&self) -> bool {
        self.contains(Self::APPLY)
    }

    /// The dry-run counterpart of these flags
    pub fn as_dry_run(&self) -> Self {
        (*self - Self::APPLY - Self::SAVE_TO_DATABASE) | Self::VALIDATE
    }
}

/// Graphics adapter identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct AdapterId {
    pub low: u32,
    pub high: i32,
}

/// Refresh rate expressed as a fraction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Rational {
    pub numerator: u32,
    pub denominator: u32,
}

impl Rational {
    pub fn from_hz(hz: u32) -> Self {
        Self {
            numerator: hz,
            denominator: 1,
        }
    }

    /// Rounded integer value, 0 for an unset rational
    pub fn to_hz(&self) -> u32 {
        if self.denominator == 0 {
            return 0;
        }
        (self.numerator + self.denominator / 2) / self.denominator
    }
}

/// Source (adapter output) half of a path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PathSourceInfo {
    pub adapter_id: AdapterId,
    pub id: u32,
    pub mode_index: Option<u32>,
}

/// Target (monitor) half of a path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PathTargetInfo {
    pub adapter_id: AdapterId,
    pub id: u32,
    pub mode_index: Option<u32>,
    pub rotation: Orientation,
    pub refresh: Rational,
    /// Whether a monitor is currently attached to this target
    pub target_available: bool,
}

/// One adapter-output-to-display connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PathInfo {
    pub source: PathSourceInfo,
    pub target: PathTargetInfo,
    pub flags: PathFlags,
}

impl PathInfo {
    pub fn is_active(&self) -> bool {
        self.flags.contains(PathFlags::ACTIVE)
    }

    /// Active and backed by an attached monitor
    pub fn is_live(&self) -> bool {
        self.is_active() && self.target.target_available
    }

    /// Whether both mode slots reference a mode
    pub fn has_modes(&self) -> bool {
        self.source.mode_index.is_some() && self.target.mode_index.is_some()
    }

    /// Copy of this path with the active flag set or cleared
    pub fn with_active(&self, active: bool) -> Self {
        let mut path = *self;
        path.flags.set(PathFlags::ACTIVE, active);
        if !active {
            path.source.mode_index = None;
            path.target.mode_index = None;
        }
        path
    }
}

/// Source mode: desktop geometry of an adapter output
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceMode {
    pub adapter_id: AdapterId,
    pub id: u32,
    pub width: u32,
    pub height: u32,
    pub pixel_format_bpp: u32,
    pub position: Position,
}

/// Target mode: signal timing driven to the monitor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TargetMode {
    pub adapter_id: AdapterId,
    pub id: u32,
    pub active_width: u32,
    pub active_height: u32,
    pub total_width: u32,
    pub total_height: u32,
    pub vsync: Rational,
    pub hsync: Rational,
    pub pixel_rate: u64,
}

impl TargetMode {
    /// Synthesize plausible timing for an active size and refresh rate
    pub fn synthesize(adapter_id: AdapterId, id: u32, width: u32, height: u32, refresh_hz: u32) -> Self {
        let total_width = width * path_const::BLANKING_FACTOR_NUM / path_const::BLANKING_FACTOR_DEN;
        let total_height = height * path_const::BLANKING_FACTOR_NUM / path_const::BLANKING_FACTOR_DEN;
        let pixel_rate = total_width as u64 * total_height as u64 * refresh_hz as u64;
        Self {
            adapter_id,
            id,
            active_width: width,
            active_height: height,
            total_width,
            total_height,
            vsync: Rational::from_hz(refresh_hz),
            hsync: Rational {
                numerator: (pixel_rate / total_width.max(1) as u64) as u32,
                denominator: 1,
            },
            pixel_rate,
        }
    }
}

/// Entry of the mode array
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ModeInfo {
    /// Free slot
    #[default]
    Unused,
    Source(SourceMode),
    Target(TargetMode),
}

impl ModeInfo {
    pub fn is_unused(&self) -> bool {
        matches!(self, Self::Unused)
    }

    pub fn as_source(&self) -> Option<&SourceMode> {
        match self {
            Self::Source(mode) => Some(mode),
            _ => None,
        }
    }

    pub fn as_target(&self) -> Option<&TargetMode> {
        match self {
            Self::Target(mode) => Some(mode),
            _ => None,
        }
    }
}

/// Array sizes reported by the first call of the query protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BufferSizes {
    pub paths: usize,
    pub modes: usize,
}
