//! Core data types for displaytopo
//!
//! Defines the value types that flow between the platform services and the
//! engine. Everything here is recomputed per detection cycle or owned by a
//! `Topology`; nothing is mutated in place once built.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::constants::naming;

// ============================================================================
// Display Identifiers
// ============================================================================

/// Logical display identifier as reported by the platform (`\\.\DISPLAY1`, ...)
///
/// Logical ids can be reassigned across reboots or enable/disable toggles.
/// Use the hardware UID in `DisplayIdentity` for durable correlation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DisplayId(String);

impl DisplayId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Build the device name for a zero-based platform source id
    pub fn from_source_id(source_id: u32) -> Self {
        Self(format!("{}{}", naming::DEVICE_PREFIX, source_id + 1))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Trailing display number (`\\.\DISPLAY3` -> 3)
    pub fn display_number(&self) -> Option<u32> {
        let trailing_digits: String = self
            .0
            .chars()
            .rev()
            .take_while(|c| c.is_ascii_digit())
            .collect();

        if trailing_digits.is_empty() {
            return None;
        }

        let digits_correct_order: String = trailing_digits.chars().rev().collect();
        digits_correct_order.parse::<u32>().ok()
    }

    /// Zero-based source index implied by the display number
    pub fn source_index(&self) -> Option<u32> {
        self.display_number().and_then(|n| n.checked_sub(1))
    }
}

impl fmt::Display for DisplayId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DisplayId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for DisplayId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

// ============================================================================
// Geometry
// ============================================================================

/// Resolution and refresh rate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
    pub refresh_hz: u32,
}

impl Resolution {
    pub const fn new(width: u32, height: u32, refresh_hz: u32) -> Self {
        Self {
            width,
            height,
            refresh_hz,
        }
    }

    /// Pixel count, used to rank alternative modes
    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    /// Distance used to rank how close another mode is to this one
    pub fn distance_to(&self, other: &Resolution) -> u64 {
        let dw = (self.width as i64 - other.width as i64).unsigned_abs();
        let dh = (self.height as i64 - other.height as i64).unsigned_abs();
        let dr = (self.refresh_hz as i64 - other.refresh_hz as i64).unsigned_abs();
        dw + dh + dr * 10
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}@{}", self.width, self.height, self.refresh_hz)
    }
}

/// Top-left corner of a display in desktop coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: i32,
    pub y: i32,
}

impl Position {
    pub const ORIGIN: Position = Position { x: 0, y: 0 };

    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Translate by the given offset
    pub fn offset(&self, dx: i32, dy: i32) -> Self {
        Self {
            x: self.x + dx,
            y: self.y + dy,
        }
    }

    pub fn is_origin(&self) -> bool {
        self.x == 0 && self.y == 0
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// Display rotation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Orientation {
    #[default]
    Landscape,
    Portrait,
    LandscapeFlipped,
    PortraitFlipped,
}

impl Orientation {
    /// Whether width and height are swapped on the desktop
    pub fn is_rotated(&self) -> bool {
        matches!(self, Self::Portrait | Self::PortraitFlipped)
    }

    pub fn degrees(&self) -> u32 {
        match self {
            Self::Landscape => 0,
            Self::Portrait => 90,
            Self::LandscapeFlipped => 180,
            Self::PortraitFlipped => 270,
        }
    }
}

/// A concrete mode as consumed and produced by the legacy mode-change primitive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayMode {
    pub resolution: Resolution,
    #[serde(default)]
    pub orientation: Orientation,
    #[serde(default)]
    pub position: Position,
}

impl DisplayMode {
    pub fn new(resolution: Resolution, orientation: Orientation, position: Position) -> Self {
        Self {
            resolution,
            orientation,
            position,
        }
    }

    /// Width and height as laid out on the desktop (swapped when rotated)
    pub fn desktop_size(&self) -> (u32, u32) {
        oriented_size(&self.resolution, self.orientation)
    }

    /// Same mode placed at another position
    pub fn at(&self, position: Position) -> Self {
        Self { position, ..*self }
    }
}

/// Width and height of a resolution after applying an orientation
pub fn oriented_size(resolution: &Resolution, orientation: Orientation) -> (u32, u32) {
    if orientation.is_rotated() {
        (resolution.height, resolution.width)
    } else {
        (resolution.width, resolution.height)
    }
}

// ============================================================================
// Detection Results
// ============================================================================

/// One display as reported by the display enumeration service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisplayInfo {
    pub id: DisplayId,
    pub name: String,
    pub resolution: Resolution,
    pub position: Position,
    pub orientation: Orientation,
    pub is_primary: bool,
    pub is_enabled: bool,
    /// Supported modes, when the service can report them
    pub modes: Option<Vec<Resolution>>,
}

/// How a logical display was tied to a physical monitor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Correlation {
    /// Platform target id equals the hardware UID
    Direct,
    /// Inventory enumeration order aligned index-for-index with active paths
    Positional,
}

/// Logical-to-physical identity of one display, valid for one detection cycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayIdentity {
    pub logical_id: DisplayId,
    /// Stable UID from the hardware instance path
    pub physical_uid: Option<u32>,
    pub friendly_name: String,
    pub manufacturer: String,
    /// Platform target id of the active path, used to cross-check path lookups
    pub target_id: Option<u32>,
    pub correlation: Correlation,
}

// ============================================================================
// Topology Entries
// ============================================================================

/// Desired state of one display within a topology
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayTopologyEntry {
    pub display_id: DisplayId,
    pub resolution: Resolution,
    pub position: Position,
    #[serde(default)]
    pub orientation: Orientation,
    pub is_primary: bool,
    pub is_enabled: bool,
    /// Hardware UID captured with the preset, used to rebind reassigned logical ids
    #[serde(default)]
    pub hardware_uid: Option<u32>,
}

impl DisplayTopologyEntry {
    pub fn new(display_id: impl Into<DisplayId>, resolution: Resolution, position: Position) -> Self {
        Self {
            display_id: display_id.into(),
            resolution,
            position,
            orientation: Orientation::Landscape,
            is_primary: false,
            is_enabled: true,
            hardware_uid: None,
        }
    }

    pub fn primary(self) -> Self {
        Self {
            is_primary: true,
            ..self
        }
    }

    pub fn disabled(self) -> Self {
        Self {
            is_enabled: false,
            ..self
        }
    }

    pub fn with_orientation(self, orientation: Orientation) -> Self {
        Self { orientation, ..self }
    }

    pub fn with_hardware_uid(self, uid: u32) -> Self {
        Self {
            hardware_uid: Some(uid),
            ..self
        }
    }

    /// Copy of this entry placed at another position
    pub fn with_position(&self, position: Position) -> Self {
        Self {
            position,
            ..self.clone()
        }
    }

    /// Copy of this entry bound to another logical id
    pub fn with_display_id(&self, display_id: DisplayId) -> Self {
        Self {
            display_id,
            ..self.clone()
        }
    }

    /// Desktop width and height after orientation
    pub fn desktop_size(&self) -> (u32, u32) {
        oriented_size(&self.resolution, self.orientation)
    }

    /// Requested mode at the requested position
    pub fn mode(&self) -> DisplayMode {
        DisplayMode::new(self.resolution, self.orientation, self.position)
    }
}

// ============================================================================
// Validation Results
// ============================================================================

/// Outcome of a consensus validation run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationResult {
    /// Consensus verdict of the final attempt
    pub is_enabled: bool,
    /// Whether any state signal answered for the display
    pub is_responding: bool,
    /// Attempts consumed
    pub attempts: u32,
    /// Last error seen while gathering signals, if any
    pub last_error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_number_parsing() {
        assert_eq!(DisplayId::new(r"\\.\DISPLAY1").display_number(), Some(1));
        assert_eq!(DisplayId::new(r"\\.\DISPLAY12").display_number(), Some(12));
        assert_eq!(DisplayId::new(r"\\.\DISPLAY12").source_index(), Some(11));
        assert_eq!(DisplayId::new("HDMI-A").display_number(), None);
        assert_eq!(DisplayId::new(r"\\.\DISPLAY0").source_index(), None);
    }

    #[test]
    fn test_from_source_id_round_trips_index() {
        let id = DisplayId::from_source_id(2);
        assert_eq!(id.as_str(), r"\\.\DISPLAY3");
        assert_eq!(id.source_index(), Some(2));
    }

    #[test]
    fn test_rotated_size() {
        let entry = DisplayTopologyEntry::new("d", Resolution::new(2560, 1440, 144), Position::ORIGIN)
            .with_orientation(Orientation::Portrait);
        assert_eq!(entry.desktop_size(), (1440, 2560));
        assert_eq!(entry.with_orientation(Orientation::LandscapeFlipped).desktop_size(), (2560, 1440));
    }

    #[test]
    fn test_entry_builders_do_not_mutate() {
        let entry = DisplayTopologyEntry::new("a", Resolution::new(1920, 1080, 60), Position::new(10, 20));
        let moved = entry.with_position(Position::ORIGIN);
        assert_eq!(entry.position, Position::new(10, 20));
        assert_eq!(moved.position, Position::ORIGIN);
        assert_eq!(moved.display_id, entry.display_id);
    }

    #[test]
    fn test_resolution_distance_prefers_same_size() {
        let wanted = Resolution::new(1920, 1080, 144);
        let same_size = Resolution::new(1920, 1080, 120);
        let other_size = Resolution::new(2560, 1440, 144);
        assert!(wanted.distance_to(&same_size) < wanted.distance_to(&other_size));
    }
}
