//! Platform service boundaries
//!
//! The engine talks to the operating system through five narrow traits, one
//! per external collaborator:
//!
//! - `DisplayEnumerator` - logical displays with their current state
//! - `HardwareInventory` - monitor records carrying hardware UIDs
//! - `TopologyService` - the two-phase path/mode query and apply protocol
//! - `LegacyModeService` - per-device mode enumeration and mode changes
//! - `LayoutTool` - external layout-switch tool used as a last resort
//!
//! Every call blocks. Implementations hold the only mutable state; the
//! engine passes explicit snapshots between calls.

mod descriptors;
mod layout_tool;
pub mod simulated;

use std::time::Duration;

use crate::data::{DisplayId, DisplayInfo, DisplayMode};
use crate::error::Result;

pub use descriptors::{
    AdapterId, ApplyFlags, BufferSizes, ModeChangeFlags, ModeInfo, PathFlags, PathInfo,
    PathSourceInfo, PathTargetInfo, QueryFlags, Rational, SourceMode, TargetMode,
};
pub use layout_tool::CommandLayoutTool;
pub use simulated::{LegacyAttach, PlatformCall, SimBehavior, SimMonitor, SimulatedPlatform};

/// Raw status code of the topology protocol (0 = success)
pub type Status = u32;

/// Raw status code of the legacy mode-change primitive (0 = success)
pub type LegacyStatus = i32;

// ============================================================================
// Hardware Inventory Records
// ============================================================================

/// Raw string buffer as returned by the hardware inventory service
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawBuffer {
    /// UTF-16 code units, zero padded
    Wide(Vec<u16>),
    /// Single-byte characters, zero padded
    Bytes(Vec<u8>),
}

impl RawBuffer {
    /// Zero-padded wide buffer of a fixed length
    pub fn wide_padded(text: &str, len: usize) -> Self {
        let mut units: Vec<u16> = text.encode_utf16().collect();
        units.resize(len.max(units.len()), 0);
        Self::Wide(units)
    }
}

/// One monitor as reported by the hardware inventory service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorRecord {
    /// Device instance path; carries the hardware UID token (`...&UID4353_0`)
    pub instance_path: String,
    pub manufacturer_raw: RawBuffer,
    pub product_raw: RawBuffer,
    pub serial_raw: RawBuffer,
    pub friendly_name_raw: RawBuffer,
}

/// Per-device state reported by the legacy device enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DeviceState {
    /// Device is attached to the desktop
    pub attached: bool,
    pub primary: bool,
}

// ============================================================================
// Service Traits
// ============================================================================

/// Display enumeration service
#[cfg_attr(test, mockall::automock)]
pub trait DisplayEnumerator {
    /// List every connected display, enabled or not
    fn list_displays(&self) -> Result<Vec<DisplayInfo>>;
}

/// Hardware inventory service
#[cfg_attr(test, mockall::automock)]
pub trait HardwareInventory {
    /// List monitor records in inventory enumeration order
    fn list_monitors(&self) -> Result<Vec<MonitorRecord>>;
}

/// Two-phase path/mode topology protocol
#[cfg_attr(test, mockall::automock)]
pub trait TopologyService {
    /// First phase: how large the path and mode arrays must be
    fn get_buffer_sizes(&self, flags: QueryFlags) -> std::result::Result<BufferSizes, Status>;

    /// Second phase: fill arrays of at most the given sizes
    fn query_config(
        &self,
        flags: QueryFlags,
        sizes: BufferSizes,
    ) -> std::result::Result<(Vec<PathInfo>, Vec<ModeInfo>), Status>;

    /// Apply (or with `VALIDATE`, dry-run) a configuration
    fn apply_config(&self, paths: &[PathInfo], modes: &[ModeInfo], flags: ApplyFlags) -> Status;
}

/// Legacy per-device mode-change primitive
#[cfg_attr(test, mockall::automock)]
pub trait LegacyModeService {
    /// Mode option `index` of the device, `None` past the end
    fn enum_settings(&self, device: &DisplayId, index: u32) -> Option<DisplayMode>;

    /// Mode currently driven on the device, `None` when detached
    fn current_mode(&self, device: &DisplayId) -> Option<DisplayMode>;

    /// Attachment state of the device, `None` when the device is unknown
    fn device_state(&self, device: &DisplayId) -> Option<DeviceState>;

    /// Ask the driver whether a mode would be accepted
    fn test_mode(&self, device: &DisplayId, mode: &DisplayMode) -> LegacyStatus;

    /// Change the device mode (with `NO_RESET` the change is only staged)
    fn apply_mode(&self, device: &DisplayId, mode: &DisplayMode, flags: ModeChangeFlags) -> LegacyStatus;

    /// Detach the device from the desktop (zero-size mode)
    fn detach(&self, device: &DisplayId, flags: ModeChangeFlags) -> LegacyStatus;

    /// Global reset: apply every staged change
    fn commit_pending(&self) -> LegacyStatus;
}

/// External layout-switch tool
#[cfg_attr(test, mockall::automock)]
pub trait LayoutTool {
    /// Run the tool and return its exit code; must not exceed `timeout`
    fn run(&self, args: &[String], timeout: Duration) -> Result<i32>;
}

/// A backend implementing every OS-facing service except the layout tool
pub trait PlatformBackend: DisplayEnumerator + HardwareInventory + TopologyService + LegacyModeService {}

impl<T> PlatformBackend for T where T: DisplayEnumerator + HardwareInventory + TopologyService + LegacyModeService {}

// ============================================================================
// Service Bundle
// ============================================================================

/// Borrowed handles to every platform service, passed down the engine
#[derive(Clone, Copy)]
pub struct PlatformServices<'a> {
    pub displays: &'a dyn DisplayEnumerator,
    pub inventory: &'a dyn HardwareInventory,
    pub topology: &'a dyn TopologyService,
    pub legacy: &'a dyn LegacyModeService,
    pub layout_tool: &'a dyn LayoutTool,
}

impl<'a> PlatformServices<'a> {
    /// Borrow every service from one backend plus a layout tool
    pub fn new<B: PlatformBackend>(backend: &'a B, layout_tool: &'a dyn LayoutTool) -> Self {
        Self {
            displays: backend,
            inventory: backend,
            topology: backend,
            legacy: backend,
            layout_tool,
        }
    }
}
