//! In-memory platform backend
//!
//! `SimulatedPlatform` models a desktop with a handful of monitors and the
//! quirks the engine has to survive: ghost paths left behind by displays that
//! are no longer attached, drivers that reject activation without explicit
//! modes, large path arrays rejected with invalid-parameter, and drivers that
//! report success without changing anything.
//!
//! Handles are cheap to clone and share one state, so the same simulation can
//! serve as backend and layout tool while a test inspects the call log.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, trace};

use super::descriptors::{
    AdapterId, ApplyFlags, BufferSizes, ModeChangeFlags, ModeInfo, PathFlags, PathInfo,
    PathSourceInfo, PathTargetInfo, QueryFlags, Rational, SourceMode, TargetMode,
};
use super::{
    DeviceState, DisplayEnumerator, HardwareInventory, LayoutTool, LegacyModeService, LegacyStatus,
    MonitorRecord, RawBuffer, Status, TopologyService,
};
use crate::constants::{legacy_status, paths as path_const, status};
use crate::data::{DisplayId, DisplayInfo, DisplayMode, Orientation, Position, Resolution};
use crate::error::{Result, TopologyError};

const SIM_ADAPTER: AdapterId = AdapterId { low: 0x0001_2a4f, high: 0 };
const GHOST_SOURCE_BASE: u32 = 16;
const GHOST_TARGET_BASE: u32 = 0x9000;
const WIDE_FIELD_LEN: usize = 16;
const FRIENDLY_NAME_LEN: usize = 64;

// ============================================================================
// Simulated Hardware
// ============================================================================

/// One simulated monitor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimMonitor {
    /// Zero-based source id; the logical id is `\\.\DISPLAY{source_id + 1}`
    pub source_id: u32,
    pub target_id: u32,
    /// Hardware UID published in the inventory instance path
    pub uid: u32,
    pub manufacturer: String,
    pub product: String,
    pub serial: String,
    pub friendly_name: String,
    pub connected: bool,
    pub enabled: bool,
    /// Current mode, or the last mode driven when disabled
    pub mode: DisplayMode,
    pub supported: Vec<Resolution>,
}

impl SimMonitor {
    /// Enabled, connected monitor at the origin whose UID equals its target id
    pub fn new(source_id: u32, target_id: u32, resolution: Resolution) -> Self {
        Self {
            source_id,
            target_id,
            uid: target_id,
            manufacturer: "DEL".to_string(),
            product: format!("A{:03X}", 0x100 + source_id),
            serial: format!("SN{:06}", 1000 + source_id),
            friendly_name: format!("Monitor {}", source_id + 1),
            connected: true,
            enabled: true,
            mode: DisplayMode::new(resolution, Orientation::Landscape, Position::ORIGIN),
            supported: vec![resolution, Resolution::new(1280, 720, 60)],
        }
    }

    pub fn at(mut self, x: i32, y: i32) -> Self {
        self.mode.position = Position::new(x, y);
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    pub fn disconnected(mut self) -> Self {
        self.connected = false;
        self
    }

    pub fn with_uid(mut self, uid: u32) -> Self {
        self.uid = uid;
        self
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.friendly_name = name.to_string();
        self
    }

    pub fn with_supported(mut self, supported: Vec<Resolution>) -> Self {
        self.supported = supported;
        self
    }

    /// Logical id the platform currently reports for this monitor
    pub fn id(&self) -> DisplayId {
        DisplayId::from_source_id(self.source_id)
    }

    fn supports(&self, resolution: &Resolution) -> bool {
        self.supported.contains(resolution)
    }

    fn is_primary(&self) -> bool {
        self.enabled && self.mode.position.is_origin()
    }
}

/// How the legacy primitive treats a request to attach a detached display
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LegacyAttach {
    /// A direct mode change attaches the display
    #[default]
    Direct,
    /// Only a staged change followed by a global reset attaches it
    OnlyWithReset,
    /// The legacy primitive never attaches displays
    Never,
}

/// Knobs for driver quirks and failure injection
#[derive(Debug, Clone)]
pub struct SimBehavior {
    /// Inventory service answers at all
    pub inventory_available: bool,
    /// Omit the `UID` token from instance paths
    pub hide_uids: bool,
    /// Inactive paths for displays that are no longer attached
    pub ghost_paths: u32,
    /// Reject supplied configurations with more paths than this
    pub reject_paths_over: Option<usize>,
    /// Reject activating a path whose mode slots are empty
    pub require_modes_for_activation: bool,
    /// Report no spare mode capacity beyond the modes in use
    pub tight_mode_buffer: bool,
    /// Targets whose activation is acknowledged but never happens
    pub ignore_activation: HashSet<u32>,
    /// Statuses returned by successive real (non dry-run) applies
    pub apply_script: VecDeque<Status>,
    /// Status returned by every dry-run apply
    pub dry_run_status: Status,
    /// Status returned by the size query, instead of success
    pub query_size_status: Option<Status>,
    /// Status returned by the config query, instead of success
    pub query_status: Option<Status>,
    /// A generic extend request enables every connected monitor
    pub extend_enables_all: bool,
    /// Forced re-enumeration lifts the explicit-mode requirement
    pub force_enumeration_enables: bool,
    pub legacy_attach: LegacyAttach,
    /// Status returned by every legacy call, instead of the modeled result
    pub legacy_status_override: Option<LegacyStatus>,
    /// Enabled flag forced in the display enumeration, per source id
    pub enumeration_override: HashMap<u32, bool>,
    /// Attached flag forced in the device state, per source id
    pub attached_override: HashMap<u32, bool>,
    /// Display enumeration fails
    pub enumeration_fails: bool,
    pub layout_tool_exit_code: i32,
    /// The layout tool's extend argument enables every connected monitor
    pub layout_tool_enables: bool,
}

impl Default for SimBehavior {
    fn default() -> Self {
        Self {
            inventory_available: true,
            hide_uids: false,
            ghost_paths: 0,
            reject_paths_over: None,
            require_modes_for_activation: false,
            tight_mode_buffer: false,
            ignore_activation: HashSet::new(),
            apply_script: VecDeque::new(),
            dry_run_status: status::SUCCESS,
            query_size_status: None,
            query_status: None,
            extend_enables_all: false,
            force_enumeration_enables: false,
            legacy_attach: LegacyAttach::Direct,
            legacy_status_override: None,
            enumeration_override: HashMap::new(),
            attached_override: HashMap::new(),
            enumeration_fails: false,
            layout_tool_exit_code: 0,
            layout_tool_enables: false,
        }
    }
}

/// One call observed by the simulation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlatformCall {
    QuerySizes(QueryFlags),
    QueryConfig(QueryFlags),
    ApplyConfig {
        flags: ApplyFlags,
        path_count: usize,
        /// Target ids of the paths marked active in the supplied array
        active_targets: Vec<u32>,
    },
    TestMode(DisplayId),
    ApplyMode {
        device: DisplayId,
        mode: DisplayMode,
        flags: ModeChangeFlags,
    },
    Detach(DisplayId),
    CommitPending,
    LayoutTool(Vec<String>),
}

impl PlatformCall {
    /// Whether this call can change live state
    pub fn is_mutation(&self) -> bool {
        match self {
            Self::ApplyConfig { flags, .. } => flags.is_destructive(),
            Self::ApplyMode { .. } | Self::Detach(_) | Self::CommitPending | Self::LayoutTool(_) => true,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum PendingChange {
    Mode(DisplayMode, bool),
    Detach,
}

#[derive(Debug, Default)]
struct SimState {
    monitors: Vec<SimMonitor>,
    behavior: SimBehavior,
    calls: Vec<PlatformCall>,
    pending: Vec<(u32, PendingChange)>,
}

// ============================================================================
// Simulated Platform
// ============================================================================

/// Shared handle to a simulated desktop
#[derive(Debug, Clone, Default)]
pub struct SimulatedPlatform {
    state: Arc<Mutex<SimState>>,
}

impl SimulatedPlatform {
    pub fn new(monitors: Vec<SimMonitor>) -> Self {
        Self {
            state: Arc::new(Mutex::new(SimState {
                monitors,
                ..SimState::default()
            })),
        }
    }

    /// Adjust the driver behavior
    pub fn configure(&self, f: impl FnOnce(&mut SimBehavior)) {
        f(&mut self.state.lock().behavior);
    }

    /// Mutate one monitor in place
    pub fn update_monitor(&self, id: &DisplayId, f: impl FnOnce(&mut SimMonitor)) {
        let mut state = self.state.lock();
        if let Some(monitor) = state.monitors.iter_mut().find(|m| &m.id() == id) {
            f(monitor);
        }
    }

    /// Snapshot of one monitor by its current logical id
    pub fn monitor(&self, id: &DisplayId) -> Option<SimMonitor> {
        self.state.lock().monitors.iter().find(|m| &m.id() == id).cloned()
    }

    pub fn monitors(&self) -> Vec<SimMonitor> {
        self.state.lock().monitors.clone()
    }

    /// Every call observed so far, in order
    pub fn calls(&self) -> Vec<PlatformCall> {
        self.state.lock().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state.lock().calls.clear();
    }

    /// Exchange the source ids of two monitors, as happens when logical ids
    /// are reassigned across a reboot
    pub fn swap_source_ids(&self, a: &DisplayId, b: &DisplayId) {
        let mut state = self.state.lock();
        let ia = state.monitors.iter().position(|m| &m.id() == a);
        let ib = state.monitors.iter().position(|m| &m.id() == b);
        if let (Some(ia), Some(ib)) = (ia, ib) {
            let tmp = state.monitors[ia].source_id;
            state.monitors[ia].source_id = state.monitors[ib].source_id;
            state.monitors[ib].source_id = tmp;
        }
    }

    fn record(&self, call: PlatformCall) {
        trace!(?call, "Simulated platform call");
        self.state.lock().calls.push(call);
    }
}

impl SimState {
    fn connected(&self) -> impl Iterator<Item = &SimMonitor> {
        self.monitors.iter().filter(|m| m.connected)
    }

    fn by_device(&mut self, device: &DisplayId) -> Option<&mut SimMonitor> {
        self.monitors.iter_mut().find(|m| m.connected && &m.id() == device)
    }

    fn path_count(&self, flags: QueryFlags) -> usize {
        if flags.contains(QueryFlags::ONLY_ACTIVE_PATHS) {
            self.connected().filter(|m| m.enabled).count()
        } else {
            self.connected().count() + self.behavior.ghost_paths as usize
        }
    }

    fn build_config(&self, flags: QueryFlags) -> (Vec<PathInfo>, Vec<ModeInfo>) {
        let only_active = flags.contains(QueryFlags::ONLY_ACTIVE_PATHS);
        let mut paths = Vec::new();
        let mut modes = Vec::new();

        for monitor in self.connected() {
            if only_active && !monitor.enabled {
                continue;
            }
            let mut path = PathInfo {
                source: PathSourceInfo {
                    adapter_id: SIM_ADAPTER,
                    id: monitor.source_id,
                    mode_index: None,
                },
                target: PathTargetInfo {
                    adapter_id: SIM_ADAPTER,
                    id: monitor.target_id,
                    mode_index: None,
                    rotation: monitor.mode.orientation,
                    refresh: Rational::from_hz(monitor.mode.resolution.refresh_hz),
                    target_available: true,
                },
                flags: PathFlags::empty(),
            };
            if monitor.enabled {
                let (width, height) = monitor.mode.desktop_size();
                path.flags = PathFlags::ACTIVE;
                path.source.mode_index = Some(modes.len() as u32);
                modes.push(ModeInfo::Source(SourceMode {
                    adapter_id: SIM_ADAPTER,
                    id: monitor.source_id,
                    width,
                    height,
                    pixel_format_bpp: path_const::DEFAULT_PIXEL_FORMAT_BPP,
                    position: monitor.mode.position,
                }));
                path.target.mode_index = Some(modes.len() as u32);
                let res = monitor.mode.resolution;
                modes.push(ModeInfo::Target(TargetMode::synthesize(
                    SIM_ADAPTER,
                    monitor.target_id,
                    res.width,
                    res.height,
                    res.refresh_hz,
                )));
            }
            paths.push(path);
        }

        if !only_active {
            for ghost in 0..self.behavior.ghost_paths {
                paths.push(PathInfo {
                    source: PathSourceInfo {
                        adapter_id: SIM_ADAPTER,
                        id: GHOST_SOURCE_BASE + ghost,
                        mode_index: None,
                    },
                    target: PathTargetInfo {
                        adapter_id: SIM_ADAPTER,
                        id: GHOST_TARGET_BASE + ghost,
                        ..PathTargetInfo::default()
                    },
                    flags: PathFlags::empty(),
                });
            }
        }

        (paths, modes)
    }

    fn mode_capacity(&self, flags: QueryFlags) -> usize {
        let active = self.connected().filter(|m| m.enabled).count();
        if self.behavior.tight_mode_buffer {
            active * 2
        } else {
            self.path_count(flags) * 2
        }
    }

    /// Check a supplied configuration the way a strict driver does
    fn check_supplied(&self, paths: &[PathInfo], modes: &[ModeInfo], flags: ApplyFlags) -> Status {
        if let Some(limit) = self.behavior.reject_paths_over {
            if paths.len() > limit {
                return status::INVALID_PARAMETER;
            }
        }

        let modes_waived =
            flags.contains(ApplyFlags::FORCE_MODE_ENUMERATION) && self.behavior.force_enumeration_enables;

        for path in paths.iter().filter(|p| p.is_active()) {
            let monitor = match self
                .connected()
                .find(|m| m.source_id == path.source.id && m.target_id == path.target.id)
            {
                Some(m) => m,
                None => return status::INVALID_PARAMETER,
            };

            let source = match path.source.mode_index {
                Some(i) => match modes.get(i as usize).and_then(ModeInfo::as_source) {
                    Some(mode) => Some(mode),
                    None => return status::INVALID_PARAMETER,
                },
                None => None,
            };
            if let Some(i) = path.target.mode_index {
                if modes.get(i as usize).and_then(ModeInfo::as_target).is_none() {
                    return status::INVALID_PARAMETER;
                }
            }

            if source.is_none() && self.behavior.require_modes_for_activation && !modes_waived {
                return status::INVALID_PARAMETER;
            }

            if let Some(source) = source {
                let resolution = resolution_from_path(path, source, modes, monitor.mode.resolution);
                if !flags.contains(ApplyFlags::ALLOW_CHANGES) && !monitor.supports(&resolution) {
                    return status::BAD_CONFIGURATION;
                }
            }
        }

        status::SUCCESS
    }

    /// Replace the live configuration with a supplied one
    fn commit_supplied(&mut self, paths: &[PathInfo], modes: &[ModeInfo]) {
        let ignored = self.behavior.ignore_activation.clone();
        for monitor in self.monitors.iter_mut().filter(|m| m.connected) {
            let path = paths
                .iter()
                .find(|p| p.source.id == monitor.source_id && p.target.id == monitor.target_id);

            match path {
                Some(path) if path.is_active() => {
                    if !monitor.enabled && ignored.contains(&monitor.target_id) {
                        debug!(target_id = monitor.target_id, "Activation acknowledged but ignored");
                        continue;
                    }
                    monitor.enabled = true;
                    if let Some(source) = path
                        .source
                        .mode_index
                        .and_then(|i| modes.get(i as usize))
                        .and_then(ModeInfo::as_source)
                    {
                        let resolution = resolution_from_path(path, source, modes, monitor.mode.resolution);
                        monitor.mode = DisplayMode::new(resolution, path.target.rotation, source.position);
                    }
                }
                _ => monitor.enabled = false,
            }
        }
    }

    /// Enable every connected monitor to the right of the current desktop
    fn extend_all(&mut self) {
        let mut next_x = self
            .connected()
            .filter(|m| m.enabled)
            .map(|m| m.mode.position.x + m.mode.desktop_size().0 as i32)
            .max()
            .unwrap_or(0);
        for monitor in self.monitors.iter_mut().filter(|m| m.connected && !m.enabled) {
            monitor.enabled = true;
            monitor.mode.position = Position::new(next_x, 0);
            next_x += monitor.mode.desktop_size().0 as i32;
        }
    }

    fn set_mode(&mut self, source_id: u32, mode: DisplayMode, primary: bool) {
        if primary {
            let shift = mode.position;
            for other in self.monitors.iter_mut().filter(|m| m.enabled && m.source_id != source_id) {
                other.mode.position = other.mode.position.offset(-shift.x, -shift.y);
            }
        }
        if let Some(monitor) = self.monitors.iter_mut().find(|m| m.source_id == source_id) {
            monitor.enabled = true;
            monitor.mode = if primary { mode.at(Position::ORIGIN) } else { mode };
        }
    }
}

fn resolution_from_path(path: &PathInfo, source: &SourceMode, modes: &[ModeInfo], fallback: Resolution) -> Resolution {
    let refresh = path
        .target
        .mode_index
        .and_then(|i| modes.get(i as usize))
        .and_then(ModeInfo::as_target)
        .map(|t| t.vsync.to_hz())
        .filter(|hz| *hz > 0)
        .unwrap_or_else(|| match path.target.refresh.to_hz() {
            0 => fallback.refresh_hz,
            hz => hz,
        });
    let (width, height) = if path.target.rotation.is_rotated() {
        (source.height, source.width)
    } else {
        (source.width, source.height)
    };
    Resolution::new(width, height, refresh)
}

// ============================================================================
// Service Implementations
// ============================================================================

impl DisplayEnumerator for SimulatedPlatform {
    fn list_displays(&self) -> Result<Vec<DisplayInfo>> {
        let state = self.state.lock();
        if state.behavior.enumeration_fails {
            return Err(TopologyError::internal("display enumeration unavailable"));
        }
        Ok(state
            .connected()
            .map(|m| DisplayInfo {
                id: m.id(),
                name: m.friendly_name.clone(),
                resolution: m.mode.resolution,
                position: m.mode.position,
                orientation: m.mode.orientation,
                is_primary: m.is_primary(),
                is_enabled: state
                    .behavior
                    .enumeration_override
                    .get(&m.source_id)
                    .copied()
                    .unwrap_or(m.enabled),
                modes: Some(m.supported.clone()),
            })
            .collect())
    }
}

impl HardwareInventory for SimulatedPlatform {
    fn list_monitors(&self) -> Result<Vec<MonitorRecord>> {
        let state = self.state.lock();
        if !state.behavior.inventory_available {
            return Err(TopologyError::internal("hardware inventory unavailable"));
        }
        Ok(state
            .connected()
            .map(|m| {
                let uid_token = if state.behavior.hide_uids {
                    String::new()
                } else {
                    format!("&UID{}", m.uid)
                };
                MonitorRecord {
                    instance_path: format!(r"DISPLAY\{}{}\5&1f2e3d4c&0{}_0", m.manufacturer, m.product, uid_token),
                    manufacturer_raw: RawBuffer::wide_padded(&m.manufacturer, WIDE_FIELD_LEN),
                    product_raw: RawBuffer::wide_padded(&m.product, WIDE_FIELD_LEN),
                    serial_raw: {
                        let mut bytes = m.serial.as_bytes().to_vec();
                        bytes.resize(WIDE_FIELD_LEN.max(bytes.len()), 0);
                        RawBuffer::Bytes(bytes)
                    },
                    friendly_name_raw: RawBuffer::wide_padded(&m.friendly_name, FRIENDLY_NAME_LEN),
                }
            })
            .collect())
    }
}

impl TopologyService for SimulatedPlatform {
    fn get_buffer_sizes(&self, flags: QueryFlags) -> std::result::Result<BufferSizes, Status> {
        self.record(PlatformCall::QuerySizes(flags));
        let state = self.state.lock();
        if let Some(code) = state.behavior.query_size_status {
            return Err(code);
        }
        Ok(BufferSizes {
            paths: state.path_count(flags),
            modes: state.mode_capacity(flags),
        })
    }

    fn query_config(
        &self,
        flags: QueryFlags,
        sizes: BufferSizes,
    ) -> std::result::Result<(Vec<PathInfo>, Vec<ModeInfo>), Status> {
        self.record(PlatformCall::QueryConfig(flags));
        let state = self.state.lock();
        if let Some(code) = state.behavior.query_status {
            return Err(code);
        }
        let (paths, modes) = state.build_config(flags);
        if paths.len() > sizes.paths || modes.len() > sizes.modes {
            return Err(status::INSUFFICIENT_BUFFER);
        }
        Ok((paths, modes))
    }

    fn apply_config(&self, paths: &[PathInfo], modes: &[ModeInfo], flags: ApplyFlags) -> Status {
        self.record(PlatformCall::ApplyConfig {
            flags,
            path_count: paths.len(),
            active_targets: paths.iter().filter(|p| p.is_active()).map(|p| p.target.id).collect(),
        });

        let mut state = self.state.lock();
        let dry_run = flags.contains(ApplyFlags::VALIDATE) && !flags.is_destructive();

        if !flags.contains(ApplyFlags::USE_SUPPLIED_DISPLAY_CONFIG) {
            if dry_run {
                return state.behavior.dry_run_status;
            }
            if let Some(code) = state.behavior.apply_script.pop_front() {
                if code != status::SUCCESS {
                    return code;
                }
            }
            if flags.contains(ApplyFlags::TOPOLOGY_EXTEND) && state.behavior.extend_enables_all {
                state.extend_all();
            }
            return status::SUCCESS;
        }

        let checked = state.check_supplied(paths, modes, flags);
        if dry_run {
            return if checked == status::SUCCESS {
                state.behavior.dry_run_status
            } else {
                checked
            };
        }
        if let Some(code) = state.behavior.apply_script.pop_front() {
            if code != status::SUCCESS {
                return code;
            }
        }
        if checked != status::SUCCESS {
            return checked;
        }

        state.commit_supplied(paths, modes);
        status::SUCCESS
    }
}

impl LegacyModeService for SimulatedPlatform {
    fn enum_settings(&self, device: &DisplayId, index: u32) -> Option<DisplayMode> {
        let mut state = self.state.lock();
        let monitor = state.by_device(device)?;
        monitor
            .supported
            .get(index as usize)
            .map(|res| DisplayMode::new(*res, Orientation::Landscape, monitor.mode.position))
    }

    fn current_mode(&self, device: &DisplayId) -> Option<DisplayMode> {
        let mut state = self.state.lock();
        state.by_device(device).filter(|m| m.enabled).map(|m| m.mode)
    }

    fn device_state(&self, device: &DisplayId) -> Option<DeviceState> {
        let mut state = self.state.lock();
        let forced = state.behavior.attached_override.clone();
        let monitor = state.by_device(device)?;
        Some(DeviceState {
            attached: forced.get(&monitor.source_id).copied().unwrap_or(monitor.enabled),
            primary: monitor.is_primary(),
        })
    }

    fn test_mode(&self, device: &DisplayId, mode: &DisplayMode) -> LegacyStatus {
        self.record(PlatformCall::TestMode(device.clone()));
        let mut state = self.state.lock();
        if let Some(code) = state.behavior.legacy_status_override {
            return code;
        }
        match state.by_device(device) {
            None => legacy_status::BAD_PARAM,
            Some(m) if !m.supports(&mode.resolution) => legacy_status::BAD_MODE,
            Some(_) => legacy_status::SUCCESSFUL,
        }
    }

    fn apply_mode(&self, device: &DisplayId, mode: &DisplayMode, flags: ModeChangeFlags) -> LegacyStatus {
        self.record(PlatformCall::ApplyMode {
            device: device.clone(),
            mode: *mode,
            flags,
        });
        let mut state = self.state.lock();
        if let Some(code) = state.behavior.legacy_status_override {
            return code;
        }
        let attach = state.behavior.legacy_attach;
        let (source_id, enabled) = match state.by_device(device) {
            None => return legacy_status::BAD_PARAM,
            Some(m) if !m.supports(&mode.resolution) => return legacy_status::BAD_MODE,
            Some(m) => (m.source_id, m.enabled),
        };
        let primary = flags.contains(ModeChangeFlags::SET_PRIMARY);

        if flags.contains(ModeChangeFlags::NO_RESET) {
            state.pending.push((source_id, PendingChange::Mode(*mode, primary)));
            return legacy_status::SUCCESSFUL;
        }
        if !enabled && attach != LegacyAttach::Direct {
            return legacy_status::FAILED;
        }
        state.set_mode(source_id, *mode, primary);
        legacy_status::SUCCESSFUL
    }

    fn detach(&self, device: &DisplayId, flags: ModeChangeFlags) -> LegacyStatus {
        self.record(PlatformCall::Detach(device.clone()));
        let mut state = self.state.lock();
        if let Some(code) = state.behavior.legacy_status_override {
            return code;
        }
        let source_id = match state.by_device(device) {
            None => return legacy_status::BAD_PARAM,
            Some(m) => m.source_id,
        };
        if flags.contains(ModeChangeFlags::NO_RESET) {
            state.pending.push((source_id, PendingChange::Detach));
        } else if let Some(m) = state.monitors.iter_mut().find(|m| m.source_id == source_id) {
            m.enabled = false;
        }
        legacy_status::SUCCESSFUL
    }

    fn commit_pending(&self) -> LegacyStatus {
        self.record(PlatformCall::CommitPending);
        let mut state = self.state.lock();
        if let Some(code) = state.behavior.legacy_status_override {
            return code;
        }
        let pending = std::mem::take(&mut state.pending);
        let attach = state.behavior.legacy_attach;
        for (source_id, change) in pending {
            match change {
                PendingChange::Mode(mode, primary) => {
                    let enabled = state
                        .monitors
                        .iter()
                        .any(|m| m.source_id == source_id && m.enabled);
                    if enabled || attach != LegacyAttach::Never {
                        state.set_mode(source_id, mode, primary);
                    }
                }
                PendingChange::Detach => {
                    if let Some(m) = state.monitors.iter_mut().find(|m| m.source_id == source_id) {
                        m.enabled = false;
                    }
                }
            }
        }
        legacy_status::SUCCESSFUL
    }
}

impl LayoutTool for SimulatedPlatform {
    fn run(&self, args: &[String], _timeout: Duration) -> Result<i32> {
        self.record(PlatformCall::LayoutTool(args.to_vec()));
        let mut state = self.state.lock();
        if state.behavior.layout_tool_enables && args.iter().any(|a| a == "/extend") {
            state.extend_all();
        }
        Ok(state.behavior.layout_tool_exit_code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn desk() -> SimulatedPlatform {
        SimulatedPlatform::new(vec![
            SimMonitor::new(0, 4353, Resolution::new(1920, 1080, 60)),
            SimMonitor::new(1, 4354, Resolution::new(2560, 1440, 144)).at(1920, 0),
            SimMonitor::new(2, 4355, Resolution::new(1920, 1080, 60)).disabled(),
        ])
    }

    #[test]
    fn test_query_scopes() {
        let sim = desk();
        sim.configure(|b| b.ghost_paths = 2);

        let all = sim.get_buffer_sizes(QueryFlags::ALL_PATHS).unwrap();
        let (paths, modes) = sim.query_config(QueryFlags::ALL_PATHS, all).unwrap();
        assert_eq!(paths.len(), 5);
        assert_eq!(modes.len(), 4);
        assert!(paths[2].source.mode_index.is_none());
        assert!(!paths[3].target.target_available);

        let active = sim.get_buffer_sizes(QueryFlags::ONLY_ACTIVE_PATHS).unwrap();
        let (paths, _) = sim.query_config(QueryFlags::ONLY_ACTIVE_PATHS, active).unwrap();
        assert_eq!(paths.len(), 2);
        assert!(paths.iter().all(|p| p.is_active()));
    }

    #[test]
    fn test_supplied_apply_replaces_configuration() {
        let sim = desk();
        let sizes = sim.get_buffer_sizes(QueryFlags::ONLY_ACTIVE_PATHS).unwrap();
        let (paths, modes) = sim.query_config(QueryFlags::ONLY_ACTIVE_PATHS, sizes).unwrap();

        // Omitting the second display from the supplied set disables it
        let code = sim.apply_config(&paths[..1], &modes, ApplyFlags::supplied());
        assert_eq!(code, status::SUCCESS);
        assert!(!sim.monitor(&DisplayId::from_source_id(1)).unwrap().enabled);
        assert!(sim.monitor(&DisplayId::from_source_id(0)).unwrap().enabled);
    }

    #[test]
    fn test_dry_run_does_not_mutate() {
        let sim = desk();
        let sizes = sim.get_buffer_sizes(QueryFlags::ONLY_ACTIVE_PATHS).unwrap();
        let (paths, modes) = sim.query_config(QueryFlags::ONLY_ACTIVE_PATHS, sizes).unwrap();
        let code = sim.apply_config(&paths[..1], &modes, ApplyFlags::supplied().as_dry_run());
        assert_eq!(code, status::SUCCESS);
        assert!(sim.monitor(&DisplayId::from_source_id(1)).unwrap().enabled);
    }

    #[test]
    fn test_strict_driver_rejects_activation_without_modes() {
        let sim = desk();
        sim.configure(|b| b.require_modes_for_activation = true);
        let sizes = sim.get_buffer_sizes(QueryFlags::ALL_PATHS).unwrap();
        let (mut paths, modes) = sim.query_config(QueryFlags::ALL_PATHS, sizes).unwrap();
        paths[2] = paths[2].with_active(true);
        assert_eq!(
            sim.apply_config(&paths, &modes, ApplyFlags::supplied()),
            status::INVALID_PARAMETER
        );
    }

    #[test]
    fn test_inventory_instance_paths_carry_uid() {
        let sim = desk();
        let records = sim.list_monitors().unwrap();
        assert_eq!(records.len(), 3);
        assert!(records[0].instance_path.contains("UID4353"));

        sim.configure(|b| b.hide_uids = true);
        assert!(!sim.list_monitors().unwrap()[0].instance_path.contains("UID"));
    }

    #[test]
    fn test_staged_legacy_changes_wait_for_commit() {
        let sim = desk();
        let id = DisplayId::from_source_id(1);
        assert_eq!(sim.detach(&id, ModeChangeFlags::NO_RESET), legacy_status::SUCCESSFUL);
        assert!(sim.monitor(&id).unwrap().enabled);
        sim.commit_pending();
        assert!(!sim.monitor(&id).unwrap().enabled);
    }

    #[test]
    fn test_set_primary_shifts_desktop() {
        let sim = desk();
        let id = DisplayId::from_source_id(1);
        let mode = sim.current_mode(&id).unwrap();
        let code = sim.apply_mode(&id, &mode, ModeChangeFlags::SET_PRIMARY | ModeChangeFlags::UPDATE_REGISTRY);
        assert_eq!(code, legacy_status::SUCCESSFUL);
        assert!(sim.monitor(&id).unwrap().mode.position.is_origin());
        assert_eq!(
            sim.monitor(&DisplayId::from_source_id(0)).unwrap().mode.position,
            Position::new(-1920, 0)
        );
    }
}
