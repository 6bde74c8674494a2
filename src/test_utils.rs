/*
 * Test utilities and fixtures for displaytopo
 *
 * Common simulated desktops, settings without delays, and entry builders
 * shared by the unit test modules.
 */

use crate::data::{DisplayId, DisplayTopologyEntry, Position, Resolution};
use crate::settings::EngineSettings;
use crate::platform::{SimMonitor, SimulatedPlatform};

pub const FHD: Resolution = Resolution::new(1920, 1080, 60);
pub const QHD: Resolution = Resolution::new(2560, 1440, 144);

/// Settings with every sleep removed and a short validation budget
pub fn fast_settings() -> EngineSettings {
    let mut settings = EngineSettings::default();
    settings.validation.max_attempts = 2;
    settings.validation.base_delay_ms = 0;
    settings.validation.max_delay_ms = 0;
    settings.strategies.settle_delay_ms = 0;
    settings.preview.hold_secs = 0;
    settings
}

/// Three monitors: DISPLAY1 primary, DISPLAY2 to its right, DISPLAY3 disabled
pub fn create_desk() -> SimulatedPlatform {
    SimulatedPlatform::new(vec![
        SimMonitor::new(0, 4353, FHD).with_name("DELL U2720Q"),
        SimMonitor::new(1, 4354, QHD).at(1920, 0).with_name("LG 27GN950"),
        SimMonitor::new(2, 4355, FHD).at(4480, 0).disabled().with_name("BenQ GW2480"),
    ])
}

pub fn display(source_id: u32) -> DisplayId {
    DisplayId::from_source_id(source_id)
}

/// Enabled entry for a display at the given position
pub fn create_entry(source_id: u32, resolution: Resolution, x: i32, y: i32) -> DisplayTopologyEntry {
    DisplayTopologyEntry::new(display(source_id), resolution, Position::new(x, y))
}
