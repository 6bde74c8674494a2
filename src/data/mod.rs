//! Data types, presets, and validation modules
//!
//! Contains the value types shared by every engine layer.

mod topology;
mod types;
mod validation;

pub use topology::{compute_content_hash, Topology};
pub use types::{
    oriented_size, Correlation, DisplayId, DisplayIdentity, DisplayInfo, DisplayMode,
    DisplayTopologyEntry, Orientation, Position, Resolution, ValidationResult,
};
pub use validation::{span_in_bounds, validate_entries, validate_position};
