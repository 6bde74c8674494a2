//! Unified error handling for displaytopo
//!
//! This crate provides the single error type returned by every layer of the
//! topology engine. Platform status codes are decoded into one variant per
//! status-code family so callers can match on intent instead of raw numbers.

use std::fmt;
use std::io;

/// Result type alias using TopologyError
pub type Result<T> = std::result::Result<T, TopologyError>;

/// Decoded reason for a rejected mode or topology apply
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// The requested mode is not supported by the device
    BadMode,
    /// A parameter (or the supplied path/mode arrays) was invalid
    BadParam,
    /// The flag combination was invalid
    BadFlags,
    /// The display driver failed the request
    DriverFailure,
    /// The change only takes effect after a restart
    NeedsRestart,
    /// The change conflicts with a DualView configuration
    DualViewConflict,
    /// The settings could not be written to the registry
    NotUpdated,
    /// Unrecognized status code
    Unknown,
}

impl RejectReason {
    /// Decode a legacy per-device mode-change status (DISP_CHANGE_* family)
    pub fn from_legacy_status(code: i32) -> Self {
        match code {
            1 => Self::NeedsRestart,
            -1 => Self::DriverFailure,
            -2 => Self::BadMode,
            -3 => Self::NotUpdated,
            -4 => Self::BadFlags,
            -5 => Self::BadParam,
            -6 => Self::DualViewConflict,
            _ => Self::Unknown,
        }
    }

    /// Decode a topology-apply status (Win32 error family)
    pub fn from_config_status(status: u32) -> Self {
        match status {
            87 => Self::BadParam,
            50 | 1610 => Self::BadMode,
            31 => Self::DriverFailure,
            5 => Self::DriverFailure,
            _ => Self::Unknown,
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::BadMode => "mode not supported",
            Self::BadParam => "invalid parameter",
            Self::BadFlags => "invalid flags",
            Self::DriverFailure => "driver failure",
            Self::NeedsRestart => "restart required",
            Self::DualViewConflict => "dual-view conflict",
            Self::NotUpdated => "settings not saved",
            Self::Unknown => "unknown failure",
        };
        f.write_str(text)
    }
}

/// Unified error type for all topology operations
#[derive(thiserror::Error, Debug)]
pub enum TopologyError {
    // ============================================================================
    // Platform Query Errors
    // ============================================================================
    #[error("Failed to query display config buffer sizes (status {status})")]
    QuerySizeFailed {
        status: u32,
    },

    #[error("Failed to query display config (status {status})")]
    QueryFailed {
        status: u32,
    },

    #[error("No platform path found for display {display}")]
    PathNotFound {
        display: String,
    },

    #[error("Display not found by any state signal: {0}")]
    DisplayNotFound(String),

    // ============================================================================
    // Apply Errors
    // ============================================================================
    #[error("Dry-run validation of display config failed (status {status})")]
    ValidationFailed {
        status: u32,
    },

    #[error("Apply rejected: {reason} (code {code})")]
    ApplyRejected {
        reason: RejectReason,
        code: i64,
    },

    #[error("Mode {requested} is not supported by {display}; closest: {}", .closest.join(", "))]
    ModeUnsupported {
        display: String,
        requested: String,
        closest: Vec<String>,
    },

    #[error("No free mode slots available to activate {display}")]
    NoFreeModeSlots {
        display: String,
    },

    // ============================================================================
    // State Machine Errors
    // ============================================================================
    #[error("Display {display} did not reach expected state after {attempts} attempts (last observed: {observed:?})")]
    ValidationTimeout {
        display: String,
        attempts: u32,
        observed: Option<bool>,
    },

    #[error("All {attempts} enable strategies failed for {display}: {last_error}")]
    StrategyExhausted {
        display: String,
        attempts: usize,
        last_error: Box<TopologyError>,
    },

    #[error("External layout tool failed: {0}")]
    ExternalToolFailed(String),

    // ============================================================================
    // Topology and Configuration Errors
    // ============================================================================
    #[error("Invalid topology: {0}")]
    InvalidTopology(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to parse JSON: {0}")]
    JsonParse(#[from] serde_json::Error),

    // ============================================================================
    // Generic Errors
    // ============================================================================
    #[error("Internal error: {0}")]
    Internal(String),
}

impl TopologyError {
    /// Create an apply-rejected error from a legacy mode-change status
    pub fn legacy_rejected(code: i32) -> Self {
        Self::ApplyRejected {
            reason: RejectReason::from_legacy_status(code),
            code: code as i64,
        }
    }

    /// Create an apply-rejected error from a topology-apply status
    pub fn config_rejected(status: u32) -> Self {
        Self::ApplyRejected {
            reason: RejectReason::from_config_status(status),
            code: status as i64,
        }
    }

    /// Create a path-not-found error
    pub fn path_not_found(display: impl Into<String>) -> Self {
        Self::PathNotFound {
            display: display.into(),
        }
    }

    /// Create an invalid-topology error from a string
    pub fn invalid_topology(msg: impl Into<String>) -> Self {
        Self::InvalidTopology(msg.into())
    }

    /// Create a config error from a string
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an internal error from a string
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Whether the error came from the platform rejecting a request, as
    /// opposed to the engine failing to find or observe something
    pub fn is_platform_rejection(&self) -> bool {
        matches!(
            self,
            Self::ApplyRejected { .. } | Self::ValidationFailed { .. } | Self::QueryFailed { .. } | Self::QuerySizeFailed { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_legacy_status_decoding() {
        assert_eq!(RejectReason::from_legacy_status(-2), RejectReason::BadMode);
        assert_eq!(RejectReason::from_legacy_status(-5), RejectReason::BadParam);
        assert_eq!(RejectReason::from_legacy_status(-4), RejectReason::BadFlags);
        assert_eq!(RejectReason::from_legacy_status(-1), RejectReason::DriverFailure);
        assert_eq!(RejectReason::from_legacy_status(1), RejectReason::NeedsRestart);
        assert_eq!(RejectReason::from_legacy_status(-6), RejectReason::DualViewConflict);
        assert_eq!(RejectReason::from_legacy_status(42), RejectReason::Unknown);
    }

    #[test]
    fn test_config_status_decoding() {
        assert_eq!(RejectReason::from_config_status(87), RejectReason::BadParam);
        assert_eq!(RejectReason::from_config_status(1610), RejectReason::BadMode);
        assert_eq!(RejectReason::from_config_status(31), RejectReason::DriverFailure);
        assert_eq!(RejectReason::from_config_status(9999), RejectReason::Unknown);
    }

    #[test]
    fn test_error_messages() {
        let err = TopologyError::legacy_rejected(-2);
        assert_eq!(err.to_string(), "Apply rejected: mode not supported (code -2)");

        let err = TopologyError::ModeUnsupported {
            display: "\\\\.\\DISPLAY2".to_string(),
            requested: "5120x1440@240".to_string(),
            closest: vec!["5120x1440@120".to_string(), "3840x1080@144".to_string()],
        };
        assert!(err.to_string().contains("closest: 5120x1440@120, 3840x1080@144"));

        let err = TopologyError::StrategyExhausted {
            display: "\\\\.\\DISPLAY3".to_string(),
            attempts: 9,
            last_error: Box::new(TopologyError::ExternalToolFailed("exit code 1".to_string())),
        };
        assert!(err.to_string().contains("All 9 enable strategies failed"));
        assert!(err.to_string().contains("exit code 1"));
    }

    #[test]
    fn test_platform_rejection_classification() {
        assert!(TopologyError::config_rejected(87).is_platform_rejection());
        assert!(TopologyError::ValidationFailed { status: 87 }.is_platform_rejection());
        assert!(!TopologyError::path_not_found("x").is_platform_rejection());
    }
}
