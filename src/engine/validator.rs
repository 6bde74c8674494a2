//! State Validator
//!
//! Decides whether a display is enabled by combining three independent
//! signals, because any single one can lag or lie after a topology change:
//!
//! - the enumeration service's enabled flag
//! - the legacy device enumeration's attached flag
//! - the active flag of the display's path (with a monitor attached)
//!
//! Three signals: majority wins. Two: disagreement defers to enumeration.
//! One: trusted as is. None: the display is not found.

use std::thread;

use tracing::{debug, info, warn};

use super::paths::{find_path, query_paths};
use crate::data::{DisplayId, ValidationResult};
use crate::error::{Result, TopologyError};
use crate::identity::IdentityMap;
use crate::platform::PlatformServices;
use crate::settings::ValidationSettings;

/// One observation of the three state signals
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ConsensusSignals {
    pub enumeration: Option<bool>,
    pub attached: Option<bool>,
    pub path_active: Option<bool>,
}

impl ConsensusSignals {
    pub fn new(enumeration: Option<bool>, attached: Option<bool>, path_active: Option<bool>) -> Self {
        Self {
            enumeration,
            attached,
            path_active,
        }
    }

    /// Number of signals that answered
    pub fn present(&self) -> usize {
        [self.enumeration, self.attached, self.path_active]
            .iter()
            .filter(|s| s.is_some())
            .count()
    }

    /// Consensus verdict, `None` when no signal answered
    pub fn verdict(&self) -> Option<bool> {
        let signals: Vec<bool> = [self.enumeration, self.attached, self.path_active]
            .into_iter()
            .flatten()
            .collect();

        match signals.len() {
            0 => None,
            1 => Some(signals[0]),
            2 if signals[0] == signals[1] => Some(signals[0]),
            // Without enumeration, the attached flag decides
            2 => Some(self.enumeration.unwrap_or(signals[0])),
            _ => Some(signals.iter().filter(|&&s| s).count() >= 2),
        }
    }
}

/// Retries consensus observations until the expected state is seen
pub struct StateValidator<'a> {
    services: PlatformServices<'a>,
    settings: &'a ValidationSettings,
    identities: &'a IdentityMap,
}

impl<'a> StateValidator<'a> {
    pub fn new(services: PlatformServices<'a>, settings: &'a ValidationSettings, identities: &'a IdentityMap) -> Self {
        Self {
            services,
            settings,
            identities,
        }
    }

    /// Gather the three signals once; failures leave a signal absent
    pub fn observe(&self, display: &DisplayId) -> (ConsensusSignals, Option<String>) {
        let mut last_error = None;

        let enumeration = match self.services.displays.list_displays() {
            Ok(displays) => displays.iter().find(|d| &d.id == display).map(|d| d.is_enabled),
            Err(e) => {
                last_error = Some(e.to_string());
                None
            }
        };

        let attached = self.services.legacy.device_state(display).map(|s| s.attached);

        // Positional-only matches are too loose to count as an observation
        let path_active = match query_paths(self.services.topology, true) {
            Ok((paths, _)) => match find_path(display, &paths, self.identities) {
                Ok(m) if m.tier.is_exact() => Some(paths[m.index].is_live()),
                Ok(_) => None,
                Err(e) => {
                    last_error = Some(e.to_string());
                    None
                }
            },
            Err(e) => {
                last_error = Some(e.to_string());
                None
            }
        };

        let signals = ConsensusSignals::new(enumeration, attached, path_active);
        { let display_id = &display; debug!(display = %display_id, ?signals, "Observed display state signals") };
        (signals, last_error)
    }

    /// Current consensus state, `None` when nothing answers for the display
    pub fn current_state(&self, display: &DisplayId) -> Option<bool> {
        self.observe(display).0.verdict()
    }

    /// Wait for the display to reach `expected`, backing off between attempts
    pub fn validate(&self, display: &DisplayId, expected: bool, max_attempts: u32) -> Result<ValidationResult> {
        let max_attempts = max_attempts.max(1);
        let mut observed = None;

        for attempt in 1..=max_attempts {
            let (signals, last_error) = self.observe(display);
            match signals.verdict() {
                None => {
                    { let display_id = &display; warn!(display = %display_id, attempt, "Display not found by any state signal") };
                    return Err(TopologyError::DisplayNotFound(display.to_string()));
                }
                Some(state) if state == expected => {
                    { let display_id = &display; info!(display = %display_id, enabled = state, attempt, "Display state validated") };
                    return Ok(ValidationResult {
                        is_enabled: state,
                        is_responding: true,
                        attempts: attempt,
                        last_error,
                    });
                }
                Some(state) => {
                    observed = Some(state);
                    if attempt < max_attempts {
                        let delay = self.settings.backoff(attempt);
                        { let display_id = &display; debug!(
                            display = %display_id,
                            attempt,
                            delay_ms = delay.as_millis() as u64,
                            "State mismatch, retrying"
                        ) };
                        thread::sleep(delay);
                    }
                }
            }
        }

        { let display_id = &display; warn!(display = %display_id, expected, attempts = max_attempts, "State validation timed out") };
        Err(TopologyError::ValidationTimeout {
            display: display.to_string(),
            attempts: max_attempts,
            observed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Resolution;
    use crate::platform::{SimMonitor, SimulatedPlatform};

    fn fast_settings() -> ValidationSettings {
        ValidationSettings {
            max_attempts: 5,
            base_delay_ms: 0,
            max_delay_ms: 0,
        }
    }

    #[test]
    fn test_verdicts() {
        let v = |e, a, p| ConsensusSignals::new(e, a, p).verdict();
        assert_eq!(v(Some(true), Some(true), Some(false)), Some(true));
        assert_eq!(v(Some(false), Some(true), Some(false)), Some(false));
        assert_eq!(v(Some(true), Some(false), None), Some(true));
        assert_eq!(v(Some(false), None, Some(true)), Some(false));
        assert_eq!(v(None, Some(true), Some(true)), Some(true));
        assert_eq!(v(None, None, Some(false)), Some(false));
        assert_eq!(v(None, None, None), None);
    }

    #[test]
    fn test_majority_overrides_lagging_enumeration() {
        let sim = SimulatedPlatform::new(vec![SimMonitor::new(0, 4353, Resolution::new(1920, 1080, 60))]);
        sim.configure(|b| {
            b.enumeration_override.insert(0, false);
        });
        let ids = IdentityMap::default();
        let settings = fast_settings();
        let services = PlatformServices::new(&sim, &sim);
        let validator = StateValidator::new(services, &settings, &ids);

        let result = validator.validate(&DisplayId::from_source_id(0), true, 5).unwrap();
        assert!(result.is_enabled);
        assert_eq!(result.attempts, 1);
    }

    #[test]
    fn test_timeout_reports_observed_state() {
        let sim = SimulatedPlatform::new(vec![SimMonitor::new(0, 4353, Resolution::new(1920, 1080, 60)).disabled()]);
        let ids = IdentityMap::default();
        let settings = fast_settings();
        let validator = StateValidator::new(PlatformServices::new(&sim, &sim), &settings, &ids);

        let err = validator.validate(&DisplayId::from_source_id(0), true, 3).unwrap_err();
        match err {
            TopologyError::ValidationTimeout { attempts, observed, .. } => {
                assert_eq!(attempts, 3);
                assert_eq!(observed, Some(false));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_unknown_display_is_not_found() {
        let sim = SimulatedPlatform::new(vec![SimMonitor::new(0, 4353, Resolution::new(1920, 1080, 60))]);
        let ids = IdentityMap::default();
        let settings = fast_settings();
        let validator = StateValidator::new(PlatformServices::new(&sim, &sim), &settings, &ids);

        let err = validator.validate(&DisplayId::from_source_id(4), true, 5).unwrap_err();
        assert!(matches!(err, TopologyError::DisplayNotFound(_)));
    }
}
