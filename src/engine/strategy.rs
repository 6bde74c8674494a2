//! Strategy Executor
//!
//! Enabling a display is a state machine over an ordered list of techniques:
//!
//! ```text
//! NotAttempted -> Trying(s) -> Validating(s) -> Enabled
//!                     |              |
//!                     +--------------+--> Trying(next) ... -> Failed
//! ```
//!
//! Every strategy runs in order until one is validated. None is skipped on a
//! guess about whether it will work, since which technique a driver accepts
//! differs from driver to driver. Disable is a single deactivation with a
//! legacy fallback.

use std::fmt;
use std::thread;

use tracing::{debug, info, warn};

use super::paths::{find_path_strict, populate_modes, PathSelection};
use super::{check_legacy, EngineContext, PathModeBuilder, StateValidator};
use crate::data::{oriented_size, DisplayId, DisplayMode, Orientation, Position, ValidationResult};
use crate::error::{Result, TopologyError};
use crate::identity::IdentityMap;
use crate::platform::{ApplyFlags, ModeChangeFlags};

// ============================================================================
// Strategies
// ============================================================================

/// One technique for bringing a display up
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StrategyKind {
    /// Mark the inactive path active and apply active paths plus it
    FilteredActivate,
    /// Same, after filling the path's empty mode slots
    PopulateAndActivate,
    /// Active paths plus the target only, with a compacted mode array
    MinimalPathSet,
    /// Every known path, no mode adjustments allowed
    UnfilteredExact,
    /// Generic "extend" topology request without explicit paths
    TopologyExtend,
    /// Restore the last-known mode through the legacy primitive
    LegacyRestore,
    /// Stage the last-known mode, then force a global reset
    LegacyRestoreWithReset,
    /// Activate without modes and let the driver re-enumerate them
    ForceModeEnumeration,
    /// Run the external layout-switch tool
    ExternalTool,
}

impl StrategyKind {
    /// Standard execution order
    pub const ALL: [StrategyKind; 9] = [
        Self::FilteredActivate,
        Self::PopulateAndActivate,
        Self::MinimalPathSet,
        Self::UnfilteredExact,
        Self::TopologyExtend,
        Self::LegacyRestore,
        Self::LegacyRestoreWithReset,
        Self::ForceModeEnumeration,
        Self::ExternalTool,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::FilteredActivate => "filtered_activate",
            Self::PopulateAndActivate => "populate_and_activate",
            Self::MinimalPathSet => "minimal_path_set",
            Self::UnfilteredExact => "unfiltered_exact",
            Self::TopologyExtend => "topology_extend",
            Self::LegacyRestore => "legacy_restore",
            Self::LegacyRestoreWithReset => "legacy_restore_with_reset",
            Self::ForceModeEnumeration => "force_mode_enumeration",
            Self::ExternalTool => "external_tool",
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Inputs of an enable attempt
#[derive(Clone, Copy)]
pub struct EnableContext<'a> {
    pub engine: EngineContext<'a>,
    /// Identities from the latest detection pass
    pub identities: &'a IdentityMap,
    pub display: &'a DisplayId,
    /// Mode the caller wants once the display is up, if known
    pub requested: Option<DisplayMode>,
}

impl<'a> EnableContext<'a> {
    pub fn new(engine: EngineContext<'a>, identities: &'a IdentityMap, display: &'a DisplayId) -> Self {
        Self {
            engine,
            identities,
            display,
            requested: None,
        }
    }

    pub fn with_requested(self, mode: DisplayMode) -> Self {
        Self {
            requested: Some(mode),
            ..self
        }
    }

    fn builder(&self) -> PathModeBuilder<'a> {
        self.engine.builder()
    }

    fn validator(&self) -> StateValidator<'_> {
        self.engine.validator(self.identities)
    }

    /// Mode used to activate the display: requested, remembered, current,
    /// or the fallback mode to the right of the desktop
    pub fn activation_mode(&self) -> DisplayMode {
        if let Some(mode) = self.requested {
            return mode;
        }
        if let Some(mode) = self.engine.modes.lookup(self.display, self.identities) {
            return mode;
        }
        if let Some(mode) = self.engine.services.legacy.current_mode(self.display) {
            return mode;
        }

        let right_edge = self
            .engine
            .services
            .displays
            .list_displays()
            .map(|displays| {
                displays
                    .iter()
                    .filter(|d| d.is_enabled)
                    .map(|d| d.position.x + oriented_size(&d.resolution, d.orientation).0 as i32)
                    .max()
                    .unwrap_or(0)
            })
            .unwrap_or(0);

        DisplayMode::new(
            self.engine.settings.strategies.fallback_mode,
            Orientation::Landscape,
            Position::new(right_edge, 0),
        )
    }

    /// Remembered mode for the legacy restore strategies
    fn restore_mode(&self) -> DisplayMode {
        self.engine
            .modes
            .lookup(self.display, self.identities)
            .unwrap_or_else(|| self.activation_mode())
    }
}

/// A technique the executor can try
pub trait EnableStrategy {
    fn kind(&self) -> StrategyKind;

    /// Issue the platform calls; success means the calls were accepted,
    /// not that the display is up
    fn attempt(&self, ctx: &EnableContext<'_>) -> Result<()>;
}

impl EnableStrategy for StrategyKind {
    fn kind(&self) -> StrategyKind {
        *self
    }

    fn attempt(&self, ctx: &EnableContext<'_>) -> Result<()> {
        match self {
            Self::FilteredActivate => activate_path(ctx, false, ApplyFlags::supplied(), PathSelection::ActivePlus),
            Self::PopulateAndActivate => activate_path(ctx, true, ApplyFlags::supplied(), PathSelection::ActivePlus),
            Self::MinimalPathSet => activate_path(ctx, true, ApplyFlags::supplied(), PathSelection::Minimal),
            Self::UnfilteredExact => activate_path(ctx, true, ApplyFlags::supplied_exact(), |_| PathSelection::All),
            Self::TopologyExtend => {
                ctx.builder()
                    .apply(&[], &[], ApplyFlags::TOPOLOGY_EXTEND | ApplyFlags::APPLY, PathSelection::All)
            }
            Self::LegacyRestore => {
                let mode = ctx.restore_mode();
                let legacy = ctx.engine.services.legacy;
                check_legacy(legacy.apply_mode(ctx.display, &mode, ModeChangeFlags::UPDATE_REGISTRY))
            }
            Self::LegacyRestoreWithReset => {
                let mode = ctx.restore_mode();
                let legacy = ctx.engine.services.legacy;
                check_legacy(legacy.apply_mode(
                    ctx.display,
                    &mode,
                    ModeChangeFlags::UPDATE_REGISTRY | ModeChangeFlags::NO_RESET,
                ))?;
                check_legacy(legacy.commit_pending())
            }
            Self::ForceModeEnumeration => activate_path(
                ctx,
                false,
                ApplyFlags::supplied() | ApplyFlags::FORCE_MODE_ENUMERATION,
                PathSelection::ActivePlus,
            ),
            Self::ExternalTool => run_layout_tool(ctx),
        }
    }
}

/// Query every path, mark the display's path active and apply
fn activate_path(
    ctx: &EnableContext<'_>,
    populate: bool,
    flags: ApplyFlags,
    selection: fn(usize) -> PathSelection,
) -> Result<()> {
    let builder = ctx.builder();
    let (mut paths, mut modes) = builder.query_paths(true)?;
    let found = find_path_strict(ctx.display, &paths, ctx.identities)?;

    if populate {
        populate_modes(&mut paths, &mut modes, found.index, &ctx.activation_mode())?;
    }
    paths[found.index] = paths[found.index].with_active(true);

    builder.apply(&paths, &modes, flags, selection(found.index))
}

fn run_layout_tool(ctx: &EnableContext<'_>) -> Result<()> {
    let strategies = &ctx.engine.settings.strategies;
    let code = ctx
        .engine
        .services
        .layout_tool
        .run(&strategies.layout_tool_args, strategies.layout_tool_timeout())?;
    if code != 0 {
        return Err(TopologyError::ExternalToolFailed(format!(
            "{} exited with code {}",
            strategies.layout_tool, code
        )));
    }
    // The tool returns before the desktop has settled
    thread::sleep(strategies.settle_delay());
    Ok(())
}

// ============================================================================
// Executor
// ============================================================================

/// State of the enable state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnableState {
    NotAttempted,
    Trying(StrategyKind),
    Validating(StrategyKind),
    Enabled,
    Failed,
}

/// How one strategy attempt ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    Enabled,
    /// The platform rejected the calls
    CallFailed(String),
    /// The calls were accepted but the display never came up
    NotValidated(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StrategyAttempt {
    pub kind: StrategyKind,
    pub outcome: AttemptOutcome,
}

/// Diagnostics of one enable run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnableReport {
    pub display: DisplayId,
    /// Strategy that brought the display up; `None` when it already was
    pub strategy: Option<StrategyKind>,
    pub attempts: Vec<StrategyAttempt>,
    pub trace: Vec<EnableState>,
    pub validation: Option<ValidationResult>,
}

impl EnableReport {
    pub fn already_enabled(&self) -> bool {
        self.strategy.is_none()
    }
}

/// Runs enable strategies in order until one is validated
pub struct StrategyExecutor {
    strategies: Vec<Box<dyn EnableStrategy>>,
}

impl Default for StrategyExecutor {
    fn default() -> Self {
        Self::standard()
    }
}

impl StrategyExecutor {
    /// All nine strategies in their standard order
    pub fn standard() -> Self {
        Self::with_strategies(
            StrategyKind::ALL
                .into_iter()
                .map(|kind| Box::new(kind) as Box<dyn EnableStrategy>)
                .collect(),
        )
    }

    pub fn with_strategies(strategies: Vec<Box<dyn EnableStrategy>>) -> Self {
        Self { strategies }
    }

    pub fn kinds(&self) -> Vec<StrategyKind> {
        self.strategies.iter().map(|s| s.kind()).collect()
    }

    /// Bring a display up
    ///
    /// A display that is already enabled returns immediately with no attempts.
    /// Otherwise every strategy failure is recoverable and only exhaustion
    /// returns `StrategyExhausted` carrying the last error.
    pub fn enable(&self, ctx: &EnableContext<'_>) -> Result<EnableReport> {
        let display = ctx.display;
        let validator = ctx.validator();
        let max_attempts = ctx.engine.settings.validation.max_attempts;

        let mut report = EnableReport {
            display: display.clone(),
            strategy: None,
            attempts: Vec::new(),
            trace: vec![EnableState::NotAttempted],
            validation: None,
        };

        if validator.current_state(display) == Some(true) {
            { let display_id = &display; debug!(display = %display_id, "Display already enabled") };
            report.trace.push(EnableState::Enabled);
            return Ok(report);
        }

        let mut last_error = None;
        for strategy in &self.strategies {
            let kind = strategy.kind();
            report.trace.push(EnableState::Trying(kind));
            { let display_id = &display; info!(display = %display_id, strategy = %kind, "Trying enable strategy") };

            if let Err(e) = strategy.attempt(ctx) {
                { let display_id = &display; warn!(display = %display_id, strategy = %kind, error = %e, "Enable strategy failed") };
                report.attempts.push(StrategyAttempt {
                    kind,
                    outcome: AttemptOutcome::CallFailed(e.to_string()),
                });
                last_error = Some(e);
                continue;
            }

            report.trace.push(EnableState::Validating(kind));
            match validator.validate(display, true, max_attempts) {
                Ok(validation) => {
                    { let display_id = &display; info!(
                        display = %display_id,
                        strategy = %kind,
                        attempts = report.attempts.len() + 1,
                        "Display enabled"
                    ) };
                    report.attempts.push(StrategyAttempt {
                        kind,
                        outcome: AttemptOutcome::Enabled,
                    });
                    report.trace.push(EnableState::Enabled);
                    report.strategy = Some(kind);
                    report.validation = Some(validation);
                    return Ok(report);
                }
                Err(e) => {
                    { let display_id = &display; warn!(display = %display_id, strategy = %kind, error = %e, "Strategy accepted but display not enabled") };
                    report.attempts.push(StrategyAttempt {
                        kind,
                        outcome: AttemptOutcome::NotValidated(e.to_string()),
                    });
                    last_error = Some(e);
                }
            }
        }

        report.trace.push(EnableState::Failed);
        { let display_id = &display; warn!(display = %display_id, attempts = report.attempts.len(), "All enable strategies exhausted") };
        Err(TopologyError::StrategyExhausted {
            display: display.to_string(),
            attempts: report.attempts.len(),
            last_error: Box::new(
                last_error.unwrap_or_else(|| TopologyError::internal("no enable strategies configured")),
            ),
        })
    }
}

// ============================================================================
// Disable
// ============================================================================

/// How a display ended up disabled
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisableOutcome {
    /// Path deactivated through the topology protocol
    Deactivated,
    /// Detached through the legacy primitive
    LegacyDetached,
    /// The path was already inactive; nothing was sent
    AlreadyDisabled,
    /// Every call failed; reported as disabled anyway
    AssumedDisabled { reason: String },
}

/// Turn a display off, best effort
///
/// The current mode is remembered first so a later enable can restore it.
/// Failures never surface: a display that cannot be turned off is
/// indistinguishable from one that already is.
pub fn disable_display(engine: EngineContext<'_>, identities: &IdentityMap, display: &DisplayId) -> DisableOutcome {
    if let Some(mode) = engine.services.legacy.current_mode(display) {
        engine.modes.remember(display, identities, mode);
    }

    let builder = engine.builder();
    let deactivated = builder.query_paths(true).and_then(|(mut paths, modes)| {
        let found = find_path_strict(display, &paths, identities)?;
        if !paths[found.index].is_active() {
            return Ok(false);
        }
        paths[found.index] = paths[found.index].with_active(false);
        builder.apply(&paths, &modes, ApplyFlags::supplied(), PathSelection::Auto(found.index))?;
        Ok(true)
    });

    let error = match deactivated {
        Ok(true) => {
            { let display_id = &display; info!(display = %display_id, "Display deactivated") };
            return DisableOutcome::Deactivated;
        }
        Ok(false) => {
            { let display_id = &display; debug!(display = %display_id, "Display path already inactive") };
            return DisableOutcome::AlreadyDisabled;
        }
        Err(e) => e,
    };

    { let display_id = &display; debug!(display = %display_id, error = %error, "Deactivation failed, detaching through legacy primitive") };
    let legacy = engine.services.legacy;
    let detached = check_legacy(legacy.detach(display, ModeChangeFlags::UPDATE_REGISTRY | ModeChangeFlags::NO_RESET))
        .and_then(|_| check_legacy(legacy.commit_pending()));

    match detached {
        Ok(()) => {
            { let display_id = &display; info!(display = %display_id, "Display detached") };
            DisableOutcome::LegacyDetached
        }
        Err(legacy_error) => {
            let reason = format!("{}; legacy detach: {}", error, legacy_error);
            { let display_id = &display; warn!(display = %display_id, reason = %reason, "Disable failed, assuming display is off") };
            DisableOutcome::AssumedDisabled { reason }
        }
    }
}
