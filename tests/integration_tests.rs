/*
 * Integration tests for displaytopo
 *
 * These tests drive the public surface against the simulated platform and
 * check the behavior of whole topology applies rather than single modules.
 */

use std::fs;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use displaytopo::engine::{
    find_path, query_paths, ConsensusSignals, EnableContext, EnableStrategy, EngineContext, PathTier,
    StateValidator, StrategyExecutor, StrategyKind,
};
use displaytopo::logger::{close_journal, open_journal};
use displaytopo::platform::PlatformCall;
use displaytopo::{
    load_settings, resolve, save_settings, DisableOutcome, DisplayId, DisplayManager, DisplayTopologyEntry,
    EngineSettings, ModeStore, PlatformServices, Position, Resolution, Result, SimMonitor, SimulatedPlatform,
    Topology, TopologyError,
};
use serial_test::serial;
use tempfile::TempDir;

const FHD: Resolution = Resolution::new(1920, 1080, 60);
const QHD: Resolution = Resolution::new(2560, 1440, 144);

// Test utilities
fn fast_settings() -> EngineSettings {
    let mut settings = EngineSettings::default();
    settings.validation.max_attempts = 2;
    settings.validation.base_delay_ms = 0;
    settings.validation.max_delay_ms = 0;
    settings.strategies.settle_delay_ms = 0;
    settings.preview.hold_secs = 0;
    settings
}

fn display(source_id: u32) -> DisplayId {
    DisplayId::from_source_id(source_id)
}

fn entry(source_id: u32, resolution: Resolution, x: i32, y: i32) -> DisplayTopologyEntry {
    DisplayTopologyEntry::new(display(source_id), resolution, Position::new(x, y))
}

fn manager(sim: &SimulatedPlatform) -> DisplayManager<SimulatedPlatform> {
    DisplayManager::new(sim.clone(), Box::new(sim.clone()), fast_settings())
}

fn position_of(sim: &SimulatedPlatform, source_id: u32) -> Position {
    sim.monitor(&display(source_id)).map(|m| m.mode.position).unwrap_or_default()
}

// ============================================================================
// End-to-end applies
// ============================================================================

#[test]
fn test_primary_at_origin_keeps_positions_and_only_disables_third() {
    let sim = SimulatedPlatform::new(vec![
        SimMonitor::new(0, 4353, FHD),
        SimMonitor::new(1, 4354, FHD).at(-1920, 0),
        SimMonitor::new(2, 4355, FHD).at(1920, 0),
    ]);
    let topology = Topology::new(
        "left extend",
        vec![
            entry(0, FHD, 0, 0).primary(),
            entry(1, FHD, -1920, 0),
            entry(2, FHD, 1920, 0).disabled(),
        ],
    );

    let report = manager(&sim).apply_preset(&topology).unwrap();

    assert_eq!(position_of(&sim, 0), Position::ORIGIN);
    assert_eq!(position_of(&sim, 1), Position::new(-1920, 0));
    assert!(!sim.monitor(&display(2)).unwrap().enabled);

    assert_eq!(report.disabled, vec![(display(2), DisableOutcome::Deactivated)]);
    assert_eq!(
        report.positions,
        vec![(display(0), Position::ORIGIN), (display(1), Position::new(-1920, 0))]
    );

    let calls = sim.calls();
    assert!(!calls.iter().any(|c| matches!(
        c,
        PlatformCall::ApplyMode { .. } | PlatformCall::Detach(_) | PlatformCall::LayoutTool(_)
    )));
    let last_batch = calls
        .iter()
        .rev()
        .find_map(|c| match c {
            PlatformCall::ApplyConfig { active_targets, .. } => Some(active_targets.clone()),
            _ => None,
        })
        .unwrap();
    assert_eq!(last_batch, vec![4353, 4354]);
}

#[test]
fn test_layout_is_re_anchored_on_primary() {
    let sim = SimulatedPlatform::new(vec![
        SimMonitor::new(0, 4353, FHD),
        SimMonitor::new(1, 4354, FHD).at(1920, 0),
    ]);
    let topology = Topology::new(
        "right primary",
        vec![entry(0, FHD, 100, 50), entry(1, FHD, 2000, 0).primary()],
    );

    let report = manager(&sim).apply_preset(&topology).unwrap();

    assert_eq!(report.primary, Some(display(1)));
    assert_eq!(position_of(&sim, 1), Position::ORIGIN);
    assert_eq!(position_of(&sim, 0), Position::new(-1900, 50));
    // The requested layout overlaps by 20 pixels; that is reported, not fixed
    assert_eq!(report.overlaps, vec![(display(0), display(1))]);
}

#[test]
fn test_applying_twice_is_idempotent() {
    let sim = SimulatedPlatform::new(vec![
        SimMonitor::new(0, 4353, FHD),
        SimMonitor::new(1, 4354, QHD).at(1920, 0),
        SimMonitor::new(2, 4355, FHD).at(4480, 0).disabled(),
    ]);
    let manager = manager(&sim);
    let topology = Topology::new(
        "triple",
        vec![
            entry(0, FHD, 0, 0).primary(),
            entry(1, QHD, -2560, -200),
            entry(2, FHD, 1920, 0),
        ],
    );

    manager.apply_preset(&topology).unwrap();
    let first = manager.capture_topology("first").unwrap();

    let second_report = manager.apply_preset(&topology).unwrap();
    let second = manager.capture_topology("second").unwrap();

    assert!(first.is_equivalent(&second));
    assert!(second_report.enabled.iter().all(|(_, r)| r.already_enabled()));
    assert!(second_report.mode_changes.is_empty());

    let validated = manager.enable_display(&display(2)).unwrap();
    assert!(validated.already_enabled());
}

#[test]
fn test_preset_follows_hardware_after_logical_ids_swap() {
    let sim = SimulatedPlatform::new(vec![
        SimMonitor::new(0, 4353, FHD),
        SimMonitor::new(1, 4354, QHD).at(1920, 0),
    ]);
    let manager = manager(&sim);
    let saved = manager.capture_topology("desk").unwrap();
    assert_eq!(saved.get(&display(0)).unwrap().hardware_uid, Some(4353));

    sim.swap_source_ids(&display(0), &display(1));
    let report = manager.apply_preset(&saved).unwrap();

    assert_eq!(report.remaps.len(), 2);
    assert!(report.mode_changes.is_empty());
    for monitor in sim.monitors() {
        match monitor.uid {
            4353 => assert_eq!(monitor.mode.position, Position::ORIGIN),
            4354 => assert_eq!(monitor.mode.position, Position::new(1920, 0)),
            other => panic!("unexpected monitor {other}"),
        }
    }
}

#[test]
fn test_partial_failure_reports_per_display_errors() {
    let sim = SimulatedPlatform::new(vec![
        SimMonitor::new(0, 4353, FHD),
        SimMonitor::new(1, 4354, FHD).at(1920, 0).disabled(),
    ]);
    // Every enable technique is acknowledged and then ignored
    sim.configure(|b| {
        b.ignore_activation.insert(4354);
        b.legacy_attach = displaytopo::platform::LegacyAttach::Never;
        b.layout_tool_exit_code = 2;
    });
    let topology = Topology::new("both", vec![entry(0, FHD, 0, 0).primary(), entry(1, FHD, 1920, 0)]);

    let failure = manager(&sim).apply_preset(&topology).unwrap_err();
    let errors = failure.errors();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].0, display(1));
    assert!(matches!(
        errors[0].1,
        TopologyError::StrategyExhausted { attempts: 9, .. }
    ));

    // The display that could be handled still was
    let report = failure.report().unwrap();
    assert_eq!(report.primary, Some(display(0)));
    assert_eq!(report.positions, vec![(display(0), Position::ORIGIN)]);
}

// ============================================================================
// Strategy executor
// ============================================================================

struct Counted {
    kind: StrategyKind,
    succeed: bool,
    sim: SimulatedPlatform,
    runs: Arc<AtomicUsize>,
}

impl EnableStrategy for Counted {
    fn kind(&self) -> StrategyKind {
        self.kind
    }

    fn attempt(&self, ctx: &EnableContext<'_>) -> Result<()> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        if !self.succeed {
            return Err(TopologyError::ExternalToolFailed(format!("{} refused", self.kind)));
        }
        self.sim.update_monitor(ctx.display, |m| m.enabled = true);
        Ok(())
    }
}

#[test]
fn test_executor_stops_after_first_validated_strategy() {
    let sim = SimulatedPlatform::new(vec![
        SimMonitor::new(0, 4353, FHD),
        SimMonitor::new(1, 4354, FHD).at(1920, 0).disabled(),
    ]);
    let runs = Arc::new(AtomicUsize::new(0));
    let outcomes = [false, false, true, true, true, true, true, true, true];
    let strategies = StrategyKind::ALL
        .into_iter()
        .zip(outcomes)
        .map(|(kind, succeed)| {
            Box::new(Counted {
                kind,
                succeed,
                sim: sim.clone(),
                runs: runs.clone(),
            }) as Box<dyn EnableStrategy>
        })
        .collect();

    let settings = fast_settings();
    let modes = ModeStore::new();
    let engine = EngineContext::new(PlatformServices::new(&sim, &sim), &settings, &modes);
    let identities = resolve(&sim, &sim);
    let target = display(1);

    let report = StrategyExecutor::with_strategies(strategies)
        .enable(&EnableContext::new(engine, &identities, &target))
        .unwrap();

    assert_eq!(report.attempts.len(), 3);
    assert_eq!(runs.load(Ordering::SeqCst), 3);
    assert_eq!(report.strategy, Some(StrategyKind::MinimalPathSet));
}

#[test]
fn test_standard_executor_walks_to_legacy_restore() {
    let sim = SimulatedPlatform::new(vec![
        SimMonitor::new(0, 4353, FHD),
        SimMonitor::new(1, 4354, QHD).at(1920, 0),
    ]);
    let manager = manager(&sim);

    manager.set_display_enabled(&display(1), false).unwrap();
    sim.configure(|b| {
        b.ignore_activation.insert(4354);
    });
    let report = manager.enable_display(&display(1)).unwrap();

    assert_eq!(report.strategy, Some(StrategyKind::LegacyRestore));
    assert_eq!(report.attempts.len(), 6);
    // The remembered mode comes back, not the fallback mode
    let monitor = sim.monitor(&display(1)).unwrap();
    assert_eq!(monitor.mode.resolution, QHD);
    assert_eq!(monitor.mode.position, Position::new(1920, 0));
}

#[test]
fn test_disable_failures_are_not_errors() {
    let sim = SimulatedPlatform::new(vec![SimMonitor::new(0, 4353, FHD), SimMonitor::new(1, 4354, FHD).at(1920, 0)]);
    sim.configure(|b| {
        b.dry_run_status = displaytopo::constants::status::ACCESS_DENIED;
        b.legacy_status_override = Some(displaytopo::constants::legacy_status::FAILED);
    });
    let manager = manager(&sim);

    assert!(matches!(
        manager.disable_display(&display(1)),
        DisableOutcome::AssumedDisabled { .. }
    ));
    assert!(manager.set_display_enabled(&display(1), false).is_ok());
}

#[test]
fn test_disabling_unknown_display_keeps_desk_enabled() {
    let sim = SimulatedPlatform::new(vec![
        SimMonitor::new(0, 4353, FHD),
        SimMonitor::new(1, 4354, FHD).at(1920, 0),
        SimMonitor::new(2, 4355, FHD).at(3840, 0),
    ]);
    let manager = manager(&sim);
    let ghost = DisplayId::new(r"\\.\DISPLAY7");

    assert_eq!(manager.disable_display(&ghost), DisableOutcome::AlreadyDisabled);
    assert!(sim.monitors().iter().all(|m| m.enabled));
    assert!(matches!(
        manager.apply_multiple_display_positions(&[(ghost, Position::new(-1920, 0))]),
        Err(TopologyError::DisplayNotFound(_))
    ));
    assert!(position_of(&sim, 0).is_origin());
}

// ============================================================================
// Validator and path lookup
// ============================================================================

#[test]
fn test_consensus_verdicts() {
    assert_eq!(ConsensusSignals::new(Some(true), Some(true), Some(false)).verdict(), Some(true));
    assert_eq!(ConsensusSignals::new(Some(true), Some(false), None).verdict(), Some(true));
    assert_eq!(ConsensusSignals::new(None, None, None).verdict(), None);
}

#[test]
fn test_validator_outvotes_lagging_enumeration() {
    let sim = SimulatedPlatform::new(vec![SimMonitor::new(0, 4353, FHD)]);
    sim.configure(|b| {
        b.enumeration_override.insert(0, false);
    });
    let settings = fast_settings();
    let identities = resolve(&sim, &sim);
    let validator = StateValidator::new(PlatformServices::new(&sim, &sim), &settings.validation, &identities);

    let (signals, _) = validator.observe(&display(0));
    assert_eq!(signals, ConsensusSignals::new(Some(false), Some(true), Some(true)));
    assert!(validator.validate(&display(0), true, 1).unwrap().is_enabled);

    let missing = validator.validate(&display(3), true, 3).unwrap_err();
    assert!(matches!(missing, TopologyError::DisplayNotFound(_)));
}

#[test]
fn test_path_tiers_agree_on_the_same_display() {
    let sim = SimulatedPlatform::new(vec![
        SimMonitor::new(0, 4353, FHD),
        SimMonitor::new(1, 4354, QHD).at(1920, 0),
        SimMonitor::new(2, 4355, FHD).at(4480, 0),
    ]);
    let identities = resolve(&sim, &sim);
    let (paths, _) = query_paths(&sim, true).unwrap();

    for source_id in 0..3 {
        let id = display(source_id);
        let found = find_path(&id, &paths, &identities).unwrap();
        assert_eq!(found.tier, PathTier::SourceAndTarget);
        assert_eq!(Some(found.index as u32), id.source_index());
    }
}

// ============================================================================
// Journal and settings
// ============================================================================

#[test]
#[serial]
fn test_preset_apply_is_journaled() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("journal.jsonl");
    let sim = SimulatedPlatform::new(vec![SimMonitor::new(0, 4353, FHD)]);

    open_journal(&path).unwrap();
    let result = manager(&sim).apply_preset(&Topology::new("solo", vec![entry(0, FHD, 0, 0).primary()]));
    close_journal();
    assert!(result.is_ok());

    let content = fs::read_to_string(&path).unwrap();
    let record = content
        .lines()
        .filter_map(|line| serde_json::from_str::<serde_json::Value>(line).ok())
        .find(|r| r["data"]["name"] == "solo")
        .unwrap();
    assert_eq!(record["event"], "topology_apply");
    assert_eq!(record["data"]["errors"].as_array().map(Vec::len), Some(0));
}

#[test]
fn test_settings_round_trip() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("displaytopo").join("settings.json");

    assert_eq!(load_settings(&path).unwrap(), EngineSettings::default());

    let settings = fast_settings();
    save_settings(&path, &settings).unwrap();
    assert_eq!(load_settings(&path).unwrap(), settings);
}
