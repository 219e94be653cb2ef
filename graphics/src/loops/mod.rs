//! Multi-rate update loops.
//!
//! A [`LoopManager`] owns one accumulator state machine per registered loop
//! (physics, network, render, AI...). Once per frame the owning graph calls
//! [`LoopManager::update_loops`], which refreshes every loop's
//! [`LoopReference`]. Nodes subscribed to a loop read that reference through
//! its [`LoopId`] to decide whether they run this frame.
//!
//! # Frame time normalization
//!
//! | Input | Treated as |
//! |-------|------------|
//! | `<= 0` or NaN | [`MIN_FRAME_TIME`] (silently) |
//! | `> max_catchup_time` | `max_catchup_time` (with a warning) |
//!
//! # Catch-up modes
//!
//! | Mode | Trigger delta | Leftover debt |
//! |------|---------------|---------------|
//! | [`CatchupMode::FireAndForget`] | whole accumulator, at most `max(max_catchup_time, fixed_timestep)` | dropped |
//! | [`CatchupMode::SingleCorrectiveStep`] | `fixed_timestep` | carried to later frames |
//! | [`CatchupMode::MultipleSteps`] | `fixed_timestep` | drained this frame via [`LoopManager::take_catchup_step`] |
//!
//! # Example
//!
//! ```ignore
//! let mut loops = LoopManager::new();
//! let physics = loops.register_loop(LoopConfig::fixed("physics", 1.0 / 60.0))?;
//!
//! loops.set_current_frame(1);
//! loops.update_loops(1.0 / 60.0);
//! assert!(loops.loop_reference(physics).unwrap().should_execute_this_frame);
//! ```

mod config;

pub use config::{CatchupMode, DEFAULT_MAX_CATCHUP_TIME, LoopConfig};

use std::collections::HashMap;
use std::fmt;

use crate::error::LoopError;

/// Frame time used in place of non-positive input, in seconds.
pub const MIN_FRAME_TIME: f64 = 0.001;

/// Accumulated time this close to a whole step counts as the whole step.
const STEP_TOLERANCE: f64 = 1e-9;

/// Stable identifier of a registered loop.
///
/// Ids are assigned sequentially from 0 and never reused within a manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LoopId(u32);

impl LoopId {
    pub const fn new(index: u32) -> Self {
        Self(index)
    }

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for LoopId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "loop#{}", self.0)
    }
}

/// Per-frame trigger state of one loop.
///
/// Only the owning [`LoopManager`] mutates it.
#[derive(Debug, Clone, PartialEq)]
pub struct LoopReference {
    pub loop_id: LoopId,
    /// Whether nodes driven by this loop run on the current step.
    pub should_execute_this_frame: bool,
    /// Seconds to simulate on the current step.
    pub delta_time: f64,
    /// Number of steps taken since registration.
    pub step_count: u64,
    /// Frame index of the most recent update.
    pub last_executed_frame: u64,
    /// Wall time spent in nodes driven by this loop during its last active frame.
    pub last_execution_time_ms: f64,
    pub catchup_mode: CatchupMode,
}

impl LoopReference {
    fn new(loop_id: LoopId, catchup_mode: CatchupMode) -> Self {
        Self {
            loop_id,
            should_execute_this_frame: false,
            delta_time: 0.0,
            step_count: 0,
            last_executed_frame: 0,
            last_execution_time_ms: 0.0,
            catchup_mode,
        }
    }
}

#[derive(Debug)]
struct LoopState {
    config: LoopConfig,
    reference: LoopReference,
    accumulator: f64,
    /// Main-pass trigger flag, parked while catch-up steps mark the loop idle.
    parked_trigger: Option<bool>,
}

impl LoopState {
    fn advance(&mut self, frame_time: f64, frame: u64) {
        let mut dt = if frame_time > 0.0 {
            frame_time
        } else {
            MIN_FRAME_TIME
        };
        let cap = self.config.max_catchup_time;
        if dt > cap {
            log::warn!(
                "Loop '{}': frame time {:.4}s exceeds max catch-up {:.4}s, clamping",
                self.config.name,
                dt,
                cap
            );
            dt = cap;
        }

        self.parked_trigger = None;
        self.reference.last_executed_frame = frame;

        let ts = self.config.fixed_timestep;
        if self.config.is_variable() {
            self.reference.should_execute_this_frame = true;
            self.reference.delta_time = dt;
            self.reference.step_count += 1;
            return;
        }

        self.accumulator += dt;
        if !self.owes_step() {
            self.reference.should_execute_this_frame = false;
            return;
        }

        self.reference.should_execute_this_frame = true;
        self.reference.step_count += 1;
        match self.config.catchup_mode {
            CatchupMode::FireAndForget => {
                self.reference.delta_time = self.accumulator.min(cap.max(ts));
                self.accumulator = 0.0;
            }
            CatchupMode::SingleCorrectiveStep => {
                self.reference.delta_time = ts;
                self.pay_step();
                if self.owes_step() {
                    log::debug!(
                        "Loop '{}': carrying {:.4}s of debt to later frames",
                        self.config.name,
                        self.accumulator
                    );
                }
            }
            CatchupMode::MultipleSteps => {
                self.reference.delta_time = ts;
                self.pay_step();
            }
        }
    }

    fn owes_step(&self) -> bool {
        self.accumulator + STEP_TOLERANCE >= self.config.fixed_timestep
    }

    fn pay_step(&mut self) {
        self.accumulator = (self.accumulator - self.config.fixed_timestep).max(0.0);
    }

    fn has_catchup_step(&self) -> bool {
        !self.config.is_variable()
            && self.config.catchup_mode == CatchupMode::MultipleSteps
            && self.owes_step()
    }
}

/// Owner of all loop state for one graph.
#[derive(Debug, Default)]
pub struct LoopManager {
    /// Arena of loop states, indexed by [`LoopId`]. Entries are never removed.
    states: Vec<LoopState>,
    names: HashMap<String, LoopId>,
    current_frame: u64,
}

impl LoopManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a loop and return its id.
    ///
    /// Fails with [`LoopError::DuplicateName`] if the name is taken, or
    /// [`LoopError::InvalidConfig`] for a negative/non-finite timestep or a
    /// non-positive catch-up bound.
    pub fn register_loop(&mut self, config: LoopConfig) -> Result<LoopId, LoopError> {
        if self.names.contains_key(&config.name) {
            return Err(LoopError::DuplicateName(config.name));
        }
        config.validate()?;

        let id = LoopId::new(self.states.len() as u32);
        log::debug!(
            "Registered loop '{}' as {} (timestep {}s, {:?})",
            config.name,
            id,
            config.fixed_timestep,
            config.catchup_mode
        );
        self.names.insert(config.name.clone(), id);
        self.states.push(LoopState {
            reference: LoopReference::new(id, config.catchup_mode),
            config,
            accumulator: 0.0,
            parked_trigger: None,
        });
        Ok(id)
    }

    /// Current trigger state of a loop, `None` for unknown ids.
    pub fn loop_reference(&self, id: LoopId) -> Option<&LoopReference> {
        self.states.get(id.index()).map(|state| &state.reference)
    }

    pub fn loop_config(&self, id: LoopId) -> Option<&LoopConfig> {
        self.states.get(id.index()).map(|state| &state.config)
    }

    /// Look up a loop by its registered name.
    pub fn loop_id(&self, name: &str) -> Option<LoopId> {
        self.names.get(name).copied()
    }

    /// Residual time not yet consumed by a fixed step.
    pub fn accumulator(&self, id: LoopId) -> Option<f64> {
        self.states.get(id.index()).map(|state| state.accumulator)
    }

    /// Whether `id` triggered on the current step. Unknown ids never trigger.
    pub fn is_triggered(&self, id: LoopId) -> bool {
        self.loop_reference(id)
            .is_some_and(|reference| reference.should_execute_this_frame)
    }

    pub fn loop_count(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &LoopReference> {
        self.states.iter().map(|state| &state.reference)
    }

    /// Set the frame index stamped into `last_executed_frame` by the next update.
    pub fn set_current_frame(&mut self, frame: u64) {
        self.current_frame = frame;
    }

    pub fn current_frame(&self) -> u64 {
        self.current_frame
    }

    /// Advance every loop by one frame.
    pub fn update_loops(&mut self, frame_time: f64) {
        let frame = self.current_frame;
        for state in &mut self.states {
            state.advance(frame_time, frame);
        }
    }

    /// Whether any loop still owes a whole fixed step after the update.
    pub fn has_pending_catchup(&self) -> bool {
        self.states.iter().any(LoopState::has_catchup_step)
    }

    /// Take one more fixed step on every [`CatchupMode::MultipleSteps`] loop
    /// that still has a full timestep of debt.
    ///
    /// Returns `false` (and changes nothing) when no loop can step. Otherwise
    /// stepping loops are marked triggered with `delta_time = fixed_timestep`,
    /// and every other loop is marked not triggered for this step until
    /// [`end_catchup`](Self::end_catchup).
    pub fn take_catchup_step(&mut self) -> bool {
        if !self.has_pending_catchup() {
            return false;
        }

        for state in &mut self.states {
            if state.has_catchup_step() {
                let ts = state.config.fixed_timestep;
                state.pay_step();
                state.reference.should_execute_this_frame = true;
                state.reference.delta_time = ts;
                state.reference.step_count += 1;
            } else {
                if state.parked_trigger.is_none() {
                    state.parked_trigger = Some(state.reference.should_execute_this_frame);
                }
                state.reference.should_execute_this_frame = false;
            }
        }
        true
    }

    /// Give loops that sat out a catch-up step their main-pass trigger back.
    ///
    /// Called once the frame's catch-up steps are done, so references read
    /// after the frame describe the frame rather than its last catch-up step.
    pub fn end_catchup(&mut self) {
        for state in &mut self.states {
            if let Some(triggered) = state.parked_trigger.take() {
                state.reference.should_execute_this_frame = triggered;
            }
        }
    }

    /// Record the wall time nodes driven by `id` took on the current frame.
    pub fn record_execution_time(&mut self, id: LoopId, milliseconds: f64) {
        if let Some(state) = self.states.get_mut(id.index()) {
            state.reference.last_execution_time_ms = milliseconds;
        }
    }
}

static_assertions::assert_impl_all!(LoopManager: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    const EPS: f64 = 1e-9;

    fn manager_with(config: LoopConfig) -> (LoopManager, LoopId) {
        let mut manager = LoopManager::new();
        let id = manager.register_loop(config).unwrap();
        (manager, id)
    }

    #[test]
    fn test_ids_are_sequential() {
        let mut manager = LoopManager::new();
        let a = manager.register_loop(LoopConfig::fixed("a", 0.1)).unwrap();
        let b = manager.register_loop(LoopConfig::variable("b")).unwrap();
        assert_eq!(a, LoopId::new(0));
        assert_eq!(b, LoopId::new(1));
        assert_eq!(manager.loop_count(), 2);
        assert_eq!(manager.loop_id("b"), Some(b));
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let mut manager = LoopManager::new();
        manager.register_loop(LoopConfig::fixed("physics", 0.1)).unwrap();
        let result = manager.register_loop(LoopConfig::variable("physics"));
        assert!(matches!(result, Err(LoopError::DuplicateName(name)) if name == "physics"));
        assert_eq!(manager.loop_count(), 1);
    }

    #[rstest]
    #[case::negative_timestep(LoopConfig::fixed("bad", -0.5))]
    #[case::nan_timestep(LoopConfig::fixed("bad", f64::NAN))]
    #[case::zero_cap(LoopConfig::variable("bad").with_max_catchup_time(0.0))]
    fn test_invalid_config_rejected(#[case] config: LoopConfig) {
        let mut manager = LoopManager::new();
        assert!(matches!(
            manager.register_loop(config),
            Err(LoopError::InvalidConfig { .. })
        ));
    }

    #[test]
    fn test_unknown_id_has_no_reference() {
        let manager = LoopManager::new();
        assert!(manager.loop_reference(LoopId::new(7)).is_none());
        assert!(!manager.is_triggered(LoopId::new(7)));
    }

    #[test]
    fn test_initial_reference_state() {
        let (manager, id) = manager_with(LoopConfig::fixed("physics", 1.0 / 60.0));
        let reference = manager.loop_reference(id).unwrap();
        assert!(!reference.should_execute_this_frame);
        assert_eq!(reference.delta_time, 0.0);
        assert_eq!(reference.step_count, 0);
        assert_eq!(reference.last_executed_frame, 0);
        assert_eq!(reference.last_execution_time_ms, 0.0);
        assert_eq!(reference.catchup_mode, CatchupMode::MultipleSteps);
    }

    #[test]
    fn test_fixed_rate_sixty_steps() {
        let ts = 1.0 / 60.0;
        let (mut manager, id) = manager_with(LoopConfig::fixed("physics", ts));

        for _ in 0..60 {
            manager.update_loops(ts);
            let reference = manager.loop_reference(id).unwrap();
            assert!(reference.should_execute_this_frame);
            assert!((reference.delta_time - ts).abs() < EPS);
        }
        assert_eq!(manager.loop_reference(id).unwrap().step_count, 60);
    }

    #[test]
    fn test_step_count_independent_of_frame_boundaries() {
        // 2 seconds at 0.125s steps, delivered in 1/32s frames: 16 steps
        let (mut manager, id) = manager_with(LoopConfig::fixed("ai", 0.125));
        for _ in 0..64 {
            manager.update_loops(1.0 / 32.0);
        }
        assert_eq!(manager.loop_reference(id).unwrap().step_count, 16);
    }

    #[test]
    fn test_fixed_loop_waits_for_full_step() {
        let (mut manager, id) = manager_with(LoopConfig::fixed("network", 0.1));
        manager.update_loops(0.05);
        let reference = manager.loop_reference(id).unwrap();
        assert!(!reference.should_execute_this_frame);
        assert_eq!(reference.step_count, 0);
        assert!((manager.accumulator(id).unwrap() - 0.05).abs() < EPS);

        manager.update_loops(0.05);
        assert!(manager.is_triggered(id));
    }

    #[rstest]
    #[case(0.001)]
    #[case(0.016)]
    #[case(0.2)]
    fn test_variable_rate_delta_matches_frame_time(#[case] frame_time: f64) {
        let (mut manager, id) = manager_with(LoopConfig::variable("render"));
        manager.update_loops(frame_time);
        let reference = manager.loop_reference(id).unwrap();
        assert!(reference.should_execute_this_frame);
        assert!((reference.delta_time - frame_time).abs() < EPS);
        assert_eq!(reference.step_count, 1);
    }

    #[rstest]
    #[case::zero(0.0)]
    #[case::negative(-5.0)]
    #[case::nan(f64::NAN)]
    fn test_non_positive_frame_time_floors(#[case] frame_time: f64) {
        let (mut manager, id) = manager_with(LoopConfig::variable("render"));
        let (mut expected, expected_id) = manager_with(LoopConfig::variable("render"));

        manager.update_loops(frame_time);
        expected.update_loops(MIN_FRAME_TIME);

        assert_eq!(
            manager.loop_reference(id),
            expected.loop_reference(expected_id)
        );
        assert!((manager.loop_reference(id).unwrap().delta_time - MIN_FRAME_TIME).abs() < EPS);
    }

    #[test]
    fn test_zero_frame_time_accumulates_floor_on_fixed_loop() {
        let (mut manager, id) = manager_with(LoopConfig::fixed("physics", 0.01));
        for _ in 0..9 {
            manager.update_loops(0.0);
        }
        assert!(!manager.is_triggered(id));

        // The tenth or eleventh floored frame completes the step
        let mut triggered = false;
        for _ in 0..2 {
            manager.update_loops(-5.0);
            triggered |= manager.is_triggered(id);
        }
        assert!(triggered);
        assert_eq!(manager.loop_reference(id).unwrap().step_count, 1);
    }

    #[rstest]
    #[case::fire_and_forget(CatchupMode::FireAndForget)]
    #[case::single_corrective(CatchupMode::SingleCorrectiveStep)]
    #[case::multiple_steps(CatchupMode::MultipleSteps)]
    fn test_large_frame_is_capped(#[case] mode: CatchupMode) {
        let (mut manager, id) = manager_with(
            LoopConfig::fixed("physics", 1.0 / 60.0)
                .with_catchup_mode(mode)
                .with_max_catchup_time(0.25),
        );

        for _ in 0..3 {
            manager.update_loops(1.0);
            assert!(manager.loop_reference(id).unwrap().delta_time <= 0.25 + EPS);
            while manager.take_catchup_step() {
                assert!(manager.loop_reference(id).unwrap().delta_time <= 0.25 + EPS);
            }
            if mode != CatchupMode::SingleCorrectiveStep {
                assert!(manager.accumulator(id).unwrap() <= 0.25 + EPS);
            }
        }
    }

    #[test]
    fn test_fire_and_forget_delta_capped() {
        let (mut manager, id) = manager_with(
            LoopConfig::fixed("physics", 0.1)
                .with_catchup_mode(CatchupMode::FireAndForget)
                .with_max_catchup_time(0.25),
        );
        manager.update_loops(0.09);
        assert!(!manager.is_triggered(id));

        // 0.09 of debt plus a full 0.25 frame
        manager.update_loops(0.25);
        let reference = manager.loop_reference(id).unwrap();
        assert!(reference.should_execute_this_frame);
        assert!((reference.delta_time - 0.25).abs() < EPS);
        assert_eq!(manager.accumulator(id), Some(0.0));
    }

    #[test]
    fn test_variable_loop_capped() {
        let (mut manager, id) =
            manager_with(LoopConfig::variable("render").with_max_catchup_time(0.25));
        manager.update_loops(1.0);
        assert!((manager.loop_reference(id).unwrap().delta_time - 0.25).abs() < EPS);
    }

    #[test]
    fn test_fire_and_forget_consumes_whole_debt() {
        let (mut manager, id) = manager_with(
            LoopConfig::fixed("physics", 0.1).with_catchup_mode(CatchupMode::FireAndForget),
        );
        manager.update_loops(0.25);
        let reference = manager.loop_reference(id).unwrap();
        assert!(reference.should_execute_this_frame);
        assert!((reference.delta_time - 0.25).abs() < EPS);
        assert_eq!(reference.step_count, 1);
        assert_eq!(manager.accumulator(id), Some(0.0));
        assert!(!manager.take_catchup_step());
    }

    #[test]
    fn test_single_corrective_step_carries_debt() {
        let (mut manager, id) = manager_with(
            LoopConfig::fixed("physics", 0.1).with_catchup_mode(CatchupMode::SingleCorrectiveStep),
        );
        manager.update_loops(0.25);
        let reference = manager.loop_reference(id).unwrap();
        assert!((reference.delta_time - 0.1).abs() < EPS);
        assert_eq!(reference.step_count, 1);
        assert!((manager.accumulator(id).unwrap() - 0.15).abs() < EPS);
        assert!(!manager.take_catchup_step());

        // Debt is paid on the following frames
        manager.update_loops(0.001);
        assert!(manager.is_triggered(id));
        assert_eq!(manager.loop_reference(id).unwrap().step_count, 2);
    }

    #[test]
    fn test_multiple_steps_drains_within_frame() {
        let (mut manager, id) = manager_with(LoopConfig::fixed("physics", 0.1));
        manager.update_loops(0.25);
        assert_eq!(manager.loop_reference(id).unwrap().step_count, 1);
        assert!(manager.has_pending_catchup());

        assert!(manager.take_catchup_step());
        let reference = manager.loop_reference(id).unwrap();
        assert!(reference.should_execute_this_frame);
        assert!((reference.delta_time - 0.1).abs() < EPS);
        assert_eq!(reference.step_count, 2);

        assert!(!manager.has_pending_catchup());
        assert!(!manager.take_catchup_step());
        assert!((manager.accumulator(id).unwrap() - 0.05).abs() < EPS);
    }

    #[test]
    fn test_multiple_steps_keep_time_at_cap_sized_frames() {
        // 10 frames of 0.25s, each exactly at the default cap: 2.5s of 0.1s steps
        let (mut manager, id) = manager_with(LoopConfig::fixed("physics", 0.1));
        for _ in 0..10 {
            manager.update_loops(0.25);
            while manager.take_catchup_step() {}
        }
        assert_eq!(manager.loop_reference(id).unwrap().step_count, 25);
        assert!(manager.accumulator(id).unwrap() < 0.1);
    }

    #[test]
    fn test_single_corrective_step_keeps_all_debt() {
        let (mut manager, id) = manager_with(
            LoopConfig::fixed("physics", 0.1).with_catchup_mode(CatchupMode::SingleCorrectiveStep),
        );
        for _ in 0..3 {
            manager.update_loops(0.25);
        }
        assert_eq!(manager.loop_reference(id).unwrap().step_count, 3);
        assert!((manager.accumulator(id).unwrap() - 0.45).abs() < EPS);
    }

    #[test]
    fn test_catchup_step_marks_other_loops_idle() {
        let mut manager = LoopManager::new();
        let physics = manager.register_loop(LoopConfig::fixed("physics", 0.1)).unwrap();
        let render = manager.register_loop(LoopConfig::variable("render")).unwrap();

        manager.update_loops(0.25);
        assert!(manager.is_triggered(render));
        assert!(manager.take_catchup_step());
        assert!(manager.is_triggered(physics));
        assert!(!manager.is_triggered(render));
        // Variable loops never take extra steps
        assert_eq!(manager.loop_reference(render).unwrap().step_count, 1);
    }

    #[test]
    fn test_end_catchup_restores_main_pass_triggers() {
        let mut manager = LoopManager::new();
        let physics = manager.register_loop(LoopConfig::fixed("physics", 0.1)).unwrap();
        let network = manager.register_loop(LoopConfig::fixed("network", 1.0)).unwrap();
        let render = manager.register_loop(LoopConfig::variable("render")).unwrap();

        manager.update_loops(0.25);
        while manager.take_catchup_step() {}
        manager.end_catchup();

        let reference = manager.loop_reference(render).unwrap();
        assert!(reference.should_execute_this_frame);
        assert!((reference.delta_time - 0.25).abs() < EPS);
        assert!(!manager.is_triggered(network));
        assert!(manager.is_triggered(physics));
        assert_eq!(manager.loop_reference(physics).unwrap().step_count, 2);

        // Nothing parked, nothing to restore
        manager.end_catchup();
        assert!(manager.is_triggered(render));
    }

    #[test]
    fn test_catchup_without_debt_changes_nothing() {
        let (mut manager, id) = manager_with(LoopConfig::fixed("physics", 0.1));
        manager.update_loops(0.1);
        let before = manager.loop_reference(id).cloned();
        assert!(!manager.take_catchup_step());
        assert_eq!(manager.loop_reference(id).cloned(), before);
    }

    #[test]
    fn test_last_executed_frame_stamped_without_trigger() {
        let (mut manager, id) = manager_with(LoopConfig::fixed("network", 1.0));
        manager.set_current_frame(42);
        manager.update_loops(0.016);
        let reference = manager.loop_reference(id).unwrap();
        assert!(!reference.should_execute_this_frame);
        assert_eq!(reference.last_executed_frame, 42);
    }

    #[test]
    fn test_record_execution_time() {
        let (mut manager, id) = manager_with(LoopConfig::variable("render"));
        manager.record_execution_time(id, 1.5);
        manager.record_execution_time(LoopId::new(99), 3.0);
        assert_eq!(manager.loop_reference(id).unwrap().last_execution_time_ms, 1.5);
    }
}
