//! Loop registration parameters.

use crate::error::LoopError;

/// Default upper bound on the frame time a loop accepts, in seconds.
pub const DEFAULT_MAX_CATCHUP_TIME: f64 = 0.25;

/// How a fixed-timestep loop spends accumulated debt after a frame hitch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CatchupMode {
    /// Run once with the whole accumulator as delta, then drop the debt.
    FireAndForget,
    /// Run once with the fixed timestep; carry the remaining debt.
    SingleCorrectiveStep,
    /// Run once per whole timestep of debt within the same frame.
    #[default]
    MultipleSteps,
}

/// Configuration of one update loop. Immutable after registration.
///
/// # Example
///
/// ```ignore
/// let physics = LoopConfig::fixed("physics", 1.0 / 60.0)
///     .with_catchup_mode(CatchupMode::MultipleSteps)
///     .with_max_catchup_time(0.1);
/// let render = LoopConfig::variable("render");
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct LoopConfig {
    pub name: String,
    /// Seconds per step. `0` makes the loop variable-rate.
    pub fixed_timestep: f64,
    pub catchup_mode: CatchupMode,
    /// Frame times above this are clamped, in seconds.
    pub max_catchup_time: f64,
}

impl LoopConfig {
    /// A fixed-timestep loop.
    pub fn fixed(name: impl Into<String>, fixed_timestep: f64) -> Self {
        Self {
            name: name.into(),
            fixed_timestep,
            catchup_mode: CatchupMode::default(),
            max_catchup_time: DEFAULT_MAX_CATCHUP_TIME,
        }
    }

    /// A loop that triggers every frame with the frame time as delta.
    pub fn variable(name: impl Into<String>) -> Self {
        Self::fixed(name, 0.0)
    }

    pub fn with_catchup_mode(mut self, mode: CatchupMode) -> Self {
        self.catchup_mode = mode;
        self
    }

    pub fn with_max_catchup_time(mut self, seconds: f64) -> Self {
        self.max_catchup_time = seconds;
        self
    }

    pub fn is_variable(&self) -> bool {
        self.fixed_timestep == 0.0
    }

    pub(crate) fn validate(&self) -> Result<(), LoopError> {
        let timestep_ok = self.fixed_timestep.is_finite() && self.fixed_timestep >= 0.0;
        let cap_ok = self.max_catchup_time.is_finite() && self.max_catchup_time > 0.0;
        let reason = match (timestep_ok, cap_ok) {
            (true, true) => return Ok(()),
            (false, _) => "fixed timestep must be a finite, non-negative number of seconds",
            (true, false) => "max catch-up time must be a finite, positive number of seconds",
        };
        Err(LoopError::InvalidConfig {
            name: self.name.clone(),
            reason: reason.to_owned(),
        })
    }
}
