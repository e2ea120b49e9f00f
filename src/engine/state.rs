use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::{Duration, Instant};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error, PartialEq)]
pub enum EngineError {
    #[error("invalid configuration: total_laps={total_laps}, lap_length_m={lap_length_m}")]
    InvalidConfiguration { total_laps: u32, lap_length_m: f64 },
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum RunPhase {
    Idle,
    Running,
    Paused,
    Finished,
}

impl Default for RunPhase {
    fn default() -> Self {
        RunPhase::Idle
    }
}

/// What to restore on `reset`. Early hardware revisions re-prompted for the
/// lap count after every run; later ones kept the configuration and only
/// rewound the counters. Both behaviors are supported behind this flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetMode {
    CountersOnly,
    Full,
}

impl Default for ResetMode {
    fn default() -> Self {
        ResetMode::CountersOnly
    }
}

/// Immutable run configuration, produced once by `configure`.
#[derive(Debug, Clone, Copy, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RunPlan {
    pub total_laps: u32,
    pub lap_length_m: f64,
}

impl RunPlan {
    pub fn new(total_laps: u32, lap_length_m: f64) -> Result<Self, EngineError> {
        if total_laps == 0 || !lap_length_m.is_finite() || lap_length_m <= 0.0 {
            return Err(EngineError::InvalidConfiguration {
                total_laps,
                lap_length_m,
            });
        }
        Ok(Self {
            total_laps,
            lap_length_m,
        })
    }

    /// One lap covers the length once. Earlier hardware revisions doubled
    /// this for a there-and-back course; the shipped convention is the
    /// single-length one, and it is part of the public contract.
    pub fn total_distance_m(&self) -> f64 {
        self.total_laps as f64 * self.lap_length_m
    }
}

/// Result of an `advance_lap` call, as seen by the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LapOutcome {
    /// Phase was not `Running` (or the step was zero); nothing changed.
    Ignored,
    /// Laps were decremented, run still going.
    Advanced,
    /// This call drove the counter to zero. Reported at most once per run.
    Completed,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DisplaySnapshot {
    pub phase: RunPhase,
    pub session_id: Option<Uuid>,
    pub started_at: Option<DateTime<Utc>>,
    pub elapsed_seconds: u64,
    pub remaining_laps: u32,
    pub total_laps: u32,
    pub completed_laps: u32,
    pub lap_length_m: f64,
    pub total_distance_m: f64,
}

/// The timer/lap state machine. Pure in the sense that every time-dependent
/// transition takes `now` explicitly; the controller above it owns the lock
/// and reads the clock once per command.
///
/// Elapsed time uses a single shifting anchor rather than an accumulator:
/// resuming from a pause pushes `start_reference` forward by the paused
/// duration, so `elapsed = now - start_reference` stays valid across any
/// number of pause/resume cycles.
#[derive(Debug, Clone)]
pub struct EngineState {
    pub phase: RunPhase,
    plan: Option<RunPlan>,
    session_id: Option<Uuid>,
    remaining_laps: u32,
    start_reference: Option<Instant>,
    pause_reference: Option<Instant>,
    finished_reference: Option<Instant>,
    finished_fired: bool,
    pub started_at: Option<DateTime<Utc>>,
}

impl Default for EngineState {
    fn default() -> Self {
        Self {
            phase: RunPhase::Idle,
            plan: None,
            session_id: None,
            remaining_laps: 0,
            start_reference: None,
            pause_reference: None,
            finished_reference: None,
            finished_fired: false,
            started_at: None,
        }
    }
}

impl EngineState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn plan(&self) -> Option<RunPlan> {
        self.plan
    }

    pub fn session_id(&self) -> Option<Uuid> {
        self.session_id
    }

    pub fn remaining_laps(&self) -> u32 {
        self.remaining_laps
    }

    /// Install the run configuration. Only honored while `Idle`; a configure
    /// arriving mid-run is ignored (the caller logs it). Invalid values are
    /// rejected so the intake front-end can re-prompt.
    pub fn configure(&mut self, total_laps: u32, lap_length_m: f64) -> Result<bool, EngineError> {
        let plan = RunPlan::new(total_laps, lap_length_m)?;
        if self.phase != RunPhase::Idle {
            return Ok(false);
        }
        self.plan = Some(plan);
        self.remaining_laps = plan.total_laps;
        Ok(true)
    }

    /// Start from `Idle`, or resume from `Paused`. Idempotent while
    /// `Running`; a no-op once `Finished` or before any configuration.
    pub fn start(&mut self, now: Instant) {
        match self.phase {
            RunPhase::Idle => {
                if self.plan.is_none() {
                    return;
                }
                self.phase = RunPhase::Running;
                self.start_reference = Some(now);
                self.session_id = Some(Uuid::new_v4());
                self.started_at = Some(Utc::now());
            }
            RunPhase::Paused => {
                // Pause correction: shift the anchor forward by the paused
                // duration so elapsed stays continuous across the gap.
                if let (Some(start), Some(paused_at)) = (self.start_reference, self.pause_reference)
                {
                    let paused_for = now.saturating_duration_since(paused_at);
                    self.start_reference = Some(start + paused_for);
                }
                self.pause_reference = None;
                self.phase = RunPhase::Running;
            }
            RunPhase::Running | RunPhase::Finished => {}
        }
    }

    /// Freeze the clock. Only meaningful while `Running`.
    pub fn pause(&mut self, now: Instant) {
        if self.phase != RunPhase::Running {
            return;
        }
        self.pause_reference = Some(now);
        self.phase = RunPhase::Paused;
    }

    /// Count `step` laps as done. Saturates at zero so an oversized step
    /// cannot drive the counter negative; hitting zero is the terminal
    /// transition and is reported as `Completed` exactly once.
    pub fn advance_lap(&mut self, step: u32, now: Instant) -> LapOutcome {
        if self.phase != RunPhase::Running || step == 0 {
            return LapOutcome::Ignored;
        }
        self.remaining_laps = self.remaining_laps.saturating_sub(step);
        if self.remaining_laps > 0 {
            return LapOutcome::Advanced;
        }
        self.phase = RunPhase::Finished;
        self.finished_reference = Some(now);
        if self.finished_fired {
            // Unreachable once Finished gates advance_lap, but the one-shot
            // contract is cheap to hold explicitly.
            return LapOutcome::Advanced;
        }
        self.finished_fired = true;
        LapOutcome::Completed
    }

    /// Give laps back, clamped to the configured total so the counter can
    /// never report more laps remaining than were configured.
    pub fn retreat_lap(&mut self, step: u32) {
        if self.phase != RunPhase::Running {
            return;
        }
        let cap = self.plan.map(|p| p.total_laps).unwrap_or(u32::MAX);
        self.remaining_laps = self.remaining_laps.saturating_add(step).min(cap);
    }

    /// Back to `Idle`. `CountersOnly` keeps the configuration for the next
    /// run; `Full` clears it so the intake flow re-prompts.
    pub fn reset(&mut self, mode: ResetMode) {
        self.phase = RunPhase::Idle;
        self.start_reference = None;
        self.pause_reference = None;
        self.finished_reference = None;
        self.finished_fired = false;
        self.session_id = None;
        self.started_at = None;
        match mode {
            ResetMode::CountersOnly => {
                self.remaining_laps = self.plan.map(|p| p.total_laps).unwrap_or(0);
            }
            ResetMode::Full => {
                self.plan = None;
                self.remaining_laps = 0;
            }
        }
    }

    /// Logical elapsed time: live while `Running`, frozen at the pause or
    /// finish instant otherwise, zero before the first start.
    pub fn elapsed(&self, now: Instant) -> Duration {
        let Some(start) = self.start_reference else {
            return Duration::ZERO;
        };
        let reference = match self.phase {
            RunPhase::Idle => return Duration::ZERO,
            RunPhase::Running => now,
            RunPhase::Paused => self.pause_reference.unwrap_or(now),
            RunPhase::Finished => self.finished_reference.unwrap_or(now),
        };
        reference.saturating_duration_since(start)
    }

    /// Pure query for the rendering front-end. Never mutates.
    pub fn snapshot(&self, now: Instant) -> DisplaySnapshot {
        let total_laps = self.plan.map(|p| p.total_laps).unwrap_or(0);
        DisplaySnapshot {
            phase: self.phase,
            session_id: self.session_id,
            started_at: self.started_at,
            elapsed_seconds: self.elapsed(now).as_secs(),
            remaining_laps: self.remaining_laps,
            total_laps,
            completed_laps: total_laps.saturating_sub(self.remaining_laps),
            lap_length_m: self.plan.map(|p| p.lap_length_m).unwrap_or(0.0),
            total_distance_m: self.plan.map(|p| p.total_distance_m()).unwrap_or(0.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secs(n: u64) -> Duration {
        Duration::from_secs(n)
    }

    fn running_engine(total_laps: u32, t0: Instant) -> EngineState {
        let mut engine = EngineState::new();
        engine.configure(total_laps, 10.0).unwrap();
        engine.start(t0);
        engine
    }

    #[test]
    fn configure_rejects_non_positive_values() {
        let mut engine = EngineState::new();
        assert!(engine.configure(0, 10.0).is_err());
        assert!(engine.configure(3, 0.0).is_err());
        assert!(engine.configure(3, -5.0).is_err());
        assert!(engine.configure(3, f64::NAN).is_err());
        assert_eq!(engine.plan(), None);

        assert_eq!(engine.configure(3, 10.0), Ok(true));
        assert_eq!(engine.remaining_laps(), 3);
    }

    #[test]
    fn configure_ignored_while_running() {
        let t0 = Instant::now();
        let mut engine = running_engine(3, t0);
        assert_eq!(engine.configure(99, 1.0), Ok(false));
        assert_eq!(engine.plan().unwrap().total_laps, 3);
    }

    #[test]
    fn start_without_configuration_is_a_no_op() {
        let mut engine = EngineState::new();
        engine.start(Instant::now());
        assert_eq!(engine.phase, RunPhase::Idle);
        assert_eq!(engine.session_id(), None);
    }

    #[test]
    fn start_is_idempotent_while_running() {
        let t0 = Instant::now();
        let mut engine = running_engine(3, t0);
        let session = engine.session_id();

        engine.start(t0 + secs(4));
        assert_eq!(engine.phase, RunPhase::Running);
        assert_eq!(engine.session_id(), session);
        // Anchor unchanged: elapsed keeps counting from the first start.
        assert_eq!(engine.elapsed(t0 + secs(10)), secs(10));
    }

    #[test]
    fn pause_resume_excludes_paused_time() {
        let t0 = Instant::now();
        let mut engine = running_engine(3, t0);

        engine.pause(t0 + secs(5));
        assert_eq!(engine.phase, RunPhase::Paused);
        // Frozen while paused, whatever "now" says.
        assert_eq!(engine.elapsed(t0 + secs(100)), secs(5));

        engine.start(t0 + secs(8)); // resume after a 3 s pause
        assert_eq!(engine.phase, RunPhase::Running);
        assert_eq!(engine.elapsed(t0 + secs(10)), secs(7));
    }

    #[test]
    fn repeated_pause_resume_cycles_do_not_drift() {
        let t0 = Instant::now();
        let mut engine = running_engine(3, t0);

        engine.pause(t0 + secs(2));
        engine.start(t0 + secs(10));
        engine.pause(t0 + secs(11));
        engine.start(t0 + secs(20));
        // 2 s + 1 s running, 17 s paused in between.
        assert_eq!(engine.elapsed(t0 + secs(25)), secs(8));
    }

    #[test]
    fn pause_outside_running_is_a_no_op() {
        let t0 = Instant::now();
        let mut engine = EngineState::new();
        engine.pause(t0);
        assert_eq!(engine.phase, RunPhase::Idle);

        engine.configure(1, 10.0).unwrap();
        engine.start(t0);
        engine.advance_lap(1, t0 + secs(3));
        engine.pause(t0 + secs(4));
        assert_eq!(engine.phase, RunPhase::Finished);
    }

    #[test]
    fn advancing_all_laps_finishes_the_run() {
        let t0 = Instant::now();
        let mut engine = running_engine(3, t0);

        assert_eq!(engine.advance_lap(1, t0 + secs(1)), LapOutcome::Advanced);
        assert_eq!(engine.advance_lap(1, t0 + secs(2)), LapOutcome::Advanced);
        assert_eq!(engine.advance_lap(1, t0 + secs(3)), LapOutcome::Completed);

        let snap = engine.snapshot(t0 + secs(9));
        assert_eq!(snap.phase, RunPhase::Finished);
        assert_eq!(snap.remaining_laps, 0);
        assert_eq!(snap.completed_laps, 3);
        assert_eq!(snap.total_distance_m, 30.0);
        // Elapsed froze at the finish instant.
        assert_eq!(snap.elapsed_seconds, 3);
    }

    #[test]
    fn completion_is_reported_exactly_once() {
        let t0 = Instant::now();
        let mut engine = running_engine(2, t0);

        assert_eq!(engine.advance_lap(2, t0 + secs(1)), LapOutcome::Completed);
        assert_eq!(engine.advance_lap(1, t0 + secs(2)), LapOutcome::Ignored);
        assert_eq!(engine.advance_lap(1, t0 + secs(3)), LapOutcome::Ignored);
        assert_eq!(engine.remaining_laps(), 0);
    }

    #[test]
    fn oversized_step_saturates_at_zero() {
        let t0 = Instant::now();
        let mut engine = running_engine(1, t0);
        assert_eq!(engine.advance_lap(5, t0 + secs(1)), LapOutcome::Completed);
        assert_eq!(engine.remaining_laps(), 0);
        assert_eq!(engine.phase, RunPhase::Finished);
    }

    #[test]
    fn advance_ignored_while_paused_or_idle() {
        let t0 = Instant::now();
        let mut engine = EngineState::new();
        engine.configure(3, 10.0).unwrap();
        assert_eq!(engine.advance_lap(1, t0), LapOutcome::Ignored);

        engine.start(t0);
        engine.pause(t0 + secs(1));
        assert_eq!(engine.advance_lap(1, t0 + secs(2)), LapOutcome::Ignored);
        assert_eq!(engine.remaining_laps(), 3);
    }

    #[test]
    fn retreat_clamps_to_total_laps() {
        let t0 = Instant::now();
        let mut engine = running_engine(3, t0);
        engine.advance_lap(2, t0 + secs(1));
        assert_eq!(engine.remaining_laps(), 1);

        engine.retreat_lap(1);
        assert_eq!(engine.remaining_laps(), 2);
        engine.retreat_lap(10);
        assert_eq!(engine.remaining_laps(), 3);
    }

    #[test]
    fn retreat_ignored_outside_running() {
        let t0 = Instant::now();
        let mut engine = running_engine(1, t0);
        engine.advance_lap(1, t0 + secs(1));
        engine.retreat_lap(1);
        assert_eq!(engine.remaining_laps(), 0);
        assert_eq!(engine.phase, RunPhase::Finished);
    }

    #[test]
    fn finished_iff_remaining_is_zero() {
        let t0 = Instant::now();
        let mut engine = running_engine(2, t0);
        engine.advance_lap(1, t0 + secs(1));
        assert_eq!(engine.phase, RunPhase::Running);
        assert!(engine.remaining_laps() > 0);

        engine.advance_lap(1, t0 + secs(2));
        assert_eq!(engine.phase, RunPhase::Finished);
        assert_eq!(engine.remaining_laps(), 0);
    }

    #[test]
    fn counters_only_reset_keeps_the_plan() {
        let t0 = Instant::now();
        let mut engine = running_engine(3, t0);
        engine.advance_lap(3, t0 + secs(5));
        assert_eq!(engine.phase, RunPhase::Finished);

        engine.reset(ResetMode::CountersOnly);
        assert_eq!(engine.phase, RunPhase::Idle);
        assert_eq!(engine.remaining_laps(), 3);
        assert_eq!(engine.plan().unwrap().lap_length_m, 10.0);
        assert_eq!(engine.elapsed(t0 + secs(10)), Duration::ZERO);

        // The next run fires its own completion.
        engine.start(t0 + secs(10));
        assert_eq!(
            engine.advance_lap(3, t0 + secs(11)),
            LapOutcome::Completed
        );
    }

    #[test]
    fn full_reset_clears_the_plan() {
        let t0 = Instant::now();
        let mut engine = running_engine(3, t0);
        engine.reset(ResetMode::Full);
        assert_eq!(engine.phase, RunPhase::Idle);
        assert_eq!(engine.plan(), None);
        assert_eq!(engine.remaining_laps(), 0);

        // Unconfigured again: start is inert until the next configure.
        engine.start(t0 + secs(1));
        assert_eq!(engine.phase, RunPhase::Idle);
    }

    #[test]
    fn snapshot_before_start_is_zeroed() {
        let mut engine = EngineState::new();
        let snap = engine.snapshot(Instant::now());
        assert_eq!(snap.phase, RunPhase::Idle);
        assert_eq!(snap.elapsed_seconds, 0);
        assert_eq!(snap.total_laps, 0);
        assert_eq!(snap.total_distance_m, 0.0);

        engine.configure(5, 25.0).unwrap();
        let snap = engine.snapshot(Instant::now());
        assert_eq!(snap.total_laps, 5);
        assert_eq!(snap.remaining_laps, 5);
        assert_eq!(snap.completed_laps, 0);
        assert_eq!(snap.total_distance_m, 125.0);
    }

    #[test]
    fn snapshot_serializes_camel_case() {
        let t0 = Instant::now();
        let engine = running_engine(3, t0);
        let json = serde_json::to_value(engine.snapshot(t0 + secs(1))).unwrap();
        assert_eq!(json["phase"], "running");
        assert_eq!(json["remainingLaps"], 3);
        assert_eq!(json["totalDistanceM"], 30.0);
        assert!(json["sessionId"].is_string());
    }
}
