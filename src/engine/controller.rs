use std::{sync::Arc, time::Instant};

use log::{debug, info, warn};
use tokio::{
    sync::{broadcast, Mutex},
    task::JoinHandle,
    time::{self, Duration, MissedTickBehavior},
};

use crate::config::KioskConfig;

use super::{
    events::{event_channel, EngineEvent},
    state::{DisplaySnapshot, EngineError, EngineState, LapOutcome, ResetMode, RunPhase},
};

/// Serialized command surface over the state machine. The physical-button
/// interrupt path and the on-screen-control path both land here, and every
/// command takes the one lock, reads the clock once, applies the
/// transition, and emits the resulting snapshot. Two sources firing in the
/// same tick can therefore never lose or duplicate a transition.
#[derive(Clone)]
pub struct EngineController {
    state: Arc<Mutex<EngineState>>,
    events: broadcast::Sender<EngineEvent>,
    ticker: Arc<Mutex<Option<JoinHandle<()>>>>,
    tick_interval: Duration,
    reset_mode: ResetMode,
    debug_heartbeat: bool,
}

impl EngineController {
    pub fn new(config: &KioskConfig) -> Self {
        let (events, _) = event_channel();
        Self {
            state: Arc::new(Mutex::new(EngineState::new())),
            events,
            ticker: Arc::new(Mutex::new(None)),
            tick_interval: config.tick_interval,
            reset_mode: config.reset_mode,
            debug_heartbeat: config.debug,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }

    pub async fn snapshot(&self) -> DisplaySnapshot {
        self.state.lock().await.snapshot(Instant::now())
    }

    /// One-time intake of lap count and lap length. Invalid values bounce
    /// back to the intake front-end; a configure arriving mid-run is
    /// ignored rather than clobbering the active counters.
    pub async fn configure(&self, total_laps: u32, lap_length_m: f64) -> Result<(), EngineError> {
        let snapshot = {
            let mut state = self.state.lock().await;
            let accepted = state.configure(total_laps, lap_length_m)?;
            if !accepted {
                warn!(
                    "ignoring configuration ({} laps, {} m) while {:?}",
                    total_laps, lap_length_m, state.phase
                );
                return Ok(());
            }
            info!("configured: {} laps of {} m", total_laps, lap_length_m);
            state.snapshot(Instant::now())
        };
        self.emit(EngineEvent::StateChanged { snapshot });
        Ok(())
    }

    /// Start, or resume from pause. Idempotent while running.
    pub async fn start(&self) {
        let snapshot = {
            let mut state = self.state.lock().await;
            let now = Instant::now();
            let was = state.phase;
            state.start(now);
            if was != state.phase {
                info!("phase {:?} -> {:?}", was, state.phase);
            }
            state.snapshot(now)
        };
        if snapshot.phase == RunPhase::Running {
            self.spawn_ticker().await;
        }
        self.emit(EngineEvent::StateChanged { snapshot });
    }

    pub async fn pause(&self) {
        let snapshot = {
            let mut state = self.state.lock().await;
            let now = Instant::now();
            state.pause(now);
            state.snapshot(now)
        };
        self.emit(EngineEvent::StateChanged { snapshot });
    }

    pub async fn advance_lap(&self, step: u32) {
        let (outcome, snapshot) = {
            let mut state = self.state.lock().await;
            let now = Instant::now();
            let outcome = state.advance_lap(step, now);
            (outcome, state.snapshot(now))
        };
        self.after_advance(outcome, snapshot).await;
    }

    pub async fn retreat_lap(&self, step: u32) {
        let snapshot = {
            let mut state = self.state.lock().await;
            state.retreat_lap(step);
            state.snapshot(Instant::now())
        };
        self.emit(EngineEvent::StateChanged { snapshot });
    }

    /// The overloaded physical button: first press starts the clock, every
    /// later press counts a lap. Classified from the phase under the same
    /// lock that applies the command, so the classification cannot go stale
    /// between read and apply.
    pub async fn press_button(&self) {
        let (outcome, snapshot) = {
            let mut state = self.state.lock().await;
            let now = Instant::now();
            match state.phase {
                RunPhase::Idle => {
                    state.start(now);
                    (None, state.snapshot(now))
                }
                _ => {
                    let outcome = state.advance_lap(1, now);
                    (Some(outcome), state.snapshot(now))
                }
            }
        };
        match outcome {
            None => {
                if snapshot.phase == RunPhase::Running {
                    self.spawn_ticker().await;
                }
                self.emit(EngineEvent::StateChanged { snapshot });
            }
            Some(outcome) => self.after_advance(outcome, snapshot).await,
        }
    }

    pub async fn reset(&self) {
        let snapshot = {
            let mut state = self.state.lock().await;
            state.reset(self.reset_mode);
            info!("reset ({:?})", self.reset_mode);
            state.snapshot(Instant::now())
        };
        self.cancel_ticker().await;
        self.emit(EngineEvent::StateChanged { snapshot });
    }

    async fn after_advance(&self, outcome: LapOutcome, snapshot: DisplaySnapshot) {
        if outcome == LapOutcome::Ignored {
            debug!("lap command ignored in phase {:?}", snapshot.phase);
            return;
        }
        let completed = outcome == LapOutcome::Completed;
        let completion = completed.then(|| EngineEvent::SequenceCompleted {
            session_id: snapshot.session_id,
            elapsed_seconds: snapshot.elapsed_seconds,
            total_laps: snapshot.total_laps,
            total_distance_m: snapshot.total_distance_m,
        });
        self.emit(EngineEvent::StateChanged { snapshot });
        if let Some(event) = completion {
            info!("sequence completed");
            self.emit(event);
            self.cancel_ticker().await;
        }
    }

    async fn spawn_ticker(&self) {
        let mut ticker_guard = self.ticker.lock().await;
        if let Some(handle) = ticker_guard.take() {
            handle.abort();
        }

        let state = self.state.clone();
        let events = self.events.clone();
        let tick_interval = self.tick_interval;
        let debug_heartbeat = self.debug_heartbeat;

        let handle = tokio::spawn(async move {
            let mut interval = time::interval(tick_interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                let snapshot = {
                    let guard = state.lock().await;
                    if guard.phase != RunPhase::Running {
                        break;
                    }
                    guard.snapshot(Instant::now())
                };
                if debug_heartbeat {
                    debug!(
                        "heartbeat: {}s elapsed, {} laps to go",
                        snapshot.elapsed_seconds, snapshot.remaining_laps
                    );
                }
                let _ = events.send(EngineEvent::Heartbeat { snapshot });
            }
        });

        *ticker_guard = Some(handle);
    }

    async fn cancel_ticker(&self) {
        if let Some(handle) = self.ticker.lock().await.take() {
            handle.abort();
        }
    }

    fn emit(&self, event: EngineEvent) {
        // Nobody listening is fine; the bus is best-effort by design of
        // broadcast channels.
        let _ = self.events.send(event);
    }
}
