use std::time::Duration;

use log::warn;

use crate::engine::ResetMode;

const DEFAULT_TICK_MS: u64 = 1000;

/// Process-level knobs, resolved once at startup from the environment.
/// The run parameters themselves (lap count, lap length) are not here:
/// they arrive through the intake flow as a `configurationSubmitted`
/// input event, however the front-end chose to collect them.
#[derive(Debug, Clone)]
pub struct KioskConfig {
    /// Heartbeat cadence of the engine ticker. The front-end's own frame
    /// loop may poll faster; this only paces pushed snapshots.
    pub tick_interval: Duration,
    /// What `reset` restores: counters only (keep the configured plan) or
    /// everything (front-end re-prompts for laps, like the early hardware).
    pub reset_mode: ResetMode,
    pub debug: bool,
}

impl Default for KioskConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_millis(DEFAULT_TICK_MS),
            reset_mode: ResetMode::CountersOnly,
            debug: false,
        }
    }
}

impl KioskConfig {
    pub fn from_env() -> Self {
        let debug = std::env::var("LAPKIOSK_DEBUG")
            .map(|value| value == "1" || value.eq_ignore_ascii_case("true"))
            .unwrap_or(false);

        let tick_interval = match std::env::var("LAPKIOSK_TICK_MS") {
            Ok(raw) => match raw.parse::<u64>() {
                Ok(ms) if ms > 0 => Duration::from_millis(ms),
                _ => {
                    warn!("ignoring invalid LAPKIOSK_TICK_MS={:?}", raw);
                    Duration::from_millis(DEFAULT_TICK_MS)
                }
            },
            Err(_) => Duration::from_millis(DEFAULT_TICK_MS),
        };

        let reset_mode = match std::env::var("LAPKIOSK_RESET_MODE") {
            Ok(raw) if raw.eq_ignore_ascii_case("full") => ResetMode::Full,
            Ok(raw) if raw.eq_ignore_ascii_case("counters") => ResetMode::CountersOnly,
            Ok(raw) => {
                warn!("ignoring unknown LAPKIOSK_RESET_MODE={:?}", raw);
                ResetMode::CountersOnly
            }
            Err(_) => ResetMode::CountersOnly,
        };

        Self {
            tick_interval,
            reset_mode,
            debug,
        }
    }
}
