use serde::Serialize;
use tokio::sync::broadcast;
use uuid::Uuid;

use super::state::DisplaySnapshot;

/// Everything the presentation side can observe, pushed over a broadcast
/// bus. `SequenceCompleted` is the one-shot: it fires once per completed
/// run, which is how the front-end knows to launch the celebration instead
/// of inferring it from repeated `finished` snapshots.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum EngineEvent {
    StateChanged {
        snapshot: DisplaySnapshot,
    },
    Heartbeat {
        snapshot: DisplaySnapshot,
    },
    SequenceCompleted {
        session_id: Option<Uuid>,
        elapsed_seconds: u64,
        total_laps: u32,
        total_distance_m: f64,
    },
}

const EVENT_CHANNEL_CAPACITY: usize = 64;

pub fn event_channel() -> (
    broadcast::Sender<EngineEvent>,
    broadcast::Receiver<EngineEvent>,
) {
    broadcast::channel(EVENT_CHANNEL_CAPACITY)
}
