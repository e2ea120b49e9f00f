pub mod controller;
pub mod events;
pub mod state;

pub use controller::EngineController;
pub use events::EngineEvent;
pub use state::{DisplaySnapshot, EngineError, EngineState, LapOutcome, ResetMode, RunPhase, RunPlan};
