use anyhow::Result;
use log::{info, warn};
use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;

use crate::engine::EngineController;

/// On-screen control commands, forwarded verbatim by whatever front-end
/// draws the buttons.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum UiCommand {
    Start,
    Pause,
    AdvanceLap,
    RetreatLap,
    Reset,
    Quit,
}

/// One line of the stdin protocol. The physical button driver and the
/// on-screen controls speak the same shape; only the tag differs.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum InputEvent {
    ButtonPressed,
    Ui { command: UiCommand },
    ConfigurationSubmitted { total_laps: u32, lap_length_m: f64 },
}

/// Drains input lines until `quit`, EOF, or cancellation. Malformed lines
/// are logged and skipped; a flaky front-end must not take the kiosk down.
pub async fn input_loop(
    controller: EngineController,
    cancel_token: CancellationToken,
) -> Result<()> {
    let stdin = BufReader::new(tokio::io::stdin());
    let mut lines = stdin.lines();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                match line? {
                    Some(line) => {
                        let trimmed = line.trim();
                        if trimmed.is_empty() {
                            continue;
                        }
                        match serde_json::from_str::<InputEvent>(trimmed) {
                            Ok(event) => {
                                if dispatch(&controller, event).await == Flow::Quit {
                                    break;
                                }
                            }
                            Err(err) => warn!("skipping malformed input line: {err}"),
                        }
                    }
                    None => {
                        info!("input stream closed");
                        break;
                    }
                }
            }
            _ = cancel_token.cancelled() => {
                info!("input loop shutting down");
                break;
            }
        }
    }

    cancel_token.cancel();
    Ok(())
}

#[derive(Debug, PartialEq, Eq)]
enum Flow {
    Continue,
    Quit,
}

async fn dispatch(controller: &EngineController, event: InputEvent) -> Flow {
    match event {
        InputEvent::ButtonPressed => controller.press_button().await,
        InputEvent::Ui { command } => match command {
            UiCommand::Start => controller.start().await,
            UiCommand::Pause => controller.pause().await,
            UiCommand::AdvanceLap => controller.advance_lap(1).await,
            UiCommand::RetreatLap => controller.retreat_lap(1).await,
            UiCommand::Reset => controller.reset().await,
            UiCommand::Quit => return Flow::Quit,
        },
        InputEvent::ConfigurationSubmitted {
            total_laps,
            lap_length_m,
        } => {
            if let Err(err) = controller.configure(total_laps, lap_length_m).await {
                // The intake front-end re-prompts; nothing fatal here.
                warn!("{err}");
            }
        }
    }
    Flow::Continue
}
