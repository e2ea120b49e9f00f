use anyhow::{Context, Result};
use log::{info, warn};
use tokio::io::AsyncWriteExt;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::engine::EngineEvent;

/// Bridge to the rendering front-end: every engine event goes out as one
/// JSON line on stdout. The renderer draws snapshots however it likes and
/// launches its celebration on the single `sequenceCompleted` line; this
/// side neither knows nor cares what that looks like.
pub async fn display_loop(
    mut events: broadcast::Receiver<EngineEvent>,
    cancel_token: CancellationToken,
) -> Result<()> {
    let mut stdout = tokio::io::stdout();

    loop {
        tokio::select! {
            received = events.recv() => {
                match received {
                    Ok(event) => {
                        let mut line = serde_json::to_vec(&event)
                            .context("failed to encode engine event")?;
                        line.push(b'\n');
                        stdout
                            .write_all(&line)
                            .await
                            .context("failed to write to display stream")?;
                        stdout
                            .flush()
                            .await
                            .context("failed to flush display stream")?;
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        // Snapshots are self-contained, so dropped ones only
                        // cost the renderer a stale frame.
                        warn!("display stream lagged, {skipped} events dropped");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            _ = cancel_token.cancelled() => {
                info!("display loop shutting down");
                break;
            }
        }
    }

    Ok(())
}
