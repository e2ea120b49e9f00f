pub mod config;
pub mod display;
pub mod engine;
pub mod input;

use anyhow::Result;
use tokio_util::sync::CancellationToken;

use config::KioskConfig;
use engine::EngineController;

/// Wire up the kiosk core and run it until the front-end says quit or the
/// input stream closes. Input events arrive as JSON lines on stdin; display
/// state leaves as JSON lines on stdout.
pub async fn run() -> Result<()> {
    // Initialize logging (reads RUST_LOG env var)
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    let config = KioskConfig::from_env();
    log::info!(
        "lapkiosk starting up (tick {:?}, reset mode {:?})",
        config.tick_interval,
        config.reset_mode
    );

    let controller = EngineController::new(&config);
    let cancel_token = CancellationToken::new();

    let events = controller.subscribe();
    let display_task = tokio::spawn(display::display_loop(events, cancel_token.clone()));

    input::input_loop(controller, cancel_token.clone()).await?;

    cancel_token.cancel();
    display_task.await??;
    Ok(())
}
