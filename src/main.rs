//! XIAO MG24 Sense audio recorder
//!
//! Desktop application capturing audio from the board over USB-CDC.

use anyhow::Context;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use xiao_recorder::app::{self, AppState};
use xiao_recorder::config::AppConfig;
use xiao_recorder::recorder::Recorder;
use xiao_recorder::transport::SerialBackend;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "xiao_recorder=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("xiao-recorder v{}", env!("CARGO_PKG_VERSION"));

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(1)
        .thread_name("capture")
        .build()
        .context("Cannot start the capture runtime")?;

    let config = AppConfig::load();
    let recorder = Recorder::new(runtime.handle().clone());
    let state = AppState::new(config, Box::new(SerialBackend), recorder);

    tracing::info!("Serial ports: {:?}", state.ports());

    app::run(state).map_err(|e| anyhow::anyhow!("UI error: {}", e))?;

    tracing::info!("xiao-recorder stopped");
    Ok(())
}
