#![deny(clippy::all)]

mod api;
mod config;
mod console;
mod error;
mod flag_store;
mod session;
mod storage;
#[cfg(test)]
mod testing;
mod voice;

use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::api::{Collaborators, HttpApiClient};
use crate::config::Config;
use crate::flag_store::{FlagStore, JsonFlagStore};
use crate::session::SessionController;
use crate::storage::TranscriptExporter;
use crate::voice::VoiceChannel;

/// Practice a technical interview with an AI interviewer
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Id of the interview session to open
    session_id: String,

    /// TOML file overriding the built-in configuration
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present (silently ignore if missing)
    let _ = dotenvy::dotenv();

    // Initialize tracing for structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let args = Args::parse();
    let config = Config::load(args.config.as_deref()).context("Failed to load configuration")?;

    let client = HttpApiClient::new(&config.api)?;
    let collaborators = Collaborators::http(client);

    let flag_store = match &config.storage.flag_store_path {
        Some(path) => JsonFlagStore::new(path),
        None => JsonFlagStore::in_data_dir()?,
    };
    info!("Using flag store at {:?}", flag_store.path());
    let flags: Arc<dyn FlagStore> = Arc::new(flag_store);

    let exporter = match TranscriptExporter::from_config(config.storage.transcript_dir.as_deref()) {
        Ok(exporter) => Some(exporter),
        Err(e) => {
            warn!("Transcript export unavailable: {}", e);
            None
        }
    };

    let (voice, voice_task) = VoiceChannel::spawn(config.voice.clone());

    let controller = SessionController::load(
        &args.session_id,
        collaborators,
        flags,
        voice.clone(),
        config.session.clone(),
    )
    .await
    .with_context(|| format!("Could not open session {}", args.session_id))?;

    let resumed = controller.is_resumed();
    let (session, session_task) = controller.start().await;
    info!(session_id = %args.session_id, resumed, "Session started");

    let console = console::Console::new(session.clone(), voice.clone(), exporter).await?;
    let result = console.run().await;

    // Unmount: flush and close voice without ending the session remotely
    session.shutdown().await;
    voice.shutdown().await;
    let _ = session_task.await;
    voice_task.abort();

    result
}
