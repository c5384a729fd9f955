//! Parley WebSocket host.
//!
//! Binary messages carry inbound PCM16 audio, text messages carry JSON
//! control messages. Every connection gets its own session; nothing is
//! shared between sessions except the collaborator handles.

mod connection;
mod settings;
mod state;

use std::path::PathBuf;

use anyhow::Context;
use parley_core::services::Collaborators;
use settings::{apply_env_overrides, default_settings_path, load_settings, save_settings};
use state::ServerState;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("parley=info,parley_core=info,parley_server=info")),
        )
        .init();

    let settings_path = std::env::var_os("PARLEY_SETTINGS")
        .map(PathBuf::from)
        .unwrap_or_else(default_settings_path);
    let mut settings = load_settings(&settings_path);
    if !settings_path.exists() {
        match save_settings(&settings_path, &settings) {
            Ok(()) => info!(path = %settings_path.display(), "wrote default settings"),
            Err(e) => warn!(path = %settings_path.display(), error = %e, "could not write default settings"),
        }
    }
    apply_env_overrides(&mut settings);

    let listener = TcpListener::bind(&settings.bind_addr)
        .await
        .with_context(|| format!("binding {}", settings.bind_addr))?;
    info!(
        addr = %listener.local_addr()?,
        settings = %settings_path.display(),
        reply_mode = ?settings.reply_mode,
        barge_in = ?settings.barge_in,
        inline_audio = settings.inline_audio,
        "parley listening"
    );

    let state = ServerState::new(settings, Collaborators::stub());

    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    if let Err(e) = stream.set_nodelay(true) {
                        warn!(%peer, error = %e, "set_nodelay failed");
                    }
                    tokio::spawn(connection::serve(stream, peer, state.clone()));
                }
                Err(e) => warn!(error = %e, "accept failed"),
            },
            _ = tokio::signal::ctrl_c() => {
                info!(open_connections = state.open_connections(), "shutting down");
                break;
            }
        }
    }

    match serde_json::to_string(&state.totals()) {
        Ok(totals) => info!(%totals, "session totals"),
        Err(e) => warn!(error = %e, "could not serialize totals"),
    }
    Ok(())
}
