//! sxm-bot - Main entry point
//!
//! Wires the player, the status reconciler and the carousel registry to the
//! HTTP control surface, then runs until Ctrl+C / SIGTERM.

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use sxm_common::db::{init_database, SongRepository, SqliteSongRepository};
use sxm_common::events::{BotEvent, OutboundEvent};
use tokio::signal;
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use sxm_bot::api::{self, AppContext};
use sxm_bot::audio::{FfmpegSourceFactory, PipeConnector};
use sxm_bot::carousel::CarouselRegistry;
use sxm_bot::commands::{BotContext, CommandRouter};
use sxm_bot::config::{BotConfig, CliArgs};
use sxm_bot::player::{PlayerDeps, PlayerSlot};
use sxm_bot::reconciler::{PlayerState, StatusReconciler};
use sxm_bot::state::{BotOutput, SharedState};

/// Buffered requests for the stream-acquisition side
const OUTBOUND_CAPACITY: usize = 32;

/// Archive database file name inside the processed folder
const ARCHIVE_DB_NAME: &str = "db.sqlite";

#[tokio::main]
async fn main() -> Result<()> {
    let args = CliArgs::parse();
    let config = BotConfig::load(args).context("Failed to load configuration")?;

    // Initialize tracing (RUST_LOG wins over the configured level)
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.log_level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting sxm-bot v{}", env!("CARGO_PKG_VERSION"));
    info!("Command root: /{}", config.root_command);

    // Archive repository (optional)
    let database_path = config.database_path.clone().or_else(|| {
        config
            .processed_folder
            .as_ref()
            .map(|folder| folder.join(ARCHIVE_DB_NAME))
    });
    let repository: Option<Arc<dyn SongRepository>> = match database_path {
        Some(path) => {
            let pool = init_database(&path)
                .await
                .context("Failed to open archive database")?;
            Some(Arc::new(SqliteSongRepository::new(pool)))
        }
        None => {
            info!("No archive configured; archive commands disabled");
            None
        }
    };

    let state = Arc::new(SharedState::new(config.output_channel_id.clone()));

    // Player
    let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_CAPACITY);
    let deps = PlayerDeps {
        timings: config.player.clone(),
        connector: Arc::new(PipeConnector::new(config.output_root.clone())),
        sources: Arc::new(FfmpegSourceFactory::new(
            config.ffmpeg_path.to_string_lossy().into_owned(),
        )),
        outbound: outbound_tx,
        events: state.event_tx.clone(),
    };
    let slot = Arc::new(PlayerSlot::new(deps));
    info!("Audio player initialized (output root: {})", config.output_root.display());

    let (reconciler, inbound) = StatusReconciler::new(
        config.reconciler.clone(),
        slot.clone(),
        state.clone(),
        PlayerState::default(),
    );
    let reconciler = Arc::new(reconciler);

    let carousels = Arc::new(CarouselRegistry::new(config.carousel.clone()));
    carousels.start();

    let context = Arc::new(BotContext::new(
        config.root_command.clone(),
        reconciler.clone(),
        repository,
        carousels.clone(),
        config.reconciler.switch_delay(),
    ));
    let commands = Arc::new(CommandRouter::for_playback(context, config.archive_enabled()));

    let forwarder = tokio::spawn(forward_outbound(outbound_rx, state.clone()));

    reconciler.announce_ready(&config.root_command).await;
    reconciler.start();

    let ctx = AppContext {
        state: state.clone(),
        commands,
        carousels: carousels.clone(),
        reconciler: reconciler.clone(),
        inbound,
    };
    let served = api::run(&config.bind_addr, ctx, shutdown_signal()).await;

    // Shutdown sequence
    info!("Shutting down...");
    reconciler.stop().await;
    carousels.stop();
    slot.shutdown().await;
    state.announce("Music bot shutting down").await;
    forwarder.abort();

    served.context("HTTP server failed")?;
    info!("Shutdown complete");
    Ok(())
}

/// Publish outbound requests to observers of the event stream
async fn forward_outbound(mut rx: mpsc::Receiver<OutboundEvent>, state: Arc<SharedState>) {
    while let Some(event) = rx.recv().await {
        info!("Outbound request: {:?}", event);
        state.broadcast_event(BotEvent::StreamRequested {
            event,
            timestamp: Utc::now(),
        });
    }
    warn!("Outbound channel closed");
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
