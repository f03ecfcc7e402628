//! HTTP request handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;
use sxm_common::events::{InboundEvent, Presence};
use tracing::{debug, info};

use super::server::AppContext;
use crate::carousel::{CarouselView, Direction, Navigation};
use crate::commands::{CommandRequest, Reply};
use crate::player::PlayerSnapshot;
use crate::reconciler::PendingLive;

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    status: String,
    module: String,
    version: String,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    status: String,
}

#[derive(Debug, Serialize)]
pub struct BotStatusResponse {
    player: PlayerSnapshot,
    player_generation: u64,
    sxm_running: bool,
    channel_count: usize,
    stream_channel: Option<String>,
    pending: Option<PendingLive>,
    carousels: usize,
    presence: Option<Presence>,
    last_announcement: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct NavigationResponse {
    handled: bool,
    view: CarouselView,
}

type ApiError = (StatusCode, Json<StatusResponse>);

fn api_error(code: StatusCode, status: impl Into<String>) -> ApiError {
    (
        code,
        Json(StatusResponse {
            status: status.into(),
        }),
    )
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /health
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        module: "sxm-bot".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// GET /status - player, upstream and presentation state
pub async fn get_status(State(ctx): State<AppContext>) -> Json<BotStatusResponse> {
    let slot = ctx.reconciler.slot();
    let player = slot.get().snapshot().await;
    let state = ctx.reconciler.snapshot().await;

    Json(BotStatusResponse {
        player,
        player_generation: slot.generation(),
        sxm_running: state.sxm_running,
        channel_count: state.channels.len(),
        stream_channel: state.stream_channel,
        pending: state.pending,
        carousels: ctx.carousels.count(),
        presence: ctx.state.get_presence().await,
        last_announcement: ctx.state.get_last_announcement().await,
    })
}

/// POST /commands - run a chat command
pub async fn run_command(
    State(ctx): State<AppContext>,
    Json(request): Json<CommandRequest>,
) -> Json<Reply> {
    info!("Command request: {} from {}", request.name, request.caller.user_id);
    Json(ctx.commands.dispatch(&request).await)
}

/// POST /carousels/:id/:direction - page through a carousel
pub async fn navigate_carousel(
    State(ctx): State<AppContext>,
    Path((id, direction)): Path<(String, String)>,
) -> Result<Json<NavigationResponse>, ApiError> {
    let direction: Direction = direction
        .parse()
        .map_err(|e: String| api_error(StatusCode::BAD_REQUEST, format!("error: {}", e)))?;

    match ctx.carousels.navigate(&id, direction) {
        Some((outcome, view)) => {
            debug!("Carousel {} navigated {:?}: {:?}", id, direction, outcome);
            Ok(Json(NavigationResponse {
                handled: outcome == Navigation::Moved,
                view,
            }))
        }
        None => Err(api_error(
            StatusCode::NOT_FOUND,
            format!("error: carousel not found: {}", id),
        )),
    }
}

/// POST /events - inject an event from the stream-acquisition side
pub async fn inject_event(
    State(ctx): State<AppContext>,
    Json(event): Json<InboundEvent>,
) -> Result<(StatusCode, Json<StatusResponse>), ApiError> {
    debug!("Inbound event via HTTP: {}", event.name());

    if ctx.inbound.send(event) {
        Ok((
            StatusCode::ACCEPTED,
            Json(StatusResponse {
                status: "accepted".to_string(),
            }),
        ))
    } else {
        Err(api_error(
            StatusCode::SERVICE_UNAVAILABLE,
            "error: inbound queue full",
        ))
    }
}
