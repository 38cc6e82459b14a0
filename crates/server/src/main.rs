use std::{net::SocketAddr, sync::Arc};

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use shared::{
    api::{
        CreateRoomRequest, CreateRoomResponse, RoomRecord, TokenRequest, TokenResponse,
        INVITES_ROUTE, ROOMS_ROUTE, TOKEN_ROUTE,
    },
    error::{ApiError, ErrorCode},
};
use storage::Storage;
use tower_http::limit::RequestBodyLimitLayer;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

mod api;
mod app_state;
mod config;
mod livekit;

use api::ApiContext;
use app_state::AppState;
use config::{load_settings, prepare_database_url};
use livekit::LiveKitConfig;

const MAX_BODY_BYTES: usize = 16 * 1024;

type ApiResult<T> = Result<Json<T>, (StatusCode, Json<ApiError>)>;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let settings = load_settings();
    let database_url = prepare_database_url(&settings.database_url)?;
    let storage = Storage::new(&database_url).await.map_err(|error| {
        error!(
            %database_url,
            %error,
            "failed to open SQLite database; verify parent directory exists and permissions are correct"
        );
        error
    })?;

    if settings.livekit_url.is_none() {
        warn!("LIVEKIT_URL is not set; credential requests will be rejected");
    }

    let api = ApiContext {
        storage,
        livekit: LiveKitConfig {
            api_key: settings.livekit_api_key,
            api_secret: settings.livekit_api_secret,
            ttl_seconds: settings.livekit_ttl_seconds,
        },
        livekit_url: settings.livekit_url,
    };
    let app = build_router(Arc::new(AppState { api }));

    let addr: SocketAddr = settings.server_bind.parse()?;
    info!(%addr, "server listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route(TOKEN_ROUTE, post(http_issue_token))
        .route(ROOMS_ROUTE, post(http_create_room))
        .route(&format!("{ROOMS_ROUTE}/:room_id"), get(http_get_room))
        .route(
            &format!("{INVITES_ROUTE}/:invite_token"),
            get(http_get_room_by_invite),
        )
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .with_state(state)
}

async fn healthz(State(state): State<Arc<AppState>>) -> (StatusCode, &'static str) {
    match state.api.storage.health_check().await {
        Ok(()) => (StatusCode::OK, "ok"),
        Err(err) => {
            error!(error = %err, "health check failed");
            (StatusCode::SERVICE_UNAVAILABLE, "unavailable")
        }
    }
}

fn reject(err: ApiError) -> (StatusCode, Json<ApiError>) {
    let status = match err.code {
        ErrorCode::Validation => StatusCode::BAD_REQUEST,
        ErrorCode::NotFound => StatusCode::NOT_FOUND,
        ErrorCode::NotConfigured => StatusCode::SERVICE_UNAVAILABLE,
        ErrorCode::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(err))
}

async fn http_issue_token(
    State(state): State<Arc<AppState>>,
    Json(req): Json<TokenRequest>,
) -> ApiResult<TokenResponse> {
    api::issue_token(&state.api, req)
        .await
        .map(Json)
        .map_err(reject)
}

async fn http_create_room(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateRoomRequest>,
) -> ApiResult<CreateRoomResponse> {
    api::create_room(&state.api, req)
        .await
        .map(Json)
        .map_err(reject)
}

async fn http_get_room(
    State(state): State<Arc<AppState>>,
    Path(room_id): Path<String>,
) -> ApiResult<RoomRecord> {
    api::get_room(&state.api, &room_id)
        .await
        .map(Json)
        .map_err(reject)
}

async fn http_get_room_by_invite(
    State(state): State<Arc<AppState>>,
    Path(invite_token): Path<String>,
) -> ApiResult<RoomRecord> {
    api::get_room_by_invite(&state.api, &invite_token)
        .await
        .map(Json)
        .map_err(reject)
}

#[cfg(test)]
#[path = "tests/main_tests.rs"]
mod tests;
