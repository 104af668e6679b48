//! HTTP server implementation using Axum.

use crate::error::EngineError;
use crate::grid::Point;
use crate::overlay::SessionInfo;
use crate::simulation::{Agent, SimulationReport};
use crate::state::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

// Request/Response types
#[derive(Serialize)]
struct MapsResponse {
    success: bool,
    maps: Vec<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct MapDataResponse {
    success: bool,
    map_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    session_id: Option<String>,
    map_data: Vec<Vec<u8>>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateMapRequest {
    map_name: String,
    session_id: String,
    block: Point,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct UpdateMapResponse {
    success: bool,
    map: String,
    session_id: String,
    updated_map: Vec<Vec<u8>>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RunRequest {
    map_name: String,
    #[serde(default)]
    session_id: Option<String>,
    agents: Vec<Agent>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RunResponse {
    success: bool,
    map: String,
    total_agents: usize,
    #[serde(flatten)]
    report: SimulationReport,
}

#[derive(Serialize)]
struct CreateSessionResponse {
    session_id: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ErrorBody {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    available_maps: Option<Vec<String>>,
}

type ApiError = (StatusCode, Json<ErrorBody>);

fn api_error(err: EngineError) -> ApiError {
    let status = match err {
        EngineError::UnknownMap { .. } | EngineError::InvalidSession { .. } => StatusCode::NOT_FOUND,
        EngineError::OutOfBounds { .. } => StatusCode::BAD_REQUEST,
        EngineError::Worker(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (
        status,
        Json(ErrorBody {
            error: err.to_string(),
            available_maps: None,
        }),
    )
}

/// Build the router over the given state.
pub fn router(state: AppState) -> Router {
    let simulation = Router::new()
        .route("/run", post(run_simulation))
        .route("/update-map", post(update_map))
        .route("/maps", get(list_maps))
        .route("/maps/:map_name", get(get_map))
        .route("/maps/:map_name/:session_id", get(get_session_map));

    Router::new()
        .nest("/api/simulation", simulation)
        // Session management
        .route("/sessions", post(create_session).get(list_sessions))
        .route("/sessions/:id", get(get_session).delete(delete_session))
        // Health check
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Serve on an already bound listener.
pub async fn serve(listener: TcpListener, state: AppState) -> std::io::Result<()> {
    axum::serve(listener, router(state)).await
}

/// Run the HTTP server on the given port with the provided state.
pub async fn run_server(port: u16, state: AppState) -> std::io::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!("Starting HTTP server on {}", addr);

    let listener = TcpListener::bind(addr).await?;
    serve(listener, state).await
}

async fn health() -> &'static str {
    "OK"
}

async fn list_maps(State(state): State<AppState>) -> Json<MapsResponse> {
    Json(MapsResponse {
        success: true,
        maps: state.engine.list_maps(),
    })
}

async fn get_map(
    State(state): State<AppState>,
    Path(map_name): Path<String>,
) -> Result<Json<MapDataResponse>, ApiError> {
    map_data(&state, map_name, None).await
}

async fn get_session_map(
    State(state): State<AppState>,
    Path((map_name, session_id)): Path<(String, String)>,
) -> Result<Json<MapDataResponse>, ApiError> {
    map_data(&state, map_name, Some(session_id)).await
}

async fn map_data(
    state: &AppState,
    map_name: String,
    session_id: Option<String>,
) -> Result<Json<MapDataResponse>, ApiError> {
    let grid = state
        .engine
        .get_grid(&map_name, session_id.as_deref())
        .await
        .map_err(api_error)?;
    let canonical = state.engine.catalog().get(&map_name).map_err(api_error)?;

    // sessionId is only echoed when the session's own overlay was served
    Ok(Json(MapDataResponse {
        success: true,
        session_id: session_id.filter(|_| !Arc::ptr_eq(&grid, &canonical)),
        map_name,
        map_data: grid.to_rows(),
    }))
}

async fn update_map(
    State(state): State<AppState>,
    Json(req): Json<UpdateMapRequest>,
) -> Result<Json<UpdateMapResponse>, ApiError> {
    let grid = state
        .engine
        .block_cell(&req.map_name, &req.session_id, req.block.x, req.block.y)
        .await
        .map_err(|err| match err {
            // Only an empty session id gets here; treat it as a malformed body
            EngineError::InvalidSession { .. } => (
                StatusCode::BAD_REQUEST,
                Json(ErrorBody {
                    error: "Missing required field: sessionId".to_string(),
                    available_maps: None,
                }),
            ),
            other => api_error(other),
        })?;

    info!(map = %req.map_name, session = %req.session_id, block = %req.block, "Blocked cell");
    Ok(Json(UpdateMapResponse {
        success: true,
        map: req.map_name,
        session_id: req.session_id,
        updated_map: grid.to_rows(),
    }))
}

async fn run_simulation(
    State(state): State<AppState>,
    Json(req): Json<RunRequest>,
) -> Result<Json<RunResponse>, ApiError> {
    info!("POST /run - map: {}, agents: {}", req.map_name, req.agents.len());
    let total_agents = req.agents.len();

    let report = state
        .engine
        .run_simulation(&req.map_name, req.session_id.as_deref(), req.agents)
        .await
        .map_err(|err| match err {
            EngineError::UnknownMap { .. } => (
                StatusCode::BAD_REQUEST,
                Json(ErrorBody {
                    error: "Invalid map name".to_string(),
                    available_maps: Some(state.engine.list_maps()),
                }),
            ),
            other => api_error(other),
        })?;

    Ok(Json(RunResponse {
        success: true,
        map: req.map_name,
        total_agents,
        report,
    }))
}

async fn create_session(State(state): State<AppState>) -> (StatusCode, Json<CreateSessionResponse>) {
    let session_id = uuid::Uuid::new_v4().to_string();
    state.engine.sessions().create(&session_id).await;
    (StatusCode::CREATED, Json(CreateSessionResponse { session_id }))
}

async fn list_sessions(State(state): State<AppState>) -> Json<Vec<SessionInfo>> {
    Json(state.engine.sessions().list().await)
}

async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SessionInfo>, ApiError> {
    let info = state.engine.sessions().get(&id).await.map_err(api_error)?;
    Ok(Json(info))
}

async fn delete_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.engine.sessions().evict(&id).await.map_err(api_error)?;
    Ok(StatusCode::NO_CONTENT)
}
