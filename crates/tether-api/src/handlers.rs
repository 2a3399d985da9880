//! HTTP API handlers: the discovery registry as JSON.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

use tether_core::{NodeId, SignedEntry, TransportId};
use tether_services::{DiscoveryClient, DiscoveryError, EntryWithStatus, MemoryDiscovery, Status};

#[derive(Clone)]
pub struct ApiState {
    pub discovery: MemoryDiscovery,
}

impl ApiState {
    pub fn new(discovery: MemoryDiscovery) -> Self {
        Self { discovery }
    }
}

// ── Errors ────────────────────────────────────────────────────────────────────

/// Machine-readable error class, mirrored by `HttpDiscovery`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    AlreadyRegistered,
    InvalidEntry,
    BadRequest,
    Internal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub kind: ErrorKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<TransportId>,
}

type ApiError = (StatusCode, Json<ErrorBody>);

fn reject(e: DiscoveryError) -> ApiError {
    let (status, kind, id) = match &e {
        DiscoveryError::NotFound(id) => (StatusCode::NOT_FOUND, ErrorKind::NotFound, Some(*id)),
        DiscoveryError::AlreadyRegistered(id) => {
            (StatusCode::CONFLICT, ErrorKind::AlreadyRegistered, Some(*id))
        }
        DiscoveryError::InvalidEntry(_) => (StatusCode::BAD_REQUEST, ErrorKind::InvalidEntry, None),
        DiscoveryError::Unavailable(_) => {
            (StatusCode::INTERNAL_SERVER_ERROR, ErrorKind::Internal, None)
        }
    };
    (
        status,
        Json(ErrorBody {
            error: e.to_string(),
            kind,
            id,
        }),
    )
}

fn bad_request(msg: impl Into<String>) -> ApiError {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorBody {
            error: msg.into(),
            kind: ErrorKind::BadRequest,
            id: None,
        }),
    )
}

// ── /health ───────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub transports: usize,
}

pub async fn handle_health(State(state): State<ApiState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        transports: state.discovery.len(),
    })
}

// ── /transports (POST) ────────────────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize)]
pub struct RegisterRequest {
    pub entries: Vec<SignedEntry>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RegisterResponse {
    pub registered: usize,
}

pub async fn handle_register(
    State(state): State<ApiState>,
    Json(req): Json<RegisterRequest>,
) -> Result<Json<RegisterResponse>, ApiError> {
    state
        .discovery
        .register_transports(&req.entries)
        .await
        .map_err(reject)?;
    Ok(Json(RegisterResponse {
        registered: req.entries.len(),
    }))
}

// ── /statuses (POST) ──────────────────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize)]
pub struct StatusRequest {
    pub statuses: Vec<Status>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub updated: Vec<EntryWithStatus>,
}

pub async fn handle_statuses(
    State(state): State<ApiState>,
    Json(req): Json<StatusRequest>,
) -> Result<Json<StatusResponse>, ApiError> {
    let updated = state
        .discovery
        .update_statuses(&req.statuses)
        .await
        .map_err(reject)?;
    Ok(Json(StatusResponse { updated }))
}

// ── /transports/id/{id} (GET) ─────────────────────────────────────────────────

pub async fn handle_get_by_id(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<Json<EntryWithStatus>, ApiError> {
    let id = TransportId::parse_str(&id).map_err(|_| bad_request("invalid transport id"))?;
    let record = state
        .discovery
        .get_transport_by_id(id)
        .await
        .map_err(reject)?;
    Ok(Json(record))
}

// ── /transports/edge/{node_id} (GET) ──────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize)]
pub struct EdgeResponse {
    pub transports: Vec<EntryWithStatus>,
}

pub async fn handle_get_by_edge(
    State(state): State<ApiState>,
    Path(node_id): Path<String>,
) -> Result<Json<EdgeResponse>, ApiError> {
    let node: NodeId = node_id
        .parse()
        .map_err(|_| bad_request("node id must be a hex-encoded compressed public key"))?;
    let transports = state
        .discovery
        .get_transports_by_edge(node)
        .await
        .map_err(reject)?;
    Ok(Json(EdgeResponse { transports }))
}
