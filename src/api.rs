use std::future::{self, Future};
use std::net::SocketAddr;

use axum::body::Bytes;
use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{DefaultBodyLimit, Path, Query, State};
use axum::http::StatusCode;
use axum::response::Response;
use axum::routing::{get, patch, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, oneshot};
use tracing::{debug, info, warn};

use crate::codegen::CodeFormat;
use crate::config::ApiLimitsConfig;
use crate::errors::{ComputeError, ComputeResult};
use crate::metrics::{DashboardStats, PerformanceMetrics};
use crate::notifier::Notification;
use crate::service::{ComputeService, ExecutionReport};
use crate::types::{
    ChainStatus, Circuit, CircuitPatch, CircuitVersion, ComputationProof, EncryptRequest,
    EncryptedData, ModuleTemplate, NewCircuit, NewProof, Proof, StatusUpdate,
};

#[derive(Serialize, Deserialize)]
struct ErrorResponse {
    error: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    details: Vec<String>,
}

type ApiError = (StatusCode, Json<ErrorResponse>);
type ApiResult<T> = Result<T, ApiError>;

#[derive(Default, Deserialize)]
struct CreateVersionRequest {
    #[serde(default)]
    changelog: Option<String>,
}

#[derive(Deserialize)]
struct CodeQuery {
    format: Option<String>,
}

#[derive(Serialize)]
struct CodeResponse {
    code: String,
    format: &'static str,
}

pub fn router(service: ComputeService, limits: &ApiLimitsConfig) -> Router {
    Router::new()
        .route("/api/stats", get(stats))
        .route("/api/metrics", get(performance_metrics))
        .route("/api/chains", get(chain_status))
        .route("/api/modules", get(modules))
        .route("/api/circuits", get(list_circuits).post(create_circuit))
        .route(
            "/api/circuits/:id",
            get(get_circuit).patch(update_circuit).delete(delete_circuit),
        )
        .route(
            "/api/circuits/:id/versions",
            get(list_versions).post(create_version),
        )
        .route("/api/circuits/:id/versions/:version", get(get_version))
        .route(
            "/api/circuits/:id/versions/:version/restore",
            post(restore_version),
        )
        .route("/api/circuits/:id/execute", post(execute_circuit))
        .route("/api/circuits/:id/code", get(circuit_code))
        .route("/api/proofs", get(list_proofs).post(create_proof))
        .route("/api/proofs/:id", get(get_proof))
        .route("/api/proofs/:id/status", patch(update_proof_status))
        .route("/api/encrypt", post(encrypt))
        .route("/api/encrypted/:id", get(get_encrypted))
        .route("/api/encrypted/:id/verify", post(verify_computation))
        .route("/ws", get(realtime))
        .layer(DefaultBodyLimit::max(limits.max_body_bytes))
        .with_state(service)
}

pub async fn serve(
    service: ComputeService,
    addr: SocketAddr,
    limits: ApiLimitsConfig,
) -> ComputeResult<()> {
    serve_with_shutdown(service, addr, limits, future::pending(), None).await
}

/// Serves until `shutdown` resolves. `ready` reports whether the listener
/// could be bound.
pub async fn serve_with_shutdown<F>(
    service: ComputeService,
    addr: SocketAddr,
    limits: ApiLimitsConfig,
    shutdown: F,
    ready: Option<oneshot::Sender<Result<(), String>>>,
) -> ComputeResult<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let router = router(service, &limits);
    let listener = match TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(err) => {
            if let Some(ready) = ready {
                let _ = ready.send(Err(err.to_string()));
            }
            return Err(err.into());
        }
    };
    info!(?addr, "compute API listening");
    if let Some(ready) = ready {
        let _ = ready.send(Ok(()));
    }
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await?;
    info!(?addr, "compute API stopped");
    Ok(())
}

async fn stats(State(service): State<ComputeService>) -> ApiResult<Json<DashboardStats>> {
    service
        .stats()
        .map(Json)
        .map_err(|err| to_http_error(err, "Failed to fetch stats"))
}

async fn performance_metrics(
    State(service): State<ComputeService>,
) -> ApiResult<Json<PerformanceMetrics>> {
    service
        .performance_metrics()
        .map(Json)
        .map_err(|err| to_http_error(err, "Failed to fetch metrics"))
}

async fn chain_status(State(service): State<ComputeService>) -> ApiResult<Json<Vec<ChainStatus>>> {
    service
        .chain_status()
        .map(Json)
        .map_err(|err| to_http_error(err, "Failed to fetch chain status"))
}

async fn modules(State(service): State<ComputeService>) -> Json<Vec<ModuleTemplate>> {
    Json(service.module_catalog())
}

async fn list_circuits(State(service): State<ComputeService>) -> ApiResult<Json<Vec<Circuit>>> {
    service
        .list_circuits()
        .map(Json)
        .map_err(|err| to_http_error(err, "Failed to fetch circuits"))
}

async fn get_circuit(
    State(service): State<ComputeService>,
    id: Result<Path<u64>, PathRejection>,
) -> ApiResult<Json<Circuit>> {
    let Path(id) = id.map_err(invalid_path)?;
    service
        .get_circuit(id)
        .map(Json)
        .map_err(|err| to_http_error(err, "Failed to fetch circuit"))
}

async fn create_circuit(
    State(service): State<ComputeService>,
    body: Result<Json<NewCircuit>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<Circuit>)> {
    let draft = json_body(body, "Invalid circuit data")?;
    service
        .create_circuit(draft)
        .map(|circuit| (StatusCode::CREATED, Json(circuit)))
        .map_err(|err| to_http_error(err, "Failed to create circuit"))
}

async fn update_circuit(
    State(service): State<ComputeService>,
    id: Result<Path<u64>, PathRejection>,
    body: Result<Json<CircuitPatch>, JsonRejection>,
) -> ApiResult<Json<Circuit>> {
    let Path(id) = id.map_err(invalid_path)?;
    let patch = json_body(body, "Invalid circuit data")?;
    service
        .update_circuit(id, patch)
        .map(Json)
        .map_err(|err| to_http_error(err, "Failed to update circuit"))
}

async fn delete_circuit(
    State(service): State<ComputeService>,
    id: Result<Path<u64>, PathRejection>,
) -> ApiResult<StatusCode> {
    let Path(id) = id.map_err(invalid_path)?;
    service
        .delete_circuit(id)
        .map(|_| StatusCode::NO_CONTENT)
        .map_err(|err| to_http_error(err, "Failed to delete circuit"))
}

async fn list_versions(
    State(service): State<ComputeService>,
    id: Result<Path<u64>, PathRejection>,
) -> ApiResult<Json<Vec<CircuitVersion>>> {
    let Path(id) = id.map_err(invalid_path)?;
    service
        .list_versions(id)
        .map(Json)
        .map_err(|err| to_http_error(err, "Failed to fetch versions"))
}

async fn get_version(
    State(service): State<ComputeService>,
    params: Result<Path<(u64, u32)>, PathRejection>,
) -> ApiResult<Json<CircuitVersion>> {
    let Path((id, version)) = params.map_err(invalid_path)?;
    service
        .get_version(id, version)
        .map(Json)
        .map_err(|err| to_http_error(err, "Failed to fetch version"))
}

/// The body is optional; an empty request snapshots with the default
/// changelog.
async fn create_version(
    State(service): State<ComputeService>,
    id: Result<Path<u64>, PathRejection>,
    body: Bytes,
) -> ApiResult<(StatusCode, Json<CircuitVersion>)> {
    let Path(id) = id.map_err(invalid_path)?;
    let request = if body.iter().all(u8::is_ascii_whitespace) {
        CreateVersionRequest::default()
    } else {
        serde_json::from_slice::<CreateVersionRequest>(&body).map_err(|err| {
            validation_error("Invalid version data", vec![err.to_string()])
        })?
    };
    service
        .create_version(id, request.changelog)
        .map(|version| (StatusCode::CREATED, Json(version)))
        .map_err(|err| to_http_error(err, "Failed to create version"))
}

async fn restore_version(
    State(service): State<ComputeService>,
    params: Result<Path<(u64, u32)>, PathRejection>,
) -> ApiResult<Json<Circuit>> {
    let Path((id, version)) = params.map_err(invalid_path)?;
    service
        .restore_version(id, version)
        .map(Json)
        .map_err(|err| to_http_error(err, "Failed to restore version"))
}

async fn execute_circuit(
    State(service): State<ComputeService>,
    id: Result<Path<u64>, PathRejection>,
) -> ApiResult<Json<ExecutionReport>> {
    let Path(id) = id.map_err(invalid_path)?;
    service
        .execute(id)
        .await
        .map(Json)
        .map_err(|err| to_http_error(err, "Failed to execute circuit"))
}

async fn circuit_code(
    State(service): State<ComputeService>,
    id: Result<Path<u64>, PathRejection>,
    Query(query): Query<CodeQuery>,
) -> ApiResult<Json<CodeResponse>> {
    let Path(id) = id.map_err(invalid_path)?;
    let format = match query.format.as_deref() {
        Some(name) => name
            .parse::<CodeFormat>()
            .map_err(|err| to_http_error(err, "Failed to generate code"))?,
        None => CodeFormat::default(),
    };
    service
        .render_code(id, format)
        .map(|code| {
            Json(CodeResponse {
                code,
                format: format.as_str(),
            })
        })
        .map_err(|err| to_http_error(err, "Failed to generate code"))
}

async fn list_proofs(State(service): State<ComputeService>) -> ApiResult<Json<Vec<Proof>>> {
    service
        .list_proofs()
        .map(Json)
        .map_err(|err| to_http_error(err, "Failed to fetch proofs"))
}

async fn get_proof(
    State(service): State<ComputeService>,
    id: Result<Path<u64>, PathRejection>,
) -> ApiResult<Json<Proof>> {
    let Path(id) = id.map_err(invalid_path)?;
    service
        .get_proof(id)
        .map(Json)
        .map_err(|err| to_http_error(err, "Failed to fetch proof"))
}

async fn create_proof(
    State(service): State<ComputeService>,
    body: Result<Json<NewProof>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<Proof>)> {
    let draft = json_body(body, "Invalid proof data")?;
    service
        .create_proof(draft)
        .map(|proof| (StatusCode::CREATED, Json(proof)))
        .map_err(|err| to_http_error(err, "Failed to create proof"))
}

async fn update_proof_status(
    State(service): State<ComputeService>,
    id: Result<Path<u64>, PathRejection>,
    body: Result<Json<StatusUpdate>, JsonRejection>,
) -> ApiResult<Json<Proof>> {
    let Path(id) = id.map_err(invalid_path)?;
    let update = json_body(body, "Invalid status")?;
    service
        .update_proof_status(id, update.status.as_deref())
        .map(Json)
        .map_err(|err| to_http_error(err, "Failed to update proof"))
}

async fn encrypt(
    State(service): State<ComputeService>,
    body: Result<Json<EncryptRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<EncryptedData>)> {
    let request = json_body(body, "Invalid encryption data")?;
    service
        .encrypt(request)
        .map(|record| (StatusCode::CREATED, Json(record)))
        .map_err(|err| to_http_error(err, "Failed to encrypt data"))
}

async fn get_encrypted(
    State(service): State<ComputeService>,
    id: Result<Path<u64>, PathRejection>,
) -> ApiResult<Json<EncryptedData>> {
    let Path(id) = id.map_err(invalid_path)?;
    service
        .get_encrypted(id)
        .map(Json)
        .map_err(|err| to_http_error(err, "Failed to fetch encrypted data"))
}

async fn verify_computation(
    State(service): State<ComputeService>,
    id: Result<Path<u64>, PathRejection>,
) -> ApiResult<Json<ComputationProof>> {
    let Path(id) = id.map_err(invalid_path)?;
    service
        .verify_computation(id)
        .map(Json)
        .map_err(|err| to_http_error(err, "Failed to verify computation"))
}

async fn realtime(State(service): State<ComputeService>, ws: WebSocketUpgrade) -> Response {
    let events = service.subscribe();
    ws.on_upgrade(move |socket| forward_events(socket, events))
}

/// Pushes every notification to one socket until either side goes away. A
/// lagging socket skips what it missed.
async fn forward_events(mut socket: WebSocket, mut events: broadcast::Receiver<Notification>) {
    debug!("realtime client connected");
    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(notification) => {
                    let text = match serde_json::to_string(&notification) {
                        Ok(text) => text,
                        Err(err) => {
                            warn!(?err, "failed to encode notification");
                            continue;
                        }
                    };
                    if socket.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    debug!(skipped, "realtime client lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            incoming = socket.recv() => match incoming {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }
    debug!("realtime client disconnected");
}

fn json_body<T>(body: Result<Json<T>, JsonRejection>, message: &str) -> ApiResult<T> {
    match body {
        Ok(Json(value)) => Ok(value),
        Err(rejection) if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE => Err((
            StatusCode::PAYLOAD_TOO_LARGE,
            Json(ErrorResponse {
                error: "Request body too large".to_string(),
                details: Vec::new(),
            }),
        )),
        Err(rejection) => Err(validation_error(message, vec![rejection.body_text()])),
    }
}

fn invalid_path(rejection: PathRejection) -> ApiError {
    validation_error("Invalid path parameter", vec![rejection.body_text()])
}

fn validation_error(message: &str, details: Vec<String>) -> ApiError {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse {
            error: message.to_string(),
            details,
        }),
    )
}

/// Storage and other internal failures are logged and reported with the
/// route's generic message only.
fn to_http_error(err: ComputeError, failure: &str) -> ApiError {
    match err {
        ComputeError::Validation { message, details } => validation_error(&message, details),
        ComputeError::NotFound(_) => (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                error: err.to_string(),
                details: Vec::new(),
            }),
        ),
        ComputeError::Conflict(_) => (
            StatusCode::CONFLICT,
            Json(ErrorResponse {
                error: err.to_string(),
                details: Vec::new(),
            }),
        ),
        other => {
            warn!(error = %other, "{failure}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: failure.to_string(),
                    details: Vec::new(),
                }),
            )
        }
    }
}
