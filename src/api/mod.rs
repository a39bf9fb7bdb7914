//! HTTP API for health checks, status, and monitoring

use crate::bridge::{Bridge, BridgeFacade};
use crate::config::ApiConfig;
use crate::error::{BridgeError, BridgeResult};
use crate::ledger::{BridgeTransaction, TransactionStatus};

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use ethers::types::{Address, H256};
use serde::Serialize;
use std::str::FromStr;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub bridge: Arc<Bridge>,
}

pub fn router(bridge: Arc<Bridge>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .route("/status", get(get_status))
        .route("/stats", get(get_stats))
        .route("/pending", get(get_pending))
        .route("/transactions/:hash", get(get_transaction))
        .route("/assets", get(get_assets))
        .route("/validators", get(get_validators))
        .route("/routes", get(get_routes))
        .route("/metrics", get(crate::metrics::metrics_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(AppState { bridge })
}

/// Run the HTTP API server
pub async fn run_server(config: ApiConfig, bridge: Arc<Bridge>) -> BridgeResult<()> {
    let app = router(bridge);

    let addr = format!("{}:{}", config.host, config.port);
    info!("Starting API server on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| BridgeError::Config(format!("Cannot bind API address {}: {}", addr, e)))?;
    axum::serve(listener, app)
        .await
        .map_err(|e| BridgeError::Internal(format!("API server failed: {}", e)))?;

    Ok(())
}

/// Health check endpoint - basic liveness
async fn health_check() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Readiness check - initialized and chain reachable
async fn readiness_check(State(state): State<AppState>) -> impl IntoResponse {
    let initialized = state.bridge.is_initialized().await;
    let chain = state.bridge.chain_healthy().await;
    let code = if initialized && chain {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (
        code,
        Json(ReadinessResponse {
            ready: initialized && chain,
            initialized,
            chain,
        }),
    )
}

async fn get_status(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.bridge.status().await)
}

async fn get_stats(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.bridge.stats().await)
}

async fn get_pending(State(state): State<AppState>) -> impl IntoResponse {
    let pending: Vec<TransactionView> = state
        .bridge
        .pending_transactions()
        .await
        .iter()
        .map(TransactionView::from)
        .collect();
    Json(pending)
}

async fn get_transaction(
    State(state): State<AppState>,
    Path(hash): Path<String>,
) -> Result<Json<TransactionView>, ApiError> {
    let hash = H256::from_str(&hash)
        .map_err(|_| ApiError::BadRequest(format!("Invalid transaction hash: {}", hash)))?;
    let tx = state.bridge.get_transaction(hash).await?;
    Ok(Json(TransactionView::from(&tx)))
}

async fn get_assets(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.bridge.list_assets().await)
}

async fn get_validators(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.bridge.get_validators().await)
}

async fn get_routes(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.bridge.router().routes().await)
}

/// Errors surfaced as JSON with a matching status code
enum ApiError {
    BadRequest(String),
    Bridge(BridgeError),
}

impl From<BridgeError> for ApiError {
    fn from(e: BridgeError) -> Self {
        ApiError::Bridge(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (code, message) = match self {
            ApiError::BadRequest(message) => (StatusCode::BAD_REQUEST, message),
            ApiError::Bridge(e @ BridgeError::TransactionNotFound { .. }) => {
                (StatusCode::NOT_FOUND, e.to_string())
            }
            ApiError::Bridge(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
        };
        (code, Json(ErrorResponse { error: message })).into_response()
    }
}

// Response types

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

#[derive(Serialize)]
struct ReadinessResponse {
    ready: bool,
    initialized: bool,
    chain: bool,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

#[derive(Debug, Serialize)]
struct AttestationView {
    validator: Address,
    signed_at: DateTime<Utc>,
    signature: String,
}

/// Ledger entry with amounts in decimal
#[derive(Debug, Serialize)]
struct TransactionView {
    hash: H256,
    kind: String,
    symbol: String,
    amount: String,
    sender: Address,
    recipient: Address,
    source_chain: u64,
    target_chain: u64,
    route: Option<String>,
    status: TransactionStatus,
    timestamp: DateTime<Utc>,
    deadline: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    attestations: Vec<AttestationView>,
}

impl From<&BridgeTransaction> for TransactionView {
    fn from(tx: &BridgeTransaction) -> Self {
        Self {
            hash: tx.hash,
            kind: tx.kind.to_string(),
            symbol: tx.symbol.clone(),
            amount: tx.amount.to_string(),
            sender: tx.sender,
            recipient: tx.recipient,
            source_chain: tx.source_chain,
            target_chain: tx.target_chain,
            route: tx.route.clone(),
            status: tx.status,
            timestamp: tx.timestamp,
            deadline: tx.deadline,
            updated_at: tx.updated_at,
            attestations: tx
                .validator_signatures
                .iter()
                .map(|a| AttestationView {
                    validator: a.validator,
                    signed_at: a.signed_at,
                    signature: a.signature_hex(),
                })
                .collect(),
        }
    }
}
