//! HTTP surface of a replica
//!
//! Client-facing: `POST /bid`, `GET /result`.
//! Peer-facing: `POST /internal/token`.
//! Operations: `GET /health`, `GET /admin/status`, `GET /metrics`.

use crate::proto::{Ack, BidRequest, Outcome, ReplicaStatus, TokenAck, TokenMessage};
use crate::replica::middleware::request_tracing_middleware;
use crate::replica::service::ReplicaService;
use crate::Error;
use axum::{
    extract::{rejection::JsonRejection, State},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{limit::RequestBodyLimitLayer, trace::TraceLayer};

/// Creates the HTTP router with all replica endpoints.
pub fn create_router(service: Arc<ReplicaService>, max_body_bytes: usize) -> Router {
    Router::new()
        .route("/bid", post(bid))
        .route("/result", get(result))
        .route("/internal/token", post(token_handoff))
        .route("/health", get(health))
        .route("/admin/status", get(admin_status))
        .route("/metrics", get(metrics))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(axum::middleware::from_fn(request_tracing_middleware))
                .layer(RequestBodyLimitLayer::new(max_body_bytes)),
        )
        .with_state(service)
}

/// Bodies that fail to decode count as malformed messages
fn malformed(service: &ReplicaService, rejection: JsonRejection) -> Error {
    service.metrics().malformed_requests.inc();
    Error::Malformed(rejection.body_text())
}

async fn bid(
    State(service): State<Arc<ReplicaService>>,
    payload: Result<Json<BidRequest>, JsonRejection>,
) -> Result<Json<Ack>, Error> {
    let Json(request) = payload.map_err(|e| malformed(&service, e))?;
    Ok(Json(service.bid(request).await?))
}

async fn result(State(service): State<Arc<ReplicaService>>) -> Json<Outcome> {
    Json(service.result().await)
}

async fn token_handoff(
    State(service): State<Arc<ReplicaService>>,
    payload: Result<Json<TokenMessage>, JsonRejection>,
) -> Result<Json<TokenAck>, Error> {
    let Json(token) = payload.map_err(|e| malformed(&service, e))?;
    Ok(Json(service.token_handoff(token).await?))
}

async fn health(State(service): State<Arc<ReplicaService>>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "node_id": service.node_id(),
    }))
}

async fn admin_status(State(service): State<Arc<ReplicaService>>) -> Json<ReplicaStatus> {
    Json(service.status().await)
}

async fn metrics(State(service): State<Arc<ReplicaService>>) -> impl IntoResponse {
    (
        [(
            axum::http::header::CONTENT_TYPE,
            "text/plain; version=0.0.4",
        )],
        service.render_metrics().await,
    )
}
