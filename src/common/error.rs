//! Error types for ringbid

use axum::response::{IntoResponse, Response};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    // === I/O Errors ===
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // === Wire Errors ===
    #[error("Malformed message: {0}")]
    Malformed(String),

    // === Network Errors ===
    #[error("Peer {peer} unreachable: {reason}")]
    PeerUnreachable { peer: String, reason: String },

    #[error("Replica {replica} unreachable: {reason}")]
    ReplicaUnreachable { replica: String, reason: String },

    #[error("All replicas unreachable ({attempted} attempted)")]
    AllReplicasUnreachable { attempted: usize },

    #[error("HTTP error: {0}")]
    Http(String),

    // === Config Errors ===
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Configuration source error: {0}")]
    ConfigSource(#[from] config::ConfigError),

    // === Generic ===
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Operation timeout: {0}")]
    Timeout(String),
}

impl Error {
    /// Is this a retryable error?
    ///
    /// Transport failures are; a peer that answered and refused is not.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Timeout(_) | Error::PeerUnreachable { .. } | Error::ReplicaUnreachable { .. }
        )
    }

    /// Does this error mean the remote side could not be reached at all?
    pub fn is_unreachable(&self) -> bool {
        matches!(
            self,
            Error::Timeout(_)
                | Error::PeerUnreachable { .. }
                | Error::ReplicaUnreachable { .. }
                | Error::AllReplicasUnreachable { .. }
        )
    }

    /// Convert to HTTP status code
    pub fn to_http_status(&self) -> axum::http::StatusCode {
        use axum::http::StatusCode;
        match self {
            Error::Malformed(_) | Error::InvalidConfig(_) => StatusCode::BAD_REQUEST,
            Error::Timeout(_) => StatusCode::REQUEST_TIMEOUT,
            Error::PeerUnreachable { .. }
            | Error::ReplicaUnreachable { .. }
            | Error::AllReplicasUnreachable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.to_http_status();
        let body = axum::Json(serde_json::json!({ "error": self.to_string() }));
        (status, body).into_response()
    }
}
