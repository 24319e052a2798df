//! HTTP client for replica-to-replica calls

use crate::proto::{ReplicaStatus, TokenAck, TokenMessage};
use crate::{Error, Result};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct PeerClient {
    http: reqwest::Client,
}

impl PeerClient {
    /// Every call made through this client gives up after `timeout`
    pub fn new(timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()
            .map_err(|e| Error::Internal(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self { http })
    }

    /// Hand the token to `peer`; returns once the peer acknowledged receipt
    pub async fn handoff(&self, peer: &str, token: &TokenMessage) -> Result<TokenAck> {
        let url = format!("{}/internal/token", peer.trim_end_matches('/'));
        let resp = self
            .http
            .post(&url)
            .json(token)
            .send()
            .await
            .map_err(|e| unreachable(peer, e))?;

        let status = resp.status();
        if status == reqwest::StatusCode::BAD_REQUEST {
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::Malformed(format!("{} refused token: {}", peer, body)));
        }
        if !status.is_success() {
            return Err(Error::Http(format!(
                "token handoff to {} returned {}",
                peer, status
            )));
        }

        resp.json::<TokenAck>().await.map_err(|e| unreachable(peer, e))
    }

    pub async fn status(&self, peer: &str) -> Result<ReplicaStatus> {
        let url = format!("{}/admin/status", peer.trim_end_matches('/'));
        let resp = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| unreachable(peer, e))?;

        if !resp.status().is_success() {
            return Err(Error::Http(format!(
                "status of {} returned {}",
                peer,
                resp.status()
            )));
        }

        resp.json::<ReplicaStatus>()
            .await
            .map_err(|e| unreachable(peer, e))
    }
}

fn unreachable(peer: &str, e: reqwest::Error) -> Error {
    if e.is_timeout() {
        return Error::Timeout(format!("{} did not answer in time", peer));
    }
    Error::PeerUnreachable {
        peer: peer.to_string(),
        reason: e.to_string(),
    }
}
