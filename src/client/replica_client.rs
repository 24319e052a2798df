//! HTTP client for one replica's client-facing RPCs

use crate::proto::{Ack, BidRequest, Outcome, ReplicaStatus};
use crate::{Error, Result};
use serde::de::DeserializeOwned;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct ReplicaClient {
    address: String,
    http: reqwest::Client,
}

impl ReplicaClient {
    pub fn new(address: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()
            .map_err(|e| Error::Internal(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self::with_http(address, http))
    }

    /// Share one connection pool between several replicas
    pub fn with_http(address: impl Into<String>, http: reqwest::Client) -> Self {
        let address = address.into();
        let address = address.trim_end_matches('/').to_string();
        Self { address, http }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub async fn bid(&self, request: &BidRequest) -> Result<Ack> {
        let resp = self
            .http
            .post(format!("{}/bid", self.address))
            .json(request)
            .send()
            .await
            .map_err(|e| self.unreachable(e))?;
        self.decode(resp).await
    }

    pub async fn result(&self) -> Result<Outcome> {
        let resp = self
            .http
            .get(format!("{}/result", self.address))
            .send()
            .await
            .map_err(|e| self.unreachable(e))?;
        self.decode(resp).await
    }

    pub async fn status(&self) -> Result<ReplicaStatus> {
        let resp = self
            .http
            .get(format!("{}/admin/status", self.address))
            .send()
            .await
            .map_err(|e| self.unreachable(e))?;
        self.decode(resp).await
    }

    async fn decode<T: DeserializeOwned>(&self, resp: reqwest::Response) -> Result<T> {
        let status = resp.status();
        if status.is_success() {
            return resp.json::<T>().await.map_err(|e| self.unreachable(e));
        }

        let body = resp.text().await.unwrap_or_default();
        if status == reqwest::StatusCode::BAD_REQUEST {
            return Err(Error::Malformed(body));
        }
        Err(Error::Http(format!(
            "{} returned {}: {}",
            self.address, status, body
        )))
    }

    fn unreachable(&self, e: reqwest::Error) -> Error {
        if e.is_timeout() {
            return Error::Timeout(format!("{} did not answer in time", self.address));
        }
        Error::ReplicaUnreachable {
            replica: self.address.clone(),
            reason: e.to_string(),
        }
    }
}
