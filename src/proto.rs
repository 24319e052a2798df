//! Messages exchanged between clients and replicas, and between ring neighbors

use crate::auction::{AuctionResult, AuctionStatus, BidRecord};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// `POST /bid`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BidRequest {
    pub amount: f64,
    pub client_id: u64,
    pub client_name: String,
}

impl BidRequest {
    pub fn validate(&self) -> crate::Result<()> {
        crate::common::validate_amount(self.amount)?;
        crate::common::validate_client_name(&self.client_name)
    }
}

/// Reply to a bid, positive or negative
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ack {
    pub message: String,
    pub client_id: u64,
    #[serde(default)]
    pub accepted: bool,
    #[serde(default)]
    pub highest_amount: f64,
}

/// `GET /result`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Outcome {
    pub amount: f64,
    pub client_name: String,
    pub done: bool,
}

impl From<AuctionResult> for Outcome {
    fn from(result: AuctionResult) -> Self {
        match result.highest {
            Some(winner) => Outcome {
                amount: winner.amount,
                client_name: winner.client_name,
                done: result.done,
            },
            None => Outcome {
                amount: 0.0,
                client_name: String::new(),
                done: result.done,
            },
        }
    }
}

/// `POST /internal/token`: the ring token and the ledger it carries
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenMessage {
    /// Generation number, bumped whenever a token is re-originated
    pub epoch: u64,
    /// Replica that originated this generation
    pub origin: String,
    /// Hops taken within this generation
    pub round: u64,
    /// Replica that sent this copy
    pub from: String,
    pub snapshot: Vec<BidRecord>,
}

impl TokenMessage {
    pub fn validate(&self) -> crate::Result<()> {
        if self.origin.trim().is_empty() {
            return Err(crate::Error::Malformed("token origin cannot be empty".into()));
        }
        for record in &self.snapshot {
            record.validate()?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenAck {
    /// `false` when the receiver discarded the token as stale
    pub accepted: bool,
    pub node_id: String,
}

/// `GET /admin/status`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplicaStatus {
    pub node_id: String,
    pub status: AuctionStatus,
    pub deadline: DateTime<Utc>,
    pub highest: Option<BidRecord>,
    pub ledger_size: usize,
    pub pending_deltas: usize,
    pub successor: String,
    pub predecessor: String,
    pub token_epoch: u64,
    pub token_origin: String,
    pub token_round: u64,
    pub holding_token: bool,
}
