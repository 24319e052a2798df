//! Auction lifecycle: Open until the deadline, then Closed for good

use crate::auction::ledger::{BidRecord, Ledger};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuctionStatus {
    Open,
    Closed,
}

impl std::fmt::Display for AuctionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuctionStatus::Open => write!(f, "open"),
            AuctionStatus::Closed => write!(f, "closed"),
        }
    }
}

/// A bid as submitted by a client, before acceptance
#[derive(Debug, Clone, PartialEq)]
pub struct Bid {
    pub client_id: u64,
    pub client_name: String,
    pub amount: f64,
}

/// Result of [`AuctionState::submit`]
#[derive(Debug, Clone, PartialEq)]
pub struct SubmitOutcome {
    pub accepted: bool,
    pub current_highest: Option<BidRecord>,
    pub message: String,
}

/// Result of [`AuctionState::result`]
#[derive(Debug, Clone, PartialEq)]
pub struct AuctionResult {
    pub highest: Option<BidRecord>,
    pub done: bool,
}

/// Ledger wrapped in the Open/Closed state machine
#[derive(Debug)]
pub struct AuctionState {
    status: AuctionStatus,
    deadline: DateTime<Utc>,
    ledger: Ledger,
}

impl AuctionState {
    pub fn new(deadline: DateTime<Utc>) -> Self {
        Self {
            status: AuctionStatus::Open,
            deadline,
            ledger: Ledger::new(),
        }
    }

    pub fn status(&self) -> AuctionStatus {
        self.status
    }

    pub fn deadline(&self) -> DateTime<Utc> {
        self.deadline
    }

    pub fn is_closed(&self) -> bool {
        self.status == AuctionStatus::Closed
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    /// Flip to Closed the first time `now` reaches the deadline.
    ///
    /// Returns `true` only on the call that performed the transition.
    pub fn close_if_expired(&mut self, now: DateTime<Utc>) -> bool {
        if self.status == AuctionStatus::Open && now >= self.deadline {
            self.status = AuctionStatus::Closed;
            return true;
        }
        false
    }

    /// Accept or reject `bid` at time `now`
    pub fn submit(&mut self, bid: Bid, now: DateTime<Utc>) -> SubmitOutcome {
        if self.close_if_expired(now) {
            tracing::info!("Auction closed at {}", self.deadline);
        }

        if self.is_closed() {
            let current_highest = self.ledger.highest().cloned();
            let message = match &current_highest {
                Some(winner) => format!(
                    "auction is closed; the winner is {} with {}",
                    winner.client_name, winner.amount
                ),
                None => "auction is closed; no bids were placed".to_string(),
            };
            return SubmitOutcome {
                accepted: false,
                current_highest,
                message,
            };
        }

        let amount = bid.amount;
        let record = BidRecord::new(bid.client_id, bid.client_name, amount, now);
        if self.ledger.offer(record) {
            SubmitOutcome {
                accepted: true,
                current_highest: self.ledger.highest().cloned(),
                message: format!("bid of {} accepted; you are the highest bidder", amount),
            }
        } else {
            let highest = self.ledger.highest_amount();
            SubmitOutcome {
                accepted: false,
                current_highest: self.ledger.highest().cloned(),
                message: format!(
                    "bid of {} rejected; you must bid more than {}",
                    amount, highest
                ),
            }
        }
    }

    /// Current winner and whether the auction is over (read-only)
    pub fn result(&self) -> AuctionResult {
        AuctionResult {
            highest: self.ledger.highest().cloned(),
            done: self.is_closed(),
        }
    }

    /// Merge a snapshot carried by the ring token.
    ///
    /// Records accepted at or after the deadline are dropped, so a closed
    /// auction only converges towards bids placed while it was open.
    pub fn merge_snapshot(&mut self, records: Vec<BidRecord>) -> usize {
        let deadline = self.deadline;
        self.ledger
            .merge(records.into_iter().filter(|r| r.accepted_at < deadline))
    }

    pub fn snapshot(&self) -> Vec<BidRecord> {
        self.ledger.snapshot()
    }

    pub fn take_pending(&mut self) -> usize {
        self.ledger.take_pending()
    }
}
