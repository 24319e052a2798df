//! Replica service: the auction state machine plus the ring, behind the
//! operations exposed to clients and to ring neighbors

use crate::auction::{AuctionState, Bid};
use crate::proto::{Ack, BidRequest, Outcome, ReplicaStatus, TokenAck, TokenMessage};
use crate::replica::metrics::ReplicaMetrics;
use crate::replica::ring::TokenRing;
use crate::Result;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};

pub struct ReplicaService {
    node_id: String,
    successor: String,
    predecessor: String,
    /// Every accept/reject decision and every ring merge happens under this lock
    state: Mutex<AuctionState>,
    ring: TokenRing,
    metrics: ReplicaMetrics,
}

impl ReplicaService {
    /// Build the service; the receiver feeds the ring coordinator
    pub fn new(
        node_id: impl Into<String>,
        deadline: DateTime<Utc>,
        successor: impl Into<String>,
        predecessor: impl Into<String>,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<TokenMessage>) {
        let node_id = node_id.into();
        let (ring, inbox) = TokenRing::new(node_id.clone());
        let service = Arc::new(Self {
            node_id,
            successor: successor.into(),
            predecessor: predecessor.into(),
            state: Mutex::new(AuctionState::new(deadline)),
            ring,
            metrics: ReplicaMetrics::new(),
        });
        (service, inbox)
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    pub fn metrics(&self) -> &ReplicaMetrics {
        &self.metrics
    }

    pub(crate) fn state(&self) -> &Mutex<AuctionState> {
        &self.state
    }

    pub(crate) fn ring(&self) -> &TokenRing {
        &self.ring
    }

    /// `Bid`: always answers, rejections included
    pub async fn bid(&self, request: BidRequest) -> Result<Ack> {
        if let Err(e) = request.validate() {
            self.metrics.malformed_requests.inc();
            tracing::warn!("{} rejected malformed bid: {}", self.node_id, e);
            return Err(e);
        }

        let client_id = request.client_id;
        let client_name = request.client_name.clone();
        let outcome = {
            let mut state = self.state.lock().await;
            state.submit(
                Bid {
                    client_id,
                    client_name: request.client_name,
                    amount: request.amount,
                },
                Utc::now(),
            )
        };

        if outcome.accepted {
            self.metrics.bids_accepted.inc();
            tracing::info!(
                "{} accepted bid of {} from {} ({})",
                self.node_id,
                request.amount,
                client_name,
                client_id
            );
        } else {
            self.metrics.bids_rejected.inc();
            tracing::info!(
                "{} rejected bid of {} from {}: {}",
                self.node_id,
                request.amount,
                client_name,
                outcome.message
            );
        }

        Ok(Ack {
            message: outcome.message,
            client_id,
            accepted: outcome.accepted,
            highest_amount: outcome
                .current_highest
                .map(|r| r.amount)
                .unwrap_or_default(),
        })
    }

    /// `Result`: current winner and whether the auction is over
    pub async fn result(&self) -> Outcome {
        self.metrics.result_queries.inc();
        let mut state = self.state.lock().await;
        if state.close_if_expired(Utc::now()) {
            tracing::info!("{} auction closed at {}", self.node_id, state.deadline());
        }
        Outcome::from(state.result())
    }

    /// `TokenHandoff`: peer-facing
    pub async fn token_handoff(&self, token: TokenMessage) -> Result<TokenAck> {
        if let Err(e) = token.validate() {
            self.metrics.malformed_requests.inc();
            tracing::warn!(
                "{} rejected malformed token from {}: {}",
                self.node_id,
                token.from,
                e
            );
            return Err(e);
        }

        let ack = self.ring.receive(token).await?;
        if !ack.accepted {
            self.metrics.tokens_stale.inc();
        }
        Ok(ack)
    }

    /// Timer entry point; `true` on the call that closed the auction
    pub async fn close_if_expired(&self) -> bool {
        let closed = self.state.lock().await.close_if_expired(Utc::now());
        if closed {
            tracing::info!("{} auction closed", self.node_id);
        }
        closed
    }

    pub async fn status(&self) -> ReplicaStatus {
        let (token_epoch, token_origin, token_round) = self.ring.generation().await;
        let state = self.state.lock().await;
        ReplicaStatus {
            node_id: self.node_id.clone(),
            status: state.status(),
            deadline: state.deadline(),
            highest: state.ledger().highest().cloned(),
            ledger_size: state.ledger().len(),
            pending_deltas: state.ledger().pending_len(),
            successor: self.successor.clone(),
            predecessor: self.predecessor.clone(),
            token_epoch,
            token_origin,
            token_round,
            holding_token: self.ring.is_holding(),
        }
    }

    pub async fn render_metrics(&self) -> String {
        let ledger_size = self.state.lock().await.ledger().len();
        self.metrics.to_prometheus(&self.node_id, ledger_size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auction::BidRecord;
    use crate::auction::AuctionStatus;

    fn open_replica() -> (Arc<ReplicaService>, mpsc::UnboundedReceiver<TokenMessage>) {
        ReplicaService::new(
            "r1",
            Utc::now() + chrono::Duration::hours(1),
            "http://127.0.0.1:1",
            "http://127.0.0.1:2",
        )
    }

    fn request(amount: f64, name: &str) -> BidRequest {
        BidRequest {
            amount,
            client_id: crate::common::client_id_for_name(name),
            client_name: name.to_string(),
        }
    }

    #[test]
    fn test_bid_and_result() {
        let (replica, _inbox) = open_replica();

        let ack = tokio_test::block_on(replica.bid(request(100.0, "alice"))).unwrap();
        assert!(ack.accepted);
        assert_eq!(ack.highest_amount, 100.0);

        let ack = tokio_test::block_on(replica.bid(request(50.0, "bob"))).unwrap();
        assert!(!ack.accepted);
        assert_eq!(ack.client_id, crate::common::client_id_for_name("bob"));
        assert!(ack.message.contains("100"));

        let outcome = tokio_test::block_on(replica.result());
        assert_eq!(outcome.amount, 100.0);
        assert_eq!(outcome.client_name, "alice");
        assert!(!outcome.done);

        assert_eq!(replica.metrics().bids_accepted.get(), 1);
        assert_eq!(replica.metrics().bids_rejected.get(), 1);
    }

    #[test]
    fn test_malformed_bid_never_reaches_ledger() {
        let (replica, _inbox) = open_replica();
        let err = tokio_test::block_on(replica.bid(request(-5.0, "alice"))).unwrap_err();
        assert!(matches!(err, crate::Error::Malformed(_)));

        let status = tokio_test::block_on(replica.status());
        assert_eq!(status.ledger_size, 0);
        assert_eq!(replica.metrics().malformed_requests.get(), 1);
    }

    #[test]
    fn test_result_closes_expired_auction() {
        let (replica, _inbox) = ReplicaService::new(
            "r1",
            Utc::now() - chrono::Duration::seconds(1),
            "http://127.0.0.1:1",
            "http://127.0.0.1:2",
        );
        let outcome = tokio_test::block_on(replica.result());
        assert!(outcome.done);

        let status = tokio_test::block_on(replica.status());
        assert_eq!(status.status, AuctionStatus::Closed);
    }

    #[test]
    fn test_token_handoff_queues_for_coordinator() {
        let (replica, mut inbox) = open_replica();
        let token = TokenMessage {
            epoch: 1,
            origin: "r3".into(),
            round: 2,
            from: "r3".into(),
            snapshot: vec![BidRecord::new(9, "carol", 70.0, Utc::now())],
        };

        let ack = tokio_test::block_on(replica.token_handoff(token.clone())).unwrap();
        assert!(ack.accepted);
        assert_eq!(inbox.try_recv().unwrap(), token);

        let again = tokio_test::block_on(replica.token_handoff(token)).unwrap();
        assert!(!again.accepted);
        assert_eq!(replica.metrics().tokens_stale.get(), 1);
    }
}
