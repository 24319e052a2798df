//! Token-ring coordinator
//!
//! A single token circulates predecessor -> self -> successor. Holding it
//! is what lets a replica commit its locally accepted bids to the ring:
//! on arrival the replica drains its pending deltas, merges the ledger the
//! token carries, holds the token for `hold_interval`, then hands its own
//! merged ledger to the successor.
//!
//! Tokens are grouped in generations `(epoch, origin)`. A watchdog
//! re-originates a generation when the token has been silent for too long;
//! the gate below discards any copy from an older generation, or a copy
//! of the current generation that is not strictly newer (`round`).

use crate::common::ReplicaConfig;
use crate::proto::{TokenAck, TokenMessage};
use crate::replica::peer_client::PeerClient;
use crate::replica::service::ReplicaService;
use crate::Result;
use rand::Rng;
use std::cmp::Ordering as CmpOrdering;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Admitted,
    Stale,
}

/// Deduplicates tokens by generation and round
#[derive(Debug, Clone)]
pub struct TokenGate {
    epoch: u64,
    origin: String,
    round: u64,
    last_observed: Instant,
}

impl TokenGate {
    pub fn new(now: Instant) -> Self {
        Self {
            epoch: 0,
            origin: String::new(),
            round: 0,
            last_observed: now,
        }
    }

    pub fn admit(&mut self, token: &TokenMessage, now: Instant) -> Admission {
        let incoming = (token.epoch, token.origin.as_str());
        let current = (self.epoch, self.origin.as_str());
        let admitted = match incoming.cmp(&current) {
            CmpOrdering::Greater => true,
            CmpOrdering::Equal => token.round > self.round,
            CmpOrdering::Less => false,
        };

        if !admitted {
            return Admission::Stale;
        }

        self.epoch = token.epoch;
        self.origin.clone_from(&token.origin);
        self.round = token.round;
        self.last_observed = now;
        Admission::Admitted
    }

    /// Start a new generation owned by `node_id`; returns its epoch
    pub fn originate(&mut self, node_id: &str, now: Instant) -> u64 {
        self.epoch += 1;
        self.origin = node_id.to_string();
        self.round = 0;
        self.last_observed = now;
        self.epoch
    }

    /// Refresh the silence timer (while holding the token)
    pub fn observe(&mut self, now: Instant) {
        self.last_observed = now;
    }

    pub fn silent_for(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_observed)
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    pub fn round(&self) -> u64 {
        self.round
    }
}

/// Receiving side of the ring, shared between the RPC handlers and the
/// coordinator task
#[derive(Debug)]
pub struct TokenRing {
    node_id: String,
    gate: Mutex<TokenGate>,
    inbox: mpsc::UnboundedSender<TokenMessage>,
    holding: AtomicBool,
}

impl TokenRing {
    pub fn new(node_id: impl Into<String>) -> (Self, mpsc::UnboundedReceiver<TokenMessage>) {
        let (inbox, rx) = mpsc::unbounded_channel();
        let ring = Self {
            node_id: node_id.into(),
            gate: Mutex::new(TokenGate::new(Instant::now())),
            inbox,
            holding: AtomicBool::new(false),
        };
        (ring, rx)
    }

    /// Admit `token` through the gate and queue it for the coordinator.
    ///
    /// Returns as soon as the token is queued; this is the receipt the
    /// sender waits for.
    pub async fn receive(&self, token: TokenMessage) -> Result<TokenAck> {
        let admission = self.gate.lock().await.admit(&token, Instant::now());
        if admission == Admission::Stale {
            tracing::debug!(
                "{} discarding stale token epoch={} origin={} round={} from {}",
                self.node_id,
                token.epoch,
                token.origin,
                token.round,
                token.from
            );
            return Ok(TokenAck {
                accepted: false,
                node_id: self.node_id.clone(),
            });
        }

        self.inbox
            .send(token)
            .map_err(|_| crate::Error::Internal("ring coordinator is not running".into()))?;

        Ok(TokenAck {
            accepted: true,
            node_id: self.node_id.clone(),
        })
    }

    pub async fn generation(&self) -> (u64, String, u64) {
        let gate = self.gate.lock().await;
        (gate.epoch(), gate.origin().to_string(), gate.round())
    }

    pub fn is_holding(&self) -> bool {
        self.holding.load(Ordering::Relaxed)
    }

    fn set_holding(&self, holding: bool) {
        self.holding.store(holding, Ordering::Relaxed);
    }

    async fn originate(&self, now: Instant) -> u64 {
        self.gate.lock().await.originate(&self.node_id, now)
    }

    async fn observe(&self, now: Instant) {
        self.gate.lock().await.observe(now);
    }

    async fn silent_for(&self, now: Instant) -> Duration {
        self.gate.lock().await.silent_for(now)
    }
}

/// The token this replica currently holds
#[derive(Debug, Clone)]
struct HeldToken {
    epoch: u64,
    origin: String,
    round: u64,
    forward_at: Instant,
}

/// Background task driving the ring for one replica
pub struct RingCoordinator {
    replica: Arc<ReplicaService>,
    inbox: mpsc::UnboundedReceiver<TokenMessage>,
    peer: PeerClient,
    successor: String,
    predecessor: String,
    hold_interval: Duration,
    token_timeout: Duration,
    silence_limit: Duration,
    initial_token: bool,
    held: Option<HeldToken>,
}

impl RingCoordinator {
    pub fn new(
        replica: Arc<ReplicaService>,
        inbox: mpsc::UnboundedReceiver<TokenMessage>,
        config: &ReplicaConfig,
    ) -> Result<Self> {
        let token_timeout = config.token_timeout();
        Ok(Self {
            replica,
            inbox,
            peer: PeerClient::new(config.call_timeout())?,
            successor: config.successor.clone(),
            predecessor: config.predecessor.clone(),
            hold_interval: config.hold_interval(),
            token_timeout,
            silence_limit: jittered(token_timeout),
            initial_token: config.initial_token,
            held: None,
        })
    }

    /// Spawn the coordinator loop
    pub fn start(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(self.run())
    }

    async fn run(mut self) {
        let node_id = self.replica.node_id().to_string();
        tracing::info!(
            "{} ring coordinator started (successor {}, predecessor {})",
            node_id,
            self.successor,
            self.predecessor
        );

        if self.initial_token {
            self.originate(false).await;
        }

        let tick = (self.hold_interval / 4).max(Duration::from_millis(10));
        let mut ticker = tokio::time::interval(tick);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                maybe_token = self.inbox.recv() => match maybe_token {
                    Some(token) => self.on_token(token).await,
                    None => break,
                },
                _ = ticker.tick() => self.on_tick().await,
            }
        }

        tracing::info!("{} ring coordinator stopped", node_id);
    }

    /// Take ownership of an admitted token
    async fn on_token(&mut self, mut token: TokenMessage) {
        let metrics = self.replica.metrics();
        metrics.tokens_received.inc();

        if let Some(previous) = &self.held {
            tracing::info!(
                "{} dropping held token epoch={} origin={} in favour of epoch={} origin={}",
                self.replica.node_id(),
                previous.epoch,
                previous.origin,
                token.epoch,
                token.origin
            );
        }

        let snapshot = std::mem::take(&mut token.snapshot);
        let (committed, merged) = self.absorb(snapshot).await;

        tracing::debug!(
            "{} holds token epoch={} round={} from {}: committed {} local bids, merged {} records",
            self.replica.node_id(),
            token.epoch,
            token.round,
            token.from,
            committed,
            merged
        );

        self.hold(token.epoch, token.origin, token.round);
    }

    async fn on_tick(&mut self) {
        let now = Instant::now();
        let ring = self.replica.ring();

        match &self.held {
            Some(held) => {
                ring.observe(now).await;
                if now >= held.forward_at {
                    self.forward().await;
                }
            }
            None => {
                if ring.silent_for(now).await < self.silence_limit {
                    return;
                }
                if self.predecessor_holds_token().await {
                    ring.observe(now).await;
                    return;
                }
                self.originate(true).await;
            }
        }
    }

    /// Commit pending deltas, then merge the carried ledger into ours
    async fn absorb(&self, snapshot: Vec<crate::auction::BidRecord>) -> (usize, usize) {
        let (committed, merged) = {
            let mut state = self.replica.state().lock().await;
            let committed = state.take_pending();
            let merged = state.merge_snapshot(snapshot);
            (committed, merged)
        };

        let metrics = self.replica.metrics();
        metrics.deltas_committed.add(committed as u64);
        metrics.records_merged.add(merged as u64);
        (committed, merged)
    }

    fn hold(&mut self, epoch: u64, origin: String, round: u64) {
        self.held = Some(HeldToken {
            epoch,
            origin,
            round,
            forward_at: Instant::now() + self.hold_interval,
        });
        self.replica.ring().set_holding(true);
    }

    fn release(&mut self) {
        self.held = None;
        self.replica.ring().set_holding(false);
    }

    /// Hand the token, carrying our merged ledger, to the successor
    async fn forward(&mut self) {
        let Some(held) = self.held.clone() else {
            return;
        };

        let snapshot = self.replica.state().lock().await.snapshot();
        let token = TokenMessage {
            epoch: held.epoch,
            origin: held.origin.clone(),
            round: held.round + 1,
            from: self.replica.node_id().to_string(),
            snapshot,
        };

        let metrics = self.replica.metrics();
        match self.peer.handoff(&self.successor, &token).await {
            Ok(ack) if ack.accepted => {
                metrics.tokens_forwarded.inc();
                tracing::debug!(
                    "{} passed token epoch={} round={} to {}",
                    self.replica.node_id(),
                    token.epoch,
                    token.round,
                    ack.node_id
                );
                self.release();
            }
            Ok(ack) => {
                metrics.tokens_stale.inc();
                tracing::info!(
                    "{} token epoch={} origin={} is stale at {}, discarding it",
                    self.replica.node_id(),
                    token.epoch,
                    token.origin,
                    ack.node_id
                );
                self.release();
            }
            Err(e) if !e.is_retryable() => {
                metrics.token_hops_failed.inc();
                tracing::error!(
                    "{} successor {} refused token epoch={}: {}; dropping it",
                    self.replica.node_id(),
                    self.successor,
                    token.epoch,
                    e
                );
                self.release();
            }
            Err(e) => {
                metrics.token_hops_failed.inc();
                tracing::warn!(
                    "{} token handoff to {} failed: {} (retrying in {:?})",
                    self.replica.node_id(),
                    self.successor,
                    e,
                    self.hold_interval
                );
                if let Some(held) = self.held.as_mut() {
                    held.forward_at = Instant::now() + self.hold_interval;
                }
            }
        }
    }

    /// Start a new generation here and hold it
    async fn originate(&mut self, after_silence: bool) {
        let ring = self.replica.ring();
        let epoch = ring.originate(Instant::now()).await;
        if after_silence {
            self.replica.metrics().token_regenerations.inc();
            tracing::warn!(
                "{} saw no token for {:?}, originating generation {}",
                self.replica.node_id(),
                self.silence_limit,
                epoch
            );
        } else {
            tracing::info!(
                "{} originating initial token generation {}",
                self.replica.node_id(),
                epoch
            );
        }

        self.silence_limit = jittered(self.token_timeout);
        let (committed, _) = self.absorb(Vec::new()).await;
        if committed > 0 {
            tracing::debug!(
                "{} committed {} local bids into new generation",
                self.replica.node_id(),
                committed
            );
        }
        self.hold(epoch, self.replica.node_id().to_string(), 0);
    }

    /// A predecessor still retrying its handoff to us means the token is alive
    async fn predecessor_holds_token(&self) -> bool {
        match self.peer.status(&self.predecessor).await {
            Ok(status) if status.holding_token => {
                tracing::debug!(
                    "{} token silent but predecessor {} holds it",
                    self.replica.node_id(),
                    status.node_id
                );
                true
            }
            Ok(_) => false,
            Err(e) => {
                tracing::debug!(
                    "{} predecessor {} unreachable during watchdog probe: {}",
                    self.replica.node_id(),
                    self.predecessor,
                    e
                );
                false
            }
        }
    }
}

/// `base` plus up to half of it again, so watchdogs on different replicas
/// rarely fire together
fn jittered(base: Duration) -> Duration {
    let spread = (base.as_millis() as u64 / 2).max(1);
    base + Duration::from_millis(rand::thread_rng().gen_range(0..=spread))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token(epoch: u64, origin: &str, round: u64) -> TokenMessage {
        TokenMessage {
            epoch,
            origin: origin.to_string(),
            round,
            from: "peer".to_string(),
            snapshot: Vec::new(),
        }
    }

    #[test]
    fn test_gate_admits_increasing_rounds() {
        let now = Instant::now();
        let mut gate = TokenGate::new(now);
        assert_eq!(gate.admit(&token(1, "r1", 1), now), Admission::Admitted);
        assert_eq!(gate.admit(&token(1, "r1", 4), now), Admission::Admitted);
        assert_eq!(gate.round(), 4);
    }

    #[test]
    fn test_gate_rejects_duplicate_delivery() {
        let now = Instant::now();
        let mut gate = TokenGate::new(now);
        assert_eq!(gate.admit(&token(1, "r1", 2), now), Admission::Admitted);
        assert_eq!(gate.admit(&token(1, "r1", 2), now), Admission::Stale);
        assert_eq!(gate.admit(&token(1, "r1", 1), now), Admission::Stale);
    }

    #[test]
    fn test_newer_generation_wins_race() {
        let now = Instant::now();
        let mut gate = TokenGate::new(now);
        assert_eq!(gate.admit(&token(2, "r1", 7), now), Admission::Admitted);
        // Same epoch, larger origin: newer generation even with a lower round
        assert_eq!(gate.admit(&token(2, "r2", 0), now), Admission::Admitted);
        // The loser of the race is discarded from now on
        assert_eq!(gate.admit(&token(2, "r1", 50), now), Admission::Stale);
        assert_eq!(gate.admit(&token(1, "r3", 99), now), Admission::Stale);
        assert_eq!(gate.epoch(), 2);
        assert_eq!(gate.origin(), "r2");
    }

    #[test]
    fn test_originate_supersedes_everything_seen() {
        let now = Instant::now();
        let mut gate = TokenGate::new(now);
        gate.admit(&token(3, "r2", 10), now);

        let epoch = gate.originate("r1", now);
        assert_eq!(epoch, 4);
        assert_eq!(gate.round(), 0);
        assert_eq!(gate.admit(&token(3, "r2", 11), now), Admission::Stale);
        assert_eq!(gate.admit(&token(4, "r1", 1), now), Admission::Admitted);
    }

    #[test]
    fn test_silence_is_measured_from_last_observation() {
        let start = Instant::now();
        let mut gate = TokenGate::new(start);
        let later = start + Duration::from_secs(3);
        assert_eq!(gate.silent_for(later), Duration::from_secs(3));

        gate.observe(later);
        assert_eq!(gate.silent_for(later), Duration::ZERO);
    }

    #[test]
    fn test_jitter_bounds() {
        let base = Duration::from_millis(1_000);
        for _ in 0..50 {
            let d = jittered(base);
            assert!(d >= base && d <= base + Duration::from_millis(500));
        }
    }

    #[tokio::test]
    async fn test_receive_queues_admitted_tokens_only() {
        let (ring, mut rx) = TokenRing::new("r2");

        let ack = ring.receive(token(1, "r1", 1)).await.unwrap();
        assert!(ack.accepted);
        assert_eq!(ack.node_id, "r2");

        let stale = ring.receive(token(1, "r1", 1)).await.unwrap();
        assert!(!stale.accepted);

        let queued = rx.recv().await.unwrap();
        assert_eq!(queued.round, 1);
        assert!(rx.try_recv().is_err());
        assert_eq!(ring.generation().await, (1, "r1".to_string(), 1));
    }

    fn coordinator_towards(successor: &str) -> RingCoordinator {
        let config = ReplicaConfig {
            successor: successor.to_string(),
            predecessor: successor.to_string(),
            deadline: Some(chrono::Utc::now() + chrono::Duration::minutes(5)),
            call_timeout_ms: 300,
            hold_interval_ms: 50,
            token_timeout_ms: 400,
            ..Default::default()
        };
        let (replica, inbox) = ReplicaService::new(
            "r1",
            config.deadline().unwrap(),
            config.successor.clone(),
            config.predecessor.clone(),
        );
        RingCoordinator::new(replica, inbox, &config).unwrap()
    }

    #[tokio::test]
    async fn test_refused_handoff_drops_token() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let successor = format!("http://{}", listener.local_addr().unwrap());
        let router = axum::Router::new().route(
            "/internal/token",
            axum::routing::post(|| async { (axum::http::StatusCode::BAD_REQUEST, "bad token") }),
        );
        tokio::spawn(async move {
            let _ = axum::serve(listener, router).await;
        });

        let mut coordinator = coordinator_towards(&successor);
        coordinator.hold(1, "r1".to_string(), 0);
        assert!(coordinator.replica.ring().is_holding());

        coordinator.forward().await;

        assert!(coordinator.held.is_none());
        assert!(!coordinator.replica.ring().is_holding());
        assert_eq!(coordinator.replica.metrics().token_hops_failed.get(), 1);
    }

    #[tokio::test]
    async fn test_unreachable_successor_keeps_token_for_retry() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let successor = format!("http://{}", listener.local_addr().unwrap());
        drop(listener);

        let mut coordinator = coordinator_towards(&successor);
        coordinator.hold(1, "r1".to_string(), 0);
        let attempted_at = Instant::now();
        coordinator.forward().await;

        let held = coordinator.held.as_ref().expect("token kept for the next attempt");
        assert_eq!(held.round, 0);
        assert!(held.forward_at > attempted_at);
        assert!(coordinator.replica.ring().is_holding());
        assert_eq!(coordinator.replica.metrics().token_hops_failed.get(), 1);
    }
}
