//! Client fan-out coordinator
//!
//! Bids go to every configured replica at once; each call has its own
//! timeout and a failure on one replica never holds up the others. Result
//! queries walk the replicas in priority order and return the first answer.

use crate::client::replica_client::ReplicaClient;
use crate::common::{client_id_for_name, ClientConfig};
use crate::proto::{Ack, BidRequest, Outcome};
use crate::{Error, Result};
use futures_util::future::join_all;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// A configured replica as seen by the client
#[derive(Debug)]
pub struct ReplicaDescriptor {
    pub address: String,
    /// Lower is tried first
    pub priority: usize,
    reachable: AtomicBool,
}

impl ReplicaDescriptor {
    pub fn new(address: impl Into<String>, priority: usize) -> Self {
        Self {
            address: address.into(),
            priority,
            reachable: AtomicBool::new(true),
        }
    }

    /// Outcome of the last call made to this replica
    pub fn is_reachable(&self) -> bool {
        self.reachable.load(Ordering::Relaxed)
    }

    fn mark(&self, reachable: bool) {
        let was = self.reachable.swap(reachable, Ordering::Relaxed);
        if was && !reachable {
            tracing::warn!("Replica {} marked unreachable", self.address);
        } else if !was && reachable {
            tracing::info!("Replica {} reachable again", self.address);
        }
    }
}

/// One replica's answer to a fanned-out bid
#[derive(Debug)]
pub struct ReplicaBidResult {
    pub replica: String,
    pub result: Result<Ack>,
}

impl ReplicaBidResult {
    pub fn ack(&self) -> Option<&Ack> {
        self.result.as_ref().ok()
    }

    pub fn is_unreachable(&self) -> bool {
        matches!(&self.result, Err(e) if e.is_unreachable())
    }

    /// One-word summary for reports
    pub fn verdict(&self) -> &'static str {
        match &self.result {
            Ok(ack) if ack.accepted => "accepted",
            Ok(_) => "rejected",
            Err(e) if e.is_unreachable() => "unreachable",
            Err(_) => "error",
        }
    }
}

/// The first successful result answer and the replica that gave it
#[derive(Debug, Clone, PartialEq)]
pub struct ResultAnswer {
    pub replica: String,
    pub outcome: Outcome,
}

struct Replica {
    descriptor: ReplicaDescriptor,
    client: ReplicaClient,
}

pub struct AuctionClient {
    replicas: Vec<Replica>,
    call_timeout: Duration,
}

impl AuctionClient {
    pub fn new(config: &ClientConfig) -> Result<Self> {
        config.validate()?;

        let call_timeout = config.call_timeout();
        let http = reqwest::Client::builder()
            .timeout(call_timeout)
            .connect_timeout(call_timeout)
            .build()
            .map_err(|e| Error::Internal(format!("failed to build HTTP client: {}", e)))?;

        // Priority is the position in the configured list
        let replicas: Vec<Replica> = config
            .replicas
            .iter()
            .enumerate()
            .map(|(priority, address)| Replica {
                descriptor: ReplicaDescriptor::new(address.clone(), priority),
                client: ReplicaClient::with_http(address.clone(), http.clone()),
            })
            .collect();

        Ok(Self {
            replicas,
            call_timeout,
        })
    }

    /// Descriptors in priority order
    pub fn descriptors(&self) -> impl Iterator<Item = &ReplicaDescriptor> {
        self.replicas.iter().map(|r| &r.descriptor)
    }

    /// Send the bid to every replica concurrently.
    ///
    /// Only a malformed bid fails the whole call; replica failures are
    /// reported per replica.
    pub async fn bid(&self, amount: f64, client_name: &str) -> Result<Vec<ReplicaBidResult>> {
        let request = BidRequest {
            amount,
            client_id: client_id_for_name(client_name),
            client_name: client_name.to_string(),
        };
        request.validate()?;

        let calls = self.replicas.iter().map(|replica| {
            let request = &request;
            async move {
                let result = self.call(replica, replica.client.bid(request)).await;
                ReplicaBidResult {
                    replica: replica.descriptor.address.clone(),
                    result,
                }
            }
        });

        let results = join_all(calls).await;
        let acked = results.iter().filter(|r| r.result.is_ok()).count();
        tracing::info!(
            "Bid of {} by {} reached {}/{} replicas",
            amount,
            client_name,
            acked,
            results.len()
        );
        Ok(results)
    }

    /// First successful answer, trying replicas in priority order
    pub async fn result(&self) -> Result<ResultAnswer> {
        for replica in &self.replicas {
            match self.call(replica, replica.client.result()).await {
                Ok(outcome) => {
                    return Ok(ResultAnswer {
                        replica: replica.descriptor.address.clone(),
                        outcome,
                    })
                }
                Err(e) => {
                    tracing::warn!(
                        "Result query to {} failed, falling back: {}",
                        replica.descriptor.address,
                        e
                    );
                }
            }
        }

        Err(Error::AllReplicasUnreachable {
            attempted: self.replicas.len(),
        })
    }

    /// Run one call under the per-call timeout and record reachability
    async fn call<T, F>(&self, replica: &Replica, call: F) -> Result<T>
    where
        F: std::future::Future<Output = Result<T>>,
    {
        let result = match tokio::time::timeout(self.call_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(Error::Timeout(format!(
                "{} did not answer within {:?}",
                replica.descriptor.address, self.call_timeout
            ))),
        };

        match &result {
            Ok(_) => replica.descriptor.mark(true),
            Err(e) if e.is_unreachable() => replica.descriptor.mark(false),
            Err(_) => {}
        }
        result
    }
}
