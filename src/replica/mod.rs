//! Replica implementation
//!
//! A replica is responsible for:
//! - Accepting or rejecting bids against its own ledger
//! - Answering result queries
//! - Circulating the ring token and merging ledgers carried by it
//! - Closing the auction at the deadline

pub mod http;
pub mod metrics;
pub mod middleware;
pub mod peer_client;
pub mod ring;
pub mod server;
pub mod service;

pub use server::ReplicaServer;
pub use service::ReplicaService;
