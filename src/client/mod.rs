//! Client side: per-replica RPC client and the fan-out/fallback coordinator

pub mod fanout;
pub mod replica_client;

pub use fanout::{AuctionClient, ReplicaBidResult, ReplicaDescriptor, ResultAnswer};
pub use replica_client::ReplicaClient;
