//! # ringbid
//!
//! An auction replicated across a fixed set of replicas:
//! - Each replica keeps its own ledger of the highest bid per client
//! - A token circulating on a ring of replicas serializes ledger commits
//!   so replicas converge
//! - Clients fan bids out to every replica and fall back across replicas
//!   when asking for the result
//! - The auction closes at a configured deadline, after which the highest
//!   bid is final
//!
//! ## Architecture
//!
//! ```text
//!              ┌──────────── bid (fan-out) ────────────┐
//!              │                  │                    │
//!        ┌─────▼─────┐      ┌─────▼─────┐        ┌─────▼─────┐
//!        │ Replica 1 │─tok─▶│ Replica 2 │──tok──▶│ Replica 3 │
//!        │  ledger   │      │  ledger   │        │  ledger   │
//!        └─────▲─────┘      └───────────┘        └─────┬─────┘
//!              └──────────────── token ────────────────┘
//! ```
//!
//! ## Usage
//!
//! ### Start a ring of three replicas
//! ```bash
//! ringbid-replica serve --id r1 --bind 127.0.0.1:5400 \
//!   --successor http://127.0.0.1:5401 --predecessor http://127.0.0.1:5402 \
//!   --deadline 10m --initial-token
//! ringbid-replica serve --id r2 --bind 127.0.0.1:5401 \
//!   --successor http://127.0.0.1:5402 --predecessor http://127.0.0.1:5400 \
//!   --deadline 10m
//! ringbid-replica serve --id r3 --bind 127.0.0.1:5402 \
//!   --successor http://127.0.0.1:5400 --predecessor http://127.0.0.1:5401 \
//!   --deadline 10m
//! ```
//!
//! All three must agree on the deadline; pass an RFC 3339 timestamp when
//! starting them at different times.
//!
//! ### Bid and query
//! ```bash
//! ringbid --replicas http://127.0.0.1:5400,http://127.0.0.1:5401,http://127.0.0.1:5402 \
//!   bid 150 --name alice
//! ringbid --replicas http://127.0.0.1:5400,http://127.0.0.1:5401 result
//! ```

pub mod auction;
pub mod client;
pub mod common;
pub mod proto;
pub mod replica;

// Re-export commonly used types
pub use client::AuctionClient;
pub use common::{Config, Error, Result};
pub use replica::{ReplicaServer, ReplicaService};

/// Current version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Build info
pub const BUILD_INFO: &str = concat!(env!("CARGO_PKG_VERSION"), " (", env!("CARGO_PKG_NAME"), ")");
