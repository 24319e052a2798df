//! Common utilities and types shared across ringbid

pub mod config;
pub mod error;
pub mod utils;

pub use config::{ClientConfig, Config, ReplicaConfig};
pub use error::{Error, Result};
pub use utils::{
    client_id_for_name, parse_deadline, parse_duration, parse_duration_ms, remaining_until,
    validate_amount, validate_client_name,
};
