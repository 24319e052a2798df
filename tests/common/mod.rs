//! Helpers for spinning up replicas on ephemeral ports

#![allow(dead_code)]

use chrono::{DateTime, Utc};
use ringbid::common::ReplicaConfig;
use ringbid::ReplicaServer;
use std::future::Future;
use std::time::Duration;
use tokio::net::TcpListener;

/// Reserve a listener on an ephemeral port
pub async fn reserve() -> (TcpListener, String) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = format!("http://{}", listener.local_addr().unwrap());
    (listener, address)
}

/// An address nothing listens on
pub fn dead_address() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let address = format!("http://{}", listener.local_addr().unwrap());
    drop(listener);
    address
}

/// An address that accepts connections and never answers
pub async fn black_hole() -> String {
    let (listener, address) = reserve().await;
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((socket, _)) = listener.accept().await {
            held.push(socket);
        }
    });
    address
}

pub fn replica_config(
    successor: &str,
    predecessor: &str,
    deadline: DateTime<Utc>,
    initial_token: bool,
) -> ReplicaConfig {
    ReplicaConfig {
        successor: successor.to_string(),
        predecessor: predecessor.to_string(),
        deadline: Some(deadline),
        call_timeout_ms: 300,
        hold_interval_ms: 50,
        token_timeout_ms: 400,
        initial_token,
        ..Default::default()
    }
}

pub fn spawn_replica(listener: TcpListener, node_id: &str, config: ReplicaConfig) {
    let server = ReplicaServer::new(config, node_id.to_string());
    tokio::spawn(async move {
        if let Err(e) = server.serve_with_listener(listener).await {
            eprintln!("replica stopped: {}", e);
        }
    });
}

/// Start `n` replicas wired into a ring; the first one may originate the token
pub async fn spawn_ring(n: usize, deadline: DateTime<Utc>, initial_token: bool) -> Vec<String> {
    let mut listeners = Vec::with_capacity(n);
    for _ in 0..n {
        listeners.push(reserve().await);
    }
    let addresses: Vec<String> = listeners.iter().map(|(_, a)| a.clone()).collect();

    for (i, (listener, _)) in listeners.into_iter().enumerate() {
        let successor = &addresses[(i + 1) % n];
        let predecessor = &addresses[(i + n - 1) % n];
        let mut config =
            replica_config(successor, predecessor, deadline, initial_token && i == 0);
        config.ring_size = Some(n);
        spawn_replica(listener, &format!("r{}", i + 1), config);
    }

    addresses
}

/// Poll `check` until it holds or `timeout` elapses
pub async fn eventually<F, Fut>(timeout: Duration, mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let give_up = tokio::time::Instant::now() + timeout;
    loop {
        if check().await {
            return true;
        }
        if tokio::time::Instant::now() >= give_up {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}
