//! Ledger convergence through the token ring

mod common;

use chrono::Utc;
use ringbid::client::ReplicaClient;
use ringbid::common::client_id_for_name;
use ringbid::proto::BidRequest;
use std::time::Duration;

fn bid(name: &str, amount: f64) -> BidRequest {
    BidRequest {
        amount,
        client_id: client_id_for_name(name),
        client_name: name.to_string(),
    }
}

async fn converges_to(replicas: &[String], name: &str, amount: f64) -> bool {
    for address in replicas {
        let replica = ReplicaClient::new(address.clone(), Duration::from_secs(1)).unwrap();
        let ok = common::eventually(Duration::from_secs(10), || {
            let replica = replica.clone();
            let name = name.to_string();
            async move {
                match replica.status().await {
                    Ok(s) => s
                        .highest
                        .map(|h| h.client_name == name && h.amount == amount)
                        .unwrap_or(false),
                    Err(_) => false,
                }
            }
        })
        .await;
        if !ok {
            return false;
        }
    }
    true
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_bid_on_one_replica_reaches_all() {
    let deadline = Utc::now() + chrono::Duration::minutes(5);
    let replicas = common::spawn_ring(3, deadline, true).await;

    let r3 = ReplicaClient::new(replicas[2].clone(), Duration::from_secs(1)).unwrap();
    let ack = r3.bid(&bid("bob", 80.0)).await.unwrap();
    assert!(ack.accepted);

    let r2 = ReplicaClient::new(replicas[1].clone(), Duration::from_secs(1)).unwrap();
    let ack = r2.bid(&bid("alice", 120.0)).await.unwrap();
    assert!(ack.accepted);

    assert!(converges_to(&replicas, "alice", 120.0).await);

    // Once merged, r3 holds alice's bid too and refuses anything lower
    let ack = r3.bid(&bid("carol", 100.0)).await.unwrap();
    assert!(!ack.accepted);
    assert_eq!(ack.highest_amount, 120.0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_watchdog_originates_missing_token() {
    let deadline = Utc::now() + chrono::Duration::minutes(5);
    let replicas = common::spawn_ring(3, deadline, false).await;

    let r1 = ReplicaClient::new(replicas[0].clone(), Duration::from_secs(1)).unwrap();
    let started = common::eventually(Duration::from_secs(10), || {
        let r1 = r1.clone();
        async move {
            match r1.status().await {
                Ok(s) => s.token_epoch >= 1,
                Err(_) => false,
            }
        }
    })
    .await;
    assert!(started, "no replica originated a token");

    r1.bid(&bid("dana", 33.0)).await.unwrap();
    assert!(converges_to(&replicas, "dana", 33.0).await);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_malformed_bid_is_rejected() {
    let deadline = Utc::now() + chrono::Duration::minutes(5);
    let replicas = common::spawn_ring(3, deadline, true).await;
    let http = reqwest::Client::new();

    let resp = http
        .post(format!("{}/bid", replicas[0]))
        .json(&serde_json::json!({
            "amount": -5.0,
            "client_id": 1,
            "client_name": "eve",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::BAD_REQUEST);

    let resp = http
        .post(format!("{}/bid", replicas[0]))
        .header("content-type", "application/json")
        .body("{not json")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::BAD_REQUEST);

    let metrics = http
        .get(format!("{}/metrics", replicas[0]))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert!(metrics.contains("ringbid_malformed_requests_total{node=\"r1\"} 2"));

    let r1 = ReplicaClient::new(replicas[0].clone(), Duration::from_secs(1)).unwrap();
    let status = r1.status().await.unwrap();
    assert!(status.highest.is_none());
}
