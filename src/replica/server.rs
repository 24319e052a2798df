//! Replica server: wires the service, the ring coordinator, the deadline
//! timer and the HTTP surface together

use crate::common::{remaining_until, ReplicaConfig, Result};
use crate::replica::http::create_router;
use crate::replica::ring::RingCoordinator;
use crate::replica::service::ReplicaService;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

pub struct ReplicaServer {
    config: ReplicaConfig,
    node_id: String,
}

impl ReplicaServer {
    pub fn new(config: ReplicaConfig, node_id: String) -> Self {
        Self { config, node_id }
    }

    /// Bind `bind_addr` and serve until Ctrl-C
    pub async fn serve(self) -> Result<()> {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        self.run(listener, shutdown_signal()).await
    }

    /// Serve on an already bound listener until the task is dropped
    pub async fn serve_with_listener(self, listener: TcpListener) -> Result<()> {
        self.run(listener, std::future::pending()).await
    }

    async fn run<S>(self, listener: TcpListener, shutdown: S) -> Result<()>
    where
        S: std::future::Future<Output = ()> + Send + 'static,
    {
        self.config.validate()?;
        let deadline = self.config.deadline()?;

        tracing::info!("Starting replica: {}", self.node_id);
        tracing::info!("  RPC API: {}", listener.local_addr()?);
        tracing::info!("  Successor: {}", self.config.successor);
        tracing::info!("  Predecessor: {}", self.config.predecessor);
        tracing::info!("  Deadline: {}", deadline);
        tracing::info!("  Initial token: {}", self.config.initial_token);

        let (service, inbox) = ReplicaService::new(
            self.node_id.clone(),
            deadline,
            self.config.successor.clone(),
            self.config.predecessor.clone(),
        );

        let ring = RingCoordinator::new(service.clone(), inbox, &self.config)?;
        let ring_handle = ring.start();
        let deadline_handle = start_deadline_timer(service.clone(), deadline);

        let router = create_router(service.clone(), self.config.max_body_bytes);

        tracing::info!("✓ Replica {} ready", self.node_id);

        let res = axum::serve(listener, router)
            .with_graceful_shutdown(shutdown)
            .await;

        ring_handle.abort();
        deadline_handle.abort();

        if let Err(e) = res {
            tracing::error!("HTTP server error: {}", e);
            return Err(e.into());
        }
        Ok(())
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

/// Close the auction once the deadline passes, even with no traffic
fn start_deadline_timer(
    service: Arc<ReplicaService>,
    deadline: chrono::DateTime<Utc>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let remaining = remaining_until(deadline, Utc::now());
            tokio::time::sleep(remaining.max(Duration::from_millis(10))).await;
            if service.close_if_expired().await || Utc::now() >= deadline {
                break;
            }
        }
    })
}
