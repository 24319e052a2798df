//! Per-replica counters, rendered in Prometheus text format
//!
//! Each replica owns its own [`ReplicaMetrics`]; several replicas can share
//! one process (integration tests do) without mixing their numbers.

use std::fmt::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Monotonic counter
#[derive(Debug, Default)]
pub struct Counter {
    value: AtomicU64,
}

impl Counter {
    pub fn new() -> Self {
        Self {
            value: AtomicU64::new(0),
        }
    }

    pub fn inc(&self) {
        self.value.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add(&self, n: u64) {
        self.value.fetch_add(n, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

#[derive(Debug)]
pub struct ReplicaMetrics {
    pub bids_accepted: Counter,
    pub bids_rejected: Counter,
    pub malformed_requests: Counter,
    pub result_queries: Counter,

    pub tokens_received: Counter,
    pub tokens_stale: Counter,
    pub tokens_forwarded: Counter,
    pub token_hops_failed: Counter,
    pub token_regenerations: Counter,
    pub deltas_committed: Counter,
    pub records_merged: Counter,

    start_time: Instant,
}

impl ReplicaMetrics {
    pub fn new() -> Self {
        Self {
            bids_accepted: Counter::new(),
            bids_rejected: Counter::new(),
            malformed_requests: Counter::new(),
            result_queries: Counter::new(),
            tokens_received: Counter::new(),
            tokens_stale: Counter::new(),
            tokens_forwarded: Counter::new(),
            token_hops_failed: Counter::new(),
            token_regenerations: Counter::new(),
            deltas_committed: Counter::new(),
            records_merged: Counter::new(),
            start_time: Instant::now(),
        }
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Generate Prometheus-compatible metrics output
    pub fn to_prometheus(&self, node_id: &str, ledger_size: usize) -> String {
        let mut out = String::new();

        let counters: [(&str, &str, &Counter); 11] = [
            ("bids_accepted_total", "Bids accepted by this replica", &self.bids_accepted),
            ("bids_rejected_total", "Bids rejected by this replica", &self.bids_rejected),
            ("malformed_requests_total", "Requests rejected at the boundary", &self.malformed_requests),
            ("result_queries_total", "Result queries served", &self.result_queries),
            ("tokens_received_total", "Ring tokens admitted", &self.tokens_received),
            ("tokens_stale_total", "Ring tokens discarded as stale", &self.tokens_stale),
            ("tokens_forwarded_total", "Ring tokens handed to the successor", &self.tokens_forwarded),
            ("token_hops_failed_total", "Failed token handoffs", &self.token_hops_failed),
            ("token_regenerations_total", "Token generations originated by the watchdog", &self.token_regenerations),
            ("deltas_committed_total", "Local bids committed to the ring", &self.deltas_committed),
            ("records_merged_total", "Ledger entries changed by ring merges", &self.records_merged),
        ];

        for (name, help, counter) in counters {
            let _ = writeln!(out, "# HELP ringbid_{} {}", name, help);
            let _ = writeln!(out, "# TYPE ringbid_{} counter", name);
            let _ = writeln!(
                out,
                "ringbid_{}{{node=\"{}\"}} {}",
                name,
                node_id,
                counter.get()
            );
        }

        out.push_str("# HELP ringbid_ledger_entries Clients with a live bid\n");
        out.push_str("# TYPE ringbid_ledger_entries gauge\n");
        let _ = writeln!(
            out,
            "ringbid_ledger_entries{{node=\"{}\"}} {}",
            node_id, ledger_size
        );

        out.push_str("# HELP ringbid_uptime_seconds Replica uptime in seconds\n");
        out.push_str("# TYPE ringbid_uptime_seconds gauge\n");
        let _ = writeln!(
            out,
            "ringbid_uptime_seconds{{node=\"{}\"}} {}",
            node_id,
            self.uptime_seconds()
        );

        out
    }
}

impl Default for ReplicaMetrics {
    fn default() -> Self {
        Self::new()
    }
}
