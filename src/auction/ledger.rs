//! Per-replica bid ledger
//!
//! One live record per client. A bid is stored only when it beats every
//! record currently in the ledger. Ledgers from different replicas are
//! reconciled with [`Ledger::merge`], an entrywise maximum that is
//! commutative, associative and idempotent.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

/// A bid accepted by some replica
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BidRecord {
    pub client_id: u64,
    pub client_name: String,
    pub amount: f64,
    pub accepted_at: DateTime<Utc>,
}

impl BidRecord {
    pub fn new(
        client_id: u64,
        client_name: impl Into<String>,
        amount: f64,
        accepted_at: DateTime<Utc>,
    ) -> Self {
        Self {
            client_id,
            client_name: client_name.into(),
            amount,
            accepted_at,
        }
    }

    /// Check a record received from the wire
    pub fn validate(&self) -> crate::Result<()> {
        crate::common::validate_amount(self.amount)?;
        crate::common::validate_client_name(&self.client_name)
    }

    /// Does this record replace `other` when both belong to the same client?
    ///
    /// Higher amount wins, then the earlier acceptance, then the smaller name.
    pub fn supersedes(&self, other: &BidRecord) -> bool {
        self.amount
            .total_cmp(&other.amount)
            .then_with(|| other.accepted_at.cmp(&self.accepted_at))
            .then_with(|| other.client_name.cmp(&self.client_name))
            == Ordering::Greater
    }

    /// Does this record rank above `other` when picking the overall winner?
    pub fn outranks(&self, other: &BidRecord) -> bool {
        self.amount
            .total_cmp(&other.amount)
            .then_with(|| other.accepted_at.cmp(&self.accepted_at))
            .then_with(|| other.client_id.cmp(&self.client_id))
            == Ordering::Greater
    }
}

/// Highest bid per client plus the deltas not yet committed to the ring
#[derive(Debug, Clone, Default)]
pub struct Ledger {
    bids: HashMap<u64, BidRecord>,
    /// Clients whose entry changed locally since the last commit; never
    /// larger than `bids`
    pending: HashSet<u64>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current winner, `None` while the ledger is empty
    pub fn highest(&self) -> Option<&BidRecord> {
        self.bids.values().fold(None, |best, record| match best {
            Some(current) if !record.outranks(current) => Some(current),
            _ => Some(record),
        })
    }

    pub fn highest_amount(&self) -> f64 {
        self.highest().map(|r| r.amount).unwrap_or(0.0)
    }

    /// Store `record` if it beats every bid in the ledger (ties lose).
    ///
    /// Returns `true` when the record was stored.
    pub fn offer(&mut self, record: BidRecord) -> bool {
        if let Some(highest) = self.highest() {
            if record.amount <= highest.amount {
                return false;
            }
        }
        self.pending.insert(record.client_id);
        self.bids.insert(record.client_id, record);
        true
    }

    /// Fold remote records in, keeping the superseding record per client.
    ///
    /// Returns the number of entries that changed.
    pub fn merge<I>(&mut self, records: I) -> usize
    where
        I: IntoIterator<Item = BidRecord>,
    {
        let mut changed = 0;
        for record in records {
            match self.bids.get(&record.client_id) {
                Some(existing) if !record.supersedes(existing) => {}
                _ => {
                    self.bids.insert(record.client_id, record);
                    changed += 1;
                }
            }
        }
        changed
    }

    /// Records sorted by client id
    pub fn snapshot(&self) -> Vec<BidRecord> {
        let mut records: Vec<BidRecord> = self.bids.values().cloned().collect();
        records.sort_by_key(|r| r.client_id);
        records
    }

    /// Drain the local deltas since the last call; returns how many
    /// entries they touched
    pub fn take_pending(&mut self) -> usize {
        std::mem::take(&mut self.pending).len()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn get(&self, client_id: u64) -> Option<&BidRecord> {
        self.bids.get(&client_id)
    }

    pub fn len(&self) -> usize {
        self.bids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bids.is_empty()
    }
}
