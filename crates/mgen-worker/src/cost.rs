//! Per-job cost ledger.

use std::collections::BTreeMap;
use std::sync::Mutex;

use mgen_models::{Capability, CostEntry};

/// Append-only record of provider spend for one job.
///
/// Entries are never removed, so a failed job still reports what it spent.
#[derive(Debug, Default)]
pub struct CostLedger {
    entries: Mutex<Vec<CostEntry>>,
}

impl CostLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one completed provider call.
    pub fn record(&self, provider: impl Into<String>, capability: Capability, amount: f64) {
        let entry = CostEntry::new(provider, capability, amount);
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(entry);
    }

    /// Entries in recording order.
    pub fn entries(&self) -> Vec<CostEntry> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn total(&self) -> f64 {
        self.entries().iter().map(|e| e.amount).sum()
    }

    /// Total spend per provider.
    pub fn by_provider(&self) -> BTreeMap<String, f64> {
        let mut totals = BTreeMap::new();
        for entry in self.entries() {
            *totals.entry(entry.provider).or_insert(0.0) += entry.amount;
        }
        totals
    }
}
