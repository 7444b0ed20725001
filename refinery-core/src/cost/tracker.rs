//! Usage accumulator for one pipeline run
//!
//! A [`CostTracker`] is created by the caller, shared by reference (or
//! `Arc`) with whatever issues provider calls, and exported to the ledger at
//! the end of the run. Totals only grow until [`CostTracker::reset`].

use crate::cost::ledger::LedgerRow;
use crate::protocol::types::{Cost, LlmResponse, TokenUsage};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::debug;

/// Running totals for one label, one model, or the whole run
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct UsageTotals {
    pub calls: u64,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub input_cost_usd: f64,
    pub output_cost_usd: f64,
}

impl UsageTotals {
    pub fn total_tokens(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }

    pub fn total_cost_usd(&self) -> f64 {
        self.input_cost_usd + self.output_cost_usd
    }

    fn add_call(&mut self, usage: &TokenUsage, cost: &Cost) {
        self.calls += 1;
        self.input_tokens += usage.input_tokens;
        self.output_tokens += usage.output_tokens;
        self.input_cost_usd += cost.input_usd;
        self.output_cost_usd += cost.output_usd;
    }

    fn merge(&mut self, other: &UsageTotals) {
        self.calls += other.calls;
        self.input_tokens += other.input_tokens;
        self.output_tokens += other.output_tokens;
        self.input_cost_usd += other.input_cost_usd;
        self.output_cost_usd += other.output_cost_usd;
    }
}

/// Accumulates token usage and spend per operation label and model.
///
/// `record` takes `&self`; concurrent calls from parallel requests are
/// serialized internally.
#[derive(Debug, Default)]
pub struct CostTracker {
    // (label, model) -> totals
    entries: Mutex<BTreeMap<(String, String), UsageTotals>>,
}

impl CostTracker {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<(String, String), UsageTotals>> {
        // Totals stay consistent even if a recording thread panicked
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add one call's usage under `label`
    pub fn record(&self, label: &str, model: &str, usage: TokenUsage, cost: Cost) {
        let mut entries = self.lock();
        entries
            .entry((label.to_string(), model.to_string()))
            .or_default()
            .add_call(&usage, &cost);
        debug!(
            label,
            model,
            input_tokens = usage.input_tokens,
            output_tokens = usage.output_tokens,
            cost_usd = cost.total_usd,
            "usage recorded"
        );
    }

    /// Add a response's usage under `label`
    pub fn record_response(&self, label: &str, response: &LlmResponse) {
        self.record(label, &response.model, response.usage, response.cost);
    }

    /// Point-in-time totals per operation label
    pub fn breakdown(&self) -> BTreeMap<String, UsageTotals> {
        let mut by_label: BTreeMap<String, UsageTotals> = BTreeMap::new();
        for ((label, _), totals) in self.lock().iter() {
            by_label.entry(label.clone()).or_default().merge(totals);
        }
        by_label
    }

    /// Point-in-time totals per model
    pub fn by_model(&self) -> BTreeMap<String, UsageTotals> {
        let mut by_model: BTreeMap<String, UsageTotals> = BTreeMap::new();
        for ((_, model), totals) in self.lock().iter() {
            by_model.entry(model.clone()).or_default().merge(totals);
        }
        by_model
    }

    /// Totals across every label and model
    pub fn totals(&self) -> UsageTotals {
        self.lock().values().fold(UsageTotals::default(), |mut acc, t| {
            acc.merge(t);
            acc
        })
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Clear all totals
    pub fn reset(&self) {
        self.lock().clear();
    }

    /// One ledger row per model, stamped with the current time
    pub fn ledger_rows(&self, run_id: &str) -> Vec<LedgerRow> {
        let timestamp = Utc::now();
        self.by_model()
            .into_iter()
            .map(|(model, totals)| LedgerRow {
                timestamp,
                run_id: run_id.to_string(),
                model,
                call_count: totals.calls,
                input_tokens: totals.input_tokens,
                output_tokens: totals.output_tokens,
                total_tokens: totals.total_tokens(),
                input_cost: totals.input_cost_usd,
                output_cost: totals.output_cost_usd,
                total_cost: totals.total_cost_usd(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_breakdown_per_label() {
        let tracker = CostTracker::new();
        tracker.record("extract", "claude-3-5-haiku-20241022", TokenUsage::new(100, 50), Cost::new(0.1, 0.2));
        tracker.record("extract", "gpt-4o-mini", TokenUsage::new(10, 5), Cost::new(0.01, 0.02));
        tracker.record("refine", "gpt-4o-mini", TokenUsage::new(1, 1), Cost::zero());

        let breakdown = tracker.breakdown();
        assert_eq!(breakdown.len(), 2);
        let extract = breakdown["extract"];
        assert_eq!(extract.calls, 2);
        assert_eq!(extract.input_tokens, 110);
        assert_eq!(extract.output_tokens, 55);
        assert!((extract.total_cost_usd() - 0.33).abs() < 1e-12);
        assert_eq!(breakdown["refine"].calls, 1);
    }

    #[test]
    fn test_totals_and_reset() {
        let tracker = CostTracker::new();
        tracker.record("a", "m", TokenUsage::new(3, 4), Cost::new(1.0, 2.0));
        tracker.record("b", "m", TokenUsage::new(5, 6), Cost::new(3.0, 4.0));

        let totals = tracker.totals();
        assert_eq!(totals.calls, 2);
        assert_eq!(totals.total_tokens(), 18);
        assert_eq!(totals.total_cost_usd(), 10.0);

        tracker.reset();
        assert!(tracker.is_empty());
        assert_eq!(tracker.totals(), UsageTotals::default());
    }

    #[test]
    fn test_ledger_rows_one_per_model() {
        let tracker = CostTracker::new();
        tracker.record("a", "m1", TokenUsage::new(1, 1), Cost::new(0.5, 0.5));
        tracker.record("b", "m1", TokenUsage::new(1, 1), Cost::new(0.5, 0.5));
        tracker.record("b", "m2", TokenUsage::new(2, 0), Cost::zero());

        let rows = tracker.ledger_rows("run-1");
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].model, "m1");
        assert_eq!(rows[0].call_count, 2);
        assert_eq!(rows[0].total_tokens, 4);
        assert_eq!(rows[0].total_cost, 2.0);
        assert_eq!(rows[1].run_id, "run-1");
        assert_eq!(rows[1].total_cost, 0.0);
    }

    #[test]
    fn test_concurrent_records() {
        let tracker = Arc::new(CostTracker::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let tracker = Arc::clone(&tracker);
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        tracker.record("eval", "m", TokenUsage::new(1, 2), Cost::zero());
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        let totals = tracker.totals();
        assert_eq!(totals.calls, 800);
        assert_eq!(totals.input_tokens, 800);
        assert_eq!(totals.output_tokens, 1_600);
    }
}
