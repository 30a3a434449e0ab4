//! Injected metrics port.
//!
//! Collaborators receive a sink at construction time; nothing in the
//! pipeline registers process-wide collectors.

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Counter {
    PartnersMerged,
    CompaniesConsolidated,
    CompaniesSkipped,
    BatchesLoaded,
}

pub trait MetricsSink: Send + Sync {
    fn incr(&self, counter: Counter, by: u64);
}

/// Sink that discards everything. Default for library callers that do
/// not care about telemetry.
#[derive(Debug, Default)]
pub struct NoopMetrics;

impl MetricsSink for NoopMetrics {
    fn incr(&self, _counter: Counter, _by: u64) {}
}

/// In-process counters, cheap enough for the hot staging path. The CLI
/// reads them back for its end-of-import summary.
#[derive(Debug, Default)]
pub struct AtomicMetrics {
    partners_merged: AtomicU64,
    companies_consolidated: AtomicU64,
    companies_skipped: AtomicU64,
    batches_loaded: AtomicU64,
}

impl AtomicMetrics {
    fn cell(&self, counter: Counter) -> &AtomicU64 {
        match counter {
            Counter::PartnersMerged => &self.partners_merged,
            Counter::CompaniesConsolidated => &self.companies_consolidated,
            Counter::CompaniesSkipped => &self.companies_skipped,
            Counter::BatchesLoaded => &self.batches_loaded,
        }
    }

    pub fn get(&self, counter: Counter) -> u64 {
        self.cell(counter).load(Ordering::Relaxed)
    }
}

impl MetricsSink for AtomicMetrics {
    fn incr(&self, counter: Counter, by: u64) {
        self.cell(counter).fetch_add(by, Ordering::Relaxed);
    }
}
