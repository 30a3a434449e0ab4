//! Joins the staged facets into one document per branch.
//!
//! Single sequential scan over the `companies` namespace; each full key
//! pulls its base-keyed facets and becomes one [`Company`]. Batches are
//! handed to a caller-supplied sink (the loader) so nothing buffers the
//! whole dataset.

use std::sync::Arc;

use anyhow::anyhow;
use tracing::warn;

use registry_core::error::{RegistryError, Result};
use registry_core::metrics::{Counter, MetricsSink, NoopMetrics};
use registry_core::model::{BranchRecord, Cnpj, Company};

use crate::staging::{self, Namespace, StagingStore};

pub const DEFAULT_BATCH_SIZE: usize = 8192;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ConsolidationStats {
    /// Documents emitted.
    pub produced: u64,
    /// Full keys dropped for data-quality reasons (no base record, or a
    /// key that is not a CNPJ). Never silently merged elsewhere.
    pub skipped: u64,
}

pub struct Consolidator<'a> {
    staging: &'a StagingStore,
    batch_size: usize,
    metrics: Arc<dyn MetricsSink>,
}

impl<'a> Consolidator<'a> {
    pub fn new(staging: &'a StagingStore, batch_size: usize) -> Self {
        Self {
            staging,
            batch_size: batch_size.max(1),
            metrics: Arc::new(NoopMetrics),
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<dyn MetricsSink>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Walks every staged branch and streams `(id, json)` batches to the
    /// sink. Returns the run's counts.
    pub fn run(
        &self,
        sink: &mut dyn FnMut(Vec<(String, String)>) -> Result<()>,
    ) -> Result<ConsolidationStats> {
        let mut stats = ConsolidationStats::default();
        let mut batch: Vec<(String, String)> = Vec::with_capacity(self.batch_size);
        for entry in self.staging.entries(Namespace::Companies)? {
            let (key, bytes) = entry?;
            let Ok(cnpj) = Cnpj::new(&key) else {
                warn!(%key, "staged branch key is not a cnpj, skipping");
                stats.skipped += 1;
                self.metrics.incr(Counter::CompaniesSkipped, 1);
                continue;
            };
            let Some(base) = self.staging.base_of(cnpj.base())? else {
                warn!(%key, base = cnpj.base(), "no base record for branch, skipping");
                stats.skipped += 1;
                self.metrics.incr(Counter::CompaniesSkipped, 1);
                continue;
            };
            let branch: BranchRecord =
                staging::decode(Namespace::Companies, &key, &bytes)?;
            let partners = self.staging.partners_of(cnpj.base())?;
            self.metrics
                .incr(Counter::PartnersMerged, partners.len() as u64);
            let taxes = self.staging.taxes_of(cnpj.base())?;
            let company = Company::new(&cnpj, branch, base, partners, taxes);
            let json = serde_json::to_string(&company)
                .map_err(|e| RegistryError::Internal(anyhow!(e)))?;
            batch.push((key, json));
            stats.produced += 1;
            self.metrics.incr(Counter::CompaniesConsolidated, 1);
            if batch.len() >= self.batch_size {
                sink(std::mem::take(&mut batch))?;
                self.metrics.incr(Counter::BatchesLoaded, 1);
            }
        }
        if !batch.is_empty() {
            sink(batch)?;
            self.metrics.incr(Counter::BatchesLoaded, 1);
        }
        Ok(stats)
    }
}
