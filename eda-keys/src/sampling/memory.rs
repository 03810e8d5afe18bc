//! Sample provider over record batches held in memory.

use arrow::record_batch::RecordBatch;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::instrument;

use crate::error::{EdaError, Result};
use crate::metadata::TableRef;

use super::{Sample, SampleProvider, SampleTier};

/// Serves the first `row_cap` rows of in-memory tables.
///
/// Tiers can be marked unavailable per table, which makes the provider
/// useful for exercising the failure paths of a search. Every call to
/// [`fetch_sample`](SampleProvider::fetch_sample) is counted per tier.
#[derive(Clone, Default)]
pub struct InMemorySampleProvider {
    tables: Arc<RwLock<HashMap<TableRef, Vec<RecordBatch>>>>,
    unavailable: Arc<RwLock<HashSet<(TableRef, SampleTier)>>>,
    fetches: Arc<[AtomicUsize; 3]>,
}

impl InMemorySampleProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores the rows of `table`, replacing any previous rows.
    pub async fn insert(&self, table: TableRef, batches: Vec<RecordBatch>) {
        self.tables.write().await.insert(table, batches);
    }

    /// Makes every fetch of `tier` for `table` fail.
    pub async fn fail_tier(&self, table: TableRef, tier: SampleTier) {
        self.unavailable.write().await.insert((table, tier));
    }

    /// Number of fetches of `tier` so far, across all tables.
    pub fn fetch_count(&self, tier: SampleTier) -> usize {
        self.fetches[tier.index()].load(Ordering::Relaxed)
    }

    /// Total number of fetches so far.
    pub fn total_fetches(&self) -> usize {
        SampleTier::ALL.iter().map(|t| self.fetch_count(*t)).sum()
    }
}

#[async_trait]
impl SampleProvider for InMemorySampleProvider {
    #[instrument(skip(self), fields(table = %table, %tier, provider = "in_memory"))]
    async fn fetch_sample(
        &self,
        table: &TableRef,
        tier: SampleTier,
        row_cap: usize,
    ) -> Result<Sample> {
        self.fetches[tier.index()].fetch_add(1, Ordering::Relaxed);

        if self
            .unavailable
            .read()
            .await
            .contains(&(table.clone(), tier))
        {
            return Err(EdaError::sample_unavailable(
                tier,
                table.to_string(),
                "source refused the sample query",
            ));
        }

        let batches = self.tables.read().await.get(table).cloned().ok_or_else(|| {
            EdaError::sample_unavailable(tier, table.to_string(), "table is not registered")
        })?;
        let schema = batches.first().map(|b| b.schema()).ok_or_else(|| {
            EdaError::sample_unavailable(tier, table.to_string(), "source returned no rows")
        })?;

        Sample::try_new(tier, table.clone(), schema, batches, row_cap)
    }
}
