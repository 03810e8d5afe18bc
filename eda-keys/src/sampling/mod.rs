//! Tiered row samples of source tables.
//!
//! A key search evaluates combinations on three progressively larger samples
//! of the same table. Samples are materialised once, held in memory as Arrow
//! record batches, and never modified afterwards.

use arrow::datatypes::SchemaRef;
use arrow::record_batch::RecordBatch;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use datafusion::datasource::MemTable;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::error::{EdaError, Result};
use crate::metadata::TableRef;

mod datafusion_provider;
mod memory;
mod reservoir;

pub use datafusion_provider::DataFusionSampleProvider;
pub use memory::InMemorySampleProvider;

/// One of the three sample sizes of a search run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SampleTier {
    Small,
    Medium,
    Large,
}

impl SampleTier {
    /// All tiers in evaluation order.
    pub const ALL: [SampleTier; 3] = [SampleTier::Small, SampleTier::Medium, SampleTier::Large];

    /// Returns the tier evaluated after this one.
    pub fn next(&self) -> Option<SampleTier> {
        match self {
            Self::Small => Some(Self::Medium),
            Self::Medium => Some(Self::Large),
            Self::Large => None,
        }
    }

    /// Position of the tier in evaluation order.
    pub fn index(&self) -> usize {
        match self {
            Self::Small => 0,
            Self::Medium => 1,
            Self::Large => 2,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Small => "small",
            Self::Medium => "medium",
            Self::Large => "large",
        }
    }
}

impl fmt::Display for SampleTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How rows are chosen from the source table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SamplingStrategy {
    /// The first `row_cap` rows in scan order, optionally after sorting.
    Head {
        /// Columns to sort by before taking rows; makes the sample stable across runs
        #[serde(default)]
        order_by: Vec<String>,
    },
    /// A uniform single-pass reservoir sample, reproducible for a given seed.
    Reservoir { seed: u64 },
}

impl SamplingStrategy {
    /// Unordered head sampling.
    pub fn head() -> Self {
        Self::Head {
            order_by: Vec::new(),
        }
    }
}

impl Default for SamplingStrategy {
    fn default() -> Self {
        Self::head()
    }
}

/// An immutable in-memory sample of a table.
#[derive(Debug, Clone)]
pub struct Sample {
    tier: SampleTier,
    table: TableRef,
    schema: SchemaRef,
    batches: Vec<RecordBatch>,
    num_rows: usize,
    captured_at: DateTime<Utc>,
}

impl Sample {
    /// Builds a sample from record batches, truncated to `row_cap` rows.
    ///
    /// Fails with [`EdaError::SampleUnavailable`] when the batches hold no rows.
    pub fn try_new(
        tier: SampleTier,
        table: TableRef,
        schema: SchemaRef,
        batches: Vec<RecordBatch>,
        row_cap: usize,
    ) -> Result<Self> {
        let mut kept = Vec::with_capacity(batches.len());
        let mut num_rows = 0;
        for batch in batches {
            if num_rows >= row_cap {
                break;
            }
            let take = batch.num_rows().min(row_cap - num_rows);
            if take == 0 {
                continue;
            }
            num_rows += take;
            kept.push(if take == batch.num_rows() {
                batch
            } else {
                batch.slice(0, take)
            });
        }

        if num_rows == 0 {
            return Err(EdaError::sample_unavailable(
                tier,
                table.to_string(),
                "source returned no rows",
            ));
        }

        Ok(Self {
            tier,
            table,
            schema,
            batches: kept,
            num_rows,
            captured_at: Utc::now(),
        })
    }

    pub fn tier(&self) -> SampleTier {
        self.tier
    }

    pub fn table(&self) -> &TableRef {
        &self.table
    }

    pub fn schema(&self) -> SchemaRef {
        self.schema.clone()
    }

    pub fn batches(&self) -> &[RecordBatch] {
        &self.batches
    }

    /// Number of rows in the sample, never zero.
    pub fn num_rows(&self) -> usize {
        self.num_rows
    }

    pub fn captured_at(&self) -> DateTime<Utc> {
        self.captured_at
    }

    /// Returns whether the sample has a column with this exact name.
    pub fn has_column(&self, name: &str) -> bool {
        self.schema.field_with_name(name).is_ok()
    }

    /// Wraps the batches in a DataFusion table without copying them.
    pub fn to_mem_table(&self) -> Result<Arc<MemTable>> {
        Ok(Arc::new(MemTable::try_new(
            self.schema.clone(),
            vec![self.batches.clone()],
        )?))
    }
}

/// Source of tier samples.
///
/// A search calls `fetch_sample` at most once per tier and run; callers may
/// rely on that to keep expensive scans out of the combination loop.
#[async_trait]
pub trait SampleProvider: Send + Sync {
    /// Fetches up to `row_cap` rows of `table` for the given tier.
    ///
    /// Returns [`EdaError::SampleUnavailable`] when the table cannot be read
    /// or is empty.
    async fn fetch_sample(&self, table: &TableRef, tier: SampleTier, row_cap: usize)
        -> Result<Sample>;
}
