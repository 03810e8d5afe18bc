//! Sample provider reading tables registered in a DataFusion session.

use arrow::datatypes::SchemaRef;
use arrow::record_batch::RecordBatch;
use async_trait::async_trait;
use datafusion::logical_expr::ident;
use datafusion::prelude::SessionContext;
use futures::StreamExt;
use std::collections::HashMap;
use tracing::instrument;

use crate::error::{EdaError, Result};
use crate::log_sample_op;
use crate::logging::LogConfig;
use crate::metadata::TableRef;

use super::reservoir::BatchReservoir;
use super::{Sample, SampleProvider, SampleTier, SamplingStrategy};

/// Draws samples from tables registered on a [`SessionContext`].
///
/// A [`TableRef`] resolves to the registered table named by an explicit alias
/// or, without one, to its `table_name`.
///
/// # Example
///
/// ```rust,no_run
/// use eda_keys::context::HarvestContext;
/// use eda_keys::metadata::TableRef;
/// use eda_keys::sampling::{DataFusionSampleProvider, SamplingStrategy};
///
/// # async fn example() -> eda_keys::error::Result<()> {
/// let mut ctx = HarvestContext::new()?;
/// ctx.register_parquet("orders_2024", "exports/orders.parquet").await?;
///
/// let orders = TableRef::new("srv", "sales", "dbo", "orders");
/// let provider = DataFusionSampleProvider::new(ctx.inner().clone())
///     .with_alias(orders, "orders_2024")
///     .with_strategy(SamplingStrategy::Reservoir { seed: 42 });
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct DataFusionSampleProvider {
    ctx: SessionContext,
    aliases: HashMap<TableRef, String>,
    strategy: SamplingStrategy,
    log_config: LogConfig,
}

impl std::fmt::Debug for DataFusionSampleProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataFusionSampleProvider")
            .field("aliases", &self.aliases)
            .field("strategy", &self.strategy)
            .finish()
    }
}

impl DataFusionSampleProvider {
    /// Creates a provider using head sampling.
    pub fn new(ctx: SessionContext) -> Self {
        Self {
            ctx,
            aliases: HashMap::new(),
            strategy: SamplingStrategy::default(),
            log_config: LogConfig::default(),
        }
    }

    /// Maps a table reference to a registered table name.
    pub fn with_alias(mut self, table: TableRef, registered_name: impl Into<String>) -> Self {
        self.aliases.insert(table, registered_name.into());
        self
    }

    /// Sets how rows are chosen.
    pub fn with_strategy(mut self, strategy: SamplingStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_log_config(mut self, log_config: LogConfig) -> Self {
        self.log_config = log_config;
        self
    }

    /// Returns the registered table name a reference resolves to.
    pub fn registered_name<'a>(&'a self, table: &'a TableRef) -> &'a str {
        self.aliases
            .get(table)
            .map(|s| s.as_str())
            .unwrap_or(table.table_name.as_str())
    }

    async fn collect_head(
        &self,
        name: &str,
        order_by: &[String],
        row_cap: usize,
    ) -> datafusion::error::Result<(SchemaRef, Vec<RecordBatch>)> {
        let mut df = self.ctx.table(name).await?;
        if !order_by.is_empty() {
            df = df.sort(
                order_by
                    .iter()
                    .map(|c| ident(c.as_str()).sort(true, true))
                    .collect(),
            )?;
        }
        let df = df.limit(0, Some(row_cap))?;
        let schema = df.schema().inner().clone();
        Ok((schema, df.collect().await?))
    }

    async fn collect_reservoir(
        &self,
        name: &str,
        seed: u64,
        row_cap: usize,
    ) -> Result<(SchemaRef, Vec<RecordBatch>)> {
        let df = self.ctx.table(name).await?;
        let schema = df.schema().inner().clone();
        let mut reservoir = BatchReservoir::new(row_cap, seed);
        // Partitions are drained in order so the sample only depends on the seed
        for mut stream in df.execute_stream_partitioned().await? {
            while let Some(batch) = stream.next().await {
                reservoir.offer(batch?)?;
            }
        }
        log_sample_op!(
            self.log_config,
            table = name,
            rows_scanned = reservoir.seen(),
            "Reservoir scan finished"
        );
        Ok((schema, reservoir.finish()?))
    }
}

#[async_trait]
impl SampleProvider for DataFusionSampleProvider {
    #[instrument(skip(self), fields(table = %table, %tier, row_cap))]
    async fn fetch_sample(
        &self,
        table: &TableRef,
        tier: SampleTier,
        row_cap: usize,
    ) -> Result<Sample> {
        let name = self.registered_name(table).to_string();
        let unavailable = |e: EdaError| {
            EdaError::sample_unavailable_with_source(
                tier,
                table.to_string(),
                format!("could not read registered table '{name}'"),
                Box::new(e),
            )
        };

        let (schema, batches) = match &self.strategy {
            SamplingStrategy::Head { order_by } => self
                .collect_head(&name, order_by, row_cap)
                .await
                .map_err(|e| unavailable(e.into()))?,
            SamplingStrategy::Reservoir { seed } => self
                .collect_reservoir(&name, *seed, row_cap)
                .await
                .map_err(unavailable)?,
        };

        let sample = Sample::try_new(tier, table.clone(), schema, batches, row_cap)?;
        log_sample_op!(
            self.log_config,
            table = %table,
            tier = %tier,
            rows = sample.num_rows(),
            "Fetched sample"
        );
        Ok(sample)
    }
}
