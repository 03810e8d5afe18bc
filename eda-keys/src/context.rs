//! DataFusion context management.
//!
//! [`HarvestContext`] wraps a [`SessionContext`] configured for sampling and
//! grouping workloads, and tracks the source and metadata tables registered
//! on it.

use arrow::record_batch::RecordBatch;
use datafusion::datasource::{MemTable, TableProvider};
use datafusion::execution::context::{SessionConfig, SessionContext};
use datafusion::execution::memory_pool::{FairSpillPool, MemoryPool};
use datafusion::execution::runtime_env::RuntimeEnvBuilder;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::instrument;

use crate::config::HarvestContextConfig;
use crate::error::{EdaError, Result};

/// A managed DataFusion context holding source and metadata tables.
///
/// # Examples
///
/// ```rust,no_run
/// use eda_keys::context::HarvestContext;
///
/// # async fn example() -> eda_keys::error::Result<()> {
/// let mut ctx = HarvestContext::new()?;
/// ctx.register_csv("orders", "data/orders.csv").await?;
/// ctx.register_csv("uniques", "metadata/uniques.csv").await?;
/// # Ok(())
/// # }
/// ```
pub struct HarvestContext {
    inner: SessionContext,
    tables: HashMap<String, Arc<dyn TableProvider>>,
    config: HarvestContextConfig,
}

impl HarvestContext {
    /// Creates a new context with default configuration.
    pub fn new() -> Result<Self> {
        Self::with_config(HarvestContextConfig::default())
    }

    /// Creates a new context with custom configuration.
    #[instrument(skip(config))]
    pub fn with_config(config: HarvestContextConfig) -> Result<Self> {
        let inner = Self::build_session(&config)?;
        Ok(Self {
            inner,
            tables: HashMap::new(),
            config,
        })
    }

    /// Builds a bare session with the memory pool and batch settings of `config`.
    ///
    /// Fails with [`EdaError::Configuration`] when `config` does not validate.
    pub fn build_session(config: &HarvestContextConfig) -> Result<SessionContext> {
        config.validate()?;
        let session_config = SessionConfig::new()
            .with_batch_size(config.batch_size)
            .with_target_partitions(config.target_partitions)
            .with_information_schema(true);

        let memory_pool =
            Arc::new(FairSpillPool::new(config.memory_pool_size())) as Arc<dyn MemoryPool>;

        let runtime_env = RuntimeEnvBuilder::new()
            .with_memory_pool(memory_pool)
            .with_temp_file_path(std::env::temp_dir())
            .build()
            .map(Arc::new)?;

        Ok(SessionContext::new_with_config_rt(
            session_config,
            runtime_env,
        ))
    }

    /// Returns the underlying session.
    pub fn inner(&self) -> &SessionContext {
        &self.inner
    }

    /// Returns the configuration used to create this context.
    pub fn config(&self) -> &HarvestContextConfig {
        &self.config
    }

    /// Returns the names of all registered tables.
    pub fn registered_tables(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tables.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    /// Checks if a table is registered.
    pub fn has_table(&self, name: &str) -> bool {
        self.tables.contains_key(name)
    }

    /// Registers a CSV file (with header row) as a table.
    #[instrument(skip(self))]
    pub async fn register_csv(&mut self, name: &str, path: &str) -> Result<()> {
        self.inner
            .register_csv(name, path, Default::default())
            .await?;
        self.track(name).await
    }

    /// Registers a Parquet file as a table.
    #[instrument(skip(self))]
    pub async fn register_parquet(&mut self, name: &str, path: &str) -> Result<()> {
        self.inner
            .register_parquet(name, path, Default::default())
            .await?;
        self.track(name).await
    }

    /// Registers in-memory record batches as a table.
    #[instrument(skip(self, batches), fields(batches = batches.len()))]
    pub async fn register_batches(&mut self, name: &str, batches: Vec<RecordBatch>) -> Result<()> {
        let schema = batches
            .first()
            .map(|b| b.schema())
            .ok_or_else(|| {
                EdaError::Configuration(format!("no batches given for table '{name}'"))
            })?;
        let table = MemTable::try_new(schema, vec![batches])?;
        self.register_table_provider(name, Arc::new(table)).await
    }

    /// Registers any table provider and tracks it.
    #[instrument(skip(self, provider))]
    pub async fn register_table_provider(
        &mut self,
        name: &str,
        provider: Arc<dyn TableProvider>,
    ) -> Result<()> {
        self.inner.register_table(name, provider.clone())?;
        self.tables.insert(name.to_string(), provider);
        Ok(())
    }

    /// Deregisters a table.
    pub fn deregister_table(&mut self, name: &str) -> Result<()> {
        self.inner.deregister_table(name)?;
        self.tables.remove(name);
        Ok(())
    }

    /// Clears all registered tables.
    pub fn clear_tables(&mut self) -> Result<()> {
        let table_names: Vec<_> = self.tables.keys().cloned().collect();
        for name in table_names {
            self.deregister_table(&name)?;
        }
        Ok(())
    }

    async fn track(&mut self, name: &str) -> Result<()> {
        let provider = self.inner.table_provider(name).await?;
        self.tables.insert(name.to_string(), provider);
        Ok(())
    }
}

impl Drop for HarvestContext {
    fn drop(&mut self) {
        if let Err(e) = self.clear_tables() {
            tracing::warn!("Failed to clear tables during HarvestContext drop: {}", e);
        }
    }
}
