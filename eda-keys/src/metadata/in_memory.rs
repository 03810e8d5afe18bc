//! In-memory metadata store for tests and callers that profile tables themselves.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::instrument;

use crate::error::{EdaError, Result};

use super::{CandidateColumnSource, ColumnProfile, EligibilityRules, TableRef};

/// Column profiles held in memory, keyed by table.
///
/// # Example
///
/// ```rust
/// use eda_keys::metadata::{CandidateColumnSource, ColumnProfile, InMemoryMetadataStore, TableRef};
///
/// # async fn example() -> eda_keys::error::Result<()> {
/// let store = InMemoryMetadataStore::new();
/// let orders = TableRef::new("srv", "sales", "dbo", "orders");
/// store
///     .replace_profiles(
///         &orders,
///         vec![ColumnProfile::new(orders.clone(), "order_id", 1, "int", 1_000, 0)],
///     )
///     .await?;
/// assert_eq!(store.eligible_columns(&orders).await?, vec!["order_id".to_string()]);
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Default)]
pub struct InMemoryMetadataStore {
    profiles: Arc<RwLock<HashMap<TableRef, Vec<ColumnProfile>>>>,
    rules: EligibilityRules,
}

impl InMemoryMetadataStore {
    /// Creates an empty store with default eligibility rules.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the eligibility rules applied when answering queries.
    pub fn with_rules(mut self, rules: EligibilityRules) -> Self {
        self.rules = rules;
        self
    }

    /// Returns the eligibility rules.
    pub fn rules(&self) -> &EligibilityRules {
        &self.rules
    }

    /// Replaces every stored profile of `table`.
    ///
    /// Profiles belonging to a different table are rejected.
    #[instrument(skip(self, profiles), fields(table = %table, columns = profiles.len()))]
    pub async fn replace_profiles(
        &self,
        table: &TableRef,
        profiles: Vec<ColumnProfile>,
    ) -> Result<()> {
        if let Some(foreign) = profiles.iter().find(|p| &p.table != table) {
            return Err(EdaError::metadata_store(format!(
                "profile of column '{}' belongs to '{}', not '{table}'",
                foreign.column_name, foreign.table
            )));
        }
        self.profiles.write().await.insert(table.clone(), profiles);
        Ok(())
    }

    /// Returns the stored profiles of `table`, in insertion order.
    pub async fn profiles(&self, table: &TableRef) -> Vec<ColumnProfile> {
        self.profiles
            .read()
            .await
            .get(table)
            .cloned()
            .unwrap_or_default()
    }

    /// Returns every table with stored profiles.
    pub async fn tables(&self) -> Vec<TableRef> {
        let mut tables: Vec<TableRef> = self.profiles.read().await.keys().cloned().collect();
        tables.sort();
        tables
    }
}

#[async_trait]
impl CandidateColumnSource for InMemoryMetadataStore {
    #[instrument(skip(self), fields(table = %table, store = "in_memory"))]
    async fn eligible_columns(&self, table: &TableRef) -> Result<Vec<String>> {
        let store = self.profiles.read().await;
        Ok(store
            .get(table)
            .map(|profiles| self.rules.eligible_columns(profiles))
            .unwrap_or_default())
    }
}
