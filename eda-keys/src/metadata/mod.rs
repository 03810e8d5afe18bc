//! Column metadata consumed by the key search.
//!
//! Per-column statistics (distinct and null counts, data type) are collected
//! ahead of time into a metadata store. The search only reads them, through
//! the [`CandidateColumnSource`] trait, to decide which columns may take part
//! in a candidate key.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

use crate::error::Result;

mod datafusion_store;
mod in_memory;

pub use datafusion_store::DataFusionMetadataStore;
pub use in_memory::InMemoryMetadataStore;

/// Identifies a table in a source server.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TableRef {
    pub server_name: String,
    pub table_catalog: String,
    pub table_schema: String,
    pub table_name: String,
}

impl TableRef {
    /// Creates a fully qualified table reference.
    pub fn new(
        server_name: impl Into<String>,
        table_catalog: impl Into<String>,
        table_schema: impl Into<String>,
        table_name: impl Into<String>,
    ) -> Self {
        Self {
            server_name: server_name.into(),
            table_catalog: table_catalog.into(),
            table_schema: table_schema.into(),
            table_name: table_name.into(),
        }
    }

    /// Creates a reference with only a table name, for local sources.
    pub fn bare(table_name: impl Into<String>) -> Self {
        Self::new("", "", "", table_name)
    }

    /// Returns `schema.table`, or just the table name when no schema is set.
    pub fn qualified_name(&self) -> String {
        if self.table_schema.is_empty() {
            self.table_name.clone()
        } else {
            format!("{}.{}", self.table_schema, self.table_name)
        }
    }
}

impl fmt::Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts = [
            &self.server_name,
            &self.table_catalog,
            &self.table_schema,
            &self.table_name,
        ];
        let joined = parts
            .iter()
            .filter(|p| !p.is_empty())
            .map(|p| p.as_str())
            .collect::<Vec<_>>()
            .join(".");
        write!(f, "{joined}")
    }
}

/// Stored statistics of one column, one row of the `uniques` metadata table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnProfile {
    pub table: TableRef,
    pub column_name: String,
    pub ordinal_position: i64,
    pub data_type: String,
    pub distinct_values: u64,
    pub null_values: u64,
}

impl ColumnProfile {
    /// Creates a profile for a column of `table`.
    pub fn new(
        table: TableRef,
        column_name: impl Into<String>,
        ordinal_position: i64,
        data_type: impl Into<String>,
        distinct_values: u64,
        null_values: u64,
    ) -> Self {
        Self {
            table,
            column_name: column_name.into(),
            ordinal_position,
            data_type: data_type.into(),
            distinct_values,
            null_values,
        }
    }
}

/// Rules deciding whether a profiled column can be part of a key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EligibilityRules {
    /// Data types never used in keys, compared case-insensitively
    pub excluded_types: Vec<String>,
    /// Largest number of NULLs an eligible column may hold
    pub max_null_values: u64,
    /// Smallest number of distinct values an eligible column must hold
    pub min_distinct_values: u64,
}

impl Default for EligibilityRules {
    fn default() -> Self {
        Self {
            // Monetary values group unreliably once formatted
            excluded_types: vec!["money".to_string()],
            max_null_values: 0,
            min_distinct_values: 2,
        }
    }
}

impl EligibilityRules {
    /// Adds a data type to the exclusion list.
    pub fn exclude_type(mut self, data_type: impl Into<String>) -> Self {
        self.excluded_types.push(data_type.into());
        self
    }

    /// Returns whether the profiled column is eligible for key search.
    pub fn is_eligible(&self, profile: &ColumnProfile) -> bool {
        profile.null_values <= self.max_null_values
            && profile.distinct_values >= self.min_distinct_values
            && !self.is_excluded_type(&profile.data_type)
    }

    /// Returns whether the data type is excluded.
    pub fn is_excluded_type(&self, data_type: &str) -> bool {
        let data_type = data_type.trim();
        self.excluded_types
            .iter()
            .any(|t| t.eq_ignore_ascii_case(data_type))
    }

    /// Filters profiles down to eligible column names ordered by ordinal position.
    ///
    /// A column profiled more than once is listed at its first position only.
    pub fn eligible_columns<'a, I>(&self, profiles: I) -> Vec<String>
    where
        I: IntoIterator<Item = &'a ColumnProfile>,
    {
        let mut eligible: Vec<&ColumnProfile> = profiles
            .into_iter()
            .filter(|p| self.is_eligible(p))
            .collect();
        eligible.sort_by_key(|p| p.ordinal_position);
        let mut seen = HashSet::new();
        eligible
            .into_iter()
            .filter(|p| seen.insert(p.column_name.as_str()))
            .map(|p| p.column_name.clone())
            .collect()
    }
}

/// Source of the columns a key search may combine.
///
/// Implementations return the eligible columns of a table, already filtered
/// by null count, distinct count and data type, ordered by ordinal position.
/// An unknown table yields an empty list.
#[async_trait]
pub trait CandidateColumnSource: Send + Sync {
    /// Returns the eligible column names of `table`.
    async fn eligible_columns(&self, table: &TableRef) -> Result<Vec<String>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(name: &str, pos: i64, data_type: &str, distinct: u64, nulls: u64) -> ColumnProfile {
        ColumnProfile::new(TableRef::bare("t"), name, pos, data_type, distinct, nulls)
    }

    #[test]
    fn test_table_ref_display() {
        let table = TableRef::new("srv", "sales", "dbo", "orders");
        assert_eq!(table.to_string(), "srv.sales.dbo.orders");
        assert_eq!(table.qualified_name(), "dbo.orders");
        assert_eq!(TableRef::bare("orders").to_string(), "orders");
        assert_eq!(TableRef::bare("orders").qualified_name(), "orders");
    }

    #[test]
    fn test_eligibility_rules() {
        let rules = EligibilityRules::default();
        assert!(rules.is_eligible(&profile("id", 1, "int", 10, 0)));
        assert!(!rules.is_eligible(&profile("note", 2, "varchar", 10, 3)));
        assert!(!rules.is_eligible(&profile("flag", 3, "bit", 1, 0)));
        assert!(!rules.is_eligible(&profile("price", 4, "MONEY", 10, 0)));
    }

    #[test]
    fn test_eligible_columns_ordered_by_position() {
        let rules = EligibilityRules::default().exclude_type("uniqueidentifier");
        let profiles = vec![
            profile("email", 2, "nvarchar", 10, 0),
            profile("id", 1, "int", 10, 0),
            profile("rowguid", 3, "uniqueidentifier", 10, 0),
            profile("country", 4, "char", 2, 0),
        ];
        assert_eq!(
            rules.eligible_columns(&profiles),
            vec!["id".to_string(), "email".to_string(), "country".to_string()]
        );
    }

    #[test]
    fn test_repeated_profiles_listed_once() {
        let rules = EligibilityRules::default();
        let profiles = vec![
            profile("id", 1, "int", 10, 0),
            profile("status", 2, "char", 3, 0),
            profile("id", 1, "int", 10, 0),
            profile("status", 2, "char", 3, 0),
        ];
        assert_eq!(rules.eligible_columns(&profiles), vec!["id", "status"]);
    }
}
