//! Metadata store backed by a `uniques` table registered in DataFusion.
//!
//! The table may come from any source DataFusion can read (CSV or Parquet
//! exports of the metadata database, a database table provider, ...). It must
//! expose the columns `server_name`, `table_catalog`, `table_schema`,
//! `table_name`, `column_name`, `ordinal_position`, `data_type`,
//! `distinct_values` and `null_values`; names are matched case-insensitively.

use arrow::array::{Array, AsArray};
use arrow::compute::cast;
use arrow::datatypes::{DataType, Int64Type};
use arrow::record_batch::RecordBatch;
use async_trait::async_trait;
use datafusion::dataframe::DataFrame;
use datafusion::logical_expr::{ident, lit, Expr};
use datafusion::prelude::SessionContext;
use std::collections::BTreeSet;
use tracing::{debug, instrument, warn};

use crate::error::{EdaError, Result};

use super::{CandidateColumnSource, ColumnProfile, EligibilityRules, TableRef};

/// Default name of the registered metadata table.
pub const DEFAULT_UNIQUES_TABLE: &str = "uniques";

const SERVER_NAME: &str = "server_name";
const TABLE_CATALOG: &str = "table_catalog";
const TABLE_SCHEMA: &str = "table_schema";
const TABLE_NAME: &str = "table_name";
const COLUMN_NAME: &str = "column_name";
const ORDINAL_POSITION: &str = "ordinal_position";
const DATA_TYPE: &str = "data_type";
const DISTINCT_VALUES: &str = "distinct_values";
const NULL_VALUES: &str = "null_values";

/// Reads column profiles from a registered `uniques` table.
///
/// Empty components of a [`TableRef`] match any value, so
/// `TableRef::bare("orders")` finds `orders` in whichever schema holds it.
/// A reference matching the table in more than one
/// `server.catalog.schema` is rejected rather than merged.
#[derive(Clone)]
pub struct DataFusionMetadataStore {
    ctx: SessionContext,
    table: String,
    rules: EligibilityRules,
}

impl std::fmt::Debug for DataFusionMetadataStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataFusionMetadataStore")
            .field("table", &self.table)
            .field("rules", &self.rules)
            .finish()
    }
}

impl DataFusionMetadataStore {
    /// Creates a store reading the `uniques` table of `ctx`.
    pub fn new(ctx: SessionContext) -> Self {
        Self {
            ctx,
            table: DEFAULT_UNIQUES_TABLE.to_string(),
            rules: EligibilityRules::default(),
        }
    }

    /// Reads profiles from a differently named table.
    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = table.into();
        self
    }

    /// Sets the eligibility rules.
    pub fn with_rules(mut self, rules: EligibilityRules) -> Self {
        self.rules = rules;
        self
    }

    /// Returns every stored profile of `table`, ordered by ordinal position.
    #[instrument(skip(self), fields(table = %table, store = "datafusion"))]
    pub async fn profiles(&self, table: &TableRef) -> Result<Vec<ColumnProfile>> {
        self.load(table, false).await
    }

    async fn load(&self, table: &TableRef, push_down_rules: bool) -> Result<Vec<ColumnProfile>> {
        let df = self.ctx.table(self.table.as_str()).await.map_err(|e| {
            EdaError::metadata_store_with_source(
                format!("metadata table '{}' is not available", self.table),
                Box::new(e),
            )
        })?;

        let columns = ResolvedColumns::resolve(&df)?;

        let mut predicate: Option<Expr> = None;
        for (column, value) in [
            (&columns.server_name, &table.server_name),
            (&columns.table_catalog, &table.table_catalog),
            (&columns.table_schema, &table.table_schema),
            (&columns.table_name, &table.table_name),
        ] {
            if value.is_empty() {
                continue;
            }
            let condition = ident(column.as_str()).eq(lit(value.as_str()));
            predicate = Some(match predicate {
                Some(p) => p.and(condition),
                None => condition,
            });
        }
        if push_down_rules {
            let max_nulls = i64::try_from(self.rules.max_null_values).unwrap_or(i64::MAX);
            let min_distinct = i64::try_from(self.rules.min_distinct_values).unwrap_or(i64::MAX);
            let condition = ident(columns.null_values.as_str())
                .lt_eq(lit(max_nulls))
                .and(ident(columns.distinct_values.as_str()).gt_eq(lit(min_distinct)));
            predicate = Some(match predicate {
                Some(p) => p.and(condition),
                None => condition,
            });
        }

        let mut df = df;
        if let Some(predicate) = predicate {
            df = df.filter(predicate)?;
        }
        let batches = df
            .select(vec![
                ident(columns.column_name.as_str()).alias(COLUMN_NAME),
                ident(columns.ordinal_position.as_str()).alias(ORDINAL_POSITION),
                ident(columns.data_type.as_str()).alias(DATA_TYPE),
                ident(columns.distinct_values.as_str()).alias(DISTINCT_VALUES),
                ident(columns.null_values.as_str()).alias(NULL_VALUES),
                ident(columns.server_name.as_str()).alias(SERVER_NAME),
                ident(columns.table_catalog.as_str()).alias(TABLE_CATALOG),
                ident(columns.table_schema.as_str()).alias(TABLE_SCHEMA),
            ])?
            .collect()
            .await?;

        let mut profiles = Vec::new();
        let mut owners = BTreeSet::new();
        for batch in &batches {
            read_profiles(batch, table, &mut profiles, &mut owners)?;
        }
        if owners.len() > 1 {
            let owners: Vec<String> = owners.into_iter().collect();
            return Err(EdaError::metadata_store(format!(
                "'{table}' is ambiguous, it matches {} schemas: {}",
                owners.len(),
                owners.join(", ")
            )));
        }
        profiles.sort_by_key(|p| p.ordinal_position);
        debug!(rows = profiles.len(), "Loaded column profiles");
        Ok(profiles)
    }
}

#[async_trait]
impl CandidateColumnSource for DataFusionMetadataStore {
    #[instrument(skip(self), fields(table = %table, store = "datafusion"))]
    async fn eligible_columns(&self, table: &TableRef) -> Result<Vec<String>> {
        let profiles = self.load(table, true).await?;
        Ok(self.rules.eligible_columns(&profiles))
    }
}

/// Actual column names of the metadata table.
struct ResolvedColumns {
    server_name: String,
    table_catalog: String,
    table_schema: String,
    table_name: String,
    column_name: String,
    ordinal_position: String,
    data_type: String,
    distinct_values: String,
    null_values: String,
}

impl ResolvedColumns {
    fn resolve(df: &DataFrame) -> Result<Self> {
        let names: Vec<String> = df
            .schema()
            .fields()
            .iter()
            .map(|f| f.name().clone())
            .collect();
        let find = |wanted: &str| -> Result<String> {
            names
                .iter()
                .find(|n| n.eq_ignore_ascii_case(wanted))
                .cloned()
                .ok_or_else(|| {
                    EdaError::metadata_store(format!("metadata table has no '{wanted}' column"))
                })
        };
        Ok(Self {
            server_name: find(SERVER_NAME)?,
            table_catalog: find(TABLE_CATALOG)?,
            table_schema: find(TABLE_SCHEMA)?,
            table_name: find(TABLE_NAME)?,
            column_name: find(COLUMN_NAME)?,
            ordinal_position: find(ORDINAL_POSITION)?,
            data_type: find(DATA_TYPE)?,
            distinct_values: find(DISTINCT_VALUES)?,
            null_values: find(NULL_VALUES)?,
        })
    }
}

/// Reads the projected rows into profiles and collects the
/// `server.catalog.schema` each row belongs to.
fn read_profiles(
    batch: &RecordBatch,
    table: &TableRef,
    out: &mut Vec<ColumnProfile>,
    owners: &mut BTreeSet<String>,
) -> Result<()> {
    let names = cast(batch.column(0), &DataType::Utf8)?;
    let names = names.as_string::<i32>();
    let positions = cast(batch.column(1), &DataType::Int64)?;
    let positions = positions.as_primitive::<Int64Type>();
    let types = cast(batch.column(2), &DataType::Utf8)?;
    let types = types.as_string::<i32>();
    let distinct = cast(batch.column(3), &DataType::Int64)?;
    let distinct = distinct.as_primitive::<Int64Type>();
    let nulls = cast(batch.column(4), &DataType::Int64)?;
    let nulls = nulls.as_primitive::<Int64Type>();
    let scopes = (5..8)
        .map(|c| cast(batch.column(c), &DataType::Utf8))
        .collect::<std::result::Result<Vec<_>, _>>()?;

    for row in 0..batch.num_rows() {
        let owner: Vec<&str> = scopes
            .iter()
            .map(|array| {
                let array = array.as_string::<i32>();
                if array.is_null(row) {
                    ""
                } else {
                    array.value(row)
                }
            })
            .collect();
        owners.insert(owner.join("."));

        if names.is_null(row) || distinct.is_null(row) || nulls.is_null(row) {
            warn!(row, "Skipping metadata row with missing column name or counts");
            continue;
        }
        out.push(ColumnProfile {
            table: table.clone(),
            column_name: names.value(row).to_string(),
            ordinal_position: if positions.is_null(row) {
                i64::MAX
            } else {
                positions.value(row)
            },
            data_type: if types.is_null(row) {
                String::new()
            } else {
                types.value(row).to_string()
            },
            distinct_values: distinct.value(row).max(0) as u64,
            null_values: nulls.value(row).max(0) as u64,
        });
    }
    Ok(())
}
