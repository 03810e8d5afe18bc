//! Uniqueness of a column combination over a sample.

use datafusion::logical_expr::{ident, Expr};
use datafusion::prelude::SessionContext;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::config::HarvestContextConfig;
use crate::context::HarvestContext;
use crate::error::{EdaError, Result};
use crate::sampling::Sample;

use super::combinations::ColumnSet;

/// Result of grouping a sample by a column combination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Uniqueness {
    /// Number of distinct value tuples
    pub distinct_groups: u64,
    /// Number of rows in the sample
    pub total_rows: u64,
}

impl Uniqueness {
    /// `distinct_groups / total_rows`, in `(0, 1]` for any non-empty sample.
    pub fn ratio(&self) -> f64 {
        if self.total_rows == 0 {
            return 0.0;
        }
        self.distinct_groups as f64 / self.total_rows as f64
    }

    /// Returns whether every row forms its own group.
    pub fn is_unique(&self) -> bool {
        self.distinct_groups == self.total_rows
    }
}

/// Counts the distinct groups a column combination forms in a sample.
///
/// Grouping follows `GROUP BY` semantics: NULLs in a column fall into one
/// group rather than each row being distinct. Evaluation only reads the
/// sample, so one evaluator can be shared by concurrent evaluations.
///
/// # Example
///
/// ```rust,no_run
/// use eda_keys::search::{ColumnSet, UniquenessEvaluator};
/// # use eda_keys::sampling::Sample;
///
/// # async fn example(sample: &Sample) -> eda_keys::error::Result<()> {
/// let evaluator = UniquenessEvaluator::new()?;
/// let uniqueness = evaluator.evaluate(sample, &ColumnSet::new(["email", "country"])).await?;
/// println!("{} groups in {} rows", uniqueness.distinct_groups, uniqueness.total_rows);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct UniquenessEvaluator {
    ctx: SessionContext,
}

impl std::fmt::Debug for UniquenessEvaluator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UniquenessEvaluator").finish_non_exhaustive()
    }
}

impl UniquenessEvaluator {
    /// Creates an evaluator with the default session settings.
    pub fn new() -> Result<Self> {
        Self::with_config(&HarvestContextConfig::default())
    }

    /// Creates an evaluator whose grouping runs with the given session settings.
    pub fn with_config(config: &HarvestContextConfig) -> Result<Self> {
        Ok(Self {
            ctx: HarvestContext::build_session(config)?,
        })
    }

    /// Groups `sample` by `columns` and counts the groups.
    ///
    /// Fails with [`EdaError::Evaluation`] when the set is empty, names a
    /// column the sample lacks, or cannot be grouped.
    #[instrument(skip(self, sample), fields(columns = %columns, tier = %sample.tier()))]
    pub async fn evaluate(&self, sample: &Sample, columns: &ColumnSet) -> Result<Uniqueness> {
        if columns.is_empty() {
            return Err(EdaError::evaluation(columns.columns(), "no columns to group by"));
        }
        if let Some(missing) = columns.columns().iter().find(|c| !sample.has_column(c)) {
            return Err(EdaError::evaluation(
                columns.columns(),
                format!("column '{missing}' is not in the {} sample", sample.tier()),
            ));
        }

        let group_by: Vec<Expr> = columns.columns().iter().map(|c| ident(c.as_str())).collect();
        let distinct_groups = self
            .count_groups(sample, group_by)
            .await
            .map_err(|e| EdaError::evaluation(columns.columns(), e.to_string()))?;

        Ok(Uniqueness {
            distinct_groups: distinct_groups as u64,
            total_rows: sample.num_rows() as u64,
        })
    }

    async fn count_groups(&self, sample: &Sample, group_by: Vec<Expr>) -> Result<usize> {
        let groups = self
            .ctx
            .read_table(sample.to_mem_table()?)?
            .aggregate(group_by, vec![])?
            .count()
            .await?;
        Ok(groups)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::TableRef;
    use crate::sampling::SampleTier;
    use arrow::array::{Int64Array, StringArray};
    use arrow::datatypes::{DataType, Field, Schema};
    use arrow::record_batch::RecordBatch;
    use std::sync::Arc;

    /// Ten rows: unique `id`, unique `email`, two-valued `country`.
    fn people() -> Sample {
        let schema = Arc::new(Schema::new(vec![
            Field::new("id", DataType::Int64, false),
            Field::new("email", DataType::Utf8, false),
            Field::new("country", DataType::Utf8, false),
        ]));
        let emails: Vec<String> = (0..10).map(|i| format!("user{i}@example.com")).collect();
        let countries: Vec<&str> = (0..10).map(|i| if i % 2 == 0 { "NL" } else { "BE" }).collect();
        let batch = RecordBatch::try_new(
            schema.clone(),
            vec![
                Arc::new(Int64Array::from_iter_values(0..10)),
                Arc::new(StringArray::from(emails)),
                Arc::new(StringArray::from(countries)),
            ],
        )
        .unwrap();
        Sample::try_new(
            SampleTier::Small,
            TableRef::bare("people"),
            schema,
            vec![batch],
            10,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_unique_column() {
        let evaluator = UniquenessEvaluator::new().unwrap();
        let uniqueness = evaluator
            .evaluate(&people(), &ColumnSet::new(["id"]))
            .await
            .unwrap();
        assert_eq!(uniqueness.distinct_groups, 10);
        assert_eq!(uniqueness.total_rows, 10);
        assert_eq!(uniqueness.ratio(), 1.0);
        assert!(uniqueness.is_unique());
    }

    #[tokio::test]
    async fn test_low_cardinality_column() {
        let evaluator = UniquenessEvaluator::new().unwrap();
        let uniqueness = evaluator
            .evaluate(&people(), &ColumnSet::new(["country"]))
            .await
            .unwrap();
        assert_eq!(uniqueness.distinct_groups, 2);
        assert!((uniqueness.ratio() - 0.2).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_multi_column_grouping() {
        let evaluator = UniquenessEvaluator::new().unwrap();
        let uniqueness = evaluator
            .evaluate(&people(), &ColumnSet::new(["email", "country"]))
            .await
            .unwrap();
        assert_eq!(uniqueness.ratio(), 1.0);
    }

    #[tokio::test]
    async fn test_nulls_group_together() {
        let schema = Arc::new(Schema::new(vec![
            Field::new("a", DataType::Int64, true),
            Field::new("b", DataType::Utf8, true),
        ]));
        let batch = RecordBatch::try_new(
            schema.clone(),
            vec![
                Arc::new(Int64Array::from(vec![Some(1), None, None, Some(1), None])),
                Arc::new(StringArray::from(vec![
                    Some("x"),
                    None,
                    None,
                    Some("y"),
                    Some("x"),
                ])),
            ],
        )
        .unwrap();
        let sample =
            Sample::try_new(SampleTier::Small, TableRef::bare("t"), schema, vec![batch], 5)
                .unwrap();
        let evaluator = UniquenessEvaluator::new().unwrap();

        // a: {1, NULL}
        let a = evaluator
            .evaluate(&sample, &ColumnSet::new(["a"]))
            .await
            .unwrap();
        assert_eq!(a.distinct_groups, 2);

        // (a, b): (1,x) (NULL,NULL) (1,y) (NULL,x)
        let ab = evaluator
            .evaluate(&sample, &ColumnSet::new(["a", "b"]))
            .await
            .unwrap();
        assert_eq!(ab.distinct_groups, 4);
        assert!(ab.ratio() > 0.0 && ab.ratio() <= 1.0);
    }

    #[tokio::test]
    async fn test_idempotent() {
        let evaluator = UniquenessEvaluator::new().unwrap();
        let sample = people();
        let set = ColumnSet::new(["country", "id"]);
        let first = evaluator.evaluate(&sample, &set).await.unwrap();
        let second = evaluator.evaluate(&sample, &set).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_missing_column_is_local_failure() {
        let evaluator = UniquenessEvaluator::new().unwrap();
        let err = evaluator
            .evaluate(&people(), &ColumnSet::new(["id", "phone"]))
            .await
            .unwrap_err();
        assert!(matches!(err, EdaError::Evaluation { .. }));
        assert!(!err.is_fatal());
        assert!(err.to_string().contains("phone"));
    }

    #[tokio::test]
    async fn test_empty_column_set() {
        let evaluator = UniquenessEvaluator::new().unwrap();
        let err = evaluator
            .evaluate(&people(), &ColumnSet::new(Vec::<String>::new()))
            .await
            .unwrap_err();
        assert!(matches!(err, EdaError::Evaluation { .. }));
    }

    #[test]
    fn test_ratio_of_empty_measurement() {
        let empty = Uniqueness {
            distinct_groups: 0,
            total_rows: 0,
        };
        assert_eq!(empty.ratio(), 0.0);
    }
}
