//! Progressive primary-key candidate search.
//!
//! For each combination size `k`, every `k`-combination of the eligible
//! columns is grouped on a small sample. Only the survivors are grouped on a
//! medium sample, and only the survivors of that on a large one. Whatever
//! survives all three tiers is a confirmed candidate key.
//!
//! ```text
//!  k = min..=max
//!    C(M, k) combinations ──► small ──► medium ──► large ──► confirmed
//!                               │         │          │
//!                               └─────────┴──────────┴──► rejected / failed
//! ```
//!
//! A failing combination is recorded and skipped. A sample that cannot be
//! fetched ends the run, and the returned [`SearchOutcome`] keeps everything
//! gathered up to that point.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::future::join_all;
use tracing::{info, instrument, warn};

use crate::config::{SampleFetch, SearchConfig};
use crate::error::{EdaError, Result};
use crate::metadata::{CandidateColumnSource, TableRef};
use crate::sampling::{Sample, SampleProvider, SampleTier};

pub mod combinations;
pub mod report;
pub mod result;
pub mod uniqueness;

pub use combinations::{count_combinations, ColumnSet, CombinationEnumerator, Combinations};
pub use report::{CollectingReporter, NoopReporter, SearchEvent, SearchReporter, TracingReporter};
pub use result::{
    CandidateResult, CombinationFailure, SampleInfo, SearchOutcome, SizeSummary, SkipReason,
    TierCounts, TierObservation, Termination, Verdict,
};
pub use uniqueness::{Uniqueness, UniquenessEvaluator};

/// Cooperative cancellation flag shared between a search and its caller.
///
/// The search checks the flag before every batch of combinations it hands
/// to the evaluator, not inside a batch: after [`cancel`](Self::cancel), up
/// to `concurrency` evaluations already in flight still complete and are
/// counted before the run stops.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation. Idempotent.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Samples of the current run, fetched at most once per tier.
struct SampleCache {
    samples: [Option<Arc<Sample>>; 3],
}

impl SampleCache {
    fn new() -> Self {
        Self {
            samples: [None, None, None],
        }
    }
}

/// Why a tier stopped before evaluating all of its candidates.
enum Interruption {
    Cancelled,
    Aborted { tier: SampleTier, error: EdaError },
}

/// Searches a table for column combinations that uniquely identify its rows.
///
/// # Example
///
/// ```rust,no_run
/// use eda_keys::config::SearchConfig;
/// use eda_keys::metadata::{InMemoryMetadataStore, TableRef};
/// use eda_keys::sampling::InMemorySampleProvider;
/// use eda_keys::search::ProgressiveKeySearch;
///
/// # async fn example() -> eda_keys::error::Result<()> {
/// let columns = InMemoryMetadataStore::new();
/// let samples = InMemorySampleProvider::new();
/// let config = SearchConfig::default().with_max_columns(3);
/// let search = ProgressiveKeySearch::new(config, columns, samples)?;
///
/// let outcome = search.run(&TableRef::new("srv", "sales", "dbo", "orders")).await;
/// for candidate in &outcome.confirmed {
///     println!("{}", candidate.columns);
/// }
/// if let Some(error) = outcome.fatal_error() {
///     eprintln!("search stopped early: {error}");
/// }
/// # Ok(())
/// # }
/// ```
pub struct ProgressiveKeySearch {
    config: SearchConfig,
    columns: Arc<dyn CandidateColumnSource>,
    samples: Arc<dyn SampleProvider>,
    evaluator: UniquenessEvaluator,
    reporter: Arc<dyn SearchReporter>,
    cancellation: CancellationToken,
}

impl ProgressiveKeySearch {
    /// Creates a search reporting through `tracing`.
    ///
    /// Fails with [`EdaError::Configuration`] when `config` does not validate.
    pub fn new(
        config: SearchConfig,
        columns: impl CandidateColumnSource + 'static,
        samples: impl SampleProvider + 'static,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            columns: Arc::new(columns),
            samples: Arc::new(samples),
            evaluator: UniquenessEvaluator::new()?,
            reporter: Arc::new(TracingReporter::default()),
            cancellation: CancellationToken::new(),
        })
    }

    /// Replaces the uniqueness evaluator.
    pub fn with_evaluator(mut self, evaluator: UniquenessEvaluator) -> Self {
        self.evaluator = evaluator;
        self
    }

    /// Replaces the event reporter.
    pub fn with_reporter(mut self, reporter: Arc<dyn SearchReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    /// Uses a caller-owned cancellation token.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    /// Returns a handle that cancels this search.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation.clone()
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    /// Runs the search on `table`.
    ///
    /// Never fails as a whole: a fatal error is kept in the outcome
    /// (see [`SearchOutcome::fatal_error`]) next to the partial results.
    #[instrument(skip(self), fields(table = %table, max_columns = self.config.max_columns))]
    pub async fn run(&self, table: &TableRef) -> SearchOutcome {
        let mut outcome = SearchOutcome::new(table.clone(), &self.config);
        let sizes = self.config.min_columns..=self.config.max_columns;

        let eligible = match self.eligible_columns(table).await {
            Ok(columns) => columns,
            Err(error) => {
                self.abort(&mut outcome, None, None, error);
                for size in sizes.clone() {
                    outcome.sizes.push(SizeSummary::skipped(size, 0, SkipReason::Aborted));
                }
                return self.finish(outcome);
            }
        };
        let enumerator = CombinationEnumerator::new(eligible);
        outcome.eligible_columns = enumerator.columns().to_vec();

        self.reporter.report(&SearchEvent::RunStarted {
            table: table.clone(),
            eligible_columns: enumerator.columns().len(),
            min_size: self.config.min_columns,
            max_size: self.config.max_columns,
        });

        let mut cache = SampleCache::new();
        if self.config.sample_fetch == SampleFetch::Eager {
            for tier in SampleTier::ALL {
                if let Err(error) = self.sample(&mut cache, &mut outcome, table, tier).await {
                    self.abort(&mut outcome, None, Some(tier), error);
                    for size in sizes.clone() {
                        outcome.sizes.push(SizeSummary::skipped(
                            size,
                            enumerator.count(size),
                            SkipReason::Aborted,
                        ));
                    }
                    return self.finish(outcome);
                }
            }
        }

        let mut stopped: Option<SkipReason> = None;
        for size in sizes {
            let combinations = enumerator.count(size);
            if let Some(reason) = stopped {
                outcome.sizes.push(SizeSummary::skipped(size, combinations, reason));
                continue;
            }

            let mut summary = SizeSummary::new(size, combinations);
            self.reporter
                .report(&SearchEvent::SizeStarted { size, combinations });

            let interruption = self
                .search_size(&enumerator, &mut summary, &mut cache, &mut outcome, table)
                .await;
            match interruption {
                None => {}
                Some(Interruption::Cancelled) => {
                    summary.skip = Some(SkipReason::Cancelled);
                    outcome.termination = Termination::Cancelled { size };
                    stopped = Some(SkipReason::Cancelled);
                }
                Some(Interruption::Aborted { tier, error }) => {
                    summary.skip = Some(SkipReason::Aborted);
                    self.abort(&mut outcome, Some(size), Some(tier), error);
                    stopped = Some(SkipReason::Aborted);
                }
            }
            if let Some(reason) = summary.skip {
                self.reporter
                    .report(&SearchEvent::SizeSkipped { size, reason });
            }
            outcome.sizes.push(summary);
        }

        self.finish(outcome)
    }

    async fn eligible_columns(&self, table: &TableRef) -> Result<Vec<String>> {
        let columns = self.columns.eligible_columns(table).await?;
        self.config.filter_excluded(columns)
    }

    /// Runs the three tiers for one combination size.
    async fn search_size(
        &self,
        enumerator: &CombinationEnumerator,
        summary: &mut SizeSummary,
        cache: &mut SampleCache,
        outcome: &mut SearchOutcome,
        table: &TableRef,
    ) -> Option<Interruption> {
        let size = summary.size;
        if summary.combinations == 0 {
            summary.skip = Some(SkipReason::EmptySearchSpace);
            return None;
        }
        if self.cancellation.is_cancelled() {
            return Some(Interruption::Cancelled);
        }

        let mut candidates: Box<dyn Iterator<Item = CandidateResult> + Send + '_> =
            Box::new(enumerator.combinations(size).map(CandidateResult::new));

        for tier in SampleTier::ALL {
            let sample = match self.sample(cache, outcome, table, tier).await {
                Ok(sample) => sample,
                Err(error) => {
                    // Survivors of the previous tier never got this far
                    if tier != SampleTier::Small {
                        outcome.pending.extend(candidates);
                    }
                    return Some(Interruption::Aborted { tier, error });
                }
            };

            let mut survivors = Vec::new();
            let cancelled = self
                .evaluate_tier(&sample, &mut candidates, &mut survivors, summary, outcome)
                .await;

            summary.survivors.set(tier, survivors.len() as u64);
            self.reporter.report(&SearchEvent::TierCompleted {
                size,
                tier,
                tested: summary.tested.get(tier),
                survivors: survivors.len() as u64,
                rows: sample.num_rows(),
            });

            if cancelled {
                outcome.pending.extend(survivors);
                if tier != SampleTier::Small {
                    outcome.pending.extend(candidates);
                }
                return Some(Interruption::Cancelled);
            }
            if survivors.is_empty() {
                summary.skip = Some(SkipReason::NoSurvivors { tier });
                return None;
            }
            candidates = Box::new(survivors.into_iter());
        }

        for candidate in candidates {
            summary.confirmed += 1;
            self.reporter.report(&SearchEvent::CandidateConfirmed {
                candidate: candidate.clone(),
            });
            outcome.confirmed.push(candidate);
        }
        None
    }

    /// Evaluates candidates on one tier in batches of `concurrency`.
    ///
    /// Returns true when cancellation stopped the tier early; the candidates
    /// not yet evaluated stay in `candidates`.
    async fn evaluate_tier<I>(
        &self,
        sample: &Arc<Sample>,
        candidates: &mut I,
        survivors: &mut Vec<CandidateResult>,
        summary: &mut SizeSummary,
        outcome: &mut SearchOutcome,
    ) -> bool
    where
        I: Iterator<Item = CandidateResult> + Send,
    {
        let tier = sample.tier();
        let size = summary.size;
        loop {
            if self.cancellation.is_cancelled() {
                return true;
            }
            let batch: Vec<CandidateResult> =
                candidates.by_ref().take(self.config.concurrency).collect();
            if batch.is_empty() {
                return false;
            }

            let handles = batch.iter().map(|candidate| {
                let evaluator = self.evaluator.clone();
                let sample = Arc::clone(sample);
                let columns = candidate.columns.clone();
                tokio::spawn(async move { evaluator.evaluate(&sample, &columns).await })
            });
            let results = join_all(handles).await;

            for (mut candidate, joined) in batch.into_iter().zip(results) {
                let evaluated = joined.unwrap_or_else(|e| {
                    Err(EdaError::evaluation(
                        candidate.columns.columns(),
                        format!("evaluation task failed: {e}"),
                    ))
                });
                summary.tested.set(tier, summary.tested.get(tier) + 1);

                match evaluated {
                    Ok(uniqueness) => {
                        let observation = TierObservation::new(tier, uniqueness);
                        let passed = self.config.passes(tier, observation.ratio);
                        self.reporter.report(&SearchEvent::CombinationEvaluated {
                            size,
                            tier,
                            columns: candidate.columns.clone(),
                            distinct_groups: observation.distinct_groups,
                            total_rows: observation.total_rows,
                            ratio: observation.ratio,
                            passed,
                        });
                        candidate.observations.push(observation);
                        if passed {
                            candidate.verdict = match tier.next() {
                                Some(next) => Verdict::Untested { tier: next },
                                None => Verdict::Confirmed,
                            };
                            survivors.push(candidate);
                        } else {
                            candidate.verdict = Verdict::Rejected { tier };
                            self.reporter.report(&SearchEvent::CandidateRejected { candidate });
                        }
                    }
                    Err(error) => {
                        let reason = error.to_string();
                        warn!(columns = %candidate.columns, %tier, "Skipping combination: {reason}");
                        summary.failed += 1;
                        self.reporter.report(&SearchEvent::CombinationFailed {
                            size,
                            tier,
                            columns: candidate.columns.clone(),
                            reason: reason.clone(),
                        });
                        outcome.failures.push(CombinationFailure {
                            size,
                            tier,
                            columns: candidate.columns,
                            reason,
                        });
                    }
                }
            }
        }
    }

    /// Returns the run's sample of `tier`, fetching it on first use.
    async fn sample(
        &self,
        cache: &mut SampleCache,
        outcome: &mut SearchOutcome,
        table: &TableRef,
        tier: SampleTier,
    ) -> Result<Arc<Sample>> {
        if let Some(sample) = &cache.samples[tier.index()] {
            return Ok(Arc::clone(sample));
        }

        let row_cap = self.config.tiers.row_cap(tier);
        let sample = Arc::new(self.samples.fetch_sample(table, tier, row_cap).await?);
        outcome.samples.push(SampleInfo::from(sample.as_ref()));
        self.reporter.report(&SearchEvent::SampleFetched {
            tier,
            rows: sample.num_rows(),
        });
        cache.samples[tier.index()] = Some(Arc::clone(&sample));
        Ok(sample)
    }

    fn abort(
        &self,
        outcome: &mut SearchOutcome,
        size: Option<usize>,
        tier: Option<SampleTier>,
        error: EdaError,
    ) {
        warn!(?size, ?tier, "Key search stopped: {error}");
        outcome.termination = Termination::Aborted {
            size,
            tier,
            reason: error.to_string(),
        };
        outcome.error = Some(error);
    }

    fn finish(&self, mut outcome: SearchOutcome) -> SearchOutcome {
        outcome.finish();
        if let Some(duration) = outcome.duration() {
            info!(
                confirmed = outcome.confirmed.len(),
                "Key search finished in {:.2}s",
                duration.num_milliseconds() as f64 / 1000.0
            );
        }
        self.reporter.report(&SearchEvent::RunFinished {
            confirmed: outcome.confirmed.len(),
            termination: outcome.termination.clone(),
        });
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{ColumnProfile, InMemoryMetadataStore};
    use crate::sampling::InMemorySampleProvider;
    use arrow::array::{Int64Array, StringArray};
    use arrow::datatypes::{DataType, Field, Schema};
    use arrow::record_batch::RecordBatch;

    fn table() -> TableRef {
        TableRef::new("srv", "crm", "dbo", "people")
    }

    /// `id` unique, `country` two-valued, `city` unique on the first 20 rows only.
    fn rows(n: i64) -> RecordBatch {
        let schema = Arc::new(Schema::new(vec![
            Field::new("id", DataType::Int64, false),
            Field::new("country", DataType::Utf8, false),
            Field::new("city", DataType::Int64, false),
        ]));
        let countries: Vec<&str> = (0..n).map(|i| if i % 2 == 0 { "NL" } else { "BE" }).collect();
        RecordBatch::try_new(
            schema,
            vec![
                Arc::new(Int64Array::from_iter_values(0..n)),
                Arc::new(StringArray::from(countries)),
                Arc::new(Int64Array::from_iter_values((0..n).map(|i| i % 20))),
            ],
        )
        .unwrap()
    }

    async fn fixtures(columns: &[&str]) -> (InMemoryMetadataStore, InMemorySampleProvider) {
        let store = InMemoryMetadataStore::new();
        let profiles = columns
            .iter()
            .enumerate()
            .map(|(i, c)| ColumnProfile::new(table(), *c, i as i64 + 1, "bigint", 100, 0))
            .collect();
        store.replace_profiles(&table(), profiles).await.unwrap();

        let samples = InMemorySampleProvider::new();
        samples.insert(table(), vec![rows(400)]).await;
        (store, samples)
    }

    fn config() -> SearchConfig {
        SearchConfig::default()
            .with_tiers(crate::config::TierSizes::new(20, 100, 400))
            .with_max_columns(2)
            .with_concurrency(2)
    }

    #[tokio::test]
    async fn test_confirms_unique_column() {
        let (store, samples) = fixtures(&["id", "country", "city"]).await;
        let search = ProgressiveKeySearch::new(config(), store, samples.clone()).unwrap();
        let outcome = search.run(&table()).await;

        assert!(outcome.is_complete());
        let single: Vec<String> = outcome
            .confirmed
            .iter()
            .filter(|c| c.size() == 1)
            .map(|c| c.columns.to_string())
            .collect();
        assert_eq!(single, vec!["(id)"]);

        let k1 = outcome.size(1).unwrap();
        assert_eq!(k1.combinations, 3);
        assert_eq!(k1.tested.small, 3);
        // city is unique among the first 20 rows only
        assert_eq!(k1.survivors.small, 2);
        assert_eq!(k1.survivors.medium, 1);
        assert_eq!(k1.confirmed, 1);

        // One fetch per tier for the whole run
        assert_eq!(samples.total_fetches(), 3);
    }

    #[tokio::test]
    async fn test_nothing_survives_small_tier() {
        let (store, samples) = fixtures(&["country"]).await;
        let search = ProgressiveKeySearch::new(config(), store, samples.clone()).unwrap();
        let outcome = search.run(&table()).await;

        assert!(outcome.confirmed.is_empty());
        assert_eq!(
            outcome.size(1).unwrap().skip,
            Some(SkipReason::NoSurvivors {
                tier: SampleTier::Small
            })
        );
        assert_eq!(
            outcome.size(2).unwrap().skip,
            Some(SkipReason::EmptySearchSpace)
        );
        // Medium and large were never needed
        assert_eq!(samples.total_fetches(), 1);
    }

    #[tokio::test]
    async fn test_eager_fetch() {
        let (store, samples) = fixtures(&["country"]).await;
        let search = ProgressiveKeySearch::new(
            config().with_sample_fetch(SampleFetch::Eager),
            store,
            samples.clone(),
        )
        .unwrap();
        let outcome = search.run(&table()).await;
        assert!(outcome.is_complete());
        assert_eq!(samples.total_fetches(), 3);
        assert_eq!(outcome.samples.len(), 3);
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let (store, samples) = fixtures(&["id", "country"]).await;
        let search = ProgressiveKeySearch::new(config(), store, samples).unwrap();
        search.cancellation_token().cancel();
        let outcome = search.run(&table()).await;

        assert_eq!(outcome.termination, Termination::Cancelled { size: 1 });
        assert!(outcome.fatal_error().is_none());
        assert_eq!(outcome.sizes.len(), 2);
        assert!(outcome
            .sizes
            .iter()
            .all(|s| s.skip == Some(SkipReason::Cancelled)));
    }

    #[tokio::test]
    async fn test_invalid_config_is_rejected() {
        let (store, samples) = fixtures(&["id"]).await;
        let result =
            ProgressiveKeySearch::new(config().with_concurrency(0), store, samples);
        assert!(matches!(result, Err(EdaError::Configuration(_))));
    }

    /// Returns its columns verbatim, repeats included.
    struct FixedColumns(Vec<&'static str>);

    #[async_trait::async_trait]
    impl CandidateColumnSource for FixedColumns {
        async fn eligible_columns(&self, _table: &TableRef) -> Result<Vec<String>> {
            Ok(self.0.iter().map(|c| c.to_string()).collect())
        }
    }

    #[tokio::test]
    async fn test_repeated_eligible_columns_searched_once() {
        let (_, samples) = fixtures(&[]).await;
        let columns = FixedColumns(vec!["id", "country", "id", "country"]);
        let search = ProgressiveKeySearch::new(config(), columns, samples).unwrap();
        let outcome = search.run(&table()).await;

        assert_eq!(outcome.eligible_columns, vec!["id", "country"]);
        assert_eq!(outcome.size(1).unwrap().combinations, 2);
        assert_eq!(outcome.size(2).unwrap().combinations, 1);
        let confirmed: Vec<String> = outcome
            .confirmed
            .iter()
            .map(|c| c.columns.to_string())
            .collect();
        assert_eq!(confirmed, vec!["(id)", "(id, country)"]);
        assert_eq!(outcome.confirmed[1].columns.columns(), ["id", "country"]);
    }

    #[tokio::test]
    async fn test_excluded_columns_are_not_searched() {
        let (store, samples) = fixtures(&["id", "country", "city"]).await;
        let search =
            ProgressiveKeySearch::new(config().exclude_column("id"), store, samples).unwrap();
        let outcome = search.run(&table()).await;
        assert_eq!(outcome.eligible_columns, vec!["country", "city"]);
        assert!(outcome
            .confirmed
            .iter()
            .all(|c| !c.columns.contains("id")));
    }
}
