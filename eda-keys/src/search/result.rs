//! Results of a key search run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::{SearchConfig, ThresholdPolicy};
use crate::error::EdaError;
use crate::metadata::TableRef;
use crate::sampling::{Sample, SampleTier};

use super::combinations::ColumnSet;
use super::uniqueness::Uniqueness;

/// Uniqueness of a combination measured on one tier.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TierObservation {
    pub tier: SampleTier,
    pub distinct_groups: u64,
    pub total_rows: u64,
    pub ratio: f64,
}

impl TierObservation {
    pub fn new(tier: SampleTier, uniqueness: Uniqueness) -> Self {
        Self {
            tier,
            distinct_groups: uniqueness.distinct_groups,
            total_rows: uniqueness.total_rows,
            ratio: uniqueness.ratio(),
        }
    }
}

/// Where a combination ended up in the tier funnel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "verdict")]
pub enum Verdict {
    /// Passed the threshold on all three tiers.
    Confirmed,
    /// Fell below the threshold on this tier.
    Rejected { tier: SampleTier },
    /// Passed every tier before this one, which was never evaluated because
    /// the run stopped early.
    Untested { tier: SampleTier },
}

/// A column combination and what each tier observed of it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateResult {
    pub columns: ColumnSet,
    /// One entry per tier the combination was evaluated on, in tier order
    pub observations: Vec<TierObservation>,
    pub verdict: Verdict,
}

impl CandidateResult {
    /// A combination that has not been evaluated yet.
    pub fn new(columns: ColumnSet) -> Self {
        Self {
            columns,
            observations: Vec::new(),
            verdict: Verdict::Untested {
                tier: SampleTier::Small,
            },
        }
    }

    /// Combination size.
    pub fn size(&self) -> usize {
        self.columns.len()
    }

    /// Ratio observed on a tier, if the combination got that far.
    pub fn ratio_at(&self, tier: SampleTier) -> Option<f64> {
        self.observations
            .iter()
            .find(|o| o.tier == tier)
            .map(|o| o.ratio)
    }

    /// The observation of the largest tier evaluated.
    pub fn last_observation(&self) -> Option<&TierObservation> {
        self.observations.last()
    }

    pub fn is_confirmed(&self) -> bool {
        self.verdict == Verdict::Confirmed
    }
}

/// A combination that could not be evaluated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CombinationFailure {
    pub size: usize,
    pub tier: SampleTier,
    pub columns: ColumnSet,
    pub reason: String,
}

/// Combination counts per tier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierCounts {
    pub small: u64,
    pub medium: u64,
    pub large: u64,
}

impl TierCounts {
    pub fn get(&self, tier: SampleTier) -> u64 {
        match tier {
            SampleTier::Small => self.small,
            SampleTier::Medium => self.medium,
            SampleTier::Large => self.large,
        }
    }

    pub fn set(&mut self, tier: SampleTier, value: u64) {
        match tier {
            SampleTier::Small => self.small = value,
            SampleTier::Medium => self.medium = value,
            SampleTier::Large => self.large = value,
        }
    }
}

/// Why the tiers of a combination size were not all run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "reason")]
pub enum SkipReason {
    /// Fewer eligible columns than the combination size.
    EmptySearchSpace,
    /// Nothing survived this tier, so later tiers were not run.
    NoSurvivors { tier: SampleTier },
    /// The run was cancelled before or during this size.
    Cancelled,
    /// A fatal error stopped the run before or during this size.
    Aborted,
}

/// Counts for one combination size.
///
/// `tested` counts every combination handed to the evaluator on a tier,
/// including the ones that failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SizeSummary {
    pub size: usize,
    /// `C(M, size)` for `M` eligible columns
    pub combinations: u64,
    pub tested: TierCounts,
    pub survivors: TierCounts,
    pub failed: u64,
    pub confirmed: u64,
    pub skip: Option<SkipReason>,
}

impl SizeSummary {
    pub fn new(size: usize, combinations: u64) -> Self {
        Self {
            size,
            combinations,
            tested: TierCounts::default(),
            survivors: TierCounts::default(),
            failed: 0,
            confirmed: 0,
            skip: None,
        }
    }

    pub(crate) fn skipped(size: usize, combinations: u64, reason: SkipReason) -> Self {
        Self {
            skip: Some(reason),
            ..Self::new(size, combinations)
        }
    }

    /// Combinations never evaluated on the small tier.
    pub fn untested(&self) -> u64 {
        self.combinations.saturating_sub(self.tested.small)
    }
}

/// How a run ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum Termination {
    /// Every combination size was searched.
    Completed,
    /// Cancellation was observed while searching `size`.
    Cancelled { size: usize },
    /// A fatal error stopped the run. `size` is absent when the error
    /// happened before the first size started.
    Aborted {
        size: Option<usize>,
        tier: Option<SampleTier>,
        reason: String,
    },
}

/// A sample used by the run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SampleInfo {
    pub tier: SampleTier,
    pub rows: usize,
    pub captured_at: DateTime<Utc>,
}

impl From<&Sample> for SampleInfo {
    fn from(sample: &Sample) -> Self {
        Self {
            tier: sample.tier(),
            rows: sample.num_rows(),
            captured_at: sample.captured_at(),
        }
    }
}

/// Everything a run produced, including partial results of a run that
/// stopped early.
#[derive(Debug, Serialize)]
pub struct SearchOutcome {
    pub table: TableRef,
    pub eligible_columns: Vec<String>,
    pub threshold: f64,
    pub threshold_policy: ThresholdPolicy,
    /// Confirmed candidates in the order they were confirmed
    pub confirmed: Vec<CandidateResult>,
    /// Survivors whose next tier was never evaluated because the run stopped
    pub pending: Vec<CandidateResult>,
    /// One summary per size from `min_columns` to `max_columns`
    pub sizes: Vec<SizeSummary>,
    pub failures: Vec<CombinationFailure>,
    pub samples: Vec<SampleInfo>,
    pub termination: Termination,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(skip)]
    pub(crate) error: Option<EdaError>,
}

impl SearchOutcome {
    pub(crate) fn new(table: TableRef, config: &SearchConfig) -> Self {
        Self {
            table,
            eligible_columns: Vec::new(),
            threshold: config.threshold,
            threshold_policy: config.threshold_policy,
            confirmed: Vec::new(),
            pending: Vec::new(),
            sizes: Vec::new(),
            failures: Vec::new(),
            samples: Vec::new(),
            termination: Termination::Completed,
            started_at: Utc::now(),
            finished_at: None,
            error: None,
        }
    }

    /// The error that stopped the run, if any.
    pub fn fatal_error(&self) -> Option<&EdaError> {
        self.error.as_ref()
    }

    /// Takes the fatal error out of the outcome.
    pub fn take_error(&mut self) -> Option<EdaError> {
        self.error.take()
    }

    /// Returns true when every size was searched.
    pub fn is_complete(&self) -> bool {
        self.termination == Termination::Completed
    }

    /// Summary of one combination size.
    pub fn size(&self, size: usize) -> Option<&SizeSummary> {
        self.sizes.iter().find(|s| s.size == size)
    }

    /// Column sets of the confirmed candidates.
    pub fn confirmed_sets(&self) -> Vec<&ColumnSet> {
        self.confirmed.iter().map(|c| &c.columns).collect()
    }

    /// Wall-clock duration of a finished run.
    pub fn duration(&self) -> Option<chrono::Duration> {
        self.finished_at.map(|end| end - self.started_at)
    }

    /// Serializes the outcome as pretty-printed JSON.
    pub fn to_json(&self) -> crate::error::Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub(crate) fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn observation(tier: SampleTier, distinct: u64, total: u64) -> TierObservation {
        TierObservation::new(
            tier,
            Uniqueness {
                distinct_groups: distinct,
                total_rows: total,
            },
        )
    }

    #[test]
    fn test_candidate_ratios() {
        let mut candidate = CandidateResult::new(ColumnSet::new(["id"]));
        assert_eq!(
            candidate.verdict,
            Verdict::Untested {
                tier: SampleTier::Small
            }
        );
        candidate
            .observations
            .push(observation(SampleTier::Small, 10, 10));
        candidate
            .observations
            .push(observation(SampleTier::Medium, 99, 100));
        assert_eq!(candidate.ratio_at(SampleTier::Small), Some(1.0));
        assert_eq!(candidate.ratio_at(SampleTier::Large), None);
        assert_eq!(candidate.last_observation().unwrap().tier, SampleTier::Medium);
        assert!(!candidate.is_confirmed());
    }

    #[test]
    fn test_size_summary_untested() {
        let mut summary = SizeSummary::new(2, 10);
        summary.tested.set(SampleTier::Small, 4);
        assert_eq!(summary.untested(), 6);
        assert_eq!(summary.tested.get(SampleTier::Small), 4);

        let empty = SizeSummary::skipped(5, 0, SkipReason::EmptySearchSpace);
        assert_eq!(empty.untested(), 0);
        assert_eq!(empty.skip, Some(SkipReason::EmptySearchSpace));
    }

    #[test]
    fn test_outcome_serializes_without_error() {
        let mut outcome = SearchOutcome::new(TableRef::bare("t"), &SearchConfig::default());
        outcome.error = Some(EdaError::sample_unavailable(
            SampleTier::Large,
            "t",
            "gone",
        ));
        outcome.termination = Termination::Aborted {
            size: Some(2),
            tier: Some(SampleTier::Large),
            reason: "gone".to_string(),
        };
        outcome.finish();

        let json: serde_json::Value = serde_json::from_str(&outcome.to_json().unwrap()).unwrap();
        assert_eq!(json["termination"]["status"], "aborted");
        assert_eq!(json["termination"]["tier"], "large");
        assert!(json.get("error").is_none());
        assert!(outcome.fatal_error().is_some());
        assert!(!outcome.is_complete());
        assert!(outcome.duration().is_some());
    }
}
