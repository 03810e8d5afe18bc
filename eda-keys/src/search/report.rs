//! Progress and result events emitted during a key search.

use serde::Serialize;
use std::sync::{Mutex, PoisonError};
use tracing::{error, info, warn};

use crate::logging::{truncate_field, LogConfig};
use crate::metadata::TableRef;
use crate::sampling::SampleTier;
use crate::{log_combination, log_sample_op, perf_debug};

use super::combinations::ColumnSet;
use super::result::{CandidateResult, SkipReason, Termination};

/// Something that happened during a search run.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case", tag = "event")]
pub enum SearchEvent {
    RunStarted {
        table: TableRef,
        eligible_columns: usize,
        min_size: usize,
        max_size: usize,
    },
    SampleFetched {
        tier: SampleTier,
        rows: usize,
    },
    SizeStarted {
        size: usize,
        combinations: u64,
    },
    CombinationEvaluated {
        size: usize,
        tier: SampleTier,
        columns: ColumnSet,
        distinct_groups: u64,
        total_rows: u64,
        ratio: f64,
        passed: bool,
    },
    CombinationFailed {
        size: usize,
        tier: SampleTier,
        columns: ColumnSet,
        reason: String,
    },
    TierCompleted {
        size: usize,
        tier: SampleTier,
        tested: u64,
        survivors: u64,
        rows: usize,
    },
    CandidateConfirmed {
        candidate: CandidateResult,
    },
    /// Carries every observation up to and including the failing tier.
    CandidateRejected {
        candidate: CandidateResult,
    },
    SizeSkipped {
        size: usize,
        reason: SkipReason,
    },
    RunFinished {
        confirmed: usize,
        termination: Termination,
    },
}

/// Receives the events of a search run.
///
/// Reporters are called from the task driving the search, in event order.
/// Any `Fn(&SearchEvent)` closure is a reporter.
pub trait SearchReporter: Send + Sync {
    fn report(&self, event: &SearchEvent);
}

impl<F> SearchReporter for F
where
    F: Fn(&SearchEvent) + Send + Sync,
{
    fn report(&self, event: &SearchEvent) {
        self(event)
    }
}

/// Discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopReporter;

impl SearchReporter for NoopReporter {
    fn report(&self, _event: &SearchEvent) {}
}

/// Keeps every event in memory.
#[derive(Debug, Default)]
pub struct CollectingReporter {
    events: Mutex<Vec<SearchEvent>>,
}

impl CollectingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// A copy of the events received so far.
    pub fn events(&self) -> Vec<SearchEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Removes and returns the events received so far.
    pub fn take(&self) -> Vec<SearchEvent> {
        std::mem::take(&mut *self.events.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

impl SearchReporter for CollectingReporter {
    fn report(&self, event: &SearchEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event.clone());
    }
}

/// Writes events as `tracing` log lines.
///
/// Tier and candidate lines are logged at info level; per-combination lines
/// only when [`LogConfig::log_combination_details`] is set.
#[derive(Debug, Clone, Default)]
pub struct TracingReporter {
    config: LogConfig,
}

impl TracingReporter {
    pub fn new(config: LogConfig) -> Self {
        Self { config }
    }
}

impl SearchReporter for TracingReporter {
    fn report(&self, event: &SearchEvent) {
        match event {
            SearchEvent::RunStarted {
                table,
                eligible_columns,
                min_size,
                max_size,
            } => info!(
                table = %table,
                eligible_columns,
                "Starting key search over combinations of {min_size} to {max_size} columns"
            ),
            SearchEvent::SampleFetched { tier, rows } => {
                log_sample_op!(self.config, %tier, rows, "Sample ready")
            }
            SearchEvent::SizeStarted { size, combinations } => {
                info!(size, combinations, "{combinations} possibilities of {size} columns")
            }
            SearchEvent::CombinationEvaluated {
                size,
                tier,
                columns,
                distinct_groups,
                ratio,
                passed,
                ..
            } => log_combination!(
                self.config,
                size,
                %tier,
                columns = %truncate_field(&columns.to_string(), self.config.max_field_length),
                distinct_groups,
                ratio,
                passed,
                "Combination evaluated"
            ),
            SearchEvent::CombinationFailed {
                size,
                tier,
                columns,
                reason,
            } => warn!(
                size,
                %tier,
                columns = %truncate_field(&columns.to_string(), self.config.max_field_length),
                reason = %truncate_field(reason, self.config.max_field_length),
                "Combination could not be evaluated"
            ),
            SearchEvent::TierCompleted {
                size,
                tier,
                tested,
                survivors,
                rows,
            } => info!(
                size,
                "{tier} sample: {survivors} candidates out of {tested} possibilities tested in {rows} records"
            ),
            SearchEvent::CandidateConfirmed { candidate } => {
                if let Some(last) = candidate.last_observation() {
                    info!(
                        size = candidate.size(),
                        "Candidate: {} Unique: {} Percentage: {:.5}",
                        candidate.columns,
                        last.distinct_groups,
                        last.ratio * 100.0
                    );
                }
            }
            SearchEvent::CandidateRejected { candidate } => {
                // Small tier rejections are the bulk of a run
                if let Some(last) = candidate.last_observation() {
                    if last.tier == SampleTier::Small {
                        log_combination!(
                            self.config,
                            columns = %truncate_field(&candidate.columns.to_string(), self.config.max_field_length),
                            ratio = last.ratio,
                            "Candidate rejected on small sample"
                        );
                    } else {
                        info!(
                            size = candidate.size(),
                            "Candidate: {} rejected on {} sample, Unique: {} Percentage: {:.5}",
                            candidate.columns,
                            last.tier,
                            last.distinct_groups,
                            last.ratio * 100.0
                        );
                    }
                }
            }
            SearchEvent::SizeSkipped { size, reason } => {
                perf_debug!(self.config, size, ?reason, "Skipping remaining tiers")
            }
            SearchEvent::RunFinished {
                confirmed,
                termination,
            } => match termination {
                Termination::Completed => info!(confirmed, "Key search completed"),
                Termination::Cancelled { size } => {
                    warn!(confirmed, size, "Key search cancelled")
                }
                Termination::Aborted { reason, .. } => {
                    error!(confirmed, reason = %reason, "Key search aborted")
                }
            },
        }
    }
}
