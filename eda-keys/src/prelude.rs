//! Prelude for commonly used types and traits in eda-keys.

pub use crate::config::{SampleFetch, SearchConfig, ThresholdPolicy, TierSizes};
pub use crate::context::HarvestContext;
pub use crate::error::{EdaError, Result};
pub use crate::logging::LogConfig;
pub use crate::metadata::{
    CandidateColumnSource, ColumnProfile, DataFusionMetadataStore, EligibilityRules,
    InMemoryMetadataStore, TableRef,
};
pub use crate::sampling::{
    DataFusionSampleProvider, InMemorySampleProvider, Sample, SampleProvider, SampleTier,
    SamplingStrategy,
};
pub use crate::search::{
    CancellationToken, CandidateResult, ColumnSet, CombinationEnumerator, ProgressiveKeySearch,
    SearchEvent, SearchOutcome, SearchReporter, UniquenessEvaluator, Verdict,
};
