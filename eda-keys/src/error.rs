//! Error types for the eda-keys library.
//!
//! All fallible operations return [`EdaError`] through the [`Result`] alias.
//! Errors are split into those that abort a key search run (sample fetches,
//! metadata lookups, configuration) and those that only affect a single
//! column combination (evaluation failures), see [`EdaError::is_fatal`].

use thiserror::Error;

use crate::sampling::SampleTier;

/// The main error type for the eda-keys library.
#[derive(Error, Debug)]
pub enum EdaError {
    /// A tier's sample could not be obtained from the source.
    #[error("Sample unavailable for {tier} tier of '{table}': {message}")]
    SampleUnavailable {
        /// The tier whose sample was requested
        tier: SampleTier,
        /// Display name of the source table
        table: String,
        /// Detailed error message
        message: String,
        /// Optional underlying error
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Grouping could not be computed for one column combination.
    #[error("Evaluation failed for ({columns}): {message}")]
    Evaluation {
        /// Comma separated column names of the combination
        columns: String,
        /// Detailed error message
        message: String,
    },

    /// The metadata store could not answer a query.
    #[error("Metadata store error: {message}")]
    MetadataStore {
        /// Detailed error message
        message: String,
        /// Optional underlying error
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Error related to configuration.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Error from DataFusion operations.
    #[error("DataFusion error: {0}")]
    DataFusion(#[from] datafusion::error::DataFusionError),

    /// Error from Arrow operations.
    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    /// Error from I/O operations.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Error from serialization/deserialization operations.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// A type alias for `Result<T, EdaError>`.
pub type Result<T> = std::result::Result<T, EdaError>;

impl EdaError {
    /// Creates a sample unavailable error.
    pub fn sample_unavailable(
        tier: SampleTier,
        table: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::SampleUnavailable {
            tier,
            table: table.into(),
            message: message.into(),
            source: None,
        }
    }

    /// Creates a sample unavailable error with a source error.
    pub fn sample_unavailable_with_source(
        tier: SampleTier,
        table: impl Into<String>,
        message: impl Into<String>,
        source: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        Self::SampleUnavailable {
            tier,
            table: table.into(),
            message: message.into(),
            source: Some(source),
        }
    }

    /// Creates an evaluation error for a column combination.
    pub fn evaluation<I, S>(columns: I, message: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let columns = columns
            .into_iter()
            .map(|c| c.as_ref().to_string())
            .collect::<Vec<_>>()
            .join(", ");
        Self::Evaluation {
            columns,
            message: message.into(),
        }
    }

    /// Creates a metadata store error.
    pub fn metadata_store(message: impl Into<String>) -> Self {
        Self::MetadataStore {
            message: message.into(),
            source: None,
        }
    }

    /// Creates a metadata store error with a source error.
    pub fn metadata_store_with_source(
        message: impl Into<String>,
        source: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        Self::MetadataStore {
            message: message.into(),
            source: Some(source),
        }
    }

    /// Returns true when the error ends a search run instead of a single
    /// combination.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::SampleUnavailable { .. } | Self::MetadataStore { .. } | Self::Configuration(_)
        )
    }
}

impl From<serde_json::Error> for EdaError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
