//! Logging configuration for key search runs.
//!
//! Searches over wide tables evaluate millions of combinations, so
//! per-combination logging is off unless explicitly enabled.

use tracing::Level;

/// Logging configuration consumed by the search reporters.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Base log level for search components
    pub base_level: Level,
    /// Whether to log every evaluated combination
    pub log_combination_details: bool,
    /// Whether to log sample fetches
    pub log_sample_operations: bool,
    /// Maximum length for logged field values (to prevent huge logs)
    pub max_field_length: usize,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            base_level: Level::INFO,
            log_combination_details: false,
            log_sample_operations: true,
            max_field_length: 256,
        }
    }
}

impl LogConfig {
    /// Creates a verbose configuration suitable for debugging a search.
    pub fn verbose() -> Self {
        Self {
            base_level: Level::DEBUG,
            log_combination_details: true,
            log_sample_operations: true,
            max_field_length: 1024,
        }
    }

    /// Creates a minimal configuration that only reports confirmed keys and failures.
    pub fn production() -> Self {
        Self {
            base_level: Level::WARN,
            log_combination_details: false,
            log_sample_operations: false,
            max_field_length: 128,
        }
    }
}

/// Macro for performance-sensitive debug logging.
///
/// Arguments are only evaluated when the configured level allows debug output.
#[macro_export]
macro_rules! perf_debug {
    ($config:expr, $($arg:tt)*) => {
        if $config.base_level >= tracing::Level::DEBUG {
            tracing::debug!($($arg)*);
        }
    };
}

/// Macro for per-combination logging.
#[macro_export]
macro_rules! log_combination {
    ($config:expr, $($arg:tt)*) => {
        if $config.log_combination_details {
            tracing::debug!($($arg)*);
        }
    };
}

/// Macro for conditional sample operation logging.
#[macro_export]
macro_rules! log_sample_op {
    ($config:expr, $($arg:tt)*) => {
        if $config.log_sample_operations {
            tracing::info!($($arg)*);
        }
    };
}

/// Truncates a string to the maximum field length if needed.
pub fn truncate_field(value: &str, max_length: usize) -> String {
    if value.len() <= max_length {
        return value.to_string();
    }
    let mut end = max_length;
    while !value.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...(truncated)", &value[..end])
}

/// Utilities for installing a `tracing` subscriber.
pub mod setup {
    use tracing::Level;

    /// Configuration for the global subscriber.
    #[derive(Debug, Clone)]
    pub struct LoggingConfig {
        /// Log level for the application
        pub level: Level,
        /// Log level for eda-keys components specifically
        pub crate_level: Level,
        /// Whether to use JSON output format
        pub json_format: bool,
        /// Environment filter override
        pub env_filter: Option<String>,
        /// Writes through the test harness so output is captured per test
        pub test_writer: bool,
    }

    impl Default for LoggingConfig {
        fn default() -> Self {
            Self {
                level: Level::INFO,
                crate_level: Level::INFO,
                json_format: false,
                env_filter: None,
                test_writer: false,
            }
        }
    }

    impl LoggingConfig {
        /// Creates a configuration for unattended runs with JSON output.
        pub fn production() -> Self {
            Self {
                level: Level::WARN,
                crate_level: Level::INFO,
                json_format: true,
                env_filter: None,
                test_writer: false,
            }
        }

        /// Creates a configuration for interactive use.
        pub fn development() -> Self {
            Self {
                level: Level::DEBUG,
                crate_level: Level::DEBUG,
                json_format: false,
                env_filter: None,
                test_writer: false,
            }
        }

        /// Sets the log level for the application.
        pub fn with_level(mut self, level: Level) -> Self {
            self.level = level;
            self
        }

        /// Sets the log level for eda-keys components.
        pub fn with_crate_level(mut self, level: Level) -> Self {
            self.crate_level = level;
            self
        }

        /// Sets whether to use JSON output format.
        pub fn with_json_format(mut self, enabled: bool) -> Self {
            self.json_format = enabled;
            self
        }

        /// Sets a custom environment filter.
        pub fn with_env_filter(mut self, filter: impl Into<String>) -> Self {
            self.env_filter = Some(filter.into());
            self
        }

        /// Sets whether output goes through the test harness capture.
        pub fn with_test_writer(mut self, enabled: bool) -> Self {
            self.test_writer = enabled;
            self
        }

        /// Builds the environment filter string.
        pub fn env_filter(&self) -> String {
            if let Some(ref filter) = self.env_filter {
                filter.clone()
            } else {
                format!(
                    "{},eda_keys={}",
                    self.level.as_str().to_lowercase(),
                    self.crate_level.as_str().to_lowercase()
                )
            }
        }
    }

    /// Installs the global subscriber. `RUST_LOG` takes precedence over the config.
    ///
    /// Fails when a global subscriber is already installed.
    ///
    /// # Examples
    ///
    /// ```rust,no_run
    /// use eda_keys::logging::setup::{init_logging, LoggingConfig};
    ///
    /// init_logging(LoggingConfig::development().with_json_format(true)).unwrap();
    /// ```
    pub fn init_logging(config: LoggingConfig) -> Result<(), Box<dyn std::error::Error>> {
        use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

        let env_filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(config.env_filter()));

        let fmt_layer = match (config.json_format, config.test_writer) {
            (true, true) => tracing_subscriber::fmt::layer()
                .json()
                .with_test_writer()
                .boxed(),
            (true, false) => tracing_subscriber::fmt::layer().json().boxed(),
            (false, true) => tracing_subscriber::fmt::layer().with_test_writer().boxed(),
            (false, false) => tracing_subscriber::fmt::layer().boxed(),
        };

        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .try_init()?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::setup::LoggingConfig;
    use super::*;

    #[test]
    fn test_log_config_defaults() {
        let config = LogConfig::default();
        assert_eq!(config.base_level, Level::INFO);
        assert!(!config.log_combination_details);
        assert!(config.log_sample_operations);
        assert_eq!(config.max_field_length, 256);
    }

    #[test]
    fn test_log_config_presets() {
        assert!(LogConfig::verbose().log_combination_details);
        let production = LogConfig::production();
        assert_eq!(production.base_level, Level::WARN);
        assert!(!production.log_sample_operations);
    }

    #[test]
    fn test_truncate_field() {
        assert_eq!(truncate_field("hello", 10), "hello");
        assert_eq!(
            truncate_field("this is a very long text that should be truncated", 10),
            "this is a ...(truncated)"
        );
        // Never splits a multi-byte character
        assert_eq!(truncate_field("ééé", 3), "é...(truncated)");
    }

    #[test]
    fn test_env_filter_string() {
        let config = LoggingConfig::default().with_crate_level(Level::DEBUG);
        assert_eq!(config.env_filter(), "info,eda_keys=debug");

        let custom = LoggingConfig::default().with_env_filter("warn");
        assert_eq!(custom.env_filter(), "warn");
    }

    #[test]
    fn test_init_logging_installs_once() {
        let config = LoggingConfig::development().with_test_writer(true);
        assert!(config.test_writer);
        assert!(!LoggingConfig::production().test_writer);

        // Another test may have installed the subscriber first
        let _ = super::setup::init_logging(config.clone());
        assert!(super::setup::init_logging(config).is_err());
    }
}
