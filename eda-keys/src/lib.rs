//! # eda-keys - Primary Key Candidate Search
//!
//! eda-keys finds column combinations that could serve as the primary key of
//! a table. It is the key search part of an exploratory-data-analysis
//! metadata harvester: per-column statistics collected ahead of time decide
//! which columns are worth trying, and progressively larger row samples
//! decide which combinations of them are unique.
//!
//! ## Quick Start
//!
//! ```rust
//! use eda_keys::prelude::*;
//! use arrow::array::{Int64Array, StringArray};
//! use arrow::datatypes::{DataType, Field, Schema};
//! use arrow::record_batch::RecordBatch;
//! use std::sync::Arc;
//!
//! # async fn example() -> eda_keys::error::Result<()> {
//! let orders = TableRef::new("srv", "sales", "dbo", "orders");
//!
//! // Column statistics from an earlier profiling pass
//! let store = InMemoryMetadataStore::new();
//! store
//!     .replace_profiles(
//!         &orders,
//!         vec![
//!             ColumnProfile::new(orders.clone(), "order_id", 1, "bigint", 1_000, 0),
//!             ColumnProfile::new(orders.clone(), "status", 2, "varchar", 3, 0),
//!         ],
//!     )
//!     .await?;
//!
//! // The rows themselves
//! let schema = Arc::new(Schema::new(vec![
//!     Field::new("order_id", DataType::Int64, false),
//!     Field::new("status", DataType::Utf8, false),
//! ]));
//! let statuses: Vec<&str> = (0..1_000).map(|i| ["new", "paid", "sent"][i % 3]).collect();
//! let batch = RecordBatch::try_new(
//!     schema,
//!     vec![
//!         Arc::new(Int64Array::from_iter_values(0..1_000)),
//!         Arc::new(StringArray::from(statuses)),
//!     ],
//! )?;
//! let samples = InMemorySampleProvider::new();
//! samples.insert(orders.clone(), vec![batch]).await;
//!
//! let config = SearchConfig::default().with_tiers(TierSizes::new(10, 100, 1_000));
//! let search = ProgressiveKeySearch::new(config, store, samples)?;
//! let outcome = search.run(&orders).await;
//!
//! assert_eq!(outcome.confirmed[0].columns, ColumnSet::new(["order_id"]));
//! # Ok(())
//! # }
//! ```
//!
//! ## How the search works
//!
//! For every combination size `k` from 1 to `max_columns`:
//!
//! 1. All `C(M, k)` combinations of the `M` eligible columns are grouped on
//!    the small sample (10K rows by default).
//! 2. Combinations whose distinct-group ratio reaches the threshold
//!    (0.99999 by default) are grouped again on the medium sample (100K).
//! 3. The survivors of that are grouped on the large sample (1M). Whatever
//!    passes is a confirmed candidate.
//!
//! Only survivors move on, so the expensive large-sample grouping runs on a
//! handful of combinations instead of the whole search space.
//!
//! ## Architecture
//!
//! - **`metadata`**: table references, stored column profiles and the
//!   eligibility rules applied to them
//! - **`sampling`**: sample tiers and the providers that fetch them
//! - **`search`**: combination enumeration, uniqueness evaluation, the
//!   progressive search and its reporting
//! - **`config`**: search and session configuration
//! - **`context`**: DataFusion session management
//! - **`error`** and **`logging`**: error types and `tracing` setup

pub mod config;
pub mod context;
pub mod error;
pub mod logging;
pub mod metadata;
pub mod prelude;
pub mod sampling;
pub mod search;
