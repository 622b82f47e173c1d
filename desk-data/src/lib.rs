#![forbid(unsafe_code)]
#![warn(
    unused,
    clippy::cast_possible_truncation,
    clippy::cast_possible_wrap,
    clippy::cast_sign_loss,
    rust_2018_idioms,
    missing_debug_implementations
)]
#![allow(clippy::type_complexity, clippy::too_many_arguments)]

//! # Desk-Data
//! Backfills price ticks from a time-series store and aggregates them into fixed-width time
//! buckets for OTC desk charts: per-source value series, forward-filled two-leg spreads and
//! multi-source comparisons.
//!
//! ## Overview
//! A call to [`SeriesEngine`] runs through four stages:
//! * [`Resolution`] selection from the requested span.
//! * One [`PaginatedStreamer`](stream::PaginatedStreamer) per source, pulling bounded pages out
//!   of a [`RangeQuery`](store::RangeQuery) store concurrently.
//! * A private [`BucketAccumulator`](aggregation::BucketAccumulator) per streamer, merged once
//!   every streamer has finished.
//! * Materialization of the merged buckets into a [`SeriesShape`](series::SeriesShape).
//!
//! Stream faults never fail a call, every [`SeriesOutput`] carries one
//! [`StreamReport`](stream::StreamReport) per source describing how its stream ended.
//!
//! ## Example
//! ```rust,no_run
//! use desk_data::{
//!     SeriesEngine,
//!     config::SupabaseConfig,
//!     sample::SourceId,
//!     store::supabase::SupabaseStore,
//! };
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn run() -> Result<(), desk_data::error::DataError> {
//! let store = SupabaseStore::new(SupabaseConfig::from_env()?)?;
//! let engine = SeriesEngine::new(store);
//!
//! let bitkub = SourceId::from(SourceId::BITKUB);
//! let maxbit = SourceId::from(SourceId::MAXBIT);
//!
//! let spread = engine
//!     .get_spread(&bitkub, &maxbit, 24.0, &CancellationToken::new())
//!     .await;
//!
//! for point in spread.points {
//!     println!("{} {}", point.time, point.spread);
//! }
//! # Ok(())
//! # }
//! ```

/// Bucket Accumulator: per-source `{sum, count}` totals keyed by bucket start time.
pub mod aggregation;

/// Stream, engine and Supabase connection configuration.
pub mod config;

/// Engine entry points that select a resolution, stream every source concurrently, merge and
/// materialize.
pub mod engine;

/// All [`Error`](std::error::Error)s generated in Desk-Data.
pub mod error;

/// Bucket width selection and timestamp alignment.
pub mod resolution;

/// Price samples, source identifiers, selectors and time windows.
pub mod sample;

/// Series Materializer: value, spread and comparison shapes rendered from merged buckets.
pub mod series;

/// Range query abstraction over time-ordered sample stores.
pub mod store;

/// Paginated Range Streamer.
pub mod stream;

pub use engine::{SeriesEngine, SeriesOutput};
pub use resolution::Resolution;
