//! # Chunked Aggregation
//!
//! Streaming group-by aggregation over a data source read in bounded batches.
//!
//! ## Key Components
//!
//! - [`row`] - typed field values, rows and batches
//! - [`functions`] - mergeable aggregate states (`Sum`, `Mean`, `Count`, `DistinctCount`)
//! - [`grouped`] - per-batch partial results, the accumulator and the final result
//! - [`chunked`] - the batch reader and the driver loop
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use hospital_analytics::aggregation::{ChunkedAggregator, GroupBy, GroupedAggregation};
//! use hospital_analytics::source::MemorySource;
//!
//! # async fn example(source: MemorySource) -> Result<(), Box<dyn std::error::Error>> {
//! let fold = GroupedAggregation::sum(GroupBy::Column("Department".into()), "AmountPaid");
//! let outcome = ChunkedAggregator::new(1000)?.run(source, &fold).await?;
//! for (department, revenue) in outcome.result.entries() {
//!     println!("{department}: {revenue}");
//! }
//! # Ok(())
//! # }
//! ```

pub mod chunked;
pub mod functions;
pub mod grouped;
pub mod row;

pub use chunked::{
    AggregationOutcome, BatchFold, BatchReader, ChunkedAggregator, RunStats, DEFAULT_BATCH_SIZE,
};
pub use functions::{Aggregate, Count, DistinctCount, Mean, Sum};
pub use grouped::{
    month_end, Accumulator, FinalResult, GroupBy, GroupKey, GroupedAggregation, NullKeyPolicy,
    PartialResult,
};
pub use row::{Batch, Columns, FieldValue, Row};
