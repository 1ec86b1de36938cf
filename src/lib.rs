//! # tabagg
//!
//! `tabagg` is a streaming group-by aggregator for whitespace-separated text,
//! written in Rust. It reads lines once, in order, and keeps only per-group
//! state in memory:
//!
//! - Positional fields (`_0`, `_1`, ...) split on runs of spaces and tabs
//! - Exact 64-bit integer sums that switch to doubles only on overflow
//! - Regex row filters and multi-field grouping keys
//! - Several aggregators per stage packed into one small buffer per group
//! - Chained stages where each stage's output rows feed the next
//!
//! # Spec language
//!
//! - **Aggregates**: `count`, `sum(_N)`, `min(_N)`, `max(_N)`, `count(distinct, _N)`
//! - **Arg-min / arg-max**: `max(_3, _2)` prints field 2 of the row with the largest field 3
//! - **Keys and filters**: `key(_N)`, `filter(_N~REGEX)`
//! - **Short forms**: `c`, `k1`, `s2`, `m3`, `M3_2`, `cd1`, `f1~REGEX`
//! - **Stages** are separated by `=>`; an empty spec echoes field 0
//!
//! # Example
//!
//! ```rust
//! use tabagg::processor::{pipeline::PipelineOptions, stream_processor::StreamProcessor};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let options = PipelineOptions::default();
//!
//!     // Count rows per ticker, keeping only tickers starting with "A"
//!     let spec = "filter(_0~^A) key(_0) count";
//!     let mut processor = StreamProcessor::from_spec(spec, Box::new(std::io::stdout()), &options)?;
//!
//!     processor.process_bytes(b"AAPL 185.6\nMSFT 402.1\nAMZN 151.9\nAAPL 186.0\n")?;
//!     let rows = processor.finish()?;
//!     println!("{rows} input rows");
//!
//!     Ok(())
//! }
//! ```

pub mod config;
mod helpers;
pub mod processor;
