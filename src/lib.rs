//! crashfold
//!
//! Offline batch pipeline for client crash reports: decode compressed
//! archives of pickled records, group identical stack traces, write
//! per-archive HTML reports and folded-stack files for flamegraph
//! renderers.
//!
//! ```text
//! archive ─► decode ─► record stream ─► dedup ─► report
//!                              │
//!                              └─► sink ─► partitions ─► fold ─► render
//! ```

pub mod aggregator;
pub mod commands;
pub mod flamegraph;
pub mod output;
pub mod parser;
pub mod sink;
pub mod utils;
