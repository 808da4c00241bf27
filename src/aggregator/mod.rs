//! Aggregation of crash records into stack groups and collapsed stacks.
//!
//! This module transforms extracted records into:
//! - Fingerprinted groups (one per distinct raw stack text)
//! - Collapsed stack format (for flamegraph generation)

pub mod dedup;
pub mod stack_builder;

// Re-export main types and functions
pub use dedup::{Deduplicator, Fingerprint, FingerprintedGroup};
pub use stack_builder::{fold_stack, normalize_stack, parse_frame, CollapsedStack, StackFrame};
