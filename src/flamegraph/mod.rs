//! Flamegraph fold files and rendering.
//!
//! This module converts stack groups into folded-stack files, one per
//! partition, and hands those files to a renderer (inferno or an external
//! tool) to produce SVG flamegraphs.

pub mod fold;
pub mod generator;

// Re-export main types
pub use fold::{
    fold_groups, partition_reports, render_fold, write_for_partition, FoldOutcome, PartitionKey,
    PartitionKind,
};
pub use generator::{
    renderer_from_settings, CommandRenderer, FlamegraphConfig, FlamegraphRenderer, InfernoRenderer,
};
