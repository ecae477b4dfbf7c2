//! Transformation stage.
//!
//! - Mapper: business rules (enrollment filter, empty keys, field mapping)
//! - Grouper: records to consolidated rows
//! - Pipeline: per-file orchestration and the run summary

pub mod grouper;
pub mod mapper;
pub mod pipeline;

pub use grouper::{aggregate, aggregate_with_marker};
pub use mapper::{transform, FieldMap, SkippedRecord, TransformRules, TransformedBatch};
pub use pipeline::*;
