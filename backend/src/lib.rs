//! # Consolidator - branch attendance workbooks into one table
//!
//! Each branch keeps its attendance in an `.xlsx` workbook with a fixed
//! layout. The consolidator checks every workbook against the configured
//! layout, extracts its rows, drops provisional enrollments and counts
//! weekly presence per (branch, month, class day, group).
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │  Workbooks  │────▶│  Validate   │────▶│   Extract   │────▶│  Transform  │────▶│  Aggregate  │
//! │ (per branch)│     │  (layout)   │     │ (sentinel)  │     │  (filter)   │     │  (.xlsx)    │
//! └─────────────┘     └─────────────┘     └─────────────┘     └─────────────┘     └─────────────┘
//! ```
//!
//! A workbook that fails validation or transformation is skipped and
//! reported; the run fails only when nothing is left to aggregate.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use consolidator::{consolidate, AppConfig, SourceFile};
//!
//! let config = AppConfig::load("config.json".as_ref())?;
//! let descriptor = config.descriptor()?;
//! let sources = vec![Ok(SourceFile::new("north.xlsx", std::fs::read("north.xlsx")?))];
//! let result = consolidate(sources, &descriptor, &config.transform);
//! println!("{} groups", result.summary.groups);
//! ```
//!
//! ## Modules
//!
//! - [`error`] - Error types per stage
//! - [`models`] - Cell values, records and aggregated rows
//! - [`schema`] - Layout descriptor and structural validation
//! - [`parser`] - Workbook loading
//! - [`extract`] - Records out of one workbook
//! - [`transform`] - Business rules, grouping and the run pipeline
//! - [`output`] - Consolidated workbook writer
//! - [`fetch`] - Downloads and local files
//! - [`config`] - Configuration loading
//! - [`validation`] - JSON Schema checks for the config
//! - [`logs`] - Console, file and SSE logging
//! - [`api`] - HTTP API server

// Core modules
pub mod error;
pub mod models;

// Layout
pub mod schema;

// Reading
pub mod extract;
pub mod parser;

// Transformation
pub mod transform;

// Writing
pub mod output;

// Acquisition
pub mod fetch;

// Configuration
pub mod config;
pub mod validation;

// Logging
pub mod logs;

// HTTP API
pub mod api;

// =============================================================================
// Re-exports - Error types
// =============================================================================

pub use error::{
    AcquisitionError, AggregationError, ConfigError, FailureKind, FileError,
    MalformedRecordError, OutputError, PipelineError, StructuralValidationError,
    WorkbookError,
};

// =============================================================================
// Re-exports - Models
// =============================================================================

pub use models::{AggregatedRow, AttendanceRecord, CanonicalRecord, CellValue};

// =============================================================================
// Re-exports - Schema
// =============================================================================

pub use schema::{validate, SchemaDescriptor, StructureConfig, ValidatedSheet};

// =============================================================================
// Re-exports - Stages
// =============================================================================

pub use extract::{extract, ExtractedBatch};
pub use transform::{aggregate, transform, TransformRules};

// =============================================================================
// Re-exports - Pipeline
// =============================================================================

pub use transform::pipeline::{
    consolidate, process_file, run_consolidation, Consolidation, FileReport, RunOutput,
    RunSummary, SourceFile,
};

// =============================================================================
// Re-exports - Config
// =============================================================================

pub use config::AppConfig;

// Server
pub mod server {
    pub use crate::api::server::{start_server, AppState};
}
