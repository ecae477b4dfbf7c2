//! REST API types for consolidation requests.

use serde::Serialize;
use serde_json::{json, Value};

use crate::models::AggregatedRow;
use crate::transform::pipeline::{FileReport, RunOutput, RunSummary};

/// Response sent after a successful consolidation.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsolidateResponse {
    pub run_id: String,

    /// "ready" when every file was used, "warning" when some were skipped
    pub status: String,

    pub summary: RunSummary,

    /// Per-file outcome, in upload order
    pub files: Vec<FileReport>,

    /// Consolidated table
    pub rows: Vec<AggregatedRow>,

    /// Path of the written workbook
    pub artifact: String,
}

impl From<RunOutput> for ConsolidateResponse {
    fn from(output: RunOutput) -> Self {
        let status = if output.summary.files_skipped == 0 {
            "ready"
        } else {
            "warning"
        };
        Self {
            run_id: output.summary.run_id.clone(),
            status: status.to_string(),
            artifact: output.artifact.display().to_string(),
            summary: output.summary,
            files: output.reports,
            rows: output.rows,
        }
    }
}

/// Create an error response
pub fn error_response(error: &str) -> Value {
    json!({
        "status": "error",
        "error": error,
        "rows": []
    })
}

/// Error response for a run that processed files but had nothing to aggregate.
pub fn failed_run_response(error: &str, summary: &RunSummary, files: &[FileReport]) -> Value {
    json!({
        "runId": summary.run_id,
        "status": "error",
        "error": error,
        "summary": summary,
        "files": files,
        "rows": []
    })
}
