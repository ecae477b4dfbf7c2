//! Run orchestration: every source file through extract → transform, then
//! one aggregation over everything that survived.
//!
//! A failing file is logged with its id, failure kind and offending location
//! and then skipped; its siblings carry on. Rows with an empty grouping key
//! are logged and left out without failing their file. Only an empty
//! aggregation input stops the run.
//!
//! # Example
//!
//! ```rust,ignore
//! use consolidator::transform::pipeline::{consolidate, SourceFile};
//!
//! let sources = vec![Ok(SourceFile::new("north.xlsx", bytes))];
//! let result = consolidate(sources, &descriptor, &rules);
//! println!("{} groups", result.summary.groups);
//! ```

use serde::Serialize;
use std::path::PathBuf;
use uuid::Uuid;

use super::grouper::aggregate_with_marker;
use super::mapper::{transform, SkippedRecord, TransformRules};
use crate::config::AppConfig;
use crate::error::{
    AcquisitionError, AggregationError, FailureKind, FileError, PipelineResult,
};
use crate::extract::{extract, ExtractError};
use crate::logs::{
    log_failure, log_info, log_info_indent, log_skip, log_success, log_warning, LogContext,
};
use crate::models::{AggregatedRow, AttendanceRecord};
use crate::output::write_consolidated;
use crate::schema::SchemaDescriptor;

/// Raw bytes of one branch workbook.
#[derive(Debug, Clone)]
pub struct SourceFile {
    /// Download index or file name; used in every report about this file.
    pub id: String,
    pub bytes: Vec<u8>,
    /// Where the bytes live on disk, if anywhere.
    pub path: Option<PathBuf>,
}

impl SourceFile {
    pub fn new(id: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            id: id.into(),
            bytes,
            path: None,
        }
    }

    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }
}

impl From<ExtractError> for FileError {
    fn from(err: ExtractError) -> Self {
        match err {
            ExtractError::Workbook(e) => FileError::Workbook(e),
            ExtractError::Structural(e) => FileError::Structural(e),
        }
    }
}

/// Transformed records of one file.
#[derive(Debug, Clone)]
pub struct FileBatch {
    pub source_id: String,
    pub branch: String,
    pub branch_slug: String,
    pub records: Vec<AttendanceRecord>,
    /// Records read from the sheet, before filtering.
    pub extracted: usize,
    pub filtered: usize,
    pub skipped: Vec<SkippedRecord>,
}

/// Extract and transform a single file.
pub fn process_file(
    source: &SourceFile,
    descriptor: &SchemaDescriptor,
    rules: &TransformRules,
) -> Result<FileBatch, FileError> {
    let extracted = extract(&source.bytes, &source.id, descriptor)?;
    let transformed = transform(&extracted.records, &extracted.branch, rules)?;

    Ok(FileBatch {
        source_id: source.id.clone(),
        branch: extracted.branch,
        branch_slug: extracted.branch_slug,
        extracted: extracted.records.len(),
        filtered: transformed.filtered,
        skipped: transformed.skipped,
        records: transformed.records,
    })
}

/// Why a file was skipped.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FileFailure {
    pub file_id: String,
    pub kind: FailureKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    pub message: String,
}

impl FileFailure {
    fn new(file_id: &str, err: &FileError) -> Self {
        Self {
            file_id: file_id.to_string(),
            kind: err.kind(),
            location: err.location(),
            message: err.to_string(),
        }
    }
}

/// Outcome of one source file.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileReport {
    pub file_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub branch_slug: Option<String>,
    #[serde(skip)]
    pub path: Option<PathBuf>,
    pub records: usize,
    pub filtered: usize,
    /// Rows left out for an empty grouping key.
    pub skipped: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<FileFailure>,
}

impl FileReport {
    pub fn succeeded(&self) -> bool {
        self.failure.is_none()
    }
}

/// Counters for a whole run.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub run_id: String,
    pub files_succeeded: usize,
    pub files_skipped: usize,
    pub records_extracted: usize,
    pub records_filtered: usize,
    /// Rows left out for an empty grouping key.
    pub records_skipped: usize,
    /// Records that entered aggregation.
    pub records_aggregated: usize,
    /// Rows of the consolidated table.
    pub groups: usize,
    pub failures: Vec<FileFailure>,
}

/// Everything a run produced, successful or not.
#[derive(Debug)]
pub struct Consolidation {
    pub summary: RunSummary,
    pub reports: Vec<FileReport>,
    pub rows: Result<Vec<AggregatedRow>, AggregationError>,
}

/// Process every source and aggregate the survivors.
///
/// Sources are handled in input order. Acquisition failures arrive already
/// resolved and are reported under their 1-based position.
pub fn consolidate(
    sources: Vec<Result<SourceFile, AcquisitionError>>,
    descriptor: &SchemaDescriptor,
    rules: &TransformRules,
) -> Consolidation {
    let mut summary = RunSummary {
        run_id: Uuid::new_v4().to_string(),
        files_succeeded: 0,
        files_skipped: 0,
        records_extracted: 0,
        records_filtered: 0,
        records_skipped: 0,
        records_aggregated: 0,
        groups: 0,
        failures: Vec::new(),
    };
    let mut reports = Vec::with_capacity(sources.len());
    let mut records = Vec::new();

    log_info(format!("📂 Processing {} file(s)...", sources.len()));

    for (index, source) in sources.into_iter().enumerate() {
        let (file_id, path, outcome) = match source {
            Ok(source) => {
                log_info_indent(format!("Reading {}", source.id), 1);
                let outcome = process_file(&source, descriptor, rules);
                (source.id, source.path, outcome)
            }
            Err(err) => ((index + 1).to_string(), None, Err(FileError::from(err))),
        };

        match outcome {
            Ok(batch) => {
                for skip in &batch.skipped {
                    log_skip(
                        format!(
                            "{}: row {} skipped, '{}' is empty",
                            file_id, skip.row, skip.field
                        ),
                        LogContext {
                            file_id: Some(file_id.clone()),
                            kind: None,
                            location: Some(format!("{}:{}", skip.field, skip.row)),
                        },
                    );
                }
                log_success(format!(
                    "{}: branch '{}', {} record(s), {} filtered, {} skipped",
                    file_id,
                    batch.branch,
                    batch.records.len(),
                    batch.filtered,
                    batch.skipped.len()
                ));
                summary.files_succeeded += 1;
                summary.records_extracted += batch.extracted;
                summary.records_filtered += batch.filtered;
                summary.records_skipped += batch.skipped.len();
                reports.push(FileReport {
                    file_id,
                    branch: Some(batch.branch),
                    branch_slug: Some(batch.branch_slug),
                    path,
                    records: batch.records.len(),
                    filtered: batch.filtered,
                    skipped: batch.skipped.len(),
                    failure: None,
                });
                records.extend(batch.records);
            }
            Err(err) => {
                let failure = FileFailure::new(&file_id, &err);
                log_failure(
                    format!("{}: {} (file skipped)", file_id, err),
                    LogContext {
                        file_id: Some(file_id.clone()),
                        kind: Some(failure.kind),
                        location: failure.location.clone(),
                    },
                );
                summary.files_skipped += 1;
                summary.failures.push(failure.clone());
                reports.push(FileReport {
                    file_id,
                    branch: None,
                    branch_slug: None,
                    path,
                    records: 0,
                    filtered: 0,
                    skipped: 0,
                    failure: Some(failure),
                });
            }
        }
    }

    summary.records_aggregated = records.len();
    let rows = aggregate_with_marker(&records, &rules.presence_marker);
    if let Ok(rows) = &rows {
        summary.groups = rows.len();
    }

    log_summary(&summary);

    Consolidation {
        summary,
        reports,
        rows,
    }
}

/// A run that produced an artifact.
#[derive(Debug)]
pub struct RunOutput {
    pub summary: RunSummary,
    pub reports: Vec<FileReport>,
    pub rows: Vec<AggregatedRow>,
    pub artifact: PathBuf,
}

/// Consolidate and write `{prefix}_{timestamp}.xlsx` into the summary dir.
///
/// Nothing is written when aggregation fails.
pub fn run_consolidation(
    sources: Vec<Result<SourceFile, AcquisitionError>>,
    descriptor: &SchemaDescriptor,
    config: &AppConfig,
    timestamp: &str,
) -> PipelineResult<RunOutput> {
    let Consolidation {
        summary,
        reports,
        rows,
    } = consolidate(sources, descriptor, &config.transform);

    let rows = rows?;
    let artifact = write_consolidated(&rows, &config.output, &config.paths.summary_dir, timestamp)?;
    log_success(format!("💾 Consolidated workbook: {}", artifact.display()));

    Ok(RunOutput {
        summary,
        reports,
        rows,
        artifact,
    })
}

fn log_summary(summary: &RunSummary) {
    log_info("📊 Summary:");
    log_info_indent(format!("Files processed: {}", summary.files_succeeded), 1);
    if summary.files_skipped > 0 {
        log_warning(format!("Files skipped: {}", summary.files_skipped));
    }
    log_info_indent(
        format!(
            "Records: {} extracted, {} filtered, {} skipped, {} aggregated into {} row(s)",
            summary.records_extracted,
            summary.records_filtered,
            summary.records_skipped,
            summary.records_aggregated,
            summary.groups
        ),
        1,
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PipelineError;
    use crate::extract::fixtures::{branch_sheet, branch_workbook, descriptor};
    use crate::models::CellValue;
    use std::path::Path;

    const EXAMPLE: &str = include_str!("../../../config.example.json");

    fn north() -> SourceFile {
        SourceFile::new(
            "1",
            branch_workbook(
                "North",
                &[
                    ["Enero", "Lunes", "G1", "2024-01-08", "Inscrito", "P", "", "", ""],
                    ["Enero", "Lunes", "G1", "2024-01-15", "Pre-Inscrito", "P", "", "", ""],
                    ["Enero", "Lunes", "G1", "2024-01-10", "Inscrito", "P", "", "", ""],
                    ["Enero", "Lunes", "G1", "2024-01-09", "Inscrito", "X", "", "", ""],
                ],
            ),
        )
    }

    fn south() -> SourceFile {
        SourceFile::new(
            "2",
            branch_workbook(
                "South",
                &[["Enero", "Lunes", "G1", "2024-01-08", "Inscrito", "P", "", "", ""]],
            ),
        )
    }

    fn mismatched() -> SourceFile {
        let bytes = branch_sheet(
            "West",
            &[["Enero", "Lunes", "G1", "", "Inscrito", "P", "", "", ""]],
        )
        .set("C5", "Month")
        .to_bytes();
        SourceFile::new("3", bytes)
    }

    fn config_in(dir: &Path) -> AppConfig {
        let mut config = AppConfig::from_json_str(EXAMPLE).unwrap();
        config.paths.summary_dir = dir.join("summary");
        config
    }

    #[test]
    fn test_north_south_round_trip() {
        let result = consolidate(
            vec![Ok(north()), Ok(south())],
            &descriptor(),
            &TransformRules::default(),
        );
        let rows = result.rows.unwrap();
        assert_eq!(rows.len(), 2);

        assert_eq!(rows[0].branch, "North");
        assert_eq!(rows[0].week1_count, 2);
        assert_eq!(rows[0].start_date, Some(CellValue::Text("2024-01-10".into())));
        assert_eq!(rows[0].enrollment_type, Some(CellValue::Text("Inscrito".into())));

        assert_eq!(rows[1].branch, "South");
        assert_eq!(rows[1].week1_count, 1);

        let summary = result.summary;
        assert_eq!(summary.files_succeeded, 2);
        assert_eq!(summary.records_extracted, 5);
        assert_eq!(summary.records_filtered, 1);
        assert_eq!(summary.records_aggregated, 4);
        assert_eq!(summary.groups, 2);
    }

    #[test]
    fn test_header_mismatch_skips_only_that_file() {
        let result = consolidate(
            vec![Ok(north()), Ok(mismatched()), Ok(south())],
            &descriptor(),
            &TransformRules::default(),
        );
        assert_eq!(result.summary.files_succeeded, 2);
        assert_eq!(result.summary.files_skipped, 1);

        let failure = &result.summary.failures[0];
        assert_eq!(failure.file_id, "3");
        assert_eq!(failure.kind, FailureKind::ColumnMismatch);
        assert_eq!(failure.location.as_deref(), Some("C"));

        let report = &result.reports[1];
        assert!(!report.succeeded());
        assert_eq!(report.records, 0);
        assert_eq!(result.rows.unwrap().len(), 2);
    }

    #[test]
    fn test_acquisition_failure_reported_by_position() {
        let result = consolidate(
            vec![
                Ok(south()),
                Err(AcquisitionError::HttpStatus {
                    url: "https://example.org/b.xlsx".into(),
                    status: 404,
                }),
            ],
            &descriptor(),
            &TransformRules::default(),
        );
        assert_eq!(result.summary.failures.len(), 1);
        assert_eq!(result.summary.failures[0].file_id, "2");
        assert_eq!(result.summary.failures[0].kind, FailureKind::Acquisition);
        assert!(result.rows.is_ok());
    }

    #[test]
    fn test_empty_key_row_skipped_file_kept() {
        let east = SourceFile::new(
            "4",
            branch_workbook(
                "East",
                &[
                    ["Enero", "Lunes", "G1", "", "Inscrito", "P", "", "", ""],
                    ["Enero", "", "G1", "", "Inscrito", "P", "", "", ""],
                    ["Enero", "Lunes", "", "", "Inscrito", "P", "", "", ""],
                ],
            ),
        );
        let result = consolidate(
            vec![Ok(east), Ok(south())],
            &descriptor(),
            &TransformRules::default(),
        );

        assert!(result.summary.failures.is_empty());
        assert_eq!(result.summary.files_succeeded, 2);
        assert_eq!(result.summary.records_extracted, 4);
        assert_eq!(result.summary.records_skipped, 2);
        assert_eq!(result.summary.records_aggregated, 2);
        assert!(result.reports[0].succeeded());
        assert_eq!(result.reports[0].skipped, 2);
        assert_eq!(result.reports[1].skipped, 0);

        let rows = result.rows.unwrap();
        assert_eq!(rows[0].branch, "East");
        assert_eq!(rows[0].week1_count, 1);
    }

    #[test]
    fn test_absent_key_field_rejects_whole_file() {
        let mut rules = TransformRules::default();
        rules.field_map.class_day = "horario".into();
        let result = consolidate(vec![Ok(south())], &descriptor(), &rules);
        assert_eq!(result.summary.failures[0].kind, FailureKind::MalformedRecord);
        assert_eq!(result.summary.failures[0].location.as_deref(), Some("horario"));
        assert!(result.rows.is_err());
    }

    #[test]
    fn test_all_files_failing_is_fatal_without_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());
        let unreadable = SourceFile::new("5", b"not a workbook".to_vec());

        let err = run_consolidation(
            vec![Ok(mismatched()), Ok(unreadable)],
            &descriptor(),
            &config,
            "20240101_120000",
        )
        .unwrap_err();

        assert!(matches!(
            err,
            PipelineError::Aggregation(AggregationError::EmptyInput)
        ));
        assert!(!config.paths.summary_dir.exists());
    }

    #[test]
    fn test_run_writes_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());

        let output = run_consolidation(
            vec![Ok(north()), Ok(south())],
            &descriptor(),
            &config,
            "20240101_120000",
        )
        .unwrap();

        assert_eq!(
            output.artifact,
            config.paths.summary_dir.join("consolidated_20240101_120000.xlsx")
        );
        assert!(output.artifact.exists());
        assert_eq!(output.rows.len(), 2);
        assert_eq!(output.summary.files_succeeded, 2);
    }

    #[test]
    fn test_reports_carry_branch_and_path() {
        let source = south().with_path("/tmp/temp_2.xlsx");
        let result = consolidate(vec![Ok(source)], &descriptor(), &TransformRules::default());
        let report = &result.reports[0];
        assert!(report.succeeded());
        assert_eq!(report.branch_slug.as_deref(), Some("south"));
        assert_eq!(report.path.as_deref(), Some(Path::new("/tmp/temp_2.xlsx")));
    }
}
