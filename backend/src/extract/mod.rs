//! Extraction of canonical records from one branch workbook.
//!
//! ```text
//! bytes ─▶ Workbook ─▶ validate ─▶ row range ─▶ RawRow ─▶ CanonicalRecord
//!                        │            (sentinel scan)      (tagged with branch)
//!                        └─ StructuralValidationError: file skipped
//! ```

use std::ops::Range;

use indexmap::IndexMap;
use serde::Serialize;
use thiserror::Error;

use crate::error::{StructuralValidationError, WorkbookError};
use crate::models::{CanonicalRecord, RawRow};
use crate::parser::{Sheet, Workbook};
use crate::schema::{self, SchemaDescriptor};

/// Why a workbook produced no batch.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error(transparent)]
    Workbook(#[from] WorkbookError),

    #[error(transparent)]
    Structural(#[from] StructuralValidationError),
}

/// All records of one branch file.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedBatch {
    /// Identifier of the source file (download index, file name, ...).
    pub source_id: String,
    /// Branch name exactly as written in the anchor cell.
    pub branch: String,
    /// Normalised branch name, for artifact naming only.
    pub branch_slug: String,
    /// Sheet rows that held data.
    pub data_rows: Range<u32>,
    pub records: Vec<CanonicalRecord>,
}

/// Parse, validate and extract one workbook.
pub fn extract(
    bytes: &[u8],
    source_id: &str,
    descriptor: &SchemaDescriptor,
) -> Result<ExtractedBatch, ExtractError> {
    let workbook = Workbook::from_bytes(bytes)?;
    extract_workbook(&workbook, source_id, descriptor)
}

/// Extract from an already parsed workbook.
pub fn extract_workbook(
    workbook: &Workbook,
    source_id: &str,
    descriptor: &SchemaDescriptor,
) -> Result<ExtractedBatch, ExtractError> {
    let validated = schema::validate(workbook, descriptor)?;
    let sheet = validated.sheet;
    let branch = validated.branch;

    let data_rows = data_row_range(&sheet, descriptor);
    let headers = sheet.headers(descriptor.header_row());

    let records = data_rows
        .clone()
        .map(|row| {
            let raw = raw_row(&sheet, &headers, row);
            canonical_record(&raw, &branch, row, descriptor)
        })
        .collect();

    Ok(ExtractedBatch {
        source_id: source_id.to_string(),
        branch_slug: branch_slug(&branch),
        branch,
        data_rows,
        records,
    })
}

/// Rows from `header_row + 1` up to (excluding) the first empty sentinel cell.
///
/// The scan never goes past the sheet's last used row.
pub fn data_row_range(sheet: &Sheet<'_>, descriptor: &SchemaDescriptor) -> Range<u32> {
    let first = descriptor.header_row().saturating_add(1);
    let last = sheet.max_row();
    let column = descriptor.sentinel_column();

    let end = (first..=last)
        .find(|&row| sheet.value(column, row).is_none())
        .unwrap_or_else(|| last.max(first - 1) + 1);

    first..end
}

/// Normalise a branch name for use in file names.
///
/// Anything outside `[a-z0-9_-]` becomes `_`, so the slug is always a single
/// path component.
pub fn branch_slug(branch: &str) -> String {
    branch
        .trim()
        .to_lowercase()
        .chars()
        .map(|c| match c {
            'a'..='z' | '0'..='9' | '_' | '-' => c,
            _ => '_',
        })
        .collect()
}

fn raw_row(sheet: &Sheet<'_>, headers: &[(String, String)], row: u32) -> RawRow {
    let mut raw = RawRow::with_capacity(headers.len());
    for (column, header) in headers {
        raw.entry(header.clone())
            .or_insert_with(|| sheet.value(column, row));
    }
    raw
}

fn canonical_record(
    raw: &RawRow,
    branch: &str,
    row: u32,
    descriptor: &SchemaDescriptor,
) -> CanonicalRecord {
    let fields: IndexMap<_, _> = descriptor
        .columns()
        .iter()
        .map(|binding| {
            let value = raw.get(&binding.expected_header).cloned().flatten();
            (binding.field.clone(), value)
        })
        .collect();

    CanonicalRecord {
        branch: branch.to_string(),
        row,
        fields,
    }
}

/// Builds branch workbooks in the layout of `attendance_structure()`.
#[cfg(test)]
pub(crate) mod fixtures {
    use crate::parser::SheetBuilder;
    use crate::schema::{attendance_structure, SchemaDescriptor};

    pub fn descriptor() -> SchemaDescriptor {
        SchemaDescriptor::new(&attendance_structure()).unwrap()
    }

    /// Header row filled in, branch in B2, then one row per entry of `rows`
    /// covering columns C..K (mes, diaclase, grupo, fechainicio,
    /// tipoinscrito, sem1..sem4). Empty strings leave the cell unset.
    pub fn branch_sheet(branch: &str, rows: &[[&str; 9]]) -> SheetBuilder {
        let descriptor = descriptor();
        let mut builder = SheetBuilder::new("Asistencia").set("B1", "Reporte de asistencia");
        if !branch.is_empty() {
            builder = builder.set("B2", branch);
        }
        for binding in descriptor.columns() {
            builder = builder.set(&format!("{}5", binding.column), &binding.expected_header);
        }
        for (i, values) in rows.iter().enumerate() {
            let row = 6 + i as u32;
            for (binding, value) in descriptor.columns().iter().zip(values.iter()) {
                if !value.is_empty() {
                    builder = builder.set(&format!("{}{}", binding.column, row), value);
                }
            }
        }
        builder
    }

    pub fn branch_workbook(branch: &str, rows: &[[&str; 9]]) -> Vec<u8> {
        branch_sheet(branch, rows).to_bytes()
    }
}
