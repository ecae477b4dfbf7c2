//! Consolidated workbook writer.
//!
//! One sheet, a header row, then one row per [`AggregatedRow`] in the order
//! the aggregator emitted them.

use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use umya_spreadsheet::{Spreadsheet, Worksheet};

use crate::error::{OutputError, OutputResult};
use crate::models::{AggregatedRow, CellValue};
use crate::schema::column_letter;

/// Column titles of the consolidated sheet, in output order.
pub const DEFAULT_HEADERS: [&str; 10] = [
    "filial",
    "mes",
    "diaclase",
    "fechainicio",
    "grupo",
    "tipoinscrito",
    "sem1",
    "sem2",
    "sem3",
    "sem4",
];

/// `output` config section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct OutputConfig {
    pub sheet_name: String,
    pub file_prefix: String,
    /// Number format applied to numeric start dates.
    pub date_format: String,
    /// Ten titles, one per output column.
    pub headers: Vec<String>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            sheet_name: "Consolidado".to_string(),
            file_prefix: "consolidated".to_string(),
            date_format: "dd/mm/yyyy".to_string(),
            headers: DEFAULT_HEADERS.iter().map(|h| h.to_string()).collect(),
        }
    }
}

/// Start-date column (1-based).
const START_DATE_COLUMN: u32 = 4;

/// Build the consolidated workbook in memory.
pub fn render_workbook(rows: &[AggregatedRow], config: &OutputConfig) -> OutputResult<Spreadsheet> {
    let mut book = umya_spreadsheet::new_file_empty_worksheet();
    let sheet = book
        .new_sheet(config.sheet_name.as_str())
        .map_err(|e| OutputError::Write(e.to_string()))?;

    for (i, header) in config.headers.iter().enumerate() {
        sheet
            .get_cell_mut(address(i as u32 + 1, 1).as_str())
            .set_value(header.as_str());
    }

    for (i, row) in rows.iter().enumerate() {
        write_row(sheet, i as u32 + 2, row, &config.date_format);
    }

    Ok(book)
}

fn write_row(sheet: &mut Worksheet, row: u32, data: &AggregatedRow, date_format: &str) {
    let [w1, w2, w3, w4] = data.week_counts();
    let cells: [Option<CellValue>; 10] = [
        Some(CellValue::Text(data.branch.clone())),
        Some(data.month.clone()),
        Some(data.class_day.clone()),
        data.start_date.clone(),
        Some(data.group_id.clone()),
        data.enrollment_type.clone(),
        Some(CellValue::Number(w1 as f64)),
        Some(CellValue::Number(w2 as f64)),
        Some(CellValue::Number(w3 as f64)),
        Some(CellValue::Number(w4 as f64)),
    ];

    for (i, value) in cells.iter().enumerate() {
        let column = i as u32 + 1;
        let Some(value) = value else { continue };
        let coordinate = address(column, row);
        let cell = sheet.get_cell_mut(coordinate.as_str());
        match value {
            CellValue::Number(n) => {
                cell.set_value_number(*n);
            }
            CellValue::Bool(b) => {
                cell.set_value_bool(*b);
            }
            CellValue::Text(s) => {
                cell.set_value(s.as_str());
            }
        }

        if column == START_DATE_COLUMN && matches!(value, CellValue::Number(_)) && !date_format.is_empty() {
            sheet
                .get_style_mut(coordinate.as_str())
                .get_number_format_mut()
                .set_format_code(date_format);
        }
    }
}

fn address(column: u32, row: u32) -> String {
    format!("{}{}", column_letter(column), row)
}

/// Serialise a workbook to `.xlsx` bytes.
pub fn to_bytes(book: &Spreadsheet) -> OutputResult<Vec<u8>> {
    let mut cursor = Cursor::new(Vec::new());
    umya_spreadsheet::writer::xlsx::write_writer(book, &mut cursor)
        .map_err(|e| OutputError::Write(e.to_string()))?;
    Ok(cursor.into_inner())
}

/// Write `{prefix}_{timestamp}.xlsx` into `dir`, creating it if needed.
///
/// An existing artifact with the same name is never replaced; the write
/// fails with `AlreadyExists` instead.
pub fn write_consolidated(
    rows: &[AggregatedRow],
    config: &OutputConfig,
    dir: &Path,
    timestamp: &str,
) -> OutputResult<PathBuf> {
    std::fs::create_dir_all(dir).map_err(|source| OutputError::Io {
        path: dir.to_path_buf(),
        source,
    })?;

    let path = dir.join(format!("{}_{}.xlsx", config.file_prefix, timestamp));
    let book = render_workbook(rows, config)?;
    let bytes = to_bytes(&book)?;
    OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&path)
        .and_then(|mut file| file.write_all(&bytes))
        .map_err(|source| OutputError::Io {
            path: path.clone(),
            source,
        })?;
    Ok(path)
}
