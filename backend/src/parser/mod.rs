//! Workbook loading and cell access.
//!
//! Thin wrapper over `umya-spreadsheet` that turns cells into
//! [`CellValue`]s. No attendance-specific logic here.

use std::io::Cursor;
use std::path::Path;

use umya_spreadsheet::{Spreadsheet, Worksheet};

use crate::error::WorkbookError;
use crate::models::CellValue;
use crate::schema::column_letter;

/// A loaded `.xlsx` workbook.
pub struct Workbook {
    book: Spreadsheet,
}

impl Workbook {
    /// Parse workbook bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, WorkbookError> {
        if bytes.is_empty() {
            return Err(WorkbookError::Unreadable("empty file".to_string()));
        }
        let book = umya_spreadsheet::reader::xlsx::read_reader(Cursor::new(bytes), true)
            .map_err(|e| WorkbookError::Unreadable(e.to_string()))?;
        Ok(Self { book })
    }

    /// Read and parse a workbook file.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, WorkbookError> {
        let bytes = std::fs::read(path.as_ref()).map_err(|source| WorkbookError::Io {
            path: path.as_ref().to_path_buf(),
            source,
        })?;
        Self::from_bytes(&bytes)
    }

    /// Sheet by exact name.
    pub fn sheet(&self, name: &str) -> Option<Sheet<'_>> {
        self.book.get_sheet_by_name(name).map(|ws| Sheet { ws })
    }

    pub fn sheet_names(&self) -> Vec<String> {
        self.book
            .get_sheet_collection()
            .iter()
            .map(|ws| ws.get_name().to_string())
            .collect()
    }
}

/// Read-only view of one worksheet.
#[derive(Clone, Copy)]
pub struct Sheet<'a> {
    ws: &'a Worksheet,
}

impl<'a> Sheet<'a> {
    pub fn name(&self) -> &str {
        self.ws.get_name()
    }

    /// Raw text of a cell; empty string when the cell is unset.
    pub fn text(&self, column: &str, row: u32) -> String {
        let address = format!("{}{}", column, row);
        self.ws
            .get_cell(address.as_str())
            .map(|cell| cell.get_value().to_string())
            .unwrap_or_default()
    }

    /// Cell content, `None` when unset or zero-length.
    pub fn value(&self, column: &str, row: u32) -> Option<CellValue> {
        CellValue::from_raw(&self.text(column, row))
    }

    /// Last row holding any cell.
    pub fn max_row(&self) -> u32 {
        self.ws.get_highest_row()
    }

    /// Last column holding any cell, as an index.
    pub fn max_column(&self) -> u32 {
        self.ws.get_highest_column()
    }

    /// Non-empty header texts of `row`, left to right, with their letters.
    pub fn headers(&self, row: u32) -> Vec<(String, String)> {
        (1..=self.max_column())
            .map(column_letter)
            .filter_map(|letter| {
                let text = self.text(&letter, row);
                (!text.is_empty()).then_some((letter, text))
            })
            .collect()
    }
}

/// Workbook builder for tests: one sheet, cells set by address.
#[cfg(test)]
pub(crate) struct SheetBuilder {
    book: Spreadsheet,
    sheet: String,
}

#[cfg(test)]
impl SheetBuilder {
    pub fn new(sheet: &str) -> Self {
        let mut book = umya_spreadsheet::new_file_empty_worksheet();
        book.new_sheet(sheet).expect("fresh sheet name");
        Self {
            book,
            sheet: sheet.to_string(),
        }
    }

    pub fn set(mut self, address: &str, value: &str) -> Self {
        self.book
            .get_sheet_by_name_mut(&self.sheet)
            .expect("sheet exists")
            .get_cell_mut(address)
            .set_value(value);
        self
    }

    pub fn set_number(mut self, address: &str, value: f64) -> Self {
        self.book
            .get_sheet_by_name_mut(&self.sheet)
            .expect("sheet exists")
            .get_cell_mut(address)
            .set_value_number(value);
        self
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut cursor = Cursor::new(Vec::new());
        umya_spreadsheet::writer::xlsx::write_writer(&self.book, &mut cursor)
            .expect("write workbook");
        cursor.into_inner()
    }

    pub fn build(self) -> Workbook {
        Workbook::from_bytes(&self.to_bytes()).expect("read back workbook")
    }
}
