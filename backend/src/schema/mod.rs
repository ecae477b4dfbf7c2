//! Declarative description of a branch workbook layout.
//!
//! The configuration file carries a `structure` section that is deserialised
//! into [`StructureConfig`] and then checked into an immutable
//! [`SchemaDescriptor`]. Every stage receives the descriptor by reference.
//!
//! ```text
//!  A      B          C      D           E       ...
//! ┌──────┬──────────┬──────┬───────────┬───────┐
//! │      │ North    │      │           │       │  ← anchor cell (B2)
//! ├──────┼──────────┼──────┼───────────┼───────┤
//! │      │          │ Mes  │ Dia Clase │ Grupo │  ← header row (5)
//! │      │          │ Ene  │ Lunes     │ 3     │  ← data, until column C is empty
//! └──────┴──────────┴──────┴───────────┴───────┘
//! ```

pub mod validator;

pub use validator::{validate, ValidatedSheet};

use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::{ConfigError, ConfigResult};

/// Last row an `.xlsx` worksheet can hold.
pub const MAX_ROW: u32 = 1_048_576;

static COLUMN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Z]{1,3}$").expect("valid regex"));
static CELL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([A-Z]{1,3})([1-9][0-9]{0,6})$").expect("valid regex"));

// =============================================================================
// Config shape
// =============================================================================

/// `excel.structure` section of the configuration file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructureConfig {
    pub sheet_name: String,
    pub header_row: u32,
    #[serde(alias = "filial_cell")]
    pub anchor_cell: String,
    pub sentinel_column: String,
    pub columns: IndexMap<String, ColumnSpec>,
}

/// Where a field lives and what its header must say.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ColumnSpec {
    pub column: String,
    #[serde(alias = "expected_name")]
    pub expected_header: String,
}

// =============================================================================
// Descriptor
// =============================================================================

/// A validated cell reference such as `B2`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CellRef {
    pub column: String,
    pub row: u32,
}

impl CellRef {
    pub fn parse(value: &str) -> ConfigResult<Self> {
        let caps = CELL_RE
            .captures(value)
            .ok_or_else(|| ConfigError::InvalidReference {
                what: "cell reference",
                value: value.to_string(),
            })?;
        let row = caps[2].parse().map_err(|_| ConfigError::InvalidReference {
            what: "cell reference",
            value: value.to_string(),
        })?;
        Ok(Self {
            column: caps[1].to_string(),
            row,
        })
    }
}

impl std::fmt::Display for CellRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}", self.column, self.row)
    }
}

/// One canonical field bound to a column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnBinding {
    pub field: String,
    pub column: String,
    pub expected_header: String,
}

/// Immutable, validated layout of a branch workbook.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SchemaDescriptor {
    sheet_name: String,
    header_row: u32,
    anchor_cell: CellRef,
    sentinel_column: String,
    columns: Vec<ColumnBinding>,
}

impl SchemaDescriptor {
    /// Check the layout invariants and build the descriptor.
    ///
    /// Rejects an empty column list, malformed letters or references, a
    /// header row outside `1..=MAX_ROW` and any column letter bound to two
    /// fields.
    pub fn new(structure: &StructureConfig) -> ConfigResult<Self> {
        if !(1..=MAX_ROW).contains(&structure.header_row) {
            return Err(ConfigError::InvalidHeaderRow);
        }
        if structure.columns.is_empty() {
            return Err(ConfigError::NoColumns);
        }

        let anchor_cell = CellRef::parse(&structure.anchor_cell)?;
        let sentinel_column = check_column(&structure.sentinel_column)?;

        let mut seen: HashMap<&str, &str> = HashMap::new();
        let mut columns = Vec::with_capacity(structure.columns.len());
        for (field, spec) in &structure.columns {
            let column = check_column(&spec.column)?;
            if let Some(first) = seen.insert(spec.column.as_str(), field.as_str()) {
                return Err(ConfigError::DuplicateColumn {
                    column,
                    first: first.to_string(),
                    second: field.clone(),
                });
            }
            columns.push(ColumnBinding {
                field: field.clone(),
                column,
                expected_header: spec.expected_header.clone(),
            });
        }

        Ok(Self {
            sheet_name: structure.sheet_name.clone(),
            header_row: structure.header_row,
            anchor_cell,
            sentinel_column,
            columns,
        })
    }

    pub fn sheet_name(&self) -> &str {
        &self.sheet_name
    }

    pub fn header_row(&self) -> u32 {
        self.header_row
    }

    pub fn anchor_cell(&self) -> &CellRef {
        &self.anchor_cell
    }

    pub fn sentinel_column(&self) -> &str {
        &self.sentinel_column
    }

    /// Column bindings in declaration order.
    pub fn columns(&self) -> &[ColumnBinding] {
        &self.columns
    }

    pub fn binding(&self, field: &str) -> Option<&ColumnBinding> {
        self.columns.iter().find(|b| b.field == field)
    }

    pub fn has_field(&self, field: &str) -> bool {
        self.binding(field).is_some()
    }
}

fn check_column(value: &str) -> ConfigResult<String> {
    if COLUMN_RE.is_match(value) {
        Ok(value.to_string())
    } else {
        Err(ConfigError::InvalidReference {
            what: "column letter",
            value: value.to_string(),
        })
    }
}

// =============================================================================
// Column letters
// =============================================================================

/// Column letter for a 1-based index.
pub fn column_letter(mut index: u32) -> String {
    let mut letters = Vec::new();
    while index > 0 {
        let rem = ((index - 1) % 26) as u8;
        letters.push((b'A' + rem) as char);
        index = (index - 1) / 26;
    }
    letters.iter().rev().collect()
}

#[cfg(test)]
pub(crate) fn attendance_structure() -> StructureConfig {
    let columns = [
        ("mes", "C", "Mes"),
        ("diaclase", "D", "Dia Clase"),
        ("grupo", "E", "Grupo"),
        ("fechainicio", "F", "Fecha Inicio"),
        ("tipoinscrito", "G", "Tipo Inscrito"),
        ("sem1", "H", "Sem 1"),
        ("sem2", "I", "Sem 2"),
        ("sem3", "J", "Sem 3"),
        ("sem4", "K", "Sem 4"),
    ]
    .into_iter()
    .map(|(field, column, header)| {
        (
            field.to_string(),
            ColumnSpec {
                column: column.to_string(),
                expected_header: header.to_string(),
            },
        )
    })
    .collect();

    StructureConfig {
        sheet_name: "Asistencia".to_string(),
        header_row: 5,
        anchor_cell: "B2".to_string(),
        sentinel_column: "C".to_string(),
        columns,
    }
}
