//! Structural check of a workbook against a [`SchemaDescriptor`].

use crate::error::StructuralValidationError;
use crate::parser::{Sheet, Workbook};

use super::SchemaDescriptor;

/// A sheet that passed validation, with the branch name it declares.
pub struct ValidatedSheet<'a> {
    pub sheet: Sheet<'a>,
    /// Anchor cell text, untrimmed.
    pub branch: String,
}

/// Check sheet presence, the anchor cell and every declared header.
///
/// Header text must match exactly: no trimming, no case folding.
/// Columns are checked in declaration order and the first mismatch wins.
pub fn validate<'a>(
    workbook: &'a Workbook,
    descriptor: &SchemaDescriptor,
) -> Result<ValidatedSheet<'a>, StructuralValidationError> {
    let sheet = workbook
        .sheet(descriptor.sheet_name())
        .ok_or_else(|| StructuralValidationError::MissingSheet {
            sheet: descriptor.sheet_name().to_string(),
        })?;

    let anchor = descriptor.anchor_cell();
    let branch = sheet.text(&anchor.column, anchor.row);
    if branch.is_empty() {
        return Err(StructuralValidationError::MissingAnchor {
            cell: anchor.to_string(),
        });
    }

    for binding in descriptor.columns() {
        let found = sheet.text(&binding.column, descriptor.header_row());
        if found != binding.expected_header {
            return Err(StructuralValidationError::ColumnMismatch {
                column: binding.column.clone(),
                field: binding.field.clone(),
                expected: binding.expected_header.clone(),
                found,
            });
        }
    }

    Ok(ValidatedSheet { sheet, branch })
}
