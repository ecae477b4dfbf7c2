//! Business rules applied to an extracted batch.
//!
//! Drops provisional enrollments and rows with an empty grouping key, then
//! maps the descriptor's field names onto the output field set declared in
//! the `transform.field_map` config.

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult, MalformedRecordError};
use crate::models::{AttendanceRecord, CanonicalRecord, CellValue, WEEKS};
use crate::schema::SchemaDescriptor;

/// Enrollment type that marks a not-yet-confirmed student.
pub const DEFAULT_EXCLUDED_ENROLLMENT: &str = "Pre-Inscrito";

/// Output field → descriptor field name.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct FieldMap {
    pub month: String,
    pub class_day: String,
    pub group_id: String,
    pub start_date: String,
    pub enrollment_type: String,
    /// Weekly marker fields, in week order. At most four.
    pub weeks: Vec<String>,
}

impl Default for FieldMap {
    fn default() -> Self {
        Self {
            month: "mes".to_string(),
            class_day: "diaclase".to_string(),
            group_id: "grupo".to_string(),
            start_date: "fechainicio".to_string(),
            enrollment_type: "tipoinscrito".to_string(),
            weeks: (1..=WEEKS).map(|w| format!("sem{}", w)).collect(),
        }
    }
}

/// Filtering and mapping rules from the `transform` config section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TransformRules {
    pub excluded_enrollment_type: String,
    /// Weekly marker that counts as attendance. Matched exactly.
    pub presence_marker: String,
    pub field_map: FieldMap,
}

impl Default for TransformRules {
    fn default() -> Self {
        Self {
            excluded_enrollment_type: DEFAULT_EXCLUDED_ENROLLMENT.to_string(),
            presence_marker: "P".to_string(),
            field_map: FieldMap::default(),
        }
    }
}

impl TransformRules {
    /// Check the field map against the descriptor.
    ///
    /// Required fields must be bound; week fields may be left unbound and
    /// then simply count zero.
    pub fn check(&self, descriptor: &SchemaDescriptor) -> ConfigResult<()> {
        let map = &self.field_map;
        if map.weeks.len() > WEEKS {
            return Err(ConfigError::InvalidFieldMap(format!(
                "{} week fields mapped, at most {} allowed",
                map.weeks.len(),
                WEEKS
            )));
        }
        for field in [&map.month, &map.class_day, &map.group_id, &map.enrollment_type] {
            if !descriptor.has_field(field) {
                return Err(ConfigError::InvalidFieldMap(format!(
                    "field '{}' is not declared in the workbook structure",
                    field
                )));
            }
        }
        Ok(())
    }
}

/// Records of one branch after filtering and mapping.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransformedBatch {
    pub branch: String,
    pub records: Vec<AttendanceRecord>,
    /// Records dropped as provisional enrollments.
    pub filtered: usize,
    /// Records dropped because a grouping-key cell was empty.
    pub skipped: Vec<SkippedRecord>,
}

/// A row left out of aggregation for an empty grouping-key cell.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SkippedRecord {
    pub row: u32,
    pub field: String,
}

/// Filter and map a batch.
///
/// A record with an empty month, class day or group is set aside in
/// `skipped`. A record missing one of the required fields altogether rejects
/// the whole batch. Nothing outside the arguments is read or written.
pub fn transform(
    records: &[CanonicalRecord],
    branch: &str,
    rules: &TransformRules,
) -> Result<TransformedBatch, MalformedRecordError> {
    let map = &rules.field_map;
    let mut out = Vec::with_capacity(records.len());
    let mut filtered = 0;
    let mut skipped = Vec::new();

    for record in records {
        let enrollment_type = required(record, &map.enrollment_type)?;
        let month = required(record, &map.month)?;
        let class_day = required(record, &map.class_day)?;
        let group_id = required(record, &map.group_id)?;

        if enrollment_type.is_some_and(|v| v.is_text(&rules.excluded_enrollment_type)) {
            filtered += 1;
            continue;
        }

        let (Some(month), Some(class_day), Some(group_id)) = (month, class_day, group_id) else {
            let field = if month.is_none() {
                &map.month
            } else if class_day.is_none() {
                &map.class_day
            } else {
                &map.group_id
            };
            skipped.push(SkippedRecord {
                row: record.row,
                field: field.clone(),
            });
            continue;
        };

        out.push(AttendanceRecord {
            branch: branch.to_string(),
            month: month.clone(),
            class_day: class_day.clone(),
            group_id: group_id.clone(),
            start_date: optional(record, &map.start_date),
            enrollment_type: enrollment_type.cloned(),
            weekly_markers: map.weeks.iter().map(|f| optional(record, f)).collect(),
        });
    }

    Ok(TransformedBatch {
        branch: branch.to_string(),
        records: out,
        filtered,
        skipped,
    })
}

fn required<'r>(
    record: &'r CanonicalRecord,
    field: &str,
) -> Result<Option<&'r CellValue>, MalformedRecordError> {
    record
        .field(field)
        .ok_or_else(|| MalformedRecordError::MissingField {
            row: record.row,
            field: field.to_string(),
        })
}

fn optional(record: &CanonicalRecord, field: &str) -> Option<CellValue> {
    record.field(field).flatten().cloned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use indexmap::IndexMap;

    fn text(s: &str) -> Option<CellValue> {
        Some(CellValue::Text(s.to_string()))
    }

    fn record(row: u32, tipo: Option<CellValue>, sem1: Option<CellValue>) -> CanonicalRecord {
        let mut fields = IndexMap::new();
        fields.insert("mes".to_string(), text("Enero"));
        fields.insert("diaclase".to_string(), text("Lunes"));
        fields.insert("grupo".to_string(), Some(CellValue::Number(1.0)));
        fields.insert("fechainicio".to_string(), Some(CellValue::Number(45300.0)));
        fields.insert("tipoinscrito".to_string(), tipo);
        fields.insert("sem1".to_string(), sem1);
        CanonicalRecord {
            branch: "stale".to_string(),
            row,
            fields,
        }
    }

    #[test]
    fn test_pre_inscrito_filtered() {
        let records = vec![
            record(6, text("Inscrito"), text("P")),
            record(7, text("Pre-Inscrito"), text("P")),
            record(8, None, text("X")),
        ];
        let batch = transform(&records, "North", &TransformRules::default()).unwrap();
        assert_eq!(batch.records.len(), 2);
        assert_eq!(batch.filtered, 1);
        assert!(batch
            .records
            .iter()
            .all(|r| r.enrollment_type.as_ref().map(|v| v.is_text("Pre-Inscrito")) != Some(true)));
    }

    #[test]
    fn test_filter_is_exact_match() {
        let records = vec![record(6, text("pre-inscrito"), None)];
        let batch = transform(&records, "North", &TransformRules::default()).unwrap();
        assert_eq!(batch.records.len(), 1);
    }

    #[test]
    fn test_fields_mapped_and_branch_reattached() {
        let records = vec![record(6, text("Inscrito"), text("P"))];
        let batch = transform(&records, "North", &TransformRules::default()).unwrap();
        let r = &batch.records[0];
        assert_eq!(r.branch, "North");
        assert_eq!(r.month, CellValue::Text("Enero".into()));
        assert_eq!(r.group_id, CellValue::Number(1.0));
        assert_eq!(r.start_date, Some(CellValue::Number(45300.0)));
        assert_eq!(r.marker(0), Some(&CellValue::Text("P".into())));
        // sem2..sem4 are not on the record
        assert_eq!(r.weekly_markers.len(), 4);
        assert_eq!(r.marker(3), None);
    }

    #[test]
    fn test_missing_required_field_rejects_batch() {
        let mut broken = record(7, text("Inscrito"), None);
        broken.fields.shift_remove("grupo");
        let records = vec![record(6, text("Inscrito"), None), broken];
        let err = transform(&records, "North", &TransformRules::default()).unwrap_err();
        assert_eq!(
            err,
            MalformedRecordError::MissingField {
                row: 7,
                field: "grupo".into()
            }
        );
    }

    #[test]
    fn test_empty_key_field_skips_only_that_record() {
        let mut blank = record(7, text("Inscrito"), text("P"));
        blank.fields.insert("diaclase".into(), None);
        let records = vec![record(6, text("Inscrito"), text("P")), blank];

        let batch = transform(&records, "North", &TransformRules::default()).unwrap();
        assert_eq!(batch.records.len(), 1);
        assert_eq!(batch.records[0].marker(0), Some(&CellValue::Text("P".into())));
        assert_eq!(
            batch.skipped,
            vec![SkippedRecord {
                row: 7,
                field: "diaclase".into()
            }]
        );
    }

    #[test]
    fn test_provisional_row_with_blank_key_counts_as_filtered() {
        let mut blank = record(6, text("Pre-Inscrito"), None);
        blank.fields.insert("grupo".into(), None);
        let batch = transform(&[blank], "North", &TransformRules::default()).unwrap();
        assert_eq!(batch.filtered, 1);
        assert!(batch.skipped.is_empty());
    }

    #[test]
    fn test_transform_is_deterministic() {
        let records = vec![
            record(6, text("Inscrito"), text("P")),
            record(7, text("Pre-Inscrito"), None),
        ];
        let rules = TransformRules::default();
        let a = transform(&records, "North", &rules).unwrap();
        let b = transform(&records, "North", &rules).unwrap();
        assert_eq!(a.records, b.records);
        assert_eq!(a.filtered, b.filtered);
    }

    #[test]
    fn test_rules_check_against_descriptor() {
        let descriptor =
            SchemaDescriptor::new(&crate::schema::attendance_structure()).unwrap();
        assert!(TransformRules::default().check(&descriptor).is_ok());

        let mut rules = TransformRules::default();
        rules.field_map.group_id = "seccion".into();
        assert!(rules.check(&descriptor).is_err());

        let mut rules = TransformRules::default();
        rules.field_map.weeks.push("sem5".into());
        assert!(rules.check(&descriptor).is_err());
    }
}
