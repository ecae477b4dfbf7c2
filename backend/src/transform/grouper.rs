//! Group transformed records into the consolidated table.
//!
//! # Architecture
//!
//! ```text
//! AttendanceRecords                         AggregatedRows
//! ┌──────────────────────────────┐          ┌──────────────────────────────┐
//! │ North, Ene, Lun, G1, sem1: P │          │ North, Ene, Lun, G1          │
//! │ North, Ene, Lun, G1, sem1: P │   →      │   week1Count: 2              │
//! │ South, Ene, Mar, G4, sem1: X │          ├──────────────────────────────┤
//! └──────────────────────────────┘          │ South, Ene, Mar, G4          │
//!                                           │   week1Count: 0              │
//!                                           └──────────────────────────────┘
//! ```
//!
//! Groups are emitted in first-seen order so identical inputs give
//! identical, diffable outputs.

use indexmap::IndexMap;
use std::cmp::Ordering;

use crate::error::AggregationError;
use crate::models::{AggregatedRow, AttendanceRecord, CellKey, CellValue, WEEKS};

/// Grouping key: (branch, month, class day, group).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct GroupKey {
    branch: String,
    month: CellKey,
    class_day: CellKey,
    group_id: CellKey,
}

impl GroupKey {
    fn of(record: &AttendanceRecord) -> Self {
        Self {
            branch: record.branch.clone(),
            month: CellKey::from(&record.month),
            class_day: CellKey::from(&record.class_day),
            group_id: CellKey::from(&record.group_id),
        }
    }
}

/// Aggregate records using the presence marker `"P"`.
pub fn aggregate(records: &[AttendanceRecord]) -> Result<Vec<AggregatedRow>, AggregationError> {
    aggregate_with_marker(records, "P")
}

/// Aggregate records, counting weekly markers equal to `presence_marker`.
///
/// Fails only when there is nothing to aggregate; odd markers simply
/// count zero.
pub fn aggregate_with_marker(
    records: &[AttendanceRecord],
    presence_marker: &str,
) -> Result<Vec<AggregatedRow>, AggregationError> {
    if records.is_empty() {
        return Err(AggregationError::EmptyInput);
    }

    let mut groups: IndexMap<GroupKey, GroupBuilder> = IndexMap::new();
    for record in records {
        groups
            .entry(GroupKey::of(record))
            .or_insert_with(|| GroupBuilder::new(record))
            .add(record, presence_marker);
    }

    Ok(groups.into_values().map(GroupBuilder::build).collect())
}

/// Accumulator for one group.
struct GroupBuilder {
    branch: String,
    month: CellValue,
    class_day: CellValue,
    group_id: CellValue,
    start_date: Option<CellValue>,
    enrollment_type: Option<CellValue>,
    weeks: [u32; WEEKS],
}

impl GroupBuilder {
    fn new(first: &AttendanceRecord) -> Self {
        Self {
            branch: first.branch.clone(),
            month: first.month.clone(),
            class_day: first.class_day.clone(),
            group_id: first.group_id.clone(),
            start_date: None,
            enrollment_type: None,
            weeks: [0; WEEKS],
        }
    }

    fn add(&mut self, record: &AttendanceRecord, presence_marker: &str) {
        // latest start date wins
        if let Some(date) = &record.start_date {
            let newer = match &self.start_date {
                Some(current) => date.cmp_chronological(current) == Ordering::Greater,
                None => true,
            };
            if newer {
                self.start_date = Some(date.clone());
            }
        }

        // first enrollment type wins
        if self.enrollment_type.is_none() {
            self.enrollment_type = record.enrollment_type.clone();
        }

        for (week, count) in self.weeks.iter_mut().enumerate() {
            if record.marker(week).is_some_and(|m| m.is_text(presence_marker)) {
                *count += 1;
            }
        }
    }

    fn build(self) -> AggregatedRow {
        let [week1_count, week2_count, week3_count, week4_count] = self.weeks;
        AggregatedRow {
            branch: self.branch,
            month: self.month,
            class_day: self.class_day,
            start_date: self.start_date,
            group_id: self.group_id,
            enrollment_type: self.enrollment_type,
            week1_count,
            week2_count,
            week3_count,
            week4_count,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(s: &str) -> CellValue {
        CellValue::Text(s.to_string())
    }

    fn rec(branch: &str, group: f64, week1: Option<CellValue>) -> AttendanceRecord {
        AttendanceRecord {
            branch: branch.to_string(),
            month: text("Enero"),
            class_day: text("Lunes"),
            group_id: CellValue::Number(group),
            start_date: None,
            enrollment_type: Some(text("Inscrito")),
            weekly_markers: vec![week1, None, None, None],
        }
    }

    #[test]
    fn test_empty_input_is_fatal() {
        assert_eq!(aggregate(&[]), Err(AggregationError::EmptyInput));
    }

    #[test]
    fn test_groups_in_first_seen_order() {
        let records = vec![
            rec("South", 2.0, None),
            rec("North", 1.0, None),
            rec("South", 2.0, None),
            rec("Central", 1.0, None),
        ];
        let rows = aggregate(&records).unwrap();
        let branches: Vec<_> = rows.iter().map(|r| r.branch.as_str()).collect();
        assert_eq!(branches, vec!["South", "North", "Central"]);
    }

    #[test]
    fn test_week_counts_exact_match() {
        let records = vec![
            rec("North", 1.0, Some(text("P"))),
            rec("North", 1.0, Some(text("P"))),
            rec("North", 1.0, Some(text("p"))),
            rec("North", 1.0, Some(text("X"))),
            rec("North", 1.0, Some(CellValue::Number(1.0))),
            rec("North", 1.0, None),
        ];
        let rows = aggregate(&records).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].week_counts(), [2, 0, 0, 0]);
    }

    #[test]
    fn test_missing_week_columns_count_zero() {
        let mut short = rec("North", 1.0, Some(text("P")));
        short.weekly_markers.truncate(1);
        let mut none = rec("North", 1.0, None);
        none.weekly_markers.clear();
        let rows = aggregate(&[short, none]).unwrap();
        assert_eq!(rows[0].week_counts(), [1, 0, 0, 0]);
    }

    #[test]
    fn test_week_counts_order_independent() {
        let mut records = vec![
            rec("North", 1.0, Some(text("P"))),
            rec("North", 1.0, Some(text("A"))),
            rec("North", 1.0, Some(text("P"))),
        ];
        let forward = aggregate(&records).unwrap();
        records.reverse();
        let backward = aggregate(&records).unwrap();
        assert_eq!(forward[0].week_counts(), backward[0].week_counts());
    }

    #[test]
    fn test_start_date_max_order_independent() {
        let mut a = rec("North", 1.0, None);
        a.start_date = Some(CellValue::Number(45300.0));
        let mut b = rec("North", 1.0, None);
        b.start_date = Some(text("2024-03-01"));
        let mut c = rec("North", 1.0, None);
        c.start_date = None;

        let forward = aggregate(&[a.clone(), b.clone(), c.clone()]).unwrap();
        let backward = aggregate(&[c, b, a]).unwrap();
        assert_eq!(forward[0].start_date, Some(text("2024-03-01")));
        assert_eq!(forward[0].start_date, backward[0].start_date);
    }

    #[test]
    fn test_start_date_max_with_plain_text_order_independent() {
        let dates = [
            CellValue::Number(50000.0),
            text("1 ene"),
            text("2024-03-01"),
        ];
        let records: Vec<_> = dates
            .iter()
            .map(|d| {
                let mut r = rec("North", 1.0, None);
                r.start_date = Some(d.clone());
                r
            })
            .collect();
        let mut reversed = records.clone();
        reversed.reverse();

        let forward = aggregate(&records).unwrap();
        let backward = aggregate(&reversed).unwrap();
        assert_eq!(forward[0].start_date, Some(text("1 ene")));
        assert_eq!(forward[0].start_date, backward[0].start_date);
    }

    #[test]
    fn test_enrollment_type_first_wins_order_dependent() {
        let mut a = rec("North", 1.0, None);
        a.enrollment_type = Some(text("Inscrito"));
        let mut b = rec("North", 1.0, None);
        b.enrollment_type = Some(text("Becado"));

        let forward = aggregate(&[a.clone(), b.clone()]).unwrap();
        let backward = aggregate(&[b, a]).unwrap();
        assert_eq!(forward[0].enrollment_type, Some(text("Inscrito")));
        assert_eq!(backward[0].enrollment_type, Some(text("Becado")));
    }

    #[test]
    fn test_enrollment_type_skips_empty() {
        let mut a = rec("North", 1.0, None);
        a.enrollment_type = None;
        let b = rec("North", 1.0, None);
        let rows = aggregate(&[a, b]).unwrap();
        assert_eq!(rows[0].enrollment_type, Some(text("Inscrito")));
    }

    #[test]
    fn test_custom_presence_marker() {
        let records = vec![rec("North", 1.0, Some(text("A"))), rec("North", 1.0, Some(text("P")))];
        let rows = aggregate_with_marker(&records, "A").unwrap();
        assert_eq!(rows[0].week1_count, 1);
    }
}
