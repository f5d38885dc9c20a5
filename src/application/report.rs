// Report view - readings within a date range
use crate::domain::image::extract_file_id;
use crate::domain::record::CanonicalRecord;
use crate::domain::working_set::WorkingSet;
use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub from: NaiveDate,
    pub to: NaiveDate,
}

impl DateRange {
    /// First of the current month through today
    pub fn default_for(today: NaiveDate) -> Self {
        Self {
            from: today.with_day(1).unwrap_or(today),
            to: today,
        }
    }

    fn start(&self) -> NaiveDateTime {
        self.from.and_time(NaiveTime::MIN)
    }

    fn end(&self) -> NaiveDateTime {
        self.to
            .and_hms_milli_opt(23, 59, 59, 999)
            .unwrap_or_else(|| self.to.and_time(NaiveTime::MIN))
    }

    pub fn contains(&self, timestamp: &NaiveDateTime) -> bool {
        *timestamp >= self.start() && *timestamp <= self.end()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportRow {
    #[serde(flatten)]
    pub record: CanonicalRecord,
    pub image_id: Option<String>,
}

/// Records inside the range, still latest first
pub fn filter_by_date_range(set: &WorkingSet, range: DateRange) -> Vec<CanonicalRecord> {
    set.records()
        .iter()
        .filter(|r| range.contains(&r.timestamp))
        .cloned()
        .collect()
}

pub fn report_rows(records: Vec<CanonicalRecord>) -> Vec<ReportRow> {
    records
        .into_iter()
        .map(|record| {
            let image_id = record
                .image
                .as_deref()
                .and_then(extract_file_id)
                .map(str::to_string);
            ReportRow { record, image_id }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Local;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 11, d).unwrap()
    }

    #[test]
    fn test_range_bounds_are_inclusive_whole_days() {
        let set = WorkingSet::new(
            vec![
                CanonicalRecord::new("A", day(10).and_hms_milli_opt(23, 59, 59, 999).unwrap(), 1.0),
                CanonicalRecord::new("A", day(5).and_hms_opt(0, 0, 0).unwrap(), 2.0),
                CanonicalRecord::new("A", day(4).and_hms_opt(23, 59, 59).unwrap(), 3.0),
                CanonicalRecord::new("A", day(11).and_hms_opt(0, 0, 0).unwrap(), 4.0),
            ],
            Local::now(),
        );

        let rows = filter_by_date_range(&set, DateRange { from: day(5), to: day(10) });
        let quantities: Vec<f64> = rows.iter().map(|r| r.quantity).collect();
        assert_eq!(quantities, vec![1.0, 2.0]);
    }

    #[test]
    fn test_default_range_starts_on_first_of_month() {
        let range = DateRange::default_for(day(17));
        assert_eq!(range.from, day(1));
        assert_eq!(range.to, day(17));
    }

    #[test]
    fn test_rows_carry_image_id() {
        let record = CanonicalRecord::new("A", day(1).and_hms_opt(8, 0, 0).unwrap(), 1.0)
            .with_passthrough(
                Some("Somchai".to_string()),
                Some("https://drive.google.com/file/d/img42/view".to_string()),
            );
        let rows = report_rows(vec![record]);
        assert_eq!(rows[0].image_id.as_deref(), Some("img42"));
    }
}
