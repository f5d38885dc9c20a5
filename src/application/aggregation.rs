// Aggregation engine - derived views over the working set
use crate::domain::record::CanonicalRecord;
use crate::domain::series::{MonthlySeries, YearMonth};
use crate::domain::substance::{GaugeReading, SubstanceCatalog};
use crate::domain::working_set::WorkingSet;
use chrono::{Datelike, NaiveDate};
use std::collections::{BTreeMap, HashMap};

/// First record per substance in a latest-first scan. Later records for the
/// same substance never overwrite it.
pub fn latest_readings(set: &WorkingSet) -> HashMap<&str, &CanonicalRecord> {
    let mut latest = HashMap::new();
    for record in set.records() {
        let key = record.substance.trim();
        if !key.is_empty() {
            latest.entry(key).or_insert(record);
        }
    }
    latest
}

pub fn latest<'a>(set: &'a WorkingSet, substance: &str) -> Option<&'a CanonicalRecord> {
    let substance = substance.trim();
    set.records().iter().find(|r| r.substance.trim() == substance)
}

/// One gauge per configured substance; a substance with no reading shows zero.
pub fn gauge_readings(set: &WorkingSet, catalog: &SubstanceCatalog) -> Vec<GaugeReading> {
    let latest = latest_readings(set);
    catalog
        .entries()
        .iter()
        .map(|config| {
            let value = latest
                .get(config.sheet_key.trim())
                .map(|r| r.quantity)
                .unwrap_or(0.0);
            GaugeReading::evaluate(config, value)
        })
        .collect()
}

/// Most recent reading per calendar day for every configured substance in
/// the given month. Substances without data get an empty series.
pub fn monthly_series(
    set: &WorkingSet,
    catalog: &SubstanceCatalog,
    period: YearMonth,
) -> BTreeMap<String, MonthlySeries> {
    let mut per_day: HashMap<&str, BTreeMap<u32, f64>> = catalog
        .entries()
        .iter()
        .map(|c| (c.id.as_str(), BTreeMap::new()))
        .collect();

    for record in set.records() {
        if !period.contains(&record.timestamp) {
            continue;
        }
        let Some(config) = catalog.resolve(&record.substance) else {
            continue;
        };
        if let Some(days) = per_day.get_mut(config.id.as_str()) {
            // Scan is latest first, so the first value seen for a day wins
            days.entry(record.timestamp.day()).or_insert(record.quantity);
        }
    }

    per_day
        .into_iter()
        .map(|(id, days)| {
            let (labels, values) = days.into_iter().unzip();
            (id.to_string(), MonthlySeries { labels, values })
        })
        .collect()
}

/// Month shown when the dashboard first loads: that of the latest record,
/// or the current one when there is no data.
pub fn default_period(set: &WorkingSet, today: NaiveDate) -> YearMonth {
    match set.latest_record() {
        Some(record) => YearMonth::of(&record.timestamp),
        None => YearMonth {
            year: today.year(),
            month: today.month(),
        },
    }
}

/// Selectable years around the current one
pub fn year_options(today: NaiveDate) -> Vec<i32> {
    (today.year() - 2..=today.year() + 1).collect()
}
