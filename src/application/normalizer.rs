// Record normalizer - turns loosely typed sheet rows into canonical readings
use crate::domain::record::{
    CanonicalRecord, ParseOutcome, RawRecord, Rejection, value_to_string,
};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Timelike, Utc};
use serde_json::Value;

const DATE_TIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y/%m/%d %H:%M:%S",
];

const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%d %B %Y",
    "%d %b %Y",
    "%B %d, %Y",
    "%b %d, %Y",
];

const TIME_FORMATS: &[&str] = &["%H:%M:%S%.f", "%H:%M", "%I:%M:%S %p", "%I:%M %p"];

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Normalized {
    /// Latest first
    pub records: Vec<CanonicalRecord>,
    pub rejected: usize,
}

/// Parse every row, drop the ones without a usable timestamp or quantity,
/// and order the rest latest first.
pub fn normalize(raw: &[RawRecord]) -> Normalized {
    let mut records = Vec::with_capacity(raw.len());
    let mut rejected = 0;

    for row in raw {
        match parse_record(row) {
            ParseOutcome::Parsed(record) => records.push(record),
            ParseOutcome::Rejected(reason) => {
                tracing::debug!("Dropping row for {:?}: {}", row.gas_name, reason);
                rejected += 1;
            }
        }
    }

    records.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    Normalized { records, rejected }
}

pub fn parse_record(row: &RawRecord) -> ParseOutcome {
    let Some(timestamp) = parse_date_time(&row.date, &row.time) else {
        return ParseOutcome::Rejected(Rejection::UnparseableDate {
            date: value_to_string(&row.date).unwrap_or_default(),
            time: value_to_string(&row.time).unwrap_or_default(),
        });
    };
    let Some(quantity) = parse_quantity(&row.remain) else {
        return ParseOutcome::Rejected(Rejection::UnparseableQuantity(
            value_to_string(&row.remain).unwrap_or_default(),
        ));
    };

    ParseOutcome::Parsed(
        CanonicalRecord::new(row.gas_name.as_str(), timestamp, quantity)
            .with_passthrough(row.employee_name.clone(), row.image.clone()),
    )
}

/// Date first, then the time of day merged on top of it. A time that does
/// not parse leaves the date-only value.
pub fn parse_date_time(date: &Value, time: &Value) -> Option<NaiveDateTime> {
    let date = parse_date(date)?;
    let combined = match parse_time(time) {
        Some(t) => date.date().and_time(t),
        None => date,
    };
    Some(truncate_to_millis(combined))
}

fn parse_date(value: &Value) -> Option<NaiveDateTime> {
    if let Value::Number(n) = value {
        return n
            .as_i64()
            .and_then(DateTime::<Utc>::from_timestamp_millis)
            .map(|dt| dt.naive_utc());
    }

    let text = value_to_string(value)?;
    let text = text.trim();
    let token = text.split_whitespace().next()?;

    if token.contains('T') && token.ends_with('Z') {
        if let Ok(dt) = DateTime::parse_from_rfc3339(token) {
            return Some(dt.naive_utc());
        }
    } else if token.contains('/') {
        if let Some(date) = parse_month_day_year(token) {
            return Some(date.and_time(NaiveTime::MIN));
        }
    }

    parse_generic_date(text)
}

fn parse_month_day_year(token: &str) -> Option<NaiveDate> {
    let parts: Vec<&str> = token.split('/').collect();
    let [month, day, year] = parts.as_slice() else {
        return None;
    };

    let month = leading_int(month)?;
    let day = leading_int(day)?;
    let mut year = leading_int(year)?;
    if (0..100).contains(&year) {
        year += 2000;
    }

    NaiveDate::from_ymd_opt(
        i32::try_from(year).ok()?,
        u32::try_from(month).ok()?,
        u32::try_from(day).ok()?,
    )
}

fn parse_generic_date(text: &str) -> Option<NaiveDateTime> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        // Keep the wall clock as written
        return Some(dt.naive_local());
    }
    DATE_TIME_FORMATS
        .iter()
        .find_map(|f| NaiveDateTime::parse_from_str(text, f).ok())
        .or_else(|| {
            DATE_FORMATS
                .iter()
                .find_map(|f| NaiveDate::parse_from_str(text, f).ok())
                .map(|d| d.and_time(NaiveTime::MIN))
        })
}

fn parse_time(value: &Value) -> Option<NaiveTime> {
    if let Value::Number(n) = value {
        return n
            .as_i64()
            .and_then(DateTime::<Utc>::from_timestamp_millis)
            .map(|dt| dt.naive_utc().time());
    }

    let text = value_to_string(value)?;
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.naive_utc().time());
    }
    DATE_TIME_FORMATS
        .iter()
        .find_map(|f| NaiveDateTime::parse_from_str(text, f).ok())
        .map(|dt| dt.time())
        .or_else(|| {
            TIME_FORMATS
                .iter()
                .find_map(|f| NaiveTime::parse_from_str(text, f).ok())
        })
}

fn truncate_to_millis(ts: NaiveDateTime) -> NaiveDateTime {
    let nanos = ts.nanosecond() / 1_000_000 * 1_000_000;
    ts.with_nanosecond(nanos).unwrap_or(ts)
}

/// Numbers pass through; strings parse their leading numeric prefix, so
/// "5937 kg" reads as 5937. Non-finite results are rejected.
pub fn parse_quantity(value: &Value) -> Option<f64> {
    let quantity = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => parse_leading_float(s),
        _ => None,
    }?;
    quantity.is_finite().then_some(quantity)
}

fn parse_leading_float(text: &str) -> Option<f64> {
    let s = text.trim_start();
    let bytes = s.as_bytes();
    let mut end = 0;

    if matches!(bytes.first(), Some(b'+' | b'-')) {
        end += 1;
    }
    let int_start = end;
    while end < bytes.len() && bytes[end].is_ascii_digit() {
        end += 1;
    }
    let mut digits = end - int_start;
    if end < bytes.len() && bytes[end] == b'.' {
        let frac_start = end + 1;
        let mut frac_end = frac_start;
        while frac_end < bytes.len() && bytes[frac_end].is_ascii_digit() {
            frac_end += 1;
        }
        digits += frac_end - frac_start;
        end = frac_end;
    }
    if digits == 0 {
        return None;
    }

    if end < bytes.len() && matches!(bytes[end], b'e' | b'E') {
        let mut exp_end = end + 1;
        if matches!(bytes.get(exp_end), Some(b'+' | b'-')) {
            exp_end += 1;
        }
        let exp_digits_start = exp_end;
        while exp_end < bytes.len() && bytes[exp_end].is_ascii_digit() {
            exp_end += 1;
        }
        if exp_end > exp_digits_start {
            end = exp_end;
        }
    }

    s[..end].parse().ok()
}

fn leading_int(text: &str) -> Option<i64> {
    let s = text.trim_start();
    let end = s
        .char_indices()
        .find(|&(i, c)| !(c.is_ascii_digit() || (i == 0 && (c == '-' || c == '+'))))
        .map(|(i, _)| i)
        .unwrap_or(s.len());
    s[..end].parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Datelike;
    use serde_json::json;

    fn row(gas: &str, date: Value, time: Value, remain: Value) -> RawRecord {
        RawRecord {
            gas_name: gas.to_string(),
            date,
            time,
            remain,
            ..Default::default()
        }
    }

    #[test]
    fn test_oxygen_scenario() {
        let raw: Vec<RawRecord> = serde_json::from_value(json!([{
            "GasName": "Oxygen (O₂)",
            "Date": "11/05/2024",
            "Time": "2024-01-01T08:30:00Z",
            "Remain": "5937"
        }]))
        .unwrap();

        let out = normalize(&raw);
        assert_eq!(out.records.len(), 1);
        let record = &out.records[0];
        assert_eq!(record.quantity, 5937.0);
        assert_eq!(record.timestamp.day(), 5);
        assert_eq!(record.timestamp.month0(), 10);
        assert_eq!(record.timestamp.hour(), 8);
        assert_eq!(record.timestamp.minute(), 30);
    }

    #[test]
    fn test_iso_date_with_separate_time() {
        let ts = parse_date_time(
            &json!("2024-11-05T17:00:00.000Z"),
            &json!("1899-12-30T06:15:42.123Z"),
        )
        .unwrap();
        assert_eq!(ts.to_string(), "2024-11-05 06:15:42.123");
    }

    #[test]
    fn test_date_only_kept_when_time_unparseable() {
        let ts = parse_date_time(&json!("3/7/2025 extra"), &json!("not a time")).unwrap();
        assert_eq!(ts.to_string(), "2025-03-07 00:00:00");
    }

    #[test]
    fn test_generic_fallback_formats() {
        let ts = parse_date_time(&json!("2024-02-29 13:45:00"), &Value::Null).unwrap();
        assert_eq!(ts.to_string(), "2024-02-29 13:45:00");

        let ts = parse_date_time(&json!("5 November 2024"), &json!("14:05")).unwrap();
        assert_eq!(ts.to_string(), "2024-11-05 14:05:00");
    }

    #[test]
    fn test_invalid_slash_date_rejected() {
        assert!(parse_date_time(&json!("13/45/2024"), &Value::Null).is_none());
        assert!(parse_date_time(&json!(""), &Value::Null).is_none());
        assert!(parse_date_time(&Value::Null, &json!("08:00")).is_none());
    }

    #[test]
    fn test_lenient_quantity() {
        assert_eq!(parse_quantity(&json!("5937 kg")), Some(5937.0));
        assert_eq!(parse_quantity(&json!(" -1.5e2x")), Some(-150.0));
        assert_eq!(parse_quantity(&json!(".5")), Some(0.5));
        assert_eq!(parse_quantity(&json!(12)), Some(12.0));
        assert_eq!(parse_quantity(&json!("abc")), None);
        assert_eq!(parse_quantity(&json!("")), None);
        assert_eq!(parse_quantity(&Value::Null), None);
        assert_eq!(parse_quantity(&json!(true)), None);
    }

    #[test]
    fn test_rows_missing_timestamp_or_quantity_dropped() {
        let raw = vec![
            row("A", json!("11/05/2024"), Value::Null, json!("10")),
            row("B", json!("garbage"), Value::Null, json!("10")),
            row("C", json!("11/05/2024"), Value::Null, json!("n/a")),
        ];

        let out = normalize(&raw);
        assert_eq!(out.records.len(), 1);
        assert_eq!(out.records[0].substance, "A");
        assert_eq!(out.rejected, 2);
        assert!(matches!(
            parse_record(&raw[2]),
            ParseOutcome::Rejected(Rejection::UnparseableQuantity(_))
        ));
    }

    #[test]
    fn test_output_sorted_latest_first() {
        let raw = vec![
            row("A", json!("11/01/2024"), json!("09:00"), json!(1)),
            row("A", json!("11/03/2024"), json!("09:00"), json!(2)),
            row("B", json!("11/02/2024"), json!("23:59"), json!(3)),
            row("B", json!("11/03/2024"), json!("08:00"), json!(4)),
        ];

        let out = normalize(&raw);
        assert!(out
            .records
            .windows(2)
            .all(|w| w[0].timestamp >= w[1].timestamp));
        let quantities: Vec<f64> = out.records.iter().map(|r| r.quantity).collect();
        assert_eq!(quantities, vec![2.0, 4.0, 3.0, 1.0]);
    }

    #[test]
    fn test_normalizing_twice_drops_nothing() {
        let raw = vec![
            row(" Oxygen ", json!("11/05/2024"), json!("2024-01-01T08:30:00.250Z"), json!("5937")),
            row("Nitrogen", json!("2024-11-04T00:00:00Z"), json!("17:45:10"), json!(12.75)),
            row("Broken", json!("nope"), Value::Null, json!(1)),
        ];

        let first = normalize(&raw);
        let again: Vec<RawRecord> = first.records.iter().map(RawRecord::from).collect();
        let second = normalize(&again);

        assert_eq!(second.rejected, 0);
        assert_eq!(second.records, first.records);
    }
}
