// CSV export for spreadsheet tools
use crate::domain::record::CanonicalRecord;
use chrono::NaiveDate;

/// Excel needs the BOM to read non-ASCII text as UTF-8
const BOM: &str = "\u{FEFF}";
const HEADERS: [&str; 6] = ["Date", "Time", "Gas Name", "Remain", "Employee Name", "Image URL"];

pub const CONTENT_TYPE: &str = "text/csv; charset=utf-8";

/// Text fields are double-quoted, the amount is written raw.
pub fn build_csv(records: &[CanonicalRecord]) -> String {
    let mut lines = Vec::with_capacity(records.len() + 1);
    lines.push(HEADERS.join(","));

    for record in records {
        lines.push(
            [
                record.timestamp.format("%d/%m/%Y").to_string(),
                record.timestamp.format("%H:%M:%S").to_string(),
                quote(&record.substance),
                record.quantity.to_string(),
                quote(record.employee_name.as_deref().unwrap_or("")),
                quote(record.image.as_deref().unwrap_or("")),
            ]
            .join(","),
        );
    }

    format!("{}{}", BOM, lines.join("\n"))
}

pub fn export_file_name(today: NaiveDate) -> String {
    format!("report_export_{}.csv", today.format("%Y-%m-%d"))
}

fn quote(field: &str) -> String {
    format!("\"{}\"", field.replace('"', "\"\""))
}
