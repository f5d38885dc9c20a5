// Reading records - untrusted rows from the sheet and their canonical form
use chrono::NaiveDateTime;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// A row as the remote sheet returns it. Only the gas name, date, time and
/// remaining amount are interpreted; everything else is carried through.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawRecord {
    #[serde(
        rename = "GasName",
        alias = "Gas Name",
        default,
        deserialize_with = "lenient_string"
    )]
    pub gas_name: String,
    #[serde(rename = "Date", default)]
    pub date: Value,
    #[serde(rename = "Time", default)]
    pub time: Value,
    #[serde(rename = "Remain", default)]
    pub remain: Value,
    #[serde(
        rename = "Image",
        default,
        deserialize_with = "lenient_opt_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub image: Option<String>,
    #[serde(
        rename = "EmployeeName",
        alias = "Employee Name",
        default,
        deserialize_with = "lenient_opt_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub employee_name: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A validated reading. Built only when both timestamp and quantity parsed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CanonicalRecord {
    pub substance: String,
    pub timestamp: NaiveDateTime,
    pub quantity: f64,
    pub employee_name: Option<String>,
    pub image: Option<String>,
}

impl CanonicalRecord {
    pub fn new(substance: impl Into<String>, timestamp: NaiveDateTime, quantity: f64) -> Self {
        Self {
            substance: substance.into().trim().to_string(),
            timestamp,
            quantity,
            employee_name: None,
            image: None,
        }
    }

    pub fn with_passthrough(mut self, employee_name: Option<String>, image: Option<String>) -> Self {
        self.employee_name = employee_name;
        self.image = image;
        self
    }
}

impl From<&CanonicalRecord> for RawRecord {
    // Emits the ISO instant form for both date and time, which parses back to
    // the same wall-clock timestamp.
    fn from(record: &CanonicalRecord) -> Self {
        let stamp = record.timestamp.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string();
        RawRecord {
            gas_name: record.substance.clone(),
            date: Value::String(stamp.clone()),
            time: Value::String(stamp),
            remain: Value::from(record.quantity),
            image: record.image.clone(),
            employee_name: record.employee_name.clone(),
            extra: Map::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Rejection {
    #[error("unparseable date {date:?} (time {time:?})")]
    UnparseableDate { date: String, time: String },
    #[error("unparseable quantity {0:?}")]
    UnparseableQuantity(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ParseOutcome {
    Parsed(CanonicalRecord),
    Rejected(Rejection),
}

/// Renders any JSON scalar as text; `null` has no text form.
pub fn value_to_string(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

fn lenient_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(value_to_string(&value).unwrap_or_default())
}

fn lenient_opt_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(value_to_string(&value).filter(|s| !s.is_empty()))
}
