// Monitored substance catalog and gauge evaluation
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubstanceConfig {
    /// Display identifier, e.g. "Oxygen (O₂)"
    pub id: String,
    /// Gas name as written in the source sheet
    pub sheet_key: String,
    pub min: f64,
    pub max: f64,
    pub alarm_min: f64,
    pub unit: String,
    pub color: String,
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum CatalogError {
    #[error("duplicate substance id {0:?}")]
    DuplicateId(String),
    #[error("sheet key {key:?} is claimed by both {first:?} and {second:?}")]
    DuplicateSheetKey {
        key: String,
        first: String,
        second: String,
    },
}

/// The configured substances, in display order, with the sheet key join
/// resolved once. Keys are trimmed and matched case-sensitively.
#[derive(Debug, Clone, Default)]
pub struct SubstanceCatalog {
    entries: Vec<SubstanceConfig>,
    by_sheet_key: HashMap<String, usize>,
}

impl SubstanceCatalog {
    pub fn new(entries: Vec<SubstanceConfig>) -> Result<Self, CatalogError> {
        let mut by_sheet_key = HashMap::new();
        for (idx, entry) in entries.iter().enumerate() {
            if entries[..idx].iter().any(|e| e.id == entry.id) {
                return Err(CatalogError::DuplicateId(entry.id.clone()));
            }
            let key = entry.sheet_key.trim().to_string();
            if let Some(&prev) = by_sheet_key.get(&key) {
                let first: &SubstanceConfig = &entries[prev];
                return Err(CatalogError::DuplicateSheetKey {
                    key,
                    first: first.id.clone(),
                    second: entry.id.clone(),
                });
            }
            by_sheet_key.insert(key, idx);
        }
        Ok(Self {
            entries,
            by_sheet_key,
        })
    }

    pub fn entries(&self) -> &[SubstanceConfig] {
        &self.entries
    }

    pub fn resolve(&self, sheet_name: &str) -> Option<&SubstanceConfig> {
        self.by_sheet_key
            .get(sheet_name.trim())
            .map(|&idx| &self.entries[idx])
    }

    pub fn get(&self, id: &str) -> Option<&SubstanceConfig> {
        self.entries.iter().find(|e| e.id == id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GaugeStatus {
    Normal,
    TooLow,
    TooHigh,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GaugeReading {
    pub id: String,
    pub unit: String,
    pub color: String,
    pub value: f64,
    pub alarm_min: f64,
    pub max: f64,
    pub filled: f64,
    pub remaining: f64,
    pub status: GaugeStatus,
    pub critical: bool,
}

impl GaugeReading {
    pub fn evaluate(config: &SubstanceConfig, raw_value: f64) -> Self {
        let value = round2(raw_value);
        let filled = value.max(0.0).min(config.max);
        let remaining = round2(config.max - filled).max(0.0);

        let status = if value > config.max {
            GaugeStatus::TooHigh
        } else if value <= config.alarm_min {
            GaugeStatus::TooLow
        } else {
            GaugeStatus::Normal
        };

        Self {
            id: config.id.clone(),
            unit: config.unit.clone(),
            color: config.color.clone(),
            value,
            alarm_min: config.alarm_min,
            max: config.max,
            filled,
            remaining,
            status,
            critical: status != GaugeStatus::Normal,
        }
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
pub(crate) fn sample_catalog() -> SubstanceCatalog {
    let entry = |id: &str, key: &str, max: f64, alarm_min: f64, unit: &str| SubstanceConfig {
        id: id.to_string(),
        sheet_key: key.to_string(),
        min: 0.0,
        max,
        alarm_min,
        unit: unit.to_string(),
        color: "rgba(59, 130, 246, 1)".to_string(),
    };
    SubstanceCatalog::new(vec![
        entry("Oxygen (O₂)", "Oxygen", 5937.0, 1696.0, "Kg"),
        entry("Nitrogen (N₂)", "Nitrogen", 2500.0, 600.0, "Liter"),
        entry("Carbondioxide (CO₂)", "Carbondioxide", 18500.0, 7000.0, "Liter"),
        entry("Diesel B7", "Diesel B7", 20000.0, 7000.0, "Liter"),
    ])
    .unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_trims_but_keeps_case() {
        let catalog = sample_catalog();
        assert_eq!(catalog.resolve("  Oxygen ").map(|c| c.id.as_str()), Some("Oxygen (O₂)"));
        assert!(catalog.resolve("oxygen").is_none());
    }

    #[test]
    fn test_duplicate_sheet_key_rejected() {
        let mut entries = sample_catalog().entries().to_vec();
        let mut dup = entries[0].clone();
        dup.id = "Oxygen again".to_string();
        dup.sheet_key = " Oxygen".to_string();
        entries.push(dup);

        let err = SubstanceCatalog::new(entries).unwrap_err();
        assert!(matches!(err, CatalogError::DuplicateSheetKey { ref key, .. } if key == "Oxygen"));
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let mut entries = sample_catalog().entries().to_vec();
        let mut dup = entries[1].clone();
        dup.sheet_key = "N2".to_string();
        entries.push(dup);

        assert_eq!(
            SubstanceCatalog::new(entries).unwrap_err(),
            CatalogError::DuplicateId("Nitrogen (N₂)".to_string())
        );
    }

    #[test]
    fn test_gauge_thresholds() {
        let catalog = sample_catalog();
        let oxygen = catalog.get("Oxygen (O₂)").unwrap();

        let normal = GaugeReading::evaluate(oxygen, 3000.126);
        assert_eq!(normal.value, 3000.13);
        assert_eq!(normal.status, GaugeStatus::Normal);
        assert!(!normal.critical);
        assert_eq!(normal.remaining, 2936.87);

        let low = GaugeReading::evaluate(oxygen, 1696.0);
        assert_eq!(low.status, GaugeStatus::TooLow);
        assert!(low.critical);

        let high = GaugeReading::evaluate(oxygen, 6000.0);
        assert_eq!(high.status, GaugeStatus::TooHigh);
        assert_eq!(high.filled, 5937.0);
        assert_eq!(high.remaining, 0.0);

        let negative = GaugeReading::evaluate(oxygen, -5.0);
        assert_eq!(negative.filled, 0.0);
        assert_eq!(negative.status, GaugeStatus::TooLow);
    }
}
