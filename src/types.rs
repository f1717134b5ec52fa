use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::constants::PREFIX_COLUMNS;

/// One conflict incident as read from the event extract
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawEventRecord {
    pub event_date: NaiveDate,
    /// Canonical three-digit numeric country code
    pub iso: String,
    pub country: Option<String>,
    pub admin1: Option<String>,
    pub location: Option<String>,
    pub event_type: Option<String>,
    pub sub_event_type: Option<String>,
    pub fatalities: Option<i64>,
    pub notes: Option<String>,
}

impl RawEventRecord {
    pub fn new(event_date: NaiveDate, iso: impl Into<String>) -> Self {
        Self {
            event_date,
            iso: iso.into(),
            country: None,
            admin1: None,
            location: None,
            event_type: None,
            sub_event_type: None,
            fatalities: None,
            notes: None,
        }
    }

    pub fn year_month(&self) -> String {
        self.event_date.format("%Y-%m").to_string()
    }
}

/// One (metric, country, period) observation from the indicator extract
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawIndicatorRow {
    /// Alpha-3 code exactly as it appears in the extract
    pub ref_area: String,
    pub time_period: String,
    pub measure: String,
    pub value: Option<f64>,
}

impl RawIndicatorRow {
    pub fn new(ref_area: &str, time_period: &str, measure: &str, value: Option<f64>) -> Self {
        Self {
            ref_area: ref_area.to_string(),
            time_period: time_period.to_string(),
            measure: measure.to_string(),
            value,
        }
    }
}

/// Join key of the whole pipeline
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NormalizedKey {
    pub iso: String,
    pub year_month: String,
}

impl NormalizedKey {
    pub fn new(iso: impl Into<String>, year_month: impl Into<String>) -> Self {
        Self {
            iso: iso.into(),
            year_month: year_month.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonthlyIncidentCount {
    pub key: NormalizedKey,
    pub incidents: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WideIndicatorRow {
    pub key: NormalizedKey,
    pub values: BTreeMap<String, Option<f64>>,
}

/// Pivoted indicator table: rows in first-seen key order plus every metric name observed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WideIndicatorTable {
    pub metrics: BTreeSet<String>,
    pub rows: Vec<WideIndicatorRow>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FusedDatasetRow {
    pub iso: String,
    pub year_month: String,
    pub incidents: u64,
    pub features: BTreeMap<String, Option<f64>>,
}

impl FusedDatasetRow {
    pub fn feature(&self, name: &str) -> Option<f64> {
        self.features.get(name).copied().flatten()
    }
}

/// The fused monthly panel. `feature_names` is kept sorted; only the prefix is typed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FusedDataset {
    pub feature_names: Vec<String>,
    pub rows: Vec<FusedDatasetRow>,
}

impl FusedDataset {
    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    /// Full header in output order.
    pub fn columns(&self) -> Vec<String> {
        PREFIX_COLUMNS
            .iter()
            .map(|c| c.to_string())
            .chain(self.feature_names.iter().cloned())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountryMeta {
    pub iso: String,
    pub name: String,
}

/// Descriptive view of a single event, as handed to snapshot consumers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventSummary {
    pub year_month: String,
    pub event_date: NaiveDate,
    pub admin1: Option<String>,
    pub location: Option<String>,
    pub event_type: Option<String>,
    pub sub_event_type: Option<String>,
    pub fatalities: Option<i64>,
    pub notes: Option<String>,
}

impl From<&RawEventRecord> for EventSummary {
    fn from(record: &RawEventRecord) -> Self {
        Self {
            year_month: record.year_month(),
            event_date: record.event_date,
            admin1: record.admin1.clone(),
            location: record.location.clone(),
            event_type: record.event_type.clone(),
            sub_event_type: record.sub_event_type.clone(),
            fatalities: record.fatalities,
            notes: record.notes.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventSnapshot {
    pub iso: String,
    pub country: String,
    pub start: String,
    pub end: String,
    pub events: Vec<EventSummary>,
}
