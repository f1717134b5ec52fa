//! Readers for the two source extracts.
//!
//! Columns are located by header name; extra columns are ignored. A missing
//! required column is a `Schema` error, a malformed date or value an
//! `InvalidRecord` error. Event rows whose country code is not numeric are
//! dropped and counted, never raised.

use chrono::NaiveDate;
use csv::{ReaderBuilder, StringRecord, Trim};
use std::path::Path;
use tracing::{debug, info, instrument};

use crate::constants::*;
use crate::error::{PanelError, Result};
use crate::normalize::normalize_event_iso;
use crate::observability::metrics::{self, MetricName};
use crate::types::{RawEventRecord, RawIndicatorRow};

fn required_column(headers: &StringRecord, name: &str, path: &Path) -> Result<usize> {
    headers
        .iter()
        .position(|h| h == name)
        .ok_or_else(|| PanelError::Schema {
            path: path.to_path_buf(),
            message: format!("missing required column '{}'", name),
        })
}

fn optional_column(headers: &StringRecord, name: &str) -> Option<usize> {
    headers.iter().position(|h| h == name)
}

fn text(record: &StringRecord, idx: Option<usize>) -> Option<String> {
    idx.and_then(|i| record.get(i))
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn line_of(record: &StringRecord) -> u64 {
    record.position().map(|p| p.line()).unwrap_or(0)
}

/// Parse an ISO calendar date, accepting a trailing time component.
pub fn parse_event_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok().or_else(|| {
        raw.get(..10)
            .and_then(|prefix| NaiveDate::parse_from_str(prefix, "%Y-%m-%d").ok())
    })
}

/// Parse an observation cell; empty means a null observation.
pub fn parse_observation(raw: &str) -> std::result::Result<Option<f64>, String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(None);
    }
    raw.parse::<f64>()
        .map(Some)
        .map_err(|_| format!("'{}' is not a number", raw))
}

#[instrument(skip_all, fields(path = %path.display()))]
pub fn read_indicator_rows(path: &Path) -> Result<Vec<RawIndicatorRow>> {
    let _timing = metrics::time_operation(MetricName::IngestDuration).with_label("source", "indicators");
    let mut reader = ReaderBuilder::new().trim(Trim::Headers).from_path(path)?;
    let headers = reader.headers()?.clone();
    let country_idx = required_column(&headers, INDICATOR_COUNTRY_COL, path)?;
    let period_idx = required_column(&headers, INDICATOR_PERIOD_COL, path)?;
    let metric_idx = required_column(&headers, INDICATOR_METRIC_COL, path)?;
    let value_idx = required_column(&headers, INDICATOR_VALUE_COL, path)?;

    let mut rows = Vec::new();
    for result in reader.records() {
        let record = result?;
        let field = |i: usize| record.get(i).unwrap_or("");
        let value = parse_observation(field(value_idx)).map_err(|message| PanelError::InvalidRecord {
            path: path.to_path_buf(),
            line: line_of(&record),
            message: format!("{}: {}", INDICATOR_VALUE_COL, message),
        })?;
        rows.push(RawIndicatorRow {
            ref_area: field(country_idx).to_string(),
            time_period: field(period_idx).trim().to_string(),
            measure: field(metric_idx).trim().to_string(),
            value,
        });
    }

    metrics::ingest::rows_read("indicators", rows.len());
    info!("Read {} indicator rows", rows.len());
    Ok(rows)
}

#[instrument(skip_all, fields(path = %path.display()))]
pub fn read_event_records(path: &Path) -> Result<Vec<RawEventRecord>> {
    let _timing = metrics::time_operation(MetricName::IngestDuration).with_label("source", "events");
    let mut reader = ReaderBuilder::new().trim(Trim::Headers).from_path(path)?;
    let headers = reader.headers()?.clone();
    let date_idx = required_column(&headers, EVENT_DATE_COL, path)?;
    let iso_idx = required_column(&headers, EVENT_ISO_COL, path)?;
    let country_idx = optional_column(&headers, EVENT_COUNTRY_COL);
    let admin1_idx = optional_column(&headers, EVENT_ADMIN1_COL);
    let location_idx = optional_column(&headers, EVENT_LOCATION_COL);
    let type_idx = optional_column(&headers, EVENT_TYPE_COL);
    let sub_type_idx = optional_column(&headers, EVENT_SUB_TYPE_COL);
    let fatalities_idx = optional_column(&headers, EVENT_FATALITIES_COL);
    let notes_idx = optional_column(&headers, EVENT_NOTES_COL);

    let mut records = Vec::new();
    let mut dropped = 0usize;
    for result in reader.records() {
        let record = result?;
        let raw_iso = record.get(iso_idx).unwrap_or("");
        let Some(iso) = normalize_event_iso(raw_iso) else {
            debug!("Dropping event on line {} with country code '{}'", line_of(&record), raw_iso);
            dropped += 1;
            continue;
        };
        let raw_date = record.get(date_idx).unwrap_or("");
        let event_date = parse_event_date(raw_date).ok_or_else(|| PanelError::InvalidRecord {
            path: path.to_path_buf(),
            line: line_of(&record),
            message: format!("{}: '{}' is not a calendar date", EVENT_DATE_COL, raw_date),
        })?;

        records.push(RawEventRecord {
            event_date,
            iso,
            country: text(&record, country_idx),
            admin1: text(&record, admin1_idx),
            location: text(&record, location_idx),
            event_type: text(&record, type_idx),
            sub_event_type: text(&record, sub_type_idx),
            fatalities: text(&record, fatalities_idx).and_then(|f| f.parse().ok()),
            notes: text(&record, notes_idx),
        });
    }

    metrics::ingest::rows_read("events", records.len() + dropped);
    if dropped > 0 {
        metrics::normalize::rows_dropped("events", dropped);
        info!("Dropped {} events with unusable country codes", dropped);
    }
    info!("Read {} event records", records.len());
    Ok(records)
}
