//! Left join of the incident series onto the indicator table, plus the fused CSV format.
//!
//! Column layout is a contract with downstream consumers: `iso, year_month,
//! incidents`, then every feature column in ascending name order.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use tracing::{info, instrument};

use crate::constants::{INCIDENTS_COL, PREFIX_COLUMNS};
use crate::error::{PanelError, Result};
use crate::observability::metrics;
use crate::pipeline::ingest::parse_observation;
use crate::storage::write_atomic;
use crate::types::{
    FusedDataset, FusedDatasetRow, MonthlyIncidentCount, NormalizedKey, WideIndicatorRow,
    WideIndicatorTable,
};

/// Every incident row is kept; features are `None` where no indicator row matches.
#[instrument(skip_all, fields(incidents = incidents.len(), indicators = indicators.rows.len()))]
pub fn fuse(incidents: &[MonthlyIncidentCount], indicators: &WideIndicatorTable) -> FusedDataset {
    let by_key: HashMap<&NormalizedKey, &WideIndicatorRow> =
        indicators.rows.iter().map(|row| (&row.key, row)).collect();
    // BTreeSet iteration is already ascending
    let feature_names: Vec<String> = indicators
        .metrics
        .iter()
        .filter(|name| !PREFIX_COLUMNS.contains(&name.as_str()))
        .cloned()
        .collect();

    let mut unmatched = 0usize;
    let rows: Vec<FusedDatasetRow> = incidents
        .iter()
        .map(|count| {
            let matched = by_key.get(&count.key);
            if matched.is_none() {
                unmatched += 1;
            }
            let features: BTreeMap<String, Option<f64>> = feature_names
                .iter()
                .map(|name| {
                    let value = matched.and_then(|row| row.values.get(name).copied().flatten());
                    (name.clone(), value)
                })
                .collect();
            FusedDatasetRow {
                iso: count.key.iso.clone(),
                year_month: count.key.year_month.clone(),
                incidents: count.incidents,
                features,
            }
        })
        .collect();

    metrics::fuse::rows(rows.len(), unmatched);
    info!(
        "Fused {} rows with {} feature columns ({} without indicator data)",
        rows.len(),
        feature_names.len(),
        unmatched
    );
    FusedDataset { feature_names, rows }
}

fn format_value(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

/// Write the panel to `path` (atomically). Nulls become empty cells.
#[instrument(skip_all, fields(path = %path.display(), rows = dataset.rows.len()))]
pub fn write_fused_csv(path: &Path, dataset: &FusedDataset) -> Result<()> {
    write_atomic(path, |out| {
        let mut writer = csv::Writer::from_writer(out);
        writer.write_record(dataset.columns())?;
        for row in &dataset.rows {
            let mut record = vec![row.iso.clone(), row.year_month.clone(), row.incidents.to_string()];
            record.extend(dataset.feature_names.iter().map(|name| format_value(row.feature(name))));
            writer.write_record(&record)?;
        }
        writer.flush()?;
        Ok(())
    })?;
    info!("Wrote fused dataset to {}", path.display());
    Ok(())
}

/// Load a previously written panel, checking the fixed column prefix.
#[instrument(skip_all, fields(path = %path.display()))]
pub fn read_fused_csv(path: &Path) -> Result<FusedDataset> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::Headers)
        .from_path(path)?;
    let headers = reader.headers()?.clone();
    let prefix: Vec<&str> = headers.iter().take(PREFIX_COLUMNS.len()).collect();
    if prefix != PREFIX_COLUMNS {
        return Err(PanelError::Schema {
            path: path.to_path_buf(),
            message: format!("expected columns to start with {:?}, found {:?}", PREFIX_COLUMNS, prefix),
        });
    }
    let file_features: Vec<String> = headers
        .iter()
        .skip(PREFIX_COLUMNS.len())
        .map(str::to_string)
        .collect();

    let mut rows = Vec::new();
    for result in reader.records() {
        let record = result?;
        let line = record.position().map(|p| p.line()).unwrap_or(0);
        let invalid = |message: String| PanelError::InvalidRecord {
            path: path.to_path_buf(),
            line,
            message,
        };
        let incidents_raw = record.get(2).unwrap_or("").trim();
        let incidents = incidents_raw
            .parse::<u64>()
            .map_err(|_| invalid(format!("{}: '{}' is not a count", INCIDENTS_COL, incidents_raw)))?;
        let mut features = BTreeMap::new();
        for (offset, name) in file_features.iter().enumerate() {
            let raw = record.get(PREFIX_COLUMNS.len() + offset).unwrap_or("");
            let value = parse_observation(raw).map_err(|e| invalid(format!("{}: {}", name, e)))?;
            features.insert(name.clone(), value);
        }
        rows.push(FusedDatasetRow {
            iso: record.get(0).unwrap_or("").trim().to_string(),
            year_month: record.get(1).unwrap_or("").trim().to_string(),
            incidents,
            features,
        });
    }

    let mut feature_names = file_features;
    feature_names.sort();
    info!("Loaded {} fused rows from {}", rows.len(), path.display());
    Ok(FusedDataset { feature_names, rows })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;
    use std::fs;
    use tempfile::tempdir;

    fn incidents(iso: &str, period: &str, n: u64) -> MonthlyIncidentCount {
        MonthlyIncidentCount {
            key: NormalizedKey::new(iso, period),
            incidents: n,
        }
    }

    fn wide(iso: &str, period: &str, values: &[(&str, f64)]) -> WideIndicatorRow {
        WideIndicatorRow {
            key: NormalizedKey::new(iso, period),
            values: values.iter().map(|(k, v)| (k.to_string(), Some(*v))).collect(),
        }
    }

    fn table(rows: Vec<WideIndicatorRow>) -> WideIndicatorTable {
        let metrics: BTreeSet<String> = rows
            .iter()
            .flat_map(|r| r.values.keys().cloned())
            .collect();
        WideIndicatorTable { metrics, rows }
    }

    #[test]
    fn test_join_and_column_order() {
        let indicators = table(vec![wide("840", "2024-01", &[("ZCPI", 9.0), ("GDP", 1.0)])]);

        let dataset = fuse(&[incidents("840", "2024-01", 2)], &indicators);
        assert_eq!(dataset.columns(), vec!["iso", "year_month", "incidents", "GDP", "ZCPI"]);
        assert_eq!(dataset.rows.len(), 1);
        let row = &dataset.rows[0];
        assert_eq!((row.iso.as_str(), row.year_month.as_str(), row.incidents), ("840", "2024-01", 2));
        assert_eq!(row.feature("GDP"), Some(1.0));
        assert_eq!(row.feature("ZCPI"), Some(9.0));
    }

    #[test]
    fn test_unmatched_incident_row_keeps_null_features() {
        let indicators = table(vec![wide("840", "2024-01", &[("GDP", 1.0)])]);

        let dataset = fuse(
            &[incidents("840", "2024-01", 2), incidents("840", "2024-02", 5)],
            &indicators,
        );
        assert_eq!(dataset.rows.len(), 2);
        let unmatched = &dataset.rows[1];
        assert_eq!(unmatched.incidents, 5);
        assert_eq!(unmatched.features.get("GDP"), Some(&None));
    }

    #[test]
    fn test_indicator_only_keys_are_not_added() {
        let indicators = table(vec![
            wide("840", "2024-01", &[("GDP", 1.0)]),
            wide("250", "2024-01", &[("CPI", 2.0)]),
        ]);

        let dataset = fuse(&[incidents("840", "2024-01", 1)], &indicators);
        assert_eq!(dataset.rows.len(), 1);
        // Columns come from the whole indicator table, not just matched rows
        assert_eq!(dataset.feature_names(), ["CPI".to_string(), "GDP".to_string()]);
        assert_eq!(dataset.rows[0].features.get("CPI"), Some(&None));
    }

    #[test]
    fn test_csv_layout_and_reload() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data.csv");
        let indicators = table(vec![wide("036", "2024-01", &[("ZCPI", 9.5), ("GDP", 1.0)])]);
        let dataset = fuse(
            &[incidents("036", "2024-01", 2), incidents("036", "2024-03", 1)],
            &indicators,
        );

        write_fused_csv(&path, &dataset).unwrap();
        let text = fs::read_to_string(&path).unwrap();
        assert_eq!(
            text,
            "iso,year_month,incidents,GDP,ZCPI\n036,2024-01,2,1,9.5\n036,2024-03,1,,\n"
        );

        let reloaded = read_fused_csv(&path).unwrap();
        assert_eq!(reloaded, dataset);
    }

    #[test]
    fn test_reading_foreign_layout_is_schema_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data.csv");
        fs::write(&path, "year_month,iso,incidents\n2024-01,840,1\n").unwrap();

        assert!(matches!(read_fused_csv(&path).unwrap_err(), PanelError::Schema { .. }));
    }
}
