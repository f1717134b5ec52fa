use std::collections::BTreeMap;
use tracing::{info, instrument};

use crate::observability::metrics;
use crate::types::{MonthlyIncidentCount, NormalizedKey, RawEventRecord};

/// Count events per (country, month). Only observed pairs are emitted, sorted by key.
#[instrument(skip_all, fields(events = events.len()))]
pub fn aggregate_incidents(events: &[RawEventRecord]) -> Vec<MonthlyIncidentCount> {
    let mut counts: BTreeMap<NormalizedKey, u64> = BTreeMap::new();
    for event in events {
        *counts
            .entry(NormalizedKey::new(event.iso.clone(), event.year_month()))
            .or_default() += 1;
    }

    let rows: Vec<MonthlyIncidentCount> = counts
        .into_iter()
        .map(|(key, incidents)| MonthlyIncidentCount { key, incidents })
        .collect();

    metrics::aggregate::incident_rows(rows.len());
    info!("Aggregated {} events into {} country-months", events.len(), rows.len());
    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn event(y: i32, m: u32, d: u32, iso: &str) -> RawEventRecord {
        RawEventRecord::new(NaiveDate::from_ymd_opt(y, m, d).unwrap(), iso)
    }

    #[test]
    fn test_counts_per_country_month() {
        let events = vec![
            event(2024, 1, 5, "840"),
            event(2024, 1, 17, "840"),
            event(2024, 2, 1, "840"),
        ];

        let rows = aggregate_incidents(&events);
        assert_eq!(
            rows,
            vec![
                MonthlyIncidentCount { key: NormalizedKey::new("840", "2024-01"), incidents: 2 },
                MonthlyIncidentCount { key: NormalizedKey::new("840", "2024-02"), incidents: 1 },
            ]
        );
    }

    #[test]
    fn test_countries_are_kept_apart_and_sorted() {
        let events = vec![
            event(2023, 12, 31, "840"),
            event(2023, 12, 1, "004"),
            event(2023, 12, 2, "004"),
        ];

        let rows = aggregate_incidents(&events);
        let keys: Vec<_> = rows.iter().map(|r| (r.key.iso.as_str(), r.incidents)).collect();
        assert_eq!(keys, vec![("004", 2), ("840", 1)]);
    }

    #[test]
    fn test_no_events_yields_no_rows() {
        assert!(aggregate_incidents(&[]).is_empty());
    }
}
