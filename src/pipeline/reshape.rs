//! Long-to-wide reshaping of the indicator extract.

use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::{debug, info, instrument};

use crate::normalize::numeric_iso;
use crate::observability::metrics;
use crate::types::{NormalizedKey, RawIndicatorRow, WideIndicatorRow, WideIndicatorTable};

/// Exact-duplicate identity of a projected row. Values compare by bit pattern.
type RowIdentity = (String, String, String, Option<u64>);

/// Pivot indicator rows into one row per (country, period), one column per metric.
///
/// Rows whose country does not resolve are dropped. Exact duplicates are removed
/// first; for any remaining clash on (country, period, metric) the value seen
/// first in input order is kept. Output rows follow first appearance of their key.
#[instrument(skip_all, fields(rows = rows.len()))]
pub fn reshape_indicators(rows: &[RawIndicatorRow]) -> WideIndicatorTable {
    let mut table = WideIndicatorTable::default();
    let mut positions: HashMap<NormalizedKey, usize> = HashMap::new();
    let mut seen: HashSet<RowIdentity> = HashSet::new();
    let mut dropped = 0usize;
    let mut duplicates = 0usize;
    let mut conflicts = 0usize;

    for row in rows {
        let Some(iso) = numeric_iso(&row.ref_area) else {
            dropped += 1;
            continue;
        };

        let identity = (
            iso.clone(),
            row.time_period.clone(),
            row.measure.clone(),
            row.value.map(f64::to_bits),
        );
        if !seen.insert(identity) {
            duplicates += 1;
            continue;
        }

        table.metrics.insert(row.measure.clone());
        let key = NormalizedKey::new(iso, row.time_period.clone());
        let position = *positions.entry(key.clone()).or_insert_with(|| {
            table.rows.push(WideIndicatorRow {
                key,
                values: BTreeMap::new(),
            });
            table.rows.len() - 1
        });

        match table.rows[position].values.entry(row.measure.clone()) {
            Entry::Vacant(slot) => {
                slot.insert(row.value);
            }
            Entry::Occupied(_) => {
                conflicts += 1;
                debug!(
                    "Keeping first value for {} / {} / {}",
                    row.ref_area, row.time_period, row.measure
                );
            }
        }
    }

    metrics::normalize::rows_dropped("indicators", dropped);
    metrics::reshape::duplicates_removed(duplicates);
    metrics::reshape::first_wins_conflicts(conflicts);
    metrics::reshape::wide_rows(table.rows.len());
    info!(
        "Reshaped {} indicator rows into {} country-periods x {} metrics ({} dropped, {} duplicates, {} conflicts)",
        rows.len(),
        table.rows.len(),
        table.metrics.len(),
        dropped,
        duplicates,
        conflicts
    );
    table
}
