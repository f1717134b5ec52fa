//! Metrics for the panel build.
//!
//! Metric names live in one enum so there are no magic strings at call sites.
//! Recording is always safe: without an installed recorder the `metrics`
//! macros are no-ops. `init()` installs an in-process Prometheus recorder whose
//! text exposition can be rendered at the end of a batch run.

use std::fmt;
use std::sync::OnceLock;
use std::time::Instant;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricName {
    // Readers
    IngestRowsRead,
    IngestDuration,

    // Normalization
    NormalizeRowsDropped,

    // Aggregation / reshape / fuse
    AggregateIncidentRows,
    ReshapeDuplicatesRemoved,
    ReshapeFirstWinsConflicts,
    ReshapeWideRows,
    FuseRows,
    FuseUnmatchedRows,

    // Compression cache
    CacheDecompressions,
    CacheCompressions,
    CacheCompressedBytes,

    // Orchestrator
    BuildRuns,
    BuildDuration,
}

impl MetricName {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricName::IngestRowsRead => "panel_ingest_rows_read_total",
            MetricName::IngestDuration => "panel_ingest_duration_seconds",
            MetricName::NormalizeRowsDropped => "panel_normalize_rows_dropped_total",
            MetricName::AggregateIncidentRows => "panel_aggregate_incident_rows",
            MetricName::ReshapeDuplicatesRemoved => "panel_reshape_duplicates_removed_total",
            MetricName::ReshapeFirstWinsConflicts => "panel_reshape_first_wins_conflicts_total",
            MetricName::ReshapeWideRows => "panel_reshape_wide_rows",
            MetricName::FuseRows => "panel_fuse_rows",
            MetricName::FuseUnmatchedRows => "panel_fuse_unmatched_rows",
            MetricName::CacheDecompressions => "panel_cache_decompressions_total",
            MetricName::CacheCompressions => "panel_cache_compressions_total",
            MetricName::CacheCompressedBytes => "panel_cache_compressed_bytes",
            MetricName::BuildRuns => "panel_build_runs_total",
            MetricName::BuildDuration => "panel_build_duration_seconds",
        }
    }

    pub fn all_metrics() -> impl Iterator<Item = MetricName> {
        use MetricName::*;
        [
            IngestRowsRead,
            IngestDuration,
            NormalizeRowsDropped,
            AggregateIncidentRows,
            ReshapeDuplicatesRemoved,
            ReshapeFirstWinsConflicts,
            ReshapeWideRows,
            FuseRows,
            FuseUnmatchedRows,
            CacheDecompressions,
            CacheCompressions,
            CacheCompressedBytes,
            BuildRuns,
            BuildDuration,
        ]
        .into_iter()
    }

    pub fn is_counter(&self) -> bool {
        self.as_str().ends_with("_total")
    }

    /// Returns (phase, description)
    pub fn metadata(&self) -> (&'static str, &'static str) {
        match self {
            MetricName::IngestRowsRead => ("ingest", "Rows read from source extracts"),
            MetricName::IngestDuration => ("ingest", "Time spent reading one extract"),
            MetricName::NormalizeRowsDropped => ("normalize", "Rows dropped for unresolvable country codes"),
            MetricName::AggregateIncidentRows => ("aggregate", "Country-month incident rows produced"),
            MetricName::ReshapeDuplicatesRemoved => ("reshape", "Exact duplicate indicator rows removed"),
            MetricName::ReshapeFirstWinsConflicts => ("reshape", "Pivot cells where a later value was discarded"),
            MetricName::ReshapeWideRows => ("reshape", "Country-month rows in the wide indicator table"),
            MetricName::FuseRows => ("fuse", "Rows in the fused panel"),
            MetricName::FuseUnmatchedRows => ("fuse", "Incident rows with no indicator match"),
            MetricName::CacheDecompressions => ("cache", "Artifacts materialized from .xz siblings"),
            MetricName::CacheCompressions => ("cache", "Artifacts compressed to .xz siblings"),
            MetricName::CacheCompressedBytes => ("cache", "Size of written .xz siblings"),
            MetricName::BuildRuns => ("build", "Pipeline invocations by mode and outcome"),
            MetricName::BuildDuration => ("build", "End-to-end pipeline duration"),
        }
    }
}

impl fmt::Display for MetricName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

static HANDLE: OnceLock<metrics_exporter_prometheus::PrometheusHandle> = OnceLock::new();

/// Install the Prometheus recorder. Idempotent.
pub fn init() {
    if HANDLE.get().is_some() {
        return;
    }
    match metrics_exporter_prometheus::PrometheusBuilder::new().install_recorder() {
        Ok(handle) => {
            if HANDLE.set(handle).is_err() {
                warn!("Metrics handle was already set");
            }
            for name in MetricName::all_metrics() {
                let (phase, help) = name.metadata();
                let help = format!("[{}] {}", phase, help);
                if name.is_counter() {
                    ::metrics::describe_counter!(name.as_str(), help);
                } else {
                    ::metrics::describe_histogram!(name.as_str(), help);
                }
            }
            info!("Prometheus recorder installed");
        }
        Err(e) => {
            warn!("Failed to install Prometheus recorder: {}", e);
        }
    }
}

/// Render the current metrics in Prometheus text format, if a recorder is installed.
pub fn render() -> Option<String> {
    HANDLE.get().map(|handle| handle.render())
}

/// Records elapsed seconds into a histogram when dropped.
pub struct TimingGuard {
    start: Instant,
    metric: MetricName,
    label: Option<(&'static str, String)>,
}

impl TimingGuard {
    pub fn new(metric: MetricName) -> Self {
        Self {
            start: Instant::now(),
            metric,
            label: None,
        }
    }

    pub fn with_label(mut self, key: &'static str, value: impl Into<String>) -> Self {
        self.label = Some((key, value.into()));
        self
    }
}

impl Drop for TimingGuard {
    fn drop(&mut self) {
        let secs = self.start.elapsed().as_secs_f64();
        match self.label.take() {
            Some((key, value)) => ::metrics::histogram!(self.metric.as_str(), key => value).record(secs),
            None => ::metrics::histogram!(self.metric.as_str()).record(secs),
        }
    }
}

pub fn time_operation(metric: MetricName) -> TimingGuard {
    TimingGuard::new(metric)
}

// ============================================================================
// Ingest Metrics
// ============================================================================

pub mod ingest {
    use super::MetricName;

    pub fn rows_read(source: &'static str, count: usize) {
        ::metrics::counter!(MetricName::IngestRowsRead.as_str(), "source" => source).increment(count as u64);
    }
}

// ============================================================================
// Normalize Metrics
// ============================================================================

pub mod normalize {
    use super::MetricName;

    /// `source` is the extract the row came from
    pub fn rows_dropped(source: &'static str, count: usize) {
        ::metrics::counter!(MetricName::NormalizeRowsDropped.as_str(), "source" => source).increment(count as u64);
    }
}

// ============================================================================
// Aggregate / Reshape / Fuse Metrics
// ============================================================================

pub mod aggregate {
    use super::MetricName;

    pub fn incident_rows(count: usize) {
        ::metrics::histogram!(MetricName::AggregateIncidentRows.as_str()).record(count as f64);
    }
}

pub mod reshape {
    use super::MetricName;

    pub fn duplicates_removed(count: usize) {
        ::metrics::counter!(MetricName::ReshapeDuplicatesRemoved.as_str()).increment(count as u64);
    }

    pub fn first_wins_conflicts(count: usize) {
        ::metrics::counter!(MetricName::ReshapeFirstWinsConflicts.as_str()).increment(count as u64);
    }

    pub fn wide_rows(count: usize) {
        ::metrics::histogram!(MetricName::ReshapeWideRows.as_str()).record(count as f64);
    }
}

pub mod fuse {
    use super::MetricName;

    pub fn rows(total: usize, unmatched: usize) {
        ::metrics::histogram!(MetricName::FuseRows.as_str()).record(total as f64);
        ::metrics::histogram!(MetricName::FuseUnmatchedRows.as_str()).record(unmatched as f64);
    }
}

// ============================================================================
// Compression Cache Metrics
// ============================================================================

pub mod cache {
    use super::MetricName;

    pub fn decompressed() {
        ::metrics::counter!(MetricName::CacheDecompressions.as_str()).increment(1);
    }

    pub fn compressed(bytes: u64) {
        ::metrics::counter!(MetricName::CacheCompressions.as_str()).increment(1);
        ::metrics::histogram!(MetricName::CacheCompressedBytes.as_str()).record(bytes as f64);
    }
}

// ============================================================================
// Build Metrics
// ============================================================================

pub mod build {
    use super::MetricName;

    pub fn run(mode: &'static str, outcome: &'static str) {
        ::metrics::counter!(MetricName::BuildRuns.as_str(), "mode" => mode, "outcome" => outcome).increment(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_metric_names_are_unique_and_prefixed() {
        let mut seen = HashSet::new();
        for name in MetricName::all_metrics() {
            assert!(name.as_str().starts_with("panel_"));
            assert!(seen.insert(name.as_str()), "duplicate metric {}", name);
        }
    }

    #[test]
    fn test_recording_without_recorder_is_harmless() {
        let _guard = time_operation(MetricName::BuildDuration).with_label("mode", "rebuild");
        normalize::rows_dropped("indicators", 3);
        cache::compressed(128);
    }
}
