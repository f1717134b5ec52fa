//! Decides whether a run can reuse the fused artifact or must rebuild it.
//!
//! Trust-cache mode never looks at the two source extracts: it serves the
//! canonical fused file, or its `.xz` sibling, or fails. Rebuild mode confirms
//! both sources (materializing them from `.xz` if needed), makes sure each has a
//! compressed sibling, derives the panel and writes it. No output is written
//! unless both sources are usable.

use std::path::{Path, PathBuf};
use tracing::{info, instrument, warn};

use crate::app::ports::FusionStages;
use crate::error::{PanelError, Result};
use crate::observability::metrics::{self, MetricName};
use crate::pipeline::{aggregate, fuse, ingest, reshape};
use crate::storage::compression::{compressed_sibling, CompressionCache};
use crate::storage::sha256_file;
use crate::types::{FusedDataset, MonthlyIncidentCount, WideIndicatorTable};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildMode {
    /// Reuse the existing fused artifact; never derive from sources.
    TrustCache,
    /// Regenerate the fused artifact from the source extracts.
    Rebuild,
}

impl BuildMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            BuildMode::TrustCache => "trust_cache",
            BuildMode::Rebuild => "rebuild",
        }
    }
}

/// Where the returned dataset came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatasetSource {
    Cached,
    Decompressed,
    Rebuilt,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourcePaths {
    pub indicators: PathBuf,
    pub events: PathBuf,
    pub fused: PathBuf,
}

#[derive(Debug, Clone)]
pub struct BuildOutcome {
    pub dataset: FusedDataset,
    pub source: DatasetSource,
    pub path: PathBuf,
    /// SHA-256 of the canonical fused file
    pub digest: String,
}

/// Default stages: CSV readers feeding the reshaper, aggregator and fuser.
#[derive(Debug, Default, Clone, Copy)]
pub struct CsvStages;

impl FusionStages for CsvStages {
    fn load_indicators(&self, path: &Path) -> Result<WideIndicatorTable> {
        let rows = ingest::read_indicator_rows(path)?;
        Ok(reshape::reshape_indicators(&rows))
    }

    fn load_incidents(&self, path: &Path) -> Result<Vec<MonthlyIncidentCount>> {
        let events = ingest::read_event_records(path)?;
        Ok(aggregate::aggregate_incidents(&events))
    }

    fn fuse(&self, incidents: &[MonthlyIncidentCount], indicators: &WideIndicatorTable) -> FusedDataset {
        fuse::fuse(incidents, indicators)
    }
}

pub struct Orchestrator<S = CsvStages> {
    paths: SourcePaths,
    cache: CompressionCache,
    stages: S,
    refresh_compressed: bool,
}

impl Orchestrator<CsvStages> {
    pub fn new(paths: SourcePaths, cache: CompressionCache) -> Self {
        Self::with_stages(paths, cache, CsvStages)
    }
}

impl<S: FusionStages> Orchestrator<S> {
    pub fn with_stages(paths: SourcePaths, cache: CompressionCache, stages: S) -> Self {
        Self {
            paths,
            cache,
            stages,
            refresh_compressed: false,
        }
    }

    /// Recompress the fused output after a rebuild even if a sibling already exists.
    pub fn refresh_compressed(mut self, refresh: bool) -> Self {
        self.refresh_compressed = refresh;
        self
    }

    pub fn paths(&self) -> &SourcePaths {
        &self.paths
    }

    #[instrument(skip(self), fields(fused = %self.paths.fused.display()))]
    pub fn run(&self, mode: BuildMode) -> Result<BuildOutcome> {
        let _timing = metrics::time_operation(MetricName::BuildDuration).with_label("mode", mode.as_str());
        let result = match mode {
            BuildMode::TrustCache => self.load_trusted(),
            BuildMode::Rebuild => self.rebuild(),
        };
        match &result {
            Ok(outcome) => {
                metrics::build::run(mode.as_str(), "ok");
                info!(
                    "Fused dataset ready: {} rows, {} features, source={:?}, sha256={}",
                    outcome.dataset.len(),
                    outcome.dataset.feature_names().len(),
                    outcome.source,
                    outcome.digest
                );
            }
            Err(e) => {
                metrics::build::run(mode.as_str(), "error");
                warn!("Build failed: {}", e);
            }
        }
        result
    }

    fn load_trusted(&self) -> Result<BuildOutcome> {
        let fused = &self.paths.fused;
        let compressed = compressed_sibling(fused);

        let source = if fused.exists() {
            DatasetSource::Cached
        } else if compressed.exists() {
            info!("Fused dataset missing, decompressing {}", compressed.display());
            self.cache
                .decompress(&compressed)
                .map_err(|e| PanelError::NoFusedDataset {
                    canonical: fused.clone(),
                    compressed: compressed.clone(),
                    source: Box::new(e),
                })?;
            DatasetSource::Decompressed
        } else {
            return Err(PanelError::NotFound {
                canonical: fused.clone(),
                compressed,
            });
        };

        let dataset = fuse::read_fused_csv(fused)?;
        self.outcome(dataset, source)
    }

    fn rebuild(&self) -> Result<BuildOutcome> {
        let inputs = [&self.paths.indicators, &self.paths.events];
        for input in inputs {
            self.cache.ensure_available(input)?;
        }
        for input in inputs {
            self.cache.ensure_compressed(input)?;
        }

        let indicators = self.stages.load_indicators(&self.paths.indicators)?;
        let incidents = self.stages.load_incidents(&self.paths.events)?;
        let dataset = self.stages.fuse(&incidents, &indicators);

        let fused = &self.paths.fused;
        fuse::write_fused_csv(fused, &dataset)?;
        if self.refresh_compressed {
            self.cache.compress(fused)?;
        } else {
            self.cache.ensure_compressed(fused)?;
        }

        self.outcome(dataset, DatasetSource::Rebuilt)
    }

    fn outcome(&self, dataset: FusedDataset, source: DatasetSource) -> Result<BuildOutcome> {
        let digest = sha256_file(&self.paths.fused)?;
        Ok(BuildOutcome {
            dataset,
            source,
            path: self.paths.fused.clone(),
            digest,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::fs;
    use tempfile::{tempdir, TempDir};

    /// Wraps the real stages and counts how often any of them runs.
    #[derive(Default)]
    struct CountingStages {
        calls: Cell<usize>,
    }

    impl FusionStages for CountingStages {
        fn load_indicators(&self, path: &Path) -> Result<WideIndicatorTable> {
            self.calls.set(self.calls.get() + 1);
            CsvStages.load_indicators(path)
        }

        fn load_incidents(&self, path: &Path) -> Result<Vec<MonthlyIncidentCount>> {
            self.calls.set(self.calls.get() + 1);
            CsvStages.load_incidents(path)
        }

        fn fuse(&self, incidents: &[MonthlyIncidentCount], indicators: &WideIndicatorTable) -> FusedDataset {
            self.calls.set(self.calls.get() + 1);
            CsvStages.fuse(incidents, indicators)
        }
    }

    fn paths(dir: &TempDir) -> SourcePaths {
        SourcePaths {
            indicators: dir.path().join("oecd.csv"),
            events: dir.path().join("acled.csv"),
            fused: dir.path().join("data.csv"),
        }
    }

    fn write_sources(paths: &SourcePaths) {
        fs::write(
            &paths.indicators,
            "REF_AREA,TIME_PERIOD,Measure,OBS_VALUE\n\
             USA,2024-01,GDP,1.0\n\
             USA,2024-01,ZCPI,9.0\n",
        )
        .unwrap();
        fs::write(
            &paths.events,
            "event_date,iso,country\n\
             2024-01-05,840,United States\n\
             2024-01-17,840,United States\n\
             2024-02-01,840,United States\n",
        )
        .unwrap();
    }

    #[test]
    fn test_trust_cache_with_canonical_file_never_runs_stages() {
        let dir = tempdir().unwrap();
        let paths = paths(&dir);
        fs::write(&paths.fused, "iso,year_month,incidents,GDP\n840,2024-01,2,1.0\n").unwrap();
        let orchestrator = Orchestrator::with_stages(paths, CompressionCache::default(), CountingStages::default());

        let outcome = orchestrator.run(BuildMode::TrustCache).unwrap();

        assert_eq!(orchestrator.stages.calls.get(), 0);
        assert_eq!(outcome.source, DatasetSource::Cached);
        assert_eq!(outcome.dataset.rows[0].incidents, 2);
        // Sources were never touched, so no siblings were produced
        assert!(!compressed_sibling(&orchestrator.paths.indicators).exists());
    }

    #[test]
    fn test_trust_cache_decompresses_sibling() {
        let dir = tempdir().unwrap();
        let paths = paths(&dir);
        let cache = CompressionCache::new(1);
        fs::write(&paths.fused, "iso,year_month,incidents\n840,2024-01,2\n").unwrap();
        cache.compress(&paths.fused).unwrap();
        fs::remove_file(&paths.fused).unwrap();
        let orchestrator = Orchestrator::with_stages(paths, cache, CountingStages::default());

        let outcome = orchestrator.run(BuildMode::TrustCache).unwrap();

        assert_eq!(outcome.source, DatasetSource::Decompressed);
        assert_eq!(orchestrator.stages.calls.get(), 0);
        assert!(orchestrator.paths.fused.exists());
    }

    #[test]
    fn test_trust_cache_without_any_artifact_fails() {
        let dir = tempdir().unwrap();
        let paths = paths(&dir);
        write_sources(&paths);
        let orchestrator = Orchestrator::with_stages(paths, CompressionCache::default(), CountingStages::default());

        let err = orchestrator.run(BuildMode::TrustCache).unwrap_err();

        assert!(matches!(err, PanelError::NotFound { .. }));
        assert_eq!(orchestrator.stages.calls.get(), 0);
        assert!(!orchestrator.paths.fused.exists());
    }

    #[test]
    fn test_trust_cache_with_corrupt_sibling_names_both_paths() {
        let dir = tempdir().unwrap();
        let paths = paths(&dir);
        fs::write(compressed_sibling(&paths.fused), b"garbage").unwrap();
        let orchestrator = Orchestrator::new(paths, CompressionCache::default());

        let err = orchestrator.run(BuildMode::TrustCache).unwrap_err();
        let message = err.to_string();

        assert!(matches!(err, PanelError::NoFusedDataset { .. }));
        assert!(message.contains("data.csv.xz"));
        assert!(message.contains("could be used"));
    }

    #[test]
    fn test_rebuild_writes_output_and_siblings() {
        let dir = tempdir().unwrap();
        let paths = paths(&dir);
        write_sources(&paths);
        let orchestrator = Orchestrator::with_stages(paths, CompressionCache::new(1), CountingStages::default());

        let outcome = orchestrator.run(BuildMode::Rebuild).unwrap();

        assert_eq!(orchestrator.stages.calls.get(), 3);
        assert_eq!(outcome.source, DatasetSource::Rebuilt);
        assert_eq!(outcome.dataset.columns(), vec!["iso", "year_month", "incidents", "GDP", "ZCPI"]);
        assert_eq!(outcome.dataset.rows.len(), 2);
        assert_eq!(outcome.dataset.rows[1].feature("GDP"), None);
        let p = orchestrator.paths();
        for artifact in [&p.indicators, &p.events, &p.fused] {
            assert!(compressed_sibling(artifact).exists(), "missing sibling for {}", artifact.display());
        }
    }

    #[test]
    fn test_rebuild_is_reproducible() {
        let dir = tempdir().unwrap();
        let paths = paths(&dir);
        write_sources(&paths);
        let orchestrator = Orchestrator::new(paths, CompressionCache::new(1));

        let first = orchestrator.run(BuildMode::Rebuild).unwrap();
        let second = orchestrator.run(BuildMode::Rebuild).unwrap();

        assert_eq!(first.digest, second.digest);
        assert_eq!(first.dataset, second.dataset);
    }

    #[test]
    fn test_rebuild_restores_inputs_from_siblings() {
        let dir = tempdir().unwrap();
        let paths = paths(&dir);
        write_sources(&paths);
        let cache = CompressionCache::new(1);
        cache.compress(&paths.indicators).unwrap();
        cache.compress(&paths.events).unwrap();
        fs::remove_file(&paths.indicators).unwrap();
        fs::remove_file(&paths.events).unwrap();
        let orchestrator = Orchestrator::new(paths, cache);

        let outcome = orchestrator.run(BuildMode::Rebuild).unwrap();

        assert_eq!(outcome.dataset.rows.len(), 2);
        assert!(orchestrator.paths.indicators.exists());
        assert!(orchestrator.paths.events.exists());
    }

    #[test]
    fn test_rebuild_with_missing_input_writes_nothing() {
        let dir = tempdir().unwrap();
        let paths = paths(&dir);
        write_sources(&paths);
        fs::remove_file(&paths.events).unwrap();
        let orchestrator = Orchestrator::with_stages(paths, CompressionCache::default(), CountingStages::default());

        let err = orchestrator.run(BuildMode::Rebuild).unwrap_err();
        let message = err.to_string();

        assert!(matches!(err, PanelError::NotFound { .. }));
        assert!(message.contains("acled.csv"));
        assert!(message.contains("acled.csv.xz"));
        assert_eq!(orchestrator.stages.calls.get(), 0);
        assert!(!orchestrator.paths.fused.exists());
        assert!(!compressed_sibling(&orchestrator.paths.fused).exists());
    }

    #[test]
    fn test_refresh_compressed_replaces_stale_sibling() {
        let dir = tempdir().unwrap();
        let paths = paths(&dir);
        write_sources(&paths);
        fs::write(compressed_sibling(&paths.fused), b"stale").unwrap();
        let cache = CompressionCache::new(1);
        let orchestrator = Orchestrator::new(paths, cache).refresh_compressed(true);

        orchestrator.run(BuildMode::Rebuild).unwrap();

        let fused = &orchestrator.paths.fused;
        let original = fs::read(fused).unwrap();
        fs::remove_file(fused).unwrap();
        cache.decompress(&compressed_sibling(fused)).unwrap();
        assert_eq!(fs::read(fused).unwrap(), original);
    }
}
