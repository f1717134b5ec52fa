//! Process-wide state for a consumer of the fused panel.
//!
//! Built once at startup from the configuration, read by many requests, and
//! dropped explicitly at shutdown. Holds the fused table plus the raw event
//! records needed for the country directory and per-country snapshots.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;
use tracing::{info, instrument};

use crate::config::Config;
use crate::error::{PanelError, Result};
use crate::normalize::normalize_event_iso;
use crate::pipeline::ingest::read_event_records;
use crate::pipeline::{BuildMode, BuildOutcome, Orchestrator};
use crate::types::{CountryMeta, EventSnapshot, EventSummary, FusedDataset, RawEventRecord};

static PERIOD_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{4}-\d{2}$").unwrap());

pub struct AppContext {
    outcome: BuildOutcome,
    events: Vec<RawEventRecord>,
    /// iso -> first non-empty country name seen in the event extract
    names: BTreeMap<String, String>,
}

impl AppContext {
    #[instrument(skip_all, fields(mode = mode.as_str()))]
    pub fn load(config: &Config, mode: BuildMode) -> Result<Self> {
        let orchestrator = Orchestrator::new(config.source_paths(), config.cache())
            .refresh_compressed(config.compression.refresh_on_rebuild);
        let outcome = orchestrator.run(mode)?;

        let events_path = config.cache().ensure_available(&config.paths.events)?;
        let events = read_event_records(&events_path)?;

        let mut names = BTreeMap::new();
        for event in &events {
            if let Some(country) = &event.country {
                names.entry(event.iso.clone()).or_insert_with(|| country.clone());
            }
        }

        info!(
            "Context ready: {} fused rows, {} events, {} countries",
            outcome.dataset.len(),
            events.len(),
            names.len()
        );
        Ok(Self { outcome, events, names })
    }

    pub fn dataset(&self) -> &FusedDataset {
        &self.outcome.dataset
    }

    /// Country directory, sorted by name.
    pub fn countries(&self) -> Vec<CountryMeta> {
        let mut countries: Vec<CountryMeta> = self
            .names
            .iter()
            .map(|(iso, name)| CountryMeta {
                iso: iso.clone(),
                name: name.clone(),
            })
            .collect();
        countries.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.iso.cmp(&b.iso)));
        countries
    }

    /// Events for one country whose month falls in `[start, end]`, in file order.
    pub fn snapshot(&self, iso: &str, start: &str, end: &str) -> Result<EventSnapshot> {
        let iso = normalize_event_iso(iso).ok_or_else(|| PanelError::UnknownCountry(iso.to_string()))?;
        let country = self
            .names
            .get(&iso)
            .cloned()
            .ok_or_else(|| PanelError::UnknownCountry(iso.clone()))?;
        for period in [start, end] {
            if !PERIOD_RE.is_match(period) {
                return Err(PanelError::InvalidPeriod(period.to_string()));
            }
        }

        let events: Vec<EventSummary> = self
            .events
            .iter()
            .filter(|e| e.iso == iso)
            .filter(|e| {
                let month = e.year_month();
                month.as_str() >= start && month.as_str() <= end
            })
            .map(EventSummary::from)
            .collect();

        Ok(EventSnapshot {
            iso,
            country,
            start: start.to_string(),
            end: end.to_string(),
            events,
        })
    }

    pub fn shutdown(self) {
        info!("Releasing panel context ({} rows)", self.outcome.dataset.len());
    }
}
