use std::path::Path;

use crate::error::Result;
use crate::types::{FusedDataset, MonthlyIncidentCount, WideIndicatorTable};

/// The derive-from-sources half of a build. The orchestrator only calls this in
/// rebuild mode, after both inputs have been confirmed on disk.
pub trait FusionStages {
    /// Read the indicator extract and pivot it wide.
    fn load_indicators(&self, path: &Path) -> Result<WideIndicatorTable>;

    /// Read the event extract and count incidents per country-month.
    fn load_incidents(&self, path: &Path) -> Result<Vec<MonthlyIncidentCount>>;

    fn fuse(&self, incidents: &[MonthlyIncidentCount], indicators: &WideIndicatorTable) -> FusedDataset;
}
