// Fusion pipeline: ingestion, normalization, reshaping, joining, orchestration

pub mod aggregate;
pub mod fuse;
pub mod ingest;
pub mod orchestrator;
pub mod reshape;

// Re-export the stage entry points
pub use aggregate::aggregate_incidents;
pub use fuse::{fuse, read_fused_csv, write_fused_csv};
pub use orchestrator::{BuildMode, BuildOutcome, DatasetSource, Orchestrator, SourcePaths};
pub use reshape::reshape_indicators;
