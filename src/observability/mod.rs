// Observability: metrics for the panel build. Logging setup lives in `crate::logging`.

pub mod metrics;
