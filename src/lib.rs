pub mod app;
pub mod config;
pub mod constants;
pub mod error;
pub mod logging;
pub mod normalize;
pub mod observability;
pub mod pipeline;
pub mod storage;
pub mod types;
