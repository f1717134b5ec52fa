use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PanelError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON serialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    /// Neither the canonical file nor its compressed sibling exists.
    #[error("Missing both {} and {}", canonical.display(), compressed.display())]
    NotFound {
        canonical: PathBuf,
        compressed: PathBuf,
    },

    /// A compressed sibling exists but could not be turned back into the canonical file.
    #[error("Failed to decompress {} to {}: {source}", compressed.display(), canonical.display())]
    Materialize {
        canonical: PathBuf,
        compressed: PathBuf,
        #[source]
        source: Box<PanelError>,
    },

    #[error("Neither {} nor {} could be used: {source}", canonical.display(), compressed.display())]
    NoFusedDataset {
        canonical: PathBuf,
        compressed: PathBuf,
        #[source]
        source: Box<PanelError>,
    },

    #[error("File does not end with .xz: {}", .0.display())]
    BadSuffix(PathBuf),

    #[error("Unexpected layout in {}: {message}", path.display())]
    Schema { path: PathBuf, message: String },

    #[error("Invalid record at {}:{line}: {message}", path.display())]
    InvalidRecord {
        path: PathBuf,
        line: u64,
        message: String,
    },

    #[error("Invalid period token '{0}', expected YYYY-MM")]
    InvalidPeriod(String),

    #[error("Unknown ISO {0}")]
    UnknownCountry(String),
}

pub type Result<T> = std::result::Result<T, PanelError>;
