//! xz compression cache for dataset artifacts.
//!
//! Every canonical artifact `P` may have a compressed sibling `P.xz`. Consumers
//! call [`CompressionCache::ensure_available`] to get `P`, materializing it from
//! the sibling when only the compressed form is on disk; producers call
//! [`CompressionCache::ensure_compressed`] after writing `P`.

use std::ffi::OsStr;
use std::fs::{self, File};
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument};
use xz2::read::XzDecoder;
use xz2::write::XzEncoder;

use crate::constants::{DEFAULT_XZ_PRESET, XZ_EXTENSION};
use crate::error::{PanelError, Result};
use crate::observability::metrics;
use crate::storage::write_atomic;

/// `P` -> `P.xz`
pub fn compressed_sibling(path: &Path) -> PathBuf {
    let mut s = path.as_os_str().to_os_string();
    s.push(".");
    s.push(XZ_EXTENSION);
    PathBuf::from(s)
}

#[derive(Debug, Clone, Copy)]
pub struct CompressionCache {
    preset: u32,
}

impl Default for CompressionCache {
    fn default() -> Self {
        Self::new(DEFAULT_XZ_PRESET)
    }
}

impl CompressionCache {
    /// `preset` is the xz level, 0-9; out-of-range values are clamped.
    pub fn new(preset: u32) -> Self {
        Self {
            preset: preset.min(9),
        }
    }

    pub fn preset(&self) -> u32 {
        self.preset
    }

    /// Return `path`, decompressing its `.xz` sibling first if only that exists.
    #[instrument(skip_all, fields(path = %path.display()))]
    pub fn ensure_available(&self, path: &Path) -> Result<PathBuf> {
        if path.exists() {
            return Ok(path.to_path_buf());
        }
        let compressed = compressed_sibling(path);
        if !compressed.exists() {
            return Err(PanelError::NotFound {
                canonical: path.to_path_buf(),
                compressed,
            });
        }
        info!("Materializing {} from {}", path.display(), compressed.display());
        self.decompress(&compressed)
            .map_err(|e| PanelError::Materialize {
                canonical: path.to_path_buf(),
                compressed: compressed.clone(),
                source: Box::new(e),
            })?;
        Ok(path.to_path_buf())
    }

    /// Compress `path` to `path.xz`, replacing any existing sibling.
    pub fn compress(&self, path: &Path) -> Result<PathBuf> {
        let out_path = compressed_sibling(path);
        let mut src = BufReader::new(File::open(path)?);
        let preset = self.preset;
        write_atomic(&out_path, |dst| {
            let mut encoder = XzEncoder::new(dst, preset);
            io::copy(&mut src, &mut encoder)?;
            encoder.finish()?;
            Ok(())
        })?;
        let size = fs::metadata(&out_path).map(|m| m.len()).unwrap_or(0);
        metrics::cache::compressed(size);
        debug!("Compressed {} ({} bytes)", out_path.display(), size);
        Ok(out_path)
    }

    /// Decompress `path.xz` back to `path`. Fails with `BadSuffix` for any other extension.
    pub fn decompress(&self, path: &Path) -> Result<PathBuf> {
        if path.extension() != Some(OsStr::new(XZ_EXTENSION)) {
            return Err(PanelError::BadSuffix(path.to_path_buf()));
        }
        let out_path = path.with_extension("");
        // Concatenated streams are valid xz, so keep decoding past the first one
        let mut decoder = XzDecoder::new_multi_decoder(BufReader::new(File::open(path)?));
        write_atomic(&out_path, |dst| {
            io::copy(&mut decoder, dst)?;
            Ok(())
        })?;
        metrics::cache::decompressed();
        debug!("Decompressed {} to {}", path.display(), out_path.display());
        Ok(out_path)
    }

    /// Compress `path` unless its sibling already exists. Returns the sibling path.
    pub fn ensure_compressed(&self, path: &Path) -> Result<PathBuf> {
        let compressed = compressed_sibling(path);
        if compressed.exists() {
            debug!("{} already present", compressed.display());
            return Ok(compressed);
        }
        self.compress(path)
    }
}
