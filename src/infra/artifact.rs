// ============================================================
// Layer 6 - Model Artifact Store
// ============================================================
// The promoted model lives in ONE file at a fixed path. That
// file must carry everything the service needs to rebuild the
// exact inference graph, so it holds both the architecture
// and the trained weights:
//
//   offset  size  content
//   0       8     magic  b"PM25LSTM"
//   8       4     format version (u32, little endian)
//   12      4     header length N (u32, little endian)
//   16      N     JSON header (model config, input shape,
//                 combination, metrics, creation time)
//   16+N    ...   weights (Burn BinBytesRecorder, full precision)
//
// Writes go through write_atomic: temp file in the same
// directory → write → fsync → rename over the target → fsync
// the directory. A reader either sees the previous artifact or
// the new one, never a partially written file.

use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::hyperparams::HyperparameterCombination;
use crate::domain::run_record::RunMetrics;
use crate::domain::shape::InputShape;
use crate::ml::model::LstmRegressorConfig;

pub const ARTIFACT_MAGIC: &[u8; 8] = b"PM25LSTM";
pub const FORMAT_VERSION: u32 = 1;

const PREFIX_LEN: usize = 16;

/// Reasons an artifact file cannot be decoded.
#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("not a model artifact (bad magic bytes)")]
    BadMagic,

    #[error("unsupported artifact format version {0} (this build reads {current})", current = FORMAT_VERSION)]
    UnsupportedVersion(u32),

    #[error("artifact is truncated")]
    Truncated,

    #[error("artifact header is invalid: {0}")]
    Header(#[from] serde_json::Error),
}

/// Self-describing metadata stored ahead of the weights.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactHeader {
    pub model:       LstmRegressorConfig,
    pub input_shape: InputShape,
    pub combination: HyperparameterCombination,
    pub metrics:     Option<RunMetrics>,
    pub created_at:  DateTime<Utc>,
}

/// A decoded artifact: header plus raw weight record bytes.
#[derive(Debug, Clone)]
pub struct ModelArtifact {
    pub header:  ArtifactHeader,
    pub weights: Vec<u8>,
}

impl ModelArtifact {
    pub fn new(header: ArtifactHeader, weights: Vec<u8>) -> Self {
        Self { header, weights }
    }

    /// Encode into the on-disk layout described above.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let header = serde_json::to_vec(&self.header)?;
        let header_len = u32::try_from(header.len()).context("artifact header too large")?;

        let mut out = Vec::with_capacity(PREFIX_LEN + header.len() + self.weights.len());
        out.extend_from_slice(ARTIFACT_MAGIC);
        out.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
        out.extend_from_slice(&header_len.to_le_bytes());
        out.extend_from_slice(&header);
        out.extend_from_slice(&self.weights);
        Ok(out)
    }

    /// Decode bytes produced by `to_bytes`.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ArtifactError> {
        if bytes.len() < PREFIX_LEN {
            return Err(if bytes.starts_with(ARTIFACT_MAGIC) {
                ArtifactError::Truncated
            } else {
                ArtifactError::BadMagic
            });
        }
        if &bytes[..8] != ARTIFACT_MAGIC {
            return Err(ArtifactError::BadMagic);
        }

        let version = read_u32(&bytes[8..12]);
        if version != FORMAT_VERSION {
            return Err(ArtifactError::UnsupportedVersion(version));
        }

        let header_len = read_u32(&bytes[12..16]) as usize;
        let header_end = PREFIX_LEN
            .checked_add(header_len)
            .filter(|&end| end <= bytes.len())
            .ok_or(ArtifactError::Truncated)?;

        let header = serde_json::from_slice(&bytes[PREFIX_LEN..header_end])?;
        let weights = bytes[header_end..].to_vec();
        if weights.is_empty() {
            return Err(ArtifactError::Truncated);
        }
        Ok(Self { header, weights })
    }
}

fn read_u32(bytes: &[u8]) -> u32 {
    let mut buf = [0u8; 4];
    buf.copy_from_slice(bytes);
    u32::from_le_bytes(buf)
}

/// Owns the well-known location of the promoted model.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    path: PathBuf,
}

impl ArtifactStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Replace the promoted artifact wholesale. Durable on return.
    pub fn replace(&self, bytes: &[u8]) -> Result<()> {
        write_atomic(&self.path, bytes)
            .with_context(|| format!("Failed to promote model to '{}'", self.path.display()))?;
        tracing::debug!("Promoted artifact written to '{}'", self.path.display());
        Ok(())
    }

    /// Read and decode the promoted artifact.
    pub fn load(&self) -> Result<ModelArtifact> {
        let bytes = fs::read(&self.path).with_context(|| {
            format!(
                "Cannot read model artifact '{}'. Have you run 'train' first?",
                self.path.display()
            )
        })?;
        ModelArtifact::from_bytes(&bytes)
            .with_context(|| format!("Model artifact '{}' is corrupt", self.path.display()))
    }
}

/// Write `bytes` to `path` so that readers never observe a partial file.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&dir)
        .with_context(|| format!("Cannot create directory '{}'", dir.display()))?;

    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .with_context(|| format!("'{}' has no file name", path.display()))?;
    let tmp = dir.join(format!(".{file_name}.tmp-{}", std::process::id()));

    let result = (|| -> Result<()> {
        let mut f = fs::File::create(&tmp)?;
        f.write_all(bytes)?;
        f.sync_all()?;
        drop(f);
        fs::rename(&tmp, path)?;
        Ok(())
    })();

    if result.is_err() {
        let _ = fs::remove_file(&tmp);
        return result;
    }

    // Persist the rename itself
    #[cfg(unix)]
    fs::File::open(&dir)?.sync_all()?;

    Ok(())
}
