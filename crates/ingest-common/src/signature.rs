//! Granule fingerprints used to detect re-ingestion.

use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::time::UNIX_EPOCH;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{IngestError, IngestResult};

/// How a granule's signature is computed.
///
/// `Sha256` fingerprints file content and survives touch/copy; `Mtime`
/// is cheap and sufficient when producers never rewrite files in place.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignatureScheme {
    #[default]
    Sha256,
    Mtime,
}

impl SignatureScheme {
    /// Compute the signature of a file. The same unchanged file always
    /// produces the same string.
    pub fn compute(&self, path: &Path) -> IngestResult<String> {
        match self {
            SignatureScheme::Sha256 => sha256_hex(path),
            SignatureScheme::Mtime => Ok(format!("{:.6}", mtime_seconds(path)?)),
        }
    }
}

/// Modification time of a file as float UNIX seconds.
pub fn mtime_seconds(path: &Path) -> IngestResult<f64> {
    let modified = std::fs::metadata(path)?.modified()?;
    let since_epoch = modified
        .duration_since(UNIX_EPOCH)
        .map_err(|e| IngestError::Granule(format!("mtime before epoch for {:?}: {}", path, e)))?;
    Ok(since_epoch.as_secs_f64())
}

fn sha256_hex(path: &Path) -> IngestResult<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];

    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }

    Ok(hex_string(&hasher.finalize()))
}

fn hex_string(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        out.push_str(&format!("{:02x}", b));
    }
    out
}
