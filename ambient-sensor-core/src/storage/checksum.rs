use std::fs;
use std::path::Path;

use sha2::{Digest, Sha256};

use crate::models::error::SensorError;

/// Compute SHA-256 hex digest of a file.
pub fn sha256_file(path: &Path) -> Result<String, SensorError> {
    let data = fs::read(path)
        .map_err(|e| SensorError::SegmentWriteFailure(format!("failed to read file for checksum: {}", e)))?;
    let digest = Sha256::digest(&data);
    Ok(hex_encode(&digest))
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}
