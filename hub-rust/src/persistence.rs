//! Calibration blob persistence.
//!
//! The blob is opaque to the hub: an error on load simply means the pipeline
//! starts with an empty calibrator and re-learns online.

use std::path::Path;

use anyhow::Result;
use tokio::fs;
use tracing::{info, warn};

/// Load the persisted calibration blob. Returns None if the file is missing
/// or unreadable — both are normal for a first run.
pub async fn load_calibration(path: &Path) -> Option<Vec<u8>> {
    if !path.exists() {
        info!("No calibration blob at {}, starting uncalibrated", path.display());
        return None;
    }
    match fs::read(path).await {
        Ok(bytes) => {
            info!("Loaded calibration blob ({} bytes) from {}", bytes.len(), path.display());
            Some(bytes)
        }
        Err(e) => {
            warn!("Failed to read {}: {e}, starting uncalibrated", path.display());
            None
        }
    }
}

/// Persist the latest calibration blob. Last write wins: the pipeline
/// serializes save events with telemetry, so the newest blob is always the
/// one on disk.
pub async fn save_calibration(path: &Path, blob: &[u8]) -> Result<()> {
    fs::write(path, blob).await?;
    Ok(())
}
