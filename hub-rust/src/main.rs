//! main.rs — Magband hub entry point
//!
//! Composition:
//!   1. Load the persisted calibration blob for this hub's band
//!   2. Spawn the UDP ingest task (one fusion pipeline per source)
//!   3. Spawn the calibration writer task draining the save channel
//!   4. Consume magnet events on the main task
//!
//! The fusion pipeline itself is synchronous; everything async lives here.

mod ingest;
mod persistence;

use std::path::PathBuf;

use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

use ingest::{IngestConfig, MagnetEvent, SaveRequest};

fn calibration_path(device_key: &str) -> PathBuf {
    let dir = std::env::var("MAGBAND_CAL_DIR").unwrap_or_else(|_| ".".to_string());
    PathBuf::from(dir).join(format!("calibration-{device_key}.json"))
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "magband_hub=info".into()),
        )
        .init();

    let config = IngestConfig::default();
    let session_id = Uuid::new_v4();
    info!(
        "Magband hub starting — session {session_id}, device key '{}', \
         earth ({:.1}, {:.1}) µT, declination {:.1}°",
        config.device_key,
        config.geomag.horizontal_ut,
        config.geomag.vertical_ut,
        config.geomag.declination_deg,
    );

    let cal_path = calibration_path(&config.device_key);
    let calibration_blob = persistence::load_calibration(&cal_path).await;

    let (save_tx, mut save_rx) = mpsc::channel::<SaveRequest>(64);
    let (magnet_tx, mut magnet_rx) = mpsc::channel::<MagnetEvent>(64);

    // Calibration writer: drains save events so the pipeline never waits on
    // disk. Last write wins.
    tokio::spawn(async move {
        while let Some(request) = save_rx.recv().await {
            let path = calibration_path(&request.device_key);
            match persistence::save_calibration(&path, &request.blob).await {
                Ok(()) => info!(
                    "💾 calibration saved ({} bytes) at {} [{}]",
                    request.blob.len(),
                    path.display(),
                    chrono::Utc::now().format("%H:%M:%S"),
                ),
                Err(e) => warn!("calibration save failed: {e}"),
            }
        }
    });

    tokio::spawn(ingest::start_ingest(
        config,
        calibration_blob,
        save_tx,
        magnet_tx,
    ));

    // Magnet event consumer. Downstream integrations (session recorder,
    // gesture layer) subscribe here; for now events land in the log as JSON.
    while let Some(event) = magnet_rx.recv().await {
        match serde_json::to_string(&event) {
            Ok(line) => info!("magnet event: {line}"),
            Err(e) => warn!("magnet event serialize failed: {e}"),
        }
    }
}
