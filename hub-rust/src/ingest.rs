//! # ingest
//!
//! Telemetry ingest — receives 28-byte binary frames from bands via UDP,
//! validates them, and feeds each device's samples through its own fusion
//! pipeline instance.
//!
//! ## Architecture
//! Runs as a separate Tokio task alongside the event consumer. It:
//!   1. Binds a UDP socket on port 5560 (configurable via MAGBAND_UDP_PORT)
//!   2. Decodes TelemetryFrames (magic check, flag-gated aux fields)
//!   3. Rejects stale/replayed frames via per-device timestamp tracking
//!   4. Processes samples synchronously through the per-device pipeline
//!   5. Forwards magnet status transitions and calibration save events over
//!      channels — the pipeline is never blocked on I/O
//!
//! UDP errors never crash the hub; malformed frames are logged and dropped.

use std::collections::HashMap;
use std::net::SocketAddr;

use magband_fusion::{
    CalibrationSaveEvent, CalibrationSink, GeomagneticReference, Pipeline, PipelineConfig,
    PipelineError,
};
use magband_types::wire::TelemetryFrame;
use magband_types::MagnetStatus;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

// ── Configuration ─────────────────────────────────────────────────────────────

pub struct IngestConfig {
    /// UDP port to listen on (default 5560)
    pub udp_port: u16,
    /// Stable calibration key for this hub's band
    pub device_key: String,
    /// Session geomagnetic reference (from geolocation lookup upstream, or
    /// the mid-latitude default)
    pub geomag: GeomagneticReference,
}

impl Default for IngestConfig {
    fn default() -> Self {
        let env_f64 = |key: &str| std::env::var(key).ok().and_then(|v| v.parse::<f64>().ok());
        let mut geomag = GeomagneticReference::default();
        if let Some(h) = env_f64("MAGBAND_EARTH_H_UT") {
            geomag.horizontal_ut = h;
        }
        if let Some(v) = env_f64("MAGBAND_EARTH_V_UT") {
            geomag.vertical_ut = v;
        }
        if let Some(d) = env_f64("MAGBAND_DECLINATION_DEG") {
            geomag.declination_deg = d;
        }
        Self {
            udp_port: std::env::var("MAGBAND_UDP_PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(5560),
            device_key: std::env::var("MAGBAND_DEVICE_KEY")
                .unwrap_or_else(|_| "band-0".to_string()),
            geomag,
        }
    }
}

// ── Channel messages ──────────────────────────────────────────────────────────

/// Magnet status transition, forwarded to the event consumer.
#[derive(Debug, serde::Serialize)]
pub struct MagnetEvent {
    pub source: SocketAddr,
    pub t_ms: u32,
    pub status: MagnetStatus,
    pub deviation_ut: f64,
    pub confidence: f64,
}

/// Calibration blob queued for the disk writer.
pub struct SaveRequest {
    pub device_key: String,
    pub blob: Vec<u8>,
}

/// Non-blocking calibration sink: hands blobs to the writer task. A full
/// queue drops the save — the next periodic refinement supersedes it anyway.
struct ChannelSink {
    device_key: String,
    tx: mpsc::Sender<SaveRequest>,
}

impl CalibrationSink for ChannelSink {
    fn on_save(&mut self, event: &CalibrationSaveEvent) {
        let request = SaveRequest {
            device_key: self.device_key.clone(),
            blob: event.blob.clone(),
        };
        if self.tx.try_send(request).is_err() {
            debug!("calibration save queue full, dropping one refinement");
        }
    }
}

// ── Per-device session ────────────────────────────────────────────────────────

struct DeviceSession {
    pipeline: Pipeline,
    last_t_ms: u32,
    last_status: MagnetStatus,
    samples: u64,
}

// ── Main UDP listener task ────────────────────────────────────────────────────

/// Start the ingest listener. Each source address gets an independent
/// pipeline instance pre-loaded with the persisted calibration.
pub async fn start_ingest(
    config: IngestConfig,
    calibration_blob: Option<Vec<u8>>,
    save_tx: mpsc::Sender<SaveRequest>,
    magnet_tx: mpsc::Sender<MagnetEvent>,
) {
    let addr = format!("0.0.0.0:{}", config.udp_port);
    let socket = match UdpSocket::bind(&addr).await {
        Ok(s) => {
            info!("📡 Magband hub listening on UDP {addr}");
            s
        }
        Err(e) => {
            warn!("Ingest: could not bind UDP {addr}: {e} (no transport — exiting task)");
            return;
        }
    };

    let mut sessions: HashMap<SocketAddr, DeviceSession> = HashMap::new();
    let mut buf = [0u8; 256];

    loop {
        match socket.recv_from(&mut buf).await {
            Ok((len, src)) => {
                process_datagram(
                    &buf[..len],
                    src,
                    &config,
                    calibration_blob.as_deref(),
                    &save_tx,
                    &magnet_tx,
                    &mut sessions,
                );
            }
            Err(e) => {
                // Never crash — log and continue.
                warn!("Ingest: UDP recv error: {e}");
            }
        }
    }
}

fn process_datagram(
    data: &[u8],
    src: SocketAddr,
    config: &IngestConfig,
    calibration_blob: Option<&[u8]>,
    save_tx: &mpsc::Sender<SaveRequest>,
    magnet_tx: &mpsc::Sender<MagnetEvent>,
    sessions: &mut HashMap<SocketAddr, DeviceSession>,
) {
    let frame = match TelemetryFrame::decode(data) {
        Ok(f) => f,
        Err(e) => {
            debug!("Ingest: malformed frame from {src}: {e}");
            return;
        }
    };
    let raw = frame.to_raw_sample();

    let session = sessions.entry(src).or_insert_with(|| {
        info!("New band session from {src}");
        let mut pipeline = Pipeline::new(PipelineConfig::default());
        pipeline.set_geomagnetic_reference(config.geomag);
        if let Some(blob) = calibration_blob {
            match pipeline.load_calibration_blob(blob) {
                Ok(()) => info!("Session {src}: calibration warm-started"),
                Err(e) => warn!("Session {src}: calibration blob rejected: {e}"),
            }
        }
        pipeline.set_calibration_sink(Box::new(ChannelSink {
            device_key: config.device_key.clone(),
            tx: save_tx.clone(),
        }));
        DeviceSession {
            pipeline,
            last_t_ms: 0,
            last_status: MagnetStatus::None,
            samples: 0,
        }
    });

    // Replay/stale rejection: device timestamps are monotonic per session.
    if session.samples > 0 && raw.t_ms < session.last_t_ms {
        warn!(
            "Ingest: rejected stale frame from {src}: t={} (last: {})",
            raw.t_ms, session.last_t_ms
        );
        return;
    }

    let out = match session.pipeline.process(raw) {
        Ok(out) => out,
        Err(PipelineError::NonFiniteOrientation) => {
            // Fatal for the session: reset and re-seed from the next sample.
            warn!("Session {src}: orientation diverged, resetting pipeline");
            session.pipeline.reset();
            session.samples = 0;
            return;
        }
        Err(e) => {
            debug!("Session {src}: sample rejected: {e}");
            return;
        }
    };
    session.last_t_ms = raw.t_ms;
    session.samples += 1;

    if let Some(magnet) = out.magnet() {
        if magnet.status != session.last_status {
            info!(
                "🧲 {src}: {:?} → {:?} (deviation {:.1} µT, confidence {:.2})",
                session.last_status, magnet.status, magnet.deviation_ut, magnet.confidence
            );
            let _ = magnet_tx.try_send(MagnetEvent {
                source: src,
                t_ms: raw.t_ms,
                status: magnet.status,
                deviation_ut: magnet.deviation_ut,
                confidence: magnet.confidence,
            });
            session.last_status = magnet.status;
        }
    }

    if session.samples % 260 == 0 {
        let snapshot = session.pipeline.calibration_snapshot();
        let euler = out.orientation().map(|o| o.euler).unwrap_or_default();
        debug!(
            "{src}: {} samples | roll={:+.1}° pitch={:+.1}° yaw={:+.1}° | cal conf {:.2}",
            session.samples, euler.roll_deg, euler.pitch_deg, euler.yaw_deg, snapshot.confidence
        );
    }
}
