//! mag_cal.rs — Stage 5: online magnetometer calibrator
//!
//! Learns, with nothing but user motion:
//! - hard-iron offset: running min/max midpoint per axis
//! - soft-iron diagonal scale: mean axis range over per-axis range
//! - Earth-field magnitude: windowed mean of |B_corrected| gated on
//!   stationarity
//! - residual quality and a composite confidence score
//!
//! Calibration survives sessions as a versioned JSON blob with a SHA-256
//! integrity digest; saves are announced through the `CalibrationSink`
//! listener on coverage transitions and every `save_interval_ms` thereafter.

use std::collections::VecDeque;

use chrono::Utc;
use magband_types::{MagCalibrationSnapshot, Vector3};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::config::CalibrationConfig;
use crate::error::CalibrationError;

/// Fallback |B_earth| before the online estimate latches, µT (mid-latitude).
pub const FALLBACK_EARTH_UT: f64 = 50.0;
/// Coverage factor: every axis range must span this multiple of |B_earth|.
const COVERAGE_FACTOR: f64 = 1.5;
/// Plausible Earth-field band, µT. `ready` never latches outside it.
const EARTH_MIN_UT: f64 = 20.0;
const EARTH_MAX_UT: f64 = 70.0;
/// Window for the Earth-magnitude mean/stability gate.
const EARTH_WINDOW: usize = 64;
/// Relative std-dev gate for the Earth estimate.
const EARTH_STABILITY: f64 = 0.10;
/// EMA coefficient of the residual-quality tracker.
const RESIDUAL_ALPHA: f64 = 0.1;

const BLOB_VERSION: u32 = 1;

/// Residual-quality classification of the current calibration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResidualQuality {
    Excellent,
    Good,
    Moderate,
    Poor,
}

impl ResidualQuality {
    pub fn classify(mean_residual_ut: f64) -> Self {
        if mean_residual_ut < 5.0 {
            Self::Excellent
        } else if mean_residual_ut < 10.0 {
            Self::Good
        } else if mean_residual_ut < 15.0 {
            Self::Moderate
        } else {
            Self::Poor
        }
    }
}

/// Why a save event fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveReason {
    /// Rotational coverage just crossed the auto-hard-iron gate.
    CoverageReached,
    /// Periodic refinement after coverage.
    PeriodicRefinement,
}

/// Emitted through the sink whenever the calibrator wants its state persisted.
pub struct CalibrationSaveEvent {
    pub reason: SaveReason,
    pub t_ms: u32,
    /// Opaque blob; hand back via `Pipeline::load_calibration_blob`.
    pub blob: Vec<u8>,
}

/// Listener interface for calibration persistence. Implementations must
/// return immediately (queue the blob, do not block the pipeline).
pub trait CalibrationSink {
    fn on_save(&mut self, event: &CalibrationSaveEvent);
}

// Everything that must round-trip losslessly across sessions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct CalibrationState {
    min: Vector3,
    max: Vector3,
    seen_any: bool,
    hard_iron: Vector3,
    soft_iron_scale: Vector3,
    hard_iron_calibrated: bool,
    soft_iron_calibrated: bool,
    auto_hard_iron_ready: bool,
    earth_window: Vec<f64>,
    stationary_samples: u64,
    earth_magnitude: f64,
    ready: bool,
    mean_residual: f64,
    residual_seen: bool,
    total_samples: u64,
}

impl Default for CalibrationState {
    fn default() -> Self {
        Self {
            min: Vector3::zeros(),
            max: Vector3::zeros(),
            seen_any: false,
            hard_iron: Vector3::zeros(),
            soft_iron_scale: Vector3::new(1.0, 1.0, 1.0),
            hard_iron_calibrated: false,
            soft_iron_calibrated: false,
            auto_hard_iron_ready: false,
            earth_window: Vec::new(),
            stationary_samples: 0,
            earth_magnitude: 0.0,
            ready: false,
            mean_residual: 0.0,
            residual_seen: false,
            total_samples: 0,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct CalibrationBlob {
    version: u32,
    saved_at_utc: String,
    /// SHA-256 over the canonical JSON serialization of `state`.
    sha256: String,
    state: CalibrationState,
}

pub struct MagCalibrator {
    cfg: CalibrationConfig,
    state: CalibrationState,
    earth_window: VecDeque<f64>,
    last_save_t_ms: Option<u32>,
}

impl MagCalibrator {
    pub fn new(cfg: CalibrationConfig) -> Self {
        Self {
            cfg,
            state: CalibrationState::default(),
            earth_window: VecDeque::with_capacity(EARTH_WINDOW),
            last_save_t_ms: None,
        }
    }

    /// Hard-iron estimate currently applied, µT. Zero until calibrated.
    pub fn hard_iron(&self) -> Vector3 {
        if self.state.hard_iron_calibrated {
            self.state.hard_iron
        } else {
            Vector3::zeros()
        }
    }

    /// Apply the current calibration to an axis-aligned measurement.
    /// Pure function of the calibration state: applying it twice with
    /// identical state is identical to applying it once to the same input.
    pub fn apply(&self, mag_ut: &Vector3) -> Vector3 {
        let mut v = *mag_ut;
        if self.state.hard_iron_calibrated {
            v = v.sub(&self.state.hard_iron);
        }
        if self.state.soft_iron_calibrated {
            v = v.hadamard(&self.state.soft_iron_scale);
        }
        v
    }

    /// Feed one aligned magnetometer sample.
    ///
    /// `expected_earth_ut` is the AHRS-supplied Earth field in the device
    /// frame (without hard iron) for the residual-quality tracker.
    pub fn update(
        &mut self,
        mag_ut: &Vector3,
        is_moving: bool,
        expected_earth_ut: Option<&Vector3>,
        t_ms: u32,
    ) -> Option<CalibrationSaveEvent> {
        self.state.total_samples += 1;

        // Hard-iron coverage accumulation.
        if self.state.seen_any {
            self.state.min = Vector3::new(
                self.state.min.x.min(mag_ut.x),
                self.state.min.y.min(mag_ut.y),
                self.state.min.z.min(mag_ut.z),
            );
            self.state.max = Vector3::new(
                self.state.max.x.max(mag_ut.x),
                self.state.max.y.max(mag_ut.y),
                self.state.max.z.max(mag_ut.z),
            );
        } else {
            self.state.min = *mag_ut;
            self.state.max = *mag_ut;
            self.state.seen_any = true;
        }

        let was_ready = self.state.auto_hard_iron_ready;
        let ranges = self.axis_ranges();
        let required = COVERAGE_FACTOR * self.earth_for_coverage();
        if ranges.x >= required && ranges.y >= required && ranges.z >= required {
            self.state.auto_hard_iron_ready = true;
            self.state.hard_iron = self.state.min.add(&self.state.max).scale(0.5);
            self.state.hard_iron_calibrated = true;

            let mean_range = (ranges.x + ranges.y + ranges.z) / 3.0;
            self.state.soft_iron_scale = Vector3::new(
                mean_range / ranges.x,
                mean_range / ranges.y,
                mean_range / ranges.z,
            );
            self.state.soft_iron_calibrated = true;
        }
        if self.state.auto_hard_iron_ready && !was_ready {
            info!(
                hard_iron_x = self.state.hard_iron.x,
                hard_iron_y = self.state.hard_iron.y,
                hard_iron_z = self.state.hard_iron.z,
                "magnetometer rotational coverage reached, hard iron locked"
            );
        }

        // Earth-field magnitude, gated on stationarity.
        let corrected = self.apply(mag_ut);
        if !is_moving {
            if self.earth_window.len() == EARTH_WINDOW {
                self.earth_window.pop_front();
            }
            self.earth_window.push_back(corrected.magnitude());
            self.state.stationary_samples += 1;

            let n = self.earth_window.len();
            let mean = self.earth_window.iter().sum::<f64>() / n as f64;
            let var = self
                .earth_window
                .iter()
                .map(|v| (v - mean) * (v - mean))
                .sum::<f64>()
                / n as f64;
            let stable = mean > 0.0 && var.sqrt() < EARTH_STABILITY * mean;
            let plausible = (EARTH_MIN_UT..=EARTH_MAX_UT).contains(&mean);
            if self.state.stationary_samples >= self.cfg.min_stationary_samples
                && stable
                && plausible
            {
                if !self.state.ready {
                    debug!(earth_ut = mean, "earth-field magnitude estimate latched");
                }
                self.state.earth_magnitude = mean;
                self.state.ready = true;
            } else if !self.state.ready {
                self.state.earth_magnitude = mean;
            }
        }

        // Residual-quality EMA against the AHRS expectation.
        if let Some(expected) = expected_earth_ut {
            let r = corrected.sub(expected).magnitude();
            if self.state.residual_seen {
                self.state.mean_residual += RESIDUAL_ALPHA * (r - self.state.mean_residual);
            } else {
                self.state.mean_residual = r;
                self.state.residual_seen = true;
            }
        }

        self.maybe_save(was_ready, t_ms)
    }

    fn maybe_save(&mut self, was_ready: bool, t_ms: u32) -> Option<CalibrationSaveEvent> {
        if !self.state.auto_hard_iron_ready {
            return None;
        }
        let reason = if !was_ready {
            SaveReason::CoverageReached
        } else {
            let due = match self.last_save_t_ms {
                Some(last) => t_ms.wrapping_sub(last) >= self.cfg.save_interval_ms,
                None => true,
            };
            if !due {
                return None;
            }
            SaveReason::PeriodicRefinement
        };
        self.last_save_t_ms = Some(t_ms);
        Some(CalibrationSaveEvent { reason, t_ms, blob: self.to_blob() })
    }

    fn earth_for_coverage(&self) -> f64 {
        if self.state.ready {
            self.state.earth_magnitude
        } else {
            FALLBACK_EARTH_UT
        }
    }

    fn axis_ranges(&self) -> Vector3 {
        if self.state.seen_any {
            self.state.max.sub(&self.state.min)
        } else {
            Vector3::zeros()
        }
    }

    pub fn snapshot(&self) -> MagCalibrationSnapshot {
        let ranges = self.axis_ranges();
        let required = COVERAGE_FACTOR * self.earth_for_coverage();
        let min_range = ranges.x.min(ranges.y).min(ranges.z);
        let progress = if required > 0.0 {
            (min_range / required).clamp(0.0, 1.0)
        } else {
            0.0
        };

        let residual_score = if self.state.residual_seen {
            (1.0 - self.state.mean_residual / 20.0).clamp(0.0, 1.0)
        } else {
            0.0
        };
        let confidence = 0.4 * progress
            + 0.2 * if self.state.ready { 1.0 } else { 0.0 }
            + 0.4 * residual_score;

        MagCalibrationSnapshot {
            hard_iron: self.state.hard_iron,
            soft_iron_scale: self.state.soft_iron_scale,
            earth_magnitude: self.state.earth_magnitude,
            axis_ranges: ranges,
            auto_hard_iron_progress: progress,
            auto_hard_iron_ready: self.state.auto_hard_iron_ready,
            ready: self.state.ready,
            hard_iron_calibrated: self.state.hard_iron_calibrated,
            soft_iron_calibrated: self.state.soft_iron_calibrated,
            mean_residual: self.state.mean_residual,
            confidence: confidence.clamp(0.0, 1.0),
            total_samples: self.state.total_samples,
        }
    }

    pub fn residual_quality(&self) -> ResidualQuality {
        ResidualQuality::classify(self.state.mean_residual)
    }

    // ── Persistence ──────────────────────────────────────────────────────────

    /// Serialize the full calibration state as an opaque blob.
    pub fn to_blob(&self) -> Vec<u8> {
        let mut state = self.state.clone();
        state.earth_window = self.earth_window.iter().copied().collect();
        let canonical = serde_json::to_vec(&state).expect("calibration state serializes");
        let digest = hex::encode(Sha256::digest(&canonical));
        let blob = CalibrationBlob {
            version: BLOB_VERSION,
            saved_at_utc: Utc::now().to_rfc3339(),
            sha256: digest,
            state,
        };
        serde_json::to_vec(&blob).expect("calibration blob serializes")
    }

    /// Restore a calibrator from a previously saved blob.
    pub fn from_blob(bytes: &[u8], cfg: CalibrationConfig) -> Result<Self, CalibrationError> {
        let blob: CalibrationBlob = serde_json::from_slice(bytes)?;
        if blob.version != BLOB_VERSION {
            return Err(CalibrationError::UnsupportedVersion(blob.version));
        }
        let canonical = serde_json::to_vec(&blob.state).expect("calibration state serializes");
        if hex::encode(Sha256::digest(&canonical)) != blob.sha256 {
            return Err(CalibrationError::DigestMismatch);
        }
        let mut state = blob.state;
        let earth_window: VecDeque<f64> = state.earth_window.drain(..).collect();
        Ok(Self { cfg, state, earth_window, last_save_t_ms: None })
    }
}
