//! Pipeline configuration.
//!
//! Every knob has the firmware default; binaries overlay values from a
//! `[pipeline]` TOML table. Sub-structs keep the option names grouped the way
//! the device exposes them (`madgwick.beta`, `kalman.q`, …).

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Nominal stream rate, Hz. Used only to seed the very first `dt`;
    /// afterwards `dt` always derives from device timestamps.
    /// 26 Hz when streaming live, 50 Hz for session replay.
    pub sample_freq_hz: f64,
    pub madgwick: MadgwickConfig,
    /// Magnetometer trust for the 9-DOF AHRS path, [0, 1]. Values ≤ 0.01
    /// disable magnetometer correction entirely.
    pub mag_trust: f64,
    pub kalman: KalmanConfig,
    pub particle_filter: ParticleFilterConfig,
    pub calibration: CalibrationConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            sample_freq_hz: 26.0,
            madgwick: MadgwickConfig::default(),
            mag_trust: 1.0,
            kalman: KalmanConfig::default(),
            particle_filter: ParticleFilterConfig::default(),
            calibration: CalibrationConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MadgwickConfig {
    /// Gradient-descent gain once the gyro bias is trusted.
    pub beta: f64,
    /// Gain while the bias estimator is still converging.
    pub beta_uncalibrated: f64,
    /// EMA coefficient of the stationary gyro-bias tracker.
    pub bias_alpha: f64,
}

impl Default for MadgwickConfig {
    fn default() -> Self {
        Self { beta: 0.05, beta_uncalibrated: 0.1, bias_alpha: 0.2 }
    }
}

/// Scalar residual smoother (Stage 8) noise parameters, µT².
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct KalmanConfig {
    pub q: f64,
    pub r: f64,
}

impl Default for KalmanConfig {
    fn default() -> Self {
        Self { q: 0.05, r: 2.0 }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ParticleFilterConfig {
    pub num_particles: usize,
    /// Per-step position process noise, mm (1σ).
    pub position_noise_mm: f64,
    /// Per-step velocity process noise, mm/s (1σ).
    pub velocity_noise_mms: f64,
    /// Resample when N_eff falls below this fraction of N.
    pub resample_threshold: f64,
    /// Dipole-likelihood measurement noise, µT (1σ).
    pub measurement_sigma_ut: f64,
    /// Fixed RNG seed; None draws from entropy.
    pub seed: Option<u64>,
}

impl Default for ParticleFilterConfig {
    fn default() -> Self {
        Self {
            num_particles: 500,
            position_noise_mm: 2.0,
            velocity_noise_mms: 5.0,
            resample_threshold: 0.5,
            measurement_sigma_ut: 10.0,
            seed: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CalibrationConfig {
    /// Stationary samples required before the Earth-field estimate can latch.
    pub min_stationary_samples: u64,
    /// Periodic calibration-save cadence once coverage is reached, ms of
    /// device time.
    pub save_interval_ms: u32,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self { min_stationary_samples: 50, save_interval_ms: 10_000 }
    }
}
