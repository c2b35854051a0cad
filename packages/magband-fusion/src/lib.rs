//! # magband-fusion
//!
//! Real-time sensor fusion and magnetic inverse estimation for the Magband
//! wrist sensor: a strict eight-stage cascade from raw LSB samples to a
//! drift-compensated orientation, a calibrated magnetic residual, and a
//! classified finger-magnet anomaly — plus the per-finger trackers that
//! consume the residual (6-DOF Kalman bank and the dipole-weighted particle
//! filter).
//!
//! The pipeline is synchronous and single-threaded per session: each sample
//! is processed to completion before the next is accepted, outputs are
//! emitted in strict input order, and every mutable piece of state is owned
//! by exactly one stage. I/O (transport, calibration persistence) lives in
//! the adapter layer behind the one-sample-at-a-time boundary and the
//! `CalibrationSink` listener.
//!
//! ```no_run
//! use magband_fusion::{GeomagneticReference, Pipeline, PipelineConfig};
//! # fn next_sample() -> magband_types::RawImuSample { unimplemented!() }
//!
//! let mut pipeline = Pipeline::new(PipelineConfig::default());
//! pipeline.set_geomagnetic_reference(GeomagneticReference::default());
//! loop {
//!     let out = pipeline.process(next_sample()).unwrap();
//!     if let Some(magnet) = out.magnet() {
//!         println!("{:?} ({:.0} µT)", magnet.status, magnet.deviation_ut);
//!     }
//! }
//! ```

pub mod ahrs;
pub mod config;
pub mod dipole;
pub mod error;
pub mod geomag;
pub mod gyro_bias;
pub mod kalman;
pub mod mag_cal;
pub mod magnet;
pub mod motion;
pub mod particle;
pub mod pipeline;
pub mod units;

pub use ahrs::MadgwickAhrs;
pub use config::{
    CalibrationConfig, KalmanConfig, MadgwickConfig, ParticleFilterConfig, PipelineConfig,
};
pub use dipole::{DipoleConfig, HandGeometry};
pub use error::{CalibrationError, PipelineError};
pub use geomag::GeomagneticReference;
pub use kalman::{FingerKalman, FingerKalmanBank, ResidualSmoother, ScalarKalman};
pub use mag_cal::{
    CalibrationSaveEvent, CalibrationSink, MagCalibrator, ResidualQuality, SaveReason,
};
pub use magnet::MagnetDetector;
pub use particle::{Particle, ParticleFilter};
pub use pipeline::{form_residual, Pipeline};
