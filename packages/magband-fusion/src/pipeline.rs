//! pipeline.rs — the eight-stage telemetry cascade
//!
//! One `process` call takes a raw sample through unit conversion, motion
//! detection, gyro-bias tracking, the AHRS, magnetometer calibration,
//! residual forming, magnet detection, and residual smoothing — synchronously
//! and in order. Each stage owns its mutable state; stages communicate only
//! through the additive stage record.
//!
//! Stages 6–8 need a geomagnetic reference; without one the pipeline emits
//! the `Calibrated` variant and downstream consumers see the narrowing
//! predicates fail.

use magband_types::{
    BiasData, CalibratedSample, CalibrationData, OrientationData, RawImuSample, ResidualData,
    SmoothedSample, StageSample, Vector3,
};

use crate::ahrs::MadgwickAhrs;
use crate::config::PipelineConfig;
use crate::error::{CalibrationError, PipelineError};
use crate::geomag::GeomagneticReference;
use crate::gyro_bias::GyroBiasEstimator;
use crate::kalman::ResidualSmoother;
use crate::mag_cal::{CalibrationSink, MagCalibrator};
use crate::magnet::MagnetDetector;
use crate::motion::MotionDetector;
use crate::units::{validate_raw, UnitConverter};

/// Stage 6: componentwise difference between the calibrated magnetometer
/// vector and the expected device-frame Earth field. Pure function.
pub fn form_residual(mag_calibrated_ut: &Vector3, expected_earth_ut: &Vector3) -> ResidualData {
    let residual = mag_calibrated_ut.sub(expected_earth_ut);
    ResidualData { residual_ut: residual, magnitude_ut: residual.magnitude() }
}

pub struct Pipeline {
    cfg: PipelineConfig,
    converter: UnitConverter,
    motion: MotionDetector,
    bias: GyroBiasEstimator,
    ahrs: MadgwickAhrs,
    ahrs_seeded: bool,
    calibrator: MagCalibrator,
    detector: MagnetDetector,
    smoother: ResidualSmoother,
    geomag: Option<GeomagneticReference>,
    sink: Option<Box<dyn CalibrationSink + Send>>,
}

impl Pipeline {
    pub fn new(cfg: PipelineConfig) -> Self {
        Self {
            converter: UnitConverter::new(cfg.sample_freq_hz),
            motion: MotionDetector::new(),
            bias: GyroBiasEstimator::new(
                cfg.madgwick.bias_alpha,
                cfg.calibration.min_stationary_samples,
            ),
            ahrs: MadgwickAhrs::new(cfg.madgwick.beta_uncalibrated),
            ahrs_seeded: false,
            calibrator: MagCalibrator::new(cfg.calibration.clone()),
            detector: MagnetDetector::new(),
            smoother: ResidualSmoother::new(&cfg.kalman),
            geomag: None,
            sink: None,
            cfg,
        }
    }

    /// Install the session's geomagnetic reference. Read-only afterwards.
    pub fn set_geomagnetic_reference(&mut self, reference: GeomagneticReference) {
        self.geomag = Some(reference);
    }

    pub fn geomagnetic_reference(&self) -> Option<&GeomagneticReference> {
        self.geomag.as_ref()
    }

    /// Pre-load persisted calibration. New sessions start with the prior
    /// state and refine it in place.
    pub fn load_calibration_blob(&mut self, blob: &[u8]) -> Result<(), CalibrationError> {
        self.calibrator = MagCalibrator::from_blob(blob, self.cfg.calibration.clone())?;
        Ok(())
    }

    /// Serialize the current calibration for external persistence.
    pub fn calibration_blob(&self) -> Vec<u8> {
        self.calibrator.to_blob()
    }

    /// Install the persistence listener. The sink must return immediately.
    pub fn set_calibration_sink(&mut self, sink: Box<dyn CalibrationSink + Send>) {
        self.sink = Some(sink);
    }

    pub fn ahrs(&self) -> &MadgwickAhrs {
        &self.ahrs
    }

    pub fn calibration_snapshot(&self) -> magband_types::MagCalibrationSnapshot {
        self.calibrator.snapshot()
    }

    /// Process one raw sample to completion through every stage.
    ///
    /// Emits the deepest achievable variant in strict input order. On a
    /// malformed sample the pipeline state is unchanged; on a non-finite
    /// orientation the session must be `reset`.
    pub fn process(&mut self, raw: RawImuSample) -> Result<StageSample, PipelineError> {
        // Input shape gate before any state mutation.
        if let Some(prev) = self.converter.last_timestamp_ms() {
            if raw.t_ms < prev {
                return Err(PipelineError::MalformedSample(format!(
                    "timestamp regressed: {} after {}",
                    raw.t_ms, prev
                )));
            }
        }
        validate_raw(&raw);

        // Stage 1: units.
        let units = self.converter.convert(&raw);

        // Stage 2: motion.
        let motion = self
            .motion
            .update(raw.accel_lsb().magnitude(), raw.gyro_lsb().magnitude());

        // Stage 3: gyro bias.
        let bias = self.bias.update(&units.gyro_dps, motion.is_moving);

        // Stage 4: AHRS.
        let orientation = self.run_ahrs(&units.accel_g, &units.gyro_dps, &units.mag_ut, &bias, units.dt_s)?;

        // Stage 5: magnetometer calibration.
        let expected_calibrated = self
            .geomag
            .as_ref()
            .map(|g| self.ahrs.expected_earth_device_calibrated(g));
        let save_event = self.calibrator.update(
            &units.mag_ut,
            motion.is_moving,
            expected_calibrated.as_ref(),
            raw.t_ms,
        );
        if let (Some(event), Some(sink)) = (save_event, self.sink.as_mut()) {
            sink.on_save(&event);
        }
        let calibration = CalibrationData {
            mag_calibrated_ut: self.calibrator.apply(&units.mag_ut),
            snapshot: self.calibrator.snapshot(),
        };

        let expected_calibrated = match expected_calibrated {
            Some(e) => e,
            None => {
                return Ok(StageSample::Calibrated(CalibratedSample {
                    raw,
                    units,
                    motion,
                    bias,
                    orientation,
                    calibration,
                }));
            }
        };

        // Stage 6: residual former.
        let residual = form_residual(&calibration.mag_calibrated_ut, &expected_calibrated);

        // Stage 7: magnet detector.
        let magnet = self.detector.update(residual.magnitude_ut);

        // Stage 8: residual smoother.
        let smoothed = self.smoother.update(&residual.residual_ut);

        Ok(StageSample::Smoothed(SmoothedSample {
            raw,
            units,
            motion,
            bias,
            orientation,
            calibration,
            residual,
            magnet,
            smoothed,
        }))
    }

    fn run_ahrs(
        &mut self,
        accel_g: &Vector3,
        gyro_dps: &Vector3,
        mag_ut: &Vector3,
        bias: &BiasData,
        dt_s: f64,
    ) -> Result<OrientationData, PipelineError> {
        if !self.ahrs_seeded {
            self.ahrs_seeded = self.ahrs.init_from_accel(accel_g);
        }
        self.ahrs.set_beta(if bias.calibrated {
            self.cfg.madgwick.beta
        } else {
            self.cfg.madgwick.beta_uncalibrated
        });

        let gyro_corrected = gyro_dps.sub(&bias.gyro_bias_dps);
        let mag_hard_iron_free = mag_ut.sub(&self.calibrator_hard_iron());
        let quaternion = self.ahrs.update(
            &gyro_corrected,
            accel_g,
            Some(&mag_hard_iron_free),
            self.cfg.mag_trust,
            dt_s,
        )?;

        let (expected, residual, residual_mag) = match self.geomag.as_ref() {
            Some(g) => {
                let expected = self.ahrs.expected_earth_device(g, &self.calibrator_hard_iron());
                let residual = mag_ut.sub(&expected);
                (Some(expected), Some(residual), Some(residual.magnitude()))
            }
            None => (None, None, None),
        };

        Ok(OrientationData {
            quaternion,
            euler: quaternion.euler_angles(),
            expected_earth_ut: expected,
            earth_residual_ut: residual,
            earth_residual_magnitude_ut: residual_mag,
        })
    }

    fn calibrator_hard_iron(&self) -> Vector3 {
        self.calibrator.hard_iron()
    }

    /// Synchronous session reset: clears every per-session stage state.
    /// Calibration remains loaded.
    pub fn reset(&mut self) {
        self.converter.reset();
        self.motion.reset();
        self.bias.reset();
        self.ahrs.reset();
        self.ahrs_seeded = false;
        self.detector.reset();
        self.smoother.reset();
    }
}
