//! gyro_bias.rs — Stage 3: stationary gyro-bias tracker
//!
//! While the motion detector reports stationary, the bias follows the gyro
//! by an exponential moving average. α = 0.2 converges past 99% of a step in
//! about 50 stationary samples, which is also the calibration gate.

use magband_types::{BiasData, Vector3};

pub struct GyroBiasEstimator {
    /// Bias kept in rad/s internally; accessors speak deg/s.
    bias_rad_s: Vector3,
    alpha: f64,
    min_samples: u64,
    stationary_samples: u64,
}

impl GyroBiasEstimator {
    pub fn new(alpha: f64, min_samples: u64) -> Self {
        Self {
            bias_rad_s: Vector3::zeros(),
            alpha,
            min_samples,
            stationary_samples: 0,
        }
    }

    /// Feed one sample. Gyro input in deg/s as produced by Stage 1.
    pub fn update(&mut self, gyro_dps: &Vector3, is_moving: bool) -> BiasData {
        if !is_moving {
            let gyro_rad = gyro_dps.scale(std::f64::consts::PI / 180.0);
            let delta = gyro_rad.sub(&self.bias_rad_s);
            self.bias_rad_s = self.bias_rad_s.add(&delta.scale(self.alpha));
            self.stationary_samples += 1;
        }
        self.data()
    }

    pub fn data(&self) -> BiasData {
        BiasData {
            gyro_bias_dps: self.bias_dps(),
            calibrated: self.stationary_samples >= self.min_samples,
        }
    }

    pub fn bias_dps(&self) -> Vector3 {
        self.bias_rad_s.scale(180.0 / std::f64::consts::PI)
    }

    pub fn set_bias_dps(&mut self, bias_dps: Vector3) {
        self.bias_rad_s = bias_dps.scale(std::f64::consts::PI / 180.0);
    }

    pub fn reset(&mut self) {
        self.bias_rad_s = Vector3::zeros();
        self.stationary_samples = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converges_on_constant_offset() {
        let mut est = GyroBiasEstimator::new(0.2, 50);
        let drift = Vector3::new(1.5, -0.75, 0.25);
        let mut data = est.data();
        for _ in 0..50 {
            data = est.update(&drift, false);
        }
        assert!(data.calibrated);
        assert!(data.gyro_bias_dps.dist(&drift) < 0.01);
    }

    #[test]
    fn frozen_while_moving() {
        let mut est = GyroBiasEstimator::new(0.2, 50);
        for _ in 0..10 {
            est.update(&Vector3::new(0.5, 0.0, 0.0), false);
        }
        let before = est.bias_dps();
        for _ in 0..100 {
            let data = est.update(&Vector3::new(200.0, 0.0, 0.0), true);
            assert!(!data.calibrated);
        }
        assert!(est.bias_dps().dist(&before) < 1e-12);
    }

    #[test]
    fn deg_rad_accessors_round_trip() {
        let mut est = GyroBiasEstimator::new(0.2, 50);
        est.set_bias_dps(Vector3::new(2.0, -1.0, 0.5));
        assert!(est.bias_dps().dist(&Vector3::new(2.0, -1.0, 0.5)) < 1e-12);
    }
}
