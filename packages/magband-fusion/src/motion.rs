//! motion.rs — Stage 2: rolling-window motion detector
//!
//! Tracks the standard deviation of raw accel and gyro vector magnitudes over
//! the last W samples. Thresholds are expressed in raw LSB so the detector is
//! insensitive to unit-conversion changes upstream.

use std::collections::VecDeque;

use magband_types::MotionData;

/// Window length W.
pub const WINDOW: usize = 10;
/// Motion thresholds, raw LSB.
pub const ACCEL_STD_THRESHOLD_LSB: f64 = 2000.0;
pub const GYRO_STD_THRESHOLD_LSB: f64 = 500.0;

pub struct MotionDetector {
    accel_mags: VecDeque<f64>,
    gyro_mags: VecDeque<f64>,
}

impl Default for MotionDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl MotionDetector {
    pub fn new() -> Self {
        Self {
            accel_mags: VecDeque::with_capacity(WINDOW),
            gyro_mags: VecDeque::with_capacity(WINDOW),
        }
    }

    pub fn update(&mut self, accel_mag_lsb: f64, gyro_mag_lsb: f64) -> MotionData {
        push_capped(&mut self.accel_mags, accel_mag_lsb);
        push_capped(&mut self.gyro_mags, gyro_mag_lsb);

        let accel_std = std_dev(&self.accel_mags);
        let gyro_std = std_dev(&self.gyro_mags);

        // Until the window is half full the detector stays quiet.
        let warmed_up = self.accel_mags.len() >= WINDOW / 2;
        let is_moving = warmed_up
            && (accel_std > ACCEL_STD_THRESHOLD_LSB || gyro_std > GYRO_STD_THRESHOLD_LSB);

        MotionData { accel_std_lsb: accel_std, gyro_std_lsb: gyro_std, is_moving }
    }

    pub fn reset(&mut self) {
        self.accel_mags.clear();
        self.gyro_mags.clear();
    }
}

fn push_capped(window: &mut VecDeque<f64>, value: f64) {
    if window.len() == WINDOW {
        window.pop_front();
    }
    window.push_back(value);
}

fn std_dev(window: &VecDeque<f64>) -> f64 {
    let n = window.len();
    if n < 2 {
        return 0.0;
    }
    let mean = window.iter().sum::<f64>() / n as f64;
    let var = window.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / n as f64;
    var.sqrt()
}
