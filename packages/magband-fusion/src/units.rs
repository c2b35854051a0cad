//! units.rs — Stage 1: LSB → physical-unit conversion
//!
//! Applies the per-chip scale constants, aligns the magnetometer axes to the
//! accel/gyro frame, and derives a clamped inter-sample interval from the
//! device timestamps. Raw LSB fields pass through untouched.

use magband_types::{RawImuSample, UnitData, Vector3};
use tracing::warn;

/// LSM6DS3 accelerometer at ±2 g.
pub const ACCEL_LSB_PER_G: f64 = 8192.0;
/// LSM6DS3 gyro at ±245 dps.
pub const GYRO_LSB_PER_DPS: f64 = 114.28;
/// MMC5603NJ, ±30 gauss over 16 bits: 100/1024 µT per LSB.
pub const MAG_UT_PER_LSB: f64 = 100.0 / 1024.0;

/// dt clamp bounds, seconds. Defensive against dropped samples and clock
/// jumps.
pub const DT_MIN_S: f64 = 0.001;
pub const DT_MAX_S: f64 = 1.0;

// Plausibility windows for the validation pass, raw LSB vector magnitude.
const ACCEL_PLAUSIBLE_LSB: f64 = 3.0 * ACCEL_LSB_PER_G;
const GYRO_PLAUSIBLE_LSB: f64 = 300.0 * GYRO_LSB_PER_DPS;
const MAG_PLAUSIBLE_LSB: f64 = 1000.0 / MAG_UT_PER_LSB;

pub struct UnitConverter {
    nominal_dt_s: f64,
    last_t_ms: Option<u32>,
}

impl UnitConverter {
    pub fn new(sample_freq_hz: f64) -> Self {
        Self {
            nominal_dt_s: (1.0 / sample_freq_hz).clamp(DT_MIN_S, DT_MAX_S),
            last_t_ms: None,
        }
    }

    /// Timestamp of the previously converted sample, if any.
    pub fn last_timestamp_ms(&self) -> Option<u32> {
        self.last_t_ms
    }

    /// Convert one raw sample. The first sample of a session uses the nominal
    /// interval; afterwards `dt = clamp((t_now − t_prev)/1000, 1 ms, 1 s)`.
    pub fn convert(&mut self, raw: &RawImuSample) -> UnitData {
        let dt_s = match self.last_t_ms {
            Some(prev) => ((raw.t_ms.saturating_sub(prev)) as f64 / 1000.0).clamp(DT_MIN_S, DT_MAX_S),
            None => self.nominal_dt_s,
        };
        self.last_t_ms = Some(raw.t_ms);

        // The magnetometer's native X/Y axes are transposed relative to the
        // accel/gyro axes in this package; swap once here so every later
        // stage sees a single right-handed frame.
        let mag_ut = Vector3::new(
            raw.my as f64 * MAG_UT_PER_LSB,
            raw.mx as f64 * MAG_UT_PER_LSB,
            raw.mz as f64 * MAG_UT_PER_LSB,
        );

        UnitData {
            accel_g: raw.accel_lsb().scale(1.0 / ACCEL_LSB_PER_G),
            gyro_dps: raw.gyro_lsb().scale(1.0 / GYRO_LSB_PER_DPS),
            mag_ut,
            dt_s,
        }
    }

    pub fn reset(&mut self) {
        self.last_t_ms = None;
    }
}

/// Plausibility check of raw LSB magnitudes. Out-of-range samples are
/// reported (and logged) but never dropped.
pub fn validate_raw(raw: &RawImuSample) -> bool {
    let mut ok = true;
    let a = raw.accel_lsb().magnitude();
    if a > ACCEL_PLAUSIBLE_LSB {
        warn!(t_ms = raw.t_ms, magnitude_lsb = a, "accel sample outside plausible range");
        ok = false;
    }
    let g = raw.gyro_lsb().magnitude();
    if g > GYRO_PLAUSIBLE_LSB {
        warn!(t_ms = raw.t_ms, magnitude_lsb = g, "gyro sample outside plausible range");
        ok = false;
    }
    let m = raw.mag_lsb().magnitude();
    if m > MAG_PLAUSIBLE_LSB {
        warn!(t_ms = raw.t_ms, magnitude_lsb = m, "mag sample outside plausible range");
        ok = false;
    }
    ok
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw_at(t_ms: u32) -> RawImuSample {
        RawImuSample {
            t_ms,
            ax: 0,
            ay: 0,
            az: 8192,
            gx: 0,
            gy: 0,
            gz: 0,
            mx: 0,
            my: 205,
            mz: 461,
            mode: 0,
            context: 0,
            grip: false,
            light: None,
            battery_pct: None,
            temperature_c: None,
            touch: None,
        }
    }

    #[test]
    fn applies_lsb_constants() {
        let mut conv = UnitConverter::new(50.0);
        let units = conv.convert(&raw_at(0));
        assert!((units.accel_g.z - 1.0).abs() < 1e-12);
        assert!((units.gyro_dps.magnitude()).abs() < 1e-12);
        // mx/my swapped during alignment: wire my → aligned x.
        assert!((units.mag_ut.x - 205.0 * MAG_UT_PER_LSB).abs() < 1e-12);
        assert!((units.mag_ut.y - 0.0).abs() < 1e-12);
        assert!((units.mag_ut.z - 461.0 * MAG_UT_PER_LSB).abs() < 1e-12);
    }

    #[test]
    fn dt_from_timestamps_with_clamp() {
        let mut conv = UnitConverter::new(50.0);
        assert!((conv.convert(&raw_at(0)).dt_s - 0.02).abs() < 1e-12);
        assert!((conv.convert(&raw_at(20)).dt_s - 0.02).abs() < 1e-12);
        // Dropped sample: doubled gap still inside the clamp.
        assert!((conv.convert(&raw_at(60)).dt_s - 0.04).abs() < 1e-12);
        // Clock jump clamps at 1 s.
        assert!((conv.convert(&raw_at(60_000)).dt_s - 1.0).abs() < 1e-12);
        // Duplicate timestamp clamps at 1 ms.
        assert!((conv.convert(&raw_at(60_000)).dt_s - 0.001).abs() < 1e-12);
    }

    #[test]
    fn validation_flags_implausible_magnitudes() {
        let mut sample = raw_at(0);
        assert!(validate_raw(&sample));
        sample.gx = i16::MAX;
        sample.gy = i16::MAX;
        assert!(!validate_raw(&sample));
    }
}
