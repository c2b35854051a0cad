//! imu_physics.rs — sensor measurement chain simulation
//!
//! Simulates the full band sensor chain for one sample:
//! 1. Rotate gravity and the Earth field into the device frame
//! 2. Add the fingertip dipole fields from the hand ground truth
//! 3. Apply hard-iron offset and diagonal soft-iron distortion
//! 4. Add Gaussian sensor noise and a fixed gyro bias
//! 5. Quantize to LSB and swap the magnetometer to its chip-native axis order
//!
//! Inverting steps 3–5 is exactly what the fusion pipeline is for, so the
//! simulator is the pipeline's adversary: everything it distorts, the
//! pipeline must undo.

use magband_fusion::dipole::DipoleConfig;
use magband_fusion::units::{ACCEL_LSB_PER_G, GYRO_LSB_PER_DPS, MAG_UT_PER_LSB};
use magband_types::{RawImuSample, Vector3, N_FINGERS};
use rand::Rng;
use rand_distr::{Distribution, Normal};
use serde::Deserialize;

use crate::scenarios::{ScenarioConfig, ScenarioType};
use crate::wrist_sim::WristState;

// ── Sensor configuration ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct SensorConfig {
    pub accel_noise_g: f64,
    pub gyro_noise_dps: f64,
    pub gyro_bias_dps: [f64; 3],
    pub mag_noise_ut: f64,
    pub hard_iron_ut: [f64; 3],
    pub soft_iron_distort: [f64; 3],
    pub earth_horizontal_ut: f64,
    pub earth_vertical_ut: f64,
    pub battery_start_pct: u8,
}

impl SensorConfig {
    pub fn earth_world(&self) -> Vector3 {
        Vector3::new(self.earth_horizontal_ut, 0.0, self.earth_vertical_ut)
    }
}

/// Ground truth paired with each emitted sample, for error displays and
/// pipeline validation. Never sent on the wire.
#[derive(Debug, Clone, serde::Serialize)]
pub struct SampleTruth {
    pub t_ms: u32,
    pub roll_deg: f64,
    pub pitch_deg: f64,
    pub yaw_deg: f64,
    pub flexion: [f64; N_FINGERS],
    /// Device-frame dipole field injected by the finger magnets, µT.
    pub anomaly_ut: [f64; 3],
}

// ── Measurement generator ─────────────────────────────────────────────────────

/// Generate one raw sample from the current wrist ground truth.
pub fn generate_sample(
    state: &WristState,
    fingertips_mm: &[Vector3; N_FINGERS],
    dipoles: &DipoleConfig,
    cfg: &SensorConfig,
    scenario: &ScenarioConfig,
    t_ms: u32,
    battery_pct: u8,
    rng: &mut impl Rng,
) -> (RawImuSample, SampleTruth) {
    let q = state.orientation;

    // Specific force: gravity in the device frame (linear acceleration from
    // hand motion is negligible at wrist scale).
    let accel_noise = Normal::new(0.0, cfg.accel_noise_g).unwrap();
    let accel_g = q.rotate_inverse(Vector3::new(0.0, 0.0, 1.0)).add(&Vector3::new(
        accel_noise.sample(rng),
        accel_noise.sample(rng),
        accel_noise.sample(rng),
    ));

    // Rate: truth + fixed bias + noise.
    let gyro_noise = Normal::new(0.0, cfg.gyro_noise_dps).unwrap();
    let gyro_dps = state
        .angular_rate_dps
        .add(&Vector3::new(
            cfg.gyro_bias_dps[0],
            cfg.gyro_bias_dps[1],
            cfg.gyro_bias_dps[2],
        ))
        .add(&Vector3::new(
            gyro_noise.sample(rng),
            gyro_noise.sample(rng),
            gyro_noise.sample(rng),
        ));

    // Field: Earth rotated into the device frame plus the fingertip dipoles.
    let earth_dev = q.rotate_inverse(cfg.earth_world());
    let anomaly = dipoles.predict_ut(fingertips_mm);
    let mut field = earth_dev.add(&anomaly);

    if scenario.has(&ScenarioType::MagInterference) {
        // Environmental interference burst: slow square wave on one axis.
        let phase = state.t_elapsed % scenario.interference_period_s;
        if phase < scenario.interference_period_s / 2.0 {
            field.x += scenario.interference_ut;
        }
    }

    // Iron distortion, then sensor noise.
    let mag_noise = Normal::new(0.0, cfg.mag_noise_ut).unwrap();
    let distorted = field
        .hadamard(&Vector3::new(
            cfg.soft_iron_distort[0],
            cfg.soft_iron_distort[1],
            cfg.soft_iron_distort[2],
        ))
        .add(&Vector3::new(
            cfg.hard_iron_ut[0],
            cfg.hard_iron_ut[1],
            cfg.hard_iron_ut[2],
        ))
        .add(&Vector3::new(
            mag_noise.sample(rng),
            mag_noise.sample(rng),
            mag_noise.sample(rng),
        ));

    let quant = |v: f64| -> i16 { v.round().clamp(i16::MIN as f64, i16::MAX as f64) as i16 };

    let raw = RawImuSample {
        t_ms,
        ax: quant(accel_g.x * ACCEL_LSB_PER_G),
        ay: quant(accel_g.y * ACCEL_LSB_PER_G),
        az: quant(accel_g.z * ACCEL_LSB_PER_G),
        gx: quant(gyro_dps.x * GYRO_LSB_PER_DPS),
        gy: quant(gyro_dps.y * GYRO_LSB_PER_DPS),
        gz: quant(gyro_dps.z * GYRO_LSB_PER_DPS),
        // Chip-native order: the magnetometer X/Y axes are transposed on the
        // wire; Stage 1 swaps them back.
        mx: quant(distorted.y / MAG_UT_PER_LSB),
        my: quant(distorted.x / MAG_UT_PER_LSB),
        mz: quant(distorted.z / MAG_UT_PER_LSB),
        mode: 0,
        context: 0,
        grip: false,
        light: Some(40),
        battery_pct: Some(battery_pct),
        temperature_c: Some(24),
        touch: None,
    };

    let euler = q.euler_angles();
    let truth = SampleTruth {
        t_ms,
        roll_deg: euler.roll_deg,
        pitch_deg: euler.pitch_deg,
        yaw_deg: euler.yaw_deg,
        flexion: state.flexion,
        anomaly_ut: [anomaly.x, anomaly.y, anomaly.z],
    };

    (raw, truth)
}

#[cfg(test)]
mod tests {
    use super::*;
    use magband_types::Quaternion;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn noiseless_cfg() -> SensorConfig {
        SensorConfig {
            accel_noise_g: 0.0,
            gyro_noise_dps: 0.0,
            gyro_bias_dps: [0.0; 3],
            mag_noise_ut: 0.0,
            hard_iron_ut: [5.0, -3.0, 8.0],
            soft_iron_distort: [1.0, 1.0, 1.0],
            earth_horizontal_ut: 20.0,
            earth_vertical_ut: 45.0,
            battery_start_pct: 100,
        }
    }

    #[test]
    fn flat_rest_sample_matches_physics() {
        let state = WristState {
            orientation: Quaternion::identity(),
            angular_rate_dps: Vector3::zeros(),
            flexion: [0.0; N_FINGERS],
            t_elapsed: 0.0,
        };
        // Magnets far away: zero out the moments so the field is Earth only.
        let dipoles = DipoleConfig {
            moments_am2: [Vector3::zeros(); N_FINGERS],
            fingertip_offset_mm: None,
        };
        let fingertips = [Vector3::new(0.0, 100.0, 0.0); N_FINGERS];
        let mut rng = StdRng::seed_from_u64(1);

        let (raw, truth) = generate_sample(
            &state,
            &fingertips,
            &dipoles,
            &noiseless_cfg(),
            &ScenarioConfig::default(),
            0,
            95,
            &mut rng,
        );

        assert_eq!(raw.az, 8192);
        assert_eq!(raw.gx, 0);
        // Wire carries chip order: mx holds the aligned-y field (0 + hard
        // iron y), my holds aligned-x (20 + hard iron x).
        assert_eq!(raw.mx, ((-3.0) / MAG_UT_PER_LSB).round() as i16);
        assert_eq!(raw.my, (25.0 / MAG_UT_PER_LSB).round() as i16);
        assert_eq!(raw.mz, (53.0 / MAG_UT_PER_LSB).round() as i16);
        assert_eq!(raw.battery_pct, Some(95));
        assert!(truth.roll_deg.abs() < 1e-9);
        assert_eq!(truth.anomaly_ut, [0.0; 3]);
    }
}
