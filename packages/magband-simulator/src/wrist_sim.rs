//! wrist_sim.rs — wrist and hand kinematics simulation
//!
//! Models the wearer's wrist attitude and five finger flexions over time:
//! - attitude driven by a configurable angular-rate profile (rest tremor,
//!   calibration rotation sweeps)
//! - finger presses as raised-cosine flexion cycles toward the flexed pose
//! - physiological tremor as a small oscillatory rate component
//!
//! Pure kinematics; the sensor measurement chain lives in `imu_physics.rs`.

use magband_fusion::HandGeometry;
use magband_types::{Quaternion, Vector3, N_FINGERS};
use serde::Deserialize;

use crate::scenarios::{ScenarioConfig, ScenarioType};

// ── Wrist state ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct WristState {
    /// Ground-truth device-to-world attitude.
    pub orientation: Quaternion,
    /// Ground-truth angular rate in the device frame, deg/s.
    pub angular_rate_dps: Vector3,
    /// Per-finger flexion, 0 = extended, 1 = fully flexed.
    pub flexion: [f64; N_FINGERS],
    /// Seconds since simulation start.
    pub t_elapsed: f64,
}

impl WristState {
    /// Ground-truth fingertip positions for the current flexion, mm.
    pub fn fingertips(&self, hand: &HandGeometry) -> [Vector3; N_FINGERS] {
        hand.interpolate(&self.flexion)
    }
}

// ── Simulation tick ───────────────────────────────────────────────────────────

pub struct WristSim {
    pub state: WristState,
    pub hand: HandGeometry,

    // Config
    tremor_amplitude_dps: f64,
    tremor_freq_hz: f64,
    sweep_rate_dps: f64,
    press_period_s: f64,
    press_hold_s: f64,
}

impl WristSim {
    pub fn new(cfg: &MotionConfig) -> Self {
        Self {
            state: WristState {
                orientation: Quaternion::identity(),
                angular_rate_dps: Vector3::zeros(),
                flexion: [0.0; N_FINGERS],
                t_elapsed: 0.0,
            },
            hand: HandGeometry::default(),
            tremor_amplitude_dps: cfg.tremor_amplitude_dps,
            tremor_freq_hz: cfg.tremor_freq_hz,
            sweep_rate_dps: cfg.sweep_rate_dps,
            press_period_s: cfg.press_period_s,
            press_hold_s: cfg.press_hold_s,
        }
    }

    /// Advance the wrist by dt seconds under the active scenarios.
    pub fn tick(&mut self, dt: f64, scenario: &ScenarioConfig) {
        self.state.t_elapsed += dt;
        let t = self.state.t_elapsed;

        // Angular rate: tremor plus an optional calibration sweep that cycles
        // through the three body axes so every mag axis sees the full field.
        let mut rate = Vector3::zeros();
        if scenario.has(&ScenarioType::Tremor) {
            let w = std::f64::consts::TAU * self.tremor_freq_hz;
            rate = Vector3::new(
                self.tremor_amplitude_dps * (w * t).sin(),
                self.tremor_amplitude_dps * (w * t * 0.9 + 1.0).sin(),
                0.0,
            );
        }
        if scenario.has(&ScenarioType::RotationSweep) {
            // 12 s per axis at the configured rate.
            let axis = ((t / 12.0) as usize) % 3;
            let mut sweep = Vector3::zeros();
            match axis {
                0 => sweep.x = self.sweep_rate_dps,
                1 => sweep.y = self.sweep_rate_dps,
                _ => sweep.z = self.sweep_rate_dps,
            }
            rate = rate.add(&sweep);
        }
        self.state.angular_rate_dps = rate;

        // Integrate attitude: q ← q ⊗ Δq(rate·dt) via small-angle Euler step.
        let half = rate.scale(std::f64::consts::PI / 180.0 * dt * 0.5);
        let dq = Quaternion { w: 1.0, x: half.x, y: half.y, z: half.z };
        self.state.orientation = quat_mul(&self.state.orientation, &dq).normalized();

        // Finger presses: raised-cosine flexion cycle on the scenario finger.
        for f in 0..N_FINGERS {
            let target = if scenario.has(&ScenarioType::FingerPress)
                && f == scenario.press_finger.min(N_FINGERS - 1)
            {
                press_profile(t, self.press_period_s, self.press_hold_s)
            } else {
                0.0
            };
            // First-order lag toward the target keeps flexion smooth.
            self.state.flexion[f] += (target - self.state.flexion[f]) * (dt * 10.0).min(1.0);
        }
    }
}

/// Hamilton product.
fn quat_mul(a: &Quaternion, b: &Quaternion) -> Quaternion {
    Quaternion {
        w: a.w * b.w - a.x * b.x - a.y * b.y - a.z * b.z,
        x: a.w * b.x + a.x * b.w + a.y * b.z - a.z * b.y,
        y: a.w * b.y - a.x * b.z + a.y * b.w + a.z * b.x,
        z: a.w * b.z + a.x * b.y - a.y * b.x + a.z * b.w,
    }
}

/// Raised-cosine press: ramp in, hold fully flexed, ramp out, rest.
fn press_profile(t: f64, period_s: f64, hold_s: f64) -> f64 {
    let phase = t % period_s;
    let ramp = (period_s - hold_s) / 2.0;
    if phase < ramp {
        0.5 * (1.0 - (std::f64::consts::PI * phase / ramp).cos())
    } else if phase < ramp + hold_s {
        1.0
    } else {
        let out = (phase - ramp - hold_s) / ramp;
        if out < 1.0 {
            0.5 * (1.0 + (std::f64::consts::PI * out).cos())
        } else {
            0.0
        }
    }
}

// ── Config struct (populated from config.toml) ────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct MotionConfig {
    pub tremor_amplitude_dps: f64,
    pub tremor_freq_hz: f64,
    pub sweep_rate_dps: f64,
    pub press_period_s: f64,
    pub press_hold_s: f64,
}
