//! kalman.rs — scalar residual smoother (Stage 8) and the 6-DOF
//! constant-velocity filter bank used for per-finger tracking.
//!
//! All matrix work is hand-rolled over fixed arrays. The only inversion is
//! 3×3, done in closed cofactor form with a singular guard that falls back to
//! identity instead of panicking. Covariances are re-symmetrized after every
//! update.

use magband_types::{SmoothedData, Vector3, N_FINGERS};

use crate::config::KalmanConfig;

// ── Scalar Kalman (per residual axis) ─────────────────────────────────────────

/// 1D Kalman filter with constant state model.
#[derive(Debug, Clone)]
pub struct ScalarKalman {
    q: f64,
    r: f64,
    x: f64,
    p: f64,
    initialized: bool,
}

impl ScalarKalman {
    pub fn new(q: f64, r: f64) -> Self {
        Self { q, r, x: 0.0, p: 0.0, initialized: false }
    }

    pub fn update(&mut self, z: f64) -> f64 {
        if !self.initialized {
            self.x = z;
            self.p = self.r;
            self.initialized = true;
            return self.x;
        }
        self.p += self.q;
        let k = self.p / (self.p + self.r);
        self.x += k * (z - self.x);
        self.p *= 1.0 - k;
        self.x
    }

    pub fn value(&self) -> f64 {
        self.x
    }

    pub fn reset(&mut self) {
        self.x = 0.0;
        self.p = 0.0;
        self.initialized = false;
    }
}

/// Stage 8: one scalar filter per residual axis.
pub struct ResidualSmoother {
    axes: [ScalarKalman; 3],
}

impl ResidualSmoother {
    pub fn new(cfg: &KalmanConfig) -> Self {
        Self { axes: std::array::from_fn(|_| ScalarKalman::new(cfg.q, cfg.r)) }
    }

    pub fn update(&mut self, residual_ut: &Vector3) -> SmoothedData {
        SmoothedData {
            filtered_mx: self.axes[0].update(residual_ut.x),
            filtered_my: self.axes[1].update(residual_ut.y),
            filtered_mz: self.axes[2].update(residual_ut.z),
        }
    }

    pub fn reset(&mut self) {
        for axis in &mut self.axes {
            axis.reset();
        }
    }
}

// ── 3×3 helpers ───────────────────────────────────────────────────────────────

/// Closed-form cofactor inverse. Near-singular matrices (|det| < 1e-10)
/// return identity so a degenerate update degrades instead of exploding.
pub fn invert3(m: &[[f64; 3]; 3]) -> [[f64; 3]; 3] {
    let c00 = m[1][1] * m[2][2] - m[1][2] * m[2][1];
    let c01 = m[1][2] * m[2][0] - m[1][0] * m[2][2];
    let c02 = m[1][0] * m[2][1] - m[1][1] * m[2][0];
    let det = m[0][0] * c00 + m[0][1] * c01 + m[0][2] * c02;
    if det.abs() < 1e-10 {
        return identity3();
    }
    let inv_det = 1.0 / det;
    [
        [
            c00 * inv_det,
            (m[0][2] * m[2][1] - m[0][1] * m[2][2]) * inv_det,
            (m[0][1] * m[1][2] - m[0][2] * m[1][1]) * inv_det,
        ],
        [
            c01 * inv_det,
            (m[0][0] * m[2][2] - m[0][2] * m[2][0]) * inv_det,
            (m[0][2] * m[1][0] - m[0][0] * m[1][2]) * inv_det,
        ],
        [
            c02 * inv_det,
            (m[0][1] * m[2][0] - m[0][0] * m[2][1]) * inv_det,
            (m[0][0] * m[1][1] - m[0][1] * m[1][0]) * inv_det,
        ],
    ]
}

fn identity3() -> [[f64; 3]; 3] {
    [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]]
}

// ── 6-DOF constant-velocity finger filter ─────────────────────────────────────

/// Initial position variance for a freshly initialized finger, mm².
const INITIAL_POS_VAR: f64 = 100.0;
/// Initial velocity variance, (mm/s)².
const INITIAL_VEL_VAR: f64 = 400.0;

/// State `(x, y, z, vx, vy, vz)` in mm and mm/s with a full 6×6 covariance.
///
/// `F(dt)` is the constant-velocity transition; the measurement selects
/// position. Process noise `Q = q·I₆`, measurement noise `R = r·I₃`.
#[derive(Debug, Clone)]
pub struct FingerKalman {
    x: [f64; 6],
    p: [[f64; 6]; 6],
    q: f64,
    r: f64,
    initialized: bool,
}

impl FingerKalman {
    pub fn new(process_noise_q: f64, measurement_noise_r: f64) -> Self {
        Self {
            x: [0.0; 6],
            p: [[0.0; 6]; 6],
            q: process_noise_q,
            r: measurement_noise_r,
            initialized: false,
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn initialize(&mut self, pos_mm: &Vector3) {
        self.x = [pos_mm.x, pos_mm.y, pos_mm.z, 0.0, 0.0, 0.0];
        self.p = [[0.0; 6]; 6];
        for i in 0..3 {
            self.p[i][i] = INITIAL_POS_VAR;
            self.p[i + 3][i + 3] = INITIAL_VEL_VAR;
        }
        self.initialized = true;
    }

    /// Propagate by the constant-velocity model: `x += v·dt`, `P = FPFᵀ + qI`.
    pub fn predict(&mut self, dt_s: f64) {
        if !self.initialized {
            return;
        }
        for i in 0..3 {
            self.x[i] += self.x[i + 3] * dt_s;
        }

        // FP: row i gains dt × row i+3 for the position rows.
        let mut fp = self.p;
        for i in 0..3 {
            for j in 0..6 {
                fp[i][j] += dt_s * self.p[i + 3][j];
            }
        }
        // (FP)Fᵀ: column j gains dt × column j+3 for the position columns.
        let mut fpft = fp;
        for i in 0..6 {
            for j in 0..3 {
                fpft[i][j] += dt_s * fp[i][j + 3];
            }
        }
        for (i, row) in fpft.iter_mut().enumerate() {
            row[i] += self.q;
        }
        self.p = fpft;
        self.symmetrize();
    }

    /// Fuse a position measurement, mm.
    pub fn update(&mut self, measured_pos_mm: &Vector3) {
        if !self.initialized {
            self.initialize(measured_pos_mm);
            return;
        }

        let z = [measured_pos_mm.x, measured_pos_mm.y, measured_pos_mm.z];
        let y = [z[0] - self.x[0], z[1] - self.x[1], z[2] - self.x[2]];

        // S = HPHᵀ + R is the position block of P plus R.
        let mut s = [[0.0; 3]; 3];
        for i in 0..3 {
            for j in 0..3 {
                s[i][j] = self.p[i][j];
            }
            s[i][i] += self.r;
        }
        let s_inv = invert3(&s);

        // K = PHᵀS⁻¹ (6×3).
        let mut k = [[0.0; 3]; 6];
        for i in 0..6 {
            for j in 0..3 {
                for l in 0..3 {
                    k[i][j] += self.p[i][l] * s_inv[l][j];
                }
            }
        }

        for i in 0..6 {
            self.x[i] += k[i][0] * y[0] + k[i][1] * y[1] + k[i][2] * y[2];
        }

        // P = (I − KH)P; KH only touches the first three columns of P's rows.
        let mut new_p = self.p;
        for i in 0..6 {
            for j in 0..6 {
                let mut kh_p = 0.0;
                for l in 0..3 {
                    kh_p += k[i][l] * self.p[l][j];
                }
                new_p[i][j] -= kh_p;
            }
        }
        self.p = new_p;
        self.symmetrize();
    }

    fn symmetrize(&mut self) {
        for i in 0..6 {
            for j in (i + 1)..6 {
                let avg = 0.5 * (self.p[i][j] + self.p[j][i]);
                self.p[i][j] = avg;
                self.p[j][i] = avg;
            }
        }
    }

    pub fn get_position(&self) -> Vector3 {
        Vector3::new(self.x[0], self.x[1], self.x[2])
    }

    pub fn get_velocity(&self) -> Vector3 {
        Vector3::new(self.x[3], self.x[4], self.x[5])
    }

    pub fn covariance(&self) -> &[[f64; 6]; 6] {
        &self.p
    }

    pub fn reset(&mut self) {
        self.x = [0.0; 6];
        self.p = [[0.0; 6]; 6];
        self.initialized = false;
    }
}

/// Five independent finger filters sharing one noise configuration.
pub struct FingerKalmanBank {
    fingers: [FingerKalman; N_FINGERS],
}

impl FingerKalmanBank {
    pub fn new(process_noise_q: f64, measurement_noise_r: f64) -> Self {
        Self {
            fingers: std::array::from_fn(|_| {
                FingerKalman::new(process_noise_q, measurement_noise_r)
            }),
        }
    }

    pub fn initialize(&mut self, poses_mm: &[Vector3; N_FINGERS]) {
        for (filter, pos) in self.fingers.iter_mut().zip(poses_mm) {
            filter.initialize(pos);
        }
    }

    pub fn predict(&mut self, dt_s: f64) {
        for filter in &mut self.fingers {
            filter.predict(dt_s);
        }
    }

    pub fn update(&mut self, finger: usize, measured_pos_mm: &Vector3) {
        self.fingers[finger].update(measured_pos_mm);
    }

    pub fn finger(&self, finger: usize) -> &FingerKalman {
        &self.fingers[finger]
    }

    pub fn positions(&self) -> [Vector3; N_FINGERS] {
        std::array::from_fn(|i| self.fingers[i].get_position())
    }

    pub fn reset(&mut self) {
        for filter in &mut self.fingers {
            filter.reset();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn max_asymmetry(p: &[[f64; 6]; 6]) -> f64 {
        let mut worst: f64 = 0.0;
        for i in 0..6 {
            for j in 0..6 {
                worst = worst.max((p[i][j] - p[j][i]).abs());
            }
        }
        worst
    }

    #[test]
    fn scalar_filter_converges_to_constant() {
        let mut k = ScalarKalman::new(0.05, 2.0);
        let mut x = 0.0;
        for _ in 0..200 {
            x = k.update(10.0);
        }
        assert!((x - 10.0).abs() < 0.01);
    }

    #[test]
    fn scalar_filter_smooths_alternating_noise() {
        let mut k = ScalarKalman::new(0.05, 2.0);
        let mut last = 0.0;
        for i in 0..400 {
            let z = 10.0 + if i % 2 == 0 { 1.0 } else { -1.0 };
            last = k.update(z);
        }
        // Output ripple is far below the ±1 input ripple.
        assert!((last - 10.0).abs() < 0.35);
    }

    #[test]
    fn invert3_inverts_and_guards_singular() {
        let m = [[4.0, 1.0, 0.5], [1.0, 3.0, 0.2], [0.5, 0.2, 5.0]];
        let inv = invert3(&m);
        for i in 0..3 {
            for j in 0..3 {
                let mut prod = 0.0;
                for l in 0..3 {
                    prod += m[i][l] * inv[l][j];
                }
                let expect = if i == j { 1.0 } else { 0.0 };
                assert!((prod - expect).abs() < 1e-9);
            }
        }

        let singular = [[1.0, 2.0, 3.0], [2.0, 4.0, 6.0], [0.0, 0.0, 0.0]];
        assert_eq!(invert3(&singular), identity3());
    }

    #[test]
    fn tracks_constant_velocity_target() {
        let mut f = FingerKalman::new(0.5, 4.0);
        let dt = 0.02;
        f.initialize(&Vector3::new(0.0, 60.0, 0.0));
        // Target moves at 50 mm/s along z.
        for step in 1..=300 {
            let t = step as f64 * dt;
            f.predict(dt);
            f.update(&Vector3::new(0.0, 60.0, -50.0 * t));
        }
        let v = f.get_velocity();
        assert!((v.z + 50.0).abs() < 5.0, "vz {}", v.z);
        let p = f.get_position();
        assert!((p.z + 50.0 * 300.0 * dt).abs() < 2.0, "pz {}", p.z);
    }

    #[test]
    fn covariance_stays_symmetric() {
        let mut f = FingerKalman::new(0.5, 4.0);
        f.initialize(&Vector3::new(10.0, 20.0, 30.0));
        for step in 0..100 {
            f.predict(0.02);
            f.update(&Vector3::new(
                10.0 + (step as f64 * 0.37).sin() * 3.0,
                20.0,
                30.0 - step as f64 * 0.1,
            ));
            assert!(max_asymmetry(f.covariance()) < 1e-9);
        }
    }

    #[test]
    fn first_update_initializes() {
        let mut bank = FingerKalmanBank::new(0.5, 4.0);
        assert!(!bank.finger(2).is_initialized());
        bank.update(2, &Vector3::new(0.0, 100.0, 0.0));
        assert!(bank.finger(2).is_initialized());
        assert!(bank.positions()[2].dist(&Vector3::new(0.0, 100.0, 0.0)) < 1e-12);
        // Other fingers untouched.
        assert!(!bank.finger(0).is_initialized());
    }
}
