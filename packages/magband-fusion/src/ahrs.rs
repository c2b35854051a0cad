//! ahrs.rs — Stage 4: Madgwick attitude and heading reference
//!
//! Gradient-descent quaternion filter in fully expanded scalar form (no
//! matrix library, embedded-friendly). Two paths:
//!
//! - 6-DOF: gyro integration corrected against the gravity direction.
//! - 9-DOF: adds the magnetometer objective. The Earth-field reference
//!   `(b_x, 0, b_z)` is rebuilt from the current attitude every update, so
//!   the yaw correction stays valid at any orientation. The effective gain
//!   is `β·(1 + τ)` where τ is the magnetometer trust.
//!
//! The quaternion is renormalized after every update; a non-finite result is
//! fatal and the caller must reset the filter.

use magband_types::{EulerAngles, Quaternion, Vector3};

use crate::error::PipelineError;
use crate::geomag::GeomagneticReference;

/// Below this magnitude a sensor vector cannot be normalized and its
/// correction term is skipped for the update.
const NORM_EPS: f64 = 1e-9;
/// Magnetometer trust values at or below this disable the 9-DOF path.
pub const MIN_MAG_TRUST: f64 = 0.01;

pub struct MadgwickAhrs {
    q: Quaternion,
    beta: f64,
}

impl MadgwickAhrs {
    pub fn new(beta: f64) -> Self {
        Self { q: Quaternion::identity(), beta }
    }

    pub fn quaternion(&self) -> Quaternion {
        self.q
    }

    pub fn euler(&self) -> EulerAngles {
        self.q.euler_angles()
    }

    pub fn set_beta(&mut self, beta: f64) {
        self.beta = beta;
    }

    /// Synthesize an initial attitude from a single accelerometer reading:
    /// roll and pitch from gravity, yaw = 0. Returns false (and leaves the
    /// identity attitude) when the reading is degenerate.
    pub fn init_from_accel(&mut self, accel_g: &Vector3) -> bool {
        if accel_g.magnitude() < NORM_EPS {
            return false;
        }
        let roll = accel_g.y.atan2(accel_g.z);
        let pitch = (-accel_g.x).atan2((accel_g.y * accel_g.y + accel_g.z * accel_g.z).sqrt());
        self.q = Quaternion::from_euler(roll, pitch, 0.0);
        true
    }

    pub fn reset(&mut self) {
        self.q = Quaternion::identity();
    }

    /// One filter step.
    ///
    /// - `gyro_dps`: bias-subtracted rate, deg/s
    /// - `accel_g`: specific force, g
    /// - `mag_ut`: hard-iron-subtracted field, µT; `None` forces the 6-DOF path
    /// - `mag_trust`: τ ∈ [0, 1]
    pub fn update(
        &mut self,
        gyro_dps: &Vector3,
        accel_g: &Vector3,
        mag_ut: Option<&Vector3>,
        mag_trust: f64,
        dt_s: f64,
    ) -> Result<Quaternion, PipelineError> {
        let gyro = gyro_dps.scale(std::f64::consts::PI / 180.0);

        let use_mag = mag_trust > MIN_MAG_TRUST
            && mag_ut.map(|m| m.magnitude() > NORM_EPS).unwrap_or(false);

        let q = if use_mag {
            self.step_9dof(&gyro, accel_g, mag_ut.unwrap(), mag_trust, dt_s)
        } else {
            self.step_6dof(&gyro, accel_g, dt_s)
        };

        if !q.is_finite() {
            return Err(PipelineError::NonFiniteOrientation);
        }
        self.q = q.normalized();
        Ok(self.q)
    }

    fn step_6dof(&self, gyro: &Vector3, accel: &Vector3, dt: f64) -> Quaternion {
        let (q0, q1, q2, q3) = (self.q.w, self.q.x, self.q.y, self.q.z);
        let (gx, gy, gz) = (gyro.x, gyro.y, gyro.z);

        // Quaternion rate from gyro.
        let mut q_dot0 = 0.5 * (-q1 * gx - q2 * gy - q3 * gz);
        let mut q_dot1 = 0.5 * (q0 * gx + q2 * gz - q3 * gy);
        let mut q_dot2 = 0.5 * (q0 * gy - q1 * gz + q3 * gx);
        let mut q_dot3 = 0.5 * (q0 * gz + q1 * gy - q2 * gx);

        let a_norm = accel.magnitude();
        if a_norm > NORM_EPS {
            let ax = accel.x / a_norm;
            let ay = accel.y / a_norm;
            let az = accel.z / a_norm;

            let _2q0 = 2.0 * q0;
            let _2q1 = 2.0 * q1;
            let _2q2 = 2.0 * q2;
            let _2q3 = 2.0 * q3;
            let _4q0 = 4.0 * q0;
            let _4q1 = 4.0 * q1;
            let _4q2 = 4.0 * q2;
            let _8q1 = 8.0 * q1;
            let _8q2 = 8.0 * q2;
            let q0q0 = q0 * q0;
            let q1q1 = q1 * q1;
            let q2q2 = q2 * q2;
            let q3q3 = q3 * q3;

            // Gradient of the gravity objective.
            let mut s0 = _4q0 * q2q2 + _2q2 * ax + _4q0 * q1q1 - _2q1 * ay;
            let mut s1 = _4q1 * q3q3 - _2q3 * ax + 4.0 * q0q0 * q1 - _2q0 * ay - _4q1
                + _8q1 * q1q1
                + _8q1 * q2q2
                + _4q1 * az;
            let mut s2 = 4.0 * q0q0 * q2 + _2q0 * ax + _4q2 * q3q3 - _2q3 * ay - _4q2
                + _8q2 * q1q1
                + _8q2 * q2q2
                + _4q2 * az;
            let mut s3 = 4.0 * q1q1 * q3 - _2q1 * ax + 4.0 * q2q2 * q3 - _2q2 * ay;

            let s_norm = (s0 * s0 + s1 * s1 + s2 * s2 + s3 * s3).sqrt();
            if s_norm > NORM_EPS {
                s0 /= s_norm;
                s1 /= s_norm;
                s2 /= s_norm;
                s3 /= s_norm;

                q_dot0 -= self.beta * s0;
                q_dot1 -= self.beta * s1;
                q_dot2 -= self.beta * s2;
                q_dot3 -= self.beta * s3;
            }
        }

        Quaternion {
            w: q0 + q_dot0 * dt,
            x: q1 + q_dot1 * dt,
            y: q2 + q_dot2 * dt,
            z: q3 + q_dot3 * dt,
        }
    }

    fn step_9dof(
        &self,
        gyro: &Vector3,
        accel: &Vector3,
        mag: &Vector3,
        mag_trust: f64,
        dt: f64,
    ) -> Quaternion {
        let a_norm = accel.magnitude();
        let m_norm = mag.magnitude();
        if a_norm < NORM_EPS || m_norm < NORM_EPS {
            return self.step_6dof(gyro, accel, dt);
        }

        let (q0, q1, q2, q3) = (self.q.w, self.q.x, self.q.y, self.q.z);
        let (gx, gy, gz) = (gyro.x, gyro.y, gyro.z);

        let mut q_dot0 = 0.5 * (-q1 * gx - q2 * gy - q3 * gz);
        let mut q_dot1 = 0.5 * (q0 * gx + q2 * gz - q3 * gy);
        let mut q_dot2 = 0.5 * (q0 * gy - q1 * gz + q3 * gx);
        let mut q_dot3 = 0.5 * (q0 * gz + q1 * gy - q2 * gx);

        let ax = accel.x / a_norm;
        let ay = accel.y / a_norm;
        let az = accel.z / a_norm;
        let mx = mag.x / m_norm;
        let my = mag.y / m_norm;
        let mz = mag.z / m_norm;

        let _2q0mx = 2.0 * q0 * mx;
        let _2q0my = 2.0 * q0 * my;
        let _2q0mz = 2.0 * q0 * mz;
        let _2q1mx = 2.0 * q1 * mx;
        let _2q0 = 2.0 * q0;
        let _2q1 = 2.0 * q1;
        let _2q2 = 2.0 * q2;
        let _2q3 = 2.0 * q3;
        let _2q0q2 = 2.0 * q0 * q2;
        let _2q2q3 = 2.0 * q2 * q3;
        let q0q0 = q0 * q0;
        let q0q1 = q0 * q1;
        let q0q2 = q0 * q2;
        let q0q3 = q0 * q3;
        let q1q1 = q1 * q1;
        let q1q2 = q1 * q2;
        let q1q3 = q1 * q3;
        let q2q2 = q2 * q2;
        let q2q3 = q2 * q3;
        let q3q3 = q3 * q3;

        // Reference direction of Earth's field, rebuilt from the current
        // attitude so the yaw objective is orientation-aware.
        let hx = mx * q0q0 - _2q0my * q3 + _2q0mz * q2 + mx * q1q1 + _2q1 * my * q2
            + _2q1 * mz * q3
            - mx * q2q2
            - mx * q3q3;
        let hy = _2q0mx * q3 + my * q0q0 - _2q0mz * q1 + _2q1mx * q2 - my * q1q1 + my * q2q2
            + _2q2 * mz * q3
            - my * q3q3;
        let _2bx = (hx * hx + hy * hy).sqrt();
        let _2bz = -_2q0mx * q2 + _2q0my * q1 + mz * q0q0 + _2q1mx * q3 - mz * q1q1
            + _2q2 * my * q3
            - mz * q2q2
            + mz * q3q3;
        let _4bx = 2.0 * _2bx;
        let _4bz = 2.0 * _2bz;

        // Combined gravity + field gradient (full Madgwick-9 Jacobian).
        let f_gx = 2.0 * q1q3 - _2q0q2 - ax;
        let f_gy = 2.0 * q0q1 + _2q2q3 - ay;
        let f_gz = 1.0 - 2.0 * q1q1 - 2.0 * q2q2 - az;
        let f_bx = _2bx * (0.5 - q2q2 - q3q3) + _2bz * (q1q3 - q0q2) - mx;
        let f_by = _2bx * (q1q2 - q0q3) + _2bz * (q0q1 + q2q3) - my;
        let f_bz = _2bx * (q0q2 + q1q3) + _2bz * (0.5 - q1q1 - q2q2) - mz;

        let mut s0 = -_2q2 * f_gx + _2q1 * f_gy - _2bz * q2 * f_bx
            + (-_2bx * q3 + _2bz * q1) * f_by
            + _2bx * q2 * f_bz;
        let mut s1 = _2q3 * f_gx + _2q0 * f_gy - 4.0 * q1 * f_gz + _2bz * q3 * f_bx
            + (_2bx * q2 + _2bz * q0) * f_by
            + (_2bx * q3 - _4bz * q1) * f_bz;
        let mut s2 = -_2q0 * f_gx + _2q3 * f_gy - 4.0 * q2 * f_gz
            + (-_4bx * q2 - _2bz * q0) * f_bx
            + (_2bx * q1 + _2bz * q3) * f_by
            + (_2bx * q0 - _4bz * q2) * f_bz;
        let mut s3 = _2q1 * f_gx + _2q2 * f_gy + (-_4bx * q3 + _2bz * q1) * f_bx
            + (-_2bx * q0 + _2bz * q2) * f_by
            + _2bx * q1 * f_bz;

        let s_norm = (s0 * s0 + s1 * s1 + s2 * s2 + s3 * s3).sqrt();
        if s_norm > NORM_EPS {
            s0 /= s_norm;
            s1 /= s_norm;
            s2 /= s_norm;
            s3 /= s_norm;

            // Mag trust scales the step: yaw is pulled toward magnetic north
            // proportionally to τ.
            let beta_eff = self.beta * (1.0 + mag_trust);
            q_dot0 -= beta_eff * s0;
            q_dot1 -= beta_eff * s1;
            q_dot2 -= beta_eff * s2;
            q_dot3 -= beta_eff * s3;
        }

        Quaternion {
            w: q0 + q_dot0 * dt,
            x: q1 + q_dot1 * dt,
            y: q2 + q_dot2 * dt,
            z: q3 + q_dot3 * dt,
        }
    }

    /// Expected Earth field in the device frame for comparison against the
    /// raw (hard-iron-contaminated) measurement: `R⁻¹(q)·B_world + hard_iron`.
    pub fn expected_earth_device(
        &self,
        reference: &GeomagneticReference,
        hard_iron: &Vector3,
    ) -> Vector3 {
        self.q.rotate_inverse(reference.world_field()).add(hard_iron)
    }

    /// Expected Earth field in the device frame without the hard-iron term,
    /// for comparison against a calibrated measurement.
    pub fn expected_earth_device_calibrated(&self, reference: &GeomagneticReference) -> Vector3 {
        self.q.rotate_inverse(reference.world_field())
    }
}
