//! dipole.rs — magnetic dipole forward model and default hand geometry
//!
//! Predicts the device-frame magnetic residual produced by the fingertip
//! magnets. The same closed-form equation weights the particle filter and is
//! embedded as the physics constraint in the offline finger-state models.
//!
//! ```text
//! B = (µ₀/4π) · [3(m·r̂)r̂ − m] / |r|³,   r = sensor − fingertip
//! ```
//!
//! Positions are wrist-sensor-centred millimetres; moments are A·m²; output
//! is µT.

use magband_types::{Vector3, N_FINGERS};

/// µ₀ / 4π, T·m/A.
pub const MU0_OVER_4PI: f64 = 1e-7;
/// Singularity guard: the field is evaluated no closer than 1 mm.
const MIN_RANGE_M: f64 = 0.001;

/// Field of a single dipole at `pos_mm` with moment `moment_am2`, observed at
/// the sensor origin, in µT.
pub fn dipole_field_ut(pos_mm: &Vector3, moment_am2: &Vector3) -> Vector3 {
    // r points from the fingertip to the sensor, metres.
    let r = pos_mm.scale(-0.001);
    let dist = r.magnitude();
    let r_hat = if dist > 1e-12 {
        r.scale(1.0 / dist)
    } else {
        Vector3::new(0.0, 0.0, 1.0)
    };
    let dist = dist.max(MIN_RANGE_M);

    let m_dot_r = moment_am2.dot(&r_hat);
    let b_tesla = r_hat
        .scale(3.0 * m_dot_r)
        .sub(moment_am2)
        .scale(MU0_OVER_4PI / (dist * dist * dist));
    b_tesla.scale(1e6)
}

/// Total predicted residual from all five fingertip magnets, µT.
pub fn predict_residual_ut(
    positions_mm: &[Vector3; N_FINGERS],
    moments_am2: &[Vector3; N_FINGERS],
) -> Vector3 {
    let mut total = Vector3::zeros();
    for (pos, moment) in positions_mm.iter().zip(moments_am2) {
        total = total.add(&dipole_field_ut(pos, moment));
    }
    total
}

// ── Dipole configuration ──────────────────────────────────────────────────────

/// Per-finger magnet description.
#[derive(Debug, Clone)]
pub struct DipoleConfig {
    /// Dipole moment per finger, A·m². Defaults alternate polarity along ±z
    /// so adjacent fingers stay distinguishable in the summed field.
    pub moments_am2: [Vector3; N_FINGERS],
    /// Optional offset from the tracked fingertip point to the magnet centre,
    /// mm, applied before field evaluation.
    pub fingertip_offset_mm: Option<Vector3>,
}

impl Default for DipoleConfig {
    fn default() -> Self {
        let m = 0.08;
        Self {
            moments_am2: [
                Vector3::new(0.0, 0.0, m),
                Vector3::new(0.0, 0.0, -m),
                Vector3::new(0.0, 0.0, m),
                Vector3::new(0.0, 0.0, -m),
                Vector3::new(0.0, 0.0, m),
            ],
            fingertip_offset_mm: None,
        }
    }
}

impl DipoleConfig {
    /// Predicted residual for a set of fingertip positions, honouring the
    /// magnet offset.
    pub fn predict_ut(&self, fingertips_mm: &[Vector3; N_FINGERS]) -> Vector3 {
        match self.fingertip_offset_mm {
            Some(offset) => {
                let shifted: [Vector3; N_FINGERS] =
                    std::array::from_fn(|i| fingertips_mm[i].add(&offset));
                predict_residual_ut(&shifted, &self.moments_am2)
            }
            None => predict_residual_ut(fingertips_mm, &self.moments_am2),
        }
    }
}

// ── Default hand geometry ─────────────────────────────────────────────────────

/// Fingertip rest positions in wrist-sensor-centred mm: x toward the thumb,
/// y along the extended fingers, z out of the back of the hand.
#[derive(Debug, Clone)]
pub struct HandGeometry {
    pub extended_mm: [Vector3; N_FINGERS],
    pub flexed_mm: [Vector3; N_FINGERS],
}

impl Default for HandGeometry {
    fn default() -> Self {
        Self {
            extended_mm: [
                Vector3::new(45.0, 55.0, -5.0),  // thumb
                Vector3::new(20.0, 95.0, 0.0),   // index
                Vector3::new(0.0, 100.0, 0.0),   // middle
                Vector3::new(-18.0, 95.0, 0.0),  // ring
                Vector3::new(-35.0, 80.0, 0.0),  // pinky
            ],
            flexed_mm: [
                Vector3::new(25.0, 35.0, -30.0),
                Vector3::new(15.0, 55.0, -45.0),
                Vector3::new(0.0, 55.0, -50.0),
                Vector3::new(-14.0, 55.0, -45.0),
                Vector3::new(-28.0, 50.0, -40.0),
            ],
        }
    }
}

impl HandGeometry {
    /// Interpolate fingertip positions for per-finger flexion ∈ [0, 1]
    /// (0 = extended, 1 = fully flexed).
    pub fn interpolate(&self, flexion: &[f64; N_FINGERS]) -> [Vector3; N_FINGERS] {
        std::array::from_fn(|i| {
            let t = flexion[i].clamp(0.0, 1.0);
            self.extended_mm[i].add(&self.flexed_mm[i].sub(&self.extended_mm[i]).scale(t))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn on_axis_field_matches_closed_form() {
        // Moment along +z, fingertip 60 mm below the sensor on the z axis:
        // axial field B = (µ₀/4π)·2m/d³.
        let pos = Vector3::new(0.0, 0.0, -60.0);
        let m = Vector3::new(0.0, 0.0, 0.08);
        let b = dipole_field_ut(&pos, &m);
        let expect = 1e-7 * 2.0 * 0.08 / 0.06_f64.powi(3) * 1e6;
        assert!(b.x.abs() < 1e-9);
        assert!(b.y.abs() < 1e-9);
        assert!((b.z - expect).abs() < 1e-6, "bz {b:?} expect {expect}");
    }

    #[test]
    fn equatorial_field_is_half_and_opposed() {
        // In the equatorial plane the magnitude is half the axial value and
        // the field opposes the moment.
        let d = 0.05;
        let pos = Vector3::new(d * 1000.0, 0.0, 0.0);
        let m = Vector3::new(0.0, 0.0, 0.08);
        let b = dipole_field_ut(&pos, &m);
        let expect = 1e-7 * 0.08 / d.powi(3) * 1e6;
        assert!((b.z + expect).abs() < 1e-6, "bz {}", b.z);
        assert!(b.x.abs() < 1e-9);
    }

    #[test]
    fn falls_off_with_inverse_cube() {
        let m = Vector3::new(0.0, 0.0, 0.08);
        let near = dipole_field_ut(&Vector3::new(0.0, 0.0, -40.0), &m).magnitude();
        let far = dipole_field_ut(&Vector3::new(0.0, 0.0, -80.0), &m).magnitude();
        assert!((near / far - 8.0).abs() < 1e-9);
    }

    #[test]
    fn singularity_guard_clamps_range() {
        let m = Vector3::new(0.0, 0.0, 0.08);
        let at_zero = dipole_field_ut(&Vector3::zeros(), &m);
        let at_guard = dipole_field_ut(&Vector3::new(0.0, 0.0, -1.0), &m);
        assert!(at_zero.is_finite());
        assert!(at_zero.magnitude() <= at_guard.magnitude() * 1.0001);
    }

    #[test]
    fn five_finger_sum_is_additive() {
        let geometry = HandGeometry::default();
        let dipoles = DipoleConfig::default();
        let total = dipoles.predict_ut(&geometry.extended_mm);
        let mut sum = Vector3::zeros();
        for i in 0..N_FINGERS {
            sum = sum.add(&dipole_field_ut(&geometry.extended_mm[i], &dipoles.moments_am2[i]));
        }
        assert!(total.dist(&sum) < 1e-12);
    }

    #[test]
    fn flexion_interpolates_between_poses() {
        let g = HandGeometry::default();
        let half = g.interpolate(&[0.5; N_FINGERS]);
        for i in 0..N_FINGERS {
            let mid = g.extended_mm[i].add(&g.flexed_mm[i]).scale(0.5);
            assert!(half[i].dist(&mid) < 1e-12);
        }
        let clamped = g.interpolate(&[2.0; N_FINGERS]);
        for i in 0..N_FINGERS {
            assert!(clamped[i].dist(&g.flexed_mm[i]) < 1e-12);
        }
    }
}
