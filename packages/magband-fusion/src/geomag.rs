//! Geomagnetic reference frame.
//!
//! Established once at session start (from geolocation lookup or the
//! mid-latitude default) and consulted read-only by the AHRS and the
//! residual former for the rest of the session.

use magband_types::Vector3;
use serde::{Deserialize, Serialize};

/// Ambient Earth-field description at the wearer's location.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeomagneticReference {
    /// Horizontal field intensity, µT.
    pub horizontal_ut: f64,
    /// Vertical field intensity, µT (positive down-component folded into the
    /// world-frame convention used by `world_field`).
    pub vertical_ut: f64,
    /// Magnetic declination, degrees east of true north.
    pub declination_deg: f64,
}

impl Default for GeomagneticReference {
    fn default() -> Self {
        // Typical mid-latitude values.
        Self { horizontal_ut: 20.0, vertical_ut: 45.0, declination_deg: 0.0 }
    }
}

impl GeomagneticReference {
    pub fn new(horizontal_ut: f64, vertical_ut: f64, declination_deg: f64) -> Self {
        Self { horizontal_ut, vertical_ut, declination_deg }
    }

    /// World-frame field vector `(horizontal, 0, vertical)`, µT.
    pub fn world_field(&self) -> Vector3 {
        Vector3::new(self.horizontal_ut, 0.0, self.vertical_ut)
    }

    /// Total field intensity, µT.
    pub fn magnitude(&self) -> f64 {
        self.world_field().magnitude()
    }

    /// True-north heading for a magnetic yaw angle, degrees in [0, 360).
    pub fn true_heading_deg(&self, yaw_deg: f64) -> f64 {
        (yaw_deg + self.declination_deg).rem_euclid(360.0)
    }
}
