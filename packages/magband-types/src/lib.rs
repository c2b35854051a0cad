//! # magband-types
//!
//! Shared data model for the Magband wrist-sensing suite.
//!
//! These types are used by:
//! - `magband-fusion`: the eight-stage telemetry pipeline and its estimators
//! - `magband-simulator`: producing synthetic LSB sensor streams on the wire
//! - `magband-hub`: decoding device frames and persisting pipeline output
//!
//! ## Coordinate conventions
//!
//! - **Device frame**: right-hand, shared by all three sensors after the
//!   Stage-1 magnetometer axis swap. Z points out of the band when worn flat.
//! - **World frame**: X = magnetic-north horizontal, Z = vertical; the
//!   geomagnetic reference vector is `(horizontal, 0, vertical)` µT.
//! - **Quaternions**: Hamilton convention `(w, x, y, z)`, unit norm, rotating
//!   device-frame vectors into the world frame.
//!
//! ## Invariants
//! - Raw LSB fields pass through every pipeline stage byte-identical.
//! - Stage records are additive: each stage appends a block, never removes one.
//! - Consumers narrow the stage union through predicates, not field probing.

pub mod control;
pub mod wire;

use serde::{Deserialize, Serialize};

// ── 3D vector, quaternion, Euler angles ───────────────────────────────────────

/// 3D vector. Units depend on context (LSB, g, dps, µT, mm).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Vector3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vector3 {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn zeros() -> Self {
        Self { x: 0.0, y: 0.0, z: 0.0 }
    }

    pub fn add(&self, other: &Vector3) -> Vector3 {
        Vector3::new(self.x + other.x, self.y + other.y, self.z + other.z)
    }

    pub fn sub(&self, other: &Vector3) -> Vector3 {
        Vector3::new(self.x - other.x, self.y - other.y, self.z - other.z)
    }

    pub fn scale(&self, s: f64) -> Vector3 {
        Vector3::new(self.x * s, self.y * s, self.z * s)
    }

    /// Componentwise product (diagonal soft-iron scaling).
    pub fn hadamard(&self, other: &Vector3) -> Vector3 {
        Vector3::new(self.x * other.x, self.y * other.y, self.z * other.z)
    }

    pub fn dot(&self, other: &Vector3) -> f64 {
        self.x * other.x + self.y * other.y + self.z * other.z
    }

    pub fn magnitude(&self) -> f64 {
        self.dot(self).sqrt()
    }

    pub fn dist(&self, other: &Vector3) -> f64 {
        self.sub(other).magnitude()
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}

/// Unit quaternion for 3D rotation, Hamilton `(w, x, y, z)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quaternion {
    pub w: f64,
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Default for Quaternion {
    fn default() -> Self {
        Self::identity()
    }
}

impl Quaternion {
    pub fn identity() -> Self {
        Self { w: 1.0, x: 0.0, y: 0.0, z: 0.0 }
    }

    /// Build from Euler angles (roll, pitch, yaw) in radians, ZYX order.
    pub fn from_euler(roll: f64, pitch: f64, yaw: f64) -> Self {
        let (cr, sr) = ((roll / 2.0).cos(), (roll / 2.0).sin());
        let (cp, sp) = ((pitch / 2.0).cos(), (pitch / 2.0).sin());
        let (cy, sy) = ((yaw / 2.0).cos(), (yaw / 2.0).sin());
        Self {
            w: cr * cp * cy + sr * sp * sy,
            x: sr * cp * cy - cr * sp * sy,
            y: cr * sp * cy + sr * cp * sy,
            z: cr * cp * sy - sr * sp * cy,
        }
    }

    pub fn norm(&self) -> f64 {
        (self.w * self.w + self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }

    /// Renormalize to unit length. Counterpart of the per-update invariant
    /// `| |q| − 1 | < 1e-6`.
    pub fn normalized(&self) -> Quaternion {
        let n = self.norm();
        Quaternion {
            w: self.w / n,
            x: self.x / n,
            y: self.y / n,
            z: self.z / n,
        }
    }

    pub fn conjugate(&self) -> Quaternion {
        Quaternion { w: self.w, x: -self.x, y: -self.y, z: -self.z }
    }

    pub fn is_finite(&self) -> bool {
        self.w.is_finite() && self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }

    /// Convert to a 3×3 rotation matrix (row-major, device → world).
    pub fn to_rotation_matrix(&self) -> [[f64; 3]; 3] {
        let (w, x, y, z) = (self.w, self.x, self.y, self.z);
        [
            [1.0 - 2.0 * (y * y + z * z), 2.0 * (x * y - w * z), 2.0 * (x * z + w * y)],
            [2.0 * (x * y + w * z), 1.0 - 2.0 * (x * x + z * z), 2.0 * (y * z - w * x)],
            [2.0 * (x * z - w * y), 2.0 * (y * z + w * x), 1.0 - 2.0 * (x * x + y * y)],
        ]
    }

    /// Rotate a device-frame vector into the world frame: v' = q ⊗ v ⊗ q⁻¹
    pub fn rotate(&self, v: Vector3) -> Vector3 {
        let r = self.to_rotation_matrix();
        Vector3::new(
            r[0][0] * v.x + r[0][1] * v.y + r[0][2] * v.z,
            r[1][0] * v.x + r[1][1] * v.y + r[1][2] * v.z,
            r[2][0] * v.x + r[2][1] * v.y + r[2][2] * v.z,
        )
    }

    /// Rotate a world-frame vector into the device frame (inverse rotation).
    pub fn rotate_inverse(&self, v: Vector3) -> Vector3 {
        self.conjugate().rotate(v)
    }

    /// Extract Euler angles in degrees.
    /// roll  = atan2(2(wx+yz), 1−2(x²+y²))
    /// pitch = asin(clip(2(wy−zx), −1, 1))
    /// yaw   = atan2(2(wz+xy), 1−2(y²+z²))
    pub fn euler_angles(&self) -> EulerAngles {
        let (w, x, y, z) = (self.w, self.x, self.y, self.z);
        let roll = (2.0 * (w * x + y * z)).atan2(1.0 - 2.0 * (x * x + y * y));
        let pitch = (2.0 * (w * y - z * x)).clamp(-1.0, 1.0).asin();
        let yaw = (2.0 * (w * z + x * y)).atan2(1.0 - 2.0 * (y * y + z * z));
        EulerAngles {
            roll_deg: roll.to_degrees(),
            pitch_deg: pitch.to_degrees(),
            yaw_deg: yaw.to_degrees(),
        }
    }
}

/// Orientation as Euler angles, degrees.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct EulerAngles {
    pub roll_deg: f64,
    pub pitch_deg: f64,
    pub yaw_deg: f64,
}

// ── Raw sample (Stage 0 output) ───────────────────────────────────────────────

/// One raw 9-DOF sample in sensor LSB with a monotonic device timestamp.
///
/// The nine LSB fields are preserved byte-identical through every pipeline
/// stage. Auxiliary fields are present only when the transport supplied them.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RawImuSample {
    /// Monotonic device timestamp, milliseconds.
    pub t_ms: u32,
    pub ax: i16,
    pub ay: i16,
    pub az: i16,
    pub gx: i16,
    pub gy: i16,
    pub gz: i16,
    pub mx: i16,
    pub my: i16,
    pub mz: i16,
    /// Firmware sampling mode (2 bits on wire).
    pub mode: u8,
    /// Recording context tag (3 bits on wire).
    pub context: u8,
    /// Grip flag from the capacitive band sensor.
    pub grip: bool,
    /// Ambient light, 255-scaled. Valid only when the frame carried it.
    pub light: Option<u8>,
    /// Battery percent. Valid only when the frame carried it.
    pub battery_pct: Option<u8>,
    /// Die temperature, °C.
    pub temperature_c: Option<i16>,
    /// Capacitive touch level, transport-dependent scale.
    pub touch: Option<u16>,
}

impl RawImuSample {
    /// Accelerometer vector in raw LSB.
    pub fn accel_lsb(&self) -> Vector3 {
        Vector3::new(self.ax as f64, self.ay as f64, self.az as f64)
    }

    /// Gyroscope vector in raw LSB.
    pub fn gyro_lsb(&self) -> Vector3 {
        Vector3::new(self.gx as f64, self.gy as f64, self.gz as f64)
    }

    /// Magnetometer vector in raw LSB, chip axis order (pre-swap).
    pub fn mag_lsb(&self) -> Vector3 {
        Vector3::new(self.mx as f64, self.my as f64, self.mz as f64)
    }
}

// ── Stage data blocks ─────────────────────────────────────────────────────────

/// Stage 1: unit-converted sensor values plus the inter-sample interval.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct UnitData {
    /// Accelerometer, g.
    pub accel_g: Vector3,
    /// Gyroscope, deg/s.
    pub gyro_dps: Vector3,
    /// Magnetometer, µT, axes already aligned to the accel/gyro frame.
    pub mag_ut: Vector3,
    /// Clamped inter-sample interval, seconds ∈ [0.001, 1.0].
    pub dt_s: f64,
}

/// Stage 2: rolling-window motion statistics over raw LSB magnitudes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MotionData {
    pub accel_std_lsb: f64,
    pub gyro_std_lsb: f64,
    pub is_moving: bool,
}

/// Stage 3: gyro bias estimate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BiasData {
    /// Current bias estimate, deg/s.
    pub gyro_bias_dps: Vector3,
    /// True once enough stationary samples have converged the estimate.
    pub calibrated: bool,
}

/// Stage 4: orientation and geomagnetic residual from the AHRS.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OrientationData {
    pub quaternion: Quaternion,
    pub euler: EulerAngles,
    /// Earth field rotated into the device frame (+ hard iron), µT.
    /// None when no geomagnetic reference is set.
    pub expected_earth_ut: Option<Vector3>,
    /// measured − expected, µT.
    pub earth_residual_ut: Option<Vector3>,
    pub earth_residual_magnitude_ut: Option<f64>,
}

/// Stage 5: calibrated magnetometer vector and calibrator snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CalibrationData {
    /// Hard-iron subtracted, soft-iron scaled magnetometer vector, µT.
    pub mag_calibrated_ut: Vector3,
    pub snapshot: MagCalibrationSnapshot,
}

/// Stage 6: anomaly vector — calibrated mag minus expected Earth field.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResidualData {
    pub residual_ut: Vector3,
    pub magnitude_ut: f64,
}

/// Stage 8: per-axis Kalman-smoothed residual for downstream tracking.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SmoothedData {
    pub filtered_mx: f64,
    pub filtered_my: f64,
    pub filtered_mz: f64,
}

impl SmoothedData {
    pub fn as_vector(&self) -> Vector3 {
        Vector3::new(self.filtered_mx, self.filtered_my, self.filtered_mz)
    }
}

// ── Magnetometer calibration snapshot ─────────────────────────────────────────

/// Read-only view of the online magnetometer calibration state.
///
/// Invariants:
/// - `ready ⇒ earth_magnitude ∈ [20, 70] µT`
/// - `auto_hard_iron_ready ⇒ every axis range ≥ 1.5 × earth_magnitude`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MagCalibrationSnapshot {
    /// Estimated hard-iron bias, µT.
    pub hard_iron: Vector3,
    /// Per-axis diagonal soft-iron scale factors (off-diagonals omitted).
    pub soft_iron_scale: Vector3,
    /// Rolling estimate of |B_earth|, µT.
    pub earth_magnitude: f64,
    /// Observed span of each raw axis during calibration, µT.
    pub axis_ranges: Vector3,
    /// Fraction of the required rotational coverage achieved, [0, 1].
    pub auto_hard_iron_progress: f64,
    pub auto_hard_iron_ready: bool,
    pub ready: bool,
    pub hard_iron_calibrated: bool,
    pub soft_iron_calibrated: bool,
    /// EMA of |measured − expected| after current calibration, µT.
    pub mean_residual: f64,
    /// Composite quality score, [0, 1].
    pub confidence: f64,
    pub total_samples: u64,
}

impl Default for MagCalibrationSnapshot {
    fn default() -> Self {
        Self {
            hard_iron: Vector3::zeros(),
            soft_iron_scale: Vector3::new(1.0, 1.0, 1.0),
            earth_magnitude: 0.0,
            axis_ranges: Vector3::zeros(),
            auto_hard_iron_progress: 0.0,
            auto_hard_iron_ready: false,
            ready: false,
            hard_iron_calibrated: false,
            soft_iron_calibrated: false,
            mean_residual: 0.0,
            confidence: 0.0,
            total_samples: 0,
        }
    }
}

// ── Magnet detection (Stage 7) ────────────────────────────────────────────────

/// Hysteretic classification ladder of the residual magnitude.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum MagnetStatus {
    None = 0,
    Possible = 1,
    Likely = 2,
    Confirmed = 3,
}

impl MagnetStatus {
    pub fn from_u8(v: u8) -> Self {
        match v {
            1 => Self::Possible,
            2 => Self::Likely,
            3 => Self::Confirmed,
            _ => Self::None,
        }
    }
}

/// Stage 7 output: magnet-presence classification against a slow baseline.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MagnetDetection {
    pub status: MagnetStatus,
    /// Sigmoid of deviation normalized by the confirmed threshold, [0, 1].
    pub confidence: f64,
    /// Slow-EMA baseline residual magnitude, µT.
    pub baseline_residual_ut: f64,
    pub baseline_established: bool,
    /// |current − baseline|, µT.
    pub deviation_ut: f64,
}

impl Default for MagnetDetection {
    fn default() -> Self {
        Self {
            status: MagnetStatus::None,
            confidence: 0.0,
            baseline_residual_ut: 0.0,
            baseline_established: false,
            deviation_ut: 0.0,
        }
    }
}

// ── Cumulative stage records ──────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConvertedSample {
    pub raw: RawImuSample,
    pub units: UnitData,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MotionSample {
    pub raw: RawImuSample,
    pub units: UnitData,
    pub motion: MotionData,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BiasSample {
    pub raw: RawImuSample,
    pub units: UnitData,
    pub motion: MotionData,
    pub bias: BiasData,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OrientedSample {
    pub raw: RawImuSample,
    pub units: UnitData,
    pub motion: MotionData,
    pub bias: BiasData,
    pub orientation: OrientationData,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CalibratedSample {
    pub raw: RawImuSample,
    pub units: UnitData,
    pub motion: MotionData,
    pub bias: BiasData,
    pub orientation: OrientationData,
    pub calibration: CalibrationData,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResidualSample {
    pub raw: RawImuSample,
    pub units: UnitData,
    pub motion: MotionData,
    pub bias: BiasData,
    pub orientation: OrientationData,
    pub calibration: CalibrationData,
    pub residual: ResidualData,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClassifiedSample {
    pub raw: RawImuSample,
    pub units: UnitData,
    pub motion: MotionData,
    pub bias: BiasData,
    pub orientation: OrientationData,
    pub calibration: CalibrationData,
    pub residual: ResidualData,
    pub magnet: MagnetDetection,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SmoothedSample {
    pub raw: RawImuSample,
    pub units: UnitData,
    pub motion: MotionData,
    pub bias: BiasData,
    pub orientation: OrientationData,
    pub calibration: CalibrationData,
    pub residual: ResidualData,
    pub magnet: MagnetDetection,
    pub smoothed: SmoothedData,
}

// ── Tagged stage union ────────────────────────────────────────────────────────

/// Pipeline egress: one of nine stage variants, each strictly richer than the
/// last. The pipeline emits the deepest variant it could produce for a sample
/// (stages 6–8 require a geomagnetic reference). Downstream code should match
/// on the variant or narrow through the predicates, not probe fields.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "stage", rename_all = "snake_case")]
pub enum StageSample {
    Raw(RawImuSample),
    Converted(ConvertedSample),
    Motion(MotionSample),
    BiasTracked(BiasSample),
    Oriented(OrientedSample),
    Calibrated(CalibratedSample),
    Residual(ResidualSample),
    Classified(ClassifiedSample),
    Smoothed(SmoothedSample),
}

impl StageSample {
    /// Raw fields are present in every variant, byte-identical to the input.
    pub fn raw(&self) -> &RawImuSample {
        match self {
            StageSample::Raw(s) => s,
            StageSample::Converted(s) => &s.raw,
            StageSample::Motion(s) => &s.raw,
            StageSample::BiasTracked(s) => &s.raw,
            StageSample::Oriented(s) => &s.raw,
            StageSample::Calibrated(s) => &s.raw,
            StageSample::Residual(s) => &s.raw,
            StageSample::Classified(s) => &s.raw,
            StageSample::Smoothed(s) => &s.raw,
        }
    }

    pub fn units(&self) -> Option<&UnitData> {
        match self {
            StageSample::Raw(_) => None,
            StageSample::Converted(s) => Some(&s.units),
            StageSample::Motion(s) => Some(&s.units),
            StageSample::BiasTracked(s) => Some(&s.units),
            StageSample::Oriented(s) => Some(&s.units),
            StageSample::Calibrated(s) => Some(&s.units),
            StageSample::Residual(s) => Some(&s.units),
            StageSample::Classified(s) => Some(&s.units),
            StageSample::Smoothed(s) => Some(&s.units),
        }
    }

    pub fn motion(&self) -> Option<&MotionData> {
        match self {
            StageSample::Raw(_) | StageSample::Converted(_) => None,
            StageSample::Motion(s) => Some(&s.motion),
            StageSample::BiasTracked(s) => Some(&s.motion),
            StageSample::Oriented(s) => Some(&s.motion),
            StageSample::Calibrated(s) => Some(&s.motion),
            StageSample::Residual(s) => Some(&s.motion),
            StageSample::Classified(s) => Some(&s.motion),
            StageSample::Smoothed(s) => Some(&s.motion),
        }
    }

    pub fn bias(&self) -> Option<&BiasData> {
        match self {
            StageSample::Raw(_) | StageSample::Converted(_) | StageSample::Motion(_) => None,
            StageSample::BiasTracked(s) => Some(&s.bias),
            StageSample::Oriented(s) => Some(&s.bias),
            StageSample::Calibrated(s) => Some(&s.bias),
            StageSample::Residual(s) => Some(&s.bias),
            StageSample::Classified(s) => Some(&s.bias),
            StageSample::Smoothed(s) => Some(&s.bias),
        }
    }

    pub fn orientation(&self) -> Option<&OrientationData> {
        match self {
            StageSample::Oriented(s) => Some(&s.orientation),
            StageSample::Calibrated(s) => Some(&s.orientation),
            StageSample::Residual(s) => Some(&s.orientation),
            StageSample::Classified(s) => Some(&s.orientation),
            StageSample::Smoothed(s) => Some(&s.orientation),
            _ => None,
        }
    }

    pub fn calibration(&self) -> Option<&CalibrationData> {
        match self {
            StageSample::Calibrated(s) => Some(&s.calibration),
            StageSample::Residual(s) => Some(&s.calibration),
            StageSample::Classified(s) => Some(&s.calibration),
            StageSample::Smoothed(s) => Some(&s.calibration),
            _ => None,
        }
    }

    pub fn residual(&self) -> Option<&ResidualData> {
        match self {
            StageSample::Residual(s) => Some(&s.residual),
            StageSample::Classified(s) => Some(&s.residual),
            StageSample::Smoothed(s) => Some(&s.residual),
            _ => None,
        }
    }

    pub fn magnet(&self) -> Option<&MagnetDetection> {
        match self {
            StageSample::Classified(s) => Some(&s.magnet),
            StageSample::Smoothed(s) => Some(&s.magnet),
            _ => None,
        }
    }

    pub fn smoothed(&self) -> Option<&SmoothedData> {
        match self {
            StageSample::Smoothed(s) => Some(&s.smoothed),
            _ => None,
        }
    }

    pub fn has_units(&self) -> bool {
        self.units().is_some()
    }

    pub fn has_motion(&self) -> bool {
        self.motion().is_some()
    }

    pub fn has_orientation(&self) -> bool {
        self.orientation().is_some()
    }

    pub fn has_calibration(&self) -> bool {
        self.calibration().is_some()
    }

    pub fn has_mag_residual(&self) -> bool {
        self.residual().is_some()
    }

    pub fn has_magnet_status(&self) -> bool {
        self.magnet().is_some()
    }

    pub fn has_smoothed(&self) -> bool {
        self.smoothed().is_some()
    }
}

// ── Per-finger tracking state ─────────────────────────────────────────────────

/// Position + velocity of one fingertip in wrist-sensor-centred mm.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct FingerState {
    /// Position, mm.
    pub pos: Vector3,
    /// Velocity, mm/s.
    pub vel: Vector3,
}

/// Finger index, thumb through pinky.
pub const N_FINGERS: usize = 5;

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-9;

    fn raw_fixture() -> RawImuSample {
        RawImuSample {
            t_ms: 1000,
            ax: 12,
            ay: -300,
            az: 8192,
            gx: 3,
            gy: -2,
            gz: 0,
            mx: 100,
            my: 200,
            mz: 461,
            mode: 1,
            context: 2,
            grip: false,
            light: Some(128),
            battery_pct: Some(87),
            temperature_c: Some(23),
            touch: None,
        }
    }

    #[test]
    fn quaternion_from_euler_round_trips() {
        let q = Quaternion::from_euler(0.3, -0.2, 1.1);
        let e = q.euler_angles();
        assert!((e.roll_deg - 0.3_f64.to_degrees()).abs() < 1e-9);
        assert!((e.pitch_deg - (-0.2_f64).to_degrees()).abs() < 1e-9);
        assert!((e.yaw_deg - 1.1_f64.to_degrees()).abs() < 1e-9);
        assert!((q.norm() - 1.0).abs() < EPS);
    }

    #[test]
    fn rotate_and_inverse_cancel() {
        let q = Quaternion::from_euler(0.5, 0.25, -0.75);
        let v = Vector3::new(3.0, -4.0, 12.0);
        let back = q.rotate_inverse(q.rotate(v));
        assert!(back.dist(&v) < 1e-9);
    }

    #[test]
    fn rotation_matrix_matches_rotate() {
        let q = Quaternion::from_euler(-0.9, 0.4, 2.0);
        let v = Vector3::new(1.0, 2.0, 3.0);
        let r = q.to_rotation_matrix();
        let via_matrix = Vector3::new(
            r[0][0] * v.x + r[0][1] * v.y + r[0][2] * v.z,
            r[1][0] * v.x + r[1][1] * v.y + r[1][2] * v.z,
            r[2][0] * v.x + r[2][1] * v.y + r[2][2] * v.z,
        );
        assert!(via_matrix.dist(&q.rotate(v)) < 1e-12);
    }

    #[test]
    fn stage_union_narrowing() {
        let raw = raw_fixture();
        let sample = StageSample::Raw(raw);
        assert!(!sample.has_units());
        assert!(!sample.has_mag_residual());
        assert_eq!(sample.raw(), &raw);

        let converted = StageSample::Converted(ConvertedSample {
            raw,
            units: UnitData {
                accel_g: Vector3::new(0.0, 0.0, 1.0),
                gyro_dps: Vector3::zeros(),
                mag_ut: Vector3::new(20.0, 0.0, 45.0),
                dt_s: 0.02,
            },
        });
        assert!(converted.has_units());
        assert!(!converted.has_motion());
        // Raw passes through untouched.
        assert_eq!(converted.raw(), &raw);
    }

    #[test]
    fn magnet_status_ladder_is_ordered() {
        assert!(MagnetStatus::None < MagnetStatus::Possible);
        assert!(MagnetStatus::Possible < MagnetStatus::Likely);
        assert!(MagnetStatus::Likely < MagnetStatus::Confirmed);
        assert_eq!(MagnetStatus::from_u8(2), MagnetStatus::Likely);
        assert_eq!(MagnetStatus::from_u8(9), MagnetStatus::None);
    }
}
