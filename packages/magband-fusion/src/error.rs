//! Pipeline error taxonomy.
//!
//! Transient numeric conditions (zero-norm accel, singular covariance) are
//! handled locally inside the stages and never surface here. Programming
//! invariant violations in the particle filter panic outright. Everything the
//! caller can act on arrives as one of these types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// Input shape error. The pipeline state is unchanged; the sample may be
    /// re-submitted after correction.
    #[error("malformed raw sample: {0}")]
    MalformedSample(String),

    /// The orientation quaternion went non-finite. Fatal for this session —
    /// the caller must reset the pipeline before processing further samples.
    #[error("orientation state is non-finite; pipeline reset required")]
    NonFiniteOrientation,

    #[error(transparent)]
    Calibration(#[from] CalibrationError),
}

/// Calibration blob load/save failures. The pipeline keeps running with
/// whatever state it has; an empty calibrator is a valid starting point.
#[derive(Debug, Error)]
pub enum CalibrationError {
    #[error("unsupported calibration blob version {0}")]
    UnsupportedVersion(u32),

    #[error("calibration blob integrity digest mismatch")]
    DigestMismatch,

    #[error("calibration blob decode failed: {0}")]
    Decode(#[from] serde_json::Error),
}
