//! magnet.rs — Stage 7: magnet-presence detector
//!
//! Classifies the magnetic-residual magnitude against a slow EMA baseline on
//! a four-level ladder with hysteresis. The baseline freezes while the
//! deviation exceeds the lowest enter threshold, so an approaching magnet
//! cannot be absorbed into its own baseline.

use magband_types::{MagnetDetection, MagnetStatus};

/// Enter/exit thresholds per ladder level, µT. Enter > exit at every level.
pub const POSSIBLE_ENTER_UT: f64 = 15.0;
pub const POSSIBLE_EXIT_UT: f64 = 10.0;
pub const LIKELY_ENTER_UT: f64 = 40.0;
pub const LIKELY_EXIT_UT: f64 = 30.0;
pub const CONFIRMED_ENTER_UT: f64 = 100.0;
pub const CONFIRMED_EXIT_UT: f64 = 80.0;

/// Baseline EMA coefficient — far slower than the calibrator's residual EMA.
const BASELINE_ALPHA: f64 = 0.01;
/// Samples that must contribute before the baseline counts as established.
pub const MIN_BASELINE_SAMPLES: u64 = 100;

pub struct MagnetDetector {
    baseline_ut: f64,
    baseline_samples: u64,
    status: MagnetStatus,
}

impl Default for MagnetDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl MagnetDetector {
    pub fn new() -> Self {
        Self { baseline_ut: 0.0, baseline_samples: 0, status: MagnetStatus::None }
    }

    pub fn update(&mut self, residual_magnitude_ut: f64) -> MagnetDetection {
        let deviation = (residual_magnitude_ut - self.baseline_ut).abs();

        // Track the baseline only while nothing magnet-like is in view.
        if deviation < POSSIBLE_ENTER_UT || self.baseline_samples == 0 {
            if self.baseline_samples == 0 {
                self.baseline_ut = residual_magnitude_ut;
            } else {
                self.baseline_ut += BASELINE_ALPHA * (residual_magnitude_ut - self.baseline_ut);
            }
            self.baseline_samples += 1;
        }

        let established = self.baseline_samples >= MIN_BASELINE_SAMPLES;
        if established {
            self.status = step_ladder(self.status, deviation);
        } else {
            self.status = MagnetStatus::None;
        }

        MagnetDetection {
            status: self.status,
            confidence: confidence(deviation),
            baseline_residual_ut: self.baseline_ut,
            baseline_established: established,
            deviation_ut: deviation,
        }
    }

    pub fn status(&self) -> MagnetStatus {
        self.status
    }

    pub fn reset(&mut self) {
        self.baseline_ut = 0.0;
        self.baseline_samples = 0;
        self.status = MagnetStatus::None;
    }
}

fn enter_threshold(status: MagnetStatus) -> f64 {
    match status {
        MagnetStatus::None => 0.0,
        MagnetStatus::Possible => POSSIBLE_ENTER_UT,
        MagnetStatus::Likely => LIKELY_ENTER_UT,
        MagnetStatus::Confirmed => CONFIRMED_ENTER_UT,
    }
}

fn exit_threshold(status: MagnetStatus) -> f64 {
    match status {
        MagnetStatus::None => 0.0,
        MagnetStatus::Possible => POSSIBLE_EXIT_UT,
        MagnetStatus::Likely => LIKELY_EXIT_UT,
        MagnetStatus::Confirmed => CONFIRMED_EXIT_UT,
    }
}

fn promote(status: MagnetStatus) -> Option<MagnetStatus> {
    match status {
        MagnetStatus::None => Some(MagnetStatus::Possible),
        MagnetStatus::Possible => Some(MagnetStatus::Likely),
        MagnetStatus::Likely => Some(MagnetStatus::Confirmed),
        MagnetStatus::Confirmed => None,
    }
}

fn demote(status: MagnetStatus) -> Option<MagnetStatus> {
    match status {
        MagnetStatus::None => None,
        MagnetStatus::Possible => Some(MagnetStatus::None),
        MagnetStatus::Likely => Some(MagnetStatus::Possible),
        MagnetStatus::Confirmed => Some(MagnetStatus::Likely),
    }
}

fn step_ladder(mut status: MagnetStatus, deviation: f64) -> MagnetStatus {
    while let Some(next) = promote(status) {
        if deviation >= enter_threshold(next) {
            status = next;
        } else {
            break;
        }
    }
    while status != MagnetStatus::None && deviation < exit_threshold(status) {
        // Exit only through the hysteresis band.
        status = demote(status).unwrap_or(MagnetStatus::None);
    }
    status
}

/// Sigmoid of the deviation normalized by the confirmed enter threshold.
fn confidence(deviation_ut: f64) -> f64 {
    let x = deviation_ut / CONFIRMED_ENTER_UT;
    1.0 / (1.0 + (-6.0 * (x - 0.5)).exp())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn established(det: &mut MagnetDetector) {
        for _ in 0..MIN_BASELINE_SAMPLES {
            det.update(1.0);
        }
    }

    #[test]
    fn thresholds_keep_hysteresis_gap() {
        assert!(POSSIBLE_ENTER_UT > POSSIBLE_EXIT_UT);
        assert!(LIKELY_ENTER_UT > LIKELY_EXIT_UT);
        assert!(CONFIRMED_ENTER_UT > CONFIRMED_EXIT_UT);
    }

    #[test]
    fn forced_none_until_baseline_established() {
        let mut det = MagnetDetector::new();
        for _ in 0..(MIN_BASELINE_SAMPLES - 1) {
            let d = det.update(1.0);
            assert!(!d.baseline_established);
            assert_eq!(d.status, MagnetStatus::None);
        }
        let d = det.update(1.0);
        assert!(d.baseline_established);
    }

    #[test]
    fn climbs_ladder_and_exits_through_hysteresis() {
        let mut det = MagnetDetector::new();
        established(&mut det);

        assert_eq!(det.update(21.0).status, MagnetStatus::Possible);
        assert_eq!(det.update(55.0).status, MagnetStatus::Likely);
        assert_eq!(det.update(150.0).status, MagnetStatus::Confirmed);

        // Inside the confirmed hysteresis band: no regression.
        assert_eq!(det.update(90.0).status, MagnetStatus::Confirmed);
        // Below confirmed-exit but above likely-exit: one step down.
        assert_eq!(det.update(70.0).status, MagnetStatus::Likely);
        // Collapse all the way.
        assert_eq!(det.update(1.0).status, MagnetStatus::None);
    }

    #[test]
    fn big_jump_climbs_multiple_levels_at_once() {
        let mut det = MagnetDetector::new();
        established(&mut det);
        assert_eq!(det.update(181.0).status, MagnetStatus::Confirmed);
    }

    #[test]
    fn baseline_freezes_under_anomaly() {
        let mut det = MagnetDetector::new();
        established(&mut det);
        let baseline_before = det.update(1.0).baseline_residual_ut;
        for _ in 0..500 {
            det.update(200.0);
        }
        let d = det.update(200.0);
        assert!((d.baseline_residual_ut - baseline_before).abs() < 1e-9);
        assert!((d.deviation_ut - (200.0 - baseline_before)).abs() < 1e-9);
    }

    #[test]
    fn confidence_is_monotone_sigmoid() {
        let mut det = MagnetDetector::new();
        established(&mut det);
        let low = det.update(5.0).confidence;
        let mid = det.update(50.0).confidence;
        let high = det.update(150.0).confidence;
        assert!(low < mid && mid < high);
        assert!(low > 0.0 && high < 1.0);
    }
}
