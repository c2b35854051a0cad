//! scenarios.rs — injectable scenarios for the Magband simulator
//!
//! Each scenario reproduces a real-world condition the pipeline must handle.
//! Scenarios are composable and selectable from the CLI via presets.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScenarioType {
    /// Physiological rest tremor on the wrist attitude
    Tremor,
    /// Slow 3-axis rotation sweep (drives auto hard-iron calibration)
    RotationSweep,
    /// Periodic press of one finger toward the sensor
    FingerPress,
    /// Drop every Nth sample before transmission (tests the dt clamp)
    DroppedSamples,
    /// Environmental magnetic interference bursts on one axis
    MagInterference,
    /// Switch between the 26 Hz live rate and the 50 Hz replay rate
    RateSwitch,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioConfig {
    pub active: Vec<ScenarioType>,
    /// Finger index pressed by FingerPress (0 = thumb … 4 = pinky).
    pub press_finger: usize,
    /// Drop every Nth sample when DroppedSamples is active.
    pub dropout_every_n: u32,
    /// Interference amplitude, µT.
    pub interference_ut: f64,
    /// Interference square-wave period, seconds.
    pub interference_period_s: f64,
    /// Seconds between rate switches when RateSwitch is active.
    pub rate_switch_period_s: f64,
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        Self {
            active: vec![ScenarioType::Tremor],
            press_finger: 1,
            dropout_every_n: 50,
            interference_ut: 25.0,
            interference_period_s: 8.0,
            rate_switch_period_s: 30.0,
        }
    }
}

impl ScenarioConfig {
    pub fn has(&self, s: &ScenarioType) -> bool {
        self.active.contains(s)
    }

    pub fn is_sample_dropped(&self, sample_counter: u32) -> bool {
        self.has(&ScenarioType::DroppedSamples)
            && self.dropout_every_n > 0
            && sample_counter % self.dropout_every_n == self.dropout_every_n - 1
    }

    /// Current nominal sample rate given the RateSwitch scenario.
    pub fn sample_rate_hz(&self, base_rate_hz: f64, t_elapsed: f64) -> f64 {
        if !self.has(&ScenarioType::RateSwitch) {
            return base_rate_hz;
        }
        let phase = (t_elapsed / self.rate_switch_period_s) as u64;
        if phase % 2 == 0 {
            base_rate_hz
        } else {
            50.0
        }
    }
}

/// Predefined presets selectable from the CLI.
pub fn preset(name: &str) -> Option<ScenarioConfig> {
    match name {
        "rest" => Some(ScenarioConfig::default()),
        "press" => Some(ScenarioConfig {
            active: vec![ScenarioType::Tremor, ScenarioType::FingerPress],
            ..Default::default()
        }),
        "calibration" => Some(ScenarioConfig {
            active: vec![ScenarioType::RotationSweep],
            ..Default::default()
        }),
        "interference" => Some(ScenarioConfig {
            active: vec![ScenarioType::Tremor, ScenarioType::MagInterference],
            ..Default::default()
        }),
        "dropout" => Some(ScenarioConfig {
            active: vec![ScenarioType::Tremor, ScenarioType::DroppedSamples],
            dropout_every_n: 25,
            ..Default::default()
        }),
        "rate-switch" => Some(ScenarioConfig {
            active: vec![ScenarioType::Tremor, ScenarioType::RateSwitch],
            ..Default::default()
        }),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dropout_hits_every_nth() {
        let sc = preset("dropout").unwrap();
        let dropped: Vec<u32> = (0..100).filter(|&i| sc.is_sample_dropped(i)).collect();
        assert_eq!(dropped, vec![24, 49, 74, 99]);
    }

    #[test]
    fn rate_switch_alternates() {
        let sc = preset("rate-switch").unwrap();
        assert_eq!(sc.sample_rate_hz(26.0, 0.0), 26.0);
        assert_eq!(sc.sample_rate_hz(26.0, 31.0), 50.0);
        assert_eq!(sc.sample_rate_hz(26.0, 61.0), 26.0);
    }

    #[test]
    fn unknown_preset_is_none() {
        assert!(preset("warp-drive").is_none());
    }
}
