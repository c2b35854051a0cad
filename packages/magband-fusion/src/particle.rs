//! particle.rs — particle filter over five-finger position hypotheses
//!
//! Each particle is a full hand hypothesis: five fingertip position/velocity
//! states. Weights come from the dipole forward model against the smoothed
//! magnetic residual; systematic resampling fires when the effective sample
//! size degenerates.
//!
//! Failure semantics: a numerically underflowed weight set resets to uniform
//! with a warning; a negative or NaN weight is a programming error and
//! panics.

use magband_types::{FingerState, Vector3, N_FINGERS};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};
use tracing::warn;

use crate::config::ParticleFilterConfig;
use crate::dipole::DipoleConfig;

/// One hand hypothesis.
#[derive(Debug, Clone)]
pub struct Particle {
    pub fingers: [FingerState; N_FINGERS],
}

pub struct ParticleFilter {
    cfg: ParticleFilterConfig,
    dipoles: DipoleConfig,
    particles: Vec<Particle>,
    weights: Vec<f64>,
    rng: StdRng,
    resamples: u64,
}

impl ParticleFilter {
    /// Build a filter with particles drawn around `initial_pose_mm`:
    /// positions from N(pose, 5·positionNoise), velocities from
    /// N(0, velocityNoise).
    pub fn new(
        cfg: ParticleFilterConfig,
        dipoles: DipoleConfig,
        initial_pose_mm: &[Vector3; N_FINGERS],
    ) -> Self {
        let mut rng = match cfg.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let pos_spread = Normal::new(0.0, 5.0 * cfg.position_noise_mm).unwrap();
        let vel_spread = Normal::new(0.0, cfg.velocity_noise_mms).unwrap();

        let n = cfg.num_particles.max(1);
        let particles = (0..n)
            .map(|_| Particle {
                fingers: std::array::from_fn(|f| FingerState {
                    pos: Vector3::new(
                        initial_pose_mm[f].x + pos_spread.sample(&mut rng),
                        initial_pose_mm[f].y + pos_spread.sample(&mut rng),
                        initial_pose_mm[f].z + pos_spread.sample(&mut rng),
                    ),
                    vel: Vector3::new(
                        vel_spread.sample(&mut rng),
                        vel_spread.sample(&mut rng),
                        vel_spread.sample(&mut rng),
                    ),
                }),
            })
            .collect();

        Self {
            cfg,
            dipoles,
            particles,
            weights: vec![1.0 / n as f64; n],
            rng,
            resamples: 0,
        }
    }

    pub fn num_particles(&self) -> usize {
        self.particles.len()
    }

    pub fn resample_count(&self) -> u64 {
        self.resamples
    }

    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    /// Euler-step every particle by its velocity plus process noise.
    pub fn predict(&mut self, dt_s: f64) {
        let pos_noise = Normal::new(0.0, self.cfg.position_noise_mm).unwrap();
        let vel_noise = Normal::new(0.0, self.cfg.velocity_noise_mms * dt_s).unwrap();
        for particle in &mut self.particles {
            for finger in &mut particle.fingers {
                finger.pos = Vector3::new(
                    finger.pos.x + finger.vel.x * dt_s + pos_noise.sample(&mut self.rng),
                    finger.pos.y + finger.vel.y * dt_s + pos_noise.sample(&mut self.rng),
                    finger.pos.z + finger.vel.z * dt_s + pos_noise.sample(&mut self.rng),
                );
                finger.vel = Vector3::new(
                    finger.vel.x + vel_noise.sample(&mut self.rng),
                    finger.vel.y + vel_noise.sample(&mut self.rng),
                    finger.vel.z + vel_noise.sample(&mut self.rng),
                );
            }
        }
    }

    /// Weight particles by the dipole likelihood of the observed residual,
    /// normalize, and resample if the cloud degenerated.
    pub fn update(&mut self, observed_residual_ut: &Vector3) {
        let two_sigma_sq =
            2.0 * self.cfg.measurement_sigma_ut * self.cfg.measurement_sigma_ut;

        for (particle, weight) in self.particles.iter().zip(self.weights.iter_mut()) {
            let positions: [Vector3; N_FINGERS] =
                std::array::from_fn(|f| particle.fingers[f].pos);
            let predicted = self.dipoles.predict_ut(&positions);
            let err = observed_residual_ut.sub(&predicted).magnitude();
            *weight *= (-err * err / two_sigma_sq).exp();
        }

        self.normalize_weights();

        if self.effective_sample_size()
            < self.cfg.resample_threshold * self.particles.len() as f64
        {
            self.resample_systematic();
        }
    }

    fn normalize_weights(&mut self) {
        let sum: f64 = self.weights.iter().sum();
        assert!(
            sum.is_finite() && sum >= 0.0,
            "particle weight sum is invalid: {sum}"
        );
        if sum <= f64::MIN_POSITIVE {
            // All likelihoods underflowed: the observation is far outside the
            // cloud. Recover with a uniform reset.
            warn!("particle weights underflowed to zero, resetting to uniform");
            let uniform = 1.0 / self.weights.len() as f64;
            self.weights.iter_mut().for_each(|w| *w = uniform);
            return;
        }
        for w in &mut self.weights {
            *w /= sum;
            assert!(w.is_finite() && *w >= 0.0, "negative or NaN particle weight: {w}");
        }
    }

    /// `N_eff = 1 / Σ wᵢ²`.
    pub fn effective_sample_size(&self) -> f64 {
        let sum_sq: f64 = self.weights.iter().map(|w| w * w).sum();
        if sum_sq > 0.0 {
            1.0 / sum_sq
        } else {
            0.0
        }
    }

    /// Low-variance systematic resampling: one uniform draw, N evenly spaced
    /// pointers walked through the cumulative weight bins.
    fn resample_systematic(&mut self) {
        let n = self.particles.len();
        let u0 = self.rng.gen::<f64>() / n as f64;

        let mut resampled = Vec::with_capacity(n);
        let mut cumulative = self.weights[0];
        let mut index = 0;
        for k in 0..n {
            let u = u0 + k as f64 / n as f64;
            while u > cumulative && index < n - 1 {
                index += 1;
                cumulative += self.weights[index];
            }
            resampled.push(self.particles[index].clone());
        }

        self.particles = resampled;
        let uniform = 1.0 / n as f64;
        self.weights.iter_mut().for_each(|w| *w = uniform);
        self.resamples += 1;
    }

    /// Weighted mean fingertip positions across the cloud, mm.
    pub fn estimate(&self) -> [Vector3; N_FINGERS] {
        let mut means = [Vector3::zeros(); N_FINGERS];
        for (particle, &w) in self.particles.iter().zip(&self.weights) {
            for f in 0..N_FINGERS {
                means[f] = means[f].add(&particle.fingers[f].pos.scale(w));
            }
        }
        means
    }

    /// Weighted position standard deviation across all particles and fingers,
    /// mm. A cloud-health number: shrinks as the filter converges.
    pub fn diversity(&self) -> f64 {
        let means = self.estimate();
        let mut var = 0.0;
        for (particle, &w) in self.particles.iter().zip(&self.weights) {
            for f in 0..N_FINGERS {
                let d = particle.fingers[f].pos.sub(&means[f]);
                var += w * d.dot(&d);
            }
        }
        (var / N_FINGERS as f64).sqrt()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dipole::HandGeometry;

    fn test_cfg(n: usize) -> ParticleFilterConfig {
        ParticleFilterConfig {
            num_particles: n,
            seed: Some(7),
            ..ParticleFilterConfig::default()
        }
    }

    fn extended_pose() -> [Vector3; N_FINGERS] {
        HandGeometry::default().extended_mm
    }

    #[test]
    fn weights_stay_normalized_and_nonnegative() {
        let mut pf = ParticleFilter::new(test_cfg(200), DipoleConfig::default(), &extended_pose());
        let observed = DipoleConfig::default().predict_ut(&extended_pose());
        for _ in 0..20 {
            pf.predict(0.02);
            pf.update(&observed);
            let sum: f64 = pf.weights().iter().sum();
            assert!((sum - 1.0).abs() < 1e-9);
            assert!(pf.weights().iter().all(|&w| w >= 0.0));
        }
    }

    #[test]
    fn underflow_resets_to_uniform() {
        let mut pf = ParticleFilter::new(test_cfg(100), DipoleConfig::default(), &extended_pose());
        // An absurd observation no particle can explain.
        let observed = Vector3::new(1e6, 0.0, 0.0);
        pf.update(&observed);
        let uniform = 1.0 / 100.0;
        assert!(pf.weights().iter().all(|&w| (w - uniform).abs() < 1e-12));
    }

    #[test]
    fn equal_weight_resample_is_identity_permutation() {
        let mut pf = ParticleFilter::new(test_cfg(50), DipoleConfig::default(), &extended_pose());
        let before = pf.estimate();
        // With exactly uniform weights every particle lands one pointer.
        pf.resample_systematic();
        let after = pf.estimate();
        for f in 0..N_FINGERS {
            assert!(before[f].dist(&after[f]) < 1e-9);
        }
    }

    #[test]
    fn perfect_observation_is_idempotent() {
        // Zero spread: every particle predicts exactly the observed field, so
        // weights stay uniform, N_eff stays N, and no resample fires.
        let cfg = ParticleFilterConfig {
            num_particles: 100,
            position_noise_mm: 0.0,
            velocity_noise_mms: 0.0,
            seed: Some(7),
            ..ParticleFilterConfig::default()
        };
        let pose = extended_pose();
        let mut pf = ParticleFilter::new(cfg, DipoleConfig::default(), &pose);
        let observed = DipoleConfig::default().predict_ut(&pose);
        for _ in 0..5 {
            pf.predict(0.02);
            pf.update(&observed);
        }
        assert_eq!(pf.resample_count(), 0);
        assert!((pf.effective_sample_size() - 100.0).abs() < 1e-6);
        let uniform = 1.0 / 100.0;
        assert!(pf.weights().iter().all(|&w| (w - uniform).abs() < 1e-12));
    }

    #[test]
    fn diversity_shrinks_under_repeated_updates() {
        let mut pf = ParticleFilter::new(test_cfg(300), DipoleConfig::default(), &extended_pose());
        let observed = DipoleConfig::default().predict_ut(&extended_pose());
        let initial = pf.diversity();
        // Pure selection (no process noise injected between updates) can only
        // concentrate the cloud.
        for _ in 0..10 {
            pf.update(&observed);
        }
        assert!(pf.diversity() < initial);
    }

    #[test]
    #[should_panic(expected = "particle weight sum is invalid")]
    fn nan_weight_sum_panics() {
        let mut pf = ParticleFilter::new(test_cfg(10), DipoleConfig::default(), &extended_pose());
        pf.weights[0] = f64::NAN;
        pf.normalize_weights();
    }
}
