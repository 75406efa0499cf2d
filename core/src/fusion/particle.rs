//! Monte-Carlo fusion: particles drawn around each measurement, weighted by
//! every sensor's likelihood, then summarised by their weighted moments.

use nalgebra::{Matrix6, Vector6};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::StandardNormal;

use crate::fusion::measurement::{
    combined_confidence, require_measurements, FusedTrack, SensorMeasurement,
};
use crate::fusion::{Fuser, FusionConfig, FusionMethod};
use crate::math::matrix::MatrixHelper;
use crate::prelude::{RadarError, RadarResult};
use crate::telemetry::log::LogManager;

#[derive(Debug, Clone)]
pub struct ParticleFuser {
    particle_count: usize,
    /// Resample when ESS falls below this fraction of the particle count.
    resample_threshold: f64,
    seed: u64,
    logger: LogManager,
}

impl ParticleFuser {
    pub fn new(particle_count: usize, resample_threshold: f64, seed: u64) -> RadarResult<Self> {
        if particle_count == 0 {
            return Err(RadarError::InvalidParameter(
                "particle count must be positive".into(),
            ));
        }
        if !(0.0..=1.0).contains(&resample_threshold) {
            return Err(RadarError::InvalidParameter(format!(
                "resample threshold must lie in [0, 1], got {}",
                resample_threshold
            )));
        }
        Ok(Self {
            particle_count,
            resample_threshold,
            seed,
            logger: LogManager::new("particle"),
        })
    }

    pub fn from_config(config: &FusionConfig) -> RadarResult<Self> {
        Self::new(config.particle_count, config.resample_threshold, config.seed)
    }

    /// Particles per measurement, proportional to confidence over covariance trace.
    fn allocation(&self, measurements: &[SensorMeasurement], covariances: &[Matrix6<f64>]) -> Vec<usize> {
        let shares: Vec<f64> = measurements
            .iter()
            .zip(covariances)
            .map(|(m, cov)| m.confidence / cov.trace().max(f64::MIN_POSITIVE))
            .collect();
        let total: f64 = shares.iter().sum();
        let shares: Vec<f64> = if total > 0.0 && total.is_finite() {
            shares.iter().map(|s| s / total).collect()
        } else {
            vec![1.0 / measurements.len() as f64; measurements.len()]
        };

        let mut counts: Vec<usize> = shares
            .iter()
            .map(|s| (s * self.particle_count as f64).floor() as usize)
            .collect();
        let assigned: usize = counts.iter().sum();
        if let Some(largest) = shares
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(idx, _)| idx)
        {
            counts[largest] += self.particle_count - assigned;
        }
        counts
    }
}

/// Effective sample size of normalised weights.
pub fn effective_sample_size(weights: &[f64]) -> f64 {
    let sum_sq: f64 = weights.iter().map(|w| w * w).sum();
    if sum_sq > 0.0 {
        1.0 / sum_sq
    } else {
        0.0
    }
}

/// Systematic resampling: one uniform offset, `n` evenly spaced pointers.
pub fn systematic_resample<R: Rng + ?Sized>(weights: &[f64], rng: &mut R) -> Vec<usize> {
    let n = weights.len();
    let mut indices = Vec::with_capacity(n);
    if n == 0 {
        return indices;
    }
    let offset: f64 = rng.gen::<f64>() / n as f64;
    let mut cumulative = weights[0];
    let mut source = 0;
    for i in 0..n {
        let pointer = offset + i as f64 / n as f64;
        while pointer > cumulative && source + 1 < n {
            source += 1;
            cumulative += weights[source];
        }
        indices.push(source);
    }
    indices
}

impl Fuser for ParticleFuser {
    fn method(&self) -> FusionMethod {
        FusionMethod::ParticleFilter
    }

    fn fuse(&self, measurements: &[SensorMeasurement]) -> RadarResult<FusedTrack> {
        require_measurements(measurements)?;
        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);

        let covariances = measurements
            .iter()
            .map(|m| MatrixHelper::regularize(&m.uncertainty))
            .collect::<RadarResult<Vec<_>>>()?;
        let inverses = covariances
            .iter()
            .map(MatrixHelper::invert)
            .collect::<RadarResult<Vec<_>>>()?;

        let mut particles: Vec<Vector6<f64>> = Vec::with_capacity(self.particle_count);
        for ((measurement, cov), count) in measurements
            .iter()
            .zip(&covariances)
            .zip(self.allocation(measurements, &covariances))
        {
            let factor = cov.cholesky().ok_or_else(|| {
                RadarError::InvalidParameter(format!(
                    "covariance of {} does not factor",
                    measurement.sensor_id
                ))
            })?;
            let lower = factor.l();
            let centre = measurement.state();
            for _ in 0..count {
                let z = Vector6::from_fn(|_, _| rng.sample::<f64, _>(StandardNormal));
                particles.push(centre + lower * z);
            }
        }

        // Raw likelihood products, deliberately not log-shifted so that a set
        // no sensor supports underflows to zero.
        let raw: Vec<f64> = particles
            .iter()
            .map(|particle| {
                measurements
                    .iter()
                    .zip(&inverses)
                    .map(|(m, inverse)| {
                        let residual = particle - m.state();
                        let d2 = (residual.transpose() * inverse * residual)[(0, 0)];
                        (-0.5 * m.confidence * d2).exp()
                    })
                    .product::<f64>()
            })
            .collect();
        let total: f64 = raw.iter().sum();
        if !(total > 0.0) || !total.is_finite() {
            return Err(RadarError::DegenerateParticleSet(format!(
                "all {} particle weights underflowed",
                particles.len()
            )));
        }
        let mut weights: Vec<f64> = raw.iter().map(|w| w / total).collect();

        let ess = effective_sample_size(&weights);
        let ess_ratio = ess / particles.len() as f64;
        if ess_ratio < self.resample_threshold {
            let indices = systematic_resample(&weights, &mut rng);
            particles = indices.iter().map(|&idx| particles[idx]).collect();
            let uniform = 1.0 / particles.len() as f64;
            weights = vec![uniform; particles.len()];
            self.logger.record(&format!(
                "resampled {} particles at ESS {:.1}",
                particles.len(),
                ess
            ));
        }

        let mean = particles
            .iter()
            .zip(&weights)
            .fold(Vector6::zeros(), |acc, (p, w)| acc + p * *w);
        let spread = particles
            .iter()
            .zip(&weights)
            .fold(Matrix6::zeros(), |acc, (p, w)| {
                let d = p - mean;
                acc + d * d.transpose() * *w
            });
        let covariance = MatrixHelper::regularize(&spread)?;

        Ok(FusedTrack::from_measurements(
            measurements,
            mean,
            covariance,
            combined_confidence(measurements) * ess_ratio.min(1.0),
            FusionMethod::ParticleFilter,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fusion::measurement::test_support::measurement;

    fn fuser() -> ParticleFuser {
        ParticleFuser::new(2_000, 0.5, 7).unwrap()
    }

    #[test]
    fn agreeing_sensors_fuse_near_their_mean() {
        let a = measurement("radar", [100.0, 0.0, 0.0], [10.0, 0.0, 0.0], 4.0, 0.9);
        let b = measurement("ir", [102.0, 0.0, 0.0], [10.0, 0.0, 0.0], 4.0, 0.9);
        let track = fuser().fuse(&[a, b]).unwrap();
        assert!((track.state[0] - 101.0).abs() < 0.5, "fused x {}", track.state[0]);
        assert!((track.state[3] - 10.0).abs() < 0.5);
        assert_eq!(track.method, FusionMethod::ParticleFilter);
        assert!(track.confidence > 0.0 && track.confidence <= 1.0);
        assert!(MatrixHelper::is_positive_semidefinite(&track.covariance, 1e-9));
    }

    #[test]
    fn same_seed_same_answer() {
        let a = measurement("radar", [0.0; 3], [0.0; 3], 1.0, 0.8);
        let b = measurement("ir", [1.0, 1.0, 0.0], [0.0; 3], 2.0, 0.6);
        let first = fuser().fuse(&[a.clone(), b.clone()]).unwrap();
        let second = fuser().fuse(&[a, b]).unwrap();
        assert_eq!(first.state, second.state);
    }

    #[test]
    fn irreconcilable_sensors_degenerate() {
        let a = measurement("radar", [0.0; 3], [0.0; 3], 1.0, 1.0);
        let b = measurement("ir", [5_000.0, 0.0, 0.0], [0.0; 3], 1.0, 1.0);
        assert!(matches!(
            fuser().fuse(&[a, b]),
            Err(RadarError::DegenerateParticleSet(_))
        ));
    }

    #[test]
    fn systematic_resampling_follows_weights() {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let indices = systematic_resample(&[0.0, 1.0, 0.0, 0.0], &mut rng);
        assert_eq!(indices, vec![1, 1, 1, 1]);
        let indices = systematic_resample(&[0.25; 4], &mut rng);
        assert_eq!(indices, vec![0, 1, 2, 3]);
    }

    #[test]
    fn ess_of_uniform_weights_is_count() {
        assert!((effective_sample_size(&[0.25; 4]) - 4.0).abs() < 1e-12);
        assert!((effective_sample_size(&[1.0, 0.0]) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn zero_particles_rejected() {
        assert!(ParticleFuser::new(0, 0.5, 0).is_err());
    }
}
