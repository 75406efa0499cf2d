//! Radar cross-section fluctuation (Swerling) and aspect models.

use rand::Rng;
use rand_distr::{Distribution, Exp1, Gamma};
use serde::{Deserialize, Serialize};

use crate::prelude::{require_positive, RadarError, RadarResult};

/// Swerling fluctuation case.
///
/// Cases 1 and 3 draw from a chi-square with two degrees of freedom, cases 2 and
/// 4 from four. Odd cases decorrelate scan-to-scan, even cases pulse-to-pulse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum SwerlingCase {
    Zero,
    One,
    Two,
    Three,
    Four,
}

/// Interval over which one RCS draw stays valid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Correlation {
    Constant,
    ScanToScan,
    PulseToPulse,
}

impl SwerlingCase {
    pub fn correlation(self) -> Correlation {
        match self {
            SwerlingCase::Zero => Correlation::Constant,
            SwerlingCase::One | SwerlingCase::Three => Correlation::ScanToScan,
            SwerlingCase::Two | SwerlingCase::Four => Correlation::PulseToPulse,
        }
    }

    pub fn degrees_of_freedom(self) -> Option<u32> {
        match self {
            SwerlingCase::Zero => None,
            SwerlingCase::One | SwerlingCase::Three => Some(2),
            SwerlingCase::Two | SwerlingCase::Four => Some(4),
        }
    }
}

impl TryFrom<u8> for SwerlingCase {
    type Error = RadarError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(SwerlingCase::Zero),
            1 => Ok(SwerlingCase::One),
            2 => Ok(SwerlingCase::Two),
            3 => Ok(SwerlingCase::Three),
            4 => Ok(SwerlingCase::Four),
            other => Err(RadarError::InvalidDistribution(format!(
                "unknown Swerling case {}",
                other
            ))),
        }
    }
}

impl From<SwerlingCase> for u8 {
    fn from(case: SwerlingCase) -> Self {
        match case {
            SwerlingCase::Zero => 0,
            SwerlingCase::One => 1,
            SwerlingCase::Two => 2,
            SwerlingCase::Three => 3,
            SwerlingCase::Four => 4,
        }
    }
}

/// Draws one RCS value (m²) whose distribution has mean `mean_rcs`.
///
/// This is a raw draw; callers that must honour the correlation interval go
/// through [`RcsFluctuation`].
pub fn sample_rcs<R: Rng + ?Sized>(
    mean_rcs: f64,
    case: SwerlingCase,
    rng: &mut R,
) -> RadarResult<f64> {
    require_positive("mean_rcs", mean_rcs)?;
    match case.degrees_of_freedom() {
        None => Ok(mean_rcs),
        Some(2) => {
            let unit: f64 = Exp1.sample(rng);
            Ok(mean_rcs * unit)
        }
        Some(4) => {
            let gamma = Gamma::new(2.0, mean_rcs / 2.0)
                .map_err(|err| RadarError::InvalidDistribution(err.to_string()))?;
            Ok(gamma.sample(rng))
        }
        Some(other) => Err(RadarError::InvalidDistribution(format!(
            "unsupported chi-square order {}",
            other
        ))),
    }
}

/// Per-target RCS state: the last draw and the interval it belongs to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RcsFluctuation {
    pub mean_rcs: f64,
    pub case: SwerlingCase,
    #[serde(skip)]
    last: Option<((u64, u32), f64)>,
}

impl RcsFluctuation {
    pub fn new(mean_rcs: f64, case: SwerlingCase) -> RadarResult<Self> {
        require_positive("mean_rcs", mean_rcs)?;
        Ok(Self {
            mean_rcs,
            case,
            last: None,
        })
    }

    /// RCS for pulse `pulse` of scan `scan`. A new value is drawn only when the
    /// pair crosses the case's correlation boundary.
    pub fn sample<R: Rng + ?Sized>(&mut self, scan: u64, pulse: u32, rng: &mut R) -> RadarResult<f64> {
        let key = match self.case.correlation() {
            Correlation::Constant => return Ok(self.mean_rcs),
            Correlation::ScanToScan => (scan, 0),
            Correlation::PulseToPulse => (scan, pulse),
        };
        if let Some((last_key, value)) = self.last {
            if last_key == key {
                return Ok(value);
            }
        }
        let value = sample_rcs(self.mean_rcs, self.case, rng)?;
        self.last = Some((key, value));
        Ok(value)
    }

    pub fn last_rcs(&self) -> Option<f64> {
        match self.case {
            SwerlingCase::Zero => Some(self.mean_rcs),
            _ => self.last.map(|(_, value)| value),
        }
    }
}

/// Broad target class, used for aspect dependence and feature export.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetType {
    Aircraft,
    Missile,
    Clutter,
}

impl TargetType {
    /// Broadside-to-nose RCS ratio.
    fn broadside_ratio(self) -> f64 {
        match self {
            TargetType::Aircraft => 10.0,
            TargetType::Missile => 4.0,
            TargetType::Clutter => 1.0,
        }
    }
}

/// Scales `rcs` for the viewing aspect (radians between the target's heading and
/// the line of sight back to the radar). The scaling averages to one over all
/// aspects, so `rcs` keeps its meaning as the mean value.
pub fn aspect_dependent_rcs(rcs: f64, target_type: TargetType, aspect: f64) -> f64 {
    let ratio = target_type.broadside_ratio();
    let shape = 1.0 + (ratio - 1.0) * aspect.sin().powi(2);
    rcs * shape / ((1.0 + ratio) / 2.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    const DRAWS: usize = 20_000;
    /// Relative tolerance on the empirical mean over `DRAWS` samples.
    const MEAN_TOLERANCE: f64 = 0.05;

    #[test]
    fn swerling_zero_is_constant() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        for _ in 0..100 {
            assert_eq!(sample_rcs(3.5, SwerlingCase::Zero, &mut rng).unwrap(), 3.5);
        }
    }

    #[test]
    fn fluctuating_cases_preserve_the_mean() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        for case in [
            SwerlingCase::One,
            SwerlingCase::Two,
            SwerlingCase::Three,
            SwerlingCase::Four,
        ] {
            let total: f64 = (0..DRAWS)
                .map(|_| sample_rcs(2.0, case, &mut rng).unwrap())
                .sum();
            let mean = total / DRAWS as f64;
            assert_relative_eq!(mean, 2.0, max_relative = MEAN_TOLERANCE);
        }
    }

    #[test]
    fn degrees_of_freedom_follow_the_case_table() {
        assert_eq!(SwerlingCase::Zero.degrees_of_freedom(), None);
        assert_eq!(SwerlingCase::One.degrees_of_freedom(), Some(2));
        assert_eq!(SwerlingCase::Two.degrees_of_freedom(), Some(4));
        assert_eq!(SwerlingCase::Three.degrees_of_freedom(), Some(2));
        assert_eq!(SwerlingCase::Four.degrees_of_freedom(), Some(4));
    }

    #[test]
    fn each_case_has_its_chi_square_variance() {
        let mut rng = ChaCha8Rng::seed_from_u64(11);
        let mean = 10.0;
        // chi-square(2): variance = mean², chi-square(4): variance = mean² / 2
        for (case, expected) in [
            (SwerlingCase::One, mean * mean),
            (SwerlingCase::Two, mean * mean / 2.0),
            (SwerlingCase::Three, mean * mean),
            (SwerlingCase::Four, mean * mean / 2.0),
        ] {
            let draws: Vec<f64> = (0..2 * DRAWS)
                .map(|_| sample_rcs(mean, case, &mut rng).unwrap())
                .collect();
            let variance =
                draws.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / draws.len() as f64;
            assert_relative_eq!(variance, expected, max_relative = 0.1);
        }
    }

    #[test]
    fn scan_to_scan_cases_hold_within_a_scan() {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let mut rcs = RcsFluctuation::new(1.0, SwerlingCase::One).unwrap();
        let first = rcs.sample(0, 0, &mut rng).unwrap();
        assert_eq!(rcs.sample(0, 1, &mut rng).unwrap(), first);
        assert_eq!(rcs.sample(0, 7, &mut rng).unwrap(), first);
        assert_ne!(rcs.sample(1, 0, &mut rng).unwrap(), first);
    }

    #[test]
    fn pulse_to_pulse_cases_redraw_each_pulse() {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let mut rcs = RcsFluctuation::new(1.0, SwerlingCase::Four).unwrap();
        let first = rcs.sample(0, 0, &mut rng).unwrap();
        assert_eq!(rcs.sample(0, 0, &mut rng).unwrap(), first);
        let second = rcs.sample(0, 1, &mut rng).unwrap();
        assert_ne!(second, first);
        assert_eq!(rcs.last_rcs(), Some(second));
    }

    #[test]
    fn unknown_case_is_an_invalid_distribution() {
        assert!(matches!(
            SwerlingCase::try_from(5),
            Err(RadarError::InvalidDistribution(_))
        ));
        assert_eq!(SwerlingCase::try_from(3), Ok(SwerlingCase::Three));
    }

    #[test]
    fn aspect_scaling_averages_to_one() {
        let steps = 3600;
        let total: f64 = (0..steps)
            .map(|i| {
                let aspect = i as f64 / steps as f64 * std::f64::consts::TAU;
                aspect_dependent_rcs(1.0, TargetType::Aircraft, aspect)
            })
            .sum();
        assert_relative_eq!(total / steps as f64, 1.0, max_relative = 1e-6);
        assert!(
            aspect_dependent_rcs(1.0, TargetType::Aircraft, std::f64::consts::FRAC_PI_2)
                > aspect_dependent_rcs(1.0, TargetType::Aircraft, 0.0)
        );
        assert_eq!(aspect_dependent_rcs(2.0, TargetType::Clutter, 0.3), 2.0);
    }
}
