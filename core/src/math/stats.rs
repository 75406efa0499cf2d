/// Summary statistics over real-valued (typically power) samples. Empty input
/// yields zero rather than NaN.
pub struct StatsHelper;

impl StatsHelper {
    pub fn mean(samples: &[f64]) -> f64 {
        if samples.is_empty() {
            return 0.0;
        }
        samples.iter().sum::<f64>() / samples.len() as f64
    }

    pub fn rms(samples: &[f64]) -> f64 {
        Self::mean_square(samples).sqrt()
    }

    pub fn mean_square(samples: &[f64]) -> f64 {
        if samples.is_empty() {
            return 0.0;
        }
        samples.iter().map(|&v| v * v).sum::<f64>() / samples.len() as f64
    }

    /// `rank`-th smallest value (1-based). Reorders `samples` in place.
    pub fn order_statistic(samples: &mut [f64], rank: usize) -> Option<f64> {
        if rank == 0 || rank > samples.len() {
            return None;
        }
        let (_, value, _) = samples.select_nth_unstable_by(rank - 1, |a, b| a.total_cmp(b));
        Some(*value)
    }
}
