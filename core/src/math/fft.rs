use num_complex::Complex64;
use rustfft::{num_traits::Zero, Fft, FftPlanner};
use std::sync::Arc;

/// Helper that wraps the `rustfft` planner for reuse.
pub struct FftHelper {
    forward: Arc<dyn Fft<f64>>,
    inverse: Arc<dyn Fft<f64>>,
    size: usize,
}

impl FftHelper {
    pub fn new(size: usize) -> Self {
        let mut planner = FftPlanner::new();
        let forward = planner.plan_fft_forward(size);
        let inverse = planner.plan_fft_inverse(size);
        Self {
            forward,
            inverse,
            size,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Forward transform of `input`, zero-padded or truncated to the plan size.
    pub fn forward(&self, input: &[Complex64]) -> Vec<Complex64> {
        let mut buffer = self.padded(input);
        self.forward.process(&mut buffer);
        buffer
    }

    /// Inverse transform scaled by `1/N`, so `inverse(forward(x)) == x`.
    pub fn inverse(&self, input: &[Complex64]) -> Vec<Complex64> {
        let mut buffer = self.padded(input);
        self.inverse.process(&mut buffer);
        let scale = 1.0 / self.size as f64;
        buffer.iter_mut().for_each(|value| *value *= scale);
        buffer
    }

    fn padded(&self, input: &[Complex64]) -> Vec<Complex64> {
        let mut buffer: Vec<Complex64> = input.iter().take(self.size).copied().collect();
        buffer.resize(self.size, Complex64::zero());
        buffer
    }
}

/// Rotates a spectrum so the zero-frequency bin sits at index `n / 2`.
pub fn fftshift<T: Clone>(spectrum: &[T]) -> Vec<T> {
    let n = spectrum.len();
    let split = n - n / 2;
    spectrum[split..]
        .iter()
        .chain(spectrum[..split].iter())
        .cloned()
        .collect()
}

/// Centred frequency axis matching [`fftshift`] for `n` bins at `sample_rate`.
pub fn shifted_frequencies(n: usize, sample_rate: f64) -> Vec<f64> {
    let half = (n / 2) as isize;
    (0..n as isize)
        .map(|k| (k - half) as f64 * sample_rate / n as f64)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn fft_helper_returns_same_length() {
        let helper = FftHelper::new(4);
        let input: Vec<Complex64> = [1.0, 0.0, -1.0, 0.0]
            .iter()
            .map(|&v| Complex64::new(v, 0.0))
            .collect();
        assert_eq!(helper.forward(&input).len(), 4);
    }

    #[test]
    fn inverse_undoes_forward() {
        let helper = FftHelper::new(8);
        let input: Vec<Complex64> = (0..8).map(|i| Complex64::new(i as f64, -(i as f64) / 2.0)).collect();
        let restored = helper.inverse(&helper.forward(&input));
        for (a, b) in input.iter().zip(restored.iter()) {
            assert_abs_diff_eq!(a.re, b.re, epsilon = 1e-12);
            assert_abs_diff_eq!(a.im, b.im, epsilon = 1e-12);
        }
    }

    #[test]
    fn shift_centres_zero_frequency() {
        assert_eq!(fftshift(&[0, 1, 2, 3]), vec![2, 3, 0, 1]);
        assert_eq!(fftshift(&[0, 1, 2, 3, 4]), vec![3, 4, 0, 1, 2]);
        assert_eq!(shifted_frequencies(4, 4.0), vec![-2.0, -1.0, 0.0, 1.0]);
        assert_eq!(shifted_frequencies(5, 5.0), vec![-2.0, -1.0, 0.0, 1.0, 2.0]);
    }
}
