use log::warn;
use nalgebra::{Matrix6, SymmetricEigen, Vector6};

use crate::prelude::{RadarError, RadarResult};

/// Smallest eigenvalue admitted after regularisation, relative to the largest.
const RELATIVE_EIGEN_FLOOR: f64 = 1e-9;
/// Absolute eigenvalue floor for all-zero matrices.
const ABSOLUTE_EIGEN_FLOOR: f64 = 1e-12;

/// Covariance helpers over the 6-state `[position; velocity]` space.
pub struct MatrixHelper;

impl MatrixHelper {
    /// Returns a symmetric positive-definite version of `cov`.
    ///
    /// A matrix that already factors is returned symmetrised (bit-identical for
    /// symmetric input). Otherwise negative or vanishing eigenvalues are lifted to
    /// a floor. Non-finite entries are rejected.
    pub fn regularize(cov: &Matrix6<f64>) -> RadarResult<Matrix6<f64>> {
        if cov.iter().any(|value| !value.is_finite()) {
            return Err(RadarError::InvalidParameter(
                "covariance contains non-finite entries".into(),
            ));
        }
        let symmetric = (cov + cov.transpose()) * 0.5;
        if symmetric.cholesky().is_some() {
            return Ok(symmetric);
        }

        let eigen = SymmetricEigen::new(symmetric);
        let largest = eigen.eigenvalues.iter().fold(0.0_f64, |acc, v| acc.max(v.abs()));
        let floor = (largest * RELATIVE_EIGEN_FLOOR).max(ABSOLUTE_EIGEN_FLOOR);
        let lifted = eigen.eigenvalues.map(|value| value.max(floor));
        warn!(
            "regularized covariance: min eigenvalue {:.3e} lifted to {:.3e}",
            eigen.eigenvalues.min(),
            floor
        );
        let rebuilt = eigen.eigenvectors * Matrix6::from_diagonal(&lifted) * eigen.eigenvectors.transpose();
        Ok((rebuilt + rebuilt.transpose()) * 0.5)
    }

    /// Inverse of the regularised covariance.
    pub fn invert(cov: &Matrix6<f64>) -> RadarResult<Matrix6<f64>> {
        let regular = Self::regularize(cov)?;
        regular
            .cholesky()
            .map(|factor| factor.inverse())
            .ok_or_else(|| RadarError::InvalidParameter("covariance is not invertible".into()))
    }

    /// Squared Mahalanobis distance of `residual` under `cov`.
    pub fn mahalanobis_squared(residual: &Vector6<f64>, cov: &Matrix6<f64>) -> RadarResult<f64> {
        let inverse = Self::invert(cov)?;
        Ok((residual.transpose() * inverse * residual)[(0, 0)])
    }

    pub fn is_positive_semidefinite(cov: &Matrix6<f64>, tolerance: f64) -> bool {
        if cov.iter().any(|value| !value.is_finite()) {
            return false;
        }
        if (cov - cov.transpose()).abs().max() > tolerance {
            return false;
        }
        SymmetricEigen::new(*cov).eigenvalues.min() >= -tolerance
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn positive_definite_input_is_untouched() {
        let cov = Matrix6::from_diagonal(&Vector6::new(1.0, 2.0, 3.0, 4.0, 5.0, 6.0));
        assert_eq!(MatrixHelper::regularize(&cov).unwrap(), cov);
    }

    #[test]
    fn indefinite_input_becomes_positive_definite() {
        let mut cov = Matrix6::identity() * 4.0;
        cov[(2, 2)] = -1.0;
        cov[(0, 1)] = 0.5;
        assert!(!MatrixHelper::is_positive_semidefinite(&cov, 1e-12));
        let fixed = MatrixHelper::regularize(&cov).unwrap();
        assert!(fixed.cholesky().is_some());
        assert!(MatrixHelper::is_positive_semidefinite(&fixed, 1e-9));
    }

    #[test]
    fn non_finite_covariance_is_rejected() {
        let mut cov = Matrix6::identity();
        cov[(4, 4)] = f64::NAN;
        assert!(matches!(
            MatrixHelper::regularize(&cov),
            Err(RadarError::InvalidParameter(_))
        ));
    }

    #[test]
    fn mahalanobis_of_unit_step() {
        let cov = Matrix6::identity() * 4.0;
        let residual = Vector6::new(2.0, 0.0, 0.0, 0.0, 0.0, 0.0);
        assert_relative_eq!(
            MatrixHelper::mahalanobis_squared(&residual, &cov).unwrap(),
            1.0,
            epsilon = 1e-12
        );
    }
}
