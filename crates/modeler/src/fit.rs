//! Least-squares polynomial fitting.
//!
//! Builds the Vandermonde design matrix for samples at x = 0, 1, 2, ... and
//! solves the least-squares system with a Householder QR factorization,
//! which stays numerically stable where the normal-equations shortcut loses
//! precision.

use thiserror::Error;

#[derive(Debug, Error)]
pub(crate) enum FitError {
    #[error("{points} points cannot determine {unknowns} coefficients")]
    Underdetermined { points: usize, unknowns: usize },
    #[error("design matrix is numerically singular")]
    Singular,
    #[error("fit produced non-finite coefficients")]
    NonFinite,
}

/// Fit a polynomial of the given degree to `y` sampled at x = 0, 1, 2, ...,
/// returning coefficients in ascending power order.
#[allow(clippy::cast_precision_loss)]
pub(crate) fn polyfit(y: &[f64], degree: usize) -> Result<Vec<f64>, FitError> {
    let rows = y.len();
    let cols = degree + 1;
    if rows < cols {
        return Err(FitError::Underdetermined { points: rows, unknowns: cols });
    }

    // Row-major Vandermonde matrix: a[i][j] = x_i^j.
    let mut a = vec![0.0_f64; rows * cols];
    for (i, row) in a.chunks_exact_mut(cols).enumerate() {
        let x = i as f64;
        let mut power = 1.0;
        for cell in row.iter_mut() {
            *cell = power;
            power *= x;
        }
    }
    let mut b = y.to_vec();

    // Reduce A to upper-triangular form, applying each reflector to the
    // remaining columns and to b.
    for k in 0..cols {
        let mut norm = 0.0;
        for i in k..rows {
            norm += a[i * cols + k] * a[i * cols + k];
        }
        let norm = norm.sqrt();
        if norm == 0.0 {
            return Err(FitError::Singular);
        }

        let alpha = if a[k * cols + k] > 0.0 { -norm } else { norm };
        let mut v: Vec<f64> = (k..rows).map(|i| a[i * cols + k]).collect();
        v[0] -= alpha;
        let v_norm_sq: f64 = v.iter().map(|t| t * t).sum();
        if v_norm_sq == 0.0 {
            continue;
        }

        for j in k..cols {
            let mut dot = 0.0;
            for i in k..rows {
                dot += v[i - k] * a[i * cols + j];
            }
            let scale = 2.0 * dot / v_norm_sq;
            for i in k..rows {
                a[i * cols + j] -= scale * v[i - k];
            }
        }
        let mut dot = 0.0;
        for i in k..rows {
            dot += v[i - k] * b[i];
        }
        let scale = 2.0 * dot / v_norm_sq;
        for i in k..rows {
            b[i] -= scale * v[i - k];
        }
    }

    // Back-substitution on the triangular factor.
    let mut coefficients = vec![0.0_f64; cols];
    for k in (0..cols).rev() {
        let mut sum = b[k];
        for j in k + 1..cols {
            sum -= a[k * cols + j] * coefficients[j];
        }
        let diagonal = a[k * cols + k];
        if diagonal.abs() < f64::EPSILON {
            return Err(FitError::Singular);
        }
        coefficients[k] = sum / diagonal;
    }

    if coefficients.iter().any(|c| !c.is_finite()) {
        return Err(FitError::NonFinite);
    }
    Ok(coefficients)
}

/// Evaluate a polynomial (ascending coefficient order) at `x` using
/// Horner's rule.
pub(crate) fn polyval(coefficients: &[f64], x: f64) -> f64 {
    coefficients.iter().rev().fold(0.0, |acc, &c| acc * x + c)
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOLERANCE: f64 = 1e-9;

    fn assert_close(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() < TOLERANCE,
            "expected {expected}, got {actual}",
        );
    }

    #[test]
    fn recovers_exact_line() {
        // y = 3 + 2x
        let y: Vec<f64> = (0..10).map(|x| 3.0 + 2.0 * f64::from(x)).collect();
        let coefficients = polyfit(&y, 1).unwrap();
        assert_eq!(coefficients.len(), 2);
        assert_close(coefficients[0], 3.0);
        assert_close(coefficients[1], 2.0);
    }

    #[test]
    fn flat_series_has_zero_slope() {
        let y = vec![50.0; 19];
        let coefficients = polyfit(&y, 1).unwrap();
        assert_close(coefficients[0], 50.0);
        assert_close(coefficients[1], 0.0);
        assert_close(polyval(&coefficients, 19.0), 50.0);
    }

    #[test]
    fn recovers_exact_quadratic() {
        // y = 1 - x + 2x^2
        let y: Vec<f64> = (0..15)
            .map(|x| {
                let x = f64::from(x);
                1.0 - x + 2.0 * x * x
            })
            .collect();
        let coefficients = polyfit(&y, 2).unwrap();
        assert_close(coefficients[0], 1.0);
        assert_close(coefficients[1], -1.0);
        assert_close(coefficients[2], 2.0);
    }

    #[test]
    fn overdetermined_noisy_line_stays_close() {
        let y = vec![10.0, 12.1, 13.9, 16.0, 18.1, 19.9, 22.0];
        let coefficients = polyfit(&y, 1).unwrap();
        assert!((coefficients[1] - 2.0).abs() < 0.1);
        assert!((coefficients[0] - 10.0).abs() < 0.2);
    }

    #[test]
    fn too_few_points_is_underdetermined() {
        let err = polyfit(&[1.0, 2.0], 3).unwrap_err();
        assert!(matches!(err, FitError::Underdetermined { points: 2, unknowns: 4 }));
    }

    #[test]
    fn polyval_evaluates_ascending_order() {
        // 1 + 2x + 3x^2 at x = 2 is 17.
        assert_close(polyval(&[1.0, 2.0, 3.0], 2.0), 17.0);
        assert_close(polyval(&[], 5.0), 0.0);
    }
}
