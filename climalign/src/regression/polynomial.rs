//! Least-squares polynomial trend fitting.
//!
//! Calendar years make the raw Vandermonde system badly conditioned at
//! degree 4 (`2000^8` in the normal matrix), so x is mapped to
//! `u = (x - center) / scale` in `[-1, 1]` before solving. Coefficients are
//! expanded back to raw x for reporting only; evaluation stays in `u`.

use serde::{Serialize, Serializer};

use crate::error::{FitError, FitResult};

/// Relative pivot size below which the normal matrix is treated as singular.
const PIVOT_EPSILON: f64 = 1.0e-12;

/// A fitted polynomial.
#[derive(Debug, Clone, PartialEq)]
pub struct Polynomial {
    center: f64,
    scale: f64,
    /// Coefficients in `u`, lowest power first.
    local: Vec<f64>,
}

impl Polynomial {
    pub fn degree(&self) -> usize {
        self.local.len().saturating_sub(1)
    }

    /// Value at `x`.
    pub fn evaluate(&self, x: f64) -> f64 {
        let u = (x - self.center) / self.scale;
        self.local.iter().rev().fold(0.0, |acc, c| acc * u + c)
    }

    /// Coefficients in raw x, highest power first.
    pub fn coefficients(&self) -> Vec<f64> {
        let d = self.local.len();
        let mut raw = vec![0.0; d];
        let shift = -self.center;

        // (x + shift)^k / scale^k = sum_j C(k, j) x^j shift^(k-j) / scale^k
        for (k, &c) in self.local.iter().enumerate() {
            let factor = c / self.scale.powi(k as i32);
            let mut binom = 1.0;
            for (j, slot) in raw.iter_mut().enumerate().take(k + 1) {
                *slot += factor * binom * shift.powi((k - j) as i32);
                binom = binom * (k - j) as f64 / (j + 1) as f64;
            }
        }

        raw.reverse();
        raw
    }
}

impl Serialize for Polynomial {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.coefficients().serialize(serializer)
    }
}

/// Fit a polynomial of `degree` through `(xs[i], ys[i])`.
pub fn fit_trend(xs: &[f64], ys: &[f64], degree: usize) -> FitResult<Polynomial> {
    if xs.len() != ys.len() {
        return Err(FitError::LengthMismatch {
            xs: xs.len(),
            ys: ys.len(),
        });
    }
    if xs.is_empty() {
        return Err(FitError::Empty);
    }
    let terms = degree.checked_add(1).unwrap_or(usize::MAX);
    if xs.len() < terms {
        return Err(FitError::Underdetermined {
            points: xs.len(),
            required: terms,
        });
    }
    if distinct(xs) < terms {
        return Err(FitError::Singular);
    }

    let n = xs.len() as f64;
    let center = xs.iter().sum::<f64>() / n;
    let spread = xs.iter().map(|x| (x - center).abs()).fold(0.0, f64::max);
    let scale = if spread > 0.0 { spread } else { 1.0 };

    // Normal equations: (VᵀV) c = Vᵀy with V[i][k] = u_i^k
    let mut matrix = vec![vec![0.0; terms]; terms];
    let mut rhs = vec![0.0; terms];
    let mut powers = vec![0.0; 2 * terms - 1];
    for (x, y) in xs.iter().zip(ys) {
        let u = (x - center) / scale;
        let mut p = 1.0;
        for slot in powers.iter_mut() {
            *slot = p;
            p *= u;
        }
        for row in 0..terms {
            rhs[row] += powers[row] * y;
            for col in 0..terms {
                matrix[row][col] += powers[row + col];
            }
        }
    }

    let local = solve(matrix, rhs, n * PIVOT_EPSILON)?;
    Ok(Polynomial { center, scale, local })
}

fn distinct(xs: &[f64]) -> usize {
    let mut sorted = xs.to_vec();
    sorted.sort_by(f64::total_cmp);
    sorted.dedup();
    sorted.len()
}

/// Gaussian elimination with partial pivoting.
fn solve(mut a: Vec<Vec<f64>>, mut b: Vec<f64>, tolerance: f64) -> FitResult<Vec<f64>> {
    let size = b.len();

    for col in 0..size {
        let pivot = (col..size)
            .max_by(|&i, &j| a[i][col].abs().total_cmp(&a[j][col].abs()))
            .unwrap_or(col);
        if a[pivot][col].abs() <= tolerance {
            return Err(FitError::Singular);
        }
        a.swap(col, pivot);
        b.swap(col, pivot);

        for row in col + 1..size {
            let factor = a[row][col] / a[col][col];
            if factor == 0.0 {
                continue;
            }
            for k in col..size {
                a[row][k] -= factor * a[col][k];
            }
            b[row] -= factor * b[col];
        }
    }

    let mut solution = vec![0.0; size];
    for row in (0..size).rev() {
        let tail: f64 = (row + 1..size).map(|k| a[row][k] * solution[k]).sum();
        solution[row] = (b[row] - tail) / a[row][row];
    }
    Ok(solution)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(actual: &[f64], expected: &[f64], tol: f64) {
        assert_eq!(actual.len(), expected.len());
        for (a, e) in actual.iter().zip(expected) {
            assert!((a - e).abs() <= tol, "{actual:?} != {expected:?}");
        }
    }

    #[test]
    fn test_quadratic_recovered() {
        let xs = [0.0, 1.0, 2.0, 3.0, 4.0, 5.0];
        let ys: Vec<f64> = xs.iter().map(|x| x * x - 2.0 * x + 3.0).collect();

        let poly = fit_trend(&xs, &ys, 2).unwrap();
        assert_eq!(poly.degree(), 2);
        assert_close(&poly.coefficients(), &[1.0, -2.0, 3.0], 1e-9);
    }

    #[test]
    fn test_quartic_over_calendar_years_is_stable() {
        let xs: Vec<f64> = (1990..=2020).map(|y| y as f64).collect();
        let ys: Vec<f64> = xs.iter().map(|x| 2.0 * x - 3990.0).collect();

        let poly = fit_trend(&xs, &ys, 4).unwrap();
        for (x, y) in xs.iter().zip(&ys) {
            assert!((poly.evaluate(*x) - y).abs() < 1e-6);
        }
    }

    #[test]
    fn test_raw_coefficients_match_evaluation() {
        let xs = [10.0, 11.0, 12.0, 13.0, 14.0];
        let ys = [1.0, 3.0, 2.0, 5.0, 4.0];
        let poly = fit_trend(&xs, &ys, 2).unwrap();

        let coeffs = poly.coefficients();
        let horner = |x: f64| coeffs.iter().fold(0.0, |acc, c| acc * x + c);
        for x in xs {
            assert!((horner(x) - poly.evaluate(x)).abs() < 1e-8);
        }
    }

    #[test]
    fn test_degree_zero_is_mean() {
        let poly = fit_trend(&[1.0, 2.0, 3.0], &[2.0, 4.0, 9.0], 0).unwrap();
        assert_close(&poly.coefficients(), &[5.0], 1e-12);
    }

    #[test]
    fn test_underdetermined() {
        assert_eq!(
            fit_trend(&[1.0, 2.0, 3.0], &[1.0, 2.0, 3.0], 4),
            Err(FitError::Underdetermined {
                points: 3,
                required: 5
            })
        );
    }

    #[test]
    fn test_unbounded_degree_is_underdetermined() {
        assert_eq!(
            fit_trend(&[1.0, 2.0], &[1.0, 2.0], usize::MAX),
            Err(FitError::Underdetermined {
                points: 2,
                required: usize::MAX
            })
        );
    }

    #[test]
    fn test_repeated_x_is_singular() {
        let xs = [1.0, 1.0, 2.0, 2.0, 2.0];
        let ys = [1.0, 2.0, 3.0, 4.0, 5.0];
        assert_eq!(fit_trend(&xs, &ys, 2), Err(FitError::Singular));
    }

    #[test]
    fn test_empty_and_mismatch() {
        assert_eq!(fit_trend(&[], &[], 1), Err(FitError::Empty));
        assert_eq!(
            fit_trend(&[1.0], &[], 1),
            Err(FitError::LengthMismatch { xs: 1, ys: 0 })
        );
    }

    #[test]
    fn test_serializes_as_raw_coefficients() {
        let poly = fit_trend(&[0.0, 1.0, 2.0], &[1.0, 3.0, 5.0], 1).unwrap();
        let json: Vec<f64> = serde_json::from_str(&serde_json::to_string(&poly).unwrap()).unwrap();
        assert_close(&json, &[2.0, 1.0], 1e-12);
    }
}
