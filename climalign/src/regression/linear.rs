//! Closed-form ordinary least squares with a two-sided significance test.

use serde::Serialize;
use statrs::distribution::{ContinuousCDF, StudentsT};

use crate::error::{FitError, FitResult};

/// Guards the t statistic against division by zero on a perfect fit.
const TINY: f64 = 1.0e-20;

/// Statistics of a simple linear regression `y = slope * x + intercept`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LinearStats {
    pub slope: f64,
    pub intercept: f64,
    /// Pearson correlation coefficient.
    pub r_value: f64,
    pub r_squared: f64,
    /// Two-sided p-value for a zero slope, Student's t with `n - 2` degrees of freedom.
    pub p_value: f64,
    /// Standard error of the slope.
    pub std_err: f64,
    /// Standard error of the intercept.
    pub intercept_std_err: f64,
    pub n: usize,
}

/// Fit a straight line through `(xs[i], ys[i])`.
///
/// Needs at least three points and at least two distinct x values.
pub fn linear_stats(xs: &[f64], ys: &[f64]) -> FitResult<LinearStats> {
    if xs.len() != ys.len() {
        return Err(FitError::LengthMismatch {
            xs: xs.len(),
            ys: ys.len(),
        });
    }
    let n = xs.len();
    if n == 0 {
        return Err(FitError::Empty);
    }
    if n < 3 {
        return Err(FitError::Underdetermined {
            points: n,
            required: 3,
        });
    }

    let nf = n as f64;
    let x_mean = xs.iter().sum::<f64>() / nf;
    let y_mean = ys.iter().sum::<f64>() / nf;

    let mut ssxm = 0.0;
    let mut ssym = 0.0;
    let mut ssxym = 0.0;
    for (x, y) in xs.iter().zip(ys) {
        let dx = x - x_mean;
        let dy = y - y_mean;
        ssxm += dx * dx;
        ssym += dy * dy;
        ssxym += dx * dy;
    }
    ssxm /= nf;
    ssym /= nf;
    ssxym /= nf;

    if ssxm == 0.0 {
        return Err(FitError::Singular);
    }

    let r_value = if ssym == 0.0 {
        0.0
    } else {
        (ssxym / (ssxm * ssym).sqrt()).clamp(-1.0, 1.0)
    };

    let slope = ssxym / ssxm;
    let intercept = y_mean - slope * x_mean;

    let df = nf - 2.0;
    let t = r_value * (df / ((1.0 - r_value) * (1.0 + r_value) + TINY)).sqrt();
    let p_value = match StudentsT::new(0.0, 1.0, df) {
        Ok(dist) => 2.0 * (1.0 - dist.cdf(t.abs())),
        Err(_) => f64::NAN,
    };

    let std_err = ((1.0 - r_value * r_value) * ssym / ssxm / df).sqrt();
    let intercept_std_err = std_err * (ssxm + x_mean * x_mean).sqrt();

    Ok(LinearStats {
        slope,
        intercept,
        r_value,
        r_squared: r_value * r_value,
        p_value,
        std_err,
        intercept_std_err,
        n,
    })
}
