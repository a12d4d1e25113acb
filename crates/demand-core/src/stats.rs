//! Small robust-statistics helpers shared by the fitters.

use linregress::{FormulaRegressionBuilder, RegressionDataBuilder};
use serde::{Deserialize, Serialize};

/// Straight line `y = intercept + slope * x`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct LinearFit {
    /// Change in `y` per unit of `x`.
    pub slope: f64,
    /// Value of the line at `x = 0`.
    pub intercept: f64,
}

impl LinearFit {
    /// Line evaluated at `x`.
    pub fn at(&self, x: f64) -> f64 {
        self.intercept + self.slope * x
    }
}

/// Median of finite values. Returns `None` for an empty input.
///
/// Example:
/// assert_eq!(median(&[3.0, 1.0, 2.0]), Some(2.0));
pub fn median(values: &[f64]) -> Option<f64> {
    let mut v: Vec<f64> = values.iter().copied().filter(|x| x.is_finite()).collect();
    if v.is_empty() {
        return None;
    }
    v.sort_by(f64::total_cmp);
    let mid = v.len() / 2;
    if v.len() % 2 == 0 {
        Some((v[mid - 1] + v[mid]) / 2.0)
    } else {
        Some(v[mid])
    }
}

/// Ordinary least squares of `Y ~ X`. `None` with fewer than two points,
/// all `x` equal, or a regression that cannot be fitted.
///
/// Two points leave no residual degrees of freedom for the regression, so
/// the line through them is returned directly. A constant `y` is a flat line.
pub fn ols(xs: &[f64], ys: &[f64]) -> Option<LinearFit> {
    let n = xs.len().min(ys.len());
    if n < 2 {
        return None;
    }
    let (xs, ys) = (&xs[..n], &ys[..n]);
    if xs.iter().all(|x| *x == xs[0]) {
        return None;
    }
    if n == 2 {
        let slope = (ys[1] - ys[0]) / (xs[1] - xs[0]);
        return Some(LinearFit {
            slope,
            intercept: ys[0] - slope * xs[0],
        });
    }
    if ys.iter().all(|y| *y == ys[0]) {
        return Some(LinearFit {
            slope: 0.0,
            intercept: ys[0],
        });
    }

    let data = vec![("Y", ys.to_vec()), ("X", xs.to_vec())];
    let regression_data = RegressionDataBuilder::new().build_from(data).ok()?;
    let model = FormulaRegressionBuilder::new()
        .data(&regression_data)
        .formula("Y ~ X")
        .fit()
        .ok()?;
    // parameters() is [intercept, slope]
    let params = model.parameters();
    Some(LinearFit {
        intercept: *params.first()?,
        slope: *params.get(1)?,
    })
}

/// Theil-Sen estimator: median of all pairwise slopes, intercept is the
/// median of `y - slope * x`. Resistant to up to ~29% outliers.
pub fn theil_sen(xs: &[f64], ys: &[f64]) -> Option<LinearFit> {
    let n = xs.len().min(ys.len());
    if n < 2 {
        return None;
    }
    let mut slopes = Vec::with_capacity(n * (n - 1) / 2);
    for i in 0..n {
        for j in (i + 1)..n {
            let dx = xs[j] - xs[i];
            if dx != 0.0 {
                slopes.push((ys[j] - ys[i]) / dx);
            }
        }
    }
    let slope = median(&slopes)?;
    let residuals: Vec<f64> = xs[..n]
        .iter()
        .zip(&ys[..n])
        .map(|(x, y)| y - slope * x)
        .collect();
    Some(LinearFit {
        slope,
        intercept: median(&residuals)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn median_even_and_odd() {
        assert_eq!(median(&[3.0, 1.0, 2.0]), Some(2.0));
        assert_eq!(median(&[4.0, 1.0, 2.0, 3.0]), Some(2.5));
        assert_eq!(median(&[]), None);
        assert_eq!(median(&[f64::NAN, 5.0]), Some(5.0));
    }

    #[test]
    fn ols_recovers_line() {
        let xs = [0.0, 1.0, 2.0, 3.0];
        let ys = [1.0, 3.0, 5.0, 7.0];
        let fit = ols(&xs, &ys).unwrap();
        assert!((fit.slope - 2.0).abs() < 1e-12);
        assert!((fit.intercept - 1.0).abs() < 1e-12);
        assert!(ols(&[1.0, 1.0], &[1.0, 2.0]).is_none());
    }

    #[test]
    fn ols_handles_degenerate_inputs() {
        let two = ols(&[2020.0, 2021.0], &[100.0f64.ln(), 80.0f64.ln()]).unwrap();
        assert!((two.slope.exp() - 0.8).abs() < 1e-12);
        let flat = ols(&[0.0, 1.0, 2.0], &[5.0, 5.0, 5.0]).unwrap();
        assert_eq!((flat.slope, flat.intercept), (0.0, 5.0));
        assert!(ols(&[1.0], &[1.0]).is_none());
    }

    #[test]
    fn ols_matches_noisy_closed_form() {
        let xs = [0.0, 1.0, 2.0, 3.0, 4.0];
        let ys = [1.0, 2.5, 2.0, 4.5, 4.0];
        let fit = ols(&xs, &ys).unwrap();
        // slope = Sxy / Sxx = 8 / 10
        assert!((fit.slope - 0.8).abs() < 1e-9);
        assert!((fit.intercept - 1.2).abs() < 1e-9);
    }

    #[test]
    fn theil_sen_ignores_outlier() {
        let xs = [0.0, 1.0, 2.0, 3.0, 4.0, 5.0];
        let ys = [10.0, 11.0, 12.0, 100.0, 14.0, 15.0];
        let fit = theil_sen(&xs, &ys).unwrap();
        assert!((fit.slope - 1.0).abs() < 1e-9);
        let naive = ols(&xs, &ys).unwrap();
        assert!(naive.slope > 3.0);
    }
}
