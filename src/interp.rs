//! 1D interpolation over radial-bin centers.
//!
//! Spectra are estimated per bin; the flattening filter needs them as a
//! smooth function of multipole. A natural cubic spline through the bin
//! centers, held constant beyond the first and last center, gives the filter
//! a defined value over the full Fourier-radius support of a map.

use crate::error::{Error, Result};

/// Midpoints of consecutive bin edges.
pub fn bin_centers(edges: &[f64]) -> Vec<f64> {
    edges.windows(2).map(|w| 0.5 * (w[0] + w[1])).collect()
}

/// Natural cubic spline with flat extrapolation at both ends.
#[derive(Debug, Clone)]
pub struct CubicSpline {
    xs: Vec<f64>,
    ys: Vec<f64>,
    /// Second derivatives at the knots (zero at the boundaries).
    d2: Vec<f64>,
}

impl CubicSpline {
    /// Fit a spline through `(xs[i], ys[i])`.
    ///
    /// `xs` must be strictly increasing with at least two entries; with
    /// exactly two the interpolant degrades to the straight line through
    /// them.
    pub fn new(xs: Vec<f64>, ys: Vec<f64>) -> Result<Self> {
        if xs.len() != ys.len() {
            return Err(Error::Validation(format!(
                "knot counts differ: {} x values, {} y values",
                xs.len(),
                ys.len()
            )));
        }
        if xs.len() < 2 {
            return Err(Error::Validation(format!(
                "need at least 2 knots, got {}",
                xs.len()
            )));
        }
        for w in xs.windows(2) {
            if !(w[1] > w[0]) {
                return Err(Error::Validation(format!(
                    "knot positions must be strictly increasing, got {} then {}",
                    w[0], w[1]
                )));
            }
        }
        if xs.iter().chain(ys.iter()).any(|v| !v.is_finite()) {
            return Err(Error::Validation("knots must be finite".into()));
        }

        let n = xs.len();
        let mut d2 = vec![0.0; n];
        if n > 2 {
            // Thomas algorithm on the interior tridiagonal system; natural
            // boundary conditions pin d2[0] = d2[n-1] = 0.
            let m = n - 2;
            let mut diag = vec![0.0; m];
            let mut rhs = vec![0.0; m];
            let mut sup = vec![0.0; m];
            for i in 0..m {
                let h0 = xs[i + 1] - xs[i];
                let h1 = xs[i + 2] - xs[i + 1];
                diag[i] = 2.0 * (h0 + h1);
                sup[i] = h1;
                rhs[i] = 6.0 * ((ys[i + 2] - ys[i + 1]) / h1 - (ys[i + 1] - ys[i]) / h0);
            }
            // Forward sweep; the subdiagonal entry for row i is h(i) = xs[i+1]-xs[i].
            for i in 1..m {
                let sub = xs[i + 1] - xs[i];
                let w = sub / diag[i - 1];
                diag[i] -= w * sup[i - 1];
                rhs[i] -= w * rhs[i - 1];
            }
            d2[m] = rhs[m - 1] / diag[m - 1];
            for i in (0..m.saturating_sub(1)).rev() {
                d2[i + 1] = (rhs[i] - sup[i] * d2[i + 2]) / diag[i];
            }
        }

        Ok(Self { xs, ys, d2 })
    }

    /// Evaluate the spline; outside the knot range the boundary value is
    /// returned unchanged.
    pub fn eval(&self, x: f64) -> f64 {
        let n = self.xs.len();
        if x <= self.xs[0] {
            return self.ys[0];
        }
        if x >= self.xs[n - 1] {
            return self.ys[n - 1];
        }
        let i = self.xs.partition_point(|&v| v <= x) - 1;
        let h = self.xs[i + 1] - self.xs[i];
        let a = (self.xs[i + 1] - x) / h;
        let b = (x - self.xs[i]) / h;
        a * self.ys[i]
            + b * self.ys[i + 1]
            + ((a * a * a - a) * self.d2[i] + (b * b * b - b) * self.d2[i + 1]) * h * h / 6.0
    }
}

/// Moving mean of `x` over a window of `window` samples.
///
/// Returns `x.len() - window + 1` values, computed with a running cumulative
/// sum.
pub fn rolling_average(x: &[f64], window: usize) -> Result<Vec<f64>> {
    if window == 0 || window > x.len() {
        return Err(Error::Validation(format!(
            "window {window} out of range for {} samples",
            x.len()
        )));
    }
    let mut cumsum = Vec::with_capacity(x.len() + 1);
    cumsum.push(0.0);
    let mut acc = 0.0;
    for &v in x {
        acc += v;
        cumsum.push(acc);
    }
    Ok((window..cumsum.len())
        .map(|i| (cumsum[i] - cumsum[i - window]) / window as f64)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn centers_are_midpoints() {
        assert_eq!(bin_centers(&[0.0, 2.0, 6.0]), vec![1.0, 4.0]);
    }

    #[test]
    fn spline_reproduces_knots() {
        let xs = vec![0.0, 1.0, 2.5, 4.0, 7.0];
        let ys = vec![1.0, 3.0, -2.0, 0.5, 4.0];
        let sp = CubicSpline::new(xs.clone(), ys.clone()).unwrap();
        for (x, y) in xs.iter().zip(&ys) {
            assert!((sp.eval(*x) - y).abs() < 1e-10, "knot at {x}");
        }
    }

    #[test]
    fn spline_extrapolates_flat() {
        let sp = CubicSpline::new(vec![1.0, 2.0, 3.0], vec![5.0, 7.0, 6.0]).unwrap();
        assert_eq!(sp.eval(-10.0), 5.0);
        assert_eq!(sp.eval(0.999), 5.0);
        assert_eq!(sp.eval(3.001), 6.0);
        assert_eq!(sp.eval(100.0), 6.0);
    }

    #[test]
    fn two_knots_is_linear() {
        let sp = CubicSpline::new(vec![0.0, 2.0], vec![0.0, 4.0]).unwrap();
        assert!((sp.eval(0.5) - 1.0).abs() < 1e-12);
        assert!((sp.eval(1.5) - 3.0).abs() < 1e-12);
    }

    #[test]
    fn spline_is_smooth_between_knots() {
        // A spline through samples of a smooth function should stay close to
        // it inside the range.
        let xs: Vec<f64> = (0..10).map(|i| i as f64).collect();
        let ys: Vec<f64> = xs.iter().map(|&x| (0.5 * x).sin()).collect();
        let sp = CubicSpline::new(xs, ys).unwrap();
        for i in 5..86 {
            let x = 0.1 * i as f64;
            assert!((sp.eval(x) - (0.5 * x).sin()).abs() < 0.02, "x={x}");
        }
    }

    #[test]
    fn bad_knots_rejected() {
        assert!(CubicSpline::new(vec![0.0], vec![1.0]).is_err());
        assert!(CubicSpline::new(vec![0.0, 0.0], vec![1.0, 2.0]).is_err());
        assert!(CubicSpline::new(vec![0.0, 1.0], vec![1.0]).is_err());
        assert!(CubicSpline::new(vec![0.0, 1.0], vec![1.0, f64::NAN]).is_err());
    }

    #[test]
    fn rolling_average_basic() {
        let out = rolling_average(&[1.0, 2.0, 3.0, 4.0], 2).unwrap();
        assert_eq!(out, vec![1.5, 2.5, 3.5]);
        assert!(rolling_average(&[1.0], 2).is_err());
    }
}
