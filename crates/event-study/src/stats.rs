//! Scalar statistics over extracted return slices.
//!
//! The frame layer (polars) handles alignment, joins, and rolling windows;
//! once a window is pinned down the regression and test statistics are
//! computed here on plain slices.

use statrs::distribution::{ContinuousCDF, StudentsT};

/// Arithmetic mean; 0.0 for an empty slice.
pub(crate) fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Variance with the given delta degrees of freedom; 0.0 when undefined.
pub(crate) fn variance(values: &[f64], ddof: usize) -> f64 {
    if values.len() <= ddof {
        return 0.0;
    }
    let m = mean(values);
    let ss: f64 = values.iter().map(|v| (v - m) * (v - m)).sum();
    ss / (values.len() - ddof) as f64
}

/// Standard deviation with the given delta degrees of freedom.
pub(crate) fn std_dev(values: &[f64], ddof: usize) -> f64 {
    variance(values, ddof).sqrt()
}

/// Population z-scores (ddof = 0). All zeros when the slice has no spread.
pub(crate) fn z_scores(values: &[f64]) -> Vec<f64> {
    let m = mean(values);
    let sd = std_dev(values, 0);
    if sd <= 0.0 {
        return vec![0.0; values.len()];
    }
    values.iter().map(|v| (v - m) / sd).collect()
}

/// Pearson correlation; `None` below 2 points or with zero variance.
pub(crate) fn pearson(x: &[f64], y: &[f64]) -> Option<f64> {
    if x.len() != y.len() || x.len() < 2 {
        return None;
    }

    let mx = mean(x);
    let my = mean(y);

    let mut cov = 0.0;
    let mut var_x = 0.0;
    let mut var_y = 0.0;
    for (xi, yi) in x.iter().zip(y.iter()) {
        let dx = xi - mx;
        let dy = yi - my;
        cov += dx * dy;
        var_x += dx * dx;
        var_y += dy * dy;
    }

    if var_x == 0.0 || var_y == 0.0 {
        return None;
    }

    Some(cov / (var_x.sqrt() * var_y.sqrt()))
}

/// Two-tailed p-value of `t` under a Student-t with `dof` degrees of freedom.
pub(crate) fn two_tailed_p(t: f64, dof: f64) -> f64 {
    if !t.is_finite() {
        return 0.0;
    }
    match StudentsT::new(0.0, 1.0, dof) {
        Ok(dist) => (2.0 * (1.0 - dist.cdf(t.abs()))).clamp(0.0, 1.0),
        Err(_) => 1.0,
    }
}

/// Ordinary least squares fit of `y = alpha + beta * x`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct OlsFit {
    pub(crate) alpha: f64,
    pub(crate) beta: f64,
    pub(crate) r_squared: f64,
    pub(crate) p_value: f64,
    pub(crate) std_error: f64,
    pub(crate) observations: usize,
}

/// Fit `y = alpha + beta * x` by OLS.
///
/// Returns `None` when fewer than 3 paired observations are supplied or the
/// regressor has no variance. The p-value tests the slope against zero with
/// `n - 2` degrees of freedom; `std_error` is the regression standard error.
pub(crate) fn ols(x: &[f64], y: &[f64]) -> Option<OlsFit> {
    let n = x.len();
    if n != y.len() || n < 3 {
        return None;
    }

    let mx = mean(x);
    let my = mean(y);

    let mut sxx = 0.0;
    let mut sxy = 0.0;
    let mut syy = 0.0;
    for (xi, yi) in x.iter().zip(y.iter()) {
        let dx = xi - mx;
        let dy = yi - my;
        sxx += dx * dx;
        sxy += dx * dy;
        syy += dy * dy;
    }

    if sxx == 0.0 {
        return None;
    }

    let beta = sxy / sxx;
    let alpha = my - beta * mx;

    let ss_res = (syy - beta * sxy).max(0.0);
    let r_squared = if syy > 0.0 { 1.0 - ss_res / syy } else { 0.0 };

    let dof = (n - 2) as f64;
    let std_error = (ss_res / dof).sqrt();
    let se_beta = std_error / sxx.sqrt();
    let p_value = if se_beta > 0.0 {
        two_tailed_p(beta / se_beta, dof)
    } else {
        // Perfect fit: the slope is exact
        0.0
    };

    Some(OlsFit {
        alpha,
        beta,
        r_squared,
        p_value,
        std_error,
        observations: n,
    })
}
