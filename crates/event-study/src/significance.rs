//! One-sample significance testing for abnormal-return series.

use crate::stats;

/// Two-tailed significance threshold on the p-value.
pub const SIGNIFICANCE_LEVEL: f64 = 0.05;

/// Outcome of a one-sample t-test against a zero mean.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SignificanceTest {
    /// `mean / (std / sqrt(n))` with sample standard deviation.
    pub t_statistic: f64,
    /// Two-tailed p-value from the Student-t CDF with `n - 1` degrees of
    /// freedom.
    pub p_value: f64,
    /// Whether `p_value < 0.05`.
    pub significant: bool,
}

impl SignificanceTest {
    const fn degenerate() -> Self {
        Self {
            t_statistic: 0.0,
            p_value: 1.0,
            significant: false,
        }
    }
}

/// One-sample t-test of the mean of `values` against zero.
///
/// Degenerate inputs never error: with one or fewer observations, or zero
/// sample variance, the result is `t = 0`, `p = 1`, not significant.
pub fn t_test(values: &[f64]) -> SignificanceTest {
    let n = values.len();
    if n <= 1 {
        return SignificanceTest::degenerate();
    }

    let std = stats::std_dev(values, 1);
    if std <= 0.0 {
        return SignificanceTest::degenerate();
    }

    let t_statistic = stats::mean(values) / (std / (n as f64).sqrt());
    let p_value = stats::two_tailed_p(t_statistic, (n - 1) as f64);

    SignificanceTest {
        t_statistic,
        p_value,
        significant: p_value < SIGNIFICANCE_LEVEL,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rstest::rstest;

    #[rstest]
    #[case::empty(&[])]
    #[case::single(&[0.02])]
    #[case::zero_variance(&[0.01, 0.01, 0.01])]
    fn test_degenerate_inputs(#[case] values: &[f64]) {
        let test = t_test(values);
        assert_eq!(test.t_statistic, 0.0);
        assert_eq!(test.p_value, 1.0);
        assert!(!test.significant);
    }

    #[test]
    fn test_known_t_statistic() {
        // mean 0.02, sample std 0.01, n 3 -> t = 0.02 / (0.01 / sqrt(3))
        let test = t_test(&[0.01, 0.02, 0.03]);
        assert_relative_eq!(test.t_statistic, 3.4641016151377544, epsilon = 1e-12);
        // p ~ 0.074 at 2 degrees of freedom
        assert!(test.p_value > 0.07 && test.p_value < 0.08, "p = {}", test.p_value);
        assert!(!test.significant);
    }

    #[test]
    fn test_strong_effect_is_significant() {
        let values: Vec<f64> = (0..30)
            .map(|i| 0.01 + if i % 2 == 0 { 0.001 } else { -0.001 })
            .collect();
        let test = t_test(&values);
        assert!(test.t_statistic > 10.0);
        assert!(test.p_value < SIGNIFICANCE_LEVEL);
        assert!(test.significant);
    }

    #[test]
    fn test_zero_mean_is_not_significant() {
        let test = t_test(&[-0.02, 0.02, -0.02, 0.02]);
        assert_eq!(test.t_statistic, 0.0);
        assert_relative_eq!(test.p_value, 1.0, epsilon = 1e-12);
        assert!(!test.significant);
    }
}
