//! Market-model (CAPM) parameter estimation.
//!
//! Fits `asset_excess = alpha + beta * market_excess` by OLS over a bounded
//! estimation window. The join of asset and market returns is trimmed to the
//! most recent 60 observations when at least that many are available, and
//! rows whose excess returns are extreme in either series (|z| >= 3) are
//! rejected before the fit, so that weekend-gap artifacts and data glitches
//! do not distort beta.

use crate::returns::{ReturnSeries, TRADING_DAYS_PER_YEAR, float_column};
use crate::stats;
use crate::{EventStudyError, Result};
use polars::prelude::*;

/// Configuration for [`MarketModelEstimator`].
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct MarketModelConfig {
    /// Maximum number of most-recent joined observations used for the fit.
    pub tail_window: usize,
    /// Minimum joined observations below which estimation fails.
    pub min_observations: usize,
    /// Absolute z-score at or above which a joined row is rejected.
    pub zscore_threshold: f64,
    /// Annual risk-free rate, converted to a daily rate over 252 days.
    pub annual_risk_free: f64,
}

impl Default for MarketModelConfig {
    fn default() -> Self {
        Self {
            tail_window: 60,
            min_observations: 20,
            zscore_threshold: 3.0,
            annual_risk_free: 0.050,
        }
    }
}

/// Fitted single-factor market-model parameters for one asset.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct MarketModelParameters {
    /// Regression intercept, in daily excess-return units.
    pub alpha: f64,
    /// Regression slope: sensitivity to market excess returns.
    pub beta: f64,
    /// Coefficient of determination of the fit.
    pub r_squared: f64,
    /// Two-tailed p-value of the slope against zero.
    pub p_value: f64,
    /// Regression standard error.
    pub std_error: f64,
    /// Observations entering the final fit, after outlier handling.
    pub observations: usize,
    /// Daily risk-free rate subtracted from both series.
    pub risk_free_daily: f64,
    /// Joined observations retained by the tail-window policy; below 60
    /// this flags a short estimation window.
    pub window_used: usize,
}

/// Estimates market-model parameters from aligned return series.
#[derive(Debug, Clone, Default)]
pub struct MarketModelEstimator {
    config: MarketModelConfig,
}

impl MarketModelEstimator {
    /// Create an estimator with the standard configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an estimator with a custom configuration.
    pub const fn with_config(config: MarketModelConfig) -> Self {
        Self { config }
    }

    /// Returns the current configuration.
    pub const fn config(&self) -> &MarketModelConfig {
        &self.config
    }

    /// Fit the market model for `asset` against `market`.
    ///
    /// Both series should already be restricted to the candidate estimation
    /// window by the caller. Fails with
    /// [`EventStudyError::InsufficientData`] when fewer than 20 joined
    /// observations are available or an excess-return series has no
    /// variance.
    pub fn estimate(
        &self,
        asset: &ReturnSeries,
        market: &ReturnSeries,
    ) -> Result<MarketModelParameters> {
        let joined = asset
            .frame()
            .clone()
            .lazy()
            .select([col("date"), col("ret").alias("asset_ret")])
            .join(
                market
                    .frame()
                    .clone()
                    .lazy()
                    .select([col("date"), col("ret").alias("market_ret")]),
                [col("date")],
                [col("date")],
                JoinArgs::new(JoinType::Inner),
            )
            .filter(
                col("asset_ret")
                    .is_not_null()
                    .and(col("market_ret").is_not_null()),
            )
            .sort(["date"], SortMultipleOptions::default())
            .collect()?;

        let available = joined.height();
        if available < self.config.min_observations {
            return Err(EventStudyError::InsufficientData {
                required: self.config.min_observations,
                available,
            });
        }

        // Standard short-window convention: prefer the most recent 60
        // joined observations when the history allows it.
        let window_used = available.min(self.config.tail_window);
        let joined = joined.tail(Some(window_used));

        let risk_free_daily = self.config.annual_risk_free / TRADING_DAYS_PER_YEAR;
        let asset_excess: Vec<f64> = float_column(&joined, "asset_ret")?
            .into_iter()
            .flatten()
            .map(|ret| ret - risk_free_daily)
            .collect();
        let market_excess: Vec<f64> = float_column(&joined, "market_ret")?
            .into_iter()
            .flatten()
            .map(|ret| ret - risk_free_daily)
            .collect();

        let (asset_excess, market_excess) = self.reject_outliers(asset_excess, market_excess);

        let retained = asset_excess.len();
        if retained < self.config.min_observations
            || stats::variance(&asset_excess, 0) == 0.0
            || stats::variance(&market_excess, 0) == 0.0
        {
            return Err(EventStudyError::InsufficientData {
                required: self.config.min_observations,
                available: retained,
            });
        }

        let fit = stats::ols(&market_excess, &asset_excess).ok_or(
            EventStudyError::InsufficientData {
                required: self.config.min_observations,
                available: retained,
            },
        )?;

        Ok(MarketModelParameters {
            alpha: fit.alpha,
            beta: fit.beta,
            r_squared: fit.r_squared,
            p_value: fit.p_value,
            std_error: fit.std_error,
            observations: fit.observations,
            risk_free_daily,
            window_used,
        })
    }

    /// Drop rows extreme in either excess-return series.
    ///
    /// Rejection is skipped entirely when it would leave fewer than the
    /// minimum observations; a noisy short window is preferable to an
    /// undersized one.
    fn reject_outliers(&self, asset: Vec<f64>, market: Vec<f64>) -> (Vec<f64>, Vec<f64>) {
        let z_asset = stats::z_scores(&asset);
        let z_market = stats::z_scores(&market);
        let threshold = self.config.zscore_threshold;

        let keep: Vec<usize> = (0..asset.len())
            .filter(|&i| z_asset[i].abs() < threshold && z_market[i].abs() < threshold)
            .collect();

        if keep.len() < self.config.min_observations {
            return (asset, market);
        }

        (
            keep.iter().map(|&i| asset[i]).collect(),
            keep.iter().map(|&i| market[i]).collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::PriceBar;
    use crate::returns::ReturnSeriesBuilder;
    use chrono::{Days, NaiveDate};

    const DAILY_RF: f64 = 0.050 / 252.0;

    fn market_return(i: usize) -> f64 {
        // Deterministic, varied, bounded pattern
        0.002 * ((i % 7) as f64 - 3.0) + 0.0005 * ((i % 3) as f64)
    }

    fn bars_from_returns(returns: &[f64]) -> Vec<PriceBar> {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let mut close = 100.0;
        let mut bars = vec![PriceBar {
            date: start,
            open: close,
            high: close,
            low: close,
            close,
            volume: 1_000,
        }];
        for (i, ret) in returns.iter().enumerate() {
            close *= 1.0 + ret;
            bars.push(PriceBar {
                date: start.checked_add_days(Days::new(i as u64 + 1)).unwrap(),
                open: close,
                high: close,
                low: close,
                close,
                volume: 1_000,
            });
        }
        bars
    }

    /// Asset whose excess return is exactly `beta` times the market's.
    fn linked_series(
        n: usize,
        beta: f64,
        corrupt: Option<(usize, f64)>,
    ) -> (ReturnSeries, ReturnSeries) {
        let market_rets: Vec<f64> = (0..n).map(market_return).collect();
        let mut asset_rets: Vec<f64> = market_rets
            .iter()
            .map(|m| DAILY_RF + beta * (m - DAILY_RF))
            .collect();
        if let Some((index, value)) = corrupt {
            asset_rets[index] = value;
        }

        let builder = ReturnSeriesBuilder::new();
        let asset = builder
            .build("ASSET", &bars_from_returns(&asset_rets))
            .unwrap();
        let market = builder
            .build("MKT", &bars_from_returns(&market_rets))
            .unwrap();
        (asset, market)
    }

    #[test]
    fn test_noiseless_linear_relationship() {
        let (asset, market) = linked_series(80, 2.0, None);
        let params = MarketModelEstimator::new().estimate(&asset, &market).unwrap();

        assert!((params.beta - 2.0).abs() < 1e-6, "beta = {}", params.beta);
        assert!(params.alpha.abs() < 1e-6, "alpha = {}", params.alpha);
        assert!(params.r_squared > 0.999_999, "r2 = {}", params.r_squared);
        assert!(params.p_value < 1e-6);
        assert_eq!(params.window_used, 60);
        assert_eq!(params.observations, 60);
        assert!((params.risk_free_daily - DAILY_RF).abs() < 1e-15);
    }

    #[test]
    fn test_tail_window_ignores_older_rows() {
        let (asset, market) = linked_series(90, 1.5, None);
        let baseline = MarketModelEstimator::new().estimate(&asset, &market).unwrap();

        // Corrupt returns older than the 60-observation tail; the fit must
        // not move.
        let market_rets: Vec<f64> = (0..90).map(market_return).collect();
        let mut asset_rets: Vec<f64> = market_rets
            .iter()
            .map(|m| DAILY_RF + 1.5 * (m - DAILY_RF))
            .collect();
        for ret in asset_rets.iter_mut().take(20) {
            *ret = 0.09;
        }
        let builder = ReturnSeriesBuilder::new();
        let corrupted = builder
            .build("ASSET", &bars_from_returns(&asset_rets))
            .unwrap();
        let perturbed = MarketModelEstimator::new()
            .estimate(&corrupted, &market)
            .unwrap();

        assert_eq!(perturbed.window_used, 60);
        assert!(
            (perturbed.beta - baseline.beta).abs() < 1e-12,
            "beta moved: {} vs {}",
            perturbed.beta,
            baseline.beta
        );
    }

    #[test]
    fn test_outlier_rejected_and_beta_recovered() {
        // One wild asset return inside the 60-observation tail
        let (asset, market) = linked_series(80, 2.0, Some((70, 0.5)));
        let params = MarketModelEstimator::new().estimate(&asset, &market).unwrap();

        assert_eq!(params.observations, 59);
        assert!((params.beta - 2.0).abs() < 1e-6, "beta = {}", params.beta);
    }

    #[test]
    fn test_rejection_skipped_when_it_would_undersize() {
        // 21 bars give exactly 20 joined observations; rejecting the
        // outlier would leave 19, so it must be retained.
        let (asset, market) = linked_series(20, 2.0, Some((10, 0.5)));
        let params = MarketModelEstimator::new().estimate(&asset, &market).unwrap();

        assert_eq!(params.observations, 20);
        assert_eq!(params.window_used, 20);
        assert!((params.beta - 2.0).abs() > 0.01, "beta = {}", params.beta);
    }

    #[test]
    fn test_insufficient_observations() {
        let (asset, market) = linked_series(10, 1.0, None);
        let err = MarketModelEstimator::new()
            .estimate(&asset, &market)
            .unwrap_err();
        assert!(matches!(err, EventStudyError::InsufficientData { .. }));
    }

    #[test]
    fn test_zero_market_variance() {
        let market_rets = vec![0.001; 40];
        let asset_rets: Vec<f64> = (0..40).map(market_return).collect();
        let builder = ReturnSeriesBuilder::new();
        let asset = builder
            .build("ASSET", &bars_from_returns(&asset_rets))
            .unwrap();
        let market = builder
            .build("MKT", &bars_from_returns(&market_rets))
            .unwrap();

        let err = MarketModelEstimator::new()
            .estimate(&asset, &market)
            .unwrap_err();
        assert!(matches!(err, EventStudyError::InsufficientData { .. }));
    }

    #[test]
    fn test_mismatched_dates_are_dropped() {
        // Market series missing the middle stretch still joins on the rest
        let market_rets: Vec<f64> = (0..80).map(market_return).collect();
        let asset_rets: Vec<f64> = market_rets
            .iter()
            .map(|m| DAILY_RF + 1.2 * (m - DAILY_RF))
            .collect();

        let builder = ReturnSeriesBuilder::new();
        let asset = builder
            .build("ASSET", &bars_from_returns(&asset_rets))
            .unwrap();

        let mut market_bars = bars_from_returns(&market_rets);
        market_bars.drain(30..40);
        let market = builder.build("MKT", &market_bars).unwrap();

        let params = MarketModelEstimator::new().estimate(&asset, &market).unwrap();
        assert!((params.beta - 1.2).abs() < 0.05, "beta = {}", params.beta);
    }
}
