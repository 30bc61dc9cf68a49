//! Daily return series and rolling statistics.
//!
//! A [`ReturnSeries`] is derived from a raw bar sequence: simple daily
//! returns plus 20-observation trailing averages of volume and price and a
//! 20-observation annualized rolling volatility. Values before a window
//! fills are absent (null), never zero, and non-finite intermediates are
//! normalized to null at the point of computation.

use crate::provider::PriceBar;
use crate::{EventStudyError, Result};
use chrono::NaiveDate;
use polars::df;
use polars::prelude::*;

/// Trading days per year used for annualization.
pub(crate) const TRADING_DAYS_PER_YEAR: f64 = 252.0;

/// Configuration for [`ReturnSeriesBuilder`].
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ReturnSeriesConfig {
    /// Trailing window length, in observations, for the rolling statistics.
    pub rolling_window: usize,
}

impl Default for ReturnSeriesConfig {
    fn default() -> Self {
        Self { rolling_window: 20 }
    }
}

/// Builds a [`ReturnSeries`] from raw daily bars.
#[derive(Debug, Clone, Default)]
pub struct ReturnSeriesBuilder {
    config: ReturnSeriesConfig,
}

impl ReturnSeriesBuilder {
    /// Create a builder with the default 20-observation rolling window.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a builder with a custom rolling window.
    pub const fn with_window(rolling_window: usize) -> Self {
        Self {
            config: ReturnSeriesConfig { rolling_window },
        }
    }

    /// Returns the current configuration.
    pub const fn config(&self) -> &ReturnSeriesConfig {
        &self.config
    }

    /// Derive the return series for `symbol` from its bar sequence.
    ///
    /// The output is aligned to the input dates: the first date's return is
    /// absent, and each rolling statistic is absent until its window fills.
    /// Fails with [`EventStudyError::DataUnavailable`] when fewer than two
    /// bars are supplied, since no return is computable.
    pub fn build(&self, symbol: &str, bars: &[PriceBar]) -> Result<ReturnSeries> {
        if bars.len() < 2 {
            return Err(EventStudyError::DataUnavailable {
                symbol: symbol.to_string(),
                detail: format!("{} bar(s) supplied, need at least 2", bars.len()),
            });
        }

        let mut bars = bars.to_vec();
        bars.sort_by_key(|bar| bar.date);

        let dates: Vec<String> = bars.iter().map(|bar| bar.date.to_string()).collect();
        let closes: Vec<f64> = bars.iter().map(|bar| bar.close).collect();
        let volumes: Vec<f64> = bars.iter().map(|bar| bar.volume as f64).collect();

        let df = df! {
            "date" => dates,
            "close" => closes,
            "volume" => volumes,
        }?;

        let window = self.config.rolling_window;
        let frame = df
            .lazy()
            .sort(["date"], SortMultipleOptions::default())
            .with_column(col("close").shift(lit(1)).alias("close_lag"))
            .with_column(((col("close") - col("close_lag")) / col("close_lag")).alias("ret"))
            // Zero or missing closes upstream surface here as inf/NaN
            .with_column(
                when(col("ret").is_finite())
                    .then(col("ret"))
                    .otherwise(lit(NULL))
                    .alias("ret"),
            )
            .with_column(
                col("volume")
                    .rolling_mean(RollingOptionsFixedWindow {
                        window_size: window,
                        min_periods: window,
                        ..Default::default()
                    })
                    .alias("volume_ma"),
            )
            .with_column(
                col("close")
                    .rolling_mean(RollingOptionsFixedWindow {
                        window_size: window,
                        min_periods: window,
                        ..Default::default()
                    })
                    .alias("price_ma"),
            )
            .with_column(
                (col("ret").rolling_std(RollingOptionsFixedWindow {
                    window_size: window,
                    min_periods: window,
                    ..Default::default()
                }) * lit(TRADING_DAYS_PER_YEAR.sqrt()))
                .alias("volatility"),
            )
            .drop(["close_lag"])
            .collect()?;

        Ok(ReturnSeries {
            symbol: symbol.to_string(),
            frame,
        })
    }
}

/// An ordered daily return series with rolling statistics.
///
/// Columns: `date` (ISO-8601 string), `close`, `volume`, `ret`,
/// `volume_ma`, `price_ma`, `volatility` (annualized fraction).
#[derive(Debug, Clone)]
pub struct ReturnSeries {
    symbol: String,
    frame: DataFrame,
}

impl ReturnSeries {
    /// Ticker symbol this series was built for.
    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// Underlying frame.
    pub fn frame(&self) -> &DataFrame {
        &self.frame
    }

    /// Number of observations (one per input bar).
    pub fn len(&self) -> usize {
        self.frame.height()
    }

    /// Whether the series holds no observations.
    pub fn is_empty(&self) -> bool {
        self.frame.height() == 0
    }

    /// The series restricted to dates in `[start, end]` inclusive.
    pub fn restrict(&self, start: NaiveDate, end: NaiveDate) -> Result<Self> {
        let frame = self
            .frame
            .clone()
            .lazy()
            .filter(
                col("date")
                    .gt_eq(lit(start.to_string()))
                    .and(col("date").lt_eq(lit(end.to_string()))),
            )
            .collect()?;

        Ok(Self {
            symbol: self.symbol.clone(),
            frame,
        })
    }

    /// Simple returns in date order, `None` where absent.
    pub fn simple_returns(&self) -> Result<Vec<Option<f64>>> {
        float_column(&self.frame, "ret")
    }
}

/// ISO date strings of a frame's `date` column.
pub(crate) fn date_strings(frame: &DataFrame) -> Result<Vec<String>> {
    let column = frame.column("date")?.str()?;
    Ok(column
        .into_iter()
        .map(|value| value.unwrap_or_default().to_string())
        .collect())
}

/// A float column as `Option<f64>` per row.
pub(crate) fn float_column(frame: &DataFrame, name: &str) -> Result<Vec<Option<f64>>> {
    Ok(frame.column(name)?.f64()?.into_iter().collect())
}

/// Parse an ISO date string written by this crate back into a date.
pub(crate) fn parse_iso_date(value: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d").map_err(|_| {
        EventStudyError::ComputationDegenerate {
            detail: format!("malformed date '{value}' in series"),
        }
    })
}
