//! Abnormal-return computation over the event window.
//!
//! With fitted market-model parameters in hand, the calculator projects the
//! expected return for every joined trading day in the calendar-day event
//! window, measures the abnormal return against it, accumulates the running
//! CAR, and summarizes the window with event-day, volume-shock, and
//! volatility diagnostics plus a significance test.

use crate::market_model::MarketModelParameters;
use crate::returns::{
    ReturnSeries, TRADING_DAYS_PER_YEAR, date_strings, float_column, parse_iso_date,
};
use crate::significance;
use crate::stats;
use crate::{EventStudyError, Result};
use chrono::{Days, NaiveDate};
use polars::prelude::*;

/// Configuration for [`AbnormalReturnCalculator`].
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct EventWindowConfig {
    /// Annual risk-free rate applied inside the event window, converted to
    /// a daily rate over 252 days. Intentionally distinct from the
    /// estimation-window rate.
    pub annual_risk_free: f64,
    /// Trailing window, in observations, for the event-window volatility
    /// column.
    pub volatility_window: usize,
    /// Calendar days before the window start over which the baseline
    /// volume is averaged.
    pub volume_baseline_days: u64,
}

impl Default for EventWindowConfig {
    fn default() -> Self {
        Self {
            annual_risk_free: 0.045,
            volatility_window: 2,
            volume_baseline_days: 10,
        }
    }
}

/// One trading day inside the event window.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct EventWindowRecord {
    /// Trading date.
    pub date: NaiveDate,
    /// Asset simple return.
    pub asset_return: f64,
    /// Benchmark simple return.
    pub market_return: f64,
    /// Model-implied return: `rf + beta * (market - rf)`.
    pub expected_return: f64,
    /// `asset_return - expected_return`.
    pub abnormal_return: f64,
    /// Running sum of abnormal returns from the window start.
    pub cumulative_abnormal: f64,
    /// Trailing 2-observation volatility of asset returns, annualized, in
    /// percent; back-filled over the first record.
    pub volatility: f64,
}

/// Returns observed on the event date itself.
///
/// All zero when the event date is not a trading day - a normal, non-fatal
/// condition.
#[derive(Debug, Clone, Copy, PartialEq, Default, serde::Serialize, serde::Deserialize)]
pub struct EventDayImpact {
    /// Abnormal return on the event date.
    pub abnormal_return: f64,
    /// Actual asset return on the event date.
    pub actual_return: f64,
    /// Model-implied return on the event date.
    pub expected_return: f64,
    /// Benchmark return on the event date.
    pub market_return: f64,
}

/// Event-date volume against its recent baseline.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct VolumeShock {
    /// Shares traded on the event date.
    pub event_volume: f64,
    /// Mean volume over the days preceding the window start.
    pub baseline_volume: f64,
    /// `event_volume / baseline_volume`.
    pub spike_ratio: f64,
    /// Percent change of event volume against the baseline.
    pub percent_change: f64,
}

/// Event-window volatility split around the event date.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct VolatilityClustering {
    /// Mean annualized volatility (percent) strictly before the event date.
    pub pre_event: f64,
    /// Mean annualized volatility (percent) strictly after the event date.
    pub post_event: f64,
    /// `post_event / pre_event`.
    pub ratio: f64,
}

/// Summary statistics over the abnormal-return series.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct AbnormalReturnStatistics {
    /// Mean abnormal return.
    pub mean_abnormal: f64,
    /// Sample standard deviation of abnormal returns.
    pub std_abnormal: f64,
    /// Total cumulative abnormal return over the window.
    pub cumulative_abnormal: f64,
    /// One-sample t-statistic of the abnormal-return mean.
    pub t_statistic: f64,
    /// Two-tailed p-value of the t-statistic.
    pub p_value: f64,
    /// Trading days in the window.
    pub observations: usize,
    /// Returns observed on the event date.
    pub event_day: EventDayImpact,
    /// Days with a positive abnormal return.
    pub positive_days: usize,
    /// Days with a negative abnormal return.
    pub negative_days: usize,
    /// Event-date volume diagnostics, when volume data allows them.
    pub volume_shock: Option<VolumeShock>,
    /// Whether `p_value < 0.05`.
    pub significant: bool,
}

/// Full per-asset output of the event-window computation.
#[derive(Debug, Clone, PartialEq)]
pub struct EventWindowAnalysis {
    /// Per-day records in date order.
    pub records: Vec<EventWindowRecord>,
    /// Summary statistics over the window.
    pub statistics: AbnormalReturnStatistics,
    /// Pre/post event volatility split, when both sides are observed.
    pub clustering: Option<VolatilityClustering>,
}

/// Computes abnormal returns over an event window.
#[derive(Debug, Clone, Default)]
pub struct AbnormalReturnCalculator {
    config: EventWindowConfig,
}

impl AbnormalReturnCalculator {
    /// Create a calculator with the standard configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a calculator with a custom configuration.
    pub const fn with_config(config: EventWindowConfig) -> Self {
        Self { config }
    }

    /// Returns the current configuration.
    pub const fn config(&self) -> &EventWindowConfig {
        &self.config
    }

    /// Compute the event-window analysis for one asset.
    ///
    /// `asset` and `market` are the full-history series; the window is
    /// `[event_date - window_days, event_date + window_days]` in calendar
    /// days, inclusive. Fails with
    /// [`EventStudyError::ComputationDegenerate`] when the joined window
    /// holds no observations.
    pub fn compute(
        &self,
        asset: &ReturnSeries,
        market: &ReturnSeries,
        model: &MarketModelParameters,
        event_date: NaiveDate,
        window_days: u64,
    ) -> Result<EventWindowAnalysis> {
        let window_start = checked_sub(event_date, window_days)?;
        let window_end = checked_add(event_date, window_days)?;

        let joined = asset
            .restrict(window_start, window_end)?
            .frame()
            .clone()
            .lazy()
            .select([col("date"), col("ret").alias("asset_ret")])
            .join(
                market
                    .restrict(window_start, window_end)?
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

        if joined.height() == 0 {
            return Err(EventStudyError::ComputationDegenerate {
                detail: format!(
                    "event window [{window_start}, {window_end}] has no joined observations"
                ),
            });
        }

        let dates = date_strings(&joined)?
            .iter()
            .map(|value| parse_iso_date(value))
            .collect::<Result<Vec<NaiveDate>>>()?;
        let asset_returns: Vec<f64> = float_column(&joined, "asset_ret")?
            .into_iter()
            .flatten()
            .collect();
        let market_returns: Vec<f64> = float_column(&joined, "market_ret")?
            .into_iter()
            .flatten()
            .collect();

        let volatilities = self.window_volatility(&asset_returns);

        let risk_free = self.config.annual_risk_free / TRADING_DAYS_PER_YEAR;
        let mut records = Vec::with_capacity(dates.len());
        let mut cumulative = 0.0;
        for i in 0..dates.len() {
            let expected = risk_free + model.beta * (market_returns[i] - risk_free);
            let abnormal = asset_returns[i] - expected;
            cumulative += abnormal;
            records.push(EventWindowRecord {
                date: dates[i],
                asset_return: asset_returns[i],
                market_return: market_returns[i],
                expected_return: expected,
                abnormal_return: abnormal,
                cumulative_abnormal: cumulative,
                volatility: volatilities[i],
            });
        }

        let event_day = records
            .iter()
            .find(|record| record.date == event_date)
            .map(|record| EventDayImpact {
                abnormal_return: record.abnormal_return,
                actual_return: record.asset_return,
                expected_return: record.expected_return,
                market_return: record.market_return,
            })
            .unwrap_or_default();

        let volume_shock = self.volume_shock(asset, event_date, window_start)?;
        let clustering = clustering(&records, event_date);

        let abnormal: Vec<f64> = records.iter().map(|r| r.abnormal_return).collect();
        let test = significance::t_test(&abnormal);
        let statistics = AbnormalReturnStatistics {
            mean_abnormal: stats::mean(&abnormal),
            std_abnormal: stats::std_dev(&abnormal, 1),
            cumulative_abnormal: cumulative,
            t_statistic: test.t_statistic,
            p_value: test.p_value,
            observations: records.len(),
            event_day,
            positive_days: abnormal.iter().filter(|ar| **ar > 0.0).count(),
            negative_days: abnormal.iter().filter(|ar| **ar < 0.0).count(),
            volume_shock,
            significant: test.significant,
        };

        Ok(EventWindowAnalysis {
            records,
            statistics,
            clustering,
        })
    }

    /// Trailing volatility of the window's asset returns, annualized, in
    /// percent, back-filled over the leading gap.
    fn window_volatility(&self, returns: &[f64]) -> Vec<f64> {
        let window = self.config.volatility_window.max(2);
        let mut values: Vec<Option<f64>> = (0..returns.len())
            .map(|i| {
                if i + 1 >= window {
                    let slice = &returns[i + 1 - window..=i];
                    Some(stats::std_dev(slice, 1) * TRADING_DAYS_PER_YEAR.sqrt() * 100.0)
                } else {
                    None
                }
            })
            .collect();

        let first = values.iter().flatten().next().copied();
        for value in values.iter_mut() {
            if value.is_some() {
                break;
            }
            *value = first;
        }

        values
            .into_iter()
            .map(|value| value.unwrap_or(0.0))
            .collect()
    }

    /// Event-date volume against the mean volume over the days preceding
    /// the window start. Absent when either side is unobserved.
    fn volume_shock(
        &self,
        asset: &ReturnSeries,
        event_date: NaiveDate,
        window_start: NaiveDate,
    ) -> Result<Option<VolumeShock>> {
        let event_row = asset.restrict(event_date, event_date)?;
        let Some(event_volume) = float_column(event_row.frame(), "volume")?
            .into_iter()
            .flatten()
            .next()
        else {
            return Ok(None);
        };

        let baseline_start = checked_sub(window_start, self.config.volume_baseline_days)?;
        let baseline_end = checked_sub(window_start, 1)?;
        let baseline_rows = asset.restrict(baseline_start, baseline_end)?;
        let baseline: Vec<f64> = float_column(baseline_rows.frame(), "volume")?
            .into_iter()
            .flatten()
            .collect();

        if baseline.is_empty() {
            return Ok(None);
        }
        let baseline_volume = stats::mean(&baseline);
        if baseline_volume <= 0.0 {
            return Ok(None);
        }

        Ok(Some(VolumeShock {
            event_volume,
            baseline_volume,
            spike_ratio: event_volume / baseline_volume,
            percent_change: (event_volume - baseline_volume) / baseline_volume * 100.0,
        }))
    }
}

/// Mean window volatility strictly before vs. strictly after the event.
fn clustering(records: &[EventWindowRecord], event_date: NaiveDate) -> Option<VolatilityClustering> {
    let pre: Vec<f64> = records
        .iter()
        .filter(|r| r.date < event_date)
        .map(|r| r.volatility)
        .collect();
    let post: Vec<f64> = records
        .iter()
        .filter(|r| r.date > event_date)
        .map(|r| r.volatility)
        .collect();

    if pre.is_empty() || post.is_empty() {
        return None;
    }

    let pre_event = stats::mean(&pre);
    if pre_event <= 0.0 {
        return None;
    }
    let post_event = stats::mean(&post);

    Some(VolatilityClustering {
        pre_event,
        post_event,
        ratio: post_event / pre_event,
    })
}

fn checked_sub(date: NaiveDate, days: u64) -> Result<NaiveDate> {
    date.checked_sub_days(Days::new(days))
        .ok_or_else(|| EventStudyError::ComputationDegenerate {
            detail: format!("date arithmetic underflow at {date} - {days}d"),
        })
}

fn checked_add(date: NaiveDate, days: u64) -> Result<NaiveDate> {
    date.checked_add_days(Days::new(days))
        .ok_or_else(|| EventStudyError::ComputationDegenerate {
            detail: format!("date arithmetic overflow at {date} + {days}d"),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::PriceBar;
    use crate::returns::ReturnSeriesBuilder;

    const DAILY_RF: f64 = 0.045 / 252.0;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn market_return(i: usize) -> f64 {
        0.0015 * ((i % 5) as f64 - 2.0) + 0.0004 * ((i % 3) as f64)
    }

    fn bars(start: NaiveDate, returns: &[f64], volumes: &[u64]) -> Vec<PriceBar> {
        assert_eq!(returns.len() + 1, volumes.len());
        let mut close = 100.0;
        let mut out = vec![PriceBar {
            date: start,
            open: close,
            high: close,
            low: close,
            close,
            volume: volumes[0],
        }];
        for (i, ret) in returns.iter().enumerate() {
            close *= 1.0 + ret;
            out.push(PriceBar {
                date: start.checked_add_days(Days::new(i as u64 + 1)).unwrap(),
                open: close,
                high: close,
                low: close,
                close,
                volume: volumes[i + 1],
            });
        }
        out
    }

    fn model(beta: f64) -> MarketModelParameters {
        MarketModelParameters {
            alpha: 0.0,
            beta,
            r_squared: 1.0,
            p_value: 0.0,
            std_error: 0.0,
            observations: 60,
            risk_free_daily: 0.050 / 252.0,
            window_used: 60,
        }
    }

    /// Forty calendar days of joint history around an event on day 30.
    fn fixture(event_volume: u64) -> (ReturnSeries, ReturnSeries, NaiveDate) {
        let start = date(2024, 5, 1);
        let event_date = date(2024, 5, 31);
        let n = 40;

        let market_rets: Vec<f64> = (0..n).map(market_return).collect();
        let asset_rets: Vec<f64> = market_rets.iter().map(|m| 0.001 + 1.4 * m).collect();

        let mut volumes = vec![1_000_u64; n + 1];
        volumes[30] = event_volume;

        let builder = ReturnSeriesBuilder::new();
        let asset = builder
            .build("ASSET", &bars(start, &asset_rets, &volumes))
            .unwrap();
        let market = builder
            .build("MKT", &bars(start, &market_rets, &vec![1_000; n + 1]))
            .unwrap();
        (asset, market, event_date)
    }

    #[test]
    fn test_window_bounds_are_inclusive() {
        let (asset, market, event_date) = fixture(1_000);
        let analysis = AbnormalReturnCalculator::new()
            .compute(&asset, &market, &model(1.4), event_date, 7)
            .unwrap();

        let lo = date(2024, 5, 24);
        let hi = date(2024, 6, 7);
        assert!(!analysis.records.is_empty());
        for record in &analysis.records {
            assert!(record.date >= lo && record.date <= hi, "{}", record.date);
        }
        // Calendar-daily data: the full 15-day span joins
        assert_eq!(analysis.records.len(), 15);
        assert_eq!(analysis.statistics.observations, 15);
    }

    #[test]
    fn test_expected_and_abnormal_returns() {
        let (asset, market, event_date) = fixture(1_000);
        let analysis = AbnormalReturnCalculator::new()
            .compute(&asset, &market, &model(1.4), event_date, 7)
            .unwrap();

        for record in &analysis.records {
            let expected = DAILY_RF + 1.4 * (record.market_return - DAILY_RF);
            assert!((record.expected_return - expected).abs() < 1e-12);
            assert!(
                (record.abnormal_return - (record.asset_return - expected)).abs() < 1e-12
            );
        }
    }

    #[test]
    fn test_car_is_running_sum_for_every_prefix() {
        let (asset, market, event_date) = fixture(1_000);
        let analysis = AbnormalReturnCalculator::new()
            .compute(&asset, &market, &model(1.4), event_date, 7)
            .unwrap();

        let mut sum = 0.0;
        for record in &analysis.records {
            sum += record.abnormal_return;
            assert!((record.cumulative_abnormal - sum).abs() < 1e-12);
        }
        assert!(
            (analysis.statistics.cumulative_abnormal - sum).abs() < 1e-12,
            "total CAR must equal the last running value"
        );
    }

    #[test]
    fn test_event_day_impact_matches_row() {
        let (asset, market, event_date) = fixture(1_000);
        let analysis = AbnormalReturnCalculator::new()
            .compute(&asset, &market, &model(1.4), event_date, 7)
            .unwrap();

        let row = analysis
            .records
            .iter()
            .find(|r| r.date == event_date)
            .unwrap();
        let event_day = analysis.statistics.event_day;
        assert_eq!(event_day.abnormal_return, row.abnormal_return);
        assert_eq!(event_day.actual_return, row.asset_return);
        assert_eq!(event_day.expected_return, row.expected_return);
        assert_eq!(event_day.market_return, row.market_return);
    }

    #[test]
    fn test_missing_event_day_reports_zeros() {
        let (_, market, event_date) = fixture(1_000);

        // Same asset as the fixture, minus the event-date bar
        let start = date(2024, 5, 1);
        let market_rets: Vec<f64> = (0..40).map(market_return).collect();
        let asset_rets: Vec<f64> = market_rets.iter().map(|m| 0.001 + 1.4 * m).collect();
        let mut asset_bars = bars(start, &asset_rets, &vec![1_000_u64; 41]);
        asset_bars.retain(|bar| bar.date != event_date);
        let asset = ReturnSeriesBuilder::new().build("ASSET", &asset_bars).unwrap();

        let analysis = AbnormalReturnCalculator::new()
            .compute(&asset, &market, &model(1.4), event_date, 7)
            .unwrap();

        assert!(analysis.records.iter().all(|r| r.date != event_date));
        assert_eq!(analysis.statistics.event_day, EventDayImpact::default());
        // Volume diagnostics also need the event-date row
        assert!(analysis.statistics.volume_shock.is_none());
    }

    #[test]
    fn test_volume_shock_ratio() {
        let (asset, market, event_date) = fixture(5_000);
        let analysis = AbnormalReturnCalculator::new()
            .compute(&asset, &market, &model(1.4), event_date, 7)
            .unwrap();

        let shock = analysis.statistics.volume_shock.unwrap();
        assert!((shock.event_volume - 5_000.0).abs() < 1e-9);
        assert!((shock.baseline_volume - 1_000.0).abs() < 1e-9);
        assert!((shock.spike_ratio - 5.0).abs() < 1e-9);
        assert!((shock.percent_change - 400.0).abs() < 1e-9);
    }

    #[test]
    fn test_volatility_is_backfilled() {
        let (asset, market, event_date) = fixture(1_000);
        let analysis = AbnormalReturnCalculator::new()
            .compute(&asset, &market, &model(1.4), event_date, 7)
            .unwrap();

        let records = &analysis.records;
        assert_eq!(records[0].volatility, records[1].volatility);
        // 2-observation sample std is |r1 - r0| / sqrt(2)
        let expected = (records[1].asset_return - records[0].asset_return).abs()
            / 2.0_f64.sqrt()
            * TRADING_DAYS_PER_YEAR.sqrt()
            * 100.0;
        assert!((records[1].volatility - expected).abs() < 1e-9);
    }

    #[test]
    fn test_clustering_splits_around_event() {
        let (asset, market, event_date) = fixture(1_000);
        let analysis = AbnormalReturnCalculator::new()
            .compute(&asset, &market, &model(1.4), event_date, 7)
            .unwrap();

        let clustering = analysis.clustering.unwrap();
        assert!(clustering.pre_event > 0.0);
        assert!(clustering.post_event > 0.0);
        assert!(
            (clustering.ratio - clustering.post_event / clustering.pre_event).abs() < 1e-12
        );
    }

    #[test]
    fn test_empty_window_is_degenerate() {
        let (asset, market, _) = fixture(1_000);
        let err = AbnormalReturnCalculator::new()
            .compute(&asset, &market, &model(1.4), date(2030, 1, 15), 7)
            .unwrap_err();
        assert!(matches!(err, EventStudyError::ComputationDegenerate { .. }));
    }

    #[test]
    fn test_month_boundary_window() {
        let start = date(2023, 12, 1);
        let event_date = date(2024, 1, 1);
        let market_rets: Vec<f64> = (0..60).map(market_return).collect();
        let asset_rets: Vec<f64> = market_rets.iter().map(|m| 1.1 * m).collect();
        let volumes = vec![1_000_u64; 61];

        let builder = ReturnSeriesBuilder::new();
        let asset = builder.build("ASSET", &bars(start, &asset_rets, &volumes)).unwrap();
        let market = builder
            .build("MKT", &bars(start, &market_rets, &volumes))
            .unwrap();

        let analysis = AbnormalReturnCalculator::new()
            .compute(&asset, &market, &model(1.1), event_date, 7)
            .unwrap();

        let lo = date(2023, 12, 25);
        let hi = date(2024, 1, 8);
        for record in &analysis.records {
            assert!(record.date >= lo && record.date <= hi, "{}", record.date);
        }
        assert!(analysis.records.iter().any(|r| r.date == event_date));
    }
}
