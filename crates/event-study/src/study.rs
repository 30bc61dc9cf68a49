//! Event-study orchestration.
//!
//! [`EventStudy`] is the sole entry point callers use: given an event date,
//! a list of assets, and window lengths, it fetches the benchmark once,
//! runs the per-asset pipeline (returns -> market model -> abnormal
//! returns), and assembles the aggregate result set. A single asset's
//! failure never aborts the batch; only a benchmark failure is fatal.

use crate::event::{
    AbnormalReturnCalculator, AbnormalReturnStatistics, EventWindowRecord, VolatilityClustering,
};
use crate::market_model::{MarketModelEstimator, MarketModelParameters};
use crate::observe::{AnalysisEvent, AnalysisObserver, NoopObserver};
use crate::provider::PriceSeriesProvider;
use crate::returns::{ReturnSeries, ReturnSeriesBuilder, date_strings, float_column};
use crate::stats;
use crate::{EventStudyError, Result};
use chrono::{Days, NaiveDate, Utc};
use derive_more::Display;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// Default market benchmark: the S&P 500 index.
pub const DEFAULT_BENCHMARK: &str = "^GSPC";

/// Permitted estimation-window lengths, in calendar days.
pub const ESTIMATION_WINDOW_BOUNDS: (usize, usize) = (60, 500);

/// Permitted event half-window lengths, in calendar days.
pub const EVENT_WINDOW_BOUNDS: (usize, usize) = (1, 21);

/// Safety margin fetched ahead of the estimation window.
const FETCH_MARGIN_DAYS: u64 = 50;

/// Minimum date-aligned observations for the correlation matrix.
const MIN_CORRELATION_OBSERVATIONS: usize = 10;

/// One requested asset: a display label and the ticker to fetch.
#[derive(Debug, Display, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[display("{label} ({symbol})")]
pub struct AssetSpec {
    /// Label keying the result mapping.
    pub label: String,
    /// Ticker symbol passed to the price provider.
    pub symbol: String,
}

impl AssetSpec {
    /// Create a spec from a label and a ticker symbol.
    pub fn new(label: impl Into<String>, symbol: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            symbol: symbol.into(),
        }
    }
}

/// Parameters of one orchestration run.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct StudyRequest {
    /// The event date the windows center on.
    pub event_date: NaiveDate,
    /// Assets to analyze, in request order.
    pub assets: Vec<AssetSpec>,
    /// Nominal estimation-window length in calendar days.
    pub estimation_window: usize,
    /// Event half-window length in calendar days.
    pub event_window: usize,
}

impl StudyRequest {
    /// Create a request with the standard windows (252-day estimation,
    /// 11-day event half-window).
    pub fn new(event_date: NaiveDate, assets: Vec<AssetSpec>) -> Self {
        Self {
            event_date,
            assets,
            estimation_window: 252,
            event_window: 11,
        }
    }
}

/// Complete analysis output for one asset.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct AssetAnalysisResult {
    /// Label the result is keyed under.
    pub label: String,
    /// Ticker symbol analyzed.
    pub symbol: String,
    /// Fitted market-model parameters.
    pub model: MarketModelParameters,
    /// Per-day event-window records in date order.
    pub window: Vec<EventWindowRecord>,
    /// Summary statistics over the event window.
    pub statistics: AbnormalReturnStatistics,
    /// Pre/post event volatility split, when observed.
    pub clustering: Option<VolatilityClustering>,
}

/// Pairwise Pearson correlations over the assets' aligned return series.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct CorrelationMatrix {
    /// Asset labels, in request order.
    pub labels: Vec<String>,
    /// `values[i][j]` is the correlation between assets `i` and `j`.
    pub values: Vec<Vec<f64>>,
}

impl CorrelationMatrix {
    /// Correlation between two labeled assets, if both are present.
    pub fn get(&self, a: &str, b: &str) -> Option<f64> {
        let i = self.labels.iter().position(|l| l == a)?;
        let j = self.labels.iter().position(|l| l == b)?;
        Some(self.values[i][j])
    }
}

/// Aggregate output of one orchestration run.
#[derive(Debug, Clone)]
pub struct StudyOutcome {
    /// Per-asset results keyed by label; requested assets that failed at
    /// any stage are simply absent.
    pub results: BTreeMap<String, AssetAnalysisResult>,
    /// The shared benchmark return series.
    pub benchmark: ReturnSeries,
    /// Cross-asset correlation matrix, when at least two assets succeeded
    /// with enough aligned history.
    pub correlation: Option<CorrelationMatrix>,
}

/// Top-level event-study orchestrator.
///
/// Owns its collaborators explicitly - no global state, no hidden caches -
/// and is stateless across runs: every invocation of [`EventStudy::run`]
/// works on its own in-memory data and returns a fresh result.
#[derive(Debug)]
pub struct EventStudy {
    provider: Arc<dyn PriceSeriesProvider>,
    benchmark_symbol: String,
    builder: ReturnSeriesBuilder,
    estimator: MarketModelEstimator,
    calculator: AbnormalReturnCalculator,
    observer: Arc<dyn AnalysisObserver>,
}

impl EventStudy {
    /// Create an orchestrator over `provider` with default collaborators
    /// and the S&P 500 benchmark.
    pub fn new(provider: Arc<dyn PriceSeriesProvider>) -> Self {
        Self {
            provider,
            benchmark_symbol: DEFAULT_BENCHMARK.to_string(),
            builder: ReturnSeriesBuilder::new(),
            estimator: MarketModelEstimator::new(),
            calculator: AbnormalReturnCalculator::new(),
            observer: Arc::new(NoopObserver),
        }
    }

    /// Use a different benchmark symbol.
    pub fn with_benchmark(mut self, symbol: impl Into<String>) -> Self {
        self.benchmark_symbol = symbol.into();
        self
    }

    /// Use a custom market-model estimator.
    pub fn with_estimator(mut self, estimator: MarketModelEstimator) -> Self {
        self.estimator = estimator;
        self
    }

    /// Use a custom abnormal-return calculator.
    pub fn with_calculator(mut self, calculator: AbnormalReturnCalculator) -> Self {
        self.calculator = calculator;
        self
    }

    /// Attach an observer for diagnostic events.
    pub fn with_observer(mut self, observer: Arc<dyn AnalysisObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Run the study, fetching history through today.
    pub fn run(&self, request: &StudyRequest) -> Result<StudyOutcome> {
        self.run_as_of(request, Utc::now().date_naive())
    }

    /// Run the study with an explicit fetch-horizon date.
    ///
    /// This is the deterministic core: identical requests, `as_of` dates,
    /// and provider data always produce bit-identical results.
    pub fn run_as_of(&self, request: &StudyRequest, as_of: NaiveDate) -> Result<StudyOutcome> {
        validate_windows(request)?;

        let lookback = (request.estimation_window + request.event_window) as u64 + FETCH_MARGIN_DAYS;
        let fetch_start = checked_sub(request.event_date, lookback)?;
        let event_end = checked_add(request.event_date, request.event_window as u64)?;
        let fetch_end = as_of.max(event_end);

        // No analysis is possible without a market proxy, so a benchmark
        // failure propagates.
        let benchmark_bars = self
            .provider
            .fetch(&self.benchmark_symbol, fetch_start, fetch_end)?;
        let benchmark = self.builder.build(&self.benchmark_symbol, &benchmark_bars)?;
        self.observer.record(&AnalysisEvent::BenchmarkReady {
            symbol: self.benchmark_symbol.clone(),
            observations: benchmark.len(),
        });

        let estimation_end = checked_sub(request.event_date, request.event_window as u64)?;
        let estimation_start = checked_sub(estimation_end, request.estimation_window as u64)?;

        let mut results = BTreeMap::new();
        let mut succeeded: Vec<(String, ReturnSeries)> = Vec::new();
        for asset in &request.assets {
            self.observer.record(&AnalysisEvent::AssetStarted {
                label: asset.label.clone(),
                symbol: asset.symbol.clone(),
            });

            match self.analyze_asset(
                asset,
                &benchmark,
                request,
                fetch_start,
                fetch_end,
                estimation_start,
                estimation_end,
            ) {
                Ok((result, series)) => {
                    self.observer.record(&AnalysisEvent::AssetAnalyzed {
                        label: asset.label.clone(),
                        symbol: asset.symbol.clone(),
                        cumulative_abnormal: result.statistics.cumulative_abnormal,
                        p_value: result.statistics.p_value,
                    });
                    succeeded.push((asset.label.clone(), series));
                    results.insert(asset.label.clone(), result);
                }
                Err(err) => {
                    self.observer.record(&AnalysisEvent::AssetSkipped {
                        label: asset.label.clone(),
                        symbol: asset.symbol.clone(),
                        reason: err.to_string(),
                    });
                }
            }
        }

        let correlation = correlation_matrix(&succeeded)?;

        Ok(StudyOutcome {
            results,
            benchmark,
            correlation,
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn analyze_asset(
        &self,
        asset: &AssetSpec,
        benchmark: &ReturnSeries,
        request: &StudyRequest,
        fetch_start: NaiveDate,
        fetch_end: NaiveDate,
        estimation_start: NaiveDate,
        estimation_end: NaiveDate,
    ) -> Result<(AssetAnalysisResult, ReturnSeries)> {
        let bars = self.provider.fetch(&asset.symbol, fetch_start, fetch_end)?;
        let series = self.builder.build(&asset.symbol, &bars)?;

        let estimation_asset = series.restrict(estimation_start, estimation_end)?;
        let estimation_market = benchmark.restrict(estimation_start, estimation_end)?;
        let model = self
            .estimator
            .estimate(&estimation_asset, &estimation_market)?;

        let analysis = self.calculator.compute(
            &series,
            benchmark,
            &model,
            request.event_date,
            request.event_window as u64,
        )?;

        let result = AssetAnalysisResult {
            label: asset.label.clone(),
            symbol: asset.symbol.clone(),
            model,
            window: analysis.records,
            statistics: analysis.statistics,
            clustering: analysis.clustering,
        };

        Ok((result, series))
    }
}

fn validate_windows(request: &StudyRequest) -> Result<()> {
    let (est_min, est_max) = ESTIMATION_WINDOW_BOUNDS;
    if request.estimation_window < est_min || request.estimation_window > est_max {
        return Err(EventStudyError::InvalidWindow {
            name: "estimation_window",
            value: request.estimation_window,
            min: est_min,
            max: est_max,
        });
    }

    let (evt_min, evt_max) = EVENT_WINDOW_BOUNDS;
    if request.event_window < evt_min || request.event_window > evt_max {
        return Err(EventStudyError::InvalidWindow {
            name: "event_window",
            value: request.event_window,
            min: evt_min,
            max: evt_max,
        });
    }

    Ok(())
}

/// Pairwise Pearson correlations over the date-intersection of the
/// succeeded assets' full return series.
fn correlation_matrix(series: &[(String, ReturnSeries)]) -> Result<Option<CorrelationMatrix>> {
    if series.len() < 2 {
        return Ok(None);
    }

    let mut by_date: Vec<HashMap<String, f64>> = Vec::with_capacity(series.len());
    for (_, s) in series {
        let dates = date_strings(s.frame())?;
        let returns = float_column(s.frame(), "ret")?;
        by_date.push(
            dates
                .into_iter()
                .zip(returns)
                .filter_map(|(date, ret)| ret.map(|r| (date, r)))
                .collect(),
        );
    }

    let mut common: Vec<String> = by_date[0].keys().cloned().collect();
    common.retain(|date| by_date.iter().all(|map| map.contains_key(date)));
    common.sort();

    if common.len() < MIN_CORRELATION_OBSERVATIONS {
        return Ok(None);
    }

    let aligned: Vec<Vec<f64>> = by_date
        .iter()
        .map(|map| common.iter().map(|date| map[date]).collect())
        .collect();

    let n = aligned.len();
    let mut values = vec![vec![1.0; n]; n];
    for i in 0..n {
        for j in (i + 1)..n {
            let value = stats::pearson(&aligned[i], &aligned[j]).unwrap_or(0.0);
            values[i][j] = value;
            values[j][i] = value;
        }
    }

    Ok(Some(CorrelationMatrix {
        labels: series.iter().map(|(label, _)| label.clone()).collect(),
        values,
    }))
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
