//! CLI for the event-study analysis engine.
//!
//! Drives [`event_study::EventStudy`] from the command line: price history
//! is read from a directory of per-symbol CSV files, results are printed as
//! a text report or JSON, and engine diagnostics are bridged into
//! `tracing`.

use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use event_study::{
    AnalysisEvent, AnalysisObserver, AssetAnalysisResult, AssetSpec, CachingProvider,
    CorrelationMatrix, DEFAULT_BENCHMARK, EventStudy, EventStudyError, EventWindowConfig,
    MarketModelConfig, PriceBar, PriceSeriesProvider, SIGNIFICANCE_LEVEL, StudyOutcome,
    StudyRequest,
};
use std::collections::BTreeMap;
use std::fs::File;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Parser)]
#[command(name = "event-study")]
#[command(about = "CAPM event-study analysis over daily price history", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run an event study over a directory of CSV price files
    Run(RunArgs),
    /// Print the methodology and its constants
    Explain,
}

#[derive(Args)]
struct RunArgs {
    /// Event date (YYYY-MM-DD)
    #[arg(long)]
    event_date: NaiveDate,

    /// Asset to analyze, as LABEL=SYMBOL; a bare SYMBOL labels itself.
    /// Repeatable.
    #[arg(long = "asset", required = true)]
    assets: Vec<String>,

    /// Directory holding <SYMBOL>.csv files with date/open/high/low/close/
    /// volume columns
    #[arg(long)]
    data_dir: PathBuf,

    /// Benchmark symbol (expects <SYMBOL>.csv in the data directory)
    #[arg(long, default_value = DEFAULT_BENCHMARK)]
    benchmark: String,

    /// Estimation-window length in calendar days
    #[arg(long, default_value_t = 252)]
    estimation_window: usize,

    /// Event half-window length in calendar days
    #[arg(long, default_value_t = 11)]
    event_window: usize,

    /// Treat this date as "today" when fetching history (defaults to the
    /// system date)
    #[arg(long)]
    as_of: Option<NaiveDate>,

    /// Emit JSON instead of the text report
    #[arg(long)]
    json: bool,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Run(args) => run_study(&args),
        Commands::Explain => {
            explain();
            Ok(())
        }
    };

    if let Err(err) = result {
        eprintln!("Error: {err}");
        std::process::exit(1);
    }
}

fn run_study(args: &RunArgs) -> Result<(), EventStudyError> {
    let provider = CachingProvider::new(
        CsvDirProvider {
            dir: args.data_dir.clone(),
        },
        32,
    );
    let study = EventStudy::new(Arc::new(provider))
        .with_benchmark(args.benchmark.as_str())
        .with_observer(Arc::new(TracingObserver));

    let request = StudyRequest {
        event_date: args.event_date,
        assets: args.assets.iter().map(|raw| parse_asset(raw)).collect(),
        estimation_window: args.estimation_window,
        event_window: args.event_window,
    };

    let outcome = match args.as_of {
        Some(as_of) => study.run_as_of(&request, as_of)?,
        None => study.run(&request)?,
    };

    let skipped: Vec<String> = request
        .assets
        .iter()
        .filter(|asset| !outcome.results.contains_key(&asset.label))
        .map(|asset| asset.label.clone())
        .collect();

    if args.json {
        let report = JsonReport {
            event_date: request.event_date,
            results: &outcome.results,
            correlation: &outcome.correlation,
            skipped: &skipped,
        };
        match serde_json::to_string_pretty(&report) {
            Ok(body) => println!("{body}"),
            Err(err) => eprintln!("Error: failed to encode report: {err}"),
        }
    } else {
        print_report(&request, &outcome, &skipped);
    }

    Ok(())
}

#[derive(serde::Serialize)]
struct JsonReport<'a> {
    event_date: NaiveDate,
    results: &'a BTreeMap<String, AssetAnalysisResult>,
    correlation: &'a Option<CorrelationMatrix>,
    skipped: &'a [String],
}

/// `LABEL=SYMBOL`, or a bare symbol labeling itself.
fn parse_asset(raw: &str) -> AssetSpec {
    match raw.split_once('=') {
        Some((label, symbol)) => AssetSpec::new(label.trim(), symbol.trim()),
        None => AssetSpec::new(raw.trim(), raw.trim()),
    }
}

fn print_report(request: &StudyRequest, outcome: &StudyOutcome, skipped: &[String]) {
    println!(
        "Event Study: {} (event window +-{} days, {}-day estimation)\n",
        request.event_date, request.event_window, request.estimation_window
    );

    if outcome.results.is_empty() {
        println!("No asset produced a usable analysis.");
    }

    for result in outcome.results.values() {
        print_asset(result);
    }

    if let Some(matrix) = &outcome.correlation {
        print_correlation(matrix);
    }

    if !skipped.is_empty() {
        println!("Skipped assets (no result): {}", skipped.join(", "));
    }
}

fn print_asset(result: &AssetAnalysisResult) {
    let model = &result.model;
    let stats = &result.statistics;

    println!("{} [{}]", result.label, result.symbol);
    println!(
        "  Market model: beta {:+.4}  alpha {:+.6}  R2 {:.4}  (n = {}, window = {})",
        model.beta, model.alpha, model.r_squared, model.observations, model.window_used
    );
    println!(
        "  Abnormal returns: mean {:+.4}%  CAR {:+.4}%  ({} up / {} down over {} days)",
        stats.mean_abnormal * 100.0,
        stats.cumulative_abnormal * 100.0,
        stats.positive_days,
        stats.negative_days,
        stats.observations
    );
    println!(
        "  Significance: t = {:+.3}, p = {:.4} -> {}",
        stats.t_statistic,
        stats.p_value,
        if stats.significant {
            "significant"
        } else {
            "not significant"
        }
    );
    println!(
        "  Event day: AR {:+.4}%  actual {:+.4}%  expected {:+.4}%  market {:+.4}%",
        stats.event_day.abnormal_return * 100.0,
        stats.event_day.actual_return * 100.0,
        stats.event_day.expected_return * 100.0,
        stats.event_day.market_return * 100.0
    );
    if let Some(shock) = &stats.volume_shock {
        println!(
            "  Volume: {:.0} vs baseline {:.0}  (x{:.2}, {:+.1}%)",
            shock.event_volume, shock.baseline_volume, shock.spike_ratio, shock.percent_change
        );
    }
    if let Some(clustering) = &result.clustering {
        println!(
            "  Volatility: pre {:.2}%  post {:.2}%  (ratio {:.2})",
            clustering.pre_event, clustering.post_event, clustering.ratio
        );
    }
    println!();
}

fn print_correlation(matrix: &CorrelationMatrix) {
    println!("Return correlation matrix:");
    print!("  {:<12}", "");
    for label in &matrix.labels {
        print!("{label:>12}");
    }
    println!();
    for (i, label) in matrix.labels.iter().enumerate() {
        print!("  {label:<12}");
        for value in &matrix.values[i] {
            print!("{value:>12.3}");
        }
        println!();
    }
    println!();
}

fn explain() {
    let model = MarketModelConfig::default();
    let window = EventWindowConfig::default();

    println!("Event-study methodology\n");
    println!("Market model (estimation window):");
    println!(
        "  - inner join of asset and benchmark daily returns, most recent {} observations",
        model.tail_window
    );
    println!("  - minimum {} joined observations", model.min_observations);
    println!(
        "  - excess returns over a {:.1}% annual risk-free rate (daily = rate / 252)",
        model.annual_risk_free * 100.0
    );
    println!(
        "  - rows with |z| >= {:.1} in either excess series are rejected, unless rejection",
        model.zscore_threshold
    );
    println!("    would leave fewer than the minimum observations");
    println!("  - OLS fit: asset_excess = alpha + beta * market_excess\n");
    println!("Event window:");
    println!("  - calendar-day window [event - w, event + w], inclusive");
    println!(
        "  - expected return = rf + beta * (market - rf) with a {:.1}% annual risk-free rate",
        window.annual_risk_free * 100.0
    );
    println!("    (kept distinct from the estimation-window rate)");
    println!("  - abnormal return = actual - expected; CAR = running sum");
    println!(
        "  - {}-observation trailing volatility, annualized, in percent",
        window.volatility_window
    );
    println!(
        "  - volume baseline: mean over the {} calendar days before the window start\n",
        window.volume_baseline_days
    );
    println!("Significance:");
    println!("  - one-sample t-test of the mean abnormal return against zero");
    println!("  - two-tailed p-value, Student-t with n - 1 degrees of freedom");
    println!(
        "  - significant when p < {SIGNIFICANCE_LEVEL}; degenerate windows report t = 0, p = 1"
    );
}

/// Reads `<SYMBOL>.csv` files from a directory.
#[derive(Debug, Clone)]
struct CsvDirProvider {
    dir: PathBuf,
}

impl PriceSeriesProvider for CsvDirProvider {
    fn fetch(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> event_study::Result<Vec<PriceBar>> {
        let path = self.dir.join(format!("{symbol}.csv"));
        let file = File::open(&path).map_err(|err| EventStudyError::DataUnavailable {
            symbol: symbol.to_string(),
            detail: format!("{}: {err}", path.display()),
        })?;

        let mut bars = read_bars(file).map_err(|err| EventStudyError::DataUnavailable {
            symbol: symbol.to_string(),
            detail: format!("{}: {err}", path.display()),
        })?;
        bars.retain(|bar| bar.date >= start && bar.date <= end);

        if bars.is_empty() {
            return Err(EventStudyError::DataUnavailable {
                symbol: symbol.to_string(),
                detail: format!("no rows in [{start}, {end}]"),
            });
        }

        Ok(bars)
    }
}

/// Raw CSV row; header aliases cover the usual vendor spellings.
#[derive(Debug, serde::Deserialize)]
struct CsvRow {
    #[serde(alias = "Date", alias = "date", alias = "timestamp")]
    date: String,
    #[serde(alias = "Open", alias = "open")]
    open: f64,
    #[serde(alias = "High", alias = "high")]
    high: f64,
    #[serde(alias = "Low", alias = "low")]
    low: f64,
    #[serde(alias = "Close", alias = "close", alias = "Adj Close")]
    close: f64,
    #[serde(alias = "Volume", alias = "volume", default)]
    volume: f64,
}

fn read_bars<R: std::io::Read>(reader: R) -> Result<Vec<PriceBar>, csv::Error> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let mut bars = Vec::new();
    for row in reader.deserialize::<CsvRow>() {
        let row = row?;
        // Unparseable dates drop the row rather than the file
        let Some(date) = parse_date(&row.date) else {
            continue;
        };
        bars.push(PriceBar {
            date,
            open: row.open,
            high: row.high,
            low: row.low,
            close: row.close,
            volume: row.volume.max(0.0) as u64,
        });
    }
    bars.sort_by_key(|bar| bar.date);
    Ok(bars)
}

fn parse_date(raw: &str) -> Option<NaiveDate> {
    for format in ["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y"] {
        if let Ok(date) = NaiveDate::parse_from_str(raw, format) {
            return Some(date);
        }
    }
    None
}

/// Bridges engine diagnostics into `tracing`.
#[derive(Debug, Clone, Copy, Default)]
struct TracingObserver;

impl AnalysisObserver for TracingObserver {
    fn record(&self, event: &AnalysisEvent) {
        match event {
            AnalysisEvent::BenchmarkReady {
                symbol,
                observations,
            } => info!(%symbol, observations = *observations, "benchmark ready"),
            AnalysisEvent::AssetStarted { label, symbol } => {
                debug!(%label, %symbol, "asset analysis started");
            }
            AnalysisEvent::AssetSkipped {
                label,
                symbol,
                reason,
            } => warn!(%label, %symbol, %reason, "asset skipped"),
            AnalysisEvent::AssetAnalyzed {
                label,
                symbol,
                cumulative_abnormal,
                p_value,
            } => info!(
                %label,
                %symbol,
                car = *cumulative_abnormal,
                p = *p_value,
                "asset analyzed"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_asset_with_label() {
        let spec = parse_asset("Apple=AAPL");
        assert_eq!(spec.label, "Apple");
        assert_eq!(spec.symbol, "AAPL");
    }

    #[test]
    fn test_parse_asset_bare_symbol() {
        let spec = parse_asset(" MSFT ");
        assert_eq!(spec.label, "MSFT");
        assert_eq!(spec.symbol, "MSFT");
    }

    #[test]
    fn test_parse_date_formats() {
        let expected = NaiveDate::from_ymd_opt(2024, 6, 14).unwrap();
        assert_eq!(parse_date("2024-06-14"), Some(expected));
        assert_eq!(parse_date("2024/06/14"), Some(expected));
        assert_eq!(parse_date("06/14/2024"), Some(expected));
        assert_eq!(parse_date("June 14, 2024"), None);
    }

    #[test]
    fn test_read_bars_from_csv() {
        let body = "\
date,open,high,low,close,volume
2024-06-14,100.0,101.0,99.0,100.5,12000
2024-06-13,99.0,100.0,98.0,99.5,11000
";
        let bars = read_bars(body.as_bytes()).unwrap();
        assert_eq!(bars.len(), 2);
        // Sorted by date regardless of file order
        assert_eq!(bars[0].date, NaiveDate::from_ymd_opt(2024, 6, 13).unwrap());
        assert_eq!(bars[1].close, 100.5);
        assert_eq!(bars[1].volume, 12_000);
    }

    #[test]
    fn test_read_bars_skips_bad_dates() {
        let body = "\
Date,Open,High,Low,Close,Volume
not-a-date,1,1,1,1,1
2024-06-14,100.0,101.0,99.0,100.5,12000
";
        let bars = read_bars(body.as_bytes()).unwrap();
        assert_eq!(bars.len(), 1);
        assert_eq!(bars[0].date, NaiveDate::from_ymd_opt(2024, 6, 14).unwrap());
    }

    #[test]
    fn test_csv_provider_missing_file() {
        let provider = CsvDirProvider {
            dir: PathBuf::from("/nonexistent-data-dir"),
        };
        let err = provider
            .fetch(
                "AAPL",
                NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
                NaiveDate::from_ymd_opt(2024, 12, 31).unwrap(),
            )
            .unwrap_err();
        assert!(matches!(err, EventStudyError::DataUnavailable { .. }));
    }
}
