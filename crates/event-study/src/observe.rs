//! Injectable diagnostics hook.
//!
//! The engine reports progress through an [`AnalysisObserver`] instead of
//! logging or printing from inside the computation. Analysis results never
//! depend on this channel; a caller that wants silence injects
//! [`NoopObserver`], and the CLI bridges events into its own logging.

/// A diagnostic record emitted during an orchestration run.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub enum AnalysisEvent {
    /// The benchmark series was fetched and built.
    BenchmarkReady {
        /// Benchmark symbol.
        symbol: String,
        /// Observations in the benchmark return series.
        observations: usize,
    },
    /// Analysis of one asset began.
    AssetStarted {
        /// Asset label.
        label: String,
        /// Ticker symbol.
        symbol: String,
    },
    /// An asset was dropped from the result set.
    AssetSkipped {
        /// Asset label.
        label: String,
        /// Ticker symbol.
        symbol: String,
        /// Why the asset was skipped.
        reason: String,
    },
    /// An asset's analysis completed.
    AssetAnalyzed {
        /// Asset label.
        label: String,
        /// Ticker symbol.
        symbol: String,
        /// Total cumulative abnormal return over the event window.
        cumulative_abnormal: f64,
        /// Two-tailed p-value of the mean abnormal return.
        p_value: f64,
    },
}

/// Receiver for [`AnalysisEvent`] records.
pub trait AnalysisObserver: Send + Sync + std::fmt::Debug {
    /// Called once per diagnostic record, in emission order.
    fn record(&self, event: &AnalysisEvent);
}

/// Observer that discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl AnalysisObserver for NoopObserver {
    fn record(&self, _event: &AnalysisEvent) {}
}
