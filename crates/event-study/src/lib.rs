#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/quantfin-research/event-study/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod error;
pub mod event;
pub mod market_model;
pub mod observe;
pub mod provider;
pub mod returns;
pub mod significance;
mod stats;
pub mod study;

// Re-export core types
pub use error::{EventStudyError, Result};
pub use event::{
    AbnormalReturnCalculator, AbnormalReturnStatistics, EventDayImpact, EventWindowAnalysis,
    EventWindowConfig, EventWindowRecord, VolatilityClustering, VolumeShock,
};
pub use market_model::{MarketModelConfig, MarketModelEstimator, MarketModelParameters};
pub use observe::{AnalysisEvent, AnalysisObserver, NoopObserver};
pub use provider::{CachingProvider, MemoryPriceProvider, PriceBar, PriceSeriesProvider};
pub use returns::{ReturnSeries, ReturnSeriesBuilder, ReturnSeriesConfig};
pub use significance::{SIGNIFICANCE_LEVEL, SignificanceTest, t_test};
pub use study::{
    AssetAnalysisResult, AssetSpec, CorrelationMatrix, DEFAULT_BENCHMARK, EventStudy, StudyOutcome,
    StudyRequest,
};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
