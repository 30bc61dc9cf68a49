//! Price-history sourcing.
//!
//! The engine never performs I/O itself; it consumes daily bars through the
//! [`PriceSeriesProvider`] trait. Implementations wrap whatever backend is
//! available (an HTTP market-data API, a CSV directory, an in-memory fixture)
//! and must return full, consistent series - never partial or corrupt data.

use crate::{EventStudyError, Result};
use chrono::NaiveDate;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

/// One trading day's data for one instrument.
///
/// Within a series, dates must be strictly increasing and unique, prices
/// positive, and the close adjusted for splits/dividends consistently with
/// the benchmark series.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct PriceBar {
    /// Calendar date of the bar (timezone-naive, trading-day granularity).
    pub date: NaiveDate,
    /// Opening price.
    pub open: f64,
    /// Intraday high.
    pub high: f64,
    /// Intraday low.
    pub low: f64,
    /// Closing price.
    pub close: f64,
    /// Shares traded.
    pub volume: u64,
}

/// A source of daily price history.
///
/// `fetch` must return every available bar with a date in `[start, end]`,
/// or [`EventStudyError::DataUnavailable`] when the symbol is unknown or no
/// data exists in the range.
pub trait PriceSeriesProvider: Send + Sync + std::fmt::Debug {
    /// Fetch daily bars for `symbol` over the inclusive date range.
    fn fetch(&self, symbol: &str, start: NaiveDate, end: NaiveDate) -> Result<Vec<PriceBar>>;
}

/// In-memory provider backed by pre-loaded series.
///
/// Intended for tests and offline fixtures.
#[derive(Debug, Clone, Default)]
pub struct MemoryPriceProvider {
    series: HashMap<String, Vec<PriceBar>>,
}

impl MemoryPriceProvider {
    /// Create an empty provider.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a full bar series for a symbol, replacing any existing one.
    pub fn insert(&mut self, symbol: impl Into<String>, mut bars: Vec<PriceBar>) {
        bars.sort_by_key(|bar| bar.date);
        self.series.insert(symbol.into(), bars);
    }
}

impl PriceSeriesProvider for MemoryPriceProvider {
    fn fetch(&self, symbol: &str, start: NaiveDate, end: NaiveDate) -> Result<Vec<PriceBar>> {
        let bars = self
            .series
            .get(symbol)
            .ok_or_else(|| EventStudyError::DataUnavailable {
                symbol: symbol.to_string(),
                detail: "symbol not registered".to_string(),
            })?;

        let slice: Vec<PriceBar> = bars
            .iter()
            .copied()
            .filter(|bar| bar.date >= start && bar.date <= end)
            .collect();

        if slice.is_empty() {
            return Err(EventStudyError::DataUnavailable {
                symbol: symbol.to_string(),
                detail: format!("no bars in [{start}, {end}]"),
            });
        }

        Ok(slice)
    }
}

type CacheKey = (String, NaiveDate, NaiveDate);

#[derive(Debug, Default)]
struct CacheState {
    entries: HashMap<CacheKey, Vec<PriceBar>>,
    order: VecDeque<CacheKey>,
}

/// Bounded caching decorator over any [`PriceSeriesProvider`].
///
/// Caches successful fetches keyed by (symbol, start, end) and evicts the
/// oldest entry once `capacity` is exceeded. Replaces the ambient session
/// cache of earlier revisions with an explicit, injectable collaborator.
#[derive(Debug)]
pub struct CachingProvider<P> {
    inner: P,
    capacity: usize,
    state: Mutex<CacheState>,
}

impl<P: PriceSeriesProvider> CachingProvider<P> {
    /// Wrap `inner` with a cache holding at most `capacity` fetch results.
    pub fn new(inner: P, capacity: usize) -> Self {
        Self {
            inner,
            capacity: capacity.max(1),
            state: Mutex::new(CacheState::default()),
        }
    }

    /// Number of cached fetch results.
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    /// Whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, CacheState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl<P: PriceSeriesProvider> PriceSeriesProvider for CachingProvider<P> {
    fn fetch(&self, symbol: &str, start: NaiveDate, end: NaiveDate) -> Result<Vec<PriceBar>> {
        let key: CacheKey = (symbol.to_string(), start, end);

        if let Some(hit) = self.lock().entries.get(&key) {
            return Ok(hit.clone());
        }

        let bars = self.inner.fetch(symbol, start, end)?;

        let mut state = self.lock();
        if !state.entries.contains_key(&key) {
            state.order.push_back(key.clone());
            state.entries.insert(key, bars.clone());
            while state.entries.len() > self.capacity {
                if let Some(evicted) = state.order.pop_front() {
                    state.entries.remove(&evicted);
                } else {
                    break;
                }
            }
        }

        Ok(bars)
    }
}
