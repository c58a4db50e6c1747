//! Per-ticker daily bar storage with date lookups.
//!
//! Built once from injected price series before a run; read-only afterwards.
//! Tickers iterate in sorted order so runs are deterministic.

use chrono::NaiveDate;
use std::collections::{BTreeMap, BTreeSet, HashMap};

use super::bar::PriceBar;
use super::error::SimError;

#[derive(Debug, Clone, Default)]
pub struct PriceIndex {
    series: BTreeMap<String, Vec<PriceBar>>,
    by_date: HashMap<String, HashMap<NaiveDate, usize>>,
}

impl PriceIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert (or overwrite) the price series for a ticker. Bars are validated
    /// and sorted by date.
    pub fn add_series(&mut self, ticker: &str, mut bars: Vec<PriceBar>) -> Result<(), SimError> {
        for bar in &bars {
            bar.validate()?;
        }
        bars.sort_by_key(|b| b.date);
        let lookup: HashMap<NaiveDate, usize> = bars
            .iter()
            .enumerate()
            .map(|(i, b)| (b.date, i))
            .collect();
        self.series.insert(ticker.to_string(), bars);
        self.by_date.insert(ticker.to_string(), lookup);
        Ok(())
    }

    pub fn tickers(&self) -> impl Iterator<Item = &str> {
        self.series.keys().map(|s| s.as_str())
    }

    pub fn has_bars(&self, ticker: &str) -> bool {
        self.series.get(ticker).is_some_and(|s| !s.is_empty())
    }

    pub fn bars(&self, ticker: &str) -> Option<&[PriceBar]> {
        self.series.get(ticker).map(|s| s.as_slice())
    }

    pub fn bar_on(&self, ticker: &str, date: NaiveDate) -> Option<&PriceBar> {
        let idx = *self.by_date.get(ticker)?.get(&date)?;
        self.series.get(ticker)?.get(idx)
    }

    pub fn close_on(&self, ticker: &str, date: NaiveDate) -> Option<f64> {
        self.bar_on(ticker, date).map(|b| b.close)
    }

    /// Bars with date <= `date`, in chronological order.
    pub fn bars_through(&self, ticker: &str, date: NaiveDate) -> &[PriceBar] {
        let Some(bars) = self.series.get(ticker) else {
            return &[];
        };
        let end = bars.partition_point(|b| b.date <= date);
        &bars[..end]
    }

    /// Close of the last bar with date <= `date`, if any bar exists yet.
    pub fn last_known_price(&self, ticker: &str, date: NaiveDate) -> Option<f64> {
        self.bars_through(ticker, date).last().map(|b| b.close)
    }

    /// Last known close per ticker as of `date`. Tickers with no bar on or
    /// before `date` are absent from the map.
    pub fn last_known_prices(&self, date: NaiveDate) -> HashMap<String, f64> {
        self.series
            .keys()
            .filter_map(|t| {
                self.last_known_price(t, date)
                    .map(|p| (t.clone(), p))
            })
            .collect()
    }

    /// Sorted union of all per-ticker trading dates.
    pub fn trading_dates(&self) -> Vec<NaiveDate> {
        let dates: BTreeSet<NaiveDate> = self
            .series
            .values()
            .flat_map(|bars| bars.iter().map(|b| b.date))
            .collect();
        dates.into_iter().collect()
    }
}
