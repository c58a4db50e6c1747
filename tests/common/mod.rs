#![allow(dead_code)]

use chrono::NaiveDate;
use std::collections::HashMap;
use stocksim::domain::bar::PriceBar;
use stocksim::domain::cost::CostConfig;
use stocksim::domain::engine::Engine;
use stocksim::domain::error::SimError;
use stocksim::ports::data_port::DataPort;

pub struct MockDataPort {
    pub data: HashMap<String, Vec<PriceBar>>,
    pub errors: HashMap<String, String>,
}

impl MockDataPort {
    pub fn new() -> Self {
        Self {
            data: HashMap::new(),
            errors: HashMap::new(),
        }
    }

    pub fn with_bars(mut self, ticker: &str, bars: Vec<PriceBar>) -> Self {
        self.data.insert(ticker.to_string(), bars);
        self
    }

    pub fn with_error(mut self, ticker: &str, reason: &str) -> Self {
        self.errors.insert(ticker.to_string(), reason.to_string());
        self
    }
}

impl DataPort for MockDataPort {
    fn fetch_series(
        &self,
        ticker: &str,
        start_date: Option<NaiveDate>,
        end_date: Option<NaiveDate>,
    ) -> Result<Vec<PriceBar>, SimError> {
        if let Some(reason) = self.errors.get(ticker) {
            return Err(SimError::Data {
                reason: reason.clone(),
            });
        }
        let bars = self
            .data
            .get(ticker)
            .cloned()
            .unwrap_or_default()
            .into_iter()
            .filter(|b| {
                start_date.is_none_or(|s| b.date >= s) && end_date.is_none_or(|e| b.date <= e)
            })
            .collect();
        Ok(bars)
    }

    fn list_tickers(&self) -> Result<Vec<String>, SimError> {
        let mut tickers: Vec<String> = self.data.keys().cloned().collect();
        tickers.sort();
        Ok(tickers)
    }
}

pub fn make_bar(date: &str, close: f64) -> PriceBar {
    PriceBar {
        date: NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap(),
        open: close - 1.0,
        high: close + 1.0,
        low: close - 2.0,
        close,
        volume: 10_000,
    }
}

/// Daily bars starting 2025-01-02 (a Thursday), skipping weekends.
pub fn make_series(closes: &[f64]) -> Vec<PriceBar> {
    let start = NaiveDate::from_ymd_opt(2025, 1, 2).unwrap();
    let mut date = start;
    closes
        .iter()
        .map(|&close| {
            let bar = PriceBar {
                date,
                open: close,
                high: close,
                low: close,
                close,
                volume: 10_000,
            };
            date = next_weekday(date);
            bar
        })
        .collect()
}

fn next_weekday(date: NaiveDate) -> NaiveDate {
    use chrono::Datelike;
    let mut next = date.succ_opt().unwrap();
    while next.weekday().num_days_from_monday() >= 5 {
        next = next.succ_opt().unwrap();
    }
    next
}

pub fn zero_cost_engine(capital: f64) -> Engine {
    Engine::new(capital, CostConfig::default())
}

pub fn korean_cost_engine(capital: f64) -> Engine {
    Engine::new(
        capital,
        CostConfig {
            slippage_pct: 0.3,
            commission_pct: 0.015,
            tax_pct: 0.20,
        },
    )
}

pub fn tickers(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}
