//! CSV file data adapter: one `{ticker}.csv` per ticker under a base
//! directory, with a `date,open,high,low,close,volume` header row.

use crate::domain::bar::PriceBar;
use crate::domain::error::SimError;
use crate::ports::data_port::DataPort;
use chrono::NaiveDate;
use serde::Deserialize;
use std::fs;
use std::path::PathBuf;

pub struct CsvAdapter {
    base_path: PathBuf,
}

#[derive(Debug, Deserialize)]
struct CsvBar {
    date: NaiveDate,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    volume: i64,
}

impl CsvAdapter {
    pub fn new(base_path: PathBuf) -> Self {
        Self { base_path }
    }

    fn csv_path(&self, ticker: &str) -> PathBuf {
        self.base_path.join(format!("{}.csv", ticker))
    }
}

impl DataPort for CsvAdapter {
    fn fetch_series(
        &self,
        ticker: &str,
        start_date: Option<NaiveDate>,
        end_date: Option<NaiveDate>,
    ) -> Result<Vec<PriceBar>, SimError> {
        let path = self.csv_path(ticker);
        let mut rdr = csv::Reader::from_path(&path).map_err(|e| SimError::Data {
            reason: format!("failed to read {}: {}", path.display(), e),
        })?;

        let mut bars = Vec::new();
        for result in rdr.deserialize::<CsvBar>() {
            let row = result.map_err(|e| SimError::Data {
                reason: format!("{}: {}", path.display(), e),
            })?;

            if start_date.is_some_and(|s| row.date < s) || end_date.is_some_and(|e| row.date > e)
            {
                continue;
            }

            bars.push(PriceBar {
                date: row.date,
                open: row.open,
                high: row.high,
                low: row.low,
                close: row.close,
                volume: row.volume,
            });
        }

        bars.sort_by_key(|b| b.date);
        Ok(bars)
    }

    fn list_tickers(&self) -> Result<Vec<String>, SimError> {
        let entries = fs::read_dir(&self.base_path).map_err(|e| SimError::Data {
            reason: format!(
                "failed to read directory {}: {}",
                self.base_path.display(),
                e
            ),
        })?;

        let mut tickers = Vec::new();
        for entry in entries {
            let entry = entry.map_err(SimError::Io)?;
            let file_name = entry.file_name();
            let Some(name) = file_name.to_str() else {
                continue;
            };
            if let Some(ticker) = name.strip_suffix(".csv") {
                tickers.push(ticker.to_string());
            }
        }

        tickers.sort();
        Ok(tickers)
    }
}
