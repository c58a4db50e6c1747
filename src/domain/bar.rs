//! Daily price bar representation.

use chrono::NaiveDate;
use serde::Serialize;

use super::error::SimError;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PriceBar {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: i64,
}

impl PriceBar {
    /// Validate a bar on ingestion: prices non-negative, volume non-negative.
    pub fn validate(&self) -> Result<(), SimError> {
        if self.open < 0.0 || self.high < 0.0 || self.low < 0.0 || self.close < 0.0 {
            return Err(SimError::Data {
                reason: format!("negative price in bar dated {}", self.date),
            });
        }
        if self.volume < 0 {
            return Err(SimError::Data {
                reason: format!("negative volume in bar dated {}", self.date),
            });
        }
        Ok(())
    }
}

/// One point of an externally supplied benchmark series.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BenchmarkBar {
    pub date: NaiveDate,
    pub close: f64,
}
