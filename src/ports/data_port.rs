//! Price data access port trait.

use crate::domain::bar::PriceBar;
use crate::domain::error::SimError;
use chrono::NaiveDate;

pub trait DataPort {
    fn fetch_series(
        &self,
        ticker: &str,
        start_date: Option<NaiveDate>,
        end_date: Option<NaiveDate>,
    ) -> Result<Vec<PriceBar>, SimError>;

    fn list_tickers(&self) -> Result<Vec<String>, SimError>;
}
