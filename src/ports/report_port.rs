//! Report output port trait.

use crate::domain::error::SimError;
use crate::domain::report::{BacktestResults, DailyRow};

/// Port for writing backtest reports.
pub trait ReportPort {
    fn write(
        &self,
        results: &BacktestResults,
        daily: &[DailyRow],
        output_path: &str,
    ) -> Result<(), SimError>;
}
