//! Performance metrics computed from the equity history and trade list.

use chrono::NaiveDate;
use serde::Serialize;

use super::ledger::EquitySnapshot;
use super::rounding::{round0, round2};
use super::trade::TradeRecord;

pub const TRADING_DAYS_PER_YEAR: f64 = 252.0;
pub const RISK_FREE_RATE: f64 = 0.035;

/// Sample standard deviation (n - 1 denominator). Zero for fewer than two
/// samples.
pub(crate) fn sample_stdev(samples: &[f64]) -> f64 {
    if samples.len() < 2 {
        return 0.0;
    }
    let n = samples.len() as f64;
    let mean = samples.iter().sum::<f64>() / n;
    let var = samples.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (n - 1.0);
    var.sqrt()
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DrawdownPoint {
    pub date: NaiveDate,
    pub dd: f64,
}

/// Summary statistics over one backtest run. Percentages are rounded to two
/// decimals, currency amounts to whole units.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Metrics {
    pub initial_capital: f64,
    pub final_equity: f64,
    pub profit_loss: f64,
    pub total_return: f64,
    pub annual_return: f64,
    pub mdd: f64,
    pub mdd_period: String,
    pub sharpe: f64,
    pub volatility: f64,
    pub win_rate: f64,
    pub total_trades: usize,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub trading_days: usize,
}

/// Metrics plus the per-day drawdown curve they were derived from.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricsReport {
    pub metrics: Metrics,
    pub drawdown_curve: Vec<DrawdownPoint>,
}

impl MetricsReport {
    /// Returns `None` when the history is empty or starts at zero equity.
    pub fn compute(
        history: &[EquitySnapshot],
        trades: &[TradeRecord],
        initial_capital: f64,
    ) -> Option<MetricsReport> {
        let n = history.len();
        if n == 0 || history[0].equity == 0.0 {
            return None;
        }

        let first = history[0].equity;
        let last = history[n - 1].equity;
        let total_return = (last / first - 1.0) * 100.0;

        // Maximum drawdown with the peak/trough dates of the worst stretch.
        let mut peak = first;
        let mut mdd = 0.0;
        let mut tmp_peak_date = history[0].date;
        let mut mdd_peak_date = history[0].date;
        let mut mdd_trough_date = history[0].date;
        let mut drawdown_curve = Vec::with_capacity(n);
        for snap in history {
            if snap.equity > peak {
                peak = snap.equity;
                tmp_peak_date = snap.date;
            }
            let dd = if peak > 0.0 {
                (snap.equity / peak - 1.0) * 100.0
            } else {
                0.0
            };
            drawdown_curve.push(DrawdownPoint {
                date: snap.date,
                dd: round2(dd),
            });
            if dd < mdd {
                mdd = dd;
                mdd_peak_date = tmp_peak_date;
                mdd_trough_date = snap.date;
            }
        }

        let daily_returns: Vec<f64> = history
            .windows(2)
            .filter(|w| w[0].equity > 0.0)
            .map(|w| w[1].equity / w[0].equity - 1.0)
            .collect();

        let annual_return =
            ((last / first).powf(TRADING_DAYS_PER_YEAR / n.max(1) as f64) - 1.0) * 100.0;

        let volatility = if daily_returns.len() > 1 {
            sample_stdev(&daily_returns) * TRADING_DAYS_PER_YEAR.sqrt() * 100.0
        } else {
            0.0
        };

        let sharpe = if daily_returns.len() > 1 {
            let avg = daily_returns.iter().sum::<f64>() / daily_returns.len() as f64;
            let std = sample_stdev(&daily_returns);
            if std > 0.0 {
                (avg - RISK_FREE_RATE / TRADING_DAYS_PER_YEAR) / std
                    * TRADING_DAYS_PER_YEAR.sqrt()
            } else {
                0.0
            }
        } else {
            0.0
        };

        let closed: Vec<&TradeRecord> = trades.iter().filter(|t| !t.is_open()).collect();
        let wins = closed.iter().filter(|t| t.pnl > 0.0).count();
        let win_rate = if closed.is_empty() {
            0.0
        } else {
            wins as f64 / closed.len() as f64 * 100.0
        };

        let metrics = Metrics {
            initial_capital,
            final_equity: round0(last),
            profit_loss: round0(last - initial_capital),
            total_return: round2(total_return),
            annual_return: round2(annual_return),
            mdd: round2(mdd),
            mdd_period: format!("{mdd_peak_date} ~ {mdd_trough_date}"),
            sharpe: round2(sharpe),
            volatility: round2(volatility),
            win_rate: round2(win_rate),
            total_trades: trades.len(),
            start_date: history[0].date,
            end_date: history[n - 1].date,
            trading_days: n,
        };

        Some(MetricsReport {
            metrics,
            drawdown_curve,
        })
    }
}
