//! Trade records: one per buy fill, completed in place on sell.

use chrono::NaiveDate;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeStatus {
    Open,
    Closed,
}

/// A single buy lot and, once closed, its exit details.
///
/// A record transitions open -> closed exactly once and never reopens. The
/// trade list is append-only and is the sole source of realized-trade history.
#[derive(Debug, Clone, PartialEq)]
pub struct TradeRecord {
    pub ticker: String,
    pub name: String,
    pub entry_date: NaiveDate,
    /// Quoted market price at entry.
    pub entry_price: f64,
    /// Slippage-adjusted execution price, rounded to one decimal.
    pub exec_price: f64,
    pub shares: i64,
    /// Commission plus slippage cost paid at entry, rounded to whole units.
    pub entry_cost: f64,
    pub exit_date: Option<NaiveDate>,
    pub exit_price: Option<f64>,
    pub exec_exit_price: Option<f64>,
    /// Commission, tax and slippage cost paid at exit, rounded to whole units.
    pub exit_cost: f64,
    /// Net realized profit after all costs, rounded to whole units.
    pub pnl: f64,
    pub pnl_pct: f64,
    pub status: TradeStatus,
}

impl TradeRecord {
    pub fn open(
        ticker: &str,
        name: &str,
        entry_date: NaiveDate,
        entry_price: f64,
        exec_price: f64,
        shares: i64,
        entry_cost: f64,
    ) -> Self {
        TradeRecord {
            ticker: ticker.to_string(),
            name: name.to_string(),
            entry_date,
            entry_price,
            exec_price,
            shares,
            entry_cost,
            exit_date: None,
            exit_price: None,
            exec_exit_price: None,
            exit_cost: 0.0,
            pnl: 0.0,
            pnl_pct: 0.0,
            status: TradeStatus::Open,
        }
    }

    pub fn is_open(&self) -> bool {
        self.status == TradeStatus::Open
    }
}
