//! Cash, positions and trade bookkeeping.
//!
//! The ledger owns cash, one aggregated position per ticker, the append-only
//! trade record list and the cumulative cost counters. It is mutated only by
//! the running strategy and becomes read-only input for metrics and reports
//! once the run loop ends.

use chrono::NaiveDate;
use serde::Serialize;
use std::collections::HashMap;

use super::cost::CostConfig;
use super::rounding::{round0, round1, round2};
use super::trade::{TradeRecord, TradeStatus};

/// One aggregated lot per ticker; `avg_exec_price` is the weighted average of
/// all currently-open buys.
#[derive(Debug, Clone, PartialEq)]
pub struct Position {
    pub ticker: String,
    pub name: String,
    pub shares: i64,
    pub avg_exec_price: f64,
}

/// One per simulated trading day, whether or not a trade occurred.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EquitySnapshot {
    pub date: NaiveDate,
    pub equity: f64,
    pub cash: f64,
    pub invested: f64,
}

/// Rounded run-level cost totals.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CostSummary {
    pub slippage: f64,
    pub commission: f64,
    pub tax: f64,
    pub total: f64,
}

#[derive(Debug, Clone)]
pub struct Ledger {
    pub initial_capital: f64,
    pub cash: f64,
    pub positions: HashMap<String, Position>,
    pub trades: Vec<TradeRecord>,
    pub equity_history: Vec<EquitySnapshot>,
    pub cost: CostConfig,
    pub total_slippage_cost: f64,
    pub total_commission_cost: f64,
    pub total_tax_cost: f64,
    /// Indices into `trades` of still-open lots, newest last, per ticker.
    /// Sells complete the newest open lot (LIFO match).
    open_lots: HashMap<String, Vec<usize>>,
}

impl Ledger {
    pub fn new(initial_capital: f64, cost: CostConfig) -> Self {
        Ledger {
            initial_capital,
            cash: initial_capital,
            positions: HashMap::new(),
            trades: Vec::new(),
            equity_history: Vec::new(),
            cost,
            total_slippage_cost: 0.0,
            total_commission_cost: 0.0,
            total_tax_cost: 0.0,
            open_lots: HashMap::new(),
        }
    }

    /// Buy `shares` of `ticker` at the quoted `price`.
    ///
    /// Rejects non-positive inputs. If the order does not fit in cash, the
    /// size is shrunk to the largest affordable whole-share count under the
    /// same fee formula; a shrunk size of zero places no order. Returns the
    /// number of shares actually filled.
    pub fn buy(
        &mut self,
        ticker: &str,
        price: f64,
        shares: i64,
        date: NaiveDate,
        name: &str,
    ) -> i64 {
        if shares <= 0 || price <= 0.0 {
            return 0;
        }

        let exec_price = self.cost.buy_exec_price(price);
        let mut shares = shares;
        let mut gross = exec_price * shares as f64;
        let mut commission = self.cost.commission(gross);

        if gross + commission > self.cash {
            let max_shares = self.cost.affordable_shares(self.cash, price);
            if max_shares <= 0 {
                return 0;
            }
            shares = max_shares;
            gross = exec_price * shares as f64;
            commission = self.cost.commission(gross);
        }

        let slippage_cost = (exec_price - price) * shares as f64;
        self.total_slippage_cost += slippage_cost;
        self.total_commission_cost += commission;
        self.cash -= gross + commission;

        let display_name = if name.is_empty() { ticker } else { name };
        self.positions
            .entry(ticker.to_string())
            .and_modify(|pos| {
                let old_shares = pos.shares;
                let new_shares = old_shares + shares;
                pos.avg_exec_price = (pos.avg_exec_price * old_shares as f64
                    + exec_price * shares as f64)
                    / new_shares as f64;
                pos.shares = new_shares;
            })
            .or_insert_with(|| Position {
                ticker: ticker.to_string(),
                name: display_name.to_string(),
                shares,
                avg_exec_price: exec_price,
            });

        self.trades.push(TradeRecord::open(
            ticker,
            display_name,
            date,
            price,
            round1(exec_price),
            shares,
            round0(commission + slippage_cost),
        ));
        self.open_lots
            .entry(ticker.to_string())
            .or_default()
            .push(self.trades.len() - 1);

        shares
    }

    /// Sell up to `shares` of `ticker` at the quoted `price`.
    ///
    /// Rejects non-positive inputs; a ticker with no open position is a
    /// no-op. Fills at most the held amount and returns the number of shares
    /// actually sold. The newest still-open lot record for the ticker is
    /// completed in place.
    pub fn sell(&mut self, ticker: &str, price: f64, shares: i64, date: NaiveDate) -> i64 {
        if shares <= 0 || price <= 0.0 {
            return 0;
        }
        let Some(pos) = self.positions.get_mut(ticker) else {
            return 0;
        };
        let actual = shares.min(pos.shares);

        let exec_price = self.cost.sell_exec_price(price);
        let gross = exec_price * actual as f64;
        let commission = self.cost.commission(gross);
        let tax = self.cost.tax(gross);
        let net_proceeds = gross - commission - tax;

        let slippage_cost = (price - exec_price) * actual as f64;
        self.total_slippage_cost += slippage_cost;
        self.total_commission_cost += commission;
        self.total_tax_cost += tax;
        self.cash += net_proceeds;

        let cost_basis = pos.avg_exec_price * actual as f64;
        let pnl = net_proceeds - cost_basis;
        let pnl_pct = if pos.avg_exec_price > 0.0 {
            (net_proceeds / cost_basis - 1.0) * 100.0
        } else {
            0.0
        };

        if let Some(idx) = self
            .open_lots
            .get_mut(ticker)
            .and_then(|lots| lots.pop())
        {
            let record = &mut self.trades[idx];
            record.exit_date = Some(date);
            record.exit_price = Some(price);
            record.exec_exit_price = Some(round1(exec_price));
            record.exit_cost = round0(commission + tax + slippage_cost);
            record.pnl = round0(pnl);
            record.pnl_pct = round2(pnl_pct);
            record.status = TradeStatus::Closed;
        }

        pos.shares -= actual;
        if pos.shares <= 0 {
            self.positions.remove(ticker);
        }
        actual
    }

    /// Liquidate every open position at the supplied marks. Tickers without a
    /// mark are left untouched.
    pub fn sell_all(&mut self, prices: &HashMap<String, f64>, date: NaiveDate) {
        let mut tickers: Vec<String> = self.positions.keys().cloned().collect();
        tickers.sort();
        for ticker in tickers {
            if let Some(&price) = prices.get(&ticker) {
                let shares = self.positions[&ticker].shares;
                self.sell(&ticker, price, shares, date);
            }
        }
    }

    /// Mark-to-market equity: cash plus position value at the supplied marks.
    /// Unmarked tickers fall back to their average execution price.
    pub fn equity(&self, prices: &HashMap<String, f64>) -> f64 {
        let position_value: f64 = self
            .positions
            .values()
            .map(|pos| {
                let mark = prices.get(&pos.ticker).copied().unwrap_or(pos.avg_exec_price);
                mark * pos.shares as f64
            })
            .sum();
        self.cash + position_value
    }

    /// Append the daily equity snapshot. Must be called exactly once per
    /// simulated trading date.
    pub fn snapshot(&mut self, date: NaiveDate, prices: &HashMap<String, f64>) {
        let equity = self.equity(prices);
        self.equity_history.push(EquitySnapshot {
            date,
            equity,
            cash: self.cash,
            invested: equity - self.cash,
        });
    }

    pub fn cost_summary(&self) -> CostSummary {
        let total = self.total_slippage_cost + self.total_commission_cost + self.total_tax_cost;
        CostSummary {
            slippage: round0(self.total_slippage_cost),
            commission: round0(self.total_commission_cost),
            tax: round0(self.total_tax_cost),
            total: round0(total),
        }
    }
}
