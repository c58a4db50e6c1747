//! Report assembly: turns a finished engine run into serializable result
//! structures, the per-trade detail table and the per-day per-ticker rows
//! used by the CSV export.

use chrono::NaiveDate;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

use super::cost::CostConfig;
use super::engine::Engine;
use super::error::SimError;
use super::ledger::CostSummary;
use super::metrics::{DrawdownPoint, Metrics, MetricsReport};
use super::rounding::{round0, round2};
use super::trade::{TradeRecord, TradeStatus};

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EquityPoint {
    pub date: NaiveDate,
    pub equity: f64,
}

/// Buy-and-hold performance of a single ticker over its own series.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StockPerformance {
    pub ticker: String,
    pub name: String,
    pub return_pct: f64,
    pub mdd: f64,
    pub start_price: f64,
    pub end_price: f64,
}

/// Benchmark series rescaled to the portfolio's starting equity.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BenchmarkReport {
    pub return_pct: f64,
    pub mdd: f64,
    pub curve: Vec<EquityPoint>,
}

/// One row of the trade history table. Cumulative fields (`avg_price`,
/// `total_buy_amount`) aggregate over all lots of the same ticker that were
/// open when this lot was entered.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TradeDetail {
    pub ticker: String,
    pub name: String,
    pub entry_date: NaiveDate,
    pub entry_price: f64,
    pub shares: i64,
    pub buy_amount: f64,
    pub avg_price: f64,
    pub total_buy_amount: f64,
    pub eval_amount: f64,
    pub eval_pnl: f64,
    pub exit_date: Option<NaiveDate>,
    pub exit_price: Option<f64>,
    pub exit_cost: f64,
    pub realized_pnl: Option<f64>,
    pub return_pct: Option<f64>,
    pub status: TradeStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DayAction {
    #[serde(rename = "BUY")]
    Buy,
    #[serde(rename = "SELL")]
    Sell,
    #[serde(rename = "BUY+SELL")]
    BuyAndSell,
    #[serde(rename = "HOLD")]
    Hold,
}

impl DayAction {
    pub fn label(&self) -> &'static str {
        match self {
            DayAction::Buy => "BUY",
            DayAction::Sell => "SELL",
            DayAction::BuyAndSell => "BUY+SELL",
            DayAction::Hold => "HOLD",
        }
    }
}

/// One ticker on one trading date, with that day's bar, any trade events and
/// the end-of-day holding and portfolio state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyRow {
    pub date: NaiveDate,
    pub ticker: String,
    pub name: String,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: i64,
    pub action: DayAction,
    pub shares_traded: i64,
    pub exec_price: f64,
    pub trade_cost: f64,
    pub holding_shares: i64,
    pub holding_value: f64,
    pub portfolio_equity: f64,
    pub portfolio_cash: f64,
}

/// The complete result payload for one backtest run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BacktestResults {
    pub equity_curve: Vec<EquityPoint>,
    pub drawdown_curve: Vec<DrawdownPoint>,
    pub metrics: Metrics,
    pub cost_summary: CostSummary,
    pub cost_config: CostConfig,
    pub stock_performance: Vec<StockPerformance>,
    pub benchmark: Option<BenchmarkReport>,
    pub trades: Vec<TradeDetail>,
    pub trades_by_stock: BTreeMap<String, Vec<TradeDetail>>,
}

/// Assemble the full results from a finished run.
///
/// Fails with `NoData` when the run produced no equity history (no trading
/// dates, empty universe) since there is nothing to report on.
pub fn build_results(engine: &Engine) -> Result<BacktestResults, SimError> {
    let history = &engine.ledger.equity_history;
    let report = MetricsReport::compute(history, &engine.ledger.trades, engine.initial_capital)
        .ok_or(SimError::NoData)?;

    let equity_curve: Vec<EquityPoint> = history
        .iter()
        .map(|s| EquityPoint {
            date: s.date,
            equity: round0(s.equity),
        })
        .collect();

    let trades = build_trade_details(engine);
    let mut trades_by_stock: BTreeMap<String, Vec<TradeDetail>> = BTreeMap::new();
    for detail in &trades {
        trades_by_stock
            .entry(detail.ticker.clone())
            .or_default()
            .push(detail.clone());
    }

    Ok(BacktestResults {
        equity_curve,
        drawdown_curve: report.drawdown_curve,
        metrics: report.metrics,
        cost_summary: engine.ledger.cost_summary(),
        cost_config: engine.cost,
        stock_performance: stock_performance(engine),
        benchmark: benchmark_report(engine, history.first(), history.last()),
        trades,
        trades_by_stock,
    })
}

/// Per-lot trade details with running per-ticker averages.
pub fn build_trade_details(engine: &Engine) -> Vec<TradeDetail> {
    struct Accum {
        total_shares: i64,
        total_cost: f64,
        total_buy_with_cost: f64,
    }
    let mut accum: HashMap<&str, Accum> = HashMap::new();
    let mut details = Vec::with_capacity(engine.ledger.trades.len());

    for t in &engine.ledger.trades {
        let buy_amount = round0(t.exec_price * t.shares as f64);

        let acc = accum.entry(t.ticker.as_str()).or_insert(Accum {
            total_shares: 0,
            total_cost: 0.0,
            total_buy_with_cost: 0.0,
        });
        acc.total_shares += t.shares;
        acc.total_cost += t.exec_price * t.shares as f64;
        acc.total_buy_with_cost += buy_amount + t.entry_cost;

        let avg_price = if acc.total_shares > 0 {
            round0(acc.total_cost / acc.total_shares as f64)
        } else {
            0.0
        };
        let total_buy_amount = round0(acc.total_buy_with_cost);

        // Open lots are marked at the last close of the series; closed lots at
        // their exit execution price.
        let eval_amount = match (t.status, t.exec_exit_price) {
            (TradeStatus::Closed, Some(exit_exec)) => round0(exit_exec * t.shares as f64),
            _ => {
                let last_close = engine
                    .index
                    .bars(&t.ticker)
                    .and_then(|bars| bars.last())
                    .map(|b| b.close)
                    .unwrap_or(0.0);
                round0(last_close * t.shares as f64)
            }
        };
        let eval_pnl = eval_amount - buy_amount;

        let realized_pnl = (!t.is_open()).then(|| round0(t.pnl));
        let return_pct = if t.is_open() {
            (buy_amount > 0.0).then(|| round2((eval_amount / buy_amount - 1.0) * 100.0))
        } else {
            Some(t.pnl_pct)
        };

        if !t.is_open() {
            acc.total_shares -= t.shares;
            acc.total_cost -= t.exec_price * t.shares as f64;
            acc.total_buy_with_cost -= buy_amount + t.entry_cost;
            if acc.total_shares <= 0 {
                accum.remove(t.ticker.as_str());
            }
        }

        details.push(TradeDetail {
            ticker: t.ticker.clone(),
            name: t.name.clone(),
            entry_date: t.entry_date,
            entry_price: round0(t.entry_price),
            shares: t.shares,
            buy_amount,
            avg_price,
            total_buy_amount,
            eval_amount,
            eval_pnl,
            exit_date: t.exit_date,
            exit_price: t.exit_price.map(round0),
            exit_cost: round0(t.exit_cost),
            realized_pnl,
            return_pct,
            status: t.status,
        });
    }
    details
}

/// Per-day, per-ticker rows over the full trading calendar. A ticker appears
/// on a date only while held or traded; between a full exit and the next buy
/// it drops out of the report.
pub fn daily_detail(engine: &Engine) -> Vec<DailyRow> {
    let trades = &engine.ledger.trades;

    let mut buy_map: HashMap<NaiveDate, HashMap<&str, Vec<&TradeRecord>>> = HashMap::new();
    let mut sell_map: HashMap<NaiveDate, HashMap<&str, Vec<&TradeRecord>>> = HashMap::new();
    for t in trades {
        buy_map
            .entry(t.entry_date)
            .or_default()
            .entry(t.ticker.as_str())
            .or_default()
            .push(t);
        if let Some(exit) = t.exit_date {
            sell_map
                .entry(exit)
                .or_default()
                .entry(t.ticker.as_str())
                .or_default()
                .push(t);
        }
    }

    let eq_map: HashMap<NaiveDate, (f64, f64)> = engine
        .ledger
        .equity_history
        .iter()
        .map(|s| (s.date, (s.equity, s.cash)))
        .collect();

    let mut holdings: HashMap<String, i64> = HashMap::new();
    let mut rows = Vec::new();

    for date in engine.index.trading_dates() {
        let (portfolio_equity, portfolio_cash) =
            eq_map.get(&date).copied().unwrap_or((0.0, 0.0));

        let day_buys = buy_map.get(&date);
        let day_sells = sell_map.get(&date);

        if let Some(buys) = day_buys {
            for (ticker, lots) in buys {
                let held = holdings.entry(ticker.to_string()).or_insert(0);
                *held += lots.iter().map(|t| t.shares).sum::<i64>();
            }
        }
        if let Some(sells) = day_sells {
            for (ticker, lots) in sells {
                let held = holdings.entry(ticker.to_string()).or_insert(0);
                *held -= lots.iter().map(|t| t.shares).sum::<i64>();
                if *held <= 0 {
                    holdings.remove(*ticker);
                }
            }
        }

        for ticker in engine.index.tickers() {
            let Some(bar) = engine.index.bar_on(ticker, date) else {
                continue;
            };
            let held_shares = holdings.get(ticker).copied().unwrap_or(0);

            let mut action = None;
            let mut shares_traded = 0;
            let mut exec_price = 0.0;
            let mut trade_cost = 0.0;

            if let Some(lots) = day_buys.and_then(|m| m.get(ticker)) {
                for t in lots {
                    action = Some(DayAction::Buy);
                    shares_traded += t.shares;
                    exec_price = t.exec_price;
                    trade_cost += t.entry_cost;
                }
            }
            if let Some(lots) = day_sells.and_then(|m| m.get(ticker)) {
                for t in lots {
                    action = Some(match action {
                        None => DayAction::Sell,
                        Some(_) => DayAction::BuyAndSell,
                    });
                    shares_traded += t.shares;
                    exec_price = t.exec_exit_price.unwrap_or(0.0);
                    trade_cost += t.exit_cost;
                }
            }
            if action.is_none() && held_shares > 0 {
                action = Some(DayAction::Hold);
            }
            let Some(action) = action else {
                continue;
            };

            rows.push(DailyRow {
                date,
                ticker: ticker.to_string(),
                name: engine.display_name(ticker).to_string(),
                open: bar.open,
                high: bar.high,
                low: bar.low,
                close: bar.close,
                volume: bar.volume,
                action,
                shares_traded,
                exec_price: round0(exec_price),
                trade_cost: round0(trade_cost),
                holding_shares: held_shares,
                holding_value: round0(held_shares as f64 * bar.close),
                portfolio_equity: round0(portfolio_equity),
                portfolio_cash: round0(portfolio_cash),
            });
        }
    }
    rows
}

/// Buy-and-hold stats per ticker, best return first. Tickers with fewer than
/// two bars are skipped.
fn stock_performance(engine: &Engine) -> Vec<StockPerformance> {
    let mut perf = Vec::new();
    for ticker in engine.index.tickers() {
        let Some(bars) = engine.index.bars(ticker) else {
            continue;
        };
        if bars.len() < 2 {
            continue;
        }
        let first_close = bars[0].close;
        let last_close = bars[bars.len() - 1].close;
        let return_pct = if first_close > 0.0 {
            (last_close / first_close - 1.0) * 100.0
        } else {
            0.0
        };

        let mut peak = first_close;
        let mut mdd = 0.0;
        for bar in bars {
            if bar.close > peak {
                peak = bar.close;
            }
            let dd = if peak > 0.0 {
                (bar.close / peak - 1.0) * 100.0
            } else {
                0.0
            };
            if dd < mdd {
                mdd = dd;
            }
        }

        perf.push(StockPerformance {
            ticker: ticker.to_string(),
            name: engine.display_name(ticker).to_string(),
            return_pct: round2(return_pct),
            mdd: round2(mdd),
            start_price: round0(first_close),
            end_price: round0(last_close),
        });
    }
    // Stable sort keeps the ticker order for equal returns.
    perf.sort_by(|a, b| b.return_pct.total_cmp(&a.return_pct));
    perf
}

/// Benchmark return, drawdown and equity-rescaled curve over the run window.
fn benchmark_report(
    engine: &Engine,
    first: Option<&super::ledger::EquitySnapshot>,
    last: Option<&super::ledger::EquitySnapshot>,
) -> Option<BenchmarkReport> {
    let (first, last) = (first?, last?);
    let window: Vec<_> = engine
        .benchmark
        .iter()
        .filter(|b| b.date >= first.date && b.date <= last.date)
        .collect();
    let base = window.first()?.close;
    if base <= 0.0 {
        return None;
    }

    let return_pct = (window[window.len() - 1].close / base - 1.0) * 100.0;
    let start_equity = first.equity;
    let curve = window
        .iter()
        .map(|b| EquityPoint {
            date: b.date,
            equity: round0(start_equity * b.close / base),
        })
        .collect();

    let mut peak = base;
    let mut mdd = 0.0;
    for b in &window {
        if b.close > peak {
            peak = b.close;
        }
        let dd = (b.close / peak - 1.0) * 100.0;
        if dd < mdd {
            mdd = dd;
        }
    }

    Some(BenchmarkReport {
        return_pct: round2(return_pct),
        mdd: round2(mdd),
        curve,
    })
}
