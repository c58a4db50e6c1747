//! Simulation engine: owns the price index and ledger and drives one of the
//! position-management policies across the trading calendar.
//!
//! The engine is single-threaded and deterministic. It performs no I/O; a
//! caller needing parallel backtests constructs one engine per run.

use chrono::NaiveDate;
use std::collections::HashMap;

use super::bar::{BenchmarkBar, PriceBar};
use super::cost::CostConfig;
use super::error::SimError;
use super::ledger::Ledger;
use super::metrics::sample_stdev;
use super::price_index::PriceIndex;
use super::strategy::{Signal, SignalAction, Strategy};

pub struct Engine {
    pub initial_capital: f64,
    pub cost: CostConfig,
    pub ledger: Ledger,
    pub index: PriceIndex,
    pub names: HashMap<String, String>,
    pub benchmark: Vec<BenchmarkBar>,
}

impl Engine {
    pub fn new(initial_capital: f64, cost: CostConfig) -> Self {
        Engine {
            initial_capital,
            cost,
            ledger: Ledger::new(initial_capital, cost),
            index: PriceIndex::new(),
            names: HashMap::new(),
            benchmark: Vec::new(),
        }
    }

    /// Supply the price series for a ticker, overwriting any previous series.
    /// An empty `name` leaves the display name as the ticker code.
    pub fn add_price_series(
        &mut self,
        ticker: &str,
        bars: Vec<PriceBar>,
        name: &str,
    ) -> Result<(), SimError> {
        self.index.add_series(ticker, bars)?;
        if !name.is_empty() {
            self.names.insert(ticker.to_string(), name.to_string());
        }
        Ok(())
    }

    pub fn set_benchmark(&mut self, mut bars: Vec<BenchmarkBar>) {
        bars.sort_by_key(|b| b.date);
        self.benchmark = bars;
    }

    pub fn display_name<'a>(&'a self, ticker: &'a str) -> &'a str {
        self.names.get(ticker).map(|s| s.as_str()).unwrap_or(ticker)
    }

    /// Run `strategy` over `tickers` within the optional `[start, end]`
    /// window. The custom-signal policy is driven by its signal feed and
    /// ignores `tickers` and the window.
    pub fn run(
        &mut self,
        strategy: &Strategy,
        tickers: &[String],
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Result<(), SimError> {
        strategy.validate()?;
        match strategy {
            Strategy::EqualWeight => self.run_equal_weight(tickers, start, end),
            Strategy::Rebalance { period } => self.run_rebalance(tickers, start, end, *period),
            Strategy::Custom { signals } => self.run_custom(signals),
            Strategy::VolatilityTrailingStop {
                lookback,
                stop_pct,
                cooldown,
                reentry,
            } => self.run_volatility_trailing_stop(
                tickers, start, end, *lookback, *stop_pct, *cooldown, *reentry,
            ),
            Strategy::MaFilter {
                ma_period,
                rebalance_period,
            } => self.run_ma_filter(tickers, start, end, *ma_period, *rebalance_period),
            Strategy::Composite {
                ma_period,
                lookback,
                stop_pct,
                cooldown,
                rebalance_period,
            } => self.run_composite(
                tickers,
                start,
                end,
                *ma_period,
                *lookback,
                *stop_pct,
                *cooldown,
                *rebalance_period,
            ),
        }
        Ok(())
    }

    /// Trading dates restricted to the window.
    fn window_dates(&self, start: Option<NaiveDate>, end: Option<NaiveDate>) -> Vec<NaiveDate> {
        self.index
            .trading_dates()
            .into_iter()
            .filter(|d| start.is_none_or(|s| *d >= s) && end.is_none_or(|e| *d <= e))
            .collect()
    }

    /// Requested tickers that actually have bars, in request order.
    fn valid_tickers(&self, tickers: &[String]) -> Vec<String> {
        tickers
            .iter()
            .filter(|t| self.index.has_bars(t))
            .cloned()
            .collect()
    }

    fn run_equal_weight(
        &mut self,
        tickers: &[String],
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) {
        let dates = self.window_dates(start, end);
        let valid = self.valid_tickers(tickers);
        if dates.is_empty() || valid.is_empty() {
            return;
        }

        let alloc = self.initial_capital / valid.len() as f64;
        let buy_date = dates[0];
        for ticker in &valid {
            if let Some(price) = self.index.close_on(ticker, buy_date) {
                if price > 0.0 {
                    let shares = self.cost.affordable_shares(alloc, price);
                    let name = self.display_name(ticker).to_string();
                    self.ledger.buy(ticker, price, shares, buy_date, &name);
                }
            }
        }

        for &date in &dates {
            let prices = self.index.last_known_prices(date);
            self.ledger.snapshot(date, &prices);
        }
    }

    fn run_rebalance(
        &mut self,
        tickers: &[String],
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
        period: usize,
    ) {
        let dates = self.window_dates(start, end);
        let valid = self.valid_tickers(tickers);
        if dates.is_empty() || valid.is_empty() {
            return;
        }

        let mut last_rebalance = -(period as i64);
        for (i, &date) in dates.iter().enumerate() {
            let prices = self.index.last_known_prices(date);

            if i as i64 - last_rebalance >= period as i64 {
                self.ledger.sell_all(&prices, date);
                let equity = self.ledger.equity(&prices);
                let alloc = equity / valid.len() as f64;
                for ticker in &valid {
                    if let Some(&price) = prices.get(ticker) {
                        if price > 0.0 {
                            let shares = self.cost.affordable_shares(alloc, price);
                            let name = self.display_name(ticker).to_string();
                            self.ledger.buy(ticker, price, shares, date, &name);
                        }
                    }
                }
                last_rebalance = i as i64;
            }

            self.ledger.snapshot(date, &prices);
        }
    }

    fn run_custom(&mut self, signals: &[Signal]) {
        let dates = self.index.trading_dates();
        if dates.is_empty() {
            return;
        }

        let mut signal_map: HashMap<NaiveDate, Vec<&Signal>> = HashMap::new();
        for sig in signals {
            signal_map.entry(sig.date).or_default().push(sig);
        }

        for &date in &dates {
            let prices = self.index.last_known_prices(date);

            if let Some(day_signals) = signal_map.get(&date) {
                for sig in day_signals {
                    match sig.action {
                        SignalAction::Buy => {
                            if let Some(&price) = prices.get(&sig.ticker) {
                                let equity = self.ledger.equity(&prices);
                                let alloc = equity * sig.weight;
                                let shares = self.cost.affordable_shares(alloc, price);
                                let name = self.display_name(&sig.ticker).to_string();
                                self.ledger.buy(&sig.ticker, price, shares, date, &name);
                            }
                        }
                        SignalAction::Sell => {
                            let held = self.ledger.positions.get(&sig.ticker).map(|p| p.shares);
                            if let (Some(shares), Some(&price)) =
                                (held, prices.get(&sig.ticker))
                            {
                                self.ledger.sell(&sig.ticker, price, shares, date);
                            }
                        }
                    }
                }
            }

            self.ledger.snapshot(date, &prices);
        }
    }

    fn run_volatility_trailing_stop(
        &mut self,
        tickers: &[String],
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
        lookback: usize,
        stop_pct: f64,
        cooldown: usize,
        reentry: bool,
    ) {
        let dates = self.window_dates(start, end);
        let valid = self.valid_tickers(tickers);
        if dates.is_empty() || valid.is_empty() {
            return;
        }

        let mut state = TrailingState::new(&valid, cooldown);
        let mut initial_buy_done = false;

        for (i, &date) in dates.iter().enumerate() {
            let day = i as i64;
            let prices = self.index.last_known_prices(date);

            state.check_stops(&mut self.ledger, &valid, &prices, date, day, stop_pct);

            let buyable: Vec<String> = valid
                .iter()
                .filter(|t| {
                    if state.is_holding(t) {
                        return false;
                    }
                    if !reentry && state.was_stopped(t) && initial_buy_done {
                        return false;
                    }
                    if state.in_cooldown(t, day, cooldown) {
                        return false;
                    }
                    prices.get(*t).is_some_and(|&p| p > 0.0)
                })
                .cloned()
                .collect();

            if self.buy_inverse_vol(&buyable, &prices, date, lookback, &mut state) {
                initial_buy_done = true;
            }

            self.ledger.snapshot(date, &prices);
        }
    }

    fn run_ma_filter(
        &mut self,
        tickers: &[String],
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
        ma_period: usize,
        rebalance_period: usize,
    ) {
        let dates = self.window_dates(start, end);
        let valid = self.valid_tickers(tickers);
        if dates.is_empty() || valid.is_empty() {
            return;
        }

        let mut last_check = -(rebalance_period as i64);
        for (i, &date) in dates.iter().enumerate() {
            let prices = self.index.last_known_prices(date);

            if i as i64 - last_check >= rebalance_period as i64 {
                last_check = i as i64;

                let (above_ma, below_ma) = self.ma_split(&valid, date, ma_period);

                for ticker in &below_ma {
                    let held = self.ledger.positions.get(ticker).map(|p| p.shares);
                    if let (Some(shares), Some(&price)) = (held, prices.get(ticker)) {
                        self.ledger.sell(ticker, price, shares, date);
                    }
                }

                if !above_ma.is_empty() {
                    let equity = self.ledger.equity(&prices);
                    let target_alloc = equity / above_ma.len() as f64;

                    for ticker in &above_ma {
                        let Some(&price) = prices.get(ticker) else {
                            continue;
                        };
                        if price <= 0.0 {
                            continue;
                        }
                        let current_value = self
                            .ledger
                            .positions
                            .get(ticker)
                            .map(|p| p.shares as f64 * price)
                            .unwrap_or(0.0);
                        let diff = target_alloc - current_value;

                        // Dead band of two days' worth of share price to avoid
                        // churn from rounding drift.
                        if diff > price * 2.0 {
                            let shares = self.cost.affordable_shares(diff, price);
                            if shares > 0 {
                                let name = self.display_name(ticker).to_string();
                                self.ledger.buy(ticker, price, shares, date, &name);
                            }
                        } else if diff < -price * 2.0
                            && self.ledger.positions.contains_key(ticker)
                        {
                            let sell_shares = (diff.abs() / price).floor() as i64;
                            if sell_shares > 0 {
                                self.ledger.sell(ticker, price, sell_shares, date);
                            }
                        }
                    }
                }
            }

            self.ledger.snapshot(date, &prices);
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn run_composite(
        &mut self,
        tickers: &[String],
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
        ma_period: usize,
        lookback: usize,
        stop_pct: f64,
        cooldown: usize,
        rebalance_period: usize,
    ) {
        let dates = self.window_dates(start, end);
        let valid = self.valid_tickers(tickers);
        if dates.is_empty() || valid.is_empty() {
            return;
        }

        let mut state = TrailingState::new(&valid, cooldown);
        let mut last_rebalance = -(rebalance_period as i64);

        for (i, &date) in dates.iter().enumerate() {
            let day = i as i64;
            let prices = self.index.last_known_prices(date);

            // Trailing stop runs daily; the filters only on the cadence.
            state.check_stops(&mut self.ledger, &valid, &prices, date, day, stop_pct);

            if day - last_rebalance >= rebalance_period as i64 {
                last_rebalance = day;

                let (above_ma, below_ma) = self.ma_split(&valid, date, ma_period);

                for ticker in &below_ma {
                    if !state.is_holding(ticker) {
                        continue;
                    }
                    let held = self.ledger.positions.get(ticker).map(|p| p.shares);
                    if let (Some(shares), Some(&price)) = (held, prices.get(ticker)) {
                        self.ledger.sell(ticker, price, shares, date);
                    }
                    state.mark_sold(ticker, day);
                }

                let buyable: Vec<String> = above_ma
                    .iter()
                    .filter(|t| {
                        !state.is_holding(t)
                            && !state.in_cooldown(t, day, cooldown)
                            && prices.get(*t).is_some_and(|&p| p > 0.0)
                    })
                    .cloned()
                    .collect();

                self.buy_inverse_vol(&buyable, &prices, date, lookback, &mut state);
            }

            self.ledger.snapshot(date, &prices);
        }
    }

    /// Split `valid` into tickers trading above/below their `ma_period` SMA as
    /// of `date`. Tickers with some history but fewer than `ma_period` closes
    /// default to "above" (keep/buy) rather than being excluded.
    fn ma_split(
        &self,
        valid: &[String],
        date: NaiveDate,
        ma_period: usize,
    ) -> (Vec<String>, Vec<String>) {
        let mut above = Vec::new();
        let mut below = Vec::new();
        for ticker in valid {
            let bars = self.index.bars_through(ticker, date);
            if bars.len() >= ma_period {
                let tail = &bars[bars.len() - ma_period..];
                let ma = tail.iter().map(|b| b.close).sum::<f64>() / ma_period as f64;
                let current = bars[bars.len() - 1].close;
                if current > ma {
                    above.push(ticker.clone());
                } else {
                    below.push(ticker.clone());
                }
            } else if !bars.is_empty() {
                above.push(ticker.clone());
            }
        }
        (above, below)
    }

    /// Inverse realized volatility over the trailing `lookback` daily returns,
    /// floored to avoid division by zero. Tickers with fewer than two return
    /// samples weigh 1.0.
    fn inverse_vols(
        &self,
        buyable: &[String],
        date: NaiveDate,
        lookback: usize,
    ) -> Vec<(String, f64)> {
        buyable
            .iter()
            .map(|ticker| {
                let bars = self.index.bars_through(ticker, date);
                let tail = &bars[bars.len().saturating_sub(lookback + 1)..];
                let inv = if tail.len() >= 2 {
                    let returns: Vec<f64> = tail
                        .windows(2)
                        .map(|w| w[1].close / w[0].close - 1.0)
                        .collect();
                    let vol = if returns.len() > 1 {
                        sample_stdev(&returns)
                    } else {
                        1.0
                    };
                    1.0 / vol.max(1e-8)
                } else {
                    1.0
                };
                (ticker.clone(), inv)
            })
            .collect()
    }

    /// Spend the currently available cash across `buyable` in proportion to
    /// normalized inverse volatility. Sequential buys compete for the same
    /// cash pool. Returns whether any order filled.
    fn buy_inverse_vol(
        &mut self,
        buyable: &[String],
        prices: &HashMap<String, f64>,
        date: NaiveDate,
        lookback: usize,
        state: &mut TrailingState,
    ) -> bool {
        if buyable.is_empty() {
            return false;
        }

        let inv_vols = self.inverse_vols(buyable, date, lookback);
        let total_inv: f64 = inv_vols.iter().map(|(_, v)| v).sum();
        let available = self.ledger.cash;
        let mut bought_any = false;

        for (ticker, inv) in &inv_vols {
            let weight = if total_inv > 0.0 {
                inv / total_inv
            } else {
                1.0 / inv_vols.len() as f64
            };
            let alloc = available * weight;
            if alloc <= 0.0 {
                continue;
            }
            let Some(&price) = prices.get(ticker) else {
                continue;
            };
            let shares = self.cost.affordable_shares(alloc, price);
            if shares > 0 {
                let name = self.display_name(ticker).to_string();
                if self.ledger.buy(ticker, price, shares, date, &name) > 0 {
                    state.mark_bought(ticker, price);
                    bought_any = true;
                }
            }
        }
        bought_any
    }
}

/// Per-ticker trailing-stop bookkeeping shared by the volatility and
/// composite policies: running peak since entry, holding flag, and the day
/// index of the last stop-out for cooldown checks.
struct TrailingState {
    peaks: HashMap<String, f64>,
    sold_day: HashMap<String, i64>,
    holding: HashMap<String, bool>,
}

impl TrailingState {
    fn new(tickers: &[String], cooldown: usize) -> Self {
        let mut sold_day = HashMap::new();
        let mut holding = HashMap::new();
        for t in tickers {
            sold_day.insert(t.clone(), -(cooldown as i64) - 1);
            holding.insert(t.clone(), false);
        }
        TrailingState {
            peaks: HashMap::new(),
            sold_day,
            holding,
        }
    }

    fn is_holding(&self, ticker: &str) -> bool {
        self.holding.get(ticker).copied().unwrap_or(false)
    }

    fn was_stopped(&self, ticker: &str) -> bool {
        self.sold_day.get(ticker).copied().unwrap_or(-1) >= 0
    }

    fn in_cooldown(&self, ticker: &str, day: i64, cooldown: usize) -> bool {
        let sold = self.sold_day.get(ticker).copied().unwrap_or(i64::MIN / 2);
        day - sold <= cooldown as i64
    }

    fn mark_sold(&mut self, ticker: &str, day: i64) {
        self.holding.insert(ticker.to_string(), false);
        self.sold_day.insert(ticker.to_string(), day);
    }

    fn mark_bought(&mut self, ticker: &str, price: f64) {
        self.holding.insert(ticker.to_string(), true);
        self.peaks.insert(ticker.to_string(), price);
    }

    /// Force-sell any held ticker that fell `stop_pct` below its running peak.
    fn check_stops(
        &mut self,
        ledger: &mut Ledger,
        valid: &[String],
        prices: &HashMap<String, f64>,
        date: NaiveDate,
        day: i64,
        stop_pct: f64,
    ) {
        for ticker in valid {
            if !self.is_holding(ticker) {
                continue;
            }
            let Some(&price) = prices.get(ticker) else {
                continue;
            };
            let peak = self.peaks.entry(ticker.clone()).or_insert(0.0);
            if price > *peak {
                *peak = price;
            }
            let peak = if *peak > 0.0 { *peak } else { price };
            if peak > 0.0 {
                let drop_pct = (price / peak - 1.0) * 100.0;
                if drop_pct <= stop_pct {
                    if let Some(shares) = ledger.positions.get(ticker).map(|p| p.shares) {
                        ledger.sell(ticker, price, shares, date);
                    }
                    self.mark_sold(ticker, day);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, m, d).unwrap()
    }

    fn bar(d: NaiveDate, close: f64) -> PriceBar {
        PriceBar {
            date: d,
            open: close,
            high: close,
            low: close,
            close,
            volume: 10_000,
        }
    }

    fn flat_series(days: u32, close: f64) -> Vec<PriceBar> {
        (0..days).map(|i| bar(date(1, 2 + i), close)).collect()
    }

    fn series(closes: &[f64]) -> Vec<PriceBar> {
        closes
            .iter()
            .enumerate()
            .map(|(i, &c)| bar(date(1, 2 + i as u32), c))
            .collect()
    }

    fn tickers(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn display_name_falls_back_to_ticker() {
        let mut engine = Engine::new(1_000_000.0, CostConfig::default());
        engine.add_price_series("A", flat_series(1, 100.0), "Alpha").unwrap();
        assert_eq!(engine.display_name("A"), "Alpha");
        assert_eq!(engine.display_name("B"), "B");
    }

    #[test]
    fn equal_weight_flat_market_preserves_capital() {
        let mut engine = Engine::new(1_000_000.0, CostConfig::default());
        engine.add_price_series("A", flat_series(3, 100.0), "").unwrap();
        engine.add_price_series("B", flat_series(3, 100.0), "").unwrap();

        engine
            .run(&Strategy::EqualWeight, &tickers(&["A", "B"]), None, None)
            .unwrap();

        // 500_000 per ticker at 100 with zero costs: 5_000 shares each.
        assert_eq!(engine.ledger.trades.len(), 2);
        assert_eq!(engine.ledger.trades[0].shares, 5_000);
        assert_eq!(engine.ledger.trades[1].shares, 5_000);
        assert!(engine.ledger.cash.abs() < 1e-9);

        assert_eq!(engine.ledger.equity_history.len(), 3);
        for snap in &engine.ledger.equity_history {
            assert!((snap.equity - 1_000_000.0).abs() < 1e-9);
        }
    }

    #[test]
    fn equal_weight_skips_unknown_tickers() {
        let mut engine = Engine::new(1_000_000.0, CostConfig::default());
        engine.add_price_series("A", flat_series(3, 100.0), "").unwrap();

        engine
            .run(&Strategy::EqualWeight, &tickers(&["A", "GHOST"]), None, None)
            .unwrap();

        // Full capital goes to the one valid ticker.
        assert_eq!(engine.ledger.trades.len(), 1);
        assert_eq!(engine.ledger.trades[0].shares, 10_000);
    }

    #[test]
    fn empty_universe_produces_no_history() {
        let mut engine = Engine::new(1_000_000.0, CostConfig::default());
        engine
            .run(&Strategy::EqualWeight, &tickers(&["GHOST"]), None, None)
            .unwrap();
        assert!(engine.ledger.equity_history.is_empty());
        assert!(engine.ledger.trades.is_empty());
    }

    #[test]
    fn window_restricts_trading_dates() {
        let mut engine = Engine::new(1_000_000.0, CostConfig::default());
        engine.add_price_series("A", flat_series(5, 100.0), "").unwrap();

        engine
            .run(
                &Strategy::EqualWeight,
                &tickers(&["A"]),
                Some(date(1, 3)),
                Some(date(1, 5)),
            )
            .unwrap();

        assert_eq!(engine.ledger.equity_history.len(), 3);
        assert_eq!(engine.ledger.equity_history[0].date, date(1, 3));
        assert_eq!(engine.ledger.equity_history[2].date, date(1, 5));
    }

    #[test]
    fn snapshots_are_strictly_increasing_by_date() {
        let mut engine = Engine::new(1_000_000.0, CostConfig::default());
        engine.add_price_series("A", series(&[100.0, 101.0, 99.0, 102.0]), "").unwrap();
        engine.add_price_series("B", series(&[50.0, 52.0, 51.0, 53.0]), "").unwrap();

        engine
            .run(&Strategy::Rebalance { period: 2 }, &tickers(&["A", "B"]), None, None)
            .unwrap();

        let history = &engine.ledger.equity_history;
        assert_eq!(history.len(), 4);
        for pair in history.windows(2) {
            assert!(pair[0].date < pair[1].date);
        }
    }

    #[test]
    fn rebalance_sells_and_rebuys_on_cadence() {
        let mut engine = Engine::new(1_000_000.0, CostConfig::default());
        engine.add_price_series("A", series(&[100.0, 100.0, 100.0, 100.0]), "").unwrap();

        engine
            .run(&Strategy::Rebalance { period: 2 }, &tickers(&["A"]), None, None)
            .unwrap();

        // Rebalances on day 0 and day 2; the day-2 pass sells the original
        // lot and rebuys, so there are two buy records, the first closed.
        assert_eq!(engine.ledger.trades.len(), 2);
        assert!(!engine.ledger.trades[0].is_open());
        assert!(engine.ledger.trades[1].is_open());
    }

    #[test]
    fn custom_signals_buy_and_sell() {
        let mut engine = Engine::new(1_000_000.0, CostConfig::default());
        engine.add_price_series("A", series(&[100.0, 110.0, 120.0]), "").unwrap();

        let signals = vec![
            Signal {
                date: date(1, 2),
                ticker: "A".into(),
                action: SignalAction::Buy,
                weight: 0.5,
            },
            Signal {
                date: date(1, 4),
                ticker: "A".into(),
                action: SignalAction::Sell,
                weight: 0.0,
            },
        ];
        engine
            .run(&Strategy::Custom { signals }, &[], None, None)
            .unwrap();

        assert_eq!(engine.ledger.trades.len(), 1);
        let trade = &engine.ledger.trades[0];
        assert_eq!(trade.shares, 5_000);
        assert!(!trade.is_open());
        assert_eq!(trade.exit_date, Some(date(1, 4)));
        // Bought 5_000 at 100, sold at 120: +100_000 on 1_000_000.
        assert!((engine.ledger.cash - 1_100_000.0).abs() < 1e-9);
    }

    #[test]
    fn custom_signal_for_unpriced_ticker_is_skipped() {
        let mut engine = Engine::new(1_000_000.0, CostConfig::default());
        engine.add_price_series("A", flat_series(2, 100.0), "").unwrap();

        let signals = vec![Signal {
            date: date(1, 2),
            ticker: "GHOST".into(),
            action: SignalAction::Buy,
            weight: 0.5,
        }];
        engine
            .run(&Strategy::Custom { signals }, &[], None, None)
            .unwrap();
        assert!(engine.ledger.trades.is_empty());
        assert_eq!(engine.ledger.equity_history.len(), 2);
    }

    #[test]
    fn trailing_stop_triggers_after_peak_drop() {
        // Prices [100, 120, 90] with stop at -10%: peak is 120 after day 2,
        // day 3 is (90/120 - 1) * 100 = -25% which breaches the stop.
        let mut engine = Engine::new(1_000_000.0, CostConfig::default());
        engine.add_price_series("A", series(&[100.0, 120.0, 90.0]), "").unwrap();

        engine
            .run(
                &Strategy::VolatilityTrailingStop {
                    lookback: 20,
                    stop_pct: -10.0,
                    cooldown: 5,
                    reentry: true,
                },
                &tickers(&["A"]),
                None,
                None,
            )
            .unwrap();

        assert_eq!(engine.ledger.trades.len(), 1);
        let trade = &engine.ledger.trades[0];
        assert!(!trade.is_open());
        assert_eq!(trade.entry_date, date(1, 2));
        assert_eq!(trade.exit_date, Some(date(1, 4)));
        assert!(engine.ledger.positions.is_empty());
    }

    #[test]
    fn cooldown_blocks_reentry() {
        // Stop-out on day 3; cooldown of 5 covers the remaining days, so the
        // position is never re-entered.
        let mut engine = Engine::new(1_000_000.0, CostConfig::default());
        engine.add_price_series(
            "A",
            series(&[100.0, 120.0, 90.0, 95.0, 100.0, 105.0]),
            "",
        ).unwrap();

        engine
            .run(
                &Strategy::VolatilityTrailingStop {
                    lookback: 20,
                    stop_pct: -10.0,
                    cooldown: 5,
                    reentry: true,
                },
                &tickers(&["A"]),
                None,
                None,
            )
            .unwrap();

        assert_eq!(engine.ledger.trades.len(), 1);
        assert!(engine.ledger.positions.is_empty());
    }

    #[test]
    fn reentry_false_blocks_after_stop_forever() {
        // Cooldown of 1 would allow re-entry from day 5, but reentry=false
        // keeps a stopped ticker out for good.
        let mut engine = Engine::new(1_000_000.0, CostConfig::default());
        engine.add_price_series(
            "A",
            series(&[100.0, 120.0, 90.0, 95.0, 100.0, 105.0, 110.0]),
            "",
        ).unwrap();

        engine
            .run(
                &Strategy::VolatilityTrailingStop {
                    lookback: 20,
                    stop_pct: -10.0,
                    cooldown: 1,
                    reentry: false,
                },
                &tickers(&["A"]),
                None,
                None,
            )
            .unwrap();

        assert_eq!(engine.ledger.trades.len(), 1);
        assert!(engine.ledger.positions.is_empty());
    }

    #[test]
    fn inverse_vol_weights_favor_the_quiet_ticker() {
        // A is flat, B swings. Starting the window after four days of history
        // lets the sizing see real volatility, so A gets nearly all the cash.
        let mut engine = Engine::new(1_000_000.0, CostConfig::default());
        engine.add_price_series("A", series(&[100.0, 100.0, 100.0, 100.0, 100.0]), "").unwrap();
        engine.add_price_series("B", series(&[100.0, 130.0, 80.0, 120.0, 100.0]), "").unwrap();

        engine
            .run(
                &Strategy::VolatilityTrailingStop {
                    lookback: 20,
                    stop_pct: -90.0,
                    cooldown: 0,
                    reentry: true,
                },
                &tickers(&["A", "B"]),
                Some(date(1, 6)),
                None,
            )
            .unwrap();

        let a_shares: i64 = engine
            .ledger
            .trades
            .iter()
            .filter(|t| t.ticker == "A")
            .map(|t| t.shares)
            .sum();
        let b_shares: i64 = engine
            .ledger
            .trades
            .iter()
            .filter(|t| t.ticker == "B")
            .map(|t| t.shares)
            .sum();
        assert!(a_shares > b_shares);
    }

    #[test]
    fn ma_filter_sells_below_ma_and_holds_above() {
        // Downtrending ticker ends below its 3-day MA and gets force-sold at
        // the next rebalance; the uptrending one is held.
        let mut engine = Engine::new(1_000_000.0, CostConfig::default());
        engine.add_price_series(
            "UP",
            series(&[100.0, 102.0, 104.0, 106.0, 108.0, 110.0]),
            "",
        ).unwrap();
        engine.add_price_series(
            "DOWN",
            series(&[100.0, 98.0, 96.0, 94.0, 92.0, 90.0]),
            "",
        ).unwrap();

        engine
            .run(
                &Strategy::MaFilter {
                    ma_period: 3,
                    rebalance_period: 3,
                },
                &tickers(&["UP", "DOWN"]),
                None,
                None,
            )
            .unwrap();

        assert!(engine.ledger.positions.contains_key("UP"));
        assert!(!engine.ledger.positions.contains_key("DOWN"));
        let down_closed = engine
            .ledger
            .trades
            .iter()
            .any(|t| t.ticker == "DOWN" && !t.is_open());
        assert!(down_closed);
    }

    #[test]
    fn ma_filter_short_history_defaults_to_buy() {
        let mut engine = Engine::new(1_000_000.0, CostConfig::default());
        engine.add_price_series("A", flat_series(2, 100.0), "").unwrap();

        engine
            .run(
                &Strategy::MaFilter {
                    ma_period: 20,
                    rebalance_period: 5,
                },
                &tickers(&["A"]),
                None,
                None,
            )
            .unwrap();

        // Fewer than ma_period closes still counts as "above MA".
        assert!(engine.ledger.positions.contains_key("A"));
    }

    #[test]
    fn ma_filter_dead_band_avoids_churn() {
        // Single gently-rising ticker: fully invested after the first buy,
        // the target/value drift never exceeds two days' share price, so
        // later rebalances leave the position alone.
        let mut engine = Engine::new(1_000_000.0, CostConfig::default());
        engine.add_price_series(
            "A",
            series(&[100.0, 101.0, 102.0, 103.0, 104.0, 105.0, 106.0, 107.0]),
            "",
        ).unwrap();

        engine
            .run(
                &Strategy::MaFilter {
                    ma_period: 2,
                    rebalance_period: 2,
                },
                &tickers(&["A"]),
                None,
                None,
            )
            .unwrap();

        assert_eq!(engine.ledger.trades.len(), 1);
    }

    #[test]
    fn composite_applies_stop_and_filters() {
        // A crashes after a run-up: the daily trailing stop kicks it out even
        // between rebalances; B keeps trending and is held to the end.
        let mut engine = Engine::new(1_000_000.0, CostConfig::default());
        engine.add_price_series(
            "A",
            series(&[100.0, 110.0, 120.0, 80.0, 78.0, 76.0, 75.0]),
            "",
        ).unwrap();
        engine.add_price_series(
            "B",
            series(&[50.0, 51.0, 52.0, 53.0, 54.0, 55.0, 56.0]),
            "",
        ).unwrap();

        engine
            .run(
                &Strategy::Composite {
                    ma_period: 3,
                    lookback: 5,
                    stop_pct: -8.0,
                    cooldown: 10,
                    rebalance_period: 2,
                },
                &tickers(&["A", "B"]),
                None,
                None,
            )
            .unwrap();

        assert!(!engine.ledger.positions.contains_key("A"));
        assert!(engine.ledger.positions.contains_key("B"));
        let a_trade = engine
            .ledger
            .trades
            .iter()
            .find(|t| t.ticker == "A")
            .unwrap();
        assert!(!a_trade.is_open());
    }

    #[test]
    fn cash_conservation_against_snapshots() {
        let mut engine = Engine::new(1_000_000.0, CostConfig {
            slippage_pct: 0.3,
            commission_pct: 0.015,
            tax_pct: 0.20,
        });
        engine.add_price_series("A", series(&[100.0, 104.0, 97.0, 103.0, 99.0]), "").unwrap();
        engine.add_price_series("B", series(&[200.0, 190.0, 210.0, 205.0, 220.0]), "").unwrap();

        engine
            .run(&Strategy::Rebalance { period: 2 }, &tickers(&["A", "B"]), None, None)
            .unwrap();

        // Every snapshot equals cash plus marked positions at that date.
        for snap in engine.ledger.equity_history.clone() {
            let prices = engine.index.last_known_prices(snap.date);
            assert!((snap.invested + snap.cash - snap.equity).abs() < 1e-6);
            assert!(snap.equity <= 1_000_000.0 + 1e-6 || prices.len() == 2);
        }
    }
}
