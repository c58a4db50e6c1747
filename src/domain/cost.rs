//! Transaction cost model: slippage, commission and transaction tax.
//!
//! Slippage and commission apply on both sides of a trade; the tax applies
//! only when selling. All rates are percentages of the executed notional.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CostConfig {
    pub slippage_pct: f64,
    pub commission_pct: f64,
    pub tax_pct: f64,
}

impl Default for CostConfig {
    fn default() -> Self {
        CostConfig {
            slippage_pct: 0.0,
            commission_pct: 0.0,
            tax_pct: 0.0,
        }
    }
}

impl CostConfig {
    /// Buy execution price: the buyer pays a slippage-worsened (higher) price.
    pub fn buy_exec_price(&self, quote: f64) -> f64 {
        quote * (1.0 + self.slippage_pct / 100.0)
    }

    /// Sell execution price: the seller receives a slippage-worsened (lower) price.
    pub fn sell_exec_price(&self, quote: f64) -> f64 {
        quote * (1.0 - self.slippage_pct / 100.0)
    }

    /// Commission on an executed notional amount.
    pub fn commission(&self, gross: f64) -> f64 {
        gross * (self.commission_pct / 100.0)
    }

    /// Transaction tax on an executed notional amount (sell side only).
    pub fn tax(&self, gross: f64) -> f64 {
        gross * (self.tax_pct / 100.0)
    }

    /// Largest whole number of shares purchasable with `alloc`, accounting for
    /// slippage on the quote and commission on the executed notional.
    pub fn affordable_shares(&self, alloc: f64, quote: f64) -> i64 {
        if quote <= 0.0 || alloc <= 0.0 {
            return 0;
        }
        let exec = self.buy_exec_price(quote);
        (alloc / (exec * (1.0 + self.commission_pct / 100.0))).floor() as i64
    }
}
