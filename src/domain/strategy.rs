//! Strategy selection: a closed set of policy kinds with their parameter
//! bundles, validated up front instead of dispatched by name at run time.

use chrono::NaiveDate;
use serde::Serialize;

use super::error::SimError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalAction {
    Buy,
    Sell,
}

/// One externally supplied trading instruction for the custom-signal policy.
#[derive(Debug, Clone, PartialEq)]
pub struct Signal {
    pub date: NaiveDate,
    pub ticker: String,
    pub action: SignalAction,
    /// Fraction of current total equity to allocate on a buy.
    pub weight: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Strategy {
    /// Allocate capital equally across the basket on the first date and hold.
    EqualWeight,
    /// Every `period` trading days, liquidate and redistribute equity equally.
    Rebalance { period: usize },
    /// Follow an externally supplied signal feed.
    Custom { signals: Vec<Signal> },
    /// Inverse-volatility sizing with a trailing stop and re-entry cooldown.
    VolatilityTrailingStop {
        lookback: usize,
        stop_pct: f64,
        cooldown: usize,
        reentry: bool,
    },
    /// Hold only tickers whose close sits above their moving average.
    MaFilter {
        ma_period: usize,
        rebalance_period: usize,
    },
    /// MA filter plus inverse-volatility sizing plus daily trailing stop.
    Composite {
        ma_period: usize,
        lookback: usize,
        stop_pct: f64,
        cooldown: usize,
        rebalance_period: usize,
    },
}

impl Strategy {
    /// Short identifier used in report file names and logs.
    pub fn name(&self) -> &'static str {
        match self {
            Strategy::EqualWeight => "equal_weight",
            Strategy::Rebalance { .. } => "rebalance",
            Strategy::Custom { .. } => "custom",
            Strategy::VolatilityTrailingStop { .. } => "vol_trailing_stop",
            Strategy::MaFilter { .. } => "ma_filter",
            Strategy::Composite { .. } => "composite",
        }
    }

    pub fn validate(&self) -> Result<(), SimError> {
        let fail = |reason: String| Err(SimError::Strategy { reason });
        match self {
            Strategy::EqualWeight => Ok(()),
            Strategy::Rebalance { period } => {
                if *period == 0 {
                    return fail("rebalance period must be at least 1".into());
                }
                Ok(())
            }
            Strategy::Custom { signals } => {
                for sig in signals {
                    if sig.weight < 0.0 {
                        return fail(format!(
                            "signal for {} on {} has negative weight",
                            sig.ticker, sig.date
                        ));
                    }
                }
                Ok(())
            }
            Strategy::VolatilityTrailingStop {
                lookback, stop_pct, ..
            } => {
                if *lookback == 0 {
                    return fail("volatility lookback must be at least 1".into());
                }
                if !stop_pct.is_finite() {
                    return fail("stop_pct must be finite".into());
                }
                Ok(())
            }
            Strategy::MaFilter {
                ma_period,
                rebalance_period,
            } => {
                if *ma_period == 0 || *rebalance_period == 0 {
                    return fail("MA and rebalance periods must be at least 1".into());
                }
                Ok(())
            }
            Strategy::Composite {
                ma_period,
                lookback,
                stop_pct,
                rebalance_period,
                ..
            } => {
                if *ma_period == 0 || *rebalance_period == 0 {
                    return fail("MA and rebalance periods must be at least 1".into());
                }
                if *lookback == 0 {
                    return fail("volatility lookback must be at least 1".into());
                }
                if !stop_pct.is_finite() {
                    return fail("stop_pct must be finite".into());
                }
                Ok(())
            }
        }
    }
}
