//! Rounding helpers shared by the ledger and reporting code.
//!
//! Recorded prices and costs are rounded the same way the external report
//! consumers expect: whole currency units for amounts, one decimal for
//! execution prices, two decimals for percentages.

pub(crate) fn round0(v: f64) -> f64 {
    v.round()
}

pub(crate) fn round1(v: f64) -> f64 {
    (v * 10.0).round() / 10.0
}

pub(crate) fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}
