//! Core simulation types and logic.

pub mod bar;
pub mod cost;
mod rounding;
pub mod price_index;
pub mod trade;
pub mod ledger;
pub mod strategy;
pub mod engine;
pub mod metrics;
pub mod report;
pub mod error;
