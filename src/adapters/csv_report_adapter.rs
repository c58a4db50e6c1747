//! CSV report adapter.
//!
//! Writes a UTF-8 file with a leading BOM (Excel needs it to detect the
//! encoding for Korean headers) containing two sections: the per-day
//! per-ticker rows, then the trade history table behind a marker line.

use crate::domain::error::SimError;
use crate::domain::report::{BacktestResults, DailyRow, TradeDetail};
use crate::domain::trade::TradeStatus;
use crate::ports::report_port::ReportPort;
use std::fs::File;
use std::io::Write;

const BOM: &str = "\u{feff}";
const TRADE_SECTION_MARKER: &str = "=== 매매 상세 이력 ===";

const DAILY_HEADER: [&str; 16] = [
    "날짜",
    "종목코드",
    "종목명",
    "시가",
    "고가",
    "저가",
    "종가",
    "거래량",
    "매매구분",
    "매매수량",
    "체결가",
    "거래비용",
    "보유수량",
    "보유평가금액",
    "포트폴리오총자산",
    "포트폴리오현금",
];

const TRADE_HEADER: [&str; 16] = [
    "종목코드",
    "종목명",
    "매수일",
    "매수가",
    "매수수량",
    "매입금액",
    "평균단가",
    "총매입금액",
    "평가금액",
    "평가손익",
    "매도일",
    "매도가",
    "매도비용",
    "실현손익",
    "수익률(%)",
    "상태",
];

pub struct CsvReportAdapter;

impl CsvReportAdapter {
    pub fn new() -> Self {
        Self
    }
}

impl Default for CsvReportAdapter {
    fn default() -> Self {
        Self::new()
    }
}

/// Whole-unit amounts print without a decimal point so Excel treats them as
/// integers; anything else keeps its full representation.
fn num(v: f64) -> String {
    if v.fract() == 0.0 && v.abs() < 9e15 {
        format!("{}", v as i64)
    } else {
        v.to_string()
    }
}

fn opt_num(v: Option<f64>) -> String {
    v.map(num).unwrap_or_default()
}

fn status_label(status: TradeStatus) -> &'static str {
    match status {
        TradeStatus::Open => "open",
        TradeStatus::Closed => "closed",
    }
}

fn daily_record(row: &DailyRow) -> Vec<String> {
    vec![
        row.date.to_string(),
        row.ticker.clone(),
        row.name.clone(),
        num(row.open),
        num(row.high),
        num(row.low),
        num(row.close),
        row.volume.to_string(),
        row.action.label().to_string(),
        row.shares_traded.to_string(),
        num(row.exec_price),
        num(row.trade_cost),
        row.holding_shares.to_string(),
        num(row.holding_value),
        num(row.portfolio_equity),
        num(row.portfolio_cash),
    ]
}

fn trade_record(t: &TradeDetail) -> Vec<String> {
    vec![
        t.ticker.clone(),
        t.name.clone(),
        t.entry_date.to_string(),
        num(t.entry_price),
        t.shares.to_string(),
        num(t.buy_amount),
        num(t.avg_price),
        num(t.total_buy_amount),
        num(t.eval_amount),
        num(t.eval_pnl),
        t.exit_date.map(|d| d.to_string()).unwrap_or_default(),
        opt_num(t.exit_price),
        num(t.exit_cost),
        opt_num(t.realized_pnl),
        opt_num(t.return_pct),
        status_label(t.status).to_string(),
    ]
}

impl ReportPort for CsvReportAdapter {
    fn write(
        &self,
        results: &BacktestResults,
        daily: &[DailyRow],
        output_path: &str,
    ) -> Result<(), SimError> {
        let mut file = File::create(output_path)?;
        file.write_all(BOM.as_bytes())?;

        let mut writer = csv::WriterBuilder::new()
            .flexible(true)
            .from_writer(file);
        let csv_err = |e: csv::Error| SimError::Data {
            reason: format!("failed to write {}: {}", output_path, e),
        };

        writer.write_record(DAILY_HEADER).map_err(csv_err)?;
        for row in daily {
            writer.write_record(daily_record(row)).map_err(csv_err)?;
        }

        // The csv crate quotes an empty record as `""`, so the genuinely
        // blank separator line has to be written to the file directly.
        let mut file = writer.into_inner().map_err(|e| SimError::Data {
            reason: format!("failed to write {}: {}", output_path, e),
        })?;
        file.write_all(b"\n")?;
        let mut writer = csv::WriterBuilder::new()
            .flexible(true)
            .from_writer(file);
        writer
            .write_record([TRADE_SECTION_MARKER])
            .map_err(csv_err)?;
        writer.write_record(TRADE_HEADER).map_err(csv_err)?;
        for t in &results.trades {
            writer.write_record(trade_record(t)).map_err(csv_err)?;
        }

        writer.flush()?;
        Ok(())
    }
}
