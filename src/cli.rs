//! CLI definition and dispatch.

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use crate::adapters::csv_adapter::CsvAdapter;
use crate::adapters::csv_report_adapter::CsvReportAdapter;
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::domain::cost::CostConfig;
use crate::domain::engine::Engine;
use crate::domain::error::SimError;
use crate::domain::report::{build_results, daily_detail};
use crate::domain::strategy::{Signal, SignalAction, Strategy};
use crate::ports::config_port::ConfigPort;
use crate::ports::data_port::DataPort;
use crate::ports::report_port::ReportPort;

#[derive(Parser, Debug)]
#[command(name = "stocksim", about = "Daily-bar trading strategy backtester")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a backtest
    Backtest {
        #[arg(short, long)]
        config: PathBuf,
        /// Write the daily/trade detail CSV report here
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Write the full results as JSON here ("-" for stdout)
        #[arg(short, long)]
        json: Option<String>,
        /// Comma-separated ticker override
        #[arg(long)]
        tickers: Option<String>,
    },
    /// List tickers available in the configured data directory
    ListTickers {
        #[arg(short, long)]
        config: PathBuf,
    },
}

pub fn run(cli: Cli) -> ExitCode {
    match cli.command {
        Command::Backtest {
            config,
            output,
            json,
            tickers,
        } => run_backtest(&config, output.as_ref(), json.as_deref(), tickers.as_deref()),
        Command::ListTickers { config } => run_list_tickers(&config),
    }
}

pub fn load_config(path: &PathBuf) -> Result<FileConfigAdapter, ExitCode> {
    FileConfigAdapter::from_file(path).map_err(|e| {
        eprintln!("error: {e}");
        ExitCode::from(&e)
    })
}

fn parse_date(
    adapter: &dyn ConfigPort,
    section: &str,
    key: &str,
) -> Result<Option<NaiveDate>, SimError> {
    match adapter.get_string(section, key) {
        None => Ok(None),
        Some(raw) => NaiveDate::parse_from_str(&raw, "%Y-%m-%d")
            .map(Some)
            .map_err(|e| SimError::ConfigInvalid {
                section: section.to_string(),
                key: key.to_string(),
                reason: format!("{raw}: {e}"),
            }),
    }
}

/// Build the strategy from `[strategy]` keys; unknown names are rejected.
pub fn build_strategy(adapter: &dyn ConfigPort) -> Result<Strategy, SimError> {
    let name = adapter
        .get_string("strategy", "name")
        .unwrap_or_else(|| "equal_weight".to_string());

    let strategy = match name.as_str() {
        "equal_weight" => Strategy::EqualWeight,
        "rebalance" => Strategy::Rebalance {
            period: adapter.get_int("strategy", "period", 20) as usize,
        },
        "custom" => {
            let path =
                adapter
                    .get_string("strategy", "signals_file")
                    .ok_or(SimError::ConfigMissing {
                        section: "strategy".to_string(),
                        key: "signals_file".to_string(),
                    })?;
            Strategy::Custom {
                signals: read_signals(&path)?,
            }
        }
        "vol_trailing_stop" => Strategy::VolatilityTrailingStop {
            lookback: adapter.get_int("strategy", "lookback", 20) as usize,
            stop_pct: adapter.get_double("strategy", "stop_pct", -10.0),
            cooldown: adapter.get_int("strategy", "cooldown", 5) as usize,
            reentry: adapter.get_bool("strategy", "reentry", true),
        },
        "ma_filter" => Strategy::MaFilter {
            ma_period: adapter.get_int("strategy", "ma_period", 20) as usize,
            rebalance_period: adapter.get_int("strategy", "rebalance_period", 5) as usize,
        },
        "composite" => Strategy::Composite {
            ma_period: adapter.get_int("strategy", "ma_period", 20) as usize,
            lookback: adapter.get_int("strategy", "lookback", 20) as usize,
            stop_pct: adapter.get_double("strategy", "stop_pct", -8.0),
            cooldown: adapter.get_int("strategy", "cooldown", 5) as usize,
            rebalance_period: adapter.get_int("strategy", "rebalance_period", 10) as usize,
        },
        other => {
            return Err(SimError::Strategy {
                reason: format!("unknown strategy '{other}'"),
            });
        }
    };

    strategy.validate()?;
    Ok(strategy)
}

/// Signal feed for the custom strategy: a CSV with a
/// `date,ticker,action,weight` header.
fn read_signals(path: &str) -> Result<Vec<Signal>, SimError> {
    #[derive(serde::Deserialize)]
    struct SignalRow {
        date: NaiveDate,
        ticker: String,
        action: String,
        weight: f64,
    }

    let mut rdr = csv::Reader::from_path(path).map_err(|e| SimError::Data {
        reason: format!("failed to read signals file {path}: {e}"),
    })?;

    let mut signals = Vec::new();
    for result in rdr.deserialize::<SignalRow>() {
        let row = result.map_err(|e| SimError::Data {
            reason: format!("{path}: {e}"),
        })?;
        let action = match row.action.to_uppercase().as_str() {
            "BUY" => SignalAction::Buy,
            "SELL" => SignalAction::Sell,
            other => {
                return Err(SimError::Data {
                    reason: format!("{path}: unknown signal action '{other}'"),
                });
            }
        };
        signals.push(Signal {
            date: row.date,
            ticker: row.ticker,
            action,
            weight: row.weight,
        });
    }
    Ok(signals)
}

fn cost_config(adapter: &dyn ConfigPort) -> CostConfig {
    CostConfig {
        slippage_pct: adapter.get_double("backtest", "slippage_pct", 0.3),
        commission_pct: adapter.get_double("backtest", "commission_pct", 0.015),
        tax_pct: adapter.get_double("backtest", "tax_pct", 0.20),
    }
}

fn configured_tickers(
    adapter: &dyn ConfigPort,
    override_list: Option<&str>,
) -> Result<Vec<String>, SimError> {
    let raw = match override_list {
        Some(list) => list.to_string(),
        None => adapter
            .get_string("data", "tickers")
            .ok_or(SimError::ConfigMissing {
                section: "data".to_string(),
                key: "tickers".to_string(),
            })?,
    };
    let tickers: Vec<String> = raw
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();
    if tickers.is_empty() {
        return Err(SimError::ConfigInvalid {
            section: "data".to_string(),
            key: "tickers".to_string(),
            reason: "empty ticker list".to_string(),
        });
    }
    Ok(tickers)
}

fn data_dir(adapter: &dyn ConfigPort) -> Result<PathBuf, SimError> {
    adapter
        .get_string("data", "csv_dir")
        .map(PathBuf::from)
        .ok_or(SimError::ConfigMissing {
            section: "data".to_string(),
            key: "csv_dir".to_string(),
        })
}

/// Optional `name.<ticker>` keys in `[data]` map codes to display names.
fn display_name(adapter: &dyn ConfigPort, ticker: &str) -> String {
    adapter
        .get_string("data", &format!("name.{ticker}"))
        .unwrap_or_default()
}

fn run_backtest(
    config_path: &PathBuf,
    output_path: Option<&PathBuf>,
    json_target: Option<&str>,
    ticker_override: Option<&str>,
) -> ExitCode {
    eprintln!("Loading config from {}", config_path.display());
    let adapter = match load_config(config_path) {
        Ok(a) => a,
        Err(code) => return code,
    };

    match run_backtest_pipeline(&adapter, output_path, json_target, ticker_override) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::from(&e)
        }
    }
}

fn run_backtest_pipeline(
    adapter: &FileConfigAdapter,
    output_path: Option<&PathBuf>,
    json_target: Option<&str>,
    ticker_override: Option<&str>,
) -> Result<(), SimError> {
    let initial_capital = adapter.get_double("backtest", "initial_capital", 100_000_000.0);
    let cost = cost_config(adapter);
    let start = parse_date(adapter, "backtest", "start_date")?;
    let end = parse_date(adapter, "backtest", "end_date")?;

    let strategy = build_strategy(adapter)?;
    let tickers = configured_tickers(adapter, ticker_override)?;
    let data_port = CsvAdapter::new(data_dir(adapter)?);

    let mut engine = Engine::new(initial_capital, cost);
    for ticker in &tickers {
        match data_port.fetch_series(ticker, start, end) {
            Ok(bars) => {
                let name = display_name(adapter, ticker);
                engine.add_price_series(ticker, bars, &name)?;
            }
            Err(e) => eprintln!("warning: skipping {ticker} ({e})"),
        }
    }

    if let Some(benchmark) = adapter.get_string("data", "benchmark") {
        match data_port.fetch_series(&benchmark, start, end) {
            Ok(bars) => engine.set_benchmark(
                bars.iter()
                    .map(|b| crate::domain::bar::BenchmarkBar {
                        date: b.date,
                        close: b.close,
                    })
                    .collect(),
            ),
            Err(e) => eprintln!("warning: no benchmark data for {benchmark} ({e})"),
        }
    }

    eprintln!(
        "Running backtest: {} ({} tickers)",
        strategy.name(),
        tickers.len()
    );
    engine.run(&strategy, &tickers, start, end)?;

    let results = build_results(&engine)?;
    let m = &results.metrics;

    eprintln!("\n=== Results ===");
    eprintln!("Period:           {} ~ {}", m.start_date, m.end_date);
    eprintln!("Final Equity:     {:.0}", m.final_equity);
    eprintln!("Total Return:     {:.2}%", m.total_return);
    eprintln!("Annualized:       {:.2}%", m.annual_return);
    eprintln!("Max Drawdown:     {:.2}% ({})", m.mdd, m.mdd_period);
    eprintln!("Sharpe Ratio:     {:.2}", m.sharpe);
    eprintln!("Volatility:       {:.2}%", m.volatility);
    eprintln!("Win Rate:         {:.2}%", m.win_rate);
    eprintln!("Total Trades:     {}", m.total_trades);
    eprintln!("Total Costs:      {:.0}", results.cost_summary.total);

    if let Some(target) = json_target {
        let payload = serde_json::to_string_pretty(&results).map_err(|e| SimError::Data {
            reason: format!("failed to serialize results: {e}"),
        })?;
        if target == "-" {
            println!("{payload}");
        } else {
            fs::write(target, payload)?;
            eprintln!("\nResults written to: {target}");
        }
    }

    if let Some(output) = output_path {
        let daily = daily_detail(&engine);
        let path = output.display().to_string();
        CsvReportAdapter::new().write(&results, &daily, &path)?;
        eprintln!("Report written to: {path}");
    }

    Ok(())
}

fn run_list_tickers(config_path: &PathBuf) -> ExitCode {
    let adapter = match load_config(config_path) {
        Ok(a) => a,
        Err(code) => return code,
    };

    let listing = data_dir(&adapter).and_then(|dir| CsvAdapter::new(dir).list_tickers());
    match listing {
        Ok(tickers) => {
            for ticker in tickers {
                println!("{ticker}");
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::from(&e)
        }
    }
}
