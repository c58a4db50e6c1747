//! CLI integration tests: full backtests driven by INI files and CSV data
//! directories on disk.

mod common;

use std::fs;
use std::io::Write;
use std::path::Path;
use stocksim::cli::{self, Cli, Command};

fn write_price_csv(dir: &Path, ticker: &str, rows: &[(&str, f64)]) {
    let mut file = fs::File::create(dir.join(format!("{ticker}.csv"))).unwrap();
    writeln!(file, "date,open,high,low,close,volume").unwrap();
    for (date, close) in rows {
        writeln!(file, "{date},{close},{close},{close},{close},10000").unwrap();
    }
}

fn write_config(path: &Path, data_dir: &Path, strategy_section: &str) {
    let content = format!(
        "[backtest]\n\
         initial_capital = 1000000\n\
         slippage_pct = 0\n\
         commission_pct = 0\n\
         tax_pct = 0\n\
         \n\
         {strategy_section}\n\
         \n\
         [data]\n\
         csv_dir = {}\n\
         tickers = AAA,BBB\n\
         name.aaa = Alpha Corp\n",
        data_dir.display()
    );
    fs::write(path, content).unwrap();
}

fn seed_data(dir: &Path) {
    write_price_csv(
        dir,
        "AAA",
        &[
            ("2025-01-02", 100.0),
            ("2025-01-03", 102.0),
            ("2025-01-06", 104.0),
        ],
    );
    write_price_csv(
        dir,
        "BBB",
        &[
            ("2025-01-02", 50.0),
            ("2025-01-03", 49.0),
            ("2025-01-06", 51.0),
        ],
    );
}

#[test]
fn backtest_writes_report_and_json() {
    let dir = tempfile::TempDir::new().unwrap();
    let data_dir = dir.path().join("data");
    fs::create_dir(&data_dir).unwrap();
    seed_data(&data_dir);

    let config_path = dir.path().join("sim.ini");
    write_config(&config_path, &data_dir, "[strategy]\nname = equal_weight");

    let report_path = dir.path().join("report.csv");
    let json_path = dir.path().join("results.json");

    let _ = cli::run(Cli {
        command: Command::Backtest {
            config: config_path,
            output: Some(report_path.clone()),
            json: Some(json_path.display().to_string()),
            tickers: None,
        },
    });

    let report = fs::read(&report_path).unwrap();
    assert_eq!(&report[..3], &[0xEF, 0xBB, 0xBF]);
    let report = String::from_utf8(report).unwrap();
    assert!(report.contains("날짜,종목코드,종목명"));
    assert!(report.contains("=== 매매 상세 이력 ==="));
    assert!(report.contains("Alpha Corp"));

    let json: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&json_path).unwrap()).unwrap();
    assert_eq!(json["metrics"]["trading_days"], 3);
    assert_eq!(json["equity_curve"].as_array().unwrap().len(), 3);
    assert_eq!(json["metrics"]["start_date"], "2025-01-02");
    assert!(json["benchmark"].is_null());
    assert_eq!(json["cost_config"]["tax_pct"], 0.0);
}

#[test]
fn ticker_override_limits_the_universe() {
    let dir = tempfile::TempDir::new().unwrap();
    let data_dir = dir.path().join("data");
    fs::create_dir(&data_dir).unwrap();
    seed_data(&data_dir);

    let config_path = dir.path().join("sim.ini");
    write_config(&config_path, &data_dir, "[strategy]\nname = equal_weight");

    let json_path = dir.path().join("results.json");
    let _ = cli::run(Cli {
        command: Command::Backtest {
            config: config_path,
            output: None,
            json: Some(json_path.display().to_string()),
            tickers: Some("AAA".to_string()),
        },
    });

    let json: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&json_path).unwrap()).unwrap();
    assert_eq!(json["stock_performance"].as_array().unwrap().len(), 1);
    assert_eq!(json["stock_performance"][0]["ticker"], "AAA");
}

#[test]
fn missing_data_dir_produces_no_output() {
    let dir = tempfile::TempDir::new().unwrap();
    let config_path = dir.path().join("sim.ini");
    fs::write(
        &config_path,
        "[backtest]\ninitial_capital = 1000000\n[strategy]\nname = equal_weight\n",
    )
    .unwrap();

    let json_path = dir.path().join("results.json");
    let _ = cli::run(Cli {
        command: Command::Backtest {
            config: config_path,
            output: None,
            json: Some(json_path.display().to_string()),
            tickers: None,
        },
    });

    assert!(!json_path.exists());
}

#[test]
fn custom_strategy_reads_signals_file() {
    let dir = tempfile::TempDir::new().unwrap();
    let data_dir = dir.path().join("data");
    fs::create_dir(&data_dir).unwrap();
    seed_data(&data_dir);

    let signals_path = dir.path().join("signals.csv");
    fs::write(
        &signals_path,
        "date,ticker,action,weight\n2025-01-02,AAA,BUY,0.5\n2025-01-06,AAA,SELL,0\n",
    )
    .unwrap();

    let config_path = dir.path().join("sim.ini");
    write_config(
        &config_path,
        &data_dir,
        &format!(
            "[strategy]\nname = custom\nsignals_file = {}",
            signals_path.display()
        ),
    );

    let json_path = dir.path().join("results.json");
    let _ = cli::run(Cli {
        command: Command::Backtest {
            config: config_path,
            output: None,
            json: Some(json_path.display().to_string()),
            tickers: None,
        },
    });

    let json: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&json_path).unwrap()).unwrap();
    let trades = json["trades"].as_array().unwrap();
    assert_eq!(trades.len(), 1);
    assert_eq!(trades[0]["ticker"], "AAA");
    assert_eq!(trades[0]["status"], "closed");
}
