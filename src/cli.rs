//! CLI definition and dispatch.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;

use crate::adapters::csv_adapter::CsvAdapter;
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::adapters::paper::{PaperBook, PaperGateway, ReplayFeed};
use crate::domain::config::{build_engine_config, EngineConfig};
use crate::domain::error::FutcoreError;
use crate::domain::event_loop::{RunSummary, StrategyEngine};
use crate::logging::{init_logging, LogFormat};

#[derive(Parser, Debug)]
#[command(name = "futcore", about = "Futures strategy decision engine")]
pub struct Cli {
    /// Log output format
    #[arg(long, value_enum, global = true, default_value_t = LogFormat::Pretty)]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Replay recorded bars through the engine against a paper gateway
    Run {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(short, long)]
        bars: PathBuf,
        /// Split every paper order into fills of at most this many lots
        #[arg(long)]
        partial_fill_lots: Option<u32>,
        /// Starting paper account balance
        #[arg(long, default_value_t = 1_000_000.0)]
        balance: f64,
    },
    /// Validate a configuration file and print the resolved settings
    Validate {
        #[arg(short, long)]
        config: PathBuf,
    },
}

pub fn run(cli: Cli) -> ExitCode {
    init_logging(cli.log_format);
    match cli.command {
        Command::Run {
            config,
            bars,
            partial_fill_lots,
            balance,
        } => run_replay(&config, &bars, partial_fill_lots, balance),
        Command::Validate { config } => run_validate(&config),
    }
}

pub fn load_config(path: &PathBuf) -> Result<FileConfigAdapter, ExitCode> {
    FileConfigAdapter::from_file(path).map_err(|e| {
        let err = FutcoreError::ConfigParse {
            file: path.display().to_string(),
            reason: e.to_string(),
        };
        eprintln!("error: {err}");
        ExitCode::from(&err)
    })
}

fn load_engine_config(path: &PathBuf) -> Result<EngineConfig, ExitCode> {
    let adapter = load_config(path)?;
    build_engine_config(&adapter).map_err(|e| {
        eprintln!("error: {e}");
        ExitCode::from(&e)
    })
}

fn run_replay(
    config_path: &PathBuf,
    bars_path: &PathBuf,
    partial_fill_lots: Option<u32>,
    balance: f64,
) -> ExitCode {
    let config = match load_engine_config(config_path) {
        Ok(c) => c,
        Err(code) => return code,
    };

    let observations = match CsvAdapter::new(bars_path.clone()).load() {
        Ok(obs) => obs,
        Err(e) => {
            eprintln!("error: {e}");
            return (&e).into();
        }
    };
    eprintln!(
        "Replaying {} bars for {} ({})",
        observations.len(),
        config.instrument,
        config.strategy
    );

    let mut book = PaperBook::new(balance);
    if let Some(lots) = partial_fill_lots {
        book = book.with_partial_fills(lots);
    }
    let book = book.into_shared();
    let mut feed = ReplayFeed::new(observations, book.clone());
    let mut gateway = PaperGateway::new(book);

    let mut engine = StrategyEngine::new(config);
    let result = engine.run(&mut feed, &mut gateway);
    print_report(&engine, result.as_ref().ok());

    match result {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            (&e).into()
        }
    }
}

fn print_report(engine: &StrategyEngine, summary: Option<&RunSummary>) {
    println!("Signals:");
    for event in engine.signal_log() {
        println!("  {} #{} {}", event.timestamp, event.index, event.signal);
    }

    println!("Orders:");
    for entry in engine.order_log() {
        println!("  {} [{}] {}", entry.timestamp, entry.order_id, entry.request);
    }

    let record = engine.record();
    println!("Final position: {} ({})", record.actual, record.state);
    if let Some(summary) = summary {
        println!(
            "Observations: {} (dropped {}), fills: {}, rejected cycles: {}",
            summary.observations, summary.dropped, summary.fills, summary.rejected
        );
    }
}

fn run_validate(config_path: &PathBuf) -> ExitCode {
    eprintln!("Validating config: {}", config_path.display());
    let config = match load_engine_config(config_path) {
        Ok(c) => c,
        Err(code) => return code,
    };

    println!("Instrument:   {}", config.instrument);
    println!("Bar period:   {}s", config.bar_period);
    println!("Strategy:     {}", config.strategy);
    println!("Sizing:       {:?}", config.sizing);
    println!("Stop:         {:?}", config.stop);
    println!("ATR window:   {}", config.atr_window);
    println!(
        "Session:      close {} flatten at {} (no_overnight={}, flatten_on_shutdown={})",
        config.session.close,
        config.flatten_at(),
        config.session.no_overnight,
        config.session.flatten_on_shutdown
    );
    println!(
        "Orders:       max_retries={} limit_orders={}",
        config.orders.max_retries, config.orders.limit_orders
    );

    eprintln!("\nConfiguration is valid.");
    ExitCode::SUCCESS
}
