//! CLI definition and dispatch.

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use crate::adapters::csv_adapter::{CsvAdapter, load_holdings};
use crate::adapters::csv_report_adapter::CsvReportAdapter;
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::adapters::text_report_adapter::TextReportAdapter;
use crate::domain::backtest::{BacktestConfig, BacktestResult, RunStatus, SkippedLookup};
use crate::domain::config_validation::{
    parse_date, validate_backtest_config, validate_cost_config, validate_strategy_config,
};
use crate::domain::costs::{CostSchedule, CostSummary, TaxSchedule};
use crate::domain::cycle::prepare_cycle;
use crate::domain::decision::DecisionBatch;
use crate::domain::engine::TradingDecisionEngine;
use crate::domain::error::RotatorError;
use crate::domain::holding::Holding;
use crate::domain::metrics::{Metrics, display_pct, format_ratio};
use crate::domain::simulator::run_backtest;
use crate::domain::strategy::Strategy;
use crate::logging::{LogFormat, init_logging};
use crate::ports::config_port::ConfigPort;
use crate::ports::data_port::DataPort;
use crate::ports::report_port::{ReportContext, ReportPort};

#[derive(Parser, Debug)]
#[command(name = "rotator", about = "Ranked-portfolio rotation backtester")]
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
        /// Overrides [backtest] data_dir
        #[arg(short, long)]
        data_dir: Option<PathBuf>,
        /// Overrides [backtest] output_dir
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Overrides [logging] level
        #[arg(long)]
        log_level: Option<String>,
    },
    /// Validate a configuration file
    Validate {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Run a single planning cycle and print the decisions
    Plan {
        #[arg(short, long)]
        config: PathBuf,
        /// Ranking date (YYYY-MM-DD)
        #[arg(long)]
        date: String,
        /// Current holdings CSV
        #[arg(long)]
        holdings: Option<PathBuf>,
        /// Uninvested cash; defaults to [backtest] initial_capital
        #[arg(long)]
        cash: Option<f64>,
        #[arg(short, long)]
        data_dir: Option<PathBuf>,
    },
    /// List symbols available in the data directory
    ListSymbols {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(short, long)]
        data_dir: Option<PathBuf>,
    },
}

pub fn run(cli: Cli) -> ExitCode {
    match cli.command {
        Command::Backtest {
            config,
            data_dir,
            output,
            log_level,
        } => run_backtest_command(&config, data_dir, output, log_level.as_deref()),
        Command::Validate { config } => run_validate(&config),
        Command::Plan {
            config,
            date,
            holdings,
            cash,
            data_dir,
        } => run_plan(&config, &date, holdings.as_deref(), cash, data_dir),
        Command::ListSymbols { config, data_dir } => run_list_symbols(&config, data_dir),
    }
}

pub fn load_config(path: &Path) -> Result<FileConfigAdapter, ExitCode> {
    FileConfigAdapter::from_file(path).map_err(|err| {
        eprintln!("error: {err}");
        ExitCode::from(&err)
    })
}

fn fail(err: RotatorError) -> ExitCode {
    eprintln!("error: {err}");
    (&err).into()
}

fn setup_logging(adapter: &dyn ConfigPort, level_override: Option<&str>) {
    let level = level_override
        .map(str::to_string)
        .unwrap_or_else(|| adapter.get_string_or("logging", "level", "info"));
    let format = adapter
        .get_string_or("logging", "format", "pretty")
        .parse::<LogFormat>()
        .unwrap_or_else(|e| {
            eprintln!("warning: {e}, using pretty");
            LogFormat::Pretty
        });
    init_logging(&level, format);
}

pub fn resolve_data_dir(data_override: Option<PathBuf>, adapter: &dyn ConfigPort) -> PathBuf {
    data_override.unwrap_or_else(|| PathBuf::from(adapter.get_string_or("backtest", "data_dir", "data")))
}

pub fn resolve_output_dir(output_override: Option<PathBuf>, adapter: &dyn ConfigPort) -> PathBuf {
    output_override
        .unwrap_or_else(|| PathBuf::from(adapter.get_string_or("backtest", "output_dir", "output")))
}

/// Every validation stage a run depends on.
pub fn validate_all(adapter: &dyn ConfigPort) -> Result<(), RotatorError> {
    validate_backtest_config(adapter)?;
    validate_strategy_config(adapter)?;
    validate_cost_config(adapter)?;
    Ok(())
}

fn run_backtest_command(
    config_path: &Path,
    data_override: Option<PathBuf>,
    output_override: Option<PathBuf>,
    log_level: Option<&str>,
) -> ExitCode {
    // Stage 1: Load config
    eprintln!("Loading config from {}", config_path.display());
    let adapter = match load_config(config_path) {
        Ok(a) => a,
        Err(code) => return code,
    };
    setup_logging(&adapter, log_level);

    // Stage 2: Validate
    if let Err(e) = validate_all(&adapter) {
        return fail(e);
    }

    // Stage 3: Build immutable run parameters
    let bt_config = match build_backtest_config(&adapter) {
        Ok(c) => c,
        Err(e) => return fail(e),
    };
    let strategy = match build_strategy(&adapter) {
        Ok(s) => s,
        Err(e) => return fail(e),
    };
    let (costs, tax) = build_cost_schedules(&adapter);
    eprintln!("Loading strategy: {}", strategy.name);

    // Stage 4: Load data
    let data_dir = resolve_data_dir(data_override, &adapter);
    eprintln!("Loading data from {}", data_dir.display());
    let data_port = match CsvAdapter::load(&data_dir) {
        Ok(a) => a,
        Err(e) => return fail(e),
    };

    let output_dir = resolve_output_dir(output_override, &adapter);
    run_backtest_pipeline(&data_port, &strategy, &bt_config, &costs, &tax, &output_dir)
}

pub fn build_backtest_config(adapter: &dyn ConfigPort) -> Result<BacktestConfig, RotatorError> {
    Ok(BacktestConfig {
        start_date: parse_date(adapter, "backtest", "start_date")?,
        end_date: parse_date(adapter, "backtest", "end_date")?,
        initial_capital: adapter.get_double("backtest", "initial_capital", 100_000.0),
        risk_free_rate: adapter.get_double("backtest", "risk_free_rate", 0.06),
        daily_stop_check: adapter.get_bool("backtest", "daily_stop_check", true),
        mid_week_backfill: adapter.get_bool("backtest", "mid_week_backfill", true),
    })
}

pub fn build_strategy(adapter: &dyn ConfigPort) -> Result<Strategy, RotatorError> {
    let defaults = Strategy::default();
    let max_positions = adapter.get_count("strategy", "max_positions", defaults.max_positions);
    if max_positions == 0 {
        return Err(RotatorError::invalid(
            "strategy",
            "max_positions",
            "max_positions must be at least 1",
        ));
    }
    let d = |key: &str, default: f64| adapter.get_double("strategy", key, default);

    Ok(Strategy {
        name: adapter.get_string_or("strategy", "name", &defaults.name),
        max_positions,
        candidate_pool: adapter
            .get_count("strategy", "candidate_pool", max_positions)
            .max(1),
        swap_buffer: d("swap_buffer", defaults.swap_buffer),
        exit_threshold: d("exit_threshold", defaults.exit_threshold),
        risk_per_trade: d("risk_per_trade", defaults.risk_per_trade),
        max_position_fraction: d("max_position_fraction", defaults.max_position_fraction),
        volatility_multiplier: d("volatility_multiplier", defaults.volatility_multiplier),
        step_percent: d("step_percent", defaults.step_percent),
        stop_fallback_fraction: d("stop_fallback_fraction", defaults.stop_fallback_fraction),
        sizing_fallback_fraction: d("sizing_fallback_fraction", defaults.sizing_fallback_fraction),
        hard_buffer_fraction: d("hard_buffer_fraction", defaults.hard_buffer_fraction),
        stale_tolerance: d("stale_tolerance", defaults.stale_tolerance),
        pyramiding: adapter.get_bool("strategy", "pyramiding", defaults.pyramiding),
        pyramid_fraction: d("pyramid_fraction", defaults.pyramid_fraction),
    })
}

pub fn build_cost_schedules(adapter: &dyn ConfigPort) -> (CostSchedule, TaxSchedule) {
    let c = CostSchedule::default();
    let costs = CostSchedule {
        brokerage_rate: adapter.get_double("costs", "brokerage_rate", c.brokerage_rate),
        brokerage_cap: adapter.get_double("costs", "brokerage_cap", c.brokerage_cap),
        stt_rate: adapter.get_double("costs", "stt_rate", c.stt_rate),
        exchange_rate: adapter.get_double("costs", "exchange_rate", c.exchange_rate),
        sebi_per_crore: adapter.get_double("costs", "sebi_per_crore", c.sebi_per_crore),
        stamp_rate: adapter.get_double("costs", "stamp_rate", c.stamp_rate),
        gst_rate: adapter.get_double("costs", "gst_rate", c.gst_rate),
        ipf_per_crore: adapter.get_double("costs", "ipf_per_crore", c.ipf_per_crore),
        dp_charge: adapter.get_double("costs", "dp_charge", c.dp_charge),
    };
    let t = TaxSchedule::default();
    let tax = TaxSchedule {
        stcg_rate: adapter.get_double("tax", "stcg_rate", t.stcg_rate),
        ltcg_rate: adapter.get_double("tax", "ltcg_rate", t.ltcg_rate),
        ltcg_exemption: adapter.get_double("tax", "ltcg_exemption", t.ltcg_exemption),
        long_term_days: adapter.get_int("tax", "long_term_days", t.long_term_days),
    };
    (costs, tax)
}

/// Gross PnL and net contributions used by the cost summary.
pub fn summarize_costs(
    result: &BacktestResult,
    costs: &CostSchedule,
    tax: &TaxSchedule,
) -> CostSummary {
    let ledger = &result.portfolio.ledger;
    let contributed = ledger.capital_in() - ledger.capital_out();
    CostSummary::compute(
        &result.portfolio.fills,
        &result.trades(),
        result.final_value() - contributed,
        ledger.capital_in(),
        costs,
        tax,
    )
}

pub fn run_backtest_pipeline(
    data_port: &dyn DataPort,
    strategy: &Strategy,
    bt_config: &BacktestConfig,
    costs: &CostSchedule,
    tax: &TaxSchedule,
    output_dir: &Path,
) -> ExitCode {
    // Stage 5: Simulate
    eprintln!(
        "Running backtest: {} to {}, {} positions",
        bt_config.start_date, bt_config.end_date, strategy.max_positions
    );
    let result = run_backtest(data_port, bt_config, strategy);
    eprintln!("  Processed: {} weeks", result.weeks.len());

    // Stage 6: Metrics and costs
    let metrics = Metrics::from_result(&result, bt_config.start_date, bt_config.risk_free_rate);
    let cost_summary = summarize_costs(&result, costs, tax);

    // Stage 7: Console summary
    print_summary(&result, &metrics, &cost_summary);

    // Stage 8: Reports
    let report = ReportContext {
        result: &result,
        metrics: &metrics,
        costs: &cost_summary,
        strategy,
    };
    let writers: [&dyn ReportPort; 2] = [&TextReportAdapter::new(), &CsvReportAdapter::new()];
    for writer in writers {
        if let Err(e) = writer.write(&report, output_dir) {
            return fail(e);
        }
    }
    eprintln!("\nReports written to: {}", output_dir.display());

    match &result.status {
        RunStatus::Completed => ExitCode::SUCCESS,
        RunStatus::Aborted { date, reason } => fail(RotatorError::StateInconsistency {
            date: *date,
            reason: reason.clone(),
        }),
    }
}

fn print_summary(result: &BacktestResult, metrics: &Metrics, costs: &CostSummary) {
    eprintln!("\n=== Results ===");
    eprintln!("Final Value:      {:.2}", metrics.final_value);
    eprintln!("Total Return:     {:.2}%", display_pct(metrics.total_return));
    eprintln!("CAGR:             {:.2}%", display_pct(metrics.cagr));
    eprintln!("XIRR:             {:.2}%", display_pct(metrics.xirr));
    eprintln!("Sharpe Ratio:     {}", format_ratio(metrics.sharpe_ratio));
    eprintln!("Sortino Ratio:    {}", format_ratio(metrics.sortino_ratio));
    eprintln!("Max Drawdown:     -{:.2}%", display_pct(metrics.max_drawdown));
    eprintln!("Calmar Ratio:     {}", format_ratio(metrics.calmar_ratio));
    eprintln!("Total Trades:     {}", metrics.total_trades);
    eprintln!("Win Rate:         {:.1}%", display_pct(metrics.win_rate));
    eprintln!("Profit Factor:    {}", format_ratio(metrics.profit_factor));
    eprintln!("Net Post-Tax PnL: {:.2}", costs.net_pnl);

    if !result.skipped.is_empty() {
        eprintln!("\n=== Skipped Lookups ({}) ===", result.skipped.len());
        for s in result.skipped.iter().take(20) {
            eprintln!(
                "  {} {}: {}",
                s.date,
                s.symbol.as_deref().unwrap_or("-"),
                s.reason
            );
        }
        if result.skipped.len() > 20 {
            eprintln!("  ... {} more", result.skipped.len() - 20);
        }
    }

    if let RunStatus::Aborted { date, reason } = &result.status {
        eprintln!("\nRun ABORTED on {date}: {reason}");
        eprintln!("Results above cover the weeks processed before the abort.");
    }
}

fn run_validate(config_path: &Path) -> ExitCode {
    eprintln!("Validating config: {}", config_path.display());
    let adapter = match load_config(config_path) {
        Ok(a) => a,
        Err(code) => return code,
    };

    if let Err(e) = validate_all(&adapter) {
        return fail(e);
    }
    let strategy = match build_strategy(&adapter) {
        Ok(s) => s,
        Err(e) => return fail(e),
    };

    eprintln!("\nStrategy: {}", strategy.name);
    eprintln!("  max_positions:   {}", strategy.max_positions);
    eprintln!("  candidate_pool:  {}", strategy.candidate_pool);
    eprintln!("  swap_buffer:     {}", strategy.swap_buffer);
    eprintln!("  exit_threshold:  {}", strategy.exit_threshold);
    eprintln!("  pyramiding:      {}", strategy.pyramiding);
    eprintln!("\nConfiguration is valid.");
    ExitCode::SUCCESS
}

/// Engine output for one `plan` run plus the lookups it had to skip.
#[derive(Debug, Clone)]
pub struct PlanOutcome {
    pub batch: DecisionBatch,
    pub skipped: Vec<SkippedLookup>,
}

/// One planning cycle against `holdings` with rankings published on `date`.
pub fn plan_once(
    data: &dyn DataPort,
    strategy: &Strategy,
    holdings: &mut [Holding],
    cash: f64,
    date: NaiveDate,
) -> Result<PlanOutcome, RotatorError> {
    let rankings = data.fetch_rankings(date)?;
    let inputs = prepare_cycle(data, strategy, holdings, rankings, date);

    let portfolio_value = cash + holdings.iter().map(Holding::market_value).sum::<f64>();
    let engine = TradingDecisionEngine::new(strategy);
    let batch = engine.plan(holdings, &inputs.pool, &inputs.market, portfolio_value);
    Ok(PlanOutcome {
        batch,
        skipped: inputs.skipped,
    })
}

/// Decision records as CSV, one row per decision.
pub fn write_plan_csv<W: std::io::Write>(
    out: W,
    batch: &DecisionBatch,
    date: NaiveDate,
) -> Result<(), RotatorError> {
    let mut writer = csv::Writer::from_writer(out);
    for record in batch.records(date) {
        writer.serialize(&record).map_err(|e| RotatorError::Report {
            reason: format!("failed to write plan: {e}"),
        })?;
    }
    writer.flush()?;
    Ok(())
}

fn run_plan(
    config_path: &Path,
    date: &str,
    holdings_path: Option<&Path>,
    cash: Option<f64>,
    data_override: Option<PathBuf>,
) -> ExitCode {
    let adapter = match load_config(config_path) {
        Ok(a) => a,
        Err(code) => return code,
    };
    setup_logging(&adapter, None);
    if let Err(e) = validate_strategy_config(&adapter) {
        return fail(e);
    }
    let strategy = match build_strategy(&adapter) {
        Ok(s) => s,
        Err(e) => return fail(e),
    };
    let date = match NaiveDate::parse_from_str(date.trim(), "%Y-%m-%d") {
        Ok(d) => d,
        Err(_) => {
            return fail(RotatorError::invalid(
                "plan",
                "date",
                "invalid date format, expected YYYY-MM-DD",
            ));
        }
    };

    let data_port = match CsvAdapter::load(resolve_data_dir(data_override, &adapter)) {
        Ok(a) => a,
        Err(e) => return fail(e),
    };
    let mut holdings = match holdings_path {
        Some(path) => match load_holdings(path) {
            Ok(h) => h,
            Err(e) => return fail(e),
        },
        None => Vec::new(),
    };
    let cash = cash.unwrap_or_else(|| adapter.get_double("backtest", "initial_capital", 100_000.0));

    let PlanOutcome { batch, skipped } = match plan_once(&data_port, &strategy, &mut holdings, cash, date) {
        Ok(outcome) => outcome,
        Err(e) => return fail(e),
    };

    eprintln!(
        "Plan for {}: {} decisions, {} holdings, cash {:.2}",
        date,
        batch.decisions.len(),
        holdings.len(),
        cash
    );
    if let Err(e) = write_plan_csv(std::io::stdout().lock(), &batch, date) {
        return fail(e);
    }
    for (symbol, stop) in &batch.stop_updates {
        eprintln!("  stop {symbol} -> {stop:.2}");
    }
    for symbol in &batch.skipped {
        eprintln!("  skipped {symbol}: no price data");
    }
    for lookup in &skipped {
        eprintln!(
            "  lookup failed for {}: {}",
            lookup.symbol.as_deref().unwrap_or("-"),
            lookup.reason
        );
    }
    ExitCode::SUCCESS
}

fn run_list_symbols(config_path: &Path, data_override: Option<PathBuf>) -> ExitCode {
    let adapter = match load_config(config_path) {
        Ok(a) => a,
        Err(code) => return code,
    };
    let data_port = match CsvAdapter::load(resolve_data_dir(data_override, &adapter)) {
        Ok(a) => a,
        Err(e) => return fail(e),
    };
    let symbols = match data_port.list_symbols() {
        Ok(s) => s,
        Err(e) => return fail(e),
    };

    if symbols.is_empty() {
        eprintln!("No symbols found in {}", data_port.base_path().display());
    } else {
        for symbol in &symbols {
            let range = data_port
                .series(symbol)
                .and_then(|s| Some((s.first_date()?, s.last_date()?, s.bar_count())));
            match range {
                Some((first, last, count)) => println!("{symbol}\t{first}\t{last}\t{count}"),
                None => println!("{symbol}"),
            }
        }
        eprintln!("{} symbols found", symbols.len());
    }
    ExitCode::SUCCESS
}
