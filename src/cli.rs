//! CLI definition and dispatch.

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use crate::adapters::csv_adapter::{CsvCandleAdapter, CsvInstrumentAdapter};
use crate::adapters::csv_report_adapter::CsvReportAdapter;
use crate::adapters::csv_score_adapter::CsvScoreAdapter;
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::adapters::indicator_signal_adapter::{IndicatorSettings, IndicatorSignalAdapter};
use crate::domain::backtest::{run_backtest, BacktestConfig, BacktestResult, Schedule, Slot};
use crate::domain::bot::{BotPorts, TickMode, TradingBot};
use crate::domain::cancel::CancelToken;
use crate::domain::config_validation::{
    read_int_as, read_parsed, read_required, read_timestamp, read_universe, validate_config,
};
use crate::domain::error::RebalancerError;
use crate::domain::executor::{Executor, ExecutorConfig};
use crate::domain::instrument::InstrumentClass;
use crate::domain::portfolio::Portfolio;
use crate::domain::strategy::{MarginConfig, OrderConfig, OrdersConfig, ScoringConfig, Strategy};
use crate::domain::taxes::{parse_margin_taxes, MarginTaxSchedule, Tariff, TaxTable};
use crate::ports::config_port::ConfigPort;
use crate::ports::price_port::PricePort;
use crate::ports::report_port::ReportPort;
use crate::ports::score_port::ScorePort;
use crate::ports::signal_port::SignalPort;

#[derive(Parser, Debug)]
#[command(name = "rebalancer", about = "Weekly portfolio-rebalancing backtester")]
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
        /// CSV report path; overrides `[report] output`
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Validate and load everything without simulating
        #[arg(long)]
        dry_run: bool,
    },
    /// Validate a configuration file
    Validate {
        #[arg(short, long)]
        config: PathBuf,
    },
}

pub fn run(cli: Cli, cancel: &CancelToken) -> ExitCode {
    let outcome = match cli.command {
        Command::Backtest {
            config,
            output,
            dry_run,
        } => backtest_command(&config, output.as_deref(), dry_run, cancel).map(|_| ()),
        Command::Validate { config } => validate_command(&config),
    };
    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            (&e).into()
        }
    }
}

/// Cancels `cancel` on SIGINT or SIGTERM. A second signal exits at once.
pub fn install_interrupt_handler(cancel: &CancelToken) {
    let token = cancel.clone();
    let installed = ctrlc::set_handler(move || {
        if token.is_cancelled() {
            std::process::exit(130);
        }
        eprintln!("\nInterrupted: stopping after the current step");
        token.cancel();
    });
    if let Err(e) = installed {
        eprintln!("warning: cannot install interrupt handler: {e}");
    }
}

pub fn load_config(path: &Path) -> Result<FileConfigAdapter, RebalancerError> {
    FileConfigAdapter::from_file(path).map_err(|e| RebalancerError::ConfigParse {
        file: path.display().to_string(),
        reason: e.to_string(),
    })
}

/// Installs the stderr subscriber. `RUST_LOG` wins over `[logging] level`.
pub fn init_logging(config: &dyn ConfigPort) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = config
            .get_string("logging", "level")
            .unwrap_or_else(|| "info".to_string());
        EnvFilter::try_new(level.trim()).unwrap_or_else(|_| EnvFilter::new("info"))
    });
    if let Err(e) = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
    {
        debug!("keeping the existing subscriber: {e}");
    }
}

pub fn build_backtest_config(config: &dyn ConfigPort) -> Result<BacktestConfig, RebalancerError> {
    let schedule = Schedule {
        rebalance: Slot {
            weekday: read_parsed(config, "schedule", "rebalance_weekday", chrono::Weekday::Fri)?,
            hour: read_int_as(config, "schedule", "rebalance_hour", 20)?,
        },
        liquidation: Slot {
            weekday: read_parsed(config, "schedule", "liquidation_weekday", chrono::Weekday::Thu)?,
            hour: read_int_as(config, "schedule", "liquidation_hour", 0)?,
        },
    };
    Ok(BacktestConfig {
        start: read_timestamp(config, "backtest", "start_date")?,
        end: read_timestamp(config, "backtest", "end_date")?,
        initial_capital: config.get_double("backtest", "initial_capital", 100_000.0),
        tick_mode: read_parsed(config, "backtest", "tick_mode", TickMode::Staged)?,
        schedule,
    })
}

fn build_order(
    config: &dyn ConfigPort,
    prefix: &str,
    default: OrderConfig,
) -> Result<OrderConfig, RebalancerError> {
    Ok(OrderConfig {
        order_type: read_parsed(config, "orders", &format!("{prefix}_type"), default.order_type)?,
        profit: config.get_double("orders", &format!("{prefix}_profit"), default.profit),
        defence: config.get_double("orders", &format!("{prefix}_defence"), default.defence),
    })
}

pub fn build_strategy(config: &dyn ConfigPort) -> Result<Strategy, RebalancerError> {
    let scoring_defaults = ScoringConfig::default();
    let scoring = ScoringConfig {
        top_percent: config.get_double("scoring", "top_percent", scoring_defaults.top_percent),
        top_threshold: config.get_double(
            "scoring",
            "top_threshold",
            scoring_defaults.top_threshold,
        ),
    };

    let order_defaults = OrdersConfig::default();
    let orders = OrdersConfig {
        sell_out_profit: build_order(config, "sell_out_profit", order_defaults.sell_out_profit)?,
        sell_order: build_order(config, "sell_order", order_defaults.sell_order)?,
    };

    let m = MarginConfig::default();
    let taxes = match config.get_string("margin", "taxes") {
        Some(raw) if !raw.trim().is_empty() => {
            parse_margin_taxes(&raw).map_err(|reason| RebalancerError::ConfigInvalid {
                section: "margin".into(),
                key: "taxes".into(),
                reason,
            })?
        }
        _ => MarginTaxSchedule::default(),
    };
    let margin = MarginConfig {
        enabled: config.get_bool("margin", "enabled", m.enabled),
        top: config.get_double("margin", "top", m.top),
        short_threshold: config.get_double("margin", "short_threshold", m.short_threshold),
        upper_threshold: config.get_double("margin", "upper_threshold", m.upper_threshold),
        short_profit: config.get_double("margin", "short_profit", m.short_profit),
        hedge: config.get_double("margin", "hedge", m.hedge),
        taxes,
    };

    Ok(Strategy {
        universe: read_universe(config)?,
        scoring,
        orders,
        margin,
    })
}

/// Tariff preset with optional per-class `tax_*` overrides.
pub fn build_tax_table(config: &dyn ConfigPort) -> Result<TaxTable, RebalancerError> {
    let tariff = read_parsed(config, "backtest", "tariff", Tariff::Investor)?;
    let mut table = TaxTable::for_tariff(tariff);
    for class in InstrumentClass::ALL {
        let key = format!("tax_{}", class.as_str());
        if let Some(raw) = config.get_string("backtest", &key) {
            let rate: f64 =
                raw.trim()
                    .parse()
                    .map_err(|_| RebalancerError::ConfigInvalid {
                        section: "backtest".into(),
                        key: key.clone(),
                        reason: format!("not a number: {raw}"),
                    })?;
            table = table.with_rate(class, rate);
        }
    }
    Ok(table)
}

pub fn build_executor_config(
    config: &dyn ConfigPort,
    strategy: &Strategy,
) -> Result<ExecutorConfig, RebalancerError> {
    let margin_taxes = if strategy.margin.enabled {
        strategy.margin.taxes.clone()
    } else {
        MarginTaxSchedule::empty()
    };
    Ok(ExecutorConfig {
        taxes: build_tax_table(config)?,
        margin_taxes,
        sell_order: strategy.orders.sell_order,
    })
}

/// `None` when `[indicators] enabled = false`.
pub fn build_indicator_settings(
    config: &dyn ConfigPort,
) -> Result<Option<IndicatorSettings>, RebalancerError> {
    if !config.get_bool("indicators", "enabled", true) {
        return Ok(None);
    }
    let d = IndicatorSettings::default();
    let period = |key: &str, default: usize| -> Result<usize, RebalancerError> {
        read_int_as(config, "indicators", key, i64::try_from(default).unwrap_or(i64::MAX))
    };
    Ok(Some(IndicatorSettings {
        rsi_period: period("rsi_period", d.rsi_period)?,
        rsi_lower: config.get_double("indicators", "rsi_lower", d.rsi_lower),
        rsi_upper: config.get_double("indicators", "rsi_upper", d.rsi_upper),
        bollinger_period: period("bollinger_period", d.bollinger_period)?,
        bollinger_deviation: config.get_double(
            "indicators",
            "bollinger_deviation",
            d.bollinger_deviation,
        ),
        ema_fast: period("ema_fast", d.ema_fast)?,
        ema_slow: period("ema_slow", d.ema_slow)?,
        macd_fast: period("macd_fast", d.macd_fast)?,
        macd_slow: period("macd_slow", d.macd_slow)?,
        macd_signal: period("macd_signal", d.macd_signal)?,
    }))
}

/// Score source from `[scoring] source`; HTTP requests are tied to `cancel`.
pub fn build_score_port(
    config: &dyn ConfigPort,
    cancel: &CancelToken,
) -> Result<Arc<dyn ScorePort>, RebalancerError> {
    let source = config
        .get_string("scoring", "source")
        .unwrap_or_else(|| "http".to_string())
        .trim()
        .to_lowercase();
    match source.as_str() {
        "csv" => {
            let path = read_required(config, "scoring", "scores_file")?;
            Ok(Arc::new(CsvScoreAdapter::load(Path::new(&path))?))
        }
        "http" => build_http_score_port(config, cancel),
        other => Err(RebalancerError::ConfigInvalid {
            section: "scoring".into(),
            key: "source".into(),
            reason: format!("unknown score source: {other}"),
        }),
    }
}

#[cfg(feature = "http")]
fn build_http_score_port(
    config: &dyn ConfigPort,
    cancel: &CancelToken,
) -> Result<Arc<dyn ScorePort>, RebalancerError> {
    use crate::adapters::http_score_adapter::{HttpScoreAdapter, ScoringParams};
    use std::time::Duration;

    let address = read_required(config, "scoring", "address")?;
    let d = ScoringParams::default();
    let params = ScoringParams {
        alpha: config.get_double("scoring", "alpha", d.alpha),
        p_value: config.get_double("scoring", "p_value", d.p_value),
        threshold: config.get_double("scoring", "threshold", d.threshold),
    };
    let timeout_secs: u64 = read_int_as(config, "scoring", "timeout_secs", 60)?;
    let timeout = Duration::from_secs(timeout_secs.max(1));
    let adapter = HttpScoreAdapter::new(&address, params, timeout)?.with_cancel(cancel.clone());
    Ok(Arc::new(adapter))
}

#[cfg(not(feature = "http"))]
fn build_http_score_port(
    _config: &dyn ConfigPort,
    _cancel: &CancelToken,
) -> Result<Arc<dyn ScorePort>, RebalancerError> {
    Err(RebalancerError::ConfigInvalid {
        section: "scoring".into(),
        key: "source".into(),
        reason: "built without the http feature; use source = csv".into(),
    })
}

/// Wires adapters, portfolio, executor and bot from a validated config.
pub fn build_bot(
    config: &dyn ConfigPort,
    cancel: &CancelToken,
) -> Result<(TradingBot, BacktestConfig), RebalancerError> {
    let backtest = build_backtest_config(config)?;
    let strategy = build_strategy(config)?;
    let executor_config = build_executor_config(config, &strategy)?;

    let candles_dir = read_required(config, "data", "candles_dir")?;
    let candles = CsvCandleAdapter::load(Path::new(&candles_dir))?;
    eprintln!("Loaded candles for {} instruments", candles.instrument_count());
    let prices: Arc<dyn PricePort> = Arc::new(candles);

    let instruments_file = read_required(config, "data", "instruments_file")?;
    let instruments = Arc::new(CsvInstrumentAdapter::new(PathBuf::from(instruments_file)));

    let signals = build_indicator_settings(config)?.map(|settings| {
        Arc::new(IndicatorSignalAdapter::new(prices.clone(), settings)) as Arc<dyn SignalPort>
    });

    let portfolio = Arc::new(Portfolio::new(backtest.initial_capital));
    let executor = Arc::new(Executor::new(
        executor_config,
        portfolio.clone(),
        prices.clone(),
    ));
    let ports = BotPorts {
        prices,
        instruments,
        scores: build_score_port(config, cancel)?,
        signals,
    };
    let bot = TradingBot::new(strategy, executor, portfolio, ports).with_tick_mode(backtest.tick_mode);
    Ok((bot, backtest))
}

/// Runs the `backtest` subcommand; `None` for a dry run.
///
/// A cancelled run returns [`RebalancerError::Cancelled`] and writes no report.
pub fn backtest_command(
    config_path: &Path,
    output: Option<&Path>,
    dry_run: bool,
    cancel: &CancelToken,
) -> Result<Option<BacktestResult>, RebalancerError> {
    eprintln!("Loading config from {}", config_path.display());
    let config = load_config(config_path)?;
    init_logging(&config);
    validate_config(&config)?;

    let (mut bot, backtest) = build_bot(&config, cancel)?;
    if dry_run {
        print_plan(&bot, &backtest);
        eprintln!("\nDry run complete: configuration is valid");
        return Ok(None);
    }

    eprintln!(
        "Running backtest: {} to {}, capital {:.2}",
        backtest.start, backtest.end, backtest.initial_capital
    );
    let result = run_backtest(&mut bot, &backtest, cancel)?;
    print_summary(&result);

    let output = output
        .map(|p| p.display().to_string())
        .or_else(|| config.get_string("report", "output").filter(|s| !s.trim().is_empty()));
    if let Some(path) = output {
        CsvReportAdapter::new().write(&result, &path)?;
        eprintln!("\nReport written to: {path}");
    }
    Ok(Some(result))
}

pub fn validate_command(config_path: &Path) -> Result<(), RebalancerError> {
    eprintln!("Validating config: {}", config_path.display());
    let config = load_config(config_path)?;
    validate_config(&config)?;

    let backtest = build_backtest_config(&config)?;
    let strategy = build_strategy(&config)?;
    build_tax_table(&config)?;

    eprintln!("  period:     {} .. {}", backtest.start, backtest.end);
    eprintln!("  tick mode:  {}", backtest.tick_mode);
    eprintln!("  universe:   {:?} / {:?}", strategy.universe.ids, strategy.universe.classes);
    eprintln!("  top:        {:.0}%", strategy.scoring.top_percent * 100.0);
    eprintln!(
        "  margin:     {}",
        if strategy.margin.enabled { "on" } else { "off" }
    );
    eprintln!("\nConfiguration is valid.");
    Ok(())
}

fn print_plan(bot: &TradingBot, backtest: &BacktestConfig) {
    let strategy = bot.strategy();
    eprintln!("\nPlan:");
    eprintln!("  period:       {} .. {}", backtest.start, backtest.end);
    eprintln!("  capital:      {:.2}", backtest.initial_capital);
    eprintln!("  tick mode:    {}", backtest.tick_mode);
    eprintln!(
        "  rebalance:    {} {:02}:00",
        backtest.schedule.rebalance.weekday, backtest.schedule.rebalance.hour
    );
    eprintln!(
        "  liquidation:  {} {:02}:00",
        backtest.schedule.liquidation.weekday, backtest.schedule.liquidation.hour
    );
    eprintln!("  sell order:   {}", strategy.orders.sell_order.order_type);
    eprintln!(
        "  margin:       {}",
        if strategy.margin.enabled { "on" } else { "off" }
    );
    eprintln!(
        "  indicators:   {}",
        if bot.has_signals() { "on" } else { "off" }
    );
}

fn print_summary(result: &BacktestResult) {
    eprintln!("\n=== Weekly ===");
    for record in &result.weekly {
        eprintln!(
            "  {}  balance {:>14.2}  profit {:>8.2}%",
            record.ts.format("%Y-%m-%d"),
            record.balance,
            record.profit
        );
    }

    eprintln!("\n=== Results ===");
    eprintln!("Starting Cash:    {:.2}", result.starting_cash);
    eprintln!("Final Balance:    {:.2}", result.final_balance);
    eprintln!("Total Profit:     {:.2}%", result.final_profit);
    eprintln!("Rebalances:       {}", result.rebalances);
    if !result.remaining.is_empty() {
        eprintln!("Still Held:");
        for position in &result.remaining {
            eprintln!(
                "  {}: {} lots of {} @ {:.4}",
                position.instrument_id, position.quantity, position.lot, position.entry_price
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::strategy::OrderType;
    use chrono::Weekday;

    fn adapter(content: &str) -> FileConfigAdapter {
        FileConfigAdapter::from_string(content).unwrap()
    }

    #[test]
    fn backtest_config_defaults() {
        let config = adapter("[backtest]\nstart_date = 2024-01-01\nend_date = 2024-02-01\n");
        let bt = build_backtest_config(&config).unwrap();
        assert_eq!(bt.initial_capital, 100_000.0);
        assert_eq!(bt.tick_mode, TickMode::Staged);
        assert_eq!(bt.schedule, Schedule::default());
    }

    #[test]
    fn backtest_config_reads_schedule() {
        let config = adapter(
            "[backtest]\nstart_date = 2024-01-01\nend_date = 2024-02-01\ntick_mode = together\n\
             [schedule]\nrebalance_weekday = mon\nrebalance_hour = 9\nliquidation_weekday = wed\nliquidation_hour = 1\n",
        );
        let bt = build_backtest_config(&config).unwrap();
        assert_eq!(bt.tick_mode, TickMode::Together);
        assert_eq!(bt.schedule.rebalance, Slot { weekday: Weekday::Mon, hour: 9 });
        assert_eq!(bt.schedule.liquidation, Slot { weekday: Weekday::Wed, hour: 1 });
    }

    #[test]
    fn missing_dates_are_reported() {
        let config = adapter("[backtest]\nstart_date = 2024-01-01\n");
        assert!(matches!(
            build_backtest_config(&config),
            Err(RebalancerError::ConfigMissing { key, .. }) if key == "end_date"
        ));
    }

    #[test]
    fn strategy_from_config() {
        let config = adapter(
            "[universe]\nids = A, B\n\
             [scoring]\ntop_percent = 0.5\ntop_threshold = 1.5\n\
             [orders]\nsell_order_type = market\nsell_out_profit_profit = 0.1\n\
             [margin]\nenabled = true\ntaxes = 100:1, 1000:5\n",
        );
        let strategy = build_strategy(&config).unwrap();
        assert_eq!(strategy.universe.ids, vec!["A".to_string(), "B".to_string()]);
        assert_eq!(strategy.scoring.top_percent, 0.5);
        assert_eq!(strategy.scoring.top_threshold, 1.5);
        assert_eq!(strategy.orders.sell_order.order_type, OrderType::Market);
        assert_eq!(strategy.orders.sell_out_profit.profit, 0.1);
        assert_eq!(strategy.orders.sell_out_profit.defence, 0.3);
        assert!(strategy.margin.enabled);
        assert_eq!(strategy.margin.taxes.brackets(), &[(100.0, 1.0), (1000.0, 5.0)]);
    }

    #[test]
    fn tax_table_overrides_tariff() {
        let config = adapter("[backtest]\ntariff = trader\ntax_share = 0.001\n");
        let table = build_tax_table(&config).unwrap();
        assert_eq!(table.rate(InstrumentClass::Share), 0.001);
        assert_eq!(table.rate(InstrumentClass::Bond), 0.0005);
        assert_eq!(table.rate(InstrumentClass::Currency), 0.005);

        let config = adapter("[backtest]\ntax_etf = lots\n");
        assert!(build_tax_table(&config).is_err());
    }

    #[test]
    fn margin_taxes_only_apply_with_margin() {
        let config = adapter("[universe]\nids = A\n");
        let strategy = build_strategy(&config).unwrap();
        let executor = build_executor_config(&config, &strategy).unwrap();
        assert!(executor.margin_taxes.brackets().is_empty());
    }

    #[test]
    fn indicators_can_be_disabled() {
        let disabled = build_indicator_settings(&adapter("[indicators]\nenabled = false\n"));
        assert!(disabled.unwrap().is_none());
        let settings = build_indicator_settings(&adapter("[indicators]\nrsi_period = 14\n"))
            .unwrap()
            .unwrap();
        assert_eq!(settings.rsi_period, 14);
        assert_eq!(settings.ema_slow, 50);
    }

    #[test]
    fn negative_integers_are_rejected_not_wrapped() {
        let config = adapter(
            "[backtest]\nstart_date = 2024-01-01\nend_date = 2024-02-01\n\
             [schedule]\nrebalance_hour = -1\n",
        );
        assert!(matches!(
            build_backtest_config(&config),
            Err(RebalancerError::ConfigInvalid { key, .. }) if key == "rebalance_hour"
        ));

        let config = adapter("[indicators]\nema_fast = -5\n");
        assert!(matches!(
            build_indicator_settings(&config),
            Err(RebalancerError::ConfigInvalid { key, .. }) if key == "ema_fast"
        ));
    }

    #[test]
    fn unknown_score_source_is_rejected() {
        let config = adapter("[scoring]\nsource = carrier-pigeon\n");
        assert!(matches!(
            build_score_port(&config, &CancelToken::new()),
            Err(RebalancerError::ConfigInvalid { key, .. }) if key == "source"
        ));
    }
}
