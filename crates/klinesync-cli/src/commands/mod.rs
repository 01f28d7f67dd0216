mod run;
mod status;

use klinesync_core::config::parse_exchanges;
use klinesync_core::{PipelineConfig, TradeDate, TradingPair, ValidationError};
use serde_json::Value;

use crate::cli::{Cli, Command};
use crate::error::CliError;

pub async fn run(cli: &Cli) -> Result<Value, CliError> {
    let config = apply_overrides(cli, PipelineConfig::from_env()?)?;

    match &cli.command {
        Command::Run(args) => run::run(config, args.mode.into()).await,
        Command::Status => status::run(&config),
    }
}

/// Layers command-line flags over the environment-derived configuration.
fn apply_overrides(cli: &Cli, mut config: PipelineConfig) -> Result<PipelineConfig, CliError> {
    if let Some(data_dir) = &cli.data_dir {
        config.data_dir = data_dir.clone();
    }
    if let Some(pair) = &cli.pair {
        config.pair = TradingPair::parse(pair)?;
    }
    if let Some(sources) = &cli.sources {
        config.exchanges = parse_exchanges(sources)?;
    }
    if let Some(epoch) = &cli.epoch {
        config.epoch = TradeDate::parse(epoch)?;
    }
    if !cli.proxies.is_empty() {
        config.proxies = cli.proxies.clone();
    }
    if let Some(max_failures) = cli.max_failures {
        if max_failures == 0 {
            return Err(ValidationError::InvalidSetting {
                name: "max_failures",
                value: max_failures.to_string(),
            }
            .into());
        }
        config.fetch.retry.max_consecutive_failures = max_failures;
    }

    config.validate()?;
    Ok(config)
}
