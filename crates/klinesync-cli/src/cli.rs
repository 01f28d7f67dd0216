//! CLI argument definitions for klinesync.
//!
//! # Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `run` | Fetch, merge, validate and analyze, then persist |
//! | `status` | Summarize the persisted dataset |
//!
//! # Global Options
//!
//! | Option | Default | Description |
//! |--------|---------|-------------|
//! | `--data-dir` | `KLINESYNC_HOME` | Directory holding persisted documents |
//! | `--pair` | `KLINESYNC_PAIR` | Trading pair |
//! | `--sources` | `KLINESYNC_SOURCES` | Comma-separated exchanges |
//! | `--proxy` | `KLINESYNC_PROXIES` | Egress proxy, repeatable |
//! | `--pretty` | `false` | Pretty-print JSON output |
//! | `--log-json` | `false` | Emit logs as JSON lines on stderr |
//!
//! # Examples
//!
//! ```bash
//! # Refetch everything since the epoch
//! klinesync run --mode full
//!
//! # Fetch only the days after the persisted dataset
//! klinesync run --sources binance,binance_futures
//!
//! # Inspect the data directory
//! klinesync status --pretty
//! ```

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use klinesync_core::RunMode;

/// Multi-exchange daily kline synchronizer.
#[derive(Debug, Parser)]
#[command(
    name = "klinesync",
    author,
    version,
    about = "Multi-exchange daily kline synchronizer",
    long_about = "klinesync fetches daily klines for one trading pair from several \
Binance-family exchanges, merges them by date, flags data-quality anomalies and \
writes the validated dataset with summary statistics to a data directory.\n\
\n\
Settings come from KLINESYNC_* environment variables; flags override them."
)]
pub struct Cli {
    /// Data directory (overrides KLINESYNC_HOME).
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Trading pair such as BTCUSDT (overrides KLINESYNC_PAIR).
    #[arg(long, global = true)]
    pub pair: Option<String>,

    /// Comma-separated exchanges (overrides KLINESYNC_SOURCES).
    #[arg(long, global = true)]
    pub sources: Option<String>,

    /// First day of a full run, YYYY-MM-DD (overrides KLINESYNC_EPOCH).
    #[arg(long, global = true)]
    pub epoch: Option<String>,

    /// Egress proxy URL; repeat for rotation (overrides KLINESYNC_PROXIES).
    #[arg(long = "proxy", global = true)]
    pub proxies: Vec<String>,

    /// Consecutive page failures before an exchange is given up.
    #[arg(long, global = true)]
    pub max_failures: Option<u32>,

    /// Pretty-print JSON output with indentation.
    #[arg(long, global = true, default_value_t = false)]
    pub pretty: bool,

    /// Emit logs as JSON lines.
    #[arg(long, global = true, default_value_t = false)]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the acquisition pipeline.
    Run(RunArgs),
    /// Summarize the persisted dataset.
    Status,
}

#[derive(Debug, Args)]
pub struct RunArgs {
    /// full refetches from the epoch; increment resumes after the persisted dataset.
    #[arg(long, value_enum, default_value_t = ModeArg::Increment)]
    pub mode: ModeArg,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ModeArg {
    Full,
    Increment,
}

impl From<ModeArg> for RunMode {
    fn from(value: ModeArg) -> Self {
        match value {
            ModeArg::Full => RunMode::Full,
            ModeArg::Increment => RunMode::Increment,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_defaults_to_increment() {
        let cli = Cli::try_parse_from(["klinesync", "run"]).expect("parse");
        let Command::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(RunMode::from(args.mode), RunMode::Increment);
    }

    #[test]
    fn global_flags_follow_the_subcommand() {
        let cli = Cli::try_parse_from([
            "klinesync",
            "run",
            "--mode",
            "full",
            "--pair",
            "ethusdt",
            "--proxy",
            "http://a:1",
            "--proxy",
            "http://b:2",
            "--log-json",
        ])
        .expect("parse");

        assert_eq!(cli.pair.as_deref(), Some("ethusdt"));
        assert_eq!(cli.proxies, vec!["http://a:1", "http://b:2"]);
        assert!(cli.log_json);
        assert!(matches!(cli.command, Command::Run(RunArgs { mode: ModeArg::Full })));
    }

    #[test]
    fn unknown_mode_is_rejected() {
        assert!(Cli::try_parse_from(["klinesync", "run", "--mode", "weekly"]).is_err());
    }
}
