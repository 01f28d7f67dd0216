//! Pipeline configuration.
//!
//! # Environment Variables
//!
//! | Variable | Meaning | Default |
//! |----------|---------|---------|
//! | `KLINESYNC_HOME` | data directory | `$HOME/.klinesync` |
//! | `KLINESYNC_PAIR` | trading pair | `BTCUSDT` |
//! | `KLINESYNC_EPOCH` | first day fetched in full mode | `2017-08-17` |
//! | `KLINESYNC_SOURCES` | comma-separated exchanges | all |
//! | `KLINESYNC_PROXIES` | comma-separated egress proxies | none |
//! | `KLINESYNC_MAX_FAILURES` | consecutive page failures before giving up | `10` |

use std::collections::BTreeMap;
use std::env;
use std::ffi::OsString;
use std::fmt::{self, Display, Formatter};
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::adapters::{ExchangeProfile, FetchSettings};
use crate::validate::ValidationThresholds;
use crate::{ExchangeId, TradeDate, TradingPair, ValidationError};

/// First day fetched by a full run unless configured otherwise.
pub const DEFAULT_EPOCH: TradeDate = TradeDate::from_date(time::macros::date!(2017 - 08 - 17));

/// Whether a run refetches everything or only the tail after the persisted dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    Full,
    Increment,
}

impl RunMode {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Increment => "increment",
        }
    }
}

impl Display for RunMode {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RunMode {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "full" => Ok(Self::Full),
            "increment" | "incremental" => Ok(Self::Increment),
            _ => Err(ValidationError::InvalidMode {
                value: value.to_owned(),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    pub data_dir: PathBuf,
    pub pair: TradingPair,
    /// First day fetched by a full run, and by an increment run with no dataset.
    pub epoch: TradeDate,
    pub exchanges: Vec<ExchangeId>,
    /// Base URLs per exchange. Exchanges without an entry use their built-in list.
    pub endpoints: BTreeMap<ExchangeId, Vec<String>>,
    pub proxies: Vec<String>,
    pub fetch: FetchSettings,
    pub thresholds: ValidationThresholds,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            data_dir: klinesync_store::resolve_home(),
            pair: TradingPair::default(),
            epoch: DEFAULT_EPOCH,
            exchanges: ExchangeId::ALL.to_vec(),
            endpoints: BTreeMap::new(),
            proxies: Vec::new(),
            fetch: FetchSettings::default(),
            thresholds: ValidationThresholds::default(),
        }
    }
}

impl PipelineConfig {
    /// Defaults overridden by the process environment.
    pub fn from_env() -> Result<Self, ValidationError> {
        Self::from_lookup(|name| env::var_os(name))
    }

    /// Defaults overridden by whatever `lookup` returns for each variable.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ValidationError>
    where
        F: Fn(&str) -> Option<OsString>,
    {
        let text = |name: &str| {
            lookup(name)
                .map(|value| value.to_string_lossy().trim().to_owned())
                .filter(|value| !value.is_empty())
        };
        let mut config = Self {
            data_dir: klinesync_store::resolve_home_with(&lookup),
            ..Self::default()
        };

        if let Some(pair) = text("KLINESYNC_PAIR") {
            config.pair = TradingPair::parse(&pair)?;
        }
        if let Some(epoch) = text("KLINESYNC_EPOCH") {
            config.epoch = TradeDate::parse(&epoch)?;
        }
        if let Some(sources) = text("KLINESYNC_SOURCES") {
            config.exchanges = parse_exchanges(&sources)?;
        }
        if let Some(proxies) = text("KLINESYNC_PROXIES") {
            config.proxies = split_list(&proxies).map(str::to_owned).collect();
        }
        if let Some(max) = text("KLINESYNC_MAX_FAILURES") {
            config.fetch.retry.max_consecutive_failures = max
                .parse::<u32>()
                .ok()
                .filter(|max| *max > 0)
                .ok_or(ValidationError::InvalidSetting {
                    name: "KLINESYNC_MAX_FAILURES",
                    value: max,
                })?;
        }

        Ok(config)
    }

    /// Base URLs for `exchange`, configured or built in.
    pub fn endpoints_for(&self, exchange: ExchangeId) -> Vec<String> {
        self.endpoints
            .get(&exchange)
            .filter(|urls| !urls.is_empty())
            .cloned()
            .unwrap_or_else(|| ExchangeProfile::for_exchange(exchange).default_endpoints())
    }

    /// Rejects configurations a run could not start with.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.exchanges.is_empty() {
            return Err(ValidationError::NoExchanges);
        }
        if self.fetch.page_size == 0 {
            return Err(ValidationError::InvalidSetting {
                name: "page_size",
                value: self.fetch.page_size.to_string(),
            });
        }
        if self.fetch.retry.max_consecutive_failures == 0 {
            return Err(ValidationError::InvalidSetting {
                name: "max_consecutive_failures",
                value: self.fetch.retry.max_consecutive_failures.to_string(),
            });
        }
        Ok(())
    }
}

/// Parses a comma-separated exchange list, dropping repeats.
pub fn parse_exchanges(input: &str) -> Result<Vec<ExchangeId>, ValidationError> {
    let mut exchanges = Vec::new();
    for item in split_list(input) {
        let exchange = item.parse::<ExchangeId>()?;
        if !exchanges.contains(&exchange) {
            exchanges.push(exchange);
        }
    }
    if exchanges.is_empty() {
        return Err(ValidationError::NoExchanges);
    }
    Ok(exchanges)
}

fn split_list(input: &str) -> impl Iterator<Item = &str> {
    input.split(',').map(str::trim).filter(|item| !item.is_empty())
}
