use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::ValidationError;

/// Canonical exchange identifiers, used as the source-name key in merged records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExchangeId {
    Binance,
    BinanceUs,
    BinanceFutures,
}

impl ExchangeId {
    pub const ALL: [Self; 3] = [Self::Binance, Self::BinanceUs, Self::BinanceFutures];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Binance => "binance",
            Self::BinanceUs => "binance_us",
            Self::BinanceFutures => "binance_futures",
        }
    }
}

impl Display for ExchangeId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExchangeId {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "binance" => Ok(Self::Binance),
            "binance_us" | "binanceus" => Ok(Self::BinanceUs),
            "binance_futures" | "futures" => Ok(Self::BinanceFutures),
            other => Err(ValidationError::InvalidExchange {
                value: other.to_owned(),
            }),
        }
    }
}
