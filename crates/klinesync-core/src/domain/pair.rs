use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::ValidationError;

/// Pair used when none is configured.
pub const DEFAULT_PAIR: &str = "BTCUSDT";

const MIN_PAIR_LEN: usize = 2;
const MAX_PAIR_LEN: usize = 20;

/// Normalized exchange trading pair, e.g. `BTCUSDT`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TradingPair(String);

impl TradingPair {
    /// Parse and normalize a pair to uppercase.
    pub fn parse(input: &str) -> Result<Self, ValidationError> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(ValidationError::EmptyPair);
        }

        let normalized = trimmed.to_ascii_uppercase();
        let len = normalized.chars().count();
        if !(MIN_PAIR_LEN..=MAX_PAIR_LEN).contains(&len) {
            return Err(ValidationError::PairLength {
                len,
                min: MIN_PAIR_LEN,
                max: MAX_PAIR_LEN,
            });
        }

        for (index, ch) in normalized.chars().enumerate() {
            if !ch.is_ascii_alphanumeric() {
                return Err(ValidationError::PairInvalidChar { ch, index });
            }
        }

        Ok(Self(normalized))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for TradingPair {
    fn default() -> Self {
        Self(DEFAULT_PAIR.to_owned())
    }
}

impl Display for TradingPair {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<String> for TradingPair {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<TradingPair> for String {
    fn from(value: TradingPair) -> Self {
        value.0
    }
}
