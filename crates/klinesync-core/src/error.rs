use thiserror::Error;

/// Validation and contract errors exposed by `klinesync-core`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("trading pair cannot be empty")]
    EmptyPair,
    #[error("trading pair length {len} is outside {min}..={max}")]
    PairLength { len: usize, min: usize, max: usize },
    #[error("trading pair contains invalid character '{ch}' at index {index}")]
    PairInvalidChar { ch: char, index: usize },

    #[error("invalid exchange '{value}', expected one of binance, binance_us, binance_futures")]
    InvalidExchange { value: String },

    #[error("date must be formatted YYYY-MM-DD: '{value}'")]
    InvalidDate { value: String },
    #[error("timestamp {value}ms is outside the supported calendar range")]
    TimestampOutOfRange { value: i64 },

    #[error("invalid run mode '{value}', expected full or increment")]
    InvalidMode { value: String },

    #[error("endpoint list for {exchange} must contain at least one URL")]
    EmptyEndpoints { exchange: String },
    #[error("endpoint rotation needs at least one URL")]
    EmptyRotation,
    #[error("at least one exchange must be configured")]
    NoExchanges,
    #[error("setting '{name}' has invalid value '{value}'")]
    InvalidSetting { name: &'static str, value: String },
}
