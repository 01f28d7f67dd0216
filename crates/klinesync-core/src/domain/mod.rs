//! # Domain Models
//!
//! Canonical domain types for klinesync.
//!
//! | Type | Description |
//! |------|-------------|
//! | [`KlineRecord`] | One exchange's daily candle, numeric fields optional |
//! | [`MergedDayRecord`] | All exchanges' candles for one calendar day |
//! | [`TradeDate`] | UTC calendar day, serialized `YYYY-MM-DD` |
//! | [`TradingPair`] | Validated pair symbol such as `BTCUSDT` |
//!
//! Upstream values that are absent or not numeric are kept as `None` rather
//! than a sentinel float, so the validator can report them.

mod date;
mod models;
mod pair;

pub use date::TradeDate;
pub use models::{KlineField, KlineRecord, MergedDayRecord, Ohlcv};
pub use pair::{TradingPair, DEFAULT_PAIR};
