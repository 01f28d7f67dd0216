//! Exchange adapters.
//!
//! | Exchange | Base hosts | Path | Day keyed by |
//! |----------|-----------|------|--------------|
//! | `binance` | `api[1-4].binance.com`, `data-api.binance.vision` | `/api/v3/klines` | open time |
//! | `binance_us` | `api.binance.us` | `/api/v3/klines` | open time |
//! | `binance_futures` | `fapi[1].binance.com` | `/fapi/v1/klines` | close time |

pub mod binance;
pub mod client;
pub mod wire;

pub use binance::ExchangeProfile;
pub use client::{FetchSettings, KlineClient};
pub use wire::{decode_page, WireKline};
