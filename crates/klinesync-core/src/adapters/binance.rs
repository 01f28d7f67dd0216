//! Wire profiles of the Binance-family venues.
//!
//! All three venues speak the same kline tuple format; they differ in base
//! hosts, path, page-size ceiling and which timestamp the candle is keyed by.

use crate::ExchangeId;

/// Static description of one exchange's kline endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExchangeProfile {
    pub exchange: ExchangeId,
    /// Equivalent base URLs in failover order.
    pub base_urls: &'static [&'static str],
    pub klines_path: &'static str,
    /// Tuple index of the timestamp used for the day and the cursor.
    pub timestamp_index: usize,
    pub max_page_size: usize,
}

pub const BINANCE: ExchangeProfile = ExchangeProfile {
    exchange: ExchangeId::Binance,
    base_urls: &[
        "https://api.binance.com",
        "https://api1.binance.com",
        "https://api2.binance.com",
        "https://api3.binance.com",
        "https://api4.binance.com",
        "https://data-api.binance.vision",
    ],
    klines_path: "/api/v3/klines",
    timestamp_index: 0,
    max_page_size: 1_000,
};

pub const BINANCE_US: ExchangeProfile = ExchangeProfile {
    exchange: ExchangeId::BinanceUs,
    base_urls: &["https://api.binance.us"],
    klines_path: "/api/v3/klines",
    timestamp_index: 0,
    max_page_size: 1_000,
};

pub const BINANCE_FUTURES: ExchangeProfile = ExchangeProfile {
    exchange: ExchangeId::BinanceFutures,
    base_urls: &["https://fapi.binance.com", "https://fapi1.binance.com"],
    klines_path: "/fapi/v1/klines",
    timestamp_index: 6,
    max_page_size: 1_500,
};

impl ExchangeProfile {
    pub const fn for_exchange(exchange: ExchangeId) -> Self {
        match exchange {
            ExchangeId::Binance => BINANCE,
            ExchangeId::BinanceUs => BINANCE_US,
            ExchangeId::BinanceFutures => BINANCE_FUTURES,
        }
    }

    pub fn default_endpoints(&self) -> Vec<String> {
        self.base_urls.iter().map(|url| (*url).to_owned()).collect()
    }

    /// Daily-kline page URL starting at `start_ms`.
    pub fn page_url(
        &self,
        base_url: &str,
        pair: &str,
        start_ms: i64,
        end_ms: i64,
        limit: usize,
    ) -> String {
        format!(
            "{}{}?symbol={}&interval=1d&startTime={}&endTime={}&limit={}",
            base_url.trim_end_matches('/'),
            self.klines_path,
            urlencoding::encode(pair),
            start_ms,
            end_ms.saturating_sub(1),
            limit.clamp(1, self.max_page_size),
        )
    }
}
