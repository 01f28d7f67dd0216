use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::{ExchangeId, TradeDate};

/// Price/volume fields checked for completeness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KlineField {
    Open,
    High,
    Low,
    Close,
    Volume,
}

impl KlineField {
    pub const OHLCV: [Self; 5] = [Self::Open, Self::High, Self::Low, Self::Close, Self::Volume];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::High => "high",
            Self::Low => "low",
            Self::Close => "close",
            Self::Volume => "volume",
        }
    }
}

impl Display for KlineField {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One daily candle from one exchange.
///
/// Numeric fields are `None` when the upstream value was absent or not a
/// finite number. Such a record still travels through the pipeline and is
/// reported as missing data by the validator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KlineRecord {
    pub date: TradeDate,
    pub open: Option<f64>,
    pub high: Option<f64>,
    pub low: Option<f64>,
    pub close: Option<f64>,
    pub volume: Option<f64>,
    pub trades: Option<u64>,
    pub quote_volume: Option<f64>,
}

impl KlineRecord {
    /// Builds a fully populated record. Non-finite inputs are stored as `None`.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        date: TradeDate,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: f64,
        trades: u64,
        quote_volume: f64,
    ) -> Self {
        Self {
            date,
            open: finite(open),
            high: finite(high),
            low: finite(low),
            close: finite(close),
            volume: finite(volume),
            trades: Some(trades),
            quote_volume: finite(quote_volume),
        }
    }

    pub fn field(&self, field: KlineField) -> Option<f64> {
        let value = match field {
            KlineField::Open => self.open,
            KlineField::High => self.high,
            KlineField::Low => self.low,
            KlineField::Close => self.close,
            KlineField::Volume => self.volume,
        };
        value.filter(|value| value.is_finite())
    }

    /// OHLCV fields that are absent or non-numeric.
    pub fn missing_fields(&self) -> Vec<KlineField> {
        KlineField::OHLCV
            .into_iter()
            .filter(|field| self.field(*field).is_none())
            .collect()
    }

    /// Complete OHLCV view, or `None` if any field is missing.
    pub fn ohlcv(&self) -> Option<Ohlcv> {
        Some(Ohlcv {
            open: self.field(KlineField::Open)?,
            high: self.field(KlineField::High)?,
            low: self.field(KlineField::Low)?,
            close: self.field(KlineField::Close)?,
            volume: self.field(KlineField::Volume)?,
        })
    }
}

/// Fully numeric price/volume values of one candle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ohlcv {
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// All exchanges' candles for one calendar day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergedDayRecord {
    pub date: TradeDate,
    pub exchanges: BTreeMap<ExchangeId, KlineRecord>,
}

impl MergedDayRecord {
    pub fn new(date: TradeDate) -> Self {
        Self {
            date,
            exchanges: BTreeMap::new(),
        }
    }

    pub fn with_exchange(mut self, exchange: ExchangeId, record: KlineRecord) -> Self {
        self.exchanges.insert(exchange, record);
        self
    }

    pub fn get(&self, exchange: ExchangeId) -> Option<&KlineRecord> {
        self.exchanges.get(&exchange)
    }

    /// Close prices of exchanges that reported a numeric close.
    pub fn closes(&self) -> BTreeMap<ExchangeId, f64> {
        self.exchanges
            .iter()
            .filter_map(|(exchange, record)| {
                record.field(KlineField::Close).map(|close| (*exchange, close))
            })
            .collect()
    }
}

fn finite(value: f64) -> Option<f64> {
    value.is_finite().then_some(value)
}
