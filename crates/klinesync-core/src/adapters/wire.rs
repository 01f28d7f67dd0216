//! Decoding of the Binance-family kline wire format.
//!
//! Each candle is a fixed-arity array:
//! `[openTime, open, high, low, close, volume, closeTime, quoteVolume,
//! tradeCount, takerBuyVolume, takerBuyQuoteVolume, ignore]`.
//! Prices and volumes arrive as decimal strings; some mirrors send numbers.

use serde_json::Value;

use crate::kline_source::FetchError;
use crate::{KlineRecord, TradeDate};

const OPEN: usize = 1;
const HIGH: usize = 2;
const LOW: usize = 3;
const CLOSE: usize = 4;
const VOLUME: usize = 5;
const QUOTE_VOLUME: usize = 7;
const TRADE_COUNT: usize = 8;

/// One decoded candle with the timestamp that drives the fetch cursor.
#[derive(Debug, Clone, PartialEq)]
pub struct WireKline {
    pub timestamp_ms: i64,
    pub record: KlineRecord,
}

/// Decodes one page body.
///
/// A body that is not an array of arrays is a decode failure. Rows whose
/// timestamp cannot be read are dropped because they cannot be placed on a
/// date; every other field that is absent or non-numeric becomes `None`.
pub fn decode_page(body: &str, timestamp_index: usize) -> Result<Vec<WireKline>, FetchError> {
    let value: Value = serde_json::from_str(body)
        .map_err(|e| FetchError::Decode(format!("invalid json: {e}")))?;

    let rows = value.as_array().ok_or_else(|| {
        FetchError::Decode(format!("expected an array of klines, got {}", describe(&value)))
    })?;

    let mut klines = Vec::with_capacity(rows.len());
    for row in rows {
        let Some(fields) = row.as_array() else {
            return Err(FetchError::Decode(format!(
                "expected kline tuple, got {}",
                describe(row)
            )));
        };

        let Some(timestamp_ms) = fields.get(timestamp_index).and_then(integer) else {
            tracing::warn!(?row, "dropping kline without a readable timestamp");
            continue;
        };
        let Ok(date) = TradeDate::from_unix_millis(timestamp_ms) else {
            tracing::warn!(timestamp_ms, "dropping kline with out-of-range timestamp");
            continue;
        };

        let record = KlineRecord {
            date,
            open: number(fields, OPEN),
            high: number(fields, HIGH),
            low: number(fields, LOW),
            close: number(fields, CLOSE),
            volume: number(fields, VOLUME),
            trades: fields.get(TRADE_COUNT).and_then(integer).and_then(|n| u64::try_from(n).ok()),
            quote_volume: number(fields, QUOTE_VOLUME),
        };
        klines.push(WireKline {
            timestamp_ms,
            record,
        });
    }

    Ok(klines)
}

fn number(fields: &[Value], index: usize) -> Option<f64> {
    let parsed = match fields.get(index)? {
        Value::String(text) => text.trim().parse::<f64>().ok(),
        Value::Number(number) => number.as_f64(),
        _ => None,
    };
    parsed.filter(|value| value.is_finite())
}

fn integer(value: &Value) -> Option<i64> {
    match value {
        Value::Number(number) => number.as_i64(),
        Value::String(text) => text.trim().parse::<i64>().ok(),
        _ => None,
    }
}

fn describe(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
