//! Descriptive statistics over the valid daily series.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{ExchangeId, MergedDayRecord, Ohlcv, TradeDate};

/// Trading days assumed per year when annualizing volatility.
pub const TRADING_DAYS_PER_YEAR: f64 = 252.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: TradeDate,
    pub end: TradeDate,
}

/// A price together with where and when it was observed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub value: f64,
    pub date: TradeDate,
    pub exchange: ExchangeId,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PriceExtremes {
    pub highest_high: Option<PricePoint>,
    pub lowest_low: Option<PricePoint>,
    pub highest_close: Option<PricePoint>,
    pub lowest_close: Option<PricePoint>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectionCounts {
    pub up: usize,
    pub down: usize,
    pub flat: usize,
    pub longest_up_streak: usize,
    pub longest_down_streak: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExchangeStats {
    pub days: usize,
    pub average_close: f64,
    /// Annualized standard deviation of daily log returns, in percent.
    /// `None` with fewer than two returns.
    pub volatility_pct: Option<f64>,
    pub total_volume: f64,
    pub market_share_pct: f64,
    pub directions: DirectionCounts,
}

/// Aggregate of the per-day mean close across exchanges.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BucketStats {
    pub days: usize,
    pub average_close: f64,
    pub min_close: f64,
    pub max_close: f64,
    pub total_volume: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TimeBuckets {
    pub by_year: BTreeMap<i32, BucketStats>,
    /// Keyed `YYYY-MM`.
    pub by_month: BTreeMap<String, BucketStats>,
    /// Keyed by lowercase weekday name.
    pub by_weekday: BTreeMap<String, BucketStats>,
}

/// Close spread between two exchanges on the days both reported.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpreadStats {
    pub first: ExchangeId,
    pub second: ExchangeId,
    pub days: usize,
    pub mean_spread_pct: f64,
    pub max_spread_pct: f64,
    pub max_spread_date: TradeDate,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub date_range: Option<DateRange>,
    pub total_days: usize,
    pub extremes: PriceExtremes,
    pub exchanges: BTreeMap<ExchangeId, ExchangeStats>,
    pub buckets: TimeBuckets,
    /// Keyed `<first>/<second>`.
    pub spreads: BTreeMap<String, SpreadStats>,
}

#[derive(Default)]
struct ExchangeAccumulator {
    days: usize,
    close_sum: f64,
    total_volume: f64,
    previous_close: Option<f64>,
    log_returns: Vec<f64>,
    directions: DirectionCounts,
    up_run: usize,
    down_run: usize,
}

impl ExchangeAccumulator {
    fn push(&mut self, candle: &Ohlcv) {
        self.days += 1;
        self.close_sum += candle.close;
        self.total_volume += candle.volume;

        if let Some(previous) = self.previous_close {
            if previous > 0.0 && candle.close > 0.0 {
                self.log_returns.push((candle.close / previous).ln());
            }
            if candle.close > previous {
                self.directions.up += 1;
                self.up_run += 1;
                self.down_run = 0;
            } else if candle.close < previous {
                self.directions.down += 1;
                self.down_run += 1;
                self.up_run = 0;
            } else {
                self.directions.flat += 1;
                self.up_run = 0;
                self.down_run = 0;
            }
            self.directions.longest_up_streak = self.directions.longest_up_streak.max(self.up_run);
            self.directions.longest_down_streak =
                self.directions.longest_down_streak.max(self.down_run);
        }
        self.previous_close = Some(candle.close);
    }

    fn finish(self, grand_volume: f64) -> ExchangeStats {
        let market_share_pct = if grand_volume > 0.0 {
            self.total_volume / grand_volume * 100.0
        } else {
            0.0
        };

        ExchangeStats {
            days: self.days,
            average_close: self.close_sum / self.days as f64,
            volatility_pct: sample_std_dev(&self.log_returns)
                .map(|std_dev| std_dev * TRADING_DAYS_PER_YEAR.sqrt() * 100.0),
            total_volume: self.total_volume,
            market_share_pct,
            directions: self.directions,
        }
    }
}

#[derive(Default)]
struct BucketAccumulator {
    days: usize,
    close_sum: f64,
    min_close: f64,
    max_close: f64,
    total_volume: f64,
}

impl BucketAccumulator {
    fn push(&mut self, mean_close: f64, volume: f64) {
        if self.days == 0 {
            self.min_close = mean_close;
            self.max_close = mean_close;
        } else {
            self.min_close = self.min_close.min(mean_close);
            self.max_close = self.max_close.max(mean_close);
        }
        self.days += 1;
        self.close_sum += mean_close;
        self.total_volume += volume;
    }

    fn finish(self) -> BucketStats {
        BucketStats {
            days: self.days,
            average_close: self.close_sum / self.days as f64,
            min_close: self.min_close,
            max_close: self.max_close,
            total_volume: self.total_volume,
        }
    }
}

#[derive(Default)]
struct SpreadAccumulator {
    days: usize,
    spread_sum: f64,
    max: Option<(f64, TradeDate)>,
}

/// Computes statistics over `valid` in one forward pass.
///
/// Candles with any missing OHLCV value are ignored.
pub fn analyze(valid: &[MergedDayRecord]) -> AnalysisResult {
    let mut extremes = PriceExtremes::default();
    let mut exchanges: BTreeMap<ExchangeId, ExchangeAccumulator> = BTreeMap::new();
    let mut years: BTreeMap<i32, BucketAccumulator> = BTreeMap::new();
    let mut months: BTreeMap<String, BucketAccumulator> = BTreeMap::new();
    let mut weekdays: BTreeMap<String, BucketAccumulator> = BTreeMap::new();
    let mut spreads: BTreeMap<(ExchangeId, ExchangeId), SpreadAccumulator> = BTreeMap::new();

    for day in valid {
        let candles: Vec<(ExchangeId, Ohlcv)> = day
            .exchanges
            .iter()
            .filter_map(|(exchange, record)| record.ohlcv().map(|candle| (*exchange, candle)))
            .collect();
        if candles.is_empty() {
            continue;
        }

        let mut close_sum = 0.0;
        let mut volume_sum = 0.0;
        for (exchange, candle) in &candles {
            let at = |value| PricePoint {
                value,
                date: day.date,
                exchange: *exchange,
            };
            keep_if(&mut extremes.highest_high, at(candle.high), |new, old| new > old);
            keep_if(&mut extremes.lowest_low, at(candle.low), |new, old| new < old);
            keep_if(&mut extremes.highest_close, at(candle.close), |new, old| new > old);
            keep_if(&mut extremes.lowest_close, at(candle.close), |new, old| new < old);

            exchanges.entry(*exchange).or_default().push(candle);
            close_sum += candle.close;
            volume_sum += candle.volume;
        }

        let mean_close = close_sum / candles.len() as f64;
        years
            .entry(day.date.year())
            .or_default()
            .push(mean_close, volume_sum);
        months
            .entry(day.date.month_label())
            .or_default()
            .push(mean_close, volume_sum);
        weekdays
            .entry(day.date.weekday().to_string().to_lowercase())
            .or_default()
            .push(mean_close, volume_sum);

        for (index, (first, first_candle)) in candles.iter().enumerate() {
            for (second, second_candle) in &candles[index + 1..] {
                let pair_mean = (first_candle.close + second_candle.close) / 2.0;
                if pair_mean <= 0.0 {
                    continue;
                }
                let spread_pct =
                    (first_candle.close - second_candle.close).abs() / pair_mean * 100.0;
                let spread = spreads.entry((*first, *second)).or_default();
                spread.days += 1;
                spread.spread_sum += spread_pct;
                if spread.max.map_or(true, |(max, _)| spread_pct > max) {
                    spread.max = Some((spread_pct, day.date));
                }
            }
        }
    }

    let grand_volume: f64 = exchanges.values().map(|acc| acc.total_volume).sum();
    let date_range = match (valid.first(), valid.last()) {
        (Some(first), Some(last)) => Some(DateRange {
            start: first.date,
            end: last.date,
        }),
        _ => None,
    };

    AnalysisResult {
        date_range,
        total_days: valid.len(),
        extremes,
        exchanges: exchanges
            .into_iter()
            .map(|(exchange, acc)| (exchange, acc.finish(grand_volume)))
            .collect(),
        buckets: TimeBuckets {
            by_year: finish_buckets(years),
            by_month: finish_buckets(months),
            by_weekday: finish_buckets(weekdays),
        },
        spreads: spreads
            .into_iter()
            .filter_map(|((first, second), acc)| {
                let (max_spread_pct, max_spread_date) = acc.max?;
                Some((
                    format!("{first}/{second}"),
                    SpreadStats {
                        first,
                        second,
                        days: acc.days,
                        mean_spread_pct: acc.spread_sum / acc.days as f64,
                        max_spread_pct,
                        max_spread_date,
                    },
                ))
            })
            .collect(),
    }
}

fn keep_if(slot: &mut Option<PricePoint>, candidate: PricePoint, better: fn(f64, f64) -> bool) {
    match slot {
        Some(current) if !better(candidate.value, current.value) => {}
        _ => *slot = Some(candidate),
    }
}

fn finish_buckets<K: Ord>(buckets: BTreeMap<K, BucketAccumulator>) -> BTreeMap<K, BucketStats> {
    buckets
        .into_iter()
        .map(|(key, acc)| (key, acc.finish()))
        .collect()
}

fn sample_std_dev(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    let variance = values
        .iter()
        .map(|value| (value - mean).powi(2))
        .sum::<f64>()
        / (values.len() - 1) as f64;
    Some(variance.sqrt())
}
