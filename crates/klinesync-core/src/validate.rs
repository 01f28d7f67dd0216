//! Data-quality rules over the merged daily series.
//!
//! Four rules run on every day regardless of each other, so one day can
//! carry several anomalies. A day that triggers any rule for any exchange
//! is left out of the valid sequence as a whole.

use std::collections::{BTreeMap, VecDeque};

use serde::{Deserialize, Serialize};

use crate::{ExchangeId, KlineField, MergedDayRecord, TradeDate};

/// Rule thresholds. Percentages are in percent, not fractions.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ValidationThresholds {
    /// Cross-exchange close spread, as percent of the mean close.
    pub max_deviation_pct: f64,
    /// Volume over trailing average ratio that counts as a spike.
    pub volume_spike_ratio: f64,
    /// Number of earlier days averaged for the spike rule.
    pub volume_window: usize,
    /// Open against previous close, in percent.
    pub max_gap_pct: f64,
}

impl Default for ValidationThresholds {
    fn default() -> Self {
        Self {
            max_deviation_pct: 1.0,
            volume_spike_ratio: 3.0,
            volume_window: 30,
            max_gap_pct: 5.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyKind {
    PriceDeviation,
    VolumeSpike,
    MissingData,
    PriceGap,
}

impl AnomalyKind {
    pub const ALL: [Self; 4] = [
        Self::PriceDeviation,
        Self::VolumeSpike,
        Self::MissingData,
        Self::PriceGap,
    ];
}

/// One rule violation with the values that triggered it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AnomalyEntry {
    PriceDeviation {
        date: TradeDate,
        closes: BTreeMap<ExchangeId, f64>,
        deviation_pct: f64,
    },
    VolumeSpike {
        date: TradeDate,
        exchange: ExchangeId,
        volume: f64,
        average_volume: f64,
        ratio: f64,
    },
    MissingData {
        date: TradeDate,
        exchange: ExchangeId,
        fields: Vec<KlineField>,
    },
    PriceGap {
        date: TradeDate,
        exchange: ExchangeId,
        previous_close: f64,
        open: f64,
        gap_pct: f64,
    },
}

impl AnomalyEntry {
    pub fn kind(&self) -> AnomalyKind {
        match self {
            Self::PriceDeviation { .. } => AnomalyKind::PriceDeviation,
            Self::VolumeSpike { .. } => AnomalyKind::VolumeSpike,
            Self::MissingData { .. } => AnomalyKind::MissingData,
            Self::PriceGap { .. } => AnomalyKind::PriceGap,
        }
    }

    pub fn date(&self) -> TradeDate {
        match self {
            Self::PriceDeviation { date, .. }
            | Self::VolumeSpike { date, .. }
            | Self::MissingData { date, .. }
            | Self::PriceGap { date, .. } => *date,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationStats {
    pub total_days: usize,
    pub valid_days: usize,
    /// Valid days each exchange contributed to.
    pub exchange_coverage: BTreeMap<ExchangeId, usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub valid: Vec<MergedDayRecord>,
    pub anomalies: BTreeMap<AnomalyKind, Vec<AnomalyEntry>>,
    pub stats: ValidationStats,
}

impl ValidationResult {
    pub fn anomaly_count(&self) -> usize {
        self.anomalies.values().map(Vec::len).sum()
    }

    pub fn entries(&self, kind: AnomalyKind) -> &[AnomalyEntry] {
        self.anomalies.get(&kind).map(Vec::as_slice).unwrap_or(&[])
    }
}

#[derive(Debug, Clone, Default)]
pub struct Validator {
    thresholds: ValidationThresholds,
}

impl Validator {
    pub fn new(thresholds: ValidationThresholds) -> Self {
        Self { thresholds }
    }

    /// Classifies every day of `merged` and returns the days no rule fired on.
    pub fn validate(&self, merged: &[MergedDayRecord]) -> ValidationResult {
        self.validate_with_history(&[], merged)
    }

    /// Like [`validate`](Self::validate), with `history` as earlier days.
    ///
    /// History only seeds the trailing volumes and last closes of each
    /// exchange. Its days are never classified or returned.
    pub fn validate_with_history(
        &self,
        history: &[MergedDayRecord],
        merged: &[MergedDayRecord],
    ) -> ValidationResult {
        let window = self.thresholds.volume_window.max(1);
        let mut prior = SourceHistory::default();
        for day in history {
            prior.observe(day, window);
        }

        let mut anomalies: BTreeMap<AnomalyKind, Vec<AnomalyEntry>> = AnomalyKind::ALL
            .into_iter()
            .map(|kind| (kind, Vec::new()))
            .collect();
        let mut valid = Vec::new();
        let mut stats = ValidationStats {
            total_days: merged.len(),
            ..ValidationStats::default()
        };

        for day in merged {
            let mut found = Vec::new();

            self.check_completeness(day, &mut found);
            self.check_deviation(day, &mut found);
            self.check_volume(day, &prior, &mut found);
            self.check_gap(day, &prior, &mut found);
            prior.observe(day, window);

            if found.is_empty() {
                for exchange in day.exchanges.keys() {
                    *stats.exchange_coverage.entry(*exchange).or_default() += 1;
                }
                valid.push(day.clone());
            }
            for entry in found {
                anomalies.entry(entry.kind()).or_default().push(entry);
            }
        }

        stats.valid_days = valid.len();
        tracing::debug!(
            history_days = history.len(),
            total_days = stats.total_days,
            valid_days = stats.valid_days,
            "validated merged series"
        );

        ValidationResult {
            valid,
            anomalies,
            stats,
        }
    }

    fn check_completeness(&self, day: &MergedDayRecord, found: &mut Vec<AnomalyEntry>) {
        for (exchange, record) in &day.exchanges {
            let fields = record.missing_fields();
            if !fields.is_empty() {
                found.push(AnomalyEntry::MissingData {
                    date: day.date,
                    exchange: *exchange,
                    fields,
                });
            }
        }
    }

    fn check_deviation(&self, day: &MergedDayRecord, found: &mut Vec<AnomalyEntry>) {
        let closes = day.closes();
        if closes.len() < 2 {
            return;
        }

        let (mut min, mut max, mut sum) = (f64::INFINITY, f64::NEG_INFINITY, 0.0);
        for close in closes.values() {
            min = min.min(*close);
            max = max.max(*close);
            sum += close;
        }
        let mean = sum / closes.len() as f64;
        if mean <= 0.0 {
            return;
        }

        let deviation_pct = (max - min) / mean * 100.0;
        if deviation_pct > self.thresholds.max_deviation_pct {
            found.push(AnomalyEntry::PriceDeviation {
                date: day.date,
                closes,
                deviation_pct,
            });
        }
    }

    fn check_volume(
        &self,
        day: &MergedDayRecord,
        prior: &SourceHistory,
        found: &mut Vec<AnomalyEntry>,
    ) {
        for (exchange, record) in &day.exchanges {
            let Some(volume) = record.field(KlineField::Volume) else {
                continue;
            };
            let Some(average_volume) = prior.average_volume(*exchange) else {
                continue;
            };
            if average_volume <= 0.0 {
                continue;
            }

            let ratio = volume / average_volume;
            if ratio > self.thresholds.volume_spike_ratio {
                found.push(AnomalyEntry::VolumeSpike {
                    date: day.date,
                    exchange: *exchange,
                    volume,
                    average_volume,
                    ratio,
                });
            }
        }
    }

    fn check_gap(
        &self,
        day: &MergedDayRecord,
        prior: &SourceHistory,
        found: &mut Vec<AnomalyEntry>,
    ) {
        for (exchange, record) in &day.exchanges {
            let Some(previous_close) = prior.last_close(*exchange) else {
                continue;
            };
            let Some(open) = record.field(KlineField::Open) else {
                continue;
            };
            if previous_close <= 0.0 {
                continue;
            }

            let gap_pct = (open - previous_close).abs() / previous_close * 100.0;
            if gap_pct > self.thresholds.max_gap_pct {
                found.push(AnomalyEntry::PriceGap {
                    date: day.date,
                    exchange: *exchange,
                    previous_close,
                    open,
                    gap_pct,
                });
            }
        }
    }
}

/// Per-exchange state carried across days: trailing volumes and the most
/// recent close, whichever earlier day it came from.
#[derive(Debug, Default)]
struct SourceHistory {
    volumes: BTreeMap<ExchangeId, VecDeque<f64>>,
    closes: BTreeMap<ExchangeId, f64>,
}

impl SourceHistory {
    fn observe(&mut self, day: &MergedDayRecord, window: usize) {
        for (exchange, record) in &day.exchanges {
            if let Some(volume) = record.field(KlineField::Volume) {
                let trailing = self.volumes.entry(*exchange).or_default();
                trailing.push_back(volume);
                while trailing.len() > window {
                    trailing.pop_front();
                }
            }
            if let Some(close) = record.field(KlineField::Close) {
                self.closes.insert(*exchange, close);
            }
        }
    }

    fn average_volume(&self, exchange: ExchangeId) -> Option<f64> {
        let trailing = self.volumes.get(&exchange).filter(|volumes| !volumes.is_empty())?;
        Some(trailing.iter().sum::<f64>() / trailing.len() as f64)
    }

    fn last_close(&self, exchange: ExchangeId) -> Option<f64> {
        self.closes.get(&exchange).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::KlineRecord;

    fn date(offset: u8) -> TradeDate {
        TradeDate::from_calendar(2024, 1, 1 + offset).expect("date")
    }

    fn candle(day: TradeDate, close: f64, volume: f64) -> KlineRecord {
        KlineRecord::new(day, close, close, close, close, volume, 10, close * volume)
    }

    fn single(offset: u8, close: f64, volume: f64) -> MergedDayRecord {
        let day = date(offset);
        MergedDayRecord::new(day).with_exchange(ExchangeId::Binance, candle(day, close, volume))
    }

    #[test]
    fn identical_closes_do_not_deviate_but_two_percent_does() {
        let d1 = date(0);
        let d2 = date(1);
        let merged = vec![
            MergedDayRecord::new(d1)
                .with_exchange(ExchangeId::Binance, candle(d1, 100.0, 10.0))
                .with_exchange(ExchangeId::BinanceUs, candle(d1, 100.0, 10.0)),
            MergedDayRecord::new(d2)
                .with_exchange(ExchangeId::Binance, candle(d2, 100.0, 10.0))
                .with_exchange(ExchangeId::BinanceUs, candle(d2, 102.0, 10.0)),
        ];

        let result = Validator::default().validate(&merged);
        let deviations = result.entries(AnomalyKind::PriceDeviation);

        assert_eq!(deviations.len(), 1);
        assert_eq!(deviations[0].date(), d2);
        let AnomalyEntry::PriceDeviation { deviation_pct, .. } = &deviations[0] else {
            panic!("expected price deviation");
        };
        assert!((deviation_pct - 200.0 / 101.0).abs() < 1e-9);
        assert_eq!(result.valid.len(), 1);
        assert_eq!(result.valid[0].date, d1);
    }

    #[test]
    fn volume_five_times_trailing_average_is_a_spike() {
        let mut merged: Vec<MergedDayRecord> = (0..5).map(|i| single(i, 100.0, 200.0)).collect();
        merged.push(single(5, 100.0, 1_000.0));

        let result = Validator::default().validate(&merged);
        let spikes = result.entries(AnomalyKind::VolumeSpike);

        assert_eq!(spikes.len(), 1);
        let AnomalyEntry::VolumeSpike {
            date: spike_date,
            exchange,
            average_volume,
            ratio,
            ..
        } = &spikes[0]
        else {
            panic!("expected volume spike");
        };
        assert_eq!(*spike_date, date(5));
        assert_eq!(*exchange, ExchangeId::Binance);
        assert_eq!(*average_volume, 200.0);
        assert_eq!(*ratio, 5.0);
    }

    #[test]
    fn first_day_has_no_volume_history() {
        let result = Validator::default().validate(&[single(0, 100.0, 1_000_000.0)]);
        assert!(result.entries(AnomalyKind::VolumeSpike).is_empty());
        assert_eq!(result.stats.valid_days, 1);
    }

    #[test]
    fn spike_average_uses_only_the_trailing_window() {
        let thresholds = ValidationThresholds {
            volume_window: 2,
            ..ValidationThresholds::default()
        };
        let merged = vec![
            single(0, 100.0, 1.0),
            single(1, 100.0, 100.0),
            single(2, 100.0, 100.0),
            single(3, 100.0, 250.0),
        ];

        let result = Validator::new(thresholds).validate(&merged);

        // Day 1 spikes against day 0 only; day 3 averages days 1 and 2.
        let spikes = result.entries(AnomalyKind::VolumeSpike);
        assert_eq!(spikes.len(), 1);
        assert_eq!(spikes[0].date(), date(1));
    }

    #[test]
    fn one_missing_field_yields_exactly_one_entry() {
        let day = date(0);
        let mut broken = candle(day, 100.0, 10.0);
        broken.high = None;
        let merged = vec![MergedDayRecord::new(day)
            .with_exchange(ExchangeId::Binance, candle(day, 100.0, 10.0))
            .with_exchange(ExchangeId::BinanceFutures, broken)];

        let result = Validator::default().validate(&merged);
        let missing = result.entries(AnomalyKind::MissingData);

        assert_eq!(missing.len(), 1);
        assert_eq!(
            missing[0],
            AnomalyEntry::MissingData {
                date: day,
                exchange: ExchangeId::BinanceFutures,
                fields: vec![KlineField::High],
            }
        );
        assert!(result.valid.is_empty());
    }

    #[test]
    fn gap_against_previous_close_is_flagged() {
        let first = single(0, 100.0, 10.0);
        let day = date(1);
        let gapped = MergedDayRecord::new(day).with_exchange(
            ExchangeId::Binance,
            KlineRecord::new(day, 110.0, 111.0, 109.0, 110.0, 10.0, 1, 1.0),
        );

        let result = Validator::default().validate(&[first, gapped]);
        let gaps = result.entries(AnomalyKind::PriceGap);

        assert_eq!(gaps.len(), 1);
        let AnomalyEntry::PriceGap { gap_pct, previous_close, .. } = &gaps[0] else {
            panic!("expected price gap");
        };
        assert_eq!(*previous_close, 100.0);
        assert!((gap_pct - 10.0).abs() < 1e-9);
    }

    #[test]
    fn anomalous_day_is_excluded_whole_and_coverage_counts_valid_days() {
        let d1 = date(0);
        let d2 = date(1);
        let merged = vec![
            MergedDayRecord::new(d1)
                .with_exchange(ExchangeId::Binance, candle(d1, 100.0, 10.0))
                .with_exchange(ExchangeId::BinanceUs, candle(d1, 100.0, 10.0)),
            MergedDayRecord::new(d2)
                .with_exchange(ExchangeId::Binance, candle(d2, 100.0, 10.0))
                .with_exchange(ExchangeId::BinanceUs, candle(d2, 100.0, 100.0)),
        ];

        let result = Validator::default().validate(&merged);

        assert_eq!(result.stats.total_days, 2);
        assert_eq!(result.stats.valid_days, 1);
        assert_eq!(result.stats.exchange_coverage.get(&ExchangeId::Binance), Some(&1));
        assert_eq!(result.stats.exchange_coverage.get(&ExchangeId::BinanceUs), Some(&1));
        assert_eq!(result.anomaly_count(), 1);
    }

    #[test]
    fn gap_compares_with_last_close_even_when_the_source_skipped_a_day() {
        let (d1, d2, d3) = (date(0), date(1), date(2));
        let merged = vec![
            MergedDayRecord::new(d1)
                .with_exchange(ExchangeId::Binance, candle(d1, 100.0, 10.0))
                .with_exchange(ExchangeId::BinanceUs, candle(d1, 100.0, 10.0)),
            MergedDayRecord::new(d2).with_exchange(ExchangeId::BinanceUs, candle(d2, 100.0, 10.0)),
            MergedDayRecord::new(d3).with_exchange(ExchangeId::Binance, candle(d3, 130.0, 10.0)),
        ];

        let result = Validator::default().validate(&merged);

        let gaps = result.entries(AnomalyKind::PriceGap);
        assert_eq!(gaps.len(), 1);
        let AnomalyEntry::PriceGap {
            date: gap_date,
            exchange,
            previous_close,
            gap_pct,
            ..
        } = &gaps[0]
        else {
            panic!("expected price gap");
        };
        assert_eq!((*gap_date, *exchange), (d3, ExchangeId::Binance));
        assert_eq!(*previous_close, 100.0);
        assert!((gap_pct - 30.0).abs() < 1e-9);
        assert_eq!(result.valid.iter().map(|d| d.date).collect::<Vec<_>>(), vec![d1, d2]);
    }

    #[test]
    fn history_seeds_volume_and_gap_rules_without_being_classified() {
        let history: Vec<MergedDayRecord> = (0..10).map(|i| single(i, 100.0, 10.0)).collect();
        let day = date(10);
        let fresh = vec![MergedDayRecord::new(day).with_exchange(
            ExchangeId::Binance,
            KlineRecord::new(day, 130.0, 130.0, 130.0, 130.0, 1_000.0, 5, 130_000.0),
        )];

        let result = Validator::default().validate_with_history(&history, &fresh);

        assert_eq!(result.stats.total_days, 1);
        assert!(result.valid.is_empty());
        assert_eq!(result.entries(AnomalyKind::PriceGap).len(), 1);
        let AnomalyEntry::VolumeSpike { average_volume, ratio, .. } =
            &result.entries(AnomalyKind::VolumeSpike)[0]
        else {
            panic!("expected volume spike");
        };
        assert_eq!(*average_volume, 10.0);
        assert_eq!(*ratio, 100.0);
        assert!(result.anomalies.values().flatten().all(|entry| entry.date() == day));
    }

    #[test]
    fn one_day_can_trip_every_rule_and_is_excluded_once() {
        let (d1, d2, d3) = (date(0), date(1), date(2));
        let calm = |day| {
            MergedDayRecord::new(day)
                .with_exchange(ExchangeId::Binance, candle(day, 100.0, 10.0))
                .with_exchange(ExchangeId::BinanceUs, candle(day, 100.0, 10.0))
        };
        let mut no_volume = candle(d3, 100.0, 10.0);
        no_volume.volume = None;
        let stormy = MergedDayRecord::new(d3)
            .with_exchange(ExchangeId::Binance, candle(d3, 110.0, 100.0))
            .with_exchange(ExchangeId::BinanceUs, candle(d3, 100.0, 100.0))
            .with_exchange(ExchangeId::BinanceFutures, no_volume);

        let result = Validator::default().validate(&[calm(d1), calm(d2), stormy]);

        let counts: Vec<usize> = AnomalyKind::ALL
            .into_iter()
            .map(|kind| result.entries(kind).len())
            .collect();
        // deviation, spike (binance and binance_us), missing data, gap
        assert_eq!(counts, [1, 2, 1, 1]);
        assert_eq!(result.stats.total_days, 3);
        assert_eq!(result.stats.valid_days, 2);
        assert!(result.valid.iter().all(|d| d.date != d3));
    }

    #[test]
    fn every_kind_is_present_in_the_anomaly_map() {
        let result = Validator::default().validate(&[]);
        assert_eq!(result.anomalies.len(), AnomalyKind::ALL.len());

        let json = serde_json::to_string(&result.anomalies).expect("serialize");
        assert!(json.contains("\"price_deviation\":[]"));
        assert!(json.contains("\"missing_data\":[]"));
    }

    #[test]
    fn entries_serialize_with_kind_tag() {
        let entry = AnomalyEntry::MissingData {
            date: date(0),
            exchange: ExchangeId::BinanceUs,
            fields: vec![KlineField::Close, KlineField::Volume],
        };

        let value = serde_json::to_value(&entry).expect("serialize");
        assert_eq!(value["kind"], "missing_data");
        assert_eq!(value["exchange"], "binance_us");
        assert_eq!(value["date"], "2024-01-01");

        let decoded: AnomalyEntry = serde_json::from_value(value).expect("deserialize");
        assert_eq!(decoded, entry);
    }
}
