//! Cross-exchange merge of per-exchange daily series.

use std::collections::BTreeMap;

use crate::{ExchangeId, KlineRecord, MergedDayRecord, TradeDate};

/// Joins per-exchange series into one record per calendar day.
///
/// Output is ascending by date with each date once. Dates no exchange
/// reported are not synthesized. If one exchange reports the same date
/// twice, its later record wins.
pub fn merge(series: &BTreeMap<ExchangeId, Vec<KlineRecord>>) -> Vec<MergedDayRecord> {
    let mut by_date: BTreeMap<TradeDate, MergedDayRecord> = BTreeMap::new();

    for (exchange, records) in series {
        for record in records {
            by_date
                .entry(record.date)
                .or_insert_with(|| MergedDayRecord::new(record.date))
                .exchanges
                .insert(*exchange, record.clone());
        }
    }

    by_date.into_values().collect()
}
