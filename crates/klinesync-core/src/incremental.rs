//! Reconciliation of a freshly fetched tail with the persisted dataset.

use std::collections::BTreeMap;

use crate::{MergedDayRecord, TradeDate};

/// Overlays `incoming` on `existing`, keyed by date.
///
/// An incoming record replaces the existing record for its date as a whole;
/// fields are never mixed. The result is ascending by date. With nothing
/// persisted yet, `incoming` is returned unchanged.
pub fn reconcile(
    existing: &[MergedDayRecord],
    incoming: &[MergedDayRecord],
) -> Vec<MergedDayRecord> {
    if existing.is_empty() {
        return incoming.to_vec();
    }

    let mut by_date: BTreeMap<TradeDate, MergedDayRecord> = existing
        .iter()
        .map(|record| (record.date, record.clone()))
        .collect();
    for record in incoming {
        by_date.insert(record.date, record.clone());
    }

    by_date.into_values().collect()
}
