//! Summary of what a data directory currently holds.

use std::collections::BTreeMap;
use std::path::PathBuf;

use klinesync_store::{DocumentStore, StoreError, ANALYSIS_FILE, ANOMALIES_FILE, VALIDATED_FILE};
use serde::{Deserialize, Serialize};

use crate::analyze::DateRange;
use crate::validate::{AnomalyEntry, AnomalyKind};
use crate::{ExchangeId, MergedDayRecord};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetStatus {
    pub data_dir: PathBuf,
    pub days: usize,
    pub date_range: Option<DateRange>,
    /// Persisted days each exchange contributed to.
    pub exchange_days: BTreeMap<ExchangeId, usize>,
    pub anomalies: BTreeMap<AnomalyKind, usize>,
    pub raw_documents: Vec<String>,
    pub has_analysis: bool,
}

impl DatasetStatus {
    pub fn load(store: &DocumentStore) -> Result<Self, StoreError> {
        let dataset: Vec<MergedDayRecord> = store.read_json(VALIDATED_FILE)?.unwrap_or_default();
        let anomalies: BTreeMap<AnomalyKind, Vec<AnomalyEntry>> =
            store.read_json(ANOMALIES_FILE)?.unwrap_or_default();

        let mut exchange_days = BTreeMap::new();
        for day in &dataset {
            for exchange in day.exchanges.keys() {
                *exchange_days.entry(*exchange).or_insert(0) += 1;
            }
        }
        let first = dataset.iter().map(|day| day.date).min();
        let last = dataset.iter().map(|day| day.date).max();

        Ok(Self {
            data_dir: store.root().to_path_buf(),
            days: dataset.len(),
            date_range: first.zip(last).map(|(start, end)| DateRange { start, end }),
            exchange_days,
            anomalies: anomalies
                .into_iter()
                .map(|(kind, entries)| (kind, entries.len()))
                .collect(),
            raw_documents: store.raw_documents()?,
            has_analysis: store.exists(ANALYSIS_FILE)?,
        })
    }
}
