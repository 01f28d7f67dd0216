//! Acquisition → merge → validate → analyze orchestration.
//!
//! One run fetches every configured exchange concurrently, persists the raw
//! series, merges and validates them, reconciles with the persisted dataset
//! in increment mode, and overwrites the validated dataset, anomalies and
//! analysis documents. Nothing is persisted when no exchange returned data.

use std::collections::BTreeMap;
use std::sync::Arc;

use klinesync_store::{
    raw_document_name, DocumentStore, StoreConfig, StoreError, ANALYSIS_FILE, ANOMALIES_FILE,
    VALIDATED_FILE,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::OffsetDateTime;
use tokio::task::JoinSet;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::adapters::{ExchangeProfile, KlineClient};
use crate::analyze::{analyze, AnalysisResult};
use crate::config::{PipelineConfig, RunMode};
use crate::http_client::HttpClient;
use crate::incremental::reconcile;
use crate::kline_source::{KlineSeries, KlineSource};
use crate::merge::merge;
use crate::validate::{AnomalyEntry, AnomalyKind, ValidationStats, Validator};
use crate::{ExchangeId, MergedDayRecord, TradeDate, ValidationError};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("no exchange returned data for the window starting {start}")]
    NoData { start: TradeDate },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Config(#[from] ValidationError),

    #[error("exchange {0} is configured more than once")]
    DuplicateSource(ExchangeId),

    #[error("fetch task failed: {0}")]
    FetchTask(String),

    #[error("exchange {0} was lost to a failed fetch task; rebuild the pipeline")]
    SourceLost(ExchangeId),
}

/// Requested fetch window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchWindow {
    pub start: TradeDate,
    pub start_ms: i64,
    pub end_ms: i64,
}

/// What one exchange contributed to a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceReport {
    pub records: usize,
    /// `false` when the fetch stopped at the failure ceiling.
    pub complete: bool,
    pub cursor_ms: i64,
    pub raw_document: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub mode: RunMode,
    pub window: FetchWindow,
    pub sources: BTreeMap<ExchangeId, SourceReport>,
    pub validation: ValidationStats,
    pub anomalies: usize,
    /// Days in the validated dataset after this run.
    pub persisted_days: usize,
}

/// First day to fetch for `mode`.
///
/// A full run, or an increment run with nothing persisted, starts at `epoch`.
/// Otherwise the run resumes the day after the last persisted day.
pub fn resolve_start_date(
    mode: RunMode,
    epoch: TradeDate,
    last_persisted: Option<TradeDate>,
) -> TradeDate {
    match (mode, last_persisted) {
        (RunMode::Increment, Some(last)) => last.next_day().unwrap_or(last),
        _ => epoch,
    }
}

/// Runs the pipeline over a fixed set of sources.
///
/// A source whose fetch task panics cannot be recovered. Every later run on
/// the same pipeline fails with [`PipelineError::SourceLost`] instead of
/// silently fetching fewer exchanges.
pub struct Pipeline {
    config: PipelineConfig,
    store: DocumentStore,
    sources: Vec<Box<dyn KlineSource>>,
    source_ids: Vec<ExchangeId>,
    validator: Validator,
}

impl Pipeline {
    /// Builds a pipeline over explicit sources.
    pub fn new(
        config: PipelineConfig,
        store: DocumentStore,
        sources: Vec<Box<dyn KlineSource>>,
    ) -> Result<Self, PipelineError> {
        if sources.is_empty() {
            return Err(ValidationError::NoExchanges.into());
        }
        let mut seen = Vec::with_capacity(sources.len());
        for source in &sources {
            let id = source.id();
            if seen.contains(&id) {
                return Err(PipelineError::DuplicateSource(id));
            }
            seen.push(id);
        }

        let validator = Validator::new(config.thresholds);
        Ok(Self {
            config,
            store,
            sources,
            source_ids: seen,
            validator,
        })
    }

    /// Builds one HTTP kline client per configured exchange and opens the store.
    pub fn from_config(
        config: PipelineConfig,
        http_client: Arc<dyn HttpClient>,
    ) -> Result<Self, PipelineError> {
        config.validate()?;
        let store = DocumentStore::open(StoreConfig::new(config.data_dir.clone()))?;

        let mut sources: Vec<Box<dyn KlineSource>> = Vec::with_capacity(config.exchanges.len());
        for exchange in &config.exchanges {
            let client = KlineClient::new(
                ExchangeProfile::for_exchange(*exchange),
                config.pair.clone(),
                Arc::clone(&http_client),
                config.endpoints_for(*exchange),
                config.proxies.clone(),
                config.fetch.clone(),
            )?;
            sources.push(Box::new(client));
        }

        Self::new(config, store, sources)
    }

    pub fn store(&self) -> &DocumentStore {
        &self.store
    }

    /// Persisted validated dataset, empty if none was written yet.
    pub fn persisted_dataset(&self) -> Result<Vec<MergedDayRecord>, PipelineError> {
        Ok(self
            .store
            .read_json::<Vec<MergedDayRecord>>(VALIDATED_FILE)?
            .unwrap_or_default())
    }

    pub fn start_date(&self, mode: RunMode) -> Result<TradeDate, PipelineError> {
        let last = match mode {
            RunMode::Full => None,
            RunMode::Increment => self.persisted_dataset()?.iter().map(|day| day.date).max(),
        };
        Ok(resolve_start_date(mode, self.config.epoch, last))
    }

    /// Runs up to the current time.
    pub async fn run(&mut self, mode: RunMode) -> Result<RunReport, PipelineError> {
        self.run_until(mode, now_unix_millis()).await
    }

    /// Runs with the fetch window ending at `end_ms` (exclusive).
    pub async fn run_until(
        &mut self,
        mode: RunMode,
        end_ms: i64,
    ) -> Result<RunReport, PipelineError> {
        let run_id = Uuid::new_v4();
        let span = info_span!("pipeline_run", %run_id, %mode, pair = %self.config.pair);
        self.execute(run_id, mode, end_ms).instrument(span).await
    }

    async fn execute(
        &mut self,
        run_id: Uuid,
        mode: RunMode,
        end_ms: i64,
    ) -> Result<RunReport, PipelineError> {
        let existing = match mode {
            RunMode::Full => Vec::new(),
            RunMode::Increment => self.persisted_dataset()?,
        };
        let start = resolve_start_date(
            mode,
            self.config.epoch,
            existing.iter().map(|day| day.date).max(),
        );
        let window = FetchWindow {
            start,
            start_ms: start.start_unix_millis(),
            end_ms,
        };
        info!(start = %start, end_ms, sources = self.sources.len(), "run started");

        let series = self.fetch_all(window.start_ms, window.end_ms).await?;
        if series.values().all(KlineSeries::is_empty) {
            warn!(start = %start, "no exchange returned data, keeping persisted state");
            return Err(PipelineError::NoData { start });
        }

        let mut sources = BTreeMap::new();
        for (exchange, fetched) in &series {
            let raw_document = self.persist_raw(fetched)?;
            sources.insert(
                *exchange,
                SourceReport {
                    records: fetched.records.len(),
                    complete: fetched.complete,
                    cursor_ms: fetched.cursor_ms,
                    raw_document,
                },
            );
        }

        let records: BTreeMap<ExchangeId, Vec<_>> = series
            .into_iter()
            .map(|(exchange, fetched)| (exchange, fetched.records))
            .collect();
        let merged = merge(&records);
        // Increment runs see the persisted days as history for spike and gap rules.
        let validation = self.validator.validate_with_history(&existing, &merged);

        let (dataset, anomalies) = match mode {
            RunMode::Full => (validation.valid.clone(), validation.anomalies.clone()),
            RunMode::Increment => {
                let previous = self
                    .store
                    .read_json::<BTreeMap<AnomalyKind, Vec<AnomalyEntry>>>(ANOMALIES_FILE)?
                    .unwrap_or_default();
                (
                    reconcile(&existing, &validation.valid),
                    carry_anomalies(previous, &validation.anomalies, start),
                )
            }
        };
        let analysis: AnalysisResult = analyze(&dataset);

        self.store.write_json(VALIDATED_FILE, &dataset)?;
        self.store.write_json(ANOMALIES_FILE, &anomalies)?;
        self.store.write_json(ANALYSIS_FILE, &analysis)?;

        let report = RunReport {
            run_id,
            mode,
            window,
            sources,
            validation: validation.stats.clone(),
            anomalies: validation.anomaly_count(),
            persisted_days: dataset.len(),
        };
        info!(
            merged_days = report.validation.total_days,
            valid_days = report.validation.valid_days,
            anomalies = report.anomalies,
            persisted_days = report.persisted_days,
            "run finished"
        );
        Ok(report)
    }

    /// Fetches every source concurrently and hands the sources back afterwards.
    async fn fetch_all(
        &mut self,
        start_ms: i64,
        end_ms: i64,
    ) -> Result<BTreeMap<ExchangeId, KlineSeries>, PipelineError> {
        if let Some(lost) = self
            .source_ids
            .iter()
            .find(|id| !self.sources.iter().any(|source| source.id() == **id))
        {
            return Err(PipelineError::SourceLost(*lost));
        }

        let mut tasks = JoinSet::new();
        for (index, mut source) in std::mem::take(&mut self.sources).into_iter().enumerate() {
            tasks.spawn(async move {
                let series = source.fetch_series(start_ms, end_ms).await;
                (index, source, series)
            });
        }

        let mut returned = Vec::with_capacity(tasks.len());
        let mut series = BTreeMap::new();
        let mut failure = None;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, source, fetched)) => {
                    info!(
                        exchange = %fetched.exchange,
                        records = fetched.records.len(),
                        complete = fetched.complete,
                        "source finished"
                    );
                    series.insert(source.id(), fetched);
                    returned.push((index, source));
                }
                Err(error) => {
                    warn!(%error, "fetch task did not complete");
                    failure = Some(PipelineError::FetchTask(error.to_string()));
                }
            }
        }

        returned.sort_by_key(|(index, _)| *index);
        self.sources = returned.into_iter().map(|(_, source)| source).collect();

        match failure {
            Some(error) => Err(error),
            None => Ok(series),
        }
    }

    fn persist_raw(&self, series: &KlineSeries) -> Result<Option<String>, PipelineError> {
        let (Some(first), Some(last)) = (series.records.first(), series.records.last()) else {
            return Ok(None);
        };
        let name = raw_document_name(
            series.exchange.as_str(),
            &first.date.format(),
            &last.date.format(),
        );
        self.store.write_json(&name, &series.records)?;
        Ok(Some(name))
    }
}

/// Keeps persisted anomalies dated before `start` and appends this run's.
fn carry_anomalies(
    previous: BTreeMap<AnomalyKind, Vec<AnomalyEntry>>,
    current: &BTreeMap<AnomalyKind, Vec<AnomalyEntry>>,
    start: TradeDate,
) -> BTreeMap<AnomalyKind, Vec<AnomalyEntry>> {
    let mut carried: BTreeMap<AnomalyKind, Vec<AnomalyEntry>> = AnomalyKind::ALL
        .into_iter()
        .map(|kind| (kind, Vec::new()))
        .collect();

    for (kind, entries) in previous {
        carried
            .entry(kind)
            .or_default()
            .extend(entries.into_iter().filter(|entry| entry.date() < start));
    }
    for (kind, entries) in current {
        carried.entry(*kind).or_default().extend(entries.iter().cloned());
    }
    for entries in carried.values_mut() {
        entries.sort_by_key(AnomalyEntry::date);
    }
    carried
}

fn now_unix_millis() -> i64 {
    let nanos = OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000;
    i64::try_from(nanos).unwrap_or(i64::MAX)
}
