//! End-to-end behaviour of a pipeline run over in-memory exchanges.

use std::collections::BTreeMap;
use std::sync::Arc;

use klinesync_core::{AnalysisResult, AnomalyEntry, AnomalyKind, PipelineError, RunMode};
use klinesync_store::{ANALYSIS_FILE, ANOMALIES_FILE, VALIDATED_FILE};
use klinesync_tests::{
    date, day, end_of, pipeline_in, ExchangeId, FakeExchange, MergedDayRecord, DAY_MS, JAN_1_2024,
};

// =============================================================================
// Start date resolution
// =============================================================================

#[tokio::test(start_paused = true)]
async fn when_full_mode_runs_without_a_dataset_fetch_starts_at_the_epoch() {
    // Given: an empty data directory and an epoch of 2024-01-01
    let dir = tempfile::tempdir().expect("tempdir");
    let fake = Arc::new(FakeExchange::with_closes(JAN_1_2024, &[100.0, 100.0, 100.0]));
    let mut pipeline = pipeline_in(&dir, vec![(ExchangeId::Binance, fake)]);

    // When
    let report = pipeline
        .run_until(RunMode::Full, end_of("2024-01-03"))
        .await
        .expect("run");

    // Then
    assert_eq!(report.window.start, date("2024-01-01"));
    assert_eq!(report.window.start_ms, JAN_1_2024);
    assert_eq!(report.persisted_days, 3);
}

#[tokio::test(start_paused = true)]
async fn when_increment_mode_finds_dataset_ending_2024_01_05_fetch_starts_2024_01_06() {
    // Given: a persisted dataset through 2024-01-05
    let dir = tempfile::tempdir().expect("tempdir");
    let fake = Arc::new(FakeExchange::with_closes(JAN_1_2024, &[100.0; 8]));
    let mut pipeline = pipeline_in(&dir, vec![(ExchangeId::Binance, fake)]);
    let persisted: Vec<MergedDayRecord> = (1..=5)
        .map(|n| day(&format!("2024-01-{n:02}"), &[(ExchangeId::Binance, 100.0, 10.0)]))
        .collect();
    pipeline
        .store()
        .write_json(VALIDATED_FILE, &persisted)
        .expect("seed");

    // When
    let report = pipeline
        .run_until(RunMode::Increment, end_of("2024-01-08"))
        .await
        .expect("run");

    // Then: only the tail is fetched and appended
    assert_eq!(report.window.start, date("2024-01-06"));
    assert_eq!(report.window.start_ms, JAN_1_2024 + 5 * DAY_MS);
    assert_eq!(report.sources[&ExchangeId::Binance].records, 3);
    let dataset = pipeline.persisted_dataset().expect("dataset");
    assert_eq!(dataset.len(), 8);
    assert_eq!(dataset[..5], persisted[..]);
}

#[tokio::test(start_paused = true)]
async fn when_increment_mode_has_no_dataset_it_behaves_like_a_full_run() {
    // Given
    let dir = tempfile::tempdir().expect("tempdir");
    let fake = Arc::new(FakeExchange::with_closes(JAN_1_2024, &[100.0, 100.0]));
    let mut pipeline = pipeline_in(&dir, vec![(ExchangeId::BinanceUs, fake)]);

    // When
    let report = pipeline
        .run_until(RunMode::Increment, end_of("2024-01-02"))
        .await
        .expect("run");

    // Then
    assert_eq!(report.window.start, date("2024-01-01"));
    assert_eq!(report.persisted_days, 2);
}

#[tokio::test(start_paused = true)]
async fn when_the_first_fetched_day_jumps_from_the_persisted_close_increment_flags_a_gap() {
    // Given: five persisted days at 100, and upstream jumping to 130 on 2024-01-06
    let dir = tempfile::tempdir().expect("tempdir");
    let fake = Arc::new(FakeExchange::with_closes(
        JAN_1_2024,
        &[100.0, 100.0, 100.0, 100.0, 100.0, 130.0, 130.0, 130.0],
    ));
    let mut pipeline = pipeline_in(&dir, vec![(ExchangeId::Binance, fake)]);
    let persisted: Vec<MergedDayRecord> = (1..=5)
        .map(|n| day(&format!("2024-01-{n:02}"), &[(ExchangeId::Binance, 100.0, 10.0)]))
        .collect();
    pipeline
        .store()
        .write_json(VALIDATED_FILE, &persisted)
        .expect("seed");

    // When
    let report = pipeline
        .run_until(RunMode::Increment, end_of("2024-01-08"))
        .await
        .expect("run");

    // Then: the jump day is judged against the persisted close and left out
    let anomalies: BTreeMap<AnomalyKind, Vec<AnomalyEntry>> = pipeline
        .store()
        .read_json(ANOMALIES_FILE)
        .expect("read")
        .expect("present");
    let gaps = &anomalies[&AnomalyKind::PriceGap];
    assert_eq!(gaps.len(), 1);
    assert_eq!(gaps[0].date(), date("2024-01-06"));
    assert_eq!(report.validation.valid_days, 2);
    let dates: Vec<_> = pipeline
        .persisted_dataset()
        .expect("dataset")
        .iter()
        .map(|d| d.date)
        .collect();
    assert_eq!(dates.len(), 7);
    assert!(!dates.contains(&date("2024-01-06")));
}

// =============================================================================
// Failure semantics
// =============================================================================

#[tokio::test(start_paused = true)]
async fn when_no_exchange_returns_data_the_run_fails_and_nothing_is_persisted() {
    // Given: one empty exchange and one that always times out
    let dir = tempfile::tempdir().expect("tempdir");
    let mut pipeline = pipeline_in(
        &dir,
        vec![
            (ExchangeId::Binance, Arc::new(FakeExchange::empty())),
            (ExchangeId::BinanceFutures, Arc::new(FakeExchange::timing_out())),
        ],
    );

    // When
    let result = pipeline.run_until(RunMode::Full, end_of("2024-01-31")).await;

    // Then: a fatal error, and the data directory stays empty
    assert!(matches!(result, Err(PipelineError::NoData { .. })));
    let entries = std::fs::read_dir(dir.path()).expect("read dir").count();
    assert_eq!(entries, 0);
}

#[tokio::test(start_paused = true)]
async fn when_one_exchange_exhausts_its_failures_the_others_still_produce_a_dataset() {
    // Given
    let dir = tempfile::tempdir().expect("tempdir");
    let healthy = Arc::new(FakeExchange::with_closes(JAN_1_2024, &[100.0, 101.0, 102.0]));
    let broken = Arc::new(FakeExchange::timing_out());
    let mut pipeline = pipeline_in(
        &dir,
        vec![(ExchangeId::Binance, healthy), (ExchangeId::BinanceUs, broken)],
    );

    // When
    let report = pipeline
        .run_until(RunMode::Full, end_of("2024-01-03"))
        .await
        .expect("run");

    // Then: the broken exchange is reported partial and absent from the data
    let broken_report = &report.sources[&ExchangeId::BinanceUs];
    assert!(!broken_report.complete);
    assert_eq!(broken_report.records, 0);
    assert_eq!(broken_report.raw_document, None);
    assert!(report.sources[&ExchangeId::Binance].complete);
    assert_eq!(report.persisted_days, 3);
    let dataset = pipeline.persisted_dataset().expect("dataset");
    assert!(dataset.iter().all(|d| d.get(ExchangeId::BinanceUs).is_none()));
}

// =============================================================================
// Persisted layout
// =============================================================================

#[tokio::test(start_paused = true)]
async fn when_a_run_completes_documents_follow_the_data_directory_layout() {
    // Given: two exchanges that disagree by about 3 % on the third day
    let dir = tempfile::tempdir().expect("tempdir");
    let spot = Arc::new(FakeExchange::with_closes(JAN_1_2024, &[100.0, 100.0, 100.0]));
    let futures = Arc::new(FakeExchange::with_closes(JAN_1_2024, &[100.0, 100.2, 103.0]));
    let mut pipeline = pipeline_in(
        &dir,
        vec![(ExchangeId::Binance, spot), (ExchangeId::BinanceFutures, futures)],
    );

    // When
    let report = pipeline
        .run_until(RunMode::Full, end_of("2024-01-03"))
        .await
        .expect("run");

    // Then: raw files per exchange named after the covered dates
    assert_eq!(
        pipeline.store().raw_documents().expect("list"),
        vec![
            "raw_binance_2024-01-01_2024-01-03.json".to_owned(),
            "raw_binance_futures_2024-01-01_2024-01-03.json".to_owned(),
        ]
    );

    // And: the validated dataset excludes the deviating day
    let validated: Vec<MergedDayRecord> = pipeline
        .store()
        .read_json(VALIDATED_FILE)
        .expect("read")
        .expect("present");
    assert_eq!(
        validated.iter().map(|d| d.date).collect::<Vec<_>>(),
        vec![date("2024-01-01"), date("2024-01-02")]
    );
    assert_eq!(report.validation.valid_days, 2);
    assert_eq!(report.validation.exchange_coverage[&ExchangeId::BinanceFutures], 2);

    // And: anomalies are keyed by kind
    let anomalies: BTreeMap<AnomalyKind, Vec<AnomalyEntry>> = pipeline
        .store()
        .read_json(ANOMALIES_FILE)
        .expect("read")
        .expect("present");
    assert_eq!(anomalies[&AnomalyKind::PriceDeviation].len(), 1);
    assert_eq!(anomalies[&AnomalyKind::PriceDeviation][0].date(), date("2024-01-03"));

    // And: the analysis covers the validated days only
    let analysis: AnalysisResult = pipeline
        .store()
        .read_json(ANALYSIS_FILE)
        .expect("read")
        .expect("present");
    assert_eq!(analysis.total_days, 2);
    let range = analysis.date_range.expect("range");
    assert_eq!((range.start, range.end), (date("2024-01-01"), date("2024-01-02")));

    let raw = std::fs::read_to_string(dir.path().join(ANALYSIS_FILE)).expect("raw analysis");
    let value: serde_json::Value = serde_json::from_str(&raw).expect("json");
    assert!(value["exchanges"]["binance_futures"]["market_share_pct"].is_number());
}
