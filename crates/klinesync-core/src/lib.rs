//! # klinesync core
//!
//! Daily kline acquisition from several Binance-family exchanges, merged
//! into one record per day, checked for data-quality anomalies and
//! summarized.
//!
//! ## Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`adapters`] | Exchange wire profiles and the paginating kline client |
//! | [`analyze`] | Extremes, volatility, market share, streaks and calendar buckets |
//! | [`config`] | Pipeline configuration and run modes |
//! | [`domain`] | Domain models (KlineRecord, MergedDayRecord, TradeDate, TradingPair) |
//! | [`error`] | Core error types |
//! | [`exchange`] | Exchange identifiers |
//! | [`http_client`] | HTTP client abstraction |
//! | [`incremental`] | Reconciliation with the persisted dataset |
//! | [`kline_source`] | Exchange client trait and fetch results |
//! | [`merge`] | Cross-exchange merge by date |
//! | [`pacing`] | Inter-request pacing |
//! | [`pipeline`] | End-to-end run orchestration |
//! | [`retry`] | Backoff policy |
//! | [`rotator`] | Endpoint and proxy rotation |
//! | [`status`] | Summary of a data directory |
//! | [`validate`] | Anomaly rules |
//!
//! ## Data flow
//!
//! ```text
//! KlineClient (one per exchange, concurrent)
//!          │  KlineSeries
//!          ▼
//! ┌─────────────────┐
//! │  merge          │  one MergedDayRecord per date
//! └────────┬────────┘
//!          ▼
//! ┌─────────────────┐     ┌──────────────────┐
//! │  Validator      │────▶│ anomalies.json   │
//! └────────┬────────┘     └──────────────────┘
//!          │ valid days
//!          ▼
//! ┌─────────────────┐
//! │  reconcile      │  increment mode only
//! └────────┬────────┘
//!          ▼
//! ┌─────────────────┐     ┌──────────────────┐
//! │  analyze        │────▶│ analysis.json    │
//! └─────────────────┘     └──────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use klinesync_core::{Pipeline, PipelineConfig, ReqwestHttpClient, RunMode};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = PipelineConfig::from_env()?;
//!     let mut pipeline = Pipeline::from_config(config, Arc::new(ReqwestHttpClient::new()))?;
//!     let report = pipeline.run(RunMode::Increment).await?;
//!     println!("{} days persisted", report.persisted_days);
//!     Ok(())
//! }
//! ```

pub mod adapters;
pub mod analyze;
pub mod config;
pub mod domain;
pub mod error;
pub mod exchange;
pub mod http_client;
pub mod incremental;
pub mod kline_source;
pub mod merge;
pub mod pacing;
pub mod pipeline;
pub mod retry;
pub mod rotator;
pub mod status;
pub mod validate;

// Exchange adapters
pub use adapters::{ExchangeProfile, FetchSettings, KlineClient};

// Statistics
pub use analyze::{analyze, AnalysisResult, DateRange, ExchangeStats, PricePoint};

// Configuration
pub use config::{PipelineConfig, RunMode, DEFAULT_EPOCH};

// Domain models
pub use domain::{
    KlineField, KlineRecord, MergedDayRecord, Ohlcv, TradeDate, TradingPair, DEFAULT_PAIR,
};

// Error types
pub use error::ValidationError;

// Exchange identifiers
pub use exchange::ExchangeId;

// HTTP client types
pub use http_client::{HttpClient, HttpError, HttpRequest, HttpResponse, ReqwestHttpClient};

// Merge stages
pub use incremental::reconcile;
pub use merge::merge;

// Fetch contract
pub use kline_source::{FetchError, KlineSeries, KlineSource};

// Pacing and retry
pub use pacing::{Pacer, PacingPolicy};
pub use retry::{Backoff, RetryConfig};
pub use rotator::EndpointRotator;

// Orchestration
pub use pipeline::{
    resolve_start_date, FetchWindow, Pipeline, PipelineError, RunReport, SourceReport,
};
pub use status::DatasetStatus;

// Validation
pub use validate::{
    AnomalyEntry, AnomalyKind, ValidationResult, ValidationStats, ValidationThresholds, Validator,
};

// Store (re-exported from klinesync-store)
pub use klinesync_store::{DocumentStore, StoreConfig, StoreError};
