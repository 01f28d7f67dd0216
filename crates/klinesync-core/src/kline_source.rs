//! Exchange client contract and fetch result types.
//!
//! Every exchange variant implements [`KlineSource`]. A fetch never fails as
//! a whole: when an exchange keeps failing, the client stops and returns what
//! it has, with [`KlineSeries::complete`] telling callers whether the window
//! was covered.

use std::future::Future;
use std::pin::Pin;

use thiserror::Error;

use crate::http_client::HttpError;
use crate::{ExchangeId, KlineRecord};

/// Why one page request failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("no endpoint host resolved: {0}")]
    Dns(String),
    #[error("transport error: {0}")]
    Transport(HttpError),
    #[error("upstream returned status {status}")]
    Status { status: u16 },
    #[error("failed to decode kline page: {0}")]
    Decode(String),
}

impl FetchError {
    /// Whether the transport gave up waiting, as opposed to failing outright.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Transport(error) if error.is_timeout())
    }
}

impl From<HttpError> for FetchError {
    fn from(value: HttpError) -> Self {
        Self::Transport(value)
    }
}

/// Records fetched from one exchange for one requested window.
#[derive(Debug, Clone, PartialEq)]
pub struct KlineSeries {
    pub exchange: ExchangeId,
    /// Chronological records.
    pub records: Vec<KlineRecord>,
    /// Cursor position (epoch ms) when the fetch stopped.
    pub cursor_ms: i64,
    /// `true` when the cursor reached the window end or upstream ran out of
    /// data; `false` when the fetch gave up after repeated failures.
    pub complete: bool,
    /// Consecutive failures outstanding when the fetch stopped.
    pub failures: u32,
}

impl KlineSeries {
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Exchange client contract.
///
/// `fetch_series` is restartable: every call fetches again from `start_ms`.
/// Implementations own their endpoint rotation and failure counters, so
/// different exchanges can be fetched concurrently without coordination.
pub trait KlineSource: Send {
    /// Exchange this source reads from.
    fn id(&self) -> ExchangeId;

    /// Fetches daily klines in `[start_ms, end_ms)`.
    fn fetch_series<'a>(
        &'a mut self,
        start_ms: i64,
        end_ms: i64,
    ) -> Pin<Box<dyn Future<Output = KlineSeries> + Send + 'a>>;
}
