use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::adapters::binance::ExchangeProfile;
use crate::adapters::wire::{decode_page, WireKline};
use crate::http_client::{HttpClient, HttpRequest};
use crate::kline_source::{FetchError, KlineSeries, KlineSource};
use crate::pacing::{Pacer, PacingPolicy};
use crate::retry::RetryConfig;
use crate::rotator::EndpointRotator;
use crate::{ExchangeId, TradingPair, ValidationError};

/// Request sizing, retry and pacing knobs shared by all exchange clients.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchSettings {
    pub page_size: usize,
    pub request_timeout_ms: u64,
    pub retry: RetryConfig,
    pub pacing: PacingPolicy,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            page_size: 1_000,
            request_timeout_ms: 10_000,
            retry: RetryConfig::default(),
            pacing: PacingPolicy::default(),
        }
    }
}

/// Paginating kline client for one Binance-family exchange.
///
/// Owns its endpoint rotation, pacing and failure counters. Pages are
/// requested strictly one after another.
pub struct KlineClient {
    profile: ExchangeProfile,
    pair: TradingPair,
    http_client: Arc<dyn HttpClient>,
    rotator: EndpointRotator,
    settings: FetchSettings,
    pacer: Pacer,
}

impl KlineClient {
    pub fn new(
        profile: ExchangeProfile,
        pair: TradingPair,
        http_client: Arc<dyn HttpClient>,
        endpoints: Vec<String>,
        proxies: Vec<String>,
        settings: FetchSettings,
    ) -> Result<Self, ValidationError> {
        let rotator = EndpointRotator::new(endpoints, proxies).map_err(|_| {
            ValidationError::EmptyEndpoints {
                exchange: profile.exchange.to_string(),
            }
        })?;
        let pacer = Pacer::new(settings.pacing);
        Ok(Self {
            profile,
            pair,
            http_client,
            rotator,
            settings,
            pacer,
        })
    }

    pub fn current_endpoint(&self) -> &str {
        self.rotator.current()
    }

    async fn run_fetch(&mut self, start_ms: i64, end_ms: i64) -> KlineSeries {
        let exchange = self.profile.exchange;
        let mut cursor = start_ms;
        let mut records = Vec::new();
        let mut failures: u32 = 0;
        let mut complete = true;

        info!(%exchange, pair = %self.pair, start_ms, end_ms, "fetching kline series");

        while cursor < end_ms {
            self.pacer.before_request().await;

            match self.request_page(cursor, end_ms).await {
                Ok(page) if page.is_empty() => {
                    debug!(%exchange, cursor, "empty page, upstream has no more data");
                    break;
                }
                Ok(page) => {
                    let last_ts = page.last().map_or(cursor, |kline| kline.timestamp_ms);
                    if last_ts < cursor {
                        warn!(
                            %exchange,
                            cursor,
                            last_ts,
                            "page did not advance the cursor, stopping"
                        );
                        break;
                    }

                    let before = records.len();
                    records.extend(page.into_iter().map(|kline| kline.record));
                    cursor = last_ts + 1;
                    failures = 0;
                    debug!(%exchange, cursor, total = records.len(), "page fetched");

                    if let Some(pause) = self.pacer.pause_after(before, records.len()) {
                        debug!(%exchange, pause_ms = pause.as_millis() as u64, "periodic pause");
                        tokio::time::sleep(pause).await;
                    }
                }
                Err(error) => {
                    failures += 1;
                    warn!(
                        %exchange,
                        endpoint = self.rotator.current(),
                        failures,
                        timeout = error.is_timeout(),
                        %error,
                        "page request failed"
                    );

                    if failures >= self.settings.retry.max_consecutive_failures {
                        warn!(
                            %exchange,
                            cursor,
                            fetched = records.len(),
                            "failure ceiling reached, returning partial series"
                        );
                        complete = false;
                        break;
                    }

                    let next = self.rotator.advance().to_owned();
                    let delay = self.settings.retry.delay_for_attempt(failures);
                    debug!(
                        %exchange,
                        endpoint = %next,
                        delay_ms = delay.as_millis() as u64,
                        "rotated endpoint"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }

        info!(%exchange, records = records.len(), complete, "kline series fetched");

        KlineSeries {
            exchange,
            records,
            cursor_ms: cursor,
            complete,
            failures,
        }
    }

    /// One page with per-request retries. Counts as a single failure upstream.
    async fn request_page(
        &mut self,
        cursor: i64,
        end_ms: i64,
    ) -> Result<Vec<WireKline>, FetchError> {
        let mut attempt = 0;
        loop {
            let result = match self.resolve_endpoint().await {
                Ok(()) => self.send_page(cursor, end_ms).await,
                Err(error) => Err(error),
            };

            match result {
                Ok(page) => return Ok(page),
                Err(error) if attempt >= self.settings.retry.request_retries => return Err(error),
                Err(error) => {
                    let delay = self.settings.retry.delay_for_attempt(attempt);
                    debug!(
                        exchange = %self.profile.exchange,
                        attempt,
                        %error,
                        delay_ms = delay.as_millis() as u64,
                        "retrying page request"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }

    /// Rotates past endpoints whose host does not resolve. Tries each
    /// endpoint at most once.
    async fn resolve_endpoint(&mut self) -> Result<(), FetchError> {
        let mut last_error = String::new();
        for _ in 0..self.rotator.len() {
            let probe = self.http_client.probe(self.rotator.current()).await;
            match probe {
                Ok(()) => return Ok(()),
                Err(error) => {
                    warn!(
                        exchange = %self.profile.exchange,
                        endpoint = self.rotator.current(),
                        %error,
                        "dns probe failed, rotating endpoint"
                    );
                    last_error = error.message().to_owned();
                    self.rotator.advance();
                }
            }
        }
        Err(FetchError::Dns(last_error))
    }

    async fn send_page(&self, cursor: i64, end_ms: i64) -> Result<Vec<WireKline>, FetchError> {
        let url = self.profile.page_url(
            self.rotator.current(),
            self.pair.as_str(),
            cursor,
            end_ms,
            self.settings.page_size,
        );
        let request = HttpRequest::get(url)
            .with_header("accept", "application/json")
            .with_proxy(self.rotator.current_proxy())
            .with_timeout_ms(self.settings.request_timeout_ms);

        let response = self.http_client.execute(request).await?;
        if !response.is_success() {
            return Err(FetchError::Status {
                status: response.status,
            });
        }

        decode_page(&response.body, self.profile.timestamp_index)
    }
}

impl KlineSource for KlineClient {
    fn id(&self) -> ExchangeId {
        self.profile.exchange
    }

    fn fetch_series<'a>(
        &'a mut self,
        start_ms: i64,
        end_ms: i64,
    ) -> Pin<Box<dyn Future<Output = KlineSeries> + Send + 'a>> {
        Box::pin(self.run_fetch(start_ms, end_ms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::binance::BINANCE;
    use crate::http_client::{HttpError, HttpResponse};
    use crate::retry::Backoff;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::time::Duration;

    const DAY_MS: i64 = 86_400_000;
    const JAN_1_2024: i64 = 1_704_067_200_000;

    /// Serves daily candles from `days` honouring `startTime`/`limit`, after
    /// first replaying any scripted failures.
    struct FakeExchange {
        days: Vec<i64>,
        failures: Mutex<VecDeque<HttpError>>,
        unresolvable: Vec<&'static str>,
        /// Every request after this many requests times out.
        healthy_requests: usize,
        requests: Mutex<Vec<HttpRequest>>,
    }

    impl FakeExchange {
        fn with_days(count: i64) -> Self {
            Self {
                days: (0..count).map(|day| JAN_1_2024 + day * DAY_MS).collect(),
                failures: Mutex::new(VecDeque::new()),
                unresolvable: Vec::new(),
                healthy_requests: usize::MAX,
                requests: Mutex::new(Vec::new()),
            }
        }

        fn failing_first(self, count: usize) -> Self {
            self.failures
                .lock()
                .expect("failures lock")
                .extend((0..count).map(|_| HttpError::timeout("request timeout")));
            self
        }

        fn requests(&self) -> Vec<HttpRequest> {
            self.requests.lock().expect("requests lock").clone()
        }

        fn page_for(&self, url: &str) -> String {
            let param = |name: &str| -> i64 {
                url.split(['?', '&'])
                    .find_map(|pair| pair.strip_prefix(name))
                    .and_then(|value| value.parse().ok())
                    .unwrap_or_default()
            };
            let start = param("startTime=");
            let limit = param("limit=") as usize;
            let rows: Vec<String> = self
                .days
                .iter()
                .filter(|ts| **ts >= start)
                .take(limit)
                .map(|ts| {
                    format!(
                        r#"[{ts},"100.0","110.0","90.0","105.0","10.0",{},"1000.0",7,"0","0","0"]"#,
                        ts + DAY_MS - 1
                    )
                })
                .collect();
            format!("[{}]", rows.join(","))
        }
    }

    impl HttpClient for FakeExchange {
        fn execute<'a>(
            &'a self,
            request: HttpRequest,
        ) -> Pin<Box<dyn Future<Output = Result<HttpResponse, HttpError>> + Send + 'a>> {
            let served = {
                let mut requests = self.requests.lock().expect("requests lock");
                requests.push(request.clone());
                requests.len()
            };
            let scripted = self.failures.lock().expect("failures lock").pop_front();
            let result = match scripted {
                Some(error) => Err(error),
                None if served > self.healthy_requests => {
                    Err(HttpError::timeout("request timeout"))
                }
                None => Ok(HttpResponse::ok_json(self.page_for(&request.url))),
            };
            Box::pin(async move { result })
        }

        fn probe<'a>(
            &'a self,
            url: &'a str,
        ) -> Pin<Box<dyn Future<Output = Result<(), HttpError>> + Send + 'a>> {
            let blocked = self.unresolvable.iter().any(|host| url.contains(host));
            Box::pin(async move {
                if blocked {
                    Err(HttpError::new("no such host"))
                } else {
                    Ok(())
                }
            })
        }
    }

    fn settings(page_size: usize) -> FetchSettings {
        FetchSettings {
            page_size,
            request_timeout_ms: 1_000,
            retry: RetryConfig {
                request_retries: 2,
                max_consecutive_failures: 10,
                backoff: Backoff::Exponential {
                    base: Duration::from_millis(100),
                    factor: 2.0,
                    max: Duration::from_secs(5),
                    jitter: Duration::from_millis(10),
                },
            },
            pacing: PacingPolicy::unpaced(),
        }
    }

    fn client(fake: Arc<FakeExchange>, endpoints: &[&str], page_size: usize) -> KlineClient {
        KlineClient::new(
            BINANCE,
            TradingPair::parse("BTCUSDT").expect("pair"),
            fake,
            endpoints.iter().map(|url| (*url).to_owned()).collect(),
            Vec::new(),
            settings(page_size),
        )
        .expect("client")
    }

    #[tokio::test(start_paused = true)]
    async fn paginates_until_window_end() {
        let fake = Arc::new(FakeExchange::with_days(10));
        let mut client = client(fake.clone(), &["https://a.test"], 4);

        let series = client.fetch_series(JAN_1_2024, JAN_1_2024 + 10 * DAY_MS).await;

        assert_eq!(series.records.len(), 10);
        assert!(series.complete);
        assert_eq!(series.records[0].date.format(), "2024-01-01");
        assert_eq!(series.records[9].date.format(), "2024-01-10");
        // three full pages plus the trailing empty page
        assert_eq!(fake.requests().len(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn empty_page_ends_fetch_without_error() {
        let fake = Arc::new(FakeExchange::with_days(3));
        let mut client = client(fake.clone(), &["https://a.test"], 2);

        let series = client.fetch_series(JAN_1_2024, JAN_1_2024 + 30 * DAY_MS).await;

        assert_eq!(series.records.len(), 3);
        assert!(series.complete);
        assert_eq!(fake.requests().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failures_rotate_endpoint_and_recover() {
        // 3 failed attempts = one outer failure, then success.
        let fake = Arc::new(FakeExchange::with_days(2).failing_first(3));
        let mut client = client(fake.clone(), &["https://a.test", "https://b.test"], 10);

        let series = client.fetch_series(JAN_1_2024, JAN_1_2024 + 2 * DAY_MS).await;

        assert_eq!(series.records.len(), 2);
        assert!(series.complete);
        let requests = fake.requests();
        assert_eq!(requests.len(), 5);
        assert!(requests[0].url.starts_with("https://a.test"));
        assert!(requests[2].url.starts_with("https://a.test"));
        assert!(requests[3].url.starts_with("https://b.test"));
    }

    #[tokio::test(start_paused = true)]
    async fn returns_partial_series_after_failure_ceiling() {
        let fake = Arc::new(FakeExchange::with_days(5).failing_first(1_000));
        let mut client = client(fake.clone(), &["https://a.test"], 10);

        let series = client.fetch_series(JAN_1_2024, JAN_1_2024 + 5 * DAY_MS).await;

        assert!(series.records.is_empty());
        assert!(!series.complete);
        assert_eq!(series.failures, 10);
        assert_eq!(series.cursor_ms, JAN_1_2024);
        // 10 outer failures x (1 attempt + 2 retries)
        assert_eq!(fake.requests().len(), 30);
    }

    #[tokio::test(start_paused = true)]
    async fn keeps_records_fetched_before_persistent_failure() {
        let mut fake = FakeExchange::with_days(10);
        fake.healthy_requests = 1;
        let fake = Arc::new(fake);
        let mut client = client(fake.clone(), &["https://a.test"], 4);

        let series = client.fetch_series(JAN_1_2024, JAN_1_2024 + 10 * DAY_MS).await;

        assert_eq!(series.records.len(), 4);
        assert!(!series.complete);
        assert_eq!(series.cursor_ms, JAN_1_2024 + 3 * DAY_MS + 1);
        assert_eq!(fake.requests().len(), 1 + 30);
    }

    #[tokio::test(start_paused = true)]
    async fn unresolvable_host_is_skipped_without_spending_an_attempt() {
        let mut fake = FakeExchange::with_days(1);
        fake.unresolvable = vec!["a.test"];
        let fake = Arc::new(fake);
        let mut client = client(fake.clone(), &["https://a.test", "https://b.test"], 10);

        let series = client.fetch_series(JAN_1_2024, JAN_1_2024 + DAY_MS).await;

        assert_eq!(series.records.len(), 1);
        let requests = fake.requests();
        assert_eq!(requests.len(), 2);
        assert!(requests.iter().all(|request| request.url.starts_with("https://b.test")));
        assert_eq!(client.current_endpoint(), "https://b.test");
    }

    #[tokio::test(start_paused = true)]
    async fn fetch_is_restartable_from_start() {
        let fake = Arc::new(FakeExchange::with_days(4));
        let mut client = client(fake, &["https://a.test"], 10);
        let window = (JAN_1_2024, JAN_1_2024 + 4 * DAY_MS);

        let first = client.fetch_series(window.0, window.1).await;
        let second = client.fetch_series(window.0, window.1).await;

        assert_eq!(first.records, second.records);
    }
}
