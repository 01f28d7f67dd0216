use std::collections::{BTreeMap, HashMap};
use std::fmt::{Display, Formatter};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// HTTP GET request envelope used by exchange adapters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub url: String,
    pub headers: BTreeMap<String, String>,
    /// Egress proxy to route this request through, if any.
    pub proxy: Option<String>,
    pub timeout_ms: u64,
}

impl HttpRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            headers: BTreeMap::new(),
            proxy: None,
            timeout_ms: 10_000,
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers
            .insert(name.into().to_ascii_lowercase(), value.into());
        self
    }

    pub fn with_proxy(mut self, proxy: Option<&str>) -> Self {
        self.proxy = proxy.map(str::to_owned);
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }
}

/// HTTP response envelope returned by a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn ok_json(body: impl Into<String>) -> Self {
        Self {
            status: 200,
            body: body.into(),
        }
    }

    pub const fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 300
    }
}

/// Transport-level HTTP error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpError {
    message: String,
    timeout: bool,
}

impl HttpError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            timeout: false,
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            timeout: true,
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub const fn is_timeout(&self) -> bool {
        self.timeout
    }
}

impl Display for HttpError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for HttpError {}

/// Transport contract for exchange adapters.
///
/// `probe` checks that the host of `url` resolves before a request is spent
/// on it; `execute` performs the request.
pub trait HttpClient: Send + Sync {
    fn execute<'a>(
        &'a self,
        request: HttpRequest,
    ) -> Pin<Box<dyn Future<Output = Result<HttpResponse, HttpError>> + Send + 'a>>;

    fn probe<'a>(
        &'a self,
        url: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<(), HttpError>> + Send + 'a>>;
}

/// Production HTTP client using reqwest, with one pooled client per egress proxy.
#[derive(Debug, Clone)]
pub struct ReqwestHttpClient {
    direct: Arc<reqwest::Client>,
    proxied: Arc<Mutex<HashMap<String, reqwest::Client>>>,
}

impl ReqwestHttpClient {
    pub fn new() -> Self {
        Self::with_client(base_builder().build().unwrap_or_else(|_| reqwest::Client::new()))
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self {
            direct: Arc::new(client),
            proxied: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn client_for(&self, proxy: Option<&str>) -> Result<reqwest::Client, HttpError> {
        let Some(proxy) = proxy else {
            return Ok(self.direct.as_ref().clone());
        };

        let mut proxied = self
            .proxied
            .lock()
            .map_err(|_| HttpError::new("proxy client cache is poisoned"))?;
        if let Some(client) = proxied.get(proxy) {
            return Ok(client.clone());
        }

        let client = reqwest::Proxy::all(proxy)
            .and_then(|proxy| base_builder().proxy(proxy).build())
            .map_err(|e| HttpError::new(format!("invalid proxy '{proxy}': {e}")))?;
        proxied.insert(proxy.to_owned(), client.clone());
        Ok(client)
    }
}

impl Default for ReqwestHttpClient {
    fn default() -> Self {
        Self::new()
    }
}

fn base_builder() -> reqwest::ClientBuilder {
    reqwest::Client::builder().user_agent(concat!("klinesync/", env!("CARGO_PKG_VERSION")))
}

impl HttpClient for ReqwestHttpClient {
    fn execute<'a>(
        &'a self,
        request: HttpRequest,
    ) -> Pin<Box<dyn Future<Output = Result<HttpResponse, HttpError>> + Send + 'a>> {
        Box::pin(async move {
            let client = self.client_for(request.proxy.as_deref())?;
            let mut builder = client
                .get(&request.url)
                .timeout(Duration::from_millis(request.timeout_ms));

            for (name, value) in &request.headers {
                builder = builder.header(name, value);
            }

            let response = builder.send().await.map_err(|e| {
                if e.is_timeout() {
                    HttpError::timeout(format!("request timeout: {e}"))
                } else if e.is_connect() {
                    HttpError::new(format!("connection failed: {e}"))
                } else {
                    HttpError::new(format!("request failed: {e}"))
                }
            })?;

            let status = response.status().as_u16();
            let body = response
                .text()
                .await
                .map_err(|e| HttpError::new(format!("failed to read response body: {e}")))?;

            Ok(HttpResponse { status, body })
        })
    }

    fn probe<'a>(
        &'a self,
        url: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<(), HttpError>> + Send + 'a>> {
        Box::pin(async move {
            let parsed = reqwest::Url::parse(url)
                .map_err(|e| HttpError::new(format!("invalid url '{url}': {e}")))?;
            let host = parsed
                .host_str()
                .ok_or_else(|| HttpError::new(format!("url '{url}' has no host")))?
                .to_owned();
            let port = parsed.port_or_known_default().unwrap_or(443);

            let mut addresses = tokio::net::lookup_host((host.as_str(), port))
                .await
                .map_err(|e| HttpError::new(format!("dns lookup for {host} failed: {e}")))?;
            if addresses.next().is_none() {
                return Err(HttpError::new(format!("dns lookup for {host} returned no addresses")));
            }
            Ok(())
        })
    }
}
