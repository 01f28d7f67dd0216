//! Cyclic selection over equivalent base URLs and egress proxies.

use crate::ValidationError;

/// Ordered list of interchangeable base URLs for one exchange, plus an
/// optional list of egress proxies.
///
/// `advance` moves to the next URL; every time the URL list wraps around, the
/// proxy moves on as well, so each URL is tried through each proxy in turn.
/// One rotator belongs to one client and is never shared.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointRotator {
    urls: Vec<String>,
    proxies: Vec<String>,
    url_index: usize,
    proxy_index: usize,
}

impl EndpointRotator {
    pub fn new(urls: Vec<String>, proxies: Vec<String>) -> Result<Self, ValidationError> {
        if urls.is_empty() {
            return Err(ValidationError::EmptyRotation);
        }
        Ok(Self {
            urls,
            proxies,
            url_index: 0,
            proxy_index: 0,
        })
    }

    pub fn current(&self) -> &str {
        &self.urls[self.url_index]
    }

    pub fn current_proxy(&self) -> Option<&str> {
        self.proxies.get(self.proxy_index).map(String::as_str)
    }

    pub fn advance(&mut self) -> &str {
        self.url_index = (self.url_index + 1) % self.urls.len();
        if self.url_index == 0 && !self.proxies.is_empty() {
            self.proxy_index = (self.proxy_index + 1) % self.proxies.len();
        }
        self.current()
    }

    /// Number of distinct URLs in the rotation.
    pub fn len(&self) -> usize {
        self.urls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.urls.is_empty()
    }
}
