use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::header::{self, HeaderMap, HeaderValue};
use reqwest::{Client, StatusCode};
use tracing::{debug, warn};

use crate::error::FetchError;
use crate::proxy::Proxy;

/// Two-step retrieval of a detail page through one proxy.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &str, proxy: &Proxy, identity: &str) -> Result<Vec<u8>, FetchError>;
}

#[derive(Debug, Clone)]
pub struct HttpFetcher {
    session_url: String,
    referer: String,
    timeout: Duration,
}

impl HttpFetcher {
    pub fn new(session_url: impl Into<String>, referer: impl Into<String>, timeout: Duration) -> Self {
        Self {
            session_url: session_url.into(),
            referer: referer.into(),
            timeout,
        }
    }

    /// One client per job: it owns the proxy transport and the cookie jar
    /// that carries the warm-up session into the detail request.
    fn build_client(&self, proxy: &Proxy) -> Result<Client, FetchError> {
        let transport = reqwest::Proxy::all(proxy.url()).map_err(|e| FetchError::ProxyFailure {
            proxy: proxy.address.clone(),
            reason: e.to_string(),
        })?;

        Client::builder()
            .proxy(transport)
            .cookie_store(true)
            .timeout(self.timeout)
            .build()
            .map_err(|e| FetchError::ProxyFailure {
                proxy: proxy.address.clone(),
                reason: e.to_string(),
            })
    }

    fn detail_headers(&self, url: &str, identity: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::ACCEPT,
            HeaderValue::from_static("text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8"),
        );
        headers.insert(header::ACCEPT_ENCODING, HeaderValue::from_static("gzip, deflate, br"));
        headers.insert(header::ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));

        if let Some(host) = url::Url::parse(url).ok().and_then(|u| u.host_str().map(str::to_string)) {
            if let Ok(v) = HeaderValue::from_str(&host) {
                headers.insert(header::HOST, v);
            }
        }
        match HeaderValue::from_str(identity) {
            Ok(v) => {
                headers.insert(header::USER_AGENT, v);
            }
            Err(e) => {
                warn!(identity, error = %e, "Identity is not a valid header value, sending without User-Agent");
            }
        }
        if let Ok(v) = HeaderValue::from_str(&self.referer) {
            headers.insert(header::REFERER, v);
        }
        headers
    }
}

fn acceptable(status: StatusCode) -> bool {
    status.is_success() || status.is_redirection()
}

fn remaining(deadline: Instant) -> Duration {
    deadline.saturating_duration_since(Instant::now())
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch(&self, url: &str, proxy: &Proxy, identity: &str) -> Result<Vec<u8>, FetchError> {
        let deadline = Instant::now() + self.timeout;
        let client = self.build_client(proxy)?;

        let proxy_failure = |reason: String| FetchError::ProxyFailure {
            proxy: proxy.address.clone(),
            reason,
        };

        let warm = client
            .get(&self.session_url)
            .timeout(remaining(deadline))
            .send()
            .await
            .map_err(|e| proxy_failure(e.to_string()))?;

        if !acceptable(warm.status()) {
            return Err(proxy_failure(format!("session warm-up returned {}", warm.status())));
        }
        debug!(proxy = %proxy.address, status = %warm.status(), "Session warmed");

        let fetch_failure = |reason: String| FetchError::FetchFailure {
            url: url.to_string(),
            reason,
        };

        let res = client
            .get(url)
            .headers(self.detail_headers(url, identity))
            .timeout(remaining(deadline))
            .send()
            .await
            .map_err(|e| fetch_failure(e.to_string()))?;

        if !acceptable(res.status()) {
            return Err(fetch_failure(format!("detail request returned {}", res.status())));
        }

        let bytes = res.bytes().await.map_err(|e| fetch_failure(e.to_string()))?;
        Ok(bytes.to_vec())
    }
}
