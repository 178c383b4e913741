use std::collections::HashMap;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use reqwest::{redirect, Method, Url};
use thiserror::Error;

use crate::config::Config;

// Bodies longer than this are truncated before comparison.
pub const BODY_SAMPLE_LIMIT: usize = 32768;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to build HTTP client: {source}")]
    ClientBuild {
        #[source]
        source: reqwest::Error,
    },

    #[error("failed to setup proxy: {proxy}: {source}")]
    ProxySetup {
        proxy: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("invalid request for {url}: {message}")]
    InvalidRequest { url: String, message: String },

    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("request to {url} failed: {message}")]
    Unreachable { url: String, message: String },
}

#[derive(Clone, Debug)]
pub struct HttpRequest {
    pub method: Method,
    pub url: Url,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
}

impl HttpRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

#[derive(Clone, Debug, Default)]
pub struct HttpResponse {
    pub status: u16,
    // Header names are lower-cased.
    pub headers: HashMap<String, String>,
    pub body: String,
    pub length: usize,
}

impl HttpResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(|s| s.as_str())
    }

    pub fn is_redirect(&self) -> bool {
        (300..400).contains(&self.status)
    }
}

#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError>;
}

pub fn header_map_to_hashmap(headers: &reqwest::header::HeaderMap) -> HashMap<String, String> {
    let mut out = HashMap::new();
    for (k, v) in headers.iter() {
        if let Ok(v) = v.to_str() {
            out.insert(k.as_str().to_lowercase(), v.to_string());
        }
    }
    out
}

pub fn body_sample(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes)
        .chars()
        .take(BODY_SAMPLE_LIMIT)
        .collect::<String>()
}

#[derive(Clone, Debug)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(config: &Config) -> Result<Self, TransportError> {
        let mut headers = reqwest::header::HeaderMap::new();
        if let Ok(agent) = reqwest::header::HeaderValue::from_str(&config.agent) {
            headers.insert(reqwest::header::USER_AGENT, agent);
        }

        let redirect_policy = if config.follow_redirects {
            redirect::Policy::limited(10)
        } else {
            redirect::Policy::none()
        };

        let mut builder = reqwest::Client::builder()
            .default_headers(headers)
            .redirect(redirect_policy)
            .timeout(config.timeout)
            .pool_idle_timeout(Duration::from_secs(90))
            .danger_accept_invalid_hostnames(config.ssl_ignore)
            .danger_accept_invalid_certs(config.ssl_ignore);

        if let Some(proxy) = config.proxy.as_deref().filter(|p| !p.trim().is_empty()) {
            let proxy = reqwest::Proxy::all(proxy).map_err(|e| TransportError::ProxySetup {
                proxy: proxy.to_string(),
                source: e,
            })?;
            builder = builder.proxy(proxy);
        }

        let client = builder
            .build()
            .map_err(|e| TransportError::ClientBuild { source: e })?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let url = request.url.to_string();
        let mut builder = self.client.request(request.method, request.url);
        for (k, v) in request.headers.iter() {
            builder = builder.header(k.as_str(), v.as_str());
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }
        let req = builder
            .build()
            .map_err(|e| TransportError::InvalidRequest {
                url: url.clone(),
                message: e.to_string(),
            })?;

        let resp = self
            .client
            .execute(req)
            .await
            .map_err(|e| TransportError::Request {
                url: url.clone(),
                source: e,
            })?;
        let status = resp.status().as_u16();
        let headers = header_map_to_hashmap(resp.headers());
        let body_bytes = resp
            .bytes()
            .await
            .map_err(|e| TransportError::Request { url, source: e })?;
        Ok(HttpResponse {
            status,
            headers,
            body: body_sample(&body_bytes),
            length: body_bytes.len(),
        })
    }
}

pub struct Throttled {
    inner: Arc<dyn Transport>,
    limiter: DefaultDirectRateLimiter,
}

impl Throttled {
    pub fn new(inner: Arc<dyn Transport>, per_second: u32) -> Self {
        let rate = NonZeroU32::new(per_second).unwrap_or(NonZeroU32::MIN);
        Self {
            inner,
            limiter: RateLimiter::direct(Quota::per_second(rate)),
        }
    }
}

#[async_trait]
impl Transport for Throttled {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        self.limiter.until_ready().await;
        self.inner.send(request).await
    }
}
