//! Origin fetch executor.
//!
//! Performs exactly one network attempt per call; retry and fallback policy
//! belong to the interceptor. Failures are classified so callers can tell
//! the two apart:
//!
//! - [`Error::NetworkUnavailable`]: no response was obtained (connect, DNS,
//!   timeout, or the body stream broke off).
//! - [`Error::OriginError`]: the origin answered with a non-2xx status. The
//!   full response is carried in the error.

use async_trait::async_trait;
use reqwest::{Client, Method, header};
use std::time::{Duration, Instant};

use offcache_core::{AppConfig, Error, HttpResponse, RequestIdentity};

/// Something that can retrieve a request from the origin.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Fetch once. No internal retry.
    async fn fetch(&self, identity: &RequestIdentity) -> Result<HttpResponse, Error>;
}

/// Configuration for the fetch client.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// User agent string (default: "offcache/0.1")
    pub user_agent: String,

    /// Maximum response body size in bytes (default: 10MB)
    pub max_bytes: usize,

    /// Request timeout (default: 15s)
    pub timeout: Duration,

    /// Maximum number of redirects to follow (default: 5)
    pub max_redirects: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            user_agent: "offcache/0.1".to_string(),
            max_bytes: 10 * 1024 * 1024,
            timeout: Duration::from_millis(15_000),
            max_redirects: 5,
        }
    }
}

impl From<&AppConfig> for FetchConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            user_agent: config.user_agent.clone(),
            max_bytes: config.max_bytes,
            timeout: config.timeout(),
            max_redirects: config.max_redirects,
        }
    }
}

/// reqwest-backed fetcher.
pub struct FetchClient {
    http: Client,
    config: FetchConfig,
}

impl FetchClient {
    /// Create a new fetch client with the given configuration.
    pub fn new(config: FetchConfig) -> Result<Self, Error> {
        let http = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.timeout)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .use_rustls_tls()
            .gzip(true)
            .brotli(true)
            .deflate(true)
            .build()
            .map_err(|e| Error::InvalidInput(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self { http, config })
    }

    /// Get reference to the configuration.
    pub fn config(&self) -> &FetchConfig {
        &self.config
    }

    fn too_large(&self, len: usize) -> Error {
        Error::FetchTooLarge(format!("{} bytes exceeds {}", len, self.config.max_bytes))
    }
}

#[async_trait]
impl Fetcher for FetchClient {
    async fn fetch(&self, identity: &RequestIdentity) -> Result<HttpResponse, Error> {
        let start = Instant::now();
        let method = Method::from_bytes(identity.method().as_bytes())
            .map_err(|e| Error::InvalidInput(format!("invalid method {}: {}", identity.method(), e)))?;

        let mut response = self
            .http
            .request(method, identity.url().clone())
            .send()
            .await
            .map_err(|e| Error::NetworkUnavailable(format!("{}: {}", identity, e)))?;

        let status = response.status();

        if let Some(len) = response.content_length()
            && len as usize > self.config.max_bytes
        {
            return Err(self.too_large(len as usize));
        }

        let headers: Vec<(String, String)> = response
            .headers()
            .iter()
            .filter_map(|(name, value)| value.to_str().ok().map(|v| (name.as_str().to_string(), v.to_string())))
            .collect();
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());

        let mut bytes = Vec::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| Error::NetworkUnavailable(format!("failed to read response for {}: {}", identity, e)))?
        {
            if bytes.len() + chunk.len() > self.config.max_bytes {
                return Err(self.too_large(bytes.len() + chunk.len()));
            }
            bytes.extend_from_slice(&chunk);
        }

        let fetch_ms = start.elapsed().as_millis() as u64;

        tracing::debug!(
            "fetched {} -> {} in {}ms ({} bytes, {:?})",
            identity,
            status.as_u16(),
            fetch_ms,
            bytes.len(),
            content_type
        );

        let http_response = HttpResponse::new(status.as_u16(), headers, bytes);
        if !status.is_success() {
            return Err(Error::OriginError(Box::new(http_response)));
        }

        Ok(http_response)
    }
}
