//! Stealth HTTP client (spec §4.D): rotates fingerprint-relevant headers per
//! request, never auto-follows redirects, and consults a cache before ever
//! touching the network.

use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rand::seq::SliceRandom;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use url::Url;

use repodocs_core::{Cache, Error, Response, Result};

use crate::key;
use crate::retry::{should_retry_status, RetryConfig, RetryEngine};

const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:125.0) Gecko/20100101 Firefox/125.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4 Safari/605.1.15",
];

const ACCEPT_LANGUAGES: &[&str] = &["en-US,en;q=0.9", "en-GB,en;q=0.9", "en;q=0.8,en-US;q=0.9"];
const CH_PLATFORMS: &[&str] = &["\"Windows\"", "\"macOS\"", "\"Linux\""];

const ACCEPT: &str =
    "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,image/apng,*/*;q=0.8";

#[derive(Debug, Clone)]
pub struct StealthClientConfig {
    /// Pin a single UA instead of rotating the pool (mostly for tests).
    pub static_user_agent: Option<String>,
    pub request_timeout: Duration,
    pub cache_ttl: Duration,
    pub retry: RetryConfig,
}

impl Default for StealthClientConfig {
    fn default() -> Self {
        Self {
            static_user_agent: None,
            request_timeout: Duration::from_secs(30),
            cache_ttl: Duration::from_secs(3600),
            retry: RetryConfig::default(),
        }
    }
}

pub struct StealthClient {
    client: reqwest::Client,
    cookie_store: Arc<reqwest_cookie_store::CookieStoreMutex>,
    cache: RwLock<Option<Arc<dyn Cache>>>,
    cache_enabled: AtomicBool,
    config: StealthClientConfig,
    retry: RetryEngine,
}

impl StealthClient {
    pub fn new(config: StealthClientConfig) -> Result<Self> {
        let cookie_store = Arc::new(reqwest_cookie_store::CookieStoreMutex::new(
            cookie_store::CookieStore::default(),
        ));
        let client = reqwest::Client::builder()
            .use_rustls_tls()
            .http1_only()
            .redirect(reqwest::redirect::Policy::none())
            .cookie_provider(cookie_store.clone())
            .build()
            .map_err(|e| Error::NotConfigured(format!("failed to build http client: {e}")))?;

        Ok(Self {
            client,
            cookie_store,
            cache: RwLock::new(None),
            cache_enabled: AtomicBool::new(true),
            retry: RetryEngine::new(config.retry.clone()),
            config,
        })
    }

    pub async fn set_cache(&self, cache: Arc<dyn Cache>) {
        *self.cache.write().await = Some(cache);
    }

    pub fn set_cache_enabled(&self, enabled: bool) {
        self.cache_enabled.store(enabled, Ordering::SeqCst);
    }

    /// Idempotent; the client holds no file handles to release, so this is a
    /// marker rather than real teardown.
    pub async fn close(&self) {}

    pub async fn get(&self, cancel: CancellationToken, url: &str) -> Result<Response> {
        self.get_with_headers(cancel, url, BTreeMap::new()).await
    }

    pub async fn get_with_headers(
        &self,
        cancel: CancellationToken,
        url: &str,
        extra_headers: BTreeMap<String, String>,
    ) -> Result<Response> {
        Url::parse(url).map_err(|e| Error::InvalidUrl(e.to_string()))?;

        let cache_key = key::prefixed_key("page", url);
        if self.cache_enabled.load(Ordering::SeqCst) {
            if let Some(cache) = self.cache.read().await.clone() {
                if let Some(body) = cache.get(&cache_key).await? {
                    tracing::debug!(url, "cache hit");
                    return Ok(Response {
                        status_code: 200,
                        body,
                        headers: BTreeMap::new(),
                        content_type: "text/html".to_string(),
                        url: url.to_string(),
                        from_cache: true,
                    });
                }
                tracing::debug!(url, "cache miss");
            }
        }

        let headers = build_headers(self.config.static_user_agent.as_deref(), &extra_headers);
        let client = self.client.clone();
        let timeout = self.config.request_timeout;
        let url_owned = url.to_string();

        let result = self
            .retry
            .execute(cancel, move || {
                let client = client.clone();
                let headers = headers.clone();
                let url_owned = url_owned.clone();
                Box::pin(attempt(client, url_owned, headers, timeout))
            })
            .await;

        if let Ok(resp) = &result {
            if self.cache_enabled.load(Ordering::SeqCst) {
                if let Some(cache) = self.cache.read().await.clone() {
                    if let Err(e) = cache.set(&cache_key, resp.body.clone(), self.config.cache_ttl).await {
                        tracing::warn!(error = %e, url, "cache write failed after successful fetch");
                    }
                }
            }
        }
        result
    }

    /// Cookies the jar currently holds that would be sent with a request to
    /// `url`. Returns an empty list for an unparsable URL.
    pub fn get_cookies(&self, url: &str) -> Vec<(String, String)> {
        let Ok(parsed) = Url::parse(url) else {
            return Vec::new();
        };
        let store = self.cookie_store.lock().unwrap();
        store
            .matches(&parsed)
            .into_iter()
            .map(|c| (c.name().to_string(), c.value().to_string()))
            .collect()
    }
}

fn build_headers(static_ua: Option<&str>, extra: &BTreeMap<String, String>) -> BTreeMap<String, String> {
    let mut rng = rand::thread_rng();
    let ua = static_ua
        .map(|s| s.to_string())
        .unwrap_or_else(|| USER_AGENTS.choose(&mut rng).unwrap().to_string());
    let accept_language = ACCEPT_LANGUAGES.choose(&mut rng).unwrap().to_string();

    let mut headers = BTreeMap::new();
    headers.insert("Accept".to_string(), ACCEPT.to_string());
    headers.insert("Accept-Encoding".to_string(), "gzip, deflate, br".to_string());
    headers.insert("Accept-Language".to_string(), accept_language);
    headers.insert("Cache-Control".to_string(), "no-cache".to_string());
    headers.insert("Pragma".to_string(), "no-cache".to_string());
    headers.insert("Sec-Fetch-Dest".to_string(), "document".to_string());
    headers.insert("Sec-Fetch-Mode".to_string(), "navigate".to_string());
    headers.insert("Sec-Fetch-Site".to_string(), "none".to_string());
    headers.insert("Sec-Fetch-User".to_string(), "?1".to_string());
    headers.insert("Upgrade-Insecure-Requests".to_string(), "1".to_string());

    if ua.contains("Chrome") && !ua.contains("Edg") {
        let platform = CH_PLATFORMS.choose(&mut rng).unwrap().to_string();
        headers.insert(
            "Sec-CH-UA".to_string(),
            "\"Chromium\";v=\"124\", \"Google Chrome\";v=\"124\", \"Not-A.Brand\";v=\"99\"".to_string(),
        );
        headers.insert("Sec-CH-UA-Mobile".to_string(), "?0".to_string());
        headers.insert("Sec-CH-UA-Platform".to_string(), platform);
    }

    headers.insert("User-Agent".to_string(), ua);
    for (name, value) in extra {
        headers.insert(name.clone(), value.clone());
    }
    headers
}

fn to_header_map(headers: &BTreeMap<String, String>) -> HeaderMap {
    let mut map = HeaderMap::new();
    for (name, value) in headers {
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            map.insert(name, value);
        }
    }
    map
}

fn collect_response_headers(headers: &reqwest::header::HeaderMap) -> BTreeMap<String, Vec<String>> {
    let mut out: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (name, value) in headers.iter() {
        if let Ok(v) = value.to_str() {
            out.entry(name.as_str().to_string()).or_default().push(v.to_string());
        }
    }
    out
}

fn parse_retry_after(headers: &BTreeMap<String, Vec<String>>) -> Option<Duration> {
    let raw = headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case("retry-after"))
        .and_then(|(_, v)| v.first())?;
    raw.trim().parse::<u64>().ok().map(Duration::from_secs)
}

async fn attempt(
    client: reqwest::Client,
    url: String,
    headers: BTreeMap<String, String>,
    timeout: Duration,
) -> Result<Response> {
    let mut builder = client.get(&url).timeout(timeout);
    builder = builder.headers(to_header_map(&headers));

    let resp = match builder.send().await {
        Ok(r) => r,
        Err(e) if e.is_timeout() => {
            return Err(Error::Retryable {
                inner: Box::new(Error::Fetch {
                    url: url.clone(),
                    status: None,
                    cause: e.to_string(),
                }),
                retry_after: None,
            });
        }
        Err(e) => {
            return Err(Error::Fetch {
                url: url.clone(),
                status: None,
                cause: e.to_string(),
            });
        }
    };

    let status = resp.status().as_u16();
    let headers_out = collect_response_headers(resp.headers());
    let content_type = resp
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();

    if status < 400 {
        let body = resp
            .bytes()
            .await
            .map_err(|e| Error::Fetch {
                url: url.clone(),
                status: Some(status),
                cause: e.to_string(),
            })?
            .to_vec();
        Ok(Response {
            status_code: status,
            body,
            headers: headers_out,
            content_type,
            url,
            from_cache: false,
        })
    } else {
        let retry_after = parse_retry_after(&headers_out);
        let inner = Error::Fetch {
            url,
            status: Some(status),
            cause: format!("http {status}"),
        };
        if should_retry_status(status) {
            Err(Error::Retryable {
                inner: Box::new(inner),
                retry_after,
            })
        } else {
            Err(inner)
        }
    }
}
