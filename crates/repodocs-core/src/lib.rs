//! Backend-agnostic types and trait surfaces for the repodocs fetch-convert-cache
//! pipeline.
//!
//! This crate is intentionally IO-free: `repodocs-local` implements every trait
//! declared here against a real HTTP client, an embedded KV store, and an HTML
//! parser. Keeping the split lets an external crawl/sitemap strategy (out of
//! scope for this workspace) depend on the types without pulling in `reqwest`,
//! `scraper`, or `sled`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

pub mod logger;
pub use logger::{LogLevel, Logger, NullLogger};

/// Error taxonomy (spec §7). Variants are grouped by observable surface rather
/// than by originating component, since the same `Fetch`/`Retryable` pair can
/// originate from the stealth client, the transport adapter, or a cache-backed
/// replay.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("invalid url: {0}")]
    InvalidUrl(String),

    #[error("cache error: {0}")]
    Cache(String),

    /// Benign: signals `Cache::get` absence. Never propagated past the cache
    /// boundary — callers see `Ok(None)`, not this variant, except where a
    /// lower-level trait method needs a `Result` shape (e.g. generic retry
    /// plumbing that treats "no value yet" as one more classifiable error).
    #[error("cache miss")]
    CacheMiss,

    #[error("fetch failed for {url}: {cause}")]
    Fetch {
        url: String,
        status: Option<u16>,
        cause: String,
    },

    /// Transient; the retry engine may consume this internally. Only surfaced
    /// to a caller once retries are exhausted, at which point it is wrapped as
    /// `MaxRetriesExceeded`.
    #[error("retryable: {inner}")]
    Retryable {
        inner: Box<Error>,
        retry_after: Option<Duration>,
    },

    #[error("max retries exceeded: {inner}")]
    MaxRetriesExceeded { inner: Box<Error> },

    #[error("rate limited")]
    RateLimited,

    /// Internal to the extractor/orchestrator; caught to trigger the
    /// Readability fallback and never surfaced past `convert`.
    #[error("selector not found")]
    SelectorNotFound,

    #[error("cancelled")]
    Cancelled,

    #[error("deadline exceeded")]
    DeadlineExceeded,

    #[error("encoding unknown")]
    EncodingUnknown,

    #[error("not configured: {0}")]
    NotConfigured(String),

    #[error("not supported: {0}")]
    NotSupported(String),
}

impl Error {
    /// `Retry-After`, in seconds, carried by a `Retryable` error (if any).
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Error::Retryable { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            Error::Fetch { status, .. } => *status,
            Error::Retryable { inner, .. } | Error::MaxRetriesExceeded { inner } => {
                inner.status()
            }
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// A logical cache entry: `{key, value, expires_at}` (spec §3). `expires_at`
/// is an absolute unix-epoch second; `None` means no expiry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: String,
    pub value: Vec<u8>,
    pub expires_at: Option<u64>,
}

/// Best-effort counters surfaced by `Cache::stats` (spec §4.B).
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct CacheStats {
    pub entries: u64,
    pub lsm_size: u64,
    pub vlog_size: u64,
}

/// Durable byte-value store with TTL and background compaction (spec §4.B).
///
/// Implementations MUST be safe for concurrent callers and MUST NOT normalize
/// URLs themselves — keys are opaque, produced by the key normalizer (§4.A).
#[async_trait]
pub trait Cache: Send + Sync {
    /// `Ok(None)` on miss or expiry; `Ok(Some(_))` on a fresh hit.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;
    /// `ttl = Duration::ZERO` means no expiry.
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<()>;
    async fn has(&self, key: &str) -> Result<bool>;
    /// Idempotent: deleting an absent key succeeds.
    async fn delete(&self, key: &str) -> Result<()>;
    async fn clear(&self) -> Result<()>;
    /// O(n) in general (spec §9 open question) — avoid on hot paths.
    async fn size(&self) -> Result<u64>;
    async fn stats(&self) -> Result<CacheStats>;
    /// Releases file handles. Subsequent operations are undefined.
    async fn close(&self) -> Result<()>;
}

/// Optional JS-rendering escape hatch invoked by the transport adapter on a
/// bare 403 (spec §4.E). Injected, not imported, to keep browser automation
/// out of the core's dependency graph (spec §9).
#[async_trait]
pub trait RendererFallback: Send + Sync {
    async fn render(&self, url: &str) -> Result<String>;
}

/// `{status_code, body, headers, content_type, url, from_cache}` (spec §3).
///
/// Invariant: any `Response` a caller observes has `status_code` in
/// `[200, 399]`; 4xx/5xx are surfaced as a typed `Error` instead.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    pub status_code: u16,
    pub body: Vec<u8>,
    /// Multimap: a header name may repeat (e.g. multiple `Set-Cookie`).
    pub headers: BTreeMap<String, Vec<String>>,
    pub content_type: String,
    pub url: String,
    pub from_cache: bool,
}

impl Response {
    pub fn header(&self, name: &str) -> Option<&str> {
        let name = name.to_ascii_lowercase();
        self.headers
            .iter()
            .find(|(k, _)| k.to_ascii_lowercase() == name)
            .and_then(|(_, v)| v.first())
            .map(|s| s.as_str())
    }

    pub fn text_lossy(&self) -> String {
        String::from_utf8_lossy(&self.body).to_string()
    }
}

/// One converted source page (spec §3). Value type: constructed per pipeline
/// invocation, never mutated after return.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub url: String,
    pub title: String,
    pub description: String,
    /// Markdown body.
    pub content: String,
    pub html_content: String,
    /// RFC 3339.
    pub fetched_at: String,
    /// SHA-256 hex of `content`.
    pub content_hash: String,
    pub word_count: usize,
    pub char_count: usize,
    /// Ordered, absolute `http(s)` URLs.
    pub links: Vec<String>,
    /// `h1`..`h6` -> ordered heading texts.
    pub headers: BTreeMap<String, Vec<String>>,
    pub rendered_with_js: bool,
    pub source_strategy: String,
    pub cache_hit: bool,
    pub summary: Option<String>,
    pub tags: Option<Vec<String>>,
    pub category: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn response_header_lookup_is_case_insensitive() {
        let mut headers = BTreeMap::new();
        headers.insert("Content-Type".to_string(), vec!["text/html".to_string()]);
        let resp = Response {
            status_code: 200,
            body: Vec::new(),
            headers,
            content_type: "text/html".to_string(),
            url: "https://example.com/".to_string(),
            from_cache: false,
        };
        assert_eq!(resp.header("content-type"), Some("text/html"));
        assert_eq!(resp.header("CONTENT-TYPE"), Some("text/html"));
        assert_eq!(resp.header("etag"), None);
    }

    #[test]
    fn retryable_error_carries_retry_after() {
        let err = Error::Retryable {
            inner: Box::new(Error::Fetch {
                url: "https://example.com/".to_string(),
                status: Some(503),
                cause: "service unavailable".to_string(),
            }),
            retry_after: Some(Duration::from_secs(2)),
        };
        assert_eq!(err.retry_after(), Some(Duration::from_secs(2)));
        assert_eq!(err.status(), Some(503));
    }
}
