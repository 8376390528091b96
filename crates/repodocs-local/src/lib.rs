//! IO implementation for `repodocs-core`'s fetch-convert-cache pipeline: a
//! stealth HTTP client, a `sled`-backed persistent cache, and the
//! HTML/Markdown/plaintext extraction stack that turns a fetched body into a
//! `Document`.

pub mod cache;
pub mod encoding;
pub mod extract;
pub mod key;
pub mod logging;
pub mod markdown;
pub mod pipeline;
pub mod readers;
pub mod retry;
pub mod router;
pub mod sanitize;
pub mod stealth;
pub mod transport;

pub use cache::{CacheConfig, SledCache};
pub use logging::TracingLogger;
pub use pipeline::{convert_html, convert_html_with_selector, process, PipelineConfig};
pub use retry::{RetryConfig, RetryEngine};
pub use stealth::{StealthClient, StealthClientConfig};
pub use transport::TransportAdapter;

pub(crate) fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}
