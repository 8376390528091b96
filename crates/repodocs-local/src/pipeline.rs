//! Pipeline orchestrator (spec §4.L): routes a fetched body through the
//! matching reader track, or — for HTML — through extraction, exclusion,
//! sanitization, and Markdown conversion in that order.

use ego_tree::NodeId;
use html_scraper::{Html, Selector};
use tokio_util::sync::CancellationToken;
use url::Url;

use repodocs_core::{Document, Error, Result};

use crate::key::hex_sha256;
use crate::{encoding, extract, markdown, now_rfc3339, readers, router, sanitize};

#[derive(Debug, Clone, Default)]
pub struct PipelineConfig {
    /// A CSS selector naming the content root(s). A miss falls back to
    /// Readability, exactly as if no selector had been given.
    pub content_selector: Option<String>,
    /// Elements matching this selector are removed before sanitization.
    pub exclude_selector: Option<String>,
    pub sanitize: sanitize::SanitizeConfig,
}

/// Dispatches by content-type/URL extension (§4.G) before ever touching the
/// HTML track. `cancel` is checked at entry only: nothing downstream
/// suspends, so there is no other point at which cancellation could observably
/// take effect.
pub async fn process(
    cancel: CancellationToken,
    bytes: &[u8],
    content_type: &str,
    url: &str,
    cfg: &PipelineConfig,
) -> Result<Document> {
    if cancel.is_cancelled() {
        return Err(Error::Cancelled);
    }
    if router::is_markdown(content_type, url) {
        let text = String::from_utf8_lossy(bytes).to_string();
        return Ok(readers::markdown_reader::read(&text, url));
    }
    if router::is_plain_text(content_type, url) {
        let text = String::from_utf8_lossy(bytes).to_string();
        return Ok(readers::plaintext_reader::read(&text, url));
    }
    convert(cancel, bytes, url, cfg).await
}

/// The HTML track: F (encoding) -> H (extract) -> exclude -> I (sanitize) ->
/// J (markdown). With a selector hit the page is parsed exactly once; with a
/// Readability fallback, twice (original, then the extracted fragment). `cancel`
/// is checked at entry only, matching `process`.
pub async fn convert(cancel: CancellationToken, bytes: &[u8], source_url: &str, cfg: &PipelineConfig) -> Result<Document> {
    if cancel.is_cancelled() {
        return Err(Error::Cancelled);
    }
    let utf8_bytes = encoding::convert_to_utf8(bytes);
    let html = String::from_utf8_lossy(&utf8_bytes).to_string();
    let mut original_doc = Html::parse_document(&html);
    let base = Url::parse(source_url).ok();
    let description = extract::extract_description(&original_doc);

    let (title, mut fragment_doc, roots) = match &cfg.content_selector {
        Some(selector) => match extract::extract_with_selector(&original_doc, selector) {
            Ok((title, roots)) => (title, None, roots),
            Err(Error::SelectorNotFound) => {
                tracing::debug!(selector, "selector miss, falling back to readability");
                let (title, content_doc) = extract::extract_readability(&original_doc);
                let roots = content_doc.tree.root().children().map(|c| c.id()).collect();
                (title, Some(content_doc), roots)
            }
            Err(e) => return Err(e),
        },
        None => {
            let (title, content_doc) = extract::extract_readability(&original_doc);
            let roots = content_doc.tree.root().children().map(|c| c.id()).collect();
            (title, Some(content_doc), roots)
        }
    };

    let (working_doc, content_roots): (&mut Html, Vec<NodeId>) = match &mut fragment_doc {
        Some(doc) => (doc, roots),
        None => (&mut original_doc, roots),
    };

    if let Some(exclude_selector) = &cfg.exclude_selector {
        if let Ok(sel) = Selector::parse(exclude_selector) {
            let matched: Vec<NodeId> = working_doc.select(&sel).map(|el| el.id()).collect();
            for id in matched {
                if let Some(mut node_mut) = working_doc.tree.get_mut(id) {
                    node_mut.detach();
                }
            }
        }
    }

    sanitize::sanitize(working_doc, &content_roots, &cfg.sanitize);

    let headers = sanitize::extract_headers(working_doc, &content_roots);
    let links = match &base {
        Some(b) => sanitize::dedup_preserve_order(sanitize::extract_links(working_doc, &content_roots, b)),
        None => Vec::new(),
    };

    let markdown_body = markdown::convert_nodes(working_doc, &content_roots, base.as_ref());
    let plaintext = markdown::strip_markdown(&markdown_body);
    let word_count = markdown::count_words(&plaintext);
    let char_count = markdown::count_chars(&markdown_body);
    let content_hash = hex_sha256(markdown_body.as_bytes());
    let html_content = serialize_roots(working_doc, &content_roots);

    Ok(Document {
        url: source_url.to_string(),
        title,
        description,
        content: markdown_body,
        html_content,
        fetched_at: now_rfc3339(),
        content_hash,
        word_count,
        char_count,
        links,
        headers,
        rendered_with_js: false,
        source_strategy: "html_pipeline".to_string(),
        cache_hit: false,
        summary: None,
        tags: None,
        category: None,
    })
}

pub async fn convert_html(bytes: &[u8], url: &str) -> Result<Document> {
    convert(CancellationToken::new(), bytes, url, &PipelineConfig::default()).await
}

pub async fn convert_html_with_selector(bytes: &[u8], url: &str, selector: &str) -> Result<Document> {
    let cfg = PipelineConfig {
        content_selector: Some(selector.to_string()),
        ..Default::default()
    };
    convert(CancellationToken::new(), bytes, url, &cfg).await
}

fn serialize_roots(doc: &Html, roots: &[NodeId]) -> String {
    roots
        .iter()
        .filter_map(|&id| doc.tree.get(id))
        .filter_map(html_scraper::ElementRef::wrap)
        .map(|el| el.html())
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    const ARTICLE_HTML: &str = r#"
        <html>
        <head><title>Example Article</title><meta name="description" content="An example page."></head>
        <body>
            <nav class="nav"><a href="/home">Home</a></nav>
            <article>
                <h1>Example Article</h1>
                <p>This is the first paragraph of a long enough article to win the readability contest against the nav.</p>
                <p>A second paragraph with a <a href="/more">relative link</a> and more substantive prose.</p>
            </article>
        </body>
        </html>
    "#;

    #[tokio::test]
    async fn convert_html_extracts_title_and_markdown() {
        let doc = convert_html(ARTICLE_HTML.as_bytes(), "https://example.com/post").await.unwrap();
        assert_eq!(doc.title, "Example Article");
        assert!(doc.content.contains("# Example Article"));
        assert!(doc.content.contains("[relative link](https://example.com/more)"));
        assert!(!doc.content.contains("Home"));
        assert_eq!(doc.description, "An example page.");
    }

    #[tokio::test]
    async fn convert_html_with_selector_hit_uses_selector() {
        let doc = convert_html_with_selector(ARTICLE_HTML.as_bytes(), "https://example.com/post", "article")
            .await
            .unwrap();
        assert!(doc.content.contains("first paragraph"));
    }

    #[tokio::test]
    async fn convert_html_with_selector_miss_falls_back_to_readability() {
        let doc = convert_html_with_selector(ARTICLE_HTML.as_bytes(), "https://example.com/post", ".does-not-exist")
            .await
            .unwrap();
        assert!(doc.content.contains("first paragraph"));
    }

    #[tokio::test]
    async fn process_dispatches_markdown_by_extension() {
        let cfg = PipelineConfig::default();
        let doc = process(
            CancellationToken::new(),
            b"# Title\n\nBody.",
            "application/octet-stream",
            "https://example.com/a.md",
            &cfg,
        )
        .await
        .unwrap();
        assert_eq!(doc.source_strategy, "markdown_reader");
        assert_eq!(doc.title, "Title");
    }

    #[tokio::test]
    async fn process_dispatches_plaintext_by_content_type() {
        let cfg = PipelineConfig::default();
        let doc = process(
            CancellationToken::new(),
            b"Hello\n\nWorld.",
            "text/plain",
            "https://example.com/a",
            &cfg,
        )
        .await
        .unwrap();
        assert_eq!(doc.source_strategy, "plaintext_reader");
    }

    #[tokio::test]
    async fn process_honors_pre_cancelled_token() {
        let cfg = PipelineConfig::default();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = process(cancel, b"Hello", "text/plain", "https://example.com/a", &cfg).await;
        assert!(matches!(result, Err(Error::Cancelled)));
    }
}
