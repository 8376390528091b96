//! Content extraction (spec §4.H): a selector hit is used verbatim; a miss
//! (or no selector at all) falls back to a Readability-lite density score.
//!
//! The scoring heuristic — link-density penalty, `article`/`main` bonus,
//! paragraph-count bonus — is carried over from this crate's prior
//! text-flattening extractor, generalized here to preserve DOM subtrees
//! (returned as `NodeId`s into the caller's tree) instead of collapsing
//! straight to text, since the sanitizer and Markdown converter need real
//! elements to walk.

use ego_tree::NodeId;
use html_scraper::{ElementRef, Html, Selector};

use repodocs_core::{Error, Result};

const MIN_TEXT_CHARS: usize = 50;
const MIN_SOLID_TEXT_CHARS: i64 = 80;

/// Selector hit: every matching element becomes a content root. Operates on
/// the caller's already-parsed tree — no reparse.
pub fn extract_with_selector(doc: &Html, selector: &str) -> Result<(String, Vec<NodeId>)> {
    let sel = Selector::parse(selector).map_err(|_| Error::SelectorNotFound)?;
    let roots: Vec<NodeId> = doc.select(&sel).map(|el| el.id()).collect();
    if roots.is_empty() {
        return Err(Error::SelectorNotFound);
    }
    Ok((resolve_title(doc), roots))
}

/// Readability fallback. The winning subtree is serialized and reparsed into
/// a fresh, small document — the second of the two parses this path costs —
/// so the sanitizer/converter always operate on an owned `Html`.
pub fn extract_readability(doc: &Html) -> (String, Html) {
    let title = resolve_title(doc);
    let winner = pick_readability_element(doc);
    let fragment_html = winner.map(|el| el.html()).unwrap_or_default();
    let content_doc = Html::parse_fragment(&fragment_html);
    (title, content_doc)
}

fn pick_readability_element(doc: &Html) -> Option<ElementRef<'_>> {
    let candidates = Selector::parse("article, main, section, div").unwrap();
    let paragraphs = Selector::parse("p").unwrap();
    let anchors = Selector::parse("a").unwrap();

    let mut best: Option<(i64, ElementRef<'_>)> = None;
    for el in doc.select(&candidates) {
        if is_boilerplate(&el) {
            continue;
        }
        let text_chars = text_char_count(&el);
        if text_chars < MIN_TEXT_CHARS {
            continue;
        }
        let link_chars: usize = el.select(&anchors).map(|a| text_char_count(&a)).sum();
        let non_link = text_chars.saturating_sub(link_chars) as i64;

        let mut score = non_link - 3 * (link_chars as i64);
        match el.value().name() {
            "article" => score += 500,
            "main" => score += 300,
            _ => {}
        }
        if text_chars > 0 {
            let density = link_chars as f64 / text_chars as f64;
            if density >= 0.66 {
                score -= 900;
            } else if density >= 0.5 {
                score -= 500;
            } else if density >= 0.33 {
                score -= 250;
            }
        }
        let paragraph_count = el.select(&paragraphs).take(50).count() as i64;
        score += 20 * paragraph_count.min(10);
        if non_link < MIN_SOLID_TEXT_CHARS {
            score -= 200;
        }

        let better = match &best {
            Some((best_score, _)) => score > *best_score,
            None => score > 0,
        };
        if better {
            best = Some((score, el));
        }
    }

    best.map(|(_, el)| el).or_else(|| fallback_body_or_root(doc))
}

fn fallback_body_or_root(doc: &Html) -> Option<ElementRef<'_>> {
    let body_sel = Selector::parse("body").unwrap();
    doc.select(&body_sel).next().or_else(|| Some(doc.root_element()))
}

fn is_boilerplate(el: &ElementRef<'_>) -> bool {
    let mut tokens: Vec<String> = Vec::new();
    if let Some(class) = el.value().attr("class") {
        tokens.extend(class.split_whitespace().map(|t| t.to_ascii_lowercase()));
    }
    if let Some(id) = el.value().attr("id") {
        tokens.push(id.to_ascii_lowercase());
    }
    const BOILERPLATE: &[&str] = &[
        "nav", "navigation", "sidebar", "footer", "header", "menu", "comment", "comments",
        "advertisement", "ad", "ads", "promo", "related", "share", "social",
    ];
    tokens.iter().any(|t| BOILERPLATE.contains(&t.as_str()))
}

fn text_char_count(el: &ElementRef<'_>) -> usize {
    el.text().map(|t| t.chars().count()).sum()
}

fn resolve_title(doc: &Html) -> String {
    if let Some(text) = select_text(doc, "title") {
        return text;
    }
    if let Some(text) = select_text(doc, "h1") {
        return text;
    }
    if let Some(content) = select_attr(doc, r#"meta[property="og:title"]"#, "content") {
        return content;
    }
    String::new()
}

pub fn extract_description(doc: &Html) -> String {
    if let Some(content) = select_attr(doc, r#"meta[name="description"]"#, "content") {
        return content;
    }
    if let Some(content) = select_attr(doc, r#"meta[property="og:description"]"#, "content") {
        return content;
    }
    String::new()
}

fn select_text(doc: &Html, selector: &str) -> Option<String> {
    let sel = Selector::parse(selector).ok()?;
    let text = doc.select(&sel).next()?.text().collect::<String>();
    let trimmed = text.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

fn select_attr(doc: &Html, selector: &str, attr: &str) -> Option<String> {
    let sel = Selector::parse(selector).ok()?;
    let value = doc.select(&sel).next()?.value().attr(attr)?.trim().to_string();
    (!value.is_empty()).then_some(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selector_hit_returns_all_matches() {
        let doc = Html::parse_document("<html><body><div class=\"post\">a</div><div class=\"post\">b</div></body></html>");
        let (_, roots) = extract_with_selector(&doc, "div.post").unwrap();
        assert_eq!(roots.len(), 2);
    }

    #[test]
    fn selector_miss_is_an_error() {
        let doc = Html::parse_document("<html><body><p>hi</p></body></html>");
        assert!(matches!(extract_with_selector(&doc, ".nope"), Err(Error::SelectorNotFound)));
    }

    #[test]
    fn readability_prefers_article_over_nav() {
        let html = r#"
            <html><body>
                <nav class="nav"><a href="/a">one</a><a href="/b">two</a><a href="/c">three</a></nav>
                <article>
                    <p>This is a long enough paragraph of real article body copy that should win the scoring contest against the navigation sidebar full of links.</p>
                    <p>A second paragraph with more substantive prose content to push the paragraph bonus higher than the link-heavy nav element.</p>
                </article>
            </body></html>
        "#;
        let doc = Html::parse_document(html);
        let (_, content_doc) = extract_readability(&doc);
        let text: String = content_doc.root_element().text().collect();
        assert!(text.contains("long enough paragraph"));
        assert!(!text.contains("one"));
    }

    #[test]
    fn readability_falls_back_to_body_when_no_candidate_scores() {
        let doc = Html::parse_document("<html><body><p>short</p></body></html>");
        let (_, content_doc) = extract_readability(&doc);
        let text: String = content_doc.root_element().text().collect();
        assert!(text.contains("short"));
    }

    #[test]
    fn title_prefers_title_tag_over_h1() {
        let doc = Html::parse_document("<html><head><title>Page Title</title></head><body><h1>Heading</h1></body></html>");
        assert_eq!(resolve_title(&doc), "Page Title");
    }

    #[test]
    fn title_falls_back_to_og_title() {
        let doc = Html::parse_document(r#"<html><head><meta property="og:title" content="OG Title"></head><body></body></html>"#);
        assert_eq!(resolve_title(&doc), "OG Title");
    }

    #[test]
    fn description_prefers_meta_name_description() {
        let doc = Html::parse_document(r#"<html><head><meta name="description" content="desc"></head></html>"#);
        assert_eq!(extract_description(&doc), "desc");
    }
}
