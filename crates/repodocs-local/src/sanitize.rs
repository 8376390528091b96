//! DOM sanitization (spec §4.I): strips non-content elements in place,
//! extracts headers/links from the surviving subtree, and resolves relative
//! URLs.
//!
//! `scraper` exposes its backing `ego_tree::Tree` (the `Html::tree` field)
//! but no public API for rewriting element attributes in place — only
//! structural edits (`NodeMut::detach`) are safe to do without reaching into
//! `html5ever` internals. URL rewriting is therefore applied at every
//! attribute *read* site instead (here, and in the Markdown converter) via
//! [`resolve_url`]/[`resolve_srcset`]; the observable result — absolute
//! `href`/`src` in the final Markdown — is identical to rewriting the DOM.

use std::collections::{BTreeMap, HashSet};

use ego_tree::NodeId;
use html_scraper::node::Element;
use html_scraper::{ElementRef, Html, Node, Selector};
use url::Url;

const STRIP_TAGS: &[&str] = &[
    "script", "style", "noscript", "iframe", "object", "embed", "applet", "form", "input",
    "button", "select", "textarea",
];
const NAV_TAGS: &[&str] = &["nav", "header", "footer", "aside"];
const NAV_TOKENS: &[&str] = &[
    "nav",
    "navigation",
    "sidebar",
    "header",
    "footer",
    "menu",
    "advertisement",
    "ads",
];
const ALWAYS_MEANINGFUL: &[&str] = &["img", "video", "hr"];

#[derive(Debug, Clone)]
pub struct SanitizeConfig {
    pub remove_navigation: bool,
    pub remove_comments: bool,
}

impl Default for SanitizeConfig {
    fn default() -> Self {
        Self {
            remove_navigation: true,
            remove_comments: true,
        }
    }
}

/// Mutates `doc` in place: strips disallowed elements under each root, then
/// removes any element left with no text and no meaningful descendant.
pub fn sanitize(doc: &mut Html, roots: &[NodeId], cfg: &SanitizeConfig) {
    for &root in roots {
        strip_under(doc, root, cfg);
    }
}

fn strip_under(doc: &mut Html, id: NodeId, cfg: &SanitizeConfig) {
    let child_ids: Vec<NodeId> = match doc.tree.get(id) {
        Some(node) => node.children().map(|c| c.id()).collect(),
        None => return,
    };
    for child in child_ids {
        if should_strip(doc, child, cfg) {
            if let Some(mut node_mut) = doc.tree.get_mut(child) {
                node_mut.detach();
            }
            continue;
        }
        strip_under(doc, child, cfg);
    }

    // Bottom-up: re-read remaining children after their own subtrees settled.
    let remaining: Vec<NodeId> = match doc.tree.get(id) {
        Some(node) => node.children().map(|c| c.id()).collect(),
        None => return,
    };
    for child in remaining {
        if is_removable_empty(doc, child) {
            if let Some(mut node_mut) = doc.tree.get_mut(child) {
                node_mut.detach();
            }
        }
    }
}

fn should_strip(doc: &Html, id: NodeId, cfg: &SanitizeConfig) -> bool {
    let Some(node_ref) = doc.tree.get(id) else {
        return false;
    };
    match node_ref.value() {
        Node::Comment(_) => cfg.remove_comments,
        Node::Element(el) => {
            let tag = el.name();
            if STRIP_TAGS.contains(&tag) {
                return true;
            }
            if cfg.remove_navigation && (NAV_TAGS.contains(&tag) || has_nav_token(el)) {
                return true;
            }
            if has_hidden_style(el) || el.attr("hidden").is_some() {
                return true;
            }
            false
        }
        _ => false,
    }
}

fn has_nav_token(el: &Element) -> bool {
    let mut tokens: Vec<String> = Vec::new();
    if let Some(class) = el.attr("class") {
        tokens.extend(class.split_whitespace().map(|t| t.to_ascii_lowercase()));
    }
    if let Some(id) = el.attr("id") {
        tokens.push(id.to_ascii_lowercase());
    }
    tokens.iter().any(|t| NAV_TOKENS.contains(&t.as_str()))
}

fn has_hidden_style(el: &Element) -> bool {
    let Some(style) = el.attr("style") else {
        return false;
    };
    let collapsed: String = style.chars().filter(|c| !c.is_whitespace()).collect();
    let collapsed = collapsed.to_ascii_lowercase();
    collapsed.contains("display:none") || collapsed.contains("visibility:hidden")
}

fn is_removable_empty(doc: &Html, id: NodeId) -> bool {
    let Some(node_ref) = doc.tree.get(id) else {
        return false;
    };
    let Some(el) = node_ref.value().as_element() else {
        return false;
    };
    if ALWAYS_MEANINGFUL.contains(&el.name()) {
        return false;
    }
    if !collect_text(doc, id).trim().is_empty() {
        return false;
    }
    !has_meaningful_descendant(doc, id)
}

fn has_meaningful_descendant(doc: &Html, id: NodeId) -> bool {
    let Some(node_ref) = doc.tree.get(id) else {
        return false;
    };
    for child in node_ref.children() {
        if let Some(el) = child.value().as_element() {
            if ALWAYS_MEANINGFUL.contains(&el.name()) {
                return true;
            }
        }
        if has_meaningful_descendant(doc, child.id()) {
            return true;
        }
    }
    false
}

fn collect_text(doc: &Html, id: NodeId) -> String {
    let Some(node_ref) = doc.tree.get(id) else {
        return String::new();
    };
    let mut out = String::new();
    for descendant in node_ref.descendants() {
        if let Some(text) = descendant.value().as_text() {
            out.push_str(text);
        }
    }
    out
}

/// `h1..h6` -> ordered heading texts, across every content root.
pub fn extract_headers(doc: &Html, roots: &[NodeId]) -> BTreeMap<String, Vec<String>> {
    let mut out: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for level in 1..=6 {
        let tag = format!("h{level}");
        let Ok(sel) = Selector::parse(&tag) else { continue };
        for &root in roots {
            let Some(el_ref) = root_as_element(doc, root) else { continue };
            for heading in el_ref.select(&sel) {
                let text = heading.text().collect::<String>();
                let trimmed = text.trim();
                if !trimmed.is_empty() {
                    out.entry(tag.clone()).or_default().push(trimmed.to_string());
                }
            }
        }
    }
    out
}

/// Absolute `http(s)` links under every content root, in document order, not
/// de-duplicated (left to callers, who may want first-occurrence semantics).
pub fn extract_links(doc: &Html, roots: &[NodeId], base: &Url) -> Vec<String> {
    let Ok(sel) = Selector::parse("a[href]") else {
        return Vec::new();
    };
    let mut out = Vec::new();
    for &root in roots {
        let Some(el_ref) = root_as_element(doc, root) else { continue };
        for anchor in el_ref.select(&sel) {
            let Some(href) = anchor.value().attr("href") else { continue };
            let href = href.trim();
            if href.is_empty() {
                continue;
            }
            let lower = href.to_ascii_lowercase();
            if lower.starts_with('#')
                || lower.starts_with("javascript:")
                || lower.starts_with("mailto:")
                || lower.starts_with("tel:")
            {
                continue;
            }
            if let Some(resolved) = resolve_url(href, base) {
                out.push(resolved);
            }
        }
    }
    out
}

fn root_as_element(doc: &Html, id: NodeId) -> Option<ElementRef<'_>> {
    let node_ref = doc.tree.get(id)?;
    ElementRef::wrap(node_ref)
}

/// Resolves `raw` against `base`; fragment-only and `javascript:`/`mailto:`/
/// `tel:`/`data:` URLs pass through unchanged (there's nothing to resolve).
pub fn resolve_url(raw: &str, base: &Url) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    let lower = trimmed.to_ascii_lowercase();
    if lower.starts_with('#') {
        return Some(trimmed.to_string());
    }
    for scheme in ["javascript:", "mailto:", "tel:", "data:"] {
        if lower.starts_with(scheme) {
            return Some(trimmed.to_string());
        }
    }
    if let Ok(absolute) = Url::parse(trimmed) {
        return Some(absolute.to_string());
    }
    base.join(trimmed).ok().map(|u| u.to_string())
}

/// Resolves each URL candidate in a `srcset` list, preserving descriptors
/// (`2x`, `480w`, ...).
pub fn resolve_srcset(raw: &str, base: &Url) -> String {
    raw.split(',')
        .map(|candidate| {
            let candidate = candidate.trim();
            let mut parts = candidate.splitn(2, char::is_whitespace);
            let url_part = parts.next().unwrap_or("");
            let descriptor = parts.next().unwrap_or("").trim();
            let resolved = resolve_url(url_part, base).unwrap_or_else(|| url_part.to_string());
            if descriptor.is_empty() {
                resolved
            } else {
                format!("{resolved} {descriptor}")
            }
        })
        .collect::<Vec<_>>()
        .join(", ")
}

/// Removes duplicate `href`s, preserving first-occurrence order. Exposed for
/// callers who want `extract_links`'s raw duplicates collapsed.
pub fn dedup_preserve_order(links: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    links.into_iter().filter(|l| seen.insert(l.clone())).collect()
}
