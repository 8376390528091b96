//! DOM-to-Markdown conversion and its inverse, `strip_markdown` (spec §4.J).
//! No crate in the retrieved pack converts HTML to Markdown, so this walk is
//! hand-rolled; URL resolution for `href`/`src` happens here at read time
//! (see the module comment in `sanitize.rs` for why).

use ego_tree::NodeId;
use html_scraper::{Html, Node};
use once_cell::sync::Lazy;
use regex::Regex;
use url::Url;

use crate::sanitize::{resolve_srcset, resolve_url};
use repodocs_core::Document;

/// Walks every content root and renders it as Markdown, then post-cleans the
/// result (collapses blank-line runs, trims).
pub fn convert_nodes(doc: &Html, roots: &[NodeId], base: Option<&Url>) -> String {
    let mut out = String::new();
    for &root in roots {
        if let Some(node_ref) = doc.tree.get(root) {
            render_block(node_ref, base, &mut out);
        }
    }
    post_clean(&out)
}

type NodeRef<'a> = ego_tree::NodeRef<'a, Node>;

fn render_block(node: NodeRef<'_>, base: Option<&Url>, out: &mut String) {
    match node.value() {
        Node::Element(el) => match el.name() {
            "script" | "style" | "noscript" => {}
            tag @ ("h1" | "h2" | "h3" | "h4" | "h5" | "h6") => {
                let level: usize = tag[1..].parse().unwrap_or(1);
                let text = inline_text(node, base);
                let trimmed = text.trim();
                if !trimmed.is_empty() {
                    push_block(out, &format!("{} {}", "#".repeat(level), trimmed));
                }
            }
            "p" => {
                let text = inline_text(node, base);
                let trimmed = text.trim();
                if !trimmed.is_empty() {
                    push_block(out, trimmed);
                }
            }
            "hr" => push_block(out, "---"),
            "blockquote" => {
                let mut inner = String::new();
                for child in node.children() {
                    render_block(child, base, &mut inner);
                }
                let quoted = inner
                    .trim()
                    .lines()
                    .map(|l| format!("> {l}"))
                    .collect::<Vec<_>>()
                    .join("\n");
                push_block(out, &quoted);
            }
            "pre" => {
                let code_text = text_only(node);
                let lang = find_code_lang(node);
                push_block(out, &format!("```{lang}\n{}\n```", code_text.trim_end_matches('\n')));
            }
            "ul" => render_list(node, base, out, false),
            "ol" => render_list(node, base, out, true),
            "table" => render_table(node, base, out),
            _ => {
                for child in node.children() {
                    render_block(child, base, out);
                }
            }
        },
        Node::Text(text) => {
            if !text.trim().is_empty() {
                push_block(out, text.trim());
            }
        }
        _ => {}
    }
}

fn inline_text(node: NodeRef<'_>, base: Option<&Url>) -> String {
    let mut out = String::new();
    for child in node.children() {
        match child.value() {
            Node::Text(text) => out.push_str(text),
            Node::Element(el) => match el.name() {
                "strong" | "b" => {
                    out.push_str("**");
                    out.push_str(&inline_text(child, base));
                    out.push_str("**");
                }
                "em" | "i" => {
                    out.push('*');
                    out.push_str(&inline_text(child, base));
                    out.push('*');
                }
                "code" => {
                    out.push('`');
                    out.push_str(&text_only(child));
                    out.push('`');
                }
                "a" => {
                    let text = inline_text(child, base);
                    let href = el.attr("href").unwrap_or("");
                    let resolved = base
                        .and_then(|b| resolve_url(href, b))
                        .unwrap_or_else(|| href.to_string());
                    out.push_str(&format!("[{text}]({resolved})"));
                }
                "img" => {
                    let alt = el.attr("alt").unwrap_or("");
                    let src = el.attr("src").unwrap_or("");
                    let resolved = base
                        .and_then(|b| resolve_url(src, b))
                        .unwrap_or_else(|| src.to_string());
                    out.push_str(&format!("![{alt}]({resolved})"));
                }
                "br" => out.push('\n'),
                "ul" | "ol" => {} // rendered separately as a nested block by the caller
                _ => out.push_str(&inline_text(child, base)),
            },
            _ => {}
        }
    }
    out
}

fn render_list(node: NodeRef<'_>, base: Option<&Url>, out: &mut String, ordered: bool) {
    let mut index = 0usize;
    let mut buf = String::new();
    for child in node.children() {
        let Node::Element(el) = child.value() else { continue };
        if el.name() != "li" {
            continue;
        }
        index += 1;
        let marker = if ordered { format!("{index}.") } else { "-".to_string() };
        let text = inline_text(child, base).trim().to_string();

        let mut nested = String::new();
        for grandchild in child.children() {
            if let Node::Element(gel) = grandchild.value() {
                if gel.name() == "ul" || gel.name() == "ol" {
                    let mut tmp = String::new();
                    render_list(grandchild, base, &mut tmp, gel.name() == "ol");
                    let indented = tmp
                        .trim_end()
                        .lines()
                        .map(|l| format!("  {l}"))
                        .collect::<Vec<_>>()
                        .join("\n");
                    nested.push('\n');
                    nested.push_str(&indented);
                }
            }
        }
        buf.push_str(&format!("{marker} {text}{nested}\n"));
    }
    push_block(out, buf.trim_end());
}

fn render_table(node: NodeRef<'_>, base: Option<&Url>, out: &mut String) {
    let mut rows: Vec<Vec<String>> = Vec::new();
    for descendant in node.descendants() {
        let Some(el) = descendant.value().as_element() else { continue };
        if el.name() != "tr" {
            continue;
        }
        let mut cells = Vec::new();
        for cell in descendant.children() {
            if let Node::Element(cel) = cell.value() {
                if cel.name() == "td" || cel.name() == "th" {
                    cells.push(inline_text(cell, base).trim().to_string());
                }
            }
        }
        if !cells.is_empty() {
            rows.push(cells);
        }
    }
    if rows.is_empty() {
        return;
    }
    let columns = rows[0].len().max(1);
    let mut buf = String::new();
    buf.push_str(&format!("| {} |\n", rows[0].join(" | ")));
    buf.push_str(&format!("|{}|\n", vec![" --- "; columns].join("|")));
    for row in rows.iter().skip(1) {
        buf.push_str(&format!("| {} |\n", row.join(" | ")));
    }
    push_block(out, buf.trim_end());
}

fn text_only(node: NodeRef<'_>) -> String {
    let mut out = String::new();
    for descendant in node.descendants() {
        if let Some(text) = descendant.value().as_text() {
            out.push_str(text);
        }
    }
    out
}

fn find_code_lang(node: NodeRef<'_>) -> String {
    for child in node.children() {
        if let Node::Element(el) = child.value() {
            if el.name() == "code" {
                if let Some(class) = el.attr("class") {
                    for token in class.split_whitespace() {
                        if let Some(lang) = token.strip_prefix("language-") {
                            return lang.to_string();
                        }
                    }
                }
            }
        }
    }
    String::new()
}

fn push_block(out: &mut String, block: &str) {
    if block.trim().is_empty() {
        return;
    }
    if !out.is_empty() {
        out.push_str("\n\n");
    }
    out.push_str(block.trim());
}

static BLANK_RUN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{4,}").unwrap());

fn post_clean(md: &str) -> String {
    BLANK_RUN_RE.replace_all(md, "\n\n\n").trim().to_string()
}

static FENCED_CODE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)```.*?```").unwrap());
static IMAGE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"!\[([^\]]*)\]\([^)]*\)").unwrap());
static LINK_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[([^\]]*)\]\([^)]*\)").unwrap());
static BOLD_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\*\*([^*]+)\*\*").unwrap());
static ITALIC_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\*([^*]+)\*").unwrap());
static HEADING_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^#{1,6}\s*").unwrap());
static BLOCKQUOTE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^>\s?").unwrap());
static HR_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^(-{3,}|\*{3,}|_{3,})$").unwrap());
static UL_MARKER_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^\s*[-*+]\s+").unwrap());
static OL_MARKER_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^\s*\d+\.\s+").unwrap());

/// Best-effort Markdown -> plain text, used to compute `word_count`.
pub fn strip_markdown(md: &str) -> String {
    let mut s = FENCED_CODE_RE.replace_all(md, "").to_string();
    s = s.lines().filter(|l| !l.starts_with("    ")).collect::<Vec<_>>().join("\n");
    s = IMAGE_RE.replace_all(&s, "$1").to_string();
    s = LINK_RE.replace_all(&s, "$1").to_string();
    s = BOLD_RE.replace_all(&s, "$1").to_string();
    s = ITALIC_RE.replace_all(&s, "$1").to_string();
    s = HEADING_RE.replace_all(&s, "").to_string();
    s = BLOCKQUOTE_RE.replace_all(&s, "").to_string();
    s = HR_RE.replace_all(&s, "").to_string();
    s = UL_MARKER_RE.replace_all(&s, "").to_string();
    s = OL_MARKER_RE.replace_all(&s, "").to_string();
    s.trim().to_string()
}

pub fn count_words(text: &str) -> usize {
    text.split_whitespace().count()
}

pub fn count_chars(text: &str) -> usize {
    text.len()
}

#[derive(serde::Serialize)]
struct FrontMatter<'a> {
    title: &'a str,
    url: &'a str,
    source: &'a str,
    fetched_at: &'a str,
    rendered_js: bool,
    word_count: usize,
}

/// YAML front matter mirroring the document's own metadata fields.
pub fn generate_frontmatter(doc: &Document) -> String {
    let fm = FrontMatter {
        title: &doc.title,
        url: &doc.url,
        source: &doc.source_strategy,
        fetched_at: &doc.fetched_at,
        rendered_js: doc.rendered_with_js,
        word_count: doc.word_count,
    };
    let yaml = serde_yaml::to_string(&fm).unwrap_or_default();
    format!("---\n{yaml}---\n")
}
