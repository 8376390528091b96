//! Markdown and plaintext readers (spec §4.K): build a `Document` directly
//! from already-textual content, bypassing the HTML pipeline entirely.
//! Regex-driven and intentionally conservative — link/heading syntax that
//! spans multiple lines is not recognized.

use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use regex::Regex;
use url::Url;

use crate::key::hex_sha256;
use crate::markdown;
use crate::now_rfc3339;
use repodocs_core::Document;

static ATX_HEADING_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(#{1,6})\s+(.+?)\s*#*\s*$").unwrap());
static H1_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^#\s+(.+?)\s*#*\s*$").unwrap());
static LIST_ITEM_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d+\.\s").unwrap());
static HR_LINE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(-{3,}|\*{3,}|_{3,})\s*$").unwrap());
static MD_LINK_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"\[[^\]]*\]\(([^)\s]+)(?:\s+"[^"]*")?\)"#).unwrap());

/// Lines outside fenced (``` or ~~~) code blocks, paired with their original
/// index (unused by callers today, kept for symmetry with the line-based
/// scans below).
fn non_fenced_lines(content: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut in_fence = false;
    let mut marker = "";
    for line in content.lines() {
        let trimmed = line.trim_start();
        if !in_fence && (trimmed.starts_with("```") || trimmed.starts_with("~~~")) {
            in_fence = true;
            marker = if trimmed.starts_with("```") { "```" } else { "~~~" };
            continue;
        }
        if in_fence {
            if trimmed.starts_with(marker) {
                in_fence = false;
            }
            continue;
        }
        out.push(line);
    }
    out
}

fn split_frontmatter(content: &str) -> (Option<serde_yaml::Value>, String) {
    let lines: Vec<&str> = content.split('\n').collect();
    if lines.first().map(|l| l.trim_end()) != Some("---") {
        return (None, content.to_string());
    }
    let close_idx = lines
        .iter()
        .enumerate()
        .skip(1)
        .find(|(_, l)| l.trim_end() == "---")
        .map(|(i, _)| i);
    let Some(close_idx) = close_idx else {
        return (None, content.to_string());
    };
    let yaml_block = lines[1..close_idx].join("\n");
    let body = lines[(close_idx + 1)..].join("\n");
    let value = serde_yaml::from_str::<serde_yaml::Value>(&yaml_block).ok();
    (value, body)
}

fn frontmatter_str<'a>(fm: &'a Option<serde_yaml::Value>, key: &str) -> Option<&'a str> {
    fm.as_ref().and_then(|v| v.get(key)).and_then(|v| v.as_str())
}

fn first_h1(content: &str) -> Option<String> {
    non_fenced_lines(content)
        .into_iter()
        .find_map(|line| H1_RE.captures(line.trim_start()).map(|c| c[1].trim().to_string()))
}

fn all_headers(content: &str) -> BTreeMap<String, Vec<String>> {
    let mut out: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for line in non_fenced_lines(content) {
        if let Some(caps) = ATX_HEADING_RE.captures(line.trim_start()) {
            let level = caps[1].len();
            let text = caps[2].trim();
            if !text.is_empty() {
                out.entry(format!("h{level}")).or_default().push(text.to_string());
            }
        }
    }
    out
}

fn is_heading_line(line: &str) -> bool {
    ATX_HEADING_RE.is_match(line.trim_start()) || line.trim_start().starts_with('#')
}

fn is_list_line(line: &str) -> bool {
    let t = line.trim_start();
    t.starts_with("- ") || t.starts_with("* ") || t.starts_with("+ ") || LIST_ITEM_RE.is_match(t)
}

fn is_blockquote_line(line: &str) -> bool {
    line.trim_start().starts_with('>')
}

fn is_hr_line(line: &str) -> bool {
    HR_LINE_RE.is_match(line.trim())
}

fn first_prose_paragraph(content: &str) -> Option<String> {
    let mut para: Vec<String> = Vec::new();
    for line in non_fenced_lines(content) {
        if line.trim().is_empty() {
            if !para.is_empty() {
                break;
            }
            continue;
        }
        if is_heading_line(line) || is_list_line(line) || is_blockquote_line(line) || is_hr_line(line) {
            if !para.is_empty() {
                break;
            }
            continue;
        }
        para.push(line.trim().to_string());
    }
    (!para.is_empty()).then(|| para.join(" "))
}

fn truncate_with_ellipsis(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    let truncated: String = s.chars().take(max_chars).collect();
    format!("{truncated}...")
}

fn extract_md_links(content: &str, doc_url: &str) -> Vec<String> {
    let base = Url::parse(doc_url).ok();
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::new();
    for line in non_fenced_lines(content) {
        for caps in MD_LINK_RE.captures_iter(line) {
            let raw = caps[1].trim();
            if raw.is_empty() || raw.starts_with('#') {
                continue;
            }
            let lower = raw.to_ascii_lowercase();
            if lower.starts_with("javascript:") || lower.starts_with("mailto:") || lower.starts_with("tel:") {
                continue;
            }
            let resolved = if let Ok(u) = Url::parse(raw) {
                u.to_string()
            } else if let Some(b) = &base {
                match b.join(raw) {
                    Ok(u) => u.to_string(),
                    Err(_) => continue,
                }
            } else {
                continue;
            };
            if seen.insert(resolved.clone()) {
                out.push(resolved);
            }
        }
    }
    out
}

pub mod markdown_reader {
    use super::*;

    /// Parses optional front matter, resolves title/description, and scans
    /// headings/links from the body. `content` in the returned `Document` is
    /// the body with front matter stripped.
    pub fn read(content: &str, url: &str) -> Document {
        let (fm, body) = split_frontmatter(content);

        let title = frontmatter_str(&fm, "title")
            .map(|s| s.to_string())
            .unwrap_or_else(|| first_h1(&body).unwrap_or_default());

        let description = frontmatter_str(&fm, "description")
            .or_else(|| frontmatter_str(&fm, "summary"))
            .map(|s| s.to_string())
            .unwrap_or_else(|| {
                first_prose_paragraph(&body)
                    .map(|p| truncate_with_ellipsis(&p, 300))
                    .unwrap_or_default()
            });

        let headers = all_headers(&body);
        let links = extract_md_links(&body, url);
        let plaintext = markdown::strip_markdown(&body);
        let word_count = markdown::count_words(&plaintext);
        let char_count = markdown::count_chars(&body);
        let content_hash = hex_sha256(body.as_bytes());

        Document {
            url: url.to_string(),
            title,
            description,
            content: body,
            html_content: String::new(),
            fetched_at: now_rfc3339(),
            content_hash,
            word_count,
            char_count,
            links,
            headers,
            rendered_with_js: false,
            source_strategy: "markdown_reader".to_string(),
            cache_hit: false,
            summary: None,
            tags: None,
            category: None,
        }
    }
}

pub mod plaintext_reader {
    use super::*;

    pub fn read(content: &str, url: &str) -> Document {
        let title = title_from(content, url);
        let description = description_from(content);
        let links = extract_md_links(content, url);
        let word_count = markdown::count_words(content);
        let char_count = markdown::count_chars(content);
        let content_hash = hex_sha256(content.as_bytes());

        Document {
            url: url.to_string(),
            title,
            description,
            content: content.to_string(),
            html_content: String::new(),
            fetched_at: now_rfc3339(),
            content_hash,
            word_count,
            char_count,
            links,
            headers: BTreeMap::new(),
            rendered_with_js: false,
            source_strategy: "plaintext_reader".to_string(),
            cache_hit: false,
            summary: None,
            tags: None,
            category: None,
        }
    }

    fn title_from(content: &str, url: &str) -> String {
        match content.lines().map(|l| l.trim()).find(|l| !l.is_empty()) {
            Some(line) => {
                let line = line.strip_prefix("# ").unwrap_or(line);
                truncate_with_ellipsis(line, 97)
            }
            None => basename_without_txt(url),
        }
    }

    fn basename_without_txt(url: &str) -> String {
        let path = Url::parse(url).ok().map(|u| u.path().to_string()).unwrap_or_else(|| url.to_string());
        let base = path.rsplit('/').next().unwrap_or("");
        base.strip_suffix(".txt").unwrap_or(base).to_string()
    }

    fn description_from(content: &str) -> String {
        let mut lines = Vec::new();
        for line in content.lines() {
            let t = line.trim();
            if t.is_empty() {
                if !lines.is_empty() {
                    break;
                }
                continue;
            }
            lines.push(t);
        }
        truncate_with_ellipsis(&lines.join(" "), 297)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn markdown_reader_prefers_frontmatter_title() {
        let content = "---\ntitle: From Front Matter\n---\n# Body Title\n\nSome prose.\n";
        let doc = markdown_reader::read(content, "https://example.com/a.md");
        assert_eq!(doc.title, "From Front Matter");
    }

    #[test]
    fn markdown_reader_falls_back_to_h1() {
        let content = "# Body Title\n\nSome prose here.\n";
        let doc = markdown_reader::read(content, "https://example.com/a.md");
        assert_eq!(doc.title, "Body Title");
    }

    #[test]
    fn markdown_reader_unclosed_frontmatter_is_not_frontmatter() {
        let content = "---\ntitle: x\n\n# Real Heading\n";
        let doc = markdown_reader::read(content, "https://example.com/a.md");
        assert_eq!(doc.title, "Real Heading");
    }

    #[test]
    fn markdown_reader_skips_headings_in_description_search() {
        let content = "# Title\n\n## Subheading\n\nThis is the real prose paragraph.\n";
        let doc = markdown_reader::read(content, "https://example.com/a.md");
        assert!(doc.description.contains("real prose paragraph"));
    }

    #[test]
    fn markdown_reader_resolves_relative_links() {
        let content = "See [docs](/guide) for more.";
        let doc = markdown_reader::read(content, "https://example.com/dir/page.md");
        assert_eq!(doc.links, vec!["https://example.com/guide".to_string()]);
    }

    #[test]
    fn markdown_reader_ignores_links_inside_fences() {
        let content = "```\n[not a link](http://example.com)\n```\n\n[real link](http://example.org)";
        let doc = markdown_reader::read(content, "https://example.com/a.md");
        assert_eq!(doc.links, vec!["http://example.org/".to_string()]);
    }

    #[test]
    fn plaintext_reader_title_from_first_line() {
        let doc = plaintext_reader::read("Hello World\n\nBody text.", "https://example.com/a.txt");
        assert_eq!(doc.title, "Hello World");
    }

    #[test]
    fn plaintext_reader_title_falls_back_to_url_basename() {
        let doc = plaintext_reader::read("", "https://example.com/notes.txt");
        assert_eq!(doc.title, "notes");
    }

    #[test]
    fn plaintext_reader_truncates_long_title() {
        let long_line = "x".repeat(150);
        let doc = plaintext_reader::read(&long_line, "https://example.com/a.txt");
        assert!(doc.title.ends_with("..."));
        assert_eq!(doc.title.chars().count(), 100);
    }
}
