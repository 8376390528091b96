//! Content-type routing (spec §4.G): decides which reader track a fetched
//! body takes. Content-Type wins over the URL extension; an empty
//! Content-Type defaults to HTML rather than rejecting the body outright.

fn url_path(url: &str) -> String {
    match url::Url::parse(url) {
        Ok(parsed) => parsed.path().to_string(),
        Err(_) => {
            let no_fragment = url.split('#').next().unwrap_or(url);
            no_fragment.split('?').next().unwrap_or(no_fragment).to_string()
        }
    }
}

pub fn is_markdown(content_type: &str, url: &str) -> bool {
    let ct = content_type.to_ascii_lowercase();
    if ct.contains("text/markdown") || ct.contains("text/x-markdown") || ct.contains("application/markdown") {
        return true;
    }
    let path = url_path(url).to_ascii_lowercase();
    [".md", ".mdx", ".markdown", ".mdown"]
        .iter()
        .any(|ext| path.ends_with(ext))
}

pub fn is_plain_text(content_type: &str, url: &str) -> bool {
    if content_type.to_ascii_lowercase().contains("text/plain") {
        return true;
    }
    url_path(url).to_ascii_lowercase().ends_with(".txt")
}

pub fn is_html(content_type: &str) -> bool {
    let trimmed = content_type.trim();
    if trimmed.is_empty() {
        return true;
    }
    let ct = trimmed.to_ascii_lowercase();
    ct.contains("text/html") || ct.contains("application/xhtml")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn markdown_content_type_matches_regardless_of_extension() {
        assert!(is_markdown("text/markdown", "https://example.com/a.html"));
    }

    #[test]
    fn extension_fallback_applies_even_under_a_non_markdown_content_type() {
        // A non-matching content-type doesn't suppress the `.md` extension
        // fallback — it only fails to short-circuit it.
        assert!(is_markdown("text/html", "https://example.com/a.md"));
    }

    #[test]
    fn extension_fallback_when_content_type_is_generic() {
        assert!(is_markdown("application/octet-stream", "https://example.com/readme.md"));
        assert!(is_plain_text("application/octet-stream", "https://example.com/notes.txt"));
    }

    #[test]
    fn empty_content_type_defaults_to_html() {
        assert!(is_html(""));
        assert!(is_html("   "));
    }

    #[test]
    fn xhtml_counts_as_html() {
        assert!(is_html("application/xhtml+xml"));
    }
}
