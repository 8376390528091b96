//! URL canonicalization and content-addressed cache keys (spec §4.A).
//!
//! Pure and stateless: no IO, no shared state. `canonicalize` is total — on
//! parse failure it returns the input unchanged rather than erroring, so a
//! caller can always derive *some* key even for malformed input.

use sha2::{Digest, Sha256};

/// Canonical form: lowercase host, default port elided, empty path -> "/",
/// trailing slash stripped except at root, `.`/`..` segments collapsed,
/// fragment removed, query preserved verbatim, missing scheme -> `https`.
pub fn canonicalize(raw: &str) -> String {
    let with_scheme = ensure_scheme(raw);
    let Ok(mut parsed) = url::Url::parse(&with_scheme) else {
        return raw.to_string();
    };
    parsed.set_fragment(None);
    let normalized_path = normalize_path(parsed.path());
    parsed.set_path(&normalized_path);
    parsed.to_string()
}

fn ensure_scheme(raw: &str) -> String {
    if raw.contains("://") {
        raw.to_string()
    } else {
        format!("https://{raw}")
    }
}

fn normalize_path(path: &str) -> String {
    if path.is_empty() {
        return "/".to_string();
    }
    let mut segments: Vec<&str> = Vec::new();
    for seg in path.split('/') {
        match seg {
            "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }
    let mut joined = segments.join("/");
    if joined.is_empty() {
        joined = "/".to_string();
    }
    if !joined.starts_with('/') {
        joined = format!("/{joined}");
    }
    if joined.len() > 1 && joined.ends_with('/') {
        joined.pop();
    }
    joined
}

/// `SHA-256(canonical(url))`, lowercase hex, always 64 characters.
pub fn key(url: &str) -> String {
    let canonical = canonicalize(url);
    hex_sha256(canonical.as_bytes())
}

/// `"<prefix>:" + key(url)`, for the namespaces `page`/`sitemap`/`git`/`meta`.
pub fn prefixed_key(prefix: &str, url: &str) -> String {
    format!("{prefix}:{}", key(url))
}

pub(crate) fn hex_sha256(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn canonicalizes_default_port_and_trailing_slash() {
        assert_eq!(
            canonicalize("HTTPS://Example.com:443/a/b/"),
            "https://example.com/a/b"
        );
    }

    #[test]
    fn canonicalizes_empty_path_to_root() {
        assert_eq!(canonicalize("https://example.com"), "https://example.com/");
    }

    #[test]
    fn preserves_root_trailing_slash() {
        assert_eq!(canonicalize("https://example.com/"), "https://example.com/");
    }

    #[test]
    fn collapses_dot_segments() {
        assert_eq!(
            canonicalize("https://example.com/a/../b/./c/"),
            "https://example.com/b/c"
        );
    }

    #[test]
    fn removes_fragment_but_keeps_query() {
        assert_eq!(
            canonicalize("https://example.com/a?x=1#section"),
            "https://example.com/a?x=1"
        );
    }

    #[test]
    fn defaults_missing_scheme_to_https() {
        assert_eq!(canonicalize("example.com/a"), "https://example.com/a");
    }

    #[test]
    fn parse_failure_returns_input_unchanged() {
        let bogus = "  not a url at all  ::::";
        assert_eq!(canonicalize(bogus), bogus);
    }

    #[test]
    fn key_is_64_lowercase_hex_chars() {
        let k = key("https://example.com/a");
        assert_eq!(k.len(), 64);
        assert!(k.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn equal_canonical_forms_produce_equal_keys() {
        assert_eq!(
            key("https://EXAMPLE.com:443/a/"),
            key("https://example.com/a")
        );
    }

    #[test]
    fn prefixed_key_has_namespace_prefix() {
        let k = prefixed_key("page", "https://example.com/a");
        assert!(k.starts_with("page:"));
        assert_eq!(k.len(), "page:".len() + 64);
    }

    proptest! {
        #[test]
        fn key_never_panics_and_is_deterministic(url in ".*") {
            let k1 = key(&url);
            let k2 = key(&url);
            prop_assert_eq!(k1.clone(), k2);
            prop_assert_eq!(k1.len(), 64);
        }
    }
}
