//! Charset detection and transcoding to UTF-8 (spec §4.F). Meta-tag sniffing
//! takes precedence over the statistical detector, matching how browsers and
//! `servo`'s HTTP cache resolve charset ambiguity.

use once_cell::sync::Lazy;
use regex::Regex;

const SNIFF_WINDOW: usize = 1024;

static META_CHARSET_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?is)<meta[^>]+charset\s*=\s*["']?([^"';>\s]+)"#).unwrap()
});

static META_HTTP_EQUIV_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?is)<meta[^>]+http-equiv\s*=\s*["']content-type["'][^>]*content\s*=\s*["']?[^"'>]*charset\s*=\s*["']?([^"';>\s]+)"#).unwrap()
});

/// Lowercased charset label: a `<meta charset>`/`http-equiv` hit in the first
/// `SNIFF_WINDOW` bytes, else the `chardetng` statistical guess.
pub fn detect(bytes: &[u8]) -> String {
    let window = &bytes[..bytes.len().min(SNIFF_WINDOW)];
    if let Some(charset) = sniff_meta_charset(window) {
        return charset.to_ascii_lowercase();
    }
    let mut detector = chardetng::EncodingDetector::new();
    detector.feed(bytes, true);
    let encoding = detector.guess(None, true);
    encoding.name().to_ascii_lowercase()
}

pub fn is_utf8(bytes: &[u8]) -> bool {
    matches!(detect(bytes).as_str(), "utf-8" | "utf8")
}

/// Transcodes to UTF-8 bytes. Unknown or already-UTF-8 charsets pass through
/// unchanged.
pub fn convert_to_utf8(bytes: &[u8]) -> Vec<u8> {
    let charset = detect(bytes);
    if charset == "utf-8" || charset == "utf8" {
        return bytes.to_vec();
    }
    match encoding_rs::Encoding::for_label(charset.as_bytes()) {
        Some(encoding) => {
            let (decoded, _, _) = encoding.decode(bytes);
            decoded.into_owned().into_bytes()
        }
        None => bytes.to_vec(),
    }
}

fn sniff_meta_charset(window: &[u8]) -> Option<String> {
    let text = String::from_utf8_lossy(window);
    if let Some(caps) = META_CHARSET_RE.captures(&text) {
        return Some(caps[1].to_string());
    }
    META_HTTP_EQUIV_RE.captures(&text).map(|caps| caps[1].to_string())
}
