//! Raw body to model-ready text.
//!
//! The whole path is deterministic and infallible: malformed markup degrades
//! to best-effort extraction, and an empty string comes back only when no
//! text survives. Output is always plain single-line text, which makes the
//! function idempotent; the deduplicator's hashing relies on that.

use std::sync::OnceLock;

use regex::Regex;
use scraper::{ElementRef, Html, Selector};

/// Tags whose subtrees never contribute page text.
const SKIP_TAGS: &[&str] = &[
    "script", "style", "noscript", "svg", "canvas", "iframe", "form", "button", "header",
    "footer", "nav", "aside",
];

/// Class/id substrings that mark chrome and ad furniture.
const NOISE_IDENTIFIERS: &[&str] = &[
    "ads", "advert", "sponsor", "promo", "cookie", "consent", "banner", "modal", "subscribe",
    "newsletter", "share", "social", "sidebar", "comments", "breadcrumb", "pagination",
];

fn markup_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<[A-Za-z!/]").unwrap())
}

fn block_strip_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?is)<(?:script|style|noscript|svg|canvas|iframe)[^>]*?>.*?</(?:script|style|noscript|svg|canvas|iframe)>",
        )
        .unwrap()
    })
}

fn structural_strip_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?is)<(?:nav|header|footer|aside|form)[^>]*?>.*?</(?:nav|header|footer|aside|form)>")
            .unwrap()
    })
}

fn garbage_line_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        let garbage = [
            r"(?i)^subscribe$",
            r"(?i)^sign up$",
            r"(?i)^cookie",
            r"(?i)^accept all$",
            r"(?i)^advert",
            r"(?i)^sponsor",
            r"(?i)^newsletter$",
            r"(?i)^comments?$",
            r"(?i)^read more$",
            r"(?i)^continue reading$",
        ];
        Regex::new(&garbage.join("|")).unwrap()
    })
}

fn email_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}").unwrap())
}

fn phone_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b1[3-9]\d{9}\b").unwrap())
}

fn ipv4_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b\d{1,3}\.\d{1,3}\.\d{1,3}\.\d{1,3}\b").unwrap())
}

fn whitespace_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s+").unwrap())
}

/// Normalize a raw fetched body into clean plain text.
pub fn normalize(raw: &str) -> String {
    let text = if looks_like_markup(raw) {
        extract_markup_text(raw)
    } else {
        raw.to_string()
    };
    let text = filter_boilerplate_lines(&text);
    let text = redact_sensitive(&text);
    collapse_whitespace(&text)
}

fn looks_like_markup(raw: &str) -> bool {
    markup_re().is_match(raw)
}

fn extract_markup_text(html: &str) -> String {
    let pre = block_strip_re().replace_all(html, " ");
    let pre = structural_strip_re().replace_all(&pre, " ");

    let document = Html::parse_document(&pre);
    let mut parts = Vec::new();

    if let Ok(body_selector) = Selector::parse("body") {
        if let Some(body) = document.select(&body_selector).next() {
            collect_text(&body, &mut parts);
        }
    }
    if parts.is_empty() {
        for node in document.tree.nodes() {
            if let Some(text) = node.value().as_text() {
                parts.push(text.text.to_string());
            }
        }
    }

    // Residual angle brackets (escaped markup, stray comparisons) are
    // non-text artifacts; dropping them keeps the output plain text.
    parts.join("\n").replace(['<', '>'], " ")
}

fn collect_text(element: &ElementRef, parts: &mut Vec<String>) {
    for child in element.children() {
        if let Some(child_element) = ElementRef::wrap(child) {
            let tag = child_element.value().name();
            if SKIP_TAGS.contains(&tag) {
                continue;
            }

            let attrs = child_element.value();
            let mut skip = false;
            if let Some(id) = attrs.id() {
                skip |= is_noise_identifier(id);
            }
            for class in attrs.classes() {
                if is_noise_identifier(class) {
                    skip = true;
                    break;
                }
            }
            if skip {
                continue;
            }
            collect_text(&child_element, parts);
        } else if let Some(text_node) = child.value().as_text() {
            parts.push(text_node.text.to_string());
        }
    }
}

fn is_noise_identifier(ident: &str) -> bool {
    let ident = ident.to_ascii_lowercase();
    NOISE_IDENTIFIERS.iter().any(|n| ident.contains(n))
}

fn filter_boilerplate_lines(text: &str) -> String {
    let mut kept = Vec::new();
    for line in text.split('\n') {
        let line = line.trim();
        if line.len() < 2 {
            continue;
        }
        if garbage_line_re().is_match(line) {
            continue;
        }
        kept.push(line.to_string());
    }
    kept.dedup();
    kept.join("\n")
}

/// Mask emails, phone numbers and IPv4 addresses in place.
///
/// Mask shapes are chosen so a second pass cannot re-match them.
fn redact_sensitive(text: &str) -> String {
    let text = email_re().replace_all(text, |caps: &regex::Captures| {
        let m = caps.get(0).map(|m| m.as_str()).unwrap_or("");
        match (m.chars().next(), m.find('@')) {
            (Some(first), Some(at)) => format!("{first}****{}", &m[at..]),
            _ => m.to_string(),
        }
    });
    let text = phone_re().replace_all(&text, |caps: &regex::Captures| {
        let m = caps.get(0).map(|m| m.as_str()).unwrap_or("");
        format!("{}****{}", &m[..3], &m[m.len() - 4..])
    });
    let text = ipv4_re().replace_all(&text, |caps: &regex::Captures| {
        let m = caps.get(0).map(|m| m.as_str()).unwrap_or("");
        match m.rfind('.') {
            Some(dot) => format!("{}.xxx", &m[..dot]),
            None => m.to_string(),
        }
    });
    text.into_owned()
}

fn collapse_whitespace(text: &str) -> String {
    whitespace_re().replace_all(text, " ").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strips_markup_and_collapses_whitespace() {
        let html = "<html><head><title>t</title></head><body>\n  <p>Hello   world</p>\n  <p>second\tline</p></body></html>";
        assert_eq!(normalize(html), "Hello world second line");
    }

    #[test]
    fn test_scripts_styles_and_nav_are_dropped() {
        let html = "<body><script>var a = 1;</script><style>p{color:red}</style>\
                    <nav>Home About</nav><p>Real content here</p><footer>legal</footer></body>";
        assert_eq!(normalize(html), "Real content here");
    }

    #[test]
    fn test_noise_classed_elements_are_dropped() {
        let html = "<body><div class=\"cookie-banner\">We use cookies</div>\
                    <div id=\"sidebar-ads\">Buy now</div><p>Article text</p></body>";
        assert_eq!(normalize(html), "Article text");
    }

    #[test]
    fn test_plain_text_passes_through() {
        assert_eq!(normalize("already   plain \n text"), "already plain text");
    }

    #[test]
    fn test_inequality_is_not_treated_as_markup() {
        assert_eq!(normalize("sums where a < b hold"), "sums where a < b hold");
    }

    #[test]
    fn test_empty_and_markup_only_input_yield_empty_string() {
        assert_eq!(normalize(""), "");
        assert_eq!(normalize("<html><body><script>1</script></body></html>"), "");
    }

    #[test]
    fn test_email_redaction() {
        let out = normalize("contact alice@example.com for details");
        assert_eq!(out, "contact a****@example.com for details");
    }

    #[test]
    fn test_phone_redaction() {
        let out = normalize("call 13812345678 now");
        assert_eq!(out, "call 138****5678 now");
    }

    #[test]
    fn test_ipv4_redaction() {
        let out = normalize("server at 192.168.10.25 responded");
        assert_eq!(out, "server at 192.168.10.xxx responded");
    }

    #[test]
    fn test_boilerplate_lines_filtered() {
        let html = "<body><p>Subscribe</p><p>Cookie settings</p><p>Useful paragraph</p></body>";
        assert_eq!(normalize(html), "Useful paragraph");
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let inputs = [
            "<body><p>Hello <b>world</b></p><p>a &lt; b and x@y.com</p></body>",
            "plain text with 13812345678 and 10.0.0.1",
            "<div class=\"ads\">ad</div><p>kept &amp; sound</p>",
            "",
        ];
        for input in inputs {
            let once = normalize(input);
            let twice = normalize(&once);
            assert_eq!(once, twice, "normalize not idempotent for {input:?}");
        }
    }

    #[test]
    fn test_deterministic_output() {
        let html = "<body><p>Same input</p><p>same output</p></body>";
        assert_eq!(normalize(html), normalize(html));
    }
}
