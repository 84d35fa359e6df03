// HTML helpers shared by the normalizers and the feed renderer: an
// allowlist sanitizer, escaping, tag stripping and char-safe truncation.

use std::sync::LazyLock;

use regex::{Captures, Regex};
use url::{ParseError, Url};

/// Elements removed together with everything inside them.
const DROPPED_WITH_CONTENT: &[&str] = &[
    "script", "style", "iframe", "noscript", "object", "embed", "template", "textarea", "select",
];

/// Text-structure elements kept without attributes.
const PLAIN_TAGS: &[&str] = &[
    "p", "br", "b", "i", "u", "s", "strong", "em", "del", "sup", "sub", "blockquote", "ul", "ol",
    "li", "h1", "h2", "h3", "h4", "h5", "h6", "pre", "code", "hr", "figure", "div", "span",
];

const VOID_TAGS: &[&str] = &["br", "hr", "img"];

static DROPPED_BLOCKS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    DROPPED_WITH_CONTENT
        .iter()
        .map(|tag| {
            Regex::new(&format!(r"(?is)<{tag}\b[^>]*>.*?</{tag}\s*>|<{tag}\b[^>]*/>"))
                .expect("valid regex")
        })
        .collect()
});
static COMMENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<!--.*?-->").expect("valid regex"));
static TAG_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<(/?)([a-zA-Z][a-zA-Z0-9]*)\b([^>]*?)(/?)>").expect("valid regex")
});
static ATTR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"([a-zA-Z_:][-a-zA-Z0-9_:.]*)(?:\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'=<>`]+)))?"#)
        .expect("valid regex")
});
static ANY_TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<[^>]*>").expect("valid regex"));
static MARKUP_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<[a-zA-Z][^>]*>").expect("valid regex"));
static CHAR_REF_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"&#[xX]([0-9a-fA-F]+);?|&#([0-9]+);?|&([a-zA-Z]+);").expect("valid regex")
});

/// Schemes a link or media URL may carry. Relative and scheme-relative
/// URLs are also accepted.
const SAFE_SCHEMES: &[&str] = &["http", "https"];

fn allowed_attrs(tag: &str) -> Option<&'static [&'static str]> {
    match tag {
        "a" => Some(&["href", "target"]),
        "img" => Some(&["src", "style", "referrerpolicy"]),
        "video" => Some(&["src", "controls", "width", "height", "poster"]),
        t if PLAIN_TAGS.contains(&t) => Some(&[]),
        _ => None,
    }
}

fn is_url_attr(name: &str) -> bool {
    matches!(name, "href" | "src" | "poster")
}

/// Resolve numeric and the URL-relevant named character references, the
/// way a browser does before it reads an attribute value.
fn decode_char_refs(value: &str) -> String {
    CHAR_REF_RE
        .replace_all(value, |caps: &Captures| {
            let code = if let Some(hex) = caps.get(1) {
                u32::from_str_radix(hex.as_str(), 16).ok()
            } else if let Some(dec) = caps.get(2) {
                dec.as_str().parse().ok()
            } else {
                match caps[3].to_ascii_lowercase().as_str() {
                    "colon" => Some(u32::from(b':')),
                    "tab" => Some(u32::from(b'\t')),
                    "newline" => Some(u32::from(b'\n')),
                    "sol" => Some(u32::from(b'/')),
                    "amp" => Some(u32::from(b'&')),
                    "lpar" => Some(u32::from(b'(')),
                    "rpar" => Some(u32::from(b')')),
                    _ => None,
                }
            };
            match code.and_then(char::from_u32) {
                Some(c) => c.to_string(),
                None => caps[0].to_string(),
            }
        })
        .into_owned()
}

fn unsafe_url(value: &str) -> bool {
    let decoded: String = decode_char_refs(value)
        .chars()
        .filter(|c| !c.is_whitespace() && !c.is_control())
        .collect();
    match Url::parse(&decoded) {
        Ok(url) => !SAFE_SCHEMES.contains(&url.scheme()),
        Err(ParseError::RelativeUrlWithoutBase) => false,
        Err(_) => true,
    }
}

fn unsafe_style(value: &str) -> bool {
    let v = decode_char_refs(value).to_ascii_lowercase();
    v.contains("expression") || v.contains("url(") || v.contains("javascript:")
}

/// Keep only allowlisted tags and attributes. Script-like elements are
/// removed with their content; other unknown tags are unwrapped (their text
/// survives).
pub fn sanitize_html(html: &str) -> String {
    if html.is_empty() {
        return String::new();
    }

    let mut out = COMMENT_RE.replace_all(html, "").into_owned();
    for re in DROPPED_BLOCKS.iter() {
        out = re.replace_all(&out, "").into_owned();
    }

    TAG_RE
        .replace_all(&out, |caps: &Captures| rebuild_tag(caps))
        .into_owned()
}

fn rebuild_tag(caps: &Captures) -> String {
    let closing = !caps[1].is_empty();
    let tag = caps[2].to_ascii_lowercase();
    let Some(allowed) = allowed_attrs(&tag) else {
        return String::new();
    };

    if closing {
        return if VOID_TAGS.contains(&tag.as_str()) {
            String::new()
        } else {
            format!("</{tag}>")
        };
    }

    let mut rebuilt = format!("<{tag}");
    for attr in ATTR_RE.captures_iter(&caps[3]) {
        let name = attr[1].to_ascii_lowercase();
        if !allowed.contains(&name.as_str()) {
            continue;
        }
        let value = attr
            .get(2)
            .or_else(|| attr.get(3))
            .or_else(|| attr.get(4))
            .map(|m| m.as_str());
        match value {
            Some(v) => {
                if is_url_attr(&name) && unsafe_url(v) {
                    continue;
                }
                if name == "style" && unsafe_style(v) {
                    continue;
                }
                rebuilt.push_str(&format!(" {name}=\"{}\"", escape_attr(v)));
            }
            None if name == "controls" => rebuilt.push_str(" controls"),
            None => {}
        }
    }

    if VOID_TAGS.contains(&tag.as_str()) && tag != "br" && tag != "hr" {
        rebuilt.push_str(" />");
    } else {
        rebuilt.push('>');
    }
    rebuilt
}

fn escape_attr(value: &str) -> String {
    value
        .replace('"', "&quot;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// Escape text for inclusion in HTML.
pub fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Remove every tag, keeping text.
pub fn strip_html(text: &str) -> String {
    ANY_TAG_RE.replace_all(text, "").into_owned()
}

/// Does this string carry element markup?
pub fn has_markup(text: &str) -> bool {
    MARKUP_RE.is_match(text)
}

/// Cut to `max` characters, appending `...` when anything was removed.
pub fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

/// Prefix protocol-relative URLs with `https:`.
pub fn absolute_url(url: &str) -> String {
    match url.strip_prefix("//") {
        Some(rest) => format!("https://{rest}"),
        None => url.to_string(),
    }
}
