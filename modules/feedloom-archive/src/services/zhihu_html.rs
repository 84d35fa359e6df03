// Zhihu rich-text cleanup: lazy-load fallbacks, sponsored cards, redirect
// links and low-resolution image variants. Output still goes through the
// shared sanitizer.

use std::sync::LazyLock;

use feedloom_common::html::{escape_html, strip_html};
use regex::{Captures, Regex};
use serde_json::Value;
use url::Url;

use crate::json::{array_at, count_at, str_at};

static NOSCRIPT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<noscript\b[^>]*>.*?</noscript\s*>").expect("valid regex")
});
static MCN_CARD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)<a\b[^>]*data-draft-type\s*=\s*["']mcn-link-card["'][^>]*>.*?</a\s*>"#)
        .expect("valid regex")
});
static REDIRECT_HREF_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"href\s*=\s*"(https://link\.zhihu\.com/\?target=[^"]*)""#).expect("valid regex")
});
static IMG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<img\b([^>]*?)/?>").expect("valid regex"));
static ATTR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"([a-zA-Z_:][-a-zA-Z0-9_:.]*)\s*=\s*(?:"([^"]*)"|'([^']*)')"#)
        .expect("valid regex")
});
static SMALL_VARIANT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"_b\.(jpg|png|gif|webp)").expect("valid regex"));
static RESIZED_VARIANT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"_r\.(jpg|png|gif|webp)").expect("valid regex"));
static FIGCAPTION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<figcaption\b[^>]*>(.*?)</figcaption\s*>").expect("valid regex")
});

/// Clean an answer/article/question body.
pub(crate) fn process_content(html: &str) -> String {
    if html.is_empty() {
        return String::new();
    }

    let html = NOSCRIPT_RE.replace_all(html, "");
    let html = MCN_CARD_RE.replace_all(&html, "");
    let html = REDIRECT_HREF_RE.replace_all(&html, |caps: &Captures| {
        match redirect_target(&caps[1]) {
            Some(target) => format!("href=\"{}\"", escape_html(&target)),
            None => caps[0].to_string(),
        }
    });
    let html = IMG_RE.replace_all(&html, |caps: &Captures| rebuild_img(caps));
    FIGCAPTION_RE
        .replace_all(&html, |caps: &Captures| {
            format!("<p><em>{}</em></p>", strip_html(&caps[1]).trim())
        })
        .into_owned()
}

fn redirect_target(href: &str) -> Option<String> {
    let url = Url::parse(&href.replace("&amp;", "&")).ok()?;
    url.query_pairs()
        .find(|(k, _)| k == "target")
        .map(|(_, v)| v.into_owned())
        .filter(|t| !t.is_empty())
}

/// Pick the best source among the lazy-load attributes and rebuild the tag
/// with reader-friendly attributes only.
fn rebuild_img(caps: &Captures) -> String {
    let mut actual = None;
    let mut original = None;
    let mut src = None;
    for attr in ATTR_RE.captures_iter(&caps[1]) {
        let value = attr.get(2).or_else(|| attr.get(3)).map(|m| m.as_str());
        match attr[1].to_ascii_lowercase().as_str() {
            "data-actualsrc" => actual = value,
            "data-original" => original = value,
            "src" => src = value,
            _ => {}
        }
    }

    let upgraded = match (actual, original, src) {
        (Some(a), _, _) if !a.is_empty() => SMALL_VARIANT_RE.replace_all(a, "_1440w.$1"),
        (_, Some(o), _) if !o.is_empty() => RESIZED_VARIANT_RE.replace_all(o, "_1440w.$1"),
        (_, _, Some(s)) if !s.is_empty() => SMALL_VARIANT_RE.replace_all(s, "_1440w.$1"),
        _ => return caps[0].to_string(),
    };
    image_tag(&upgraded)
}

fn image_tag(src: &str) -> String {
    format!(
        r#"<img src="{}" style="max-width:100%" referrerpolicy="no-referrer" />"#,
        escape_html(src)
    )
}

/// Render a pin's block list (text, image, link, video) as HTML.
pub(crate) fn build_pin_html(content: &Value, excerpt_title: &str) -> String {
    match content {
        Value::String(text) => format!("<p>{}</p>", escape_html(text)),
        Value::Array(blocks) => blocks
            .iter()
            .filter_map(pin_block)
            .collect::<Vec<_>>()
            .join("\n"),
        _ if !excerpt_title.is_empty() => format!("<p>{}</p>", escape_html(excerpt_title)),
        _ => String::new(),
    }
}

fn pin_block(block: &Value) -> Option<String> {
    let paragraph = |text: &str| (!text.is_empty()).then(|| format!("<p>{}</p>", escape_html(text)));

    match str_at(block, &["type"]) {
        "text" => match str_at(block, &["own_text"]) {
            "" => paragraph(str_at(block, &["content"])),
            own => paragraph(own),
        },
        "image" => {
            let url = match str_at(block, &["original_url"]) {
                "" => str_at(block, &["url"]),
                original => original,
            };
            if url.is_empty() {
                return None;
            }
            let url = url.strip_suffix("/xl").map_or_else(|| url.to_string(), |u| format!("{u}/r"));
            Some(format!("<p>{}</p>", image_tag(&url)))
        }
        "link" => {
            let url = str_at(block, &["url"]);
            if url.is_empty() {
                return None;
            }
            let title = match str_at(block, &["title"]) {
                "" => url,
                t => t,
            };
            Some(format!(
                r#"<p><a href="{}" target="_blank">{}</a></p>"#,
                escape_html(url),
                escape_html(title)
            ))
        }
        "video" => {
            let cover = str_at(block, &["cover_url"]);
            // The second playlist entry is usually the higher-quality stream.
            let playlist = array_at(block, &["playlist"]);
            if let Some(video) = playlist.get(1) {
                return Some(format!(
                    r#"<p><video controls width="{}" height="{}" src="{}" poster="{}"></video></p>"#,
                    count_at(video, &["width"]).unwrap_or(640),
                    count_at(video, &["height"]).unwrap_or(360),
                    escape_html(str_at(video, &["url"])),
                    escape_html(cover),
                ));
            }
            if cover.is_empty() {
                Some("<p><em>[video]</em></p>".to_string())
            } else {
                Some(format!("<p>{}<br><em>[video]</em></p>", image_tag(cover)))
            }
        }
        _ => paragraph(str_at(block, &["content"])),
    }
}
