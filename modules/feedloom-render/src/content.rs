// Per-platform HTML bodies for feed entries.

use feedloom_common::html::{escape_html, has_markup, sanitize_html};
use feedloom_common::{ActivityItem, Platform, StatKind};

use crate::image_proxy::ImageProxy;

const EMPTY_BODY: &str = "<p>(no content)</p>";

/// Build the `content:encoded` body for one item. Every image source in the
/// result has been passed through `proxy`.
pub fn build_content(item: &ActivityItem, proxy: &ImageProxy) -> String {
    let mut parts = Vec::new();

    if !item.author.is_empty() {
        parts.push(format!("<p><strong>{}</strong></p>", escape_html(&item.author)));
    }

    match item.platform {
        Platform::Bilibili | Platform::BilibiliAlt => video_body(item, &mut parts),
        Platform::Zhihu => rich_text_body(item, &mut parts),
        Platform::Douban => prebuilt_body(item, &mut parts),
    }

    if let Some(line) = stats_line(item) {
        parts.push(line);
    }

    if parts.is_empty() {
        return EMPTY_BODY.to_string();
    }
    proxy.rewrite_html(&parts.join("\n"))
}

/// Text, image gallery, then the cover linking to the video with its
/// duration overlaid.
fn video_body(item: &ActivityItem, parts: &mut Vec<String>) {
    if !item.content.is_empty() {
        parts.push(format!("<p>{}</p>", body_html(&item.content)));
    }
    push_gallery(item, parts);

    let Some(cover) = item.cover_image.as_deref() else {
        return;
    };
    if item.images.iter().any(|i| i == cover) {
        return;
    }
    let mut cover_html = image_tag(cover);
    if let Some(duration) = item.cover_duration.as_deref() {
        cover_html = format!(
            "<div style=\"position:relative;display:inline-block\">{cover_html}\
             <span style=\"position:absolute;right:4px;bottom:4px;background:rgba(0,0,0,.7);\
             color:#fff;padding:1px 4px;border-radius:2px;font-size:12px\">{}</span></div>",
            escape_html(duration)
        );
    }
    if !item.link.is_empty() {
        cover_html = format!("<a href=\"{}\">{cover_html}</a>", escape_html(&item.link));
    }
    parts.push(format!("<p>{cover_html}</p>"));
}

/// Answers and articles arrive as rich text, already sanitized by the
/// normalizer. Pushed items may not be, so sanitize again.
fn rich_text_body(item: &ActivityItem, parts: &mut Vec<String>) {
    if !item.content.is_empty() {
        if has_markup(&item.content) {
            parts.push(format!("<div>{}</div>", sanitize_html(&item.content)));
        } else {
            parts.push(format!("<p>{}</p>", body_html(&item.content)));
        }
    }
    push_gallery(item, parts);
}

fn prebuilt_body(item: &ActivityItem, parts: &mut Vec<String>) {
    if !item.content.is_empty() {
        parts.push(format!("<p>{}</p>", body_html(&item.content)));
    }
    push_gallery(item, parts);
}

/// Images not already embedded in the body.
fn push_gallery(item: &ActivityItem, parts: &mut Vec<String>) {
    for image in &item.images {
        if image.is_empty() || item.content.contains(image.as_str()) {
            continue;
        }
        parts.push(format!("<p>{}</p>", image_tag(image)));
    }
}

fn body_html(content: &str) -> String {
    if has_markup(content) {
        sanitize_html(content)
    } else {
        escape_html(content).replace('\n', "<br>")
    }
}

fn image_tag(src: &str) -> String {
    format!(
        "<img src=\"{}\" style=\"max-width:100%\" referrerpolicy=\"no-referrer\" />",
        escape_html(src)
    )
}

fn stats_line(item: &ActivityItem) -> Option<String> {
    let stats = item.stats.nonzero();
    if stats.is_empty() {
        return None;
    }
    let text = stats
        .into_iter()
        .map(|(kind, n)| format!("{} {n}", stat_label(kind)))
        .collect::<Vec<_>>()
        .join(" · ");
    Some(format!("<p style=\"color:#888;font-size:12px\">{text}</p>"))
}

fn stat_label(kind: StatKind) -> &'static str {
    match kind {
        StatKind::Likes => "👍",
        StatKind::Views => "👀",
        StatKind::Comments => "💬",
        StatKind::Forwards => "🔄",
        StatKind::Danmaku => "💭",
    }
}

#[cfg(test)]
mod tests {
    use feedloom_common::Stats;

    use super::*;

    fn proxy() -> ImageProxy {
        ImageProxy::new("https://wsrv.nl/?url=", ["hdslb.com", "zhimg.com"])
    }

    #[test]
    fn video_cover_carries_duration_and_link() {
        let mut item = ActivityItem::new(Platform::Bilibili, "1");
        item.author = "up".into();
        item.link = "https://www.bilibili.com/video/BV1".into();
        item.cover_image = Some("//i0.hdslb.com/bfs/cover.jpg".into());
        item.cover_duration = Some("03:12".into());
        item.stats = Stats {
            likes: Some(3),
            views: Some(120),
            ..Default::default()
        };

        let html = build_content(&item, &proxy());
        assert!(html.starts_with("<p><strong>up</strong></p>"));
        assert!(html.contains(r#"<a href="https://www.bilibili.com/video/BV1"><div"#));
        assert!(html.contains("https://wsrv.nl/?url=https%3A%2F%2Fi0.hdslb.com%2Fbfs%2Fcover.jpg"));
        assert!(html.contains(">03:12</span>"));
        assert!(html.contains("👍 3 · 👀 120"));
    }

    #[test]
    fn cover_already_in_gallery_is_not_repeated() {
        let mut item = ActivityItem::new(Platform::Bilibili, "1");
        item.images = vec!["https://example.org/a.jpg".into()];
        item.cover_image = Some("https://example.org/a.jpg".into());
        let html = build_content(&item, &proxy());
        assert_eq!(html.matches("<img").count(), 1);
    }

    #[test]
    fn plain_text_is_escaped_with_line_breaks() {
        let mut item = ActivityItem::new(Platform::Douban, "douban_1");
        item.content = "a < b\nnext".into();
        assert_eq!(build_content(&item, &proxy()), "<p>a &lt; b<br>next</p>");
    }

    #[test]
    fn rich_text_is_sanitized_and_proxied() {
        let mut item = ActivityItem::new(Platform::Zhihu, "zhihu_1");
        item.content =
            r#"<p onclick="x()">hi</p><script>evil()</script><img src="https://pic1.zhimg.com/v2-a.jpg">"#
                .into();
        item.images = vec!["https://pic1.zhimg.com/v2-a.jpg".into()];

        let html = build_content(&item, &proxy());
        assert!(html.starts_with("<div><p>hi</p>"));
        assert!(!html.contains("script"));
        assert!(!html.contains("onclick"));
        assert_eq!(html.matches("<img").count(), 1);
        assert!(html.contains("https://wsrv.nl/?url=https%3A%2F%2Fpic1.zhimg.com%2Fv2-a.jpg"));
    }

    #[test]
    fn empty_item_gets_placeholder_body() {
        let item = ActivityItem::new(Platform::Douban, "douban_1");
        assert_eq!(build_content(&item, &proxy()), EMPTY_BODY);
    }
}
