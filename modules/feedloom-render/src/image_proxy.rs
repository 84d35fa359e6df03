// Service: image proxy rewriting.
//
// Several CDNs reject image requests that carry a foreign referrer, which
// is what feed readers send. Images on those hosts are routed through a
// public resizing proxy instead.

use std::sync::LazyLock;

use feedloom_common::html::absolute_url;
use feedloom_common::FeedConfig;
use regex::{Captures, Regex};
use url::Url;

static MEDIA_TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<(img|video)\b[^>]*>").expect("valid regex"));
static URL_ATTR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)(\s)(src|poster)\s*=\s*"([^"]*)""#).expect("valid regex")
});

#[derive(Debug, Clone)]
pub struct ImageProxy {
    prefix: String,
    domains: Vec<String>,
}

impl ImageProxy {
    pub fn new(prefix: impl Into<String>, domains: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            prefix: prefix.into(),
            domains: domains
                .into_iter()
                .map(|d| d.into().trim().trim_start_matches('.').to_ascii_lowercase())
                .filter(|d| !d.is_empty())
                .collect(),
        }
    }

    pub fn from_config(config: &FeedConfig) -> Self {
        Self::new(
            config.image_proxy_prefix.clone(),
            config.image_proxy_domains.iter().cloned(),
        )
    }

    /// Absolute form of `url`, proxied when its host is on the list.
    /// Empty input stays empty and proxied URLs are returned as-is.
    pub fn rewrite(&self, url: &str) -> String {
        let url = url.trim();
        if url.is_empty() {
            return String::new();
        }
        let absolute = absolute_url(url);
        if !self.prefix.is_empty() && absolute.starts_with(&self.prefix) {
            return absolute;
        }
        if self.should_proxy(&absolute) {
            format!("{}{}", self.prefix, urlencoding::encode(&absolute))
        } else {
            absolute
        }
    }

    /// Host equals a listed domain or sits under it (`img.hdslb.com` for
    /// `hdslb.com`, but not `nothdslb.com`).
    pub fn should_proxy(&self, url: &str) -> bool {
        let Ok(parsed) = Url::parse(url) else {
            return false;
        };
        let Some(host) = parsed.host_str() else {
            return false;
        };
        let host = host.to_ascii_lowercase();
        self.domains.iter().any(|domain| {
            host == *domain
                || host
                    .strip_suffix(domain.as_str())
                    .is_some_and(|rest| rest.ends_with('.'))
        })
    }

    /// Rewrite image URLs in `html`: `src` on `<img>` and `poster` on
    /// `<video>`. Video sources are left alone.
    pub fn rewrite_html(&self, html: &str) -> String {
        MEDIA_TAG_RE
            .replace_all(html, |tag: &Captures| {
                let image_attr = if tag[1].eq_ignore_ascii_case("img") {
                    "src"
                } else {
                    "poster"
                };
                URL_ATTR_RE
                    .replace_all(&tag[0], |caps: &Captures| {
                        if !caps[2].eq_ignore_ascii_case(image_attr) {
                            return caps[0].to_string();
                        }
                        let raw = caps[3].replace("&amp;", "&");
                        let rewritten = self.rewrite(&raw).replace('&', "&amp;");
                        format!("{}{}=\"{}\"", &caps[1], &caps[2], rewritten)
                    })
                    .into_owned()
            })
            .into_owned()
    }
}

#[cfg(test)]
mod tests {
    use feedloom_common::config::{DEFAULT_IMAGE_PROXY_DOMAINS, DEFAULT_IMAGE_PROXY_PREFIX};

    use super::*;

    fn proxy() -> ImageProxy {
        ImageProxy::new(DEFAULT_IMAGE_PROXY_PREFIX, DEFAULT_IMAGE_PROXY_DOMAINS.iter().copied())
    }

    #[test]
    fn proxies_listed_cdn_and_fixes_scheme() {
        let proxy = ImageProxy::new("https://wsrv.nl/?url=", ["example-cdn.com"]);
        assert_eq!(
            proxy.rewrite("//cdn.example-cdn.com/x.jpg"),
            "https://wsrv.nl/?url=https%3A%2F%2Fcdn.example-cdn.com%2Fx.jpg"
        );
        assert_eq!(proxy.rewrite("//other.org/y.jpg"), "https://other.org/y.jpg");
    }

    #[test]
    fn already_proxied_is_untouched() {
        let once = proxy().rewrite("https://i0.hdslb.com/bfs/a.jpg");
        assert!(once.starts_with(DEFAULT_IMAGE_PROXY_PREFIX));
        assert_eq!(proxy().rewrite(&once), once);
    }

    #[test]
    fn matches_on_domain_boundary() {
        let proxy = proxy();
        assert!(proxy.should_proxy("https://hdslb.com/a.jpg"));
        assert!(proxy.should_proxy("https://I0.HDSLB.com/a.jpg"));
        assert!(!proxy.should_proxy("https://nothdslb.com/a.jpg"));
        assert!(!proxy.should_proxy("not a url"));
    }

    #[test]
    fn empty_url_stays_empty() {
        assert_eq!(proxy().rewrite("  "), "");
    }

    #[test]
    fn rewrites_src_and_poster_attributes() {
        let html = r#"<p><img src="//pic1.zhimg.com/v2-a.jpg" /></p><video src="https://example.org/v.mp4" poster="https://i1.hdslb.com/c.jpg?x=1&amp;y=2"></video>"#;
        let out = proxy().rewrite_html(html);
        assert!(out.contains(r#"src="https://wsrv.nl/?url=https%3A%2F%2Fpic1.zhimg.com%2Fv2-a.jpg""#));
        assert!(out.contains(r#"src="https://example.org/v.mp4""#));
        assert!(out.contains(r#"poster="https://wsrv.nl/?url=https%3A%2F%2Fi1.hdslb.com%2Fc.jpg%3Fx%3D1%26y%3D2""#));
    }

    #[test]
    fn video_sources_are_not_proxied() {
        let proxy = ImageProxy::new("https://wsrv.nl/?url=", ["bilivideo.com", "hdslb.com"]);
        let html = r#"<video controls src="https://upos.bilivideo.com/v.mp4" poster="https://i0.hdslb.com/p.jpg"></video><img data-src="https://i0.hdslb.com/lazy.jpg" src="https://i0.hdslb.com/a.jpg" />"#;
        let out = proxy.rewrite_html(html);
        assert!(out.contains(r#" src="https://upos.bilivideo.com/v.mp4""#));
        assert!(out.contains(r#" poster="https://wsrv.nl/?url=https%3A%2F%2Fi0.hdslb.com%2Fp.jpg""#));
        assert!(out.contains(r#" src="https://wsrv.nl/?url=https%3A%2F%2Fi0.hdslb.com%2Fa.jpg""#));
        assert!(out.contains(r#"data-src="https://i0.hdslb.com/lazy.jpg""#));
    }
}
