// Service: RSS 2.0 document rendering.

use chrono::{DateTime, TimeZone, Utc};
use feedloom_common::html::{strip_html, truncate_chars};
use feedloom_common::{ActivityItem, FeedConfig, Platform};
use rss::extension::atom::{AtomExtension, Link};
use rss::extension::dublincore::DublinCoreExtension;
use rss::{ChannelBuilder, EnclosureBuilder, GuidBuilder, Item, ItemBuilder};
use tracing::debug;

use crate::content::build_content;
use crate::image_proxy::ImageProxy;

const DESCRIPTION_CHARS: usize = 200;
const GENERATOR: &str = "feedloom";
const UNTITLED: &str = "Untitled";

pub struct FeedRenderer {
    config: FeedConfig,
    proxy: ImageProxy,
}

impl FeedRenderer {
    pub fn new(config: FeedConfig) -> Self {
        let proxy = ImageProxy::from_config(&config);
        Self { config, proxy }
    }

    pub fn proxy(&self) -> &ImageProxy {
        &self.proxy
    }

    /// Document key (file name) under which `platform`'s feed is published.
    pub fn key(&self, platform: Platform) -> &str {
        &self.config.meta(platform).key
    }

    /// Render the newest `max_items` of `items` (expected newest first).
    pub fn render(&self, platform: Platform, items: &[ActivityItem]) -> String {
        self.render_at(platform, items, Utc::now())
    }

    pub fn render_at(&self, platform: Platform, items: &[ActivityItem], now: DateTime<Utc>) -> String {
        let meta = self.config.meta(platform);
        let entries: Vec<Item> = items
            .iter()
            .take(self.config.max_items)
            .map(|item| self.entry(item, now))
            .collect();
        debug!(%platform, entries = entries.len(), "Rendering feed");

        let self_link = self
            .config
            .public_url
            .as_deref()
            .map(|base| AtomExtension {
                links: vec![Link {
                    href: format!("{}/{}", base.trim_end_matches('/'), meta.key),
                    rel: "self".to_string(),
                    mime_type: Some("application/rss+xml".to_string()),
                    ..Default::default()
                }],
            });

        let channel = ChannelBuilder::default()
            .title(meta.title.clone())
            .link(platform.home_url().to_string())
            .description(meta.description.clone())
            .language(Some("zh-CN".to_string()))
            .generator(Some(GENERATOR.to_string()))
            .last_build_date(Some(now.to_rfc2822()))
            .items(entries)
            .atom_ext(self_link)
            .build();

        fix_enclosure_types(&channel.to_string())
    }

    fn entry(&self, item: &ActivityItem, now: DateTime<Utc>) -> Item {
        let title = if item.title.trim().is_empty() {
            UNTITLED.to_string()
        } else {
            item.title.clone()
        };
        let published = match Utc.timestamp_millis_opt(item.publish_time_millis).single() {
            Some(t) if item.publish_time_millis != 0 => t,
            _ => now,
        };
        let summary_source = if item.content.is_empty() { &item.title } else { &item.content };
        let description = truncate_chars(strip_html(summary_source).trim(), DESCRIPTION_CHARS);

        let enclosure = item.thumbnail().map(|thumb| {
            EnclosureBuilder::default()
                .url(self.proxy.rewrite(thumb))
                .length("0".to_string())
                .mime_type("image/jpeg".to_string())
                .build()
        });
        let author = (!item.author.is_empty()).then(|| DublinCoreExtension {
            creators: vec![item.author.clone()],
            ..Default::default()
        });

        ItemBuilder::default()
            .title(Some(title))
            .link((!item.link.is_empty()).then(|| item.link.clone()))
            .guid(Some(
                GuidBuilder::default()
                    .value(item.id.clone())
                    .permalink(false)
                    .build(),
            ))
            .pub_date(Some(published.to_rfc2822()))
            .description(Some(description))
            .content(Some(build_content(item, &self.proxy)))
            .enclosure(enclosure)
            .dublin_core_ext(author)
            .build()
    }
}

/// Some feed writers emit a bare `image//` enclosure type; readers expect a
/// concrete image MIME type.
fn fix_enclosure_types(xml: &str) -> String {
    xml.replace(r#"type="image//""#, r#"type="image/jpeg""#)
}
