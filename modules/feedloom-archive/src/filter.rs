use feedloom_common::html::truncate_chars;
use feedloom_common::{ActivityItem, Platform, PlatformConfig};
use tracing::info;

use crate::services::bilibili::VIDEO_TYPE;

/// User-configured drops applied between normalization and counting:
/// subtype allowlist, subtype blocklist, then keyword blocklist.
#[derive(Debug, Clone, Default)]
pub struct FilterChain {
    only_types: Option<Vec<String>>,
    skip_types: Vec<String>,
    /// Stored lowercased.
    block_keywords: Vec<String>,
}

impl FilterChain {
    pub fn new(skip_types: Vec<String>, block_keywords: Vec<String>) -> Self {
        Self {
            only_types: None,
            skip_types,
            block_keywords: block_keywords
                .into_iter()
                .map(|k| k.to_lowercase())
                .filter(|k| !k.is_empty())
                .collect(),
        }
    }

    /// Keep only the given subtypes.
    pub fn only_types(mut self, types: &[&str]) -> Self {
        self.only_types = Some(types.iter().map(|t| t.to_string()).collect());
        self
    }

    pub fn for_platform(platform: Platform, config: &PlatformConfig) -> Self {
        let chain = Self::new(config.skip_types.clone(), config.block_keywords.clone());
        match platform {
            Platform::BilibiliAlt => chain.only_types(&[VIDEO_TYPE]),
            _ => chain,
        }
    }

    /// Subtype checks, run on the raw record before normalizing.
    pub fn accepts_subtype(&self, subtype: &str) -> bool {
        if let Some(only) = &self.only_types {
            if !only.iter().any(|t| t == subtype) {
                return false;
            }
        }
        !self.skip_types.iter().any(|t| t == subtype)
    }

    /// Keyword check on the normalized title and content.
    pub fn accepts_item(&self, item: &ActivityItem) -> bool {
        if self.block_keywords.is_empty() {
            return true;
        }
        let text = format!("{} {}", item.title, item.content).to_lowercase();
        match self.block_keywords.iter().find(|k| text.contains(k.as_str())) {
            Some(keyword) => {
                info!(
                    platform = %item.platform,
                    keyword = keyword.as_str(),
                    title = %truncate_chars(&item.title, 40),
                    "Keyword filter dropped item"
                );
                false
            }
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use feedloom_common::DelayWindow;

    use super::*;

    fn config(skip: &[&str], block: &[&str]) -> PlatformConfig {
        PlatformConfig {
            credential: Some("x".into()),
            max_pages: 5,
            extra_pages: 0,
            skip_types: skip.iter().map(|s| s.to_string()).collect(),
            block_keywords: block.iter().map(|s| s.to_string()).collect(),
            delay: DelayWindow::NONE,
        }
    }

    #[test]
    fn blocklisted_subtypes_are_dropped() {
        let chain = FilterChain::for_platform(
            Platform::Bilibili,
            &config(&["DYNAMIC_TYPE_LIVE_RCMD"], &[]),
        );
        assert!(!chain.accepts_subtype("DYNAMIC_TYPE_LIVE_RCMD"));
        assert!(chain.accepts_subtype("DYNAMIC_TYPE_AV"));
    }

    #[test]
    fn alt_account_keeps_videos_only() {
        let chain = FilterChain::for_platform(Platform::BilibiliAlt, &config(&[], &[]));
        assert!(chain.accepts_subtype(VIDEO_TYPE));
        assert!(!chain.accepts_subtype("DYNAMIC_TYPE_DRAW"));
    }

    #[test]
    fn keywords_match_case_insensitively() {
        let chain = FilterChain::new(vec![], vec!["Giveaway".into()]);
        let mut item = ActivityItem::new(Platform::Zhihu, "zhihu_1");
        item.title = "Weekly notes".into();
        assert!(chain.accepts_item(&item));
        item.content = "Big GIVEAWAY today".into();
        assert!(!chain.accepts_item(&item));
    }
}
