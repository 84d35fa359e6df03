use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

// --- Platforms ---

/// The upstream feeds we crawl. Each variant owns one store file and one
/// published document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Platform {
    /// Main video-sharing account.
    #[serde(rename = "bilibili")]
    Bilibili,
    /// Secondary video-sharing account, video posts only.
    #[serde(rename = "bilibili-alt")]
    BilibiliAlt,
    /// Q&A site.
    #[serde(rename = "zhihu")]
    Zhihu,
    /// Social-bookmarking site.
    #[serde(rename = "douban")]
    Douban,
}

impl Platform {
    pub const ALL: [Platform; 4] = [
        Platform::Bilibili,
        Platform::BilibiliAlt,
        Platform::Zhihu,
        Platform::Douban,
    ];

    /// Stable key used for file names, URLs and log fields.
    pub fn key(self) -> &'static str {
        match self {
            Platform::Bilibili => "bilibili",
            Platform::BilibiliAlt => "bilibili-alt",
            Platform::Zhihu => "zhihu",
            Platform::Douban => "douban",
        }
    }

    pub fn home_url(self) -> &'static str {
        match self {
            Platform::Bilibili | Platform::BilibiliAlt => "https://www.bilibili.com",
            Platform::Zhihu => "https://www.zhihu.com",
            Platform::Douban => "https://www.douban.com",
        }
    }

    pub fn is_video(self) -> bool {
        matches!(self, Platform::Bilibili | Platform::BilibiliAlt)
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unsupported platform: {0}")]
pub struct UnknownPlatform(pub String);

impl FromStr for Platform {
    type Err = UnknownPlatform;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Platform::ALL
            .into_iter()
            .find(|p| p.key() == s)
            .ok_or_else(|| UnknownPlatform(s.to_string()))
    }
}

// --- Activity items ---

/// Named engagement counters. Each platform fills the subset it exposes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stats {
    #[serde(default, alias = "like", skip_serializing_if = "Option::is_none")]
    pub likes: Option<u64>,
    #[serde(default, alias = "view", skip_serializing_if = "Option::is_none")]
    pub views: Option<u64>,
    #[serde(default, alias = "comment", skip_serializing_if = "Option::is_none")]
    pub comments: Option<u64>,
    #[serde(
        default,
        alias = "forward",
        alias = "reshare",
        skip_serializing_if = "Option::is_none"
    )]
    pub forwards: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub danmaku: Option<u64>,
}

impl Stats {
    /// Counters in display order, zeroes and absent ones skipped.
    pub fn nonzero(&self) -> Vec<(StatKind, u64)> {
        [
            (StatKind::Likes, self.likes),
            (StatKind::Views, self.views),
            (StatKind::Comments, self.comments),
            (StatKind::Forwards, self.forwards),
            (StatKind::Danmaku, self.danmaku),
        ]
        .into_iter()
        .filter_map(|(kind, v)| v.filter(|n| *n > 0).map(|n| (kind, n)))
        .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatKind {
    Likes,
    Views,
    Comments,
    Forwards,
    Danmaku,
}

/// The canonical normalized unit of feed content.
///
/// Field aliases accept the camelCase shape pushed by the browser extensions
/// (`authorFace`, `videoCover`, `publishTime`, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityItem {
    pub id: String,
    pub platform: Platform,
    /// Platform-specific activity subtype, used by the type blocklists.
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub author: String,
    #[serde(default, alias = "authorFace")]
    pub author_avatar_url: String,
    #[serde(default)]
    pub author_profile_url: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub link: String,
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(
        default,
        alias = "videoCover",
        deserialize_with = "empty_as_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub cover_image: Option<String>,
    #[serde(
        default,
        alias = "videoDuration",
        deserialize_with = "empty_as_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub cover_duration: Option<String>,
    #[serde(default, alias = "publishTime")]
    pub publish_time_millis: i64,
    #[serde(default)]
    pub stats: Stats,
}

impl ActivityItem {
    /// Empty item for a platform; normalizers fill the rest.
    pub fn new(platform: Platform, id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            platform,
            kind: String::new(),
            author: String::new(),
            author_avatar_url: String::new(),
            author_profile_url: String::new(),
            title: String::new(),
            content: String::new(),
            link: String::new(),
            images: Vec::new(),
            cover_image: None,
            cover_duration: None,
            publish_time_millis: 0,
            stats: Stats::default(),
        }
    }

    /// First image for thumbnails: image list first, then the avatar.
    pub fn thumbnail(&self) -> Option<&str> {
        self.images
            .iter()
            .map(String::as_str)
            .chain(std::iter::once(self.author_avatar_url.as_str()))
            .find(|s| !s.is_empty())
    }
}

fn empty_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value.filter(|s| !s.is_empty()))
}

/// Outcome of merging a batch into a platform's collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeOutcome {
    pub total_count: usize,
    pub new_count: usize,
}
