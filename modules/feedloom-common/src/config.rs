use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::types::Platform;

/// Application configuration loaded from environment variables.
///
/// Built once in `main` and handed to each component; nothing reads the
/// environment after startup.
#[derive(Debug, Clone)]
pub struct Config {
    // Web server
    pub port: u16,

    // Storage
    pub data_dir: PathBuf,
    pub store_max_items: usize,

    // Fetching
    pub fetch_interval: Duration,
    pub startup_delay: Duration,
    pub request_timeout: Duration,
    pub bilibili: PlatformConfig,
    pub bilibili_alt: PlatformConfig,
    pub zhihu: PlatformConfig,
    pub douban: PlatformConfig,

    // Rendering
    pub feed: FeedConfig,

    // Publishing
    pub auto_sync: bool,
    pub publish: PublishConfig,
}

/// Crawl settings for one account.
#[derive(Debug, Clone)]
pub struct PlatformConfig {
    /// Opaque session cookie. `None` disables crawling for the platform.
    pub credential: Option<String>,
    pub max_pages: u32,
    /// Pages to keep fetching after the first overlapping page.
    pub extra_pages: u32,
    pub skip_types: Vec<String>,
    pub block_keywords: Vec<String>,
    pub delay: DelayWindow,
}

/// Randomized pause between two page requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DelayWindow {
    pub min: Duration,
    pub max: Duration,
}

impl DelayWindow {
    pub const NONE: DelayWindow = DelayWindow {
        min: Duration::ZERO,
        max: Duration::ZERO,
    };

    pub const fn secs(min: u64, max: u64) -> Self {
        Self {
            min: Duration::from_secs(min),
            max: Duration::from_secs(max),
        }
    }
}

/// Output document settings for one platform.
#[derive(Debug, Clone)]
pub struct FeedMeta {
    /// Object key / file name of the published document.
    pub key: String,
    pub title: String,
    pub description: String,
}

#[derive(Debug, Clone)]
pub struct FeedConfig {
    pub max_items: usize,
    pub bilibili: FeedMeta,
    pub bilibili_alt: FeedMeta,
    pub zhihu: FeedMeta,
    pub douban: FeedMeta,
    pub image_proxy_prefix: String,
    pub image_proxy_domains: Vec<String>,
    /// Public base URL of the published documents, used for self links.
    pub public_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishBackend {
    /// Cloudflare R2 through its S3-compatible API.
    R2,
    /// Plain files under a local directory.
    Directory(PathBuf),
    Disabled,
}

#[derive(Debug, Clone)]
pub struct PublishConfig {
    pub backend: PublishBackend,
    pub account_id: String,
    pub bucket: String,
    pub access_key_id: String,
    pub secret_access_key: String,
    pub public_url: Option<String>,
}

impl PublishConfig {
    pub fn r2_configured(&self) -> bool {
        !self.account_id.is_empty()
            && !self.access_key_id.is_empty()
            && !self.secret_access_key.is_empty()
    }
}

pub const DEFAULT_IMAGE_PROXY_PREFIX: &str = "https://wsrv.nl/?url=";

/// CDNs that refuse hotlinked images from feed readers.
pub const DEFAULT_IMAGE_PROXY_DOMAINS: &[&str] = &[
    "hdslb.com",
    "bilivideo.com",
    "biliimg.com",
    "bilibili.com",
    "zhimg.com",
    "zhihu.com",
    "doubanio.com",
];

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup. Missing or
    /// unparsable values fall back to their defaults.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env(&lookup);

        let bilibili = PlatformConfig {
            credential: env.secret("BILIBILI_SESSDATA"),
            max_pages: env.parse_or("BILIBILI_MAX_PAGES", 5),
            extra_pages: env.parse_or("BILIBILI_EXTRA_PAGES", 0),
            skip_types: env.list("BILIBILI_SKIP_TYPES"),
            block_keywords: env.list("BILIBILI_BLOCK_KEYWORDS"),
            delay: DelayWindow::secs(8, 15),
        };
        // The alt account shares the main account's filters.
        let bilibili_alt = PlatformConfig {
            credential: env.secret("BILIBILI_ALT_SESSDATA"),
            max_pages: env.parse_or("BILIBILI_ALT_MAX_PAGES", 5),
            ..bilibili.clone()
        };
        let zhihu = PlatformConfig {
            credential: env.secret("ZHIHU_COOKIE"),
            max_pages: env.parse_or("ZHIHU_MAX_PAGES", 5),
            extra_pages: env.parse_or("ZHIHU_EXTRA_PAGES", 0),
            skip_types: env.list("ZHIHU_SKIP_VERBS"),
            block_keywords: env.list("ZHIHU_BLOCK_KEYWORDS"),
            delay: DelayWindow::secs(10, 15),
        };
        let douban = PlatformConfig {
            credential: env.secret("DOUBAN_COOKIE"),
            max_pages: env.parse_or("DOUBAN_MAX_PAGES", 5),
            extra_pages: env.parse_or("DOUBAN_EXTRA_PAGES", 0),
            skip_types: env.list("DOUBAN_SKIP_ACTIVITIES"),
            block_keywords: env.list("DOUBAN_BLOCK_KEYWORDS"),
            delay: DelayWindow::secs(8, 15),
        };

        let public_url = env
            .secret("R2_PUBLIC_URL")
            .map(|u| u.trim_end_matches('/').to_string());

        let image_proxy_domains = match env.list("IMAGE_PROXY_DOMAINS") {
            list if list.is_empty() => DEFAULT_IMAGE_PROXY_DOMAINS
                .iter()
                .map(|d| d.to_string())
                .collect(),
            list => list,
        };

        let feed = FeedConfig {
            max_items: env.parse_or("RSS_MAX_ITEMS", 200),
            bilibili: env.feed_meta(
                "BILIBILI",
                "bilibili.xml",
                "B站关注动态",
                "我的B站关注列表的最新动态",
            ),
            bilibili_alt: env.feed_meta(
                "BILIBILI_ALT",
                "bilibili-alt.xml",
                "B站小号关注动态",
                "我的B站小号关注列表的最新动态",
            ),
            zhihu: env.feed_meta(
                "ZHIHU",
                "zhihu.xml",
                "知乎关注动态",
                "我的知乎关注列表的最新动态",
            ),
            douban: env.feed_meta(
                "DOUBAN",
                "douban.xml",
                "豆瓣关注动态",
                "我的豆瓣关注列表的最新动态",
            ),
            image_proxy_prefix: env
                .secret("IMAGE_PROXY_PREFIX")
                .unwrap_or_else(|| DEFAULT_IMAGE_PROXY_PREFIX.to_string()),
            image_proxy_domains,
            public_url: public_url.clone(),
        };

        let backend = match env.get("PUBLISH_BACKEND").as_deref() {
            Some("r2") => PublishBackend::R2,
            Some("dir") => PublishBackend::Directory(
                env.get("PUBLISH_DIR")
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from("./public")),
            ),
            Some(_) => PublishBackend::Disabled,
            // Unset: use R2 when its credentials are present.
            None if env.secret("CF_ACCOUNT_ID").is_some() => PublishBackend::R2,
            None => PublishBackend::Disabled,
        };

        let publish = PublishConfig {
            backend,
            account_id: env.get("CF_ACCOUNT_ID").unwrap_or_default(),
            bucket: env.get("R2_BUCKET_NAME").unwrap_or_default(),
            access_key_id: env.get("R2_ACCESS_KEY_ID").unwrap_or_default(),
            secret_access_key: env.get("R2_SECRET_ACCESS_KEY").unwrap_or_default(),
            public_url,
        };

        Self {
            port: env.parse_or("PORT", 3457),
            data_dir: env
                .get("DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("./data")),
            store_max_items: env.parse_or("STORE_MAX_ITEMS", 200),
            fetch_interval: Duration::from_secs(60 * env.parse_or("FETCH_INTERVAL", 30u64)),
            startup_delay: Duration::from_secs(10),
            request_timeout: Duration::from_secs(env.parse_or("REQUEST_TIMEOUT_SECS", 20)),
            bilibili,
            bilibili_alt,
            zhihu,
            douban,
            feed,
            auto_sync: env.get("AUTO_SYNC").as_deref() != Some("false"),
            publish,
        }
    }

    pub fn platform(&self, platform: Platform) -> &PlatformConfig {
        match platform {
            Platform::Bilibili => &self.bilibili,
            Platform::BilibiliAlt => &self.bilibili_alt,
            Platform::Zhihu => &self.zhihu,
            Platform::Douban => &self.douban,
        }
    }

    /// Platforms with a crawl credential, in crawl order.
    pub fn crawlable_platforms(&self) -> Vec<Platform> {
        Platform::ALL
            .into_iter()
            .filter(|p| self.platform(*p).credential.is_some())
            .collect()
    }
}

impl FeedConfig {
    pub fn meta(&self, platform: Platform) -> &FeedMeta {
        match platform {
            Platform::Bilibili => &self.bilibili,
            Platform::BilibiliAlt => &self.bilibili_alt,
            Platform::Zhihu => &self.zhihu,
            Platform::Douban => &self.douban,
        }
    }
}

struct Env<'a, F>(&'a F);

impl<F> Env<'_, F>
where
    F: Fn(&str) -> Option<String>,
{
    fn get(&self, key: &str) -> Option<String> {
        (self.0)(key)
    }

    /// Non-empty trimmed value.
    fn secret(&self, key: &str) -> Option<String> {
        self.get(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn parse_or<T: FromStr>(&self, key: &str, default: T) -> T {
        self.get(key)
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(default)
    }

    /// Comma-separated list, blanks dropped.
    fn list(&self, key: &str) -> Vec<String> {
        self.get(key)
            .map(|v| {
                v.split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or_default()
    }

    fn feed_meta(&self, prefix: &str, key: &str, title: &str, description: &str) -> FeedMeta {
        FeedMeta {
            key: self
                .secret(&format!("RSS_{prefix}_KEY"))
                .unwrap_or_else(|| key.to_string()),
            title: self
                .secret(&format!("RSS_{prefix}_TITLE"))
                .unwrap_or_else(|| title.to_string()),
            description: self
                .secret(&format!("RSS_{prefix}_DESC"))
                .unwrap_or_else(|| description.to_string()),
        }
    }
}
