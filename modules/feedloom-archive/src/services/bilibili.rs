// Bilibili service: the polymer dynamic feed of a logged-in account.
// Auth is the SESSDATA cookie; pagination is an opaque offset plus has_more.

use async_trait::async_trait;
use feedloom_common::html::absolute_url;
use feedloom_common::{ActivityItem, Platform, Stats};
use reqwest::header::{self, HeaderMap, HeaderValue};
use serde_json::Value;
use tracing::debug;
use url::Url;

use crate::error::{ArchiveError, Result};
use crate::json::{array_at, at, count_at, dispatch, int_at, str_at, text_at};
use crate::normalize::{
    fallback_title, labelled, placeholder, Extracted, Normalizer, Subtype, DELETED_NOTICE,
    MAX_RESHARE_DEPTH,
};
use crate::source::{get_json, PageSource, RawPage, DESKTOP_USER_AGENT};

const FEED_API: &str = "https://api.bilibili.com/x/polymer/web-dynamic/v1/feed/all";

pub const VIDEO_TYPE: &str = "DYNAMIC_TYPE_AV";
const DELETED_TYPE: &str = "DYNAMIC_TYPE_NONE";

pub struct BilibiliSource {
    client: reqwest::Client,
    platform: Platform,
    sessdata: String,
}

impl BilibiliSource {
    pub fn new(client: reqwest::Client, platform: Platform, sessdata: impl Into<String>) -> Self {
        Self {
            client,
            platform,
            sessdata: sessdata.into(),
        }
    }
}

#[async_trait]
impl PageSource for BilibiliSource {
    fn platform(&self) -> Platform {
        self.platform
    }

    async fn fetch_page(&self, cursor: Option<&str>) -> Result<RawPage> {
        let mut params = vec![("type", "all"), ("timezone_offset", "-480")];
        if let Some(offset) = cursor {
            params.push(("offset", offset));
        }
        let url = Url::parse_with_params(FEED_API, &params)?;

        let mut headers = HeaderMap::new();
        headers.insert(header::ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(
            header::REFERER,
            HeaderValue::from_static("https://www.bilibili.com/"),
        );
        headers.insert(
            header::USER_AGENT,
            HeaderValue::from_static(DESKTOP_USER_AGENT),
        );
        headers.insert(
            header::COOKIE,
            HeaderValue::from_str(&format!("SESSDATA={}", self.sessdata))?,
        );

        let json = get_json(&self.client, url.as_str(), headers).await?;
        parse_feed_page(&json)
    }
}

fn parse_feed_page(json: &Value) -> Result<RawPage> {
    let code = int_at(json, &["code"]);
    if code != 0 {
        return Err(ArchiveError::Api {
            code,
            message: str_at(json, &["message"]).to_string(),
        });
    }

    let next_cursor = Some(text_at(json, &["data", "offset"])).filter(|s| !s.is_empty());
    Ok(RawPage {
        records: array_at(json, &["data", "items"]).to_vec(),
        next_cursor,
        has_more: at(json, &["data", "has_more"]).as_bool().unwrap_or(false),
    })
}

// --- Normalization ---

const SUBTYPES: &[(&str, Subtype)] = &[
    (
        VIDEO_TYPE,
        Subtype {
            extract: extract_video,
            title: |a, ex| labelled(format!("{a} posted a video"), &ex.title),
        },
    ),
    (
        "DYNAMIC_TYPE_DRAW",
        Subtype {
            extract: extract_draw,
            title: |a, _| format!("{a} posted an image post"),
        },
    ),
    (
        "DYNAMIC_TYPE_ARTICLE",
        Subtype {
            extract: extract_article,
            title: |a, ex| labelled(format!("{a} published an article"), &ex.title),
        },
    ),
    (
        "DYNAMIC_TYPE_WORD",
        Subtype {
            extract: extract_text,
            title: |a, _| format!("{a} posted an update"),
        },
    ),
    (
        "DYNAMIC_TYPE_FORWARD",
        Subtype {
            extract: extract_forward,
            title: |a, _| format!("{a} reshared an activity"),
        },
    ),
    (
        "DYNAMIC_TYPE_LIVE_RCMD",
        Subtype {
            extract: extract_live,
            title: |a, ex| labelled(format!("{a} is live"), &ex.title),
        },
    ),
    (
        "DYNAMIC_TYPE_MUSIC",
        Subtype {
            extract: extract_music,
            title: |a, ex| labelled(format!("{a} posted audio"), &ex.title),
        },
    ),
    (
        "DYNAMIC_TYPE_PGC",
        Subtype {
            extract: extract_series,
            title: |a, ex| labelled(format!("{a} shared a series"), &ex.title),
        },
    ),
    (
        DELETED_TYPE,
        Subtype {
            extract: extract_deleted,
            title: |a, _| format!("{a}'s activity (deleted)"),
        },
    ),
];

const FALLBACK: Subtype = Subtype {
    extract: extract_text,
    title: fallback_title,
};

fn subtype_of(record: &Value) -> Subtype {
    dispatch(SUBTYPES, str_at(record, &["type"]), FALLBACK)
}

/// Normalizer shared by the main and alt accounts; only the platform tag
/// differs.
pub struct BilibiliNormalizer {
    platform: Platform,
}

impl BilibiliNormalizer {
    pub fn new(platform: Platform) -> Self {
        Self { platform }
    }
}

impl Normalizer for BilibiliNormalizer {
    fn platform(&self) -> Platform {
        self.platform
    }

    fn subtype<'a>(&self, raw: &'a Value) -> &'a str {
        str_at(raw, &["type"])
    }

    fn normalize(&self, raw: &Value) -> Option<ActivityItem> {
        let id = text_at(raw, &["id_str"]);
        if id.is_empty() {
            debug!(platform = %self.platform, "record without id_str, skipping");
            return None;
        }

        let author_module = at(raw, &["modules", "module_author"]);
        let author = match str_at(author_module, &["name"]) {
            "" => "Unknown author",
            name => name,
        };
        let mid = text_at(author_module, &["mid"]);

        let mut item = ActivityItem::new(self.platform, id.clone());
        item.kind = str_at(raw, &["type"]).to_string();
        item.author = author.to_string();
        item.author_avatar_url = str_at(author_module, &["face"]).to_string();
        if !mid.is_empty() {
            item.author_profile_url = format!("https://space.bilibili.com/{mid}");
        }
        item.link = format!("https://www.bilibili.com/opus/{id}");
        item.publish_time_millis = int_at(author_module, &["pub_ts"]) * 1000;

        if is_deleted(raw) {
            let tips = str_at(raw, &["modules", "module_dynamic", "major", "none", "tips"]);
            return Some(placeholder(item, tips));
        }

        let subtype = subtype_of(raw);
        let extracted = (subtype.extract)(raw, 0);

        let archive = at(raw, &["modules", "module_dynamic", "major", "archive"]);
        let stat = at(raw, &["modules", "module_stat"]);
        let stats = Stats {
            likes: count_at(stat, &["like", "count"]),
            views: count_at(archive, &["stat", "play"]),
            comments: count_at(stat, &["comment", "count"]),
            forwards: count_at(stat, &["forward", "count"]),
            danmaku: count_at(archive, &["stat", "danmaku"]),
        };

        item.title = (subtype.title)(author, &extracted);
        item.content = extracted.content;
        if !extracted.link.is_empty() {
            item.link = extracted.link;
        }
        item.images = extracted.images;
        item.cover_image = Some(extracted.cover).filter(|s| !s.is_empty());
        item.cover_duration = Some(extracted.cover_duration).filter(|s| !s.is_empty());
        item.stats = stats;
        Some(item)
    }
}

fn is_deleted(record: &Value) -> bool {
    str_at(record, &["type"]) == DELETED_TYPE
        || !at(record, &["modules", "module_dynamic", "major", "none"]).is_null()
}

fn major(record: &Value) -> &Value {
    at(record, &["modules", "module_dynamic", "major"])
}

fn desc_text(record: &Value) -> String {
    str_at(record, &["modules", "module_dynamic", "desc", "text"]).to_string()
}

fn jump_link(node: &Value) -> String {
    match str_at(node, &["jump_url"]) {
        "" => String::new(),
        url => absolute_url(url),
    }
}

fn extract_text(record: &Value, _depth: u8) -> Extracted {
    Extracted {
        content: desc_text(record),
        ..Extracted::default()
    }
}

fn extract_video(record: &Value, _depth: u8) -> Extracted {
    let archive = at(major(record), &["archive"]);
    let desc = str_at(archive, &["desc"]);
    Extracted {
        title: str_at(archive, &["title"]).to_string(),
        content: if desc.is_empty() {
            desc_text(record)
        } else {
            desc.to_string()
        },
        link: jump_link(archive),
        cover: str_at(archive, &["cover"]).to_string(),
        cover_duration: str_at(archive, &["duration_text"]).to_string(),
        ..Extracted::default()
    }
}

fn extract_draw(record: &Value, _depth: u8) -> Extracted {
    let major = major(record);
    let images = array_at(major, &["draw", "items"])
        .iter()
        .map(|i| str_at(i, &["src"]))
        .chain(
            array_at(major, &["opus", "pics"])
                .iter()
                .map(|p| str_at(p, &["url"])),
        )
        .filter(|s| !s.is_empty())
        .map(absolute_url)
        .collect();

    let mut content = desc_text(record);
    if content.is_empty() {
        content = str_at(major, &["opus", "summary", "text"]).to_string();
    }
    Extracted {
        content,
        images,
        ..Extracted::default()
    }
}

fn extract_article(record: &Value, _depth: u8) -> Extracted {
    let article = at(major(record), &["article"]);
    Extracted {
        title: str_at(article, &["title"]).to_string(),
        content: match str_at(article, &["desc"]) {
            "" => desc_text(record),
            desc => desc.to_string(),
        },
        link: jump_link(article),
        images: array_at(article, &["covers"])
            .iter()
            .filter_map(Value::as_str)
            .map(absolute_url)
            .collect(),
        ..Extracted::default()
    }
}

fn extract_forward(record: &Value, depth: u8) -> Extracted {
    let mut ex = extract_text(record, depth);
    let orig = at(record, &["orig"]);
    if orig.is_null() {
        return ex;
    }

    let orig_author = match str_at(orig, &["modules", "module_author", "name"]) {
        "" => "unknown",
        name => name,
    };
    ex.content.push_str(&format!("\n\n[Reshared from @{orig_author}]"));
    if depth >= MAX_RESHARE_DEPTH {
        return ex;
    }

    let inner = (subtype_of(orig).extract)(orig, depth + 1);
    if !inner.title.is_empty() {
        ex.content.push('\n');
        ex.content.push_str(&inner.title);
    }
    if !inner.content.is_empty() {
        ex.content.push('\n');
        ex.content.push_str(&inner.content);
    }
    if !inner.images.is_empty() {
        ex.images = inner.images;
    }
    if !inner.cover.is_empty() {
        ex.cover = inner.cover;
        ex.cover_duration = inner.cover_duration;
    }
    if !inner.link.is_empty() {
        ex.link = inner.link;
    }
    ex
}

fn extract_live(record: &Value, _depth: u8) -> Extracted {
    // The live card arrives as a JSON document inside a string field.
    let raw = str_at(major(record), &["live_rcmd", "content"]);
    let Ok(info) = serde_json::from_str::<Value>(raw) else {
        return Extracted {
            content: "Live recommendation".to_string(),
            ..Extracted::default()
        };
    };
    let live = match at(&info, &["live_play_info"]) {
        Value::Null => &info,
        play => play,
    };

    let title = match str_at(live, &["title"]) {
        "" => "Live".to_string(),
        t => t.to_string(),
    };
    let link = match str_at(live, &["link"]) {
        "" => format!(
            "https://live.bilibili.com/{}",
            text_at(live, &["room_id"])
        ),
        link => absolute_url(link),
    };
    Extracted {
        content: format!("Live now: {title}"),
        title,
        link,
        cover: str_at(live, &["cover"]).to_string(),
        ..Extracted::default()
    }
}

fn extract_music(record: &Value, _depth: u8) -> Extracted {
    let music = at(major(record), &["music"]);
    Extracted {
        title: match str_at(music, &["title"]) {
            "" => "Audio".to_string(),
            t => t.to_string(),
        },
        content: desc_text(record),
        link: jump_link(music),
        cover: str_at(music, &["cover"]).to_string(),
        ..Extracted::default()
    }
}

fn extract_series(record: &Value, _depth: u8) -> Extracted {
    let pgc = at(major(record), &["pgc"]);
    Extracted {
        title: str_at(pgc, &["title"]).to_string(),
        content: desc_text(record),
        link: jump_link(pgc),
        cover: str_at(pgc, &["cover"]).to_string(),
        ..Extracted::default()
    }
}

fn extract_deleted(record: &Value, _depth: u8) -> Extracted {
    let tips = str_at(major(record), &["none", "tips"]);
    Extracted {
        content: if tips.is_empty() {
            DELETED_NOTICE.to_string()
        } else {
            tips.to_string()
        },
        ..Extracted::default()
    }
}
