// Douban service: the mobile Rexxar home timeline.
// Auth is the dbcl2 cookie plus its ck CSRF token; the next page starts
// after the id of the last raw record.

use std::sync::LazyLock;

use async_trait::async_trait;
use chrono::{FixedOffset, NaiveDateTime, TimeZone};
use feedloom_common::html::truncate_chars;
use feedloom_common::{ActivityItem, Platform, Stats};
use regex::Regex;
use reqwest::header::{self, HeaderMap, HeaderValue};
use serde_json::Value;
use url::Url;

use crate::error::Result;
use crate::json::{array_at, at, count_at, dispatch, first_non_empty, str_at, text_at};
use crate::normalize::{placeholder, Extracted, Normalizer, Subtype, MAX_RESHARE_DEPTH};
use crate::source::{get_json, PageSource, RawPage};

const TIMELINE_API: &str = "https://m.douban.com/rexxar/api/v2/status/home_timeline";

const MOBILE_USER_AGENT: &str = "Mozilla/5.0 (iPhone; CPU iPhone OS 17_0 like Mac OS X) \
    AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.0 Mobile/15E148 Safari/604.1";

/// China Standard Time, the zone of `create_time`.
const CST_OFFSET_SECS: i32 = 8 * 3600;

static CK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:^|;\s*)ck=([^;]*)").expect("valid regex"));

pub struct DoubanSource {
    client: reqwest::Client,
    cookie: String,
    ck: String,
}

impl DoubanSource {
    /// Accepts a full cookie string or a bare `dbcl2` value.
    pub fn new(client: reqwest::Client, credential: &str) -> Self {
        let cookie = normalize_cookie(credential);
        let ck = CK_RE
            .captures(&cookie)
            .map(|c| c[1].to_string())
            .unwrap_or_default();
        Self { client, cookie, ck }
    }
}

fn normalize_cookie(credential: &str) -> String {
    if credential.contains("dbcl2=") {
        credential.to_string()
    } else {
        format!("dbcl2=\"{}\"", credential.trim_matches('"'))
    }
}

#[async_trait]
impl PageSource for DoubanSource {
    fn platform(&self) -> Platform {
        Platform::Douban
    }

    async fn fetch_page(&self, cursor: Option<&str>) -> Result<RawPage> {
        let mut params = vec![("ck", self.ck.as_str()), ("for_mobile", "1")];
        if let Some(max_id) = cursor {
            params.insert(0, ("max_id", max_id));
        }
        let url = Url::parse_with_params(TIMELINE_API, &params)?;

        let mut headers = HeaderMap::new();
        headers.insert(header::ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(
            header::ACCEPT_LANGUAGE,
            HeaderValue::from_static("zh-CN,zh;q=0.9"),
        );
        headers.insert(
            header::ORIGIN,
            HeaderValue::from_static("https://m.douban.com"),
        );
        headers.insert(
            header::REFERER,
            HeaderValue::from_static("https://m.douban.com/mine/statuses"),
        );
        headers.insert(
            "x-requested-with",
            HeaderValue::from_static("XMLHttpRequest"),
        );
        headers.insert(header::USER_AGENT, HeaderValue::from_static(MOBILE_USER_AGENT));
        headers.insert(header::COOKIE, HeaderValue::from_str(&self.cookie)?);

        let json = get_json(&self.client, url.as_str(), headers).await?;
        Ok(parse_timeline_page(&json))
    }
}

fn parse_timeline_page(json: &Value) -> RawPage {
    let records = array_at(json, &["items"]).to_vec();
    let next_cursor = records
        .last()
        .map(|last| text_at(last, &["id"]))
        .filter(|id| !id.is_empty());
    RawPage {
        has_more: next_cursor.is_some(),
        records,
        next_cursor,
    }
}

// --- Normalization ---

/// Douban has no subtype field worth dispatching on; the record shape
/// decides instead.
const SHAPES: &[(&str, Subtype)] = &[
    (
        "card",
        Subtype {
            extract: extract_status,
            title: |a, ex| {
                let activity = &ex.verb;
                if ex.title.is_empty() {
                    format!("{a} {activity}")
                } else {
                    format!("{a} {activity}《{}》", ex.title)
                }
            },
        },
    ),
    (
        "reshare",
        Subtype {
            extract: extract_status,
            title: |a, ex| format!("{a} reshared a post by {}", ex.title),
        },
    ),
];

const PLAIN: Subtype = Subtype {
    extract: extract_status,
    title: |a, ex| {
        let activity = &ex.verb;
        let text = truncate_chars(ex.content.lines().next().unwrap_or("").trim(), 50);
        if text.is_empty() {
            format!("{a} {activity}")
        } else {
            format!("{a} {activity}: {text}")
        }
    },
};

fn shape_of(status: &Value) -> &'static str {
    if at(status, &["card"]).is_object() {
        "card"
    } else if at(status, &["reshared_status"]).is_object() {
        "reshare"
    } else {
        "plain"
    }
}

/// Timeline entries wrap the status; pushed records may be bare.
fn status_of(raw: &Value) -> &Value {
    match at(raw, &["status"]) {
        Value::Null => raw,
        status => status,
    }
}

pub struct DoubanNormalizer;

impl Normalizer for DoubanNormalizer {
    fn platform(&self) -> Platform {
        Platform::Douban
    }

    fn subtype<'a>(&self, raw: &'a Value) -> &'a str {
        str_at(status_of(raw), &["activity"])
    }

    fn normalize(&self, raw: &Value) -> Option<ActivityItem> {
        let status = status_of(raw);
        let status_id = text_at(status, &["id"]);
        if status_id.is_empty() {
            return None;
        }

        let author_node = at(status, &["author"]);
        let author = match str_at(author_node, &["name"]) {
            "" => "Unknown user",
            name => name,
        };
        let uid = text_at(author_node, &["uid"]);
        let link = match str_at(status, &["sharing_url"]) {
            "" if uid.is_empty() => return None,
            "" => format!("https://www.douban.com/people/{uid}/status/{status_id}/"),
            url => url.to_string(),
        };
        let id = format!("douban_{status_id}");

        let mut item = ActivityItem::new(Platform::Douban, id);
        item.kind = str_at(status, &["activity"]).to_string();
        item.author = author.to_string();
        item.author_avatar_url = str_at(author_node, &["avatar"]).to_string();
        item.author_profile_url = str_at(author_node, &["url"]).to_string();
        item.link = link;
        item.publish_time_millis = parse_create_time(str_at(status, &["create_time"]));

        if is_deleted(status) {
            return Some(placeholder(item, ""));
        }

        let subtype = dispatch(SHAPES, shape_of(status), PLAIN);
        let extracted = (subtype.extract)(status, 0);
        item.title = (subtype.title)(author, &extracted);
        item.content = extracted.content.trim().to_string();
        item.images = extracted.images;
        item.cover_image = Some(extracted.cover).filter(|s| !s.is_empty());
        item.stats = Stats {
            likes: count_at(status, &["like_count"]),
            comments: count_at(status, &["comments_count"]),
            forwards: count_at(status, &["reshares_count"]),
            ..Stats::default()
        };
        Some(item)
    }
}

fn is_deleted(status: &Value) -> bool {
    at(status, &["deleted"]).as_bool().unwrap_or(false)
        || at(status, &["is_deleted"]).as_bool().unwrap_or(false)
}

/// Status body with reshare and card details appended. `title` carries the
/// card title, or the reshared author for reshares.
fn extract_status(status: &Value, depth: u8) -> Extracted {
    let mut content = str_at(status, &["text"]).to_string();
    let mut title = String::new();

    let reshared = at(status, &["reshared_status"]);
    if reshared.is_object() {
        let orig_author = match str_at(reshared, &["author", "name"]) {
            "" => "unknown",
            name => name,
        };
        title = orig_author.to_string();
        content.push_str(&format!("\n\n[Reshared from @{orig_author}]"));
        if depth < MAX_RESHARE_DEPTH {
            let inner = extract_status(reshared, depth + 1);
            let inner_text = inner.content.trim();
            if !inner_text.is_empty() {
                content.push('\n');
                content.push_str(inner_text);
            }
            let card_title = str_at(reshared, &["card", "title"]);
            if !card_title.is_empty() {
                content.push_str(&format!("\n《{card_title}》"));
            }
        }
    }

    let card = at(status, &["card"]);
    if card.is_object() {
        title = str_at(card, &["title"]).to_string();
        let subtitle = str_at(card, &["subtitle"]);
        if !subtitle.is_empty() {
            content.push('\n');
            content.push_str(subtitle);
        }
        let rating = text_at(card, &["rating"]);
        if !rating.is_empty() {
            content.push_str(&format!("\n★ {rating}"));
        }
    }

    let images = array_at(status, &["images"])
        .iter()
        .map(|img| {
            first_non_empty(&[
                str_at(img, &["large", "url"]),
                str_at(img, &["normal", "url"]),
                str_at(img, &["url"]),
            ])
        })
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect();

    let cover = first_non_empty(&[
        str_at(card, &["image", "large", "url"]),
        str_at(card, &["image", "normal", "url"]),
    ])
    .to_string();

    Extracted {
        title,
        content,
        images,
        cover,
        verb: match str_at(status, &["activity"]) {
            "" => "posted".to_string(),
            verb => verb.to_string(),
        },
        ..Extracted::default()
    }
}

/// `YYYY-MM-DD HH:MM:SS` in China Standard Time to epoch millis; 0 when
/// absent or unparsable.
fn parse_create_time(raw: &str) -> i64 {
    let Some(cst) = FixedOffset::east_opt(CST_OFFSET_SECS) else {
        return 0;
    };
    NaiveDateTime::parse_from_str(raw.trim(), "%Y-%m-%d %H:%M:%S")
        .ok()
        .and_then(|naive| cst.from_local_datetime(&naive).single())
        .map(|dt| dt.timestamp_millis())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn status(extra: Value) -> Value {
        let mut base = json!({
            "status": {
                "id": "4100",
                "activity": "说",
                "text": "rainy day",
                "create_time": "2024-03-01 20:00:00",
                "sharing_url": "https://www.douban.com/people/u1/status/4100/",
                "author": { "name": "fay", "uid": "u1", "avatar": "https://img1.doubanio.com/icon/u1.jpg" },
                "like_count": 2,
                "reshares_count": 1
            }
        });
        if let (Some(s), Some(extra)) = (base["status"].as_object_mut(), extra.as_object()) {
            for (k, v) in extra {
                s.insert(k.clone(), v.clone());
            }
        }
        base
    }

    #[test]
    fn plain_status_title_uses_text() {
        let item = DoubanNormalizer.normalize(&status(json!({}))).unwrap();
        assert_eq!(item.id, "douban_4100");
        assert_eq!(item.title, "fay 说: rainy day");
        assert_eq!(item.kind, "说");
        assert_eq!(item.stats.forwards, Some(1));
        // 2024-03-01 20:00 CST is 12:00 UTC.
        assert_eq!(item.publish_time_millis, 1_709_294_400_000);
    }

    #[test]
    fn card_titles_quote_the_subject() {
        let item = DoubanNormalizer
            .normalize(&status(json!({
                "activity": "看过",
                "text": "",
                "card": {
                    "title": "Spirited Away",
                    "subtitle": "2001 / Japan",
                    "rating": "9.4",
                    "image": { "normal": { "url": "https://img2.doubanio.com/view/s.jpg" } }
                }
            })))
            .unwrap();
        assert_eq!(item.title, "fay 看过《Spirited Away》");
        assert_eq!(item.content, "2001 / Japan\n★ 9.4");
        assert_eq!(
            item.cover_image.as_deref(),
            Some("https://img2.doubanio.com/view/s.jpg")
        );
    }

    #[test]
    fn reshares_quote_one_level() {
        let item = DoubanNormalizer
            .normalize(&status(json!({
                "activity": "转发",
                "text": "so true",
                "reshared_status": {
                    "text": "original words",
                    "author": { "name": "gus" },
                    "reshared_status": { "text": "deep", "author": { "name": "hal" } }
                }
            })))
            .unwrap();
        assert_eq!(item.title, "fay reshared a post by gus");
        assert_eq!(
            item.content,
            "so true\n\n[Reshared from @gus]\noriginal words\n\n[Reshared from @hal]"
        );
    }

    #[test]
    fn link_falls_back_to_author_and_status() {
        let mut raw = status(json!({}));
        raw["status"]["sharing_url"] = json!("");
        let item = DoubanNormalizer.normalize(&raw).unwrap();
        assert_eq!(item.link, "https://www.douban.com/people/u1/status/4100/");

        raw["status"]["author"]["uid"] = Value::Null;
        assert!(DoubanNormalizer.normalize(&raw).is_none());
    }

    #[test]
    fn deleted_statuses_keep_their_id() {
        let item = DoubanNormalizer
            .normalize(&status(json!({ "deleted": true })))
            .unwrap();
        assert_eq!(item.id, "douban_4100");
        assert_eq!(item.title, "fay's activity (deleted)");
        assert!(item.content.contains("deleted"));
        assert_eq!(item.kind, "说");
        assert_eq!(item.publish_time_millis, 1_709_294_400_000);
    }

    #[test]
    fn bare_cookie_values_are_wrapped() {
        assert_eq!(normalize_cookie("\"abc:def\""), "dbcl2=\"abc:def\"");
        let source = DoubanSource::new(reqwest::Client::new(), "dbcl2=\"x\"; ck=Zt9q; bid=1");
        assert_eq!(source.ck, "Zt9q");
    }

    #[test]
    fn cursor_is_last_record_id() {
        let page = parse_timeline_page(&json!({ "items": [{"id": 1}, {"id": "2"}] }));
        assert_eq!(page.next_cursor.as_deref(), Some("2"));
        assert!(page.has_more);
        assert!(!parse_timeline_page(&json!({ "items": [] })).has_more);
    }

    #[test]
    fn unparsable_time_is_zero() {
        assert_eq!(parse_create_time("yesterday"), 0);
    }
}
