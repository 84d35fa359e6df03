// Zhihu service: the "moments" timeline of followed accounts.
// Auth is the full browser cookie (z_c0); pages link to each other through
// paging.next.

use std::sync::LazyLock;

use async_trait::async_trait;
use feedloom_common::html::{escape_html, sanitize_html};
use feedloom_common::{ActivityItem, Platform, Stats};
use regex::Regex;
use reqwest::header::{self, HeaderMap, HeaderValue};
use serde_json::Value;
use tracing::debug;

use crate::error::Result;
use crate::json::{
    array_at, at, count_at, dispatch, first_non_empty, int_at, str_at, text_at, NULL,
};
use crate::normalize::{labelled, placeholder, Extracted, Normalizer, Subtype};
use crate::services::zhihu_html::{build_pin_html, process_content};
use crate::source::{get_json, PageSource, RawPage, DESKTOP_USER_AGENT};

const FIRST_PAGE: &str = "https://www.zhihu.com/api/v3/moments?limit=10&desktop=true";

static PROMO_URL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"zhihu\.com/zhihu_").expect("valid regex"));
static INTERNAL_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d+_\d+_").expect("valid regex"));

pub struct ZhihuSource {
    client: reqwest::Client,
    cookie: String,
}

impl ZhihuSource {
    pub fn new(client: reqwest::Client, cookie: impl Into<String>) -> Self {
        Self {
            client,
            cookie: cookie.into(),
        }
    }
}

#[async_trait]
impl PageSource for ZhihuSource {
    fn platform(&self) -> Platform {
        Platform::Zhihu
    }

    async fn fetch_page(&self, cursor: Option<&str>) -> Result<RawPage> {
        let url = cursor.unwrap_or(FIRST_PAGE);

        let mut headers = HeaderMap::new();
        headers.insert(header::ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(
            header::REFERER,
            HeaderValue::from_static("https://www.zhihu.com/"),
        );
        headers.insert(
            header::USER_AGENT,
            HeaderValue::from_static(DESKTOP_USER_AGENT),
        );
        headers.insert("x-requested-with", HeaderValue::from_static("fetch"));
        headers.insert(header::COOKIE, HeaderValue::from_str(&self.cookie)?);

        let json = get_json(&self.client, url, headers).await?;
        Ok(parse_moments_page(&json))
    }
}

fn parse_moments_page(json: &Value) -> RawPage {
    RawPage {
        records: array_at(json, &["data"]).to_vec(),
        next_cursor: Some(str_at(json, &["paging", "next"]).to_string())
            .filter(|s| !s.is_empty()),
        has_more: !at(json, &["paging", "is_end"]).as_bool().unwrap_or(false),
    }
}

// --- Normalization ---

const SUBTYPES: &[(&str, Subtype)] = &[
    (
        "answer",
        Subtype {
            extract: extract_answer,
            title: |a, ex| labelled(format!("{a} answered"), &ex.title),
        },
    ),
    (
        "article",
        Subtype {
            extract: extract_article,
            title: |a, ex| labelled(format!("{a} published an article"), &ex.title),
        },
    ),
    (
        "pin",
        Subtype {
            extract: extract_pin,
            title: |a, ex| labelled(format!("{a} posted a pin"), &ex.title),
        },
    ),
    (
        "question",
        Subtype {
            extract: extract_question,
            title: |a, ex| labelled(format!("{a} asked a question"), &ex.title),
        },
    ),
    (
        "column",
        Subtype {
            extract: extract_column,
            title: |a, ex| labelled(format!("{a} shared a column"), &ex.title),
        },
    ),
    (
        "zvideo",
        Subtype {
            extract: extract_video,
            title: |a, ex| labelled(format!("{a} posted a video"), &ex.title),
        },
    ),
    (
        "collection",
        Subtype {
            extract: extract_collection,
            title: |a, ex| labelled(format!("{a} shared a collection"), &ex.title),
        },
    ),
    (
        "topic",
        Subtype {
            extract: extract_topic,
            title: |a, ex| labelled(format!("{a} followed a topic"), &ex.title),
        },
    ),
    (
        "live",
        Subtype {
            extract: extract_live,
            title: |a, ex| labelled(format!("{a} shared a live session"), &ex.title),
        },
    ),
    (
        "roundtable",
        Subtype {
            extract: extract_roundtable,
            title: |a, ex| labelled(format!("{a} shared a roundtable"), &ex.title),
        },
    ),
];

const FALLBACK: Subtype = Subtype {
    extract: extract_default,
    title: |a, ex| {
        if ex.title.is_empty() {
            format!("{a}'s activity")
        } else {
            ex.title.clone()
        }
    },
};

pub struct ZhihuNormalizer;

impl Normalizer for ZhihuNormalizer {
    fn platform(&self) -> Platform {
        Platform::Zhihu
    }

    fn subtype<'a>(&self, raw: &'a Value) -> &'a str {
        str_at(raw, &["verb"])
    }

    fn normalize(&self, raw: &Value) -> Option<ActivityItem> {
        // Entries without a verb are ads.
        if str_at(raw, &["verb"]).is_empty() {
            return None;
        }

        let target = at(raw, &["target"]);
        if is_promo(str_at(target, &["url"])) || is_promo(str_at(target, &["source_url"])) {
            debug!("zhihu: promotional entry, skipping");
            return None;
        }

        let target_id = text_at(target, &["id"]);
        if INTERNAL_ID_RE.is_match(&target_id) {
            return None;
        }
        let id = match (target_id.as_str(), text_at(raw, &["id"])) {
            ("", moment_id) if moment_id.is_empty() => return None,
            ("", moment_id) => format!("zhihu_{moment_id}"),
            (tid, _) => format!("zhihu_{tid}"),
        };

        let actor = array_at(raw, &["actors"]).first().unwrap_or(&NULL);
        let author = first_non_empty(&[
            str_at(actor, &["name"]),
            str_at(target, &["author", "name"]),
        ]);
        if author.is_empty() {
            return None;
        }

        let target_type = first_non_empty(&[str_at(target, &["type"]), str_at(raw, &["type"])]);
        let subtype = dispatch(SUBTYPES, target_type, FALLBACK);
        let extracted = (subtype.extract)(target, 0);
        if extracted.link.is_empty() || is_promo(&extracted.link) {
            return None;
        }

        let created = match int_at(target, &["created_time"]) {
            0 => int_at(target, &["updated_time"]),
            t => t,
        };
        let token = str_at(actor, &["url_token"]);

        let mut item = ActivityItem::new(Platform::Zhihu, id);
        item.kind = target_type.to_string();
        item.author = author.to_string();
        item.author_avatar_url = first_non_empty(&[
            str_at(actor, &["avatar_url"]),
            str_at(target, &["author", "avatar_url"]),
        ])
        .to_string();
        if !token.is_empty() {
            item.author_profile_url = format!("https://www.zhihu.com/people/{token}");
        }
        item.link = extracted.link.clone();
        item.publish_time_millis = created * 1000;

        if at(target, &["is_deleted"]).as_bool().unwrap_or(false) {
            return Some(placeholder(item, ""));
        }

        let action = str_at(raw, &["action_text"]);
        item.title = if action.is_empty() {
            (subtype.title)(author, &extracted)
        } else {
            let subject = first_non_empty(&[
                extracted.title.as_str(),
                str_at(target, &["question", "title"]),
            ]);
            labelled(format!("{author}{action}"), subject)
        };
        item.content = sanitize_html(&extracted.content);
        item.images = extracted.images;
        item.cover_image = Some(extracted.cover).filter(|s| !s.is_empty());
        item.stats = Stats {
            likes: count_at(target, &["voteup_count"]),
            comments: count_at(target, &["comment_count"]),
            ..Stats::default()
        };
        Some(item)
    }
}

fn is_promo(url: &str) -> bool {
    !url.is_empty() && PROMO_URL_RE.is_match(url)
}

fn rich_text(target: &Value, fields: &[&str]) -> String {
    let raw = fields
        .iter()
        .map(|f| str_at(target, &[*f]))
        .find(|s| !s.is_empty())
        .unwrap_or("");
    process_content(raw)
}

fn extract_answer(target: &Value, _depth: u8) -> Extracted {
    let question = at(target, &["question"]);
    Extracted {
        title: str_at(question, &["title"]).to_string(),
        content: rich_text(target, &["content", "excerpt"]),
        link: format!(
            "https://www.zhihu.com/question/{}/answer/{}",
            text_at(question, &["id"]),
            text_at(target, &["id"])
        ),
        ..Extracted::default()
    }
}

fn extract_article(target: &Value, _depth: u8) -> Extracted {
    Extracted {
        title: str_at(target, &["title"]).to_string(),
        content: rich_text(target, &["content", "excerpt"]),
        link: format!("https://zhuanlan.zhihu.com/p/{}", text_at(target, &["id"])),
        ..Extracted::default()
    }
}

fn extract_pin(target: &Value, _depth: u8) -> Extracted {
    let excerpt = str_at(target, &["excerpt_title"]);
    Extracted {
        title: excerpt.to_string(),
        content: build_pin_html(at(target, &["content"]), excerpt),
        link: format!("https://www.zhihu.com/pin/{}", text_at(target, &["id"])),
        ..Extracted::default()
    }
}

fn extract_question(target: &Value, _depth: u8) -> Extracted {
    Extracted {
        title: str_at(target, &["title"]).to_string(),
        content: rich_text(target, &["detail", "excerpt"]),
        link: format!("https://www.zhihu.com/question/{}", text_at(target, &["id"])),
        ..Extracted::default()
    }
}

fn extract_column(target: &Value, _depth: u8) -> Extracted {
    let intro = first_non_empty(&[
        str_at(target, &["intro"]),
        str_at(target, &["description"]),
    ]);
    let image = str_at(target, &["image_url"]);
    let mut content = format!("<p>{}</p>", escape_html(intro));
    if !image.is_empty() {
        content.push_str(&format!(
            r#"<p><img src="{}" style="max-width:100%" referrerpolicy="no-referrer" /></p>"#,
            escape_html(image)
        ));
    }
    Extracted {
        title: str_at(target, &["title"]).to_string(),
        content,
        link: format!("https://zhuanlan.zhihu.com/{}", text_at(target, &["id"])),
        ..Extracted::default()
    }
}

fn extract_video(target: &Value, _depth: u8) -> Extracted {
    Extracted {
        title: match str_at(target, &["title"]) {
            "" => "Video".to_string(),
            t => t.to_string(),
        },
        content: escape_html(first_non_empty(&[
            str_at(target, &["description"]),
            str_at(target, &["excerpt"]),
        ])),
        link: format!("https://www.zhihu.com/zvideo/{}", text_at(target, &["id"])),
        cover: first_non_empty(&[
            str_at(target, &["video", "thumbnail"]),
            str_at(target, &["thumbnail"]),
            str_at(target, &["image_url"]),
        ])
        .to_string(),
        ..Extracted::default()
    }
}

fn extract_collection(target: &Value, _depth: u8) -> Extracted {
    Extracted {
        title: str_at(target, &["title"]).to_string(),
        content: escape_html(str_at(target, &["description"])),
        link: format!(
            "https://www.zhihu.com/collection/{}",
            text_at(target, &["id"])
        ),
        ..Extracted::default()
    }
}

fn extract_topic(target: &Value, _depth: u8) -> Extracted {
    let followers = count_at(target, &["followers_count"]).unwrap_or(0);
    Extracted {
        title: str_at(target, &["name"]).to_string(),
        content: format!(
            "<p>{}</p><p>Followers: {followers}</p>",
            escape_html(str_at(target, &["introduction"]))
        ),
        link: format!("https://www.zhihu.com/topic/{}", text_at(target, &["id"])),
        ..Extracted::default()
    }
}

fn extract_live(target: &Value, _depth: u8) -> Extracted {
    let description = escape_html(str_at(target, &["description"]))
        .replace("\r\n", "<br>")
        .replace(['\n', '\r'], "<br>");
    Extracted {
        title: str_at(target, &["subject"]).to_string(),
        content: description,
        link: format!("https://www.zhihu.com/lives/{}", text_at(target, &["id"])),
        ..Extracted::default()
    }
}

fn extract_roundtable(target: &Value, _depth: u8) -> Extracted {
    Extracted {
        title: str_at(target, &["name"]).to_string(),
        content: escape_html(str_at(target, &["description"])),
        link: format!(
            "https://www.zhihu.com/roundtable/{}",
            text_at(target, &["id"])
        ),
        ..Extracted::default()
    }
}

fn extract_default(target: &Value, _depth: u8) -> Extracted {
    Extracted {
        title: str_at(target, &["title"]).to_string(),
        content: rich_text(target, &["content", "excerpt", "description"]),
        link: str_at(target, &["url"]).to_string(),
        ..Extracted::default()
    }
}
