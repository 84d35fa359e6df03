// Normalizer seam: one raw upstream record in, one ActivityItem (or nothing)
// out. Each platform dispatches on a subtype tag through a static table.

use feedloom_common::html::truncate_chars;
use feedloom_common::{ActivityItem, Platform};
use serde_json::Value;

/// Maps raw platform records to the canonical item shape.
///
/// `normalize` returns `None` for records that cannot be represented: ads,
/// internal placeholders, or anything without a resolvable link. Callers
/// skip those without counting them.
pub trait Normalizer: Send + Sync {
    fn platform(&self) -> Platform;

    /// Subtype tag used by the type filters, read before normalizing.
    fn subtype<'a>(&self, raw: &'a Value) -> &'a str;

    fn normalize(&self, raw: &Value) -> Option<ActivityItem>;
}

/// Fields pulled out of one record by a subtype extractor.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct Extracted {
    pub title: String,
    pub content: String,
    pub link: String,
    pub images: Vec<String>,
    pub cover: String,
    pub cover_duration: String,
    /// Activity verb, for templates that quote it.
    pub verb: String,
}

/// `depth` counts how many reshare levels sit above the record.
pub(crate) type Extractor = fn(&Value, u8) -> Extracted;
pub(crate) type TitleFn = fn(&str, &Extracted) -> String;

/// One row of a platform's dispatch table.
#[derive(Clone, Copy)]
pub(crate) struct Subtype {
    pub extract: Extractor,
    pub title: TitleFn,
}

/// Reshares deeper than this collapse to a one-line note.
pub(crate) const MAX_RESHARE_DEPTH: u8 = 1;

pub(crate) const DELETED_NOTICE: &str = "This content has been deleted or is no longer visible.";

/// `"{prefix}: {detail}"`, or just the prefix when there is no detail.
pub(crate) fn labelled(prefix: String, detail: &str) -> String {
    if detail.is_empty() {
        prefix
    } else {
        format!("{prefix}: {detail}")
    }
}

/// `"{author}: {first text}"` for subtypes without a template.
pub(crate) fn fallback_title(author: &str, ex: &Extracted) -> String {
    let text = if ex.title.is_empty() {
        truncate_chars(ex.content.trim(), 50)
    } else {
        ex.title.clone()
    };
    if text.is_empty() {
        format!("{author}'s activity")
    } else {
        format!("{author}: {text}")
    }
}

/// Turn an item built from a deleted or hidden upstream record into its
/// placeholder. Identity, subtype, author and timestamp are kept so the item
/// still sorts and filters like the record it stands for.
pub(crate) fn placeholder(mut item: ActivityItem, notice: &str) -> ActivityItem {
    item.title = format!("{}'s activity (deleted)", item.author);
    item.content = if notice.is_empty() {
        DELETED_NOTICE.to_string()
    } else {
        notice.to_string()
    };
    item.images.clear();
    item.cover_image = None;
    item.cover_duration = None;
    item
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fallback_title_prefers_title_then_text() {
        let mut ex = Extracted::default();
        assert_eq!(fallback_title("ann", &ex), "ann's activity");
        ex.content = "a".repeat(60);
        assert_eq!(
            fallback_title("ann", &ex),
            format!("ann: {}...", "a".repeat(50))
        );
        ex.title = "Headline".into();
        assert_eq!(fallback_title("ann", &ex), "ann: Headline");
    }

    #[test]
    fn labelled_omits_empty_detail() {
        assert_eq!(labelled("x posted".into(), ""), "x posted");
        assert_eq!(labelled("x posted".into(), "t"), "x posted: t");
    }
}
