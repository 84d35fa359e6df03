// Lenient accessors for the deeply nested, loosely typed upstream payloads.
// Missing keys and wrong types read as empty values instead of failing.

use serde_json::Value;

pub(crate) static NULL: Value = Value::Null;

/// Walk `path` from `value`; any missing step yields `Null`.
pub(crate) fn at<'a>(value: &'a Value, path: &[&str]) -> &'a Value {
    path.iter().fold(value, |v, key| v.get(*key).unwrap_or(&NULL))
}

/// String at `path`, or `""`.
pub(crate) fn str_at<'a>(value: &'a Value, path: &[&str]) -> &'a str {
    at(value, path).as_str().unwrap_or("")
}

/// String or number at `path` rendered as text, or `""`. Upstream ids
/// switch between the two.
pub(crate) fn text_at(value: &Value, path: &[&str]) -> String {
    match at(value, path) {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        _ => String::new(),
    }
}

/// Non-negative counter at `path`. Accepts numbers and numeric strings.
pub(crate) fn count_at(value: &Value, path: &[&str]) -> Option<u64> {
    match at(value, path) {
        Value::Number(n) => n.as_u64().or_else(|| n.as_f64().map(|f| f.max(0.0) as u64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Integer at `path`, or 0.
pub(crate) fn int_at(value: &Value, path: &[&str]) -> i64 {
    match at(value, path) {
        Value::Number(n) => n.as_i64().unwrap_or(0),
        Value::String(s) => s.trim().parse().unwrap_or(0),
        _ => 0,
    }
}

/// Array at `path`, or an empty slice.
pub(crate) fn array_at<'a>(value: &'a Value, path: &[&str]) -> &'a [Value] {
    at(value, path).as_array().map(Vec::as_slice).unwrap_or(&[])
}

/// First non-empty string among `candidates`.
pub(crate) fn first_non_empty<'a>(candidates: &[&'a str]) -> &'a str {
    candidates.iter().copied().find(|s| !s.is_empty()).unwrap_or("")
}

/// Look `tag` up in a dispatch table, falling back when absent.
pub(crate) fn dispatch<T: Copy>(table: &[(&str, T)], tag: &str, fallback: T) -> T {
    table
        .iter()
        .find(|(t, _)| *t == tag)
        .map(|(_, f)| *f)
        .unwrap_or(fallback)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn missing_paths_read_as_empty() {
        let v = json!({"a": {"b": "x", "n": 42, "s": "7"}});
        assert_eq!(str_at(&v, &["a", "b"]), "x");
        assert_eq!(str_at(&v, &["a", "zz", "b"]), "");
        assert_eq!(text_at(&v, &["a", "n"]), "42");
        assert_eq!(count_at(&v, &["a", "s"]), Some(7));
        assert_eq!(count_at(&v, &["a", "b"]), None);
        assert_eq!(int_at(&v, &["a", "missing"]), 0);
        assert!(array_at(&v, &["a"]).is_empty());
    }

    #[test]
    fn dispatch_uses_fallback() {
        let table: &[(&str, u8)] = &[("x", 1), ("y", 2)];
        assert_eq!(dispatch(table, "y", 0), 2);
        assert_eq!(dispatch(table, "q", 0), 0);
    }
}
