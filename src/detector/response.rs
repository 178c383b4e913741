use std::borrow::Cow;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::OnceLock;

use distance::sift3;
use regex::Regex;

// shorter segments are too common in ordinary text to count as reflections
const MIN_REFLECTION_LEN: usize = 4;
const REFLECTION_PLACEHOLDER: &str = "\u{0}";

pub fn similarity(a: &str, b: &str) -> f32 {
    if a == b {
        return 1.0;
    }
    let longest = a.chars().count().max(b.chars().count());
    if longest == 0 {
        return 1.0;
    }
    let distance = (sift3(a, b) + sift3(b, a)) / 2.0;
    (1.0 - distance / longest as f32).clamp(0.0, 1.0)
}

// borrowed when nothing was masked
pub fn strip_reflection<'a>(body: &'a str, segment: &str) -> Cow<'a, str> {
    if segment.chars().count() < MIN_REFLECTION_LEN || !body.contains(segment) {
        return Cow::Borrowed(body);
    }
    Cow::Owned(body.replace(segment, REFLECTION_PLACEHOLDER))
}

pub fn fingerprint(body: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    body.hash(&mut hasher);
    hasher.finish()
}

fn title_regex() -> Option<&'static Regex> {
    static TITLE_RE: OnceLock<Option<Regex>> = OnceLock::new();
    TITLE_RE
        .get_or_init(|| Regex::new(r"(?is)<title[^>]*>(.*?)</title>").ok())
        .as_ref()
}

pub fn page_title(body: &str) -> String {
    let mut title = String::new();
    if let Some(re) = title_regex() {
        for cap in re.captures_iter(body) {
            title.push_str(cap[1].trim());
        }
    }
    title
}
