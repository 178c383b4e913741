use std::collections::HashSet;

use rand::distributions::Alphanumeric;
use rand::{thread_rng, Rng};
use reqwest::Url;

pub const CANARY_LENGTH: usize = 24;

const SUPPORTED_METHODS: [&str; 3] = ["GET", "HEAD", "POST"];

pub fn parse_http_methods_csv(value: &str) -> Result<Vec<reqwest::Method>, String> {
    let raw = value.trim();
    if raw.is_empty() {
        return Err("methods list is empty".to_string());
    }

    let mut out: Vec<reqwest::Method> = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();
    for part in raw.split(',') {
        let item = part.trim();
        if item.is_empty() {
            continue;
        }
        let canonical = item.to_ascii_uppercase();
        if !SUPPORTED_METHODS.contains(&canonical.as_str()) {
            return Err(format!("unsupported method '{item}', expected GET, HEAD or POST"));
        }
        let method = reqwest::Method::from_bytes(canonical.as_bytes())
            .map_err(|_| format!("invalid method '{item}'"))?;
        if seen.insert(method.as_str().to_string()) {
            out.push(method);
        }
    }

    if out.is_empty() {
        return Err("methods list is empty".to_string());
    }
    Ok(out)
}

// an empty list is valid here, it simply means "no extensions"
pub fn parse_extensions_csv(value: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();
    for part in value.split(',') {
        let item = part.trim();
        if item.is_empty() {
            continue;
        }
        let cleaned = item.trim_start_matches('.');
        if cleaned.is_empty() {
            continue;
        }
        let key = cleaned.to_ascii_lowercase();
        if seen.insert(key) {
            out.push(cleaned.to_string());
        }
    }
    out
}

pub fn parse_u16_set_csv(value: &str) -> Result<HashSet<u16>, String> {
    let mut out = HashSet::new();
    for part in value.split(',') {
        let item = part.trim();
        if item.is_empty() {
            continue;
        }
        let code: u16 = item
            .parse()
            .map_err(|_| format!("invalid status code '{item}'"))?;
        if !(100..=999).contains(&code) {
            return Err(format!("invalid status code '{item}'"));
        }
        out.insert(code);
    }
    Ok(out)
}

// Splits a `Name: value` pair. The name must be non-empty, the value may be.
pub fn parse_header_spec(spec: &str) -> Result<(String, String), String> {
    let (name, value) = spec
        .split_once(':')
        .ok_or_else(|| format!("expected 'Name: value', got '{spec}'"))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("empty header name in '{spec}'"));
    }
    reqwest::header::HeaderName::from_bytes(name.as_bytes())
        .map_err(|_| format!("invalid header name '{name}'"))?;
    let value = value.trim();
    reqwest::header::HeaderValue::from_str(value)
        .map_err(|_| format!("invalid header value for '{name}'"))?;
    Ok((name.to_string(), value.to_string()))
}

// adds a scheme when missing and a trailing slash to the path
pub fn normalize_target(raw: &str, https: bool) -> Result<Url, String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err("target URL is empty".to_string());
    }
    let with_scheme = if trimmed.contains("://") {
        trimmed.to_string()
    } else if https {
        format!("https://{trimmed}")
    } else {
        format!("http://{trimmed}")
    };
    let mut url = Url::parse(&with_scheme).map_err(|e| format!("{with_scheme}: {e}"))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(format!("unsupported scheme '{}'", url.scheme()));
    }
    if url.host_str().is_none() {
        return Err(format!("{with_scheme}: missing host"));
    }
    url.set_query(None);
    url.set_fragment(None);
    Ok(as_directory(url))
}

pub fn as_directory(mut url: Url) -> Url {
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url
}

pub fn parent_directory(url: &Url) -> Url {
    let mut parent = url.clone();
    parent.set_query(None);
    parent.set_fragment(None);
    let path = url.path();
    // a directory URL is its own baselining context
    if path.ends_with('/') {
        return parent;
    }
    let cut = match path.rfind('/') {
        Some(idx) => path[..=idx].to_string(),
        None => "/".to_string(),
    };
    parent.set_path(&cut);
    parent
}

pub fn last_segment(url: &Url) -> &str {
    url.path()
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or_default()
}

pub fn random_canary() -> String {
    thread_rng()
        .sample_iter(&Alphanumeric)
        .take(CANARY_LENGTH)
        .map(char::from)
        .collect()
}
