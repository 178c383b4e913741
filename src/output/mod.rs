use serde::Serialize;

use crate::state::ConfirmedResult;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
}

impl OutputFormat {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "text" | "txt" => Some(Self::Text),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

pub fn infer_format_from_path(path: &str) -> Option<OutputFormat> {
    let lower = path.trim().to_lowercase();
    if lower.ends_with(".json") {
        return Some(OutputFormat::Json);
    }
    if lower.ends_with(".txt") {
        return Some(OutputFormat::Text);
    }
    None
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct OutputRecord {
    pub url: String,
    pub method: String,
    pub status: u16,
    pub size: usize,
    pub depth: usize,
    pub title: String,
    pub verdict: String,
    pub hit: bool,
    pub server: String,
    pub content_type: String,
    pub location: String,
}

impl OutputRecord {
    pub fn from_result(result: &ConfirmedResult) -> Self {
        let header = |name: &str| result.headers.get(name).cloned().unwrap_or_default();
        Self {
            url: result.url.to_string(),
            method: result.method.to_string(),
            status: result.status,
            size: result.length,
            depth: result.depth,
            title: result.title.clone(),
            verdict: result.verdict.to_string(),
            hit: result.verdict.is_hit(),
            server: header("server"),
            content_type: header("content-type"),
            location: header("location"),
        }
    }
}

pub fn build_records(results: &[ConfirmedResult]) -> Vec<OutputRecord> {
    results.iter().map(OutputRecord::from_result).collect()
}

pub fn render_text(records: &[OutputRecord]) -> Vec<u8> {
    let mut out = String::new();
    for r in records {
        if r.hit {
            out.push_str(&r.url);
        } else {
            out.push_str(&format!("{} {} {} ({})", r.status, r.method, r.url, r.verdict));
        }
        out.push('\n');
    }
    out.into_bytes()
}

pub fn render_json(records: &[OutputRecord]) -> Vec<u8> {
    serde_json::to_vec_pretty(records).unwrap_or_else(|_| b"[]\n".to_vec())
}

pub fn render(format: OutputFormat, records: &[OutputRecord]) -> Vec<u8> {
    match format {
        OutputFormat::Text => render_text(records),
        OutputFormat::Json => render_json(records),
    }
}
