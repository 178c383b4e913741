use reqwest::{Method, Url};

use crate::config::Config;
use crate::transport::HttpRequest;

pub const WORD_PLACEHOLDER: &str = "{word}";

// canary probes and candidates are built the same way
#[derive(Clone, Debug, Default)]
pub struct RequestFactory {
    headers: Vec<(String, String)>,
    body_template: Option<String>,
}

impl RequestFactory {
    pub fn new(config: &Config) -> Self {
        let mut headers = config.headers.clone();
        if config.ajax {
            headers.push(("X-Requested-With".to_string(), "XMLHttpRequest".to_string()));
        }
        if let Some(cookies) = &config.cookies {
            headers.push(("Cookie".to_string(), cookies.clone()));
        }
        if let Some(auth) = &config.auth {
            headers.push(("Authorization".to_string(), format!("Basic {auth}")));
        }
        Self {
            headers,
            body_template: config.body_content.clone(),
        }
    }

    pub fn build(&self, method: &Method, url: &Url, word: &str) -> HttpRequest {
        let body = match (method, &self.body_template) {
            (&Method::POST, Some(template)) => Some(template.replace(WORD_PLACEHOLDER, word)),
            _ => None,
        };
        HttpRequest {
            method: method.clone(),
            url: url.clone(),
            headers: self.headers.clone(),
            body,
        }
    }
}
