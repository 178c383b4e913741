use std::collections::HashSet;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

use reqwest::{Method, Url};
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

use crate::utils;

pub const DEFAULT_RATIO_404: f32 = 0.95;
pub const DEFAULT_QUEUE_CAPACITY: usize = 4096;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid URL '{url}': {message}")]
    InvalidUrl { url: String, message: String },

    #[error("invalid thread count {value}, expected a positive integer")]
    InvalidThreads { value: usize },

    #[error("invalid timeout {value}, expected a positive number of seconds")]
    InvalidTimeout { value: u64 },

    #[error("invalid 404 ratio {value}, expected a value in (0, 1]")]
    InvalidRatio { value: f32 },

    #[error("invalid methods '{value}': {message}")]
    InvalidMethods { value: String, message: String },

    #[error("no request methods left after applying no_get/no_head")]
    NoMethods,

    #[error("invalid bad responses '{value}': {message}")]
    InvalidBadResponses { value: String, message: String },

    #[error("invalid bad header '{value}': {message}")]
    InvalidBadHeader { value: String, message: String },

    #[error("invalid header '{value}': {message}")]
    InvalidHeader { value: String, message: String },

    #[error("invalid canary '{value}': must be a single non-empty path segment")]
    InvalidCanary { value: String },

    #[error("invalid rate {value}, expected a positive integer")]
    InvalidRate { value: u32 },

    #[error("invalid queue capacity {value}, expected a positive integer")]
    InvalidQueueCapacity { value: usize },

    #[error("config file not found '{path}'")]
    FileMissing { path: String },

    #[error("failed to read config '{path}': {source}")]
    FileRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config '{path}': {source}")]
    FileParse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },
}

#[derive(Clone, Debug)]
pub struct Options {
    pub url: String,
    pub threads: usize,
    pub timeout_seconds: u64,
    pub methods: String,
    pub no_get: bool,
    pub no_head: bool,
    pub no_recursion: bool,
    pub no_spider: bool,
    pub append_dir: bool,
    pub extensions: String,
    pub bad_responses: String,
    pub bad_headers: Vec<String>,
    pub headers: Vec<String>,
    pub cookies: String,
    pub auth: String,
    pub ajax: bool,
    pub body_content: Option<String>,
    pub canary: Option<String>,
    pub ratio_404: f32,
    pub show_all: bool,
    pub blacklist_location: Option<String>,
    pub https: bool,
    pub ssl_ignore: bool,
    pub proxy: Option<String>,
    pub follow_redirects: bool,
    pub agent: String,
    pub rate: Option<u32>,
    pub max_depth: Option<usize>,
    pub queue_capacity: usize,
    pub wordlist: Option<String>,
    pub output: Option<String>,
    pub output_format: Option<String>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            url: String::new(),
            threads: 10,
            timeout_seconds: 20,
            methods: "GET,HEAD".to_string(),
            no_get: false,
            no_head: false,
            no_recursion: false,
            no_spider: false,
            append_dir: true,
            extensions: String::new(),
            bad_responses: "404".to_string(),
            bad_headers: Vec::new(),
            headers: Vec::new(),
            cookies: String::new(),
            auth: String::new(),
            ajax: false,
            body_content: None,
            canary: None,
            ratio_404: DEFAULT_RATIO_404,
            show_all: false,
            blacklist_location: None,
            https: false,
            ssl_ignore: false,
            proxy: None,
            follow_redirects: false,
            agent: format!("recurbuster/{}", env!("CARGO_PKG_VERSION")),
            rate: None,
            max_depth: None,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            wordlist: None,
            output: None,
            output_format: None,
        }
    }
}

// A `Name: value` pair that marks a response as noise when present verbatim.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HeaderRule {
    pub name: String,
    pub value: String,
}

#[derive(Clone, Debug)]
pub struct Config {
    pub url: Url,
    pub threads: usize,
    pub timeout: Duration,
    // Effective method set, `no_get`/`no_head` already applied.
    pub methods: Vec<Method>,
    pub no_recursion: bool,
    pub no_spider: bool,
    pub append_dir: bool,
    pub extensions: Vec<String>,
    pub bad_responses: HashSet<u16>,
    pub bad_headers: Vec<HeaderRule>,
    pub headers: Vec<(String, String)>,
    pub cookies: Option<String>,
    pub auth: Option<String>,
    pub ajax: bool,
    pub body_content: Option<String>,
    pub canary: Option<String>,
    pub ratio_404: f32,
    pub show_all: bool,
    pub blacklist_location: Option<String>,
    pub https: bool,
    pub ssl_ignore: bool,
    pub proxy: Option<String>,
    pub follow_redirects: bool,
    pub agent: String,
    pub rate: Option<u32>,
    pub max_depth: Option<usize>,
    pub queue_capacity: usize,
}

fn non_empty(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

impl Config {
    pub fn from_options(options: &Options) -> Result<Self, ConfigError> {
        let url = utils::normalize_target(&options.url, options.https).map_err(|message| {
            ConfigError::InvalidUrl {
                url: options.url.clone(),
                message,
            }
        })?;

        if options.threads == 0 {
            return Err(ConfigError::InvalidThreads {
                value: options.threads,
            });
        }
        if options.timeout_seconds == 0 {
            return Err(ConfigError::InvalidTimeout {
                value: options.timeout_seconds,
            });
        }
        if !(options.ratio_404 > 0.0 && options.ratio_404 <= 1.0) {
            return Err(ConfigError::InvalidRatio {
                value: options.ratio_404,
            });
        }
        if options.queue_capacity == 0 {
            return Err(ConfigError::InvalidQueueCapacity {
                value: options.queue_capacity,
            });
        }
        if let Some(rate) = options.rate {
            if rate == 0 {
                return Err(ConfigError::InvalidRate { value: rate });
            }
        }

        let methods: Vec<Method> = utils::parse_http_methods_csv(&options.methods)
            .map_err(|message| ConfigError::InvalidMethods {
                value: options.methods.clone(),
                message,
            })?
            .into_iter()
            .filter(|m| !(options.no_get && *m == Method::GET))
            .filter(|m| !(options.no_head && *m == Method::HEAD))
            .collect();
        if methods.is_empty() {
            return Err(ConfigError::NoMethods);
        }

        let bad_responses = utils::parse_u16_set_csv(&options.bad_responses).map_err(|message| {
            ConfigError::InvalidBadResponses {
                value: options.bad_responses.clone(),
                message,
            }
        })?;

        let mut bad_headers = Vec::with_capacity(options.bad_headers.len());
        for spec in options.bad_headers.iter() {
            let (name, value) =
                utils::parse_header_spec(spec).map_err(|message| ConfigError::InvalidBadHeader {
                    value: spec.clone(),
                    message,
                })?;
            bad_headers.push(HeaderRule { name, value });
        }

        let mut headers = Vec::with_capacity(options.headers.len());
        for spec in options.headers.iter() {
            headers.push(utils::parse_header_spec(spec).map_err(|message| {
                ConfigError::InvalidHeader {
                    value: spec.clone(),
                    message,
                }
            })?);
        }

        let canary = match options.canary.as_deref().and_then(non_empty) {
            Some(canary) if canary.contains('/') || canary.contains('?') || canary.contains('#') => {
                return Err(ConfigError::InvalidCanary { value: canary });
            }
            other => other,
        };

        Ok(Self {
            url,
            threads: options.threads,
            timeout: Duration::from_secs(options.timeout_seconds),
            methods,
            no_recursion: options.no_recursion,
            no_spider: options.no_spider,
            append_dir: options.append_dir,
            extensions: utils::parse_extensions_csv(&options.extensions),
            bad_responses,
            bad_headers,
            headers,
            cookies: non_empty(&options.cookies),
            auth: non_empty(&options.auth),
            ajax: options.ajax,
            body_content: options.body_content.clone(),
            canary,
            ratio_404: options.ratio_404,
            show_all: options.show_all,
            blacklist_location: options.blacklist_location.as_deref().and_then(non_empty),
            https: options.https,
            ssl_ignore: options.ssl_ignore,
            proxy: options.proxy.as_deref().and_then(non_empty),
            follow_redirects: options.follow_redirects,
            agent: options.agent.clone(),
            rate: options.rate,
            max_depth: options.max_depth,
            queue_capacity: options.queue_capacity,
        })
    }
}

#[derive(Debug, Default, Deserialize, Serialize, Clone)]
pub struct ConfigFile {
    pub url: Option<String>,
    pub threads: Option<usize>,
    pub timeout: Option<u64>,
    pub methods: Option<String>,
    pub no_get: Option<bool>,
    pub no_head: Option<bool>,
    pub no_recursion: Option<bool>,
    pub no_spider: Option<bool>,
    pub append_dir: Option<bool>,
    pub extensions: Option<String>,
    pub bad_responses: Option<String>,
    pub bad_headers: Option<Vec<String>>,
    pub headers: Option<Vec<String>>,
    pub cookies: Option<String>,
    pub auth: Option<String>,
    pub ajax: Option<bool>,
    pub body_content: Option<String>,
    pub canary: Option<String>,
    #[serde(alias = "ratio404")]
    pub ratio_404: Option<f32>,
    pub show_all: Option<bool>,
    #[serde(alias = "blacklist")]
    pub blacklist_location: Option<String>,
    pub https: Option<bool>,
    pub ssl_ignore: Option<bool>,
    pub proxy: Option<String>,
    pub follow_redirects: Option<bool>,
    pub agent: Option<String>,
    pub rate: Option<u32>,
    pub max_depth: Option<usize>,
    pub queue_capacity: Option<usize>,
    pub wordlist: Option<String>,
    pub output: Option<String>,
    pub output_format: Option<String>,
}

impl ConfigFile {
    pub fn apply(self, options: &mut Options) {
        if let Some(v) = self.url {
            options.url = v;
        }
        if let Some(v) = self.threads {
            options.threads = v;
        }
        if let Some(v) = self.timeout {
            options.timeout_seconds = v;
        }
        if let Some(v) = self.methods {
            options.methods = v;
        }
        if let Some(v) = self.no_get {
            options.no_get = v;
        }
        if let Some(v) = self.no_head {
            options.no_head = v;
        }
        if let Some(v) = self.no_recursion {
            options.no_recursion = v;
        }
        if let Some(v) = self.no_spider {
            options.no_spider = v;
        }
        if let Some(v) = self.append_dir {
            options.append_dir = v;
        }
        if let Some(v) = self.extensions {
            options.extensions = v;
        }
        if let Some(v) = self.bad_responses {
            options.bad_responses = v;
        }
        if let Some(v) = self.bad_headers {
            options.bad_headers = v;
        }
        if let Some(v) = self.headers {
            options.headers = v;
        }
        if let Some(v) = self.cookies {
            options.cookies = v;
        }
        if let Some(v) = self.auth {
            options.auth = v;
        }
        if let Some(v) = self.ajax {
            options.ajax = v;
        }
        if let Some(v) = self.ratio_404 {
            options.ratio_404 = v;
        }
        if let Some(v) = self.show_all {
            options.show_all = v;
        }
        if let Some(v) = self.https {
            options.https = v;
        }
        if let Some(v) = self.ssl_ignore {
            options.ssl_ignore = v;
        }
        if let Some(v) = self.follow_redirects {
            options.follow_redirects = v;
        }
        if let Some(v) = self.agent {
            options.agent = v;
        }
        if let Some(v) = self.queue_capacity {
            options.queue_capacity = v;
        }
        if self.body_content.is_some() {
            options.body_content = self.body_content;
        }
        if self.canary.is_some() {
            options.canary = self.canary;
        }
        if self.blacklist_location.is_some() {
            options.blacklist_location = self.blacklist_location;
        }
        if self.proxy.is_some() {
            options.proxy = self.proxy;
        }
        if self.rate.is_some() {
            options.rate = self.rate;
        }
        if self.max_depth.is_some() {
            options.max_depth = self.max_depth;
        }
        if self.wordlist.is_some() {
            options.wordlist = self.wordlist;
        }
        if self.output.is_some() {
            options.output = self.output;
        }
        if self.output_format.is_some() {
            options.output_format = self.output_format;
        }
    }
}

fn home_dir() -> Option<PathBuf> {
    env::var_os("HOME")
        .map(PathBuf::from)
        .or_else(|| env::var_os("USERPROFILE").map(PathBuf::from))
        .or_else(|| {
            let drive = env::var_os("HOMEDRIVE")?;
            let path = env::var_os("HOMEPATH")?;
            Some(PathBuf::from(drive).join(path))
        })
}

pub fn default_config_path() -> Option<PathBuf> {
    Some(home_dir()?.join(".recurbuster").join("config.yml"))
}

pub fn expand_tilde(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/").or_else(|| path.strip_prefix("~\\")) {
        if let Some(home) = home_dir() {
            return home.join(stripped);
        }
    }
    PathBuf::from(path)
}

pub fn expand_tilde_string(path: &str) -> String {
    expand_tilde(path).to_string_lossy().to_string()
}

pub fn load_config(path: &PathBuf, allow_missing: bool) -> Result<ConfigFile, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(contents) => {
            serde_yaml::from_str::<ConfigFile>(&contents).map_err(|e| ConfigError::FileParse {
                path: path.display().to_string(),
                source: e,
            })
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound && allow_missing => {
            Ok(ConfigFile::default())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(ConfigError::FileMissing {
            path: path.display().to_string(),
        }),
        Err(e) => Err(ConfigError::FileRead {
            path: path.display().to_string(),
            source: e,
        }),
    }
}
