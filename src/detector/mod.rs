pub mod filters;
pub mod response;

use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};

use reqwest::{Method, Url};
use tokio::sync::OnceCell;

use crate::bruteforcer::request::RequestFactory;
use crate::state::{LogLevel, RunContext, RunStats};
use crate::transport::{HttpResponse, Transport};
use crate::utils;

#[derive(Clone, Debug, PartialEq)]
pub enum NoiseReason {
    BadStatus(u16),
    BadHeader { name: String, value: String },
    Wildcard { similarity: f32 },
    CanaryToken,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Verdict {
    Hit,
    Noise(NoiseReason),
}

impl Verdict {
    pub fn is_hit(&self) -> bool {
        matches!(self, Verdict::Hit)
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Hit => write!(f, "hit"),
            Verdict::Noise(NoiseReason::BadStatus(status)) => write!(f, "bad status {status}"),
            Verdict::Noise(NoiseReason::BadHeader { name, value }) => {
                write!(f, "bad header {name}: {value}")
            }
            Verdict::Noise(NoiseReason::Wildcard { similarity }) => {
                write!(f, "wildcard ({similarity:.2})")
            }
            Verdict::Noise(NoiseReason::CanaryToken) => write!(f, "canary"),
        }
    }
}

#[derive(Clone, Debug)]
pub struct CanarySignature {
    pub status: u16,
    pub length: usize,
    // Body with reflections of the canary token masked.
    pub body: String,
    pub fingerprint: u64,
    // False when the canary request itself failed.
    pub reachable: bool,
}

impl CanarySignature {
    fn from_response(response: &HttpResponse, token: &str) -> Self {
        let body = response::strip_reflection(&response.body, token).into_owned();
        Self {
            status: response.status,
            length: response.length,
            fingerprint: response::fingerprint(&body),
            body,
            reachable: true,
        }
    }

    // status 0 never matches, so every filtered response counts as a hit
    fn unreachable() -> Self {
        Self {
            status: 0,
            length: 0,
            body: String::new(),
            fingerprint: response::fingerprint(""),
            reachable: false,
        }
    }
}

type BaselineKey = (String, Method);
type BaselineCell = Arc<OnceCell<Arc<CanarySignature>>>;

pub struct CanaryDetector {
    ctx: Arc<RunContext>,
    transport: Arc<dyn Transport>,
    requests: Arc<RequestFactory>,
    token: String,
    cache: Mutex<HashMap<BaselineKey, BaselineCell>>,
}

impl fmt::Debug for CanaryDetector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CanaryDetector")
            .field("token", &self.token)
            .field("baselines", &self.cached())
            .finish()
    }
}

impl CanaryDetector {
    pub fn new(
        ctx: Arc<RunContext>,
        transport: Arc<dyn Transport>,
        requests: Arc<RequestFactory>,
    ) -> Self {
        let token = ctx
            .config
            .canary
            .clone()
            .unwrap_or_else(utils::random_canary);
        Self {
            ctx,
            transport,
            requests,
            token,
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn cached(&self) -> usize {
        match self.cache.lock() {
            Ok(cache) => cache.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    pub fn is_canary(&self, url: &Url) -> bool {
        utils::last_segment(url) == self.token
    }

    // requested once per (dir, method), concurrent callers share the fetch
    pub async fn baseline(&self, dir: &Url, method: &Method) -> Arc<CanarySignature> {
        let key = (dir.to_string(), method.clone());
        let cell = {
            let mut cache = match self.cache.lock() {
                Ok(cache) => cache,
                Err(poisoned) => poisoned.into_inner(),
            };
            Arc::clone(cache.entry(key).or_default())
        };
        let signature = cell.get_or_init(|| self.fetch(dir, method)).await;
        Arc::clone(signature)
    }

    async fn fetch(&self, dir: &Url, method: &Method) -> Arc<CanarySignature> {
        RunStats::bump(&self.ctx.stats.baselines);
        let target = match Url::parse(&format!("{dir}{}", self.token)) {
            Ok(target) => target,
            Err(e) => {
                self.ctx
                    .log(
                        LogLevel::Warn,
                        format!("cannot build canary URL under {dir}: {e}"),
                    )
                    .await;
                return Arc::new(CanarySignature::unreachable());
            }
        };

        let request = self.requests.build(method, &target, &self.token);
        RunStats::bump(&self.ctx.stats.requests);
        match self.transport.send(request).await {
            Ok(resp) => {
                let signature = CanarySignature::from_response(&resp, &self.token);
                self.ctx
                    .log(
                        LogLevel::Debug,
                        format!(
                            "baseline {method} {dir}: status {} length {}",
                            signature.status, signature.length
                        ),
                    )
                    .await;
                Arc::new(signature)
            }
            Err(e) => {
                RunStats::bump(&self.ctx.stats.transport_errors);
                self.ctx
                    .log(
                        LogLevel::Warn,
                        format!("baseline {method} {dir} failed, no soft-404 filtering: {e}"),
                    )
                    .await;
                Arc::new(CanarySignature::unreachable())
            }
        }
    }

    pub fn classify(
        &self,
        baseline: &CanarySignature,
        url: &Url,
        response: &HttpResponse,
    ) -> Verdict {
        let config = &self.ctx.config;
        if self.is_canary(url) {
            return Verdict::Noise(NoiseReason::CanaryToken);
        }
        if filters::bad_status(response.status, &config.bad_responses) {
            return Verdict::Noise(NoiseReason::BadStatus(response.status));
        }
        if let Some(rule) = filters::bad_header(&config.bad_headers, response) {
            return Verdict::Noise(NoiseReason::BadHeader {
                name: rule.name.clone(),
                value: rule.value.clone(),
            });
        }
        if response.status != baseline.status {
            return Verdict::Hit;
        }

        let segment = utils::last_segment(url);
        let body = response::strip_reflection(&response.body, segment);
        // a word that is part of the catch-all page itself is masked on both sides
        let similarity = match response::strip_reflection(&baseline.body, segment) {
            Cow::Borrowed(_) if response::fingerprint(&body) == baseline.fingerprint => 1.0,
            expected => response::similarity(&body, &expected),
        };
        if similarity >= config.ratio_404 {
            Verdict::Noise(NoiseReason::Wildcard { similarity })
        } else {
            Verdict::Hit
        }
    }
}
