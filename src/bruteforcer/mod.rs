pub mod request;

use std::sync::Arc;

use reqwest::{Method, Url};
use tracing::{debug, trace};

use crate::detector::{response, CanaryDetector, Verdict};
use crate::recursion::{self, RootProgress};
use crate::state::{ConfirmedResult, LogLevel, RunContext, RunStats};
use crate::transport::{HttpResponse, Throttled, Transport};

use self::request::RequestFactory;

// a single candidate request
#[derive(Clone, Debug)]
pub struct Job {
    pub url: Url,
    pub method: Method,
    pub directory: Url,
    pub word: String,
    pub depth: usize,
    pub progress: Option<Arc<RootProgress>>,
}

pub struct Executor {
    ctx: Arc<RunContext>,
    transport: Arc<dyn Transport>,
    requests: Arc<RequestFactory>,
    detector: Arc<CanaryDetector>,
}

impl Executor {
    pub fn new(ctx: Arc<RunContext>, transport: Arc<dyn Transport>) -> Self {
        let transport: Arc<dyn Transport> = match ctx.config.rate {
            Some(rate) => Arc::new(Throttled::new(transport, rate)),
            None => transport,
        };
        let requests = Arc::new(RequestFactory::new(&ctx.config));
        let detector = Arc::new(CanaryDetector::new(
            Arc::clone(&ctx),
            Arc::clone(&transport),
            Arc::clone(&requests),
        ));
        Self {
            ctx,
            transport,
            requests,
            detector,
        }
    }

    pub fn detector(&self) -> &Arc<CanaryDetector> {
        &self.detector
    }

    // None when nothing was classified (blacklisted or transport failure)
    pub async fn execute(&self, job: &Job) -> Option<Verdict> {
        RunStats::bump(&self.ctx.stats.jobs);
        let verdict = self.run(job).await;
        if let Some(progress) = &job.progress {
            if progress.job_done() {
                self.ctx
                    .log(LogLevel::Info, format!("finished enumerating {}", progress.dir()))
                    .await;
            }
        }
        verdict
    }

    async fn run(&self, job: &Job) -> Option<Verdict> {
        if self.ctx.blacklist.blocks(&job.url) {
            RunStats::bump(&self.ctx.stats.blacklisted);
            debug!(url = %job.url, "skipping blacklisted url");
            return None;
        }

        if let Some(progress) = &job.progress {
            progress.baselining();
        }
        let baseline = self.detector.baseline(&job.directory, &job.method).await;
        if let Some(progress) = &job.progress {
            progress.enumerating();
        }

        let request = self.requests.build(&job.method, &job.url, &job.word);
        RunStats::bump(&self.ctx.stats.requests);
        let response = match self.transport.send(request).await {
            Ok(response) => response,
            Err(e) => {
                RunStats::bump(&self.ctx.stats.transport_errors);
                debug!(url = %job.url, method = %job.method, "request failed: {e}");
                self.ctx.log(LogLevel::Debug, e.to_string()).await;
                return None;
            }
        };

        let verdict = self.detector.classify(&baseline, &job.url, &response);
        trace!(url = %job.url, method = %job.method, status = response.status, %verdict);

        if verdict.is_hit() {
            RunStats::bump(&self.ctx.stats.hits);
            if self.ctx.first_report(job.url.to_string()) {
                self.ctx.report(self.confirmed(job, &response, &verdict)).await;
            }
            if !self.ctx.config.no_recursion {
                if let Some(next) = recursion::follow_up(&self.ctx, job, &response) {
                    self.ctx.submit(next);
                }
            }
        } else {
            RunStats::bump(&self.ctx.stats.noise);
            if self.ctx.config.show_all
                && self
                    .ctx
                    .first_report(format!("{} {}", job.method, job.url))
            {
                self.ctx.report(self.confirmed(job, &response, &verdict)).await;
            }
        }
        Some(verdict)
    }

    fn confirmed(&self, job: &Job, resp: &HttpResponse, verdict: &Verdict) -> ConfirmedResult {
        ConfirmedResult {
            url: job.url.clone(),
            method: job.method.clone(),
            status: resp.status,
            length: resp.length,
            headers: resp.headers.clone(),
            title: response::page_title(&resp.body),
            depth: job.depth,
            verdict: verdict.clone(),
        }
    }
}
