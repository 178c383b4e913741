use std::fmt;
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use itertools::iproduct;
use reqwest::Url;
use tokio::sync::mpsc;
use tracing::debug;

use crate::bruteforcer::Job;
use crate::config::Config;
use crate::state::{FrontierReceiver, LogLevel, RunContext, RunStats, Tracked};
use crate::transport::HttpResponse;
use crate::utils;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FrontierMessage {
    Root { url: Url, depth: usize },
    // A single candidate, e.g. a same-host redirect target.
    Probe { url: Url, depth: usize },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DirState {
    Pending,
    Baselining,
    Enumerating,
    Complete,
}

impl DirState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => DirState::Pending,
            1 => DirState::Baselining,
            2 => DirState::Enumerating,
            _ => DirState::Complete,
        }
    }
}

impl fmt::Display for DirState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DirState::Pending => "pending",
            DirState::Baselining => "baselining",
            DirState::Enumerating => "enumerating",
            DirState::Complete => "complete",
        };
        f.write_str(name)
    }
}

#[derive(Debug)]
pub struct RootProgress {
    dir: Url,
    state: AtomicU8,
    remaining: AtomicUsize,
}

impl RootProgress {
    // `jobs` must match the number of jobs dispatched for `dir`
    pub fn new(dir: Url, jobs: usize) -> Self {
        let state = if jobs == 0 {
            DirState::Complete
        } else {
            DirState::Pending
        };
        Self {
            dir,
            state: AtomicU8::new(state as u8),
            remaining: AtomicUsize::new(jobs),
        }
    }

    pub fn dir(&self) -> &Url {
        &self.dir
    }

    pub fn state(&self) -> DirState {
        DirState::from_u8(self.state.load(Ordering::SeqCst))
    }

    fn advance(&self, from: DirState, to: DirState) {
        let _ = self.state.compare_exchange(
            from as u8,
            to as u8,
            Ordering::SeqCst,
            Ordering::SeqCst,
        );
    }

    pub(crate) fn baselining(&self) {
        self.advance(DirState::Pending, DirState::Baselining);
    }

    pub(crate) fn enumerating(&self) {
        self.advance(DirState::Pending, DirState::Enumerating);
        self.advance(DirState::Baselining, DirState::Enumerating);
    }

    // true for the job that completes the root
    pub(crate) fn job_done(&self) -> bool {
        let done = self
            .remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .map(|previous| previous == 1)
            .unwrap_or(false);
        if done {
            self.state.store(DirState::Complete as u8, Ordering::SeqCst);
        }
        done
    }
}

pub type ProgressRegistry = Arc<Mutex<Vec<Arc<RootProgress>>>>;

pub fn seed_variants(word: &str, config: &Config) -> Vec<String> {
    let word = word.trim().trim_start_matches('/');
    if word.is_empty() {
        return Vec::new();
    }
    if word.ends_with('/') {
        return vec![word.to_string()];
    }
    let mut out = Vec::with_capacity(config.extensions.len() + 2);
    out.push(word.to_string());
    for ext in config.extensions.iter() {
        out.push(format!("{word}.{ext}"));
    }
    if config.append_dir {
        out.push(format!("{word}/"));
    }
    out
}

// Decides what, if anything, a hit adds to the frontier.
pub fn follow_up(ctx: &RunContext, job: &Job, response: &HttpResponse) -> Option<FrontierMessage> {
    if job.url.path().ends_with('/') {
        return Some(FrontierMessage::Root {
            url: job.url.clone(),
            depth: job.depth + 1,
        });
    }
    if !response.is_redirect() {
        return None;
    }

    let location = response.header("location")?;
    let mut target = job.url.join(location.trim()).ok()?;
    target.set_fragment(None);
    if !ctx.hosts.contains(&target) {
        debug!(from = %job.url, to = %target, "ignoring off-host redirect");
        return None;
    }
    if target.path().ends_with('/') {
        target.set_query(None);
        return Some(FrontierMessage::Root {
            url: target,
            depth: job.depth + 1,
        });
    }
    if ctx.config.no_spider {
        return None;
    }
    Some(FrontierMessage::Probe {
        url: target,
        depth: job.depth,
    })
}

pub struct RecursionManager {
    ctx: Arc<RunContext>,
    jobs: mpsc::Sender<Tracked<Job>>,
    frontier: FrontierReceiver,
    registry: ProgressRegistry,
}

impl RecursionManager {
    pub(crate) fn new(
        ctx: Arc<RunContext>,
        jobs: mpsc::Sender<Tracked<Job>>,
        frontier: FrontierReceiver,
        registry: ProgressRegistry,
    ) -> Self {
        Self {
            ctx,
            jobs,
            frontier,
            registry,
        }
    }

    pub async fn run(mut self) {
        while let Some(message) = self.frontier.recv().await {
            // the message's unit is held until every job it produced is queued
            let (message, unit) = message.into_parts();
            match message {
                FrontierMessage::Root { url, depth } => self.enumerate(url, depth).await,
                FrontierMessage::Probe { url, depth } => self.probe(url, depth).await,
            }
            drop(unit);
        }
    }

    async fn enumerate(&self, dir: Url, depth: usize) {
        let config = &self.ctx.config;
        if depth > 0 {
            if let Some(max) = config.max_depth {
                if depth > max {
                    debug!(%dir, depth, "dropping root beyond max depth");
                    return;
                }
            }
        }
        if self.ctx.blacklist.blocks(&dir) {
            RunStats::bump(&self.ctx.stats.blacklisted);
            debug!(%dir, "not recursing into blacklisted directory");
            return;
        }
        if !self.ctx.accept_root(&dir) {
            return;
        }
        RunStats::bump(&self.ctx.stats.roots);

        let mut candidates: Vec<(Url, String)> = Vec::new();
        for word in self.ctx.wordlist.iter() {
            for variant in seed_variants(word, config) {
                match Url::parse(&format!("{dir}{variant}")) {
                    Ok(url) => candidates.push((url, word.trim().to_string())),
                    Err(e) => debug!(%dir, word = %variant, "skipping word: {e}"),
                }
            }
        }

        let total = candidates.len() * config.methods.len();
        let progress = Arc::new(RootProgress::new(dir.clone(), total));
        if let Ok(mut registry) = self.registry.lock() {
            registry.push(Arc::clone(&progress));
        }
        self.ctx
            .log(
                LogLevel::Info,
                format!("enumerating {dir} ({total} requests, depth {depth})"),
            )
            .await;
        if total == 0 {
            return;
        }

        for ((url, word), method) in iproduct!(candidates.into_iter(), config.methods.iter()) {
            let job = Job {
                url: url.clone(),
                method: method.clone(),
                directory: dir.clone(),
                word: word.clone(),
                depth,
                progress: Some(Arc::clone(&progress)),
            };
            if !self.dispatch(job).await {
                return;
            }
        }
    }

    async fn probe(&self, url: Url, depth: usize) {
        if !self.ctx.accept_probe(&url) {
            return;
        }
        let directory = utils::parent_directory(&url);
        let word = utils::last_segment(&url).to_string();
        debug!(%url, "probing redirect target");
        for method in self.ctx.config.methods.iter() {
            let job = Job {
                url: url.clone(),
                method: method.clone(),
                directory: directory.clone(),
                word: word.clone(),
                depth,
                progress: None,
            };
            if !self.dispatch(job).await {
                return;
            }
        }
    }

    async fn dispatch(&self, job: Job) -> bool {
        let job = Tracked::new(job, self.ctx.work.claim());
        self.jobs.send(job).await.is_ok()
    }
}
