use std::sync::{Arc, Mutex};
use std::time::Duration;

use reqwest::Url;
use serde::Serialize;
use thiserror::Error;
use tokio::fs::File;
use tokio::io::AsyncBufReadExt;
use tokio::io::BufReader;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::debug;

use crate::bruteforcer::Executor;
use crate::config::{Config, ConfigError};
use crate::pool::{self, JobReceiver, JobSender, WorkerPool};
use crate::recursion::{DirState, FrontierMessage, ProgressRegistry, RecursionManager};
use crate::state::{
    Blacklist, FrontierReceiver, LogReceiver, ResultReceiver, RunContext, RunStatsSnapshot,
};
use crate::transport::{Transport, TransportError};
use crate::utils;

#[derive(Clone, Debug)]
pub enum WordlistSource {
    FilePath(String),
    Inline(Vec<String>),
}

#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("invalid target '{url}': {message}")]
    InvalidTarget { url: String, message: String },

    #[error("runner already started")]
    AlreadyStarted,

    #[error("wordlist is empty")]
    EmptyWordlist,

    #[error("failed to open file for {kind}: {path}: {source}")]
    FileOpen {
        kind: &'static str,
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read lines for {kind}: {path}: {source}")]
    FileRead {
        kind: &'static str,
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

#[derive(Clone, Debug, Serialize)]
pub struct RunSummary {
    pub stats: RunStatsSnapshot,
    pub frontier: Vec<String>,
    pub elapsed: Duration,
}

pub struct Runner {
    ctx: Arc<RunContext>,
    executor: Arc<Executor>,
    pool_size: usize,
    results: Option<ResultReceiver>,
    logs: Option<LogReceiver>,
    frontier: Option<FrontierReceiver>,
    jobs: Option<(JobSender, JobReceiver)>,
    registry: ProgressRegistry,
    tasks: Vec<JoinHandle<()>>,
    pool: Option<WorkerPool>,
    started_at: Option<Instant>,
}

impl Runner {
    pub fn new(
        config: Config,
        wordlist: Vec<String>,
        blacklist: Blacklist,
        transport: Arc<dyn Transport>,
    ) -> Self {
        let config = Arc::new(config);
        let pool_size = config.threads;
        let jobs = pool::job_queue(config.queue_capacity);
        let (ctx, receivers) = RunContext::new(config, wordlist, blacklist);
        let executor = Arc::new(Executor::new(Arc::clone(&ctx), transport));
        Self {
            ctx,
            executor,
            pool_size,
            results: Some(receivers.results),
            logs: Some(receivers.logs),
            frontier: Some(receivers.frontier),
            jobs: Some(jobs),
            registry: Arc::new(Mutex::new(Vec::new())),
            tasks: Vec::new(),
            pool: None,
            started_at: None,
        }
    }

    pub fn with_pool_size(mut self, size: usize) -> Self {
        self.pool_size = size.max(1);
        self
    }

    pub fn config(&self) -> &Config {
        &self.ctx.config
    }

    pub fn canary(&self) -> &str {
        self.executor.detector().token()
    }

    // must be taken before `start`, untaken results are discarded
    pub fn take_results(&mut self) -> Option<ResultReceiver> {
        self.results.take()
    }

    pub fn take_logs(&mut self) -> Option<LogReceiver> {
        self.logs.take()
    }

    // returns as soon as dispatch has begun
    pub fn start(&mut self, target: &str) -> Result<(), RunnerError> {
        if self.started_at.is_some() {
            return Err(RunnerError::AlreadyStarted);
        }
        let url = utils::normalize_target(target, self.ctx.config.https).map_err(|message| {
            RunnerError::InvalidTarget {
                url: target.to_string(),
                message,
            }
        })?;
        let (Some(frontier), Some((jobs_tx, jobs_rx))) = (self.frontier.take(), self.jobs.take())
        else {
            return Err(RunnerError::AlreadyStarted);
        };
        self.ctx.hosts.add(&url);
        self.started_at = Some(Instant::now());

        // the root's unit is claimed before any task that could release work exists
        self.ctx.submit(FrontierMessage::Root { url, depth: 0 });

        if let Some(mut results) = self.results.take() {
            self.tasks.push(tokio::spawn(async move {
                while results.recv().await.is_some() {}
            }));
        }
        if let Some(mut logs) = self.logs.take() {
            self.tasks.push(tokio::spawn(async move {
                while logs.recv().await.is_some() {}
            }));
        }

        let manager = RecursionManager::new(
            Arc::clone(&self.ctx),
            jobs_tx,
            frontier,
            Arc::clone(&self.registry),
        );
        self.tasks.push(tokio::spawn(manager.run()));
        self.pool = Some(WorkerPool::spawn(
            self.pool_size,
            Arc::clone(&self.executor),
            jobs_rx,
        ));
        debug!(workers = self.pool_size, "runner started");
        Ok(())
    }

    pub async fn wait(&self) {
        self.ctx.work.wait().await;
    }

    pub fn outstanding(&self) -> usize {
        self.ctx.work.outstanding()
    }

    pub fn stats(&self) -> RunStatsSnapshot {
        self.ctx.stats.snapshot()
    }

    pub fn frontier(&self) -> Vec<String> {
        self.ctx.frontier()
    }

    pub fn roots(&self) -> Vec<(Url, DirState)> {
        match self.registry.lock() {
            Ok(registry) => registry
                .iter()
                .map(|p| (p.dir().clone(), p.state()))
                .collect(),
            Err(_) => Vec::new(),
        }
    }

    pub async fn finish(mut self) -> RunSummary {
        if self.started_at.is_some() {
            self.wait().await;
        }
        let summary = RunSummary {
            stats: self.stats(),
            frontier: self.frontier(),
            elapsed: self
                .started_at
                .map(|t| t.elapsed())
                .unwrap_or_default(),
        };

        if let Some(pool) = self.pool.take() {
            pool.abort();
            pool.join().await;
        }
        for task in self.tasks.drain(..) {
            task.abort();
            let _ = task.await;
        }
        summary
    }
}

async fn read_lines(kind: &'static str, path: &str) -> Result<Vec<String>, RunnerError> {
    let path = crate::config::expand_tilde_string(path);
    let handle = File::open(&path).await.map_err(|e| RunnerError::FileOpen {
        kind,
        path: path.clone(),
        source: e,
    })?;
    let mut out = Vec::new();
    let mut lines = BufReader::new(handle).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                let line = line.trim();
                if line.is_empty() || line.starts_with('#') {
                    continue;
                }
                out.push(line.to_string());
            }
            Ok(None) => break,
            Err(e) => {
                return Err(RunnerError::FileRead {
                    kind,
                    path,
                    source: e,
                })
            }
        }
    }
    Ok(out)
}

pub async fn load_wordlist(source: &WordlistSource) -> Result<Vec<String>, RunnerError> {
    let words = match source {
        WordlistSource::Inline(values) => values
            .iter()
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .map(|s| s.to_string())
            .collect(),
        WordlistSource::FilePath(path) => read_lines("wordlist", path).await?,
    };
    if words.is_empty() {
        return Err(RunnerError::EmptyWordlist);
    }
    Ok(words)
}

pub async fn load_blacklist(path: Option<&str>) -> Result<Blacklist, RunnerError> {
    match path {
        Some(path) => Ok(Blacklist::from_lines(read_lines("blacklist", path).await?)),
        None => Ok(Blacklist::new()),
    }
}
