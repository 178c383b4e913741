use std::collections::{HashMap, HashSet};
use std::fmt;
use std::ops::Deref;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use reqwest::{Method, Url};
use serde::Serialize;
use tokio::sync::{mpsc, Notify};

use crate::config::Config;
use crate::detector::Verdict;
use crate::recursion::FrontierMessage;

#[derive(Debug, Default)]
pub struct WorkCounter {
    outstanding: AtomicUsize,
    zero: Notify,
}

impl WorkCounter {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    // released when the returned guard drops
    pub fn claim(self: &Arc<Self>) -> WorkUnit {
        self.outstanding.fetch_add(1, Ordering::SeqCst);
        WorkUnit {
            counter: Arc::clone(self),
        }
    }

    pub fn outstanding(&self) -> usize {
        self.outstanding.load(Ordering::SeqCst)
    }

    fn release(&self) {
        let previous = self.outstanding.fetch_sub(1, Ordering::SeqCst);
        debug_assert!(previous > 0, "work counter released more often than claimed");
        if previous == 1 {
            self.zero.notify_waiters();
        }
    }

    pub async fn wait(&self) {
        loop {
            let notified = self.zero.notified();
            tokio::pin!(notified);
            // register before checking so a release in between is not missed
            notified.as_mut().enable();
            if self.outstanding() == 0 {
                return;
            }
            notified.await;
        }
    }
}

#[derive(Debug)]
pub struct WorkUnit {
    counter: Arc<WorkCounter>,
}

impl Drop for WorkUnit {
    fn drop(&mut self) {
        self.counter.release();
    }
}

// A channel item that holds one unit of work until it is consumed.
#[derive(Debug)]
pub struct Tracked<T> {
    item: T,
    unit: WorkUnit,
}

impl<T> Tracked<T> {
    pub fn new(item: T, unit: WorkUnit) -> Self {
        Self { item, unit }
    }

    pub fn into_inner(self) -> T {
        let Tracked { item, unit } = self;
        drop(unit);
        item
    }

    // for consumers that must hold the unit until follow-up work is claimed
    pub fn into_parts(self) -> (T, WorkUnit) {
        (self.item, self.unit)
    }
}

impl<T> Deref for Tracked<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.item
    }
}

#[derive(Clone, Debug, Default)]
pub struct Blacklist {
    urls: HashSet<String>,
}

fn blacklist_key(url: &str) -> String {
    let normalized = Url::parse(url.trim())
        .map(|u| u.to_string())
        .unwrap_or_else(|_| url.trim().to_string());
    normalized.trim_end_matches('/').to_string()
}

impl Blacklist {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_lines<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut out = Self::new();
        for line in lines {
            out.insert(line.as_ref());
        }
        out
    }

    pub fn insert(&mut self, url: &str) {
        if url.trim().is_empty() {
            return;
        }
        self.urls.insert(blacklist_key(url));
    }

    pub fn blocks(&self, url: &Url) -> bool {
        !self.urls.is_empty() && self.urls.contains(&blacklist_key(url.as_str()))
    }

    pub fn len(&self) -> usize {
        self.urls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.urls.is_empty()
    }
}

// Scheme plus authority, e.g. `http://example.com:2001`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Host {
    scheme: String,
    authority: String,
}

impl Host {
    pub fn from_url(url: &Url) -> Option<Self> {
        let host = url.host_str()?;
        let authority = match url.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        };
        Some(Self {
            scheme: url.scheme().to_string(),
            authority,
        })
    }
}

impl fmt::Display for Host {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}", self.scheme, self.authority)
    }
}

#[derive(Debug, Default)]
pub struct Hosts {
    known: Mutex<HashSet<Host>>,
}

impl Hosts {
    pub fn add(&self, url: &Url) -> Option<Host> {
        let host = Host::from_url(url)?;
        if let Ok(mut known) = self.known.lock() {
            known.insert(host.clone());
        }
        Some(host)
    }

    pub fn contains(&self, url: &Url) -> bool {
        let Some(host) = Host::from_url(url) else {
            return false;
        };
        self.known
            .lock()
            .map(|known| known.contains(&host))
            .unwrap_or(false)
    }
}

#[derive(Debug, Default)]
pub struct RunStats {
    pub requests: AtomicU64,
    pub transport_errors: AtomicU64,
    pub hits: AtomicU64,
    pub noise: AtomicU64,
    pub blacklisted: AtomicU64,
    pub baselines: AtomicU64,
    pub roots: AtomicU64,
    pub jobs: AtomicU64,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct RunStatsSnapshot {
    pub requests: u64,
    pub transport_errors: u64,
    pub hits: u64,
    pub noise: u64,
    pub blacklisted: u64,
    pub baselines: u64,
    pub roots: u64,
    pub jobs: u64,
}

impl RunStats {
    pub fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> RunStatsSnapshot {
        RunStatsSnapshot {
            requests: self.requests.load(Ordering::Relaxed),
            transport_errors: self.transport_errors.load(Ordering::Relaxed),
            hits: self.hits.load(Ordering::Relaxed),
            noise: self.noise.load(Ordering::Relaxed),
            blacklisted: self.blacklisted.load(Ordering::Relaxed),
            baselines: self.baselines.load(Ordering::Relaxed),
            roots: self.roots.load(Ordering::Relaxed),
            jobs: self.jobs.load(Ordering::Relaxed),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn tag(&self) -> &'static str {
        match self {
            LogLevel::Debug => "DBG",
            LogLevel::Info => "INF",
            LogLevel::Warn => "WRN",
            LogLevel::Error => "ERR",
        }
    }
}

#[derive(Clone, Debug)]
pub struct LogEvent {
    pub level: LogLevel,
    pub message: String,
}

#[derive(Clone, Debug)]
pub struct ConfirmedResult {
    pub url: Url,
    pub method: Method,
    pub status: u16,
    pub length: usize,
    pub headers: HashMap<String, String>,
    pub title: String,
    pub depth: usize,
    pub verdict: Verdict,
}

pub type ResultReceiver = mpsc::Receiver<Tracked<ConfirmedResult>>;
pub type LogReceiver = mpsc::Receiver<Tracked<LogEvent>>;
pub(crate) type FrontierReceiver = mpsc::UnboundedReceiver<Tracked<FrontierMessage>>;

pub(crate) struct Receivers {
    pub(crate) results: ResultReceiver,
    pub(crate) logs: LogReceiver,
    pub(crate) frontier: FrontierReceiver,
}

const RESULT_CHANNEL_CAPACITY: usize = 1024;
const LOG_CHANNEL_CAPACITY: usize = 1024;

pub struct RunContext {
    pub config: Arc<Config>,
    pub wordlist: Arc<Vec<String>>,
    pub blacklist: Arc<Blacklist>,
    pub work: Arc<WorkCounter>,
    pub hosts: Hosts,
    pub stats: RunStats,
    results_tx: mpsc::Sender<Tracked<ConfirmedResult>>,
    log_tx: mpsc::Sender<Tracked<LogEvent>>,
    frontier_tx: mpsc::UnboundedSender<Tracked<FrontierMessage>>,
    roots: Mutex<HashSet<String>>,
    probed: Mutex<HashSet<String>>,
    reported: Mutex<HashSet<String>>,
}

impl fmt::Debug for RunContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunContext")
            .field("outstanding", &self.work.outstanding())
            .field("words", &self.wordlist.len())
            .field("blacklist", &self.blacklist.len())
            .finish()
    }
}

fn insert_if_absent(set: &Mutex<HashSet<String>>, key: String) -> bool {
    match set.lock() {
        Ok(mut set) => set.insert(key),
        Err(poisoned) => poisoned.into_inner().insert(key),
    }
}

impl RunContext {
    pub(crate) fn new(
        config: Arc<Config>,
        wordlist: Vec<String>,
        blacklist: Blacklist,
    ) -> (Arc<Self>, Receivers) {
        let (results_tx, results) = mpsc::channel(RESULT_CHANNEL_CAPACITY);
        let (log_tx, logs) = mpsc::channel(LOG_CHANNEL_CAPACITY);
        let (frontier_tx, frontier) = mpsc::unbounded_channel();
        let ctx = Arc::new(Self {
            config,
            wordlist: Arc::new(wordlist),
            blacklist: Arc::new(blacklist),
            work: WorkCounter::new(),
            hosts: Hosts::default(),
            stats: RunStats::default(),
            results_tx,
            log_tx,
            frontier_tx,
            roots: Mutex::new(HashSet::new()),
            probed: Mutex::new(HashSet::new()),
            reported: Mutex::new(HashSet::new()),
        });
        (
            ctx,
            Receivers {
                results,
                logs,
                frontier,
            },
        )
    }

    pub async fn log(&self, level: LogLevel, message: impl Into<String>) {
        let event = Tracked::new(
            LogEvent {
                level,
                message: message.into(),
            },
            self.work.claim(),
        );
        // a closed channel drops the event, and with it the unit
        let _ = self.log_tx.send(event).await;
    }

    pub async fn report(&self, result: ConfirmedResult) {
        let result = Tracked::new(result, self.work.claim());
        let _ = self.results_tx.send(result).await;
    }

    pub fn submit(&self, message: FrontierMessage) {
        let message = Tracked::new(message, self.work.claim());
        let _ = self.frontier_tx.send(message);
    }

    // false when the directory is already in the frontier
    pub fn accept_root(&self, dir: &Url) -> bool {
        insert_if_absent(&self.roots, dir.to_string())
    }

    pub fn accept_probe(&self, url: &Url) -> bool {
        insert_if_absent(&self.probed, url.to_string())
    }

    pub fn first_report(&self, key: String) -> bool {
        insert_if_absent(&self.reported, key)
    }

    pub fn frontier(&self) -> Vec<String> {
        let mut out: Vec<String> = match self.roots.lock() {
            Ok(roots) => roots.iter().cloned().collect(),
            Err(poisoned) => poisoned.into_inner().iter().cloned().collect(),
        };
        out.sort();
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn counter_waits_for_every_unit() {
        let counter = WorkCounter::new();
        let a = counter.claim();
        let b = counter.claim();
        assert_eq!(counter.outstanding(), 2);

        let waiter = {
            let counter = Arc::clone(&counter);
            tokio::spawn(async move { counter.wait().await })
        };
        drop(a);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());
        drop(b);
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(counter.outstanding(), 0);
    }

    #[tokio::test]
    async fn wait_returns_immediately_when_idle() {
        let counter = WorkCounter::new();
        tokio::time::timeout(Duration::from_millis(100), counter.wait())
            .await
            .unwrap();
    }

    #[test]
    fn tracked_items_release_on_consume_or_drop() {
        let counter = WorkCounter::new();
        let first = Tracked::new(1u8, counter.claim());
        let second = Tracked::new(2u8, counter.claim());
        assert_eq!(*first, 1);
        assert_eq!(first.into_inner(), 1);
        assert_eq!(counter.outstanding(), 1);
        drop(second);
        assert_eq!(counter.outstanding(), 0);
    }

    #[test]
    fn blacklist_covers_slash_forms() {
        let list = Blacklist::from_lines(["http://localhost:2008/a/b", ""]);
        assert_eq!(list.len(), 1);
        assert!(list.blocks(&Url::parse("http://localhost:2008/a/b").unwrap()));
        assert!(list.blocks(&Url::parse("http://localhost:2008/a/b/").unwrap()));
        assert!(!list.blocks(&Url::parse("http://localhost:2008/a/b/c").unwrap()));
        assert!(!list.blocks(&Url::parse("http://localhost:2008/a").unwrap()));
    }

    #[test]
    fn hosts_compare_scheme_and_authority() {
        let hosts = Hosts::default();
        let host = hosts
            .add(&Url::parse("http://example.com:2001/x/").unwrap())
            .unwrap();
        assert_eq!(host.to_string(), "http://example.com:2001");
        assert!(hosts.contains(&Url::parse("http://example.com:2001/other").unwrap()));
        assert!(!hosts.contains(&Url::parse("https://example.com:2001/").unwrap()));
        assert!(!hosts.contains(&Url::parse("http://example.com/").unwrap()));
    }

    #[tokio::test]
    async fn events_sent_to_a_dropped_receiver_do_not_leak_units() {
        let options = crate::config::Options {
            url: "http://localhost/".to_string(),
            ..Default::default()
        };
        let config = Arc::new(Config::from_options(&options).unwrap());
        let (ctx, receivers) = RunContext::new(config, Vec::new(), Blacklist::new());
        drop(receivers);
        ctx.log(LogLevel::Info, "nobody listens").await;
        assert_eq!(ctx.work.outstanding(), 0);
    }
}
