use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Method, Url};

use crate::config::{Config, Options};
use crate::detector::{NoiseReason, Verdict};
use crate::recursion::DirState;
use crate::runner::{RunSummary, Runner, RunnerError};
use crate::state::{Blacklist, ConfirmedResult, LogEvent};
use crate::transport::{HttpRequest, HttpResponse, Transport, TransportError};

const BASE: &str = "http://localhost:2001/";

const NOT_FOUND_BODY: &str = "<html><head><title>404 Not Found</title></head><body>\
<h1>Not Found</h1><p>The requested URL was not found on this server. If you entered the \
URL manually please check your spelling and try again.</p><p>Additionally, a 404 Not Found \
error was encountered while trying to use an ErrorDocument to handle the request.</p>\
<hr><address>TestServer at localhost Port 2001</address></body></html>";

const CANARY_BODY: &str = "<html><head><title>Welcome</title></head><body><h2>Welcome!</h2>\
<p>Every page on this site is a friendly landing page, whatever you ask for. Browse around \
and enjoy the content we have prepared.</p><ul><li>home</li><li>about</li><li>contact</li>\
</ul></body></html>";

const WORDS: [&str; 8] = ["a", "b", "c", "d", "e", "x", "y", "z"];

fn similar_not_found() -> String {
    NOT_FOUND_BODY.replace("on this server", "on this host")
}

fn similar_canary() -> String {
    CANARY_BODY.replace("friendly", "friendy")
}

fn page(path: &str) -> String {
    format!("<html><head><title>{path}</title></head><body>content of {path}</body></html>")
}

fn respond(status: u16, body: String) -> HttpResponse {
    HttpResponse {
        status,
        headers: HashMap::from([("content-type".to_string(), "text/html".to_string())]),
        length: body.len(),
        body,
    }
}

fn redirect(status: u16, location: &str) -> HttpResponse {
    let mut resp = respond(status, NOT_FOUND_BODY.to_string());
    resp.headers
        .insert("location".to_string(), location.to_string());
    resp
}

// Route table of the test web server.
fn route(req: &HttpRequest) -> HttpResponse {
    let path = req.url.path();
    let segment = path.trim_end_matches('/').rsplit('/').next().unwrap_or("");
    let ajax = req.header("x-requested-with") == Some("XMLHttpRequest");
    let is = |m: Method| req.method == m;

    if segment == "canarystringvalue" {
        return respond(200, CANARY_BODY.to_string());
    }
    if segment == "canarysimilar" {
        return respond(200, similar_canary());
    }

    match path {
        "/" | "/a" | "/a/" | "/a/b" | "/a/b/" | "/a/b/c" | "/b/" => respond(200, page(path)),
        "/a/x" => respond(200, NOT_FOUND_BODY.to_string()),
        "/a/y" => respond(200, similar_not_found()),
        "/a/b/c/" => respond(401, page(path)),
        "/a/b/c/d" => respond(403, page(path)),
        "/b" => redirect(302, "/a/"),
        "/b/c" => redirect(301, "/a/b"),
        "/b/c/" => redirect(302, "http://localhost:2001/a/b/c"),
        "/c" | "/c/" | "/c/d" => respond(500, page(path)),
        "/appendslash/" | "/a.csv" | "/a.exe" | "/a.aspx" => respond(200, page(path)),
        "/getonly" if is(Method::GET) => respond(200, page(path)),
        "/headonly" if is(Method::HEAD) => respond(200, page(path)),
        "/ajaxonly" if ajax => respond(200, page(path)),
        "/ajaxpost" if ajax && is(Method::POST) => respond(200, page(path)),
        "/onlynoajax" if !ajax => respond(200, page(path)),
        "/cookiesonly" if req.header("cookie").map_or(false, |c| c.contains("lol=ok")) => {
            respond(200, page(path))
        }
        "/customheaderonly" if req.header("x-att-deviceid") == Some("XXXXX") => {
            respond(200, page(path))
        }
        "/onlynocustomheader" if req.header("x-att-deviceid").is_none() => {
            respond(200, page(path))
        }
        "/badheader" => {
            let mut resp = respond(200, page(path));
            resp.headers
                .insert("x-bad-header".to_string(), "test123".to_string());
            resp
        }
        "/badcode" => respond(500, page(path)),
        "/postbody" if is(Method::POST) && req.body.as_deref() == Some("test=bodycontent") => {
            respond(200, page(path))
        }
        "/a/b/c/basicauth" if req.header("authorization") == Some("Basic dGVzdDp0ZXN0") => {
            respond(200, page(path))
        }
        p if p.starts_with("/a/") => respond(200, NOT_FOUND_BODY.to_string()),
        _ => respond(404, NOT_FOUND_BODY.to_string()),
    }
}

#[derive(Default)]
struct TestServer {
    requests: Mutex<Vec<(Method, String)>>,
    refuse: HashSet<String>,
}

impl TestServer {
    fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn refusing(paths: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            refuse: paths.iter().map(|p| p.to_string()).collect(),
            ..Default::default()
        })
    }

    fn count(&self, method: &Method, path: &str) -> usize {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|(m, p)| m == method && p == path)
            .count()
    }

    fn paths(&self) -> Vec<String> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .map(|(_, p)| p.clone())
            .collect()
    }
}

#[async_trait]
impl Transport for TestServer {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let path = request.url.path().to_string();
        self.requests
            .lock()
            .unwrap()
            .push((request.method.clone(), path.clone()));
        tokio::task::yield_now().await;
        if self.refuse.contains(&path) {
            return Err(TransportError::Unreachable {
                url: request.url.to_string(),
                message: "connection refused".to_string(),
            });
        }
        let mut resp = route(&request);
        if request.method == Method::HEAD {
            resp.body.clear();
            resp.length = 0;
        }
        Ok(resp)
    }
}

fn options() -> Options {
    Options {
        url: BASE.to_string(),
        methods: "GET".to_string(),
        threads: 1,
        ..Default::default()
    }
}

struct Scan {
    options: Options,
    extra_words: Vec<&'static str>,
    blacklist: Blacklist,
    pool: usize,
    server: Arc<TestServer>,
}

impl Scan {
    fn new(options: Options) -> Self {
        Self {
            options,
            extra_words: Vec::new(),
            blacklist: Blacklist::new(),
            pool: 1,
            server: TestServer::new(),
        }
    }

    fn words(mut self, words: &[&'static str]) -> Self {
        self.extra_words.extend_from_slice(words);
        self
    }

    fn blacklist(mut self, urls: &[&str]) -> Self {
        self.blacklist = Blacklist::from_lines(urls.iter());
        self
    }

    fn pool(mut self, size: usize) -> Self {
        self.pool = size;
        self
    }

    fn server(mut self, server: Arc<TestServer>) -> Self {
        self.server = server;
        self
    }

    async fn run(self) -> Outcome {
        let config = Config::from_options(&self.options).unwrap();
        let words: Vec<String> = WORDS
            .iter()
            .chain(self.extra_words.iter())
            .map(|w| w.to_string())
            .collect();
        let mut runner = Runner::new(config, words, self.blacklist, self.server.clone())
            .with_pool_size(self.pool);
        let mut results = runner.take_results().unwrap();
        let mut logs = runner.take_logs().unwrap();
        let results_task = tokio::spawn(async move {
            let mut out = Vec::new();
            while let Some(result) = results.recv().await {
                out.push(result.into_inner());
            }
            out
        });
        let logs_task = tokio::spawn(async move {
            let mut out = Vec::new();
            while let Some(event) = logs.recv().await {
                out.push(event.into_inner());
            }
            out
        });

        runner.start(BASE).unwrap();
        tokio::time::timeout(Duration::from_secs(10), runner.wait())
            .await
            .expect("run did not drain");
        let roots = runner.roots();
        let canary = runner.canary().to_string();
        let summary = runner.finish().await;

        Outcome {
            results: results_task.await.unwrap(),
            logs: logs_task.await.unwrap(),
            summary,
            roots,
            canary,
            server: self.server,
        }
    }
}

struct Outcome {
    results: Vec<ConfirmedResult>,
    logs: Vec<LogEvent>,
    summary: RunSummary,
    roots: Vec<(Url, DirState)>,
    canary: String,
    server: Arc<TestServer>,
}

impl Outcome {
    fn hits(&self) -> HashSet<String> {
        self.results
            .iter()
            .filter(|r| r.verdict.is_hit())
            .map(|r| r.url.path().to_string())
            .collect()
    }

    fn found(&self, path: &str) -> bool {
        self.hits().contains(path)
    }

    fn reported(&self, path: &str) -> Vec<&ConfirmedResult> {
        self.results.iter().filter(|r| r.url.path() == path).collect()
    }
}

const BASIC_HITS: [&str; 11] = [
    "/a", "/a/b", "/a/b/c", "/a/", "/b", "/b/c", "/a/b/c/", "/a/b/c/d", "/c", "/c/", "/c/d",
];

fn assert_basic(outcome: &Outcome) {
    for path in BASIC_HITS {
        assert!(outcome.found(path), "did not find {path}");
    }
    for path in outcome.hits() {
        assert!(!path.contains('z'), "found (but should not have) {path}");
    }
    assert!(!outcome.found("/a/x"), "soft-404 /a/x reported");
    assert!(!outcome.found("/a/y"), "near-identical soft-404 /a/y reported");
    assert!(!outcome.found("/x"));
}

#[tokio::test]
async fn basic_functionality() {
    let outcome = Scan::new(options()).run().await;
    assert_basic(&outcome);
    assert_eq!(outcome.summary.stats.transport_errors, 0);
    assert!(outcome
        .summary
        .frontier
        .contains(&"http://localhost:2001/a/b/c/".to_string()));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn basic_functionality_with_many_workers() {
    let outcome = Scan::new(options()).pool(8).run().await;
    assert_basic(&outcome);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn tiny_job_queue_still_drains() {
    let outcome = Scan::new(Options {
        queue_capacity: 1,
        ..options()
    })
    .pool(2)
    .run()
    .await;
    assert_basic(&outcome);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn baseline_is_computed_once_per_directory() {
    let outcome = Scan::new(options()).pool(8).run().await;
    let canary = outcome.canary.clone();
    let mut per_dir: HashMap<String, usize> = HashMap::new();
    for path in outcome.server.paths() {
        if let Some(dir) = path.strip_suffix(canary.as_str()) {
            *per_dir.entry(dir.to_string()).or_default() += 1;
        }
    }
    assert_eq!(per_dir.len(), outcome.summary.frontier.len());
    assert!(per_dir.values().all(|n| *n == 1), "{per_dir:?}");
    assert_eq!(
        outcome.summary.stats.baselines as usize,
        outcome.summary.frontier.len()
    );
}

#[tokio::test]
async fn append_slash() {
    let outcome = Scan::new(options()).words(&["appendslash"]).run().await;
    assert!(outcome.found("/appendslash/"));
    assert!(!outcome.found("/appendslash"));
}

#[tokio::test]
async fn basic_auth() {
    let outcome = Scan::new(Options {
        auth: "dGVzdDp0ZXN0".to_string(),
        ..options()
    })
    .words(&["basicauth"])
    .run()
    .await;
    assert!(outcome.found("/a/b/c/basicauth"));
}

#[tokio::test]
async fn bad_codes() {
    let outcome = Scan::new(Options {
        bad_responses: "404,500".to_string(),
        ..options()
    })
    .words(&["badcode"])
    .run()
    .await;
    assert!(outcome.hits().iter().all(|p| !p.contains("badcode")));
    assert!(!outcome.found("/c"));
}

#[tokio::test]
async fn bad_headers() {
    let outcome = Scan::new(Options {
        bad_headers: vec!["X-Bad-Header: test123".to_string()],
        ..options()
    })
    .words(&["badheader"])
    .run()
    .await;
    assert!(outcome.hits().iter().all(|p| !p.contains("badheader")));
    assert!(outcome.found("/a"));
}

#[tokio::test]
async fn ajax() {
    let outcome = Scan::new(Options {
        ajax: true,
        methods: "GET,POST".to_string(),
        ..options()
    })
    .words(&["ajaxonly", "onlynoajax", "ajaxpost"])
    .run()
    .await;
    assert!(outcome.found("/ajaxonly"));
    assert!(outcome.found("/ajaxpost"));
    assert!(!outcome.found("/onlynoajax"));
}

#[tokio::test]
async fn body_content() {
    let outcome = Scan::new(Options {
        methods: "GET,POST".to_string(),
        no_head: true,
        body_content: Some("test=bodycontent".to_string()),
        ..options()
    })
    .words(&["postbody"])
    .run()
    .await;
    assert!(outcome.found("/postbody"));
    assert_eq!(outcome.reported("/postbody")[0].method, Method::POST);
}

#[tokio::test]
async fn blacklist() {
    // spidering off, otherwise /b/c/ redirects straight to /a/b/c
    let outcome = Scan::new(Options {
        no_spider: true,
        ..options()
    })
    .blacklist(&["http://localhost:2001/a/b"])
    .run()
    .await;
    assert!(!outcome.found("/a/b"));
    assert!(!outcome.found("/a/b/"));
    assert!(!outcome.found("/a/b/c"));
    assert_eq!(outcome.server.count(&Method::GET, "/a/b"), 0);
    assert!(outcome.found("/a"));
    assert!(outcome.summary.stats.blacklisted > 0);
}

#[tokio::test]
async fn cookies() {
    let outcome = Scan::new(Options {
        cookies: "lol=ok; cookie2=test;".to_string(),
        ..options()
    })
    .words(&["cookiesonly"])
    .run()
    .await;
    assert!(outcome.found("/cookiesonly"));
}

#[tokio::test]
async fn extensions() {
    let outcome = Scan::new(Options {
        extensions: "csv,exe,aspx".to_string(),
        ..options()
    })
    .run()
    .await;
    for path in ["/a", "/a.csv", "/a.exe", "/a.aspx"] {
        assert!(outcome.found(path), "did not find {path}");
    }
}

#[tokio::test]
async fn show_all_reports_noise_without_recursing_into_it() {
    let outcome = Scan::new(Options {
        show_all: true,
        ..options()
    })
    .run()
    .await;
    let x = outcome.reported("/x");
    assert_eq!(x.len(), 1);
    assert_eq!(x[0].status, 404);
    assert_eq!(x[0].verdict, Verdict::Noise(NoiseReason::BadStatus(404)));
    assert!(outcome.reported("/a/x/c").is_empty());
    assert!(!outcome.found("/a/x"));
    // canary probes are never reported
    assert!(outcome
        .results
        .iter()
        .all(|r| !r.url.path().contains(outcome.canary.as_str())));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn words_from_the_soft_page_are_not_hits() {
    // each of these occurs in the catch-all page served under /a/
    let words = ["found", "request", "html", "server", "title"];
    let outcome = Scan::new(options()).words(&words).pool(4).run().await;
    assert_basic(&outcome);
    for word in words {
        for path in [format!("/a/{word}"), format!("/a/{word}/"), format!("/a/b/{word}")] {
            assert!(!outcome.found(&path), "soft-404 {path} reported");
        }
    }
}

#[tokio::test]
async fn fixed_canary() {
    // every path under /a/ stands out against the canary page, so cap the depth
    let outcome = Scan::new(Options {
        canary: Some("canarystringvalue".to_string()),
        max_depth: Some(1),
        ..options()
    })
    .words(&["canarystringvalue", "canarysimilar"])
    .run()
    .await;
    assert!(!outcome.found("/canarystringvalue"));
    assert!(!outcome.found("/canarysimilar"));
    // under /a/ the baseline is the canary page, so the old soft-404s stand out
    assert!(outcome.found("/a/x"));
    assert!(outcome.found("/a/y"));
}

#[tokio::test]
async fn custom_headers() {
    let outcome = Scan::new(Options {
        headers: vec!["X-ATT-DeviceId:XXXXX".to_string()],
        ..options()
    })
    .words(&["customheaderonly", "onlynocustomheader"])
    .run()
    .await;
    assert!(outcome.found("/customheaderonly"));
    assert!(!outcome.found("/onlynocustomheader"));
}

#[tokio::test]
async fn no_get() {
    let outcome = Scan::new(Options {
        methods: "GET,HEAD".to_string(),
        no_get: true,
        ..options()
    })
    .words(&["getonly", "headonly"])
    .run()
    .await;
    assert!(outcome.found("/headonly"));
    assert!(!outcome.found("/getonly"));
    assert_eq!(outcome.server.count(&Method::GET, "/getonly"), 0);
}

#[tokio::test]
async fn no_head() {
    let outcome = Scan::new(Options {
        methods: "GET,HEAD".to_string(),
        no_head: true,
        ..options()
    })
    .words(&["getonly", "headonly"])
    .run()
    .await;
    assert!(!outcome.found("/headonly"));
    assert!(outcome.found("/getonly"));
}

#[tokio::test]
async fn no_recursion() {
    let outcome = Scan::new(Options {
        no_recursion: true,
        ..options()
    })
    .run()
    .await;
    assert!(!outcome.found("/a/b"));
    assert!(outcome.found("/a/"));
    assert_eq!(outcome.summary.frontier, vec![BASE.to_string()]);
}

#[tokio::test]
async fn hits_are_reported_once_across_methods() {
    let outcome = Scan::new(Options {
        methods: "GET,HEAD".to_string(),
        ..options()
    })
    .run()
    .await;
    assert!(outcome.found("/a"));
    assert_eq!(outcome.reported("/a").len(), 1);
    assert!(outcome.server.count(&Method::HEAD, "/a") >= 1);
}

#[tokio::test]
async fn max_depth_caps_recursion() {
    let outcome = Scan::new(Options {
        max_depth: Some(1),
        ..options()
    })
    .run()
    .await;
    assert!(outcome.found("/a/b"));
    assert!(outcome.found("/a/b/"));
    assert_eq!(outcome.server.count(&Method::GET, "/a/b/a"), 0);
    assert_eq!(outcome.server.count(&Method::GET, "/a/b/c/d"), 0);
    assert!(!outcome
        .summary
        .frontier
        .contains(&"http://localhost:2001/a/b/".to_string()));
}

#[tokio::test]
async fn redirect_targets_are_probed_unless_spidering_is_off() {
    let outcome = Scan::new(options()).run().await;
    // once as a word under /a/, once as the target of /b/c
    assert_eq!(outcome.server.count(&Method::GET, "/a/b"), 2);

    let outcome = Scan::new(Options {
        no_spider: true,
        ..options()
    })
    .run()
    .await;
    assert_eq!(outcome.server.count(&Method::GET, "/a/b"), 1);
    assert!(outcome.found("/b/c"));
}

#[tokio::test]
async fn transport_failures_stay_local() {
    let server = TestServer::refusing(&["/e", "/canarystringvalue"]);
    let outcome = Scan::new(Options {
        canary: Some("canarystringvalue".to_string()),
        max_depth: Some(1),
        ..options()
    })
    .server(server)
    .run()
    .await;
    assert!(!outcome.found("/e"));
    // the root baseline failed, so the root is enumerated without soft-404 filtering
    assert!(outcome.found("/a"));
    assert!(outcome.found("/b"));
    assert!(!outcome.found("/x"));
    assert!(outcome.summary.stats.transport_errors >= 2);
}

#[tokio::test]
async fn roots_complete_and_are_announced() {
    let outcome = Scan::new(options()).run().await;
    assert!(!outcome.roots.is_empty());
    assert!(outcome
        .roots
        .iter()
        .all(|(_, state)| *state == DirState::Complete));
    assert!(outcome
        .logs
        .iter()
        .any(|e| e.message.contains("finished enumerating http://localhost:2001/a/")));
    assert_eq!(
        outcome.summary.stats.roots as usize,
        outcome.summary.frontier.len()
    );
}

#[tokio::test]
async fn runner_rejects_bad_targets_and_double_starts() {
    let config = Config::from_options(&options()).unwrap();
    let mut runner = Runner::new(
        config,
        vec!["a".to_string()],
        Blacklist::new(),
        TestServer::new(),
    );
    assert!(matches!(
        runner.start("ftp://localhost/"),
        Err(RunnerError::InvalidTarget { .. })
    ));
    runner.start("localhost:2001").unwrap();
    assert!(matches!(
        runner.start(BASE),
        Err(RunnerError::AlreadyStarted)
    ));
    let summary = runner.finish().await;
    assert_eq!(summary.frontier[0], BASE);
    assert!(summary.stats.hits >= 1);
}
