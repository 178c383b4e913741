use clap::{ArgAction, Parser};

#[derive(Parser, Debug, Clone)]
#[command(
    name = "recurbuster",
    version,
    about = "recursive web content discovery with soft-404 detection",
    long_about = "Recurbuster enumerates web content from a wordlist, tells real pages apart from wildcard \"not found\" pages with per-directory canary requests, and recurses into every directory it confirms.\n\nExamples:\n  recurbuster -u https://target.tld/ -w words.txt\n  recurbuster -u https://target.tld/ -w words.txt -e php,bak -t 20 --max-depth 3\n  recurbuster -u https://target.tld/ -w words.txt --config ~/.recurbuster/config.yml\n\nTip: Use --config to persist scan settings and keep CLI invocations short."
)]
pub struct CliArgs {
    #[arg(
        short = 'v',
        long = "vb",
        visible_alias = "verbose",
        action = ArgAction::Count,
        help_heading = "Output",
        help = "Increase verbosity (-v, -vv)."
    )]
    pub verbose: u8,

    #[arg(
        long = "nc",
        visible_alias = "no-color",
        help_heading = "Output",
        help = "Disable colored output."
    )]
    pub no_color: bool,

    #[arg(
        short = 'o',
        long = "out",
        visible_alias = "output",
        value_name = "FILE",
        help_heading = "Output",
        help = "Write findings to a file."
    )]
    pub output: Option<String>,

    #[arg(
        long = "of",
        visible_alias = "output-format",
        value_name = "FORMAT",
        help_heading = "Output",
        help = "Output file format: text or json (inferred from the file extension by default)."
    )]
    pub output_format: Option<String>,

    #[arg(
        long = "all",
        visible_alias = "show-all",
        help_heading = "Output",
        help = "Report every classified response, not only hits."
    )]
    pub show_all: bool,

    #[arg(
        short = 'u',
        long = "u",
        visible_alias = "url",
        value_name = "URL",
        help_heading = "Input",
        help = "Target URL; enumeration starts in its directory."
    )]
    pub url: Option<String>,

    #[arg(
        short = 'w',
        long = "wl",
        visible_alias = "wordlist",
        value_name = "FILE",
        help_heading = "Input",
        help = "Wordlist file (one word per line)."
    )]
    pub wordlist: Option<String>,

    #[arg(
        long = "bl",
        visible_alias = "blacklist",
        value_name = "FILE",
        help_heading = "Input",
        help = "File of absolute URLs that must never be requested."
    )]
    pub blacklist: Option<String>,

    #[arg(
        short = 'C',
        long = "cfg",
        visible_alias = "config",
        value_name = "FILE",
        help_heading = "Input",
        help = "Path to config file (defaults to ~/.recurbuster/config.yml)."
    )]
    pub config: Option<String>,

    #[arg(
        short = 'm',
        long = "mt",
        visible_alias = "methods",
        value_name = "METHODS",
        help_heading = "Requests",
        help = "Request methods, comma-separated subset of GET,HEAD,POST."
    )]
    pub methods: Option<String>,

    #[arg(
        long = "ng",
        visible_alias = "no-get",
        help_heading = "Requests",
        help = "Do not send GET requests."
    )]
    pub no_get: bool,

    #[arg(
        long = "nh",
        visible_alias = "no-head",
        help_heading = "Requests",
        help = "Do not send HEAD requests."
    )]
    pub no_head: bool,

    #[arg(
        short = 'H',
        long = "hd",
        visible_alias = "header",
        value_name = "HEADER",
        action = ArgAction::Append,
        help_heading = "Requests",
        help = "Extra request header 'Name: value' (repeatable)."
    )]
    pub headers: Vec<String>,

    #[arg(
        long = "ck",
        visible_alias = "cookies",
        value_name = "COOKIES",
        help_heading = "Requests",
        help = "Cookie header value sent with every request."
    )]
    pub cookies: Option<String>,

    #[arg(
        long = "auth",
        value_name = "TOKEN",
        help_heading = "Requests",
        help = "Basic auth token (base64 of user:pass)."
    )]
    pub auth: Option<String>,

    #[arg(
        long = "ajax",
        help_heading = "Requests",
        help = "Send X-Requested-With: XMLHttpRequest."
    )]
    pub ajax: bool,

    #[arg(
        long = "body",
        value_name = "TEMPLATE",
        help_heading = "Requests",
        help = "POST body; {word} is replaced by the candidate word."
    )]
    pub body: Option<String>,

    #[arg(
        short = 'a',
        long = "ua",
        visible_alias = "agent",
        value_name = "AGENT",
        help_heading = "Requests",
        help = "User-Agent header."
    )]
    pub agent: Option<String>,

    #[arg(
        short = 'x',
        long = "px",
        visible_alias = "proxy",
        value_name = "URL",
        help_heading = "Requests",
        help = "Proxy for all requests."
    )]
    pub proxy: Option<String>,

    #[arg(
        long = "https",
        help_heading = "Requests",
        help = "Assume https:// for targets given without a scheme."
    )]
    pub https: bool,

    #[arg(
        short = 'k',
        long = "si",
        visible_alias = "ssl-ignore",
        help_heading = "Requests",
        help = "Accept invalid TLS certificates and hostnames."
    )]
    pub ssl_ignore: bool,

    #[arg(
        long = "fr",
        visible_alias = "follow-redirects",
        help_heading = "Requests",
        help = "Follow redirects instead of classifying them."
    )]
    pub follow_redirects: bool,

    #[arg(
        long = "to",
        visible_alias = "timeout",
        value_name = "SECONDS",
        help_heading = "Requests",
        help = "Per-request timeout."
    )]
    pub timeout: Option<u64>,

    #[arg(
        short = 'e',
        long = "ext",
        visible_alias = "extensions",
        value_name = "EXTS",
        help_heading = "Discovery",
        help = "Extensions to try for every word (comma-separated)."
    )]
    pub extensions: Option<String>,

    #[arg(
        long = "nr",
        visible_alias = "no-recursion",
        help_heading = "Discovery",
        help = "Only enumerate the initial directory."
    )]
    pub no_recursion: bool,

    #[arg(
        long = "ns",
        visible_alias = "no-spider",
        help_heading = "Discovery",
        help = "Do not probe same-host redirect targets."
    )]
    pub no_spider: bool,

    #[arg(
        long = "nad",
        visible_alias = "no-append-dir",
        help_heading = "Discovery",
        help = "Do not try word/ for every word."
    )]
    pub no_append_dir: bool,

    #[arg(
        long = "md",
        visible_alias = "max-depth",
        value_name = "N",
        help_heading = "Discovery",
        help = "Maximum recursion depth (unbounded by default)."
    )]
    pub max_depth: Option<usize>,

    #[arg(
        long = "canary",
        value_name = "TOKEN",
        help_heading = "Discovery",
        help = "Fixed canary token (random per run by default)."
    )]
    pub canary: Option<String>,

    #[arg(
        long = "ratio",
        visible_alias = "ratio-404",
        value_name = "RATIO",
        help_heading = "Discovery",
        help = "Similarity at or above which a page counts as the wildcard page (default 0.95)."
    )]
    pub ratio_404: Option<f32>,

    #[arg(
        short = 'b',
        long = "bad",
        visible_alias = "bad-responses",
        value_name = "CODES",
        help_heading = "Discovery",
        help = "Status codes that are never hits (comma-separated, default 404)."
    )]
    pub bad_responses: Option<String>,

    #[arg(
        long = "bh",
        visible_alias = "bad-header",
        value_name = "HEADER",
        action = ArgAction::Append,
        help_heading = "Discovery",
        help = "'Name: value' response header that marks a page as noise (repeatable)."
    )]
    pub bad_headers: Vec<String>,

    #[arg(
        short = 't',
        long = "th",
        visible_alias = "threads",
        value_name = "N",
        help_heading = "Performance",
        help = "Number of concurrent workers."
    )]
    pub threads: Option<usize>,

    #[arg(
        short = 'r',
        long = "rt",
        visible_alias = "rate",
        value_name = "RPS",
        help_heading = "Performance",
        help = "Request rate limit (requests per second)."
    )]
    pub rate: Option<u32>,

    #[arg(
        long = "qc",
        visible_alias = "queue-capacity",
        value_name = "N",
        help_heading = "Performance",
        help = "Maximum number of queued requests."
    )]
    pub queue_capacity: Option<usize>,
}
