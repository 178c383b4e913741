use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use clap::{error::ErrorKind, CommandFactory, Parser};
use colored::{ColoredString, Colorize};
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use thiserror::Error;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tracing_subscriber::EnvFilter;

use crate::cli::args::CliArgs;
use crate::cli::validation;
use crate::config::{self, Config, ConfigError, ConfigFile, Options};
use crate::output::{self, OutputFormat};
use crate::runner::{self, Runner, RunnerError, WordlistSource};
use crate::state::{ConfirmedResult, LogEvent, LogLevel};
use crate::transport::{ReqwestTransport, TransportError};

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    Cli(String),

    #[error("no target given, use --url or set url in the config file")]
    MissingUrl,

    #[error("no wordlist given, use --wordlist or set wordlist in the config file")]
    MissingWordlist,

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Runner(#[from] RunnerError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("failed to build runtime: {source}")]
    Runtime {
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write output file {path}: {source}")]
    Output {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to build progress bar style: {0}")]
    ProgressStyle(String),
}

fn print_banner() {
    const BANNER: &str = r#"
                                __               __
   ________  _______  _________/ /_  __  _______/ /____  _____
  / ___/ _ \/ ___/ / / / ___/ __ \/ / / / ___/ __/ _ \/ ___/
 / /  /  __/ /__/ /_/ / /  / /_/ / /_/ (__  ) /_/  __/ /
/_/   \___/\___/\__,_/_/  /_.___/\__,_/____/\__/\___/_/
"#;
    let _ = write!(&mut rainbowcoat::stdout(), "{}", BANNER);
    println!(
        "       v{} - recursive content discovery",
        env!("CARGO_PKG_VERSION")
    );
    println!(
        "{}{}{} {}",
        "[".bold().white(),
        "WRN".bold().yellow(),
        "]".bold().white(),
        "Use with caution. You are responsible for your actions"
            .bold()
            .white()
    );
    println!();
}

fn init_tracing(verbose: u8) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| match verbose {
        0 => EnvFilter::new("recurbuster=info,warn"),
        1 => EnvFilter::new("recurbuster=debug,warn"),
        _ => EnvFilter::new("recurbuster=trace,warn"),
    });
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .try_init();
}

fn format_kv_line(label: &str, value: &str) {
    println!(":: {:<12}: {}", label, value);
}

fn status_tag(status: u16) -> ColoredString {
    let text = status.to_string();
    match status {
        200..=299 => text.bold().green(),
        300..=399 => text.bold().blue(),
        400..=499 => text.bold().yellow(),
        _ => text.bold().red(),
    }
}

fn level_tag(level: LogLevel) -> ColoredString {
    match level {
        LogLevel::Debug => level.tag().bold().cyan(),
        LogLevel::Info => level.tag().bold().blue(),
        LogLevel::Warn => level.tag().bold().yellow(),
        LogLevel::Error => level.tag().bold().red(),
    }
}

pub fn format_result(result: &ConfirmedResult) -> String {
    let mut line = format!(
        "{}{}{} {:<4} {} {}",
        "[".bold().white(),
        status_tag(result.status),
        "]".bold().white(),
        result.method.as_str().bold().white(),
        result.url.as_str().bold().blue(),
        format!("[{}]", result.length).white(),
    );
    if let Some(location) = result.headers.get("location") {
        line.push_str(&format!(" {} {}", "->".white(), location.white()));
    }
    if !result.title.is_empty() {
        line.push_str(&format!(" {}", result.title.bold().white()));
    }
    if !result.verdict.is_hit() {
        line.push_str(&format!(" ({})", result.verdict.to_string().dimmed()));
    }
    line
}

pub fn format_log(event: &LogEvent) -> String {
    format!(
        "{}{}{} {}",
        "[".bold().white(),
        level_tag(event.level),
        "]".bold().white(),
        event.message
    )
}

// Merges defaults, the config file and the command line, in rising precedence.
pub fn build_options(args: &CliArgs, file: ConfigFile) -> Result<Options, AppError> {
    let mut options = Options::default();
    file.apply(&mut options);

    if let Some(v) = args.url.as_ref() {
        options.url = v.clone();
    }
    if let Some(v) = args.wordlist.as_ref() {
        options.wordlist = Some(v.clone());
    }
    if let Some(v) = args.blacklist.as_ref() {
        options.blacklist_location = Some(v.clone());
    }
    if let Some(v) = args.methods.as_ref() {
        options.methods = v.clone();
    }
    options.no_get |= args.no_get;
    options.no_head |= args.no_head;
    if !args.headers.is_empty() {
        options.headers = args.headers.clone();
    }
    if let Some(v) = args.cookies.as_ref() {
        options.cookies = v.clone();
    }
    if let Some(v) = args.auth.as_ref() {
        options.auth = v.clone();
    }
    options.ajax |= args.ajax;
    if let Some(v) = args.body.as_ref() {
        options.body_content = Some(v.clone());
    }
    if let Some(v) = args.agent.as_ref() {
        options.agent = v.clone();
    }
    if let Some(v) = args.proxy.as_ref() {
        options.proxy = Some(v.clone());
    }
    options.https |= args.https;
    options.ssl_ignore |= args.ssl_ignore;
    options.follow_redirects |= args.follow_redirects;
    if let Some(v) = args.timeout {
        options.timeout_seconds = v;
    }
    if let Some(v) = args.extensions.as_ref() {
        options.extensions = v.clone();
    }
    options.no_recursion |= args.no_recursion;
    options.no_spider |= args.no_spider;
    if args.no_append_dir {
        options.append_dir = false;
    }
    if let Some(v) = args.max_depth {
        options.max_depth = Some(v);
    }
    if let Some(v) = args.canary.as_ref() {
        options.canary = Some(v.clone());
    }
    if let Some(v) = args.ratio_404 {
        options.ratio_404 = v;
    }
    if let Some(v) = args.bad_responses.as_ref() {
        options.bad_responses = v.clone();
    }
    if !args.bad_headers.is_empty() {
        options.bad_headers = args.bad_headers.clone();
    }
    if let Some(v) = args.threads {
        options.threads = v;
    }
    if let Some(v) = args.rate {
        options.rate = Some(v);
    }
    if let Some(v) = args.queue_capacity {
        options.queue_capacity = v;
    }
    options.show_all |= args.show_all;
    if let Some(v) = args.output.as_ref() {
        options.output = Some(v.clone());
    }
    if let Some(v) = args.output_format.as_ref() {
        options.output_format = Some(v.clone());
    }

    if options.url.trim().is_empty() {
        return Err(AppError::MissingUrl);
    }
    if options.wordlist.is_none() {
        return Err(AppError::MissingWordlist);
    }
    Ok(options)
}

async fn write_output(
    path: &str,
    format: Option<&str>,
    results: &[ConfirmedResult],
) -> Result<(), AppError> {
    let format = format
        .and_then(OutputFormat::parse)
        .or_else(|| output::infer_format_from_path(path))
        .unwrap_or(OutputFormat::Text);
    let rendered = output::render(format, &output::build_records(results));

    let path = config::expand_tilde_string(path);
    let mut outfile = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(&path)
        .await
        .map_err(|e| AppError::Output {
            path: path.clone(),
            source: e,
        })?;
    outfile
        .write_all(&rendered)
        .await
        .map_err(|e| AppError::Output { path, source: e })
}

async fn run_async(options: Options, verbose: u8) -> Result<(), AppError> {
    let config = Config::from_options(&options)?;
    let wordlist_path = options.wordlist.clone().ok_or(AppError::MissingWordlist)?;
    let words = runner::load_wordlist(&WordlistSource::FilePath(wordlist_path.clone())).await?;
    let blacklist = runner::load_blacklist(config.blacklist_location.as_deref()).await?;
    let transport = Arc::new(ReqwestTransport::new(&config)?);

    format_kv_line("Target", config.url.as_str());
    format_kv_line("Wordlist", &format!("{} ({} words)", wordlist_path, words.len()));
    format_kv_line(
        "Methods",
        &config
            .methods
            .iter()
            .map(|m| m.as_str())
            .collect::<Vec<_>>()
            .join(","),
    );
    format_kv_line("Threads", &config.threads.to_string());
    if !config.extensions.is_empty() {
        format_kv_line("Extensions", &config.extensions.join(","));
    }
    if !blacklist.is_empty() {
        format_kv_line("Blacklist", &format!("{} urls", blacklist.len()));
    }

    let target = config.url.to_string();
    let mut runner = Runner::new(config, words, blacklist, transport);
    format_kv_line("Canary", runner.canary());
    println!();

    let pb = ProgressBar::new_spinner();
    pb.set_draw_target(ProgressDrawTarget::stderr());
    pb.enable_steady_tick(Duration::from_millis(200));
    pb.set_style(
        ProgressStyle::with_template(
            ":: Requests: [{pos}] :: {per_sec} :: Duration: [{elapsed_precise}] :: {msg}",
        )
        .map_err(|e| AppError::ProgressStyle(e.to_string()))?,
    );

    let mut results = runner.take_results();
    let mut logs = runner.take_logs();
    let results_handle = {
        let pb = pb.clone();
        tokio::spawn(async move {
            let mut collected = Vec::new();
            if let Some(results) = results.as_mut() {
                while let Some(result) = results.recv().await {
                    let result = result.into_inner();
                    pb.println(format_result(&result));
                    collected.push(result);
                }
            }
            collected
        })
    };
    let logs_handle = {
        let pb = pb.clone();
        tokio::spawn(async move {
            if let Some(logs) = logs.as_mut() {
                while let Some(event) = logs.recv().await {
                    let event = event.into_inner();
                    if event.level == LogLevel::Debug && verbose == 0 {
                        continue;
                    }
                    pb.println(format_log(&event));
                }
            }
        })
    };

    runner.start(&target)?;
    loop {
        tokio::select! {
            _ = runner.wait() => break,
            _ = tokio::time::sleep(Duration::from_millis(200)) => {
                pb.set_position(runner.stats().requests);
                pb.set_message(format!(
                    "{} roots :: {} pending",
                    runner.stats().roots,
                    runner.outstanding()
                ));
            }
        }
    }

    let summary = runner.finish().await;
    let collected = results_handle.await.unwrap_or_default();
    let _ = logs_handle.await;
    pb.finish_and_clear();

    if let Some(path) = options.output.as_deref() {
        write_output(path, options.output_format.as_deref(), &collected).await?;
        format_kv_line("Output", path);
    }

    println!();
    format_kv_line("Requests", &summary.stats.requests.to_string());
    format_kv_line("Hits", &summary.stats.hits.to_string());
    format_kv_line("Directories", &summary.frontier.len().to_string());
    if summary.stats.transport_errors > 0 {
        format_kv_line("Errors", &summary.stats.transport_errors.to_string());
    }
    println!(
        ":: Completed :: scan took {}s ::",
        summary.elapsed.as_secs()
    );
    Ok(())
}

pub fn run_cli() -> Result<(), AppError> {
    let args = match CliArgs::try_parse() {
        Ok(args) => args,
        Err(e) => match e.kind() {
            ErrorKind::DisplayHelp => {
                let mut cmd = CliArgs::command();
                let _ = cmd.print_long_help();
                return Ok(());
            }
            ErrorKind::DisplayVersion => {
                let cmd = CliArgs::command();
                print!("{}", cmd.render_version());
                return Ok(());
            }
            _ => return Err(AppError::Cli(e.to_string())),
        },
    };
    validation::validate(&args).map_err(AppError::Cli)?;

    if args.no_color {
        colored::control::set_override(false);
    }
    init_tracing(args.verbose);
    print_banner();

    let file = match args.config.as_ref() {
        Some(path) => config::load_config(&config::expand_tilde(path), false)?,
        None => match config::default_config_path() {
            Some(path) => config::load_config(&path, true)?,
            None => ConfigFile::default(),
        },
    };
    let options = build_options(&args, file)?;

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| AppError::Runtime { source: e })?;
    rt.block_on(run_async(options, args.verbose))
}
