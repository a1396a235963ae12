//! 🚀 tdg-cli: the front door. Parses flags, loads config, points a walker at a bucket.
//!
//! 🎬 *[narrator voice]* "It all started with an auditor asking a simple question.
//! Who deleted the bucket policy on February 28th?"
//!
//! Three subcommands, one walk each:
//! - `events`: every record in time order, one JSON object per line on stdout.
//! - `analyze`: counts by event type, source, region and account.
//! - `size`: how many bytes of trail logs, per region and per account.

use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use tdg::{AppConfig, EventTally, QueryOptions, SizeTally, Walker};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// 🕵️ Dig AWS CloudTrail logs out of S3, in the order things happened.
#[derive(Debug, Parser)]
#[command(name = "tdg", version, about)]
struct Cli {
    /// 🔧 TOML config file. Environment variables prefixed `TDG_` are read either way.
    #[arg(short = 'c', long, global = true)]
    config: Option<PathBuf>,

    /// 📊 Show a progress spinner on stderr.
    #[arg(long, global = true)]
    progress: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// 📜 Print trail log events as JSON lines, oldest first.
    Events(WalkArgs),
    /// 🧮 Count trail log events by type, source, region and account.
    Analyze(WalkArgs),
    /// 📦 Show the size of trail logs.
    Size(WalkArgs),
}

#[derive(Debug, Args)]
struct WalkArgs {
    /// 🪣 s3://<bucket>[/<prefix>]
    location: String,

    /// 📅 Target date: 2006/01/02, 2006/01 or 2006. Defaults to today (UTC).
    #[arg(short = 'd', long = "date")]
    date: Option<String>,

    /// 📅 Start date (2006/01/02). Needs --end-date too.
    #[arg(short = 's', long = "start-date")]
    start_date: Option<String>,

    /// 📅 End date (2006/01/02), inclusive.
    #[arg(short = 'e', long = "end-date")]
    end_date: Option<String>,

    /// 🔢 Target account IDs. Repeat the flag or separate with commas.
    #[arg(short = 'a', long = "account", value_delimiter = ',')]
    accounts: Vec<String>,

    /// 🌎 Target regions. Repeat the flag or separate with commas.
    #[arg(short = 'r', long = "region", value_delimiter = ',')]
    regions: Vec<String>,

    /// 🔭 Every account found under the prefix.
    #[arg(short = 'A', long)]
    all_accounts: bool,

    /// 🔭 Every region found under each account.
    #[arg(short = 'R', long)]
    all_regions: bool,

    /// 🏷️ The trail's log file prefix, if it has one.
    #[arg(short = 'p', long)]
    log_file_prefix: Option<String>,
}

impl WalkArgs {
    fn query_options(&self) -> QueryOptions {
        QueryOptions {
            date_path: self
                .date
                .clone()
                .unwrap_or_else(|| Utc::now().format("%Y/%m/%d").to_string()),
            start_date_path: self.start_date.clone().unwrap_or_default(),
            end_date_path: self.end_date.clone().unwrap_or_default(),
            accounts: self.accounts.clone(),
            regions: self.regions.clone(),
            all_accounts: self.all_accounts,
            all_regions: self.all_regions,
            log_file_prefix: self.log_file_prefix.clone(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // 📡 logs go to stderr; stdout belongs to the events
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let the_cli = Cli::parse();

    if let Err(err) = run(the_cli).await {
        error!("💀 error: {}", err);
        // -- 🧅 peel the onion, one layer at a time
        let mut the_vibes_are_giving_aws_issues = false;
        for cause in err.chain().skip(1) {
            error!("⚠️  cause: {}", cause);
            let cause_str = cause.to_string();
            if cause_str.contains("dispatch failure")
                || cause_str.contains("error sending request")
                || cause_str.contains("credentials")
                || cause_str.contains("dns error")
                || cause_str.contains("Connection refused")
            {
                the_vibes_are_giving_aws_issues = true;
            }
        }
        if the_vibes_are_giving_aws_issues {
            error!(
                "🔧 hint: AWS could not be reached or did not like our credentials. \
                Check `aws sts get-caller-identity` with the same profile and region, \
                or set TDG_AWS__ENDPOINT_URL if you are pointing at an S3 lookalike."
            );
        }
        std::process::exit(1);
    }
    Ok(())
}

async fn run(cli: Cli) -> Result<()> {
    if let Some(the_path) = &cli.config {
        let the_path_exists = the_path.try_exists().with_context(|| {
            format!("💀 could not check whether the config file exists: '{}'", the_path.display())
        })?;
        anyhow::ensure!(
            the_path_exists,
            "💀 config file not found: '{}'. Relative paths are resolved from the current directory.",
            the_path.display()
        );
    }
    let mut the_config: AppConfig =
        tdg::load_config(cli.config.as_deref()).context("💀 couldn't load the configuration")?;
    the_config.walk.show_progress |= cli.progress;

    let the_walker = Walker::connect(&the_config).await;

    match cli.command {
        Command::Events(args) => {
            let the_stdout = std::io::stdout();
            let mut the_out = BufWriter::new(the_stdout.lock());
            let the_summary = the_walker
                .walk_events(&args.location, &args.query_options(), |record| {
                    serde_json::to_writer(&mut the_out, &record)?;
                    the_out.write_all(b"\n")?;
                    Ok(())
                })
                .await
                .context("💀 event walk failed")?;
            the_out.flush().context("💀 couldn't flush stdout")?;
            info!(
                "🏁 {} records from {} objects over {} days",
                the_summary.records_emitted, the_summary.objects_visited, the_summary.days_scanned
            );
        }
        Command::Analyze(args) => {
            let mut the_tally = EventTally::default();
            the_walker
                .walk_events(&args.location, &args.query_options(), |record| {
                    the_tally.add(&record);
                    Ok(())
                })
                .await
                .context("💀 event walk failed")?;
            println!();
            println!("{the_tally}");
        }
        Command::Size(args) => {
            let the_tally = Arc::new(Mutex::new(SizeTally::default()));
            let the_sink = Arc::clone(&the_tally);
            the_walker
                .walk_objects(&args.location, &args.query_options(), move |object| {
                    the_sink
                        .lock()
                        .map_err(|_| anyhow::anyhow!("💀 size tally lock poisoned"))?
                        .add(object);
                    Ok(())
                })
                .await
                .context("💀 object walk failed")?;
            let the_tally = the_tally
                .lock()
                .map_err(|_| anyhow::anyhow!("💀 size tally lock poisoned"))?;
            println!();
            println!("{the_tally}");
        }
    }
    Ok(())
}
