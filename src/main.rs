mod nudge;
mod runtime;
mod sink;

use std::env;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

use crate::nudge::clock::{Clock, SystemClock};
use crate::nudge::model::NudgeConfig;
use crate::nudge::store::JsonFileStore;
use crate::runtime::{COMMAND_LIST, Command, NudgeRuntime, parse_command};
use crate::sink::{ActionSink, ChatApiConfig, ChatApiSink, ConsoleSink, DEFAULT_API_BASE, DEFAULT_MODEL};

const API_KEY_ENV: &str = "ANTHROPIC_API_KEY";
const API_KEY_PLACEHOLDER: &str = "your_api_key_here";

#[derive(Parser, Debug)]
#[command(
    name = "nudged",
    version,
    about = "Periodic nudge scheduler with a console control loop"
)]
struct Cli {
    /// Snapshot file used to resume the countdown across restarts.
    #[arg(long, default_value = "nudge-state.json")]
    state: PathBuf,

    #[arg(long, default_value = DEFAULT_MODEL)]
    model: String,

    #[arg(long, default_value = DEFAULT_API_BASE)]
    api_base: String,

    #[arg(long, default_value_t = 5)]
    interval_hours: u32,

    #[arg(long, default_value_t = 0)]
    interval_minutes: u32,

    #[arg(long, default_value = "hi")]
    message: String,

    /// Skip the startup probe nudge; start stopped unless resuming.
    #[arg(long)]
    no_auto_start: bool,

    /// Print nudges to stdout instead of calling the chat API.
    #[arg(long)]
    dry_run: bool,
}

fn main() {
    if let Err(err) = run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    if cli.interval_hours == 0 && cli.interval_minutes == 0 {
        bail!("interval must be greater than zero");
    }

    let sink: Arc<dyn ActionSink> = if cli.dry_run {
        Arc::new(ConsoleSink)
    } else {
        let api_key = load_api_key()?;
        Arc::new(ChatApiSink::new(
            ChatApiConfig::new(api_key, cli.model.clone()).with_base_url(cli.api_base.clone()),
        ))
    };

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;
    runtime.block_on(run_async(cli, sink))
}

fn load_api_key() -> Result<String> {
    match env::var(API_KEY_ENV) {
        Ok(key) if !key.is_empty() && key != API_KEY_PLACEHOLDER => Ok(key),
        _ => bail!("{API_KEY_ENV} is not set; export it or pass --dry-run"),
    }
}

async fn run_async(cli: Cli, sink: Arc<dyn ActionSink>) -> Result<()> {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let config = NudgeConfig {
        interval_hours: cli.interval_hours,
        interval_minutes: cli.interval_minutes,
        message: cli.message,
        ..NudgeConfig::default()
    };

    let mut runtime = NudgeRuntime::new(config, Box::new(JsonFileStore::new(cli.state)), sink);
    runtime.restore(clock.now());
    if !cli.no_auto_start && !runtime.scheduler().is_running() {
        runtime.auto_start(clock.now()).await;
    }

    println!("{COMMAND_LIST}");

    let (tx, rx) = mpsc::channel(8);
    let worker = tokio::spawn(runtime::run(runtime, rx, Arc::clone(&clock)));

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => match line.context("failed to read console input")? {
                None => {
                    // Console closed; persist and shut down.
                    let _ = tx.send(Command::Exit).await;
                    break;
                }
                Some(line) => match parse_command(&line) {
                    Some(Command::Exit) => {
                        let _ = tx.send(Command::Exit).await;
                        break;
                    }
                    Some(command) => {
                        if tx.send(command).await.is_err() {
                            break;
                        }
                    }
                    None => {
                        if !line.trim().is_empty() {
                            println!("Unknown command.");
                        }
                        println!("{COMMAND_LIST}");
                    }
                },
            },
            _ = tokio::signal::ctrl_c() => {
                let _ = tx.send(Command::Exit).await;
                break;
            }
        }
    }

    drop(tx);
    worker.await.context("scheduler task failed")?;
    Ok(())
}
