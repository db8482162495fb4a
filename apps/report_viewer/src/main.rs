mod render;

use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::{bail, Context, Result};
use clap::Parser;
use client_core::{
    load_settings, HttpImageLoader, HttpNetworkProbe, KeyInput, ReportOrigin, ReportSession,
    SessionHandle, TOTAL_ATTEMPTS,
};
use shared::{protocol::SessionEvent, ViewState};
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    sync::broadcast,
};
use tracing::{info, warn};

use crate::render::{spawn_presenter, Format};

#[derive(Parser, Debug)]
#[command(about = "Look up a learning-journey report image by name")]
struct Args {
    /// Settings file; defaults to ./report_viewer.toml when present.
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long)]
    origin: Option<String>,
    /// Fetch a single report and exit instead of prompting.
    #[arg(long)]
    name: Option<String>,
    #[arg(long, default_value = ".")]
    save_dir: PathBuf,
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Loaded,
    Failed,
    Rejected,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter("info")
        .with_writer(std::io::stderr)
        .init();
    let args = Args::parse();

    let mut settings = load_settings(args.config.as_deref())?;
    if let Some(origin) = args.origin.as_deref() {
        settings.report_origin = ReportOrigin::parse(origin)
            .with_context(|| format!("invalid --origin '{origin}'"))?;
    }
    info!(origin = %settings.report_origin, "viewer: starting");

    let network = Arc::new(HttpNetworkProbe::new(settings.report_origin.clone()));
    let session = ReportSession::new(settings, Arc::new(HttpImageLoader::new()), network);
    let format = if args.json { Format::Json } else { Format::Text };
    let presenter = spawn_presenter(session.subscribe(), format);
    let (handle, task) = session.spawn();

    let outcome = match args.name.as_deref() {
        Some(name) => run_once(&handle, name, &args.save_dir).await,
        None => run_interactive(&handle, &args.save_dir).await,
    };

    if let Err(err) = handle.shutdown() {
        warn!("viewer: shutdown not delivered: {err}");
    }
    task.await.context("session task panicked")?;
    drop(handle);
    presenter.await.context("presenter task panicked")?;
    outcome
}

async fn run_once(handle: &SessionHandle, name: &str, save_dir: &Path) -> Result<()> {
    match submit_and_wait(handle, name).await? {
        Outcome::Loaded => {
            save_report(handle, save_dir).await?;
            Ok(())
        }
        Outcome::Failed => bail!("report for '{name}' did not load after {TOTAL_ATTEMPTS} attempts"),
        Outcome::Rejected => bail!("'{name}' is not an accepted name"),
    }
}

async fn run_interactive(handle: &SessionHandle, save_dir: &Path) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    println!("enter a name (:q to quit)");

    while let Some(line) = lines.next_line().await.context("failed to read stdin")? {
        if line.trim() == ":q" {
            break;
        }
        match submit_and_wait(handle, &line).await? {
            Outcome::Loaded => {
                if let Err(err) = save_report(handle, save_dir).await {
                    warn!("viewer: download failed: {err:#}");
                }
                handle.key(KeyInput::Escape, false)?;
            }
            Outcome::Failed => handle.key(KeyInput::Escape, false)?,
            Outcome::Rejected => {}
        }
    }
    Ok(())
}

/// Submits `name` and waits until the session settles on a result, an
/// error, or rejects the input outright.
async fn submit_and_wait(handle: &SessionHandle, name: &str) -> Result<Outcome> {
    let mut events = handle.subscribe();
    handle.submit(name)?;
    loop {
        match events.recv().await {
            Ok(SessionEvent::ViewChanged {
                to: ViewState::Result,
                ..
            }) => return Ok(Outcome::Loaded),
            Ok(SessionEvent::ViewChanged {
                to: ViewState::Error,
                ..
            }) => return Ok(Outcome::Failed),
            Ok(SessionEvent::InputErrorHighlight { .. }) => return Ok(Outcome::Rejected),
            Ok(_) => {}
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "viewer: event stream lagged");
            }
            Err(broadcast::error::RecvError::Closed) => bail!("session stopped while loading"),
        }
    }
}

async fn save_report(handle: &SessionHandle, save_dir: &Path) -> Result<PathBuf> {
    let action = handle.download().await?;
    let path = action.save_into(save_dir).await?;
    println!("saved {}", path.display());
    Ok(path)
}
