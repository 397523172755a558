use std::{path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use clap::Parser;
use client_core::{DebuggerSession, EventBus, SessionOptions, WsEngineConnection};
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    sync::broadcast::error::RecvError,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod config;
mod console;
mod render;

use config::{load_settings, CliOverrides};
use console::{execute, parse, Flow, HELP};
use render::render_category;

#[derive(Parser, Debug)]
#[command(about = "Console front end for the processor simulator debugger")]
struct Args {
    /// Engine WebSocket address.
    #[arg(long)]
    engine_url: Option<String>,
    /// Binary to load once attached.
    #[arg(long)]
    elf_file: Option<PathBuf>,
    #[arg(long, default_value = "desktop.toml")]
    config: PathBuf,
    #[arg(long)]
    log_filter: Option<String>,
    /// Give up waiting on a run after this many seconds; 0 waits forever.
    #[arg(long)]
    run_timeout_secs: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let settings = load_settings(
        &args.config,
        &CliOverrides {
            engine_url: args.engine_url,
            elf_file: args.elf_file,
            log_filter: args.log_filter,
            run_timeout_secs: args.run_timeout_secs,
        },
    )?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&settings.log_filter));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let bus = EventBus::new();
    let connection = WsEngineConnection::connect(&settings.engine_url, Arc::clone(&bus)).await?;
    let session = Arc::new(
        DebuggerSession::attach(
            connection.clone(),
            bus,
            SessionOptions {
                keymap: settings.keymap()?,
                run_timeout: settings.run_timeout(),
            },
        )
        .await
        .context("failed to attach to engine")?,
    );
    info!(engine_url = %settings.engine_url, "debugger ready");

    if let Some(elf_file) = &settings.elf_file {
        let path = elf_file.to_string_lossy();
        if let Err(err) = session.dispatcher.load(&path).await {
            warn!(path = %path, error = %err, "initial load failed");
        }
    }

    let mut changes = session.store.subscribe();
    let store = Arc::clone(&session.store);
    let renderer = tokio::spawn(async move {
        loop {
            match changes.recv().await {
                Ok(category) => {
                    let view = store.snapshot().await;
                    print!("{}", render_category(&view, category));
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "renderer fell behind store changes");
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    println!("{HELP}");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let command = match parse(&line) {
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(err) => {
                println!("{err}");
                continue;
            }
        };
        if execute(&session, command).await == Flow::Quit {
            break;
        }
        if connection.is_closed() {
            warn!("engine connection lost");
            break;
        }
    }

    renderer.abort();
    session.teardown().await;
    connection.close().await;
    Ok(())
}
