// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Tether — headless bridge host.
//
// Entry point. Initialises logging (to stderr; stdout carries the protocol),
// loads the bridge configuration, registers the demonstration modules and
// pumps newline-delimited JSON over stdio until stdin closes.

mod host;
mod modules;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tokio::io::BufReader;
use tracing::{error, info};

use tether_bridge::{Bridge, ChannelEvaluator};
use tether_core::config::BridgeConfig;
use tether_core::error::Result;

/// Command line arguments.
#[derive(Parser, Debug)]
#[command(name = "tether")]
#[command(about = "Headless Tether bridge host speaking newline-delimited JSON over stdio")]
struct Args {
    /// Bridge configuration file (JSON); defaults apply when absent
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Print the bootstrap script for the scripted environment and exit
    #[arg(long)]
    print_bootstrap: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, kind = %e.kind(), "tether stopped");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<()> {
    let config = match &args.config {
        Some(path) => BridgeConfig::load(path)?,
        None => BridgeConfig::default(),
    };

    let (evaluator, scripts) = ChannelEvaluator::new();
    let bridge = modules::install(Bridge::builder(config, Arc::new(evaluator))).build()?;

    if args.print_bootstrap {
        println!("{}", bridge.bootstrap_script()?);
        return Ok(());
    }

    info!("tether host starting");
    host::run(
        &bridge,
        scripts,
        BufReader::new(tokio::io::stdin()),
        tokio::io::stdout(),
    )
    .await
}
