// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Chart rendering daemon.
//!
//! # Usage
//!
//! ```bash
//! envgraphd
//! envgraphd --config /etc/envgraph/envgraph.yaml
//! envgraphd --port 8080
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use envgraph::{config, server};
use tokio::signal::unix::{SignalKind, signal};

#[derive(Parser, Debug)]
#[command(name = "envgraphd")]
#[command(about = "Renders sensor logs into cached chart images and serves them over HTTP")]
#[command(version)]
struct Args {
    /// Path to the YAML configuration file
    #[arg(short, long, env = "ENVGRAPH_CONFIG")]
    config: Option<PathBuf>,

    /// Port for the HTTP server, overriding the configuration file
    #[arg(short, long, env = "ENVGRAPH_PORT")]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let path = config::config_path(args.config);
    let mut config = config::load(&path)?;
    if let Some(port) = args.port {
        config.port = port;
    }

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %path.display(),
        port = config.port,
        renderer = %config.renderer.command,
        "starting envgraphd"
    );

    let mut sigint = signal(SignalKind::interrupt()).context("installing SIGINT handler")?;
    let mut sigterm = signal(SignalKind::terminate()).context("installing SIGTERM handler")?;
    let shutdown = async move {
        tokio::select! {
            _ = sigint.recv() => {
                tracing::info!("received SIGINT, initiating graceful shutdown");
            }
            _ = sigterm.recv() => {
                tracing::info!("received SIGTERM, initiating graceful shutdown");
            }
        }
    };

    server::run_server(Arc::new(config), shutdown).await
}
