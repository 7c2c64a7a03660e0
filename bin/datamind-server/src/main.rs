// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2024 Jonathan Lee
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License version 3
// as published by the Free Software Foundation.
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.
// See the GNU Affero General Public License for more details.
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see https://www.gnu.org/licenses/.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use datamind::config::{LogFormat, ServerConfig, DEFAULT_CONFIG_FILE};
use datamind::data_handler::CsvReader;
use datamind::{analyze, insights, DataEngine, EngineConfig};
use datamind_server::{build_router, AppState};
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug, Clone)]
#[command(name = "datamind-server", about = "Tabular data cleaning service")]
struct Cli {
    /// Configuration file; missing files fall back to defaults.
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,
    #[command(subcommand)]
    cmd: Option<Command>,
}

#[derive(Subcommand, Debug, Clone)]
enum Command {
    Serve {
        #[arg(long)]
        addr: Option<String>,
    },
    /// Print the summary of a CSV file without starting the server.
    Inspect {
        path: PathBuf,
        #[arg(long)]
        json: bool,
    },
}

fn init_tracing(server: &ServerConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&server.log_level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false);
    match server.log_format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Pretty => builder.init(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    let config = match EngineConfig::load(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("invalid configuration in {}: {e}; using defaults", cli.config.display());
            EngineConfig::default()
        }
    };
    init_tracing(&config.server);
    match cli.cmd.unwrap_or(Command::Serve { addr: None }) {
        Command::Serve { addr } => run_server(config, addr).await,
        Command::Inspect { path, json } => inspect(&config, path, json),
    }
}

fn inspect(config: &EngineConfig, path: PathBuf, json: bool) -> Result<()> {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "dataset".to_string());
    let frame = CsvReader::from_config(config)
        .read_file(&path, name)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let summary = insights::summarize(&frame, &config.parsing.datetime_formats);
    if json {
        let report = analyze(&frame)?;
        let out = serde_json::json!({ "summary": summary, "analysis": report });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }
    for column in frame.schema() {
        println!(
            "{:<24} {:<8} missing={}",
            column.name,
            column.data_type.to_string(),
            column.null_count
        );
    }
    for line in summary.summary.iter().chain(&summary.insights).chain(&summary.trends) {
        println!("- {line}");
    }
    Ok(())
}

async fn run_server(config: EngineConfig, addr: Option<String>) -> Result<()> {
    info!("datamind-server starting");
    let addr: SocketAddr = addr
        .unwrap_or_else(|| config.server.http_addr.clone())
        .parse()
        .context("invalid http address")?;
    let app = build_router(AppState::new(DataEngine::new(config)));
    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(l) => l,
        Err(e) => {
            warn!(error = %e, %addr, "bind failed, using ephemeral");
            tokio::net::TcpListener::bind("127.0.0.1:0").await?
        }
    };
    let local = listener.local_addr()?;
    info!(%local, "control plane listening");
    tokio::select! { _ = axum::serve(listener, app) => {} _ = tokio::signal::ctrl_c() => {} }
    info!("datamind-server shutting down");
    Ok(())
}
