// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
mod cli;

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

use cli::{Cli, Commands};
use troupe_server::AppState;
use troupe_store::{AgentRegistry, GroupStore};
use troupe_tools::ToolRegistry;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let data_dir = cli
        .data_dir
        .clone()
        .unwrap_or_else(troupe_config::default_data_dir);
    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("creating data dir {}", data_dir.display()))?;

    let providers_path = cli
        .providers
        .clone()
        .unwrap_or_else(|| data_dir.join("llm_providers.json"));
    let providers = troupe_config::load_providers(&providers_path)?;

    if let Some(Commands::ListProviders) = &cli.command {
        if providers.providers.is_empty() {
            println!("No providers configured in {}", providers_path.display());
            return Ok(());
        }
        for p in &providers.providers {
            println!("{} ({}): {}", p.id, p.kind, p.models.join(", "));
        }
        return Ok(());
    }

    let mut tools = ToolRegistry::new();
    troupe_tools::builtin::register_builtin_tools(&mut tools, &data_dir);

    let output_modes = troupe_config::load_output_modes(&data_dir.join("output_modes.json"));

    let state = AppState {
        store: Arc::new(GroupStore::new(&data_dir)),
        agents: Arc::new(AgentRegistry::new(data_dir.join("agents_registry.json"))?),
        gateway: Arc::new(troupe_model::ProviderGateway::new(providers)),
        tools: Arc::new(tools),
        output_modes: Arc::new(output_modes),
        data_root: data_dir.clone(),
    };

    let app = troupe_server::router(state);
    let listener = tokio::net::TcpListener::bind(&cli.listen)
        .await
        .with_context(|| format!("binding {}", cli.listen))?;
    tracing::info!(
        listen = %cli.listen,
        data_dir = %data_dir.display(),
        "troupe server up"
    );
    axum::serve(listener, app).await.context("server exited")
}

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false))
        .init();
}
