// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    name = "troupe",
    about = "Self-hosted multi-agent group-chat orchestration server",
    version
)]
pub struct Cli {
    /// Data directory holding provider config, the agent registry, and
    /// per-workspace group documents.
    #[arg(long, env = "TROUPE_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// Address to listen on.
    #[arg(long, default_value = "127.0.0.1:8700")]
    pub listen: String,

    /// Path to the provider configuration document
    /// (default: `<data-dir>/llm_providers.json`).
    #[arg(long)]
    pub providers: Option<PathBuf>,

    /// Increase log verbosity (-v: debug, -vv: trace).
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Print the configured providers and their models, then exit.
    ListProviders,
}
