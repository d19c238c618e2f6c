//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了CLI命令行接口。

use crate::client::BlobStore;
use crate::config::StoreConfig;
use crate::utils::setup_logging_with;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "oxblob")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[arg(short, long, default_value = "oxblob.toml", help = "Path to the store config file")]
    pub config: PathBuf,

    #[arg(short, long, help = "Override the bucket from the config file")]
    pub bucket: Option<String>,

    #[arg(long, help = "Print collected metrics to stderr after the command")]
    pub metrics: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    #[command(name = "get", about = "Read the value stored under a key")]
    Get(GetArgs),

    #[command(name = "put", about = "Store a value under a key")]
    Put(PutArgs),

    #[command(name = "rm", about = "Delete one or more keys")]
    Rm(RmArgs),

    #[command(name = "stat", about = "Show whether a key exists and its size")]
    Stat(StatArgs),

    #[command(name = "ls", about = "List keys under a prefix")]
    Ls(LsArgs),

    #[command(name = "sweep", about = "Reconcile the key cache with the bucket")]
    Sweep(SweepArgs),
}

#[derive(Parser, Debug)]
pub struct GetArgs {
    pub key: String,

    #[arg(short, long, help = "Write the value to a file instead of stdout")]
    pub output: Option<PathBuf>,
}

#[derive(Parser, Debug)]
pub struct PutArgs {
    pub key: String,

    #[arg(help = "Value to store; read from --file or stdin when omitted")]
    pub value: Option<String>,

    #[arg(short, long, help = "Read the value from a file")]
    pub file: Option<PathBuf>,
}

#[derive(Parser, Debug)]
pub struct RmArgs {
    #[arg(required = true)]
    pub keys: Vec<String>,
}

#[derive(Parser, Debug)]
pub struct StatArgs {
    pub key: String,
}

#[derive(Parser, Debug)]
pub struct LsArgs {
    #[arg(default_value = "/")]
    pub prefix: String,

    #[arg(short, long, default_value_t = 0, help = "Maximum entries to list (0 = unlimited)")]
    pub limit: usize,

    #[arg(long, default_value_t = 0, help = "Entries to skip")]
    pub offset: usize,

    #[arg(long, help = "Fetch and print values")]
    pub values: bool,

    #[arg(short, long, help = "Output in JSON format")]
    pub json: bool,
}

#[derive(Parser, Debug)]
pub struct SweepArgs {
    #[arg(short, long, help = "Output in JSON format")]
    pub json: bool,
}

mod admin;
mod list;
mod metrics;
mod objects;

/// 加载配置并打开存储
pub async fn open_store(cli: &Cli) -> Result<BlobStore> {
    let mut config = StoreConfig::from_file(&cli.config)
        .with_context(|| format!("Failed to load config from {}", cli.config.display()))?;
    if let Some(bucket) = &cli.bucket {
        config.bucket = bucket.clone();
    }
    BlobStore::new(config)
        .await
        .context("Failed to open store")
}

pub async fn run() -> Result<()> {
    setup_logging_with("warn");
    let cli = Cli::parse();
    let store = open_store(&cli).await?;

    let result = match &cli.command {
        Commands::Get(args) => objects::execute_get(&store, args).await,
        Commands::Put(args) => objects::execute_put(&store, args).await,
        Commands::Rm(args) => objects::execute_rm(&store, args).await,
        Commands::Stat(args) => objects::execute_stat(&store, args).await,
        Commands::Ls(args) => list::execute(&store, args).await,
        Commands::Sweep(args) => admin::execute_sweep(&store, args).await,
    };

    store.close().await?;
    if cli.metrics {
        metrics::print_metrics();
    }
    result
}
