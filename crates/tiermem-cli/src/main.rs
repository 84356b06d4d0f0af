use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tiermem::MemoryManager;
use tiermem_cli::commands::config::load_config;
use tiermem_cli::commands::{
    ConfigCommand, ExportCommand, ForgetCommand, ListCommand, MigrateCommand, RecallCommand,
    RecentCommand, RememberCommand, ShowCommand, StatsCommand,
};
use tiermem_cli::error::CliResult;
use tiermem_cli::output::OutputFormat;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "tiermem-cli")]
#[command(about = "tiermem CLI - inspect and manage a tiered memory store")]
#[command(version)]
pub struct Cli {
    #[clap(long, short, global = true, help = "Output in JSON format")]
    pub json: bool,

    #[clap(long, short = 'd', global = true, help = "Path to data directory")]
    pub data_dir: Option<PathBuf>,

    #[clap(long, short = 'c', global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    #[clap(about = "Store a new record")]
    Remember(RememberCommand),

    #[clap(about = "Search records by meaning")]
    Recall(RecallCommand),

    #[clap(about = "Delete a record")]
    Forget(ForgetCommand),

    #[clap(about = "Show record details")]
    Show(ShowCommand),

    #[clap(about = "List records, newest first")]
    List(ListCommand),

    #[clap(about = "Show the most recent records or conversation history")]
    Recent(RecentCommand),

    #[clap(about = "Show tier and cache statistics")]
    Stats(StatsCommand),

    #[clap(about = "Run one tier migration pass")]
    Migrate(MigrateCommand),

    #[clap(about = "Write every record to a JSON file")]
    Export(ExportCommand),

    #[clap(about = "Configuration commands")]
    Config(ConfigCommand),
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

/// Library logs go to stderr and stay quiet unless RUST_LOG asks
fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run() -> CliResult<()> {
    init_logging();
    let cli = Cli::parse();

    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Table
    };

    if let Command::Config(cmd) = &cli.command {
        return cmd
            .execute(cli.config.as_deref(), cli.data_dir.as_deref(), format)
            .await;
    }

    let config = load_config(cli.config.as_deref(), cli.data_dir.as_deref())?;
    let manager = MemoryManager::open(config).await?;

    match &cli.command {
        Command::Remember(cmd) => cmd.execute(&manager, format).await,
        Command::Recall(cmd) => cmd.execute(&manager, format).await,
        Command::Forget(cmd) => cmd.execute(&manager, format).await,
        Command::Show(cmd) => cmd.execute(&manager, format).await,
        Command::List(cmd) => cmd.execute(&manager, format).await,
        Command::Recent(cmd) => cmd.execute(&manager, format).await,
        Command::Stats(cmd) => cmd.execute(&manager, format).await,
        Command::Migrate(cmd) => cmd.execute(&manager, format).await,
        Command::Export(cmd) => cmd.execute(&manager, format).await,
        Command::Config(_) => Ok(()),
    }
}
