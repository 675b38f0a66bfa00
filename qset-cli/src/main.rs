use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{debug, error};

mod commands;
mod workspace;

use commands::*;
use workspace::Workspace;

#[derive(Parser)]
#[command(name = "qset")]
#[command(about = "Run parameterized multi-stage query sets")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "qset.toml", env = "QSET_CONFIG")]
    config: PathBuf,

    /// Override the set directory from the config file
    #[arg(long)]
    sets_dir: Option<PathBuf>,

    /// Override the data directory from the config file
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Query set management commands
    Set {
        #[command(subcommand)]
        action: SetCommands,
    },
    /// Execute a query set
    Run(RunArgs),
    /// Configuration commands
    Config {
        #[command(subcommand)]
        action: ConfigCommands,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut workspace = Workspace::load(&cli.config, cli.verbose)?;
    if let Some(dir) = cli.sets_dir {
        workspace.config.sets.dir = dir;
    }
    if let Some(dir) = cli.data_dir {
        workspace.config.store.dir = dir;
    }

    let result = match cli.command {
        Commands::Set { action } => execute_set_command(&workspace, action),
        Commands::Run(args) => execute_run_command(&workspace, args),
        Commands::Config { action } => execute_config_command(&workspace, &cli.config, action),
    };

    match result {
        Ok(()) => {
            debug!("Command completed successfully");
            Ok(())
        }
        Err(e) => {
            error!("Command failed: {:#}", e);
            Err(e)
        }
    }
}
